// SPDX-License-Identifier: PMPL-1.0-or-later
//! Subcommands and their dispatch onto a `PromisedDb`.

use std::io::Read;

use anyhow::{bail, Context};
use clap::Subcommand;
use promised_engine::{Connection, StorageEngine};
use promised_store::{Document, Filter, Multiplicity, PromisedDb, SaveOptions};
use serde_json::{json, Value};

/// Every operation the tool can run. JSON arguments accept `-` for stdin.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List collection names.
    Collections,
    /// Print the stored database version.
    Version,
    /// Ensure collections exist.
    Provision {
        #[arg(required = true)]
        collections: Vec<String>,
    },
    /// Find documents matching a filter.
    Find {
        collection: String,
        /// Filter object; `{}` selects everything.
        #[arg(long, default_value = "{}")]
        filter: String,
        /// Return only the first match.
        #[arg(long)]
        one: bool,
    },
    /// Insert a document, or an array of documents with `--many`.
    Create {
        collection: String,
        data: String,
        #[arg(long)]
        many: bool,
    },
    /// Merge a patch into matching documents.
    Update {
        collection: String,
        #[arg(long, default_value = "{}")]
        filter: String,
        #[arg(long)]
        patch: String,
        /// Stop after the first match.
        #[arg(long)]
        one: bool,
    },
    /// Delete matching documents.
    Delete {
        collection: String,
        #[arg(long, default_value = "{}")]
        filter: String,
        /// Delete only the first match and print it.
        #[arg(long)]
        one: bool,
    },
    /// Update matching documents, or create `data` when nothing matches.
    Save {
        collection: String,
        #[arg(long)]
        filter: String,
        data: String,
        /// Update only the first match.
        #[arg(long)]
        update_one: bool,
        /// Treat `data` as an array of documents when creating.
        #[arg(long)]
        create_many: bool,
    },
    /// Delete every document of a collection.
    Empty { collection: String },
}

fn read_json(raw: &str, what: &str) -> anyhow::Result<Value> {
    let text = if raw == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .with_context(|| format!("reading {what} from stdin"))?;
        buffer
    } else {
        raw.to_string()
    };
    serde_json::from_str(&text).with_context(|| format!("{what} is not valid JSON"))
}

fn read_object(raw: &str, what: &str) -> anyhow::Result<Document> {
    match read_json(raw, what)? {
        Value::Object(object) => Ok(object),
        other => bail!("{what} must be a JSON object, got {other}"),
    }
}

fn multiplicity(one: bool) -> Multiplicity {
    Multiplicity::from(!one)
}

/// Run `command` and return its JSON result.
pub async fn run<E: StorageEngine>(db: &PromisedDb<E>, command: Command) -> anyhow::Result<Value> {
    let output = match command {
        Command::Collections => json!(db.collection_names().await?),
        Command::Version => json!(db.current_version().await?),
        Command::Provision { collections } => {
            let names: Vec<&str> = collections.iter().map(String::as_str).collect();
            let connection = db.create_collections(&names).await?;
            let version = connection.version();
            let present = connection.object_store_names();
            connection.close().await?;
            json!({"version": version, "collections": present})
        }
        Command::Find { collection, filter, one } => {
            let filter: Filter = read_object(&filter, "filter")?;
            serde_json::to_value(db.find(&collection, &filter, multiplicity(one)).await?)?
        }
        Command::Create { collection, data, many } => {
            let data = read_json(&data, "data")?;
            db.create(&collection, data, Multiplicity::from(many)).await?
        }
        Command::Update { collection, filter, patch, one } => {
            let filter = read_object(&filter, "filter")?;
            let patch = read_object(&patch, "patch")?;
            serde_json::to_value(db.update(&collection, &filter, &patch, multiplicity(one)).await?)?
        }
        Command::Delete { collection, filter, one } => {
            let filter = read_object(&filter, "filter")?;
            serde_json::to_value(db.delete(&collection, &filter, multiplicity(one)).await?)?
        }
        Command::Save { collection, filter, data, update_one, create_many } => {
            let filter = read_object(&filter, "filter")?;
            let data = read_json(&data, "data")?;
            let options = SaveOptions {
                update: multiplicity(update_one),
                create: Multiplicity::from(create_many),
            };
            serde_json::to_value(db.save(&collection, &filter, data, options).await?)?
        }
        Command::Empty { collection } => serde_json::to_value(db.empty_collection(&collection).await?)?,
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use promised_engine::MemoryEngine;

    fn db() -> PromisedDb<MemoryEngine> {
        PromisedDb::new(MemoryEngine::new(), "cli")
    }

    #[tokio::test]
    async fn test_create_then_find() {
        let db = db();
        let created = run(
            &db,
            Command::Create {
                collection: "people".into(),
                data: r#"[{"_id": "a", "n": 1}, {"_id": "b", "n": 2}]"#.into(),
                many: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(created.as_array().map(Vec::len), Some(2));

        let found = run(
            &db,
            Command::Find {
                collection: "people".into(),
                filter: r#"{"n": "2"}"#.into(),
                one: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(found["_id"], "b");

        let names = run(&db, Command::Collections).await.unwrap();
        assert_eq!(names, json!(["people"]));
    }

    #[tokio::test]
    async fn test_update_delete_and_empty() {
        let db = db();
        db.create_many("c", json!([{"k": 1}, {"k": 1}, {"k": 2}])).await.unwrap();

        let report = run(
            &db,
            Command::Update {
                collection: "c".into(),
                filter: r#"{"k": 1}"#.into(),
                patch: r#"{"seen": true}"#.into(),
                one: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(report["successful"].as_array().map(Vec::len), Some(2));
        assert_eq!(report["failed"], json!([]));

        let deleted = run(
            &db,
            Command::Delete {
                collection: "c".into(),
                filter: r#"{"k": 2}"#.into(),
                one: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(deleted["k"], 2);

        let emptied = run(&db, Command::Empty { collection: "c".into() }).await.unwrap();
        assert_eq!(emptied, json!({"n": 2, "ok": true, "found": 2}));
    }

    #[tokio::test]
    async fn test_save_and_provision() {
        let db = db();
        let outcome = run(
            &db,
            Command::Save {
                collection: "s".into(),
                filter: r#"{"k": "z"}"#.into(),
                data: r#"{"k": "z", "v": 1}"#.into(),
                update_one: false,
                create_many: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(outcome["action"], "create");

        let provisioned = run(
            &db,
            Command::Provision {
                collections: vec!["s".into(), "t".into()],
            },
        )
        .await
        .unwrap();
        assert_eq!(provisioned["collections"], json!(["s", "t"]));
        assert_eq!(run(&db, Command::Version).await.unwrap(), provisioned["version"]);
    }

    #[tokio::test]
    async fn test_rejects_malformed_arguments() {
        let db = db();
        let err = run(
            &db,
            Command::Find {
                collection: "c".into(),
                filter: "[1, 2]".into(),
                one: false,
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("filter must be a JSON object"));

        let err = run(
            &db,
            Command::Create {
                collection: "c".into(),
                data: "{not json".into(),
                many: false,
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("data is not valid JSON"));
    }
}
