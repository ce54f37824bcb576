// SPDX-License-Identifier: PMPL-1.0-or-later
//! Upsert: update when the filter finds something, create otherwise.

use promised_engine::StorageEngine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::database::{Multiplicity, PromisedDb};
use crate::document::{kind, Filter};
use crate::error::{Result, StoreError};
use crate::mutation::UpdateReport;

/// Multiplicity of the two branches of [`PromisedDb::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOptions {
    /// Multiplicity of the update branch.
    pub update: Multiplicity,
    /// Multiplicity of the create branch.
    pub create: Multiplicity,
}

impl SaveOptions {
    /// Single-document update and create.
    pub const ONE: Self = Self {
        update: Multiplicity::One,
        create: Multiplicity::One,
    };
    /// Multi-document update and create.
    pub const MANY: Self = Self {
        update: Multiplicity::Many,
        create: Multiplicity::Many,
    };
}

impl Default for SaveOptions {
    /// Update every match; create a single document.
    fn default() -> Self {
        Self {
            update: Multiplicity::Many,
            create: Multiplicity::One,
        }
    }
}

/// What [`PromisedDb::save`] did, serialized as `{"action": ..., "data": ...}`.
#[derive(Debug, Serialize)]
#[serde(tag = "action", content = "data", rename_all = "lowercase")]
pub enum SaveOutcome {
    Update(UpdateReport),
    Create(Value),
}

impl<E: StorageEngine> PromisedDb<E> {
    /// Update documents selected by `filter` with `data` as the patch, or
    /// create `data` if `filter` selects nothing.
    pub async fn save(
        &self,
        collection: &str,
        filter: &Filter,
        data: Value,
        options: SaveOptions,
    ) -> Result<SaveOutcome> {
        let existing = self.find_one(collection, filter).await?;
        if existing.is_none() {
            debug!(database = %self.name(), collection, "save creates");
            return Ok(SaveOutcome::Create(
                self.create(collection, data, options.create).await?,
            ));
        }

        let patch = match data {
            Value::Object(patch) => patch,
            other => {
                return Err(StoreError::InvalidInput(format!(
                    "save found a match and needs an object patch, got {}",
                    kind(&other)
                )))
            }
        };
        debug!(database = %self.name(), collection, "save updates");
        Ok(SaveOutcome::Update(
            self.update(collection, filter, &patch, options.update).await?,
        ))
    }

    /// [`PromisedDb::save`] with [`SaveOptions::ONE`].
    pub async fn save_one(&self, collection: &str, filter: &Filter, data: Value) -> Result<SaveOutcome> {
        self.save(collection, filter, data, SaveOptions::ONE).await
    }

    /// [`PromisedDb::save`] with [`SaveOptions::MANY`].
    pub async fn save_many(&self, collection: &str, filter: &Filter, data: Value) -> Result<SaveOutcome> {
        self.save(collection, filter, data, SaveOptions::MANY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promised_engine::MemoryEngine;
    use serde_json::json;

    fn obj(value: Value) -> Filter {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_save_creates_then_updates() {
        let db = PromisedDb::new(MemoryEngine::new(), "db");
        let filter = obj(json!({"k": "z"}));

        let first = db.save_one("c", &filter, json!({"k": "z", "v": 1})).await.unwrap();
        assert!(matches!(first, SaveOutcome::Create(_)));

        let second = db.save_one("c", &filter, json!({"v": 2})).await.unwrap();
        match second {
            SaveOutcome::Update(report) => assert_eq!(report.successful.len(), 1),
            other => panic!("expected update, got: {:?}", other),
        }

        let stored = db.find_one("c", &filter).await.unwrap().unwrap();
        assert_eq!(stored["v"], 2);
        assert_eq!(db.find_many("c", &Filter::new()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_many_creates_array() {
        let db = PromisedDb::new(MemoryEngine::new(), "db");
        let outcome = db
            .save_many("c", &obj(json!({"k": 1})), json!([{"k": 1, "n": 1}, {"k": 1, "n": 2}]))
            .await
            .unwrap();
        assert!(matches!(outcome, SaveOutcome::Create(Value::Array(ref items)) if items.len() == 2));

        let outcome = db
            .save_many("c", &obj(json!({"k": 1})), json!({"n": 0}))
            .await
            .unwrap();
        match outcome {
            SaveOutcome::Update(report) => assert_eq!(report.successful.len(), 2),
            other => panic!("expected update, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_branch_rejects_non_object_patch() {
        let db = PromisedDb::new(MemoryEngine::new(), "db");
        db.create_one("c", json!({"k": "z", "v": 1})).await.unwrap();
        assert!(matches!(
            db.save_one("c", &obj(json!({"k": "z"})), json!([1])).await,
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_default_options_and_outcome_shape() {
        let defaults = SaveOptions::default();
        assert_eq!(defaults.update, Multiplicity::Many);
        assert_eq!(defaults.create, Multiplicity::One);

        let outcome = SaveOutcome::Create(json!({"_id": "a"}));
        assert_eq!(
            serde_json::to_value(outcome).unwrap(),
            json!({"action": "create", "data": {"_id": "a"}})
        );
    }
}
