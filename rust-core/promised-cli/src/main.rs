// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! promised: command-line access to a PromisedDB database file.
//!
//! Every subcommand opens the redb file, runs one store operation and prints
//! its result as JSON on stdout. Logs go to stderr and honour `RUST_LOG`.

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use promised_engine::{EngineLimits, RedbEngine};
use promised_store::{PromisedDb, ProvisioningMode, StoreConfig};

use commands::Command;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// promised: Mongo-style CRUD over a PromisedDB file.
#[derive(Parser, Debug)]
#[command(name = "promised", version = VERSION, about = "PromisedDB command-line tool")]
struct Cli {
    /// Database file; created if absent.
    #[arg(long, default_value = "promised.redb")]
    path: PathBuf,

    /// Database name. Falls back to PROMISED_DB_NAME, then "promised".
    #[arg(long)]
    name: Option<String>,

    /// `always-upgrade` or `upgrade-if-missing`. Falls back to PROMISED_PROVISIONING.
    #[arg(long)]
    provisioning: Option<ProvisioningMode>,

    /// Fail a schema upgrade blocked by other connections after this many milliseconds.
    #[arg(long)]
    blocked_timeout_ms: Option<u64>,

    /// Pretty-print JSON output.
    #[arg(long)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn store_config(&self) -> anyhow::Result<StoreConfig> {
        let mut config = StoreConfig::from_env().context("reading configuration from the environment")?;
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(mode) = self.provisioning {
            config.provisioning = mode;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.store_config()?;
    let limits = EngineLimits {
        blocked_timeout_ms: cli.blocked_timeout_ms,
        ..Default::default()
    };
    let engine = RedbEngine::create(&cli.path)
        .with_context(|| format!("opening {}", cli.path.display()))?
        .with_limits(limits);

    tracing::debug!(path = %cli.path.display(), database = %config.name, "engine ready");
    let db = PromisedDb::with_config(engine, config);

    let output = commands::run(&db, cli.command).await?;
    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_global_flags_and_subcommand() {
        let cli = Cli::try_parse_from([
            "promised",
            "--path",
            "/tmp/x.redb",
            "--name",
            "shop",
            "--provisioning",
            "always-upgrade",
            "find",
            "orders",
            "--one",
        ])
        .unwrap();
        assert_eq!(cli.path, PathBuf::from("/tmp/x.redb"));
        let config = cli.store_config().unwrap();
        assert_eq!(config.name, "shop");
        assert_eq!(config.provisioning, ProvisioningMode::AlwaysUpgrade);
        assert!(matches!(cli.command, Command::Find { one: true, ref filter, .. } if filter == "{}"));
    }

    #[test]
    fn test_rejects_unknown_provisioning_mode() {
        assert!(Cli::try_parse_from(["promised", "--provisioning", "sometimes", "version"]).is_err());
    }

    #[tokio::test]
    async fn test_runs_against_a_redb_file() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RedbEngine::create(dir.path().join("cli.redb")).unwrap();
        let db = PromisedDb::new(engine, "cli");
        let created = commands::run(
            &db,
            Command::Create {
                collection: "notes".into(),
                data: r#"{"_id": "n1", "text": "hi"}"#.into(),
                many: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(created["_id"], "n1");
        let version = commands::run(&db, Command::Version).await.unwrap();
        assert_eq!(version, serde_json::json!(2));
    }
}
