use anyhow::Result;
use tracing::info;

use super::connect;
use crate::database_ops::migrations::MigrationSet;
use crate::database_ops::schema;
use crate::database_ops::RunMode;
use crate::util::env::{KeyRole, Tables};

#[derive(Debug, Clone, Default)]
pub struct MigrateConfig {
    /// Sets to apply in order; empty means all of them.
    pub sets: Vec<MigrationSet>,
    /// Without this the statements are only printed.
    pub execute: bool,
}

pub async fn run(cfg: MigrateConfig) -> Result<()> {
    let store = connect("migrate", KeyRole::ServiceRole)?;
    let tables = Tables::from_env();
    let mode = RunMode::from_execute_flag(cfg.execute);
    let sets = if cfg.sets.is_empty() {
        MigrationSet::ALL.to_vec()
    } else {
        cfg.sets.clone()
    };

    for set in sets {
        let statements = set.statements(&tables);
        info!(%set, statements = statements.len(), ?mode, "applying migration set");
        let outcome = schema::apply_statements(&store, &statements, mode).await;
        let mut report = outcome.to_report(&format!("migrate {set}"), store.sql_rpc());
        if mode.is_dry_run() && outcome.skipped() < statements.len() {
            report.info("dry run: rerun with --execute to apply");
        }
        report.print();
    }
    Ok(())
}
