use anyhow::Result;

use super::connect;
use crate::database_ops::seed;
use crate::database_ops::RunMode;
use crate::util::env::{KeyRole, Tables};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedAction {
    #[default]
    Create,
    Clean,
}

#[derive(Debug, Clone, Default)]
pub struct SeedConfig {
    pub action: SeedAction,
    /// Required for `clean` to delete anything; `create` only inserts missing rows.
    pub execute: bool,
}

impl SeedConfig {
    fn mode(&self) -> RunMode {
        match self.action {
            SeedAction::Create => RunMode::Execute,
            SeedAction::Clean => RunMode::from_execute_flag(self.execute),
        }
    }
}

pub async fn run(cfg: SeedConfig) -> Result<()> {
    let store = connect("seed", KeyRole::ServiceRole)?;
    let tables = Tables::from_env();
    let report = match cfg.action {
        SeedAction::Create => seed::create(&store, &tables, cfg.mode()).await,
        SeedAction::Clean => seed::clean(&store, &tables, cfg.mode()).await,
    };
    report.print();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_needs_execute_create_does_not() {
        let create = SeedConfig::default();
        assert_eq!(create.mode(), RunMode::Execute);
        let clean = SeedConfig {
            action: SeedAction::Clean,
            execute: false,
        };
        assert!(clean.mode().is_dry_run());
    }
}
