pub mod absences;
pub mod backfill;
pub mod counts;
pub mod dedupe;
pub mod migrations;
pub mod orphans;
pub mod probe;
pub mod report;
pub mod schema;
pub mod seed;

/// Safety gate for anything that writes. Destructive commands default to `DryRun`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    DryRun,
    Execute,
}

impl RunMode {
    pub fn from_execute_flag(execute: bool) -> Self {
        if execute {
            RunMode::Execute
        } else {
            RunMode::DryRun
        }
    }

    pub fn is_dry_run(self) -> bool {
        self == RunMode::DryRun
    }
}
