//! Maintenance tooling for the kitchen scheduling store: probes, idempotent
//! schema changes, duplicate reconciliation and column backfills.
pub mod cli;
pub mod database_ops;
pub mod model;
pub mod store;

pub mod util {
    pub mod env;
    pub mod logging;
}
