use std::process::ExitCode;

use caddy_ops::cli::{self, probe};
use caddy_ops::util::{env, logging};

/// Table and column existence check; `table.column` arguments add column probes.
#[tokio::main]
async fn main() -> ExitCode {
    env::init_env();
    let _ = logging::init_tracing("info");
    env::bootstrap_cli("schema_check");

    let columns: Vec<String> = std::env::args().skip(1).collect();
    let cfg = probe::ProbeConfig {
        tables: None,
        columns,
    };
    cli::exit_code(probe::run(cfg).await)
}
