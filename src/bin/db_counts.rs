use std::process::ExitCode;

use caddy_ops::cli::{self, counts};
use caddy_ops::util::{env, logging};

#[tokio::main]
async fn main() -> ExitCode {
    env::init_env();
    let _ = logging::init_tracing("warn");
    env::bootstrap_cli("db_counts");

    cli::exit_code(counts::run(counts::CountsConfig::default()).await)
}
