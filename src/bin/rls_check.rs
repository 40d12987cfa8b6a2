use std::process::ExitCode;

use caddy_ops::cli::{self, rls_check};
use caddy_ops::util::{env, logging};

#[tokio::main]
async fn main() -> ExitCode {
    env::init_env();
    let _ = logging::init_tracing("info");
    env::bootstrap_cli("rls_check");

    cli::exit_code(rls_check::run(rls_check::RlsCheckConfig::default()).await)
}
