pub mod absences;
pub mod backfill;
pub mod counts;
pub mod dedupe;
pub mod migrate;
pub mod orphans;
pub mod probe;
pub mod rls_check;
pub mod seed;

use chrono::{Local, NaiveDate};
use std::process::ExitCode;
use tracing::{error, info};

use crate::store::RestStore;
use crate::util::env::{self as env_util, ConfigError, Credentials, KeyRole};

/// Build a store client for `role`, failing fast on missing configuration.
pub fn connect(title: &str, role: KeyRole) -> Result<RestStore, ConfigError> {
    env_util::preflight_check(title, &env_util::required_for(role), &env_util::store_env_keys())?;
    let creds = Credentials::from_env()?;
    let store = RestStore::new(&creds, role)?;
    info!(title, %role, host = creds.url.host_str().unwrap_or("?"), "store client ready");
    Ok(store)
}

/// Prefer the service-role key (sees every row); fall back to anon with a warning.
pub fn connect_any(title: &str) -> Result<RestStore, ConfigError> {
    let creds = Credentials::from_env()?;
    let role = if creds.has_key(KeyRole::ServiceRole) {
        KeyRole::ServiceRole
    } else {
        tracing::warn!(title, "no service-role key; results are limited by row-level security");
        KeyRole::Anon
    };
    connect(title, role)
}

pub fn day_or_today(day: Option<NaiveDate>) -> NaiveDate {
    day.unwrap_or_else(|| Local::now().date_naive())
}

/// Configuration problems exit 1; anything else was already reported and the
/// run still counts as done.
pub fn exit_code(result: anyhow::Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if is_config_error(&e) => {
            eprintln!("configuration error: {e:#}");
            eprintln!("set the variables in .env or the environment and rerun");
            ExitCode::from(1)
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "run aborted");
            eprintln!("error: {e:#}");
            ExitCode::SUCCESS
        }
    }
}

pub fn is_config_error(e: &anyhow::Error) -> bool {
    e.chain().any(|cause| cause.downcast_ref::<ConfigError>().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn config_errors_are_recognised_through_context() {
        let e: anyhow::Error = ConfigError::MissingEnv(vec!["SUPABASE_URL".into()]).into();
        assert!(is_config_error(&e));
        let wrapped = Err::<(), _>(ConfigError::Invalid("bad".into()))
            .context("loading rules")
            .unwrap_err();
        assert!(is_config_error(&wrapped));
        assert!(!is_config_error(&anyhow::anyhow!("network down")));
    }
}
