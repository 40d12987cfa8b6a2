//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::fmt;
use std::str::FromStr;
use std::sync::Once;
use thiserror::Error;
use tracing::{info, warn};

static INIT: Once = Once::new();

const URL_KEYS: &[&str] = &["SUPABASE_URL", "VITE_SUPABASE_URL", "REACT_APP_SUPABASE_URL"];
const ANON_KEYS: &[&str] = &[
    "SUPABASE_ANON_KEY",
    "VITE_SUPABASE_ANON_KEY",
    "REACT_APP_SUPABASE_ANON_KEY",
];
const SERVICE_KEYS: &[&str] = &["SUPABASE_SERVICE_ROLE_KEY", "SUPABASE_SERVICE_KEY"];

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::dotenv().is_err() {
            // Fallback to the crate root so `cargo run` from a subdirectory still works
            let candidate = format!("{}/.env", env!("CARGO_MANIFEST_DIR"));
            let _ = dotenv::from_filename(candidate);
        }
    });
}

/// Common bootstrap for CLI binaries: load env once and note which keys are present.
pub fn bootstrap_cli(bin_name: &str) {
    init_env();
    let has_url = first_of(URL_KEYS).is_some();
    let has_anon = first_of(ANON_KEYS).is_some();
    let has_service = first_of(SERVICE_KEYS).is_some();
    if has_url {
        info!(
            target = "bootstrap",
            bin = bin_name,
            anon_key = has_anon,
            service_key = has_service,
            "store endpoint configured"
        );
    } else {
        warn!(
            target = "bootstrap",
            bin = bin_name,
            "no SUPABASE_URL configured; commands needing the store will abort"
        );
    }
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

fn first_of(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| env_opt(k))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env: {0:?}")]
    MissingEnv(Vec<String>),
    #[error("invalid store URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("no {0} key configured (set {1})")]
    MissingKey(KeyRole, &'static str),
    #[error("{0}")]
    Invalid(String),
}

/// Which access key a command talks to the store with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    /// Public key; every request is subject to row-level security.
    Anon,
    /// Privileged key; bypasses row-level security.
    ServiceRole,
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRole::Anon => f.write_str("anon"),
            KeyRole::ServiceRole => f.write_str("service-role"),
        }
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub url: url::Url,
    anon_key: Option<String>,
    service_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url.as_str())
            .field("anon_key", &self.anon_key.as_ref().map(|_| "***"))
            .field("service_key", &self.service_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        init_env();
        let raw = first_of(URL_KEYS).ok_or_else(|| {
            ConfigError::MissingEnv(URL_KEYS.iter().map(|k| k.to_string()).collect())
        })?;
        Self::new(&raw, first_of(ANON_KEYS), first_of(SERVICE_KEYS))
    }

    pub fn new(
        raw_url: &str,
        anon_key: Option<String>,
        service_key: Option<String>,
    ) -> Result<Self, ConfigError> {
        let url = url::Url::parse(raw_url.trim()).map_err(|e| ConfigError::InvalidUrl {
            url: raw_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: raw_url.to_string(),
                reason: "expected http(s) scheme".into(),
            });
        }
        if anon_key.is_none() && service_key.is_none() {
            return Err(ConfigError::MissingEnv(
                ANON_KEYS
                    .iter()
                    .chain(SERVICE_KEYS)
                    .map(|k| k.to_string())
                    .collect(),
            ));
        }
        Ok(Self {
            url,
            anon_key: anon_key.filter(|k| !k.trim().is_empty()),
            service_key: service_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn key_for(&self, role: KeyRole) -> Result<&str, ConfigError> {
        match role {
            KeyRole::Anon => self
                .anon_key
                .as_deref()
                .ok_or(ConfigError::MissingKey(role, "SUPABASE_ANON_KEY")),
            KeyRole::ServiceRole => self
                .service_key
                .as_deref()
                .ok_or(ConfigError::MissingKey(role, "SUPABASE_SERVICE_ROLE_KEY")),
        }
    }

    pub fn has_key(&self, role: KeyRole) -> bool {
        self.key_for(role).is_ok()
    }
}

/// Table names the tooling operates on; each overridable via `CADDY_TABLE_*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub planning: String,
    pub absences: String,
    pub postes: String,
    pub creneaux: String,
    pub employees: String,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            planning: "planning_cuisine".into(),
            absences: "absences_cuisine".into(),
            postes: "postes_cuisine".into(),
            creneaux: "creneaux_cuisine".into(),
            employees: "employes".into(),
        }
    }
}

impl Tables {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            planning: env_opt("CADDY_TABLE_PLANNING").unwrap_or(d.planning),
            absences: env_opt("CADDY_TABLE_ABSENCES").unwrap_or(d.absences),
            postes: env_opt("CADDY_TABLE_POSTES").unwrap_or(d.postes),
            creneaux: env_opt("CADDY_TABLE_CRENEAUX").unwrap_or(d.creneaux),
            employees: env_opt("CADDY_TABLE_EMPLOYEES").unwrap_or(d.employees),
        }
    }

    pub fn all(&self) -> Vec<&str> {
        vec![
            self.planning.as_str(),
            self.absences.as_str(),
            self.postes.as_str(),
            self.creneaux.as_str(),
            self.employees.as_str(),
        ]
    }
}

fn redact_value(key: &str, val: &str) -> String {
    let k = key.to_ascii_uppercase();
    if k.contains("PASSWORD")
        || k.contains("SECRET")
        || k.contains("KEY")
        || k.contains("TOKEN")
        || k.contains("COOKIE")
    {
        return if val.trim().is_empty() {
            String::new()
        } else {
            "***".to_string()
        };
    }

    let val_trim = val.trim();

    // Credentials embedded in URLs are masked even if the key looks harmless
    if let Ok(mut u) = url::Url::parse(val_trim) {
        if !u.username().is_empty() || u.password().is_some() {
            let _ = u.set_username("***");
            let _ = u.set_password(Some("***"));
            return u.to_string();
        }
    }

    val_trim.to_string()
}

/// Validate required keys and log a consolidated, redacted snapshot of configuration.
/// Each entry in `required` is a group of alternatives; the group is satisfied
/// when any one of them is set.
pub fn preflight_check(
    title: &str,
    required: &[&[&str]],
    also_log: &[&str],
) -> Result<(), ConfigError> {
    init_env();
    let mut missing: Vec<String> = Vec::new();
    for group in required {
        if !group.iter().any(|k| env_opt(k).is_some()) {
            missing.push(group.join("|"));
        }
    }
    let mut snapshot: Vec<(String, String)> = Vec::new();
    for &k in also_log {
        let v = env_opt(k).unwrap_or_default();
        snapshot.push((k.to_string(), redact_value(k, &v)));
    }
    info!(target = "preflight", title, snapshot = ?snapshot, "configuration snapshot");
    if !missing.is_empty() {
        return Err(ConfigError::MissingEnv(missing));
    }
    Ok(())
}

/// Keys `preflight_check` should report for store-backed commands.
pub fn store_env_keys() -> Vec<&'static str> {
    URL_KEYS
        .iter()
        .chain(ANON_KEYS)
        .chain(SERVICE_KEYS)
        .copied()
        .collect()
}

/// Required key groups for a command using `role`.
pub fn required_for(role: KeyRole) -> Vec<&'static [&'static str]> {
    match role {
        KeyRole::Anon => vec![URL_KEYS, ANON_KEYS],
        KeyRole::ServiceRole => vec![URL_KEYS, SERVICE_KEYS],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_keys_and_url_userinfo() {
        assert_eq!(redact_value("SUPABASE_ANON_KEY", "eyJhbGci"), "***");
        assert_eq!(redact_value("SUPABASE_SERVICE_ROLE_KEY", ""), "");
        assert_eq!(
            redact_value("SUPABASE_URL", "https://abc.supabase.co"),
            "https://abc.supabase.co"
        );
        let masked = redact_value("PROXY", "https://user:pw@host.example/");
        assert!(!masked.contains("pw"));
        assert!(masked.contains("***"));
    }

    #[test]
    fn credentials_require_some_key() {
        let err = Credentials::new("https://abc.supabase.co", None, None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv(_)));
    }

    #[test]
    fn credentials_reject_non_http_url() {
        let err =
            Credentials::new("postgres://abc", Some("anon".into()), None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));
    }

    #[test]
    fn key_selection_by_role() {
        let creds =
            Credentials::new("https://abc.supabase.co", Some("anon".into()), None).unwrap();
        assert_eq!(creds.key_for(KeyRole::Anon).unwrap(), "anon");
        assert!(matches!(
            creds.key_for(KeyRole::ServiceRole),
            Err(ConfigError::MissingKey(KeyRole::ServiceRole, _))
        ));
        assert!(!format!("{creds:?}").contains("anon\""));
    }

    #[test]
    fn parse_falls_back_on_garbage() {
        std::env::set_var("CADDY_TEST_TIMEOUT_A", "45");
        std::env::set_var("CADDY_TEST_TIMEOUT_B", "soon");
        assert_eq!(env_parse::<u64>("CADDY_TEST_TIMEOUT_A", 30), 45);
        assert_eq!(env_parse::<u64>("CADDY_TEST_TIMEOUT_B", 30), 30);
        assert_eq!(env_parse::<u64>("CADDY_TEST_TIMEOUT_UNSET", 30), 30);
        std::env::set_var("CADDY_TEST_BLANK", "  ");
        assert_eq!(env_opt("CADDY_TEST_BLANK"), None);
    }

    #[test]
    fn default_tables_cover_every_entity() {
        let t = Tables::default();
        assert_eq!(t.all().len(), 5);
        assert!(t.all().contains(&"planning_cuisine"));
    }
}
