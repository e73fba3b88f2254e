use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::scheduler::Schedule;
use crate::upstream::fallback::{DEFAULT_BASE, DEFAULT_FALLBACK_URL, DEFAULT_SYMBOLS};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_addr: String,
    pub daily_api: String,
    pub fallback_api: String,
    pub fallback_base: String,
    pub fallback_symbols: Vec<String>,
    pub http_timeout: Duration,
    /// Shared secret for the protected triggers. Empty rejects every call.
    pub cron_key: String,
    pub schedule: Schedule,
    pub schedule_enabled: bool,
    pub user_api: UserApi,
}

/// Optional user-defined upstream passed through by the proxy endpoint.
#[derive(Debug, Clone, Default)]
pub struct UserApi {
    pub url: Option<String>,
    pub token: Option<String>,
    pub org_id: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| get(key).ok_or_else(|| anyhow!("{key} must be set"));

        let timeout_secs: u64 = match get("FX_HTTP_TIMEOUT_SECS") {
            Some(v) => v.parse().context("FX_HTTP_TIMEOUT_SECS must be a number of seconds")?,
            None => 15,
        };
        let database_max_connections: u32 = match get("DATABASE_MAX_CONNECTIONS") {
            Some(v) => v.parse().context("DATABASE_MAX_CONNECTIONS must be a number")?,
            None => 5,
        };
        let schedule_enabled = match get("FX_SCHEDULE_ENABLED") {
            Some(v) => parse_flag(&v).context("FX_SCHEDULE_ENABLED must be true or false")?,
            None => true,
        };

        let fallback_symbols = match get("FX_FALLBACK_SYMBOLS") {
            Some(v) => parse_symbols(&v),
            None => DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
        };

        let schedule = Schedule::parse(
            &get("FX_SCHEDULE_TIME").unwrap_or_else(|| "06:40".to_string()),
            &get("FX_SCHEDULE_TZ").unwrap_or_else(|| "Asia/Kolkata".to_string()),
        )?;

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            database_max_connections,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            daily_api: required("FX_DAILY_API")?,
            fallback_api: get("FX_FALLBACK_API").unwrap_or_else(|| DEFAULT_FALLBACK_URL.to_string()),
            fallback_base: get("FX_FALLBACK_BASE").unwrap_or_else(|| DEFAULT_BASE.to_string()),
            fallback_symbols,
            http_timeout: Duration::from_secs(timeout_secs),
            cron_key: lookup("CRON_KEY").unwrap_or_default(),
            schedule,
            schedule_enabled,
            user_api: UserApi {
                url: get("FX_USER_API"),
                token: get("FX_USER_TOKEN"),
                org_id: get("FX_USER_ORG_ID"),
            },
        })
    }

    /// Database URL with the password masked, for logging.
    pub fn redacted_database_url(&self) -> String {
        redact_password(&self.database_url)
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("unexpected flag value {other:?}")),
    }
}

/// Comma list of currency codes, trimmed, in first-seen order without repeats.
fn parse_symbols(value: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && seen.insert(*s))
        .map(str::to_string)
        .collect()
}

fn redact_password(url: &str) -> String {
    let Some(scheme_end) = url.find("://").map(|i| i + 3) else {
        return url.to_string();
    };
    let Some(at) = url[scheme_end..].find('@').map(|i| scheme_end + i) else {
        return url.to_string();
    };
    match url[scheme_end..at].find(':') {
        Some(colon) => format!("{}:***{}", &url[..scheme_end + colon], &url[at..]),
        None => url.to_string(),
    }
}
