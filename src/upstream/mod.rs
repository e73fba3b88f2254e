//! Upstream rate providers.
//!
//! Providers are best-effort: [`RateProvider::try_fetch`] reports what went
//! wrong, [`RateProvider::fetch`] logs it and degrades to an empty result.

pub mod daily;
pub mod fallback;

use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use log::{error, info};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::exchange_rate::{ExchangeRate, parse_rate};

pub use daily::DailyClient;
pub use fallback::FallbackClient;

/// Placeholder substituted with the ISO target date in provider URLs.
pub const DATE_PLACEHOLDER: &str = "{date}";

#[async_trait]
pub trait RateProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the request is actually scoped to the target date.
    fn is_dated(&self) -> bool;

    async fn try_fetch(&self, date: NaiveDate) -> Result<Vec<ExchangeRate>>;

    /// Never fails: errors are logged and turn into an empty result.
    async fn fetch(&self, date: NaiveDate) -> Vec<ExchangeRate> {
        match self.try_fetch(date).await {
            Ok(rates) => {
                info!("{} fetch returned {} rows for {}", self.name(), rates.len(), date);
                rates
            }
            Err(e) => {
                error!("{} fetch failed for {}: {:#}", self.name(), date, e);
                Vec::new()
            }
        }
    }
}

/// Shared pooled client for every outbound call, with an explicit timeout.
pub fn http_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;

    Ok(client)
}

pub fn dated_url(template: &str, date: NaiveDate) -> String {
    template.replace(DATE_PLACEHOLDER, &date.format("%Y-%m-%d").to_string())
}

pub(crate) fn is_dated_template(template: &str) -> bool {
    template.contains(DATE_PLACEHOLDER)
}

pub(crate) async fn load_text(client: &Client, url: &str) -> Result<String> {
    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        anyhow::bail!("Can't download rates from {}: {}", url, resp.status());
    }

    let text = resp.text().await?;

    Ok(text)
}

/// Reads a JSON number or numeric string as a decimal without a float detour.
pub(crate) fn decimal_from_json(value: &Value) -> Result<Option<Decimal>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => parse_rate(&n.to_string()).map(Some),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => parse_rate(s).map(Some),
        other => Err(anyhow!("unexpected rate value {other}")),
    }
}
