use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use log::warn;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{RateProvider, dated_url, decimal_from_json, is_dated_template, load_text};
use crate::exchange_rate::ExchangeRate;

#[derive(Debug, Deserialize)]
pub struct DailyResponse {
    pub status: Option<i64>,
    pub data: Option<Vec<DailyRate>>,
    pub err: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DailyRate {
    pub from_currency: Option<String>,
    pub to_currency: Option<String>,
    #[serde(default)]
    pub exchange_rate: Value,
    pub date: Option<String>,
    pub created_at: Option<String>,
}

/// Primary provider returning `{status, data: [{from_currency, to_currency, exchange_rate}], err}`.
#[derive(Debug, Clone)]
pub struct DailyClient {
    client: Client,
    url: String,
}

impl DailyClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl RateProvider for DailyClient {
    fn name(&self) -> &'static str {
        "primary"
    }

    fn is_dated(&self) -> bool {
        is_dated_template(&self.url)
    }

    async fn try_fetch(&self, date: NaiveDate) -> Result<Vec<ExchangeRate>> {
        let text = load_text(&self.client, &dated_url(&self.url, date)).await?;
        parse_daily(&text, date, Utc::now())
    }
}

/// Maps a primary payload onto records for `date`.
///
/// Entries with a blank currency code or no rate are dropped silently.
pub fn parse_daily(
    text: &str,
    date: NaiveDate,
    fetched_at: DateTime<Utc>,
) -> Result<Vec<ExchangeRate>> {
    let response: DailyResponse =
        serde_json::from_str(text).context("parsing primary rates payload")?;

    let Some(data) = response.data else {
        if let Some(err) = response.err.filter(|e| !e.trim().is_empty()) {
            warn!("primary returned no data (status {:?}): {}", response.status, err);
        }
        return Ok(Vec::new());
    };

    let mut out = Vec::with_capacity(data.len());
    for entry in data {
        let from = entry.from_currency.as_deref().unwrap_or_default();
        let to = entry.to_currency.as_deref().unwrap_or_default();

        let rate = match decimal_from_json(&entry.exchange_rate) {
            Ok(Some(rate)) => rate,
            Ok(None) => continue,
            Err(e) => {
                warn!("skipping primary rate {}->{}: {:#}", from, to, e);
                continue;
            }
        };

        if let Some(record) = ExchangeRate::daily(date, from, to, rate, fetched_at) {
            out.push(record);
        }
    }

    Ok(out)
}
