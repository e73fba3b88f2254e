use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use log::warn;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{RateProvider, dated_url, decimal_from_json, is_dated_template, load_text};
use crate::exchange_rate::ExchangeRate;

pub const DEFAULT_FALLBACK_URL: &str = "https://api.exchangerate.host/latest";
pub const DEFAULT_BASE: &str = "USD";
pub const DEFAULT_SYMBOLS: [&str; 4] = ["INR", "EUR", "AED", "SAR"];

#[derive(Debug, Deserialize)]
pub struct FallbackResponse {
    pub rates: Option<HashMap<String, Value>>,
}

/// Secondary provider returning `{rates: {CODE: number}}` for a fixed base.
///
/// Covers only the configured symbols, so its output is usually smaller
/// than what the primary would have produced.
#[derive(Debug, Clone)]
pub struct FallbackClient {
    client: Client,
    url: String,
    base: String,
    symbols: Vec<String>,
}

impl FallbackClient {
    pub fn new(
        client: Client,
        url: impl Into<String>,
        base: impl Into<String>,
        symbols: Vec<String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            base: base.into(),
            symbols,
        }
    }

    fn request_url(&self, date: NaiveDate) -> String {
        let url = dated_url(&self.url, date);
        let separator = if url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}base={}&symbols={}",
            url,
            separator,
            self.base,
            self.symbols.join(",")
        )
    }
}

#[async_trait]
impl RateProvider for FallbackClient {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn is_dated(&self) -> bool {
        is_dated_template(&self.url)
    }

    async fn try_fetch(&self, date: NaiveDate) -> Result<Vec<ExchangeRate>> {
        let text = load_text(&self.client, &self.request_url(date)).await?;
        parse_fallback(&text, &self.base, &self.symbols, date, Utc::now())
    }
}

/// Builds one `base -> symbol` record per configured symbol present in the payload.
pub fn parse_fallback(
    text: &str,
    base: &str,
    symbols: &[String],
    date: NaiveDate,
    fetched_at: DateTime<Utc>,
) -> Result<Vec<ExchangeRate>> {
    let response: FallbackResponse =
        serde_json::from_str(text).context("parsing fallback rates payload")?;

    let Some(rates) = response.rates else {
        warn!("fallback payload has no rates");
        return Ok(Vec::new());
    };

    let mut out = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let Some(value) = rates.get(symbol) else {
            continue;
        };
        let rate = match decimal_from_json(value) {
            Ok(Some(rate)) => rate,
            Ok(None) => continue,
            Err(e) => {
                warn!("skipping fallback rate {}->{}: {:#}", base, symbol, e);
                continue;
            }
        };

        if let Some(record) = ExchangeRate::daily(date, base, symbol, rate, fetched_at) {
            out.push(record);
        }
    }

    Ok(out)
}
