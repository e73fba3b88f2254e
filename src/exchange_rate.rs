use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

/// Provenance tag of rows written by the daily ingest.
pub const SOURCE_DAILY: &str = "DAILY";

/// A single rate for one ingestion day.
///
/// `(rate_date, from_currency, to_currency, source)` is the natural key.
/// Currency codes are trimmed and never empty; their case is kept as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRate {
    rate_date: NaiveDate,
    from_currency: String,
    to_currency: String,
    source: String,
    rate: Decimal,
    fetched_at: DateTime<Utc>,
}

impl ExchangeRate {
    /// Builds a record, returning `None` when either currency code is blank.
    pub fn new(
        rate_date: NaiveDate,
        from_currency: &str,
        to_currency: &str,
        source: &str,
        rate: Decimal,
        fetched_at: DateTime<Utc>,
    ) -> Option<Self> {
        let from_currency = from_currency.trim();
        let to_currency = to_currency.trim();
        if from_currency.is_empty() || to_currency.is_empty() {
            return None;
        }

        Some(Self {
            rate_date,
            from_currency: from_currency.to_string(),
            to_currency: to_currency.to_string(),
            source: source.to_string(),
            rate,
            fetched_at,
        })
    }

    pub fn daily(
        rate_date: NaiveDate,
        from_currency: &str,
        to_currency: &str,
        rate: Decimal,
        fetched_at: DateTime<Utc>,
    ) -> Option<Self> {
        Self::new(
            rate_date,
            from_currency,
            to_currency,
            SOURCE_DAILY,
            rate,
            fetched_at,
        )
    }

    pub fn rate_date(&self) -> NaiveDate {
        self.rate_date
    }

    pub fn from_currency(&self) -> &str {
        &self.from_currency
    }

    pub fn to_currency(&self) -> &str {
        &self.to_currency
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn key(&self) -> RateKey<'_> {
        RateKey {
            rate_date: self.rate_date,
            from_currency: &self.from_currency,
            to_currency: &self.to_currency,
            source: &self.source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RateKey<'a> {
    pub rate_date: NaiveDate,
    pub from_currency: &'a str,
    pub to_currency: &'a str,
    pub source: &'a str,
}

/// Parses a textual rate without going through floating point.
///
/// Accepts plain decimals and scientific notation. Grouping separators such
/// as `24,350` are rejected rather than guessed at.
pub fn parse_rate(raw: &str) -> Result<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("empty rate");
    }

    let value = if trimmed.contains(['e', 'E']) {
        Decimal::from_scientific(trimmed)
    } else {
        Decimal::from_str(trimmed)
    };

    value.with_context(|| format!("Can't parse rate {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn codes_are_trimmed_but_not_case_folded() {
        let rate = ExchangeRate::daily(date(), " usd ", "INR\t", dec!(83.10), Utc::now()).unwrap();
        assert_eq!(rate.from_currency(), "usd");
        assert_eq!(rate.to_currency(), "INR");
        assert_eq!(rate.source(), SOURCE_DAILY);
    }

    #[test]
    fn blank_codes_are_rejected() {
        assert!(ExchangeRate::daily(date(), "  ", "INR", dec!(1), Utc::now()).is_none());
        assert!(ExchangeRate::daily(date(), "USD", "", dec!(1), Utc::now()).is_none());
    }

    #[test]
    fn parse_rate_keeps_every_digit() {
        assert_eq!(
            parse_rate("0.0000123456789012345678").unwrap().to_string(),
            "0.0000123456789012345678"
        );
        assert_eq!(parse_rate(" 83.10 ").unwrap().to_string(), "83.10");
    }

    #[test]
    fn parse_rate_handles_exponent_and_rejects_commas() {
        assert_eq!(parse_rate("1.2e-3").unwrap(), dec!(0.0012));
        assert!(parse_rate("24,350").is_err());
        assert!(parse_rate("91,5").is_err());
        assert!(parse_rate("").is_err());
        assert!(parse_rate("n/a").is_err());
    }
}
