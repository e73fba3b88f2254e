//! Keyed persistence of rates by `(rate_date, source)`.

pub mod memory;
pub mod postgres;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::exchange_rate::ExchangeRate;

pub use memory::MemoryRateStore;
pub use postgres::PgRateStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate rate {from_currency}->{to_currency} for {rate_date} ({tag})")]
    Duplicate {
        rate_date: NaiveDate,
        from_currency: String,
        to_currency: String,
        tag: String,
    },
    #[error("rate {from_currency}->{to_currency} for {found} does not belong to {expected}")]
    Mismatch {
        expected: String,
        found: String,
        from_currency: String,
        to_currency: String,
    },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// What a `replace` did to the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplaceOutcome {
    pub deleted: u64,
    pub inserted: u64,
}

#[async_trait]
pub trait RateStore: Send + Sync {
    async fn find_by_date_and_source(
        &self,
        date: NaiveDate,
        source: &str,
    ) -> Result<Vec<ExchangeRate>, StoreError>;

    /// Swaps the whole `(date, source)` set for `records` in one unit of work.
    ///
    /// Readers observe either the previous set or the new one. An empty
    /// `records` clears the day. A batch that repeats a natural key or holds
    /// a record for another day/source is rejected before anything changes.
    async fn replace(
        &self,
        date: NaiveDate,
        source: &str,
        records: &[ExchangeRate],
    ) -> Result<ReplaceOutcome, StoreError>;
}

pub(crate) fn check_batch(
    date: NaiveDate,
    source: &str,
    records: &[ExchangeRate],
) -> Result<(), StoreError> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if record.rate_date() != date || record.source() != source {
            return Err(StoreError::Mismatch {
                expected: format!("{date}/{source}"),
                found: format!("{}/{}", record.rate_date(), record.source()),
                from_currency: record.from_currency().to_string(),
                to_currency: record.to_currency().to_string(),
            });
        }
        if !seen.insert(record.key()) {
            return Err(StoreError::Duplicate {
                rate_date: date,
                from_currency: record.from_currency().to_string(),
                to_currency: record.to_currency().to_string(),
                tag: source.to_string(),
            });
        }
    }

    Ok(())
}
