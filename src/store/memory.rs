use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{RateStore, ReplaceOutcome, StoreError, check_batch};
use crate::exchange_rate::ExchangeRate;

/// In-process store. Each `(date, source)` set is swapped as a whole under
/// the write lock, so readers never see a half-replaced day.
#[derive(Debug, Default)]
pub struct MemoryRateStore {
    days: RwLock<HashMap<(NaiveDate, String), Vec<ExchangeRate>>>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let days = self.days.read().unwrap_or_else(PoisonError::into_inner);
        days.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn find_by_date_and_source(
        &self,
        date: NaiveDate,
        source: &str,
    ) -> Result<Vec<ExchangeRate>, StoreError> {
        let days = self.days.read().unwrap_or_else(PoisonError::into_inner);
        Ok(days
            .get(&(date, source.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn replace(
        &self,
        date: NaiveDate,
        source: &str,
        records: &[ExchangeRate],
    ) -> Result<ReplaceOutcome, StoreError> {
        check_batch(date, source, records)?;

        let mut days = self.days.write().unwrap_or_else(PoisonError::into_inner);
        let key = (date, source.to_string());
        let previous = if records.is_empty() {
            days.remove(&key)
        } else {
            days.insert(key, records.to_vec())
        };

        Ok(ReplaceOutcome {
            deleted: previous.map_or(0, |rows| rows.len() as u64),
            inserted: records.len() as u64,
        })
    }
}
