use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::exchange_rate::{ExchangeRate, SOURCE_DAILY};
use crate::store::RateStore;

/// Read path over the stored `DAILY` rates; never triggers an ingest.
#[derive(Clone)]
pub struct RateQuery {
    store: Arc<dyn RateStore>,
}

impl RateQuery {
    pub fn new(store: Arc<dyn RateStore>) -> Self {
        Self { store }
    }

    pub async fn rates_for_date(&self, date: NaiveDate) -> Result<Vec<ExchangeRate>> {
        self.store
            .find_by_date_and_source(date, SOURCE_DAILY)
            .await
            .with_context(|| format!("loading rates for {date}"))
    }
}
