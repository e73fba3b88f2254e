#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use fxdaily::exchange_rate::{ExchangeRate, SOURCE_DAILY};
use fxdaily::store::{MemoryRateStore, RateStore, ReplaceOutcome, StoreError};
use fxdaily::upstream::RateProvider;
use rust_decimal::Decimal;

pub type Quote = (&'static str, &'static str, Decimal);

/// Provider answering with whatever quotes it currently holds; `None` fails.
pub struct StubProvider {
    name: &'static str,
    quotes: Mutex<Option<Vec<Quote>>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    delay: Duration,
}

impl StubProvider {
    pub fn new(name: &'static str, quotes: Option<Vec<Quote>>) -> Arc<Self> {
        Self::with_delay(name, quotes, Duration::ZERO)
    }

    pub fn with_delay(name: &'static str, quotes: Option<Vec<Quote>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            quotes: Mutex::new(quotes),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn set(&self, quotes: Option<Vec<Quote>>) {
        *self.quotes.lock().unwrap() = quotes;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateProvider for StubProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_dated(&self) -> bool {
        true
    }

    async fn try_fetch(&self, date: NaiveDate) -> Result<Vec<ExchangeRate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let quotes = self.quotes.lock().unwrap().clone();
        let quotes = quotes.ok_or_else(|| anyhow!("{} is down", self.name))?;
        let fetched_at = Utc::now();
        Ok(quotes
            .into_iter()
            .filter_map(|(from, to, rate)| ExchangeRate::daily(date, from, to, rate, fetched_at))
            .collect())
    }
}

pub struct BrokenStore;

#[async_trait]
impl RateStore for BrokenStore {
    async fn find_by_date_and_source(
        &self,
        _date: NaiveDate,
        _source: &str,
    ) -> Result<Vec<ExchangeRate>, StoreError> {
        Ok(Vec::new())
    }

    async fn replace(
        &self,
        _date: NaiveDate,
        _source: &str,
        _records: &[ExchangeRate],
    ) -> Result<ReplaceOutcome, StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }
}

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
}

pub async fn stored(store: &MemoryRateStore, date: NaiveDate) -> Vec<(String, String, Decimal)> {
    let mut rows: Vec<_> = store
        .find_by_date_and_source(date, SOURCE_DAILY)
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.from_currency().to_string(), r.to_currency().to_string(), r.rate()))
        .collect();
    rows.sort();
    rows
}

