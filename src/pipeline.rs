//! Daily ingest: primary, then fallback, then an atomic replace of the day.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use log::{info, warn};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::exchange_rate::SOURCE_DAILY;
use crate::store::RateStore;
use crate::upstream::RateProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateOrigin {
    Primary,
    Fallback,
    /// Neither provider returned anything; the day was cleared.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub date: NaiveDate,
    pub count: usize,
    pub origin: RateOrigin,
    /// Rows of the previous ingest that were removed.
    pub replaced: u64,
}

pub struct IngestionPipeline {
    primary: Arc<dyn RateProvider>,
    fallback: Arc<dyn RateProvider>,
    store: Arc<dyn RateStore>,
    zone: Tz,
    locks: DateLocks,
}

impl IngestionPipeline {
    pub fn new(
        primary: Arc<dyn RateProvider>,
        fallback: Arc<dyn RateProvider>,
        store: Arc<dyn RateStore>,
    ) -> Self {
        Self {
            primary,
            fallback,
            store,
            zone: Tz::UTC,
            locks: DateLocks::default(),
        }
    }

    /// Zone that defines "today" for triggers and undated providers.
    pub fn with_zone(mut self, zone: Tz) -> Self {
        self.zone = zone;
        self
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.zone).date_naive()
    }

    /// Fetches rates for `date` and replaces the stored `DAILY` set with them.
    ///
    /// Provider failures only ever shrink the result; an empty result clears
    /// the day. Only a storage failure is returned as an error. Ingests of the
    /// same date are serialized.
    pub async fn ingest(&self, date: NaiveDate) -> Result<IngestReport> {
        let _guard = self.locks.lock(date).await;

        self.check_dated(self.primary.as_ref(), date);
        let mut rates = self.primary.fetch(date).await;
        let mut origin = RateOrigin::Primary;

        if rates.is_empty() {
            warn!("Primary returned 0 rows for {}. Trying fallback.", date);
            self.check_dated(self.fallback.as_ref(), date);
            rates = self.fallback.fetch(date).await;
            origin = if rates.is_empty() {
                RateOrigin::Empty
            } else {
                RateOrigin::Fallback
            };
        }

        let outcome = self
            .store
            .replace(date, SOURCE_DAILY, &rates)
            .await
            .with_context(|| format!("storing {} rates for {}", rates.len(), date))?;

        if origin == RateOrigin::Empty && outcome.deleted > 0 {
            warn!(
                "No provider returned rates for {}; cleared {} previously stored rows",
                date, outcome.deleted
            );
        }
        info!("Ingest for {} saved {} rows ({:?}).", date, rates.len(), origin);

        Ok(IngestReport {
            date,
            count: rates.len(),
            origin,
            replaced: outcome.deleted,
        })
    }

    fn check_dated(&self, provider: &dyn RateProvider, date: NaiveDate) {
        if !provider.is_dated() && date != self.today() {
            warn!(
                "{} provider is not date-scoped; current rates will be stored under {}",
                provider.name(),
                date
            );
        }
    }
}

/// One async lock per date, dropped again once nobody holds or awaits it.
#[derive(Debug, Default)]
pub struct DateLocks {
    slots: Mutex<HashMap<NaiveDate, Arc<AsyncMutex<()>>>>,
}

impl DateLocks {
    pub async fn lock(&self, date: NaiveDate) -> DateGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(date).or_default())
        };
        let guard = Arc::clone(&slot).lock_owned().await;

        DateGuard {
            locks: self,
            date,
            slot,
            guard: Some(guard),
        }
    }

    pub fn held(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

pub struct DateGuard<'a> {
    locks: &'a DateLocks,
    date: NaiveDate,
    slot: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DateGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();

        let mut slots = self
            .locks
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // The map and this guard are the only owners left: nobody is waiting.
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.date);
        }
    }
}
