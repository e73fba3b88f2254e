//! In-process daily trigger for the ingest.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use log::{error, info};
use tokio::task::JoinHandle;

use crate::pipeline::IngestionPipeline;

/// Fixed local time in a fixed timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub at: NaiveTime,
    pub zone: Tz,
}

impl Schedule {
    pub fn parse(at: &str, zone: &str) -> Result<Self> {
        let at = NaiveTime::parse_from_str(at.trim(), "%H:%M")
            .map_err(|e| anyhow!("invalid schedule time {at:?} (expected HH:MM): {e}"))?;
        let zone = zone
            .trim()
            .parse::<Tz>()
            .map_err(|e| anyhow!("invalid timezone {zone:?}: {e}"))?;

        Ok(Self { at, zone })
    }
}

/// First run strictly after `now`.
///
/// A local time that falls into a DST gap moves to the next day.
pub fn next_run_after(now: DateTime<Utc>, schedule: &Schedule) -> Option<DateTime<Utc>> {
    let today = now.with_timezone(&schedule.zone).date_naive();

    (0..=2)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .filter_map(|day| {
            schedule
                .zone
                .from_local_datetime(&day.and_time(schedule.at))
                .earliest()
        })
        .map(|local| local.with_timezone(&Utc))
        .find(|candidate| *candidate > now)
}

pub fn spawn_daily(pipeline: Arc<IngestionPipeline>, schedule: Schedule) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let Some(next) = next_run_after(now, &schedule) else {
                error!("Can't compute next ingest time after {}; scheduler stopped", now);
                return;
            };
            info!(
                "Next scheduled ingest at {}",
                next.with_timezone(&schedule.zone)
            );

            tokio::time::sleep((next - now).to_std().unwrap_or_default()).await;

            let date = next.with_timezone(&schedule.zone).date_naive();
            run_scheduled(&pipeline, date).await;
        }
    })
}

async fn run_scheduled(pipeline: &IngestionPipeline, date: NaiveDate) {
    info!("Scheduled ingest starting for {}", date);
    match pipeline.ingest(date).await {
        Ok(report) => info!(
            "Scheduled ingest finished for {}, saved {} rows.",
            date, report.count
        ),
        Err(e) => error!("Scheduled ingest for {} failed: {:#}", date, e),
    }
}
