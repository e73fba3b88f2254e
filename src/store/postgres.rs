use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use log::debug;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{RateStore, ReplaceOutcome, StoreError, check_batch};
use crate::exchange_rate::ExchangeRate;

// Postgres caps a statement at 65535 bind parameters; each row binds 7.
const INSERT_CHUNK: usize = 1000;

#[derive(Debug, FromRow)]
struct ExchangeRateRow {
    rate_date: NaiveDate,
    from_currency: String,
    to_currency: String,
    source: String,
    rate: Decimal,
    fetched_at: DateTime<Utc>,
}

impl ExchangeRateRow {
    fn into_rate(self) -> Option<ExchangeRate> {
        ExchangeRate::new(
            self.rate_date,
            &self.from_currency,
            &self.to_currency,
            &self.source,
            self.rate,
            self.fetched_at,
        )
    }
}

/// `exchange_rate` table on Postgres.
///
/// `replace` is one transaction under the default read-committed isolation:
/// concurrent readers keep seeing the old rows until commit.
#[derive(Debug, Clone)]
pub struct PgRateStore {
    pool: PgPool,
}

impl PgRateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RateStore for PgRateStore {
    async fn find_by_date_and_source(
        &self,
        date: NaiveDate,
        source: &str,
    ) -> Result<Vec<ExchangeRate>, StoreError> {
        let rows: Vec<ExchangeRateRow> = sqlx::query_as(
            "SELECT rate_date, from_currency, to_currency, source, rate, fetched_at \
             FROM exchange_rate \
             WHERE rate_date = $1 AND source = $2 \
             ORDER BY from_currency, to_currency",
        )
        .bind(date)
        .bind(source)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(ExchangeRateRow::into_rate).collect())
    }

    async fn replace(
        &self,
        date: NaiveDate,
        source: &str,
        records: &[ExchangeRate],
    ) -> Result<ReplaceOutcome, StoreError> {
        check_batch(date, source, records)?;

        let mut tx = self.pool.begin().await?;

        // Serializes writers of the same day across processes until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("exchange_rate:{date}:{source}"))
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM exchange_rate WHERE rate_date = $1 AND source = $2")
            .bind(date)
            .bind(source)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let mut inserted = 0;
        for chunk in records.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO exchange_rate \
                 (id, rate_date, from_currency, to_currency, source, rate, fetched_at) ",
            );
            builder.push_values(chunk, |mut row, rate| {
                row.push_bind(Uuid::new_v4())
                    .push_bind(rate.rate_date())
                    .push_bind(rate.from_currency())
                    .push_bind(rate.to_currency())
                    .push_bind(rate.source())
                    .push_bind(rate.rate())
                    .push_bind(rate.fetched_at());
            });
            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        debug!("replaced {date}/{source}: -{deleted} +{inserted}");

        Ok(ReplaceOutcome { deleted, inserted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange_rate::SOURCE_DAILY;
    use rust_decimal_macros::dec;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn rate(date: NaiveDate, to: &str, source: &str, value: Decimal) -> ExchangeRate {
        ExchangeRate::new(date, "USD", to, source, value, Utc::now()).unwrap()
    }

    fn daily(to: &str, value: Decimal) -> ExchangeRate {
        rate(day(), to, SOURCE_DAILY, value)
    }

    async fn pairs(store: &PgRateStore, date: NaiveDate, source: &str) -> Vec<(String, String)> {
        store
            .find_by_date_and_source(date, source)
            .await
            .unwrap()
            .iter()
            .map(|r| (r.to_currency().to_string(), r.rate().to_string()))
            .collect()
    }

    async fn insert_raw(pool: &PgPool, to: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO exchange_rate \
             (id, rate_date, from_currency, to_currency, source, rate, fetched_at) \
             VALUES ($1, $2, 'USD', $3, $4, $5, now())",
        )
        .bind(Uuid::new_v4())
        .bind(day())
        .bind(to)
        .bind(SOURCE_DAILY)
        .bind(dec!(83.10))
        .execute(pool)
        .await
        .map(|_| ())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn replace_swaps_the_day(pool: PgPool) {
        let store = PgRateStore::new(pool);
        store
            .replace(day(), SOURCE_DAILY, &[daily("INR", dec!(83.10)), daily("EUR", dec!(0.91))])
            .await
            .unwrap();

        let outcome = store
            .replace(
                day(),
                SOURCE_DAILY,
                &[
                    daily("AED", dec!(3.6725)),
                    daily("JPY", dec!(0.0000123456789012345678)),
                ],
            )
            .await
            .unwrap();

        assert_eq!(outcome, ReplaceOutcome { deleted: 2, inserted: 2 });
        assert_eq!(
            pairs(&store, day(), SOURCE_DAILY).await,
            vec![
                ("AED".to_string(), "3.6725".to_string()),
                ("JPY".to_string(), "0.0000123456789012345678".to_string()),
            ]
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn empty_replace_clears_only_that_day_and_source(pool: PgPool) {
        let store = PgRateStore::new(pool);
        let next_day = day().succ_opt().unwrap();
        store.replace(day(), SOURCE_DAILY, &[daily("INR", dec!(83.10))]).await.unwrap();
        store
            .replace(day(), "MANUAL", &[rate(day(), "INR", "MANUAL", dec!(83.5))])
            .await
            .unwrap();
        store
            .replace(next_day, SOURCE_DAILY, &[rate(next_day, "INR", SOURCE_DAILY, dec!(83.2))])
            .await
            .unwrap();

        let outcome = store.replace(day(), SOURCE_DAILY, &[]).await.unwrap();

        assert_eq!(outcome, ReplaceOutcome { deleted: 1, inserted: 0 });
        assert!(pairs(&store, day(), SOURCE_DAILY).await.is_empty());
        assert_eq!(pairs(&store, day(), "MANUAL").await.len(), 1);
        assert_eq!(pairs(&store, next_day, SOURCE_DAILY).await.len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn table_rejects_a_repeated_natural_key(pool: PgPool) {
        insert_raw(&pool, "INR").await.unwrap();

        let err = insert_raw(&pool, "INR").await.unwrap_err();

        assert_eq!(
            err.as_database_error().and_then(|e| e.constraint()),
            Some("exchange_rate_natural_key")
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn rejected_batches_keep_the_previous_rows(pool: PgPool) {
        let store = PgRateStore::new(pool);
        store.replace(day(), SOURCE_DAILY, &[daily("INR", dec!(83.10))]).await.unwrap();
        let before = pairs(&store, day(), SOURCE_DAILY).await;

        let duplicate = store
            .replace(day(), SOURCE_DAILY, &[daily("EUR", dec!(0.91)), daily("EUR", dec!(0.92))])
            .await
            .unwrap_err();
        assert!(matches!(duplicate, StoreError::Duplicate { .. }));

        // Passes validation, then fails on the column width after the delete ran.
        let too_wide = "X".repeat(65);
        let failed = store
            .replace(day(), SOURCE_DAILY, &[daily("EUR", dec!(0.91)), daily(&too_wide, dec!(1))])
            .await
            .unwrap_err();
        assert!(matches!(failed, StoreError::Database(_)));

        assert_eq!(pairs(&store, day(), SOURCE_DAILY).await, before);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn large_batches_span_several_inserts(pool: PgPool) {
        let store = PgRateStore::new(pool);
        let batch: Vec<_> = (0..INSERT_CHUNK + 250)
            .map(|i| daily(&format!("C{i:04}"), Decimal::from(i as u64)))
            .collect();

        let outcome = store.replace(day(), SOURCE_DAILY, &batch).await.unwrap();

        assert_eq!(outcome.inserted, batch.len() as u64);
        assert_eq!(pairs(&store, day(), SOURCE_DAILY).await.len(), batch.len());
    }
}
