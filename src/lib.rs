//! Daily foreign-exchange rate ingestion and lookup.
//!
//! A trigger calls [`pipeline::IngestionPipeline::ingest`] once a day; it asks the
//! primary provider, falls back to the secondary one on an empty result and
//! replaces the stored `DAILY` rows for that date in a single unit of work.

pub mod api;
pub mod config;
pub mod exchange_rate;
pub mod pipeline;
pub mod query;
pub mod scheduler;
pub mod store;
pub mod upstream;
