use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result};
use fxdaily::api::{self, AppState};
use fxdaily::config::Config;
use fxdaily::pipeline::IngestionPipeline;
use fxdaily::query::RateQuery;
use fxdaily::scheduler;
use fxdaily::store::{PgRateStore, RateStore};
use fxdaily::upstream::{self, DailyClient, FallbackClient, RateProvider};
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    info!("database = {}", config.redacted_database_url());

    let store = PgRateStore::connect(&config.database_url, config.database_max_connections)
        .await
        .context("Can't connect to the database")?;
    store.migrate().await.context("Can't run migrations")?;
    let store: Arc<dyn RateStore> = Arc::new(store);

    let http = upstream::http_client(config.http_timeout)?;
    let primary: Arc<dyn RateProvider> =
        Arc::new(DailyClient::new(http.clone(), config.daily_api.clone()));
    let fallback: Arc<dyn RateProvider> = Arc::new(FallbackClient::new(
        http.clone(),
        config.fallback_api.clone(),
        config.fallback_base.clone(),
        config.fallback_symbols.clone(),
    ));

    let pipeline = Arc::new(
        IngestionPipeline::new(primary, fallback, Arc::clone(&store)).with_zone(config.schedule.zone),
    );

    if config.schedule_enabled {
        info!(
            "Daily ingest scheduled at {} {}",
            config.schedule.at, config.schedule.zone
        );
        scheduler::spawn_daily(Arc::clone(&pipeline), config.schedule);
    }

    let state = AppState {
        pipeline,
        query: RateQuery::new(store),
        cron_key: config.cron_key.clone(),
        user_api: config.user_api.clone(),
        http,
    };

    info!("listening on {}", config.bind_addr);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Logger::default())
            .configure(api::configure)
    })
    .bind(&config.bind_addr)
    .with_context(|| format!("Can't bind {}", config.bind_addr))?
    .run()
    .await?;

    Ok(())
}
