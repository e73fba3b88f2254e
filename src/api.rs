//! HTTP endpoints: read rates, trigger ingests, proxy the user upstream.

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError, web};
use chrono::{NaiveDate, Utc};
use log::warn;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::config::UserApi;
use crate::exchange_rate::ExchangeRate;
use crate::pipeline::{IngestReport, IngestionPipeline};
use crate::query::RateQuery;

pub const CRON_KEY_HEADER: &str = "X-CRON-KEY";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestionPipeline>,
    pub query: RateQuery,
    pub cron_key: String,
    pub user_api: UserApi,
    pub http: reqwest::Client,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Forbidden: bad or missing X-CRON-KEY")]
    Forbidden,
    #[error("{0}")]
    BadRequest(String),
    #[error("user exchange rate upstream is not configured")]
    NotConfigured,
    #[error("user exchange rate upstream failed: {0}")]
    Upstream(#[source] reqwest::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let err = match self {
            ApiError::Internal(e) => format!("{e:#}"),
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({
            "status": 0,
            "data": null,
            "err": err,
        }))
    }
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct RateView<'a> {
    date: NaiveDate,
    from_currency: &'a str,
    to_currency: &'a str,
    exchange_rate: Decimal,
}

impl<'a> From<&'a ExchangeRate> for RateView<'a> {
    fn from(rate: &'a ExchangeRate) -> Self {
        Self {
            date: rate.rate_date(),
            from_currency: rate.from_currency(),
            to_currency: rate.to_currency(),
            exchange_rate: rate.rate(),
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                ApiError::BadRequest(err.to_string()).into()
            }))
            .route("/health", web::get().to(health))
            .route("/daily_exchange_rates", web::get().to(daily_rates))
            .route("/admin/refresh_daily", web::post().to(refresh_daily))
            .route("/internal/cron/fetch-daily", web::post().to(cron_fetch_daily))
            .route("/user_exchange_rates", web::get().to(user_rates)),
    );
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    let now = Utc::now().with_timezone(&state.pipeline.zone());
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "time": now.to_rfc3339(),
    }))
}

async fn daily_rates(
    state: web::Data<AppState>,
    query: web::Query<DateQuery>,
) -> Result<HttpResponse, ApiError> {
    let date = query.date.unwrap_or_else(|| state.pipeline.today());
    let rates = state.query.rates_for_date(date).await?;
    let data: Vec<RateView> = rates.iter().map(RateView::from).collect();

    Ok(HttpResponse::Ok().json(json!({
        "status": 1,
        "data": data,
    })))
}

async fn refresh_daily(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<DateQuery>,
) -> Result<HttpResponse, ApiError> {
    authorize(&req, &state.cron_key)?;
    let date = query.date.unwrap_or_else(|| state.pipeline.today());
    ingest(&state, date).await
}

async fn cron_fetch_daily(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    authorize(&req, &state.cron_key)?;
    ingest(&state, state.pipeline.today()).await
}

#[derive(Serialize)]
struct IngestResponse {
    status: u8,
    #[serde(flatten)]
    report: IngestReport,
}

async fn ingest(state: &AppState, date: NaiveDate) -> Result<HttpResponse, ApiError> {
    let report = state.pipeline.ingest(date).await?;
    Ok(HttpResponse::Ok().json(IngestResponse { status: 1, report }))
}

async fn user_rates(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let Some(url) = state.user_api.url.as_deref() else {
        return Err(ApiError::NotConfigured);
    };

    let mut request = state
        .http
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json");
    if let Some(token) = state.user_api.token.as_deref() {
        request = request.bearer_auth(token);
    }
    if let Some(org_id) = state.user_api.org_id.as_deref() {
        request = request.header("orgid", org_id);
    }

    let resp = request.send().await.map_err(ApiError::Upstream)?;
    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json")
        .to_string();
    let body = resp.bytes().await.map_err(ApiError::Upstream)?;

    Ok(HttpResponse::build(status).content_type(content_type).body(body))
}

/// Exact match against the configured secret; an empty secret rejects everything.
fn authorize(req: &HttpRequest, expected: &str) -> Result<(), ApiError> {
    if expected.trim().is_empty() {
        warn!("CRON_KEY is empty; rejecting trigger call");
        return Err(ApiError::Forbidden);
    }

    let provided = req
        .headers()
        .get(CRON_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    if provided != Some(expected) {
        warn!("Bad {} received", CRON_KEY_HEADER);
        return Err(ApiError::Forbidden);
    }

    Ok(())
}
