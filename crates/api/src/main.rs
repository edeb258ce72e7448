use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use daybrief_core::domain::report::{ConsolidatedReport, ReportRequest};
use daybrief_core::error::PipelineError;
use daybrief_core::pipeline::ReportOrchestrator;
use daybrief_core::reliability::rate_limit::FixedWindowLimiter;
use daybrief_core::session::SessionStore;
use daybrief_core::storage::reports::{PgReportStore, ReportStore};
use daybrief_core::time::trading_day::resolve_trading_date;

const SESSION_TTL: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = daybrief_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match daybrief_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    // Report generation needs more than the database; if any collaborator
    // cannot be wired, read endpoints still work.
    let orchestrator = match &pool {
        Some(pool) => match ReportOrchestrator::from_settings(&settings, pool.clone()).await {
            Ok(o) => Some(Arc::new(o)),
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "orchestrator setup failed; generation disabled");
                None
            }
        },
        None => None,
    };

    let reports: Option<Arc<PgReportStore>> =
        pool.map(|pool| Arc::new(PgReportStore::new(pool)));

    let state = AppState {
        reports,
        orchestrator,
        limiter: Arc::new(FixedWindowLimiter::new(settings.rate_limit)),
        sessions: Arc::new(SessionStore::new(SESSION_TTL)),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/reports", post(generate_report))
        .route("/reports/latest", get(get_latest_report))
        .route(
            "/reports/:client_id/:trading_date",
            get(get_report_by_date),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    reports: Option<Arc<PgReportStore>>,
    orchestrator: Option<Arc<ReportOrchestrator>>,
    limiter: Arc<FixedWindowLimiter>,
    sessions: Arc<SessionStore<ConsolidatedReport>>,
}

#[derive(Debug, Deserialize)]
struct GenerateReportBody {
    client_id: String,
    trading_date: Option<String>,
    market_data: serde_json::Value,
    #[serde(default)]
    news_items: serde_json::Value,
    #[serde(default)]
    macro_context: serde_json::Value,
}

async fn generate_report(
    State(state): State<AppState>,
    Json(body): Json<GenerateReportBody>,
) -> Result<Json<ConsolidatedReport>, StatusCode> {
    let Some(orchestrator) = &state.orchestrator else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    if !state.limiter.allow(&body.client_id) {
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    let trading_date = resolve_trading_date(body.trading_date.as_deref(), Utc::now())
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let request = ReportRequest {
        trading_date,
        client_id: body.client_id,
        market_data: body.market_data,
        news_items: body.news_items,
        macro_context: body.macro_context,
    };

    let report = orchestrator
        .generate_and_store_daily_report(request)
        .await
        .map_err(pipeline_status)?;

    state.sessions.put(&report.client_id, report.clone());
    Ok(Json(report))
}

async fn get_latest_report(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ConsolidatedReport>, StatusCode> {
    let client_id = headers
        .get("x-client-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .ok_or(StatusCode::BAD_REQUEST)?;

    if let Some(report) = state.sessions.get(client_id) {
        return Ok(Json(report));
    }

    let Some(reports) = &state.reports else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let record = reports
        .latest_report(client_id)
        .await
        .map_err(pipeline_status)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let report = ConsolidatedReport::from(record);
    state.sessions.put(client_id, report.clone());
    Ok(Json(report))
}

async fn get_report_by_date(
    State(state): State<AppState>,
    Path((client_id, trading_date)): Path<(String, String)>,
) -> Result<Json<ConsolidatedReport>, StatusCode> {
    let Some(reports) = &state.reports else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let trading_date = NaiveDate::parse_from_str(&trading_date, "%Y-%m-%d")
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let record = reports
        .get_report(&client_id, trading_date)
        .await
        .map_err(pipeline_status)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ConsolidatedReport::from(record)))
}

fn pipeline_status(err: PipelineError) -> StatusCode {
    match &err {
        PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
        PipelineError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => {
            let err = anyhow::Error::new(err);
            sentry_anyhow::capture_anyhow(&err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &daybrief_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
