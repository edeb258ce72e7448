use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use daybrief_core::domain::report::ReportRequest;
use daybrief_core::pipeline::ReportOrchestrator;
use daybrief_core::time::trading_day::resolve_trading_date;

#[derive(Debug, Parser)]
#[command(name = "daybrief_worker")]
struct Args {
    /// Client to generate the briefing for.
    #[arg(long)]
    client_id: String,

    /// Trading date (YYYY-MM-DD). Defaults to the most recent completed US
    /// trading day.
    #[arg(long)]
    trading_date: Option<String>,

    /// Path to a JSON file with market_data, news_items, and macro_context.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Do everything except calling external services and the database.
    #[arg(long)]
    dry_run: bool,
}

/// Shape of the --input file. Only market_data is required.
#[derive(Debug, Deserialize)]
struct RunInput {
    market_data: serde_json::Value,
    #[serde(default)]
    news_items: serde_json::Value,
    #[serde(default)]
    macro_context: serde_json::Value,
}

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

    let args = Args::parse();

    let trading_date = resolve_trading_date(args.trading_date.as_deref(), chrono::Utc::now())?;

    let input = load_input(args.input.as_deref())?;

    if args.dry_run {
        tracing::info!(
            client_id = %args.client_id,
            %trading_date,
            dry_run = true,
            has_news = !input.news_items.is_null(),
            "daily briefing run (dry-run)"
        );
        return Ok(());
    }

    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    daybrief_core::storage::migrate(&pool).await?;

    let acquired =
        daybrief_core::storage::lock::try_acquire_report_lock(&pool, &args.client_id, trading_date)
            .await?;
    if !acquired {
        tracing::warn!(
            client_id = %args.client_id,
            %trading_date,
            "report lock not acquired; another run in progress"
        );
        return Ok(());
    }

    let orchestrator = Arc::new(ReportOrchestrator::from_settings(&settings, pool.clone()).await?);

    let request = ReportRequest {
        trading_date,
        client_id: args.client_id.clone(),
        market_data: input.market_data,
        news_items: input.news_items,
        macro_context: input.macro_context,
    };

    let run_result = orchestrator.generate_and_store_daily_report(request).await;

    match run_result {
        Ok(report) => {
            tracing::info!(
                client_id = %report.client_id,
                %trading_date,
                audio = report.audio_gcs_path.is_some(),
                tts_provider = report.tts_provider.as_deref().unwrap_or("none"),
                "persisted daily briefing"
            );
        }
        Err(err) => {
            let err = anyhow::Error::new(err);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(
                client_id = %args.client_id,
                %trading_date,
                error = %err,
                "daily briefing run failed"
            );
        }
    }

    let _ =
        daybrief_core::storage::lock::release_report_lock(&pool, &args.client_id, trading_date)
            .await;
    Ok(())
}

fn load_input(path: Option<&std::path::Path>) -> anyhow::Result<RunInput> {
    let Some(path) = path else {
        // No input file: the model works from an empty market snapshot.
        return Ok(RunInput {
            market_data: serde_json::json!({}),
            news_items: serde_json::Value::Null,
            macro_context: serde_json::Value::Null,
        });
    };

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("input file {} is not valid run input JSON", path.display()))
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
