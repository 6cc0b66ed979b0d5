//! Worker daemon: runs the job poll loop and serves the HTTP status
//! endpoints until interrupted.

mod routes;

use std::sync::Arc;

use log::{error, info};
use tracing_subscriber::EnvFilter;

use vidsift::analysis::{AnalysisStep, GeminiAnalyzer};
use vidsift::config::Settings;
use vidsift::db::{Database, SqliteJobStore, SqliteResultStore};
use vidsift::fetch::{BackoffPolicy, Fetcher, TimedTextSessionFactory, YtDlp};
use vidsift::worker::{JobProcessor, JobRunner};

fn init_tracing() {
    // Route `log` macro output from the library into tracing.
    let _ = tracing_log::LogTracer::init();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();

    info!("Starting vidsift-server v{}", env!("CARGO_PKG_VERSION"));

    let settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!("Configuration error: {}", e);
            return std::process::ExitCode::FAILURE;
        }
    };

    let db = match Database::open(&settings.database_path) {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return std::process::ExitCode::FAILURE;
        }
    };

    let jobs = Arc::new(SqliteJobStore::new(db.clone()));
    let results = Arc::new(SqliteResultStore::new(db));

    let ytdlp = Arc::new(YtDlp::new(settings.scratch_dir.clone()));
    let fetcher = Arc::new(Fetcher::new(
        ytdlp.clone(),
        Arc::new(TimedTextSessionFactory::new(settings.proxy_url.clone())),
        ytdlp.clone(),
        ytdlp,
        BackoffPolicy::default(),
        settings.preferred_languages.clone(),
        settings.transcript_retries,
    ));

    let analyzer = Arc::new(GeminiAnalyzer::new(
        settings.analyzer_base_url.clone(),
        settings.analyzer_api_key.clone(),
    ));
    let processor = Arc::new(JobProcessor::new(
        jobs.clone(),
        results,
        fetcher,
        AnalysisStep::new(analyzer),
    ));

    let runner = Arc::new(JobRunner::new(
        jobs.clone(),
        processor,
        settings.max_concurrent_jobs,
        settings.poll_interval,
    ));

    let runner_task = {
        let runner = runner.clone();
        tokio::spawn(async move { runner.run().await })
    };

    let app = routes::router(routes::AppState {
        runner: runner.clone(),
        jobs,
        api_key: settings.worker_api_key.clone(),
    });

    let listener = match tokio::net::TcpListener::bind(&settings.bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {}", settings.bind_addr, e);
            return std::process::ExitCode::FAILURE;
        }
    };
    info!("Listening on {}", settings.bind_addr);

    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
    });
    if let Err(e) = server.await {
        error!("Server error: {}", e);
    }

    runner.stop();
    if let Err(e) = runner_task.await {
        error!("Runner task failed: {}", e);
    }
    info!("Shutdown complete");
    std::process::ExitCode::SUCCESS
}
