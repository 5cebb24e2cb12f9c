mod api;
mod config;
mod diagnostics;
mod error;
mod grading;
mod judge;
mod metrics;
mod rate_limit;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::net::TcpListener;

use crate::{
    api::{AppState, routes},
    config::AppConfig,
    grading::{Grader, InMemoryAttemptStore},
    judge::{ExecutionClient, HttpJudgeTransport},
    metrics::MetricsRegistry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(&config::log_level_from_env());
    let config = AppConfig::from_env().context("failed to load configuration")?;

    let transport = HttpJudgeTransport::new(
        &config.judge.base_url,
        config.judge.api_key.clone(),
        config.judge.request_timeout,
    )
    .context("failed to build judge client")?;
    let client = ExecutionClient::new(Arc::new(transport), config.judge.client.clone());
    let grader = Grader::new(Arc::new(InMemoryAttemptStore::new(
        config.persistence_path.clone(),
    )));
    let metrics = Arc::new(MetricsRegistry::new());

    let app = routes(AppState::new(&config, client, grader, metrics));
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .context("failed to bind listener")?;
    let local = listener
        .local_addr()
        .unwrap_or(SocketAddr::from(([0, 0, 0, 0], 0)));
    tracing::info!(
        bind = %local,
        judge = %config.judge.base_url,
        language_id = config.judge.client.language_id,
        "judge runner ready"
    );

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .init();
}
