// src/main.rs

mod capture;
mod collision;
mod config;
mod detector;
mod dispatch;
mod geometry;
mod pipeline;
mod server;
mod throttle;
mod types;

use anyhow::Result;
use pipeline::metrics::PipelineMetrics;
use server::AppState;
use std::sync::Arc;
use tracing::info;
use types::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_or_default("config.yaml")?;

    tracing_subscriber::fmt()
        .with_env_filter(config.logging.level.clone())
        .init();

    info!("🚗 Accident Detection System Starting");
    info!("✓ Configuration loaded");
    info!(
        "Thresholds: overlap={:.2}, confidence={:.2}, cooldown={:.0}s",
        config.collision.overlap_threshold,
        config.detection.confidence_threshold,
        config.alert.cooldown_seconds
    );

    let metrics = Arc::new(PipelineMetrics::new());
    let dispatcher = dispatch::spawn(&config.alert, metrics.clone());
    let state = Arc::new(AppState::new(config, metrics, dispatcher));

    server::serve(state).await
}
