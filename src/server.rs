// src/server.rs
//
// Network control surface. Start/stop are trigger signals with immediate
// acknowledgements; the monitoring session itself runs on a blocking task
// and reports only through logs and the metrics summary. No request
// bodies, no authentication.

use crate::capture;
use crate::detector;
use crate::dispatch::{self, DispatcherHandle};
use crate::pipeline::metrics::{MetricsSummary, PipelineMetrics};
use crate::pipeline::{self, SessionStats};
use crate::types::Config;
use anyhow::Result;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

pub struct AppState {
    pub config: Config,
    pub metrics: Arc<PipelineMetrics>,
    pub dispatcher: DispatcherHandle,
    running: AtomicBool,
    stop: AtomicBool,
}

impl AppState {
    pub fn new(config: Config, metrics: Arc<PipelineMetrics>, dispatcher: DispatcherHandle) -> Self {
        Self {
            config,
            metrics,
            dispatcher,
            running: AtomicBool::new(false),
            stop: AtomicBool::new(false),
        }
    }
}

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/start_accident_detection", post(start_monitoring))
        .route("/stop_accident_detection", post(stop_monitoring))
        .with_state(state)
}

pub async fn serve(state: SharedState) -> Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🌐 Control surface listening on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: String,
    monitoring: bool,
    metrics: MetricsSummary,
}

#[derive(Debug, Serialize)]
struct AckResponse {
    message: String,
}

async fn status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let monitoring = state.running.load(Ordering::SeqCst);
    let status = if monitoring {
        "✅ Server running, monitoring active.".to_string()
    } else {
        "✅ Server running! POST /start_accident_detection to begin.".to_string()
    };
    Json(StatusResponse {
        status,
        monitoring,
        metrics: state.metrics.summary(),
    })
}

async fn start_monitoring(State(state): State<SharedState>) -> Json<AckResponse> {
    if state.running.swap(true, Ordering::SeqCst) {
        return Json(AckResponse {
            message: "⚠️ Accident detection already running".to_string(),
        });
    }
    state.stop.store(false, Ordering::SeqCst);

    dispatch::speak(
        &state.config.alert.speech_command,
        "Accident detection started.",
    );

    let app = state.clone();
    tokio::task::spawn_blocking(move || {
        match run_monitoring(&app) {
            Ok(stats) => info!(
                "✅ Monitoring session finished: {} frames, {} alert(s), {:.1}s",
                stats.total_frames, stats.alerts_dispatched, stats.duration_secs
            ),
            Err(e) => error!("❌ Monitoring session failed: {:#}", e),
        }
        app.running.store(false, Ordering::SeqCst);
    });

    Json(AckResponse {
        message: "✅ Accident detection started".to_string(),
    })
}

// Failures here (no camera, missing model, build without backends) surface
// in the logs only; the start acknowledgement has already gone out.
fn run_monitoring(app: &AppState) -> Result<SessionStats> {
    let mut source = capture::open_source(&app.config.video)?;
    let mut detector = detector::open_detector(&app.config.detection)?;
    Ok(pipeline::run_session(
        source.as_mut(),
        detector.as_mut(),
        &app.config,
        &app.dispatcher,
        &app.stop,
        &app.metrics,
    ))
}

async fn stop_monitoring(State(state): State<SharedState>) -> Json<AckResponse> {
    if !state.running.load(Ordering::SeqCst) {
        return Json(AckResponse {
            message: "ℹ️ Accident detection is not running".to_string(),
        });
    }
    state.stop.store(true, Ordering::SeqCst);
    Json(AckResponse {
        message: "🛑 Stop requested, monitoring ends after the current frame".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> SharedState {
        let metrics = Arc::new(PipelineMetrics::new());
        let (dispatcher, _rx) = DispatcherHandle::channel(4);
        Arc::new(AppState::new(Config::default(), metrics, dispatcher))
    }

    #[tokio::test]
    async fn status_reports_idle_server() {
        let state = test_state();
        let response = status(State(state)).await;
        assert!(!response.0.monitoring);
        assert!(response.0.status.contains("start_accident_detection"));
        assert_eq!(response.0.metrics.total_frames, 0);
    }

    #[tokio::test]
    async fn stop_without_session_is_a_no_op() {
        let state = test_state();
        let response = stop_monitoring(State(state.clone())).await;
        assert!(response.0.message.contains("not running"));
        assert!(!state.stop.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn stop_sets_the_cancellation_flag() {
        let state = test_state();
        state.running.store(true, Ordering::SeqCst);
        let response = stop_monitoring(State(state.clone())).await;
        assert!(response.0.message.contains("Stop requested"));
        assert!(state.stop.load(Ordering::SeqCst));
    }
}
