// src/dispatch.rs
//
// Alert dispatch façade: speech synthesis, geolocation lookup, SMS
// delivery. A fixed worker pool drains a bounded queue so the frame loop
// never blocks on, or learns about, a slow or failing dispatch. Every
// external call is wrapped in an explicit timeout; failures are logged and
// counted, never propagated.

use crate::collision::CollisionEvent;
use crate::pipeline::metrics::PipelineMetrics;
use crate::types::{AlertConfig, SmsConfig};
use anyhow::Result;
use serde::Deserialize;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Everything a worker needs to deliver one alert. Built by the frame loop
/// at dispatch time; the originating CollisionEvent itself never leaves
/// the frame.
#[derive(Debug, Clone)]
pub struct Alert {
    pub kind: &'static str,
    pub speech: &'static str,
    pub sms_subject: &'static str,
    pub overlap: f32,
    pub timestamp_ms: f64,
}

impl Alert {
    pub fn from_event(event: &CollisionEvent, timestamp_ms: f64) -> Self {
        Self {
            kind: event.kind(),
            speech: event.speech_text(),
            sms_subject: event.sms_subject(),
            overlap: event.overlap(),
            timestamp_ms,
        }
    }
}

#[derive(Debug)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<Alert>,
}

impl DispatcherHandle {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Alert>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Fire-and-forget hand-off. Returns false when the alert was dropped
    /// (queue full or workers gone); callers may count that, but must not
    /// retry or block.
    pub fn submit(&self, alert: Alert) -> bool {
        match self.tx.try_send(alert) {
            Ok(()) => true,
            Err(TrySendError::Full(alert)) => {
                warn!("Alert queue full, dropping {} alert", alert.kind);
                false
            }
            Err(TrySendError::Closed(alert)) => {
                warn!("Alert workers gone, dropping {} alert", alert.kind);
                false
            }
        }
    }
}

struct DispatchContext {
    speech_command: String,
    timeout: Duration,
    geo: GeoLocator,
    sms: Option<SmsClient>,
    metrics: Arc<PipelineMetrics>,
}

/// Spawn the worker pool and return the queue handle. Must be called from
/// within the tokio runtime.
pub fn spawn(cfg: &AlertConfig, metrics: Arc<PipelineMetrics>) -> DispatcherHandle {
    let (handle, rx) = DispatcherHandle::channel(cfg.queue_capacity);
    let timeout = Duration::from_secs(cfg.dispatch_timeout_seconds);

    let ctx = Arc::new(DispatchContext {
        speech_command: cfg.speech_command.clone(),
        timeout,
        geo: GeoLocator::new(&cfg.geolocation_url, timeout),
        sms: SmsClient::from_env(&cfg.sms, timeout),
        metrics,
    });

    let workers = cfg.workers.max(1);
    let rx = Arc::new(Mutex::new(rx));
    for worker_id in 0..workers {
        tokio::spawn(worker_loop(worker_id, rx.clone(), ctx.clone()));
    }

    info!(
        "✓ Alert dispatcher ready ({} workers, queue capacity {})",
        workers,
        cfg.queue_capacity.max(1)
    );
    handle
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Alert>>>,
    ctx: Arc<DispatchContext>,
) {
    loop {
        let alert = { rx.lock().await.recv().await };
        let Some(alert) = alert else {
            debug!("Dispatch worker {} shutting down", worker_id);
            break;
        };
        handle_alert(worker_id, alert, &ctx).await;
    }
}

async fn handle_alert(worker_id: usize, alert: Alert, ctx: &DispatchContext) {
    info!(
        "📣 Worker {}: dispatching {} alert (overlap {:.2}, t={:.1}s)",
        worker_id,
        alert.kind,
        alert.overlap,
        alert.timestamp_ms / 1000.0
    );

    speak(&ctx.speech_command, alert.speech);

    let location = match tokio::time::timeout(ctx.timeout, ctx.geo.resolve()).await {
        Ok(location) => location,
        Err(_) => {
            warn!("⏱️ Geolocation lookup timed out");
            None
        }
    };
    match location {
        Some((lat, lon)) => info!("📍 Current location: {:.5}, {:.5}", lat, lon),
        None => ctx.metrics.inc(&ctx.metrics.geo_failures),
    }

    // A failed lookup degrades the message, never suppresses the alert
    let body = sms_body(alert.sms_subject, location);

    match &ctx.sms {
        Some(sms) => match tokio::time::timeout(ctx.timeout, sms.send(&body)).await {
            Ok(Ok(())) => {
                info!("✅ SMS sent");
                ctx.metrics.inc(&ctx.metrics.sms_successes);
            }
            Ok(Err(e)) => {
                warn!("❌ SMS failed: {}", e);
                ctx.metrics.inc(&ctx.metrics.sms_failures);
            }
            Err(_) => {
                warn!("⏱️ SMS send timed out");
                ctx.metrics.inc(&ctx.metrics.sms_failures);
            }
        },
        None => info!("📨 SMS delivery not configured; alert body: {}", body),
    }
}

fn sms_body(subject: &str, location: Option<(f64, f64)>) -> String {
    match location {
        Some((lat, lon)) => format!(
            "🚨 {} Location: https://www.google.com/maps?q={},{}",
            subject, lat, lon
        ),
        None => format!("🚨 {} Location unavailable.", subject),
    }
}

/// Hand the phrase to the TTS binary and return immediately. A missing
/// binary costs a warning, nothing more.
pub fn speak(command: &str, text: &str) {
    let spawned = std::process::Command::new(command)
        .arg(text)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    match spawned {
        Ok(mut child) => {
            // Reap the child off-thread so it never becomes a zombie
            std::thread::spawn(move || {
                let _ = child.wait();
            });
        }
        Err(e) => warn!("🔇 Speech synthesis unavailable ({}): {}", command, e),
    }
}

// ============================================================================
// GEOLOCATION
// ============================================================================

struct GeoLocator {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct IpGeoResponse {
    status: String,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
}

impl GeoLocator {
    fn new(url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            url: url.to_string(),
        }
    }

    async fn resolve(&self) -> Option<(f64, f64)> {
        let resp = match self.client.get(&self.url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Geolocation request failed: {}", e);
                return None;
            }
        };

        let parsed: IpGeoResponse = match resp.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Geolocation response malformed: {}", e);
                return None;
            }
        };

        if parsed.status != "success" {
            warn!("Geolocation lookup rejected: {}", parsed.status);
            return None;
        }
        parsed.lat.zip(parsed.lon)
    }
}

// ============================================================================
// SMS (Twilio REST)
// ============================================================================

struct SmsClient {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    to_number: String,
}

impl SmsClient {
    fn from_env(cfg: &SmsConfig, timeout: Duration) -> Option<Self> {
        if !cfg.enabled {
            info!("📨 SMS delivery disabled in config");
            return None;
        }

        let (sid, token) = match (
            std::env::var("TWILIO_SID"),
            std::env::var("TWILIO_AUTH_TOKEN"),
        ) {
            (Ok(sid), Ok(token)) => (sid, token),
            _ => {
                warn!("📨 TWILIO_SID / TWILIO_AUTH_TOKEN not set, SMS delivery disabled");
                return None;
            }
        };

        if cfg.from_number.is_empty() || cfg.to_number.is_empty() {
            warn!("📨 SMS phone numbers not configured, SMS delivery disabled");
            return None;
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Some(Self {
            client,
            account_sid: sid,
            auth_token: token,
            from_number: cfg.from_number.clone(),
            to_number: cfg.to_number.clone(),
        })
    }

    async fn send(&self, body: &str) -> Result<()> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );

        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", self.to_number.as_str()),
                ("From", self.from_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {}: {}", status, text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    #[test]
    fn alert_carries_event_wording() {
        let event = CollisionEvent::EgoCollision {
            vehicle: BoundingBox::new(50.0, 60.0, 90.0, 100.0),
            overlap: 0.5,
        };
        let alert = Alert::from_event(&event, 1234.0);
        assert_eq!(alert.kind, "EGO_COLLISION");
        assert_eq!(alert.speech, "Accident detected with our car.");
        assert_eq!(alert.sms_subject, "Accident detected with OUR CAR!");
        assert_eq!(alert.overlap, 0.5);
        assert_eq!(alert.timestamp_ms, 1234.0);
    }

    #[test]
    fn sms_body_includes_maps_link_when_located() {
        let body = sms_body("Accident detected between vehicles!", Some((12.97, 77.59)));
        assert!(body.contains("https://www.google.com/maps?q=12.97,77.59"));
        assert!(body.starts_with("🚨 Accident detected between vehicles!"));
    }

    #[test]
    fn sms_body_degrades_without_location() {
        let body = sms_body("Accident detected with OUR CAR!", None);
        assert!(body.ends_with("Location unavailable."));
        assert!(!body.contains("maps"));
    }

    #[test]
    fn submit_drops_on_full_queue_without_blocking() {
        let event = CollisionEvent::InterVehicleCollision {
            first: BoundingBox::new(0.0, 0.0, 50.0, 50.0),
            second: BoundingBox::new(30.0, 0.0, 80.0, 50.0),
            overlap: 0.4,
        };
        let (handle, mut rx) = DispatcherHandle::channel(1);

        assert!(handle.submit(Alert::from_event(&event, 0.0)));
        assert!(!handle.submit(Alert::from_event(&event, 1.0)));

        // Only the first alert made it through
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
