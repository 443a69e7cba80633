// src/pipeline/mod.rs
//
// Per-frame orchestration: obtain frame -> detect -> filter vehicles ->
// classify collisions -> throttle -> hand off the alert. One sequential
// loop owns the throttle state (single writer, no locking); dispatch is
// offloaded through the bounded queue and never blocks or fails the loop.
// A read or detector failure ends the session, no retries.

pub mod metrics;

use crate::capture::FrameSource;
use crate::collision;
use crate::detector::{class_name, filter_vehicles, Detector};
use crate::dispatch::{Alert, DispatcherHandle};
use crate::geometry::{ego_zone, BoundingBox};
use crate::throttle::ThrottleState;
use crate::types::Config;
use self::metrics::PipelineMetrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

const PROGRESS_LOG_INTERVAL: u64 = 150;

#[derive(Debug)]
pub struct SessionStats {
    pub total_frames: u64,
    pub vehicles_detected: u64,
    pub ego_collisions: u64,
    pub inter_vehicle_collisions: u64,
    pub alerts_dispatched: u64,
    pub alerts_suppressed: u64,
    pub duration_secs: f64,
    pub avg_fps: f64,
}

pub fn run_session(
    source: &mut dyn FrameSource,
    detector: &mut dyn Detector,
    config: &Config,
    alerts: &DispatcherHandle,
    stop: &AtomicBool,
    metrics: &PipelineMetrics,
) -> SessionStats {
    let started = Instant::now();
    let mut throttle = ThrottleState::new(config.alert.cooldown_seconds * 1000.0);

    let mut zone = BoundingBox::new(0.0, 0.0, 0.0, 0.0);
    let mut zone_dims = (0usize, 0usize);

    let mut total_frames: u64 = 0;
    let mut vehicles_detected: u64 = 0;
    let mut ego_collisions: u64 = 0;
    let mut inter_vehicle_collisions: u64 = 0;
    let mut alerts_dispatched: u64 = 0;
    let mut alerts_suppressed: u64 = 0;

    info!("🚗 Accident monitoring started");

    loop {
        if stop.load(Ordering::SeqCst) {
            info!("🛑 Stop signal received, ending monitoring session");
            break;
        }

        let frame = match source.read() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("End of stream");
                break;
            }
            Err(e) => {
                error!("Frame read failed, ending session: {:#}", e);
                break;
            }
        };

        total_frames += 1;
        metrics.inc(&metrics.total_frames);

        if zone_dims != (frame.width, frame.height) {
            zone = ego_zone(frame.width, frame.height, &config.zone);
            zone_dims = (frame.width, frame.height);
            info!(
                "📐 Ego zone ({:.0},{:.0})-({:.0},{:.0}) for {}x{} frames",
                zone.x1, zone.y1, zone.x2, zone.y2, frame.width, frame.height
            );
        }

        let detect_start = Instant::now();
        let detections = match detector.detect(&frame) {
            Ok(detections) => detections,
            Err(e) => {
                error!("Detector failed, ending session: {:#}", e);
                break;
            }
        };
        metrics.set_timing(
            &metrics.detect_time_us,
            detect_start.elapsed().as_micros() as u64,
        );

        if !detections.is_empty() {
            debug!(
                "Frame {}: {} detection(s): {}",
                total_frames,
                detections.len(),
                detections
                    .iter()
                    .map(|d| class_name(d.class_id))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        let vehicles = filter_vehicles(&detections, &config.detection);
        if !vehicles.is_empty() {
            metrics.inc(&metrics.frames_with_vehicles);
            vehicles_detected += vehicles.len() as u64;
        }

        let events = collision::classify(&vehicles, &zone, config.collision.overlap_threshold);
        for event in &events {
            match event {
                collision::CollisionEvent::EgoCollision { .. } => {
                    ego_collisions += 1;
                    metrics.inc(&metrics.ego_collisions);
                }
                collision::CollisionEvent::InterVehicleCollision { .. } => {
                    inter_vehicle_collisions += 1;
                    metrics.inc(&metrics.inter_vehicle_collisions);
                }
            }
        }

        let now_ms = started.elapsed().as_secs_f64() * 1000.0;
        let (next_state, decision) = throttle.decide(&events, now_ms);
        throttle = next_state;

        match decision {
            Some(event) => {
                warn!(
                    "🚨 {} (overlap {:.2}) at {:.1}s, dispatching alert",
                    event.kind(),
                    event.overlap(),
                    now_ms / 1000.0
                );
                if alerts.submit(Alert::from_event(event, now_ms)) {
                    alerts_dispatched += 1;
                    metrics.inc(&metrics.alerts_dispatched);
                } else {
                    metrics.inc(&metrics.alerts_dropped);
                }
            }
            None if !events.is_empty() => {
                alerts_suppressed += 1;
                metrics.inc(&metrics.alerts_suppressed);
                debug!(
                    "⏳ {} candidate(s) inside cooldown window, suppressed",
                    events.len()
                );
            }
            None => {}
        }

        if total_frames % PROGRESS_LOG_INTERVAL == 0 {
            info!(
                "Progress: frame {} | vehicles seen: {} | alerts: {} | {:.1} FPS",
                total_frames,
                vehicles_detected,
                alerts_dispatched,
                metrics.fps()
            );
        }
    }

    let duration = started.elapsed();
    let avg_fps = if duration.as_secs_f64() > 0.0 {
        total_frames as f64 / duration.as_secs_f64()
    } else {
        0.0
    };

    info!("📊 Session report:");
    info!("  Total frames: {}", total_frames);
    info!("  Vehicles detected: {}", vehicles_detected);
    info!("  🚧 Ego collisions: {}", ego_collisions);
    info!("  🚙 Inter-vehicle collisions: {}", inter_vehicle_collisions);
    info!("  🚨 Alerts dispatched: {}", alerts_dispatched);
    info!("  🔕 Alerts suppressed by cooldown: {}", alerts_suppressed);
    info!("  Processing speed: {:.1} FPS", avg_fps);

    SessionStats {
        total_frames,
        vehicles_detected,
        ego_collisions,
        inter_vehicle_collisions,
        alerts_dispatched,
        alerts_suppressed,
        duration_secs: duration.as_secs_f64(),
        avg_fps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FrameSource;
    use crate::detector::{Detection, Detector};
    use crate::dispatch::DispatcherHandle;
    use crate::types::Frame;
    use anyhow::Result;
    use std::collections::VecDeque;

    struct ScriptedSource {
        frames: VecDeque<Result<Option<Frame>>>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<Result<Option<Frame>>>) -> Self {
            Self {
                frames: frames.into(),
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn read(&mut self) -> Result<Option<Frame>> {
            self.frames.pop_front().unwrap_or(Ok(None))
        }
    }

    struct ScriptedDetector {
        responses: VecDeque<Result<Vec<Detection>>>,
    }

    impl ScriptedDetector {
        fn new(responses: Vec<Result<Vec<Detection>>>) -> Self {
            Self {
                responses: responses.into(),
            }
        }
    }

    impl Detector for ScriptedDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            self.responses.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn frame(width: usize, height: usize) -> Frame {
        Frame {
            data: Vec::new(),
            width,
            height,
            timestamp_ms: 0.0,
        }
    }

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, class_id: u32, confidence: f32) -> Detection {
        Detection {
            bbox: crate::geometry::BoundingBox::new(x1, y1, x2, y2),
            class_id,
            confidence,
        }
    }

    fn run(
        source: Vec<Result<Option<Frame>>>,
        responses: Vec<Result<Vec<Detection>>>,
        config: &Config,
    ) -> (SessionStats, tokio::sync::mpsc::Receiver<Alert>) {
        let mut source = ScriptedSource::new(source);
        let mut detector = ScriptedDetector::new(responses);
        let (handle, rx) = DispatcherHandle::channel(config.alert.queue_capacity);
        let stop = AtomicBool::new(false);
        let metrics = PipelineMetrics::new();
        let stats = run_session(
            &mut source,
            &mut detector,
            config,
            &handle,
            &stop,
            &metrics,
        );
        (stats, rx)
    }

    #[test]
    fn inter_vehicle_overlap_dispatches_exactly_one_alert() {
        // Two confident cars at overlap 0.4, nowhere near the ego zone of a
        // 200x200 frame (zone is (60,120)-(140,190)). Two identical frames:
        // the first dispatches, the second lands inside the 5s cooldown.
        let config = Config::default();
        let dets = vec![
            det(0.0, 0.0, 50.0, 50.0, 2, 0.9),
            det(30.0, 0.0, 80.0, 50.0, 2, 0.8),
        ];

        let (stats, mut rx) = run(
            vec![Ok(Some(frame(200, 200))), Ok(Some(frame(200, 200)))],
            vec![Ok(dets.clone()), Ok(dets)],
            &config,
        );

        assert_eq!(stats.total_frames, 2);
        assert_eq!(stats.inter_vehicle_collisions, 2);
        assert_eq!(stats.ego_collisions, 0);
        assert_eq!(stats.alerts_dispatched, 1);
        assert_eq!(stats.alerts_suppressed, 1);

        let alert = rx.try_recv().expect("one alert should be queued");
        assert_eq!(alert.kind, "INTER_VEHICLE_COLLISION");
        assert!(rx.try_recv().is_err(), "no second alert");
    }

    #[test]
    fn filtered_detections_never_produce_events() {
        // A person at high confidence and a low-confidence car, both parked
        // squarely inside the ego zone, neither may reach the classifier
        let config = Config::default();
        let dets = vec![
            det(60.0, 120.0, 140.0, 190.0, 0, 0.99),
            det(60.0, 120.0, 140.0, 190.0, 2, 0.5),
        ];

        let (stats, mut rx) = run(
            vec![Ok(Some(frame(200, 200)))],
            vec![Ok(dets)],
            &config,
        );

        assert_eq!(stats.ego_collisions, 0);
        assert_eq!(stats.alerts_dispatched, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn read_failure_ends_the_session() {
        let config = Config::default();
        let (stats, _rx) = run(
            vec![
                Ok(Some(frame(200, 200))),
                Err(anyhow::anyhow!("device disconnected")),
                Ok(Some(frame(200, 200))),
            ],
            vec![Ok(Vec::new())],
            &config,
        );
        assert_eq!(stats.total_frames, 1);
    }

    #[test]
    fn detector_failure_ends_the_session() {
        let config = Config::default();
        let (stats, mut rx) = run(
            vec![Ok(Some(frame(200, 200))), Ok(Some(frame(200, 200)))],
            vec![Err(anyhow::anyhow!("inference backend crashed"))],
            &config,
        );
        assert_eq!(stats.total_frames, 1);
        assert_eq!(stats.alerts_dispatched, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn zone_recomputes_when_frame_dimensions_change() {
        // Frame 1 is 200x200 (zone (60,120)-(140,190)) with no detections.
        // Frame 2 is 400x400, and the vehicle fills that frame's zone
        // (120,240)-(280,390) exactly, it only registers as an ego
        // collision if the zone followed the new dimensions.
        let config = Config::default();
        let (stats, mut rx) = run(
            vec![Ok(Some(frame(200, 200))), Ok(Some(frame(400, 400)))],
            vec![
                Ok(Vec::new()),
                Ok(vec![det(120.0, 240.0, 280.0, 390.0, 2, 0.9)]),
            ],
            &config,
        );

        assert_eq!(stats.ego_collisions, 1);
        assert_eq!(stats.alerts_dispatched, 1);
        let alert = rx.try_recv().unwrap();
        assert_eq!(alert.kind, "EGO_COLLISION");
    }

    #[test]
    fn stop_flag_ends_the_session_before_reading() {
        let config = Config::default();
        let mut source = ScriptedSource::new(vec![Ok(Some(frame(200, 200)))]);
        let mut detector = ScriptedDetector::new(vec![]);
        let (handle, _rx) = DispatcherHandle::channel(4);
        let stop = AtomicBool::new(true);
        let metrics = PipelineMetrics::new();

        let stats = run_session(
            &mut source,
            &mut detector,
            &config,
            &handle,
            &stop,
            &metrics,
        );
        assert_eq!(stats.total_frames, 0);
    }

    #[test]
    fn full_queue_drops_alert_but_keeps_monitoring() {
        // Cooldown 0 makes every overlapping frame dispatch-eligible; with
        // a single-slot queue and nobody draining it, the second alert is
        // dropped while the loop keeps running to end-of-stream.
        let mut config = Config::default();
        config.alert.cooldown_seconds = 0.0;
        config.alert.queue_capacity = 1;

        let dets = vec![
            det(0.0, 0.0, 50.0, 50.0, 2, 0.9),
            det(30.0, 0.0, 80.0, 50.0, 2, 0.8),
        ];

        let (stats, mut rx) = run(
            vec![
                Ok(Some(frame(200, 200))),
                Ok(Some(frame(200, 200))),
                Ok(Some(frame(200, 200))),
            ],
            vec![Ok(dets.clone()), Ok(dets.clone()), Ok(dets)],
            &config,
        );

        assert_eq!(stats.total_frames, 3);
        assert_eq!(stats.alerts_dispatched, 1);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
