// src/pipeline/metrics.rs
//
// Production observability. Counters for every stage of the frame loop
// and the dispatch workers, exported as a summary through the control
// surface's status endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct PipelineMetrics {
    pub total_frames: AtomicU64,
    pub frames_with_vehicles: AtomicU64,
    pub ego_collisions: AtomicU64,
    pub inter_vehicle_collisions: AtomicU64,
    pub alerts_dispatched: AtomicU64,
    pub alerts_suppressed: AtomicU64,
    pub alerts_dropped: AtomicU64,
    pub sms_successes: AtomicU64,
    pub sms_failures: AtomicU64,
    pub geo_failures: AtomicU64,
    pub detect_time_us: AtomicU64,
    pub started_at: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: AtomicU64::new(0),
            frames_with_vehicles: AtomicU64::new(0),
            ego_collisions: AtomicU64::new(0),
            inter_vehicle_collisions: AtomicU64::new(0),
            alerts_dispatched: AtomicU64::new(0),
            alerts_suppressed: AtomicU64::new(0),
            alerts_dropped: AtomicU64::new(0),
            sms_successes: AtomicU64::new(0),
            sms_failures: AtomicU64::new(0),
            geo_failures: AtomicU64::new(0),
            detect_time_us: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            fps: self.fps(),
            frames_with_vehicles: self.frames_with_vehicles.load(Ordering::Relaxed),
            ego_collisions: self.ego_collisions.load(Ordering::Relaxed),
            inter_vehicle_collisions: self.inter_vehicle_collisions.load(Ordering::Relaxed),
            alerts_dispatched: self.alerts_dispatched.load(Ordering::Relaxed),
            alerts_suppressed: self.alerts_suppressed.load(Ordering::Relaxed),
            alerts_dropped: self.alerts_dropped.load(Ordering::Relaxed),
            sms_successes: self.sms_successes.load(Ordering::Relaxed),
            sms_failures: self.sms_failures.load(Ordering::Relaxed),
            geo_failures: self.geo_failures.load(Ordering::Relaxed),
            last_detect_us: self.detect_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub fps: f64,
    pub frames_with_vehicles: u64,
    pub ego_collisions: u64,
    pub inter_vehicle_collisions: u64,
    pub alerts_dispatched: u64,
    pub alerts_suppressed: u64,
    pub alerts_dropped: u64,
    pub sms_successes: u64,
    pub sms_failures: u64,
    pub geo_failures: u64,
    pub last_detect_us: u64,
    pub elapsed_secs: f64,
}
