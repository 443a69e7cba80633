use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub video: VideoConfig,
    pub detection: DetectionConfig,
    pub zone: ZoneConfig,
    pub collision: CollisionConfig,
    pub alert: AlertConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub device_index: i32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self { device_index: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub model_path: String,
    /// Detections at or below this confidence never count as vehicles
    pub confidence_threshold: f32,
    /// COCO class IDs promoted to vehicle status (2=car, 3=motorcycle, 5=bus, 7=truck)
    pub vehicle_class_ids: Vec<u32>,
    pub nms_iou_threshold: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: "models/yolov8n.onnx".to_string(),
            confidence_threshold: 0.5,
            vehicle_class_ids: vec![2, 3, 5, 7],
            nms_iou_threshold: 0.45,
        }
    }
}

/// Geometry of the ego vehicle's own footprint inside the frame.
/// All values are fractions of the frame dimensions except the bottom
/// margin, which is a fixed pixel inset from the frame's lower edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    pub x_start_ratio: f32,
    pub y_start_ratio: f32,
    pub x_end_ratio: f32,
    pub bottom_margin_px: f32,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            x_start_ratio: 0.30,
            y_start_ratio: 0.60,
            x_end_ratio: 0.70,
            bottom_margin_px: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    /// Overlap ratio above which two boxes count as colliding.
    /// Shared by the ego-zone test and the vehicle-pair test.
    pub overlap_threshold: f32,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Minimum seconds between two dispatched alerts, global across event kinds
    pub cooldown_seconds: f64,
    /// Bounded alert queue; when full, new alerts are dropped rather than queued
    pub queue_capacity: usize,
    /// Dispatch worker pool size
    pub workers: usize,
    /// Upper bound on each geolocation lookup and SMS send
    pub dispatch_timeout_seconds: u64,
    /// Text-to-speech binary invoked with the alert phrase as its argument
    pub speech_command: String,
    pub geolocation_url: String,
    pub sms: SmsConfig,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 5.0,
            queue_capacity: 16,
            workers: 2,
            dispatch_timeout_seconds: 10,
            speech_command: "espeak-ng".to_string(),
            geolocation_url: "http://ip-api.com/json".to_string(),
            sms: SmsConfig::default(),
        }
    }
}

/// Twilio credentials come from TWILIO_SID / TWILIO_AUTH_TOKEN in the
/// environment; only the phone numbers live in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub enabled: bool,
    pub from_number: String,
    pub to_number: String,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            from_number: String::new(),
            to_number: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "accident_detection=info,ort=warn".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub timestamp_ms: f64,
}
