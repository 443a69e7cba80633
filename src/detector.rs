// src/detector.rs
//
// Object-detection seam. The pipeline only sees the Detector trait and the
// raw Detection records it returns; class filtering and confidence gating
// happen downstream, so the backend stays a dumb sensor.

use crate::geometry::BoundingBox;
use crate::types::{DetectionConfig, Frame};
use anyhow::Result;

/// One raw detector output, before any vehicle-class or confidence filtering
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_id: u32,
    pub confidence: f32,
}

pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

pub fn class_name(class_id: u32) -> &'static str {
    match class_id {
        2 => "car",
        3 => "motorcycle",
        5 => "bus",
        7 => "truck",
        _ => "object",
    }
}

/// Promote raw detections to vehicle boxes: allowed class AND confidence
/// strictly above the threshold. Everything else never reaches the
/// classifier.
pub fn filter_vehicles(detections: &[Detection], cfg: &DetectionConfig) -> Vec<BoundingBox> {
    detections
        .iter()
        .filter(|d| {
            cfg.vehicle_class_ids.contains(&d.class_id) && d.confidence > cfg.confidence_threshold
        })
        .map(|d| d.bbox)
        .collect()
}

pub fn open_detector(cfg: &DetectionConfig) -> Result<Box<dyn Detector>> {
    #[cfg(feature = "detector-onnx")]
    {
        Ok(Box::new(OnnxDetector::new(
            &cfg.model_path,
            cfg.nms_iou_threshold,
        )?))
    }
    #[cfg(not(feature = "detector-onnx"))]
    {
        let _ = cfg;
        anyhow::bail!("built without a detector backend (enable the detector-onnx feature)")
    }
}

#[cfg(feature = "detector-onnx")]
pub use onnx::OnnxDetector;

#[cfg(feature = "detector-onnx")]
mod onnx {
    use super::{Detection, Detector};
    use crate::geometry::BoundingBox;
    use crate::types::Frame;
    use anyhow::Result;
    use ort::session::{builder::GraphOptimizationLevel, Session};
    use tracing::{debug, info};

    const INPUT_SIZE: usize = 640;

    /// Candidates below this are dropped during decode. The real confidence
    /// gate lives in the pipeline; this floor just keeps NMS cheap.
    const DECODE_CONFIDENCE_FLOOR: f32 = 0.10;

    /// YOLOv8 backend via ONNX Runtime. Letterboxes the RGB frame into the
    /// model's square input, decodes the [1, 4+classes, preds] output back
    /// into frame coordinates, and suppresses duplicates with NMS.
    pub struct OnnxDetector {
        session: Session,
        nms_iou: f32,
    }

    impl OnnxDetector {
        pub fn new(model_path: &str, nms_iou: f32) -> Result<Self> {
            info!("Loading detection model: {}", model_path);

            let session = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .with_intra_threads(4)?
                .commit_from_file(model_path)?;

            info!("✓ Detection model ready");
            Ok(Self { session, nms_iou })
        }

        /// Scale-preserving resize onto a gray canvas, HWC u8 -> CHW f32.
        /// Nearest-neighbour sampling is adequate for detector input.
        fn letterbox(&self, frame: &Frame) -> (Vec<f32>, f32, f32, f32) {
            let scale = (INPUT_SIZE as f32 / frame.width as f32)
                .min(INPUT_SIZE as f32 / frame.height as f32);
            let scaled_w = (frame.width as f32 * scale) as usize;
            let scaled_h = (frame.height as f32 * scale) as usize;
            let pad_x = (INPUT_SIZE - scaled_w) as f32 / 2.0;
            let pad_y = (INPUT_SIZE - scaled_h) as f32 / 2.0;

            let plane = INPUT_SIZE * INPUT_SIZE;
            let mut input = vec![114.0 / 255.0; 3 * plane];

            for y in 0..scaled_h {
                let sy = ((y as f32 / scale) as usize).min(frame.height - 1);
                let dy = y + pad_y as usize;
                for x in 0..scaled_w {
                    let sx = ((x as f32 / scale) as usize).min(frame.width - 1);
                    let src = (sy * frame.width + sx) * 3;
                    let dst = dy * INPUT_SIZE + x + pad_x as usize;
                    for c in 0..3 {
                        input[c * plane + dst] = frame.data[src + c] as f32 / 255.0;
                    }
                }
            }

            (input, scale, pad_x, pad_y)
        }

        fn decode(
            &self,
            dims: &[usize],
            output: &[f32],
            scale: f32,
            pad_x: f32,
            pad_y: f32,
        ) -> Vec<Detection> {
            // Output layout: [1, 4 + num_classes, num_preds], attribute-major
            let attrs = dims[1];
            let preds = dims[2];
            let classes = attrs - 4;

            let mut detections = Vec::new();

            for i in 0..preds {
                let mut best_class = 0;
                let mut best_conf = 0.0f32;
                for c in 0..classes {
                    let conf = output[(4 + c) * preds + i];
                    if conf > best_conf {
                        best_conf = conf;
                        best_class = c;
                    }
                }
                if best_conf < DECODE_CONFIDENCE_FLOOR {
                    continue;
                }

                let cx = output[i];
                let cy = output[preds + i];
                let w = output[2 * preds + i];
                let h = output[3 * preds + i];

                // Center format -> corners, then reverse the letterbox
                let x1 = (cx - w / 2.0 - pad_x) / scale;
                let y1 = (cy - h / 2.0 - pad_y) / scale;
                let x2 = (cx + w / 2.0 - pad_x) / scale;
                let y2 = (cy + h / 2.0 - pad_y) / scale;

                detections.push(Detection {
                    bbox: BoundingBox::new(x1, y1, x2, y2),
                    class_id: best_class as u32,
                    confidence: best_conf,
                });
            }

            nms(detections, self.nms_iou)
        }
    }

    impl Detector for OnnxDetector {
        fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
            let (input, scale, pad_x, pad_y) = self.letterbox(frame);

            let shape = [1usize, 3, INPUT_SIZE, INPUT_SIZE];
            let value =
                ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

            let outputs = self.session.run(ort::inputs!["images" => value])?;
            let (out_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
            let dims: Vec<usize> = out_shape.iter().map(|d| *d as usize).collect();

            let detections = self.decode(&dims, data, scale, pad_x, pad_y);
            debug!("{} detections after NMS", detections.len());
            Ok(detections)
        }
    }

    fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
        detections.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut keep: Vec<Detection> = Vec::new();
        'outer: for det in detections {
            for kept in &keep {
                if iou(&det.bbox, &kept.bbox) >= iou_threshold {
                    continue 'outer;
                }
            }
            keep.push(det);
        }
        keep
    }

    // Union-based IoU is correct for duplicate suppression inside the
    // detector; the min-area overlap ratio belongs to collision inference
    // only.
    fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
        let ix1 = a.x1.max(b.x1);
        let iy1 = a.y1.max(b.y1);
        let ix2 = a.x2.min(b.x2);
        let iy2 = a.y2.min(b.y2);

        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = a.area() + b.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}
