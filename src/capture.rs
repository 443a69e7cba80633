// src/capture.rs
//
// Frame acquisition seam. The pipeline pulls frames through the
// FrameSource trait at the device's natural rate. Ok(None) means the
// stream ended and Err means the read failed; both end the monitoring
// session, and dropping the source releases the device.

use crate::types::{Frame, VideoConfig};
use anyhow::Result;

pub trait FrameSource: Send {
    fn read(&mut self) -> Result<Option<Frame>>;
}

pub fn open_source(cfg: &VideoConfig) -> Result<Box<dyn FrameSource>> {
    #[cfg(feature = "capture-opencv")]
    {
        Ok(Box::new(CameraSource::open(cfg)?))
    }
    #[cfg(not(feature = "capture-opencv"))]
    {
        let _ = cfg;
        anyhow::bail!("built without a capture backend (enable the capture-opencv feature)")
    }
}

#[cfg(feature = "capture-opencv")]
pub use camera::CameraSource;

#[cfg(feature = "capture-opencv")]
mod camera {
    use super::FrameSource;
    use crate::types::{Frame, VideoConfig};
    use anyhow::Result;
    use opencv::{
        core::Mat,
        imgproc,
        prelude::*,
        videoio::{self, VideoCapture, VideoCaptureTraitConst},
    };
    use std::time::Instant;
    use tracing::info;

    /// Live camera source. Timestamps are wall-clock milliseconds since the
    /// device was opened, so the cooldown window downstream tracks real
    /// elapsed time rather than frame counts.
    pub struct CameraSource {
        cap: VideoCapture,
        opened_at: Instant,
    }

    impl CameraSource {
        pub fn open(cfg: &VideoConfig) -> Result<Self> {
            info!("Opening capture device {}", cfg.device_index);

            let cap = VideoCapture::new(cfg.device_index, videoio::CAP_ANY)?;
            if !cap.is_opened()? {
                anyhow::bail!("failed to open capture device {}", cfg.device_index);
            }

            let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
            let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as i32;
            let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as i32;
            info!(
                "Capture device ready: {}x{} @ {:.1} FPS",
                width, height, fps
            );

            Ok(Self {
                cap,
                opened_at: Instant::now(),
            })
        }
    }

    impl FrameSource for CameraSource {
        fn read(&mut self) -> Result<Option<Frame>> {
            use opencv::videoio::VideoCaptureTrait;

            let mut mat = Mat::default();
            if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
                return Ok(None);
            }

            let mut rgb = Mat::default();
            imgproc::cvt_color(&mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

            // Dimensions come from the decoded frame, not the configured
            // props; some drivers renegotiate the format mid-stream
            let width = rgb.cols() as usize;
            let height = rgb.rows() as usize;
            let data = rgb.data_bytes()?.to_vec();

            Ok(Some(Frame {
                data,
                width,
                height,
                timestamp_ms: self.opened_at.elapsed().as_secs_f64() * 1000.0,
            }))
        }
    }
}
