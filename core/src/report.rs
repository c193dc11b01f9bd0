//! Evidence capture for user reports.

use async_trait::async_trait;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use std::time::Duration;

use crate::error::{Error, Result};

/// One decoded frame of the partner's video, 8-bit RGBA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RgbaFrame {
    fn is_usable(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == self.width as usize * self.height as usize * 4
    }
}

/// Source of the remote video frame currently on screen.
#[async_trait]
pub trait FrameGrabber: Send + Sync {
    async fn capture_frame(&self) -> Result<RgbaFrame>;
}

/// For hosts that never render remote video.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFrames;

#[async_trait]
impl FrameGrabber for NoFrames {
    async fn capture_frame(&self) -> Result<RgbaFrame> {
        Err(Error::InvalidState("no remote video renderer".to_string()))
    }
}

pub fn encode_png(frame: &RgbaFrame) -> Result<Vec<u8>> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png).write_image(&frame.data, frame.width, frame.height, ColorType::Rgba8)?;
    Ok(png)
}

/// Try up to `attempts` times, `interval` apart, to grab a frame and encode
/// it as PNG. The video may not be decoding yet right after it starts, so
/// empty frames count as failures. Returns `None` when every attempt fails.
pub async fn capture_evidence(
    grabber: &dyn FrameGrabber,
    attempts: u32,
    interval: Duration,
) -> Option<Vec<u8>> {
    for attempt in 1..=attempts {
        match grabber.capture_frame().await {
            Ok(frame) if frame.is_usable() => match encode_png(&frame) {
                Ok(png) => {
                    tracing::debug!(attempt, bytes = png.len(), "Captured report frame");
                    return Some(png);
                }
                Err(e) => tracing::warn!(attempt, error = %e, "Failed to encode report frame"),
            },
            Ok(frame) => {
                tracing::debug!(attempt, width = frame.width, height = frame.height, "Video not ready");
            }
            Err(e) => tracing::debug!(attempt, error = %e, "Frame capture failed"),
        }

        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }

    tracing::warn!(attempts, "No video frame captured, reporting without evidence");
    None
}
