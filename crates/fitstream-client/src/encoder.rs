//! RGB → JPEG for outbound frames.

use bytes::Bytes;
use fitstream_capture::RawFrame;
use fitstream_core::EncodedFrame;
use image::codecs::jpeg;
use image::{ExtendedColorType, ImageEncoder};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Frame buffer is {actual} bytes, expected {expected} for {width}x{height} RGB")]
    BadBuffer { width: u32, height: u32, expected: usize, actual: usize },

    #[error("JPEG encode failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

/// Baseline JPEG encoder at a fixed quality.
#[derive(Debug, Clone, Copy)]
pub struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    /// `quality` is clamped to 1..=100.
    pub fn new(quality: u8) -> Self {
        Self { quality: quality.clamp(1, 100) }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn encode(&self, frame: &RawFrame) -> Result<EncodedFrame, EncodeError> {
        let expected = frame.width as usize * frame.height as usize * 3;
        if frame.data.len() != expected || expected == 0 {
            return Err(EncodeError::BadBuffer {
                width: frame.width,
                height: frame.height,
                expected,
                actual: frame.data.len(),
            });
        }

        let mut out = Vec::with_capacity(expected / 8);
        jpeg::JpegEncoder::new_with_quality(&mut out, self.quality).write_image(
            &frame.data,
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        )?;

        Ok(EncodedFrame { data: Bytes::from(out), resolution: frame.resolution(), pts_ms: frame.pts_ms })
    }
}

impl Default for JpegEncoder {
    fn default() -> Self {
        Self::new(60)
    }
}
