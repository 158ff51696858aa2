//! Caller-owned camera frames.
//!
//! A [`Frame`] borrows the raw pixel buffer for the duration of one call and
//! is never retained. Colour frames are reduced to 8-bit luminance before any
//! marker work happens.

use crate::{GrayImage, GrayImageView};

/// Channel layout of a raw frame buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Gray8,
    /// Interleaved blue, green, red (the usual camera driver layout).
    Bgr8,
    Rgb8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Bgr8 | PixelFormat::Rgb8 => 3,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame has zero size ({width}x{height})")]
    Empty { width: usize, height: usize },
    #[error("frame buffer holds {actual} bytes, expected {expected} for {width}x{height} {format:?}")]
    LengthMismatch {
        width: usize,
        height: usize,
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
}

/// Read-only view of one camera frame.
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    pub width: usize,
    pub height: usize,
    pub format: PixelFormat,
    pub data: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn new(width: usize, height: usize, format: PixelFormat, data: &'a [u8]) -> Self {
        Self {
            width,
            height,
            format,
            data,
        }
    }

    pub fn gray(width: usize, height: usize, data: &'a [u8]) -> Self {
        Self::new(width, height, PixelFormat::Gray8, data)
    }

    pub fn bgr(width: usize, height: usize, data: &'a [u8]) -> Self {
        Self::new(width, height, PixelFormat::Bgr8, data)
    }

    pub fn from_gray_image(img: &'a GrayImage) -> Self {
        Self::gray(img.width, img.height, &img.data)
    }

    /// Check dimensions against the buffer length.
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::Empty {
                width: self.width,
                height: self.height,
            });
        }
        let expected = self
            .width
            .checked_mul(self.height)
            .and_then(|n| n.checked_mul(self.format.channels()));
        match expected {
            Some(expected) if expected == self.data.len() => Ok(()),
            _ => Err(FrameError::LengthMismatch {
                width: self.width,
                height: self.height,
                format: self.format,
                expected: expected.unwrap_or(usize::MAX),
                actual: self.data.len(),
            }),
        }
    }

    /// Run `f` on a luminance view of the frame.
    ///
    /// Gray frames are borrowed as-is; colour frames are converted first.
    pub fn with_gray<R>(&self, f: impl FnOnce(&GrayImageView<'_>) -> R) -> Result<R, FrameError> {
        if self.format == PixelFormat::Gray8 {
            self.validate()?;
            let view = GrayImageView {
                width: self.width,
                height: self.height,
                data: self.data,
            };
            return Ok(f(&view));
        }
        let gray = self.to_gray()?;
        Ok(f(&gray.view()))
    }

    /// Validate and convert to an owned 8-bit luminance image.
    ///
    /// Uses the BT.601 weights in 14-bit fixed point, so gray values match
    /// common camera tooling bit for bit.
    pub fn to_gray(&self) -> Result<GrayImage, FrameError> {
        self.validate()?;
        let data = match self.format {
            PixelFormat::Gray8 => self.data.to_vec(),
            PixelFormat::Bgr8 => self
                .data
                .chunks_exact(3)
                .map(|px| luma(px[2], px[1], px[0]))
                .collect(),
            PixelFormat::Rgb8 => self
                .data
                .chunks_exact(3)
                .map(|px| luma(px[0], px[1], px[2]))
                .collect(),
        };
        Ok(GrayImage {
            width: self.width,
            height: self.height,
            data,
        })
    }
}

#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    ((R * r as u32 + G * g as u32 + B * b as u32 + (1 << 13)) >> 14) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgr_channels_are_weighted_in_blue_green_red_order() {
        // one pure-red and one pure-blue pixel, BGR layout
        let data = [0u8, 0, 255, 255, 0, 0];
        let gray = Frame::bgr(2, 1, &data).to_gray().expect("valid frame");
        assert_eq!(gray.data, vec![76, 29]);
    }

    #[test]
    fn white_stays_white() {
        let data = [255u8; 12];
        let gray = Frame::new(2, 2, PixelFormat::Rgb8, &data)
            .to_gray()
            .expect("valid frame");
        assert!(gray.data.iter().all(|&v| v == 255));
    }

    #[test]
    fn rejects_empty_and_short_buffers() {
        assert_eq!(
            Frame::gray(0, 10, &[]).validate(),
            Err(FrameError::Empty {
                width: 0,
                height: 10
            })
        );
        let short = [0u8; 11];
        assert!(matches!(
            Frame::bgr(2, 2, &short).to_gray(),
            Err(FrameError::LengthMismatch {
                expected: 12,
                actual: 11,
                ..
            })
        ));
    }
}
