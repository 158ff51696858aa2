//! Core types for the Tapatan board vision stack.
//!
//! This crate is small and purely geometric: caller-owned frame views,
//! grayscale conversion and the 4-point homography used
//! to read marker bits. It knows nothing about markers or boards.

mod frame;
mod homography;
mod image;
mod logger;

pub use frame::{Frame, FrameError, PixelFormat};
pub use homography::{homography_from_4pt, Homography};
pub use image::{GrayImage, GrayImageView};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_logging, LogConfig};
