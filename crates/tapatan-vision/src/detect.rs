//! `image`-crate adapters: decoded pictures in; frames, marker sheets and
//! debug overlays out.

use crate::{aruco, calib, core};
use ::image::{Rgb, RgbImage};
use nalgebra::Point2;
use std::path::Path;

const OUTLINE: Rgb<u8> = Rgb([0, 200, 0]);
const CORNER: Rgb<u8> = Rgb([0, 0, 255]);
const CENTER: Rgb<u8> = Rgb([0, 255, 0]);
const GRID_LINE: Rgb<u8> = Rgb([255, 200, 0]);
const CELL: Rgb<u8> = Rgb([255, 0, 0]);

/// Errors produced by the image helpers.
#[derive(thiserror::Error, Debug)]
pub enum ImageIoError {
    #[error(transparent)]
    Image(#[from] ::image::ImageError),
    #[error("marker id {id} is not in dictionary {dictionary}")]
    UnknownMarker { id: u32, dictionary: String },
    #[error("image dimensions {width}x{height} do not fit")]
    TooLarge { width: usize, height: usize },
}

/// Borrow an `image::GrayImage` as a calibration frame.
pub fn gray_frame(img: &::image::GrayImage) -> core::Frame<'_> {
    core::Frame::gray(img.width() as usize, img.height() as usize, img.as_raw())
}

/// Borrow an `image::RgbImage` as a calibration frame.
pub fn rgb_frame(img: &::image::RgbImage) -> core::Frame<'_> {
    core::Frame::new(
        img.width() as usize,
        img.height() as usize,
        core::PixelFormat::Rgb8,
        img.as_raw(),
    )
}

/// Convert an `image::GrayImage` into the owned core image.
pub fn to_core_gray(img: &::image::GrayImage) -> core::GrayImage {
    core::GrayImage {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw().clone(),
    }
}

/// Convert a core image back into an `image::GrayImage`.
pub fn from_core_gray(img: &core::GrayImage) -> Result<::image::GrayImage, ImageIoError> {
    let too_large = || ImageIoError::TooLarge {
        width: img.width,
        height: img.height,
    };
    let width = u32::try_from(img.width).map_err(|_| too_large())?;
    let height = u32::try_from(img.height).map_err(|_| too_large())?;
    ::image::GrayImage::from_raw(width, height, img.data.clone()).ok_or_else(too_large)
}

/// Decode any supported image file to 8-bit luminance.
pub fn load_gray(path: impl AsRef<Path>) -> Result<::image::GrayImage, ImageIoError> {
    Ok(::image::open(path)?.to_luma8())
}

/// Marker `id` with a white quiet zone of `quiet_px` on every side.
pub fn marker_image(
    dictionary: &aruco::Dictionary,
    id: u32,
    cell_px: usize,
    quiet_px: usize,
) -> Result<::image::GrayImage, ImageIoError> {
    let marker = aruco::draw_marker(dictionary, id, cell_px, 1).ok_or_else(|| {
        ImageIoError::UnknownMarker {
            id,
            dictionary: dictionary.name().to_string(),
        }
    })?;
    let mut sheet = core::GrayImage::filled(
        marker.width + 2 * quiet_px,
        marker.height + 2 * quiet_px,
        255,
    );
    sheet.blit(&marker, quiet_px as i64, quiet_px as i64);
    from_core_gray(&sheet)
}

/// Colour copy of `img` with each detection's outline, corners and center.
pub fn draw_detections<'a>(
    img: &::image::GrayImage,
    detections: impl IntoIterator<Item = &'a aruco::Detection>,
) -> RgbImage {
    let mut canvas = ::image::DynamicImage::ImageLuma8(img.clone()).to_rgb8();
    for det in detections {
        draw_marker_outline(&mut canvas, &det.corners, det.center);
    }
    canvas
}

/// Colour copy of `img` with the board lines, the nine cell centers and the
/// two reference markers of `result`. A failed result draws nothing.
pub fn draw_calibration(img: &::image::GrayImage, result: &calib::CalibrationResult) -> RgbImage {
    let mut canvas = ::image::DynamicImage::ImageLuma8(img.clone()).to_rgb8();
    if let Some(grid) = result.grid() {
        let px = |pos: usize| grid.position_to_pixel(pos);
        for a in 0..calib::GRID_SIZE {
            for b in 0..calib::GRID_SIZE - 1 {
                let row = (px(a * calib::GRID_SIZE + b), px(a * calib::GRID_SIZE + b + 1));
                let col = (px(b * calib::GRID_SIZE + a), px((b + 1) * calib::GRID_SIZE + a));
                for (p, q) in [row, col] {
                    if let (Some(p), Some(q)) = (p, q) {
                        draw_segment(&mut canvas, p, q, GRID_LINE);
                    }
                }
            }
        }
        for pos in 0..calib::CELL_COUNT {
            if let Some(p) = px(pos) {
                draw_disc(&mut canvas, p, 4, CELL);
            }
        }
    }
    if let Some(data) = &result.calibration {
        for marker in [&data.marker0, &data.marker1] {
            draw_marker_outline(&mut canvas, &marker.corners_px, marker.center_px);
        }
    }
    canvas
}

fn draw_marker_outline(canvas: &mut RgbImage, corners: &[Point2<f64>; 4], center: Point2<f64>) {
    for i in 0..4 {
        draw_segment(canvas, corners[i], corners[(i + 1) % 4], OUTLINE);
    }
    for &c in corners {
        draw_disc(canvas, c, 2, CORNER);
    }
    draw_disc(canvas, center, 3, CENTER);
}

fn put(canvas: &mut RgbImage, x: i64, y: i64, colour: Rgb<u8>) {
    if x >= 0 && y >= 0 && x < i64::from(canvas.width()) && y < i64::from(canvas.height()) {
        canvas.put_pixel(x as u32, y as u32, colour);
    }
}

fn draw_disc(canvas: &mut RgbImage, center: Point2<f64>, radius: i64, colour: Rgb<u8>) {
    let (cx, cy) = (center.x.round() as i64, center.y.round() as i64);
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put(canvas, cx + dx, cy + dy, colour);
            }
        }
    }
}

fn draw_segment(canvas: &mut RgbImage, a: Point2<f64>, b: Point2<f64>, colour: Rgb<u8>) {
    let d = b - a;
    let steps = d.x.abs().max(d.y.abs()).ceil().max(1.0) as usize;
    for i in 0..=steps {
        let p = a + d * (i as f64 / steps as f64);
        put(canvas, p.x.round() as i64, p.y.round() as i64, colour);
    }
}
