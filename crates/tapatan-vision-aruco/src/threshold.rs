//! Frame binarisation: tile-adaptive, Otsu or fixed.

use serde::{Deserialize, Serialize};
use tapatan_vision_core::GrayImageView;

/// How the frame is split into dark (marker ink) and light pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    /// Local threshold per tile: the midpoint of the min/max over the tile
    /// and its eight neighbours. Tiles whose neighbourhood spans less than
    /// `min_range` take the threshold of adjacent tiles, or read light when
    /// none is in reach.
    Adaptive { tile_size: usize, min_range: u8 },
    /// Otsu's method over the whole frame histogram.
    Otsu,
    /// Pixels strictly below this value are dark.
    Fixed(u8),
}

impl Default for ThresholdMode {
    fn default() -> Self {
        Self::Adaptive {
            tile_size: 8,
            min_range: 24,
        }
    }
}

/// Dark-pixel mask of a frame. `threshold` is set for the global modes.
pub(crate) struct Binary {
    pub threshold: Option<u8>,
    pub dark: Vec<bool>,
}

pub(crate) fn binarize(img: &GrayImageView<'_>, mode: ThresholdMode) -> Binary {
    let threshold = match mode {
        ThresholdMode::Adaptive {
            tile_size,
            min_range,
        } => {
            return Binary {
                threshold: None,
                dark: TileThresholds::compute(img, tile_size, min_range).dark_mask(img),
            };
        }
        ThresholdMode::Fixed(t) => t,
        ThresholdMode::Otsu => {
            let mut hist = [0u32; 256];
            for &v in img.data {
                hist[v as usize] += 1;
            }
            otsu_threshold(&hist)
        }
    };
    let dark = img.data.iter().map(|&v| v < threshold).collect();
    Binary {
        threshold: Some(threshold),
        dark,
    }
}

#[derive(Clone, Copy, Debug)]
struct TileStats {
    min: u8,
    max: u8,
}

/// Per-tile thresholds; `valid[i]` is false for flat tiles nothing could
/// be propagated into.
struct TileThresholds {
    tile_size: usize,
    tiles_wide: usize,
    thresholds: Vec<u8>,
    valid: Vec<bool>,
}

impl TileThresholds {
    fn compute(img: &GrayImageView<'_>, tile_size: usize, min_range: u8) -> Self {
        let ts = tile_size.max(1);
        let tiles_wide = img.width.div_ceil(ts);
        let tiles_high = img.height.div_ceil(ts);

        let mut stats = vec![TileStats { min: 255, max: 0 }; tiles_wide * tiles_high];
        for (y, row) in img.data.chunks_exact(img.width.max(1)).enumerate().take(img.height) {
            let stats_row = &mut stats[(y / ts) * tiles_wide..(y / ts + 1) * tiles_wide];
            for (chunk, stat) in row.chunks(ts).zip(stats_row.iter_mut()) {
                for &p in chunk {
                    stat.min = stat.min.min(p);
                    stat.max = stat.max.max(p);
                }
            }
        }

        let mut thresholds = vec![0u8; stats.len()];
        let mut valid = vec![false; stats.len()];
        for ty in 0..tiles_high {
            for tx in 0..tiles_wide {
                let (mut nmin, mut nmax) = (255u8, 0u8);
                for (nx, ny) in neighbours(tx, ty, tiles_wide, tiles_high) {
                    let s = stats[ny * tiles_wide + nx];
                    nmin = nmin.min(s.min);
                    nmax = nmax.max(s.max);
                }
                let idx = ty * tiles_wide + tx;
                thresholds[idx] = ((u16::from(nmin) + u16::from(nmax)) / 2) as u8;
                valid[idx] = nmax.saturating_sub(nmin) >= min_range;
            }
        }

        // flat tiles inherit the mean threshold of valid neighbours
        for _ in 0..2 {
            for ty in 0..tiles_high {
                for tx in 0..tiles_wide {
                    let idx = ty * tiles_wide + tx;
                    if valid[idx] {
                        continue;
                    }
                    let (mut sum, mut count) = (0u32, 0u32);
                    for (nx, ny) in neighbours(tx, ty, tiles_wide, tiles_high) {
                        let n = ny * tiles_wide + nx;
                        if valid[n] {
                            sum += u32::from(thresholds[n]);
                            count += 1;
                        }
                    }
                    if count > 0 {
                        thresholds[idx] = (sum / count) as u8;
                        valid[idx] = true;
                    }
                }
            }
        }

        Self {
            tile_size: ts,
            tiles_wide,
            thresholds,
            valid,
        }
    }

    fn dark_mask(&self, img: &GrayImageView<'_>) -> Vec<bool> {
        img.data
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let (x, y) = (i % img.width, i / img.width);
                let t = (y / self.tile_size) * self.tiles_wide + x / self.tile_size;
                self.valid[t] && v < self.thresholds[t]
            })
            .collect()
    }
}

/// The tile itself and its in-bounds 8-neighbourhood.
fn neighbours(
    tx: usize,
    ty: usize,
    tiles_wide: usize,
    tiles_high: usize,
) -> impl Iterator<Item = (usize, usize)> {
    let xs = tx.saturating_sub(1)..=(tx + 1).min(tiles_wide - 1);
    let ys = ty.saturating_sub(1)..=(ty + 1).min(tiles_high - 1);
    ys.flat_map(move |y| xs.clone().map(move |x| (x, y)))
}

pub(crate) fn otsu_threshold_from_samples(samples: &[u8]) -> u8 {
    let mut hist = [0u32; 256];
    for &v in samples {
        hist[v as usize] += 1;
    }
    otsu_threshold(&hist)
}

/// Otsu threshold of a histogram.
///
/// A flat histogram returns its only value (nothing is strictly below it);
/// a two-level histogram returns the midpoint between the levels.
pub(crate) fn otsu_threshold(hist: &[u32; 256]) -> u8 {
    let occupied: Vec<usize> = (0..256).filter(|&i| hist[i] > 0).collect();
    let (Some(&lo), Some(&hi)) = (occupied.first(), occupied.last()) else {
        return 127;
    };
    if occupied.len() == 1 {
        return lo as u8;
    }
    if occupied.len() == 2 {
        return ((lo + hi) / 2) as u8;
    }

    let total: f64 = hist.iter().map(|&h| h as f64).sum();
    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum();

    let mut w_b = 0.0;
    let mut sum_b = 0.0;
    let mut best_var = -1.0;
    let mut best_t = 127u8;
    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }
        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;
        let var = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var > best_var {
            best_var = var;
            best_t = t as u8;
        }
    }
    best_t
}
