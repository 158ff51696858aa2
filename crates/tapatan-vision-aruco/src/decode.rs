//! Reading marker bits from an image quad.

use crate::threshold::otsu_threshold_from_samples;
use crate::Matcher;
use nalgebra::Point2;
use tapatan_vision_core::{homography_from_4pt, GrayImageView, Homography};

/// Result of decoding one quad against the dictionary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct DecodedQuad {
    pub id: u32,
    pub rotation: u8,
    pub hamming: u8,
    pub border_score: f32,
    /// `border_score` discounted by the fraction of corrected bits.
    pub score: f32,
}

/// Sample positions for an `n x n` cell grid (bits plus border) in the
/// quad's own coordinates, where the quad spans `0..n` on both axes.
pub(crate) struct CellDecoder {
    bits: usize,
    border: usize,
    cells: usize,
    min_border_score: f32,
    centers: Vec<Point2<f32>>,
    threshold_points: Vec<Point2<f32>>,
    samples: Vec<u8>,
    thr_samples: Vec<u8>,
}

const THRESHOLD_SUBDIV: usize = 3;

impl CellDecoder {
    pub fn new(bits: usize, border: usize, min_border_score: f32) -> Self {
        let cells = bits + 2 * border;
        let centers = grid_points(cells as f32, cells);
        let threshold_points = grid_points(cells as f32, cells * THRESHOLD_SUBDIV);
        Self {
            bits,
            border,
            cells,
            min_border_score,
            samples: Vec::with_capacity(centers.len()),
            thr_samples: Vec::with_capacity(threshold_points.len()),
            centers,
            threshold_points,
        }
    }

    /// Decode the marker inside `quad` (clockwise, image coordinates).
    pub fn decode(
        &mut self,
        img: &GrayImageView<'_>,
        quad: &[Point2<f32>; 4],
        matcher: &Matcher,
    ) -> Option<DecodedQuad> {
        let s = self.cells as f32;
        let square = [
            Point2::new(0.0, 0.0),
            Point2::new(s, 0.0),
            Point2::new(s, s),
            Point2::new(0.0, s),
        ];
        let h = homography_from_4pt(&square, quad)?;

        self.samples.clear();
        for p in &self.centers {
            self.samples.push(sample_at(img, &h, *p)?);
        }
        self.thr_samples.clear();
        for p in &self.threshold_points {
            if let Some(v) = sample_at(img, &h, *p) {
                self.thr_samples.push(v);
            }
        }

        let (code, border_score) = self.read_code()?;
        let m = matcher.match_code(code)?;
        let bit_count = (self.bits * self.bits).max(1) as f32;
        let score = (border_score * (1.0 - m.hamming as f32 / bit_count)).clamp(0.0, 1.0);
        Some(DecodedQuad {
            id: m.id,
            rotation: m.rotation,
            hamming: m.hamming,
            border_score,
            score,
        })
    }

    /// Threshold the cell samples into a row-major code (black = 1) and the
    /// fraction of border cells that read black.
    fn read_code(&self) -> Option<(u64, f32)> {
        let thr = if self.thr_samples.is_empty() {
            otsu_threshold_from_samples(&self.samples)
        } else {
            otsu_threshold_from_samples(&self.thr_samples)
        };

        let n = self.cells;
        let mut code = 0u64;
        let mut border_black = 0u32;
        let mut border_total = 0u32;
        for cy in 0..n {
            for cx in 0..n {
                let black = self.samples[cy * n + cx] < thr;
                let on_border = cx < self.border
                    || cy < self.border
                    || cx >= n - self.border
                    || cy >= n - self.border;
                if on_border {
                    border_total += 1;
                    border_black += black as u32;
                } else if black {
                    let idx = (cy - self.border) * self.bits + (cx - self.border);
                    code |= 1u64 << idx;
                }
            }
        }

        let border_score = if border_total == 0 {
            1.0
        } else {
            border_black as f32 / border_total as f32
        };
        (border_score >= self.min_border_score).then_some((code, border_score))
    }
}

fn grid_points(side: f32, count: usize) -> Vec<Point2<f32>> {
    let step = side / count as f32;
    (0..count)
        .flat_map(|y| (0..count).map(move |x| (x, y)))
        .map(|(x, y)| Point2::new((x as f32 + 0.5) * step, (y as f32 + 0.5) * step))
        .collect()
}

/// 3x3 box mean around the warped point; `None` if it leaves the image.
fn sample_at(img: &GrayImageView<'_>, h: &Homography, p: Point2<f32>) -> Option<u8> {
    let q = h.apply(p);
    if !q.x.is_finite() || !q.y.is_finite() {
        return None;
    }
    let (ix, iy) = (q.x.floor() as i64, q.y.floor() as i64);
    let mut sum = 0u32;
    for dy in -1..=1 {
        for dx in -1..=1 {
            sum += img.get(ix + dx, iy + dy)? as u32;
        }
    }
    Some((sum / 9) as u8)
}

/// Keep the highest-scoring detection of each id.
pub(crate) fn dedup_by_id_keep_best<T>(
    mut items: Vec<T>,
    id: impl Fn(&T) -> u32,
    score: impl Fn(&T) -> f64,
) -> Vec<T> {
    items.sort_by(|a, b| score(b).total_cmp(&score(a)));
    let mut seen = std::collections::BTreeSet::new();
    items.retain(|d| seen.insert(id(d)));
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{draw_marker, Dictionary};
    use tapatan_vision_core::GrayImage;

    fn dict() -> Dictionary {
        Dictionary::new("sample", 6, 3, vec![65815360568, 26417696055, 56145686323])
            .expect("dictionary")
    }

    fn on_canvas(marker: &GrayImage, pad: usize) -> GrayImage {
        let mut canvas = GrayImage::filled(marker.width + 2 * pad, marker.height + 2 * pad, 255);
        canvas.blit(marker, pad as i64, pad as i64);
        canvas
    }

    #[test]
    fn reads_marker_through_exact_quad() {
        let dict = dict();
        let matcher = Matcher::new(dict.clone(), 0);
        let marker = draw_marker(&dict, 1, 10, 1).expect("id in dictionary");
        let img = on_canvas(&marker, 20);

        let quad = [
            Point2::new(20.0, 20.0),
            Point2::new(100.0, 20.0),
            Point2::new(100.0, 100.0),
            Point2::new(20.0, 100.0),
        ];
        let mut decoder = CellDecoder::new(6, 1, 0.85);
        let d = decoder.decode(&img.view(), &quad, &matcher).expect("decoded");
        assert_eq!((d.id, d.rotation, d.hamming), (1, 0, 0));
        assert_eq!(d.border_score, 1.0);
        assert_eq!(d.score, 1.0);
    }

    #[test]
    fn starting_the_quad_one_corner_later_reports_a_quarter_turn() {
        let dict = dict();
        let matcher = Matcher::new(dict.clone(), 0);
        let marker = draw_marker(&dict, 2, 10, 1).expect("id in dictionary");
        let img = on_canvas(&marker, 20);

        // the quad starts at the marker's top-right corner
        let quad = [
            Point2::new(100.0, 20.0),
            Point2::new(100.0, 100.0),
            Point2::new(20.0, 100.0),
            Point2::new(20.0, 20.0),
        ];
        let mut decoder = CellDecoder::new(6, 1, 0.85);
        let d = decoder.decode(&img.view(), &quad, &matcher).expect("decoded");
        assert_eq!(d.id, 2);
        assert_eq!(d.rotation, 3);
    }

    #[test]
    fn blank_quad_fails_border_check() {
        let dict = dict();
        let matcher = Matcher::new(dict, 3);
        let img = GrayImage::filled(60, 60, 255);
        let quad = [
            Point2::new(10.0, 10.0),
            Point2::new(50.0, 10.0),
            Point2::new(50.0, 50.0),
            Point2::new(10.0, 50.0),
        ];
        let mut decoder = CellDecoder::new(6, 1, 0.85);
        assert!(decoder.decode(&img.view(), &quad, &matcher).is_none());
    }

    #[test]
    fn dedup_keeps_highest_score_per_id() {
        let items = vec![(3u32, 0.5), (1, 0.9), (3, 0.8), (1, 0.2)];
        let kept = dedup_by_id_keep_best(items, |d| d.0, |d| d.1);
        assert_eq!(kept, vec![(1, 0.9), (3, 0.8)]);
    }
}
