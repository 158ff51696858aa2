//! Marker candidate search: connected dark blobs reduced to four corners.

use nalgebra::{Point2, Vector2};
use std::collections::HashMap;

/// Disjoint-set forest over pixel indices.
struct UnionFind {
    parent: Vec<u32>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size as u32).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, mut i: u32) -> u32 {
        while self.parent[i as usize] != i {
            let grand = self.parent[self.parent[i as usize] as usize];
            self.parent[i as usize] = grand;
            i = grand;
        }
        i
    }

    fn union(&mut self, a: u32, b: u32) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra as usize].cmp(&self.rank[rb as usize]) {
            std::cmp::Ordering::Less => self.parent[ra as usize] = rb,
            std::cmp::Ordering::Greater => self.parent[rb as usize] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[ra as usize] = rb;
                self.rank[rb as usize] += 1;
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Blob {
    min_x: usize,
    max_x: usize,
    min_y: usize,
    max_y: usize,
    touches_edge: bool,
}

impl Blob {
    fn at(x: usize, y: usize) -> Self {
        Self {
            min_x: x,
            max_x: x,
            min_y: y,
            max_y: y,
            touches_edge: false,
        }
    }

    fn grow(&mut self, x: usize, y: usize) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
    }

    fn width(&self) -> usize {
        self.max_x - self.min_x + 1
    }

    fn height(&self) -> usize {
        self.max_y - self.min_y + 1
    }
}

/// Limits applied to dark blobs before a quad is fitted.
#[derive(Clone, Copy, Debug)]
pub(crate) struct QuadLimits {
    pub min_side_px: f32,
    pub max_area_px: f32,
}

/// Find four-corner candidates among the 4-connected dark blobs of a mask.
///
/// Blobs touching the frame edge are skipped since a clipped marker cannot be
/// decoded. Corners are returned clockwise in image coordinates, starting
/// with the one closest to the image origin, and sit on pixel edges rather
/// than pixel centres.
pub(crate) fn find_quads(
    dark: &[bool],
    width: usize,
    height: usize,
    limits: QuadLimits,
) -> Vec<[Point2<f32>; 4]> {
    if dark.len() != width * height || width < 3 || height < 3 {
        return Vec::new();
    }

    let mut uf = UnionFind::new(dark.len());
    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            if !dark[i] {
                continue;
            }
            if x > 0 && dark[i - 1] {
                uf.union(i as u32, (i - 1) as u32);
            }
            if y > 0 && dark[i - width] {
                uf.union(i as u32, (i - width) as u32);
            }
        }
    }

    let mut blobs: HashMap<u32, Blob> = HashMap::new();
    for (i, _) in dark.iter().enumerate().filter(|&(_, &d)| d) {
        let (x, y) = (i % width, i / width);
        let blob = blobs
            .entry(uf.find(i as u32))
            .and_modify(|b| b.grow(x, y))
            .or_insert_with(|| Blob::at(x, y));
        if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
            blob.touches_edge = true;
        }
    }

    blobs.retain(|_, b| {
        let (w, h) = (b.width() as f32, b.height() as f32);
        !b.touches_edge
            && w >= limits.min_side_px
            && h >= limits.min_side_px
            && w * h <= limits.max_area_px
    });
    if blobs.is_empty() {
        return Vec::new();
    }

    let mut pixels: HashMap<u32, Vec<Point2<f32>>> = HashMap::new();
    for (i, _) in dark.iter().enumerate().filter(|&(_, &d)| d) {
        let root = uf.find(i as u32);
        if blobs.contains_key(&root) {
            pixels
                .entry(root)
                .or_default()
                .push(Point2::new((i % width) as f32, (i / width) as f32));
        }
    }

    let mut roots: Vec<u32> = pixels.keys().copied().collect();
    roots.sort_unstable();
    roots
        .into_iter()
        .filter_map(|root| fit_quad(&pixels[&root], limits.min_side_px))
        .collect()
}

/// Reduce a blob to its four extreme points.
///
/// The point farthest from the centroid and the point farthest from that one
/// span a diagonal; the other two corners are the points farthest from that
/// diagonal on either side.
fn fit_quad(pts: &[Point2<f32>], min_side_px: f32) -> Option<[Point2<f32>; 4]> {
    if pts.len() < 4 {
        return None;
    }
    let n = pts.len() as f32;
    let centroid = Point2::from(pts.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / n);

    let farthest_from = |q: Point2<f32>| {
        pts.iter()
            .copied()
            .fold((q, -1.0f32), |best, p| {
                let d = (p - q).norm_squared();
                if d > best.1 {
                    (p, d)
                } else {
                    best
                }
            })
            .0
    };
    let a = farthest_from(centroid);
    let b = farthest_from(a);

    let diag = b - a;
    let mut left = (a, 0.0f32);
    let mut right = (a, 0.0f32);
    for &p in pts {
        let side = diag.perp(&(p - a));
        if side > left.1 {
            left = (p, side);
        }
        if side < right.1 {
            right = (p, side);
        }
    }
    let diag_len = diag.norm();
    let min_offset = 0.25 * min_side_px * diag_len;
    if left.1 < min_offset || -right.1 < min_offset {
        return None;
    }

    let mut corners = [a, left.0, b, right.0];
    let center = Point2::from(corners.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / 4.0);
    corners.sort_by(|p, q| {
        let ap = (p.y - center.y).atan2(p.x - center.x);
        let aq = (q.y - center.y).atan2(q.x - center.x);
        ap.total_cmp(&aq)
    });
    let start = (0..4)
        .min_by(|&i, &j| (corners[i].x + corners[i].y).total_cmp(&(corners[j].x + corners[j].y)))
        .unwrap_or(0);
    corners.rotate_left(start);

    // pixel centres -> outer pixel edges
    let corners = corners.map(|p| {
        Point2::new(
            p.x + 0.5 * (p.x - center.x).signum(),
            p.y + 0.5 * (p.y - center.y).signum(),
        )
    });

    let min_edge = (0..4)
        .map(|i| (corners[(i + 1) % 4] - corners[i]).norm())
        .fold(f32::INFINITY, f32::min);
    (min_edge >= 0.5 * min_side_px).then_some(corners)
}
