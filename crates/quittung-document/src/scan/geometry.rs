// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Geometry utilities: points, contours, quadrilaterals, canonical corner
// ordering, and Douglas–Peucker polygon simplification.

use serde::{Deserialize, Serialize};

/// A point in image coordinates (x right, y down).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point2D) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Multiply both coordinates by `factor`.
    pub fn scale(&self, factor: f64) -> Point2D {
        Point2D::new(self.x * factor, self.y * factor)
    }

    pub fn as_f32_tuple(&self) -> (f32, f32) {
        (self.x as f32, self.y as f32)
    }
}

/// Ratio between the full-resolution source and the downscaled working copy.
///
/// Computed once when the working copy is made; mapping a working-space point
/// back is a plain multiplication, so `full == working * ratio` exactly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleRatio(f64);

impl ScaleRatio {
    /// Ratio for a source of `original_width` shrunk to `working_width`.
    pub fn from_widths(original_width: u32, working_width: u32) -> Self {
        Self(original_width as f64 / working_width.max(1) as f64)
    }

    pub const fn identity() -> Self {
        Self(1.0)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Map a working-resolution point to full resolution.
    pub fn to_full(&self, point: Point2D) -> Point2D {
        point.scale(self.0)
    }
}

/// Closed boundary as produced by border following. Not necessarily convex.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Contour {
    pub points: Vec<Point2D>,
}

impl Contour {
    pub fn new(points: Vec<Point2D>) -> Self {
        Self { points }
    }

    /// Enclosed area (shoelace), always non-negative.
    pub fn area(&self) -> f64 {
        polygon_area(&self.points)
    }

    /// Length of the closed boundary.
    pub fn perimeter(&self) -> f64 {
        closed_arc_length(&self.points)
    }

    /// Simplify with a tolerance of `ratio` times the perimeter.
    pub fn approximate(&self, ratio: f64) -> Vec<Point2D> {
        approximate_polygon(&self.points, ratio * self.perimeter())
    }
}

/// Four outline corners in detection order (no particular convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quadrilateral {
    points: [Point2D; 4],
}

impl Quadrilateral {
    pub fn new(points: [Point2D; 4]) -> Self {
        Self { points }
    }

    /// Build from a simplified polygon; `None` unless it has exactly 4 vertices.
    pub fn from_polygon(polygon: &[Point2D]) -> Option<Self> {
        let points: [Point2D; 4] = polygon.try_into().ok()?;
        Some(Self { points })
    }

    pub fn points(&self) -> &[Point2D; 4] {
        &self.points
    }

    /// Map every corner into full-resolution space.
    pub fn scaled(&self, ratio: ScaleRatio) -> Quadrilateral {
        Quadrilateral {
            points: self.points.map(|p| ratio.to_full(p)),
        }
    }

    /// Corners in the canonical (tl, tr, br, bl) convention.
    pub fn ordered(&self) -> OrderedCorners {
        order_corners(self.points)
    }

    pub fn area(&self) -> f64 {
        polygon_area(&self.points)
    }
}

/// Corners in the canonical top-left, top-right, bottom-right, bottom-left
/// convention used as a perspective-transform source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderedCorners {
    pub top_left: Point2D,
    pub top_right: Point2D,
    pub bottom_right: Point2D,
    pub bottom_left: Point2D,
}

impl OrderedCorners {
    pub fn to_array(&self) -> [Point2D; 4] {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left]
    }

    /// Greater of the top and bottom edge lengths.
    pub fn max_width(&self) -> f64 {
        let top = self.top_left.distance(&self.top_right);
        let bottom = self.bottom_left.distance(&self.bottom_right);
        top.max(bottom)
    }

    /// Greater of the left and right edge lengths.
    pub fn max_height(&self) -> f64 {
        let left = self.top_left.distance(&self.bottom_left);
        let right = self.top_right.distance(&self.bottom_right);
        left.max(right)
    }
}

/// Order four points as (tl, tr, br, bl).
///
/// Points are sorted by angle around their centroid. In image coordinates
/// ascending `atan2` walks clockwise on screen, so after rotating the cycle to
/// start at the smallest `x + y` the result is tl, tr, br, bl. Every
/// comparison has a total tie-break, so the output depends only on the point
/// set and never on the input order.
pub fn order_corners(points: [Point2D; 4]) -> OrderedCorners {
    let cx = points.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / 4.0;
    let angle = |p: &Point2D| (p.y - cy).atan2(p.x - cx);

    let mut sorted = points;
    sorted.sort_by(|a, b| {
        angle(a)
            .total_cmp(&angle(b))
            .then(a.x.total_cmp(&b.x))
            .then(a.y.total_cmp(&b.y))
    });

    let start = (0..4)
        .min_by(|&i, &j| {
            let (a, b) = (&sorted[i], &sorted[j]);
            (a.x + a.y)
                .total_cmp(&(b.x + b.y))
                .then(a.y.total_cmp(&b.y))
                .then(a.x.total_cmp(&b.x))
        })
        .unwrap_or(0);
    sorted.rotate_left(start);

    OrderedCorners {
        top_left: sorted[0],
        top_right: sorted[1],
        bottom_right: sorted[2],
        bottom_left: sorted[3],
    }
}

/// Area of a simple polygon via the shoelace formula.
pub fn polygon_area(points: &[Point2D]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut twice_area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        twice_area += points[i].x * points[j].y - points[j].x * points[i].y;
    }
    twice_area.abs() / 2.0
}

/// Perimeter of a closed polyline (includes the closing segment).
pub fn closed_arc_length(points: &[Point2D]) -> f64 {
    let n = points.len();
    if n < 2 {
        return 0.0;
    }
    (0..n)
        .map(|i| points[i].distance(&points[(i + 1) % n]))
        .sum()
}

/// Douglas–Peucker simplification of a closed curve.
///
/// The curve is split at two mutually distant anchors (the point farthest
/// from the first point, then the point farthest from that), both halves are
/// simplified independently, and a final cyclic pass drops any vertex that
/// lies within `epsilon` of the line through its neighbours.
pub fn approximate_polygon(points: &[Point2D], epsilon: f64) -> Vec<Point2D> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }

    let a = farthest_from(points, &points[0]);
    let b = farthest_from(points, &points[a]);
    if a == b {
        return vec![points[a]];
    }
    let (i, j) = (a.min(b), a.max(b));

    let first = simplify_open(&points[i..=j], epsilon);
    let wrapped: Vec<Point2D> = points[j..].iter().chain(&points[..=i]).copied().collect();
    let second = simplify_open(&wrapped, epsilon);

    let mut polygon = first;
    // `second` starts at points[j] and ends at points[i], both already kept.
    if second.len() > 2 {
        polygon.extend_from_slice(&second[1..second.len() - 1]);
    }

    prune_collinear(&mut polygon, epsilon);
    polygon
}

fn farthest_from(points: &[Point2D], origin: &Point2D) -> usize {
    let mut best = 0;
    let mut best_dist = -1.0;
    for (idx, p) in points.iter().enumerate() {
        let d = p.distance(origin);
        if d > best_dist {
            best = idx;
            best_dist = d;
        }
    }
    best
}

/// Classic open-curve Douglas–Peucker. Endpoints are always kept.
fn simplify_open(points: &[Point2D], epsilon: f64) -> Vec<Point2D> {
    let n = points.len();
    if n <= 2 {
        return points.to_vec();
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut stack = vec![(0usize, n - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let mut max_dist = 0.0;
        let mut max_idx = start;
        for k in start + 1..end {
            let d = line_distance(&points[k], &points[start], &points[end]);
            if d > max_dist {
                max_dist = d;
                max_idx = k;
            }
        }
        if max_dist > epsilon {
            keep[max_idx] = true;
            stack.push((start, max_idx));
            stack.push((max_idx, end));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(p, kept)| kept.then_some(*p))
        .collect()
}

fn prune_collinear(polygon: &mut Vec<Point2D>, epsilon: f64) {
    let mut changed = true;
    while changed && polygon.len() > 3 {
        changed = false;
        let n = polygon.len();
        for i in 0..n {
            let prev = polygon[(i + n - 1) % n];
            let next = polygon[(i + 1) % n];
            if line_distance(&polygon[i], &prev, &next) <= epsilon {
                polygon.remove(i);
                changed = true;
                break;
            }
        }
    }
}

/// Distance from `p` to the infinite line through `a` and `b` (or to `a` if
/// the two coincide).
fn line_distance(p: &Point2D, a: &Point2D, b: &Point2D) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len = dx.hypot(dy);
    if len < f64::EPSILON {
        return p.distance(a);
    }
    ((p.x - a.x) * dy - (p.y - a.y) * dx).abs() / len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point2D {
        Point2D::new(x, y)
    }

    /// Dense boundary of an axis-aligned rectangle, one point per unit step.
    fn rectangle_contour(x0: f64, y0: f64, w: usize, h: usize) -> Vec<Point2D> {
        let mut pts = Vec::new();
        for i in 0..w {
            pts.push(p(x0 + i as f64, y0));
        }
        for i in 0..h {
            pts.push(p(x0 + w as f64, y0 + i as f64));
        }
        for i in 0..w {
            pts.push(p(x0 + (w - i) as f64, y0 + h as f64));
        }
        for i in 0..h {
            pts.push(p(x0, y0 + (h - i) as f64));
        }
        pts
    }

    #[test]
    fn shoelace_area_rectangle() {
        let corners = [p(0.0, 0.0), p(10.0, 0.0), p(10.0, 5.0), p(0.0, 5.0)];
        assert!((polygon_area(&corners) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn closed_arc_length_square() {
        let square = [p(0.0, 0.0), p(4.0, 0.0), p(4.0, 4.0), p(0.0, 4.0)];
        assert!((closed_arc_length(&square) - 16.0).abs() < 1e-9);
    }

    #[test]
    fn ordering_upright_rectangle() {
        let ordered = order_corners([p(10.0, 80.0), p(90.0, 10.0), p(10.0, 10.0), p(90.0, 80.0)]);
        assert_eq!(ordered.top_left, p(10.0, 10.0));
        assert_eq!(ordered.top_right, p(90.0, 10.0));
        assert_eq!(ordered.bottom_right, p(90.0, 80.0));
        assert_eq!(ordered.bottom_left, p(10.0, 80.0));
    }

    #[test]
    fn ordering_is_independent_of_input_permutation() {
        // A tilted quad with no axis-aligned edges.
        let pts = [p(112.0, 40.0), p(410.0, 95.0), p(380.0, 460.0), p(70.0, 402.0)];
        let expected = order_corners(pts);
        let permutations = [[0, 1, 2, 3], [3, 2, 1, 0], [2, 0, 3, 1], [1, 3, 0, 2], [0, 2, 1, 3]];
        for perm in permutations {
            let shuffled = perm.map(|i| pts[i]);
            assert_eq!(order_corners(shuffled), expected, "permutation {perm:?}");
        }
        assert_eq!(expected.top_left, pts[0]);
        assert_eq!(expected.bottom_left, pts[3]);
    }

    #[test]
    fn ordering_is_idempotent() {
        let pts = [p(300.0, 20.0), p(15.0, 60.0), p(280.0, 500.0), p(40.0, 470.0)];
        let once = order_corners(pts);
        let twice = order_corners(once.to_array());
        assert_eq!(once, twice);
        assert_eq!(twice.to_array(), once.to_array());
    }

    #[test]
    fn ordering_diamond_assigns_distinct_corners() {
        let ordered = order_corners([p(50.0, 0.0), p(100.0, 50.0), p(50.0, 100.0), p(0.0, 50.0)]);
        let arr = ordered.to_array();
        for i in 0..4 {
            for j in i + 1..4 {
                assert_ne!(arr[i], arr[j]);
            }
        }
        assert_eq!(ordered.top_left, p(50.0, 0.0));
    }

    #[test]
    fn scaled_corners_are_exact_multiples() {
        let ratio = ScaleRatio::from_widths(2000, 500);
        assert_eq!(ratio.value(), 4.0);
        let quad = Quadrilateral::new([p(1.25, 2.5), p(100.0, 3.0), p(99.5, 70.75), p(0.5, 71.0)]);
        let full = quad.scaled(ratio);
        for (w, f) in quad.points().iter().zip(full.points()) {
            assert_eq!(f.x, w.x * ratio.value());
            assert_eq!(f.y, w.y * ratio.value());
        }
    }

    #[test]
    fn dense_rectangle_simplifies_to_four_vertices() {
        let contour = Contour::new(rectangle_contour(20.0, 30.0, 120, 80));
        let polygon = contour.approximate(0.02);
        assert_eq!(polygon.len(), 4, "got {polygon:?}");
        let quad = Quadrilateral::from_polygon(&polygon).unwrap();
        let ordered = quad.ordered();
        assert_eq!(ordered.top_left, p(20.0, 30.0));
        assert_eq!(ordered.bottom_right, p(140.0, 110.0));
    }

    #[test]
    fn jittered_edge_points_are_removed() {
        let mut pts = rectangle_contour(0.0, 0.0, 200, 100);
        // Staircase noise of one pixel along the top edge.
        for pt in pts.iter_mut().take(200).skip(1) {
            if (pt.x as i64) % 7 == 0 {
                pt.y += 1.0;
            }
        }
        let polygon = approximate_polygon(&pts, 0.02 * closed_arc_length(&pts));
        assert_eq!(polygon.len(), 4);
    }

    #[test]
    fn triangle_stays_triangle() {
        let mut pts = Vec::new();
        for i in 0..50 {
            pts.push(p(i as f64 * 2.0, 0.0));
        }
        for i in 0..50 {
            pts.push(p(100.0 - i as f64, i as f64 * 2.0));
        }
        for i in 0..50 {
            pts.push(p(50.0 - i as f64, 100.0 - i as f64 * 2.0));
        }
        let polygon = approximate_polygon(&pts, 2.0);
        assert_eq!(polygon.len(), 3, "got {polygon:?}");
    }

    #[test]
    fn from_polygon_requires_four_points() {
        assert!(Quadrilateral::from_polygon(&[p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0)]).is_none());
        assert!(
            Quadrilateral::from_polygon(&[p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0), p(0.0, 1.0)])
                .is_some()
        );
    }

    #[test]
    fn edge_lengths_take_the_longer_side() {
        let corners = order_corners([p(0.0, 0.0), p(100.0, 10.0), p(90.0, 60.0), p(5.0, 50.0)]);
        let top = p(0.0, 0.0).distance(&p(100.0, 10.0));
        let bottom = p(5.0, 50.0).distance(&p(90.0, 60.0));
        assert!((corners.max_width() - top.max(bottom)).abs() < 1e-9);
        let left = p(0.0, 0.0).distance(&p(5.0, 50.0));
        let right = p(100.0, 10.0).distance(&p(90.0, 60.0));
        assert!((corners.max_height() - left.max(right)).abs() < 1e-9);
    }
}
