// ============================================================================
// SHAPE RASTERIZATION: signed-distance geometry for shape layers + outlines
// ============================================================================
//
// Every primitive exposes a signed distance (negative = inside). Coverage is
// derived with the same smoothstep falloff for fills and for strokes, so a
// stroke drawn over its own fill lines up exactly at the edge.

use crate::geometry::Rect;
use crate::layer::{ShapeContent, ShapeType};

/// Line segments used to flatten each quadratic corner of a rounded rect.
const CORNER_SEGMENTS: usize = 12;

// ============================================================================
// SDF functions return signed distance (negative = inside)
// ============================================================================

/// SDF for a box centred at origin with half-extents (hx, hy).
#[inline]
fn sdf_box(px: f32, py: f32, hx: f32, hy: f32) -> f32 {
    let dx = px.abs() - hx;
    let dy = py.abs() - hy;
    let outside = (dx.max(0.0) * dx.max(0.0) + dy.max(0.0) * dy.max(0.0)).sqrt();
    let inside = dx.max(dy).min(0.0);
    outside + inside
}

#[inline]
fn sdf_circle(px: f32, py: f32, r: f32) -> f32 {
    (px * px + py * py).sqrt() - r
}

/// Smoothstep between edge0 and edge1.
#[inline]
fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Anti-aliased coverage of a filled region at signed distance `d`.
#[inline]
pub fn fill_coverage(d: f32) -> f32 {
    smoothstep(0.5, -0.5, d)
}

/// Anti-aliased coverage of a stroke of `width` centred on the outline.
#[inline]
pub fn stroke_coverage(d: f32, width: f32) -> f32 {
    smoothstep(0.5, -0.5, d.abs() - width * 0.5)
}

// ============================================================================
// Closed polygon
// ============================================================================

/// Closed polyline with cumulative arc lengths, used for rounded rects and
/// for dashed outlines.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    points: Vec<(f32, f32)>,
    /// `arc[i]` = path length from `points[0]` to `points[i]`.
    arc: Vec<f32>,
    perimeter: f32,
}

impl Polygon {
    pub fn new(points: Vec<(f32, f32)>) -> Self {
        let mut deduped: Vec<(f32, f32)> = Vec::with_capacity(points.len());
        for p in points {
            if deduped
                .last()
                .is_none_or(|q| (q.0 - p.0).abs() > 1e-4 || (q.1 - p.1).abs() > 1e-4)
            {
                deduped.push(p);
            }
        }
        if deduped.len() > 1 && deduped.first() == deduped.last() {
            deduped.pop();
        }

        let mut arc = Vec::with_capacity(deduped.len());
        let mut total = 0.0f32;
        for i in 0..deduped.len() {
            arc.push(total);
            let a = deduped[i];
            let b = deduped[(i + 1) % deduped.len()];
            total += ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt();
        }
        Self { points: deduped, arc, perimeter: total }
    }

    /// Outline of `rect`, starting at the top-left corner and running clockwise.
    pub fn rect(rect: &Rect) -> Self {
        Self::new(rect.corners().to_vec())
    }

    /// Rounded rectangle whose corners are quadratic curves with the corner
    /// point as control point. The radius is clamped to half the shorter side.
    pub fn rounded_rect(rect: &Rect, radius: f32) -> Self {
        let r = radius.max(0.0).min(rect.width.min(rect.height) * 0.5);
        if r <= 0.0 {
            return Self::rect(rect);
        }
        let (x, y, w, h) = (rect.x, rect.y, rect.width, rect.height);
        let mut pts = Vec::with_capacity(4 * (CORNER_SEGMENTS + 1));

        pts.push((x + r, y));
        pts.push((x + w - r, y));
        push_quadratic(&mut pts, (x + w - r, y), (x + w, y), (x + w, y + r));
        pts.push((x + w, y + h - r));
        push_quadratic(&mut pts, (x + w, y + h - r), (x + w, y + h), (x + w - r, y + h));
        pts.push((x + r, y + h));
        push_quadratic(&mut pts, (x + r, y + h), (x, y + h), (x, y + h - r));
        pts.push((x, y + r));
        push_quadratic(&mut pts, (x, y + r), (x, y), (x + r, y));

        Self::new(pts)
    }

    pub fn points(&self) -> &[(f32, f32)] {
        &self.points
    }

    pub fn perimeter(&self) -> f32 {
        self.perimeter
    }

    pub fn bounds(&self) -> Rect {
        let mut min_x = f32::MAX;
        let mut min_y = f32::MAX;
        let mut max_x = f32::MIN;
        let mut max_y = f32::MIN;
        for &(x, y) in &self.points {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        if self.points.is_empty() {
            return Rect::default();
        }
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Signed distance to the outline (even-odd inside test).
    pub fn signed_distance(&self, px: f32, py: f32) -> f32 {
        let (dist, _) = self.nearest(px, py);
        if self.contains(px, py) { -dist } else { dist }
    }

    fn contains(&self, px: f32, py: f32) -> bool {
        let n = self.points.len();
        let mut inside = false;
        let mut j = n.wrapping_sub(1);
        for i in 0..n {
            let (xi, yi) = self.points[i];
            let (xj, yj) = self.points[j];
            if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// Unsigned distance to the nearest point of the outline and that point's
    /// arc-length position along the path.
    pub fn nearest(&self, px: f32, py: f32) -> (f32, f32) {
        let n = self.points.len();
        if n == 0 {
            return (f32::MAX, 0.0);
        }
        let mut best_d2 = f32::MAX;
        let mut best_arc = 0.0;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            let ex = b.0 - a.0;
            let ey = b.1 - a.1;
            let wx = px - a.0;
            let wy = py - a.1;
            let len2 = ex * ex + ey * ey;
            let t = if len2 > 0.0 { ((wx * ex + wy * ey) / len2).clamp(0.0, 1.0) } else { 0.0 };
            let dx = wx - ex * t;
            let dy = wy - ey * t;
            let d2 = dx * dx + dy * dy;
            if d2 < best_d2 {
                best_d2 = d2;
                best_arc = self.arc[i] + len2.sqrt() * t;
            }
        }
        (best_d2.sqrt(), best_arc)
    }

    /// Coverage of a dashed stroke of `width`, with `dash = [on, off]`
    /// measured along the path from its first point.
    pub fn dashed_stroke_coverage(&self, px: f32, py: f32, width: f32, dash: [f32; 2]) -> f32 {
        let (dist, arc) = self.nearest(px, py);
        let period = dash[0] + dash[1];
        if period > 0.0 && arc.rem_euclid(period) >= dash[0] {
            return 0.0;
        }
        stroke_coverage(dist, width)
    }
}

fn push_quadratic(out: &mut Vec<(f32, f32)>, p0: (f32, f32), c: (f32, f32), p1: (f32, f32)) {
    for i in 1..=CORNER_SEGMENTS {
        let t = i as f32 / CORNER_SEGMENTS as f32;
        let mt = 1.0 - t;
        out.push((
            mt * mt * p0.0 + 2.0 * mt * t * c.0 + t * t * p1.0,
            mt * mt * p0.1 + 2.0 * mt * t * c.1 + t * t * p1.1,
        ));
    }
}

// ============================================================================
// Shape outlines
// ============================================================================

/// Outline of a shape layer in layer-frame canvas coordinates.
#[derive(Clone, Debug, PartialEq)]
pub enum ShapeOutline {
    Box { cx: f32, cy: f32, hx: f32, hy: f32 },
    Circle { cx: f32, cy: f32, r: f32 },
    Rounded(Polygon),
}

impl ShapeOutline {
    /// Rectangle (square or rounded corners) filling `bounds`, or a circle
    /// centred in `bounds` with radius `min(w, h) / 2`.
    pub fn for_shape(shape: &ShapeContent, bounds: &Rect) -> Self {
        let (cx, cy) = bounds.center();
        match shape.shape_type {
            ShapeType::Circle => ShapeOutline::Circle {
                cx,
                cy,
                r: bounds.width.min(bounds.height) * 0.5,
            },
            ShapeType::Rectangle if shape.border_radius > 0.0 => {
                ShapeOutline::Rounded(Polygon::rounded_rect(bounds, shape.border_radius))
            }
            ShapeType::Rectangle => ShapeOutline::Box {
                cx,
                cy,
                hx: bounds.width * 0.5,
                hy: bounds.height * 0.5,
            },
        }
    }

    pub fn signed_distance(&self, px: f32, py: f32) -> f32 {
        match self {
            ShapeOutline::Box { cx, cy, hx, hy } => sdf_box(px - cx, py - cy, *hx, *hy),
            ShapeOutline::Circle { cx, cy, r } => sdf_circle(px - cx, py - cy, *r),
            ShapeOutline::Rounded(poly) => poly.signed_distance(px, py),
        }
    }

    /// Tight bounds of the outline itself (no stroke padding).
    pub fn bounds(&self) -> Rect {
        match self {
            ShapeOutline::Box { cx, cy, hx, hy } => Rect::new(cx - hx, cy - hy, hx * 2.0, hy * 2.0),
            ShapeOutline::Circle { cx, cy, r } => Rect::new(cx - r, cy - r, r * 2.0, r * 2.0),
            ShapeOutline::Rounded(poly) => poly.bounds(),
        }
    }
}
