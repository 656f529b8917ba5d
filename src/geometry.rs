// ============================================================================
// GEOMETRY: screen/canvas mapping, affine matrices, rotation helpers
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::surface::Surface;

/// Axis-aligned rectangle in floating-point pixels.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    /// Inclusive containment on all four edges.
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.right() && py >= self.y && py <= self.bottom()
    }

    /// Grow (or shrink, for negative `margin`) on every side.
    pub fn inflate(&self, margin: f32) -> Self {
        Self {
            x: self.x - margin,
            y: self.y - margin,
            width: self.width + margin * 2.0,
            height: self.height + margin * 2.0,
        }
    }

    pub fn corners(&self) -> [(f32, f32); 4] {
        [
            (self.x, self.y),
            (self.right(), self.y),
            (self.right(), self.bottom()),
            (self.x, self.bottom()),
        ]
    }
}

/// Where the canvas is displayed on screen, in screen (pointer) units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// Displayed rectangle of the canvas element.
    pub display: Rect,
    /// Logical pixel size of the canvas buffer.
    pub logical_width: f32,
    pub logical_height: f32,
}

impl Viewport {
    /// Viewport where the canvas is shown 1:1 at the screen origin.
    pub fn identity(logical_width: f32, logical_height: f32) -> Self {
        Self {
            display: Rect::new(0.0, 0.0, logical_width, logical_height),
            logical_width,
            logical_height,
        }
    }

    pub fn to_canvas(&self, screen_x: f32, screen_y: f32) -> (f32, f32) {
        screen_to_canvas(
            screen_x,
            screen_y,
            self.display,
            (self.logical_width, self.logical_height),
        )
    }
}

/// Map a pointer position to canvas pixel coordinates.
///
/// Each axis is scaled by `logical / displayed`, so a 1792×1024 buffer shown
/// at 60% width maps back onto full-resolution coordinates. The result is not
/// rounded: drags recompute absolute positions from it and must not drift.
pub fn screen_to_canvas(
    pointer_x: f32,
    pointer_y: f32,
    display: Rect,
    logical_size: (f32, f32),
) -> (f32, f32) {
    let scale_x = if display.width > 0.0 { logical_size.0 / display.width } else { 1.0 };
    let scale_y = if display.height > 0.0 { logical_size.1 / display.height } else { 1.0 };
    (
        (pointer_x - display.x) * scale_x,
        (pointer_y - display.y) * scale_y,
    )
}

/// Wrap an angle in degrees into `(-180, 180]`. Non-finite input yields 0.
pub fn normalize_degrees(degrees: f32) -> f32 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped > 180.0 { wrapped - 360.0 } else { wrapped }
}

pub fn degrees_to_radians(degrees: f32) -> f32 {
    normalize_degrees(degrees).to_radians()
}

/// Run `draw` with the surface rotated by `degrees` around `(cx, cy)`.
///
/// The sequence is save → translate → rotate → translate back → draw →
/// restore. A rotation that normalizes to zero calls `draw` directly.
pub fn rotate_around_center<R>(
    surface: &mut Surface,
    degrees: f32,
    cx: f32,
    cy: f32,
    draw: impl FnOnce(&mut Surface) -> R,
) -> R {
    let radians = degrees_to_radians(degrees);
    if radians == 0.0 {
        return draw(surface);
    }
    surface.save();
    surface.translate(cx, cy);
    surface.rotate(radians);
    surface.translate(-cx, -cy);
    let result = draw(surface);
    surface.restore();
    result
}

// ---------------------------------------------------------------------------
//  2×3 affine matrix
// ---------------------------------------------------------------------------

/// 2D affine transform `(x, y) → (a·x + c·y + e, b·x + d·y + f)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 };

    pub fn translation(dx: f32, dy: f32) -> Self {
        Self { e: dx, f: dy, ..Self::IDENTITY }
    }

    pub fn rotation(radians: f32) -> Self {
        let (sin, cos) = radians.sin_cos();
        Self { a: cos, b: sin, c: -sin, d: cos, e: 0.0, f: 0.0 }
    }

    /// `self ∘ other`: apply `other` first, then `self`.
    pub fn then_local(&self, other: &Affine) -> Self {
        Self {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Inverse transform, or `None` for a singular matrix.
    pub fn invert(&self) -> Option<Self> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < 1e-12 {
            return None;
        }
        let inv = 1.0 / det;
        Some(Self {
            a: self.d * inv,
            b: -self.b * inv,
            c: -self.c * inv,
            d: self.a * inv,
            e: (self.c * self.f - self.d * self.e) * inv,
            f: (self.b * self.e - self.a * self.f) * inv,
        })
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Axis-aligned bounds of `rect` after transformation.
    pub fn transform_bounds(&self, rect: &Rect) -> Rect {
        let mut min_x = f32::MAX;
        let mut min_y = f32::MAX;
        let mut max_x = f32::MIN;
        let mut max_y = f32::MIN;
        for (x, y) in rect.corners() {
            let (tx, ty) = self.apply(x, y);
            min_x = min_x.min(tx);
            min_y = min_y.min(ty);
            max_x = max_x.max(tx);
            max_y = max_y.max(ty);
        }
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_to_canvas_scales_each_axis() {
        // 1792×1024 buffer displayed at 60% size, offset inside the page.
        let display = Rect::new(40.0, 10.0, 1075.2, 614.4);
        let (cx, cy) = screen_to_canvas(40.0 + 537.6, 10.0 + 307.2, display, (1792.0, 1024.0));
        assert!((cx - 896.0).abs() < 1e-3);
        assert!((cy - 512.0).abs() < 1e-3);
    }

    #[test]
    fn screen_to_canvas_is_not_rounded() {
        let display = Rect::new(0.0, 0.0, 896.0, 512.0);
        let (cx, cy) = screen_to_canvas(10.25, 3.5, display, (1792.0, 1024.0));
        assert_eq!(cx, 20.5);
        assert_eq!(cy, 7.0);
    }

    #[test]
    fn degenerate_display_rect_maps_one_to_one() {
        let display = Rect::new(5.0, 5.0, 0.0, 0.0);
        assert_eq!(screen_to_canvas(15.0, 25.0, display, (100.0, 100.0)), (10.0, 20.0));
    }

    #[test]
    fn normalize_wraps_into_half_open_range() {
        assert_eq!(normalize_degrees(0.0), 0.0);
        assert_eq!(normalize_degrees(180.0), 180.0);
        assert_eq!(normalize_degrees(-180.0), 180.0);
        assert_eq!(normalize_degrees(270.0), -90.0);
        assert_eq!(normalize_degrees(720.0 + 45.0), 45.0);
        assert_eq!(normalize_degrees(f32::NAN), 0.0);
    }

    #[test]
    fn inverse_round_trips_a_rotation_about_a_point() {
        let m = Affine::translation(50.0, 20.0)
            .then_local(&Affine::rotation(0.7))
            .then_local(&Affine::translation(-50.0, -20.0));
        let inv = m.invert().unwrap();
        let (x, y) = m.apply(13.0, -4.0);
        let (bx, by) = inv.apply(x, y);
        assert!((bx - 13.0).abs() < 1e-4);
        assert!((by + 4.0).abs() < 1e-4);
        // The pivot itself stays fixed.
        let (px, py) = m.apply(50.0, 20.0);
        assert!((px - 50.0).abs() < 1e-4 && (py - 20.0).abs() < 1e-4);
    }

    #[test]
    fn zero_rotation_leaves_transform_untouched() {
        let mut surface = Surface::new(4, 4);
        let seen = rotate_around_center(&mut surface, 360.0, 2.0, 2.0, |s| s.transform());
        assert!(seen.is_identity());
        assert_eq!(surface.depth(), 0);
    }

    #[test]
    fn rotation_is_scoped_to_the_draw_call() {
        let mut surface = Surface::new(4, 4);
        let seen = rotate_around_center(&mut surface, 90.0, 2.0, 2.0, |s| s.transform());
        assert!(!seen.is_identity());
        assert!(surface.transform().is_identity());
    }
}
