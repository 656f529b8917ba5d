// ============================================================================
// SURFACE: RGBA raster target with a save/restore paint state stack
// ============================================================================
//
// Drawing is expressed in "local" coordinates that the current transform maps
// onto the pixel grid. Every primitive goes through `composite`, which walks
// the device-space bounding box row by row (rayon), maps each pixel center
// back into local space and blends the shaded result source-over.

use image::RgbaImage;
use rayon::prelude::*;

use crate::color::Color;
use crate::geometry::{Affine, Rect};
use crate::ops::shapes::{Polygon, ShapeOutline, fill_coverage, stroke_coverage};
use crate::ops::transform::bilinear_sample;

/// Drop shadow applied to mask draws while set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Shadow {
    pub color: Color,
    pub blur: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct PaintState {
    global_alpha: f32,
    transform: Affine,
    shadow: Option<Shadow>,
}

impl Default for PaintState {
    fn default() -> Self {
        Self { global_alpha: 1.0, transform: Affine::IDENTITY, shadow: None }
    }
}

pub struct Surface {
    pixels: RgbaImage,
    state: PaintState,
    stack: Vec<PaintState>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
            state: PaintState::default(),
            stack: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    /// Resize (if needed) and clear to transparent, dropping all paint state.
    pub fn reset(&mut self, width: u32, height: u32) {
        if self.pixels.dimensions() != (width, height) {
            self.pixels = RgbaImage::new(width, height);
        } else {
            self.clear();
        }
        self.state = PaintState::default();
        self.stack.clear();
    }

    pub fn clear(&mut self) {
        let raw: &mut [u8] = &mut self.pixels;
        raw.fill(0);
    }

    // --- paint state ---------------------------------------------------------

    pub fn save(&mut self) {
        self.stack.push(self.state);
    }

    /// Pop the last saved state. Unbalanced calls are ignored.
    pub fn restore(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    /// Number of saved states.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn transform(&self) -> Affine {
        self.state.transform
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.state.transform = self.state.transform.then_local(&Affine::translation(dx, dy));
    }

    pub fn rotate(&mut self, radians: f32) {
        self.state.transform = self.state.transform.then_local(&Affine::rotation(radians));
    }

    pub fn global_alpha(&self) -> f32 {
        self.state.global_alpha
    }

    pub fn set_global_alpha(&mut self, alpha: f32) {
        self.state.global_alpha = if alpha.is_nan() { 1.0 } else { alpha.clamp(0.0, 1.0) };
    }

    pub fn shadow(&self) -> Option<Shadow> {
        self.state.shadow
    }

    pub fn set_shadow(&mut self, shadow: Option<Shadow>) {
        self.state.shadow = shadow.filter(|s| !s.color.is_transparent());
    }

    // --- compositing core -----------------------------------------------------

    /// Blend `shader` over every pixel whose center maps inside `local`.
    ///
    /// The shader receives local coordinates and returns straight RGB plus an
    /// alpha in 0..1, or `None` for "no paint".
    fn composite<F>(&mut self, local: Rect, shader: F)
    where
        F: Fn(f32, f32) -> Option<([f32; 3], f32)> + Sync,
    {
        let alpha_scale = self.state.global_alpha;
        if alpha_scale <= 0.0 || local.width <= 0.0 || local.height <= 0.0 {
            return;
        }
        let transform = self.state.transform;
        let Some(inverse) = transform.invert() else {
            return;
        };

        let device = transform.transform_bounds(&local);
        let (w, h) = self.pixels.dimensions();
        let x0 = device.x.floor().max(0.0) as u32;
        let y0 = device.y.floor().max(0.0) as u32;
        let x1 = (device.right().ceil().max(0.0) as u32).min(w);
        let y1 = (device.bottom().ceil().max(0.0) as u32).min(h);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let row_bytes = w as usize * 4;
        let raw: &mut [u8] = &mut self.pixels;
        raw.par_chunks_mut(row_bytes)
            .enumerate()
            .skip(y0 as usize)
            .take((y1 - y0) as usize)
            .for_each(|(row, row_buf)| {
                let py = row as f32 + 0.5;
                for col in x0..x1 {
                    let px = col as f32 + 0.5;
                    let (lx, ly) = inverse.apply(px, py);
                    if !local.contains(lx, ly) {
                        continue;
                    }
                    let Some((rgb, a)) = shader(lx, ly) else {
                        continue;
                    };
                    let sa = (a * alpha_scale).clamp(0.0, 1.0);
                    if sa <= 0.0 {
                        continue;
                    }
                    let idx = col as usize * 4;
                    blend_over(&mut row_buf[idx..idx + 4], rgb, sa);
                }
            });
    }

    // --- primitives -------------------------------------------------------------

    /// Draw `bitmap` stretched into `dest`.
    pub fn draw_image(&mut self, bitmap: &RgbaImage, dest: Rect) {
        let (bw, bh) = bitmap.dimensions();
        if bw == 0 || bh == 0 || dest.width <= 0.0 || dest.height <= 0.0 {
            return;
        }
        let sx = bw as f32 / dest.width;
        let sy = bh as f32 / dest.height;
        self.composite(dest, |lx, ly| {
            let s = bilinear_sample(bitmap, (lx - dest.x) * sx, (ly - dest.y) * sy);
            Some(([s[0], s[1], s[2]], s[3] / 255.0))
        });
    }

    /// Fill the inside of a shape outline.
    pub fn fill_shape(&mut self, outline: &ShapeOutline, color: Color) {
        if color.is_transparent() {
            return;
        }
        let rgb = rgb_f32(color);
        let a = color.alpha();
        self.composite(outline.bounds().inflate(1.0), |lx, ly| {
            let cov = fill_coverage(outline.signed_distance(lx, ly));
            (cov > 0.0).then_some((rgb, a * cov))
        });
    }

    /// Stroke a shape outline with a line of `width` centred on the edge.
    pub fn stroke_shape(&mut self, outline: &ShapeOutline, color: Color, width: f32) {
        if color.is_transparent() || width <= 0.0 {
            return;
        }
        let rgb = rgb_f32(color);
        let a = color.alpha();
        self.composite(outline.bounds().inflate(width * 0.5 + 1.0), |lx, ly| {
            let cov = stroke_coverage(outline.signed_distance(lx, ly), width);
            (cov > 0.0).then_some((rgb, a * cov))
        });
    }

    /// Stroke a closed polygon with a `[on, off]` dash pattern.
    pub fn stroke_dashed(&mut self, polygon: &Polygon, color: Color, width: f32, dash: [f32; 2]) {
        if color.is_transparent() || width <= 0.0 {
            return;
        }
        let rgb = rgb_f32(color);
        let a = color.alpha();
        self.composite(polygon.bounds().inflate(width * 0.5 + 1.0), |lx, ly| {
            let cov = polygon.dashed_stroke_coverage(lx, ly, width, dash);
            (cov > 0.0).then_some((rgb, a * cov))
        });
    }

    /// Paint `color` through a coverage mask, preceded by the current shadow.
    pub fn draw_mask(&mut self, mask: &Mask, color: Color) {
        if color.is_transparent() || mask.is_empty() {
            return;
        }
        if let Some(shadow) = self.state.shadow {
            let (dx, dy) = self.device_offset_to_local(shadow.offset_x, shadow.offset_y);
            let shadow_mask = mask.blurred(shadow.blur * 0.5).offset(dx, dy);
            // The shadow inherits the paint's own alpha.
            let tint = Color::rgba(
                shadow.color.0[0],
                shadow.color.0[1],
                shadow.color.0[2],
                (shadow.color.alpha() * color.alpha() * 255.0).round() as u8,
            );
            self.paint_mask(&shadow_mask, tint);
        }
        self.paint_mask(mask, color);
    }

    /// Shadow offsets are in device pixels and ignore the current transform.
    fn device_offset_to_local(&self, dx: f32, dy: f32) -> (f32, f32) {
        if self.state.transform.is_identity() {
            return (dx, dy);
        }
        match self.state.transform.invert() {
            Some(inverse) => {
                let (ox, oy) = inverse.apply(0.0, 0.0);
                let (lx, ly) = inverse.apply(dx, dy);
                (lx - ox, ly - oy)
            }
            None => (dx, dy),
        }
    }

    fn paint_mask(&mut self, mask: &Mask, color: Color) {
        let rgb = rgb_f32(color);
        let a = color.alpha();
        self.composite(mask.bounds(), |lx, ly| {
            let cov = mask.sample(lx, ly);
            (cov > 0.0).then_some((rgb, a * cov))
        });
    }
}

fn rgb_f32(color: Color) -> [f32; 3] {
    [color.0[0] as f32, color.0[1] as f32, color.0[2] as f32]
}

/// Straight-alpha source-over.
#[inline]
fn blend_over(dst: &mut [u8], src: [f32; 3], sa: f32) {
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return;
    }
    for c in 0..3 {
        let v = (src[c] * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

// ============================================================================
// Coverage masks
// ============================================================================

/// Single-channel coverage grid placed in local coordinates. Texel `(i, j)`
/// covers `[x + i, x + i + 1) × [y + j, y + j + 1)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    pub x: f32,
    pub y: f32,
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl Mask {
    pub fn new(x: f32, y: f32, width: u32, height: u32) -> Self {
        Self { x, y, width, height, data: vec![0.0; width as usize * height as usize] }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width as f32, self.height as f32)
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&c| c <= 0.0)
    }

    #[inline]
    fn texel(&self, i: i64, j: i64) -> f32 {
        if i < 0 || j < 0 || i >= self.width as i64 || j >= self.height as i64 {
            0.0
        } else {
            self.data[j as usize * self.width as usize + i as usize]
        }
    }

    /// Bilinear coverage at a local point; zero outside the grid.
    pub fn sample(&self, lx: f32, ly: f32) -> f32 {
        let u = lx - self.x - 0.5;
        let v = ly - self.y - 0.5;
        let i0 = u.floor();
        let j0 = v.floor();
        let fx = u - i0;
        let fy = v - j0;
        let (i0, j0) = (i0 as i64, j0 as i64);
        let top = self.texel(i0, j0) * (1.0 - fx) + self.texel(i0 + 1, j0) * fx;
        let bot = self.texel(i0, j0 + 1) * (1.0 - fx) + self.texel(i0 + 1, j0 + 1) * fx;
        top * (1.0 - fy) + bot * fy
    }

    /// Empty mask covering this one grown by `pad` texels on every side.
    fn padded(&self, pad: u32) -> Mask {
        let grow = pad.saturating_mul(2);
        Mask::new(
            self.x - pad as f32,
            self.y - pad as f32,
            self.width.saturating_add(grow),
            self.height.saturating_add(grow),
        )
    }

    /// Same coverage, moved by `(dx, dy)`.
    pub fn offset(mut self, dx: f32, dy: f32) -> Self {
        self.x += dx;
        self.y += dy;
        self
    }

    /// Grow coverage outward by `radius` pixels (circular max filter). Used to
    /// turn a glyph mask into the outer half of a centred stroke.
    pub fn dilate(&self, radius: f32) -> Mask {
        if radius.is_nan() || radius <= 0.0 {
            return self.clone();
        }
        let radius = radius.min(MAX_FILTER_RADIUS);
        let pad = (radius.ceil() as u32).saturating_add(1);
        let mut out = self.padded(pad);
        let r = pad as i64;
        // Kernel taps with their weight: full inside the radius, soft at the rim.
        let mut taps: Vec<(i64, i64, f32)> = Vec::new();
        for dy in -r..=r {
            for dx in -r..=r {
                let d = ((dx * dx + dy * dy) as f32).sqrt();
                let w = (radius + 0.5 - d).clamp(0.0, 1.0);
                if w > 0.0 {
                    taps.push((dx, dy, w));
                }
            }
        }
        let out_w = out.width as usize;
        out.data.par_chunks_mut(out_w).enumerate().for_each(|(j, row)| {
            let sj = j as i64 - r;
            for (i, slot) in row.iter_mut().enumerate() {
                let si = i as i64 - r;
                let mut best = 0.0f32;
                for &(dx, dy, w) in &taps {
                    let c = self.texel(si + dx, sj + dy) * w;
                    if c > best {
                        best = c;
                    }
                }
                *slot = best;
            }
        });
        out
    }

    /// Gaussian-like blur with standard deviation `sigma` (three box passes).
    pub fn blurred(&self, sigma: f32) -> Mask {
        if sigma.is_nan() || sigma <= 0.0 {
            return self.clone();
        }
        let radii = box_radii(sigma.min(MAX_FILTER_RADIUS));
        let pad = radii.iter().fold(1u32, |acc, r| acc.saturating_add(*r));
        let mut out = self.padded(pad);
        let ow = out.width as usize;
        for j in 0..self.height as usize {
            let src = &self.data[j * self.width as usize..(j + 1) * self.width as usize];
            let start = (j + pad as usize) * ow + pad as usize;
            out.data[start..start + src.len()].copy_from_slice(src);
        }
        let (w, h) = (out.width as usize, out.height as usize);
        let mut scratch = vec![0.0f32; out.data.len()];
        for &r in &radii {
            box_blur_rows(&out.data, &mut scratch, w, r as usize);
            transpose(&scratch, &mut out.data, w, h);
            let mut t = vec![0.0f32; out.data.len()];
            box_blur_rows(&out.data, &mut t, h, r as usize);
            transpose(&t, &mut out.data, h, w);
        }
        out
    }
}

/// Largest dilate radius / blur sigma a mask filter will honour.
pub const MAX_FILTER_RADIUS: f32 = 64.0;

/// Box radii for three passes approximating a Gaussian of `sigma`.
fn box_radii(sigma: f32) -> [u32; 3] {
    let n = 3.0f32;
    let ideal = (12.0 * sigma * sigma / n + 1.0).sqrt();
    let mut wl = ideal.floor() as i32;
    if wl % 2 == 0 {
        wl -= 1;
    }
    let wu = wl + 2;
    let wl_f = wl as f32;
    let m = ((12.0 * sigma * sigma - n * wl_f * wl_f - 4.0 * n * wl_f - 3.0 * n) / (-4.0 * wl_f - 4.0)).round() as i32;
    let mut out = [0u32; 3];
    for (i, slot) in out.iter_mut().enumerate() {
        let size = if (i as i32) < m { wl } else { wu };
        *slot = ((size.max(1) - 1) / 2) as u32;
    }
    out
}

fn box_blur_rows(src: &[f32], dst: &mut [f32], width: usize, radius: usize) {
    if radius == 0 {
        dst.copy_from_slice(src);
        return;
    }
    let norm = 1.0 / (radius * 2 + 1) as f32;
    dst.par_chunks_mut(width)
        .zip(src.par_chunks(width))
        .for_each(|(out, row)| {
            let mut acc = 0.0f32;
            for &v in row.iter().take(radius + 1) {
                acc += v;
            }
            for i in 0..width {
                out[i] = acc * norm;
                if i + radius + 1 < width {
                    acc += row[i + radius + 1];
                }
                if i >= radius {
                    acc -= row[i - radius];
                }
            }
        });
}

fn transpose(src: &[f32], dst: &mut [f32], width: usize, height: usize) {
    for j in 0..height {
        for i in 0..width {
            dst[i * height + j] = src[j * width + i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px(s: &Surface, x: u32, y: u32) -> [u8; 4] {
        s.pixels().get_pixel(x, y).0
    }

    #[test]
    fn restore_without_save_is_ignored() {
        let mut s = Surface::new(2, 2);
        s.set_global_alpha(0.5);
        s.restore();
        assert_eq!(s.global_alpha(), 0.5);
        s.save();
        s.set_global_alpha(0.2);
        s.restore();
        assert_eq!(s.global_alpha(), 0.5);
    }

    #[test]
    fn box_fill_covers_exact_pixels() {
        let mut s = Surface::new(10, 10);
        let outline = ShapeOutline::Box { cx: 5.0, cy: 5.0, hx: 2.0, hy: 2.0 };
        s.fill_shape(&outline, Color::rgb(255, 0, 0));
        assert_eq!(px(&s, 4, 4), [255, 0, 0, 255]);
        assert_eq!(px(&s, 1, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn global_alpha_scales_paint() {
        let mut s = Surface::new(4, 4);
        s.set_global_alpha(0.5);
        s.draw_image(&RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 255, 255])), Rect::new(0.0, 0.0, 4.0, 4.0));
        assert_eq!(px(&s, 2, 2), [0, 0, 255, 128]);
    }

    #[test]
    fn source_over_keeps_opaque_background_opaque() {
        let mut s = Surface::new(4, 4);
        s.draw_image(&RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255])), Rect::new(0.0, 0.0, 4.0, 4.0));
        let half_red = ShapeOutline::Box { cx: 2.0, cy: 2.0, hx: 4.0, hy: 4.0 };
        s.fill_shape(&half_red, Color::rgba(255, 0, 0, 128));
        let p = px(&s, 1, 1);
        assert_eq!(p[3], 255);
        assert_eq!(p[0], 255);
        assert!((p[1] as i32 - 127).abs() <= 1);
    }

    #[test]
    fn rotated_draw_lands_elsewhere() {
        let mut s = Surface::new(20, 20);
        s.translate(10.0, 10.0);
        s.rotate(std::f32::consts::FRAC_PI_2);
        s.translate(-10.0, -10.0);
        // A bar to the right of the center ends up below it after 90°.
        let bar = ShapeOutline::Box { cx: 15.0, cy: 10.0, hx: 3.0, hy: 1.0 };
        s.fill_shape(&bar, Color::WHITE);
        assert_eq!(px(&s, 10, 15)[3], 255);
        assert_eq!(px(&s, 15, 10)[3], 0);
    }

    #[test]
    fn mask_sampling_hits_texel_centers() {
        let mut m = Mask::new(2.0, 3.0, 2, 1);
        m.data = vec![1.0, 0.0];
        assert_eq!(m.sample(2.5, 3.5), 1.0);
        assert_eq!(m.sample(3.5, 3.5), 0.0);
        assert!((m.sample(3.0, 3.5) - 0.5).abs() < 1e-6);
        assert_eq!(m.sample(-10.0, 3.5), 0.0);
    }

    #[test]
    fn dilate_spreads_coverage() {
        let mut m = Mask::new(0.0, 0.0, 1, 1);
        m.data = vec![1.0];
        let d = m.dilate(2.0);
        assert_eq!(d.sample(0.5, 0.5), 1.0);
        assert_eq!(d.sample(1.5, 0.5), 1.0);
        // Centers exactly on the radius are half covered.
        assert!((d.sample(2.5, 0.5) - 0.5).abs() < 1e-6);
        assert_eq!(d.sample(4.5, 0.5), 0.0);
    }

    #[test]
    fn blur_preserves_total_coverage() {
        let mut m = Mask::new(0.0, 0.0, 3, 3);
        m.data[4] = 9.0;
        let b = m.blurred(2.0);
        let total: f32 = b.data.iter().sum();
        assert!((total - 9.0).abs() < 0.05, "total {}", total);
        assert!(b.sample(1.5, 1.5) < 9.0);
        assert!(b.sample(3.5, 1.5) > 0.0);
    }

    #[test]
    fn shadow_draws_offset_copy_underneath() {
        let mut s = Surface::new(12, 12);
        let mut m = Mask::new(2.0, 2.0, 3, 3);
        m.data = vec![1.0; 9];
        s.set_shadow(Some(Shadow { color: Color::BLACK, blur: 0.0, offset_x: 5.0, offset_y: 5.0 }));
        s.draw_mask(&m, Color::WHITE);
        assert_eq!(px(&s, 3, 3), [255, 255, 255, 255]);
        assert_eq!(px(&s, 8, 8), [0, 0, 0, 255]);
        s.set_shadow(None);
        assert!(s.shadow().is_none());
    }

    #[test]
    fn oversized_filters_are_capped() {
        let mut m = Mask::new(0.0, 0.0, 2, 2);
        m.data = vec![1.0; 4];
        let d = m.dilate(1e10);
        assert!(d.width <= 2 + 2 * (MAX_FILTER_RADIUS as u32 + 1));
        assert_eq!(d.sample(30.5, 0.5), 1.0);
        let b = m.blurred(1e10);
        assert!(b.width < 2 + 8 * MAX_FILTER_RADIUS as u32);
        assert!(m.dilate(f32::NAN) == m);
        assert!(m.blurred(f32::INFINITY).width > m.width);
    }

    #[test]
    fn shadow_offset_ignores_rotation() {
        let mut s = Surface::new(20, 20);
        s.translate(10.0, 10.0);
        s.rotate(std::f32::consts::FRAC_PI_2);
        s.translate(-10.0, -10.0);
        let mut m = Mask::new(9.0, 9.0, 2, 2);
        m.data = vec![1.0; 4];
        s.set_shadow(Some(Shadow { color: Color::BLACK, blur: 0.0, offset_x: 5.0, offset_y: 0.0 }));
        s.draw_mask(&m, Color::WHITE);
        // Offset to the right on screen, whatever the layer rotation.
        assert_eq!(px(&s, 15, 10), [0, 0, 0, 255]);
        assert_eq!(px(&s, 10, 15), [0, 0, 0, 0]);
        assert_eq!(px(&s, 10, 10), [255, 255, 255, 255]);
    }

    #[test]
    fn reset_clears_pixels_and_state() {
        let mut s = Surface::new(3, 3);
        s.fill_shape(&ShapeOutline::Box { cx: 1.5, cy: 1.5, hx: 2.0, hy: 2.0 }, Color::WHITE);
        s.save();
        s.translate(1.0, 1.0);
        s.reset(3, 3);
        assert_eq!(s.depth(), 0);
        assert!(s.transform().is_identity());
        assert!(s.pixels().pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }
}
