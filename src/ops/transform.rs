// ============================================================================
// RESAMPLING: bilinear sampling for stretched bitmap draws
// ============================================================================

use image::RgbaImage;

/// Bilinear sample at continuous source coordinates, where pixel `(i, j)` has
/// its center at `(i + 0.5, j + 0.5)`.
///
/// Out-of-range taps clamp to the nearest edge pixel, so a bitmap stretched
/// into a rectangle keeps solid edges instead of fading into transparency.
/// Interpolation runs on premultiplied values to avoid dark fringes around
/// transparent regions; the result is straight RGBA in 0..255.
pub fn bilinear_sample(img: &RgbaImage, x: f32, y: f32) -> [f32; 4] {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return [0.0; 4];
    }
    let sx = x - 0.5;
    let sy = y - 0.5;
    let x0 = sx.floor();
    let y0 = sy.floor();
    let fx = sx - x0;
    let fy = sy - y0;
    let x0 = x0 as i64;
    let y0 = y0 as i64;

    let raw = img.as_raw();
    let stride = w as usize * 4;
    let sample = |px: i64, py: i64| -> [f32; 4] {
        let cx = px.clamp(0, w as i64 - 1) as usize;
        let cy = py.clamp(0, h as i64 - 1) as usize;
        let idx = cy * stride + cx * 4;
        let a = raw[idx + 3] as f32 / 255.0;
        [
            raw[idx] as f32 * a,
            raw[idx + 1] as f32 * a,
            raw[idx + 2] as f32 * a,
            a,
        ]
    };

    let tl = sample(x0, y0);
    let tr = sample(x0 + 1, y0);
    let bl = sample(x0, y0 + 1);
    let br = sample(x0 + 1, y0 + 1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut pm = [0.0f32; 4];
    for c in 0..4 {
        let top = lerp(tl[c], tr[c], fx);
        let bot = lerp(bl[c], br[c], fx);
        pm[c] = lerp(top, bot, fy);
    }

    let a = pm[3];
    if a <= 1e-6 {
        return [0.0; 4];
    }
    [pm[0] / a, pm[1] / a, pm[2] / a, a * 255.0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn pixel_centers_return_exact_values() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([0, 0, 255, 255]));
        let left = bilinear_sample(&img, 0.5, 0.5);
        assert_eq!(left, [255.0, 0.0, 0.0, 255.0]);
        let mid = bilinear_sample(&img, 1.0, 0.5);
        assert!((mid[0] - 127.5).abs() < 0.01);
        assert!((mid[2] - 127.5).abs() < 0.01);
    }

    #[test]
    fn edges_clamp_instead_of_fading() {
        let img = RgbaImage::from_pixel(3, 3, Rgba([10, 20, 30, 255]));
        let corner = bilinear_sample(&img, 0.0, 0.0);
        assert_eq!(corner[3], 255.0);
        assert!((corner[0] - 10.0).abs() < 0.01);
    }

    #[test]
    fn transparent_neighbours_do_not_darken() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
        let mid = bilinear_sample(&img, 1.0, 0.5);
        assert!((mid[0] - 255.0).abs() < 0.01);
        assert!((mid[3] - 127.5).abs() < 0.01);
    }
}
