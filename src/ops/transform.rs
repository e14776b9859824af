// ============================================================================
// TRANSFORM OPERATIONS — resampling and rotation of layer sources
// ============================================================================

use image::{Rgba, RgbaImage, imageops};
use rayon::prelude::*;

pub const MIN_SCALE: f32 = 0.1;
pub const MAX_SCALE: f32 = 5.0;

/// Pixel size of a `width × height` raster at `scale` (truncated, never zero).
pub fn scaled_dimensions(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let w = ((width as f32 * scale) as u32).max(1);
    let h = ((height as f32 * scale) as u32).max(1);
    (w, h)
}

/// Resample `src` by `scale`.  Shrinking uses area averaging, enlarging uses
/// Lanczos3.  A scale that keeps the dimensions returns an exact copy.
pub fn resample(src: &RgbaImage, scale: f32) -> RgbaImage {
    let (w, h) = src.dimensions();
    let (nw, nh) = scaled_dimensions(w, h, scale);
    if (nw, nh) == (w, h) {
        return src.clone();
    }
    if nw <= w && nh <= h {
        imageops::thumbnail(src, nw, nh)
    } else {
        imageops::resize(src, nw, nh, imageops::FilterType::Lanczos3)
    }
}

/// Rotate `src` by `angle_deg` (positive = counter-clockwise) about its
/// centre into a raster of the same size.  Uncovered pixels are transparent.
pub fn rotate_about_center(src: &RgbaImage, angle_deg: f32) -> RgbaImage {
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return src.clone();
    }
    let cx = (w / 2) as f32;
    let cy = (h / 2) as f32;
    let (sin, cos) = angle_deg.to_radians().sin_cos();

    let stride = w as usize * 4;
    let mut out = vec![0u8; stride * h as usize];
    out.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let dy = y as f32 - cy;
        for x in 0..w as usize {
            let dx = x as f32 - cx;
            // Inverse map: destination → source.
            let sx = cx + cos * dx - sin * dy;
            let sy = cy + sin * dx + cos * dy;
            let px = bilinear_sample(src, sx, sy);
            row[x * 4..x * 4 + 4].copy_from_slice(&px.0);
        }
    });

    RgbaImage::from_raw(w, h, out).unwrap_or_else(|| RgbaImage::new(w, h))
}

/// Produce the displayed raster for a layer from its canonical source.
pub fn render_source(source: &RgbaImage, scale: f32, angle_deg: f32) -> RgbaImage {
    let scaled = resample(source, scale);
    if angle_deg.rem_euclid(360.0) == 0.0 {
        scaled
    } else {
        rotate_about_center(&scaled, angle_deg)
    }
}

fn bilinear_sample(img: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let sample = |sx: i32, sy: i32| -> [f32; 4] {
        if sx < 0 || sy < 0 || sx >= img.width() as i32 || sy >= img.height() as i32 {
            [0.0; 4]
        } else {
            let p = img.get_pixel(sx as u32, sy as u32);
            [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
        }
    };

    let tl = sample(x0, y0);
    let tr = sample(x0 + 1, y0);
    let bl = sample(x0, y0 + 1);
    let br = sample(x0 + 1, y0 + 1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = lerp(tl[c], tr[c], fx);
        let bot = lerp(bl[c], br[c], fx);
        out[c] = lerp(top, bot, fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        })
    }

    #[test]
    fn unit_scale_is_exact_copy() {
        let src = checker(7, 5);
        assert_eq!(resample(&src, 1.0), src);
        assert_eq!(render_source(&src, 1.0, 0.0), src);
        assert_eq!(render_source(&src, 1.0, 360.0), src);
    }

    #[test]
    fn resample_truncates_dimensions() {
        let src = checker(100, 50);
        assert_eq!(resample(&src, 0.5).dimensions(), (50, 25));
        assert_eq!(resample(&src, 1.25).dimensions(), (125, 62));
        assert_eq!(resample(&src, 0.001).dimensions(), (1, 1));
    }

    #[test]
    fn rotation_keeps_size_and_clears_corners() {
        let src = RgbaImage::from_pixel(20, 10, Rgba([9, 9, 9, 255]));
        let out = rotate_about_center(&src, 90.0);
        assert_eq!(out.dimensions(), (20, 10));
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(10, 5), &Rgba([9, 9, 9, 255]));
    }

    #[test]
    fn half_turn_maps_pixel_through_centre() {
        let mut src = RgbaImage::new(9, 9);
        src.put_pixel(6, 4, Rgba([1, 2, 3, 255]));
        let out = rotate_about_center(&src, 180.0);
        assert_eq!(out.get_pixel(2, 4), &Rgba([1, 2, 3, 255]));
    }
}
