// ============================================================================
// IMAGE FILTERS — Gaussian blur and sharpen
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;

/// A raster filter with its parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filter {
    /// Gaussian blur over a `kernel_size`-tap window.  0 leaves the image
    /// untouched; even sizes are bumped to the next odd size.
    Blur { kernel_size: u32 },
    Sharpen,
}

impl Filter {
    pub fn label(&self) -> String {
        match self {
            Filter::Blur { kernel_size } => format!("Blur ({})", kernel_size),
            Filter::Sharpen => "Sharpen".to_string(),
        }
    }

    /// Whether applying this filter returns the input unchanged.
    pub fn is_identity(&self) -> bool {
        matches!(self, Filter::Blur { kernel_size: 0 })
    }
}

/// Apply `filter` to `src`, returning a new raster of the same size.
pub fn apply_filter(src: &RgbaImage, filter: Filter) -> RgbaImage {
    match filter {
        Filter::Blur { kernel_size: 0 } => src.clone(),
        Filter::Blur { kernel_size } => {
            let ksize = if kernel_size % 2 == 0 { kernel_size + 1 } else { kernel_size };
            parallel_gaussian_blur(src, &build_gaussian_kernel(ksize))
        }
        Filter::Sharpen => sharpen(src),
    }
}

// ---------------------------------------------------------------------------
//  Parallel separable Gaussian blur (rayon)
// ---------------------------------------------------------------------------

/// Sigma implied by an odd kernel size when none is given explicitly.
fn sigma_for_kernel(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Build a normalized 1-D Gaussian kernel of `ksize` taps.
fn build_gaussian_kernel(ksize: u32) -> Vec<f32> {
    let len = ksize.max(1) as usize;
    if len == 1 {
        return vec![1.0];
    }
    let sigma = sigma_for_kernel(ksize);
    let radius = (len / 2) as f32;
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..len)
        .map(|i| {
            let x = i as f32 - radius;
            (-x * x / s2).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    let inv = 1.0 / sum;
    for v in &mut kernel {
        *v *= inv;
    }
    kernel
}

/// Rayon-parallelized separable blur over all four channels.  Edge pixels
/// are clamped.
fn parallel_gaussian_blur(src: &RgbaImage, kernel: &[f32]) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 || kernel.len() == 1 {
        return src.clone();
    }

    let radius = kernel.len() / 2;
    let buf_in: Vec<f32> = src.as_raw().iter().map(|&b| b as f32).collect();
    let pixel_count = w * h * 4;

    // --- Horizontal pass (parallel by row) ---
    let mut buf_h = vec![0.0f32; pixel_count];
    buf_h.par_chunks_mut(w * 4).enumerate().for_each(|(y, row_out)| {
        let row_in_start = y * w * 4;
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x as isize + ki as isize - radius as isize).clamp(0, w as isize - 1) as usize;
                let idx = row_in_start + sx * 4;
                for c in 0..4 {
                    acc[c] += buf_in[idx + c] * kv;
                }
            }
            row_out[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });

    // --- Vertical pass (parallel by row) ---
    let mut dst_raw = vec![0u8; pixel_count];
    dst_raw.par_chunks_mut(w * 4).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y as isize + ki as isize - radius as isize).clamp(0, h as isize - 1) as usize;
                let idx = sy * w * 4 + x * 4;
                for c in 0..4 {
                    acc[c] += buf_h[idx + c] * kv;
                }
            }
            for c in 0..4 {
                row_out[x * 4 + c] = acc[c].round().clamp(0.0, 255.0) as u8;
            }
        }
    });

    RgbaImage::from_raw(w as u32, h as u32, dst_raw).unwrap_or_else(|| src.clone())
}

// ---------------------------------------------------------------------------
//  Sharpen (3x3 Laplacian boost)
// ---------------------------------------------------------------------------

/// Colour channels are convolved with centre 5 and four-neighbour -1.
/// Alpha is copied.
fn sharpen(src: &RgbaImage) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 {
        return src.clone();
    }
    let raw = src.as_raw();
    let at = |x: isize, y: isize, c: usize| -> i32 {
        let cx = x.clamp(0, w as isize - 1) as usize;
        let cy = y.clamp(0, h as isize - 1) as usize;
        raw[(cy * w + cx) * 4 + c] as i32
    };

    let mut dst_raw = vec![0u8; w * h * 4];
    dst_raw.par_chunks_mut(w * 4).enumerate().for_each(|(y, row_out)| {
        let y = y as isize;
        for x in 0..w {
            let xi = x as isize;
            for c in 0..3 {
                let v = 5 * at(xi, y, c) - at(xi - 1, y, c) - at(xi + 1, y, c) - at(xi, y - 1, c) - at(xi, y + 1, c);
                row_out[x * 4 + c] = v.clamp(0, 255) as u8;
            }
            row_out[x * 4 + 3] = at(xi, y, 3) as u8;
        }
    });

    RgbaImage::from_raw(w as u32, h as u32, dst_raw).unwrap_or_else(|| src.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn dot(size: u32) -> RgbaImage {
        let mut img = RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 255]));
        img.put_pixel(size / 2, size / 2, Rgba([255, 255, 255, 255]));
        img
    }

    #[test]
    fn zero_kernel_is_identity() {
        let src = dot(9);
        assert_eq!(apply_filter(&src, Filter::Blur { kernel_size: 0 }), src);
        assert!(Filter::Blur { kernel_size: 0 }.is_identity());
        assert!(!Filter::Sharpen.is_identity());
    }

    #[test]
    fn blur_spreads_and_preserves_flat_regions() {
        let src = dot(9);
        let out = apply_filter(&src, Filter::Blur { kernel_size: 5 });
        let centre = out.get_pixel(4, 4)[0];
        let neighbour = out.get_pixel(5, 4)[0];
        assert!(centre < 255 && centre > neighbour && neighbour > 0);
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));

        let flat = RgbaImage::from_pixel(6, 6, Rgba([90, 60, 30, 200]));
        assert_eq!(apply_filter(&flat, Filter::Blur { kernel_size: 7 }), flat);
    }

    #[test]
    fn even_kernel_matches_next_odd() {
        let src = dot(11);
        assert_eq!(
            apply_filter(&src, Filter::Blur { kernel_size: 4 }),
            apply_filter(&src, Filter::Blur { kernel_size: 5 })
        );
    }

    #[test]
    fn kernel_is_normalized() {
        for k in [3u32, 5, 9, 21] {
            let kernel = build_gaussian_kernel(k);
            assert_eq!(kernel.len(), k as usize);
            assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn sharpen_boosts_edges_and_keeps_alpha() {
        let mut src = RgbaImage::from_pixel(5, 5, Rgba([100, 100, 100, 128]));
        src.put_pixel(2, 2, Rgba([150, 150, 150, 128]));
        let out = sharpen(&src);
        // 5*150 - 4*100 = 350 -> clamped.
        assert_eq!(out.get_pixel(2, 2), &Rgba([255, 255, 255, 128]));
        // 5*100 - 3*100 - 150 = 50
        assert_eq!(out.get_pixel(2, 1), &Rgba([50, 50, 50, 128]));
        assert_eq!(out.get_pixel(0, 0), &Rgba([100, 100, 100, 128]));
    }
}
