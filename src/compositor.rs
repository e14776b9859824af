// ============================================================================
// COMPOSITOR — flattens the layer stack (rasters + strokes) into one image
// ============================================================================

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::canvas::{Layer, Offset, Point, Stroke};

/// The window through which the canvas is rendered.  `scroll` is subtracted
/// from every canvas position, so a zero viewport renders the canvas as-is.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub scroll: Point,
}

impl Viewport {
    pub fn scrolled(x: f32, y: f32) -> Self {
        Self { scroll: Point::new(x, y) }
    }
}

/// Map a stroke point from layer-local unscaled space to viewport space.
pub fn local_to_canvas(local: Point, offset: Offset, scale: f32, viewport: Viewport) -> Point {
    Point::new(
        local.x * scale + offset.x as f32 - viewport.scroll.x,
        local.y * scale + offset.y as f32 - viewport.scroll.y,
    )
}

/// Render `layers` bottom-to-top onto a transparent `canvas`-sized image.
///
/// Invisible layers and layers without content contribute no pixels.
/// Strokes of every visible layer are burned in after all rasters.
pub fn render(layers: &[Layer], canvas: (u32, u32), viewport: Viewport) -> RgbaImage {
    let (w, h) = canvas;
    let mut out = RgbaImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }

    let scroll_x = viewport.scroll.x.round() as i64;
    let scroll_y = viewport.scroll.y.round() as i64;
    let placed: Vec<(&RgbaImage, i64, i64)> = layers
        .iter()
        .filter(|l| l.visible)
        .filter_map(|l| {
            l.image
                .as_ref()
                .map(|img| (img, l.offset.x as i64 - scroll_x, l.offset.y as i64 - scroll_y))
        })
        .collect();

    let stride = w as usize * 4;
    let raw: &mut [u8] = &mut out;
    raw.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        for &(img, ox, oy) in &placed {
            let ly = y as i64 - oy;
            if ly < 0 || ly >= img.height() as i64 {
                continue;
            }
            let x_start = ox.max(0);
            let x_end = (ox + img.width() as i64).min(w as i64);
            for x in x_start..x_end {
                let top = *img.get_pixel((x - ox) as u32, ly as u32);
                let i = x as usize * 4;
                let base = Rgba([row[i], row[i + 1], row[i + 2], row[i + 3]]);
                row[i..i + 4].copy_from_slice(&blend_over(base, top).0);
            }
        }
    });

    for layer in layers.iter().filter(|l| l.visible) {
        for stroke in layer.strokes.iter().filter(|s| s.is_drawable()) {
            draw_stroke(&mut out, stroke, layer, viewport);
        }
    }

    out
}

/// Source-over blending of straight-alpha pixels.
pub fn blend_over(base: Rgba<u8>, top: Rgba<u8>) -> Rgba<u8> {
    // Fast paths: nothing to blend, or nothing underneath to show through.
    if top[3] == 0 {
        return base;
    }
    if top[3] == 255 || base[3] == 0 {
        return top;
    }

    let ta = top[3] as f32 / 255.0;
    let ba = base[3] as f32 / 255.0;
    let out_a = ta + ba * (1.0 - ta);

    let mut px = [0u8; 4];
    for c in 0..3 {
        let tc = top[c] as f32;
        let bc = base[c] as f32;
        px[c] = ((tc * ta + bc * ba * (1.0 - ta)) / out_a).round().clamp(0.0, 255.0) as u8;
    }
    px[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(px)
}

/// Rasterize one stroke as a chain of round-capped segments.
///
/// Coverage is gathered into a mask first so overlapping segment ends do not
/// blend a translucent colour twice.
fn draw_stroke(canvas: &mut RgbaImage, stroke: &Stroke, layer: &Layer, viewport: Viewport) {
    let pts: Vec<Point> = stroke
        .points
        .iter()
        .map(|p| local_to_canvas(*p, layer.offset, layer.scale, viewport))
        .collect();
    let radius = (stroke.width as f32 / 2.0).max(0.5);
    let (cw, ch) = canvas.dimensions();

    let Some((min_x, min_y, max_x, max_y)) = bounds(&pts, radius, cw, ch) else {
        return;
    };
    let bw = (max_x - min_x) as usize;
    let bh = (max_y - min_y) as usize;
    let mut mask = vec![false; bw * bh];

    for seg in pts.windows(2) {
        let (a, b) = (seg[0], seg[1]);
        let Some((sx0, sy0, sx1, sy1)) = bounds(seg, radius, cw, ch) else {
            continue;
        };
        for y in sy0..sy1 {
            for x in sx0..sx1 {
                let d = sdf_line_segment(x as f32 + 0.5, y as f32 + 0.5, a.x, a.y, b.x, b.y);
                if d <= radius {
                    mask[(y - min_y) as usize * bw + (x - min_x) as usize] = true;
                }
            }
        }
    }

    for (i, covered) in mask.iter().enumerate() {
        if *covered {
            let x = min_x + (i % bw) as u32;
            let y = min_y + (i / bw) as u32;
            let base = *canvas.get_pixel(x, y);
            canvas.put_pixel(x, y, blend_over(base, stroke.color));
        }
    }
}

/// Pixel bounding box of `pts` grown by `radius`, clipped to the canvas.
fn bounds(pts: &[Point], radius: f32, cw: u32, ch: u32) -> Option<(u32, u32, u32, u32)> {
    let min_x = pts.iter().map(|p| p.x).fold(f32::INFINITY, f32::min) - radius;
    let max_x = pts.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max) + radius;
    let min_y = pts.iter().map(|p| p.y).fold(f32::INFINITY, f32::min) - radius;
    let max_y = pts.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max) + radius;

    let x0 = min_x.floor().max(0.0) as u32;
    let y0 = min_y.floor().max(0.0) as u32;
    let x1 = (max_x.ceil().max(0.0) as u32).min(cw);
    let y1 = (max_y.ceil().max(0.0) as u32).min(ch);
    (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
}

fn sdf_line_segment(px: f32, py: f32, ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let pax = px - ax;
    let pay = py - ay;
    let bax = bx - ax;
    let bay = by - ay;
    let len2 = bax * bax + bay * bay;
    let h = if len2 > 0.0 {
        ((pax * bax + pay * bay) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let dx = pax - bax * h;
    let dy = pay - bay * h;
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::StrokeStyle;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn solid(w: u32, h: u32, px: Rgba<u8>) -> Layer {
        let mut layer = Layer::new(w, h, "L");
        layer.image = Some(RgbaImage::from_pixel(w, h, px));
        layer
    }

    #[test]
    fn empty_stack_renders_transparent() {
        let out = render(&[], (4, 3), Viewport::default());
        assert_eq!(out.dimensions(), (4, 3));
        assert!(out.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn layers_paint_bottom_to_top_at_offsets() {
        let bottom = solid(4, 4, Rgba([0, 0, 255, 255]));
        let mut top = solid(2, 2, RED);
        top.set_offset(1, 1);
        let out = render(&[bottom, top], (4, 4), Viewport::default());
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
        assert_eq!(out.get_pixel(1, 1), &RED);
        assert_eq!(out.get_pixel(2, 2), &RED);
        assert_eq!(out.get_pixel(3, 3), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn hidden_and_empty_layers_are_skipped() {
        let mut hidden = solid(2, 2, RED);
        hidden.visible = false;
        let empty = Layer::new(2, 2, "Empty");
        let out = render(&[hidden, empty], (2, 2), Viewport::default());
        assert!(out.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn negative_offsets_are_clipped() {
        let mut layer = solid(3, 3, RED);
        layer.set_offset(-2, -2);
        let out = render(&[layer], (3, 3), Viewport::default());
        assert_eq!(out.get_pixel(0, 0), &RED);
        assert_eq!(out.get_pixel(1, 1)[3], 0);
    }

    #[test]
    fn half_alpha_over_opaque_mixes() {
        let px = blend_over(Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 128]));
        assert_eq!(px[3], 255);
        assert!((127..=129).contains(&px[0]));
        assert_eq!(blend_over(Rgba([1, 2, 3, 0]), Rgba([9, 8, 7, 100])), Rgba([9, 8, 7, 100]));
    }

    #[test]
    fn strokes_follow_layer_scale_and_offset() {
        let mut layer = Layer::transparent(20, 20, "L");
        layer.scale = 2.0;
        layer.set_offset(3, 0);
        let style = StrokeStyle { color: RED, width: 1 };
        let mut stroke = Stroke::new(1, Point::new(0.0, 2.25), style);
        stroke.points.push(Point::new(4.0, 2.25));
        layer.append_stroke(stroke);

        let out = render(&[layer], (20, 20), Viewport::default());
        // Canvas segment runs from (3, 4.5) to (11, 4.5).
        assert_eq!(out.get_pixel(7, 4), &RED);
        assert_eq!(out.get_pixel(1, 4)[3], 0);
        assert_eq!(out.get_pixel(7, 10)[3], 0);
    }

    #[test]
    fn single_point_stroke_draws_nothing() {
        let mut layer = Layer::transparent(5, 5, "L");
        layer.append_stroke(Stroke::new(1, Point::new(2.0, 2.0), StrokeStyle::default()));
        let out = render(&[layer], (5, 5), Viewport::default());
        assert!(out.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn render_is_deterministic() {
        let base = solid(16, 16, Rgba([200, 200, 200, 255]));
        let mut layer = solid(8, 8, Rgba([10, 200, 30, 90]));
        layer.set_offset(5, 3);
        let mut stroke = Stroke::new(7, Point::new(0.0, 0.0), StrokeStyle::default());
        stroke.points.push(Point::new(6.0, 7.0));
        stroke.points.push(Point::new(1.0, 7.0));
        layer.append_stroke(stroke);
        let layers = vec![base, layer];

        let a = render(&layers, (16, 16), Viewport::scrolled(1.0, 2.0));
        let b = render(&layers, (16, 16), Viewport::scrolled(1.0, 2.0));
        assert_eq!(a.as_raw(), b.as_raw());
    }
}
