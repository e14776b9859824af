use image::{Rgba, RgbaImage};

use crate::compositor::{self, Viewport};
use crate::ops::transform;

/// Name that marks the opaque background layer at the bottom of the stack.
pub const BASE_LAYER_NAME: &str = "Base Layer";

const BASE_FILL: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLANK_FILL: Rgba<u8> = Rgba([255, 255, 255, 0]);

/// A device- or layer-space position with sub-pixel precision.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Whole-pixel position of a layer's top-left corner on the canvas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Offset {
    pub x: i32,
    pub y: i32,
}

impl Offset {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Colour and width applied to newly opened strokes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokeStyle {
    pub color: Rgba<u8>,
    pub width: u32,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: Rgba([0, 0, 0, 255]),
            width: 3,
        }
    }
}

/// A freehand path in layer-local, unscaled coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Stroke {
    pub id: u64,
    pub points: Vec<Point>,
    pub color: Rgba<u8>,
    pub width: u32,
}

impl Stroke {
    pub fn new(id: u64, first: Point, style: StrokeStyle) -> Self {
        Self {
            id,
            points: vec![first],
            color: style.color,
            width: style.width,
        }
    }

    /// Strokes with fewer than two points have no segments to draw.
    pub fn is_drawable(&self) -> bool {
        self.points.len() >= 2
    }
}

/// One compositing plane.
///
/// `source` is the canonical raster the scale and rotate tools regenerate
/// `image` from, so repeated gestures never compound resampling loss.
#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub image: Option<RgbaImage>,
    pub source: Option<RgbaImage>,
    pub visible: bool,
    pub offset: Offset,
    pub scale: f32,
    pub angle: f32,
    pub strokes: Vec<Stroke>,
}

impl Layer {
    pub fn new(width: u32, height: u32, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            image: None,
            source: None,
            visible: true,
            offset: Offset::default(),
            scale: 1.0,
            angle: 0.0,
            strokes: Vec::new(),
        }
    }

    /// A layer filled with fully transparent pixels.
    pub fn transparent(width: u32, height: u32, name: impl Into<String>) -> Self {
        let mut layer = Self::new(width, height, name);
        layer.image = Some(RgbaImage::from_pixel(width, height, BLANK_FILL));
        layer
    }

    /// The opaque white background layer.
    pub fn base(width: u32, height: u32) -> Self {
        let mut layer = Self::new(width, height, BASE_LAYER_NAME);
        layer.image = Some(RgbaImage::from_pixel(width, height, BASE_FILL));
        layer
    }

    /// A content layer whose pixels double as its regeneration source.
    pub fn with_source(image: RgbaImage, name: impl Into<String>) -> Self {
        let mut layer = Self::new(image.width(), image.height(), name);
        layer.source = Some(image.clone());
        layer.image = Some(image);
        layer
    }

    pub fn is_base(&self) -> bool {
        self.name == BASE_LAYER_NAME
    }

    pub fn set_offset(&mut self, x: i32, y: i32) {
        self.offset = Offset::new(x, y);
    }

    pub fn update_image(&mut self, image: RgbaImage) {
        self.image = Some(image);
    }

    pub fn append_stroke(&mut self, stroke: Stroke) {
        self.strokes.push(stroke);
    }

    /// Remove the stroke with `id`, returning it if it was present.
    pub fn remove_stroke(&mut self, id: u64) -> Option<Stroke> {
        let pos = self.strokes.iter().position(|s| s.id == id)?;
        Some(self.strokes.remove(pos))
    }

    pub fn stroke_mut(&mut self, id: u64) -> Option<&mut Stroke> {
        self.strokes.iter_mut().find(|s| s.id == id)
    }

    /// Rebuild `image` from `source` at the current scale and angle.
    /// Layers without a source are left untouched.
    pub fn regenerate(&mut self) {
        if let Some(ref source) = self.source {
            let image = transform::render_source(source, self.scale, self.angle);
            (self.width, self.height) = image.dimensions();
            self.image = Some(image);
        }
    }

    /// Fill the layer with opaque white at the given size (base layer only).
    pub fn refill_base(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.image = Some(RgbaImage::from_pixel(width, height, BASE_FILL));
    }
}

/// Owned copy of a layer's pixel state, taken before and after filters.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterSnapshot {
    pub image: Option<RgbaImage>,
    pub source: Option<RgbaImage>,
}

impl RasterSnapshot {
    pub fn capture(layer: &Layer) -> Self {
        Self {
            image: layer.image.clone(),
            source: layer.source.clone(),
        }
    }

    pub fn restore_into(&self, layer: &mut Layer) {
        layer.image = self.image.clone();
        layer.source = self.source.clone();
    }
}

/// The layer stack and canvas geometry of one editing session.
#[derive(Clone, Debug, PartialEq)]
pub struct CanvasState {
    pub layers: Vec<Layer>,
    pub active_layer_index: Option<usize>,
    pub width: u32,
    pub height: u32,
}

impl CanvasState {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            layers: Vec::new(),
            active_layer_index: None,
            width,
            height,
        }
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.active_layer_index.and_then(|i| self.layers.get(i))
    }

    pub fn active_layer_mut(&mut self) -> Option<&mut Layer> {
        self.active_layer_index.and_then(|i| self.layers.get_mut(i))
    }

    pub fn has_base_layer(&self) -> bool {
        self.layers.first().is_some_and(Layer::is_base)
    }

    /// Append a transparent canvas-sized layer and make it active.
    pub fn push_blank_layer(&mut self) -> usize {
        let name = format!("Layer {}", self.layers.len() + 1);
        self.layers.push(Layer::transparent(self.width, self.height, name));
        let idx = self.layers.len() - 1;
        self.active_layer_index = Some(idx);
        idx
    }

    /// Insert `layer` at `index` (clamped to the stack) and make it active.
    pub fn insert_layer(&mut self, index: usize, layer: Layer) -> usize {
        let idx = index.min(self.layers.len());
        self.layers.insert(idx, layer);
        self.active_layer_index = Some(idx);
        idx
    }

    /// Remove the layer at `index`, keeping the active pointer on a neighbour.
    pub fn remove_layer(&mut self, index: usize) -> Option<Layer> {
        if index >= self.layers.len() {
            return None;
        }
        let removed = self.layers.remove(index);
        self.active_layer_index = if self.layers.is_empty() {
            None
        } else {
            Some(index.min(self.layers.len() - 1))
        };
        Some(removed)
    }

    /// Place a decoded image: ensure a white base layer covering the image
    /// exists below it, add the image as a new content layer and make that
    /// layer active.
    pub fn load_image(&mut self, image: RgbaImage) -> usize {
        let (w, h) = image.dimensions();
        if self.has_base_layer() {
            self.layers[0].refill_base(w, h);
        } else {
            self.layers.insert(0, Layer::base(w, h));
        }
        let name = format!("Layer {}", self.layers.len() + 1);
        self.layers.push(Layer::with_source(image, name));
        self.width = w;
        self.height = h;
        let idx = self.layers.len() - 1;
        self.active_layer_index = Some(idx);
        idx
    }

    /// Flatten all visible layers as seen through `viewport`.
    pub fn composite(&self, viewport: Viewport) -> RgbaImage {
        compositor::render(&self.layers, (self.width, self.height), viewport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_image_creates_base_and_content_layers() {
        let mut state = CanvasState::new(10, 10);
        let img = RgbaImage::from_pixel(800, 600, Rgba([10, 20, 30, 255]));
        let idx = state.load_image(img.clone());

        assert_eq!(idx, 1);
        assert_eq!(state.active_layer_index, Some(1));
        assert_eq!((state.width, state.height), (800, 600));
        assert!(state.layers[0].is_base());
        let base = state.layers[0].image.as_ref().unwrap();
        assert_eq!(base.dimensions(), (800, 600));
        assert!(base.pixels().all(|p| *p == Rgba([255, 255, 255, 255])));
        assert_eq!(state.layers[1].image.as_ref(), Some(&img));
        assert_eq!(state.layers[1].source.as_ref(), Some(&img));
    }

    #[test]
    fn second_load_reuses_existing_base_layer() {
        let mut state = CanvasState::new(10, 10);
        state.load_image(RgbaImage::new(4, 4));
        let idx = state.load_image(RgbaImage::new(6, 2));
        assert_eq!(idx, 2);
        assert_eq!(state.layers.iter().filter(|l| l.is_base()).count(), 1);
        assert_eq!(state.layers[2].name, "Layer 3");
    }

    #[test]
    fn larger_second_load_grows_the_base_layer() {
        let mut state = CanvasState::new(10, 10);
        state.load_image(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
        state.load_image(RgbaImage::new(10, 8));

        let base = &state.layers[0];
        assert_eq!((base.width, base.height), (10, 8));
        assert_eq!(base.image.as_ref().map(|i| i.dimensions()), Some((10, 8)));

        let flat = state.composite(Viewport::default());
        assert_eq!(flat.dimensions(), (10, 8));
        assert!(flat.pixels().all(|p| p[3] == 255));
        assert_eq!(flat.get_pixel(9, 7), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn regenerate_tracks_rendered_size() {
        let mut layer = Layer::with_source(RgbaImage::new(10, 6), "L");
        layer.scale = 0.5;
        layer.regenerate();
        assert_eq!((layer.width, layer.height), (5, 3));
        assert_eq!(layer.image.as_ref().map(|i| i.dimensions()), Some((5, 3)));
    }

    #[test]
    fn remove_layer_keeps_active_in_range() {
        let mut state = CanvasState::new(4, 4);
        state.push_blank_layer();
        state.push_blank_layer();
        assert_eq!(state.remove_layer(1).map(|l| l.name), Some("Layer 2".to_string()));
        assert_eq!(state.active_layer_index, Some(0));
        state.remove_layer(0);
        assert_eq!(state.active_layer_index, None);
        assert!(state.remove_layer(0).is_none());
    }

    #[test]
    fn remove_stroke_by_id() {
        let mut layer = Layer::transparent(2, 2, "L");
        layer.append_stroke(Stroke::new(1, Point::ZERO, StrokeStyle::default()));
        layer.append_stroke(Stroke::new(2, Point::ZERO, StrokeStyle::default()));
        assert_eq!(layer.remove_stroke(1).map(|s| s.id), Some(1));
        assert!(layer.remove_stroke(1).is_none());
        assert_eq!(layer.strokes.len(), 1);
    }
}
