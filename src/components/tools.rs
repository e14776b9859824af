use image::RgbaImage;

use crate::canvas::{Layer, Offset, Point, Stroke, StrokeStyle};
use crate::ops::transform::{self, MAX_SCALE, MIN_SCALE};

/// Interaction mode.  Exactly one is active at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    None,
    Scaling,
    Translating,
    Drawing,
    Rotating,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::None => "None",
            Mode::Scaling => "Scale",
            Mode::Translating => "Translate",
            Mode::Drawing => "Draw",
            Mode::Rotating => "Rotate",
        }
    }

    pub fn all() -> &'static [Mode] {
        &[
            Mode::None,
            Mode::Scaling,
            Mode::Translating,
            Mode::Drawing,
            Mode::Rotating,
        ]
    }

    /// Parse a mode name as accepted by scripts ("scale", "draw", ...).
    pub fn from_name(name: &str) -> Option<Mode> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Mode::None),
            "scale" | "scaling" => Some(Mode::Scaling),
            "translate" | "translating" | "move" => Some(Mode::Translating),
            "draw" | "drawing" => Some(Mode::Drawing),
            "rotate" | "rotating" => Some(Mode::Rotating),
            _ => None,
        }
    }
}

/// A change a tool asks the session to apply to the active layer.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerEdit {
    /// Replace the displayed raster, recording the scale and angle it was rendered at.
    Raster { image: RgbaImage, scale: f32, angle: f32 },
    Offset(Offset),
    /// Commit a freshly opened stroke to the layer.
    OpenStroke(Stroke),
    AppendPoint { stroke_id: u64, point: Point },
}

impl Layer {
    pub fn apply(&mut self, edit: LayerEdit) {
        match edit {
            LayerEdit::Raster { image, scale, angle } => {
                (self.width, self.height) = image.dimensions();
                self.image = Some(image);
                self.scale = scale;
                self.angle = angle;
            }
            LayerEdit::Offset(offset) => self.offset = offset,
            LayerEdit::OpenStroke(stroke) => self.append_stroke(stroke),
            LayerEdit::AppendPoint { stroke_id, point } => {
                if let Some(stroke) = self.stroke_mut(stroke_id) {
                    stroke.points.push(point);
                }
            }
        }
    }
}

/// Session state a tool may read while handling a gesture.
#[derive(Clone, Copy, Debug)]
pub struct ToolContext {
    pub scroll: Point,
    pub stroke_style: StrokeStyle,
    /// Id to give a stroke opened by this gesture.
    pub next_stroke_id: u64,
}

/// A two-phase gesture handler.  Tools are pure: they read the layer and
/// return edits, and never touch the history.
pub trait Tool {
    type Gesture;

    fn begin(&self, start: Point, layer: &Layer, ctx: &ToolContext) -> (Self::Gesture, Option<LayerEdit>);

    fn update(
        &self,
        gesture: &mut Self::Gesture,
        current: Point,
        layer: &Layer,
        ctx: &ToolContext,
    ) -> Option<LayerEdit>;
}

/// Map a device point into layer-local, unscaled coordinates.
pub fn device_to_local(device: Point, scroll: Point, offset: Offset, scale: f32) -> Point {
    Point::new(
        (device.x + scroll.x - offset.x as f32) / scale,
        (device.y + scroll.y - offset.y as f32) / scale,
    )
}

// ============================================================================
// SCALE
// ============================================================================

pub struct ScaleTool;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleGesture {
    pub last: Point,
}

impl Tool for ScaleTool {
    type Gesture = ScaleGesture;

    fn begin(&self, start: Point, _layer: &Layer, _ctx: &ToolContext) -> (ScaleGesture, Option<LayerEdit>) {
        (ScaleGesture { last: start }, None)
    }

    fn update(&self, gesture: &mut ScaleGesture, current: Point, layer: &Layer, _ctx: &ToolContext) -> Option<LayerEdit> {
        // Incremental: each update scales relative to the previous one.
        if !current.is_finite() {
            return None;
        }
        let delta = (current.x - gesture.last.x) - (current.y - gesture.last.y);
        gesture.last = current;
        let source = layer.source.as_ref()?;
        if delta == 0.0 {
            return None;
        }
        let new_scale = (layer.scale * (1.0 + delta / 200.0)).clamp(MIN_SCALE, MAX_SCALE);
        Some(LayerEdit::Raster {
            image: transform::render_source(source, new_scale, layer.angle),
            scale: new_scale,
            angle: layer.angle,
        })
    }
}

// ============================================================================
// TRANSLATE
// ============================================================================

pub struct TranslateTool;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TranslateGesture {
    pub start: Point,
    pub start_offset: Offset,
}

impl Tool for TranslateTool {
    type Gesture = TranslateGesture;

    fn begin(&self, start: Point, layer: &Layer, _ctx: &ToolContext) -> (TranslateGesture, Option<LayerEdit>) {
        (
            TranslateGesture {
                start,
                start_offset: layer.offset,
            },
            None,
        )
    }

    fn update(&self, gesture: &mut TranslateGesture, current: Point, _layer: &Layer, _ctx: &ToolContext) -> Option<LayerEdit> {
        let dx = (current.x - gesture.start.x).round() as i32;
        let dy = (current.y - gesture.start.y).round() as i32;
        Some(LayerEdit::Offset(Offset::new(
            gesture.start_offset.x + dx,
            gesture.start_offset.y + dy,
        )))
    }
}

// ============================================================================
// DRAW
// ============================================================================

pub struct DrawTool;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawGesture {
    pub stroke_id: u64,
}

impl Tool for DrawTool {
    type Gesture = DrawGesture;

    fn begin(&self, start: Point, layer: &Layer, ctx: &ToolContext) -> (DrawGesture, Option<LayerEdit>) {
        let local = device_to_local(start, ctx.scroll, layer.offset, layer.scale);
        let stroke = Stroke::new(ctx.next_stroke_id, local, ctx.stroke_style);
        (
            DrawGesture {
                stroke_id: ctx.next_stroke_id,
            },
            Some(LayerEdit::OpenStroke(stroke)),
        )
    }

    fn update(&self, gesture: &mut DrawGesture, current: Point, layer: &Layer, ctx: &ToolContext) -> Option<LayerEdit> {
        Some(LayerEdit::AppendPoint {
            stroke_id: gesture.stroke_id,
            point: device_to_local(current, ctx.scroll, layer.offset, layer.scale),
        })
    }
}

// ============================================================================
// ROTATE
// ============================================================================

pub struct RotateTool;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RotateGesture {
    pub last: Point,
}

impl Tool for RotateTool {
    type Gesture = RotateGesture;

    fn begin(&self, start: Point, _layer: &Layer, _ctx: &ToolContext) -> (RotateGesture, Option<LayerEdit>) {
        (RotateGesture { last: start }, None)
    }

    fn update(&self, gesture: &mut RotateGesture, current: Point, layer: &Layer, _ctx: &ToolContext) -> Option<LayerEdit> {
        if !current.is_finite() {
            return None;
        }
        let delta = (current.x - gesture.last.x) - (current.y - gesture.last.y);
        gesture.last = current;
        let source = layer.source.as_ref()?;
        if delta == 0.0 {
            return None;
        }
        let new_angle = layer.angle + delta / 5.0;
        Some(LayerEdit::Raster {
            image: transform::render_source(source, layer.scale, new_angle),
            scale: layer.scale,
            angle: new_angle,
        })
    }
}

// ============================================================================
// DISPATCH
// ============================================================================

/// The in-flight gesture of whichever tool the current mode selects.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GestureState {
    Scale(ScaleGesture),
    Translate(TranslateGesture),
    Draw(DrawGesture),
    Rotate(RotateGesture),
}

impl GestureState {
    /// Start the tool bound to `mode`.  `Mode::None` has no tool.
    pub fn begin(mode: Mode, start: Point, layer: &Layer, ctx: &ToolContext) -> Option<(GestureState, Option<LayerEdit>)> {
        let started = match mode {
            Mode::None => return None,
            Mode::Scaling => {
                let (g, edit) = ScaleTool.begin(start, layer, ctx);
                (GestureState::Scale(g), edit)
            }
            Mode::Translating => {
                let (g, edit) = TranslateTool.begin(start, layer, ctx);
                (GestureState::Translate(g), edit)
            }
            Mode::Drawing => {
                let (g, edit) = DrawTool.begin(start, layer, ctx);
                (GestureState::Draw(g), edit)
            }
            Mode::Rotating => {
                let (g, edit) = RotateTool.begin(start, layer, ctx);
                (GestureState::Rotate(g), edit)
            }
        };
        Some(started)
    }

    pub fn update(&mut self, current: Point, layer: &Layer, ctx: &ToolContext) -> Option<LayerEdit> {
        match self {
            GestureState::Scale(g) => ScaleTool.update(g, current, layer, ctx),
            GestureState::Translate(g) => TranslateTool.update(g, current, layer, ctx),
            GestureState::Draw(g) => DrawTool.update(g, current, layer, ctx),
            GestureState::Rotate(g) => RotateTool.update(g, current, layer, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::{Viewport, local_to_canvas};
    use image::Rgba;

    fn ctx() -> ToolContext {
        ToolContext {
            scroll: Point::ZERO,
            stroke_style: StrokeStyle::default(),
            next_stroke_id: 1,
        }
    }

    fn content_layer(w: u32, h: u32) -> Layer {
        Layer::with_source(RgbaImage::from_pixel(w, h, Rgba([40, 80, 120, 255])), "Layer 2")
    }

    #[test]
    fn scale_stays_within_limits() {
        let mut layer = content_layer(20, 20);
        let (mut g, _) = ScaleTool.begin(Point::ZERO, &layer, &ctx());

        // Drag far right: many large positive deltas.
        for i in 1..40 {
            if let Some(edit) = ScaleTool.update(&mut g, Point::new(i as f32 * 300.0, 0.0), &layer, &ctx()) {
                layer.apply(edit);
            }
            assert!(layer.scale <= MAX_SCALE);
        }
        assert_eq!(layer.scale, MAX_SCALE);

        // And back up-right: large negative deltas.
        for i in 1..40 {
            let p = Point::new(39.0 * 300.0, i as f32 * 150.0);
            if let Some(edit) = ScaleTool.update(&mut g, p, &layer, &ctx()) {
                layer.apply(edit);
            }
            assert!(layer.scale >= MIN_SCALE);
        }
        assert_eq!(layer.scale, MIN_SCALE);
        assert_eq!(layer.image.as_ref().map(|i| i.dimensions()), Some((2, 2)));
    }

    #[test]
    fn scale_is_incremental() {
        let mut layer = content_layer(100, 100);
        let (mut g, _) = ScaleTool.begin(Point::ZERO, &layer, &ctx());
        layer.apply(ScaleTool.update(&mut g, Point::new(100.0, 0.0), &layer, &ctx()).unwrap());
        assert!((layer.scale - 1.5).abs() < 1e-6);
        // Second update sees only the extra 100px, so 1.5 * 1.5.
        layer.apply(ScaleTool.update(&mut g, Point::new(200.0, 0.0), &layer, &ctx()).unwrap());
        assert!((layer.scale - 2.25).abs() < 1e-5);
        assert_eq!(layer.image.as_ref().map(|i| i.dimensions()), Some((225, 225)));
    }

    #[test]
    fn scale_back_to_one_reproduces_the_source() {
        let src = RgbaImage::from_fn(16, 12, |x, y| Rgba([(x * 15) as u8, (y * 20) as u8, 7, 255]));
        let mut layer = Layer::with_source(src.clone(), "Layer 2");
        let (mut g, _) = ScaleTool.begin(Point::ZERO, &layer, &ctx());

        layer.apply(ScaleTool.update(&mut g, Point::new(200.0, 0.0), &layer, &ctx()).unwrap());
        assert_eq!(layer.scale, 2.0);
        assert_eq!((layer.width, layer.height), (32, 24));

        // 2.0 * (1 - 100/200) lands exactly on 1.0.
        layer.apply(ScaleTool.update(&mut g, Point::new(100.0, 0.0), &layer, &ctx()).unwrap());
        assert_eq!(layer.scale, 1.0);
        assert_eq!(layer.image.as_ref(), Some(&src));
        assert_eq!(layer.image, layer.source);
        assert_eq!((layer.width, layer.height), (16, 12));
    }

    #[test]
    fn non_finite_points_leave_scale_and_angle_alone() {
        let mut layer = content_layer(10, 10);
        let (mut g, _) = ScaleTool.begin(Point::ZERO, &layer, &ctx());
        assert!(ScaleTool.update(&mut g, Point::new(f32::NAN, 0.0), &layer, &ctx()).is_none());
        assert!(ScaleTool.update(&mut g, Point::new(0.0, f32::INFINITY), &layer, &ctx()).is_none());
        // The last good point is still the reference.
        layer.apply(ScaleTool.update(&mut g, Point::new(100.0, 0.0), &layer, &ctx()).unwrap());
        assert!((layer.scale - 1.5).abs() < 1e-6);

        let (mut g, _) = RotateTool.begin(Point::ZERO, &layer, &ctx());
        assert!(RotateTool.update(&mut g, Point::new(f32::NAN, f32::NAN), &layer, &ctx()).is_none());
        assert_eq!(layer.angle, 0.0);
    }

    #[test]
    fn scale_without_source_is_noop() {
        let layer = Layer::transparent(10, 10, "Layer 1");
        let (mut g, _) = ScaleTool.begin(Point::ZERO, &layer, &ctx());
        assert!(ScaleTool.update(&mut g, Point::new(50.0, 0.0), &layer, &ctx()).is_none());
    }

    #[test]
    fn translate_is_cumulative_from_start() {
        let mut layer = content_layer(4, 4);
        layer.set_offset(10, 10);
        let (mut g, _) = TranslateTool.begin(Point::new(5.0, 5.0), &layer, &ctx());
        layer.apply(TranslateTool.update(&mut g, Point::new(8.0, 6.0), &layer, &ctx()).unwrap());
        layer.apply(TranslateTool.update(&mut g, Point::new(15.0, 2.6), &layer, &ctx()).unwrap());
        assert_eq!(layer.offset, Offset::new(20, 8));
    }

    #[test]
    fn draw_opens_stroke_at_begin_and_appends() {
        let mut layer = content_layer(50, 50);
        let (mut g, edit) = DrawTool.begin(Point::new(3.0, 4.0), &layer, &ctx());
        layer.apply(edit.unwrap());
        assert_eq!(layer.strokes.len(), 1);
        layer.apply(DrawTool.update(&mut g, Point::new(6.0, 8.0), &layer, &ctx()).unwrap());
        assert_eq!(layer.strokes[0].points, vec![Point::new(3.0, 4.0), Point::new(6.0, 8.0)]);
        assert_eq!(layer.strokes[0].id, 1);
    }

    #[test]
    fn draw_coordinates_round_trip() {
        let offset = Offset::new(17, -9);
        let scroll = Point::new(31.0, 12.5);
        for &scale in &[0.1f32, 0.37, 1.0, 2.5, 5.0] {
            for &(x, y) in &[(0.0f32, 0.0f32), (123.25, 77.5), (640.0, 480.0)] {
                let device = Point::new(x, y);
                let local = device_to_local(device, scroll, offset, scale);
                let back = local_to_canvas(local, offset, scale, Viewport { scroll });
                assert!((back.x - x).abs() < 1e-3, "x {} -> {}", x, back.x);
                assert!((back.y - y).abs() < 1e-3, "y {} -> {}", y, back.y);
            }
        }
    }

    #[test]
    fn rotate_accumulates_angle() {
        let mut layer = content_layer(10, 10);
        let (mut g, _) = RotateTool.begin(Point::ZERO, &layer, &ctx());
        layer.apply(RotateTool.update(&mut g, Point::new(50.0, 0.0), &layer, &ctx()).unwrap());
        layer.apply(RotateTool.update(&mut g, Point::new(50.0, -25.0), &layer, &ctx()).unwrap());
        assert!((layer.angle - 15.0).abs() < 1e-5);
        assert_eq!(layer.image.as_ref().map(|i| i.dimensions()), Some((10, 10)));
    }

    #[test]
    fn mode_none_has_no_tool() {
        let layer = content_layer(2, 2);
        assert!(GestureState::begin(Mode::None, Point::ZERO, &layer, &ctx()).is_none());
        assert!(matches!(
            GestureState::begin(Mode::Rotating, Point::ZERO, &layer, &ctx()),
            Some((GestureState::Rotate(_), None))
        ));
        assert_eq!(Mode::from_name("Draw"), Some(Mode::Drawing));
        assert_eq!(Mode::from_name("zoom"), None);
        for mode in Mode::all() {
            assert_eq!(Mode::from_name(mode.label()), Some(*mode));
        }
    }
}
