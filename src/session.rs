// ============================================================================
// EDITOR SESSION — layer stack, interaction mode, gestures and history
// ============================================================================

use std::path::Path;

use image::RgbaImage;

use crate::canvas::{CanvasState, Layer, Offset, Point, RasterSnapshot, StrokeStyle};
use crate::components::history::{Action, History};
use crate::components::tools::{GestureState, Mode, ToolContext};
use crate::compositor::Viewport;
use crate::error::EditError;
use crate::io::{self, SaveFormat};
use crate::ops::filters::{self, Filter};
use crate::ops::transform;
use crate::settings::EditorSettings;
use crate::{log_info, log_warn};

/// A gesture between press and release, with the layer values it started from.
#[derive(Clone, Debug)]
pub(crate) struct ActiveGesture {
    pub layer_index: usize,
    pub state: GestureState,
    pub start_scale: f32,
    pub start_offset: Offset,
    pub start_angle: f32,
}

/// A filter being previewed on one layer.  `before` is restored on cancel
/// and re-filtered on every preview change.
#[derive(Clone, Debug)]
pub(crate) struct FilterPreview {
    pub layer_index: usize,
    pub before: RasterSnapshot,
    pub filter: Option<Filter>,
}

pub struct EditorSession {
    pub(crate) canvas: CanvasState,
    pub(crate) history: History,
    pub(crate) mode: Mode,
    pub(crate) gesture: Option<ActiveGesture>,
    pub(crate) filter_preview: Option<FilterPreview>,
    scroll: Point,
    stroke_style: StrokeStyle,
    next_stroke_id: u64,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new(&EditorSettings::default())
    }
}

impl EditorSession {
    pub fn new(settings: &EditorSettings) -> Self {
        Self {
            canvas: CanvasState::new(settings.default_canvas_width, settings.default_canvas_height),
            history: History::new(settings.history_limit()),
            mode: Mode::None,
            gesture: None,
            filter_preview: None,
            scroll: Point::ZERO,
            stroke_style: StrokeStyle {
                color: settings.stroke_color,
                width: settings.stroke_width.max(1),
            },
            next_stroke_id: 1,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn canvas(&self) -> &CanvasState {
        &self.canvas
    }

    pub fn layers(&self) -> &[Layer] {
        &self.canvas.layers
    }

    pub fn active_layer_index(&self) -> Option<usize> {
        self.canvas.active_layer_index
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn scroll(&self) -> Point {
        self.scroll
    }

    pub fn set_scroll(&mut self, scroll: Point) {
        self.scroll = scroll;
    }

    pub fn stroke_style(&self) -> StrokeStyle {
        self.stroke_style
    }

    /// Style for strokes opened from now on.  Existing strokes keep theirs.
    pub fn set_stroke_style(&mut self, style: StrokeStyle) {
        self.stroke_style = StrokeStyle {
            color: style.color,
            width: style.width.max(1),
        };
    }

    /// Scale factor of the active layer (1.0 when nothing is selected).
    pub fn scale_factor(&self) -> f32 {
        self.canvas.active_layer().map_or(1.0, |l| l.scale)
    }

    pub fn is_gesture_active(&self) -> bool {
        self.gesture.is_some()
    }

    pub fn has_filter_preview(&self) -> bool {
        self.filter_preview.is_some()
    }

    // ------------------------------------------------------------------
    // Loading and saving
    // ------------------------------------------------------------------

    /// Place `image` as a new content layer above a white base layer, size
    /// the canvas to it and make it active.  Loading is not undoable, so the
    /// history is cleared.
    pub fn load_image(&mut self, image: RgbaImage) -> usize {
        self.settle();
        let (w, h) = image.dimensions();
        let idx = self.canvas.load_image(image);
        self.history.clear();
        self.mode = Mode::None;
        log_info!("Loaded {}x{} image as layer {}", w, h, idx);
        idx
    }

    pub fn open(&mut self, path: &Path) -> Result<usize, EditError> {
        let image = io::load_image(path)?;
        log_info!("Opened {}", path.display());
        Ok(self.load_image(image))
    }

    /// Render with the current viewport as the user sees it.
    pub fn render(&self) -> RgbaImage {
        self.canvas.composite(Viewport { scroll: self.scroll })
    }

    /// Render the whole canvas ignoring scroll, as written on save.
    pub fn flatten(&self) -> RgbaImage {
        self.canvas.composite(Viewport::default())
    }

    pub fn save(&self, path: &Path, format: SaveFormat, quality: u8) -> Result<(), EditError> {
        io::encode_and_write(&self.flatten(), path, format, quality)?;
        log_info!("Saved {} as {:?}", path.display(), format);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Modes and gestures
    // ------------------------------------------------------------------

    /// Enter `mode`.  A non-`None` mode needs an active layer.
    pub fn set_mode(&mut self, mode: Mode) -> Result<(), EditError> {
        if mode != Mode::None && self.canvas.active_layer().is_none() {
            log_warn!("Cannot enter {} mode: no active layer", mode.label());
            return Err(EditError::InvalidSelection);
        }
        self.settle();
        self.mode = mode;
        Ok(())
    }

    /// Switch to `mode`, or back to `Mode::None` when already in it.
    pub fn toggle_mode(&mut self, mode: Mode) -> Result<Mode, EditError> {
        let target = if self.mode == mode { Mode::None } else { mode };
        self.set_mode(target)?;
        Ok(self.mode)
    }

    fn tool_context(&self) -> ToolContext {
        ToolContext {
            scroll: self.scroll,
            stroke_style: self.stroke_style,
            next_stroke_id: self.next_stroke_id,
        }
    }

    /// Start a gesture for the current mode at device point `at`.
    /// Returns whether a gesture started.
    pub fn press(&mut self, at: Point) -> bool {
        self.settle();
        if self.mode == Mode::None {
            return false;
        }
        if !at.is_finite() {
            log_warn!("Press ignored: non-finite point ({}, {})", at.x, at.y);
            return false;
        }
        let Some(index) = self.canvas.active_layer_index else {
            log_warn!("Press ignored: no active layer");
            return false;
        };
        let ctx = self.tool_context();
        let Some(layer) = self.canvas.layers.get_mut(index) else {
            return false;
        };
        if layer.is_base() {
            log_warn!("Press ignored: the base layer cannot be edited");
            return false;
        }

        let Some((state, edit)) = GestureState::begin(self.mode, at, layer, &ctx) else {
            return false;
        };
        if matches!(state, GestureState::Draw(_)) {
            self.next_stroke_id += 1;
        }
        let gesture = ActiveGesture {
            layer_index: index,
            state,
            start_scale: layer.scale,
            start_offset: layer.offset,
            start_angle: layer.angle,
        };
        if let Some(edit) = edit {
            layer.apply(edit);
        }
        self.gesture = Some(gesture);
        true
    }

    /// Continue the in-flight gesture to device point `at`.
    pub fn drag(&mut self, at: Point) {
        if !at.is_finite() {
            log_warn!("Drag ignored: non-finite point ({}, {})", at.x, at.y);
            return;
        }
        let ctx = self.tool_context();
        let Some(gesture) = self.gesture.as_mut() else {
            return;
        };
        let Some(layer) = self.canvas.layers.get_mut(gesture.layer_index) else {
            return;
        };
        if let Some(edit) = gesture.state.update(at, layer, &ctx) {
            layer.apply(edit);
        }
    }

    /// End the in-flight gesture and record it.
    pub fn release(&mut self) {
        self.finish_gesture();
    }

    fn finish_gesture(&mut self) {
        let Some(gesture) = self.gesture.take() else {
            return;
        };
        let Some(layer) = self.canvas.layers.get(gesture.layer_index) else {
            return;
        };
        let layer_index = gesture.layer_index;

        let action = match gesture.state {
            GestureState::Scale(_) => (layer.scale != gesture.start_scale).then(|| Action::Scale {
                layer_index,
                previous_scale: gesture.start_scale,
                new_scale: layer.scale,
            }),
            GestureState::Translate(_) => (layer.offset != gesture.start_offset).then(|| Action::Translate {
                layer_index,
                previous_offset: gesture.start_offset,
                new_offset: layer.offset,
            }),
            GestureState::Rotate(_) => (layer.angle != gesture.start_angle).then(|| Action::Rotate {
                layer_index,
                previous_angle: gesture.start_angle,
                new_angle: layer.angle,
            }),
            GestureState::Draw(g) => layer
                .strokes
                .iter()
                .find(|s| s.id == g.stroke_id)
                .map(|stroke| Action::Draw {
                    layer_index,
                    stroke: stroke.clone(),
                }),
        };

        if let Some(action) = action {
            log_info!("Recorded: {}", action.description());
            self.history.record(action);
        }
    }

    /// Bring the session to a quiescent state before an unrelated
    /// operation: record any in-flight gesture, drop any filter preview.
    pub(crate) fn settle(&mut self) {
        self.finish_gesture();
        self.cancel_filter_preview();
    }

    // ------------------------------------------------------------------
    // Undo / redo
    // ------------------------------------------------------------------

    pub fn undo(&mut self) -> Option<String> {
        self.settle();
        let action = self.history.undo()?;
        action.revert(&mut self.canvas);
        let description = action.description();
        log_info!("Undo: {}", description);
        Some(description)
    }

    pub fn redo(&mut self) -> Option<String> {
        self.settle();
        let action = self.history.redo()?;
        action.replay(&mut self.canvas);
        let description = action.description();
        log_info!("Redo: {}", description);
        Some(description)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // ------------------------------------------------------------------
    // Filters
    // ------------------------------------------------------------------

    /// Snapshot the active layer so filters can be previewed on it.
    pub fn begin_filter_preview(&mut self) -> Result<(), EditError> {
        self.settle();
        let index = self.canvas.active_layer_index.ok_or(EditError::InvalidSelection)?;
        let layer = self.canvas.layers.get(index).ok_or(EditError::InvalidSelection)?;
        if layer.image.is_none() {
            return Err(EditError::NoContent);
        }
        self.filter_preview = Some(FilterPreview {
            layer_index: index,
            before: RasterSnapshot::capture(layer),
            filter: None,
        });
        Ok(())
    }

    /// Show `filter` applied to the pre-preview pixels.
    pub fn preview_filter(&mut self, filter: Filter) -> Result<(), EditError> {
        let preview = self.filter_preview.as_mut().ok_or(EditError::NoFilterPreview)?;
        let layer = self
            .canvas
            .layers
            .get_mut(preview.layer_index)
            .ok_or(EditError::InvalidSelection)?;
        filtered(&preview.before, layer, filter).restore_into(layer);
        preview.filter = Some(filter);
        Ok(())
    }

    /// Keep the previewed result and record it.  Returns whether anything
    /// changed (an identity preview records nothing).
    pub fn commit_filter_preview(&mut self) -> Result<bool, EditError> {
        let preview = self.filter_preview.take().ok_or(EditError::NoFilterPreview)?;
        let Some(layer) = self.canvas.layers.get(preview.layer_index) else {
            return Err(EditError::InvalidSelection);
        };
        let new = RasterSnapshot::capture(layer);
        if new == preview.before {
            return Ok(false);
        }
        let action = Action::Filter {
            layer_index: preview.layer_index,
            previous: preview.before,
            new,
        };
        log_info!(
            "Recorded: {} ({})",
            action.description(),
            preview.filter.map(|f| f.label()).unwrap_or_default()
        );
        self.history.record(action);
        Ok(true)
    }

    /// Drop the preview and put the layer back as it was.
    pub fn cancel_filter_preview(&mut self) {
        if let Some(preview) = self.filter_preview.take() {
            if let Some(layer) = self.canvas.layers.get_mut(preview.layer_index) {
                preview.before.restore_into(layer);
            }
        }
    }

    /// Preview and commit `filter` on the active layer in one step.
    pub fn apply_filter(&mut self, filter: Filter) -> Result<bool, EditError> {
        self.begin_filter_preview()?;
        self.preview_filter(filter)?;
        self.commit_filter_preview()
    }

    pub fn blur(&mut self, kernel_size: u32) -> Result<bool, EditError> {
        self.apply_filter(Filter::Blur { kernel_size })
    }

    pub fn sharpen(&mut self) -> Result<bool, EditError> {
        self.apply_filter(Filter::Sharpen)
    }
}

/// `before` with `filter` applied.  Layers with a source are filtered at the
/// source and re-rendered, so the displayed raster stays a pure function of
/// source, scale and angle.
fn filtered(before: &RasterSnapshot, layer: &Layer, filter: Filter) -> RasterSnapshot {
    if filter.is_identity() {
        return before.clone();
    }
    match before.source {
        Some(ref source) => {
            let source = filters::apply_filter(source, filter);
            RasterSnapshot {
                image: Some(transform::render_source(&source, layer.scale, layer.angle)),
                source: Some(source),
            }
        }
        None => RasterSnapshot {
            image: before.image.as_ref().map(|img| filters::apply_filter(img, filter)),
            source: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn loaded(w: u32, h: u32) -> EditorSession {
        let mut s = EditorSession::default();
        s.load_image(RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 10) as u8, (y * 10) as u8, 90, 255])));
        s
    }

    #[test]
    fn mode_needs_active_layer() {
        let mut s = EditorSession::default();
        assert!(matches!(s.set_mode(Mode::Drawing), Err(EditError::InvalidSelection)));
        assert_eq!(s.mode(), Mode::None);
        assert!(s.set_mode(Mode::None).is_ok());
    }

    #[test]
    fn toggle_mode_switches_and_clears() {
        let mut s = loaded(4, 4);
        assert_eq!(s.toggle_mode(Mode::Scaling).unwrap(), Mode::Scaling);
        assert_eq!(s.toggle_mode(Mode::Drawing).unwrap(), Mode::Drawing);
        assert_eq!(s.toggle_mode(Mode::Drawing).unwrap(), Mode::None);
    }

    #[test]
    fn press_without_mode_does_nothing() {
        let mut s = loaded(4, 4);
        assert!(!s.press(Point::new(1.0, 1.0)));
        s.release();
        assert!(!s.can_undo());
    }

    #[test]
    fn base_layer_is_not_transformable() {
        let mut s = loaded(4, 4);
        s.canvas.active_layer_index = Some(0);
        s.set_mode(Mode::Translating).unwrap();
        assert!(!s.press(Point::ZERO));
        s.drag(Point::new(3.0, 3.0));
        s.release();
        assert_eq!(s.layers()[0].offset, Offset::default());
        assert!(!s.can_undo());
    }

    #[test]
    fn translate_gesture_records_once_and_undoes() {
        let mut s = loaded(4, 4);
        s.set_mode(Mode::Translating).unwrap();
        s.press(Point::new(10.0, 10.0));
        s.drag(Point::new(12.0, 11.0));
        s.drag(Point::new(15.0, 13.0));
        s.release();
        assert_eq!(s.layers()[1].offset, Offset::new(5, 3));
        assert_eq!(s.history().undo_count(), 1);

        assert!(s.undo().is_some());
        assert_eq!(s.layers()[1].offset, Offset::default());
        s.redo();
        assert_eq!(s.layers()[1].offset, Offset::new(5, 3));
    }

    #[test]
    fn unchanged_gesture_is_not_recorded() {
        let mut s = loaded(4, 4);
        s.set_mode(Mode::Scaling).unwrap();
        s.press(Point::new(5.0, 5.0));
        s.drag(Point::new(6.0, 6.0));
        s.release();
        assert!(!s.can_undo());
    }

    #[test]
    fn new_press_finishes_previous_gesture() {
        let mut s = loaded(4, 4);
        s.set_mode(Mode::Drawing).unwrap();
        s.press(Point::new(0.0, 0.0));
        s.drag(Point::new(2.0, 2.0));
        s.press(Point::new(3.0, 0.0));
        s.drag(Point::new(3.0, 3.0));
        s.release();
        assert_eq!(s.history().undo_count(), 2);
        let ids: Vec<u64> = s.layers()[1].strokes.iter().map(|st| st.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn rotate_undo_restores_raster() {
        let mut s = loaded(10, 10);
        let before = s.layers()[1].clone();
        s.set_mode(Mode::Rotating).unwrap();
        s.press(Point::ZERO);
        s.drag(Point::new(45.0, 0.0));
        s.release();
        assert!((s.layers()[1].angle - 9.0).abs() < 1e-5);
        assert_ne!(s.layers()[1].image, before.image);

        s.undo();
        assert_eq!(s.layers()[1], before);
    }

    #[test]
    fn filter_preview_cancel_restores_exactly() {
        let mut s = loaded(8, 8);
        let before = s.layers()[1].clone();
        s.begin_filter_preview().unwrap();
        s.preview_filter(Filter::Blur { kernel_size: 5 }).unwrap();
        assert_ne!(s.layers()[1].image, before.image);
        s.preview_filter(Filter::Blur { kernel_size: 0 }).unwrap();
        assert_eq!(s.layers()[1], before);
        s.preview_filter(Filter::Sharpen).unwrap();
        s.cancel_filter_preview();
        assert_eq!(s.layers()[1], before);
        assert!(matches!(s.commit_filter_preview(), Err(EditError::NoFilterPreview)));
    }

    #[test]
    fn filter_on_scaled_layer_keeps_raster_in_sync_with_source() {
        let mut s = loaded(20, 20);
        s.set_mode(Mode::Scaling).unwrap();
        s.press(Point::ZERO);
        s.drag(Point::new(100.0, 0.0));
        s.release();
        assert!(s.sharpen().unwrap());

        let layer = &s.layers()[1];
        let expected = transform::render_source(layer.source.as_ref().unwrap(), layer.scale, layer.angle);
        assert_eq!(layer.image.as_ref(), Some(&expected));
    }

    #[test]
    fn filter_on_empty_layer_is_rejected() {
        let mut s = EditorSession::default();
        assert!(matches!(s.blur(3), Err(EditError::InvalidSelection)));
        s.canvas.layers.push(Layer::new(4, 4, "Empty"));
        s.canvas.active_layer_index = Some(0);
        assert!(matches!(s.blur(3), Err(EditError::NoContent)));
        assert!(!s.can_undo());
    }

    #[test]
    fn undo_during_gesture_records_gesture_first() {
        let mut s = loaded(4, 4);
        s.set_mode(Mode::Translating).unwrap();
        s.press(Point::ZERO);
        s.drag(Point::new(2.0, 0.0));
        assert_eq!(s.undo().as_deref(), Some("Move to (2, 0)"));
        assert_eq!(s.layers()[1].offset, Offset::default());
        assert!(s.can_redo());
    }

    #[test]
    fn load_clears_history() {
        let mut s = loaded(4, 4);
        s.blur(3).unwrap();
        assert!(s.can_undo());
        s.load_image(RgbaImage::new(2, 2));
        assert!(!s.can_undo());
        assert_eq!(s.active_layer_index(), Some(2));
    }
}
