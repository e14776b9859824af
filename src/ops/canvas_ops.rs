// ============================================================================
// CANVAS-LEVEL OPERATIONS — layers, canvas size, overlays, visibility
// ============================================================================

use crate::canvas::Layer;
use crate::components::history::Action;
use crate::error::EditError;
use crate::ops::overlay::{FaceOverlay, OverlaySkip};
use crate::session::EditorSession;
use crate::{log_info, log_warn};

impl EditorSession {
    /// Append a new transparent canvas-sized layer and make it active.
    pub fn add_layer(&mut self) -> usize {
        self.settle();
        let previous_active = self.canvas.active_layer_index;
        let index = self.canvas.push_blank_layer();
        self.history.record(Action::AddLayer { index, previous_active });
        log_info!("Added layer {}", index);
        index
    }

    /// Delete the active layer.
    pub fn delete_layer(&mut self) -> Result<(), EditError> {
        let Some(index) = self.canvas.active_layer_index else {
            log_warn!("Delete layer: no active layer");
            return Err(EditError::InvalidSelection);
        };
        self.settle();
        let layer = self.canvas.remove_layer(index).ok_or(EditError::InvalidSelection)?;
        log_info!("Deleted layer {} ({})", index, layer.name);
        self.history.record(Action::DeleteLayer { index, layer });
        Ok(())
    }

    /// Change the canvas size.  The base layer, if present, is refilled white
    /// at the new size; other layers keep their pixels.
    pub fn resize_canvas(&mut self, width: u32, height: u32) -> Result<(), EditError> {
        if width == 0 || height == 0 {
            log_warn!("Resize canvas: invalid size {}x{}", width, height);
            return Err(EditError::InvalidCanvasSize { width, height });
        }
        self.settle();
        let previous_width = self.canvas.width;
        let previous_height = self.canvas.height;
        let previous_base_size = self
            .canvas
            .layers
            .first()
            .filter(|l| l.is_base())
            .map(|l| (l.width, l.height));

        self.canvas.width = width;
        self.canvas.height = height;
        if let Some(base) = self.canvas.layers.first_mut().filter(|l| l.is_base()) {
            base.refill_base(width, height);
        }

        self.history.record(Action::ResizeCanvas {
            previous_width,
            previous_height,
            new_width: width,
            new_height: height,
            previous_base_size,
        });
        log_info!("Canvas resized {}x{} -> {}x{}", previous_width, previous_height, width, height);
        Ok(())
    }

    /// Render `overlay` from the active layer's pixels into a new layer on
    /// top of the stack, aligned with the active layer.  Faces the overlay
    /// had to skip are returned; the layer is added regardless.
    pub fn apply_overlay(&mut self, overlay: &dyn FaceOverlay) -> Result<Vec<OverlaySkip>, EditError> {
        let Some(active) = self.canvas.active_layer() else {
            log_warn!("Apply overlay: no active layer");
            return Err(EditError::InvalidSelection);
        };
        if active.image.is_none() {
            log_warn!("Apply overlay: active layer has no image");
            return Err(EditError::NoContent);
        }
        self.settle();

        let Some((image, offset)) = self
            .canvas
            .active_layer()
            .and_then(|l| l.image.as_ref().map(|img| (img, l.offset)))
        else {
            return Err(EditError::NoContent);
        };
        let outcome = overlay.render(image);

        let (w, h) = outcome.image.dimensions();
        let mut layer = Layer::new(w, h, overlay.layer_name());
        layer.image = Some(outcome.image);
        layer.offset = offset;

        let previous_active = self.canvas.active_layer_index;
        let index = self.canvas.insert_layer(self.canvas.layers.len(), layer.clone());
        self.history.record(Action::ApplyOverlay {
            index,
            layer,
            previous_active,
        });
        log_info!(
            "Applied {} as layer {} ({} faces skipped)",
            overlay.layer_name(),
            index,
            outcome.skipped.len()
        );
        Ok(outcome.skipped)
    }

    /// Flip the active layer's visibility.  Returns the new visibility.
    pub fn toggle_visibility(&mut self) -> Result<bool, EditError> {
        let Some(layer_index) = self.canvas.active_layer_index else {
            return Err(EditError::InvalidSelection);
        };
        self.settle();
        let layer = self
            .canvas
            .layers
            .get_mut(layer_index)
            .ok_or(EditError::InvalidSelection)?;
        let was_visible = layer.visible;
        layer.visible = !was_visible;
        self.history.record(Action::Visibility { layer_index, was_visible });
        Ok(!was_visible)
    }

    /// Make layer `index` the active layer.
    pub fn select_layer(&mut self, index: usize) -> Result<(), EditError> {
        let len = self.canvas.layers.len();
        if index >= len {
            return Err(EditError::LayerOutOfRange { index, len });
        }
        self.settle();
        self.canvas.active_layer_index = Some(index);
        Ok(())
    }
}
