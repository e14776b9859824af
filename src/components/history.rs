use std::collections::VecDeque;

use crate::canvas::{CanvasState, Layer, Offset, RasterSnapshot, Stroke};
use crate::log_warn;

// ============================================================================
// ACTION RECORDS
// ============================================================================

/// One undoable edit.  Each variant carries enough owned state to move the
/// canvas exactly from its post-state back to its pre-state and forward again.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    AddLayer {
        index: usize,
        previous_active: Option<usize>,
    },
    DeleteLayer {
        index: usize,
        layer: Layer,
    },
    Scale {
        layer_index: usize,
        previous_scale: f32,
        new_scale: f32,
    },
    Translate {
        layer_index: usize,
        previous_offset: Offset,
        new_offset: Offset,
    },
    Rotate {
        layer_index: usize,
        previous_angle: f32,
        new_angle: f32,
    },
    Draw {
        layer_index: usize,
        stroke: Stroke,
    },
    Filter {
        layer_index: usize,
        previous: RasterSnapshot,
        new: RasterSnapshot,
    },
    ResizeCanvas {
        previous_width: u32,
        previous_height: u32,
        new_width: u32,
        new_height: u32,
        /// Size of the base layer before the resize, if one existed.
        previous_base_size: Option<(u32, u32)>,
    },
    ApplyOverlay {
        index: usize,
        layer: Layer,
        previous_active: Option<usize>,
    },
    Visibility {
        layer_index: usize,
        was_visible: bool,
    },
}

impl Action {
    pub fn description(&self) -> String {
        match self {
            Action::AddLayer { index, .. } => format!("Add Layer {}", index + 1),
            Action::DeleteLayer { layer, .. } => format!("Delete Layer: {}", layer.name),
            Action::Scale { new_scale, .. } => format!("Scale to {:.0}%", new_scale * 100.0),
            Action::Translate { new_offset, .. } => {
                format!("Move to ({}, {})", new_offset.x, new_offset.y)
            }
            Action::Rotate { new_angle, .. } => format!("Rotate to {:.1}°", new_angle),
            Action::Draw { stroke, .. } => format!("Draw ({} points)", stroke.points.len()),
            Action::Filter { layer_index, .. } => format!("Filter Layer {}", layer_index + 1),
            Action::ResizeCanvas { new_width, new_height, .. } => {
                format!("Resize Canvas {}x{}", new_width, new_height)
            }
            Action::ApplyOverlay { layer, .. } => format!("Overlay: {}", layer.name),
            Action::Visibility { layer_index, was_visible } => {
                if *was_visible {
                    format!("Hide Layer {}", layer_index + 1)
                } else {
                    format!("Show Layer {}", layer_index + 1)
                }
            }
        }
    }

    /// Approximate heap bytes held by the record.
    pub fn memory_size(&self) -> usize {
        let raster = |img: &Option<image::RgbaImage>| img.as_ref().map_or(0, |i| i.as_raw().len());
        let layer_bytes = |l: &Layer| raster(&l.image) + raster(&l.source) + l.name.len();
        match self {
            Action::DeleteLayer { layer, .. } | Action::ApplyOverlay { layer, .. } => layer_bytes(layer),
            Action::Filter { previous, new, .. } => {
                raster(&previous.image) + raster(&previous.source) + raster(&new.image) + raster(&new.source)
            }
            Action::Draw { stroke, .. } => stroke.points.len() * std::mem::size_of::<crate::canvas::Point>(),
            _ => std::mem::size_of::<Action>(),
        }
    }

    /// Move `canvas` from this action's post-state to its pre-state.
    pub fn revert(&self, canvas: &mut CanvasState) {
        match self {
            Action::AddLayer { index, previous_active } => {
                canvas.remove_layer(*index);
                canvas.active_layer_index = *previous_active;
            }
            Action::DeleteLayer { index, layer } => {
                canvas.insert_layer(*index, layer.clone());
            }
            Action::Scale { layer_index, previous_scale, .. } => {
                if let Some(layer) = layer_at(canvas, *layer_index) {
                    layer.scale = *previous_scale;
                    layer.regenerate();
                }
            }
            Action::Translate { layer_index, previous_offset, .. } => {
                if let Some(layer) = layer_at(canvas, *layer_index) {
                    layer.offset = *previous_offset;
                }
            }
            Action::Rotate { layer_index, previous_angle, .. } => {
                if let Some(layer) = layer_at(canvas, *layer_index) {
                    layer.angle = *previous_angle;
                    layer.regenerate();
                }
            }
            Action::Draw { layer_index, stroke } => {
                if let Some(layer) = layer_at(canvas, *layer_index) {
                    if layer.remove_stroke(stroke.id).is_none() {
                        log_warn!("Undo draw: stroke {} not found on layer {}", stroke.id, layer_index);
                    }
                }
            }
            Action::Filter { layer_index, previous, .. } => {
                if let Some(layer) = layer_at(canvas, *layer_index) {
                    previous.restore_into(layer);
                }
            }
            Action::ResizeCanvas { previous_width, previous_height, previous_base_size, .. } => {
                canvas.width = *previous_width;
                canvas.height = *previous_height;
                if let Some((w, h)) = previous_base_size {
                    if let Some(base) = canvas.layers.first_mut().filter(|l| l.is_base()) {
                        base.refill_base(*w, *h);
                    }
                }
            }
            Action::ApplyOverlay { index, previous_active, .. } => {
                canvas.remove_layer(*index);
                canvas.active_layer_index = *previous_active;
            }
            Action::Visibility { layer_index, was_visible } => {
                if let Some(layer) = layer_at(canvas, *layer_index) {
                    layer.visible = *was_visible;
                }
            }
        }
    }

    /// Move `canvas` from this action's pre-state to its post-state.
    pub fn replay(&self, canvas: &mut CanvasState) {
        match self {
            Action::AddLayer { .. } => {
                canvas.push_blank_layer();
            }
            Action::DeleteLayer { index, .. } => {
                canvas.remove_layer(*index);
            }
            Action::Scale { layer_index, new_scale, .. } => {
                if let Some(layer) = layer_at(canvas, *layer_index) {
                    layer.scale = *new_scale;
                    layer.regenerate();
                }
            }
            Action::Translate { layer_index, new_offset, .. } => {
                if let Some(layer) = layer_at(canvas, *layer_index) {
                    layer.offset = *new_offset;
                }
            }
            Action::Rotate { layer_index, new_angle, .. } => {
                if let Some(layer) = layer_at(canvas, *layer_index) {
                    layer.angle = *new_angle;
                    layer.regenerate();
                }
            }
            Action::Draw { layer_index, stroke } => {
                if let Some(layer) = layer_at(canvas, *layer_index) {
                    layer.append_stroke(stroke.clone());
                }
            }
            Action::Filter { layer_index, new, .. } => {
                if let Some(layer) = layer_at(canvas, *layer_index) {
                    new.restore_into(layer);
                }
            }
            Action::ResizeCanvas { new_width, new_height, .. } => {
                canvas.width = *new_width;
                canvas.height = *new_height;
                if let Some(base) = canvas.layers.first_mut().filter(|l| l.is_base()) {
                    base.refill_base(*new_width, *new_height);
                }
            }
            Action::ApplyOverlay { index, layer, .. } => {
                canvas.insert_layer(*index, layer.clone());
            }
            Action::Visibility { layer_index, was_visible } => {
                if let Some(layer) = layer_at(canvas, *layer_index) {
                    layer.visible = !was_visible;
                }
            }
        }
    }
}

fn layer_at(canvas: &mut CanvasState, index: usize) -> Option<&mut Layer> {
    let len = canvas.layers.len();
    let layer = canvas.layers.get_mut(index);
    if layer.is_none() {
        log_warn!("History: layer index {} out of bounds ({})", index, len);
    }
    layer
}

// ============================================================================
// HISTORY - undo/redo stacks
// ============================================================================

/// Undo/redo stacks.  The history only moves records between its stacks;
/// applying them to the canvas is the session's job.
#[derive(Clone, Debug, Default)]
pub struct History {
    undo_stack: VecDeque<Action>,
    redo_stack: VecDeque<Action>,
    /// `None` keeps every record.
    max_history_size: Option<usize>,
}

impl History {
    pub fn new(max_history_size: Option<usize>) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size,
        }
    }

    /// Push a new record.  Any redoable records are discarded.
    pub fn record(&mut self, action: Action) {
        self.redo_stack.clear();
        self.undo_stack.push_back(action);
        self.prune();
    }

    /// Move the most recent record onto the redo stack and return it.
    pub fn undo(&mut self) -> Option<&Action> {
        let action = self.undo_stack.pop_back()?;
        self.redo_stack.push_back(action);
        self.redo_stack.back()
    }

    /// Move the most recently undone record back onto the undo stack and return it.
    pub fn redo(&mut self) -> Option<&Action> {
        let action = self.redo_stack.pop_back()?;
        self.undo_stack.push_back(action);
        self.undo_stack.back()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(Action::description)
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.back().map(Action::description)
    }

    /// Get all undo descriptions (most recent first)
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(Action::description).collect()
    }

    /// Redo records, next-to-redo first.
    pub fn redo_entries(&self) -> impl Iterator<Item = &Action> {
        self.redo_stack.iter().rev()
    }

    pub fn memory_usage(&self) -> usize {
        self.undo_stack
            .iter()
            .chain(self.redo_stack.iter())
            .map(Action::memory_size)
            .sum()
    }

    fn prune(&mut self) {
        if let Some(max) = self.max_history_size {
            while self.undo_stack.len() > max {
                self.undo_stack.pop_front();
            }
        }
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}
