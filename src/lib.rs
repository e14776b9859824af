//! LayerFE — layered image editing with full undo/redo.
//!
//! The [`session::EditorSession`] owns a [`canvas::CanvasState`] and a
//! [`components::history::History`]; every mutating operation goes through
//! it so that each recorded [`components::history::Action`] can be reverted
//! and replayed exactly.

pub mod logger;

pub mod canvas;
pub mod cli;
pub mod components;
pub mod compositor;
pub mod error;
pub mod io;
pub mod ops;
pub mod planner;
pub mod project;
pub mod session;
pub mod settings;

pub use canvas::{CanvasState, Layer, Offset, Point, Stroke, StrokeStyle};
pub use components::history::{Action, History};
pub use components::tools::Mode;
pub use compositor::Viewport;
pub use error::EditError;
pub use io::SaveFormat;
pub use ops::filters::Filter;
pub use session::EditorSession;
pub use settings::EditorSettings;
