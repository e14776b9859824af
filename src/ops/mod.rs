pub mod canvas_ops;
pub mod filters;
pub mod overlay;
pub mod scripting;
pub mod transform;
