// ============================================================================
// LayerFE Scripting System — Rhai-based sandboxed scripting engine
// ============================================================================
//
// Scripts drive an editor session the way a user would: select layers,
// switch modes, press/drag/release, filter and undo.  Every host call takes
// the session lock for its whole duration.

use image::Rgba;
use rhai::{Engine, EvalAltResult, ImmutableString, Position, Scope};
use std::sync::{Arc, Mutex};

use crate::canvas::{Point, StrokeStyle};
use crate::components::tools::Mode;
use crate::error::EditError;
use crate::log_info;
use crate::session::EditorSession;

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl ScriptError {
    fn at(message: String, pos: Position) -> Self {
        Self {
            message,
            line: pos.line().filter(|l| *l > 0),
            column: pos.position().filter(|c| *c > 0),
        }
    }
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let (Some(line), Some(col)) = (self.line, self.column) {
            write!(f, "Line {}, Col {}: {}", line, col, self.message)
        } else if let Some(line) = self.line {
            write!(f, "Line {}: {}", line, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ScriptError {}

fn host_error(e: EditError) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(e.to_string().into(), Position::NONE))
}

// ============================================================================
// Script context — shared mutable state between engine and host functions
// ============================================================================

struct ScriptContext {
    session: EditorSession,
    console_output: Vec<String>,
}

type SharedContext = Arc<Mutex<ScriptContext>>;

fn with_session<R>(ctx: &SharedContext, f: impl FnOnce(&mut EditorSession) -> R) -> R {
    let mut lock = ctx.lock().unwrap_or_else(|e| e.into_inner());
    f(&mut lock.session)
}

// ============================================================================
// Engine construction with sandbox + API registration
// ============================================================================

fn create_engine(ctx: SharedContext) -> Engine {
    let mut engine = Engine::new();

    // ── Sandbox limits ──
    engine.set_max_operations(50_000_000);
    engine.set_max_call_levels(64);
    engine.set_max_expr_depths(64, 64);
    engine.set_max_string_size(10_000);
    engine.set_max_array_size(10_000);
    engine.set_max_map_size(1_000);

    let c = ctx.clone();
    engine.on_print(move |msg| {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        log_info!("[script] {}", msg);
        lock.console_output.push(msg.to_string());
    });

    register_canvas_api(&mut engine, ctx.clone());
    register_gesture_api(&mut engine, ctx.clone());
    register_edit_api(&mut engine, ctx);

    engine
}

// ============================================================================
// Canvas and layer API
// ============================================================================

fn register_canvas_api(engine: &mut Engine, ctx: SharedContext) {
    let c = ctx.clone();
    engine.register_fn("canvas_width", move || -> i64 {
        with_session(&c, |s| s.canvas().width as i64)
    });

    let c = ctx.clone();
    engine.register_fn("canvas_height", move || -> i64 {
        with_session(&c, |s| s.canvas().height as i64)
    });

    let c = ctx.clone();
    engine.register_fn("layer_count", move || -> i64 {
        with_session(&c, |s| s.layers().len() as i64)
    });

    // -1 when nothing is selected.
    let c = ctx.clone();
    engine.register_fn("active_layer", move || -> i64 {
        with_session(&c, |s| s.active_layer_index().map_or(-1, |i| i as i64))
    });

    let c = ctx.clone();
    engine.register_fn("select_layer", move |index: i64| -> Result<(), Box<EvalAltResult>> {
        // Negative indices can never be in range.
        let index = usize::try_from(index).unwrap_or(usize::MAX);
        with_session(&c, |s| s.select_layer(index)).map_err(host_error)
    });

    let c = ctx.clone();
    engine.register_fn("add_layer", move || -> i64 {
        with_session(&c, |s| s.add_layer() as i64)
    });

    let c = ctx.clone();
    engine.register_fn("delete_layer", move || -> Result<(), Box<EvalAltResult>> {
        with_session(&c, |s| s.delete_layer()).map_err(host_error)
    });

    let c = ctx.clone();
    engine.register_fn("toggle_visibility", move || -> Result<bool, Box<EvalAltResult>> {
        with_session(&c, |s| s.toggle_visibility()).map_err(host_error)
    });

    let c = ctx.clone();
    engine.register_fn("resize_canvas", move |w: i64, h: i64| -> Result<(), Box<EvalAltResult>> {
        let w = u32::try_from(w).unwrap_or(0);
        let h = u32::try_from(h).unwrap_or(0);
        with_session(&c, |s| s.resize_canvas(w, h)).map_err(host_error)
    });

    let c = ctx;
    engine.register_fn("scale_factor", move || -> f64 {
        with_session(&c, |s| s.scale_factor() as f64)
    });
}

// ============================================================================
// Mode and gesture API
// ============================================================================

fn register_gesture_api(engine: &mut Engine, ctx: SharedContext) {
    let c = ctx.clone();
    engine.register_fn("set_mode", move |name: ImmutableString| -> Result<(), Box<EvalAltResult>> {
        let mode = Mode::from_name(&name).ok_or_else(|| -> Box<EvalAltResult> {
            Box::new(EvalAltResult::ErrorRuntime(
                format!("unknown mode '{}'", name).into(),
                Position::NONE,
            ))
        })?;
        with_session(&c, |s| s.set_mode(mode)).map_err(host_error)
    });

    // Coordinates are accepted as either integers or floats.
    let c = ctx.clone();
    engine.register_fn("press", move |x: f64, y: f64| -> bool {
        with_session(&c, |s| s.press(Point::new(x as f32, y as f32)))
    });
    let c = ctx.clone();
    engine.register_fn("press", move |x: i64, y: i64| -> bool {
        with_session(&c, |s| s.press(Point::new(x as f32, y as f32)))
    });

    let c = ctx.clone();
    engine.register_fn("drag", move |x: f64, y: f64| {
        with_session(&c, |s| s.drag(Point::new(x as f32, y as f32)))
    });
    let c = ctx.clone();
    engine.register_fn("drag", move |x: i64, y: i64| {
        with_session(&c, |s| s.drag(Point::new(x as f32, y as f32)))
    });

    let c = ctx.clone();
    engine.register_fn("release", move || with_session(&c, |s| s.release()));

    let c = ctx.clone();
    engine.register_fn("scroll_to", move |x: f64, y: f64| {
        with_session(&c, |s| s.set_scroll(Point::new(x as f32, y as f32)))
    });
    let c = ctx.clone();
    engine.register_fn("scroll_to", move |x: i64, y: i64| {
        with_session(&c, |s| s.set_scroll(Point::new(x as f32, y as f32)))
    });

    let c = ctx;
    engine.register_fn("set_brush", move |r: i64, g: i64, b: i64, a: i64, width: i64| {
        let ch = |v: i64| v.clamp(0, 255) as u8;
        let style = StrokeStyle {
            color: Rgba([ch(r), ch(g), ch(b), ch(a)]),
            width: width.clamp(1, 1_000) as u32,
        };
        with_session(&c, |s| s.set_stroke_style(style))
    });
}

// ============================================================================
// Filter and history API
// ============================================================================

fn register_edit_api(engine: &mut Engine, ctx: SharedContext) {
    let c = ctx.clone();
    engine.register_fn("blur", move |kernel_size: i64| -> Result<bool, Box<EvalAltResult>> {
        let k = kernel_size.clamp(0, 255) as u32;
        with_session(&c, |s| s.blur(k)).map_err(host_error)
    });

    let c = ctx.clone();
    engine.register_fn("sharpen", move || -> Result<bool, Box<EvalAltResult>> {
        with_session(&c, |s| s.sharpen()).map_err(host_error)
    });

    let c = ctx.clone();
    engine.register_fn("undo", move || -> bool {
        with_session(&c, |s| s.undo().is_some())
    });

    let c = ctx;
    engine.register_fn("redo", move || -> bool {
        with_session(&c, |s| s.redo().is_some())
    });
}

// ============================================================================
// Public execution API
// ============================================================================

/// Compile `source` without running it.
pub fn compile_script(source: &str) -> Result<(), ScriptError> {
    Engine::new()
        .compile(source)
        .map(|_| ())
        .map_err(|e| ScriptError::at(e.to_string(), e.position()))
}

/// Run `source` against `session` on the calling thread.
///
/// Returns the lines the script printed.  On error the session keeps every
/// edit made before the failing call.
pub fn execute_script_sync(source: &str, session: &mut EditorSession) -> Result<Vec<String>, ScriptError> {
    let ctx: SharedContext = Arc::new(Mutex::new(ScriptContext {
        session: std::mem::take(session),
        console_output: Vec::new(),
    }));

    let result = {
        let engine = create_engine(ctx.clone());
        let mut scope = Scope::new();
        engine
            .compile(source)
            .map_err(|e| ScriptError::at(e.to_string(), e.position()))
            .and_then(|ast| {
                engine
                    .run_ast_with_scope(&mut scope, &ast)
                    .map_err(|e| ScriptError::at(e.to_string(), e.position()))
            })
    };

    let mut lock = ctx.lock().unwrap_or_else(|e| e.into_inner());
    *session = std::mem::take(&mut lock.session);
    let console = std::mem::take(&mut lock.console_output);
    result.map(|_| console)
}
