//! Run log for LayerFE.
//!
//! One file per run, replaced on every launch: `LayerFE/layerfe.log` under
//! the platform data directory (`%APPDATA%`, `~/Library/Application Support`
//! or `$XDG_DATA_HOME`, falling back to `~/.local/share`).
//!
//! Session operations report through `log_info!`, `log_warn!` and `log_err!`.
//! Nothing is written until the binary calls [`init`]; library users and
//! tests that never initialise get silent macros.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

struct Sink {
    path: PathBuf,
    file: Mutex<File>,
}

static SINK: OnceLock<Sink> = OnceLock::new();

/// Where this run is logging, once [`init`] has succeeded.
pub fn log_path() -> Option<&'static Path> {
    SINK.get().map(|s| s.path.as_path())
}

fn append(line: &str) {
    let Some(sink) = SINK.get() else { return };
    let mut file = sink.file.lock().unwrap_or_else(|e| e.into_inner());
    // A full disk must not abort an edit.
    let _ = writeln!(file, "{}", line);
}

/// Append one `[HH:MM:SS] [LEVEL] msg` line.
pub fn write(level: Level, msg: &str) {
    if SINK.get().is_none() {
        return;
    }
    append(&format!("[{}] [{}] {}", clock(), level.as_str(), msg));
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, &format!($($arg)*))
    };
}

pub fn init() {
    init_at(&data_dir().join("LayerFE").join("layerfe.log"));
}

/// Start logging to `path`, truncating it.  Later calls are ignored.
///
/// Panics are mirrored into the log before the previous hook runs.
pub fn init_at(path: &Path) {
    if SINK.get().is_some() {
        return;
    }
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = match OpenOptions::new().create(true).write(true).truncate(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("[logger] cannot open {}: {}", path.display(), e);
            return;
        }
    };
    let sink = Sink {
        path: path.to_path_buf(),
        file: Mutex::new(file),
    };
    if SINK.set(sink).is_err() {
        return;
    }

    append(&format!("=== LayerFE run started (unix {}) ===", unix_seconds()));

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        append(&format!("[{}] [PANIC] {}", clock(), info));
        previous(info);
    }));
}

fn data_dir() -> PathBuf {
    let var = |name: &str| std::env::var(name).ok().map(PathBuf::from);
    if cfg!(target_os = "windows") {
        if let Some(appdata) = var("APPDATA") {
            return appdata;
        }
    }
    if cfg!(target_os = "macos") {
        if let Some(home) = var("HOME") {
            return home.join("Library").join("Application Support");
        }
    }
    var("XDG_DATA_HOME")
        .or_else(|| var("HOME").map(|h| h.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// UTC wall clock, `HH:MM:SS`.
fn clock() -> String {
    let secs = unix_seconds() % 86_400;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_hh_mm_ss() {
        let c = clock();
        assert_eq!(c.len(), 8);
        assert_eq!(c.as_bytes()[2], b':');
        assert_eq!(c.as_bytes()[5], b':');
    }

    #[test]
    fn level_tags() {
        assert_eq!(Level::Info.as_str(), "INFO");
        assert_eq!(Level::Warn.as_str(), "WARN");
        assert_eq!(Level::Error.as_str(), "ERROR");
    }
}
