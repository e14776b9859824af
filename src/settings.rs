use std::path::{Path, PathBuf};

use image::Rgba;

use crate::planner::DEFAULT_TOLERANCE;

/// Editor settings that persist across runs.
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    /// Maximum number of undo steps (0 = unlimited)
    pub max_undo_steps: usize,
    /// Colour of newly opened strokes
    pub stroke_color: Rgba<u8>,
    /// Width in pixels of newly opened strokes
    pub stroke_width: u32,
    /// Canvas size used before any image has been loaded
    pub default_canvas_width: u32,
    pub default_canvas_height: u32,
    /// Embedding distance under which two faces count as the same person
    pub face_tolerance: f32,
    /// JPEG quality (1–100) used when the CLI does not override it
    pub jpeg_quality: u8,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            max_undo_steps: 0,
            stroke_color: Rgba([0, 0, 0, 255]),
            stroke_width: 3,
            default_canvas_width: 800,
            default_canvas_height: 600,
            face_tolerance: DEFAULT_TOLERANCE,
            jpeg_quality: 90,
        }
    }
}

impl EditorSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/layerfe/layerfe_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\LayerFE\layerfe_settings.cfg
    /// On macOS:   ~/Library/Application Support/LayerFE/layerfe_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?
                .join("layerfe");
            return Some(config_dir.join("layerfe_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            return Some(PathBuf::from(appdata).join("LayerFE").join("layerfe_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("LayerFE")
                    .join("layerfe_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("layerfe_settings.cfg")))
        }
    }

    /// Serialize a colour as "r,g,b,a"
    fn color_to_str(c: Rgba<u8>) -> String {
        format!("{},{},{},{}", c[0], c[1], c[2], c[3])
    }

    /// Parse a colour from "r,g,b,a"
    fn str_to_color(s: &str) -> Option<Rgba<u8>> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 4 {
            return None;
        }
        let r = parts[0].trim().parse::<u8>().ok()?;
        let g = parts[1].trim().parse::<u8>().ok()?;
        let b = parts[2].trim().parse::<u8>().ok()?;
        let a = parts[3].trim().parse::<u8>().ok()?;
        Some(Rgba([r, g, b, a]))
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "max_undo_steps={}\n\
             stroke_color={}\n\
             stroke_width={}\n\
             default_canvas_width={}\n\
             default_canvas_height={}\n\
             face_tolerance={}\n\
             jpeg_quality={}\n",
            self.max_undo_steps,
            Self::color_to_str(self.stroke_color),
            self.stroke_width,
            self.default_canvas_width,
            self.default_canvas_height,
            self.face_tolerance,
            self.jpeg_quality,
        )
    }

    /// Parse settings text.  Unknown keys and malformed values are ignored.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "max_undo_steps" => {
                    s.max_undo_steps = val.parse().unwrap_or(s.max_undo_steps);
                }
                "stroke_color" => {
                    if let Some(c) = Self::str_to_color(val) {
                        s.stroke_color = c;
                    }
                }
                "stroke_width" => {
                    s.stroke_width = val.parse::<u32>().ok().filter(|w| *w > 0).unwrap_or(s.stroke_width);
                }
                "default_canvas_width" => {
                    s.default_canvas_width = val.parse::<u32>().ok().filter(|w| *w > 0).unwrap_or(s.default_canvas_width);
                }
                "default_canvas_height" => {
                    s.default_canvas_height = val.parse::<u32>().ok().filter(|h| *h > 0).unwrap_or(s.default_canvas_height);
                }
                "face_tolerance" => {
                    s.face_tolerance = val.parse::<f32>().ok().filter(|t| *t > 0.0).unwrap_or(s.face_tolerance);
                }
                "jpeg_quality" => {
                    s.jpeg_quality = val.parse::<u8>().map(|q| q.clamp(1, 100)).unwrap_or(s.jpeg_quality);
                }
                _ => {}
            }
        }
        s
    }

    /// Load settings from `path` (returns default if the file is missing or unreadable).
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    /// Load settings from the platform location.
    pub fn load() -> Self {
        Self::settings_path()
            .map(|p| Self::load_from(&p))
            .unwrap_or_default()
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())
    }

    /// History cap handed to [`crate::components::history::History`].
    pub fn history_limit(&self) -> Option<usize> {
        (self.max_undo_steps > 0).then_some(self.max_undo_steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reads_known_keys() {
        let s = EditorSettings::parse(
            "max_undo_steps=25\nstroke_color=255,0,0,128\nstroke_width=7\nface_tolerance=0.45\n",
        );
        assert_eq!(s.max_undo_steps, 25);
        assert_eq!(s.stroke_color, Rgba([255, 0, 0, 128]));
        assert_eq!(s.stroke_width, 7);
        assert!((s.face_tolerance - 0.45).abs() < 1e-6);
        assert_eq!(s.history_limit(), Some(25));
    }

    #[test]
    fn parse_ignores_garbage_and_keeps_defaults() {
        let s = EditorSettings::parse("# comment\nstroke_width=zero\nnot a line\nstroke_color=1,2\nmystery=1\n");
        assert_eq!(s, EditorSettings::default());
        assert_eq!(s.history_limit(), None);
    }

    #[test]
    fn config_string_round_trips() {
        let s = EditorSettings {
            max_undo_steps: 10,
            stroke_color: Rgba([10, 20, 30, 40]),
            stroke_width: 5,
            default_canvas_width: 1024,
            default_canvas_height: 768,
            face_tolerance: 0.5,
            jpeg_quality: 70,
        };
        assert_eq!(EditorSettings::parse(&s.to_config_string()), s);
    }

    #[test]
    fn save_then_load_from_file() {
        let dir = std::env::temp_dir().join(format!("layerfe_settings_{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("layerfe_settings.cfg");
        let s = EditorSettings {
            stroke_width: 9,
            face_tolerance: 0.3,
            ..EditorSettings::default()
        };
        s.save_to(&path).unwrap();
        let back = EditorSettings::load_from(&path);
        let missing = EditorSettings::load_from(&dir.join("absent.cfg"));
        let _ = std::fs::remove_dir_all(&dir);
        assert_eq!(back, s);
        assert_eq!(missing, EditorSettings::default());
    }
}
