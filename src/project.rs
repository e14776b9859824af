use std::path::PathBuf;
use uuid::Uuid;

use crate::error::EditError;
use crate::io::SaveFormat;
use crate::session::EditorSession;
use crate::settings::EditorSettings;

/// Single open document: an editor session plus where it came from.
pub struct Project {
    pub id: Uuid,
    pub session: EditorSession,
    /// `None` for unsaved/untitled files.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,

    /// Display name (derived from path or "Untitled-X")
    pub name: String,
}

impl Project {
    pub fn new_untitled(untitled_counter: usize, settings: &EditorSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            session: EditorSession::new(settings),
            path: None,
            is_dirty: false,
            name: format!("Untitled-{}", untitled_counter),
        }
    }

    /// Load `path` into a fresh session.
    pub fn open(path: PathBuf, settings: &EditorSettings) -> Result<Self, EditError> {
        let mut session = EditorSession::new(settings);
        session.open(&path)?;
        let mut project = Self {
            id: Uuid::new_v4(),
            session,
            path: Some(path),
            is_dirty: false,
            name: String::new(),
        };
        project.update_name_from_path();
        Ok(project)
    }

    /// Write the flattened canvas to `path` and adopt it as the document path.
    pub fn save_as(&mut self, path: PathBuf, format: SaveFormat, quality: u8) -> Result<(), EditError> {
        self.session.save(&path, format, quality)?;
        self.path = Some(path);
        self.update_name_from_path();
        self.mark_clean();
        Ok(())
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    pub fn update_name_from_path(&mut self) {
        if let Some(ref path) = self.path {
            self.name = path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Unknown".to_string());
        }
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untitled_project_title() {
        let mut p = Project::new_untitled(3, &EditorSettings::default());
        assert_eq!(p.display_title(), "Untitled-3");
        p.mark_dirty();
        assert_eq!(p.display_title(), "Untitled-3*");
        assert!(p.session.layers().is_empty());
    }

    #[test]
    fn open_missing_file_fails() {
        let path = std::env::temp_dir().join(format!("layerfe_missing_{}.png", Uuid::new_v4()));
        assert!(matches!(Project::open(path, &EditorSettings::default()), Err(EditError::Io(_))));
    }
}
