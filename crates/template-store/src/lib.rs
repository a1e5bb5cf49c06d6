use chrono::{DateTime, Utc};
use core_types::{ExportSpec, RenderConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const TEMPLATE_DIR: &str = "templates";
const TEMPLATE_EXTENSION: &str = "json";
const LAST_USED_FILE: &str = "last_config.json";
pub const DEFAULT_TEMPLATE_NAME: &str = "default";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Template directory unavailable")]
    MissingTemplatePath,

    #[error("Invalid template name {0:?}: use letters, digits, spaces, '-' or '_'")]
    InvalidName(String),
}

pub type Result<T> = std::result::Result<T, TemplateError>;

/// A named, reusable watermark configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub export: ExportSpec,
}

impl Template {
    pub fn new(name: impl Into<String>, render: RenderConfig, export: ExportSpec) -> Self {
        Self {
            name: name.into(),
            saved_at: Utc::now(),
            render,
            export,
        }
    }
}

/// JSON files under a root directory: one per template in `templates/`,
/// plus `last_config.json` for the configuration of the previous run.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    root: PathBuf,
}

impl TemplateStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(TEMPLATE_DIR))?;
        Ok(Self { root })
    }

    /// Per-user store in the platform config directory.
    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("org", "photomark", "photomark")
            .ok_or(TemplateError::MissingTemplatePath)?;
        Self::open(dirs.config_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn save(&self, template: &Template) -> Result<PathBuf> {
        let path = self.template_path(&template.name)?;
        write_json(&path, template)?;
        debug!(name = %template.name, path = %path.display(), "saved template");
        Ok(path)
    }

    /// `Ok(None)` when no template with that name exists.
    pub fn load(&self, name: &str) -> Result<Option<Template>> {
        let path = self.template_path(name)?;
        read_json(&path)
    }

    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.root.join(TEMPLATE_DIR))? {
            let path = entry?.path();
            if !path.is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION)
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Returns whether a template was removed.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let path = self.template_path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub fn save_default(&self, render: RenderConfig, export: ExportSpec) -> Result<PathBuf> {
        self.save(&Template::new(DEFAULT_TEMPLATE_NAME, render, export))
    }

    pub fn load_default(&self) -> Result<Option<Template>> {
        self.load(DEFAULT_TEMPLATE_NAME)
    }

    pub fn save_last_used(&self, render: RenderConfig, export: ExportSpec) -> Result<()> {
        let template = Template::new("last used", render, export);
        write_json(&self.root.join(LAST_USED_FILE), &template)
    }

    /// A corrupt file is logged and treated as absent, so a bad previous run
    /// never blocks the next one.
    pub fn load_last_used(&self) -> Option<Template> {
        match read_json(&self.root.join(LAST_USED_FILE)) {
            Ok(template) => template,
            Err(err) => {
                warn!(error = %err, "ignoring unreadable last-used configuration");
                None
            }
        }
    }

    fn template_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self
            .root
            .join(TEMPLATE_DIR)
            .join(format!("{name}.{TEMPLATE_EXTENSION}")))
    }
}

pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.trim().is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'));
    if valid {
        Ok(())
    } else {
        Err(TemplateError::InvalidName(name.to_string()))
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let payload = serde_json::to_string_pretty(value)?;
    fs::write(path, payload)?;
    Ok(())
}

fn read_json(path: &Path) -> Result<Option<Template>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Anchor, ExportFormat, PlacementSpec, TextWatermark, WatermarkSettings};
    use tempfile::tempdir;

    fn sample_render() -> RenderConfig {
        RenderConfig {
            watermark: WatermarkSettings {
                text: TextWatermark::new("© 2024"),
                image: None,
            },
            placement: PlacementSpec::at(Anchor::BottomRight).with_rotation(-30.0),
        }
    }

    #[test]
    fn save_then_load_returns_same_config() {
        let dir = tempdir().unwrap();
        let store = TemplateStore::open(dir.path()).unwrap();
        let export = ExportSpec {
            format: ExportFormat::Jpeg,
            jpeg_quality: 75,
            ..ExportSpec::default()
        };
        let template = Template::new("holiday", sample_render(), export);
        store.save(&template).unwrap();

        let loaded = store.load("holiday").unwrap().expect("template exists");
        assert_eq!(loaded, template);
        assert!(store.load("missing").unwrap().is_none());
    }

    #[test]
    fn list_is_sorted_and_ignores_other_files() {
        let dir = tempdir().unwrap();
        let store = TemplateStore::open(dir.path()).unwrap();
        for name in ["zeta", "alpha", "mid way"] {
            store
                .save(&Template::new(name, RenderConfig::default(), ExportSpec::default()))
                .unwrap();
        }
        fs::write(dir.path().join(TEMPLATE_DIR).join("notes.txt"), b"x").unwrap();

        assert_eq!(store.list().unwrap(), vec!["alpha", "mid way", "zeta"]);
    }

    #[test]
    fn delete_reports_whether_anything_was_removed() {
        let dir = tempdir().unwrap();
        let store = TemplateStore::open(dir.path()).unwrap();
        store
            .save(&Template::new("tmp", RenderConfig::default(), ExportSpec::default()))
            .unwrap();

        assert!(store.delete("tmp").unwrap());
        assert!(!store.delete("tmp").unwrap());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn default_template_uses_reserved_name() {
        let dir = tempdir().unwrap();
        let store = TemplateStore::open(dir.path()).unwrap();
        assert!(store.load_default().unwrap().is_none());

        store
            .save_default(sample_render(), ExportSpec::default())
            .unwrap();
        let loaded = store.load_default().unwrap().unwrap();
        assert_eq!(loaded.name, DEFAULT_TEMPLATE_NAME);
        assert_eq!(loaded.render, sample_render());
        assert_eq!(store.list().unwrap(), vec![DEFAULT_TEMPLATE_NAME]);
    }

    #[test]
    fn last_used_round_trip_and_corruption() {
        let dir = tempdir().unwrap();
        let store = TemplateStore::open(dir.path()).unwrap();
        assert!(store.load_last_used().is_none());

        store
            .save_last_used(sample_render(), ExportSpec::default())
            .unwrap();
        assert_eq!(store.load_last_used().unwrap().render, sample_render());
        assert!(store.list().unwrap().is_empty());

        fs::write(dir.path().join(LAST_USED_FILE), b"{ not json").unwrap();
        assert!(store.load_last_used().is_none());
    }

    #[test]
    fn rejects_names_that_escape_the_directory() {
        let dir = tempdir().unwrap();
        let store = TemplateStore::open(dir.path()).unwrap();
        for name in ["../evil", "a/b", "", "   ", "x.json"] {
            assert!(
                matches!(store.load(name), Err(TemplateError::InvalidName(_))),
                "{name:?}"
            );
        }
        assert!(validate_name("My Template_2-final").is_ok());
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        let store = TemplateStore::open(dir.path()).unwrap();
        fs::write(
            dir.path().join(TEMPLATE_DIR).join("bare.json"),
            r#"{ "name": "bare", "saved_at": "2024-05-01T10:00:00Z" }"#,
        )
        .unwrap();

        let loaded = store.load("bare").unwrap().unwrap();
        assert_eq!(loaded.render, RenderConfig::default());
        assert_eq!(loaded.export, ExportSpec::default());
    }
}
