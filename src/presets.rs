//! Template Presets
//!
//! Curated parameter combinations for one template. Applying a preset
//! fills the `preset` layer, so anything the caller sets explicitly still
//! wins. Presets shape geometry and motion only: reserved appearance keys
//! and text content are never taken from a preset.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::resolver::{Layer, ParameterGroups};
use crate::schema::is_reserved;
use crate::templates::TemplateId;

/// Text content keys a preset leaves to the caller.
const CONTENT_KEYS: &[&str] = &[
    "text", "letter", "letters", "brandName", "words", "title", "subtitle", "caption",
];

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("Duplicate preset id: {0}")]
    Duplicate(String),

    #[error("Preset not found: {0}")]
    NotFound(String),

    #[error("Preset '{preset}' is for template '{expected}', not '{template}'")]
    WrongTemplate {
        preset: String,
        expected: TemplateId,
        template: TemplateId,
    },

    #[error("Failed to read presets {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Invalid presets {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePreset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub template_id: TemplateId,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TemplatePreset {
    pub fn new(id: &str, name: &str, template_id: &str, params: Map<String, Value>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            template_id: template_id.to_string(),
            params,
            tags: Vec::new(),
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a preset may set `key`.
    pub fn applies_to(key: &str) -> bool {
        !is_reserved(key) && !CONTENT_KEYS.contains(&key)
    }

    /// The values this preset contributes, preserved keys dropped.
    pub fn values(&self) -> Map<String, Value> {
        self.params
            .iter()
            .filter(|(key, _)| Self::applies_to(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// `groups` with the preset layer replaced by this preset's values.
    pub fn apply(&self, groups: &ParameterGroups) -> ParameterGroups {
        groups.clone().with_layer(Layer::Preset, self.values())
    }
}

/// Presets in registration order, unique by id.
#[derive(Debug, Clone, Default)]
pub struct PresetRegistry {
    presets: Vec<TemplatePreset>,
}

impl PresetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, preset: TemplatePreset) -> Result<(), PresetError> {
        if self.get(&preset.id).is_some() {
            return Err(PresetError::Duplicate(preset.id));
        }
        self.presets.push(preset);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&TemplatePreset> {
        self.presets.iter().find(|p| p.id == id)
    }

    /// `id`, checked to belong to `template_id`.
    pub fn for_template_id(
        &self,
        template_id: &str,
        id: &str,
    ) -> Result<&TemplatePreset, PresetError> {
        let preset = self.get(id).ok_or_else(|| PresetError::NotFound(id.to_string()))?;
        if preset.template_id != template_id {
            return Err(PresetError::WrongTemplate {
                preset: id.to_string(),
                expected: preset.template_id.clone(),
                template: template_id.to_string(),
            });
        }
        Ok(preset)
    }

    /// Presets of one template. Unknown templates simply have none.
    pub fn for_template(&self, template_id: &str) -> Vec<&TemplatePreset> {
        self.presets.iter().filter(|p| p.template_id == template_id).collect()
    }

    pub fn with_tag(&self, tag: &str) -> Vec<&TemplatePreset> {
        self.presets.iter().filter(|p| p.tags.iter().any(|t| t == tag)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TemplatePreset> {
        self.presets.iter()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    /// Register every preset from the `*.json` files in `dir`, each holding
    /// an array of presets. Files are read in name order. Returns how many
    /// presets were added.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, PresetError> {
        if !dir.exists() {
            warn!(dir = %dir.display(), "preset directory does not exist");
            return Ok(0);
        }
        let io_error = |path: &Path, e: std::io::Error| PresetError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        let mut files = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| io_error(dir, e))? {
            let path = entry.map_err(|e| io_error(dir, e))?.path();
            if path.extension().map_or(false, |e| e == "json") {
                files.push(path);
            }
        }
        files.sort();

        let mut count = 0;
        for path in files {
            let content = fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
            let presets: Vec<TemplatePreset> =
                serde_json::from_str(&content).map_err(|e| PresetError::Parse {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            for preset in presets {
                self.register(preset)?;
                count += 1;
            }
        }
        info!(dir = %dir.display(), count, "registered template presets");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::flatten;
    use serde_json::json;

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn circle() -> TemplatePreset {
        TemplatePreset::new(
            "perfect-circle",
            "Perfect Circle",
            "minimal-shape",
            map(json!({ "shape": "circle", "size": 70, "fillColor": "#000000", "caption": "hi" })),
        )
        .tags(["simple", "geometric"])
    }

    #[test]
    fn test_preserved_keys_are_skipped() {
        let values = circle().values();
        assert_eq!(values.keys().collect::<Vec<_>>(), vec!["shape", "size"]);
        assert!(!TemplatePreset::applies_to("strokeType"));
        assert!(TemplatePreset::applies_to("rotation"));
    }

    #[test]
    fn test_apply_fills_only_the_preset_layer() {
        let groups = ParameterGroups::new().with_layer(Layer::Custom, map(json!({ "size": 30 })));
        let applied = circle().apply(&groups);
        assert_eq!(applied.custom, groups.custom);

        let flat = flatten(&applied);
        assert_eq!(flat.number("size"), Some(30.0));
        assert_eq!(flat.str("shape"), Some("circle"));
        assert!(!flat.contains("fillColor"));
    }

    #[test]
    fn test_registry_lookups() {
        let mut registry = PresetRegistry::new();
        registry.register(circle()).unwrap();
        registry
            .register(
                TemplatePreset::new("calm", "Calm", "audio-bars", Map::new()).tags(["simple"]),
            )
            .unwrap();

        assert!(matches!(
            registry.register(circle()),
            Err(PresetError::Duplicate(id)) if id == "perfect-circle"
        ));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.for_template("minimal-shape").len(), 1);
        assert!(registry.for_template("nope").is_empty());
        assert_eq!(registry.with_tag("simple").len(), 2);

        assert!(registry.for_template_id("minimal-shape", "perfect-circle").is_ok());
        assert!(matches!(
            registry.for_template_id("audio-bars", "perfect-circle"),
            Err(PresetError::WrongTemplate { .. })
        ));
        assert!(matches!(
            registry.for_template_id("audio-bars", "nope"),
            Err(PresetError::NotFound(_))
        ));
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("shapes.json"),
            json!([
                {
                    "id": "rotated-square",
                    "name": "Diamond",
                    "templateId": "minimal-shape",
                    "params": { "shape": "square", "rotation": 45 },
                    "tags": ["angular"]
                },
                { "id": "bare", "name": "Bare", "templateId": "minimal-shape" }
            ])
            .to_string(),
        )
        .unwrap();
        fs::write(dir.path().join("readme.txt"), "ignored").unwrap();

        let mut registry = PresetRegistry::new();
        assert_eq!(registry.load_dir(dir.path()).unwrap(), 2);
        let square = registry.get("rotated-square").unwrap();
        assert_eq!(square.params["rotation"], json!(45));
        assert!(registry.get("bare").unwrap().params.is_empty());

        fs::write(dir.path().join("broken.json"), "{").unwrap();
        let mut fresh = PresetRegistry::new();
        assert!(matches!(fresh.load_dir(dir.path()), Err(PresetError::Parse { .. })));
        assert_eq!(PresetRegistry::new().load_dir(&dir.path().join("missing")).unwrap(), 0);
    }
}
