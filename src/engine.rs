//! Render Entrypoint
//!
//! Single entry point for drawing a template:
//! helpers init → load → resolve → sandboxed execute.
//! Load failures abort before the surface is touched. Presets are applied
//! to the caller's groups before a render, never during one.

use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::catalog;
use crate::config::{ConfigError, EngineConfig};
use crate::helpers;
use crate::presets::{PresetError, PresetRegistry, TemplatePreset};
use crate::registry::{LoadError, LoadedTemplate, RegisterError, TemplateRegistry};
use crate::resolver::{flatten, resolve, ParameterGroups, ResolvedParameters};
use crate::sandbox::{ExecutionResult, Sandbox};
use crate::schema::{is_reserved, reserved_parameters, validate};
use crate::surface::Surface;
use crate::visibility::is_visible;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Built-in catalog is invalid: {0}")]
    Catalog(#[from] RegisterError),

    #[error(transparent)]
    Preset(#[from] PresetError),

    #[error("Failed to scan {path}: {message}")]
    Io { path: PathBuf, message: String },
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Load(e) if e.is_not_found())
    }
}

/// Per-parameter view for a control panel: current value, advisory
/// validation and visibility.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterReport {
    pub key: String,
    pub value: Option<Value>,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub visible: bool,
    pub reserved: bool,
}

#[derive(Debug)]
pub struct Engine {
    registry: TemplateRegistry,
    presets: PresetRegistry,
    sandbox: Sandbox,
    config: EngineConfig,
}

impl Engine {
    /// Engine over `registry` with no presets.
    pub fn new(registry: TemplateRegistry, config: EngineConfig) -> Self {
        Self {
            registry,
            presets: PresetRegistry::new(),
            sandbox: Sandbox::new(config.sandbox.clone()),
            config,
        }
    }

    pub fn with_presets(mut self, presets: PresetRegistry) -> Self {
        self.presets = presets;
        self
    }

    /// Built-in catalog and presets, plus any manifests under
    /// `templates_dir` and presets under `presets_dir`.
    pub fn from_config(config: EngineConfig) -> Result<Self, EngineError> {
        let mut registry = TemplateRegistry::new();
        catalog::register_builtin(&mut registry)?;
        if let Some(dir) = &config.templates_dir {
            let procedures = Arc::new(catalog::builtin_procedures());
            registry.scan_manifest_dir(dir, procedures).map_err(|e| EngineError::Io {
                path: dir.clone(),
                message: e.to_string(),
            })?;
        }

        let mut presets = PresetRegistry::new();
        catalog::register_builtin_presets(&mut presets)?;
        if let Some(dir) = &config.presets_dir {
            presets.load_dir(dir)?;
        }
        Ok(Self::new(registry, config).with_presets(presets))
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TemplateRegistry {
        &mut self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn presets(&self) -> &PresetRegistry {
        &self.presets
    }

    /// Presets offered for a registered template.
    pub fn presets_for(&self, template_id: &str) -> Result<Vec<&TemplatePreset>, EngineError> {
        if !self.registry.is_registered(template_id) {
            return Err(LoadError::NotFound(template_id.to_string()).into());
        }
        Ok(self.presets.for_template(template_id))
    }

    /// `groups` with `preset_id` filling the preset layer. Explicit values
    /// in `groups` keep precedence over the preset's.
    pub fn apply_preset(
        &self,
        template_id: &str,
        preset_id: &str,
        groups: &ParameterGroups,
    ) -> Result<ParameterGroups, EngineError> {
        if !self.registry.is_registered(template_id) {
            return Err(LoadError::NotFound(template_id.to_string()).into());
        }
        let preset = self.presets.for_template_id(template_id, preset_id)?;
        debug!(template = template_id, preset = preset_id, "applying preset");
        Ok(preset.apply(groups))
    }

    /// Draw `template_id` onto `surface`.
    ///
    /// `Err` means the template could not be loaded and nothing was drawn.
    /// A failing draw procedure is `Ok` with `success == false`, and the
    /// surface holds the error rendering.
    pub fn generate_visualization(
        &self,
        surface: &mut dyn Surface,
        template_id: &str,
        groups: &ParameterGroups,
        time: f64,
        width: f64,
        height: f64,
    ) -> Result<ExecutionResult, EngineError> {
        helpers::initialize();
        let loaded = self.registry.load(template_id)?;
        let params = self.resolve_loaded(&loaded, groups);
        debug!(
            template = template_id,
            parameters = params.len(),
            time,
            "rendering template"
        );
        Ok(self.sandbox.execute(&loaded.procedure, surface, width, height, &params, time))
    }

    /// The flat parameters a render of `template_id` would see.
    pub fn resolve(
        &self,
        template_id: &str,
        groups: &ParameterGroups,
    ) -> Result<ResolvedParameters, EngineError> {
        let loaded = self.registry.load(template_id)?;
        Ok(self.resolve_loaded(&loaded, groups))
    }

    /// Reserved parameters first, then the template's own.
    pub fn describe_parameters(
        &self,
        template_id: &str,
        groups: &ParameterGroups,
    ) -> Result<Vec<ParameterReport>, EngineError> {
        let loaded = self.registry.load(template_id)?;
        let resolved = self.resolve_loaded(&loaded, groups);
        let own = loaded.definition.parameters().template_specific();

        let reports = reserved_parameters()
            .iter()
            .chain(own.iter())
            .map(|(key, definition)| {
                let value = resolved.get(key).cloned();
                let outcome = value.as_ref().map(|v| validate(definition, v));
                ParameterReport {
                    key: key.to_string(),
                    valid: outcome.as_ref().map_or(true, |o| o.valid),
                    error: outcome.and_then(|o| o.error),
                    visible: is_visible(key, definition, resolved.as_map()),
                    reserved: is_reserved(key),
                    value,
                }
            })
            .collect();
        Ok(reports)
    }

    fn resolve_loaded(
        &self,
        loaded: &LoadedTemplate,
        groups: &ParameterGroups,
    ) -> ResolvedParameters {
        if self.config.apply_defaults {
            resolve(groups, &[loaded.definition.parameters(), reserved_parameters()])
        } else {
            flatten(groups)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Layer;
    use crate::surface::RecordingSurface;
    use serde_json::json;

    fn engine() -> Engine {
        Engine::from_config(EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_unknown_template_leaves_surface_blank() {
        let mut surface = RecordingSurface::new(50.0, 50.0);
        let err = engine()
            .generate_visualization(
                &mut surface,
                "missing",
                &ParameterGroups::new(),
                0.0,
                50.0,
                50.0,
            )
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(surface.is_blank());
        assert!(helpers::is_initialized());
    }

    #[test]
    fn test_builtin_renders() {
        let mut surface = RecordingSurface::new(200.0, 200.0);
        let result = engine()
            .generate_visualization(
                &mut surface,
                "minimal-shape",
                &ParameterGroups::new(),
                0.0,
                200.0,
                200.0,
            )
            .unwrap();
        assert!(result.success);
        assert!(!surface.is_blank());
    }

    #[test]
    fn test_template_defaults_fill_gaps() {
        let params = engine().resolve("minimal-shape", &ParameterGroups::new()).unwrap();
        assert_eq!(params.str("shape"), Some("square"));
        assert_eq!(params.str("backgroundType"), Some("transparent"));

        let no_defaults = Engine::from_config(EngineConfig {
            apply_defaults: false,
            ..EngineConfig::default()
        })
        .unwrap();
        let resolved = no_defaults.resolve("minimal-shape", &ParameterGroups::new()).unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_preset_fills_below_caller_values() {
        let engine = engine();
        let groups = ParameterGroups::new().with_layer(
            Layer::Core,
            json!({ "size": 20 }).as_object().cloned().unwrap(),
        );
        let applied = engine.apply_preset("minimal-shape", "rotated-square", &groups).unwrap();
        let params = engine.resolve("minimal-shape", &applied).unwrap();
        assert_eq!(params.number("size"), Some(20.0));
        assert_eq!(params.number("rotation"), Some(45.0));
        assert_eq!(params.str("fillColor"), Some("#3b82f6"));

        let mut surface = RecordingSurface::new(100.0, 100.0);
        let result = engine
            .generate_visualization(&mut surface, "minimal-shape", &applied, 0.0, 100.0, 100.0)
            .unwrap();
        assert!(result.success);
    }

    #[test]
    fn test_preset_errors() {
        let engine = engine();
        let groups = ParameterGroups::new();
        assert!(engine.apply_preset("missing", "calm-bars", &groups).unwrap_err().is_not_found());
        assert!(matches!(
            engine.apply_preset("minimal-shape", "calm-bars", &groups),
            Err(EngineError::Preset(PresetError::WrongTemplate { .. }))
        ));
        assert!(matches!(
            engine.apply_preset("audio-bars", "nope", &groups),
            Err(EngineError::Preset(PresetError::NotFound(_)))
        ));

        let ids: Vec<&str> = engine
            .presets_for("audio-bars")
            .unwrap()
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["calm-bars", "mirrored-spectrum"]);
        assert!(Engine::new(TemplateRegistry::new(), EngineConfig::default()).presets().is_empty());
    }

    #[test]
    fn test_describe_parameters_reports_visibility() {
        let groups = ParameterGroups::new().with_layer(
            Layer::Style,
            json!({ "backgroundType": "transparent", "size": 500 }).as_object().cloned().unwrap(),
        );
        let reports = engine().describe_parameters("minimal-shape", &groups).unwrap();

        let background_color = reports.iter().find(|r| r.key == "backgroundColor").unwrap();
        assert!(background_color.reserved);
        assert!(!background_color.visible);

        let size = reports.iter().find(|r| r.key == "size").unwrap();
        assert!(!size.reserved);
        assert!(!size.valid);
        assert!(size.error.as_deref().unwrap().starts_with("Value must be at most"));
        assert_eq!(reports.iter().filter(|r| r.key == "fillColor").count(), 1);
    }
}
