//! Template System - Definitions and Draw Procedures
//!
//! A template is a parameter set plus a draw procedure. Definitions are
//! built once at registration or first load and never mutated afterward.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::resolver::ResolvedParameters;
use crate::schema::{humanize, ParameterSet, SchemaError};
use crate::surface::Surface;

pub type TemplateId = String;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMetadata {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<semver::Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_min_version: Option<semver::Version>,
}

impl TemplateMetadata {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            ..Default::default()
        }
    }

    pub fn category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn tags<'a>(mut self, tags: impl IntoIterator<Item = &'a str>) -> Self {
        self.tags = tags.into_iter().map(str::to_string).collect();
        self
    }

    /// Placeholder metadata for a bare callable registered by id.
    pub fn for_id(id: &str) -> Self {
        Self::new(&humanize(id), "")
    }
}

/// Error raised by a draw procedure.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DrawError {
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter '{key}': {message}")]
    InvalidParameter { key: String, message: String },

    #[error("{0}")]
    Failed(String),
}

impl DrawError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

type DrawFn = dyn Fn(&mut dyn Surface, f64, f64, &ResolvedParameters, f64) -> Result<(), DrawError>
    + Send
    + Sync;

/// A first-class draw procedure: `(surface, width, height, params, time)`.
#[derive(Clone)]
pub struct DrawProcedure(Arc<DrawFn>);

impl DrawProcedure {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut dyn Surface, f64, f64, &ResolvedParameters, f64) -> Result<(), DrawError>
            + Send
            + Sync
            + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(
        &self,
        surface: &mut dyn Surface,
        width: f64,
        height: f64,
        params: &ResolvedParameters,
        time: f64,
    ) -> Result<(), DrawError> {
        (self.0)(surface, width, height, params, time)
    }

    pub fn ptr_eq(&self, other: &DrawProcedure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for DrawProcedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DrawProcedure(..)")
    }
}

#[derive(Debug, Clone)]
pub struct TemplateDefinition {
    id: TemplateId,
    metadata: TemplateMetadata,
    parameters: ParameterSet,
    draw: DrawProcedure,
}

impl TemplateDefinition {
    /// Fails if any definition is malformed or a default fails its own validation.
    pub fn new(
        id: &str,
        metadata: TemplateMetadata,
        parameters: ParameterSet,
        draw: DrawProcedure,
    ) -> Result<Self, SchemaError> {
        parameters.check()?;
        Ok(Self {
            id: id.to_string(),
            metadata,
            parameters,
            draw,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn metadata(&self) -> &TemplateMetadata {
        &self.metadata
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn draw(&self) -> &DrawProcedure {
        &self.draw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ParameterDefinition;
    use crate::surface::RecordingSurface;
    use serde_json::json;

    fn noop() -> DrawProcedure {
        DrawProcedure::new(|_, _, _, _, _| Ok(()))
    }

    #[test]
    fn test_definition_rejects_bad_default() {
        let params = ParameterSet::new().with("size", ParameterDefinition::slider(25.0, 0.0, 20.0));
        let result = TemplateDefinition::new("t", TemplateMetadata::new("T", ""), params, noop());
        assert!(matches!(result, Err(SchemaError::InvalidDefault { .. })));
    }

    #[test]
    fn test_metadata_wire_form() {
        let meta: TemplateMetadata = serde_json::from_value(json!({
            "name": "Wave Bars",
            "description": "Dynamic bars",
            "tags": ["audio"],
            "version": "1.2.0",
            "engineMinVersion": "1.0.0"
        }))
        .unwrap();
        assert_eq!(meta.version, Some(semver::Version::new(1, 2, 0)));
        assert_eq!(meta.tags, vec!["audio".to_string()]);
        assert!(meta.category.is_none());
    }

    #[test]
    fn test_procedure_call() {
        let proc = DrawProcedure::new(|surface, w, h, params, _| {
            let side = params
                .number("size")
                .ok_or_else(|| DrawError::MissingParameter("size".into()))?;
            surface.fill_rect(0.0, 0.0, side.min(w), side.min(h));
            Ok(())
        });
        let mut s = RecordingSurface::new(10.0, 10.0);
        let err = proc.call(&mut s, 10.0, 10.0, &ResolvedParameters::new(), 0.0).unwrap_err();
        assert_eq!(err.to_string(), "Missing parameter: size");
        proc.call(&mut s, 10.0, 10.0, &ResolvedParameters::new().set("size", 4), 0.0).unwrap();
        assert_eq!(s.commands().len(), 1);
        assert!(proc.ptr_eq(&proc.clone()));
    }

    #[test]
    fn test_for_id_humanizes() {
        assert_eq!(TemplateMetadata::for_id("wave-bars").name, "Wave Bars");
    }
}
