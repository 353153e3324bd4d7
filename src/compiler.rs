//! Template Compiler - Definition to Program
//!
//! Produces, once per template id:
//! - a textual program for storage and inspection: metadata comment,
//!   parameter declarations (reserved first, then the template's own),
//!   the shared helper block, and the draw entry with its legacy shim;
//! - the executable: the template's draw procedure behind that same shim.
//!
//! The text is rendered from structured data. It is never evaluated.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::hashing::compute_program_fingerprint;
use crate::helpers;
use crate::resolver::{ResolvedParameters, LEGACY_BAG_KEY};
use crate::schema::{reserved_parameters, ParameterDefinition, ParameterKind, SchemaError};
use crate::surface::fmt_num;
use crate::templates::{DrawProcedure, TemplateDefinition, TemplateId};

/// Legacy keys copied onto the root before the remaining bag entries.
pub const LEGACY_PRIORITY_KEYS: [&str; 4] =
    ["fillColor", "strokeColor", "backgroundColor", "textColor"];

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Template id must not be empty")]
    EmptyId,

    #[error("Invalid parameter declarations: {0}")]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Clone, Serialize)]
pub struct CompiledParameter {
    pub key: String,
    pub reserved: bool,
    pub definition: ParameterDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompiledTemplateProgram {
    pub template_id: TemplateId,
    pub text: String,
    pub fingerprint: String,
    pub declarations: Vec<CompiledParameter>,
    pub helpers: Vec<&'static str>,
    pub compiled_at: DateTime<Utc>,
}

impl CompiledTemplateProgram {
    pub fn declaration(&self, key: &str) -> Option<&CompiledParameter> {
        self.declarations.iter().find(|d| d.key == key)
    }
}

/// The compiler's output: the inspectable program and the executable.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    pub program: Arc<CompiledTemplateProgram>,
    pub procedure: DrawProcedure,
}

pub fn compile(definition: &TemplateDefinition) -> Result<CompiledTemplate, CompileError> {
    if definition.id().is_empty() {
        return Err(CompileError::EmptyId);
    }
    definition.parameters().check()?;

    let declarations = declarations(definition);
    check_dependencies(definition.id(), &declarations);

    let namespace = helpers::namespace();
    let mut text = String::new();
    write_metadata(&mut text, definition);
    write_declarations(&mut text, &declarations);
    write_helpers(&mut text, namespace);
    write_entry(&mut text, definition.id());

    let program = CompiledTemplateProgram {
        template_id: definition.id().to_string(),
        fingerprint: compute_program_fingerprint(&text),
        text,
        declarations,
        helpers: namespace.names().collect(),
        compiled_at: Utc::now(),
    };
    debug!(
        template = %program.template_id,
        fingerprint = %program.fingerprint,
        "compiled template program"
    );

    let inner = definition.draw().clone();
    let procedure = DrawProcedure::new(move |surface, width, height, params, time| {
        let params = apply_legacy_shim(params);
        inner.call(surface, width, height, &params, time)
    });

    Ok(CompiledTemplate {
        program: Arc::new(program),
        procedure,
    })
}

/// Copy legacy bag entries onto the flat root where the root lacks them,
/// the well-known color keys first.
pub fn apply_legacy_shim(params: &ResolvedParameters) -> Cow<'_, ResolvedParameters> {
    let Some(legacy) = params.legacy() else {
        return Cow::Borrowed(params);
    };
    let mut shimmed = params.clone();
    for key in LEGACY_PRIORITY_KEYS {
        if let Some(value) = legacy.get(key) {
            shimmed.insert_if_absent(key, value);
        }
    }
    for (key, value) in legacy {
        shimmed.insert_if_absent(key, value);
    }
    Cow::Owned(shimmed)
}

fn declarations(definition: &TemplateDefinition) -> Vec<CompiledParameter> {
    let reserved = reserved_parameters().iter().map(|(key, def)| CompiledParameter {
        key: key.to_string(),
        reserved: true,
        definition: def.clone(),
    });
    let own = definition.parameters().template_specific();
    let own: Vec<_> = own
        .iter()
        .map(|(key, def)| CompiledParameter {
            key: key.to_string(),
            reserved: false,
            definition: def.clone(),
        })
        .collect();
    reserved.chain(own).collect()
}

fn check_dependencies(id: &str, declarations: &[CompiledParameter]) {
    let known: HashSet<&str> = declarations.iter().map(|d| d.key.as_str()).collect();
    for declaration in declarations {
        if let Some(rule) = &declaration.definition.visibility {
            for dependency in rule.dependencies() {
                if !known.contains(dependency) {
                    warn!(
                        template = id,
                        parameter = %declaration.key,
                        dependency,
                        "visibility rule reads an undeclared parameter"
                    );
                }
            }
        }
    }
}

fn write_metadata(out: &mut String, definition: &TemplateDefinition) {
    let meta = definition.metadata();
    let _ = writeln!(out, "// {}", meta.name);
    if !meta.description.is_empty() {
        let _ = writeln!(out, "// {}", meta.description);
    }
    let _ = write!(out, "// id: {}", definition.id());
    if let Some(category) = &meta.category {
        let _ = write!(out, " | category: {}", category);
    }
    if !meta.tags.is_empty() {
        let _ = write!(out, " | tags: {}", meta.tags.join(", "));
    }
    out.push('\n');
    if let Some(version) = &meta.version {
        let _ = writeln!(out, "// version: {}", version);
    }
    if let Some(author) = &meta.author {
        let _ = writeln!(out, "// author: {}", author);
    }
    out.push('\n');
}

fn write_declarations(out: &mut String, declarations: &[CompiledParameter]) {
    out.push_str("const PARAMETERS = {\n");
    out.push_str("  // Reserved parameters (engine-owned)\n");
    let mut in_reserved = true;
    for declaration in declarations {
        if in_reserved && !declaration.reserved {
            out.push_str("  // Template parameters\n");
            in_reserved = false;
        }
        let fields = declaration_fields(&declaration.key, &declaration.definition);
        let _ = writeln!(out, "  {}: {{ {} }},", declaration.key, fields);
    }
    out.push_str("};\n\n");
}

fn declaration_fields(key: &str, definition: &ParameterDefinition) -> String {
    let mut fields = vec![format!("type: {}", quote(definition.kind.type_name()))];
    match &definition.kind {
        ParameterKind::Slider { min, max, step, .. } => {
            fields.push(format!("min: {}", fmt_num(*min)));
            fields.push(format!("max: {}", fmt_num(*max)));
            if let Some(step) = step {
                fields.push(format!("step: {}", fmt_num(*step)));
            }
        }
        ParameterKind::Number { min, max, step, .. } => {
            for (name, value) in [("min", min), ("max", max), ("step", step)] {
                if let Some(value) = value {
                    fields.push(format!("{}: {}", name, fmt_num(*value)));
                }
            }
        }
        ParameterKind::Color { show_alpha, .. } => {
            if *show_alpha {
                fields.push("showAlpha: true".to_string());
            }
        }
        ParameterKind::Select { options, .. } => {
            let options = serde_json::to_value(options).unwrap_or(Value::Null);
            fields.push(format!("options: {}", options));
        }
        ParameterKind::Text { max_length, validation, multiline, .. } => {
            if let Some(max) = max_length {
                fields.push(format!("maxLength: {}", max));
            }
            if *multiline {
                fields.push("multiline: true".to_string());
            }
            if let Some(pattern) = validation.as_ref().and_then(|v| v.pattern.as_deref()) {
                fields.push(format!("pattern: {}", quote(pattern)));
            }
        }
        ParameterKind::Toggle { .. } => {}
    }
    fields.push(format!("default: {}", definition.default_value()));
    fields.push(format!("label: {}", quote(&definition.display_label(key))));
    if let Some(category) = &definition.category {
        fields.push(format!("category: {}", quote(category)));
    }
    if let Some(unit) = &definition.unit {
        fields.push(format!("unit: {}", quote(unit)));
    }
    if let Some(rule) = &definition.visibility {
        fields.push(format!("when: ({})", rule.describe()));
    }
    if definition.hidden {
        fields.push("hidden: true".to_string());
    }
    fields.join(", ")
}

fn write_helpers(out: &mut String, namespace: &helpers::HelperNamespace) {
    out.push_str("// Shared helpers (injected)\n");
    for helper in &namespace.helpers {
        let _ = writeln!(out, "// {}{} - {}", helper.name, helper.signature, helper.summary);
    }
    out.push('\n');
}

fn write_entry(out: &mut String, id: &str) {
    out.push_str("function draw(surface, width, height, params, time) {\n");
    let _ = writeln!(out, "  if (params.{}) {{", LEGACY_BAG_KEY);
    for key in LEGACY_PRIORITY_KEYS {
        let _ = writeln!(
            out,
            "    params.{key} ??= params.{bag}.{key};",
            key = key,
            bag = LEGACY_BAG_KEY
        );
    }
    let _ = writeln!(
        out,
        "    for (key in params.{bag}) params[key] ??= params.{bag}[key];",
        bag = LEGACY_BAG_KEY
    );
    out.push_str("  }\n");
    let _ = writeln!(out, "  return native({})(surface, width, height, params, time);", quote(id));
    out.push_str("}\n");
}

fn quote(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ParameterSet;
    use crate::surface::{DrawCommand, Paint, RecordingSurface};
    use crate::templates::TemplateMetadata;
    use crate::visibility::VisibilityRule;
    use serde_json::json;

    fn definition() -> TemplateDefinition {
        let params = ParameterSet::new()
            .with("fillColor", ParameterDefinition::color("#ff0000"))
            .with("size", ParameterDefinition::slider(10.0, 0.0, 20.0).step(1.0).unit("px"))
            .with(
                "mode",
                ParameterDefinition::select("a", [("a", "A"), ("b", "B")])
                    .when(VisibilityRule::equals("fillType", "solid")),
            );
        let draw = DrawProcedure::new(|surface, _, _, params, _| {
            let side = params.number_or("size", 0.0);
            surface.set_fill_style(Paint::color(params.str_or("fillColor", "#000000")));
            surface.fill_rect(0.0, 0.0, side, side);
            Ok(())
        });
        TemplateDefinition::new(
            "squares",
            TemplateMetadata::new("Squares", "Fills a square")
                .category("geometric")
                .tags(["shape"]),
            params,
            draw,
        )
        .unwrap()
    }

    #[test]
    fn test_program_layout_in_order() {
        let compiled = compile(&definition()).unwrap();
        let text = &compiled.program.text;

        let meta = text.find("// Squares").unwrap();
        let decls = text.find("const PARAMETERS").unwrap();
        let helpers_block = text.find("// Shared helpers").unwrap();
        let entry = text.find("function draw").unwrap();
        assert!(meta < decls && decls < helpers_block && helpers_block < entry);

        assert!(text.contains("// id: squares | category: geometric | tags: shape"));
        assert!(text.contains(concat!(
            r#"size: { type: "slider", min: 0, max: 20, step: 1, default: 10, "#,
            r#"label: "Size", unit: "px" },"#
        )));
        assert!(text.contains(r#"when: (fillType == "solid")"#));
        assert!(text.contains("applyUniversalBackground(surface, width, height, params)"));
        assert!(text.contains("params.fillColor ??= params.customParameters.fillColor;"));
    }

    #[test]
    fn test_reserved_first_and_not_duplicated() {
        let compiled = compile(&definition()).unwrap();
        let keys: Vec<_> = compiled.program.declarations.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys.iter().filter(|k| **k == "fillColor").count(), 1);
        assert_eq!(keys[0], "backgroundType");
        assert_eq!(&keys[keys.len() - 2..], &["size", "mode"]);
        assert!(compiled.program.declaration("fillColor").unwrap().reserved);
        assert_eq!(compiled.program.text.matches("  fillColor:").count(), 1);
    }

    #[test]
    fn test_fingerprint_stable_across_compilations() {
        let a = compile(&definition()).unwrap();
        let b = compile(&definition()).unwrap();
        assert_eq!(a.program.fingerprint, b.program.fingerprint);
        assert_eq!(a.program.text, b.program.text);
    }

    #[test]
    fn test_shim_copies_legacy_onto_root_when_absent() {
        let params = ResolvedParameters::new()
            .set("size", 4)
            .with_legacy(
                json!({ "fillColor": "#00ff00", "size": 9, "extra": 1 })
                    .as_object()
                    .cloned()
                    .unwrap(),
            );
        let shimmed = apply_legacy_shim(&params);
        assert_eq!(shimmed.str("fillColor"), Some("#00ff00"));
        assert_eq!(shimmed.number("size"), Some(4.0));
        assert_eq!(shimmed.number("extra"), Some(1.0));

        let plain = ResolvedParameters::new().set("size", 4);
        assert!(matches!(apply_legacy_shim(&plain), Cow::Borrowed(_)));
    }

    #[test]
    fn test_compiled_procedure_runs_behind_shim() {
        let compiled = compile(&definition()).unwrap();
        let params = ResolvedParameters::new()
            .set("size", 3)
            .with_legacy(json!({ "fillColor": "#00ff00" }).as_object().cloned().unwrap());
        let mut surface = RecordingSurface::new(20.0, 20.0);
        compiled.procedure.call(&mut surface, 20.0, 20.0, &params, 0.0).unwrap();
        assert!(matches!(
            &surface.commands()[0],
            DrawCommand::FillRect { paint, width, .. }
                if *paint == Paint::color("#00ff00") && *width == 3.0
        ));
    }
}
