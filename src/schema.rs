//! Parameter Schema - Kinds, Constraints, Validation
//!
//! Definitions are data. Validation is advisory: a failing value is reported
//! for UI consumption but still flows through to the draw procedure.

use regex::Regex;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{OnceLock, PoisonError, RwLock};
use thiserror::Error;

use crate::visibility::VisibilityRule;

/// Category names used to group parameters in a control panel.
pub mod categories {
    pub const BACKGROUND: &str = "Background";
    pub const FILL: &str = "Fill";
    pub const STROKE: &str = "Stroke";
    pub const ANIMATION: &str = "Animation";
    pub const GEOMETRY: &str = "Geometry";
    pub const TYPOGRAPHY: &str = "Typography";
    pub const EFFECTS: &str = "Effects";
    pub const ADVANCED: &str = "Advanced";
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Duplicate parameter key: {0}")]
    DuplicateKey(String),

    #[error("Default for '{key}' fails its own definition: {message}")]
    InvalidDefault { key: String, message: String },

    #[error("Invalid definition for '{key}': {message}")]
    InvalidDefinition { key: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SelectOption {
    Labeled { value: Value, label: String },
    Plain(Value),
}

impl SelectOption {
    pub fn value(&self) -> &Value {
        match self {
            Self::Labeled { value, .. } => value,
            Self::Plain(value) => value,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Labeled { label, .. } => label.clone(),
            Self::Plain(Value::String(s)) => s.clone(),
            Self::Plain(other) => other.to_string(),
        }
    }
}

impl From<&str> for SelectOption {
    fn from(value: &str) -> Self {
        Self::Plain(Value::String(value.to_string()))
    }
}

impl From<(&str, &str)> for SelectOption {
    fn from((value, label): (&str, &str)) -> Self {
        Self::Labeled {
            value: Value::String(value.to_string()),
            label: label.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TextValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Kind-specific default and constraints. Serialized with a `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParameterKind {
    Slider {
        default: f64,
        min: f64,
        max: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<f64>,
    },
    Number {
        default: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    Color {
        default: String,
        #[serde(default)]
        show_alpha: bool,
    },
    Select {
        default: Value,
        options: Vec<SelectOption>,
    },
    #[serde(rename_all = "camelCase")]
    Text {
        default: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        placeholder: Option<String>,
        #[serde(default)]
        multiline: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        validation: Option<TextValidation>,
    },
    #[serde(rename_all = "camelCase")]
    Toggle {
        default: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        off_label: Option<String>,
    },
}

impl ParameterKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Slider { .. } => "slider",
            Self::Number { .. } => "number",
            Self::Color { .. } => "color",
            Self::Select { .. } => "select",
            Self::Text { .. } => "text",
            Self::Toggle { .. } => "toggle",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    #[serde(flatten)]
    pub kind: ParameterKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, rename = "when", skip_serializing_if = "Option::is_none")]
    pub visibility: Option<VisibilityRule>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
}

impl ParameterDefinition {
    pub fn new(kind: ParameterKind) -> Self {
        Self {
            kind,
            label: None,
            description: None,
            category: None,
            unit: None,
            visibility: None,
            hidden: false,
        }
    }

    pub fn slider(default: f64, min: f64, max: f64) -> Self {
        Self::new(ParameterKind::Slider { default, min, max, step: None })
    }

    pub fn number(default: f64) -> Self {
        Self::new(ParameterKind::Number { default, min: None, max: None, step: None })
    }

    pub fn color(default: &str) -> Self {
        Self::new(ParameterKind::Color { default: default.to_string(), show_alpha: false })
    }

    pub fn select<O: Into<SelectOption>>(
        default: &str,
        options: impl IntoIterator<Item = O>,
    ) -> Self {
        Self::new(ParameterKind::Select {
            default: Value::String(default.to_string()),
            options: options.into_iter().map(Into::into).collect(),
        })
    }

    pub fn text(default: &str) -> Self {
        Self::new(ParameterKind::Text {
            default: default.to_string(),
            max_length: None,
            placeholder: None,
            multiline: false,
            validation: None,
        })
    }

    pub fn toggle(default: bool) -> Self {
        Self::new(ParameterKind::Toggle { default, on_label: None, off_label: None })
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    /// Sets the step of a slider or number; other kinds are unaffected.
    pub fn step(mut self, value: f64) -> Self {
        match &mut self.kind {
            ParameterKind::Slider { step, .. } | ParameterKind::Number { step, .. } => {
                *step = Some(value);
            }
            _ => {}
        }
        self
    }

    pub fn max_length(mut self, value: usize) -> Self {
        if let ParameterKind::Text { max_length, .. } = &mut self.kind {
            *max_length = Some(value);
        }
        self
    }

    pub fn pattern(mut self, pattern: &str, message: Option<&str>) -> Self {
        if let ParameterKind::Text { validation, .. } = &mut self.kind {
            *validation = Some(TextValidation {
                pattern: Some(pattern.to_string()),
                message: message.map(str::to_string),
            });
        }
        self
    }

    pub fn when(mut self, rule: VisibilityRule) -> Self {
        self.visibility = Some(rule);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn default_value(&self) -> Value {
        match &self.kind {
            ParameterKind::Slider { default, .. } | ParameterKind::Number { default, .. } => {
                number_value(*default)
            }
            ParameterKind::Color { default, .. } | ParameterKind::Text { default, .. } => {
                Value::String(default.clone())
            }
            ParameterKind::Select { default, .. } => default.clone(),
            ParameterKind::Toggle { default, .. } => Value::Bool(*default),
        }
    }

    /// Display label, falling back to the humanized key.
    pub fn display_label(&self, key: &str) -> String {
        self.label.clone().unwrap_or_else(|| humanize(key))
    }

    /// Structural checks that do not depend on a value.
    pub fn check(&self, key: &str) -> Result<(), SchemaError> {
        let invalid = |message: String| SchemaError::InvalidDefinition {
            key: key.to_string(),
            message,
        };
        match &self.kind {
            ParameterKind::Slider { min, max, .. } if min > max => {
                Err(invalid(format!("min {} is greater than max {}", min, max)))
            }
            ParameterKind::Number { min: Some(min), max: Some(max), .. } if min > max => {
                Err(invalid(format!("min {} is greater than max {}", min, max)))
            }
            ParameterKind::Select { options, .. } if options.is_empty() => {
                Err(invalid("select requires at least one option".to_string()))
            }
            ParameterKind::Text {
                validation: Some(TextValidation { pattern: Some(p), .. }),
                ..
            } => {
                compiled_pattern(p)
                    .map(|_| ())
                    .map_err(|e| invalid(format!("invalid pattern: {}", e)))
            }
            _ => Ok(()),
        }?;

        let outcome = validate(self, &self.default_value());
        match outcome.error {
            Some(message) => Err(SchemaError::InvalidDefault { key: key.to_string(), message }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationOutcome {
    pub fn ok() -> Self {
        Self { valid: true, error: None }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self { valid: false, error: Some(message.into()) }
    }
}

/// Validate a value against its definition's per-kind constraints.
pub fn validate(definition: &ParameterDefinition, value: &Value) -> ValidationOutcome {
    match &definition.kind {
        ParameterKind::Slider { min, max, .. } => check_number(value, Some(*min), Some(*max)),
        ParameterKind::Number { min, max, .. } => check_number(value, *min, *max),
        ParameterKind::Color { .. } => match value.as_str() {
            Some(s) if is_hex_color(s) => ValidationOutcome::ok(),
            _ => ValidationOutcome::invalid("Invalid color format"),
        },
        ParameterKind::Select { options, .. } => {
            if options.iter().any(|o| same_value(o.value(), value)) {
                ValidationOutcome::ok()
            } else {
                ValidationOutcome::invalid("Invalid option selected")
            }
        }
        ParameterKind::Text { max_length, validation, .. } => {
            let Some(text) = value.as_str() else {
                return ValidationOutcome::invalid("Value must be a string");
            };
            if let Some(max) = max_length {
                if text.chars().count() > *max {
                    return ValidationOutcome::invalid(format!("Maximum length is {}", max));
                }
            }
            if let Some(TextValidation { pattern: Some(pattern), message }) = validation {
                let matches = compiled_pattern(pattern).map_or(false, |re| re.is_match(text));
                if !matches {
                    let message = message.clone().unwrap_or_else(|| "Invalid format".to_string());
                    return ValidationOutcome::invalid(message);
                }
            }
            ValidationOutcome::ok()
        }
        ParameterKind::Toggle { .. } => {
            if value.is_boolean() {
                ValidationOutcome::ok()
            } else {
                ValidationOutcome::invalid("Value must be true or false")
            }
        }
    }
}

static PATTERNS: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();

fn pattern_cache() -> &'static RwLock<HashMap<String, Regex>> {
    PATTERNS.get_or_init(Default::default)
}

/// Text patterns compile once per process; invalid ones are not cached.
fn compiled_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let cache = pattern_cache();
    if let Some(re) = cache.read().unwrap_or_else(PoisonError::into_inner).get(pattern) {
        return Ok(re.clone());
    }
    let re = Regex::new(pattern)?;
    cache
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(pattern.to_string(), re.clone());
    Ok(re)
}

fn check_number(value: &Value, min: Option<f64>, max: Option<f64>) -> ValidationOutcome {
    let Some(n) = value.as_f64() else {
        return ValidationOutcome::invalid("Value must be a number");
    };
    if let Some(min) = min {
        if n < min {
            return ValidationOutcome::invalid(format!("Value must be at least {}", min));
        }
    }
    if let Some(max) = max {
        if n > max {
            return ValidationOutcome::invalid(format!("Value must be at most {}", max));
        }
    }
    ValidationOutcome::ok()
}

/// `#rrggbb` or `#rrggbbaa`.
pub fn is_hex_color(s: &str) -> bool {
    match s.strip_prefix('#') {
        Some(hex) => {
            (hex.len() == 6 || hex.len() == 8) && hex.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}

/// Value equality where `10` and `10.0` compare equal.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Integral floats become JSON integers so defaults read naturally.
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// `fillColor` -> `Fill Color`, `bar_count` -> `Bar Count`.
pub fn humanize(key: &str) -> String {
    let mut words: Vec<String> = vec![];
    let mut current = String::new();
    for c in key.chars() {
        if c == '_' || c == '-' || c == ' ' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else if c.is_uppercase() && !current.is_empty() {
            words.push(std::mem::take(&mut current));
            current.push(c);
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
        .into_iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Ordered mapping of unique keys to definitions, scoped to one template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    entries: Vec<(String, ParameterDefinition)>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self { entries: vec![] }
    }

    /// Builder form. A repeated key replaces the earlier definition in place.
    pub fn with(mut self, key: &str, definition: ParameterDefinition) -> Self {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = definition,
            None => self.entries.push((key.to_string(), definition)),
        }
        self
    }

    pub fn insert(
        &mut self,
        key: &str,
        definition: ParameterDefinition,
    ) -> Result<(), SchemaError> {
        if self.contains(key) {
            return Err(SchemaError::DuplicateKey(key.to_string()));
        }
        self.entries.push((key.to_string(), definition));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&ParameterDefinition> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, d)| d)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterDefinition)> {
        self.entries.iter().map(|(k, d)| (k.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every definition is well formed and its default passes validation.
    pub fn check(&self) -> Result<(), SchemaError> {
        for (key, definition) in &self.entries {
            definition.check(key)?;
        }
        Ok(())
    }

    /// The per-template listing: reserved names removed.
    pub fn template_specific(&self) -> ParameterSet {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(k, _)| !is_reserved(k))
                .cloned()
                .collect(),
        }
    }
}

/// One entry per key, holding that key's default.
pub fn generate_defaults(set: &ParameterSet) -> Map<String, Value> {
    set.iter()
        .map(|(key, definition)| (key.to_string(), definition.default_value()))
        .collect()
}

impl Serialize for ParameterSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, definition) in &self.entries {
            map.serialize_entry(key, definition)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ParameterSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SetVisitor;

        impl<'de> Visitor<'de> for SetVisitor {
            type Value = ParameterSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of parameter keys to definitions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ParameterSet, A::Error> {
                let mut set = ParameterSet::new();
                while let Some((key, definition)) =
                    access.next_entry::<String, ParameterDefinition>()?
                {
                    set.insert(&key, definition).map_err(serde::de::Error::custom)?;
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(SetVisitor)
    }
}

// --- Common parameters ---

static COMMON: OnceLock<ParameterSet> = OnceLock::new();

/// Shared definitions templates may adopt by key. Unlike reserved
/// parameters these belong to the template that declares them.
pub fn common_parameters() -> &'static ParameterSet {
    COMMON.get_or_init(|| {
        ParameterSet::new()
            .with(
                "animationSpeed",
                ParameterDefinition::slider(1.0, 0.0, 5.0)
                    .step(0.1)
                    .unit("x")
                    .label("Animation Speed")
                    .category(categories::ANIMATION),
            )
            .with(
                "rotation",
                ParameterDefinition::slider(0.0, 0.0, 360.0)
                    .step(1.0)
                    .unit("°")
                    .label("Rotation")
                    .category(categories::GEOMETRY),
            )
            .with(
                "scale",
                ParameterDefinition::slider(1.0, 0.1, 3.0)
                    .step(0.1)
                    .label("Scale")
                    .category(categories::GEOMETRY),
            )
            .with(
                "complexity",
                ParameterDefinition::slider(5.0, 1.0, 10.0)
                    .step(1.0)
                    .label("Complexity")
                    .category(categories::ADVANCED),
            )
    })
}

/// A copy of a common definition, ready to place in a template's set.
pub fn common_parameter(key: &str) -> Option<ParameterDefinition> {
    common_parameters().get(key).cloned()
}

// --- Reserved (universal) parameters ---

/// Engine-owned names. Per-template listings never include these.
pub const RESERVED_KEYS: [&str; 18] = [
    "backgroundType",
    "backgroundColor",
    "backgroundOpacity",
    "backgroundGradientStart",
    "backgroundGradientEnd",
    "backgroundGradientDirection",
    "fillType",
    "fillColor",
    "fillOpacity",
    "fillGradientStart",
    "fillGradientEnd",
    "fillGradientDirection",
    "strokeType",
    "strokeColor",
    "strokeWidth",
    "strokeOpacity",
    "strokeDashSize",
    "strokeGapSize",
];

pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

static RESERVED: OnceLock<ParameterSet> = OnceLock::new();

/// The single table of reserved definitions, supplied to every template.
pub fn reserved_parameters() -> &'static ParameterSet {
    RESERVED.get_or_init(build_reserved)
}

/// Default of a reserved parameter. `None` for any other key.
pub fn reserved_default(key: &str) -> Option<Value> {
    reserved_parameters().get(key).map(ParameterDefinition::default_value)
}

fn build_reserved() -> ParameterSet {
    use categories::{BACKGROUND, FILL, STROKE};

    let background_on = || VisibilityRule::one_of("backgroundType", ["solid", "gradient"]);
    let background_gradient = || VisibilityRule::equals("backgroundType", "gradient");
    let fill_on = || VisibilityRule::one_of("fillType", ["solid", "gradient"]);
    let fill_gradient = || VisibilityRule::equals("fillType", "gradient");
    let stroke_on = || VisibilityRule::one_of("strokeType", ["solid", "dashed", "dotted"]);
    let stroke_broken = || VisibilityRule::one_of("strokeType", ["dashed", "dotted"]);

    ParameterSet::new()
        .with(
            "backgroundType",
            ParameterDefinition::select(
                "transparent",
                [
                    ("transparent", "Transparent"),
                    ("solid", "Solid Color"),
                    ("gradient", "Gradient"),
                ],
            )
            .label("Background Type")
            .category(BACKGROUND),
        )
        .with(
            "backgroundColor",
            ParameterDefinition::color("#ffffff")
                .label("Background Color")
                .category(BACKGROUND)
                .when(background_on()),
        )
        .with(
            "backgroundOpacity",
            ParameterDefinition::slider(1.0, 0.0, 1.0)
                .step(0.05)
                .label("Background Opacity")
                .category(BACKGROUND)
                .when(background_on()),
        )
        .with(
            "backgroundGradientStart",
            ParameterDefinition::color("#ffffff")
                .label("Gradient Start")
                .category(BACKGROUND)
                .when(background_gradient()),
        )
        .with(
            "backgroundGradientEnd",
            ParameterDefinition::color("#f0f0f0")
                .label("Gradient End")
                .category(BACKGROUND)
                .when(background_gradient()),
        )
        .with(
            "backgroundGradientDirection",
            ParameterDefinition::slider(0.0, 0.0, 360.0)
                .step(15.0)
                .unit("°")
                .label("Gradient Direction")
                .category(BACKGROUND)
                .when(background_gradient()),
        )
        .with(
            "fillType",
            ParameterDefinition::select(
                "solid",
                [("none", "None"), ("solid", "Solid Color"), ("gradient", "Gradient")],
            )
            .label("Fill Type")
            .category(FILL),
        )
        .with(
            "fillColor",
            ParameterDefinition::color("#3b82f6")
                .label("Fill Color")
                .category(FILL)
                .when(fill_on()),
        )
        .with(
            "fillOpacity",
            ParameterDefinition::slider(1.0, 0.0, 1.0)
                .step(0.05)
                .label("Fill Opacity")
                .category(FILL)
                .when(fill_on()),
        )
        .with(
            "fillGradientStart",
            ParameterDefinition::color("#3b82f6")
                .label("Fill Gradient Start")
                .category(FILL)
                .when(fill_gradient()),
        )
        .with(
            "fillGradientEnd",
            ParameterDefinition::color("#1e40af")
                .label("Fill Gradient End")
                .category(FILL)
                .when(fill_gradient()),
        )
        .with(
            "fillGradientDirection",
            ParameterDefinition::slider(0.0, 0.0, 360.0)
                .step(15.0)
                .unit("°")
                .label("Fill Gradient Direction")
                .category(FILL)
                .when(fill_gradient()),
        )
        .with(
            "strokeType",
            ParameterDefinition::select(
                "none",
                [("none", "None"), ("solid", "Solid"), ("dashed", "Dashed"), ("dotted", "Dotted")],
            )
            .label("Stroke Type")
            .category(STROKE),
        )
        .with(
            "strokeColor",
            ParameterDefinition::color("#1e40af")
                .label("Stroke Color")
                .category(STROKE)
                .when(stroke_on()),
        )
        .with(
            "strokeWidth",
            ParameterDefinition::slider(2.0, 0.0, 20.0)
                .step(0.5)
                .unit("px")
                .label("Stroke Width")
                .category(STROKE)
                .when(stroke_on()),
        )
        .with(
            "strokeOpacity",
            ParameterDefinition::slider(1.0, 0.0, 1.0)
                .step(0.05)
                .label("Stroke Opacity")
                .category(STROKE)
                .when(stroke_on()),
        )
        .with(
            "strokeDashSize",
            ParameterDefinition::slider(5.0, 1.0, 20.0)
                .step(1.0)
                .unit("px")
                .label("Dash Size")
                .category(STROKE)
                .when(stroke_broken()),
        )
        .with(
            "strokeGapSize",
            ParameterDefinition::slider(5.0, 1.0, 20.0)
                .step(1.0)
                .unit("px")
                .label("Gap Size")
                .category(STROKE)
                .when(stroke_broken()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_slider_bounds() {
        let def = ParameterDefinition::slider(10.0, 0.0, 20.0);
        assert!(validate(&def, &json!(0)).valid);
        assert!(validate(&def, &json!(20.0)).valid);
        assert_eq!(validate(&def, &json!(21)).error.as_deref(), Some("Value must be at most 20"));
        assert_eq!(validate(&def, &json!(-0.5)).error.as_deref(), Some("Value must be at least 0"));
        assert_eq!(validate(&def, &json!("10")).error.as_deref(), Some("Value must be a number"));
    }

    #[test]
    fn test_number_without_bounds_accepts_any_number() {
        let def = ParameterDefinition::number(3.0);
        assert!(validate(&def, &json!(-1e9)).valid);
        assert!(!validate(&def, &json!(true)).valid);
    }

    #[test]
    fn test_color_formats() {
        let def = ParameterDefinition::color("#000000");
        assert!(validate(&def, &json!("#3B82f6")).valid);
        assert!(validate(&def, &json!("#3b82f680")).valid);
        assert!(!validate(&def, &json!("#fff")).valid);
        assert!(!validate(&def, &json!("3b82f6")).valid);
        assert!(!validate(&def, &json!("#3b82fg")).valid);
        assert!(!validate(&def, &json!(0x3b82f6)).valid);
    }

    #[test]
    fn test_select_normalizes_labeled_options() {
        let labeled = ParameterDefinition::select("a", [("a", "Alpha"), ("b", "Beta")]);
        assert!(validate(&labeled, &json!("b")).valid);
        assert!(!validate(&labeled, &json!("Beta")).valid);

        let plain = ParameterDefinition::select("x", ["x", "y"]);
        assert!(validate(&plain, &json!("y")).valid);
        assert_eq!(validate(&plain, &json!("z")).error.as_deref(), Some("Invalid option selected"));
    }

    #[test]
    fn test_text_constraints() {
        let def = ParameterDefinition::text("AB")
            .max_length(3)
            .pattern("^[A-Z]+$", Some("Uppercase letters only"));
        assert!(validate(&def, &json!("ABC")).valid);
        assert_eq!(validate(&def, &json!("ABCD")).error.as_deref(), Some("Maximum length is 3"));
        assert_eq!(validate(&def, &json!("ab")).error.as_deref(), Some("Uppercase letters only"));
        assert_eq!(validate(&def, &json!(5)).error.as_deref(), Some("Value must be a string"));

        let unlabeled = ParameterDefinition::text("1").pattern("^[0-9]$", None);
        assert_eq!(validate(&unlabeled, &json!("x")).error.as_deref(), Some("Invalid format"));
    }

    #[test]
    fn test_toggle() {
        let def = ParameterDefinition::toggle(false);
        assert!(validate(&def, &json!(true)).valid);
        assert!(!validate(&def, &json!("true")).valid);
    }

    #[test]
    fn test_default_must_pass_own_validation() {
        let bad = ParameterDefinition::slider(30.0, 0.0, 20.0);
        assert!(matches!(bad.check("size"), Err(SchemaError::InvalidDefault { .. })));

        let bad_select = ParameterDefinition::select("c", ["a", "b"]);
        assert!(bad_select.check("mode").is_err());

        let bad_pattern = ParameterDefinition::text("x").pattern("(", None);
        assert!(matches!(bad_pattern.check("t"), Err(SchemaError::InvalidDefinition { .. })));
    }

    #[test]
    fn test_reserved_table_matches_keys() {
        let reserved = reserved_parameters();
        let keys: Vec<_> = reserved.keys().collect();
        assert_eq!(keys, RESERVED_KEYS.to_vec());
        assert!(reserved.check().is_ok());
    }

    #[test]
    fn test_defaults_cover_every_key_and_validate() {
        let set = reserved_parameters();
        let defaults = generate_defaults(set);
        assert_eq!(defaults.len(), set.len());
        for (key, definition) in set.iter() {
            assert!(validate(definition, &defaults[key]).valid, "default for {key}");
        }
    }

    #[test]
    fn test_template_specific_filters_reserved() {
        let set = ParameterSet::new()
            .with("fillColor", ParameterDefinition::color("#ff0000"))
            .with("size", ParameterDefinition::slider(10.0, 0.0, 20.0));
        let specific = set.template_specific();
        assert_eq!(specific.keys().collect::<Vec<_>>(), vec!["size"]);
    }

    #[test]
    fn test_parameter_set_json_keeps_order_and_kinds() {
        let set: ParameterSet = serde_json::from_value(json!({
            "zeta": { "type": "slider", "default": 1, "min": 0, "max": 2 },
            "alpha": {
                "type": "select",
                "default": "a",
                "options": ["a", { "value": "b", "label": "B" }]
            },
            "mid": { "type": "text", "default": "", "maxLength": 4, "when": { "alpha": "b" } }
        }))
        .unwrap();
        assert_eq!(set.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(set.get("zeta").unwrap().default_value(), json!(1));
        assert!(set.get("mid").unwrap().visibility.is_some());
        assert!(set.check().is_ok());
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut set = ParameterSet::new();
        set.insert("a", ParameterDefinition::toggle(true)).unwrap();
        assert_eq!(
            set.insert("a", ParameterDefinition::toggle(false)),
            Err(SchemaError::DuplicateKey("a".to_string()))
        );
    }

    #[test]
    fn test_common_parameters() {
        let common = common_parameters();
        assert_eq!(
            common.keys().collect::<Vec<_>>(),
            vec!["animationSpeed", "rotation", "scale", "complexity"]
        );
        common.check().unwrap();
        assert!(common.keys().all(|k| !is_reserved(k)));

        let scale = common_parameter("scale").unwrap();
        assert_eq!(scale.default_value(), json!(1));
        assert!(!validate(&scale, &json!(0.05)).valid);
        assert!(common_parameter("fillColor").is_none());
    }

    #[test]
    fn test_pattern_compiled_once() {
        let def = ParameterDefinition::text("ab-12").pattern("^[a-z]+-[0-9]+$", None);
        assert!(validate(&def, &json!("xy-3")).valid);
        assert!(!validate(&def, &json!("xy")).valid);
        let cache = pattern_cache().read().unwrap();
        assert!(cache.contains_key("^[a-z]+-[0-9]+$"));
    }

    #[test]
    fn test_invalid_pattern_is_definition_error() {
        let def = ParameterDefinition::text("").pattern("(", None);
        assert!(matches!(def.check("t"), Err(SchemaError::InvalidDefinition { .. })));
        assert!(!pattern_cache().read().unwrap().contains_key("("));
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize("fillColor"), "Fill Color");
        assert_eq!(humanize("bar_count"), "Bar Count");
        assert_eq!(humanize("size"), "Size");
    }

    #[test]
    fn test_same_value_numeric() {
        assert!(same_value(&json!(10), &json!(10.0)));
        assert!(!same_value(&json!(10), &json!("10")));
    }
}
