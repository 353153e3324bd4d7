//! Parameter Resolver - Layered Groups to One Flat Map
//!
//! Precedence, highest to lowest:
//! content > custom > style > core > raw root > preset > legacy bag.
//! The legacy bag only fills keys still undefined after every named layer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::ParameterSet;

/// Key under which the legacy free-form bag travels.
pub const LEGACY_BAG_KEY: &str = "customParameters";

/// Named override layers, ordered highest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Content,
    Custom,
    Style,
    Core,
    Root,
    /// Values of an applied template preset.
    Preset,
}

impl Layer {
    pub const PRECEDENCE: [Layer; 6] = [
        Layer::Content,
        Layer::Custom,
        Layer::Style,
        Layer::Core,
        Layer::Root,
        Layer::Preset,
    ];
}

/// Layered raw parameters as supplied by a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterGroups {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<Map<String, Value>>,
    #[serde(default, rename = "customParameters", skip_serializing_if = "Option::is_none")]
    pub legacy: Option<Map<String, Value>>,
    /// Raw top-level parameters.
    #[serde(flatten)]
    pub root: Map<String, Value>,
}

impl ParameterGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, layer: Layer, values: Map<String, Value>) -> Self {
        match layer {
            Layer::Content => self.content = Some(values),
            Layer::Custom => self.custom = Some(values),
            Layer::Style => self.style = Some(values),
            Layer::Core => self.core = Some(values),
            Layer::Root => self.root = values,
            Layer::Preset => self.preset = Some(values),
        }
        self
    }

    pub fn with_legacy(mut self, values: Map<String, Value>) -> Self {
        self.legacy = Some(values);
        self
    }

    pub fn layer(&self, layer: Layer) -> Option<&Map<String, Value>> {
        match layer {
            Layer::Content => self.content.as_ref(),
            Layer::Custom => self.custom.as_ref(),
            Layer::Style => self.style.as_ref(),
            Layer::Core => self.core.as_ref(),
            Layer::Root => Some(&self.root),
            Layer::Preset => self.preset.as_ref(),
        }
    }
}

/// Flat key -> value map handed to a draw procedure. Built fresh per render.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedParameters {
    #[serde(flatten)]
    values: Map<String, Value>,
    #[serde(rename = "customParameters", skip_serializing_if = "Option::is_none")]
    legacy: Option<Map<String, Value>>,
}

impl ResolvedParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: Map<String, Value>) -> Self {
        Self { values, legacy: None }
    }

    pub fn with_legacy(mut self, legacy: Map<String, Value>) -> Self {
        self.legacy = Some(legacy);
        self
    }

    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// Insert only when the key is undefined. Returns whether it was inserted.
    pub fn insert_if_absent(&mut self, key: &str, value: &Value) -> bool {
        if self.values.contains_key(key) {
            return false;
        }
        self.values.insert(key.to_string(), value.clone());
        true
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    pub fn number_or(&self, key: &str, fallback: f64) -> f64 {
        self.number(key).unwrap_or(fallback)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn str_or<'a>(&'a self, key: &str, fallback: &'a str) -> &'a str {
        self.str(key).unwrap_or(fallback)
    }

    pub fn bool_or(&self, key: &str, fallback: bool) -> bool {
        self.values.get(key).and_then(Value::as_bool).unwrap_or(fallback)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }

    pub fn legacy(&self) -> Option<&Map<String, Value>> {
        self.legacy.as_ref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Merge the named layers by precedence, then gap-fill from the legacy bag.
pub fn flatten(groups: &ParameterGroups) -> ResolvedParameters {
    let mut resolved = ResolvedParameters::new();

    for layer in Layer::PRECEDENCE.iter().rev() {
        if let Some(values) = groups.layer(*layer) {
            for (key, value) in values {
                resolved.insert(key, value.clone());
            }
        }
    }

    if let Some(legacy) = &groups.legacy {
        for (key, value) in legacy {
            resolved.insert_if_absent(key, value);
        }
        resolved.legacy = Some(legacy.clone());
    }

    resolved
}

/// Flatten, then fill still-undefined keys from each defaults table in order.
pub fn resolve(groups: &ParameterGroups, defaults: &[&ParameterSet]) -> ResolvedParameters {
    let mut resolved = flatten(groups);
    for set in defaults {
        for (key, definition) in set.iter() {
            resolved.insert_if_absent(key, &definition.default_value());
        }
    }
    resolved
}
