//! Visibility Rules
//!
//! A rule is a small expression tree over named parameters: equality,
//! membership, and conjunction. Rules are data, evaluated against the
//! resolved values and rendered back to text for inspection.
//!
//! JSON has no `undefined`, so an expected `null` matches a key that is
//! absent as well as one explicitly set to `null`.

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

use crate::schema::{same_value, ParameterDefinition};

#[derive(Debug, Clone, PartialEq)]
pub enum VisibilityRule {
    /// The dependent key equals a single expected value.
    Equals { key: String, value: Value },
    /// The dependent key is one of the expected values.
    OneOf { key: String, values: Vec<Value> },
    /// Every child rule holds. An empty conjunction always holds.
    All(Vec<VisibilityRule>),
}

impl VisibilityRule {
    pub fn equals(key: &str, value: impl Into<Value>) -> Self {
        Self::Equals { key: key.to_string(), value: value.into() }
    }

    pub fn one_of<V: Into<Value>>(key: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self::OneOf {
            key: key.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn all(rules: impl IntoIterator<Item = VisibilityRule>) -> Self {
        Self::All(rules.into_iter().collect())
    }

    /// Conjunction with another rule, flattening nested `All`s.
    pub fn and(self, other: VisibilityRule) -> Self {
        let mut rules = match self {
            Self::All(rules) => rules,
            rule => vec![rule],
        };
        match other {
            Self::All(more) => rules.extend(more),
            rule => rules.push(rule),
        }
        Self::All(rules)
    }

    pub fn evaluate(&self, values: &Map<String, Value>) -> bool {
        match self {
            Self::Equals { key, value } => matches_expected(values.get(key), value),
            Self::OneOf { key, values: expected } => {
                let current = values.get(key);
                expected.iter().any(|e| matches_expected(current, e))
            }
            Self::All(rules) => rules.iter().all(|r| r.evaluate(values)),
        }
    }

    /// Keys this rule reads, in rule order.
    pub fn dependencies(&self) -> Vec<&str> {
        let mut keys = vec![];
        for leaf in self.leaves() {
            match leaf {
                Self::Equals { key, .. } | Self::OneOf { key, .. } => keys.push(key.as_str()),
                Self::All(_) => {}
            }
        }
        keys
    }

    /// Human-readable form, e.g. `fillType in ["solid", "gradient"] && shape == "grid"`.
    pub fn describe(&self) -> String {
        match self {
            Self::Equals { key, value } => format!("{} == {}", key, value),
            Self::OneOf { key, values } => {
                let items: Vec<String> = values.iter().map(Value::to_string).collect();
                format!("{} in [{}]", key, items.join(", "))
            }
            Self::All(rules) if rules.is_empty() => "always".to_string(),
            Self::All(rules) => rules.iter().map(Self::describe).collect::<Vec<_>>().join(" && "),
        }
    }

    fn leaves(&self) -> Vec<&VisibilityRule> {
        match self {
            Self::All(rules) => rules.iter().flat_map(Self::leaves).collect(),
            leaf => vec![leaf],
        }
    }
}

fn matches_expected(current: Option<&Value>, expected: &Value) -> bool {
    match current {
        None => expected.is_null(),
        Some(value) => same_value(value, expected),
    }
}

/// Whether a parameter's control should be shown given the resolved values.
pub fn is_visible(
    key: &str,
    definition: &ParameterDefinition,
    values: &Map<String, Value>,
) -> bool {
    if definition.hidden {
        return false;
    }
    let Some(rule) = &definition.visibility else {
        return true;
    };
    let visible = rule.evaluate(values);
    trace!(key, visible, rule = %rule.describe(), "evaluated visibility");
    visible
}

// Wire form: `{ "dependentKey": expected | [expected, ...], ... }`, all ANDed.

impl Serialize for VisibilityRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let leaves = self.leaves();
        let mut map = serializer.serialize_map(Some(leaves.len()))?;
        for leaf in leaves {
            match leaf {
                Self::Equals { key, value } => map.serialize_entry(key, value)?,
                Self::OneOf { key, values } => map.serialize_entry(key, values)?,
                Self::All(_) => {}
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for VisibilityRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let conditions = Map::<String, Value>::deserialize(deserializer)?;
        let mut rules: Vec<VisibilityRule> = conditions
            .into_iter()
            .map(|(key, expected)| match expected {
                Value::Array(values) => Self::OneOf { key, values },
                value => Self::Equals { key, value },
            })
            .collect();
        if rules.len() == 1 {
            if let Some(rule) = rules.pop() {
                return Ok(rule);
            }
        }
        Ok(Self::All(rules))
    }
}
