//! Form fragments: one parameter slot of a tag builder's form.
//!
//! Every fragment carries a [`FragmentMetadata`] describing the parameter it
//! binds, whether it is required, an optional regex validation, and the
//! conditions under which it is skipped altogether.

mod kinds;

pub use kinds::*;

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::{TagError, TagResult};
use crate::value::{Params, to_text, values_equal};

/// Discriminant of a fragment, as serialized in the `"type"` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FragmentType {
    DatePicker,
    NumberInput,
    TextInput,
    Select,
    Icon,
    Text,
    Hidden,
}

impl FragmentType {
    pub const ALL: [FragmentType; 7] = [
        FragmentType::TextInput,
        FragmentType::NumberInput,
        FragmentType::DatePicker,
        FragmentType::Select,
        FragmentType::Icon,
        FragmentType::Text,
        FragmentType::Hidden,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentType::DatePicker => "DATE_PICKER",
            FragmentType::NumberInput => "NUMBER_INPUT",
            FragmentType::TextInput => "TEXT_INPUT",
            FragmentType::Select => "SELECT",
            FragmentType::Icon => "ICON",
            FragmentType::Text => "TEXT",
            FragmentType::Hidden => "HIDDEN",
        }
    }
}

impl fmt::Display for FragmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FragmentType {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FragmentType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TagError::UnknownFragmentType(s.to_string()))
    }
}

/// Operators usable in the `$field` form of a skip condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipOperator {
    /// Field value is one of the listed values.
    In,
    /// Field value equals the operand.
    Eq,
}

impl SkipOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipOperator::In => "IN",
            SkipOperator::Eq => "EQ",
        }
    }

    fn parse(op: &str) -> Option<Self> {
        match op.to_uppercase().as_str() {
            "IN" => Some(SkipOperator::In),
            "EQ" => Some(SkipOperator::Eq),
            _ => None,
        }
    }
}

/// Regex validation rule for a fragment value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    pub pattern: String,
    #[serde(default)]
    pub error_message: String,
}

impl Validation {
    pub fn new(pattern: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            error_message: error_message.into(),
        }
    }
}

/// Metadata shared by every fragment kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentMetadata {
    /// Parameter this fragment binds. Empty for static content.
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub default_value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub skip_if: Params,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub skip_unless: Params,
}

impl FragmentMetadata {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = value.into();
        self
    }

    pub fn validation(mut self, validation: Validation) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn skip_if(mut self, condition: Params) -> Self {
        self.skip_if = condition;
        self
    }

    pub fn skip_unless(mut self, condition: Params) -> Self {
        self.skip_unless = condition;
        self
    }

    /// Whether the fragment is skipped for these parameters.
    ///
    /// A matching `skipIf` skips; otherwise a `skipUnless` that does not match
    /// skips. Both clauses may be present.
    pub fn should_skip(&self, params: &Params) -> TagResult<bool> {
        if !self.skip_if.is_empty() {
            let matches = matches_condition(params, &self.skip_if).map_err(|message| {
                TagError::Condition {
                    clause: "skipIf",
                    message,
                }
            })?;
            if matches {
                return Ok(true);
            }
        }

        if !self.skip_unless.is_empty() {
            let matches = matches_condition(params, &self.skip_unless).map_err(|message| {
                TagError::Condition {
                    clause: "skipUnless",
                    message,
                }
            })?;
            if !matches {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Validate the bound parameter.
    ///
    /// Returns [`TagError::ShouldSkipValidate`] when the fragment is skipped;
    /// callers must treat that as success.
    pub fn validate(&self, _ctx: &Context, params: &Params) -> TagResult<()> {
        if self.should_skip(params)? {
            return Err(TagError::ShouldSkipValidate);
        }

        if self.key.is_empty() {
            return Ok(());
        }

        let value = params.get(&self.key);
        if self.required && value.is_none_or(Value::is_null) {
            return Err(TagError::MissingParameter(self.key.clone()));
        }

        let (Some(value), Some(validation)) = (value, &self.validation) else {
            return Ok(());
        };
        if validation.pattern.is_empty() {
            return Ok(());
        }

        let re = Regex::new(&validation.pattern).map_err(|source| TagError::InvalidPattern {
            key: self.key.clone(),
            source,
        })?;
        if !re.is_match(&to_text(value)) {
            let message = if validation.error_message.is_empty() {
                format!("value for {:?} does not match required pattern", self.key)
            } else {
                validation.error_message.clone()
            };
            return Err(TagError::PatternMismatch(message));
        }

        Ok(())
    }
}

/// Implicit AND over every entry of `condition`.
///
/// A plain key compares the field for equality with the entry value. A
/// `$field` key takes an operator map such as `{"IN": [...]}`. Every
/// referenced field must be present in `values`.
fn matches_condition(values: &Params, condition: &Params) -> Result<bool, String> {
    for (key, condition_value) in condition {
        let (field, matched) = match key.strip_prefix('$') {
            Some(field) => {
                let Value::Object(expr) = condition_value else {
                    return Err(format!("expression for field {field:?} must be a map type"));
                };
                let value = values.get(field).ok_or_else(|| missing_field(field))?;
                (field, match_expression(value, expr)?)
            }
            None => {
                let value = values.get(key).ok_or_else(|| missing_field(key))?;
                (key.as_str(), values_equal(value, condition_value))
            }
        };
        tracing::trace!("skip condition on {:?} matched: {}", field, matched);
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn missing_field(field: &str) -> String {
    format!("field {field:?} referenced in condition does not exist")
}

fn match_expression(value: &Value, expr: &Map<String, Value>) -> Result<bool, String> {
    if expr.is_empty() {
        return Err("no valid operators found in expression".to_string());
    }

    for (op, operand) in expr {
        let matched = match SkipOperator::parse(op) {
            Some(SkipOperator::In) => {
                let Value::Array(items) = operand else {
                    return Err(format!(
                        "IN operator requires a slice or array, got {}",
                        crate::value::type_name(operand)
                    ));
                };
                items.iter().any(|item| values_equal(value, item))
            }
            Some(SkipOperator::Eq) => values_equal(value, operand),
            None => return Err(format!("unsupported operator {op:?}")),
        };
        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}
