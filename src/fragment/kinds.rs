use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{FragmentMetadata, FragmentType};
use crate::context::Context;
use crate::error::{TagError, TagResult};
use crate::value::{Params, to_slice, values_equal};

/// Free text input. The value must be a string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextInputFragment {
    #[serde(flatten)]
    pub metadata: FragmentMetadata,
}

impl TextInputFragment {
    pub fn new(metadata: FragmentMetadata) -> Self {
        Self { metadata }
    }

    pub fn validate(&self, ctx: &Context, params: &Params) -> TagResult<()> {
        let key = require_key(&self.metadata, "text input")?;
        self.metadata.validate(ctx, params)?;

        match present(params, key) {
            Some(Value::String(_)) | None => Ok(()),
            Some(_) => Err(TagError::invalid(format!(
                "value for {key:?} must be a string"
            ))),
        }
    }
}

/// Numeric input with optional bounds. A bound of `0` means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumberInputFragment {
    #[serde(flatten)]
    pub metadata: FragmentMetadata,
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: f64,
}

impl NumberInputFragment {
    pub fn new(metadata: FragmentMetadata) -> Self {
        Self {
            metadata,
            ..Self::default()
        }
    }

    pub fn bounds(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn validate(&self, ctx: &Context, params: &Params) -> TagResult<()> {
        let key = require_key(&self.metadata, "number input")?;
        self.metadata.validate(ctx, params)?;

        let Some(value) = present(params, key) else {
            return Ok(());
        };
        let number = value
            .as_f64()
            .ok_or_else(|| TagError::invalid(format!("value for {key:?} must be a number")))?;

        if self.min != 0.0 && number < self.min {
            return Err(TagError::invalid(format!(
                "value for {key:?} must be at least {}",
                self.min
            )));
        }
        if self.max != 0.0 && number > self.max {
            return Err(TagError::invalid(format!(
                "value for {key:?} must be at most {}",
                self.max
            )));
        }
        Ok(())
    }
}

/// Date (or date-time) input with optional bounds.
///
/// Dates are `YYYY-MM-DD`; with `include_time` they are RFC 3339 timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatePickerFragment {
    #[serde(flatten)]
    pub metadata: FragmentMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<DateTime<Utc>>,
    #[serde(default)]
    pub include_time: bool,
}

impl DatePickerFragment {
    pub fn new(metadata: FragmentMetadata) -> Self {
        Self {
            metadata,
            ..Self::default()
        }
    }

    pub fn include_time(mut self, include_time: bool) -> Self {
        self.include_time = include_time;
        self
    }

    pub fn bounds(mut self, min: Option<DateTime<Utc>>, max: Option<DateTime<Utc>>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn validate(&self, ctx: &Context, params: &Params) -> TagResult<()> {
        let key = require_key(&self.metadata, "date picker")?;
        self.metadata.validate(ctx, params)?;

        let Some(value) = present(params, key) else {
            return Ok(());
        };
        let Value::String(text) = value else {
            return Err(TagError::invalid(format!(
                "value for {key:?} must be a date string"
            )));
        };

        let date = self
            .parse(text)
            .ok_or_else(|| TagError::invalid(format!("value for {key:?} must be a valid date")))?;

        if let Some(min) = self.min {
            if date < min {
                return Err(TagError::invalid(format!(
                    "value for {key:?} must not be before {}",
                    min.to_rfc3339()
                )));
            }
        }
        if let Some(max) = self.max {
            if date > max {
                return Err(TagError::invalid(format!(
                    "value for {key:?} must not be after {}",
                    max.to_rfc3339()
                )));
            }
        }
        Ok(())
    }

    fn parse(&self, text: &str) -> Option<DateTime<Utc>> {
        if self.include_time {
            return DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|d| d.with_timezone(&Utc));
        }
        let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
        Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::default())))
    }
}

/// One choice of a [`SelectFragment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: Value,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<Value>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Dropdown. With `multiple`, the value is an array or a comma-separated string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectFragment {
    #[serde(flatten)]
    pub metadata: FragmentMetadata,
    #[serde(default)]
    pub options: Vec<SelectOption>,
    #[serde(default)]
    pub multiple: bool,
}

impl SelectFragment {
    pub fn new(metadata: FragmentMetadata, options: Vec<SelectOption>) -> Self {
        Self {
            metadata,
            options,
            multiple: false,
        }
    }

    pub fn multiple(mut self, multiple: bool) -> Self {
        self.multiple = multiple;
        self
    }

    pub fn validate(&self, ctx: &Context, params: &Params) -> TagResult<()> {
        let key = require_key(&self.metadata, "select")?;
        if self.options.is_empty() {
            return Err(TagError::invalid("select fragment must have at least one option"));
        }
        self.metadata.validate(ctx, params)?;

        let Some(value) = present(params, key) else {
            return Ok(());
        };

        let items = if self.multiple {
            to_slice(value)
                .ok_or_else(|| TagError::invalid(format!("value for {key:?} must be an array")))?
        } else {
            vec![value.clone()]
        };

        for item in &items {
            if !self.options.iter().any(|o| values_equal(&o.value, item)) {
                return Err(TagError::invalid(format!(
                    "value for {key:?} contains an invalid option"
                )));
            }
        }
        Ok(())
    }
}

/// Decorative icon. Only the shared metadata rules apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IconFragment {
    #[serde(flatten)]
    pub metadata: FragmentMetadata,
}

/// Static text shown between inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    #[serde(flatten)]
    pub metadata: FragmentMetadata,
    #[serde(default)]
    pub text: String,
}

impl TextFragment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            metadata: FragmentMetadata::default(),
            text: text.into(),
        }
    }

    pub fn with_metadata(mut self, metadata: FragmentMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Value carried through the form without being shown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HiddenFragment {
    #[serde(flatten)]
    pub metadata: FragmentMetadata,
}

/// Any form fragment. Serialized with a `"type"` discriminant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Fragment {
    TextInput(TextInputFragment),
    NumberInput(NumberInputFragment),
    DatePicker(DatePickerFragment),
    Select(SelectFragment),
    Icon(IconFragment),
    Text(TextFragment),
    Hidden(HiddenFragment),
}

impl Fragment {
    /// Empty fragment of the given type.
    pub fn empty(fragment_type: FragmentType) -> Self {
        match fragment_type {
            FragmentType::TextInput => Fragment::TextInput(TextInputFragment::default()),
            FragmentType::NumberInput => Fragment::NumberInput(NumberInputFragment::default()),
            FragmentType::DatePicker => Fragment::DatePicker(DatePickerFragment::default()),
            FragmentType::Select => Fragment::Select(SelectFragment::default()),
            FragmentType::Icon => Fragment::Icon(IconFragment::default()),
            FragmentType::Text => Fragment::Text(TextFragment::default()),
            FragmentType::Hidden => Fragment::Hidden(HiddenFragment::default()),
        }
    }

    pub fn fragment_type(&self) -> FragmentType {
        match self {
            Fragment::TextInput(_) => FragmentType::TextInput,
            Fragment::NumberInput(_) => FragmentType::NumberInput,
            Fragment::DatePicker(_) => FragmentType::DatePicker,
            Fragment::Select(_) => FragmentType::Select,
            Fragment::Icon(_) => FragmentType::Icon,
            Fragment::Text(_) => FragmentType::Text,
            Fragment::Hidden(_) => FragmentType::Hidden,
        }
    }

    pub fn metadata(&self) -> &FragmentMetadata {
        match self {
            Fragment::TextInput(f) => &f.metadata,
            Fragment::NumberInput(f) => &f.metadata,
            Fragment::DatePicker(f) => &f.metadata,
            Fragment::Select(f) => &f.metadata,
            Fragment::Icon(f) => &f.metadata,
            Fragment::Text(f) => &f.metadata,
            Fragment::Hidden(f) => &f.metadata,
        }
    }

    /// Validate the parameters this fragment governs.
    ///
    /// Returns [`TagError::ShouldSkipValidate`] for a skipped fragment.
    pub fn validate(&self, ctx: &Context, params: &Params) -> TagResult<()> {
        match self {
            Fragment::TextInput(f) => f.validate(ctx, params),
            Fragment::NumberInput(f) => f.validate(ctx, params),
            Fragment::DatePicker(f) => f.validate(ctx, params),
            Fragment::Select(f) => f.validate(ctx, params),
            Fragment::Icon(f) => f.metadata.validate(ctx, params),
            Fragment::Text(f) => f.metadata.validate(ctx, params),
            Fragment::Hidden(f) => f.metadata.validate(ctx, params),
        }
    }

    /// Replace this fragment with `value` decoded as the same variant.
    pub(crate) fn decode_as_same(&self, value: Value) -> TagResult<Fragment> {
        Ok(match self {
            Fragment::TextInput(_) => Fragment::TextInput(serde_json::from_value(value)?),
            Fragment::NumberInput(_) => Fragment::NumberInput(serde_json::from_value(value)?),
            Fragment::DatePicker(_) => Fragment::DatePicker(serde_json::from_value(value)?),
            Fragment::Select(_) => Fragment::Select(serde_json::from_value(value)?),
            Fragment::Icon(_) => Fragment::Icon(serde_json::from_value(value)?),
            Fragment::Text(_) => Fragment::Text(serde_json::from_value(value)?),
            Fragment::Hidden(_) => Fragment::Hidden(serde_json::from_value(value)?),
        })
    }
}

macro_rules! impl_from_fragment {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Fragment {
                fn from(f: $ty) -> Self {
                    Fragment::$variant(f)
                }
            }
        )*
    };
}

impl_from_fragment! {
    TextInput => TextInputFragment,
    NumberInput => NumberInputFragment,
    DatePicker => DatePickerFragment,
    Select => SelectFragment,
    Icon => IconFragment,
    Text => TextFragment,
    Hidden => HiddenFragment,
}

fn require_key<'a>(metadata: &'a FragmentMetadata, kind: &str) -> TagResult<&'a str> {
    if metadata.key.is_empty() {
        return Err(TagError::invalid(format!(
            "{kind} fragment must have a non-empty key"
        )));
    }
    Ok(&metadata.key)
}

/// The submitted value, with `null` treated as absent.
fn present<'a>(params: &'a Params, key: &str) -> Option<&'a Value> {
    params.get(key).filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_text_input_requires_string() {
        let f = TextInputFragment::new(FragmentMetadata::new("name").required());
        let ctx = Context::background();
        assert!(f.validate(&ctx, &params(json!({"name": "john"}))).is_ok());
        let err = f.validate(&ctx, &params(json!({"name": 3}))).unwrap_err();
        assert_eq!(err.to_string(), "value for \"name\" must be a string");

        let keyless = TextInputFragment::default();
        assert!(keyless.validate(&ctx, &Params::new()).is_err());
    }

    #[test]
    fn test_number_bounds() {
        let f = NumberInputFragment::new(FragmentMetadata::new("n").required()).bounds(1.0, 1000.0);
        let ctx = Context::background();
        assert!(f.validate(&ctx, &params(json!({"n": 1}))).is_ok());
        assert!(f.validate(&ctx, &params(json!({"n": 1000.0}))).is_ok());
        let err = f.validate(&ctx, &params(json!({"n": 0.5}))).unwrap_err();
        assert_eq!(err.to_string(), "value for \"n\" must be at least 1");
        let err = f.validate(&ctx, &params(json!({"n": 1001}))).unwrap_err();
        assert_eq!(err.to_string(), "value for \"n\" must be at most 1000");
        let err = f.validate(&ctx, &params(json!({"n": "12"}))).unwrap_err();
        assert_eq!(err.to_string(), "value for \"n\" must be a number");

        // zero bounds are not enforced
        let open = NumberInputFragment::new(FragmentMetadata::new("n"));
        assert!(open.validate(&ctx, &params(json!({"n": -50}))).is_ok());
    }

    #[test]
    fn test_number_skipped_returns_sentinel() {
        let f = NumberInputFragment::new(
            FragmentMetadata::new("value")
                .required()
                .skip_if(params(json!({"operator": "BETWEEN"}))),
        );
        let err = f
            .validate(&Context::background(), &params(json!({"operator": "BETWEEN"})))
            .unwrap_err();
        assert!(err.is_skip());
    }

    #[test]
    fn test_date_picker() {
        let ctx = Context::background();
        let min = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let max = Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap();
        let f = DatePickerFragment::new(FragmentMetadata::new("d").required())
            .bounds(Some(min), Some(max));

        assert!(f.validate(&ctx, &params(json!({"d": "2023-06-01"}))).is_ok());
        assert!(f.validate(&ctx, &params(json!({"d": "2023-01-01"}))).is_ok());
        assert!(f.validate(&ctx, &params(json!({"d": "2022-12-31"}))).is_err());
        assert!(f.validate(&ctx, &params(json!({"d": "2024-01-01"}))).is_err());
        let err = f.validate(&ctx, &params(json!({"d": "06/01/2023"}))).unwrap_err();
        assert_eq!(err.to_string(), "value for \"d\" must be a valid date");
        let err = f.validate(&ctx, &params(json!({"d": 20230601}))).unwrap_err();
        assert_eq!(err.to_string(), "value for \"d\" must be a date string");

        let with_time = DatePickerFragment::new(FragmentMetadata::new("d")).include_time(true);
        assert!(with_time
            .validate(&ctx, &params(json!({"d": "2023-06-01T10:00:00Z"})))
            .is_ok());
        assert!(with_time.validate(&ctx, &params(json!({"d": "2023-06-01"}))).is_err());
    }

    #[test]
    fn test_select_single_and_multiple() {
        let ctx = Context::background();
        let options = vec![
            SelectOption::new("MALE", "Male"),
            SelectOption::new("FEMALE", "Female"),
        ];
        let single = SelectFragment::new(FragmentMetadata::new("g").required(), options.clone());
        assert!(single.validate(&ctx, &params(json!({"g": "MALE"}))).is_ok());
        let err = single.validate(&ctx, &params(json!({"g": "OTHER"}))).unwrap_err();
        assert_eq!(err.to_string(), "value for \"g\" contains an invalid option");

        let multi = SelectFragment::new(FragmentMetadata::new("g"), options).multiple(true);
        assert!(multi.validate(&ctx, &params(json!({"g": ["MALE", "FEMALE"]}))).is_ok());
        assert!(multi.validate(&ctx, &params(json!({"g": "MALE, FEMALE"}))).is_ok());
        assert!(multi.validate(&ctx, &params(json!({"g": ["MALE", "X"]}))).is_err());
        let err = multi.validate(&ctx, &params(json!({"g": 1}))).unwrap_err();
        assert_eq!(err.to_string(), "value for \"g\" must be an array");
    }

    #[test]
    fn test_select_requires_options() {
        let f = SelectFragment::new(FragmentMetadata::new("g"), vec![]);
        let err = f.validate(&Context::background(), &Params::new()).unwrap_err();
        assert_eq!(err.to_string(), "select fragment must have at least one option");
    }

    #[test]
    fn test_fragment_serializes_with_type() {
        let f: Fragment = NumberInputFragment::new(FragmentMetadata::new("min").required())
            .bounds(0.0, 100.0)
            .into();
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["type"], "NUMBER_INPUT");
        assert_eq!(json["key"], "min");
        assert_eq!(json["required"], true);
        assert_eq!(json["max"], 100.0);

        let back: Fragment = serde_json::from_value(json).unwrap();
        assert_eq!(back, f);
    }
}
