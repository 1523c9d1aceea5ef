//! Stock tag builders over a `users` / `events` schema (BigQuery SQL).
//!
//! Each function returns a ready-to-register builder whose form and template
//! agree on parameter names: `operator`, `value`, `values`, `min`, `max`, ...

use std::sync::Arc;

use serde_json::Value;

use crate::builder::Metadata;
use crate::context::Context;
use crate::fragment::{
    DatePickerFragment, Fragment, FragmentMetadata, NumberInputFragment, SelectFragment,
    SelectOption, TextFragment, TextInputFragment,
};
use crate::hook::{BuildSqlFn, MetadataFn, SqlBuilderWrapper, hook};
use crate::template::{ArgPlaceholder, SqlTemplate, question_placeholder};
use crate::template::funcs::quote_str;
use crate::value::{Params, to_slice};
use crate::view::View;

macro_rules! operator_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $value:literal),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),*];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value),*
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

operator_enum!(
    /// Operators of [`string_tag_builder`].
    StringOperator {
        Eq => "EQ",
        Ne => "NE",
        Contains => "CONTAINS",
        StartsWith => "STARTS_WITH",
        EndsWith => "ENDS_WITH",
        In => "IN",
        NotIn => "NOT_IN",
    }
);

operator_enum!(
    /// Operators of [`number_tag_builder`] and the event count.
    NumberOperator {
        Eq => "EQ",
        Ne => "NE",
        Lt => "LT",
        Lte => "LTE",
        Gt => "GT",
        Gte => "GTE",
        Between => "BETWEEN",
    }
);

operator_enum!(
    /// What an event count measures.
    Accumulation {
        Count => "COUNT",
        Days => "DAYS",
    }
);

operator_enum!(
    /// Look-back window of an event tag.
    TimeRange {
        Days7 => "7D",
        Days10 => "10D",
        Days30 => "30D",
        Days90 => "90D",
    }
);

/// Identity and target column of a field-based tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldTag {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category_id: String,
    /// Column of `users` the tag filters on. Written verbatim into the SQL.
    pub field_key: String,
}

impl FieldTag {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category_id: impl Into<String>,
        field_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category_id: category_id.into(),
            field_key: field_key.into(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn metadata(&self) -> Metadata {
        Metadata::new(&self.id, &self.name)
            .description(&self.description)
            .category(&self.category_id)
    }
}

fn option(value: &str, label: &str) -> SelectOption {
    SelectOption::new(value, label)
}

/// `{"key": value}` as a skip condition.
fn when(key: &str, value: impl std::fmt::Display) -> Params {
    let mut condition = Params::new();
    condition.insert(key.to_string(), Value::String(value.to_string()));
    condition
}

/// Comparison of a numeric column: `EQ`..`GTE` take `value`, `BETWEEN` takes
/// `min` and `max`.
pub fn number_tag_builder(tag: &FieldTag, min: f64, max: f64) -> SqlTemplate {
    let between = || when("operator", NumberOperator::Between);
    let fragments: Vec<Fragment> = vec![
        SelectFragment::new(
            FragmentMetadata::new("operator").required(),
            vec![
                option("EQ", "Equals"),
                option("NE", "Not Equals"),
                option("LT", "Less Than"),
                option("LTE", "Less Than or Equals"),
                option("GT", "Greater Than"),
                option("GTE", "Greater Than or Equals"),
                option("BETWEEN", "Between"),
            ],
        )
        .into(),
        NumberInputFragment::new(FragmentMetadata::new("value").required().skip_if(between()))
            .bounds(min, max)
            .into(),
        NumberInputFragment::new(FragmentMetadata::new("min").required().skip_unless(between()))
            .bounds(min, max)
            .into(),
        TextFragment::new("and")
            .with_metadata(FragmentMetadata::default().skip_unless(between()))
            .into(),
        NumberInputFragment::new(FragmentMetadata::new("max").required().skip_unless(between()))
            .bounds(min, max)
            .into(),
    ];

    let sql = format!(
        r#"SELECT user_id FROM users WHERE {field}
{{{{- if eq .operator "EQ" }}}} = {{{{ arg .value }}}}
{{{{- else if eq .operator "NE" }}}} != {{{{ arg .value }}}}
{{{{- else if eq .operator "LT" }}}} < {{{{ arg .value }}}}
{{{{- else if eq .operator "LTE" }}}} <= {{{{ arg .value }}}}
{{{{- else if eq .operator "GT" }}}} > {{{{ arg .value }}}}
{{{{- else if eq .operator "GTE" }}}} >= {{{{ arg .value }}}}
{{{{- else if eq .operator "BETWEEN" }}}} BETWEEN {{{{ arg .min }}}} AND {{{{ arg .max }}}}
{{{{- else }}}} = {{{{ arg .value }}}}
{{{{- end }}}}"#,
        field = tag.field_key
    );

    SqlTemplate::new(tag.metadata().view(View::new(fragments)), sql)
}

/// Match on a string column.
///
/// Without `options` the operands are free text and `IN`/`NOT_IN` take a
/// comma-separated list. With `options` the operands are picked from them and
/// only `EQ`, `NE`, `IN` and `NOT_IN` are offered.
pub fn string_tag_builder(tag: &FieldTag, options: Vec<SelectOption>) -> SqlBuilderWrapper {
    string_tag_builder_with_placeholder(tag, options, question_placeholder())
}

/// [`string_tag_builder`] rendering its arguments with `placeholder`.
pub fn string_tag_builder_with_placeholder(
    tag: &FieldTag,
    options: Vec<SelectOption>,
    placeholder: ArgPlaceholder,
) -> SqlBuilderWrapper {
    let in_list = || {
        let operators = [StringOperator::In.as_str(), StringOperator::NotIn.as_str()];
        let mut condition = Params::new();
        condition.insert("$operator".to_string(), serde_json::json!({ "IN": operators }));
        condition
    };
    let value_md = FragmentMetadata::new("value").required().skip_if(in_list());
    let values_md = FragmentMetadata::new("values").required().skip_unless(in_list());
    let operator_md = FragmentMetadata::new("operator")
        .required()
        .default_value(StringOperator::Eq.as_str());

    let fragments: Vec<Fragment> = if options.is_empty() {
        vec![
            SelectFragment::new(
                operator_md,
                vec![
                    option("EQ", "equals"),
                    option("NE", "not equals"),
                    option("CONTAINS", "contains"),
                    option("STARTS_WITH", "starts with"),
                    option("ENDS_WITH", "ends with"),
                    option("IN", "in"),
                    option("NOT_IN", "not in"),
                ],
            )
            .into(),
            TextInputFragment::new(value_md).into(),
            TextInputFragment::new(values_md).into(),
        ]
    } else {
        vec![
            SelectFragment::new(
                operator_md,
                vec![
                    option("EQ", "equals"),
                    option("NE", "not equals"),
                    option("IN", "in"),
                    option("NOT_IN", "not in"),
                ],
            )
            .into(),
            SelectFragment::new(value_md, options.clone()).into(),
            SelectFragment::new(values_md, options).multiple(true).into(),
        ]
    };

    let sql = format!(
        r#"SELECT user_id FROM users WHERE
{{{{- if eq .operator "EQ" }}}} {field} = {{{{ arg .value }}}}
{{{{- else if eq .operator "NE" }}}} {field} != {{{{ arg .value }}}}
{{{{- else if eq .operator "CONTAINS" }}}} {field} LIKE CONCAT('%', {{{{ arg .value }}}}, '%')
{{{{- else if eq .operator "STARTS_WITH" }}}} {field} LIKE CONCAT({{{{ arg .value }}}}, '%')
{{{{- else if eq .operator "ENDS_WITH" }}}} {field} LIKE CONCAT('%', {{{{ arg .value }}}})
{{{{- else if eq .operator "IN" }}}} {field} IN ({{{{ argEach .values }}}})
{{{{- else if eq .operator "NOT_IN" }}}} {field} NOT IN ({{{{ argEach .values }}}})
{{{{- else }}}} {field} = {{{{ arg .value }}}}
{{{{- end }}}}"#,
        field = tag.field_key
    );

    // The form is checked against the raw submission, where `values` may be
    // a comma-separated string; the template then sees a real list.
    let view = View::new(fragments);
    let described = Arc::new(tag.metadata().view(view.clone()));
    let template = SqlTemplate::new(tag.metadata(), sql).with_placeholder(placeholder);

    let validate_and_split = hook(move |next: BuildSqlFn| -> BuildSqlFn {
        let view = view.clone();
        Arc::new(move |ctx: &Context, params: &Params| {
            view.validate(ctx, params)?;
            let mut params = params.clone();
            if let Some(list) = params.get("values").filter(|v| v.is_string()).and_then(to_slice) {
                params.insert("values".to_string(), Value::Array(list));
            }
            next(ctx, &params)
        })
    });
    let with_view = hook(move |_next: MetadataFn| -> MetadataFn {
        let described = Arc::clone(&described);
        Arc::new(move |_ctx: &Context| Arc::clone(&described))
    });

    SqlBuilderWrapper::new(Arc::new(template))
        .with_build_sql_hooks([validate_and_split])
        .with_metadata_hooks([with_view])
}

/// `start <= column <= end` over a date or timestamp column.
pub fn date_range_tag_builder(tag: &FieldTag, include_time: bool) -> SqlTemplate {
    let fragments: Vec<Fragment> = vec![
        TextFragment::new("Between").into(),
        DatePickerFragment::new(FragmentMetadata::new("start").required())
            .include_time(include_time)
            .into(),
        TextFragment::new("and").into(),
        DatePickerFragment::new(FragmentMetadata::new("end").required())
            .include_time(include_time)
            .into(),
    ];
    let sql = format!(
        "SELECT user_id FROM users WHERE {} BETWEEN {{{{ arg .start }}}} AND {{{{ arg .end }}}}",
        tag.field_key
    );
    SqlTemplate::new(tag.metadata().view(View::new(fragments)), sql)
}

/// Users with a number of `event_name` events (or distinct event days)
/// inside a recent window.
///
/// The builder ID is `event_<event_name in lowercase>`; the category defaults
/// to `activities`.
pub fn event_tag_builder(
    event_name: &str,
    display_label: &str,
    category_id: Option<&str>,
) -> SqlTemplate {
    let between = || when("countOperator", NumberOperator::Between);
    let fragments: Vec<Fragment> = vec![
        TextFragment::new("with").into(),
        SelectFragment::new(
            FragmentMetadata::new("accumulation")
                .required()
                .default_value(Accumulation::Count.as_str()),
            vec![
                option("COUNT", "total occurrences"),
                option("DAYS", "unique days"),
            ],
        )
        .into(),
        SelectFragment::new(
            FragmentMetadata::new("countOperator")
                .required()
                .default_value(NumberOperator::Gte.as_str()),
            vec![
                option("EQ", "exactly"),
                option("NE", "not exactly"),
                option("LT", "less than"),
                option("LTE", "at most"),
                option("GT", "more than"),
                option("GTE", "at least"),
                option("BETWEEN", "between"),
            ],
        )
        .into(),
        NumberInputFragment::new(
            FragmentMetadata::new("countValue")
                .required()
                .default_value(1.0)
                .skip_if(between()),
        )
        .bounds(1.0, 1000.0)
        .into(),
        NumberInputFragment::new(
            FragmentMetadata::new("countMin")
                .required()
                .skip_unless(between()),
        )
        .bounds(1.0, 1000.0)
        .into(),
        TextFragment::new("and")
            .with_metadata(FragmentMetadata::default().skip_unless(between()))
            .into(),
        NumberInputFragment::new(
            FragmentMetadata::new("countMax")
                .required()
                .skip_unless(between()),
        )
        .bounds(1.0, 1000.0)
        .into(),
        TextFragment::new("times in").into(),
        SelectFragment::new(
            FragmentMetadata::new("timeRange")
                .required()
                .default_value(TimeRange::Days30.as_str()),
            vec![
                option("7D", "last 7 days"),
                option("10D", "last 10 days"),
                option("30D", "last 30 days"),
                option("90D", "last 90 days"),
            ],
        )
        .into(),
    ];

    let metadata = Metadata::new(
        format!("event_{}", event_name.to_lowercase()),
        format!("{display_label} Events"),
    )
    .description(format!(
        "Filter users by {} events in a time period",
        display_label.to_lowercase()
    ))
    .category(category_id.filter(|c| !c.is_empty()).unwrap_or("activities"))
    .view(View::new(fragments));

    let sql = format!(
        r#"SELECT user_id FROM events
WHERE event_name = {event}
AND created_at >=
{{{{- if eq .timeRange "7D" }}}} TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL 7 DAY)
{{{{- else if eq .timeRange "10D" }}}} TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL 10 DAY)
{{{{- else if eq .timeRange "30D" }}}} TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL 30 DAY)
{{{{- else if eq .timeRange "90D" }}}} TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL 90 DAY)
{{{{- else }}}} TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL 7 DAY)
{{{{- end }}}}
GROUP BY user_id
{{{{- if eq .accumulation "COUNT" }}}}
HAVING COUNT(1)
{{{{- else if eq .accumulation "DAYS" }}}}
HAVING COUNT(DISTINCT DATE(created_at))
{{{{- end }}}}
{{{{- if eq .countOperator "EQ" }}}} = {{{{ arg .countValue }}}}
{{{{- else if eq .countOperator "NE" }}}} != {{{{ arg .countValue }}}}
{{{{- else if eq .countOperator "LT" }}}} < {{{{ arg .countValue }}}}
{{{{- else if eq .countOperator "LTE" }}}} <= {{{{ arg .countValue }}}}
{{{{- else if eq .countOperator "GT" }}}} > {{{{ arg .countValue }}}}
{{{{- else if eq .countOperator "GTE" }}}} >= {{{{ arg .countValue }}}}
{{{{- else if eq .countOperator "BETWEEN" }}}} BETWEEN {{{{ arg .countMin }}}}
{{{{- " AND " }}}}{{{{ arg .countMax }}}}
{{{{- else }}}} = {{{{ arg .countValue }}}}
{{{{- end }}}}"#,
        event = quote_str(event_name, '\'')
    );

    SqlTemplate::new(metadata, sql)
}
