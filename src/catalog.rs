//! Declarative catalogs: categories and builders described in TOML.
//!
//! ```toml
//! [[categories]]
//! id = "demographics"
//! name = "Demographics"
//!
//! [[builders]]
//! kind = "string"
//! id = "user_gender"
//! name = "Gender"
//! category = "demographics"
//! field = "gender"
//! options = [{ value = "MALE", label = "Male" }, { value = "FEMALE", label = "Female" }]
//!
//! [[builders]]
//! kind = "template"
//! id = "vip"
//! name = "VIP"
//! sql = "SELECT user_id FROM vips WHERE tier = {{ arg .tier }}"
//! fragments = [{ type = "TEXT_INPUT", key = "tier", required = true }]
//! ```

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::builder::{BuilderKind, Category, Metadata};
use crate::builders::{
    FieldTag, date_range_tag_builder, event_tag_builder, number_tag_builder,
    string_tag_builder_with_placeholder,
};
use crate::config::PlaceholderStyle;
use crate::error::TagResult;
use crate::fragment::SelectOption;
use crate::registry::Registry;
use crate::template::SqlTemplate;
use crate::view::{View, decode_fragment};

/// Catalog shipped with the CLI, used when no catalog file is configured.
pub const DEMO_CATALOG: &str = r#"
[[categories]]
id = "demographics"
name = "Demographics"
description = "Who the user is"

[[categories]]
id = "activities"
name = "Activities"
description = "What the user did"

[[builders]]
kind = "string"
id = "user_gender"
name = "Gender"
description = "Filter users by gender"
category = "demographics"
field = "gender"
options = [
  { value = "MALE", label = "Male" },
  { value = "FEMALE", label = "Female" },
]

[[builders]]
kind = "string"
id = "user_country"
name = "Country"
category = "demographics"
field = "country"

[[builders]]
kind = "number"
id = "user_age"
name = "Age"
description = "Filter users by age"
category = "demographics"
field = "age"
min = 0
max = 150

[[builders]]
kind = "date_range"
id = "user_signup"
name = "Signup Date"
category = "demographics"
field = "created_at"

[[builders]]
kind = "event"
event = "PURCHASE"
label = "Purchase"

[[builders]]
kind = "event"
event = "LOGIN"
label = "Login"
"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    #[serde(default)]
    pub categories: Vec<CategorySpec>,
    #[serde(default)]
    pub builders: Vec<BuilderSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategorySpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Identity shared by the field-based builder kinds.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub field: String,
}

impl FieldSpec {
    fn to_field_tag(&self) -> FieldTag {
        FieldTag::new(&self.id, &self.name, &self.category, &self.field)
            .description(&self.description)
    }
}

/// One `[[builders]]` entry, tagged by `kind`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuilderSpec {
    String {
        #[serde(flatten)]
        field: FieldSpec,
        #[serde(default)]
        options: Vec<SelectOption>,
    },
    Number {
        #[serde(flatten)]
        field: FieldSpec,
        #[serde(default)]
        min: f64,
        #[serde(default)]
        max: f64,
    },
    DateRange {
        #[serde(flatten)]
        field: FieldSpec,
        #[serde(default)]
        include_time: bool,
    },
    Event {
        event: String,
        label: String,
        #[serde(default)]
        category: Option<String>,
    },
    Template {
        id: String,
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        category: String,
        sql: String,
        /// Raw fragment tables, resolved through the registry's factories.
        #[serde(default)]
        fragments: Vec<Value>,
        #[serde(default)]
        placeholder: Option<PlaceholderStyle>,
    },
}

impl BuilderSpec {
    fn build(&self, registry: &Registry, placeholder: PlaceholderStyle) -> TagResult<BuilderKind> {
        let args = placeholder.to_placeholder();
        Ok(match self {
            BuilderSpec::String { field, options } => {
                string_tag_builder_with_placeholder(&field.to_field_tag(), options.clone(), args)
                    .into()
            }
            BuilderSpec::Number { field, min, max } => {
                number_tag_builder(&field.to_field_tag(), *min, *max)
                    .with_placeholder(args)
                    .into()
            }
            BuilderSpec::DateRange {
                field,
                include_time,
            } => date_range_tag_builder(&field.to_field_tag(), *include_time)
                .with_placeholder(args)
                .into(),
            BuilderSpec::Event {
                event,
                label,
                category,
            } => event_tag_builder(event, label, category.as_deref())
                .with_placeholder(args)
                .into(),
            BuilderSpec::Template {
                id,
                name,
                description,
                category,
                sql,
                fragments,
                placeholder: own,
            } => {
                let fragments = fragments
                    .iter()
                    .map(|f| decode_fragment(registry, f.clone()))
                    .collect::<TagResult<Vec<_>>>()?;
                let mut metadata = Metadata::new(id, name)
                    .description(description)
                    .category(category);
                if !fragments.is_empty() {
                    metadata = metadata.view(View::new(fragments));
                }
                let style = own.unwrap_or(placeholder);
                SqlTemplate::new(metadata, sql)
                    .with_placeholder(style.to_placeholder())
                    .into()
            }
        })
    }
}

impl Catalog {
    pub fn from_toml(content: &str) -> TagResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> TagResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_toml(&content)?;
        tracing::debug!(
            "loaded catalog {} ({} categories, {} builders)",
            path.display(),
            catalog.categories.len(),
            catalog.builders.len()
        );
        Ok(catalog)
    }

    pub fn demo() -> TagResult<Self> {
        Self::from_toml(DEMO_CATALOG)
    }

    /// Register every category, then every builder.
    ///
    /// Template fragments are decoded with the registry's fragment factories,
    /// so they must be registered first. Stops at the first failure.
    pub fn install(&self, registry: &Registry, placeholder: PlaceholderStyle) -> TagResult<()> {
        for spec in &self.categories {
            registry.register_category(
                Category::new(&spec.id, &spec.name).description(&spec.description),
            )?;
        }
        for spec in &self.builders {
            registry.register_builder(spec.build(registry, placeholder)?)?;
        }
        Ok(())
    }
}
