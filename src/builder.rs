//! Builder contracts and the descriptive types the registry catalogs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::error::TagResult;
use crate::value::Params;
use crate::view::View;

/// UI grouping for builders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Descriptive information about a builder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "categoryID", default)]
    pub category_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
}

impl Metadata {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = category_id.into();
        self
    }

    pub fn view(mut self, view: View) -> Self {
        self.view = Some(view);
        self
    }
}

/// A category together with the metadata of every builder filed under it.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryWithBuilders {
    #[serde(flatten)]
    pub category: Category,
    pub builders: Vec<Arc<Metadata>>,
}

/// A compiled query and its positional arguments.
///
/// `args[i]` binds the i-th placeholder of `query`, left to right.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sql {
    pub query: String,
    pub args: Vec<Value>,
}

impl Sql {
    pub fn new(query: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            query: query.into(),
            args,
        }
    }
}

/// Anything that can describe itself to the registry.
pub trait Builder: Send + Sync {
    fn metadata(&self, ctx: &Context) -> Arc<Metadata>;
}

/// A builder that can compile its parameters into SQL.
pub trait SqlBuilder: Builder {
    fn build_sql(&self, ctx: &Context, params: &Params) -> TagResult<Sql>;
}

/// A registered builder, with its SQL capability made explicit.
#[derive(Clone)]
pub enum BuilderKind {
    /// Metadata only; cannot appear as a compiled tag.
    Descriptive(Arc<dyn Builder>),
    /// Compiles to SQL.
    Sql(Arc<dyn SqlBuilder>),
}

impl BuilderKind {
    pub fn descriptive(builder: impl Builder + 'static) -> Self {
        Self::Descriptive(Arc::new(builder))
    }

    pub fn sql(builder: impl SqlBuilder + 'static) -> Self {
        Self::Sql(Arc::new(builder))
    }

    pub fn metadata(&self, ctx: &Context) -> Arc<Metadata> {
        match self {
            Self::Descriptive(b) => b.metadata(ctx),
            Self::Sql(b) => b.metadata(ctx),
        }
    }

    pub fn as_sql_builder(&self) -> Option<&Arc<dyn SqlBuilder>> {
        match self {
            Self::Sql(b) => Some(b),
            Self::Descriptive(_) => None,
        }
    }
}

impl std::fmt::Debug for BuilderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Descriptive(_) => "Descriptive",
            Self::Sql(_) => "Sql",
        };
        let metadata = self.metadata(&Context::background());
        f.debug_tuple(kind).field(&metadata.id).finish()
    }
}

impl From<Arc<dyn SqlBuilder>> for BuilderKind {
    fn from(builder: Arc<dyn SqlBuilder>) -> Self {
        Self::Sql(builder)
    }
}

impl From<Arc<dyn Builder>> for BuilderKind {
    fn from(builder: Arc<dyn Builder>) -> Self {
        Self::Descriptive(builder)
    }
}

/// Fixed metadata, no SQL. Useful for catalog-only entries.
impl Builder for Metadata {
    fn metadata(&self, _ctx: &Context) -> Arc<Metadata> {
        Arc::new(self.clone())
    }
}
