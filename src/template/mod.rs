//! Template-based SQL builders.
//!
//! An [`SqlTemplate`] renders its SQL from a text template against the tag's
//! parameters. User values never reach the query text: the `arg` and `argEach`
//! template functions emit placeholders and bind the values as query
//! arguments, in the order they are rendered.
//!
//! ```text
//! SELECT user_id FROM users WHERE
//! {{- if eq .operator "IN" }} gender IN ({{ argEach .values }})
//! {{- else }} gender = {{ arg .value }}
//! {{- end }}
//! ```

pub mod ast;
mod exec;
pub mod funcs;
mod parser;

use std::sync::{Arc, OnceLock};

use serde_json::Value;

pub use exec::RenderContext;

use crate::builder::{Builder, BuilderKind, Metadata, Sql, SqlBuilder};
use crate::context::Context;
use crate::error::{TagResult, TemplateError};
use crate::value::Params;

/// Formats the placeholder for the argument at a zero-based index.
pub type ArgPlaceholder = Arc<dyn Fn(usize) -> String + Send + Sync>;

/// `?` for every argument.
pub fn question_placeholder() -> ArgPlaceholder {
    Arc::new(|_: usize| "?".to_string())
}

/// `$1`, `$2`, ...
pub fn dollar_placeholder() -> ArgPlaceholder {
    Arc::new(|i: usize| format!("${}", i + 1))
}

/// A parsed template, immutable and shareable across calls.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<ast::Node>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            nodes: parser::parse(source)?,
        })
    }

    pub fn nodes(&self) -> &[ast::Node] {
        &self.nodes
    }

    /// Render against `data`, binding arguments into `render`.
    pub fn execute(
        &self,
        data: &Value,
        render: &mut RenderContext<'_>,
    ) -> Result<String, TemplateError> {
        exec::execute(&self.nodes, data, render)
    }
}

/// The standard [`SqlBuilder`]: validate parameters with the metadata's view,
/// then render an SQL template.
///
/// The template is parsed on first use, at most once. A parse failure is kept
/// and returned by every later call.
pub struct SqlTemplate {
    metadata: Arc<Metadata>,
    source: String,
    parsed: OnceLock<Result<Arc<Template>, TemplateError>>,
    placeholder: ArgPlaceholder,
}

impl SqlTemplate {
    pub fn new(metadata: Metadata, source: impl Into<String>) -> Self {
        Self {
            metadata: Arc::new(metadata),
            source: source.into(),
            parsed: OnceLock::new(),
            placeholder: question_placeholder(),
        }
    }

    /// Set the placeholder style. The formatter gets only the argument index.
    pub fn with_arg_placeholder<F>(mut self, formatter: F) -> Self
    where
        F: Fn(usize) -> String + Send + Sync + 'static,
    {
        self.placeholder = Arc::new(formatter);
        self
    }

    pub fn with_placeholder(mut self, placeholder: ArgPlaceholder) -> Self {
        self.placeholder = placeholder;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parsed template, parsing it on first call.
    pub fn template(&self) -> Result<Arc<Template>, TemplateError> {
        self.parsed
            .get_or_init(|| {
                tracing::debug!("parsing SQL template for {}", self.metadata.id);
                Template::parse(&self.source).map(Arc::new)
            })
            .clone()
    }

    /// Render without validating parameters.
    pub fn render(&self, params: &Params) -> TagResult<Sql> {
        self.render_at(params, 0)
    }

    /// Render with placeholder numbering starting at `offset`.
    pub fn render_at(&self, params: &Params, offset: usize) -> TagResult<Sql> {
        let template = self.template()?;
        let mut render = RenderContext::with_offset(&self.placeholder, offset);
        let data = Value::Object(params.clone());
        let query = template.execute(&data, &mut render)?;
        Ok(Sql {
            query,
            args: render.into_args(),
        })
    }
}

impl std::fmt::Debug for SqlTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlTemplate")
            .field("id", &self.metadata.id)
            .field("source", &self.source)
            .finish()
    }
}

impl Builder for SqlTemplate {
    fn metadata(&self, _ctx: &Context) -> Arc<Metadata> {
        Arc::clone(&self.metadata)
    }
}

impl SqlBuilder for SqlTemplate {
    fn build_sql(&self, ctx: &Context, params: &Params) -> TagResult<Sql> {
        if let Some(view) = &self.metadata.view {
            view.validate(ctx, params)?;
        }
        self.render_at(params, ctx.arg_offset())
    }
}

impl From<SqlTemplate> for BuilderKind {
    fn from(template: SqlTemplate) -> Self {
        BuilderKind::Sql(Arc::new(template))
    }
}

/// Collapse every whitespace run to one space and trim the ends.
pub fn compact_sql_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}
