//! # tagql — composable segmentation tags to SQL
//!
//! Tags are small, parameterized filters ("gender is MALE", "purchased at
//! least once in the last 7 days"). Each tag is produced by a registered
//! builder that owns a form (a [`View`] of fragments) and an SQL template.
//! Tags combine into an [`Expression`] tree with intersect, union and except,
//! and a [`BaseSqlProcessor`] compiles the whole tree into a single query with
//! bound arguments.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use tagql::prelude::*;
//!
//! let registry = Registry::standard();
//! Catalog::demo()?.install(&registry, PlaceholderStyle::Question)?;
//!
//! let expr = Expression::from_json(r#"{"intersect": [
//!     {"tag": {"builderID": "user_gender", "params": {"operator": "EQ", "value": "MALE"}}},
//!     {"tag": {"builderID": "event_purchase", "params": {
//!         "accumulation": "COUNT", "countOperator": "GTE", "countValue": 1, "timeRange": "7D"}}}
//! ]}"#)?;
//!
//! let processor = BaseSqlProcessor::new(Arc::new(registry), Dialect::BigQuery.sql_dialect());
//! let sql = processor.process(&Context::background(), &expr)?;
//! // => (SELECT user_id FROM users WHERE gender = ?) INTERSECT DISTINCT (SELECT user_id ...)
//! ```
//!
//! ## Pieces
//!
//! | Module | Role |
//! |--------------|------------------------------------------------|
//! | `fragment` | one form field and its validation rules |
//! | `view` | ordered fragments of a builder's form |
//! | `registry` | categories, builders, fragment factories |
//! | `template` | text templates rendering SQL with bound args |
//! | `hook` | middleware around a builder's methods |
//! | `expression` | the tag tree |
//! | `processor` | tree to one SQL query |

pub mod builder;
pub mod builders;
pub mod catalog;
pub mod config;
pub mod context;
pub mod dialect;
pub mod error;
pub mod expression;
pub mod fragment;
pub mod hook;
pub mod processor;
pub mod registry;
pub mod template;
pub mod value;
pub mod view;

pub use builder::{Builder, BuilderKind, Category, Metadata, Sql, SqlBuilder};
pub use context::Context;
pub use error::{TagError, TagResult, TemplateError};
pub use expression::{Expression, SetOperation, Tag};
pub use processor::{BaseSqlProcessor, SqlProcessor};
pub use registry::Registry;
pub use view::View;

pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::builder::*;
    pub use crate::catalog::Catalog;
    pub use crate::config::{PlaceholderStyle, TagqlConfig};
    pub use crate::context::Context;
    pub use crate::dialect::{BigQueryDialect, Dialect, SqlDialect, StandardDialect};
    pub use crate::error::*;
    pub use crate::expression::{Expression, ExpressionKind, SetOperation, Tag};
    pub use crate::fragment::*;
    pub use crate::hook::{Hook, SqlBuilderWrapper, chain_hook, wrap_sql_builder};
    pub use crate::processor::{BaseSqlProcessor, SqlProcessor};
    pub use crate::registry::Registry;
    pub use crate::template::{SqlTemplate, compact_sql_query};
    pub use crate::value::Params;
    pub use crate::view::View;
}

/// Parse and validate an expression from its JSON wire format.
///
/// # Example
///
/// ```
/// let expr = tagql::parse_expression(r#"{"tag": {"builderID": "user_age"}}"#).unwrap();
/// assert_eq!(expr.tag.unwrap().builder_id, "user_age");
/// ```
pub fn parse_expression(json: &str) -> TagResult<Expression> {
    let expr = Expression::from_json(json)?;
    expr.validate()?;
    Ok(expr)
}
