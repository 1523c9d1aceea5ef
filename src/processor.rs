//! Compile an expression tree into one SQL query.

use std::sync::Arc;

use crate::builder::Sql;
use crate::context::Context;
use crate::dialect::SqlDialect;
use crate::error::{TagError, TagResult};
use crate::expression::{Expression, ExpressionKind, SetOperation, Tag};
use crate::registry::Registry;

pub trait SqlProcessor: Send + Sync {
    fn process(&self, ctx: &Context, expr: &Expression) -> TagResult<Sql>;
}

/// Resolves tags through a registry and joins them with a dialect.
///
/// Arguments are concatenated in left-to-right tree order, matching the order
/// of placeholders in the final query. Each tag is built with the count of
/// arguments bound before it as its context offset, so indexed placeholder
/// styles number across the whole tree.
pub struct BaseSqlProcessor {
    registry: Arc<Registry>,
    dialect: Box<dyn SqlDialect>,
}

impl BaseSqlProcessor {
    pub fn new(registry: Arc<Registry>, dialect: Box<dyn SqlDialect>) -> Self {
        Self { registry, dialect }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn process_node(&self, ctx: &Context, expr: &Expression, offset: usize) -> TagResult<Sql> {
        match expr.kind()? {
            ExpressionKind::Tag(tag) => self.process_tag(&ctx.with_arg_offset(offset), tag),
            ExpressionKind::Set(op, children) => self.process_set(ctx, op, children, offset),
        }
    }

    fn process_set(
        &self,
        ctx: &Context,
        op: SetOperation,
        children: &[Expression],
        offset: usize,
    ) -> TagResult<Sql> {
        let mut queries = Vec::with_capacity(children.len());
        let mut args = Vec::new();

        for child in children {
            let sql = self.process_node(ctx, child, offset + args.len())?;
            queries.push(self.dialect.parentheses(&sql.query));
            args.extend(sql.args);
        }

        let query = match op {
            SetOperation::Intersect => self.dialect.intersect(&queries),
            SetOperation::Union => self.dialect.union(&queries),
            SetOperation::Except => self.dialect.except(&queries),
        };
        tracing::trace!("{} of {} subqueries", op, queries.len());

        Ok(Sql { query, args })
    }

    fn process_tag(&self, ctx: &Context, tag: &Tag) -> TagResult<Sql> {
        let builder = self
            .registry
            .get_builder(&tag.builder_id)
            .ok_or_else(|| TagError::BuilderNotFound(tag.builder_id.clone()))?;

        let sql_builder = builder
            .as_sql_builder()
            .ok_or_else(|| TagError::UnsupportedBuilder(tag.builder_id.clone()))?;

        let sql = sql_builder
            .build_sql(ctx, &tag.params)
            .map_err(|e| TagError::Build {
                builder_id: tag.builder_id.clone(),
                source: Box::new(e),
            })?;

        tracing::debug!(
            "built tag {} with {} args",
            tag.builder_id,
            sql.args.len()
        );
        Ok(sql)
    }
}

impl SqlProcessor for BaseSqlProcessor {
    fn process(&self, ctx: &Context, expr: &Expression) -> TagResult<Sql> {
        let _span = ctx.span().entered();
        expr.validate()?;
        let sql = self.process_node(ctx, expr, ctx.arg_offset())?;
        tracing::debug!("compiled expression into {} args", sql.args.len());
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuilderKind, Category, Metadata};
    use crate::dialect::BigQueryDialect;
    use crate::template::{SqlTemplate, compact_sql_query, dollar_placeholder};
    use crate::value::Params;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn registry() -> Arc<Registry> {
        let registry = Registry::new();
        registry.must_register_category(Category::new("test", "Test"));
        registry.must_register_builder(SqlTemplate::new(
            Metadata::new("test_condition", "Test Condition").category("test"),
            "SELECT id FROM users WHERE column = '{{ .value }}'",
        ));
        registry.must_register_builder(SqlTemplate::new(
            Metadata::new("bound", "Bound").category("test"),
            "SELECT id FROM users WHERE column = {{ arg .value }}",
        ));
        registry.must_register_builder(BuilderKind::descriptive(
            Metadata::new("note", "Note").category("test"),
        ));
        Arc::new(registry)
    }

    fn tag(id: &str, value: &str) -> Expression {
        let mut params = Params::new();
        params.insert("value".to_string(), Value::from(value));
        Expression::tag(id, params)
    }

    #[test]
    fn test_nested_set_operations() {
        let expr = Expression::intersect(vec![
            tag("test_condition", "A"),
            Expression::union(vec![
                tag("test_condition", "B"),
                Expression::except(vec![tag("test_condition", "C"), tag("test_condition", "D")]),
            ]),
        ]);

        let processor = BaseSqlProcessor::new(registry(), Box::new(BigQueryDialect));
        let sql = processor.process(&Context::background(), &expr).unwrap();

        let expected = "(SELECT id FROM users WHERE column = 'A') INTERSECT DISTINCT \
            ((SELECT id FROM users WHERE column = 'B') UNION DISTINCT \
            ((SELECT id FROM users WHERE column = 'C') EXCEPT DISTINCT \
            (SELECT id FROM users WHERE column = 'D')))";
        assert_eq!(compact_sql_query(&sql.query), compact_sql_query(expected));
        assert!(sql.args.is_empty());
    }

    #[test]
    fn test_args_follow_tree_order() {
        let expr = Expression::union(vec![
            tag("bound", "1"),
            Expression::intersect(vec![tag("bound", "2"), tag("bound", "3")]),
            tag("bound", "4"),
        ]);
        let processor = BaseSqlProcessor::new(registry(), Box::new(BigQueryDialect));
        let sql = processor.process(&Context::with_request_id("req-1"), &expr).unwrap();
        assert_eq!(sql.args, vec![json!("1"), json!("2"), json!("3"), json!("4")]);
        assert_eq!(sql.query.matches('?').count(), 4);
    }

    #[test]
    fn test_indexed_placeholders_number_across_tags() {
        let registry = Registry::new();
        registry.must_register_builder(
            SqlTemplate::new(
                Metadata::new("pair", "Pair"),
                "SELECT id FROM users WHERE a = {{ arg .value }} OR b IN ({{ argEach .more }})",
            )
            .with_placeholder(dollar_placeholder()),
        );
        let pair = |value: &str, more: Value| {
            let params = json!({"value": value, "more": more});
            Expression::tag("pair", params.as_object().cloned().unwrap())
        };
        let expr = Expression::union(vec![
            pair("x", json!([1, 2])),
            Expression::except(vec![pair("y", json!([])), pair("z", json!([3]))]),
        ]);

        let processor = BaseSqlProcessor::new(Arc::new(registry), Box::new(BigQueryDialect));
        let sql = processor.process(&Context::background(), &expr).unwrap();
        assert_eq!(
            compact_sql_query(&sql.query),
            "(SELECT id FROM users WHERE a = $1 OR b IN ($2, $3)) UNION DISTINCT \
             ((SELECT id FROM users WHERE a = $4 OR b IN (NULL)) EXCEPT DISTINCT \
             (SELECT id FROM users WHERE a = $5 OR b IN ($6)))"
        );
        assert_eq!(
            sql.args,
            vec![json!("x"), json!(1), json!(2), json!("y"), json!("z"), json!(3)]
        );
    }

    #[test]
    fn test_single_tag() {
        let processor = BaseSqlProcessor::new(registry(), Box::new(BigQueryDialect));
        let sql = processor
            .process(&Context::background(), &tag("bound", "x"))
            .unwrap();
        assert_eq!(sql.query, "SELECT id FROM users WHERE column = ?");
    }

    #[test]
    fn test_errors() {
        let processor = BaseSqlProcessor::new(registry(), Box::new(BigQueryDialect));
        let ctx = Context::background();

        let err = processor.process(&ctx, &tag("missing", "x")).unwrap_err();
        assert!(matches!(err, TagError::BuilderNotFound(id) if id == "missing"));

        let err = processor.process(&ctx, &tag("note", "x")).unwrap_err();
        assert_eq!(err.to_string(), "builder note does not implement SqlBuilder");

        let err = processor
            .process(&ctx, &Expression::except(vec![tag("bound", "x")]))
            .unwrap_err();
        assert!(matches!(err, TagError::InvalidExpression(_)));

        let broken = Registry::new();
        broken.must_register_builder(SqlTemplate::new(Metadata::new("bad", "Bad"), "{{ if }}"));
        let processor = BaseSqlProcessor::new(Arc::new(broken), Box::new(BigQueryDialect));
        let err = processor
            .process(&ctx, &Expression::tag("bad", Params::new()))
            .unwrap_err();
        assert!(err.to_string().starts_with("failed to build SQL for tag bad: "));
        assert!(!err.is_client_error());
    }
}
