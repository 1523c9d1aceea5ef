//! Middleware-style interception of a builder's methods.
//!
//! A [`Hook`] takes the next implementation of a function and returns a
//! wrapped one. Hooks are composed with [`chain_hook`] so the first hook in the
//! list runs first and decides whether and how to call the rest.

use std::sync::Arc;

use crate::builder::{Builder, BuilderKind, Metadata, Sql, SqlBuilder};
use crate::context::Context;
use crate::error::TagResult;
use crate::value::Params;

/// Wraps one implementation of `T` into another.
pub type Hook<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

/// The shape of [`SqlBuilder::build_sql`] as a value.
pub type BuildSqlFn = Arc<dyn Fn(&Context, &Params) -> TagResult<Sql> + Send + Sync>;

/// The shape of [`Builder::metadata`] as a value.
pub type MetadataFn = Arc<dyn Fn(&Context) -> Arc<Metadata> + Send + Sync>;

/// Box a closure as a [`Hook`].
pub fn hook<T, F>(f: F) -> Hook<T>
where
    F: Fn(T) -> T + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Compose hooks right to left: `chain_hook([a, b])(next) == a(b(next))`.
///
/// An empty chain is the identity.
pub fn chain_hook<T: 'static>(hooks: impl IntoIterator<Item = Hook<T>>) -> Hook<T> {
    let hooks: Vec<Hook<T>> = hooks.into_iter().collect();
    Arc::new(move |next: T| hooks.iter().rev().fold(next, |acc, h| h(acc)))
}

/// Like [`chain_hook`] with `first` as the outermost hook.
pub fn chain_hook_with<T: 'static>(
    first: Hook<T>,
    rest: impl IntoIterator<Item = Hook<T>>,
) -> Hook<T> {
    chain_hook(std::iter::once(first).chain(rest))
}

/// An [`SqlBuilder`] whose methods run through hook chains before reaching
/// the wrapped builder.
pub struct SqlBuilderWrapper {
    original: Arc<dyn SqlBuilder>,
    build_sql: BuildSqlFn,
    metadata: MetadataFn,
}

impl SqlBuilderWrapper {
    pub fn new(original: Arc<dyn SqlBuilder>) -> Self {
        let for_build = Arc::clone(&original);
        let for_metadata = Arc::clone(&original);
        Self {
            original,
            build_sql: Arc::new(move |ctx: &Context, params: &Params| {
                for_build.build_sql(ctx, params)
            }),
            metadata: Arc::new(move |ctx: &Context| for_metadata.metadata(ctx)),
        }
    }

    /// Intercept `build_sql`. Hooks added later wrap the ones added earlier.
    pub fn with_build_sql_hooks(
        mut self,
        hooks: impl IntoIterator<Item = Hook<BuildSqlFn>>,
    ) -> Self {
        self.build_sql = chain_hook(hooks)(self.build_sql);
        self
    }

    /// Intercept `metadata`. Hooks added later wrap the ones added earlier.
    pub fn with_metadata_hooks(
        mut self,
        hooks: impl IntoIterator<Item = Hook<MetadataFn>>,
    ) -> Self {
        self.metadata = chain_hook(hooks)(self.metadata);
        self
    }

    pub fn original(&self) -> &Arc<dyn SqlBuilder> {
        &self.original
    }
}

impl Builder for SqlBuilderWrapper {
    fn metadata(&self, ctx: &Context) -> Arc<Metadata> {
        (self.metadata)(ctx)
    }
}

impl SqlBuilder for SqlBuilderWrapper {
    fn build_sql(&self, ctx: &Context, params: &Params) -> TagResult<Sql> {
        (self.build_sql)(ctx, params)
    }
}

impl From<SqlBuilderWrapper> for BuilderKind {
    fn from(wrapper: SqlBuilderWrapper) -> Self {
        BuilderKind::Sql(Arc::new(wrapper))
    }
}

/// Wrap `original` so its `build_sql` runs through `hooks`.
pub fn wrap_sql_builder(
    original: impl SqlBuilder + 'static,
    hooks: impl IntoIterator<Item = Hook<BuildSqlFn>>,
) -> SqlBuilderWrapper {
    SqlBuilderWrapper::new(Arc::new(original)).with_build_sql_hooks(hooks)
}
