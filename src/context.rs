//! Per-request context threaded through validation and compilation.
//!
//! Nothing in the compiler blocks or can be cancelled; the context only carries
//! data for logging and tracing, plus the position of the next bound argument.

/// Request-scoped context.
#[derive(Debug, Clone, Default)]
pub struct Context {
    request_id: Option<String>,
    arg_offset: usize,
}

impl Context {
    /// An empty context, for startup wiring and tests.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context tagged with the id of the request being served.
    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            ..Self::default()
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Copy of this context whose first bound argument sits at `offset` in the
    /// final argument list.
    ///
    /// The processor sets this per tag so indexed placeholders (`$1`, `@p1`)
    /// keep counting across the whole tree.
    pub fn with_arg_offset(&self, offset: usize) -> Self {
        Self {
            request_id: self.request_id.clone(),
            arg_offset: offset,
        }
    }

    /// Number of arguments already bound before this builder runs.
    pub fn arg_offset(&self) -> usize {
        self.arg_offset
    }

    /// Span covering one compilation for this request.
    pub fn span(&self) -> tracing::Span {
        tracing::debug_span!(
            "tagql",
            request_id = self.request_id.as_deref().unwrap_or("-")
        )
    }
}
