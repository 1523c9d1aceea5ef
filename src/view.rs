//! A builder's form: an ordered list of fragments.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Context;
use crate::error::{TagError, TagResult};
use crate::fragment::{Fragment, FragmentType};
use crate::registry::Registry;
use crate::value::{Params, null_as_default};

/// Ordered fragments describing one builder's input form.
///
/// Order is both display order and validation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct View {
    #[serde(default, deserialize_with = "null_as_default")]
    pub fragments: Vec<Fragment>,
}

impl View {
    pub fn new(fragments: Vec<Fragment>) -> Self {
        Self { fragments }
    }

    /// Validate `params` against every fragment in order.
    ///
    /// Skipped fragments are passed over; the first real failure is returned.
    pub fn validate(&self, ctx: &Context, params: &Params) -> TagResult<()> {
        for fragment in &self.fragments {
            match fragment.validate(ctx, params) {
                Ok(()) => {}
                Err(e) if e.is_skip() => {
                    tracing::trace!("fragment {:?} skipped", fragment.metadata().key);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Decode a view from JSON, resolving each fragment through the registry's
    /// fragment factories.
    pub fn from_json_with_registry(registry: &Registry, json: &str) -> TagResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value_with_registry(registry, value)
    }

    /// Like [`View::from_json_with_registry`], starting from a decoded value.
    pub fn from_value_with_registry(registry: &Registry, value: Value) -> TagResult<Self> {
        let fragments = match value {
            Value::Object(mut map) => match map.remove("fragments") {
                Some(Value::Array(items)) => items,
                Some(Value::Null) | None => Vec::new(),
                Some(other) => {
                    return Err(TagError::Config(format!(
                        "view fragments must be an array, got {}",
                        crate::value::type_name(&other)
                    )));
                }
            },
            other => {
                return Err(TagError::Config(format!(
                    "view must be an object, got {}",
                    crate::value::type_name(&other)
                )));
            }
        };

        let fragments = fragments
            .into_iter()
            .map(|item| decode_fragment(registry, item))
            .collect::<TagResult<Vec<_>>>()?;
        Ok(Self { fragments })
    }
}

/// Peek the `type` discriminant, then decode into the registered prototype.
pub(crate) fn decode_fragment(registry: &Registry, item: Value) -> TagResult<Fragment> {
    let type_name = item
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let fragment_type: FragmentType = type_name.parse()?;
    let prototype = registry.create_fragment(fragment_type)?;
    prototype.decode_as_same(item)
}
