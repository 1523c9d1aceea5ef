//! Filter expressions: trees of tags combined with set operations.
//!
//! Wire format, one key per node:
//!
//! ```json
//! {"intersect": [
//!   {"tag": {"builderID": "user_gender", "params": {"operator": "EQ", "value": "MALE"}}},
//!   {"union": [ ... ]}
//! ]}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TagError, TagResult};
use crate::value::{Params, null_as_default};

/// A leaf: one builder invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "builderID")]
    pub builder_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub params: Params,
}

impl Tag {
    pub fn new(builder_id: impl Into<String>, params: Params) -> Self {
        Self {
            builder_id: builder_id.into(),
            params,
        }
    }
}

/// Set operation combining the result sets of child expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOperation {
    Intersect,
    Union,
    /// First child minus the rest. Order matters.
    Except,
}

impl fmt::Display for SetOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetOperation::Intersect => write!(f, "INTERSECT"),
            SetOperation::Union => write!(f, "UNION"),
            SetOperation::Except => write!(f, "EXCEPT"),
        }
    }
}

/// Filter tree node. Exactly one field is populated in a valid node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub intersect: Vec<Expression>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub union: Vec<Expression>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub except: Vec<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<Tag>,
}

/// Borrowed view of a validated node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExpressionKind<'a> {
    Tag(&'a Tag),
    Set(SetOperation, &'a [Expression]),
}

impl Expression {
    pub fn tag(builder_id: impl Into<String>, params: Params) -> Self {
        Self {
            tag: Some(Tag::new(builder_id, params)),
            ..Self::default()
        }
    }

    pub fn intersect(children: Vec<Expression>) -> Self {
        Self::set(SetOperation::Intersect, children)
    }

    pub fn union(children: Vec<Expression>) -> Self {
        Self::set(SetOperation::Union, children)
    }

    pub fn except(children: Vec<Expression>) -> Self {
        Self::set(SetOperation::Except, children)
    }

    pub fn set(op: SetOperation, children: Vec<Expression>) -> Self {
        let mut expr = Self::default();
        *expr.children_mut(op) = children;
        expr
    }

    pub fn from_json(json: &str) -> TagResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn children(&self, op: SetOperation) -> &[Expression] {
        match op {
            SetOperation::Intersect => &self.intersect,
            SetOperation::Union => &self.union,
            SetOperation::Except => &self.except,
        }
    }

    fn children_mut(&mut self, op: SetOperation) -> &mut Vec<Expression> {
        match op {
            SetOperation::Intersect => &mut self.intersect,
            SetOperation::Union => &mut self.union,
            SetOperation::Except => &mut self.except,
        }
    }

    /// Check this node's shape (not its children) and return what it is.
    pub fn kind(&self) -> TagResult<ExpressionKind<'_>> {
        if !self.except.is_empty() && self.except.len() < 2 {
            return Err(TagError::InvalidExpression(
                "except must have at least 2 expressions".to_string(),
            ));
        }

        let mut populated = [
            SetOperation::Intersect,
            SetOperation::Union,
            SetOperation::Except,
        ]
        .into_iter()
        .filter(|op| !self.children(*op).is_empty())
        .map(|op| ExpressionKind::Set(op, self.children(op)))
        .chain(self.tag.as_ref().map(ExpressionKind::Tag));

        match (populated.next(), populated.next()) {
            (Some(kind), None) => Ok(kind),
            _ => Err(TagError::InvalidExpression(
                "expression must have exactly one non-empty field".to_string(),
            )),
        }
    }

    /// Validate the shape of the whole tree.
    pub fn validate(&self) -> TagResult<()> {
        match self.kind()? {
            ExpressionKind::Tag(_) => Ok(()),
            ExpressionKind::Set(_, children) => children.iter().try_for_each(Expression::validate),
        }
    }

    /// A new tree with nested same-operator nodes flattened into their parent.
    ///
    /// Intersect and union are associative, so `A ∩ (B ∩ C)` becomes
    /// `A ∩ B ∩ C` and a single-child node collapses into the child. Except is
    /// never flattened; only its children are simplified.
    pub fn simplify(&self) -> Expression {
        if self.tag.is_some() {
            return self.clone();
        }
        if !self.intersect.is_empty() {
            return flatten(SetOperation::Intersect, &self.intersect);
        }
        if !self.union.is_empty() {
            return flatten(SetOperation::Union, &self.union);
        }
        if !self.except.is_empty() {
            return Expression::except(self.except.iter().map(Expression::simplify).collect());
        }
        self.clone()
    }

    /// Whether this node is only a `op` node.
    fn is_pure(&self, op: SetOperation) -> bool {
        self.tag.is_none()
            && [
                SetOperation::Intersect,
                SetOperation::Union,
                SetOperation::Except,
            ]
            .into_iter()
            .all(|other| (other == op) != self.children(other).is_empty())
    }
}

fn flatten(op: SetOperation, children: &[Expression]) -> Expression {
    let mut flat = Vec::with_capacity(children.len());
    for child in children {
        let mut simplified = child.simplify();
        if simplified.is_pure(op) {
            flat.append(simplified.children_mut(op));
        } else {
            flat.push(simplified);
        }
    }

    if flat.len() == 1 {
        if let Some(only) = flat.pop() {
            return only;
        }
    }
    Expression::set(op, flat)
}
