//! Parsed form of an SQL template.

use serde_json::Value;

/// One node of the template body.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text, emitted as-is.
    Text(String),
    /// `{{ pipeline }}`: evaluated and printed (unless it only declares variables).
    Action(Pipeline),
    /// `{{ if }} ... {{ else if }} ... {{ else }} ... {{ end }}`
    If {
        branches: Vec<(Pipeline, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    },
    /// `{{ range [$i, $v :=] pipeline }} ... {{ else }} ... {{ end }}`
    Range {
        pipeline: Pipeline,
        body: Vec<Node>,
        otherwise: Option<Vec<Node>>,
    },
    /// `{{ with pipeline }} ... {{ else }} ... {{ end }}`
    With {
        pipeline: Pipeline,
        body: Vec<Node>,
        otherwise: Option<Vec<Node>>,
    },
}

/// `[$a[, $b] :=] command | command | ...`
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub decls: Vec<String>,
    pub commands: Vec<Command>,
}

/// A function call with arguments, or a single operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Call { name: String, args: Vec<Operand> },
    Operand(Operand),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `.a.b`; an empty path is `.` itself.
    Field(Vec<String>),
    /// `$` or `$name`, with an optional field path.
    Variable { name: String, path: Vec<String> },
    Literal(Value),
    /// `( pipeline )`, with an optional field path.
    Group { pipeline: Box<Pipeline>, path: Vec<String> },
}
