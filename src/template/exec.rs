//! Template evaluation.

use serde_json::Value;

use super::ArgPlaceholder;
use super::ast::{Command, Node, Operand, Pipeline};
use super::funcs;
use crate::error::TemplateError;
use crate::value::{is_truthy, to_text, type_name};

/// Per-call render state: the collected query arguments and the placeholder
/// style used for each one.
///
/// Placeholder indexes start at `offset`, the number of arguments bound by
/// earlier tags of the same query.
pub struct RenderContext<'p> {
    args: Vec<Value>,
    offset: usize,
    placeholder: &'p ArgPlaceholder,
}

impl<'p> RenderContext<'p> {
    pub fn new(placeholder: &'p ArgPlaceholder) -> Self {
        Self::with_offset(placeholder, 0)
    }

    pub fn with_offset(placeholder: &'p ArgPlaceholder, offset: usize) -> Self {
        Self {
            args: Vec::new(),
            offset,
            placeholder,
        }
    }

    /// Bind one value; returns its placeholder.
    pub fn arg(&mut self, value: Value) -> String {
        self.args.push(value);
        (self.placeholder)(self.offset + self.args.len() - 1)
    }

    /// Bind every element of a list, returning `p1, p2, ...`.
    ///
    /// An empty list renders `NULL` and binds nothing. A non-list binds as one
    /// value.
    pub fn arg_each(&mut self, values: Value) -> String {
        let Value::Array(items) = values else {
            return self.arg(values);
        };
        if items.is_empty() {
            return "NULL".to_string();
        }
        let placeholders: Vec<String> = items.into_iter().map(|item| self.arg(item)).collect();
        placeholders.join(", ")
    }

    pub fn into_args(self) -> Vec<Value> {
        self.args
    }
}

/// Render `nodes` against `data`, binding arguments into `render`.
pub fn execute(
    nodes: &[Node],
    data: &Value,
    render: &mut RenderContext<'_>,
) -> Result<String, TemplateError> {
    let mut state = State {
        vars: vec![("$".to_string(), data.clone())],
        render,
        out: String::new(),
    };
    state.walk(nodes, data)?;
    Ok(state.out)
}

struct State<'r, 'p> {
    /// Variable stack; blocks truncate back to their entry height on exit.
    vars: Vec<(String, Value)>,
    render: &'r mut RenderContext<'p>,
    out: String,
}

impl State<'_, '_> {
    fn walk(&mut self, nodes: &[Node], dot: &Value) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(text) => self.out.push_str(text),
                Node::Action(pipeline) => {
                    let value = self.eval_pipeline(pipeline, dot)?;
                    if pipeline.decls.is_empty() {
                        self.out.push_str(&to_text(&value));
                    } else {
                        self.declare(&pipeline.decls, value);
                    }
                }
                Node::If {
                    branches,
                    otherwise,
                } => self.walk_if(branches, otherwise.as_deref(), dot)?,
                Node::Range {
                    pipeline,
                    body,
                    otherwise,
                } => self.walk_range(pipeline, body, otherwise.as_deref(), dot)?,
                Node::With {
                    pipeline,
                    body,
                    otherwise,
                } => {
                    let mark = self.vars.len();
                    let value = self.eval_pipeline(pipeline, dot)?;
                    self.declare(&pipeline.decls, value.clone());
                    if is_truthy(&value) {
                        self.walk(body, &value)?;
                    } else if let Some(otherwise) = otherwise {
                        self.walk(otherwise, dot)?;
                    }
                    self.vars.truncate(mark);
                }
            }
        }
        Ok(())
    }

    fn walk_if(
        &mut self,
        branches: &[(Pipeline, Vec<Node>)],
        otherwise: Option<&[Node]>,
        dot: &Value,
    ) -> Result<(), TemplateError> {
        let mark = self.vars.len();
        let mut taken = false;
        for (cond, body) in branches {
            let value = self.eval_pipeline(cond, dot)?;
            self.declare(&cond.decls, value.clone());
            if is_truthy(&value) {
                self.walk(body, dot)?;
                taken = true;
                break;
            }
        }
        if !taken {
            if let Some(otherwise) = otherwise {
                self.walk(otherwise, dot)?;
            }
        }
        self.vars.truncate(mark);
        Ok(())
    }

    fn walk_range(
        &mut self,
        pipeline: &Pipeline,
        body: &[Node],
        otherwise: Option<&[Node]>,
        dot: &Value,
    ) -> Result<(), TemplateError> {
        let value = self.eval_pipeline(pipeline, dot)?;
        let items: Vec<(Value, Value)> = match value {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::from(i), v))
                .collect(),
            Value::Object(map) => map.into_iter().map(|(k, v)| (Value::String(k), v)).collect(),
            Value::Null => Vec::new(),
            other => {
                return Err(TemplateError::exec(format!(
                    "range can't iterate over {}",
                    type_name(&other)
                )));
            }
        };

        if items.is_empty() {
            if let Some(otherwise) = otherwise {
                self.walk(otherwise, dot)?;
            }
            return Ok(());
        }

        for (key, item) in items {
            let mark = self.vars.len();
            match pipeline.decls.as_slice() {
                [v] => self.vars.push((v.clone(), item.clone())),
                [k, v] => {
                    self.vars.push((k.clone(), key));
                    self.vars.push((v.clone(), item.clone()));
                }
                _ => {}
            }
            self.walk(body, &item)?;
            self.vars.truncate(mark);
        }
        Ok(())
    }

    fn declare(&mut self, decls: &[String], value: Value) {
        if let Some(name) = decls.first() {
            self.vars.push((name.clone(), value));
        }
    }

    fn eval_pipeline(&mut self, pipeline: &Pipeline, dot: &Value) -> Result<Value, TemplateError> {
        let mut piped = None;
        for command in &pipeline.commands {
            piped = Some(self.eval_command(command, dot, piped)?);
        }
        Ok(piped.unwrap_or(Value::Null))
    }

    fn eval_command(
        &mut self,
        command: &Command,
        dot: &Value,
        piped: Option<Value>,
    ) -> Result<Value, TemplateError> {
        match command {
            Command::Operand(operand) => self.eval_operand(operand, dot),
            Command::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len() + 1);
                for arg in args {
                    values.push(self.eval_operand(arg, dot)?);
                }
                values.extend(piped);
                self.call(name, values)
            }
        }
    }

    fn call(&mut self, name: &str, mut args: Vec<Value>) -> Result<Value, TemplateError> {
        match name {
            "arg" | "argEach" => {
                if args.len() != 1 {
                    return Err(TemplateError::exec(format!(
                        "wrong number of args for {name}: want 1 got {}",
                        args.len()
                    )));
                }
                let value = args.remove(0);
                let placeholder = if name == "arg" {
                    self.render.arg(value)
                } else {
                    self.render.arg_each(value)
                };
                Ok(Value::String(placeholder))
            }
            _ => funcs::call(name, args),
        }
    }

    fn eval_operand(&mut self, operand: &Operand, dot: &Value) -> Result<Value, TemplateError> {
        match operand {
            Operand::Field(path) => lookup(dot, path),
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Variable { name, path } => {
                let value = self
                    .vars
                    .iter()
                    .rev()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v)
                    .ok_or_else(|| TemplateError::exec(format!("undefined variable: {name}")))?;
                lookup(value, path)
            }
            Operand::Group { pipeline, path } => {
                let value = self.eval_pipeline(pipeline, dot)?;
                lookup(&value, path)
            }
        }
    }
}

/// Follow a field path. Missing keys yield `null`.
fn lookup(value: &Value, path: &[String]) -> Result<Value, TemplateError> {
    let mut current = value;
    for key in path {
        current = match current {
            Value::Object(map) => match map.get(key) {
                Some(v) => v,
                None => return Ok(Value::Null),
            },
            Value::Null => return Ok(Value::Null),
            other => {
                return Err(TemplateError::exec(format!(
                    "can't evaluate field {key} in type {}",
                    type_name(other)
                )));
            }
        };
    }
    Ok(current.clone())
}
