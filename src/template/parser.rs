//! Template parser.
//!
//! Parsing runs in two passes. A scanner splits the source into literal text
//! and `{{ ... }}` actions, applying `{{-`/`-}}` trim markers and dropping
//! comments. Each action body is then parsed with nom and the actions are
//! folded into a tree of control structures.
//!
//! # Syntax Overview
//!
//! ```text
//! SELECT user_id FROM users WHERE
//! {{- if eq .operator "IN" }} gender IN ({{ argEach .values }})
//! {{- else }} gender = {{ .value | arg }}
//! {{- end }}
//! ```

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit1, multispace0, multispace1, one_of, satisfy},
    combinator::{map, not, opt, recognize, value, verify},
    multi::{many0, many1, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
};
use serde_json::{Number, Value};

use super::ast::{Command, Node, Operand, Pipeline};
use super::funcs;
use crate::error::TemplateError;

/// Parse template source into its node tree.
pub fn parse(source: &str) -> Result<Vec<Node>, TemplateError> {
    let tokens = scan(source)?;
    let mut parser = TreeParser {
        tokens: tokens.into_iter(),
    };
    let (nodes, stop) = parser.parse_list()?;
    match stop {
        Stop::Eof => Ok(nodes),
        Stop::End(line) => Err(TemplateError::parse(line, "unexpected {{end}}")),
        Stop::Else(line) | Stop::ElseIf(_, line) => {
            Err(TemplateError::parse(line, "unexpected {{else}}"))
        }
    }
}

// ----- scanner -----

#[derive(Debug)]
enum Token {
    Text(String),
    Action { body: String, line: usize },
}

fn scan(source: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut rest = source;
    let mut line = 1;
    let mut trim_next = false;

    loop {
        let Some(open) = rest.find("{{") else {
            let text = if trim_next { rest.trim_start() } else { rest };
            if !text.is_empty() {
                tokens.push(Token::Text(text.to_string()));
            }
            return Ok(tokens);
        };

        let after_open = &rest[open + 2..];
        let trim_before = has_left_trim(after_open);

        let mut text = &rest[..open];
        line += count_lines(text);
        if trim_next {
            text = text.trim_start();
        }
        if trim_before {
            text = text.trim_end();
        }
        if !text.is_empty() {
            tokens.push(Token::Text(text.to_string()));
        }

        let inner = if trim_before { &after_open[1..] } else { after_open };
        let close = find_close(inner)
            .ok_or_else(|| TemplateError::parse(line, "unclosed action"))?;

        let mut body = &inner[..close];
        trim_next = has_right_trim(body);
        if trim_next {
            body = &body[..body.len() - 1];
        }

        let action_line = line;
        line += count_lines(&inner[..close]);
        rest = &inner[close + 2..];

        let body = body.trim();
        if let Some(comment) = body.strip_prefix("/*") {
            if !comment.ends_with("*/") {
                return Err(TemplateError::parse(action_line, "unclosed comment"));
            }
            continue;
        }
        if body.is_empty() {
            return Err(TemplateError::parse(action_line, "missing value for command"));
        }
        tokens.push(Token::Action {
            body: body.to_string(),
            line: action_line,
        });
    }
}

/// `{{- ` trims the text before the action. The dash must be followed by space.
fn has_left_trim(after_open: &str) -> bool {
    let mut chars = after_open.chars();
    chars.next() == Some('-') && chars.next().is_some_and(char::is_whitespace)
}

/// ` -}}` trims the text after the action. The dash must follow a space.
fn has_right_trim(body: &str) -> bool {
    body.strip_suffix('-')
        .is_some_and(|b| b.ends_with(char::is_whitespace))
}

fn count_lines(text: &str) -> usize {
    text.matches('\n').count()
}

/// Offset of the `}}` closing this action, skipping quoted literals and
/// comment bodies.
fn find_close(inner: &str) -> Option<usize> {
    let start = match inner.trim_start().strip_prefix("/*") {
        Some(_) => inner.find("*/")? + 2,
        None => 0,
    };

    let bytes = inner.as_bytes();
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'"' | b'\'' | b'`') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if quote != b'`' && bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

// ----- tree -----

enum Stop {
    Eof,
    End(usize),
    Else(usize),
    ElseIf(Pipeline, usize),
}

#[derive(Clone)]
enum ActionKind {
    If(Pipeline),
    ElseIf(Pipeline),
    Else,
    End,
    Range(Pipeline),
    With(Pipeline),
    Pipeline(Pipeline),
}

struct TreeParser {
    tokens: std::vec::IntoIter<Token>,
}

impl TreeParser {
    fn parse_list(&mut self) -> Result<(Vec<Node>, Stop), TemplateError> {
        let mut nodes = Vec::new();
        while let Some(token) = self.tokens.next() {
            let (body, line) = match token {
                Token::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Token::Action { body, line } => (body, line),
            };

            match parse_action_body(&body, line)? {
                ActionKind::If(cond) => nodes.push(self.parse_if(cond, line)?),
                ActionKind::Range(pipeline) => {
                    let (body, otherwise) = self.parse_block("range", line)?;
                    nodes.push(Node::Range {
                        pipeline,
                        body,
                        otherwise,
                    });
                }
                ActionKind::With(pipeline) => {
                    let (body, otherwise) = self.parse_block("with", line)?;
                    nodes.push(Node::With {
                        pipeline,
                        body,
                        otherwise,
                    });
                }
                ActionKind::Pipeline(pipeline) => nodes.push(Node::Action(pipeline)),
                ActionKind::Else => return Ok((nodes, Stop::Else(line))),
                ActionKind::ElseIf(cond) => return Ok((nodes, Stop::ElseIf(cond, line))),
                ActionKind::End => return Ok((nodes, Stop::End(line))),
            }
        }
        Ok((nodes, Stop::Eof))
    }

    fn parse_if(&mut self, first: Pipeline, line: usize) -> Result<Node, TemplateError> {
        let mut branches = Vec::new();
        let mut cond = first;
        loop {
            let (body, stop) = self.parse_list()?;
            branches.push((cond, body));
            match stop {
                Stop::End(_) => {
                    return Ok(Node::If {
                        branches,
                        otherwise: None,
                    });
                }
                Stop::ElseIf(next, _) => cond = next,
                Stop::Else(else_line) => {
                    let otherwise = self.parse_else_body(else_line)?;
                    return Ok(Node::If {
                        branches,
                        otherwise: Some(otherwise),
                    });
                }
                Stop::Eof => return Err(TemplateError::parse(line, "unexpected EOF in if")),
            }
        }
    }

    fn parse_block(
        &mut self,
        keyword: &str,
        line: usize,
    ) -> Result<(Vec<Node>, Option<Vec<Node>>), TemplateError> {
        let (body, stop) = self.parse_list()?;
        match stop {
            Stop::End(_) => Ok((body, None)),
            Stop::Else(else_line) => Ok((body, Some(self.parse_else_body(else_line)?))),
            Stop::ElseIf(_, else_line) => Err(TemplateError::parse(
                else_line,
                format!("{{{{else if}}}} not allowed in {keyword}"),
            )),
            Stop::Eof => Err(TemplateError::parse(
                line,
                format!("unexpected EOF in {keyword}"),
            )),
        }
    }

    fn parse_else_body(&mut self, line: usize) -> Result<Vec<Node>, TemplateError> {
        let (body, stop) = self.parse_list()?;
        match stop {
            Stop::End(_) => Ok(body),
            Stop::Eof => Err(TemplateError::parse(line, "unexpected EOF in else")),
            Stop::Else(l) | Stop::ElseIf(_, l) => {
                Err(TemplateError::parse(l, "expected {{end}} after {{else}}"))
            }
        }
    }
}

fn parse_action_body(body: &str, line: usize) -> Result<ActionKind, TemplateError> {
    let kind = match parse_action(body) {
        Ok(("", kind)) => kind,
        Ok((remaining, _)) => {
            return Err(TemplateError::parse(
                line,
                format!("unexpected {remaining:?} in action"),
            ));
        }
        Err(_) => {
            return Err(TemplateError::parse(
                line,
                format!("malformed action {body:?}"),
            ));
        }
    };

    match &kind {
        ActionKind::Range(p) => check_pipeline(p, 2, line)?,
        ActionKind::If(p)
        | ActionKind::ElseIf(p)
        | ActionKind::With(p)
        | ActionKind::Pipeline(p) => check_pipeline(p, 1, line)?,
        ActionKind::Else | ActionKind::End => {}
    }
    Ok(kind)
}

/// Reject undefined functions and too many declared variables.
fn check_pipeline(pipeline: &Pipeline, max_decls: usize, line: usize) -> Result<(), TemplateError> {
    if pipeline.decls.len() > max_decls {
        return Err(TemplateError::parse(line, "too many declarations in command"));
    }
    for (i, command) in pipeline.commands.iter().enumerate() {
        match command {
            Command::Call { name, args } => {
                if !funcs::is_defined(name) {
                    return Err(TemplateError::parse(
                        line,
                        format!("function {name:?} not defined"),
                    ));
                }
                check_operands(args, line)?;
            }
            Command::Operand(operand) => {
                if i > 0 {
                    return Err(TemplateError::parse(
                        line,
                        "non-function command in pipeline stage",
                    ));
                }
                check_operands(std::slice::from_ref(operand), line)?;
            }
        }
    }
    Ok(())
}

fn check_operands(operands: &[Operand], line: usize) -> Result<(), TemplateError> {
    for operand in operands {
        if let Operand::Group { pipeline, .. } = operand {
            check_pipeline(pipeline, 0, line)?;
        }
    }
    Ok(())
}

// ----- action grammar (nom) -----

fn parse_action(input: &str) -> IResult<&str, ActionKind> {
    alt((
        map(preceded(keyword("if"), parse_pipeline), ActionKind::If),
        map(
            preceded(pair(keyword("else"), keyword("if")), parse_pipeline),
            ActionKind::ElseIf,
        ),
        value(ActionKind::Else, terminated(keyword("else"), multispace0)),
        value(ActionKind::End, terminated(keyword("end"), multispace0)),
        map(preceded(keyword("range"), parse_pipeline), ActionKind::Range),
        map(preceded(keyword("with"), parse_pipeline), ActionKind::With),
        map(parse_pipeline, ActionKind::Pipeline),
    ))(input)
}

/// A bare word that is not the prefix of a longer identifier.
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    preceded(
        multispace0,
        terminated(tag(word), not(satisfy(is_ident_char))),
    )
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn parse_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_alphabetic() || c == '_'),
        take_while(is_ident_char),
    ))(input)
}

/// Parse `[$a[, $b] :=] command | command ...`.
fn parse_pipeline(input: &str) -> IResult<&str, Pipeline> {
    let (input, _) = multispace0(input)?;
    let (input, decls) = opt(parse_decls)(input)?;
    let (input, commands) = separated_list1(
        delimited(multispace0, char('|'), multispace0),
        parse_command,
    )(input)?;
    let (input, _) = multispace0(input)?;

    Ok((
        input,
        Pipeline {
            decls: decls.unwrap_or_default(),
            commands,
        },
    ))
}

fn parse_decls(input: &str) -> IResult<&str, Vec<String>> {
    terminated(
        separated_list1(
            delimited(multispace0, char(','), multispace0),
            map(parse_variable_name, String::from),
        ),
        delimited(multispace0, tag(":="), multispace0),
    )(input)
}

fn parse_variable_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(char('$'), take_while(is_ident_char)))(input)
}

fn parse_command(input: &str) -> IResult<&str, Command> {
    alt((
        map(
            pair(
                parse_function_name,
                many0(preceded(multispace1, parse_operand)),
            ),
            |(name, args)| Command::Call {
                name: name.to_string(),
                args,
            },
        ),
        map(parse_operand, Command::Operand),
    ))(input)
}

fn parse_function_name(input: &str) -> IResult<&str, &str> {
    verify(parse_identifier, |name: &str| {
        !matches!(name, "true" | "false" | "nil")
    })(input)
}

fn parse_operand(input: &str) -> IResult<&str, Operand> {
    alt((
        map(parse_field_path, Operand::Field),
        value(Operand::Field(Vec::new()), char('.')),
        parse_variable,
        parse_group,
        map(parse_string, Operand::Literal),
        map(parse_raw_string, Operand::Literal),
        map(parse_number, Operand::Literal),
        value(Operand::Literal(Value::Bool(true)), keyword("true")),
        value(Operand::Literal(Value::Bool(false)), keyword("false")),
        value(Operand::Literal(Value::Null), keyword("nil")),
    ))(input)
}

/// `.a.b.c`
fn parse_field_path(input: &str) -> IResult<&str, Vec<String>> {
    many1(preceded(
        char('.'),
        map(parse_identifier, String::from),
    ))(input)
}

fn parse_variable(input: &str) -> IResult<&str, Operand> {
    let (input, name) = parse_variable_name(input)?;
    let (input, path) = opt(parse_field_path)(input)?;
    Ok((
        input,
        Operand::Variable {
            name: name.to_string(),
            path: path.unwrap_or_default(),
        },
    ))
}

/// `( pipeline )` with an optional trailing field path.
fn parse_group(input: &str) -> IResult<&str, Operand> {
    let (input, pipeline) = delimited(
        pair(char('('), multispace0),
        parse_pipeline,
        pair(multispace0, char(')')),
    )(input)?;
    let (input, path) = opt(parse_field_path)(input)?;
    Ok((
        input,
        Operand::Group {
            pipeline: Box::new(pipeline),
            path: path.unwrap_or_default(),
        },
    ))
}

/// A double-quoted string with backslash escapes.
fn parse_string(input: &str) -> IResult<&str, Value> {
    let (rest, _) = char('"')(input)?;
    let mut out = String::new();
    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((&rest[i + 1..], Value::String(out))),
            '\\' => {
                let escaped = match chars.next() {
                    Some((_, 'n')) => '\n',
                    Some((_, 't')) => '\t',
                    Some((_, 'r')) => '\r',
                    Some((_, c @ ('\\' | '"' | '\''))) => c,
                    _ => break,
                };
                out.push(escaped);
            }
            c => out.push(c),
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

/// A backtick raw string; no escapes.
fn parse_raw_string(input: &str) -> IResult<&str, Value> {
    map(
        delimited(char('`'), take_while(|c| c != '`'), char('`')),
        |s: &str| Value::String(s.to_string()),
    )(input)
}

/// Integer or float literal.
fn parse_number(input: &str) -> IResult<&str, Value> {
    let (input, num_str) = terminated(
        recognize(tuple((
            opt(one_of("+-")),
            digit1,
            opt(pair(char('.'), digit1)),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        ))),
        not(satisfy(is_ident_char)),
    )(input)?;

    let number = match num_str.parse::<i64>() {
        Ok(n) => Some(Number::from(n)),
        Err(_) => num_str.parse::<f64>().ok().and_then(Number::from_f64),
    };
    match number {
        Some(n) => Ok((input, Value::Number(n))),
        None => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Float,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: Vec<Operand>) -> Command {
        Command::Call {
            name: name.to_string(),
            args,
        }
    }

    fn field(path: &[&str]) -> Operand {
        Operand::Field(path.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_text_and_action() {
        let nodes = parse("a = {{ arg .value }}").unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::Text("a = ".to_string()),
                Node::Action(Pipeline {
                    decls: vec![],
                    commands: vec![call("arg", vec![field(&["value"])])],
                }),
            ]
        );
    }

    #[test]
    fn test_trim_markers() {
        let nodes = parse("WHERE\n   {{- .x -}}   \n  AND").unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0], Node::Text("WHERE".to_string()));
        assert_eq!(nodes[2], Node::Text("AND".to_string()));

        // a dash without space is a negative number, not a trim marker
        let nodes = parse("x {{-3}} y").unwrap();
        assert_eq!(nodes[0], Node::Text("x ".to_string()));
        assert_eq!(
            nodes[1],
            Node::Action(Pipeline {
                decls: vec![],
                commands: vec![Command::Operand(Operand::Literal(json!(-3)))],
            })
        );
    }

    #[test]
    fn test_pipeline_and_literals() {
        let nodes = parse(r#"{{ "purchase" | toUpper | arg }}"#).unwrap();
        let Node::Action(pipeline) = &nodes[0] else {
            panic!("expected action");
        };
        assert_eq!(
            pipeline.commands,
            vec![
                Command::Operand(Operand::Literal(json!("purchase"))),
                call("toUpper", vec![]),
                call("arg", vec![]),
            ]
        );

        let nodes = parse("{{ eq 1.5 `raw\\n` true nil }}").unwrap();
        let Node::Action(pipeline) = &nodes[0] else {
            panic!("expected action");
        };
        assert_eq!(
            pipeline.commands,
            vec![call(
                "eq",
                vec![
                    Operand::Literal(json!(1.5)),
                    Operand::Literal(json!("raw\\n")),
                    Operand::Literal(json!(true)),
                    Operand::Literal(Value::Null),
                ]
            )]
        );
    }

    #[test]
    fn test_if_else_chain() {
        let src = r#"{{ if eq .op "EQ" }}={{ else if eq .op "NE" }}!={{ else }}?{{ end }}"#;
        let nodes = parse(src).unwrap();
        let [Node::If { branches, otherwise }] = nodes.as_slice() else {
            panic!("expected a single if node");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(otherwise.as_deref(), Some(&[Node::Text("?".to_string())][..]));
    }

    #[test]
    fn test_range_with_decls() {
        let nodes = parse("{{ range $i, $v := .items }}{{ $v }}{{ else }}none{{ end }}").unwrap();
        let [Node::Range { pipeline, body, otherwise }] = nodes.as_slice() else {
            panic!("expected a single range node");
        };
        assert_eq!(pipeline.decls, vec!["$i".to_string(), "$v".to_string()]);
        assert_eq!(body.len(), 1);
        assert!(otherwise.is_some());
    }

    #[test]
    fn test_comments_and_braces_in_strings() {
        let nodes = parse(r#"a{{/* skip }} me */}}b{{ "}}" }}"#).unwrap();
        assert_eq!(nodes[0], Node::Text("a".to_string()));
        assert_eq!(nodes[1], Node::Text("b".to_string()));
        assert_eq!(
            nodes[2],
            Node::Action(Pipeline {
                decls: vec![],
                commands: vec![Command::Operand(Operand::Literal(json!("}}")))],
            })
        );
    }

    #[test]
    fn test_parse_errors_carry_line() {
        let err = parse("line1\nline2 {{ nosuchfunc .x }}").unwrap_err();
        assert_eq!(
            err,
            TemplateError::parse(2, "function \"nosuchfunc\" not defined")
        );

        assert!(matches!(parse("{{ if .x }}open"), Err(TemplateError::Parse { line: 1, .. })));
        assert!(matches!(parse("{{ end }}"), Err(TemplateError::Parse { .. })));
        assert!(matches!(parse("{{ .x "), Err(TemplateError::Parse { .. })));
        assert!(matches!(parse("{{ .x .y }}"), Err(TemplateError::Parse { .. })));
        assert!(matches!(
            parse("{{ range .x }}{{ else if .y }}{{ end }}"),
            Err(TemplateError::Parse { .. })
        ));
    }
}
