//! Functions callable from SQL templates.
//!
//! The string helpers here are for identifiers and constants written by the
//! template author. Untrusted input must go through `arg` / `argEach`.
//!
//! `printf` understands the `%v`, `%s`, `%d` and `%q` verbs plus `%%`; flags,
//! widths and the other verbs are rejected.

use std::cmp::Ordering;

use convert_case::{Case, Casing};
use inflector::string::pluralize::to_plural;
use inflector::string::singularize::to_singular;
use serde_json::Value;

use crate::error::TemplateError;
use crate::value::{is_truthy, to_text, type_name, values_equal};

/// Functions that bind query arguments. Evaluated by the executor.
pub const ARG_FUNCS: &[&str] = &["arg", "argEach"];

pub const BUILTINS: &[&str] = &[
    "eq", "ne", "lt", "le", "gt", "ge", "and", "or", "not", "len", "index", "print", "printf",
    "println",
];

pub const HELPERS: &[&str] = &[
    "toLower",
    "toUpper",
    "trim",
    "trimSuffix",
    "hasPrefix",
    "hasSuffix",
    "replaceAll",
    "split",
    "join",
    "camelCase",
    "snakeCase",
    "pascalCase",
    "kebabCase",
    "capitalize",
    "plural",
    "singular",
    "singleQuote",
    "backtickQuote",
    "singleQuoteJoin",
    "backtickQuoteJoin",
];

pub fn is_defined(name: &str) -> bool {
    ARG_FUNCS.contains(&name) || BUILTINS.contains(&name) || HELPERS.contains(&name)
}

type FuncResult = Result<Value, TemplateError>;

/// Call a builtin or helper by name.
pub fn call(name: &str, args: Vec<Value>) -> FuncResult {
    match name {
        "eq" => eq(&args),
        "ne" => {
            let [a, b] = exact::<2>(name, &args)?;
            Ok(Value::Bool(!values_equal(a, b)))
        }
        "lt" => compare(name, &args, |o| o == Ordering::Less),
        "le" => compare(name, &args, |o| o != Ordering::Greater),
        "gt" => compare(name, &args, |o| o == Ordering::Greater),
        "ge" => compare(name, &args, |o| o != Ordering::Less),
        "and" => {
            at_least(name, &args, 1)?;
            let first_false = args.iter().position(|v| !is_truthy(v));
            Ok(pick(args, first_false))
        }
        "or" => {
            at_least(name, &args, 1)?;
            let first_true = args.iter().position(is_truthy);
            Ok(pick(args, first_true))
        }
        "not" => {
            let [a] = exact::<1>(name, &args)?;
            Ok(Value::Bool(!is_truthy(a)))
        }
        "len" => {
            let [a] = exact::<1>(name, &args)?;
            let n = match a {
                Value::String(s) => s.len(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                Value::Null => 0,
                other => {
                    return Err(TemplateError::exec(format!(
                        "len of type {}",
                        type_name(other)
                    )));
                }
            };
            Ok(Value::from(n))
        }
        "index" => index(&args),
        "print" => Ok(Value::from(sprint(&args))),
        "println" => {
            let parts: Vec<String> = args.iter().map(to_text).collect();
            Ok(Value::from(format!("{}\n", parts.join(" "))))
        }
        "printf" => sprintf(&args),

        "toLower" => map_str(name, &args, |s| s.to_lowercase()),
        "toUpper" => map_str(name, &args, |s| s.to_uppercase()),
        "trim" => {
            let [s, cutset] = strings::<2>(name, &args)?;
            Ok(Value::from(s.trim_matches(|c| cutset.contains(c))))
        }
        "trimSuffix" => {
            let [s, suffix] = strings::<2>(name, &args)?;
            Ok(Value::from(s.strip_suffix(suffix).unwrap_or(s)))
        }
        "hasPrefix" => {
            let [s, prefix] = strings::<2>(name, &args)?;
            Ok(Value::Bool(s.starts_with(prefix)))
        }
        "hasSuffix" => {
            let [s, suffix] = strings::<2>(name, &args)?;
            Ok(Value::Bool(s.ends_with(suffix)))
        }
        "replaceAll" => {
            let [s, old, new] = strings::<3>(name, &args)?;
            Ok(Value::from(s.replace(old, new)))
        }
        "split" => {
            let [s, sep] = strings::<2>(name, &args)?;
            Ok(Value::Array(s.split(sep).map(Value::from).collect()))
        }
        "join" => {
            let [elems, sep] = exact::<2>(name, &args)?;
            let Value::Array(items) = elems else {
                return Err(wrong_type(name, "array", elems));
            };
            let sep = as_str(name, sep)?;
            let parts: Vec<String> = items.iter().map(to_text).collect();
            Ok(Value::from(parts.join(sep)))
        }
        "camelCase" => map_str(name, &args, |s| s.to_case(Case::Camel)),
        "snakeCase" => map_str(name, &args, |s| s.to_case(Case::Snake)),
        "pascalCase" => map_str(name, &args, |s| s.to_case(Case::Pascal)),
        "kebabCase" => map_str(name, &args, |s| s.to_case(Case::Kebab)),
        "capitalize" => map_str(name, &args, capitalize),
        "plural" => map_str(name, &args, |s| inflect(s, to_plural)),
        "singular" => map_str(name, &args, |s| inflect(s, to_singular)),
        "singleQuote" => {
            let [v] = exact::<1>(name, &args)?;
            Ok(Value::from(quote(v, '\'')?))
        }
        "backtickQuote" => {
            let [v] = exact::<1>(name, &args)?;
            Ok(Value::from(quote(v, '`')?))
        }
        "singleQuoteJoin" => quote_join(&args, '\''),
        "backtickQuoteJoin" => quote_join(&args, '`'),

        _ => Err(TemplateError::exec(format!("function {name:?} not defined"))),
    }
}

/// Wrap in `c`, doubling any `c` inside.
pub fn quote_str(s: &str, c: char) -> String {
    let doubled: String = [c, c].iter().collect();
    format!("{c}{}{c}", s.replace(c, &doubled))
}

fn quote(v: &Value, c: char) -> Result<String, TemplateError> {
    match v {
        Value::String(s) => Ok(quote_str(s, c)),
        other => Err(TemplateError::exec(format!(
            "quote only accepts string-like types, got {}",
            type_name(other)
        ))),
    }
}

/// `singleQuoteJoin SEP VALUES`
fn quote_join(args: &[Value], c: char) -> FuncResult {
    let [sep, values] = exact::<2>("quoteJoin", args)?;
    let sep = as_str("quoteJoin", sep)?;
    let Value::Array(items) = values else {
        return Err(TemplateError::exec(format!(
            "quoteJoin only accepts slice, got {}",
            type_name(values)
        )));
    };
    let quoted = items
        .iter()
        .map(|item| quote(item, c))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::from(quoted.join(sep)))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// `eq a b c` is true when `a` equals any of the rest.
fn eq(args: &[Value]) -> FuncResult {
    at_least("eq", args, 2)?;
    let (first, rest) = (&args[0], &args[1..]);
    Ok(Value::Bool(rest.iter().any(|v| values_equal(first, v))))
}

fn compare(name: &str, args: &[Value], accept: fn(Ordering) -> bool) -> FuncResult {
    let [a, b] = exact::<2>(name, args)?;
    let ordering = match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .zip(y.as_f64())
            .and_then(|(x, y)| x.partial_cmp(&y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    };
    let ordering = ordering.ok_or_else(|| {
        TemplateError::exec(format!(
            "{name}: incompatible types for comparison: {} and {}",
            type_name(a),
            type_name(b)
        ))
    })?;
    Ok(Value::Bool(accept(ordering)))
}

fn index(args: &[Value]) -> FuncResult {
    at_least("index", args, 1)?;
    let mut current = args[0].clone();
    for key in &args[1..] {
        current = match (&current, key) {
            (Value::Array(items), Value::Number(n)) => {
                let i = n
                    .as_u64()
                    .and_then(|i| usize::try_from(i).ok())
                    .filter(|&i| i < items.len())
                    .ok_or_else(|| TemplateError::exec(format!("index out of range: {n}")))?;
                items[i].clone()
            }
            (Value::Object(map), Value::String(k)) => map.get(k).cloned().unwrap_or(Value::Null),
            (Value::Null, _) => Value::Null,
            (container, key) => {
                return Err(TemplateError::exec(format!(
                    "can't index item of type {} with {}",
                    type_name(container),
                    type_name(key)
                )));
            }
        };
    }
    Ok(current)
}

/// Concatenate operands, with a space between two operands when neither is a
/// string.
fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !arg.is_string() && !args[i - 1].is_string() {
            out.push(' ');
        }
        out.push_str(&to_text(arg));
    }
    out
}

fn sprintf(args: &[Value]) -> FuncResult {
    at_least("printf", args, 1)?;
    let format = as_str("printf", &args[0])?;
    let mut operands = args[1..].iter();
    let mut out = String::with_capacity(format.len());

    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let verb = chars
            .next()
            .ok_or_else(|| TemplateError::exec("printf: format ends with a bare %"))?;
        if verb == '%' {
            out.push('%');
            continue;
        }
        let value = operands
            .next()
            .ok_or_else(|| TemplateError::exec(format!("printf: missing operand for %{verb}")))?;
        match verb {
            'v' | 's' => out.push_str(&to_text(value)),
            'd' => {
                let n = value
                    .as_i64()
                    .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                    .ok_or_else(|| wrong_type("printf", "integer", value))?;
                out.push_str(&n.to_string());
            }
            'q' => out.push_str(&format!("{:?}", to_text(value))),
            other => {
                return Err(TemplateError::exec(format!(
                    "printf: unsupported verb %{other}"
                )));
            }
        }
    }

    if operands.len() > 0 {
        return Err(TemplateError::exec(format!(
            "printf: {} extra operands",
            operands.len()
        )));
    }
    Ok(Value::from(out))
}

fn pick(mut args: Vec<Value>, at: Option<usize>) -> Value {
    let i = at.unwrap_or(args.len() - 1);
    args.swap_remove(i)
}

fn at_least(name: &str, args: &[Value], n: usize) -> Result<(), TemplateError> {
    if args.len() < n {
        return Err(TemplateError::exec(format!(
            "wrong number of args for {name}: want at least {n} got {}",
            args.len()
        )));
    }
    Ok(())
}

fn exact<'a, const N: usize>(
    name: &str,
    args: &'a [Value],
) -> Result<[&'a Value; N], TemplateError> {
    if args.len() != N {
        return Err(TemplateError::exec(format!(
            "wrong number of args for {name}: want {N} got {}",
            args.len()
        )));
    }
    Ok(std::array::from_fn(|i| &args[i]))
}

fn strings<'a, const N: usize>(
    name: &str,
    args: &'a [Value],
) -> Result<[&'a str; N], TemplateError> {
    let values = exact::<N>(name, args)?;
    let mut out = [""; N];
    for (slot, value) in out.iter_mut().zip(values) {
        *slot = as_str(name, value)?;
    }
    Ok(out)
}

fn as_str<'a>(name: &str, value: &'a Value) -> Result<&'a str, TemplateError> {
    value.as_str().ok_or_else(|| wrong_type(name, "string", value))
}

fn map_str(name: &str, args: &[Value], f: impl Fn(&str) -> String) -> FuncResult {
    let [s] = strings::<1>(name, args)?;
    Ok(Value::from(f(s)))
}

fn wrong_type(name: &str, want: &str, got: &Value) -> TemplateError {
    TemplateError::exec(format!(
        "wrong type for value in {name}; expected {want}; got {}",
        type_name(got)
    ))
}

/// Inflect a table or column name with English noun rules, keeping the
/// word's casing (`user`, `User`, `USER`).
fn inflect(word: &str, rule: fn(&str) -> String) -> String {
    if word.is_empty() {
        return String::new();
    }
    let lower = word.to_lowercase();
    let result = rule(&lower);
    if word.chars().any(char::is_uppercase) && !word.chars().any(char::is_lowercase) {
        result.to_uppercase()
    } else if word.chars().next().is_some_and(char::is_uppercase) {
        capitalize(&result)
    } else {
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call1(name: &str, args: Vec<Value>) -> Value {
        call(name, args).unwrap()
    }

    #[test]
    fn test_single_quote() {
        assert_eq!(call1("singleQuote", vec![json!("")]), json!("''"));
        assert_eq!(call1("singleQuote", vec![json!("hello")]), json!("'hello'"));
        assert_eq!(call1("singleQuote", vec![json!("it's")]), json!("'it''s'"));
        let err = call("singleQuote", vec![json!(1)]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "template execution error: quote only accepts string-like types, got number"
        );
    }

    #[test]
    fn test_backtick_quote() {
        assert_eq!(call1("backtickQuote", vec![json!("column_name")]), json!("`column_name`"));
        assert_eq!(call1("backtickQuote", vec![json!("column`name")]), json!("`column``name`"));
    }

    #[test]
    fn test_quote_join() {
        assert_eq!(
            call1("singleQuoteJoin", vec![json!(", "), json!(["a", "b", "c"])]),
            json!("'a', 'b', 'c'")
        );
        assert_eq!(
            call1("singleQuoteJoin", vec![json!(", "), json!(["it's", "they're"])]),
            json!("'it''s', 'they''re'")
        );
        assert_eq!(
            call1("backtickQuoteJoin", vec![json!(", "), json!(["col1", "col2"])]),
            json!("`col1`, `col2`")
        );
        assert_eq!(call1("singleQuoteJoin", vec![json!(", "), json!([])]), json!(""));
        assert_eq!(
            call1("singleQuoteJoin", vec![json!(" AND "), json!(["name", "age"])]),
            json!("'name' AND 'age'")
        );
        let err = call("singleQuoteJoin", vec![json!(", "), json!("abc")]).unwrap_err();
        assert!(err.to_string().contains("quoteJoin only accepts slice, got string"));
    }

    #[test]
    fn test_string_helpers() {
        assert_eq!(call1("toUpper", vec![json!("purchase")]), json!("PURCHASE"));
        assert_eq!(call1("trim", vec![json!("xxhixx"), json!("x")]), json!("hi"));
        assert_eq!(call1("trimSuffix", vec![json!("users_tmp"), json!("_tmp")]), json!("users"));
        assert_eq!(call1("hasPrefix", vec![json!("user_id"), json!("user")]), json!(true));
        assert_eq!(
            call1("replaceAll", vec![json!("a-b-c"), json!("-"), json!("_")]),
            json!("a_b_c")
        );
        assert_eq!(call1("split", vec![json!("a,b"), json!(",")]), json!(["a", "b"]));
        assert_eq!(call1("join", vec![json!(["a", 1]), json!("|")]), json!("a|1"));
        assert_eq!(call1("snakeCase", vec![json!("userId")]), json!("user_id"));
        assert_eq!(call1("camelCase", vec![json!("user_id")]), json!("userId"));
        assert_eq!(call1("pascalCase", vec![json!("user_id")]), json!("UserId"));
        assert_eq!(call1("kebabCase", vec![json!("userId")]), json!("user-id"));
        assert_eq!(call1("capitalize", vec![json!("hELLO")]), json!("Hello"));
        assert!(call("toUpper", vec![json!(1)]).is_err());
    }

    #[test]
    fn test_inflection() {
        let plural = |s: &str| call1("plural", vec![json!(s)]);
        let singular = |s: &str| call1("singular", vec![json!(s)]);

        assert_eq!(plural("user"), json!("users"));
        assert_eq!(plural("category"), json!("categories"));
        assert_eq!(plural("Category"), json!("Categories"));
        assert_eq!(plural("box"), json!("boxes"));
        assert_eq!(plural("sheep"), json!("sheep"));
        assert_eq!(plural("DAY"), json!("DAYS"));
        assert_eq!(plural("analysis"), json!("analyses"));
        assert_eq!(plural("criterion"), json!("criteria"));

        assert_eq!(singular("categories"), json!("category"));
        assert_eq!(singular("users"), json!("user"));
        assert_eq!(singular("boxes"), json!("box"));
        assert_eq!(singular("status"), json!("status"));
        assert_eq!(singular("buses"), json!("bus"));
        assert_eq!(singular("movies"), json!("movie"));
        assert_eq!(singular("vertices"), json!("vertex"));
        assert_eq!(singular("analyses"), json!("analysis"));
        assert_eq!(singular("EVENTS"), json!("EVENT"));
        assert_eq!(plural(""), json!(""));
        assert!(call("plural", vec![json!(3)]).is_err());
    }

    #[test]
    fn test_print_and_printf() {
        assert_eq!(
            call1("print", vec![json!("a"), json!(1), json!(2), json!("b")]),
            json!("a1 2b")
        );
        assert_eq!(call1("println", vec![json!("a"), json!(1)]), json!("a 1\n"));
        assert_eq!(
            call1("printf", vec![json!("%s_%d"), json!("events"), json!(2024)]),
            json!("events_2024")
        );
        assert_eq!(
            call1("printf", vec![json!("%v%% of %q"), json!(7.5), json!("it's")]),
            json!("7.5% of \"it's\"")
        );
        assert_eq!(call1("printf", vec![json!("LIMIT %d"), json!(10.0)]), json!("LIMIT 10"));

        let err = call("printf", vec![json!("%d"), json!("x")]).unwrap_err();
        assert!(err.to_string().contains("expected integer; got string"));
        assert!(call("printf", vec![json!("%s %s"), json!("a")]).is_err());
        assert!(call("printf", vec![json!("%s"), json!("a"), json!("b")]).is_err());
        assert!(call("printf", vec![json!("%x"), json!(1)]).is_err());
        assert!(call("printf", vec![json!("100%")]).is_err());
    }

    #[test]
    fn test_builtins() {
        assert_eq!(call1("eq", vec![json!("b"), json!("a"), json!("b")]), json!(true));
        assert_eq!(call1("eq", vec![json!(1), json!(1.0)]), json!(true));
        assert_eq!(call1("ne", vec![json!(1), json!(2)]), json!(true));
        assert_eq!(call1("lt", vec![json!(1), json!(2.5)]), json!(true));
        assert_eq!(call1("ge", vec![json!("b"), json!("a")]), json!(true));
        assert!(call("lt", vec![json!(1), json!("a")]).is_err());
        assert_eq!(call1("and", vec![json!(1), json!(""), json!(2)]), json!(""));
        assert_eq!(call1("or", vec![json!(0), json!("x")]), json!("x"));
        assert_eq!(call1("or", vec![json!(0), json!(false)]), json!(false));
        assert_eq!(call1("not", vec![json!([])]), json!(true));
        assert_eq!(call1("len", vec![json!([1, 2, 3])]), json!(3));
        assert_eq!(call1("index", vec![json!({"a": [10, 20]}), json!("a"), json!(1)]), json!(20));
        assert!(call("index", vec![json!([1]), json!(5)]).is_err());
        assert!(call("eq", vec![json!(1)]).is_err());
    }
}
