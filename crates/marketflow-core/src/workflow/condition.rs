//! Condition expressions evaluated against a run context.
//!
//! Supported forms:
//! - `${input.x.y}` / `${step_<id>_result.x}` / `${<contextKey>}` references,
//!   resolved by walking the context map (array segments are indices)
//! - a bare operand, judged by truthiness
//! - `a == b`, `a != b` comparing resolved strings
//! - `a > b`, `a >= b`, `a < b`, `a <= b` comparing numbers (false when
//!   either side is not numeric)
//!
//! Unresolved references become `undefined`, which is falsy.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

const UNDEFINED: &str = "undefined";

fn reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid reference regex"))
}

fn comparison_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(.*?)\s*(==|!=|>=|<=|>|<)\s*(.*?)\s*$").expect("valid comparison regex")
    })
}

/// Look up a dotted path (`input.user.name`) in the context.
pub fn lookup<'a>(context: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.trim().split('.');
    let mut current = context.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace every `${path}` reference with its rendered context value.
pub fn resolve_template(template: &str, context: &Map<String, Value>) -> String {
    reference_re()
        .replace_all(template, |caps: &Captures| {
            lookup(context, &caps[1])
                .map(render)
                .unwrap_or_else(|| UNDEFINED.to_string())
        })
        .into_owned()
}

fn is_truthy(resolved: &str) -> bool {
    !matches!(
        resolved.trim(),
        "" | "false" | "0" | "null" | UNDEFINED
    )
}

fn operand(raw: &str, context: &Map<String, Value>) -> String {
    let resolved = resolve_template(raw, context);
    let trimmed = resolved.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')));
    unquoted.unwrap_or(trimmed).to_string()
}

fn compare_numbers(left: &str, right: &str, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (left.parse::<f64>(), right.parse::<f64>()) {
        (Ok(l), Ok(r)) => cmp(l, r),
        _ => false,
    }
}

/// Evaluate `expression` against `context`. An absent expression is false.
pub fn evaluate(expression: Option<&str>, context: &Map<String, Value>) -> bool {
    let Some(expression) = expression else {
        return false;
    };

    // Operators are located before resolution so values containing
    // operator characters cannot change the expression's shape.
    if let Some(caps) = comparison_re().captures(expression) {
        let left = operand(&caps[1], context);
        let right = operand(&caps[3], context);
        return match &caps[2] {
            "==" => left == right,
            "!=" => left != right,
            ">=" => compare_numbers(&left, &right, |l, r| l >= r),
            "<=" => compare_numbers(&left, &right, |l, r| l <= r),
            ">" => compare_numbers(&left, &right, |l, r| l > r),
            "<" => compare_numbers(&left, &right, |l, r| l < r),
            _ => false,
        };
    }

    is_truthy(&operand(expression, context))
}
