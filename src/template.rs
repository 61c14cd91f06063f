//! Variable substitution and condition evaluation.
//!
//! Templates are plain text with `{{ .name }}` references into a flat
//! variable scope. This is intentionally not an expression language:
//! `when` and `changed_when` are judged by the truthiness of the substituted
//! text alone, and references to undefined names render as empty strings so
//! conditions on absent facts degrade to false instead of failing the run.

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{Error, Result};

/// Flat variable scope used for substitution.
pub type VarMap = IndexMap<String, Value>;

/// Merge variable maps; later maps override earlier ones.
pub fn merge_vars(maps: &[&VarMap]) -> VarMap {
    let mut out = VarMap::new();
    for map in maps {
        for (k, v) in map.iter() {
            out.insert(k.clone(), v.clone());
        }
    }
    out
}

/// Convert per-host string variables into scope values.
pub fn string_vars(map: &IndexMap<String, String>) -> VarMap {
    map.iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect()
}

/// Render a scope value as template output text.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Substitute `{{ .name }}` references in `input` from `vars`.
///
/// An empty input or empty scope is returned unchanged. Undefined names
/// render as empty strings. A malformed template (unclosed `{{`, or a
/// reference that does not start with `.`) is a template error.
pub fn expand(input: &str, vars: &VarMap) -> Result<String> {
    if input.is_empty() || vars.is_empty() {
        return Ok(input.to_string());
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| Error::template(format!("unclosed '{{{{' in {:?}", input)))?;

        let reference = after[..end].trim();
        let name = reference
            .strip_prefix('.')
            .ok_or_else(|| Error::template(format!("unsupported reference {:?}", reference)))?;
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(Error::template(format!(
                "unsupported reference {:?}",
                reference
            )));
        }

        if let Some(value) = vars.get(name) {
            out.push_str(&value_to_string(value));
        }

        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Evaluate a `when` expression: substitute, then judge truthiness.
///
/// An empty expression is true (no gate). Template errors propagate so the
/// task can fail with a template category.
pub fn evaluate_condition(when: &str, vars: &VarMap) -> Result<bool> {
    if when.is_empty() {
        return Ok(true);
    }
    let rendered = expand(when, vars)?;
    Ok(truthy_literal(&rendered))
}

/// Truthiness used by `changed_when`: template errors count as false.
pub fn is_truthy(expr: &str, vars: &VarMap) -> bool {
    match expand(expr, vars) {
        Ok(rendered) => truthy_literal(&rendered),
        Err(_) => false,
    }
}

/// A rendered condition is false iff it trims+lowercases to one of the
/// falsy literals.
fn truthy_literal(rendered: &str) -> bool {
    let r = rendered.trim().to_lowercase();
    !(r.is_empty() || r == "false" || r == "0" || r == "no")
}
