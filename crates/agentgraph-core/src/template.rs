//! Template renderer (§6): `{{ }}` expressions, `{% %}` statements,
//! `{# #}` comments, rendered over the JSON context with `tera`.
//!
//! File inclusion and filesystem access are never wired up — every call
//! builds a fresh, loader-less `tera::Tera` instance from the literal
//! template string, so there is no path by which a rendered template can
//! read another file.

use crate::error::{AgentGraphError, Result};
use serde_json::Value;
use std::collections::HashMap;
use tera::{Context as TeraContext, Tera};

const TEMPLATE_NAME: &str = "__inline__";

/// Looks up a `.`-separated path (`"a.b.c"`) into a JSON value.
fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |cur, segment| match cur {
        Value::Object(map) => map.get(segment),
        Value::Array(arr) => segment.parse::<usize>().ok().and_then(|i| arr.get(i)),
        _ => None,
    })
}

/// Registers the `exists(v="a.b.c")` global function §6 names alongside
/// `default`/`length`/`join`/`upper`/`lower`, which `tera` already exposes
/// as built-in filters. `exists` needs a custom function rather than a
/// filter since it must tolerate a path that isn't present in `ctx` at all
/// (a plain `{{ v }}` reference to a missing key fails rendering outright).
fn register_exists(tera: &mut Tera, ctx: Value) {
    tera.register_function(
        "exists",
        move |args: &HashMap<String, Value>| -> tera::Result<Value> {
            let path = args
                .get("v")
                .and_then(|v| v.as_str())
                .ok_or_else(|| tera::Error::msg("exists() requires a string path argument `v`"))?;
            Ok(Value::Bool(lookup_path(&ctx, path).is_some()))
        },
    );
}

/// Renders `template` against `ctx`, exposing the standard filters the
/// specification requires (`default`, `exists`, `length`, `join`, `upper`,
/// `lower`) on top of `tera`'s built-ins, which already cover all but
/// `exists`.
pub fn render(template: &str, ctx: &Value) -> Result<String> {
    let mut tera = Tera::default();
    tera.add_raw_template(TEMPLATE_NAME, template)
        .map_err(|e| AgentGraphError::Template(e.to_string()))?;
    register_exists(&mut tera, ctx.clone());

    let tera_ctx = TeraContext::from_serialize(ctx)
        .map_err(|e| AgentGraphError::Template(e.to_string()))?;

    tera.render(TEMPLATE_NAME, &tera_ctx)
        .map_err(|e| AgentGraphError::Template(e.to_string()))
}

/// Renders `template` and parses the result as JSON, for callers (dynamic
/// `wait_for`, `generate_subgraph` output) that expect a structured value
/// rather than a plain string.
pub fn render_json(template: &str, ctx: &Value) -> Result<Value> {
    let rendered = render(template, ctx)?;
    serde_json::from_str(&rendered)
        .map_err(|e| AgentGraphError::Template(format!("expected JSON output: {}", e)))
}

/// Interprets a rendered `assert` condition as a boolean: the literals
/// `"true"`/`"false"`, else a parsed number where non-zero is true (§4.5).
pub fn as_condition_bool(rendered: &str) -> bool {
    match rendered.trim() {
        "true" => true,
        "false" => false,
        other => other.parse::<f64>().map(|n| n != 0.0).unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_simple_expression() {
        let ctx = json!({"x": "1"});
        let out = render("{{ x }}", &ctx).unwrap();
        assert_eq!(out, "1");
    }

    #[test]
    fn renders_with_default_filter() {
        let ctx = json!({});
        let out = render("{{ missing | default(value=\"0\") }}", &ctx).unwrap();
        assert_eq!(out, "0");
    }

    #[test]
    fn renders_statement_block() {
        let ctx = json!({"items": [1, 2, 3]});
        let out = render("{% for i in items %}{{ i }}{% endfor %}", &ctx).unwrap();
        assert_eq!(out, "123");
    }

    #[test]
    fn condition_bool_parses_literals_and_numbers() {
        assert!(as_condition_bool("true"));
        assert!(!as_condition_bool("false"));
        assert!(as_condition_bool("1"));
        assert!(!as_condition_bool("0"));
        assert!(!as_condition_bool("garbage"));
    }

    #[test]
    fn render_error_on_missing_closing_tag() {
        let ctx = json!({});
        assert!(render("{{ unterminated", &ctx).is_err());
    }

    #[test]
    fn exists_reports_presence_of_a_dotted_path() {
        let ctx = json!({"a": {"b": 1}});
        assert_eq!(render("{{ exists(v=\"a.b\") }}", &ctx).unwrap(), "true");
        assert_eq!(render("{{ exists(v=\"a.c\") }}", &ctx).unwrap(), "false");
        assert_eq!(render("{{ exists(v=\"missing\") }}", &ctx).unwrap(), "false");
    }
}
