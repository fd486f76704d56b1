//! Sandboxed Rhai runtime backing the Policy Engine Host.
//!
//! Grounded on the teacher's `RhaiRuntime`: one `rhai::Engine` configured
//! once with sandbox limits and helper functions, AST compiled per source
//! and cached by content hash. Unlike the teacher (which caches every
//! distinct script body process-wide), this runtime backs exactly one
//! [`crate::pool::PolicyInstance`] and holds at most one compiled AST at a
//! time — the instance *is* the cache entry, recompiled in place on hash
//! mismatch (see `pool.rs`).

use rhai::{Dynamic, Engine, Map, Scope, AST};
use serde_json::Value;

use crate::error::PolicyError;

const MAX_OPERATIONS: u64 = 500_000;
const MAX_CALL_LEVELS: usize = 32;
const MAX_EXPR_DEPTH: usize = 64;
const MAX_STRING_SIZE: usize = 10_000;
const MAX_ARRAY_SIZE: usize = 1_000;
const MAX_MAP_SIZE: usize = 1_000;

/// Builds the sandboxed engine shared by every [`crate::pool::PolicyInstance`].
///
/// No filesystem or network bindings are registered; the only symbols the
/// script sees are plain Rhai operators plus `lookup`, `now` and
/// `parse_json` below. `eval` is disabled so a script cannot escape the
/// sandbox by compiling further code at runtime.
pub fn build_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(MAX_OPERATIONS);
    engine.set_max_call_levels(MAX_CALL_LEVELS);
    engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_EXPR_DEPTH);
    engine.set_max_string_size(MAX_STRING_SIZE);
    engine.set_max_array_size(MAX_ARRAY_SIZE);
    engine.set_max_map_size(MAX_MAP_SIZE);
    engine.disable_symbol("eval");

    engine.register_fn("lookup", lookup_in_input);
    engine.register_fn("now", || -> i64 {
        tmf_core::time::now().unix_timestamp()
    });
    engine.register_fn("parse_json", |s: &str| -> Dynamic {
        serde_json::from_str::<Value>(s)
            .map(|v| json_to_dynamic(&v))
            .unwrap_or(Dynamic::UNIT)
    });

    engine
}

/// Compiles `source` to an AST. Syntax errors are rejected here; a
/// missing, non-callable, or wrong-arity `authorize` function is not
/// detectable from the AST alone and is instead rejected on first call
/// (`call_fn` returns `ErrorFunctionNotFound`), which `authorize` below
/// maps to the same `ScriptError` — both are valid rejection points per
/// the component design.
pub fn compile(engine: &Engine, source: &str) -> Result<AST, PolicyError> {
    engine
        .compile(source)
        .map_err(|e| PolicyError::ScriptError(format!("compilation failed: {e}")))
}

/// Calls `authorize()` against `input`, per §4.3: a fresh `Scope` holding
/// only the predeclared `input` slot (the script's only per-call mutable
/// state), frozen globals already baked into `ast`. Any runtime error or
/// non-boolean return is surfaced as a `ScriptError` — the pipeline layer
/// treats that uniformly as deny, never as allow-with-warning.
pub fn authorize(engine: &Engine, ast: &AST, input: &Value) -> Result<bool, PolicyError> {
    let mut scope = Scope::new();
    scope.push_constant("input", json_to_dynamic(input));

    let result = engine
        .call_fn::<Dynamic>(&mut scope, ast, "authorize", ())
        .map_err(|e| PolicyError::ScriptError(format!("evaluation failed: {e}")))?;

    result
        .as_bool()
        .map_err(|_| PolicyError::ScriptError("authorize() must return a bool".to_string()))
}

/// Converts a `serde_json::Value` into the `rhai::Dynamic` the script sees.
fn json_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i)
            } else if let Some(f) = n.as_f64() {
                Dynamic::from(f)
            } else {
                Dynamic::UNIT
            }
        }
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(items) => {
            let arr: rhai::Array = items.iter().map(json_to_dynamic).collect();
            Dynamic::from(arr)
        }
        Value::Object(fields) => {
            let mut map = Map::new();
            for (k, v) in fields {
                map.insert(k.as_str().into(), json_to_dynamic(v));
            }
            Dynamic::from(map)
        }
    }
}

/// Host helper `lookup(path)`: descends `input` (the predeclared scope
/// slot, passed in by the script as `input`) by dotted path. Maps descend
/// by key, arrays by integer index; a missing key yields `Dynamic::UNIT`
/// rather than an error. A consecutive-dot path (`a..b`) is a hard error,
/// raised before any descent is attempted.
fn lookup_in_input(input: Dynamic, path: &str) -> Result<Dynamic, Box<rhai::EvalAltResult>> {
    if path.split('.').any(str::is_empty) {
        return Err(format!("invalid dotted path: {path:?}").into());
    }

    let mut current = input;
    for segment in path.split('.') {
        current = descend(&current, segment);
        if current.is_unit() {
            return Ok(Dynamic::UNIT);
        }
    }
    Ok(current)
}

fn descend(value: &Dynamic, segment: &str) -> Dynamic {
    if value.is_map() {
        if let Some(map) = value.clone().try_cast::<Map>() {
            return map.get(segment).cloned().unwrap_or(Dynamic::UNIT);
        }
    }
    if value.is_array() {
        if let Some(arr) = value.clone().try_cast::<rhai::Array>() {
            if let Ok(index) = segment.parse::<usize>() {
                return arr.get(index).cloned().unwrap_or(Dynamic::UNIT);
            }
        }
    }
    Dynamic::UNIT
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input() -> Value {
        json!({
            "request": {"action": "CREATE"},
            "user": {"isOwner": true, "isLEAR": false},
            "tmf": {"relatedParty": [{"role": "Seller", "id": "did:elsi:abc"}]},
        })
    }

    #[test]
    fn authorize_true_allows() {
        let engine = build_engine();
        let ast = compile(&engine, "fn authorize() { true }").unwrap();
        assert!(authorize(&engine, &ast, &input()).unwrap());
    }

    #[test]
    fn authorize_false_denies() {
        let engine = build_engine();
        let ast = compile(&engine, "fn authorize() { false }").unwrap();
        assert!(!authorize(&engine, &ast, &input()).unwrap());
    }

    #[test]
    fn missing_authorize_fn_rejected_on_first_call() {
        let engine = build_engine();
        let ast = compile(&engine, "fn not_authorize() { true }").unwrap();
        let err = authorize(&engine, &ast, &input()).unwrap_err();
        assert!(matches!(err, PolicyError::ScriptError(_)));
    }

    #[test]
    fn syntax_error_rejected_at_compile() {
        let engine = build_engine();
        let err = compile(&engine, "fn authorize( { true }").unwrap_err();
        assert!(matches!(err, PolicyError::ScriptError(_)));
    }

    #[test]
    fn non_boolean_return_is_script_error() {
        let engine = build_engine();
        let ast = compile(&engine, r#"fn authorize() { "yes" }"#).unwrap();
        assert!(authorize(&engine, &ast, &input()).is_err());
    }

    #[test]
    fn runtime_error_is_script_error() {
        let engine = build_engine();
        let ast = compile(&engine, "fn authorize() { undefined_var }").unwrap();
        assert!(authorize(&engine, &ast, &input()).is_err());
    }

    #[test]
    fn lookup_descends_dotted_path() {
        let engine = build_engine();
        let ast = compile(
            &engine,
            r#"fn authorize() { lookup(input, "request.action") == "CREATE" }"#,
        )
        .unwrap();
        assert!(authorize(&engine, &ast, &input()).unwrap());
    }

    #[test]
    fn lookup_missing_key_yields_unit_not_error() {
        let engine = build_engine();
        let ast = compile(
            &engine,
            r#"fn authorize() { lookup(input, "request.nope") == () }"#,
        )
        .unwrap();
        assert!(authorize(&engine, &ast, &input()).unwrap());
    }

    #[test]
    fn lookup_consecutive_dots_is_hard_error() {
        let engine = build_engine();
        let ast = compile(
            &engine,
            r#"fn authorize() { lookup(input, "request..action") == () }"#,
        )
        .unwrap();
        assert!(authorize(&engine, &ast, &input()).is_err());
    }

    #[test]
    fn lookup_descends_array_by_index() {
        let engine = build_engine();
        let ast = compile(
            &engine,
            r#"fn authorize() { lookup(input, "tmf.relatedParty.0.role") == "Seller" }"#,
        )
        .unwrap();
        assert!(authorize(&engine, &ast, &input()).unwrap());
    }
}
