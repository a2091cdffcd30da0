//! Environment construction for condition evaluation.
//!
//! Every reconciliation pass builds a fresh context from the object's
//! declared targets: the interpreter's base library, the ordering
//! extensions (`sort`, `pair`, `reverseList`), one free variable per
//! target included in evaluation, and the always-present `time` variable
//! holding the evaluation instant. There is no mutable global
//! registration state, so previously compiled forms stay valid across
//! passes.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use cel_interpreter::objects::{Key, Map};
use cel_interpreter::{Context, ExecutionError, FunctionContext, ResolveResult, Value};
use chrono::{DateTime, Utc};

use reaper_api::{TargetState, TargetStatus, RESERVED_CONTEXT_NAME};

use crate::compare::{self, kind, SortOrder};
use crate::error::{Error, Result};

/// Build the evaluation context for one pass.
///
/// Rejects target sets that shadow the reserved `time` variable or declare
/// the same name twice; both would make the condition environment
/// ambiguous.
pub fn build_context(targets: &[TargetStatus], now: DateTime<Utc>) -> Result<Context<'static>> {
    let mut ctx = Context::default();
    register_extensions(&mut ctx);

    let mut seen = BTreeSet::new();
    for target in targets.iter().filter(|t| t.include_when_evaluating) {
        if target.name == RESERVED_CONTEXT_NAME {
            return Err(Error::environment(format!(
                "target name {RESERVED_CONTEXT_NAME:?} shadows the evaluation instant"
            )));
        }
        if !seen.insert(target.name.clone()) {
            return Err(Error::environment(format!(
                "duplicate target name {:?}",
                target.name
            )));
        }
        ctx.add_variable_from_value(target.name.clone(), state_value(&target.state));
    }
    ctx.add_variable_from_value(RESERVED_CONTEXT_NAME, Value::Timestamp(now.fixed_offset()));
    Ok(ctx)
}

/// Bind the ordering extensions into a context.
pub fn register_extensions(ctx: &mut Context) {
    ctx.add_function("sort", sort);
    ctx.add_function("pair", pair);
    ctx.add_function("reverseList", reverse_list);
}

/// Convert a resolved target snapshot into a context value: a single
/// record becomes a map, a collection becomes a plain list of maps.
pub fn state_value(state: &TargetState) -> Value {
    match state {
        TargetState::Object(record) => json_to_value(record),
        TargetState::Collection(items) => {
            Value::List(Arc::new(items.iter().map(json_to_value).collect()))
        }
    }
}

/// Convert a JSON snapshot into an interpreter value.
pub fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::UInt(u)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::String(Arc::new(s.clone())),
        serde_json::Value::Array(items) => {
            Value::List(Arc::new(items.iter().map(json_to_value).collect()))
        }
        serde_json::Value::Object(fields) => {
            let map: HashMap<Key, Value> = fields
                .iter()
                .map(|(key, value)| (Key::String(Arc::new(key.clone())), json_to_value(value)))
                .collect();
            Value::Map(Map { map: Arc::new(map) })
        }
    }
}

fn list_items(value: Value) -> std::result::Result<Vec<Value>, Error> {
    match value {
        Value::List(items) => Ok(items.as_ref().clone()),
        other => Err(Error::not_a_list(kind(&other))),
    }
}

fn sort(ftx: &FunctionContext, items: Value, order: Arc<String>) -> ResolveResult {
    let order: SortOrder = order
        .parse()
        .map_err(|e: Error| function_error(ftx, e))?;
    let items = list_items(items).map_err(|e| function_error(ftx, e))?;
    let sorted = compare::sort(items, order).map_err(|e| function_error(ftx, e))?;
    Ok(Value::List(Arc::new(sorted)))
}

fn pair(ftx: &FunctionContext, order: Value, value: Value) -> ResolveResult {
    compare::make_pair(order, value).map_err(|e| function_error(ftx, e))
}

fn reverse_list(ftx: &FunctionContext, items: Value) -> ResolveResult {
    let items = list_items(items).map_err(|e| function_error(ftx, e))?;
    Ok(Value::List(Arc::new(compare::reverse_list(items))))
}

fn function_error(ftx: &FunctionContext, error: Error) -> ExecutionError {
    ExecutionError::function_error(ftx.name.as_str(), error)
}
