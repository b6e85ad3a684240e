//! Collection built-ins.
//!
//! `has`, `exists`, `exists_one`, `map` and `filter` are macros expanded by
//! the parser; they are registered here so name checks and help text see
//! them. `all` and `any` work both as macros and over a list of bools.

use super::math::{max_of, min_of};
use super::{arg_i64, arg_list, Arity, CallEnv, Category, FunctionRegistry, FunctionSpec, ParamType};
use crate::domain::error::EvaluationError;
use crate::domain::value::VariableValue;
use std::cmp::Ordering;
use std::collections::HashSet;

use ParamType::{Any, Int, List};

fn spec(name: &str) -> FunctionSpec {
    FunctionSpec::new(name, Category::Collection).returns("list")
}

fn bools(name: &str, items: &[VariableValue]) -> Result<Vec<bool>, EvaluationError> {
    items
        .iter()
        .map(|v| {
            v.as_bool()
                .ok_or_else(|| EvaluationError::type_mismatch(name, "list of bool", v.type_name()))
        })
        .collect()
}

fn sorted(items: &[VariableValue], env: &CallEnv<'_>) -> Result<Vec<VariableValue>, EvaluationError> {
    env.check_deadline()?;
    let mut out = items.to_vec();
    if items.iter().all(VariableValue::is_number) {
        out.sort_by(|a, b| {
            a.as_f64()
                .unwrap_or(f64::NAN)
                .total_cmp(&b.as_f64().unwrap_or(f64::NAN))
        });
    } else if items.iter().all(|v| v.as_str().is_some()) {
        out.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
    } else {
        return Err(EvaluationError::type_mismatch(
            "sort",
            "all numbers or all strings",
            "mixed list",
        ));
    }
    env.check_deadline()?;
    Ok(out)
}

/// Hashable identity of a scalar under `loose_eq`: integral floats key as
/// ints so `1` and `1.0` collapse. Lists and maps have no key.
#[derive(PartialEq, Eq, Hash)]
enum ScalarKey<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(&'a str),
}

fn scalar_key(value: &VariableValue) -> Option<ScalarKey<'_>> {
    match value {
        VariableValue::Null => Some(ScalarKey::Null),
        VariableValue::Bool(b) => Some(ScalarKey::Bool(*b)),
        VariableValue::Int(i) => Some(ScalarKey::Int(*i)),
        VariableValue::Float(f) => {
            let truncated = *f as i64;
            if f.fract() == 0.0 && truncated as f64 == *f {
                Some(ScalarKey::Int(truncated))
            } else {
                Some(ScalarKey::Float(f.to_bits()))
            }
        }
        VariableValue::String(s) => Some(ScalarKey::Str(s)),
        VariableValue::List(_) | VariableValue::Map(_) => None,
    }
}

fn distinct(items: &[VariableValue], env: &CallEnv<'_>) -> Result<Vec<VariableValue>, EvaluationError> {
    let mut seen = HashSet::new();
    let mut composites: Vec<&VariableValue> = Vec::new();
    let mut out = Vec::new();
    for (step, item) in items.iter().enumerate() {
        env.checkpoint(step)?;
        let fresh = match scalar_key(item) {
            Some(key) => seen.insert(key),
            None => {
                let repeated = composites.iter().any(|c| c.loose_eq(item));
                if !repeated {
                    composites.push(item);
                }
                !repeated
            }
        };
        if fresh {
            out.push(item.clone());
        }
    }
    Ok(out)
}

/// Resolve a possibly negative index against `len`, clamped to `[0, len]`.
fn bound(index: i64, len: usize) -> usize {
    let len = len as i64;
    let resolved = if index < 0 { len + index } else { index };
    resolved.clamp(0, len) as usize
}

fn sum(items: &[VariableValue], env: &CallEnv<'_>) -> Result<VariableValue, EvaluationError> {
    let mut int_total: Option<i64> = Some(0);
    let mut float_total = 0.0;
    for (step, item) in items.iter().enumerate() {
        env.checkpoint(step)?;
        match item {
            VariableValue::Int(i) => {
                int_total = int_total.and_then(|t| t.checked_add(*i));
                float_total += *i as f64;
            }
            VariableValue::Float(f) => {
                int_total = None;
                float_total += f;
            }
            other => {
                return Err(EvaluationError::type_mismatch("sum", "list of numbers", other.type_name()));
            }
        }
    }
    let all_int = items.iter().all(|v| matches!(v, VariableValue::Int(_)));
    match (all_int, int_total) {
        (true, Some(total)) => Ok(VariableValue::Int(total)),
        (true, None) => Err(EvaluationError::type_mismatch("sum", "int64 range", "overflow")),
        _ => Ok(VariableValue::Float(float_total)),
    }
}

fn non_empty<'a>(name: &str, items: &'a [VariableValue]) -> Result<&'a [VariableValue], EvaluationError> {
    if items.is_empty() {
        Err(EvaluationError::function(name, "empty list"))
    } else {
        Ok(items)
    }
}

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.insert(
        spec("size")
            .params(&[Any])
            .returns("int")
            .describe("Length of a list, map or string"),
        |args, _| match &args[0] {
            VariableValue::List(items) => Ok(VariableValue::Int(items.len() as i64)),
            VariableValue::Map(map) => Ok(VariableValue::Int(map.len() as i64)),
            VariableValue::String(s) => Ok(VariableValue::Int(s.chars().count() as i64)),
            other => Err(EvaluationError::type_mismatch("size", "list, map or string", other.type_name())),
        },
    );

    for (name, description) in [
        ("has", "Field presence test: has(trade.side)"),
        ("exists", "list.exists(x, predicate): any element matches"),
        ("exists_one", "list.exists_one(x, predicate): exactly one element matches"),
        ("map", "list.map(x, expression): transform each element"),
        ("filter", "list.filter(x, predicate): keep matching elements"),
    ] {
        registry.insert(
            spec(name).arity(Arity::AtLeast(0)).returns("any").describe(description).macro_form(),
            |_, _| Ok(VariableValue::Null),
        );
    }

    registry.insert(
        spec("all")
            .params(&[List])
            .returns("bool")
            .describe("Every bool in the list is true; also list.all(x, predicate)"),
        |args, _| Ok(VariableValue::Bool(bools("all", arg_list(args, 0))?.into_iter().all(|b| b))),
    );

    registry.insert(
        spec("any")
            .params(&[List])
            .returns("bool")
            .describe("Some bool in the list is true; also list.any(x, predicate)"),
        |args, _| Ok(VariableValue::Bool(bools("any", arg_list(args, 0))?.into_iter().any(|b| b))),
    );

    registry.insert(
        spec("sum").params(&[List]).returns("number").describe("Sum of numbers"),
        |args, env| sum(arg_list(args, 0), env),
    );

    registry.insert(
        spec("avg").params(&[List]).returns("double").describe("Arithmetic mean"),
        |args, env| {
            let items = non_empty("avg", arg_list(args, 0))?;
            let total = sum(items, env)?.as_f64().unwrap_or(f64::NAN);
            Ok(VariableValue::Float(total / items.len() as f64))
        },
    );

    registry.insert(
        spec("first").params(&[List]).returns("any").describe("First element"),
        |args, _| Ok(non_empty("first", arg_list(args, 0))?[0].clone()),
    );

    registry.insert(
        spec("last").params(&[List]).returns("any").describe("Last element"),
        |args, _| {
            let items = non_empty("last", arg_list(args, 0))?;
            Ok(items[items.len() - 1].clone())
        },
    );

    registry.insert(
        spec("indexOf")
            .params(&[Any, Any])
            .returns("int")
            .describe("Position of an element or substring, -1 when absent"),
        |args, _| match (&args[0], &args[1]) {
            (VariableValue::List(items), needle) => Ok(VariableValue::Int(
                items
                    .iter()
                    .position(|v| v.loose_eq(needle))
                    .map(|p| p as i64)
                    .unwrap_or(-1),
            )),
            (VariableValue::String(s), VariableValue::String(sub)) => Ok(VariableValue::Int(
                s.find(sub.as_str())
                    .map(|byte| s[..byte].chars().count() as i64)
                    .unwrap_or(-1),
            )),
            (haystack, _) => Err(EvaluationError::type_mismatch(
                "indexOf",
                "list or string",
                haystack.type_name(),
            )),
        },
    );

    registry.insert(
        spec("slice")
            .params(&[List, Int, Int])
            .arity(Arity::Range(2, 3))
            .describe("Elements [start, end); negative positions count from the end"),
        |args, _| {
            let items = arg_list(args, 0);
            let start = bound(arg_i64(args, 1), items.len());
            let end = if args.len() > 2 {
                bound(arg_i64(args, 2), items.len())
            } else {
                items.len()
            };
            if start >= end {
                return Ok(VariableValue::List(Vec::new()));
            }
            Ok(VariableValue::List(items[start..end].to_vec()))
        },
    );

    registry.insert(
        spec("distinct").params(&[List]).describe("Drop repeated elements, keeping first occurrences"),
        |args, env| distinct(arg_list(args, 0), env).map(VariableValue::List),
    );

    registry.insert(
        spec("sort").params(&[List]).describe("Ascending order of numbers or strings"),
        |args, env| sorted(arg_list(args, 0), env).map(VariableValue::List),
    );

    registry.insert(
        spec("reverse").params(&[List]).describe("Reversed copy"),
        |args, _| {
            let mut items = arg_list(args, 0).to_vec();
            items.reverse();
            Ok(VariableValue::List(items))
        },
    );

    registry.insert(
        spec("highest").params(&[List]).returns("number").describe("Largest number in a list"),
        |args, _| max_of("highest", args),
    );

    registry.insert(
        spec("lowest").params(&[List]).returns("number").describe("Smallest number in a list"),
        |args, _| min_of("lowest", args),
    );

    registry.insert(
        spec("concat")
            .params(&[List])
            .arity(Arity::AtLeast(1))
            .describe("Lists joined end to end"),
        |args, _| {
            let mut out = Vec::new();
            for i in 0..args.len() {
                out.extend_from_slice(arg_list(args, i));
            }
            Ok(VariableValue::List(out))
        },
    );

    registry.insert(
        spec("count")
            .params(&[List, Any])
            .returns("int")
            .describe("Occurrences of a value in a list"),
        |args, env| {
            let needle = &args[1];
            let mut n = 0i64;
            for (step, item) in arg_list(args, 0).iter().enumerate() {
                env.checkpoint(step)?;
                if item.loose_eq(needle) {
                    n += 1;
                }
            }
            Ok(VariableValue::Int(n))
        },
    );
}

/// Ordering used by `sort`, exposed for the evaluator's relational operators.
pub(crate) fn compare_values(a: &VariableValue, b: &VariableValue) -> Option<Ordering> {
    match (a, b) {
        (VariableValue::Int(x), VariableValue::Int(y)) => Some(x.cmp(y)),
        (x, y) if x.is_number() && y.is_number() => {
            x.as_f64().unwrap_or(f64::NAN).partial_cmp(&y.as_f64().unwrap_or(f64::NAN))
        }
        (VariableValue::String(x), VariableValue::String(y)) => Some(x.cmp(y)),
        (VariableValue::Bool(x), VariableValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
