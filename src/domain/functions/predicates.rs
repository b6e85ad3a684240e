//! Trade and status predicates.
//!
//! Trade predicates accept the `trade` namespace map explicitly
//! (`is_long(trade)`) or read `trade.*` from the context when called with no
//! arguments. A missing trade source reads as flat.

use super::{Arity, CallEnv, Category, FunctionRegistry, FunctionSpec, ParamType};
use crate::domain::error::EvaluationError;
use crate::domain::value::VariableValue;

fn trade_field(args: &[VariableValue], env: &CallEnv<'_>, field: &str) -> Option<VariableValue> {
    match args.first() {
        Some(VariableValue::Map(map)) => map.get(field).cloned(),
        _ => env.get(&format!("trade.{}", field)).cloned(),
    }
}

fn side(args: &[VariableValue], env: &CallEnv<'_>) -> String {
    trade_field(args, env, "side")
        .and_then(|v| v.as_str().map(str::to_ascii_lowercase))
        .unwrap_or_else(|| "flat".to_string())
}

fn is_open(args: &[VariableValue], env: &CallEnv<'_>) -> bool {
    match trade_field(args, env, "is_open") {
        Some(VariableValue::Bool(open)) => open,
        _ => matches!(side(args, env).as_str(), "long" | "short"),
    }
}

fn trade_spec(name: &str, description: &'static str) -> FunctionSpec {
    FunctionSpec::new(name, Category::Predicate)
        .params(&[ParamType::Map])
        .arity(Arity::Range(0, 1))
        .returns("bool")
        .describe(description)
}

/// Label used by `in_regime`: `regime.current` from the context, then the host.
fn current_regime(env: &CallEnv<'_>) -> Option<String> {
    if let Some(VariableValue::String(label)) = env.get("regime.current") {
        return Some(label.clone());
    }
    env.host().map(|host| host.current_regime())
}

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.insert(
        trade_spec("is_trade_open", "A position is currently open"),
        |args, env| Ok(VariableValue::Bool(is_open(args, env))),
    );

    registry.insert(
        trade_spec("is_long", "Open position is long"),
        |args, env| Ok(VariableValue::Bool(is_open(args, env) && side(args, env) == "long")),
    );

    registry.insert(
        trade_spec("is_short", "Open position is short"),
        |args, env| Ok(VariableValue::Bool(is_open(args, env) && side(args, env) == "short")),
    );

    registry.insert(
        trade_spec("is_flat", "No open position"),
        |args, env| Ok(VariableValue::Bool(!is_open(args, env))),
    );

    registry.insert(
        trade_spec("is_profitable", "Open position shows unrealized profit"),
        |args, env| {
            let pnl = trade_field(args, env, "pnl_pct")
                .or_else(|| trade_field(args, env, "unrealized_pnl"))
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            Ok(VariableValue::Bool(is_open(args, env) && pnl > 0.0))
        },
    );

    registry.insert(
        FunctionSpec::new("in_regime", Category::Predicate)
            .params(&[ParamType::Any])
            .returns("bool")
            .describe("Current regime equals the label or is one of a list of labels"),
        |args, env| {
            let Some(current) = current_regime(env) else {
                return Ok(VariableValue::Bool(false));
            };
            match &args[0] {
                VariableValue::String(label) => Ok(VariableValue::Bool(*label == current)),
                VariableValue::List(labels) => Ok(VariableValue::Bool(
                    labels.iter().any(|l| l.as_str() == Some(current.as_str())),
                )),
                other => Err(EvaluationError::type_mismatch(
                    "in_regime",
                    "string or list",
                    other.type_name(),
                )),
            }
        },
    );
}

#[cfg(test)]
mod tests {
    use crate::domain::context::EvaluationContext;
    use crate::domain::functions::test_support::*;
    use crate::domain::value::VariableValue;
    use std::collections::BTreeMap;

    fn trade(side: &str, pnl: f64) -> VariableValue {
        let mut map = BTreeMap::new();
        map.insert("side".to_string(), s(side));
        map.insert("pnl_pct".to_string(), f(pnl));
        VariableValue::Map(map)
    }

    #[test]
    fn explicit_trade_map() {
        assert_eq!(call("is_trade_open", vec![trade("long", 1.0)]), Ok(b(true)));
        assert_eq!(call("is_long", vec![trade("long", 1.0)]), Ok(b(true)));
        assert_eq!(call("is_short", vec![trade("long", 1.0)]), Ok(b(false)));
        assert_eq!(call("is_flat", vec![trade("flat", 0.0)]), Ok(b(true)));
        assert_eq!(call("is_profitable", vec![trade("short", 2.0)]), Ok(b(true)));
        assert_eq!(call("is_profitable", vec![trade("short", -2.0)]), Ok(b(false)));
    }

    #[test]
    fn context_trade_namespace() {
        let mut ctx = EvaluationContext::new();
        ctx.insert("trade.side", "SHORT");
        ctx.insert("trade.is_open", true);
        assert_eq!(call_in(&ctx, "is_short", vec![]), Ok(b(true)));
        assert_eq!(call_in(&ctx, "is_trade_open", vec![]), Ok(b(true)));
    }

    #[test]
    fn headless_reads_as_flat() {
        assert_eq!(call("is_trade_open", vec![]), Ok(b(false)));
        assert_eq!(call("is_flat", vec![]), Ok(b(true)));
    }

    #[test]
    fn in_regime_from_context() {
        let mut ctx = EvaluationContext::new();
        ctx.insert("regime.current", "TREND_BULL");
        assert_eq!(call_in(&ctx, "in_regime", vec![s("TREND_BULL")]), Ok(b(true)));
        assert_eq!(
            call_in(&ctx, "in_regime", vec![list(vec![s("RANGE"), s("TREND_BULL")])]),
            Ok(b(true))
        );
        assert_eq!(call_in(&ctx, "in_regime", vec![s("RANGE")]), Ok(b(false)));
    }

    #[test]
    fn in_regime_without_source_is_false() {
        assert_eq!(call("in_regime", vec![s("RANGE")]), Ok(b(false)));
        assert!(call("in_regime", vec![i(1)]).is_ok());
    }
}
