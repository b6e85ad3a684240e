//! Price and level built-ins.

use super::{
    arg_f64, arg_i64, arg_str, finite, nonzero, CallEnv, Category, FunctionRegistry, FunctionSpec,
    ParamType,
};
use crate::domain::error::EvaluationError;
use crate::domain::value::VariableValue;
use std::collections::BTreeMap;

use ParamType::{Number, String as Str};

const CANDLE_FIELDS: &[&str] = &["open", "high", "low", "close", "volume", "time"];

fn spec(name: &str) -> FunctionSpec {
    FunctionSpec::new(name, Category::Price).returns("bool")
}

fn compare(
    registry: &mut FunctionRegistry,
    name: &'static str,
    description: &'static str,
    test: fn(f64, f64) -> bool,
) {
    registry.insert(
        spec(name).params(&[Number, Number]).describe(description),
        move |args: &[VariableValue], _: &CallEnv<'_>| {
            Ok(VariableValue::Bool(test(arg_f64(args, 0), arg_f64(args, 1))))
        },
    );
}

fn side_arg(name: &str, args: &[VariableValue], index: usize) -> Result<bool, EvaluationError> {
    match arg_str(args, index).to_ascii_lowercase().as_str() {
        "long" | "buy" => Ok(true),
        "short" | "sell" => Ok(false),
        other => Err(EvaluationError::function(
            name,
            format!("side must be 'long' or 'short', got '{}'", other),
        )),
    }
}

/// `candle(0)` is the current bar, `candle(-1)` the previous one.
fn candle(args: &[VariableValue], env: &CallEnv<'_>) -> Result<VariableValue, EvaluationError> {
    let offset = arg_i64(args, 0);
    let prefix = match offset {
        0 => "chart.",
        -1 => "chart.prev_",
        _ => {
            return Err(EvaluationError::function(
                "candle",
                format!("offset {} unavailable; use 0 or -1", offset),
            ));
        }
    };
    let mut bar = BTreeMap::new();
    for field in CANDLE_FIELDS {
        if let Some(value) = env.get(&format!("{}{}", prefix, field)) {
            bar.insert(field.to_string(), value.clone());
        }
    }
    if bar.is_empty() {
        return Err(EvaluationError::function("candle", "no chart data in context"));
    }
    Ok(VariableValue::Map(bar))
}

pub(crate) fn register(registry: &mut FunctionRegistry) {
    compare(registry, "stop_hit_long", "Long stop reached: price <= stop", |p, s| p <= s);
    compare(registry, "stop_hit_short", "Short stop reached: price >= stop", |p, s| p >= s);
    compare(registry, "price_above_ema", "price > ema", |p, e| p > e);
    compare(registry, "price_below_ema", "price < ema", |p, e| p < e);
    compare(registry, "price_above_level", "price > level", |p, l| p > l);
    compare(registry, "price_below_level", "price < level", |p, l| p < l);

    registry.insert(
        spec("tp_hit")
            .params(&[Number, Number, Str])
            .describe("Take-profit reached for the given side"),
        |args, _| {
            let (price, target) = (arg_f64(args, 0), arg_f64(args, 1));
            let long = side_arg("tp_hit", args, 2)?;
            Ok(VariableValue::Bool(if long { price >= target } else { price <= target }))
        },
    );

    registry.insert(
        spec("cross_above")
            .params(&[Number, Number, Number, Number])
            .describe("Series a crossed above b: (prev_a, a, prev_b, b)"),
        |args, _| {
            let (prev_a, a, prev_b, b) =
                (arg_f64(args, 0), arg_f64(args, 1), arg_f64(args, 2), arg_f64(args, 3));
            Ok(VariableValue::Bool(prev_a <= prev_b && a > b))
        },
    );

    registry.insert(
        spec("cross_below")
            .params(&[Number, Number, Number, Number])
            .describe("Series a crossed below b: (prev_a, a, prev_b, b)"),
        |args, _| {
            let (prev_a, a, prev_b, b) =
                (arg_f64(args, 0), arg_f64(args, 1), arg_f64(args, 2), arg_f64(args, 3));
            Ok(VariableValue::Bool(prev_a >= prev_b && a < b))
        },
    );

    registry.insert(
        spec("distance_pct")
            .params(&[Number, Number])
            .returns("double")
            .describe("Absolute percent distance of a from reference b"),
        |args, _| {
            let (a, b) = (arg_f64(args, 0), arg_f64(args, 1));
            finite("distance_pct", ((a - b) / nonzero(b)?).abs() * 100.0)
        },
    );

    registry.insert(
        spec("within_pct")
            .params(&[Number, Number, Number])
            .describe("a lies within pct percent of b"),
        |args, _| {
            let (a, b, pct) = (arg_f64(args, 0), arg_f64(args, 1), arg_f64(args, 2));
            let distance = ((a - b) / nonzero(b)?).abs() * 100.0;
            Ok(VariableValue::Bool(distance <= pct))
        },
    );

    registry.insert(
        spec("atr_stop_long")
            .params(&[Number, Number, Number])
            .returns("double")
            .describe("price - atr * multiplier"),
        |args, _| finite("atr_stop_long", arg_f64(args, 0) - arg_f64(args, 1) * arg_f64(args, 2)),
    );

    registry.insert(
        spec("atr_stop_short")
            .params(&[Number, Number, Number])
            .returns("double")
            .describe("price + atr * multiplier"),
        |args, _| finite("atr_stop_short", arg_f64(args, 0) + arg_f64(args, 1) * arg_f64(args, 2)),
    );

    registry.insert(
        spec("risk_reward")
            .params(&[Number, Number, Number])
            .returns("double")
            .describe("Reward-to-risk ratio for (entry, stop, target)"),
        |args, _| {
            let (entry, stop, target) = (arg_f64(args, 0), arg_f64(args, 1), arg_f64(args, 2));
            finite("risk_reward", (target - entry).abs() / nonzero((entry - stop).abs())?)
        },
    );

    registry.insert(
        spec("position_size")
            .params(&[Number, Number, Number, Number])
            .returns("double")
            .describe("Units for (balance, risk_pct, entry, stop)"),
        |args, _| {
            let (balance, risk_pct, entry, stop) =
                (arg_f64(args, 0), arg_f64(args, 1), arg_f64(args, 2), arg_f64(args, 3));
            let risk = balance * risk_pct / 100.0;
            finite("position_size", risk / nonzero((entry - stop).abs())?)
        },
    );

    registry.insert(
        spec("pnl_pct")
            .params(&[Number, Number, Str])
            .returns("double")
            .describe("Percent profit of price against entry for the side"),
        |args, _| {
            let (entry, price) = (arg_f64(args, 0), arg_f64(args, 1));
            let long = side_arg("pnl_pct", args, 2)?;
            let raw = (price - entry) / nonzero(entry)? * 100.0;
            finite("pnl_pct", if long { raw } else { -raw })
        },
    );

    registry.insert(
        spec("candle")
            .params(&[ParamType::Int])
            .returns("map")
            .describe("Bar at offset (0 current, -1 previous) from chart data"),
        candle,
    );
}

#[cfg(test)]
mod tests {
    use crate::domain::context::EvaluationContext;
    use crate::domain::error::EvaluationError;
    use crate::domain::functions::test_support::*;
    use approx::assert_relative_eq;

    #[test]
    fn stops_and_targets() {
        assert_eq!(call("stop_hit_long", vec![f(99.0), f(100.0)]), Ok(b(true)));
        assert_eq!(call("stop_hit_short", vec![f(99.0), f(100.0)]), Ok(b(false)));
        assert_eq!(call("tp_hit", vec![f(110.0), f(105.0), s("long")]), Ok(b(true)));
        assert_eq!(call("tp_hit", vec![f(110.0), f(105.0), s("short")]), Ok(b(false)));
        assert!(matches!(
            call("tp_hit", vec![f(1.0), f(1.0), s("sideways")]),
            Err(EvaluationError::Function { .. })
        ));
    }

    #[test]
    fn levels_and_crosses() {
        assert_eq!(call("price_above_ema", vec![i(101), f(100.5)]), Ok(b(true)));
        assert_eq!(call("price_below_level", vec![i(101), f(100.5)]), Ok(b(false)));
        assert_eq!(
            call("cross_above", vec![f(9.0), f(11.0), f(10.0), f(10.0)]),
            Ok(b(true))
        );
        assert_eq!(
            call("cross_below", vec![f(9.0), f(11.0), f(10.0), f(10.0)]),
            Ok(b(false))
        );
    }

    #[test]
    fn sizing() {
        let rr = call("risk_reward", vec![f(100.0), f(95.0), f(115.0)]).unwrap();
        assert_relative_eq!(rr.as_f64().unwrap(), 3.0);
        let size = call("position_size", vec![f(10_000.0), f(1.0), f(100.0), f(98.0)]).unwrap();
        assert_relative_eq!(size.as_f64().unwrap(), 50.0);
        assert_eq!(
            call("risk_reward", vec![f(100.0), f(100.0), f(110.0)]),
            Err(EvaluationError::DivisionByZero)
        );
        assert_eq!(call("atr_stop_long", vec![f(100.0), f(2.0), f(1.5)]), Ok(f(97.0)));
        assert_eq!(call("pnl_pct", vec![f(100.0), f(90.0), s("short")]), Ok(f(10.0)));
    }

    #[test]
    fn distance() {
        assert_eq!(call("within_pct", vec![f(101.0), f(100.0), f(1.0)]), Ok(b(true)));
        assert_relative_eq!(
            call("distance_pct", vec![f(90.0), f(100.0)]).unwrap().as_f64().unwrap(),
            10.0
        );
    }

    #[test]
    fn candle_reads_chart_namespace() {
        let mut ctx = EvaluationContext::new();
        ctx.insert("chart.close", 101.0);
        ctx.insert("chart.open", 100.0);
        ctx.insert("chart.prev_close", 99.5);
        let current = call_in(&ctx, "candle", vec![i(0)]).unwrap();
        assert_eq!(current.as_map().unwrap()["close"], f(101.0));
        let prev = call_in(&ctx, "candle", vec![i(-1)]).unwrap();
        assert_eq!(prev.as_map().unwrap()["close"], f(99.5));
        assert!(call_in(&ctx, "candle", vec![i(-2)]).is_err());
        assert!(call("candle", vec![i(0)]).is_err());
    }
}
