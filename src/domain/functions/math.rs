//! Math and normalization built-ins.

use super::{
    arg_f64, finite, nonzero, Arity, CallEnv, Category, FunctionRegistry, FunctionSpec, ParamType,
};
use crate::domain::error::{ArgumentError, EvaluationError};
use crate::domain::value::VariableValue;

use ParamType::{Any, Number};

fn spec(name: &str) -> FunctionSpec {
    FunctionSpec::new(name, Category::Math).returns("double")
}

/// Numbers from either `f(a, b, c)` or `f([a, b, c])`.
fn numbers<'a>(name: &str, args: &'a [VariableValue]) -> Result<Vec<&'a VariableValue>, EvaluationError> {
    let items: Vec<&VariableValue> = match args {
        [VariableValue::List(items)] => items.iter().collect(),
        _ => args.iter().collect(),
    };
    if items.is_empty() {
        return Err(EvaluationError::function(name, "needs at least one value"));
    }
    for item in &items {
        if !item.is_number() {
            return Err(ArgumentError {
                function: name.to_string(),
                expected: "numbers".to_string(),
                actual: item.type_name().to_string(),
            }
            .into());
        }
    }
    Ok(items)
}

fn extreme(
    name: &str,
    args: &[VariableValue],
    pick_left: fn(f64, f64) -> bool,
) -> Result<VariableValue, EvaluationError> {
    let items = numbers(name, args)?;
    let mut best = items[0];
    for &item in &items[1..] {
        let (a, b) = (item.as_f64().unwrap_or(f64::NAN), best.as_f64().unwrap_or(f64::NAN));
        if pick_left(a, b) {
            best = item;
        }
    }
    Ok(best.clone())
}

pub(crate) fn min_of(name: &str, args: &[VariableValue]) -> Result<VariableValue, EvaluationError> {
    extreme(name, args, |a, b| a < b)
}

pub(crate) fn max_of(name: &str, args: &[VariableValue]) -> Result<VariableValue, EvaluationError> {
    extreme(name, args, |a, b| a > b)
}

fn unary(
    registry: &mut FunctionRegistry,
    name: &'static str,
    description: &'static str,
    op: fn(f64) -> f64,
) {
    registry.insert(
        spec(name).params(&[Number]).describe(description),
        move |args: &[VariableValue], _: &CallEnv<'_>| finite(name, op(arg_f64(args, 0))),
    );
}

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.insert(
        spec("abs").params(&[Number]).returns("number").describe("Absolute value"),
        |args, _| match &args[0] {
            VariableValue::Int(i) => i
                .checked_abs()
                .map(VariableValue::Int)
                .ok_or_else(|| EvaluationError::type_mismatch("abs", "int64 range", "overflow")),
            other => Ok(VariableValue::Float(other.as_f64().unwrap_or(f64::NAN).abs())),
        },
    );

    registry.insert(
        spec("sign").params(&[Number]).returns("int").describe("-1, 0 or 1"),
        |args, _| {
            let x = arg_f64(args, 0);
            let sign = if x > 0.0 {
                1
            } else if x < 0.0 {
                -1
            } else {
                0
            };
            Ok(VariableValue::Int(sign))
        },
    );

    registry.insert(
        spec("min")
            .params(&[Any])
            .arity(Arity::AtLeast(1))
            .returns("number")
            .describe("Smallest of the arguments or of a single list"),
        |args, _| min_of("min", args),
    );

    registry.insert(
        spec("max")
            .params(&[Any])
            .arity(Arity::AtLeast(1))
            .returns("number")
            .describe("Largest of the arguments or of a single list"),
        |args, _| max_of("max", args),
    );

    registry.insert(
        spec("round")
            .params(&[Number, ParamType::Int])
            .arity(Arity::Range(1, 2))
            .describe("Round half away from zero to the given decimals"),
        |args, _| {
            let x = arg_f64(args, 0);
            let digits = args.get(1).and_then(VariableValue::as_i64).unwrap_or(0);
            if !(0..=12).contains(&digits) {
                return Err(EvaluationError::function("round", "decimals must be between 0 and 12"));
            }
            let factor = 10f64.powi(digits as i32);
            finite("round", (x * factor).round() / factor)
        },
    );

    unary(registry, "floor", "Largest whole number not above x", f64::floor);
    unary(registry, "ceil", "Smallest whole number not below x", f64::ceil);
    unary(registry, "exp", "e raised to x", f64::exp);

    registry.insert(
        spec("sqrt").params(&[Number]).describe("Square root"),
        |args, _| {
            let x = arg_f64(args, 0);
            if x < 0.0 {
                return Err(EvaluationError::function("sqrt", "negative input"));
            }
            finite("sqrt", x.sqrt())
        },
    );

    registry.insert(
        spec("pow").params(&[Number, Number]).describe("x raised to y"),
        |args, _| finite("pow", arg_f64(args, 0).powf(arg_f64(args, 1))),
    );

    registry.insert(
        spec("log").params(&[Number]).describe("Natural logarithm"),
        |args, _| {
            let x = arg_f64(args, 0);
            if x <= 0.0 {
                return Err(EvaluationError::function("log", "input must be positive"));
            }
            finite("log", x.ln())
        },
    );

    registry.insert(
        spec("log10").params(&[Number]).describe("Base-10 logarithm"),
        |args, _| {
            let x = arg_f64(args, 0);
            if x <= 0.0 {
                return Err(EvaluationError::function("log10", "input must be positive"));
            }
            finite("log10", x.log10())
        },
    );

    registry.insert(
        spec("clamp")
            .params(&[Number, Number, Number])
            .describe("Limit x to [lo, hi]"),
        |args, _| {
            let (x, lo, hi) = (arg_f64(args, 0), arg_f64(args, 1), arg_f64(args, 2));
            if lo > hi {
                return Err(EvaluationError::function("clamp", "lower bound exceeds upper bound"));
            }
            finite("clamp", x.clamp(lo, hi))
        },
    );

    registry.insert(
        spec("pct_change")
            .params(&[Number, Number])
            .describe("Percent change from old to new"),
        |args, _| {
            let (old, new) = (arg_f64(args, 0), arg_f64(args, 1));
            finite("pct_change", (new - old) / nonzero(old)? * 100.0)
        },
    );

    registry.insert(
        spec("pct_from_level")
            .params(&[Number, Number])
            .describe("Percent distance of price from level (positive above)"),
        |args, _| {
            let (price, level) = (arg_f64(args, 0), arg_f64(args, 1));
            finite("pct_from_level", (price - level) / nonzero(level)? * 100.0)
        },
    );

    registry.insert(
        spec("level_at_pct")
            .params(&[Number, Number])
            .describe("Level offset from base by pct percent"),
        |args, _| {
            let (base, pct) = (arg_f64(args, 0), arg_f64(args, 1));
            finite("level_at_pct", base * (1.0 + pct / 100.0))
        },
    );

    registry.insert(
        spec("retracement")
            .params(&[Number, Number, Number])
            .describe("Price retracing a start-to-end swing by ratio"),
        |args, _| {
            let (start, end, ratio) = (arg_f64(args, 0), arg_f64(args, 1), arg_f64(args, 2));
            finite("retracement", end - (end - start) * ratio)
        },
    );

    registry.insert(
        spec("extension")
            .params(&[Number, Number, Number])
            .describe("Price projecting a start-to-end swing by ratio"),
        |args, _| {
            let (start, end, ratio) = (arg_f64(args, 0), arg_f64(args, 1), arg_f64(args, 2));
            finite("extension", start + (end - start) * ratio)
        },
    );

    registry.insert(
        spec("between")
            .params(&[Number, Number, Number])
            .returns("bool")
            .describe("lo <= x <= hi"),
        |args, _| {
            let (x, lo, hi) = (arg_f64(args, 0), arg_f64(args, 1), arg_f64(args, 2));
            Ok(VariableValue::Bool(lo <= x && x <= hi))
        },
    );

    registry.insert(
        spec("normalize")
            .params(&[Number, Number, Number])
            .describe("Map x from [lo, hi] onto [0, 1]"),
        |args, _| {
            let (x, lo, hi) = (arg_f64(args, 0), arg_f64(args, 1), arg_f64(args, 2));
            finite("normalize", (x - lo) / nonzero(hi - lo)?)
        },
    );

    registry.insert(
        spec("isnan").params(&[Any]).returns("bool").describe("True for NaN or null"),
        |args, _| {
            Ok(VariableValue::Bool(match &args[0] {
                VariableValue::Float(f) => f.is_nan(),
                VariableValue::Null => true,
                _ => false,
            }))
        },
    );

    registry.insert(
        spec("nz")
            .params(&[Any, Any])
            .arity(Arity::Range(1, 2))
            .returns("any")
            .describe("Replace NaN or null with a fallback (default 0)"),
        |args, _| {
            let missing = match &args[0] {
                VariableValue::Float(f) => !f.is_finite(),
                VariableValue::Null => true,
                _ => false,
            };
            if missing {
                Ok(args.get(1).cloned().unwrap_or(VariableValue::Int(0)))
            } else {
                Ok(args[0].clone())
            }
        },
    );

    registry.insert(
        spec("approx_eq")
            .params(&[Number, Number, Number])
            .arity(Arity::Range(2, 3))
            .returns("bool")
            .describe("|a - b| <= tolerance (default 1e-9)"),
        |args, _| {
            let tolerance = args.get(2).and_then(VariableValue::as_f64).unwrap_or(1e-9);
            Ok(VariableValue::Bool(
                (arg_f64(args, 0) - arg_f64(args, 1)).abs() <= tolerance,
            ))
        },
    );
}
