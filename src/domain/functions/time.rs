//! Time built-ins. Timestamps are integer epoch seconds (UTC); the clock
//! comes from the evaluation context.

use super::{arg_i64, arg_str, Arity, CallEnv, Category, FunctionRegistry, FunctionSpec, ParamType};
use crate::domain::error::EvaluationError;
use crate::domain::value::VariableValue;
use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc};

use ParamType::{Any, Int, String as Str};

fn spec(name: &str) -> FunctionSpec {
    FunctionSpec::new(name, Category::Time).returns("int")
}

fn to_datetime(name: &str, secs: i64) -> Result<DateTime<Utc>, EvaluationError> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| EvaluationError::function(name, format!("timestamp {} out of range", secs)))
}

/// Optional timestamp argument, defaulting to the context clock.
fn at(name: &str, args: &[VariableValue], env: &CallEnv<'_>) -> Result<DateTime<Utc>, EvaluationError> {
    match args.first() {
        Some(VariableValue::Int(secs)) => to_datetime(name, *secs),
        _ => Ok(env.now()),
    }
}

fn elapsed_since(name: &str, since: i64, env: &CallEnv<'_>) -> Result<i64, EvaluationError> {
    env.now()
        .timestamp()
        .checked_sub(since)
        .ok_or_else(|| EvaluationError::function(name, format!("time {} out of range", since)))
}

/// `"90s"`, `"15m"`, `"4h"`, `"1d"`, `"1w"` or combinations like `"1h30m"`.
pub fn parse_duration(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let mut total: i64 = 0;
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let unit = match ch {
            's' => 1,
            'm' => 60,
            'h' => 3_600,
            'd' => 86_400,
            'w' => 604_800,
            _ => return None,
        };
        let amount: i64 = digits.parse().ok()?;
        total = total.checked_add(amount.checked_mul(unit)?)?;
        digits.clear();
    }
    if !digits.is_empty() {
        return None;
    }
    Some(total)
}

fn parse_hhmm(name: &str, text: &str) -> Result<NaiveTime, EvaluationError> {
    NaiveTime::parse_from_str(text, "%H:%M")
        .map_err(|_| EvaluationError::function(name, format!("expected HH:MM, got '{}'", text)))
}

/// Whether `t` falls in `[start, end)`, wrapping past midnight when end <= start.
pub fn in_window(t: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start < end {
        start <= t && t < end
    } else {
        t >= start || t < end
    }
}

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.insert(
        spec("now").describe("Current time as epoch seconds"),
        |_, env| Ok(VariableValue::Int(env.now().timestamp())),
    );

    registry.insert(
        spec("timestamp")
            .params(&[Any])
            .describe("Epoch seconds from an RFC 3339 string or an int"),
        |args, _| match &args[0] {
            VariableValue::Int(secs) => Ok(VariableValue::Int(*secs)),
            VariableValue::Float(secs) if secs.is_finite() => Ok(VariableValue::Int(*secs as i64)),
            VariableValue::String(text) => DateTime::parse_from_rfc3339(text)
                .map(|dt| VariableValue::Int(dt.timestamp()))
                .map_err(|e| EvaluationError::function("timestamp", e.to_string())),
            other => Err(EvaluationError::type_mismatch("timestamp", "string or int", other.type_name())),
        },
    );

    registry.insert(
        spec("bar_age")
            .params(&[Int])
            .describe("Seconds elapsed since the given bar time"),
        |args, env| elapsed_since("bar_age", arg_i64(args, 0), env).map(VariableValue::Int),
    );

    registry.insert(
        spec("bars_since")
            .params(&[Int, Any])
            .describe("Whole bars elapsed since a time, for a timeframe in seconds or '15m' form"),
        |args, env| {
            let timeframe = match &args[1] {
                VariableValue::Int(secs) => *secs,
                VariableValue::String(text) => parse_duration(text).unwrap_or(0),
                other => {
                    return Err(EvaluationError::type_mismatch(
                        "bars_since",
                        "int or duration string",
                        other.type_name(),
                    ));
                }
            };
            if timeframe <= 0 {
                return Err(EvaluationError::function("bars_since", "timeframe must be positive"));
            }
            let elapsed = elapsed_since("bars_since", arg_i64(args, 0), env)?;
            Ok(VariableValue::Int(elapsed.div_euclid(timeframe)))
        },
    );

    registry.insert(
        spec("is_new_day")
            .params(&[Int, Int])
            .returns("bool")
            .describe("(prev_time, time) fall on different UTC dates"),
        |args, _| {
            let prev = to_datetime("is_new_day", arg_i64(args, 0))?;
            let curr = to_datetime("is_new_day", arg_i64(args, 1))?;
            Ok(VariableValue::Bool(prev.date_naive() != curr.date_naive()))
        },
    );

    registry.insert(
        spec("is_new_hour")
            .params(&[Int, Int])
            .returns("bool")
            .describe("(prev_time, time) fall in different UTC hours"),
        |args, _| {
            let (prev, curr) = (arg_i64(args, 0), arg_i64(args, 1));
            Ok(VariableValue::Bool(prev.div_euclid(3_600) != curr.div_euclid(3_600)))
        },
    );

    registry.insert(
        spec("hour")
            .params(&[Int])
            .arity(Arity::Range(0, 1))
            .describe("UTC hour of a time (default now)"),
        |args, env| Ok(VariableValue::Int(at("hour", args, env)?.hour() as i64)),
    );

    registry.insert(
        spec("minute")
            .params(&[Int])
            .arity(Arity::Range(0, 1))
            .describe("UTC minute of a time (default now)"),
        |args, env| Ok(VariableValue::Int(at("minute", args, env)?.minute() as i64)),
    );

    registry.insert(
        spec("day_of_week")
            .params(&[Int])
            .arity(Arity::Range(0, 1))
            .describe("0 = Monday .. 6 = Sunday (default now)"),
        |args, env| {
            Ok(VariableValue::Int(
                at("day_of_week", args, env)?.weekday().num_days_from_monday() as i64,
            ))
        },
    );

    registry.insert(
        spec("date")
            .params(&[Int])
            .arity(Arity::Range(0, 1))
            .returns("string")
            .describe("UTC date YYYY-MM-DD (default now)"),
        |args, env| {
            Ok(VariableValue::String(
                at("date", args, env)?.format("%Y-%m-%d").to_string(),
            ))
        },
    );

    registry.insert(
        spec("duration")
            .params(&[Str])
            .describe("Seconds in a duration such as '15m' or '1h30m'"),
        |args, _| {
            let text = arg_str(args, 0);
            parse_duration(text).map(VariableValue::Int).ok_or_else(|| {
                EvaluationError::function("duration", format!("invalid duration '{}'", text))
            })
        },
    );

    registry.insert(
        spec("in_session")
            .params(&[Str, Str, Int])
            .arity(Arity::Range(2, 3))
            .returns("bool")
            .describe("Time (default now) is within the UTC HH:MM session, wrapping midnight"),
        |args, env| {
            let start = parse_hhmm("in_session", arg_str(args, 0))?;
            let end = parse_hhmm("in_session", arg_str(args, 1))?;
            let t = at("in_session", &args[2..], env)?.time();
            Ok(VariableValue::Bool(in_window(t, start, end)))
        },
    );
}
