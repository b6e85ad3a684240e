//! Type conversion and string built-ins. String positions count characters,
//! not bytes.

use super::{arg_i64, arg_list, arg_str, Arity, Category, FunctionRegistry, FunctionSpec, ParamType};
use crate::domain::error::EvaluationError;
use crate::domain::value::VariableValue;

use ParamType::{Any, Int, List, String as Str};

fn spec(name: &str) -> FunctionSpec {
    FunctionSpec::new(name, Category::String).returns("string")
}

fn to_int(value: &VariableValue) -> Result<VariableValue, EvaluationError> {
    match value {
        VariableValue::Int(i) => Ok(VariableValue::Int(*i)),
        VariableValue::Float(f) if f.is_finite() && f.abs() < 9.2e18 => {
            Ok(VariableValue::Int(f.trunc() as i64))
        }
        VariableValue::Bool(b) => Ok(VariableValue::Int(*b as i64)),
        VariableValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map(VariableValue::Int)
            .map_err(|_| EvaluationError::function("int", format!("cannot convert '{}'", s))),
        other => Err(EvaluationError::function(
            "int",
            format!("cannot convert {}", other.type_name()),
        )),
    }
}

fn to_double(value: &VariableValue) -> Result<VariableValue, EvaluationError> {
    match value {
        VariableValue::Int(i) => Ok(VariableValue::Float(*i as f64)),
        VariableValue::Float(f) => Ok(VariableValue::Float(*f)),
        VariableValue::String(s) => s
            .trim()
            .parse::<f64>()
            .map(VariableValue::Float)
            .map_err(|_| EvaluationError::function("double", format!("cannot convert '{}'", s))),
        other => Err(EvaluationError::function(
            "double",
            format!("cannot convert {}", other.type_name()),
        )),
    }
}

fn to_bool(value: &VariableValue) -> Result<VariableValue, EvaluationError> {
    match value {
        VariableValue::Bool(b) => Ok(VariableValue::Bool(*b)),
        VariableValue::Int(i) => Ok(VariableValue::Bool(*i != 0)),
        VariableValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(VariableValue::Bool(true)),
            "false" | "0" | "no" => Ok(VariableValue::Bool(false)),
            _ => Err(EvaluationError::function("bool", format!("cannot convert '{}'", s))),
        },
        other => Err(EvaluationError::function(
            "bool",
            format!("cannot convert {}", other.type_name()),
        )),
    }
}

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.insert(
        spec("type").params(&[Any]).describe("Type name of a value"),
        |args, _| Ok(VariableValue::String(args[0].type_name().to_string())),
    );

    registry.insert(
        spec("string").params(&[Any]).describe("Display form of a value"),
        |args, _| {
            Ok(match &args[0] {
                VariableValue::String(s) => VariableValue::String(s.clone()),
                other => VariableValue::String(other.to_string()),
            })
        },
    );

    registry.insert(
        spec("int").params(&[Any]).returns("int").describe("Convert to int, truncating floats"),
        |args, _| to_int(&args[0]),
    );

    registry.insert(
        spec("double").params(&[Any]).returns("double").describe("Convert to double"),
        |args, _| to_double(&args[0]),
    );

    registry.insert(
        spec("bool").params(&[Any]).returns("bool").describe("Convert to bool"),
        |args, _| to_bool(&args[0]),
    );

    registry.insert(
        spec("contains")
            .params(&[Any, Any])
            .returns("bool")
            .describe("Substring test, or element test for a list"),
        |args, _| match (&args[0], &args[1]) {
            (VariableValue::String(s), VariableValue::String(sub)) => {
                Ok(VariableValue::Bool(s.contains(sub.as_str())))
            }
            (VariableValue::List(items), needle) => {
                Ok(VariableValue::Bool(items.iter().any(|v| v.loose_eq(needle))))
            }
            (haystack, _) => Err(EvaluationError::type_mismatch(
                "contains",
                "string or list",
                haystack.type_name(),
            )),
        },
    );

    registry.insert(
        spec("startsWith").params(&[Str, Str]).returns("bool").describe("Prefix test"),
        |args, _| Ok(VariableValue::Bool(arg_str(args, 0).starts_with(arg_str(args, 1)))),
    );

    registry.insert(
        spec("endsWith").params(&[Str, Str]).returns("bool").describe("Suffix test"),
        |args, _| Ok(VariableValue::Bool(arg_str(args, 0).ends_with(arg_str(args, 1)))),
    );

    registry.insert(
        spec("toLowerCase").params(&[Str]).describe("Lowercase copy"),
        |args, _| Ok(VariableValue::String(arg_str(args, 0).to_lowercase())),
    );

    registry.insert(
        spec("toUpperCase").params(&[Str]).describe("Uppercase copy"),
        |args, _| Ok(VariableValue::String(arg_str(args, 0).to_uppercase())),
    );

    registry.insert(
        spec("trim").params(&[Str]).describe("Strip surrounding whitespace"),
        |args, _| Ok(VariableValue::String(arg_str(args, 0).trim().to_string())),
    );

    registry.insert(
        spec("substring")
            .params(&[Str, Int, Int])
            .arity(Arity::Range(2, 3))
            .describe("Characters [start, end) of a string"),
        |args, _| {
            let chars: Vec<char> = arg_str(args, 0).chars().collect();
            let len = chars.len() as i64;
            let start = arg_i64(args, 1);
            let end = if args.len() > 2 { arg_i64(args, 2) } else { len };
            if start < 0 || end > len || start > end {
                return Err(EvaluationError::function(
                    "substring",
                    format!("range [{}, {}) out of bounds for length {}", start, end, len),
                ));
            }
            Ok(VariableValue::String(
                chars[start as usize..end as usize].iter().collect(),
            ))
        },
    );

    registry.insert(
        spec("split")
            .params(&[Str, Str])
            .returns("list")
            .describe("Split a string on a separator"),
        |args, _| {
            let (text, sep) = (arg_str(args, 0), arg_str(args, 1));
            if sep.is_empty() {
                return Err(EvaluationError::function("split", "separator must not be empty"));
            }
            Ok(VariableValue::List(
                text.split(sep).map(|part| VariableValue::String(part.to_string())).collect(),
            ))
        },
    );

    registry.insert(
        spec("join")
            .params(&[List, Str])
            .arity(Arity::Range(1, 2))
            .describe("Join list elements with a separator (default empty)"),
        |args, _| {
            let sep = if args.len() > 1 { arg_str(args, 1) } else { "" };
            let parts: Vec<String> = arg_list(args, 0)
                .iter()
                .map(|v| match v {
                    VariableValue::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            Ok(VariableValue::String(parts.join(sep)))
        },
    );

    registry.insert(
        spec("replace")
            .params(&[Str, Str, Str])
            .describe("Replace every occurrence of a substring"),
        |args, _| {
            let from = arg_str(args, 1);
            if from.is_empty() {
                return Ok(VariableValue::String(arg_str(args, 0).to_string()));
            }
            Ok(VariableValue::String(
                arg_str(args, 0).replace(from, arg_str(args, 2)),
            ))
        },
    );
}

#[cfg(test)]
mod tests {
    use crate::domain::functions::test_support::*;
    use crate::domain::value::VariableValue;

    #[test]
    fn type_names() {
        assert_eq!(call("type", vec![f(1.0)]), Ok(s("double")));
        assert_eq!(call("type", vec![i(1)]), Ok(s("int")));
        assert_eq!(call("type", vec![VariableValue::Null]), Ok(s("null_type")));
    }

    #[test]
    fn conversions() {
        assert_eq!(call("int", vec![f(3.9)]), Ok(i(3)));
        assert_eq!(call("int", vec![s(" 42 ")]), Ok(i(42)));
        assert!(call("int", vec![f(f64::NAN)]).is_err());
        assert_eq!(call("double", vec![s("2.5")]), Ok(f(2.5)));
        assert_eq!(call("bool", vec![s("TRUE")]), Ok(b(true)));
        assert!(call("bool", vec![s("maybe")]).is_err());
        assert_eq!(call("string", vec![f(95000.0)]), Ok(s("95000.0")));
    }

    #[test]
    fn predicates() {
        assert_eq!(call("contains", vec![s("BTCUSDT"), s("USD")]), Ok(b(true)));
        assert_eq!(call("contains", vec![list(vec![i(1), i(2)]), f(2.0)]), Ok(b(true)));
        assert_eq!(call("startsWith", vec![s("BTCUSDT"), s("BTC")]), Ok(b(true)));
        assert_eq!(call("endsWith", vec![s("BTCUSDT"), s("BTC")]), Ok(b(false)));
        assert!(call("startsWith", vec![i(1), s("1")]).is_err());
    }

    #[test]
    fn transforms() {
        assert_eq!(call("toLowerCase", vec![s("AbC")]), Ok(s("abc")));
        assert_eq!(call("toUpperCase", vec![s("AbC")]), Ok(s("ABC")));
        assert_eq!(call("trim", vec![s("  x ")]), Ok(s("x")));
        assert_eq!(call("replace", vec![s("a-b-c"), s("-"), s("/")]), Ok(s("a/b/c")));
    }

    #[test]
    fn substring_counts_chars() {
        assert_eq!(call("substring", vec![s("héllo"), i(1), i(3)]), Ok(s("él")));
        assert_eq!(call("substring", vec![s("hello"), i(3)]), Ok(s("lo")));
        assert!(call("substring", vec![s("hi"), i(1), i(5)]).is_err());
    }

    #[test]
    fn split_and_join() {
        assert_eq!(
            call("split", vec![s("a,b,c"), s(",")]),
            Ok(list(vec![s("a"), s("b"), s("c")]))
        );
        assert_eq!(call("join", vec![list(vec![s("a"), i(1)]), s("-")]), Ok(s("a-1")));
        assert_eq!(call("join", vec![list(vec![s("a"), s("b")])]), Ok(s("ab")));
    }
}
