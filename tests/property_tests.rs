//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Compilation is deterministic and the second lookup is a cache hit
//! 2. Unreferenced context entries never change a result
//! 3. Project variables survive save then load; non-finite floats are refused
//! 4. Regime priority wins regardless of rule declaration order

use proptest::prelude::*;
use tempfile::TempDir;
use tradecel::adapters::project_store::{variables_path, ProjectVariableStore};
use tradecel::domain::context::EvaluationContext;
use tradecel::domain::project_vars::{ProjectVariable, ProjectVariables};
use tradecel::domain::regime::{Comparison, Condition, RegimeClassifier, RegimeRule};
use tradecel::domain::value::VariableValue;
use tradecel::ports::indicator_port::IndicatorSnapshot;
use tradecel::ExpressionEngine;

// ── Strategies ───────────────────────────────────────────────────────

const TEMPLATES: &[&str] = &[
    "chart.price > {a}",
    "chart.price * {a} - bot.leverage",
    "clamp(chart.price, {a}, {b})",
    "chart.price > {a} ? 'long' : 'flat'",
    "[chart.price, {a}, {b}].all(x, x >= 0.0)",
    "max(chart.price, {b}) - min(chart.price, {a})",
    "bot.paper_mode && chart.price >= {a}",
];

fn arb_expression() -> impl Strategy<Value = String> {
    (0..TEMPLATES.len(), 0.0..100_000.0_f64, 0.0..100_000.0_f64).prop_map(|(i, a, b)| {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        TEMPLATES[i]
            .replace("{a}", &format!("{:.2}", lo))
            .replace("{b}", &format!("{:.2}", hi))
    })
}

fn base_context(price: f64) -> EvaluationContext {
    let mut ctx = EvaluationContext::new();
    ctx.insert("chart.price", price);
    ctx.insert("bot.leverage", 2i64);
    ctx.insert("bot.paper_mode", true);
    ctx
}

fn arb_noise() -> impl Strategy<Value = Vec<(String, f64)>> {
    prop::collection::vec(("[a-z]{1,8}", -1e6..1e6_f64), 0..8).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(name, v)| (format!("noise_{}", name), v))
            .collect()
    })
}

fn arb_float() -> impl Strategy<Value = f64> {
    prop_oneof![
        4 => -1e9..1e9_f64,
        1 => prop_oneof![
            Just(f64::NAN),
            Just(f64::INFINITY),
            Just(f64::NEG_INFINITY),
            Just(f64::MAX),
            Just(f64::MIN_POSITIVE),
            Just(-0.0),
        ],
    ]
}

fn is_finite(value: &VariableValue) -> bool {
    match value {
        VariableValue::Float(f) => f.is_finite(),
        VariableValue::List(items) => items.iter().all(is_finite),
        _ => true,
    }
}

fn arb_value() -> impl Strategy<Value = VariableValue> {
    prop_oneof![
        arb_float().prop_map(VariableValue::Float),
        any::<i64>().prop_map(VariableValue::Int),
        any::<bool>().prop_map(VariableValue::Bool),
        "[ -~]{0,16}".prop_map(VariableValue::String),
        prop::collection::vec(any::<i32>().prop_map(|i| VariableValue::Int(i as i64)), 0..4)
            .prop_map(VariableValue::List),
        prop::collection::vec(arb_float().prop_map(VariableValue::Float), 1..4)
            .prop_map(VariableValue::List),
    ]
}

fn arb_entries() -> impl Strategy<Value = Vec<(String, VariableValue)>> {
    prop::collection::btree_map("v_[a-z0-9_]{1,10}", arb_value(), 0..10)
        .prop_map(|vars| vars.into_iter().collect())
}

// ── 1. Deterministic, cached compilation ─────────────────────────────

proptest! {
    #[test]
    fn second_compile_is_a_hit_with_same_result(expr in arb_expression(), price in 0.0..200_000.0_f64) {
        let engine = ExpressionEngine::new();
        let ctx = base_context(price);
        let first = engine.get_or_compile(&expr).unwrap();
        let r1 = engine.evaluate_compiled(&first, &ctx);
        let second = engine.get_or_compile(&expr).unwrap();
        let r2 = engine.evaluate_compiled(&second, &ctx);

        let stats = engine.cache_stats();
        prop_assert_eq!(stats.hits, 1);
        prop_assert_eq!(stats.misses, 1);
        prop_assert_eq!(r1, r2);
    }
}

// ── 2. No dependence on unused variables ─────────────────────────────

proptest! {
    #[test]
    fn unused_variables_do_not_matter(
        expr in arb_expression(),
        price in 0.0..200_000.0_f64,
        noise in arb_noise(),
    ) {
        let engine = ExpressionEngine::new();
        let plain = base_context(price);
        let mut noisy = base_context(price);
        for (name, value) in noise {
            noisy.insert(name, value);
        }
        let compiled = engine.get_or_compile(&expr).unwrap();
        prop_assert_eq!(
            engine.evaluate_compiled(&compiled, &plain),
            engine.evaluate_compiled(&compiled, &noisy)
        );
    }
}

// ── 3. Save/load round-trip ──────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn save_then_load_is_identity(entries in arb_entries()) {
        // non-finite floats have no JSON form and must be refused up front
        let mut project = ProjectVariables::new("prop");
        for (name, value) in entries {
            let finite = is_finite(&value);
            match ProjectVariable::new(&name, value) {
                Ok(var) => {
                    prop_assert!(finite);
                    project.add_variable(var.with_category("generated")).unwrap();
                }
                Err(err) => {
                    prop_assert!(!finite, "{}", err);
                }
            }
        }

        let dir = TempDir::new().unwrap();
        let path = variables_path(dir.path(), "prop");
        let writer = ProjectVariableStore::default();
        writer.save(&path, &project).unwrap();

        // a fresh store reads from disk rather than the cache
        let reader = ProjectVariableStore::default();
        let loaded = reader.load(&path).unwrap();
        prop_assert_eq!(loaded.as_ref(), &project);
    }
}

// ── 4. Regime priority ───────────────────────────────────────────────

proptest! {
    #[test]
    fn higher_priority_wins_in_any_order(rsi in 0.0..100.0_f64, reversed in any::<bool>()) {
        let mut rules = vec![
            RegimeRule::new("HIGH", 95, vec![Condition::new("rsi", Comparison::AtLeast, 0.0)]),
            RegimeRule::new("LOW", 50, vec![Condition::new("rsi", Comparison::AtMost, 100.0)]),
        ];
        if reversed {
            rules.reverse();
        }
        let classifier = RegimeClassifier::new(rules).unwrap();
        let snapshot = IndicatorSnapshot::from([("rsi".to_string(), rsi)]);
        prop_assert_eq!(classifier.classify(&snapshot), "HIGH");
    }
}
