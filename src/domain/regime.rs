//! Configuration-driven regime classification.
//!
//! A classifier is an ordered set of rules, each a conjunction of indicator
//! conditions with a label and a unique priority. The highest-priority
//! matching rule wins; nothing matching yields `UNKNOWN`.

use crate::domain::error::EngineError;
use crate::domain::functions::regime::UNKNOWN_REGIME;
use crate::ports::indicator_port::IndicatorSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Priority reported for `UNKNOWN`; configured rules must rank above it.
pub const UNKNOWN_PRIORITY: i64 = 0;

const EQUALS_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Above,
    Below,
    AtLeast,
    AtMost,
    Between,
    Equals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub indicator: String,
    pub op: Comparison,
    pub value: f64,
    /// Inclusive upper bound for `between`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
}

impl Condition {
    pub fn new(indicator: &str, op: Comparison, value: f64) -> Self {
        Self {
            indicator: indicator.to_string(),
            op,
            value,
            upper: None,
        }
    }

    pub fn between(indicator: &str, low: f64, high: f64) -> Self {
        Self {
            upper: Some(high),
            ..Self::new(indicator, Comparison::Between, low)
        }
    }

    /// A missing or NaN indicator never matches.
    pub fn matches(&self, snapshot: &IndicatorSnapshot) -> bool {
        let Some(&x) = snapshot.get(&self.indicator) else {
            return false;
        };
        if x.is_nan() {
            return false;
        }
        match self.op {
            Comparison::Above => x > self.value,
            Comparison::Below => x < self.value,
            Comparison::AtLeast => x >= self.value,
            Comparison::AtMost => x <= self.value,
            Comparison::Between => self.upper.is_some_and(|hi| x >= self.value && x <= hi),
            Comparison::Equals => (x - self.value).abs() < EQUALS_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeRule {
    pub label: String,
    pub priority: i64,
    pub conditions: Vec<Condition>,
}

impl RegimeRule {
    pub fn new(label: &str, priority: i64, conditions: Vec<Condition>) -> Self {
        Self {
            label: label.to_string(),
            priority,
            conditions,
        }
    }

    pub fn matches(&self, snapshot: &IndicatorSnapshot) -> bool {
        self.conditions.iter().all(|c| c.matches(snapshot))
    }
}

/// On-disk shape of a rule file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeRuleSet {
    pub rules: Vec<RegimeRule>,
}

fn invalid(reason: String) -> EngineError {
    EngineError::RegimeConfig { reason }
}

#[derive(Debug, Clone)]
pub struct RegimeClassifier {
    /// Sorted by descending priority.
    rules: Vec<RegimeRule>,
}

impl RegimeClassifier {
    pub fn new(mut rules: Vec<RegimeRule>) -> Result<Self, EngineError> {
        if rules.is_empty() {
            return Err(invalid("at least one rule is required".to_string()));
        }
        let mut priorities = BTreeSet::new();
        let mut labels = BTreeSet::new();
        for rule in &rules {
            if rule.label.trim().is_empty() || rule.label == UNKNOWN_REGIME {
                return Err(invalid(format!("rule label '{}' is not allowed", rule.label)));
            }
            if rule.priority <= UNKNOWN_PRIORITY {
                return Err(invalid(format!(
                    "rule '{}' priority must be greater than {}",
                    rule.label, UNKNOWN_PRIORITY
                )));
            }
            if !priorities.insert(rule.priority) {
                return Err(invalid(format!("duplicate priority {}", rule.priority)));
            }
            if !labels.insert(rule.label.as_str()) {
                return Err(invalid(format!("duplicate label '{}'", rule.label)));
            }
            if rule.conditions.is_empty() {
                return Err(invalid(format!("rule '{}' has no conditions", rule.label)));
            }
            for c in &rule.conditions {
                if c.op == Comparison::Between && !c.upper.is_some_and(|hi| hi >= c.value) {
                    return Err(invalid(format!(
                        "rule '{}': between on '{}' needs an upper bound >= {}",
                        rule.label, c.indicator, c.value
                    )));
                }
            }
        }
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(Self { rules })
    }

    pub fn from_rule_set(set: RegimeRuleSet) -> Result<Self, EngineError> {
        Self::new(set.rules)
    }

    pub fn rules(&self) -> &[RegimeRule] {
        &self.rules
    }

    pub fn labels(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.label.as_str()).collect()
    }

    /// Highest-priority matching rule.
    pub fn matching_rule(&self, snapshot: &IndicatorSnapshot) -> Option<&RegimeRule> {
        self.rules.iter().find(|r| r.matches(snapshot))
    }

    pub fn classify(&self, snapshot: &IndicatorSnapshot) -> &str {
        self.matching_rule(snapshot)
            .map_or(UNKNOWN_REGIME, |r| r.label.as_str())
    }

    pub fn snapshot(
        &self,
        indicators: IndicatorSnapshot,
        computed_at: ComputedAt,
        bar_time: DateTime<Utc>,
    ) -> RegimeSnapshot {
        let (label, priority) = match self.matching_rule(&indicators) {
            Some(rule) => (rule.label.clone(), rule.priority),
            None => (UNKNOWN_REGIME.to_string(), UNKNOWN_PRIORITY),
        };
        RegimeSnapshot {
            label,
            priority,
            indicators,
            computed_at,
            bar_time: Some(bar_time),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedAt {
    /// From an in-progress bar; may repaint.
    Live,
    /// From a completed bar; frozen until the next close.
    BarClose,
}

impl fmt::Display for ComputedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputedAt::Live => write!(f, "live"),
            ComputedAt::BarClose => write!(f, "bar_close"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegimeSnapshot {
    pub label: String,
    pub priority: i64,
    pub indicators: IndicatorSnapshot,
    pub computed_at: ComputedAt,
    /// `None` only for the initial placeholder.
    pub bar_time: Option<DateTime<Utc>>,
}

impl RegimeSnapshot {
    pub fn unknown(computed_at: ComputedAt) -> Self {
        Self {
            label: UNKNOWN_REGIME.to_string(),
            priority: UNKNOWN_PRIORITY,
            indicators: IndicatorSnapshot::new(),
            computed_at,
            bar_time: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_REGIME
    }
}

/// Label transition between two consecutive closed bars. Nothing to compare
/// against is not a change.
pub fn regime_changed(prev_closed: Option<&RegimeSnapshot>, curr_closed: Option<&RegimeSnapshot>) -> bool {
    match (prev_closed, curr_closed) {
        (Some(prev), Some(curr)) => prev.label != curr.label,
        _ => false,
    }
}

/// Rule set used when no rule file is configured. Reads `ema_spread_pct`,
/// `rsi`, `atr_pct` and `bb_width_pct`.
pub fn default_rules() -> Vec<RegimeRule> {
    use Comparison::*;
    vec![
        RegimeRule::new(
            "STRONG_TREND_BULL",
            95,
            vec![
                Condition::new("ema_spread_pct", AtLeast, 1.0),
                Condition::new("rsi", AtLeast, 60.0),
            ],
        ),
        RegimeRule::new(
            "STRONG_TREND_BEAR",
            94,
            vec![
                Condition::new("ema_spread_pct", AtMost, -1.0),
                Condition::new("rsi", AtMost, 40.0),
            ],
        ),
        RegimeRule::new("HIGH_VOLATILITY", 90, vec![Condition::new("atr_pct", AtLeast, 3.0)]),
        RegimeRule::new("TREND_BULL", 70, vec![Condition::new("ema_spread_pct", Above, 0.2)]),
        RegimeRule::new("TREND_BEAR", 69, vec![Condition::new("ema_spread_pct", Below, -0.2)]),
        RegimeRule::new("SQUEEZE", 60, vec![Condition::new("bb_width_pct", Below, 2.0)]),
        RegimeRule::new("RANGE", 50, vec![Condition::between("ema_spread_pct", -0.2, 0.2)]),
    ]
}

pub fn default_classifier() -> RegimeClassifier {
    RegimeClassifier {
        rules: {
            let mut rules = default_rules();
            rules.sort_by(|a, b| b.priority.cmp(&a.priority));
            rules
        },
    }
}
