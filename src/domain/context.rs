//! Evaluation context: one flat `name -> value` mapping per call, plus the
//! optional regime host capability and the clock used by time built-ins.

use crate::domain::value::VariableValue;
use crate::ports::host_port::RegimeHost;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct EvaluationContext {
    values: HashMap<String, VariableValue>,
    host: Option<Arc<dyn RegimeHost>>,
    clock: Option<DateTime<Utc>>,
}

impl fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("values", &self.values)
            .field("host", &self.host.is_some())
            .field("clock", &self.clock)
            .finish()
    }
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: Arc<dyn RegimeHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Pin the clock seen by `now()` and friends.
    pub fn with_clock(mut self, clock: DateTime<Utc>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn set_host(&mut self, host: Option<Arc<dyn RegimeHost>>) {
        self.host = host;
    }

    pub fn set_clock(&mut self, clock: Option<DateTime<Utc>>) {
        self.clock = clock;
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<VariableValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Insert every entry, replacing existing names.
    pub fn extend<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, VariableValue)>,
    {
        self.values.extend(entries);
    }

    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VariableValue)> {
        self.values.iter()
    }

    pub fn host(&self) -> Option<&Arc<dyn RegimeHost>> {
        self.host.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    /// All keys under `prefix.` folded into a nested map, or `None` when no
    /// key carries the prefix. `trade` yields `{side: .., entry_price: ..}`.
    pub fn namespace(&self, prefix: &str) -> Option<VariableValue> {
        let lead = format!("{}.", prefix);
        let mut root: BTreeMap<String, VariableValue> = BTreeMap::new();
        for (name, value) in &self.values {
            if let Some(rest) = name.strip_prefix(&lead) {
                insert_nested(&mut root, rest, value.clone());
            }
        }
        if root.is_empty() {
            None
        } else {
            Some(VariableValue::Map(root))
        }
    }

    /// Exact key first, then the folded namespace.
    pub fn lookup(&self, path: &str) -> Option<VariableValue> {
        match self.values.get(path) {
            Some(value) => Some(value.clone()),
            None => self.namespace(path),
        }
    }
}

fn insert_nested(map: &mut BTreeMap<String, VariableValue>, path: &str, value: VariableValue) {
    match path.split_once('.') {
        None => {
            // a deeper key already created a map here; keep it
            if !matches!(map.get(path), Some(VariableValue::Map(_))) {
                map.insert(path.to_string(), value);
            }
        }
        Some((head, rest)) => {
            let slot = map
                .entry(head.to_string())
                .or_insert_with(|| VariableValue::Map(BTreeMap::new()));
            if !matches!(slot, VariableValue::Map(_)) {
                *slot = VariableValue::Map(BTreeMap::new());
            }
            if let VariableValue::Map(inner) = slot {
                insert_nested(inner, rest, value);
            }
        }
    }
}

impl FromIterator<(String, VariableValue)> for EvaluationContext {
    fn from_iter<T: IntoIterator<Item = (String, VariableValue)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
            host: None,
            clock: None,
        }
    }
}

/// Per-variable metadata for introspection and autocomplete.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableInfo {
    pub name: String,
    /// Namespace the value came from (`chart`, `bot`, `project`, `override`, ...).
    pub source: String,
    pub type_name: String,
    pub description: String,
    pub unit: Option<String>,
    pub value: VariableValue,
}
