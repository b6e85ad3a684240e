//! Built-in function library and registry.
//!
//! Each category module contributes its functions through a `register`
//! function. Arity and parameter types are checked by
//! `FunctionRegistry::call` before a body runs, so bodies read their
//! arguments through the `arg_*` helpers without re-checking.

pub mod collection;
pub mod math;
pub mod predicates;
pub mod price;
pub mod regime;
pub mod strings;
pub mod time;

use crate::domain::context::EvaluationContext;
use crate::domain::error::{ArgumentError, DuplicateFunctionError, EvaluationError};
use crate::domain::eval::Deadline;
use crate::domain::value::VariableValue;
use crate::ports::host_port::RegimeHost;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Range(usize, usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::Range(lo, hi) => (lo..=hi).contains(&count),
            Arity::AtLeast(n) => count >= n,
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "argument" } else { "arguments" }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Arity::Exact(n) => write!(f, "{} {}", n, plural(n)),
            Arity::Range(lo, hi) => write!(f, "{} to {} arguments", lo, hi),
            Arity::AtLeast(n) => write!(f, "at least {} {}", n, plural(n)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Any,
    Number,
    Int,
    Bool,
    String,
    List,
    Map,
}

impl ParamType {
    pub fn accepts(&self, value: &VariableValue) -> bool {
        match self {
            ParamType::Any => true,
            ParamType::Number => value.is_number(),
            ParamType::Int => matches!(value, VariableValue::Int(_)),
            ParamType::Bool => matches!(value, VariableValue::Bool(_)),
            ParamType::String => matches!(value, VariableValue::String(_)),
            ParamType::List => matches!(value, VariableValue::List(_)),
            ParamType::Map => matches!(value, VariableValue::Map(_)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParamType::Any => "any",
            ParamType::Number => "number",
            ParamType::Int => "int",
            ParamType::Bool => "bool",
            ParamType::String => "string",
            ParamType::List => "list",
            ParamType::Map => "map",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purity {
    Pure,
    /// Needs the regime host capability; falls back to a neutral value without it.
    Host,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Math,
    Predicate,
    Price,
    Time,
    String,
    Collection,
    Regime,
    Custom,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Math => "math",
            Category::Predicate => "predicate",
            Category::Price => "price",
            Category::Time => "time",
            Category::String => "string",
            Category::Collection => "collection",
            Category::Regime => "regime",
            Category::Custom => "custom",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSpec {
    pub name: String,
    pub arity: Arity,
    /// Types by position; extra variadic arguments use the last entry.
    pub params: Vec<ParamType>,
    pub returns: &'static str,
    pub purity: Purity,
    pub category: Category,
    pub description: &'static str,
    /// Only meaningful in macro form (`xs.map(x, e)`, `has(a.b)`).
    pub macro_only: bool,
}

impl FunctionSpec {
    pub fn new(name: &str, category: Category) -> Self {
        Self {
            name: name.to_string(),
            arity: Arity::Exact(0),
            params: Vec::new(),
            returns: "any",
            purity: Purity::Pure,
            category,
            description: "",
            macro_only: false,
        }
    }

    /// Set parameter types; arity becomes exactly their count.
    pub fn params(mut self, params: &[ParamType]) -> Self {
        self.params = params.to_vec();
        self.arity = Arity::Exact(params.len());
        self
    }

    pub fn arity(mut self, arity: Arity) -> Self {
        self.arity = arity;
        self
    }

    pub fn returns(mut self, returns: &'static str) -> Self {
        self.returns = returns;
        self
    }

    pub fn host(mut self) -> Self {
        self.purity = Purity::Host;
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn macro_form(mut self) -> Self {
        self.macro_only = true;
        self
    }

    fn param_at(&self, index: usize) -> ParamType {
        self.params
            .get(index)
            .or_else(|| self.params.last())
            .copied()
            .unwrap_or(ParamType::Any)
    }

    /// `name(number, number) -> double`
    pub fn signature(&self) -> String {
        let mut params: Vec<&str> = self.params.iter().map(ParamType::name).collect();
        match self.arity {
            Arity::AtLeast(_) => params.push("..."),
            Arity::Range(lo, _) => {
                for p in params.iter_mut().skip(lo) {
                    *p = match *p {
                        "number" => "number?",
                        "string" => "string?",
                        "int" => "int?",
                        "map" => "map?",
                        "list" => "list?",
                        "bool" => "bool?",
                        _ => "any?",
                    };
                }
            }
            Arity::Exact(_) => {}
        }
        format!("{}({}) -> {}", self.name, params.join(", "), self.returns)
    }
}

/// What a function body may see besides its arguments.
pub struct CallEnv<'a> {
    context: &'a EvaluationContext,
    deadline: Option<Deadline>,
}

/// Elements a built-in walks between clock reads.
const CHECKPOINT_STRIDE: usize = 1024;

impl<'a> CallEnv<'a> {
    pub fn new(context: &'a EvaluationContext) -> Self {
        Self {
            context,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Deadline>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn check_deadline(&self) -> Result<(), EvaluationError> {
        self.deadline.as_ref().map_or(Ok(()), Deadline::check)
    }

    /// Deadline check for the `step`-th iteration of a long loop; reads the
    /// clock once per stride.
    pub fn checkpoint(&self, step: usize) -> Result<(), EvaluationError> {
        if step % CHECKPOINT_STRIDE == 0 {
            self.check_deadline()?;
        }
        Ok(())
    }

    pub fn context(&self) -> &EvaluationContext {
        self.context
    }

    pub fn host(&self) -> Option<&Arc<dyn RegimeHost>> {
        self.context.host()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.context.now()
    }

    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.context.get(name)
    }
}

pub type NativeFn = Arc<
    dyn Fn(&[VariableValue], &CallEnv<'_>) -> Result<VariableValue, EvaluationError> + Send + Sync,
>;

#[derive(Clone)]
struct Entry {
    spec: FunctionSpec,
    native: NativeFn,
}

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    entries: BTreeMap<String, Entry>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.entries.len())
            .finish()
    }
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the full built-in library.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        math::register(&mut registry);
        predicates::register(&mut registry);
        price::register(&mut registry);
        time::register(&mut registry);
        strings::register(&mut registry);
        collection::register(&mut registry);
        regime::register(&mut registry);
        registry
    }

    pub fn register<F>(
        &mut self,
        spec: FunctionSpec,
        native: F,
        overwrite: bool,
    ) -> Result<(), DuplicateFunctionError>
    where
        F: Fn(&[VariableValue], &CallEnv<'_>) -> Result<VariableValue, EvaluationError>
            + Send
            + Sync
            + 'static,
    {
        if !overwrite && self.entries.contains_key(&spec.name) {
            return Err(DuplicateFunctionError { name: spec.name });
        }
        self.insert(spec, native);
        Ok(())
    }

    pub(crate) fn insert<F>(&mut self, spec: FunctionSpec, native: F)
    where
        F: Fn(&[VariableValue], &CallEnv<'_>) -> Result<VariableValue, EvaluationError>
            + Send
            + Sync
            + 'static,
    {
        self.entries.insert(
            spec.name.clone(),
            Entry {
                spec,
                native: Arc::new(native),
            },
        );
    }

    pub fn resolve(&self, name: &str) -> Option<&FunctionSpec> {
        self.entries.get(name).map(|e| &e.spec)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted function names.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn by_category(&self) -> BTreeMap<Category, Vec<&FunctionSpec>> {
        let mut grouped: BTreeMap<Category, Vec<&FunctionSpec>> = BTreeMap::new();
        for entry in self.entries.values() {
            grouped.entry(entry.spec.category).or_default().push(&entry.spec);
        }
        grouped
    }

    /// One-line help: signature and description.
    pub fn describe(&self, name: &str) -> Option<String> {
        let spec = self.resolve(name)?;
        let mut line = spec.signature();
        if !spec.description.is_empty() {
            line.push_str("  ");
            line.push_str(spec.description);
        }
        Some(line)
    }

    /// Check arity and argument types, then invoke.
    pub fn call(
        &self,
        name: &str,
        args: &[VariableValue],
        env: &CallEnv<'_>,
    ) -> Result<VariableValue, EvaluationError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| EvaluationError::function(name, "unknown function"))?;
        let spec = &entry.spec;

        if spec.macro_only {
            return Err(EvaluationError::function(
                name,
                format!("must be written as list.{}(var, expression)", name),
            ));
        }
        if !spec.arity.accepts(args.len()) {
            return Err(ArgumentError {
                function: name.to_string(),
                expected: spec.arity.to_string(),
                actual: format!("{} {}", args.len(), plural(args.len())),
            }
            .into());
        }
        for (i, arg) in args.iter().enumerate() {
            let expected = spec.param_at(i);
            if !expected.accepts(arg) {
                return Err(ArgumentError {
                    function: name.to_string(),
                    expected: format!("{} for argument {}", expected.name(), i + 1),
                    actual: arg.type_name().to_string(),
                }
                .into());
            }
        }

        (entry.native)(args, env)
    }
}

pub(crate) fn arg_f64(args: &[VariableValue], index: usize) -> f64 {
    args.get(index)
        .and_then(VariableValue::as_f64)
        .unwrap_or(f64::NAN)
}

pub(crate) fn arg_i64(args: &[VariableValue], index: usize) -> i64 {
    args.get(index).and_then(VariableValue::as_i64).unwrap_or(0)
}

pub(crate) fn arg_str(args: &[VariableValue], index: usize) -> &str {
    args.get(index).and_then(VariableValue::as_str).unwrap_or("")
}

pub(crate) fn arg_list(args: &[VariableValue], index: usize) -> &[VariableValue] {
    args.get(index).and_then(VariableValue::as_list).unwrap_or(&[])
}

/// Reject NaN and infinities produced by a computation.
pub(crate) fn finite(name: &str, value: f64) -> Result<VariableValue, EvaluationError> {
    if value.is_finite() {
        Ok(VariableValue::Float(value))
    } else {
        Err(EvaluationError::function(name, "result is not a finite number"))
    }
}

pub(crate) fn nonzero(value: f64) -> Result<f64, EvaluationError> {
    if value == 0.0 {
        Err(EvaluationError::DivisionByZero)
    } else {
        Ok(value)
    }
}
