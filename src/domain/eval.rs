//! Expression evaluation.
//!
//! Evaluates a compiled expression against an immutable context. No state
//! survives a call, so one compiled expression can be evaluated from many
//! threads at once.
//!
//! # Evaluation Semantics
//!
//! - Names: comprehension variables first, then the exact context key, then
//!   the folded namespace map (`trade` → `{side, ...}`)
//! - `&&` / `||`: short-circuit, operands must be bool
//! - Arithmetic: int op int stays int (checked), mixed widens to double,
//!   zero divisors raise `DivisionByZero`
//! - `==` / `!=`: numeric widening, structural on lists and maps
//! - Timeout: checked every few nodes, on every comprehension step and
//!   inside the list built-ins, which see the same `Deadline`

use crate::domain::ast::{BinaryOp, ComprehensionKind, Expr, UnaryOp};
use crate::domain::compiler::CompiledExpression;
use crate::domain::context::EvaluationContext;
use crate::domain::error::EvaluationError;
use crate::domain::functions::collection::compare_values;
use crate::domain::functions::{CallEnv, FunctionRegistry};
use crate::domain::value::VariableValue;
use std::cmp::Ordering;
use std::time::{Duration, Instant};

/// Nodes visited between clock reads.
const DEADLINE_STRIDE: u64 = 16;

/// Wall-clock budget for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    /// `None` when the budget reaches past what `Instant` can represent.
    at: Option<Instant>,
    limit_ms: u64,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
            limit_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn check(&self) -> Result<(), EvaluationError> {
        if self.at.is_some_and(|at| Instant::now() >= at) {
            return Err(EvaluationError::Timeout {
                limit_ms: self.limit_ms,
            });
        }
        Ok(())
    }
}

pub fn evaluate(
    compiled: &CompiledExpression,
    context: &EvaluationContext,
    registry: &FunctionRegistry,
    timeout: Option<Duration>,
) -> Result<VariableValue, EvaluationError> {
    let mut evaluator = Evaluator::new(registry, context, timeout);
    evaluator.eval(compiled.expr())
}

struct Evaluator<'a> {
    registry: &'a FunctionRegistry,
    context: &'a EvaluationContext,
    deadline: Option<Deadline>,
    scopes: Vec<(String, VariableValue)>,
    steps: u64,
}

impl<'a> Evaluator<'a> {
    fn new(
        registry: &'a FunctionRegistry,
        context: &'a EvaluationContext,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            context,
            deadline: timeout.map(Deadline::after),
            scopes: Vec::new(),
            steps: 0,
        }
    }

    fn tick(&mut self) -> Result<(), EvaluationError> {
        let due = self.steps % DEADLINE_STRIDE == 0;
        self.steps += 1;
        if due {
            self.check_deadline()?;
        }
        Ok(())
    }

    fn check_deadline(&self) -> Result<(), EvaluationError> {
        self.deadline.as_ref().map_or(Ok(()), Deadline::check)
    }

    fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().any(|(n, _)| n == name)
    }

    fn scoped(&self, name: &str) -> Option<&VariableValue> {
        self.scopes.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    fn eval(&mut self, expr: &Expr) -> Result<VariableValue, EvaluationError> {
        self.tick()?;
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ident(name) => {
                if let Some(value) = self.scoped(name) {
                    return Ok(value.clone());
                }
                self.context
                    .lookup(name)
                    .ok_or_else(|| EvaluationError::UnknownVariable { name: name.clone() })
            }
            Expr::Member { target, field } => self.eval_member(expr, target, field),
            Expr::Index { target, index } => {
                let base = self.eval(target)?;
                let key = self.eval(index)?;
                index_value(&base, &key)
            }
            Expr::Call { function, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                let env = CallEnv::new(self.context).with_deadline(self.deadline);
                self.registry.call(function, &values, &env)
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                eval_unary(*op, value)
            }
            Expr::Binary { op, left, right } => match op {
                BinaryOp::And => {
                    if !self.eval_bool("&&", left)? {
                        return Ok(VariableValue::Bool(false));
                    }
                    Ok(VariableValue::Bool(self.eval_bool("&&", right)?))
                }
                BinaryOp::Or => {
                    if self.eval_bool("||", left)? {
                        return Ok(VariableValue::Bool(true));
                    }
                    Ok(VariableValue::Bool(self.eval_bool("||", right)?))
                }
                _ => {
                    let l = self.eval(left)?;
                    let r = self.eval(right)?;
                    eval_binary(*op, &l, &r)
                }
            },
            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval_bool("?:", condition)? {
                    self.eval(then_branch)
                } else {
                    self.eval(else_branch)
                }
            }
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(VariableValue::List(values))
            }
            Expr::Comprehension {
                kind,
                range,
                var,
                body,
            } => self.eval_comprehension(*kind, range, var, body),
            Expr::Has(target) => match self.eval(target) {
                Ok(_) => Ok(VariableValue::Bool(true)),
                Err(EvaluationError::UnknownVariable { .. }) => Ok(VariableValue::Bool(false)),
                Err(other) => Err(other),
            },
        }
    }

    fn eval_bool(&mut self, op: &str, expr: &Expr) -> Result<bool, EvaluationError> {
        let value = self.eval(expr)?;
        value
            .as_bool()
            .ok_or_else(|| EvaluationError::type_mismatch(op, "bool", value.type_name()))
    }

    fn eval_member(
        &mut self,
        expr: &Expr,
        target: &Expr,
        field: &str,
    ) -> Result<VariableValue, EvaluationError> {
        let path = expr.dotted_path();
        let bound_root = expr.root_ident().is_some_and(|root| self.is_bound(root));

        if let (Some(path), false) = (&path, bound_root) {
            if let Some(value) = self.context.lookup(path) {
                return Ok(value);
            }
        }

        let missing = || EvaluationError::UnknownVariable {
            name: path.clone().unwrap_or_else(|| field.to_string()),
        };

        let base = match self.eval(target) {
            Ok(base) => base,
            Err(EvaluationError::UnknownVariable { .. }) if path.is_some() => {
                return Err(missing());
            }
            Err(other) => return Err(other),
        };
        match base {
            VariableValue::Map(map) => map.get(field).cloned().ok_or_else(missing),
            other => Err(EvaluationError::type_mismatch(
                &format!(".{}", field),
                "map",
                other.type_name(),
            )),
        }
    }

    fn eval_comprehension(
        &mut self,
        kind: ComprehensionKind,
        range: &Expr,
        var: &str,
        body: &Expr,
    ) -> Result<VariableValue, EvaluationError> {
        let items: Vec<VariableValue> = match self.eval(range)? {
            VariableValue::List(items) => items,
            VariableValue::Map(map) => map.into_keys().map(VariableValue::String).collect(),
            other => {
                return Err(EvaluationError::type_mismatch(
                    kind.name(),
                    "list or map",
                    other.type_name(),
                ));
            }
        };

        let mut matched = 0usize;
        let mut mapped = Vec::new();
        for item in items {
            self.check_deadline()?;
            self.scopes.push((var.to_string(), item));
            let result = self.eval(body);
            let (_, item) = self
                .scopes
                .pop()
                .unwrap_or_else(|| (String::new(), VariableValue::Null));
            let value = result?;

            if kind == ComprehensionKind::Map {
                mapped.push(value);
                continue;
            }
            let keep = value.as_bool().ok_or_else(|| {
                EvaluationError::type_mismatch(kind.name(), "bool predicate", value.type_name())
            })?;
            match kind {
                ComprehensionKind::All if !keep => return Ok(VariableValue::Bool(false)),
                ComprehensionKind::Exists if keep => return Ok(VariableValue::Bool(true)),
                ComprehensionKind::ExistsOne if keep => {
                    matched += 1;
                    if matched > 1 {
                        return Ok(VariableValue::Bool(false));
                    }
                }
                ComprehensionKind::Filter if keep => mapped.push(item),
                _ => {}
            }
        }

        Ok(match kind {
            ComprehensionKind::All => VariableValue::Bool(true),
            ComprehensionKind::Exists => VariableValue::Bool(false),
            ComprehensionKind::ExistsOne => VariableValue::Bool(matched == 1),
            ComprehensionKind::Map | ComprehensionKind::Filter => VariableValue::List(mapped),
        })
    }
}

fn overflow(op: &str) -> EvaluationError {
    EvaluationError::type_mismatch(op, "result within int64 range", "overflow")
}

fn eval_unary(op: UnaryOp, value: VariableValue) -> Result<VariableValue, EvaluationError> {
    match (op, value) {
        (UnaryOp::Not, VariableValue::Bool(b)) => Ok(VariableValue::Bool(!b)),
        (UnaryOp::Negate, VariableValue::Int(i)) => {
            i.checked_neg().map(VariableValue::Int).ok_or_else(|| overflow("-"))
        }
        (UnaryOp::Negate, VariableValue::Float(f)) => Ok(VariableValue::Float(-f)),
        (UnaryOp::Not, other) => Err(EvaluationError::type_mismatch("!", "bool", other.type_name())),
        (UnaryOp::Negate, other) => {
            Err(EvaluationError::type_mismatch("-", "number", other.type_name()))
        }
    }
}

fn mismatch(op: BinaryOp, expected: &str, l: &VariableValue, r: &VariableValue) -> EvaluationError {
    EvaluationError::type_mismatch(
        op.symbol(),
        expected,
        &format!("{} and {}", l.type_name(), r.type_name()),
    )
}

fn eval_binary(op: BinaryOp, l: &VariableValue, r: &VariableValue) -> Result<VariableValue, EvaluationError> {
    use VariableValue::Int;

    match op {
        BinaryOp::Eq => Ok(VariableValue::Bool(l.loose_eq(r))),
        BinaryOp::Ne => Ok(VariableValue::Bool(!l.loose_eq(r))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let Some(ordering) = compare_values(l, r) else {
                // NaN compares false against everything
                if l.is_number() && r.is_number() {
                    return Ok(VariableValue::Bool(false));
                }
                return Err(mismatch(op, "comparable operands", l, r));
            };
            Ok(VariableValue::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::In => match r {
            VariableValue::List(items) => Ok(VariableValue::Bool(items.iter().any(|v| v.loose_eq(l)))),
            VariableValue::Map(map) => match l {
                VariableValue::String(key) => Ok(VariableValue::Bool(map.contains_key(key))),
                _ => Err(mismatch(op, "string key", l, r)),
            },
            VariableValue::String(hay) => match l {
                VariableValue::String(needle) => Ok(VariableValue::Bool(hay.contains(needle.as_str()))),
                _ => Err(mismatch(op, "string in string", l, r)),
            },
            _ => Err(mismatch(op, "list, map or string on the right", l, r)),
        },
        BinaryOp::Add => match (l, r) {
            (Int(a), Int(b)) => a.checked_add(*b).map(Int).ok_or_else(|| overflow("+")),
            (VariableValue::String(a), VariableValue::String(b)) => {
                Ok(VariableValue::String(format!("{}{}", a, b)))
            }
            (VariableValue::List(a), VariableValue::List(b)) => {
                Ok(VariableValue::List(a.iter().chain(b).cloned().collect()))
            }
            _ => float_op(op, l, r, |a, b| Ok(a + b)),
        },
        BinaryOp::Sub => match (l, r) {
            (Int(a), Int(b)) => a.checked_sub(*b).map(Int).ok_or_else(|| overflow("-")),
            _ => float_op(op, l, r, |a, b| Ok(a - b)),
        },
        BinaryOp::Mul => match (l, r) {
            (Int(a), Int(b)) => a.checked_mul(*b).map(Int).ok_or_else(|| overflow("*")),
            _ => float_op(op, l, r, |a, b| Ok(a * b)),
        },
        BinaryOp::Div => match (l, r) {
            (Int(_), Int(0)) => Err(EvaluationError::DivisionByZero),
            (Int(a), Int(b)) => a.checked_div(*b).map(Int).ok_or_else(|| overflow("/")),
            _ => float_op(op, l, r, |a, b| {
                if b == 0.0 {
                    Err(EvaluationError::DivisionByZero)
                } else {
                    Ok(a / b)
                }
            }),
        },
        BinaryOp::Mod => match (l, r) {
            (Int(_), Int(0)) => Err(EvaluationError::DivisionByZero),
            (Int(a), Int(b)) => a.checked_rem(*b).map(Int).ok_or_else(|| overflow("%")),
            _ => float_op(op, l, r, |a, b| {
                if b == 0.0 {
                    Err(EvaluationError::DivisionByZero)
                } else {
                    Ok(a % b)
                }
            }),
        },
        BinaryOp::And | BinaryOp::Or => {
            // the evaluator short-circuits these before reaching here
            match (l, r) {
                (VariableValue::Bool(a), VariableValue::Bool(b)) => Ok(VariableValue::Bool(
                    if op == BinaryOp::And { *a && *b } else { *a || *b },
                )),
                _ => Err(mismatch(op, "bool operands", l, r)),
            }
        }
    }
}

fn float_op(
    op: BinaryOp,
    l: &VariableValue,
    r: &VariableValue,
    f: impl Fn(f64, f64) -> Result<f64, EvaluationError>,
) -> Result<VariableValue, EvaluationError> {
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => f(a, b).map(VariableValue::Float),
        _ => Err(mismatch(op, "numbers", l, r)),
    }
}

fn index_value(base: &VariableValue, key: &VariableValue) -> Result<VariableValue, EvaluationError> {
    match (base, key) {
        (VariableValue::List(items), VariableValue::Int(i)) => {
            let len = items.len() as i64;
            let resolved = if *i < 0 { len + i } else { *i };
            if resolved < 0 || resolved >= len {
                return Err(EvaluationError::function(
                    "index",
                    format!("index {} out of range for list of length {}", i, len),
                ));
            }
            Ok(items[resolved as usize].clone())
        }
        (VariableValue::Map(map), VariableValue::String(k)) => map
            .get(k)
            .cloned()
            .ok_or_else(|| EvaluationError::UnknownVariable { name: k.clone() }),
        (VariableValue::String(s), VariableValue::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let resolved = if *i < 0 { len + i } else { *i };
            if resolved < 0 || resolved >= len {
                return Err(EvaluationError::function(
                    "index",
                    format!("index {} out of range for string of length {}", i, len),
                ));
            }
            Ok(VariableValue::String(chars[resolved as usize].to_string()))
        }
        _ => Err(EvaluationError::type_mismatch(
            "[]",
            "list[int], map[string] or string[int]",
            &format!("{}[{}]", base.type_name(), key.type_name()),
        )),
    }
}
