//! Expression compiler.
//!
//! Compiling is syntax-only: the function-existence pass lives in
//! `validator` so the two can run independently.

use crate::domain::ast::Expr;
use crate::domain::error::CompileError;
use crate::domain::parser;
use std::collections::BTreeSet;

/// Parsed expression plus the names it references.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    source: String,
    expr: Expr,
    variables: BTreeSet<String>,
    functions: BTreeSet<String>,
}

impl CompiledExpression {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Free variable paths (`chart.price`, `risk_pct`), excluding
    /// comprehension-bound names.
    pub fn variables(&self) -> &BTreeSet<String> {
        &self.variables
    }

    /// Function names called anywhere in the expression, including
    /// method-style calls and macros.
    pub fn functions(&self) -> &BTreeSet<String> {
        &self.functions
    }
}

pub fn compile(source: &str) -> Result<CompiledExpression, CompileError> {
    let expr = parser::parse(source)?;
    let mut collector = NameCollector::default();
    collector.visit(&expr);
    Ok(CompiledExpression {
        source: source.to_string(),
        expr,
        variables: collector.variables,
        functions: collector.functions,
    })
}

#[derive(Default)]
struct NameCollector {
    bound: Vec<String>,
    variables: BTreeSet<String>,
    functions: BTreeSet<String>,
}

impl NameCollector {
    fn visit(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) => {}
            Expr::Ident(_) | Expr::Member { .. } if expr.dotted_path().is_some() => {
                if let (Some(path), Some(root)) = (expr.dotted_path(), expr.root_ident()) {
                    if !self.bound.iter().any(|b| b == root) {
                        self.variables.insert(path);
                    }
                }
            }
            Expr::Ident(_) => {}
            Expr::Member { target, .. } => self.visit(target),
            Expr::Index { target, index } => {
                self.visit(target);
                self.visit(index);
            }
            Expr::Call { function, args } => {
                self.functions.insert(function.clone());
                for arg in args {
                    self.visit(arg);
                }
            }
            Expr::Unary { operand, .. } => self.visit(operand),
            Expr::Binary { left, right, .. } => {
                self.visit(left);
                self.visit(right);
            }
            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                self.visit(condition);
                self.visit(then_branch);
                self.visit(else_branch);
            }
            Expr::List(items) => {
                for item in items {
                    self.visit(item);
                }
            }
            Expr::Comprehension {
                kind,
                range,
                var,
                body,
            } => {
                self.functions.insert(kind.name().to_string());
                self.visit(range);
                self.bound.push(var.clone());
                self.visit(body);
                self.bound.pop();
            }
            Expr::Has(target) => {
                self.functions.insert("has".to_string());
                self.visit(target);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(set: &BTreeSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    #[test]
    fn collects_variables_and_functions() {
        let compiled =
            compile("chart.price > pct_from_level(bot.entry, 2.0) && risk_pct < 5").unwrap();
        assert_eq!(
            names(compiled.variables()),
            vec!["bot.entry", "chart.price", "risk_pct"]
        );
        assert_eq!(names(compiled.functions()), vec!["pct_from_level"]);
        assert_eq!(compiled.source(), "chart.price > pct_from_level(bot.entry, 2.0) && risk_pct < 5");
    }

    #[test]
    fn comprehension_variable_is_not_free() {
        let compiled = compile("levels.all(l, l > chart.low)").unwrap();
        assert_eq!(names(compiled.variables()), vec!["chart.low", "levels"]);
        assert_eq!(names(compiled.functions()), vec!["all"]);
    }

    #[test]
    fn method_call_records_function_and_receiver() {
        let compiled = compile("bot.symbol.startsWith('BTC')").unwrap();
        assert_eq!(names(compiled.variables()), vec!["bot.symbol"]);
        assert_eq!(names(compiled.functions()), vec!["startsWith"]);
    }

    #[test]
    fn member_of_call_result_is_not_a_variable() {
        let compiled = compile("candle(-1).close > candle(0).open").unwrap();
        assert!(compiled.variables().is_empty());
        assert_eq!(names(compiled.functions()), vec!["candle"]);
    }

    #[test]
    fn compile_error_passes_through() {
        let err = compile("a > ").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn compilation_is_deterministic() {
        assert_eq!(compile("x + 1 > y").unwrap(), compile("x + 1 > y").unwrap());
    }
}
