//! Expression AST.
//!
//! - `Expr`: literals, variable paths, calls, operators, comprehensions
//! - `BinaryOp` / `UnaryOp`: operator tags
//! - `ComprehensionKind`: `all`/`exists`/`exists_one`/`map`/`filter` macros

use crate::domain::value::VariableValue;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComprehensionKind {
    All,
    Exists,
    ExistsOne,
    Map,
    Filter,
}

impl ComprehensionKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "all" => Some(ComprehensionKind::All),
            "exists" | "any" => Some(ComprehensionKind::Exists),
            "exists_one" => Some(ComprehensionKind::ExistsOne),
            "map" => Some(ComprehensionKind::Map),
            "filter" => Some(ComprehensionKind::Filter),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ComprehensionKind::All => "all",
            ComprehensionKind::Exists => "exists",
            ComprehensionKind::ExistsOne => "exists_one",
            ComprehensionKind::Map => "map",
            ComprehensionKind::Filter => "filter",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(VariableValue),
    Ident(String),
    Member {
        target: Box<Expr>,
        field: String,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    /// Function call; method syntax `x.f(a)` is stored as `f(x, a)`.
    Call {
        function: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    List(Vec<Expr>),
    Comprehension {
        kind: ComprehensionKind,
        range: Box<Expr>,
        var: String,
        body: Box<Expr>,
    },
    /// `has(a.b)`: presence test, never fails on a missing key.
    Has(Box<Expr>),
}

impl Expr {
    /// `a.b.c` for an identifier/member chain, `None` otherwise.
    pub fn dotted_path(&self) -> Option<String> {
        match self {
            Expr::Ident(name) => Some(name.clone()),
            Expr::Member { target, field } => {
                target.dotted_path().map(|base| format!("{}.{}", base, field))
            }
            _ => None,
        }
    }

    /// Root identifier of an identifier/member chain.
    pub fn root_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(name) => Some(name),
            Expr::Member { target, .. } => target.root_ident(),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(VariableValue::String(s)) => write!(f, "{:?}", s),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Ident(name) => write!(f, "{}", name),
            Expr::Member { target, field } => write!(f, "{}.{}", target, field),
            Expr::Index { target, index } => write!(f, "{}[{}]", target, index),
            Expr::Call { function, args } => {
                write!(f, "{}(", function)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => write!(f, "!{}", operand),
                UnaryOp::Negate => write!(f, "-{}", operand),
            },
            Expr::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => write!(f, "({} ? {} : {})", condition, then_branch, else_branch),
            Expr::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Expr::Comprehension {
                kind,
                range,
                var,
                body,
            } => write!(f, "{}.{}({}, {})", range, kind.name(), var, body),
            Expr::Has(target) => write!(f, "has({})", target),
        }
    }
}
