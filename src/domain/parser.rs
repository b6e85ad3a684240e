//! Expression parser.
//!
//! Recursive descent over the token stream produced by `lexer::tokenize`.
//! Converts text to an `Expr` with errors that carry line/column of the
//! offending token and an expected/found message.
//!
//! Precedence, loosest first: `?:`, `||`, `&&`, equality, relational/`in`,
//! additive, multiplicative, unary, postfix (member, index, call).

use crate::domain::ast::{BinaryOp, ComprehensionKind, Expr, UnaryOp};
use crate::domain::error::CompileError;
use crate::domain::lexer::{tokenize, LexError, Token, TokenKind};
use crate::domain::value::VariableValue;

/// Bound on syntax tree height. Brackets, unary operators, chained binary
/// operators and postfix steps all count, so neither deep nesting nor a
/// long flat chain can exhaust the stack.
const MAX_DEPTH: usize = 256;

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    /// Deepest `depth` reached within the subtree being parsed.
    peak: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            input,
            tokens,
            pos: 0,
            depth: 0,
            peak: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn error_here(&self, message: impl Into<String>) -> CompileError {
        match self.peek() {
            Some(tok) => error_at(tok, message),
            None => {
                let (line, column) = end_position(self.input);
                CompileError {
                    message: message.into(),
                    line,
                    column,
                    offset: self.input.len(),
                }
            }
        }
    }

    fn describe_current(&self) -> String {
        match self.peek() {
            Some(tok) => format!("'{}'", tok.text),
            None => "end of input".to_string(),
        }
    }

    fn consume_op(&mut self, op: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_op(op)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn consume_delim(&mut self, delim: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_delim(delim)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_delim(&mut self, delim: &str) -> Result<(), CompileError> {
        if self.consume_delim(delim) {
            Ok(())
        } else {
            Err(self.error_here(format!(
                "expected '{}', found {}",
                delim,
                self.describe_current()
            )))
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), CompileError> {
        if self.consume_op(op) {
            Ok(())
        } else {
            Err(self.error_here(format!(
                "expected '{}', found {}",
                op,
                self.describe_current()
            )))
        }
    }

    fn expect_identifier(&mut self) -> Result<String, CompileError> {
        match self.peek() {
            Some(tok) if tok.kind == TokenKind::Identifier => {
                let name = tok.text.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error_here(format!(
                "expected identifier, found {}",
                self.describe_current()
            ))),
        }
    }

    fn enter(&mut self) -> Result<(), CompileError> {
        self.depth += 1;
        self.peak = self.peak.max(self.depth);
        if self.depth > MAX_DEPTH {
            return Err(self.error_here("expression nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn parse_expression(&mut self) -> Result<Expr, CompileError> {
        self.enter()?;
        let result = self.parse_ternary();
        self.leave();
        result
    }

    fn parse_ternary(&mut self) -> Result<Expr, CompileError> {
        let condition = self.parse_or()?;
        if !self.consume_op("?") {
            return Ok(condition);
        }
        let then_branch = self.parse_expression()?;
        self.expect_op(":")?;
        let else_branch = self.parse_expression()?;
        Ok(Expr::Ternary {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        self.parse_chain(Self::parse_and, |p| {
            (p.consume_op("||") || p.consume_keyword("or")).then_some(BinaryOp::Or)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        self.parse_chain(Self::parse_equality, |p| {
            (p.consume_op("&&") || p.consume_keyword("and")).then_some(BinaryOp::And)
        })
    }

    fn parse_equality(&mut self) -> Result<Expr, CompileError> {
        self.parse_chain(Self::parse_relation, |p| {
            if p.consume_op("==") {
                Some(BinaryOp::Eq)
            } else if p.consume_op("!=") {
                Some(BinaryOp::Ne)
            } else {
                None
            }
        })
    }

    fn parse_relation(&mut self) -> Result<Expr, CompileError> {
        self.parse_chain(Self::parse_additive, |p| {
            if p.consume_op("<=") {
                Some(BinaryOp::Le)
            } else if p.consume_op(">=") {
                Some(BinaryOp::Ge)
            } else if p.consume_op("<") {
                Some(BinaryOp::Lt)
            } else if p.consume_op(">") {
                Some(BinaryOp::Gt)
            } else if p.consume_keyword("in") {
                Some(BinaryOp::In)
            } else {
                None
            }
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, CompileError> {
        self.parse_chain(Self::parse_multiplicative, |p| {
            if p.consume_op("+") {
                Some(BinaryOp::Add)
            } else if p.consume_op("-") {
                Some(BinaryOp::Sub)
            } else {
                None
            }
        })
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, CompileError> {
        self.parse_chain(Self::parse_unary, |p| {
            if p.consume_op("*") {
                Some(BinaryOp::Mul)
            } else if p.consume_op("/") {
                Some(BinaryOp::Div)
            } else if p.consume_op("%") {
                Some(BinaryOp::Mod)
            } else {
                None
            }
        })
    }

    /// Left-associative `operand (op operand)*`. The tree grows one level per
    /// operator on top of the first operand's height, so the chain starts
    /// counting from the deepest point that operand reached.
    fn parse_chain(
        &mut self,
        operand: fn(&mut Self) -> Result<Expr, CompileError>,
        operator: fn(&mut Self) -> Option<BinaryOp>,
    ) -> Result<Expr, CompileError> {
        let base = self.depth;
        let outer_peak = std::mem::replace(&mut self.peak, base);
        let mut left = operand(self)?;
        let mut stacked = false;
        while let Some(op) = operator(self) {
            if !stacked {
                self.depth = self.peak;
                stacked = true;
            }
            self.enter()?;
            let right = operand(self)?;
            left = binary(op, left, right);
        }
        self.depth = base;
        self.peak = self.peak.max(outer_peak);
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        self.enter()?;
        let result = if self.consume_op("!") || self.consume_keyword("not") {
            self.parse_unary().map(|operand| Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            })
        } else if self.consume_op("-") {
            self.parse_unary().map(|operand| match operand {
                Expr::Literal(VariableValue::Float(f)) => Expr::Literal(VariableValue::Float(-f)),
                Expr::Literal(VariableValue::Int(i)) if i != i64::MIN => {
                    Expr::Literal(VariableValue::Int(-i))
                }
                other => Expr::Unary {
                    op: UnaryOp::Negate,
                    operand: Box::new(other),
                },
            })
        } else {
            self.parse_postfix()
        };
        self.leave();
        result
    }

    fn parse_postfix(&mut self) -> Result<Expr, CompileError> {
        let base = self.depth;
        let outer_peak = std::mem::replace(&mut self.peak, base);
        let mut expr = self.parse_primary()?;
        let mut stacked = false;
        loop {
            let member = self.consume_op(".");
            let indexed = !member && self.consume_delim("[");
            if !member && !indexed {
                break;
            }
            if !stacked {
                self.depth = self.peak;
                stacked = true;
            }
            self.enter()?;
            if member {
                let name = self.expect_identifier()?;
                if self.consume_delim("(") {
                    let args = self.parse_arguments()?;
                    expr = method_call(expr, name, args);
                } else {
                    expr = Expr::Member {
                        target: Box::new(expr),
                        field: name,
                    };
                }
            } else {
                let index = self.parse_expression()?;
                self.expect_delim("]")?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                };
            }
        }
        self.depth = base;
        self.peak = self.peak.max(outer_peak);
        Ok(expr)
    }

    /// Arguments after an already-consumed `(`, through the closing `)`.
    fn parse_arguments(&mut self) -> Result<Vec<Expr>, CompileError> {
        let mut args = Vec::new();
        if self.consume_delim(")") {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            if self.consume_delim(")") {
                return Ok(args);
            }
            if !self.consume_delim(",") {
                return Err(self.error_here(format!(
                    "expected ',' or ')', found {}",
                    self.describe_current()
                )));
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let Some(tok) = self.peek().cloned() else {
            return Err(self.error_here("expected expression, found end of input"));
        };

        match tok.kind {
            TokenKind::Int => {
                self.pos += 1;
                tok.text
                    .parse::<i64>()
                    .map(|i| Expr::Literal(VariableValue::Int(i)))
                    .map_err(|_| error_at(&tok, format!("integer literal out of range: {}", tok.text)))
            }
            TokenKind::Float => {
                self.pos += 1;
                tok.text
                    .parse::<f64>()
                    .map(|f| Expr::Literal(VariableValue::Float(f)))
                    .map_err(|_| error_at(&tok, format!("invalid number: {}", tok.text)))
            }
            TokenKind::String => {
                self.pos += 1;
                Ok(Expr::Literal(VariableValue::String(tok.text)))
            }
            TokenKind::Keyword => match tok.text.as_str() {
                "true" => {
                    self.pos += 1;
                    Ok(Expr::Literal(VariableValue::Bool(true)))
                }
                "false" => {
                    self.pos += 1;
                    Ok(Expr::Literal(VariableValue::Bool(false)))
                }
                "null" => {
                    self.pos += 1;
                    Ok(Expr::Literal(VariableValue::Null))
                }
                _ => Err(error_at(
                    &tok,
                    format!("expected expression, found keyword '{}'", tok.text),
                )),
            },
            TokenKind::Identifier => {
                self.pos += 1;
                if self.peek().is_some_and(|t| t.is_delim("(")) {
                    self.pos += 1;
                    let args = self.parse_arguments()?;
                    return function_call(&tok, args);
                }
                Ok(Expr::Ident(tok.text))
            }
            TokenKind::Delimiter if tok.text == "(" => {
                self.pos += 1;
                let inner = self.parse_expression()?;
                self.expect_delim(")")?;
                Ok(inner)
            }
            TokenKind::Delimiter if tok.text == "[" => {
                self.pos += 1;
                self.parse_list()
            }
            _ => Err(error_at(
                &tok,
                format!("expected expression, found '{}'", tok.text),
            )),
        }
    }

    fn parse_list(&mut self) -> Result<Expr, CompileError> {
        let mut items = Vec::new();
        if self.consume_delim("]") {
            return Ok(Expr::List(items));
        }
        loop {
            items.push(self.parse_expression()?);
            if self.consume_delim("]") {
                return Ok(Expr::List(items));
            }
            if !self.consume_delim(",") {
                return Err(self.error_here(format!(
                    "expected ',' or ']', found {}",
                    self.describe_current()
                )));
            }
            // trailing comma
            if self.consume_delim("]") {
                return Ok(Expr::List(items));
            }
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn function_call(name_tok: &Token, mut args: Vec<Expr>) -> Result<Expr, CompileError> {
    let name = name_tok.text.as_str();
    if name == "has" {
        if args.len() != 1 || args[0].dotted_path().is_none() {
            return Err(error_at(
                name_tok,
                "has() expects a single field selection such as has(trade.side)",
            ));
        }
        return Ok(Expr::Has(Box::new(args.remove(0))));
    }
    if let Some(kind) = ComprehensionKind::from_name(name) {
        if args.len() == 3 {
            if let Expr::Ident(var) = &args[1] {
                let var = var.clone();
                let body = args.remove(2);
                let range = args.remove(0);
                return Ok(Expr::Comprehension {
                    kind,
                    range: Box::new(range),
                    var,
                    body: Box::new(body),
                });
            }
        }
    }
    Ok(Expr::Call {
        function: name.to_string(),
        args,
    })
}

fn method_call(target: Expr, name: String, mut args: Vec<Expr>) -> Expr {
    if let Some(kind) = ComprehensionKind::from_name(&name) {
        if args.len() == 2 {
            if let Expr::Ident(var) = &args[0] {
                let var = var.clone();
                let body = args.remove(1);
                return Expr::Comprehension {
                    kind,
                    range: Box::new(target),
                    var,
                    body: Box::new(body),
                };
            }
        }
    }
    let mut full_args = Vec::with_capacity(args.len() + 1);
    full_args.push(target);
    full_args.extend(args);
    Expr::Call {
        function: name,
        args: full_args,
    }
}

fn error_at(tok: &Token, message: impl Into<String>) -> CompileError {
    CompileError {
        message: message.into(),
        line: tok.line,
        column: tok.column,
        offset: tok.offset,
    }
}

fn lex_error(tok: &Token, err: LexError) -> CompileError {
    let message = match err {
        LexError::UnterminatedString => "unterminated string literal".to_string(),
        LexError::IllegalCharacter => format!("unexpected character '{}'", tok.text),
        LexError::MalformedNumber => format!("malformed number '{}'", tok.text),
    };
    error_at(tok, message)
}

/// Line and column just past the last character of `input`.
pub(crate) fn end_position(input: &str) -> (usize, usize) {
    let mut line = 1;
    let mut column = 1;
    for ch in input.chars() {
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

/// Parse a token stream that was produced from `input`.
pub(crate) fn parse_tokens(input: &str, tokens: Vec<Token>) -> Result<Expr, CompileError> {
    if let Some(bad) = tokens.iter().find(|t| t.is_error()) {
        if let TokenKind::Error(err) = bad.kind {
            return Err(lex_error(bad, err));
        }
    }
    if tokens.is_empty() {
        return Err(CompileError {
            message: "empty expression".to_string(),
            line: 1,
            column: 1,
            offset: 0,
        });
    }

    let mut parser = Parser::new(input, tokens);
    let expr = parser.parse_expression()?;

    if parser.peek().is_some() {
        return Err(parser.error_here(format!(
            "unexpected trailing input {}",
            parser.describe_current()
        )));
    }
    Ok(expr)
}

pub fn parse(input: &str) -> Result<Expr, CompileError> {
    parse_tokens(input, tokenize(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Expr {
        Expr::Ident(name.into())
    }

    fn member(target: Expr, field: &str) -> Expr {
        Expr::Member {
            target: Box::new(target),
            field: field.into(),
        }
    }

    fn int(i: i64) -> Expr {
        Expr::Literal(VariableValue::Int(i))
    }

    #[test]
    fn parse_keyword_and() {
        let expr = parse("chart.price > 90000 and bot.paper_mode").unwrap();
        assert_eq!(
            expr,
            binary(
                BinaryOp::And,
                binary(BinaryOp::Gt, member(ident("chart"), "price"), int(90000)),
                member(ident("bot"), "paper_mode"),
            )
        );
    }

    #[test]
    fn symbolic_and_keyword_operators_are_equivalent() {
        assert_eq!(parse("a && !b || c").unwrap(), parse("a and not b or c").unwrap());
    }

    #[test]
    fn precedence_multiplication_over_addition() {
        let expr = parse("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            binary(BinaryOp::Add, int(1), binary(BinaryOp::Mul, int(2), int(3)))
        );
    }

    #[test]
    fn precedence_and_over_or() {
        let expr = parse("a || b && c").unwrap();
        assert_eq!(
            expr,
            binary(
                BinaryOp::Or,
                ident("a"),
                binary(BinaryOp::And, ident("b"), ident("c"))
            )
        );
    }

    #[test]
    fn left_associative_subtraction() {
        let expr = parse("10 - 3 - 2").unwrap();
        assert_eq!(
            expr,
            binary(BinaryOp::Sub, binary(BinaryOp::Sub, int(10), int(3)), int(2))
        );
    }

    #[test]
    fn nested_ternary_is_right_associative() {
        let expr = parse("a ? 1 : b ? 2 : 3").unwrap();
        match expr {
            Expr::Ternary { else_branch, .. } => {
                assert!(matches!(*else_branch, Expr::Ternary { .. }));
            }
            other => panic!("expected ternary, got {:?}", other),
        }
    }

    #[test]
    fn negative_literal_is_folded() {
        assert_eq!(parse("-1").unwrap(), int(-1));
        assert_eq!(
            parse("-x").unwrap(),
            Expr::Unary {
                op: UnaryOp::Negate,
                operand: Box::new(ident("x"))
            }
        );
    }

    #[test]
    fn candle_member_access() {
        let expr = parse("candle(-1).close").unwrap();
        assert_eq!(
            expr,
            member(
                Expr::Call {
                    function: "candle".into(),
                    args: vec![int(-1)]
                },
                "close"
            )
        );
    }

    #[test]
    fn method_call_desugars_to_function() {
        let expr = parse("bot.symbol.startsWith('BTC')").unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                function: "startsWith".into(),
                args: vec![
                    member(ident("bot"), "symbol"),
                    Expr::Literal(VariableValue::String("BTC".into()))
                ]
            }
        );
    }

    #[test]
    fn method_comprehension() {
        let expr = parse("xs.all(x, x > 0)").unwrap();
        match expr {
            Expr::Comprehension { kind, var, .. } => {
                assert_eq!(kind, ComprehensionKind::All);
                assert_eq!(var, "x");
            }
            other => panic!("expected comprehension, got {:?}", other),
        }
    }

    #[test]
    fn function_form_comprehension() {
        let expr = parse("filter([1, 2, 3], v, v % 2 == 1)").unwrap();
        assert!(matches!(
            expr,
            Expr::Comprehension {
                kind: ComprehensionKind::Filter,
                ..
            }
        ));
    }

    #[test]
    fn plain_all_over_list_stays_a_call() {
        let expr = parse("all([a, b])").unwrap();
        assert!(matches!(expr, Expr::Call { ref function, .. } if function == "all"));
    }

    #[test]
    fn has_macro() {
        assert_eq!(
            parse("has(trade.side)").unwrap(),
            Expr::Has(Box::new(member(ident("trade"), "side")))
        );
        assert!(parse("has(1 + 2)").is_err());
    }

    #[test]
    fn index_and_list_literal() {
        let expr = parse("[1, 2, 3][0]").unwrap();
        assert!(matches!(expr, Expr::Index { .. }));
        assert_eq!(parse("[1, 2,]").unwrap(), Expr::List(vec![int(1), int(2)]));
        assert_eq!(parse("[]").unwrap(), Expr::List(vec![]));
    }

    #[test]
    fn in_operator() {
        let expr = parse("regime.current in ['TREND_BULL', 'RANGE']").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::In, .. }));
    }

    #[test]
    fn error_missing_paren() {
        let err = parse("clamp(1, 2").unwrap_err();
        assert!(err.message.contains("expected ',' or ')'"), "{}", err.message);
        assert_eq!(err.column, 11);
    }

    #[test]
    fn error_trailing_input() {
        let err = parse("a b").unwrap_err();
        assert!(err.message.contains("trailing"));
        assert_eq!((err.line, err.column), (1, 3));
    }

    #[test]
    fn error_dangling_operator() {
        let err = parse("a &&").unwrap_err();
        assert!(err.message.contains("end of input"));
    }

    #[test]
    fn error_reports_second_line() {
        let err = parse("a &&\n  > 3").unwrap_err();
        assert_eq!((err.line, err.column), (2, 3));
    }

    #[test]
    fn error_lexical() {
        let err = parse("invalid syntax here &&& ||").unwrap_err();
        assert!(err.message.contains("unexpected character '&'"));
        let err = parse("x == 'open").unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn error_empty_input() {
        assert_eq!(parse("").unwrap_err().message, "empty expression");
        assert_eq!(parse("   ").unwrap_err().message, "empty expression");
    }

    #[test]
    fn error_ternary_without_colon() {
        let err = parse("a ? 1").unwrap_err();
        assert!(err.message.contains("expected ':'"));
    }

    #[test]
    fn deep_nesting_is_rejected_not_overflowed() {
        let src = "(".repeat(5000) + "1" + &")".repeat(5000);
        let err = parse(&src).unwrap_err();
        assert!(err.message.contains("nested too deeply"));
    }

    #[test]
    fn long_flat_chain_is_rejected() {
        let src = vec!["1"; 300_000].join("+");
        let err = parse(&src).unwrap_err();
        assert!(err.message.contains("nested too deeply"));

        let src = vec!["x"; 100_000].join(" && ");
        assert!(parse(&src).is_err());
    }

    #[test]
    fn long_member_chain_is_rejected() {
        let src = "a".to_string() + &".b".repeat(100_000);
        assert!(parse(&src).is_err());
        let src = "a".to_string() + &"[0]".repeat(100_000);
        assert!(parse(&src).is_err());
    }

    #[test]
    fn chain_counts_on_top_of_nested_operand() {
        // each level is shallow on its own but the tree is as tall as the sum
        let nested = "(".repeat(100) + "1" + &")+1".repeat(100);
        assert!(parse(&nested).is_err());
    }

    #[test]
    fn moderate_chains_parse() {
        assert!(parse(&vec!["1"; 100].join(" + ")).is_ok());
        assert!(parse(&("chart".to_string() + &".x".repeat(50))).is_ok());
        assert!(parse("a.b.c > 1 && (x + y * z) / 2 < w[0].v || !flag").is_ok());
    }

    #[test]
    fn integer_out_of_range() {
        assert!(parse("99999999999999999999").is_err());
    }

    #[test]
    fn display_roundtrips_through_parser() {
        let src = "(chart.close > 100) && in_regime('TREND_BULL')";
        let expr = parse(src).unwrap();
        assert_eq!(parse(&expr.to_string()).unwrap(), expr);
    }
}
