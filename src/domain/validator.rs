//! Standalone syntax and semantic checker.
//!
//! Never evaluates and never fails: every problem becomes a
//! `ValidationError` in the returned list. Passes run in order over one
//! recovering token stream, so cost stays linear in the source length.
//!
//! 1. bracket balance
//! 2. illegal characters and malformed numbers
//! 3. unterminated strings
//! 4. ternary pairing
//! 5. function existence against known names plus `extra_functions`
//! 6. full parse, only when the lexical passes found nothing

use crate::domain::error::EvaluationError;
use crate::domain::lexer::{tokenize_recovering, LexError, Token, TokenKind};
use crate::domain::parser::parse_tokens;
use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub line: usize,
    pub column: usize,
    pub severity: Severity,
    /// Stable machine-readable code such as `E_UNKNOWN_FUNCTION`.
    pub code: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} [{}] {}",
            self.line, self.column, self.severity, self.code, self.message
        )
    }
}

pub const E_UNBALANCED: &str = "E_UNBALANCED";
pub const E_ILLEGAL_CHAR: &str = "E_ILLEGAL_CHAR";
pub const E_MALFORMED_NUMBER: &str = "E_MALFORMED_NUMBER";
pub const E_UNTERMINATED_STRING: &str = "E_UNTERMINATED_STRING";
pub const E_TERNARY: &str = "E_TERNARY";
pub const E_UNKNOWN_FUNCTION: &str = "E_UNKNOWN_FUNCTION";
pub const E_SYNTAX: &str = "E_SYNTAX";
pub const E_EMPTY: &str = "E_EMPTY";
pub const W_UNUSED_FUNCTION: &str = "W_UNUSED_FUNCTION";
pub const I_FLOAT_EQUALITY: &str = "I_FLOAT_EQUALITY";

/// Validate against a set of known function names.
pub fn validate<'a, I>(source: &str, known_functions: I, extra_functions: &[String]) -> Vec<ValidationError>
where
    I: IntoIterator<Item = &'a str>,
{
    let known: BTreeSet<&str> = known_functions.into_iter().collect();
    let mut checker = Checker::new(source, &known, extra_functions, None);
    // without a deadline the checker cannot time out
    checker.run().unwrap_or_default()
}

/// `validate` with a wall-clock bound.
pub fn validate_with_timeout<'a, I>(
    source: &str,
    known_functions: I,
    extra_functions: &[String],
    timeout: Duration,
) -> Result<Vec<ValidationError>, EvaluationError>
where
    I: IntoIterator<Item = &'a str>,
{
    let known: BTreeSet<&str> = known_functions.into_iter().collect();
    let deadline = (Instant::now() + timeout, timeout.as_millis() as u64);
    Checker::new(source, &known, extra_functions, Some(deadline)).run()
}

struct Checker<'a> {
    source: &'a str,
    known: &'a BTreeSet<&'a str>,
    extra: &'a [String],
    deadline: Option<(Instant, u64)>,
    tokens: Vec<Token>,
    errors: Vec<ValidationError>,
}

impl<'a> Checker<'a> {
    fn new(
        source: &'a str,
        known: &'a BTreeSet<&'a str>,
        extra: &'a [String],
        deadline: Option<(Instant, u64)>,
    ) -> Self {
        Self {
            source,
            known,
            extra,
            deadline,
            tokens: tokenize_recovering(source),
            errors: Vec::new(),
        }
    }

    fn check_deadline(&self) -> Result<(), EvaluationError> {
        if let Some((deadline, limit_ms)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(EvaluationError::Timeout { limit_ms });
            }
        }
        Ok(())
    }

    fn push(&mut self, tok: &Token, severity: Severity, code: &'static str, message: String) {
        self.errors.push(ValidationError {
            line: tok.line,
            column: tok.column,
            severity,
            code,
            message,
        });
    }

    fn run(mut self) -> Result<Vec<ValidationError>, EvaluationError> {
        if self.tokens.is_empty() {
            self.errors.push(ValidationError {
                line: 1,
                column: 1,
                severity: Severity::Error,
                code: E_EMPTY,
                message: "expression is empty".to_string(),
            });
            return Ok(self.errors);
        }

        self.check_brackets();
        self.check_deadline()?;
        self.check_lexical();
        self.check_deadline()?;
        self.check_ternary();
        self.check_deadline()?;
        self.check_functions();
        self.check_deadline()?;

        if self.errors.is_empty() {
            self.check_syntax();
            self.check_float_equality();
        }

        self.errors
            .sort_by(|a, b| (a.line, a.column, a.severity).cmp(&(b.line, b.column, b.severity)));
        Ok(self.errors)
    }

    fn check_brackets(&mut self) {
        let mut stack: Vec<Token> = Vec::new();
        let tokens = std::mem::take(&mut self.tokens);
        for tok in &tokens {
            if tok.kind != TokenKind::Delimiter {
                continue;
            }
            match tok.text.as_str() {
                "(" | "[" => stack.push(tok.clone()),
                ")" | "]" => {
                    let opener = if tok.text == ")" { "(" } else { "[" };
                    match stack.pop() {
                        Some(open) if open.text == opener => {}
                        Some(open) => {
                            self.push(
                                tok,
                                Severity::Error,
                                E_UNBALANCED,
                                format!(
                                    "'{}' does not match '{}' opened at line {}, column {}",
                                    tok.text, open.text, open.line, open.column
                                ),
                            );
                        }
                        None => {
                            self.push(
                                tok,
                                Severity::Error,
                                E_UNBALANCED,
                                format!("unmatched closing '{}'", tok.text),
                            );
                        }
                    }
                }
                _ => {}
            }
        }
        for open in stack {
            self.push(
                &open,
                Severity::Error,
                E_UNBALANCED,
                format!("'{}' is never closed", open.text),
            );
        }
        self.tokens = tokens;
    }

    fn check_lexical(&mut self) {
        let tokens = std::mem::take(&mut self.tokens);
        for tok in &tokens {
            match tok.kind {
                TokenKind::Error(LexError::IllegalCharacter) => self.push(
                    tok,
                    Severity::Error,
                    E_ILLEGAL_CHAR,
                    format!("illegal character '{}'", tok.text),
                ),
                TokenKind::Error(LexError::MalformedNumber) => self.push(
                    tok,
                    Severity::Error,
                    E_MALFORMED_NUMBER,
                    format!("malformed number '{}'", tok.text),
                ),
                TokenKind::Error(LexError::UnterminatedString) => self.push(
                    tok,
                    Severity::Error,
                    E_UNTERMINATED_STRING,
                    "string literal is never closed".to_string(),
                ),
                _ => {}
            }
        }
        self.tokens = tokens;
    }

    /// Every `?` needs a `:` at the same bracket depth, and the reverse.
    fn check_ternary(&mut self) {
        let tokens = std::mem::take(&mut self.tokens);
        let mut open: Vec<Vec<&Token>> = vec![Vec::new()];
        for tok in &tokens {
            if tok.is_delim("(") || tok.is_delim("[") {
                open.push(Vec::new());
            } else if tok.is_delim(")") || tok.is_delim("]") {
                if open.len() > 1 {
                    if let Some(level) = open.pop() {
                        for q in level {
                            self.push(q, Severity::Error, E_TERNARY, "'?' without matching ':'".to_string());
                        }
                    }
                }
            } else if tok.is_delim(",") {
                if let Some(level) = open.last_mut() {
                    let pending = std::mem::take(level);
                    for q in pending {
                        self.push(q, Severity::Error, E_TERNARY, "'?' without matching ':'".to_string());
                    }
                }
            } else if tok.is_op("?") {
                if let Some(level) = open.last_mut() {
                    level.push(tok);
                }
            } else if tok.is_op(":") {
                let matched = open.last_mut().and_then(|level| level.pop()).is_some();
                if !matched {
                    self.push(tok, Severity::Error, E_TERNARY, "':' without preceding '?'".to_string());
                }
            }
        }
        for level in open {
            for q in level {
                self.push(q, Severity::Error, E_TERNARY, "'?' without matching ':'".to_string());
            }
        }
        self.tokens = tokens;
    }

    fn is_known(&self, name: &str) -> bool {
        self.known.contains(name) || self.extra.iter().any(|e| e == name)
    }

    fn check_functions(&mut self) {
        let tokens = std::mem::take(&mut self.tokens);
        let mut called: BTreeSet<&str> = BTreeSet::new();
        for (i, tok) in tokens.iter().enumerate() {
            if tok.kind != TokenKind::Identifier {
                continue;
            }
            let is_call = tokens.get(i + 1).is_some_and(|next| next.is_delim("("));
            if !is_call {
                continue;
            }
            called.insert(tok.text.as_str());
            if !self.is_known(&tok.text) {
                let message = match self.suggest(&tok.text) {
                    Some(close) => format!("unknown function '{}'; did you mean '{}'?", tok.text, close),
                    None => format!("unknown function '{}'", tok.text),
                };
                self.push(tok, Severity::Error, E_UNKNOWN_FUNCTION, message);
            }
        }

        // names are also "used" when they appear as a plain identifier,
        // e.g. `rsi14.value` where rsi14 is host-declared
        let mentioned: BTreeSet<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Identifier)
            .map(|t| t.text.as_str())
            .collect();
        for name in self.extra {
            if !called.contains(name.as_str()) && !mentioned.contains(name.as_str()) {
                self.errors.push(ValidationError {
                    line: 1,
                    column: 1,
                    severity: Severity::Warning,
                    code: W_UNUSED_FUNCTION,
                    message: format!("custom function '{}' is declared but never used", name),
                });
            }
        }
        self.tokens = tokens;
    }

    /// Closest known name within edit distance 2.
    fn suggest(&self, name: &str) -> Option<String> {
        self.known
            .iter()
            .copied()
            .chain(self.extra.iter().map(String::as_str))
            .map(|candidate| (edit_distance(name, candidate), candidate))
            .filter(|(d, _)| *d <= 2)
            .min()
            .map(|(_, c)| c.to_string())
    }

    fn check_syntax(&mut self) {
        if let Err(err) = parse_tokens(self.source, self.tokens.clone()) {
            self.errors.push(ValidationError {
                line: err.line,
                column: err.column,
                severity: Severity::Error,
                code: E_SYNTAX,
                message: err.message,
            });
        }
    }

    fn check_float_equality(&mut self) {
        let tokens = std::mem::take(&mut self.tokens);
        for (i, tok) in tokens.iter().enumerate() {
            if !(tok.is_op("==") || tok.is_op("!=")) {
                continue;
            }
            let float_neighbor = [i.checked_sub(1), Some(i + 1)]
                .into_iter()
                .flatten()
                .filter_map(|j| tokens.get(j))
                .any(|t| t.kind == TokenKind::Float);
            if float_neighbor {
                self.push(
                    tok,
                    Severity::Info,
                    I_FLOAT_EQUALITY,
                    format!(
                        "exact '{}' on a float literal; consider approx_eq()",
                        tok.text
                    ),
                );
            }
        }
        self.tokens = tokens;
    }
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
