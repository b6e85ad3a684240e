//! Single-pass tokenizer for expression text.
//!
//! Lexical problems (unterminated strings, characters outside the grammar,
//! malformed numbers) are reported as `TokenKind::Error` tokens instead of
//! failing the call. `tokenize` stops at the first error token; the validator
//! uses `tokenize_recovering`, which skips past an offending character so a
//! single run can enumerate every problem.

pub const KEYWORDS: &[&str] = &["true", "false", "null", "and", "or", "not", "in"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexError {
    UnterminatedString,
    IllegalCharacter,
    MalformedNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Int,
    Float,
    String,
    Identifier,
    Keyword,
    Operator,
    Delimiter,
    Error(LexError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Lexeme; for strings this is the unescaped content.
    pub text: String,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Token {
    pub fn is_error(&self) -> bool {
        matches!(self.kind, TokenKind::Error(_))
    }

    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }

    pub fn is_delim(&self, delim: &str) -> bool {
        self.kind == TokenKind::Delimiter && self.text == delim
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text == keyword
    }
}

pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source, false).run()
}

pub fn tokenize_recovering(source: &str) -> Vec<Token> {
    Lexer::new(source, true).run()
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    recover: bool,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str, recover: bool) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            column: 1,
            recover,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.remaining().chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn run(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let Some(ch) = self.peek() else {
                break;
            };
            let (line, column, offset) = (self.line, self.column, self.pos);
            let (kind, text) = if ch.is_ascii_digit() {
                self.lex_number()
            } else if ch == '"' || ch == '\'' {
                self.lex_string(ch)
            } else if ch.is_alphabetic() || ch == '_' {
                self.lex_word()
            } else {
                self.lex_symbol(ch)
            };
            let stop = matches!(kind, TokenKind::Error(LexError::UnterminatedString))
                || (matches!(kind, TokenKind::Error(_)) && !self.recover);
            tokens.push(Token {
                kind,
                text,
                line,
                column,
                offset,
            });
            if stop {
                break;
            }
        }
        tokens
    }

    fn lex_number(&mut self) -> (TokenKind, String) {
        let start = self.pos;
        let mut is_float = false;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            is_float = true;
            self.advance();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.advance();
            }
            let mut digits = 0;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                digits += 1;
                self.advance();
            }
            if digits == 0 {
                return (
                    TokenKind::Error(LexError::MalformedNumber),
                    self.input[start..self.pos].to_string(),
                );
            }
        }
        // `12abc` is a number glued to a word
        if self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
                self.advance();
            }
            return (
                TokenKind::Error(LexError::MalformedNumber),
                self.input[start..self.pos].to_string(),
            );
        }
        let kind = if is_float {
            TokenKind::Float
        } else {
            TokenKind::Int
        };
        (kind, self.input[start..self.pos].to_string())
    }

    fn lex_string(&mut self, quote: char) -> (TokenKind, String) {
        self.advance();
        let mut value = String::new();
        loop {
            match self.advance() {
                None => return (TokenKind::Error(LexError::UnterminatedString), value),
                Some(c) if c == quote => return (TokenKind::String, value),
                Some('\n') => return (TokenKind::Error(LexError::UnterminatedString), value),
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('\\') => value.push('\\'),
                    Some('\'') => value.push('\''),
                    Some('"') => value.push('"'),
                    Some(other) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => return (TokenKind::Error(LexError::UnterminatedString), value),
                },
                Some(c) => value.push(c),
            }
        }
    }

    fn lex_word(&mut self) -> (TokenKind, String) {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let word = &self.input[start..self.pos];
        let kind = if KEYWORDS.contains(&word) {
            TokenKind::Keyword
        } else {
            TokenKind::Identifier
        };
        (kind, word.to_string())
    }

    fn lex_symbol(&mut self, ch: char) -> (TokenKind, String) {
        let two: String = self.remaining().chars().take(2).collect();
        if matches!(two.as_str(), "&&" | "||" | "==" | "!=" | "<=" | ">=") {
            self.advance();
            self.advance();
            return (TokenKind::Operator, two);
        }
        self.advance();
        match ch {
            '(' | ')' | '[' | ']' | ',' => (TokenKind::Delimiter, ch.to_string()),
            '+' | '-' | '*' | '/' | '%' | '<' | '>' | '!' | '?' | ':' | '.' => {
                (TokenKind::Operator, ch.to_string())
            }
            _ => (TokenKind::Error(LexError::IllegalCharacter), ch.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_comparison() {
        let tokens = tokenize("chart.price > 90000 and bot.paper_mode");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["chart", ".", "price", ">", "90000", "and", "bot", ".", "paper_mode"]
        );
        assert_eq!(tokens[4].kind, TokenKind::Int);
        assert_eq!(tokens[5].kind, TokenKind::Keyword);
    }

    #[test]
    fn tracks_line_and_column() {
        let tokens = tokenize("a &&\n  b");
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (1, 3));
        assert_eq!((tokens[2].line, tokens[2].column), (2, 3));
    }

    #[test]
    fn floats_and_exponents() {
        assert_eq!(kinds("1.5 2e3 7"), vec![TokenKind::Float, TokenKind::Float, TokenKind::Int]);
    }

    #[test]
    fn number_followed_by_member_access() {
        // `1.close` stays Int + '.' + identifier
        assert_eq!(
            kinds("1.close"),
            vec![TokenKind::Int, TokenKind::Operator, TokenKind::Identifier]
        );
    }

    #[test]
    fn string_escapes() {
        let tokens = tokenize(r#"'it\'s' "a\"b""#);
        assert_eq!(tokens[0].text, "it's");
        assert_eq!(tokens[1].text, "a\"b");
    }

    #[test]
    fn unterminated_string_is_error_token() {
        let tokens = tokenize("x == 'abc");
        let last = tokens.last().unwrap();
        assert_eq!(last.kind, TokenKind::Error(LexError::UnterminatedString));
        assert_eq!(last.column, 6);
    }

    #[test]
    fn illegal_character_stops_strict_lexing() {
        let tokens = tokenize("a & b");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].kind, TokenKind::Error(LexError::IllegalCharacter));
    }

    #[test]
    fn recovering_mode_continues_after_illegal_character() {
        let tokens = tokenize_recovering("a & b # c");
        let errors = tokens.iter().filter(|t| t.is_error()).count();
        assert_eq!(errors, 2);
        assert_eq!(tokens.last().unwrap().text, "c");
    }

    #[test]
    fn triple_ampersand() {
        let tokens = tokenize_recovering("x &&& y");
        assert!(tokens[1].is_op("&&"));
        assert_eq!(tokens[2].kind, TokenKind::Error(LexError::IllegalCharacter));
    }

    #[test]
    fn malformed_number() {
        assert_eq!(kinds("12abc"), vec![TokenKind::Error(LexError::MalformedNumber)]);
        assert_eq!(kinds("1e"), vec![TokenKind::Error(LexError::MalformedNumber)]);
    }

    #[test]
    fn empty_input() {
        assert!(tokenize("   ").is_empty());
    }
}
