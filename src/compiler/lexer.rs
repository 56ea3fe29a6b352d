//! MPD lexer.
//!
//! Scans left to right and never aborts: unknown characters and broken
//! strings are reported as diagnostics and scanning continues. The token
//! stream always ends with an `Eof` token.

use super::diagnostic::{Diagnostic, Position, Span, codes};
use super::token::{Token, TokenKind, TokenValue, is_keyword};

const TWO_CHAR_OPERATORS: &[&str] = &["==", "!=", "<=", ">=", "&&", "||", "->"];
const ONE_CHAR_OPERATORS: &[char] = &['+', '-', '*', '/', '%', '<', '>', '!', '='];
const PUNCTUATION: &[char] = &['{', '}', '(', ')', '[', ']', ',', ':', ';', '.', '$'];

/// Tokens plus the lexical diagnostics found while producing them.
#[derive(Debug, Clone)]
pub struct LexOutput {
    /// Token stream terminated by `Eof`.
    pub tokens: Vec<Token>,
    /// Lexical errors.
    pub diagnostics: Vec<Diagnostic>,
}

/// Tokenize MPD source text.
pub fn lex(source: &str) -> LexOutput {
    let mut lexer = Lexer::new(source);
    lexer.run();
    LexOutput {
        tokens: lexer.tokens,
        diagnostics: lexer.diagnostics,
    }
}

struct Lexer<'s> {
    src: &'s str,
    pos: Position,
    tokens: Vec<Token>,
    diagnostics: Vec<Diagnostic>,
}

impl<'s> Lexer<'s> {
    fn new(src: &'s str) -> Self {
        Self {
            src,
            pos: Position::start(),
            tokens: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn rest(&self) -> &'s str {
        &self.src[self.pos.offset..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos.offset += ch.len_utf8();
        if ch == '\n' {
            self.pos.line += 1;
            self.pos.column = 1;
        } else {
            self.pos.column += 1;
        }
        Some(ch)
    }

    fn advance_by(&mut self, chars: usize) {
        for _ in 0..chars {
            self.advance();
        }
    }

    fn run(&mut self) {
        loop {
            self.skip_trivia();
            if self.peek().is_none() {
                break;
            }
            let start = self.pos;
            if self.try_heredoc(start)
                || self.try_string(start)
                || self.try_color(start)
                || self.try_number(start)
                || self.try_word(start)
                || self.try_operator(start)
                || self.try_punct(start)
            {
                continue;
            }
            let ch = self.advance().unwrap_or_default();
            self.diagnostics.push(Diagnostic::error(
                codes::UNEXPECTED_CHARACTER,
                format!("unexpected character {ch:?}"),
                Span::new(start, self.pos),
            ));
        }
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            value: TokenValue::None,
            image: String::new(),
            start: self.pos,
            end: self.pos,
        });
    }

    fn push(&mut self, kind: TokenKind, value: TokenValue, start: Position) {
        let image = self.src[start.offset..self.pos.offset].to_string();
        self.tokens.push(Token {
            kind,
            value,
            image,
            start,
            end: self.pos,
        });
    }

    fn skip_trivia(&mut self) {
        loop {
            while matches!(self.peek(), Some(c) if c.is_whitespace()) {
                self.advance();
            }
            let rest = self.rest();
            let line_comment =
                rest.starts_with("//") || (rest.starts_with('#') && color_len(rest).is_none());
            if !line_comment {
                break;
            }
            while !matches!(self.peek(), None | Some('\n')) {
                self.advance();
            }
        }
    }

    // `<<<TAG\n ... \nTAG>>>`. Anything malformed falls through to the
    // operator rules.
    fn try_heredoc(&mut self, start: Position) -> bool {
        let rest = self.rest();
        let Some(after) = rest.strip_prefix("<<<") else {
            return false;
        };
        let tag_len = after
            .char_indices()
            .take_while(|(i, c)| {
                if *i == 0 {
                    c.is_ascii_alphabetic() || *c == '_'
                } else {
                    c.is_ascii_alphanumeric() || *c == '_' || *c == '-'
                }
            })
            .count();
        if tag_len == 0 {
            return false;
        }
        let tag = &after[..tag_len];
        let header = &after[tag_len..];
        let Some(newline) = header.find('\n') else {
            return false;
        };
        if !header[..newline].trim().is_empty() {
            return false;
        }

        let body_start = 3 + tag_len + newline + 1;
        let terminator = format!("{tag}>>>");
        let mut line_start = body_start;
        let mut found = None;
        while line_start <= rest.len() {
            let line_end = rest[line_start..]
                .find('\n')
                .map(|i| line_start + i)
                .unwrap_or(rest.len());
            let line = &rest[line_start..line_end];
            if line.trim_end_matches('\r') == terminator {
                let close = line_start + terminator.len();
                found = Some((line_start, close));
                break;
            }
            if line_end >= rest.len() {
                break;
            }
            line_start = line_end + 1;
        }
        let Some((terminator_line, close)) = found else {
            return false;
        };

        let body = rest[body_start..terminator_line]
            .strip_suffix('\n')
            .unwrap_or(&rest[body_start..terminator_line])
            .trim_end_matches('\r')
            .to_string();
        let tag = tag.to_string();
        let char_count = rest[..close].chars().count();
        self.advance_by(char_count);
        self.push(TokenKind::Heredoc, TokenValue::Heredoc { tag, body }, start);
        true
    }

    fn try_string(&mut self, start: Position) -> bool {
        let Some(quote) = self.peek().filter(|c| *c == '"' || *c == '\'') else {
            return false;
        };
        self.advance();
        let mut value = String::new();
        let mut terminated = false;
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.advance();
            if ch == quote {
                terminated = true;
                break;
            }
            if ch == '\\' {
                match self.peek() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('"') => value.push('"'),
                    Some('\\') => value.push('\\'),
                    Some('\n') | None => {
                        value.push('\\');
                        continue;
                    }
                    Some(other) => {
                        value.push('\\');
                        value.push(other);
                    }
                }
                self.advance();
                continue;
            }
            value.push(ch);
        }
        if !terminated {
            self.diagnostics.push(Diagnostic::error(
                codes::UNTERMINATED_STRING,
                "unterminated string literal",
                Span::new(start, self.pos),
            ));
        }
        self.push(TokenKind::String, TokenValue::Text(value), start);
        true
    }

    fn try_color(&mut self, start: Position) -> bool {
        let Some(len) = color_len(self.rest()) else {
            return false;
        };
        self.advance_by(len + 1);
        let image = self.src[start.offset..self.pos.offset].to_string();
        self.push(TokenKind::Color, TokenValue::Text(image), start);
        true
    }

    fn sign_allowed(&self) -> bool {
        match self.tokens.last() {
            None => true,
            Some(prev) => match prev.kind {
                TokenKind::Operator | TokenKind::Keyword => true,
                TokenKind::Punct => !matches!(prev.image.as_str(), ")" | "]" | "}"),
                _ => false,
            },
        }
    }

    fn try_number(&mut self, start: Position) -> bool {
        let first = self.peek();
        let signed = matches!(first, Some('-') | Some('+'));
        let digit_at = if signed { 1 } else { 0 };
        if !matches!(self.peek_nth(digit_at), Some(c) if c.is_ascii_digit()) {
            return false;
        }
        if signed && !self.sign_allowed() {
            return false;
        }
        if signed {
            self.advance();
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let mut decimal = false;
        if self.peek() == Some('.') && matches!(self.peek_nth(1), Some(c) if c.is_ascii_digit()) {
            decimal = true;
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }
        let magnitude: f64 = self.src[start.offset..self.pos.offset]
            .parse()
            .unwrap_or_default();

        let rest = self.rest();
        let unit_end = |len: usize| !rest[len..].starts_with(is_ident_continue);
        if rest.starts_with("ms") && unit_end(2) {
            self.advance_by(2);
            self.push(TokenKind::Duration, TokenValue::Millis(magnitude), start);
        } else if rest.starts_with('s') && unit_end(1) {
            self.advance();
            self.push(
                TokenKind::Duration,
                TokenValue::Millis(magnitude * 1000.0),
                start,
            );
        } else if rest.starts_with('m') && unit_end(1) {
            self.advance();
            self.push(
                TokenKind::Duration,
                TokenValue::Millis(magnitude * 60_000.0),
                start,
            );
        } else if rest.starts_with('%') {
            self.advance();
            self.push(TokenKind::Percent, TokenValue::Number(magnitude), start);
        } else if decimal {
            self.push(TokenKind::Number, TokenValue::Number(magnitude), start);
        } else {
            self.push(TokenKind::Int, TokenValue::Number(magnitude), start);
        }
        true
    }

    fn try_word(&mut self, start: Position) -> bool {
        if !matches!(self.peek(), Some(c) if c.is_alphabetic() || c == '_') {
            return false;
        }
        self.advance();
        loop {
            match self.peek() {
                Some(c) if c.is_alphanumeric() || c == '_' => {
                    self.advance();
                }
                Some('-') if matches!(self.peek_nth(1), Some(c) if c.is_alphanumeric() || c == '_') => {
                    self.advance();
                }
                _ => break,
            }
        }
        let word = &self.src[start.offset..self.pos.offset];
        let (kind, value) = match word {
            "true" => (TokenKind::Boolean, TokenValue::Bool(true)),
            "false" => (TokenKind::Boolean, TokenValue::Bool(false)),
            "null" => (TokenKind::Null, TokenValue::None),
            w if is_keyword(w) => (TokenKind::Keyword, TokenValue::Text(w.to_string())),
            w => (TokenKind::Identifier, TokenValue::Text(w.to_string())),
        };
        self.push(kind, value, start);
        true
    }

    fn try_operator(&mut self, start: Position) -> bool {
        let rest = self.rest();
        if let Some(op) = TWO_CHAR_OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            self.advance_by(2);
            self.push(TokenKind::Operator, TokenValue::Text((*op).to_string()), start);
            return true;
        }
        match self.peek() {
            Some(c) if ONE_CHAR_OPERATORS.contains(&c) => {
                self.advance();
                self.push(TokenKind::Operator, TokenValue::Text(c.to_string()), start);
                true
            }
            _ => false,
        }
    }

    fn try_punct(&mut self, start: Position) -> bool {
        match self.peek() {
            Some(c) if PUNCTUATION.contains(&c) => {
                self.advance();
                self.push(TokenKind::Punct, TokenValue::Text(c.to_string()), start);
                true
            }
            _ => false,
        }
    }
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Number of hex digits when `text` starts with a `#rgb` / `#rrggbb` color.
fn color_len(text: &str) -> Option<usize> {
    let digits = text.strip_prefix('#')?;
    let count = digits.chars().take_while(|c| c.is_ascii_hexdigit()).count();
    if count != 3 && count != 6 {
        return None;
    }
    match digits[count..].chars().next() {
        Some(c) if c.is_alphanumeric() || c == '_' || c == '-' => None,
        _ => Some(count),
    }
}
