// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tokenizer for the pipeline scripting dialect.
//!
//! Hand-rolled single-pass lexer over a char vector. Comments (`//`,
//! `/* */`) vanish here; template literals come out as literal/expression
//! part lists with the embedded expression source kept verbatim for the
//! parser to handle.

use crate::error::ScriptError;
use crate::token::{Pos, TemplatePart, Token, TokenKind};

pub struct Lexer {
    chars: Vec<char>,
    index: usize,
    line: u32,
    col: u32,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self { chars: source.chars().collect(), index: 0, line: 1, col: 1 }
    }

    /// Tokenize the whole input, ending with an `Eof` token.
    pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
        let mut lexer = Self::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.index += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn pos(&self) -> Pos {
        Pos { line: self.line, col: self.col }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax { pos: self.pos(), message: message.into() }
    }

    fn skip_trivia(&mut self) -> Result<(), ScriptError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start = self.pos();
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            Some('*') if self.peek_at(1) == Some('/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                            None => {
                                return Err(ScriptError::Syntax {
                                    pos: start,
                                    message: "unterminated block comment".to_string(),
                                })
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ScriptError> {
        self.skip_trivia()?;
        let pos = self.pos();
        let Some(c) = self.peek() else {
            return Ok(Token { kind: TokenKind::Eof, pos });
        };

        let kind = match c {
            '0'..='9' => self.lex_number()?,
            '"' | '\'' => self.lex_string()?,
            '`' => self.lex_template()?,
            c if is_ident_start(c) => self.lex_ident(),
            _ => self.lex_punct()?,
        };
        Ok(Token { kind, pos })
    }

    fn lex_number(&mut self) -> Result<TokenKind, ScriptError> {
        let mut raw = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' || c == '_' {
                if c != '_' {
                    raw.push(c);
                }
                self.bump();
            } else {
                break;
            }
        }
        raw.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| self.error(format!("invalid number literal {:?}", raw)))
    }

    fn lex_ident(&mut self) -> TokenKind {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        TokenKind::keyword(&name).unwrap_or(TokenKind::Ident(name))
    }

    fn lex_string(&mut self) -> Result<TokenKind, ScriptError> {
        let quote = self.bump().unwrap_or('"');
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(TokenKind::Str(out)),
                Some('\\') => out.push(self.lex_escape()?),
                Some('\n') | None => return Err(self.error("unterminated string literal")),
                Some(c) => out.push(c),
            }
        }
    }

    fn lex_escape(&mut self) -> Result<char, ScriptError> {
        match self.bump() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('0') => Ok('\0'),
            Some('\\') => Ok('\\'),
            Some('\'') => Ok('\''),
            Some('"') => Ok('"'),
            Some('`') => Ok('`'),
            Some('$') => Ok('$'),
            Some('u') => self.lex_unicode_escape(),
            Some(c) => Ok(c),
            None => Err(self.error("unterminated escape sequence")),
        }
    }

    fn lex_unicode_escape(&mut self) -> Result<char, ScriptError> {
        if self.peek() != Some('{') {
            return Err(self.error("expected '{' in unicode escape"));
        }
        self.bump();
        let mut hex = String::new();
        while let Some(c) = self.peek() {
            if c == '}' {
                break;
            }
            hex.push(c);
            self.bump();
        }
        self.bump(); // closing brace
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error(format!("invalid unicode escape {:?}", hex)))
    }

    /// Template literal: split into literal text and `${…}` expression
    /// sources. Nested braces inside the expression are tracked so object
    /// literals work.
    fn lex_template(&mut self) -> Result<TokenKind, ScriptError> {
        self.bump(); // opening backtick
        let mut parts = Vec::new();
        let mut literal = String::new();
        loop {
            match self.bump() {
                Some('`') => {
                    if !literal.is_empty() {
                        parts.push(TemplatePart::Literal(literal));
                    }
                    return Ok(TokenKind::Template(parts));
                }
                Some('\\') => literal.push(self.lex_escape()?),
                Some('$') if self.peek() == Some('{') => {
                    self.bump(); // '{'
                    if !literal.is_empty() {
                        parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
                    }
                    let mut expr = String::new();
                    let mut depth = 1usize;
                    loop {
                        match self.bump() {
                            Some('{') => {
                                depth += 1;
                                expr.push('{');
                            }
                            Some('}') => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                                expr.push('}');
                            }
                            Some(c) => expr.push(c),
                            None => {
                                return Err(self.error("unterminated template expression"))
                            }
                        }
                    }
                    parts.push(TemplatePart::Expr(expr));
                }
                Some(c) => literal.push(c),
                None => return Err(self.error("unterminated template literal")),
            }
        }
    }

    fn lex_punct(&mut self) -> Result<TokenKind, ScriptError> {
        let c = self.bump().unwrap_or('\0');
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semi,
            ':' => TokenKind::Colon,
            '%' => TokenKind::Percent,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '.' => {
                if self.peek() == Some('.') && self.peek_at(1) == Some('.') {
                    self.bump();
                    self.bump();
                    TokenKind::Spread
                } else {
                    TokenKind::Dot
                }
            }
            '+' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::PlusEq
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::MinusEq
                } else {
                    TokenKind::Minus
                }
            }
            '=' => match self.peek() {
                Some('=') => {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                    }
                    TokenKind::EqEq
                }
                Some('>') => {
                    self.bump();
                    TokenKind::Arrow
                }
                _ => TokenKind::Eq,
            },
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                    }
                    TokenKind::NotEq
                } else {
                    TokenKind::Not
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            '&' => {
                if self.peek() == Some('&') {
                    self.bump();
                    TokenKind::AndAnd
                } else {
                    return Err(self.error("unexpected '&' (bitwise ops are not supported)"));
                }
            }
            '|' => {
                if self.peek() == Some('|') {
                    self.bump();
                    TokenKind::OrOr
                } else {
                    return Err(self.error("unexpected '|' (bitwise ops are not supported)"));
                }
            }
            '?' => match self.peek() {
                Some('?') => {
                    self.bump();
                    TokenKind::Coalesce
                }
                _ => TokenKind::Question,
            },
            other => return Err(self.error(format!("unexpected character {:?}", other))),
        };
        Ok(kind)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
#[path = "lexer_tests.rs"]
mod tests;
