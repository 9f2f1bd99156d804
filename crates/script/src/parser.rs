// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recursive-descent parser with Pratt-style binary precedence.
//!
//! The dialect is a typed JavaScript subset: TypeScript-style annotations
//! on parameters, bindings, and return positions are accepted and
//! discarded, so "compiling" a script is parse-and-lower and every syntax
//! error carries a source position before any orchestration begins.
//!
//! Semicolons are optional separators; the grammar never needs automatic
//! insertion because statements are self-delimiting.

use crate::ast::*;
use crate::error::ScriptError;
use crate::lexer::Lexer;
use crate::token::{Pos, TemplatePart, Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    /// Parse a whole program.
    pub fn parse(source: &str) -> Result<Program, ScriptError> {
        let tokens = Lexer::tokenize(source)?;
        let mut parser = Self { tokens, index: 0 };
        let mut body = Vec::new();
        while !parser.check(&TokenKind::Eof) {
            body.push(parser.statement()?);
            parser.eat(&TokenKind::Semi);
        }
        Ok(Program { body })
    }

    /// Parse a single expression source (template literal parts).
    fn parse_expr_source(source: &str, at: Pos) -> Result<Expr, ScriptError> {
        let tokens = Lexer::tokenize(source).map_err(|e| match e {
            ScriptError::Syntax { message, .. } => ScriptError::Syntax { pos: at, message },
            other => other,
        })?;
        let mut parser = Self { tokens, index: 0 };
        let expr = parser.expression()?;
        if !parser.check(&TokenKind::Eof) {
            return Err(ScriptError::Syntax {
                pos: at,
                message: "unexpected trailing tokens in template expression".to_string(),
            });
        }
        Ok(expr)
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn kind_at(&self, offset: usize) -> &TokenKind {
        &self.tokens[(self.index + offset).min(self.tokens.len() - 1)].kind
    }

    fn pos(&self) -> Pos {
        self.peek().pos
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.index.min(self.tokens.len() - 1)].clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, context: &str) -> Result<Token, ScriptError> {
        if self.check(kind) {
            Ok(self.bump())
        } else {
            Err(self.error(format!(
                "expected {} in {}, found {}",
                kind.describe(),
                context,
                self.peek_kind().describe()
            )))
        }
    }

    fn expect_ident(&mut self, context: &str) -> Result<String, ScriptError> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.bump();
                Ok(name)
            }
            other => Err(self.error(format!(
                "expected identifier in {}, found {}",
                context,
                other.describe()
            ))),
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax { pos: self.pos(), message: message.into() }
    }

    // ------------------------------------------------------------------
    // Type annotation skipping
    // ------------------------------------------------------------------

    /// Skip a `: Type` annotation. Stops (without consuming) at any of
    /// `stop` at bracket depth zero. Generics count `<`/`>` as brackets.
    fn skip_type(&mut self, stop: &[TokenKind]) {
        if !self.eat(&TokenKind::Colon) {
            return;
        }
        let mut depth = 0usize;
        loop {
            let kind = self.peek_kind();
            if depth == 0 && (stop.contains(kind) || *kind == TokenKind::Eof) {
                return;
            }
            match kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace | TokenKind::Lt => {
                    depth += 1;
                }
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace | TokenKind::Gt => {
                    depth = depth.saturating_sub(1);
                }
                TokenKind::Eof => return,
                _ => {}
            }
            self.bump();
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        match self.peek_kind() {
            TokenKind::Export => self.export_statement(),
            TokenKind::Async if *self.kind_at(1) == TokenKind::Function => {
                let func = self.function_decl()?;
                Ok(Stmt::Function { func, exported: false })
            }
            TokenKind::Function => {
                let func = self.function_decl()?;
                Ok(Stmt::Function { func, exported: false })
            }
            TokenKind::Let | TokenKind::Const => self.let_statement(),
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::Return => {
                self.bump();
                let value = if self.check(&TokenKind::Semi)
                    || self.check(&TokenKind::RBrace)
                    || self.check(&TokenKind::Eof)
                {
                    None
                } else {
                    Some(self.expression()?)
                };
                Ok(Stmt::Return(value))
            }
            TokenKind::Throw => {
                let pos = self.pos();
                self.bump();
                Ok(Stmt::Throw(self.expression()?, pos))
            }
            TokenKind::Try => self.try_statement(),
            TokenKind::Break => {
                self.bump();
                Ok(Stmt::Break)
            }
            TokenKind::Continue => {
                self.bump();
                Ok(Stmt::Continue)
            }
            _ => self.expr_or_assign_statement(),
        }
    }

    fn export_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.bump(); // export
        match self.peek_kind() {
            TokenKind::Async | TokenKind::Function => {
                let func = self.function_decl()?;
                Ok(Stmt::Function { func, exported: true })
            }
            TokenKind::Const | TokenKind::Let => {
                let pos = self.pos();
                self.bump();
                let name = self.expect_ident("export binding")?;
                self.skip_type(&[TokenKind::Eq]);
                self.expect(&TokenKind::Eq, "export binding")?;
                let value = self.expression()?;
                Ok(Stmt::ExportBinding { name, value, pos })
            }
            other => Err(self.error(format!(
                "export must precede a function or binding, found {}",
                other.describe()
            ))),
        }
    }

    fn function_decl(&mut self) -> Result<Function, ScriptError> {
        let is_async = self.eat(&TokenKind::Async);
        self.expect(&TokenKind::Function, "function declaration")?;
        let name = self.expect_ident("function declaration")?;
        let params = self.param_list()?;
        self.skip_type(&[TokenKind::LBrace]);
        let body = self.block("function body")?;
        Ok(Function { name: Some(name), params, body, is_async })
    }

    fn param_list(&mut self) -> Result<Vec<String>, ScriptError> {
        self.expect(&TokenKind::LParen, "parameter list")?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let name = self.expect_ident("parameter list")?;
            self.skip_type(&[TokenKind::Comma, TokenKind::RParen, TokenKind::Eq]);
            // Default values are not supported; reject loudly.
            if self.check(&TokenKind::Eq) {
                return Err(self.error("default parameter values are not supported"));
            }
            params.push(name);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "parameter list")?;
        Ok(params)
    }

    fn block(&mut self, context: &str) -> Result<Vec<Stmt>, ScriptError> {
        self.expect(&TokenKind::LBrace, context)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            body.push(self.statement()?);
            self.eat(&TokenKind::Semi);
        }
        self.expect(&TokenKind::RBrace, context)?;
        Ok(body)
    }

    fn let_statement(&mut self) -> Result<Stmt, ScriptError> {
        let pos = self.pos();
        let constant = matches!(self.peek_kind(), TokenKind::Const);
        self.bump();
        let pattern = self.pattern()?;
        self.skip_type(&[TokenKind::Eq, TokenKind::Semi]);
        let value = if self.eat(&TokenKind::Eq) { Some(self.expression()?) } else { None };
        Ok(Stmt::Let { pattern, value, constant, pos })
    }

    fn pattern(&mut self) -> Result<Pattern, ScriptError> {
        if self.eat(&TokenKind::LBracket) {
            let mut names = Vec::new();
            while !self.check(&TokenKind::RBracket) {
                if self.check(&TokenKind::Comma) {
                    names.push(None);
                } else {
                    names.push(Some(self.expect_ident("destructuring pattern")?));
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RBracket, "destructuring pattern")?;
            Ok(Pattern::Array(names))
        } else {
            Ok(Pattern::Ident(self.expect_ident("binding")?))
        }
    }

    fn if_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.bump(); // if
        self.expect(&TokenKind::LParen, "if condition")?;
        let cond = self.expression()?;
        self.expect(&TokenKind::RParen, "if condition")?;
        let then = self.block_or_single()?;
        let els = if self.eat(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                Some(vec![self.if_statement()?])
            } else {
                Some(self.block_or_single()?)
            }
        } else {
            None
        };
        Ok(Stmt::If { cond, then, els })
    }

    fn block_or_single(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        if self.check(&TokenKind::LBrace) {
            self.block("block")
        } else {
            let stmt = self.statement()?;
            self.eat(&TokenKind::Semi);
            Ok(vec![stmt])
        }
    }

    fn while_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.bump(); // while
        self.expect(&TokenKind::LParen, "while condition")?;
        let cond = self.expression()?;
        self.expect(&TokenKind::RParen, "while condition")?;
        let body = self.block_or_single()?;
        Ok(Stmt::While { cond, body })
    }

    fn for_statement(&mut self) -> Result<Stmt, ScriptError> {
        let pos = self.pos();
        self.bump(); // for
        self.expect(&TokenKind::LParen, "for loop")?;
        if !self.eat(&TokenKind::Let) {
            self.eat(&TokenKind::Const);
        }
        let pattern = self.pattern()?;
        self.expect(&TokenKind::Of, "for…of loop")?;
        let iterable = self.expression()?;
        self.expect(&TokenKind::RParen, "for loop")?;
        let body = self.block_or_single()?;
        Ok(Stmt::ForOf { pattern, iterable, body, pos })
    }

    fn try_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.bump(); // try
        let body = self.block("try block")?;
        let mut param = None;
        let handler = if self.eat(&TokenKind::Catch) {
            if self.eat(&TokenKind::LParen) {
                param = Some(self.expect_ident("catch parameter")?);
                self.skip_type(&[TokenKind::RParen]);
                self.expect(&TokenKind::RParen, "catch parameter")?;
            }
            Some(self.block("catch block")?)
        } else {
            None
        };
        let finalizer = if self.eat(&TokenKind::Finally) {
            Some(self.block("finally block")?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error("try requires a catch or finally block"));
        }
        Ok(Stmt::Try { body, param, handler, finalizer })
    }

    fn expr_or_assign_statement(&mut self) -> Result<Stmt, ScriptError> {
        let pos = self.pos();
        let expr = self.expression()?;
        let op = match self.peek_kind() {
            TokenKind::Eq => AssignOp::Set,
            TokenKind::PlusEq => AssignOp::Add,
            TokenKind::MinusEq => AssignOp::Sub,
            _ => return Ok(Stmt::Expr(expr)),
        };
        self.bump();
        let target = match expr {
            Expr::Ident(name, _) => Target::Ident(name),
            Expr::Member { object, property, .. } => {
                Target::Member { object: *object, property }
            }
            Expr::Index { object, index, .. } => {
                Target::Index { object: *object, index: *index }
            }
            _ => return Err(ScriptError::Syntax {
                pos,
                message: "invalid assignment target".to_string(),
            }),
        };
        let value = self.expression()?;
        Ok(Stmt::Assign { target, op, value, pos })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.ternary()
    }

    fn ternary(&mut self) -> Result<Expr, ScriptError> {
        let cond = self.coalesce()?;
        if self.eat(&TokenKind::Question) {
            let then = self.expression()?;
            self.expect(&TokenKind::Colon, "ternary expression")?;
            let els = self.expression()?;
            return Ok(Expr::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                els: Box::new(els),
            });
        }
        Ok(cond)
    }

    fn coalesce(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.logic_or()?;
        while self.eat(&TokenKind::Coalesce) {
            let rhs = self.logic_or()?;
            lhs = Expr::Logical {
                op: LogicalOp::Coalesce,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn logic_or(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.logic_and()?;
        while self.eat(&TokenKind::OrOr) {
            let rhs = self.logic_and()?;
            lhs = Expr::Logical { op: LogicalOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn logic_and(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.equality()?;
        while self.eat(&TokenKind::AndAnd) {
            let rhs = self.equality()?;
            lhs = Expr::Logical { op: LogicalOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.comparison()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                _ => return Ok(lhs),
            };
            let pos = self.pos();
            self.bump();
            let rhs = self.comparison()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::GtEq => BinaryOp::GtEq,
                _ => return Ok(lhs),
            };
            let pos = self.pos();
            self.bump();
            let rhs = self.additive()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
    }

    fn additive(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            let pos = self.pos();
            self.bump();
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            let pos = self.pos();
            self.bump();
            let rhs = self.unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        match self.peek_kind() {
            TokenKind::Not => {
                self.bump();
                Ok(Expr::Unary { op: UnaryOp::Not, expr: Box::new(self.unary()?) })
            }
            TokenKind::Minus => {
                self.bump();
                Ok(Expr::Unary { op: UnaryOp::Neg, expr: Box::new(self.unary()?) })
            }
            TokenKind::Await => {
                let pos = self.pos();
                self.bump();
                Ok(Expr::Await(Box::new(self.unary()?), pos))
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    let pos = self.pos();
                    self.bump();
                    let property = self.member_name()?;
                    expr = Expr::Member { object: Box::new(expr), property, pos };
                }
                TokenKind::LBracket => {
                    let pos = self.pos();
                    self.bump();
                    let index = self.expression()?;
                    self.expect(&TokenKind::RBracket, "index expression")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        pos,
                    };
                }
                TokenKind::LParen => {
                    let pos = self.pos();
                    let args = self.call_args()?;
                    expr = Expr::Call { callee: Box::new(expr), args, pos };
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Member names may be keywords (`result.catch` is fine).
    fn member_name(&mut self) -> Result<String, ScriptError> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.bump();
                Ok(name)
            }
            TokenKind::Catch => {
                self.bump();
                Ok("catch".to_string())
            }
            TokenKind::Finally => {
                self.bump();
                Ok("finally".to_string())
            }
            TokenKind::Of => {
                self.bump();
                Ok("of".to_string())
            }
            other => Err(self.error(format!(
                "expected property name, found {}",
                other.describe()
            ))),
        }
    }

    fn call_args(&mut self) -> Result<Vec<Arg>, ScriptError> {
        self.expect(&TokenKind::LParen, "call arguments")?;
        let mut args = Vec::new();
        while !self.check(&TokenKind::RParen) {
            if self.eat(&TokenKind::Spread) {
                args.push(Arg::Spread(self.expression()?));
            } else {
                args.push(Arg::Item(self.expression()?));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "call arguments")?;
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let pos = self.pos();
        match self.peek_kind().clone() {
            TokenKind::Number(n) => {
                self.bump();
                Ok(Expr::Number(n))
            }
            TokenKind::Str(s) => {
                self.bump();
                Ok(Expr::Str(s))
            }
            TokenKind::Template(parts) => {
                self.bump();
                let mut chunks = Vec::new();
                for part in parts {
                    match part {
                        TemplatePart::Literal(text) => chunks.push(TemplateChunk::Literal(text)),
                        TemplatePart::Expr(src) => {
                            let expr = Self::parse_expr_source(&src, pos)?;
                            chunks.push(TemplateChunk::Expr(Box::new(expr)));
                        }
                    }
                }
                Ok(Expr::Template(chunks))
            }
            TokenKind::True => {
                self.bump();
                Ok(Expr::Bool(true))
            }
            TokenKind::False => {
                self.bump();
                Ok(Expr::Bool(false))
            }
            TokenKind::Null => {
                self.bump();
                Ok(Expr::Null)
            }
            TokenKind::Undefined => {
                self.bump();
                Ok(Expr::Undefined)
            }
            TokenKind::Async => {
                self.bump();
                if self.check(&TokenKind::Function) {
                    return self.function_expr(true);
                }
                self.arrow_function(true)
            }
            TokenKind::Function => self.function_expr(false),
            TokenKind::Ident(name) => {
                if *self.kind_at(1) == TokenKind::Arrow {
                    return self.arrow_function(false);
                }
                // `new Error(…)` reads as a plain call of the constructor.
                if name == "new" && matches!(self.kind_at(1), TokenKind::Ident(_)) {
                    self.bump();
                    return self.postfix();
                }
                self.bump();
                Ok(Expr::Ident(name, pos))
            }
            TokenKind::LParen => {
                if self.looks_like_arrow_params() {
                    return self.arrow_function(false);
                }
                self.bump();
                let expr = self.expression()?;
                self.expect(&TokenKind::RParen, "parenthesized expression")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.bump();
                let mut items = Vec::new();
                while !self.check(&TokenKind::RBracket) {
                    if self.eat(&TokenKind::Spread) {
                        items.push(Arg::Spread(self.expression()?));
                    } else {
                        items.push(Arg::Item(self.expression()?));
                    }
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBracket, "array literal")?;
                Ok(Expr::Array(items))
            }
            TokenKind::LBrace => self.object_literal(),
            other => Err(self.error(format!("unexpected {}", other.describe()))),
        }
    }

    fn function_expr(&mut self, is_async: bool) -> Result<Expr, ScriptError> {
        self.expect(&TokenKind::Function, "function expression")?;
        let name = match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.bump();
                Some(name)
            }
            _ => None,
        };
        let params = self.param_list()?;
        self.skip_type(&[TokenKind::LBrace]);
        let body = self.block("function body")?;
        Ok(Expr::Func(Box::new(Function { name, params, body, is_async })))
    }

    /// Scan ahead from a `(` to see if the matching `)` is followed by
    /// `=>` (or a return annotation then `=>`).
    fn looks_like_arrow_params(&self) -> bool {
        let mut depth = 0usize;
        let mut offset = 0usize;
        loop {
            match self.kind_at(offset) {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(
                            self.kind_at(offset + 1),
                            TokenKind::Arrow | TokenKind::Colon
                        ) && self.arrow_follows_annotation(offset + 1);
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            offset += 1;
        }
    }

    /// From a post-params position, confirm `=>` arrives (skipping over a
    /// return-type annotation).
    fn arrow_follows_annotation(&self, mut offset: usize) -> bool {
        if *self.kind_at(offset) == TokenKind::Arrow {
            return true;
        }
        if *self.kind_at(offset) != TokenKind::Colon {
            return false;
        }
        offset += 1;
        let mut depth = 0usize;
        loop {
            match self.kind_at(offset) {
                TokenKind::Arrow if depth == 0 => return true,
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace | TokenKind::Lt => {
                    depth += 1;
                }
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace | TokenKind::Gt => {
                    if depth == 0 {
                        return false;
                    }
                    depth -= 1;
                }
                TokenKind::Eof | TokenKind::Semi => return false,
                _ => {}
            }
            offset += 1;
        }
    }

    fn arrow_function(&mut self, is_async: bool) -> Result<Expr, ScriptError> {
        let params = if self.check(&TokenKind::LParen) {
            let params = self.param_list()?;
            self.skip_type(&[TokenKind::Arrow]);
            params
        } else {
            vec![self.expect_ident("arrow function parameter")?]
        };
        self.expect(&TokenKind::Arrow, "arrow function")?;
        let body = if self.check(&TokenKind::LBrace) {
            self.block("arrow function body")?
        } else {
            vec![Stmt::Return(Some(self.expression()?))]
        };
        Ok(Expr::Func(Box::new(Function { name: None, params, body, is_async })))
    }

    fn object_literal(&mut self) -> Result<Expr, ScriptError> {
        self.expect(&TokenKind::LBrace, "object literal")?;
        let mut props = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.eat(&TokenKind::Spread) {
                props.push(Prop::Spread(self.expression()?));
            } else {
                let key = match self.peek_kind().clone() {
                    TokenKind::Ident(name) => {
                        self.bump();
                        name
                    }
                    TokenKind::Str(s) => {
                        self.bump();
                        s
                    }
                    TokenKind::Number(n) => {
                        self.bump();
                        format!("{}", n)
                    }
                    other => {
                        return Err(self.error(format!(
                            "expected property key, found {}",
                            other.describe()
                        )))
                    }
                };
                if self.eat(&TokenKind::Colon) {
                    props.push(Prop::Pair(key, self.expression()?));
                } else {
                    props.push(Prop::Shorthand(key));
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "object literal")?;
        Ok(Expr::Object(props))
    }
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
