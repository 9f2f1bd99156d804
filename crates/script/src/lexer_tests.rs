// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn kinds(source: &str) -> Vec<TokenKind> {
    Lexer::tokenize(source)
        .unwrap()
        .into_iter()
        .map(|t| t.kind)
        .filter(|k| *k != TokenKind::Eof)
        .collect()
}

#[test]
fn lexes_numbers_strings_idents() {
    assert_eq!(
        kinds(r#"let answer = 42.5 + 'two'"#),
        vec![
            TokenKind::Let,
            TokenKind::Ident("answer".to_string()),
            TokenKind::Eq,
            TokenKind::Number(42.5),
            TokenKind::Plus,
            TokenKind::Str("two".to_string()),
        ]
    );
}

#[test]
fn keywords_are_not_idents() {
    assert_eq!(
        kinds("async function await const"),
        vec![TokenKind::Async, TokenKind::Function, TokenKind::Await, TokenKind::Const]
    );
    assert_eq!(kinds("awaiting"), vec![TokenKind::Ident("awaiting".to_string())]);
}

#[test]
fn comments_vanish() {
    assert_eq!(
        kinds("a // line comment\n/* block\ncomment */ b"),
        vec![TokenKind::Ident("a".to_string()), TokenKind::Ident("b".to_string())]
    );
}

#[test]
fn multi_char_operators() {
    assert_eq!(
        kinds("=== !== <= >= && || ?? => ... +="),
        vec![
            TokenKind::EqEq,
            TokenKind::NotEq,
            TokenKind::LtEq,
            TokenKind::GtEq,
            TokenKind::AndAnd,
            TokenKind::OrOr,
            TokenKind::Coalesce,
            TokenKind::Arrow,
            TokenKind::Spread,
            TokenKind::PlusEq,
        ]
    );
}

#[test]
fn string_escapes() {
    assert_eq!(
        kinds(r#""line\nbreak \"quoted\" tab\t""#),
        vec![TokenKind::Str("line\nbreak \"quoted\" tab\t".to_string())]
    );
}

#[test]
fn template_literal_splits_parts() {
    let tokens = kinds("`before ${name} after ${a + b}`");
    assert_eq!(tokens.len(), 1);
    let TokenKind::Template(parts) = &tokens[0] else {
        panic!("expected template, got {:?}", tokens[0]);
    };
    assert_eq!(
        parts,
        &vec![
            TemplatePart::Literal("before ".to_string()),
            TemplatePart::Expr("name".to_string()),
            TemplatePart::Literal(" after ".to_string()),
            TemplatePart::Expr("a + b".to_string()),
        ]
    );
}

#[test]
fn template_tracks_nested_braces() {
    let tokens = kinds("`x ${ { a: 1 }.a } y`");
    let TokenKind::Template(parts) = &tokens[0] else { panic!() };
    assert_eq!(parts[1], TemplatePart::Expr(" { a: 1 }.a ".to_string()));
}

#[test]
fn positions_are_tracked() {
    let tokens = Lexer::tokenize("a\n  b").unwrap();
    assert_eq!(tokens[0].pos, Pos { line: 1, col: 1 });
    assert_eq!(tokens[1].pos, Pos { line: 2, col: 3 });
}

#[test]
fn errors_carry_positions() {
    let err = Lexer::tokenize("let x = 'oops").unwrap_err();
    let ScriptError::Syntax { pos, .. } = err else { panic!("wrong error: {err}") };
    assert_eq!(pos.line, 1);
}

#[test]
fn unexpected_characters_are_rejected() {
    assert!(Lexer::tokenize("a # b").is_err());
    assert!(Lexer::tokenize("a & b").is_err());
}
