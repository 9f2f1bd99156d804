// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    passthrough = { "build", "build" },
    lowercases = { "Build Image", "build-image" },
    underscores = { "run_unit_tests", "run-unit-tests" },
    collapses_runs = { "a  __  b", "a-b" },
    trims_edges = { "--hello--", "hello" },
    symbols = { "deploy@prod!", "deploy-prod" },
    empty = { "", "" },
    only_symbols = { "!!!", "" },
)]
fn sanitizes(input: &str, expected: &str) {
    assert_eq!(sanitize_name(input, 63), expected);
}

#[test]
fn caps_length_without_trailing_hyphen() {
    let out = sanitize_name("abc-def-ghi", 4);
    assert_eq!(out, "abc");
    assert!(out.len() <= 4);
}

#[test]
fn cap_is_bytewise() {
    let out = sanitize_name("abcdefgh", 5);
    assert_eq!(out, "abcde");
}
