// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    undefined = { Value::Undefined, false },
    null = { Value::Null, false },
    zero = { Value::Number(0.0), false },
    nan = { Value::Number(f64::NAN), false },
    empty_str = { Value::string(""), false },
    falsey_bool = { Value::Bool(false), false },
    number = { Value::Number(1.5), true },
    string = { Value::string("x"), true },
    empty_array = { Value::array(vec![]), true },
    empty_obj = { Value::empty_object(), true },
)]
fn truthiness(value: Value, expected: bool) {
    assert_eq!(value.truthy(), expected);
}

#[test]
fn loose_eq_compares_structurally() {
    assert!(Value::Undefined.loose_eq(&Value::Null));
    assert!(Value::Number(2.0).loose_eq(&Value::Number(2.0)));
    assert!(!Value::Number(2.0).loose_eq(&Value::string("2")));

    let a = Value::array(vec![Value::Number(1.0), Value::string("x")]);
    let b = Value::array(vec![Value::Number(1.0), Value::string("x")]);
    assert!(a.loose_eq(&b));

    let mut m1 = IndexMap::new();
    m1.insert("k".to_string(), Value::Number(1.0));
    let mut m2 = IndexMap::new();
    m2.insert("k".to_string(), Value::Number(1.0));
    assert!(Value::object(m1).loose_eq(&Value::object(m2)));
}

#[test]
fn render_shapes() {
    assert_eq!(Value::Number(3.0).render(), "3");
    assert_eq!(Value::Number(3.5).render(), "3.5");
    assert_eq!(Value::array(vec![Value::Number(1.0), Value::Null]).render(), "[1, null]");
    assert_eq!(Value::error("boom").render(), "Error: boom");
}

#[test]
fn json_round_trip() {
    let json = serde_json::json!({
        "name": "build",
        "count": 2,
        "nested": {"flag": true, "list": [1, "two", null]},
    });
    let value = Value::from_json(&json);
    assert_eq!(value.to_json(), json);
}

#[test]
fn functions_have_no_json_form() {
    let f = Value::native("noop", |_args| Box::pin(async { Ok(Value::Undefined) }));
    assert_eq!(f.to_json(), serde_json::Value::Null);
    assert_eq!(f.type_name(), "function");
}
