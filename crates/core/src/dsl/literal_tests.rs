// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

use super::parse_literal;
use serde_json::json;
use yare::parameterized;

#[parameterized(
    integer = { "1", json!(1) },
    negative = { "-2", json!(-2) },
    float = { "1.5", json!(1.5) },
    double_quoted = { r#""red""#, json!("red") },
    single_quoted = { "'red'", json!("red") },
    escaped = { r#""a\nb""#, json!("a\nb") },
    bool_json = { "true", json!(true) },
    bool_python = { "False", json!(false) },
    null_json = { "null", json!(null) },
    null_python = { "None", json!(null) },
    list = { "[1, 2, 3]", json!([1, 2, 3]) },
    tuple = { "(1, 'a')", json!([1, "a"]) },
    nested = { r#"{"a": [1, {"b": 2}]}"#, json!({"a": [1, {"b": 2}]}) },
    trailing_comma = { "[1, 2,]", json!([1, 2]) },
    empty_list = { "[]", json!([]) },
    empty_dict = { "{}", json!({}) },
)]
fn literals(input: &str, want: serde_json::Value) {
    assert_eq!(parse_literal(input).unwrap(), want);
}

#[parameterized(
    empty = { "" },
    bare_name = { "os" },
    call = { "f(1)" },
    unterminated = { "'abc" },
    trailing_garbage = { "1 2" },
    non_string_key = { "{1: 2}" },
)]
fn rejected(input: &str) {
    assert!(parse_literal(input).is_err(), "accepted {input:?}");
}
