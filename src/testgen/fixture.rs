// src/testgen/fixture.rs
//
// Renders a problem's fixed checks as a pytest module, so the baseline
// coverage of a solution is measured with exactly the checks the harness
// judges candidates by.

use serde_json::Value;

use crate::problems::{Check, Expectation};

pub const FIXTURE_FILE: &str = "test_fixture.py";

const PRELUDE: &str = r#"import json

import pytest


def _fallback(obj):
    if isinstance(obj, (set, frozenset)):
        return sorted(obj, key=repr)
    return repr(obj)


def _plain(value):
    return json.loads(json.dumps(value, default=_fallback))


def _same(a, b):
    if isinstance(a, list) and isinstance(b, list):
        return len(a) == len(b) and all(_same(x, y) for x, y in zip(a, b))
    if isinstance(a, dict) and isinstance(b, dict):
        return a.keys() == b.keys() and all(_same(a[k], b[k]) for k in a)
    return a == b
"#;

/// One `test_fixture_NN` function per check, in check order.
pub fn render_fixture_tests(module: &str, function: &str, checks: &[Check]) -> String {
    let mut out = format!("from {module} import {function}\n{PRELUDE}");

    for (i, check) in checks.iter().enumerate() {
        out.push_str(&format!(
            "\n\ndef test_fixture_{:02}():\n    # {}\n    args = json.loads({})\n",
            i + 1,
            one_line(&check.label),
            py_json(&Value::Array(check.args.clone())),
        ));
        out.push_str(&body(function, &check.expect));
    }

    out
}

fn body(function: &str, expect: &Expectation) -> String {
    match expect {
        Expectation::Returns { value } => format!(
            "    assert _same(_plain({function}(*args)), json.loads({}))\n",
            py_json(value)
        ),
        Expectation::Approx { value, eps } => format!(
            "    assert abs({function}(*args) - {value:?}) <= {eps:e}\n"
        ),
        Expectation::Truthy { value } => {
            let literal = if *value { "True" } else { "False" };
            format!("    assert bool({function}(*args)) is {literal}\n")
        }
        Expectation::Raises { class } => format!(
            "    with pytest.raises(Exception) as info:\n        {function}(*args)\n    \
             assert {} in [c.__name__ for c in type(info.value).__mro__]\n",
            py_str(class)
        ),
    }
}

/// A Python string literal holding the JSON text of `value`. JSON string
/// escapes are valid Python escapes.
fn py_json(value: &Value) -> String {
    py_str(&value.to_string())
}

fn py_str(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn one_line(label: &str) -> String {
    label.replace(['\n', '\r'], " ")
}
