// Runs a problem's fixed checks against a callable and collects
// human-readable failures. Pass means zero failures; no partial credit.

use serde_json::Value;
use tracing::debug;

use crate::codegen::candidate::{Candidate, TestOutcome};
use crate::executor::{CallError, Callable, Sandbox};
use crate::problems::{Check, Expectation};

pub fn run_checks(callable: &mut dyn Callable, checks: &[Check]) -> TestOutcome {
    let mut failures = Vec::new();

    for check in checks {
        match judge(callable, check) {
            Verdict::Pass => {}
            Verdict::Fail(msg) => failures.push(msg),
            Verdict::Internal(msg) => {
                // The runner itself broke; later checks would say nothing new.
                return TestOutcome::single(format!("Test runner error: {msg}"));
            }
        }
    }

    TestOutcome::from_failures(failures)
}

/// Load the candidate in the sandbox and run the checks. Every code-related
/// problem becomes a failure string.
pub fn run_candidate(
    sandbox: &dyn Sandbox,
    candidate: &Candidate,
    function: &str,
    checks: &[Check],
) -> TestOutcome {
    let mut callable = match sandbox.load(&candidate.code, function) {
        Ok(c) => c,
        Err(e) => {
            debug!(candidate = %candidate.id, error = %e, "candidate did not load");
            return TestOutcome::single(e.to_string());
        }
    };

    run_checks(callable.as_mut(), checks)
}

/* ============================================================
   Single check
   ============================================================ */

enum Verdict {
    Pass,
    Fail(String),
    Internal(String),
}

fn judge(callable: &mut dyn Callable, check: &Check) -> Verdict {
    let label = &check.label;
    let result = callable.call(&check.args);

    match (&check.expect, result) {
        (_, Err(CallError::Internal(msg))) => Verdict::Internal(msg),

        (Expectation::Raises { class }, Ok(_)) => {
            Verdict::Fail(format!("Expected {class} for {label}"))
        }
        (Expectation::Raises { class }, Err(err)) => {
            if err.is_instance_of(class) {
                Verdict::Pass
            } else {
                let got = err.class_name().unwrap_or_default();
                Verdict::Fail(format!("{label} raised {got}, expected {class}"))
            }
        }

        (_, Err(CallError::Raised { class, message, .. })) => {
            Verdict::Fail(format!("{label} raised {class}: {message}"))
        }

        (Expectation::Returns { value }, Ok(got)) => {
            if values_equal(&got, value) {
                Verdict::Pass
            } else {
                Verdict::Fail(format!("{label} -> {got}, expected {value}"))
            }
        }

        (Expectation::Approx { value, eps }, Ok(got)) => match got.as_f64() {
            Some(x) if (x - value).abs() <= *eps => Verdict::Pass,
            _ => Verdict::Fail(format!("{label} -> {got}, expected {value} (±{eps})")),
        },

        (Expectation::Truthy { value }, Ok(got)) => {
            if truthy(&got) == *value {
                Verdict::Pass
            } else if *value {
                Verdict::Fail(format!("{label} flagged invalid"))
            } else {
                Verdict::Fail(format!("{label} flagged valid"))
            }
        }
    }
}

/// Equality with Python's numeric rules: `9 == 9.0`, `True == 1`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Bool(flag)) | (Value::Bool(flag), Value::Number(n)) => {
            n.as_f64() == Some(if *flag { 1.0 } else { 0.0 })
        }
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Python truthiness of a JSON-encoded value.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{raised, ExecError, NativeFn};
    use serde_json::json;

    fn echo_checks() -> Vec<Check> {
        vec![
            Check::returns(vec![json!(1)], json!(1)),
            Check::returns(vec![json!(2)], json!(3)),
        ]
    }

    #[test]
    fn collects_one_failure_per_mismatch() {
        let mut echo = NativeFn::new(|args: &[Value]| Ok(args[0].clone()));
        let outcome = run_checks(&mut echo, &echo_checks());

        assert!(!outcome.passed);
        assert_eq!(outcome.failures, vec!["2 -> 2, expected 3"]);
    }

    #[test]
    fn unexpected_exception_is_reported_with_class() {
        let mut boom = NativeFn::new(|_: &[Value]| Err(raised("KeyError", "'x'")));
        let outcome = run_checks(&mut boom, &[Check::returns(vec![json!("a")], json!(1))]);
        assert_eq!(outcome.failures, vec![r#""a" raised KeyError: 'x'"#]);
    }

    #[test]
    fn expected_exception_checks() {
        let checks = vec![Check::raises(vec![json!(0)], "ValueError").labeled("k=0")];

        let mut ok = NativeFn::new(|_: &[Value]| Ok(json!([])));
        assert_eq!(run_checks(&mut ok, &checks).failures, vec!["Expected ValueError for k=0"]);

        let mut wrong = NativeFn::new(|_: &[Value]| Err(raised("IndexError", "oops")));
        assert_eq!(
            run_checks(&mut wrong, &checks).failures,
            vec!["k=0 raised IndexError, expected ValueError"]
        );

        let mut right = NativeFn::new(|_: &[Value]| Err(raised("ValueError", "k must be >= 1")));
        assert!(run_checks(&mut right, &checks).passed);

        let mut subclass = NativeFn::new(|_: &[Value]| {
            Err(CallError::Raised {
                class: "KError".into(),
                bases: vec!["ValueError".into(), "Exception".into()],
                message: "k".into(),
            })
        });
        assert!(run_checks(&mut subclass, &checks).passed);
    }

    #[test]
    fn internal_error_stops_the_run_with_single_failure() {
        let mut calls = 0;
        let mut flaky = NativeFn::new(|_: &[Value]| {
            calls += 1;
            Err(CallError::Internal("sandbox exited (1) without a result".into()))
        });

        let outcome = run_checks(&mut flaky, &echo_checks());
        assert_eq!(
            outcome.failures,
            vec!["Test runner error: sandbox exited (1) without a result"]
        );
        drop(flaky);
        assert_eq!(calls, 1);
    }

    #[test]
    fn approx_and_truthy_expectations() {
        let checks = vec![
            Check::approx(vec![], 0.5).labeled("half"),
            Check::truthy(vec![], false).labeled("bad board"),
        ];
        let mut f = NativeFn::new(|_: &[Value]| Ok(json!(0.5)));
        let outcome = run_checks(&mut f, &checks);
        assert_eq!(outcome.failures, vec!["bad board flagged valid"]);
    }

    #[test]
    fn numeric_equality_follows_python() {
        assert!(values_equal(&json!(9), &json!(9.0)));
        assert!(values_equal(&json!([[1, 6]]), &json!([[1.0, 6]])));
        assert!(values_equal(&json!(1), &json!(true)));
        assert!(values_equal(&json!(false), &json!(0.0)));
        assert!(!values_equal(&json!(2), &json!(true)));
        assert!(!values_equal(&json!("1"), &json!(true)));
        assert!(!values_equal(&json!([1, 2]), &json!([1])));
    }

    #[test]
    fn integer_answers_satisfy_boolean_checks() {
        let checks = vec![
            Check::returns(vec![json!("A man, a plan")], json!(true)),
            Check::returns(vec![json!("ab")], json!(false)),
        ];
        let mut f = NativeFn::new(|args: &[Value]| {
            Ok(json!(i32::from(args[0].as_str().is_some_and(|s| s.len() > 2))))
        });
        assert!(run_checks(&mut f, &checks).passed);
    }

    #[test]
    fn truthiness_matches_python() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!([])));
        assert!(truthy(&json!(2)));
        assert!(truthy(&json!("x")));
    }

    #[test]
    fn deterministic_for_same_callable_and_checks() {
        let checks = crate::problems::checks_for("top_k_frequent").unwrap();
        let mut f = NativeFn::new(|_: &[Value]| Ok(json!([1])));

        let first = run_checks(&mut f, &checks);
        let second = run_checks(&mut f, &checks);
        assert_eq!(first, second);
    }

    struct Refuses;

    impl Sandbox for Refuses {
        fn load(&self, _: &str, symbol: &str) -> Result<Box<dyn Callable>, ExecError> {
            Err(ExecError::MissingSymbol {
                symbol: symbol.into(),
                defined: vec![],
            })
        }
    }

    #[test]
    fn load_failure_becomes_single_failure() {
        let outcome = run_candidate(
            &Refuses,
            &Candidate::from_code("x = 1"),
            "evaluate_rpn",
            &echo_checks(),
        );
        assert_eq!(outcome, TestOutcome::single("Function evaluate_rpn not found after exec"));
    }
}
