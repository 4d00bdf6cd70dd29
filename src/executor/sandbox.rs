//! executor/sandbox.rs
//!
//! Python candidates run in a fresh `python -I` process per load and per
//! call. The candidate source travels on stdin with the request; the reply is
//! the last stdout line carrying the driver's sentinel.

use std::process::Command;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::codegen::inspect;
use crate::executor::run::{run_with_input, truncate_output, ProcessOutput};
use crate::executor::{CallError, Callable, ExecError, Sandbox};

const DRIVER: &str = include_str!("driver.py");
const SENTINEL: &str = "@@CODEGEN_EVAL@@ ";

#[derive(Debug, Clone)]
pub struct PythonSandbox {
    python: String,
    timeout: Duration,
}

impl PythonSandbox {
    pub fn new(python: impl Into<String>, timeout: Duration) -> Self {
        Self {
            python: python.into(),
            timeout,
        }
    }

    /// True if the interpreter can be started at all.
    pub fn available(&self) -> bool {
        Command::new(&self.python)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn invoke(&self, request: &Value) -> Result<Invocation, String> {
        let mut cmd = Command::new(&self.python);
        cmd.arg("-I")
            .arg("-c")
            .arg(DRIVER)
            // set iteration order must not vary between runs
            .env("PYTHONHASHSEED", "0");

        let payload = serde_json::to_vec(request).map_err(|e| e.to_string())?;
        let out = run_with_input(cmd, &payload, self.timeout)?;

        debug!(
            mode = %request["mode"],
            duration_ms = out.duration_ms as u64,
            timed_out = out.timed_out(),
            "sandbox process finished"
        );

        if out.timed_out() {
            return Ok(Invocation::TimedOut);
        }

        match parse_reply(&out) {
            Some(reply) => Ok(Invocation::Replied(reply)),
            None => Err(describe_crash(&out)),
        }
    }
}

impl Default for PythonSandbox {
    fn default() -> Self {
        Self::new("python3", Duration::from_secs(10))
    }
}

impl Sandbox for PythonSandbox {
    fn load(&self, source: &str, symbol: &str) -> Result<Box<dyn Callable>, ExecError> {
        let request = json!({
            "mode": "load",
            "source": source,
            "symbol": symbol,
        });

        match self.invoke(&request).map_err(ExecError::Runner)? {
            Invocation::TimedOut => Err(ExecError::Import(format!(
                "execution timed out after {}s",
                self.timeout.as_secs_f32()
            ))),
            Invocation::Replied(Reply::Loaded) => Ok(Box::new(PythonFunction {
                sandbox: self.clone(),
                source: source.to_string(),
                symbol: symbol.to_string(),
            })),
            Invocation::Replied(Reply::ImportError(msg)) => Err(ExecError::Import(msg)),
            Invocation::Replied(Reply::Missing) => Err(ExecError::MissingSymbol {
                symbol: symbol.to_string(),
                defined: inspect::inspect(source).functions,
            }),
            Invocation::Replied(other) => Err(ExecError::Runner(format!(
                "unexpected driver reply to load: {other:?}"
            ))),
        }
    }
}

/// A function that loaded once; every call re-executes the module in a new
/// process so calls cannot leak state into each other.
struct PythonFunction {
    sandbox: PythonSandbox,
    source: String,
    symbol: String,
}

impl Callable for PythonFunction {
    fn call(&mut self, args: &[Value]) -> Result<Value, CallError> {
        let request = json!({
            "mode": "call",
            "source": self.source,
            "symbol": self.symbol,
            "args": args,
        });

        match self.sandbox.invoke(&request).map_err(CallError::Internal)? {
            Invocation::TimedOut => Err(CallError::Internal(format!(
                "call timed out after {}s",
                self.sandbox.timeout.as_secs_f32()
            ))),
            Invocation::Replied(Reply::Ok(value)) => Ok(value),
            Invocation::Replied(Reply::Raised {
                class,
                bases,
                message,
            }) => Err(CallError::Raised {
                class,
                bases,
                message,
            }),
            Invocation::Replied(other) => Err(CallError::Internal(format!(
                "unexpected driver reply to call: {other:?}"
            ))),
        }
    }
}

/* ============================================================
   Driver protocol
   ============================================================ */

enum Invocation {
    Replied(Reply),
    TimedOut,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
enum Reply {
    Loaded,
    Missing,
    ImportError(String),
    Ok(Value),
    Raised {
        class: String,
        #[serde(default)]
        bases: Vec<String>,
        message: String,
    },
}

fn parse_reply(out: &ProcessOutput) -> Option<Reply> {
    out.stdout
        .lines()
        .rev()
        .find_map(|l| l.strip_prefix(SENTINEL))
        .and_then(|raw| serde_json::from_str(raw).ok())
}

fn describe_crash(out: &ProcessOutput) -> String {
    let code = out
        .status
        .and_then(|s| s.code())
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".into());

    let stderr = out.stderr.trim();
    if stderr.is_empty() {
        format!("sandbox exited ({code}) without a result")
    } else {
        format!(
            "sandbox exited ({code}) without a result: {}",
            truncate_output(stderr)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> Option<PythonSandbox> {
        let sb = PythonSandbox::new("python3", Duration::from_secs(5));
        sb.available().then_some(sb)
    }

    #[test]
    fn reply_shapes_deserialize() {
        let cases = [
            (r#""loaded""#, Reply::Loaded),
            (r#""missing""#, Reply::Missing),
            (r#"{"import_error":"SyntaxError: x"}"#, Reply::ImportError("SyntaxError: x".into())),
            (r#"{"ok":[1,2]}"#, Reply::Ok(json!([1, 2]))),
            (r#"{"ok":null}"#, Reply::Ok(Value::Null)),
            (
                r#"{"raised":{"class":"ValueError","message":"bad"}}"#,
                Reply::Raised {
                    class: "ValueError".into(),
                    bases: vec![],
                    message: "bad".into(),
                },
            ),
            (
                r#"{"raised":{"class":"E","bases":["ValueError","Exception"],"message":""}}"#,
                Reply::Raised {
                    class: "E".into(),
                    bases: vec!["ValueError".into(), "Exception".into()],
                    message: String::new(),
                },
            ),
        ];

        for (raw, expected) in cases {
            let got: Reply = serde_json::from_str(raw).unwrap();
            assert_eq!(got, expected, "{raw}");
        }
    }

    #[test]
    fn loads_and_calls_python_function() {
        let Some(sb) = sandbox() else { return };
        let src = "def add(a, b):\n    print('noise')\n    return a + b\n";

        let mut f = sb.load(src, "add").unwrap();
        assert_eq!(f.call(&[json!(2), json!(3)]), Ok(json!(5)));
    }

    #[test]
    fn reports_raised_exception_class() {
        let Some(sb) = sandbox() else { return };
        let src = "def f(x):\n    raise ValueError('nope')\n";

        let mut f = sb.load(src, "f").unwrap();
        assert_eq!(
            f.call(&[json!(1)]),
            Err(CallError::Raised {
                class: "ValueError".into(),
                bases: vec!["Exception".into(), "BaseException".into(), "object".into()],
                message: "nope".into()
            })
        );
    }

    #[test]
    fn subclassed_exception_carries_its_ancestors() {
        let Some(sb) = sandbox() else { return };
        let src = "class RPNError(ValueError):\n    pass\n\ndef f():\n    raise RPNError('bad')\n";

        let err = sb.load(src, "f").unwrap().call(&[]).unwrap_err();
        assert!(err.is_instance_of("RPNError"));
        assert!(err.is_instance_of("ValueError"));
        assert!(!err.is_instance_of("TypeError"));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_is_not_held_up_by_spawned_processes() {
        let Some(_) = sandbox() else { return };
        let sb = PythonSandbox::new("python3", Duration::from_millis(500));
        let src = "import subprocess\nsubprocess.Popen(['sleep', '20'])\nwhile True:\n    pass\n";

        let started = std::time::Instant::now();
        let err = sb.load(src, "f").err().unwrap();

        assert!(matches!(err, ExecError::Import(ref m) if m.contains("timed out")));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn syntax_error_is_import_failure() {
        let Some(sb) = sandbox() else { return };
        let err = sb.load("def f(:\n  pass", "f").err().unwrap();
        assert!(matches!(err, ExecError::Import(ref m) if m.starts_with("SyntaxError")));
    }

    #[test]
    fn missing_function_lists_definitions() {
        let Some(sb) = sandbox() else { return };
        let err = sb.load("def other():\n    return 1\n", "wanted").err().unwrap();
        assert_eq!(
            err,
            ExecError::MissingSymbol {
                symbol: "wanted".into(),
                defined: vec!["other".into()],
            }
        );
    }

    #[test]
    fn non_terminating_call_times_out() {
        let Some(_) = sandbox() else { return };
        let sb = PythonSandbox::new("python3", Duration::from_millis(500));
        let mut f = sb.load("def spin():\n    while True:\n        pass\n", "spin").unwrap();

        let err = f.call(&[]).unwrap_err();
        assert!(matches!(err, CallError::Internal(ref m) if m.contains("timed out")));
    }

    #[test]
    fn missing_interpreter_is_runner_error() {
        let sb = PythonSandbox::new("definitely-not-a-python-binary", Duration::from_secs(1));
        let err = sb.load("def f(): pass", "f").err().unwrap();
        assert!(matches!(err, ExecError::Runner(_)));
    }
}
