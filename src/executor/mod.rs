//! executor
//!
//! The execution boundary. A `Sandbox` turns candidate source into a
//! `Callable` for one named function; nothing about the candidate ever runs
//! inside the harness process.

pub mod run;
pub mod sandbox;

use serde_json::Value;

pub use sandbox::PythonSandbox;

/// What a call can produce besides a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The function raised. `class` is the exception class name, `bases` its
    /// ancestors in method resolution order.
    Raised {
        class: String,
        bases: Vec<String>,
        message: String,
    },
    /// The sandbox itself failed (crash, timeout, garbled reply).
    Internal(String),
}

pub trait Callable {
    fn call(&mut self, args: &[Value]) -> Result<Value, CallError>;
}

/// Why a candidate could not be turned into a callable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    #[error("Code failed to import: {0}")]
    Import(String),

    #[error("Function {symbol} not found after exec{}", defined_hint(.defined))]
    MissingSymbol {
        symbol: String,
        defined: Vec<String>,
    },

    #[error("Test runner error: {0}")]
    Runner(String),
}

fn defined_hint(defined: &[String]) -> String {
    if defined.is_empty() {
        String::new()
    } else {
        format!(" (defined: {})", defined.join(", "))
    }
}

pub trait Sandbox {
    fn load(&self, source: &str, symbol: &str) -> Result<Box<dyn Callable>, ExecError>;
}

/// Plain Rust function as a callable. Reference solutions and test doubles
/// go through the same runner as sandboxed candidates.
pub struct NativeFn<F>(pub F);

impl<F> NativeFn<F>
where
    F: FnMut(&[Value]) -> Result<Value, CallError>,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Callable for NativeFn<F>
where
    F: FnMut(&[Value]) -> Result<Value, CallError>,
{
    fn call(&mut self, args: &[Value]) -> Result<Value, CallError> {
        (self.0)(args)
    }
}

pub fn raised(class: &str, message: impl Into<String>) -> CallError {
    CallError::Raised {
        class: class.to_string(),
        bases: Vec::new(),
        message: message.into(),
    }
}

impl CallError {
    /// Whether an `except <name>:` clause would catch this exception.
    pub fn is_instance_of(&self, name: &str) -> bool {
        match self {
            CallError::Raised { class, bases, .. } => {
                class == name || bases.iter().any(|b| b == name)
            }
            CallError::Internal(_) => false,
        }
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            CallError::Raised { class, .. } => Some(class),
            CallError::Internal(_) => None,
        }
    }
}
