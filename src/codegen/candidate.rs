use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use similar::TextDiff;

use crate::codegen::extract::extract_code;
use crate::codegen::inspect::inspect;

/// One generated source-code attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Candidate {
    /// Stable content hash (dedupe, logs, export).
    pub id: String,

    pub code: String,

    /// Top-level functions the source defines, as far as the parser can tell.
    #[serde(default)]
    pub defines: Vec<String>,
}

impl Candidate {
    pub fn from_code(code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            id: Self::compute_id(&code),
            defines: inspect(&code).functions,
            code,
        }
    }

    /// Extract from a raw model response.
    pub fn from_response(text: &str) -> Self {
        Self::from_code(extract_code(text))
    }

    /// Compute a canonical, deterministic ID.
    ///
    /// Whitespace at the ends does not change the ID.
    pub fn compute_id(code: &str) -> String {
        let mut h = Sha256::new();
        h.update(code.trim().as_bytes());
        hex::encode(h.finalize())[..16].to_string()
    }

    /// Line-level similarity in `0.0..=1.0`.
    pub fn similarity(&self, other: &Candidate) -> f32 {
        TextDiff::from_lines(&other.code, &self.code).ratio()
    }
}

/// Result of running one candidate against a problem's checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestOutcome {
    pub passed: bool,
    pub failures: Vec<String>,
}

impl TestOutcome {
    pub fn from_failures(failures: Vec<String>) -> Self {
        Self {
            passed: failures.is_empty(),
            failures,
        }
    }

    pub fn single(failure: impl Into<String>) -> Self {
        Self::from_failures(vec![failure.into()])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attempt {
    pub candidate: Candidate,
    pub outcome: TestOutcome,

    /// Against the previous attempt; repair rounds only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_to_previous: Option<f32>,
}

/// Ordered, append-only.
pub type AttemptHistory = Vec<Attempt>;
