//! error.rs
//!
//! Infrastructure errors. Anything caused by a candidate's code is not an
//! error here: it becomes a failure string inside a `TestOutcome`.

use std::path::PathBuf;

/// Failures talking to a model provider. Fatal for the single
/// problem/strategy/model combination that hit them.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("unknown provider `{0}`")]
    UnknownProvider(String),

    #[error("no API key for {provider} (set {env} or `api_key` in config)")]
    MissingApiKey { provider: String, env: String },

    #[error("invalid base url `{url}`: {message}")]
    BadUrl { url: String, message: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("LLM error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{provider} response parse failure: {message}")]
    Parse { provider: String, message: String },

    #[error("model returned {got} responses, expected {expected}")]
    ShortResponse { got: usize, expected: usize },
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        ModelError::Request(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unknown strategy `{0}`")]
    UnknownStrategy(String),

    #[error("unknown problem `{0}`")]
    UnknownProblem(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: malformed record: {source}")]
    Malformed {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failures of a coverage session that are not about the code under test.
#[derive(Debug, thiserror::Error)]
pub enum CoverageError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pytest could not run: {0}")]
    Runner(String),

    #[error("pytest timed out after {0}s")]
    TimedOut(f32),

    #[error(transparent)]
    Model(#[from] ModelError),
}
