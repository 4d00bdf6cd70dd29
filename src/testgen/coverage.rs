// src/testgen/coverage.rs
//
// Line and branch coverage of one solution module under a set of pytest
// files, via pytest-cov's Cobertura XML report.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoverageError;
use crate::executor::run::run_with_input;

pub const COVERAGE_XML: &str = "coverage.xml";

/// Percentages, rounded to one decimal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub line: f64,
    pub branch: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverageRun {
    /// `None` when pytest produced no report (collection error, crash).
    pub report: Option<CoverageReport>,
    pub tests_passed: bool,
    /// pytest's closing summary line, e.g. `12 passed in 0.05s`.
    pub summary: String,
}

fn root_element() -> &'static Regex {
    static ROOT: OnceLock<Regex> = OnceLock::new();
    ROOT.get_or_init(|| Regex::new(r"<coverage\b[^>]*>").expect("root pattern is valid"))
}

fn rate_attr(tag: &str, name: &str) -> Option<f64> {
    let pattern = format!(r#"\b{name}="([0-9.eE+-]+)""#);
    let re = Regex::new(&pattern).ok()?;
    re.captures(tag)?.get(1)?.as_str().parse().ok()
}

/// Overall rates from the root `<coverage>` element. Missing rates count as
/// zero; a document without the element yields `None`.
pub fn parse_coverage_xml(xml: &str) -> Option<CoverageReport> {
    let tag = root_element().find(xml)?.as_str();

    let percent = |name: &str| {
        let rate = rate_attr(tag, name).unwrap_or(0.0);
        (rate * 1000.0).round() / 10.0
    };

    Some(CoverageReport {
        line: percent("line-rate"),
        branch: percent("branch-rate"),
    })
}

/// `python -m pytest --cov` inside a working directory that holds the
/// solution module and the test files.
#[derive(Debug, Clone)]
pub struct PytestCov {
    python: String,
    timeout: Duration,
}

impl PytestCov {
    pub fn new(python: impl Into<String>, timeout: Duration) -> Self {
        Self {
            python: python.into(),
            timeout,
        }
    }

    /// True if both pytest and pytest-cov import.
    pub fn available(&self) -> bool {
        Command::new(&self.python)
            .args(["-c", "import pytest, pytest_cov"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub fn measure(
        &self,
        workdir: &Path,
        module: &str,
        tests: &[PathBuf],
    ) -> Result<CoverageRun, CoverageError> {
        let xml_path = workdir.join(COVERAGE_XML);
        if xml_path.exists() {
            fs::remove_file(&xml_path).map_err(|source| CoverageError::Io {
                path: xml_path.clone(),
                source,
            })?;
        }

        let mut cmd = Command::new(&self.python);
        cmd.current_dir(workdir)
            .env("PYTHONPATH", workdir)
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .args(["-m", "pytest"])
            .arg(format!("--cov={module}"))
            .arg("--cov-branch")
            .arg(format!("--cov-report=xml:{COVERAGE_XML}"))
            .args(["--tb=no", "-q", "-p", "no:cacheprovider"])
            .args(tests);

        let out = run_with_input(cmd, b"", self.timeout).map_err(CoverageError::Runner)?;
        if out.timed_out() {
            return Err(CoverageError::TimedOut(self.timeout.as_secs_f32()));
        }

        let report = fs::read_to_string(&xml_path)
            .ok()
            .and_then(|xml| parse_coverage_xml(&xml));

        let summary = out
            .stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default()
            .trim_matches('=')
            .trim()
            .to_string();

        debug!(
            module,
            tests = tests.len(),
            duration_ms = out.duration_ms as u64,
            summary = %summary,
            "pytest-cov finished"
        );

        Ok(CoverageRun {
            report,
            tests_passed: out.status.is_some_and(|s| s.success()),
            summary,
        })
    }
}
