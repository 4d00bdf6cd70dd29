//! testgen/generate.rs
//!
//! Model-written pytest files. Two modes:
//!
//! - `coverage`: show the model the existing tests and their coverage and ask
//!   for tests that reach what they miss.
//! - `spec_guided`: first ask for the problem's properties as plain `assert`
//!   lines over the inputs and the correct result `res`, then ask for tests
//!   derived only from those properties.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codegen::extract::extract_code;
use crate::error::{ConfigError, ModelError};
use crate::llm::{fill_template, ModelClient};
use crate::problems::Problem;
use crate::testgen::coverage::CoverageReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestGenMode {
    Coverage,
    SpecGuided,
}

impl TestGenMode {
    pub const ALL: [TestGenMode; 2] = [TestGenMode::Coverage, TestGenMode::SpecGuided];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestGenMode::Coverage => "coverage",
            TestGenMode::SpecGuided => "spec_guided",
        }
    }
}

impl fmt::Display for TestGenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestGenMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        TestGenMode::ALL
            .into_iter()
            .find(|m| m.as_str() == norm)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown test generation mode `{s}`")))
    }
}

/* ============================================================
   Prompts
   ============================================================ */

const COVERAGE_PROMPT: &str = r#"You are helping improve test coverage for a Python function.

Problem:
{PROBLEM_SPEC}

The current tests reach {LINE}% line coverage and {BRANCH}% branch coverage:
```python
{EXISTING_TESTS}
```

Generate additional pytest unit tests that exercise behaviour these tests miss:
boundary values, inputs that must raise, and unusual but valid inputs.

Requirements:
- Import the function with `from {MODULE} import {FUNCTION_NAME}`.
- Name each test `test_gen_<short_description>`.
- Use `pytest.raises` for inputs that must raise.

Return only Python test code, no explanations."#;

const PROPERTIES_PROMPT: &str = r#"You are helping with specification-guided testing.

Problem description:
{PROBLEM_SPEC}

Write formal specifications as Python assertions that describe necessary
properties of the correct result. Refer to the inputs by their parameter names
and let `res` denote the correct result for those inputs.

Constraints:
- Do NOT call {FUNCTION_NAME} or any other implementation in the assertions.
- Do NOT use I/O, randomness, or time.
- Use only pure arithmetic, sequence, string and boolean operations.
- Cover input domain constraints, edge cases, and the conditions under which
  the function must raise.

Generate 6-8 Python `assert` statements. Return ONLY the assertion code lines,
no prose."#;

const SPEC_TESTS_PROMPT: &str = r#"You are given formal specifications for `{FUNCTION_NAME}`:
```python
{PROPERTIES}
```

Problem description:
{PROBLEM_SPEC}

Using ONLY these specifications, generate pytest unit tests for `{FUNCTION_NAME}`.

Requirements:
- Use pytest style, not unittest.
- Import the function with `from {MODULE} import {FUNCTION_NAME}`.
- Name each test `test_spec_<short_description>`.
- Cover simple valid inputs, edge cases, and inputs that must raise.
- Prefer parametrization when several inputs share one property.

Produce 6-10 tests. Return ONLY valid Python test code."#;

/// What the coverage prompt shows the model.
#[derive(Debug, Clone, Copy)]
pub struct CoverageContext<'a> {
    pub existing_tests: &'a str,
    pub current: Option<CoverageReport>,
}

pub fn coverage_prompt(problem: &Problem, module: &str, ctx: CoverageContext<'_>) -> String {
    let (line, branch) = ctx
        .current
        .map(|c| (format!("{:.1}", c.line), format!("{:.1}", c.branch)))
        .unwrap_or_else(|| ("unknown".into(), "unknown".into()));

    fill_template(
        COVERAGE_PROMPT,
        &problem.spec,
        &[
            ("FUNCTION_NAME", problem.function.as_str()),
            ("MODULE", module),
            ("LINE", line.as_str()),
            ("BRANCH", branch.as_str()),
            ("EXISTING_TESTS", ctx.existing_tests.trim()),
        ],
    )
}

pub fn properties_prompt(problem: &Problem) -> String {
    fill_template(
        PROPERTIES_PROMPT,
        &problem.spec,
        &[("FUNCTION_NAME", problem.function.as_str())],
    )
}

pub fn spec_tests_prompt(problem: &Problem, module: &str, properties: &str) -> String {
    fill_template(
        SPEC_TESTS_PROMPT,
        &problem.spec,
        &[
            ("FUNCTION_NAME", problem.function.as_str()),
            ("MODULE", module),
            ("PROPERTIES", properties.trim()),
        ],
    )
}

/* ============================================================
   Model calls
   ============================================================ */

/// One response, code extracted. An empty reply is a short response.
pub fn ask_for_code(client: &dyn ModelClient, prompt: &str) -> Result<String, ModelError> {
    let reply = client
        .generate(prompt, 1)?
        .into_iter()
        .next()
        .filter(|r| !r.trim().is_empty())
        .ok_or(ModelError::ShortResponse {
            got: 0,
            expected: 1,
        })?;
    Ok(extract_code(&reply))
}

/// Make a generated test file importable on its own: the solution import and
/// `import pytest` go on top when the model left them out.
pub fn materialize_tests(code: &str, module: &str, function: &str) -> String {
    let mut header = Vec::new();

    let imports_function = code.lines().any(|l| {
        let l = l.trim_start();
        l.starts_with(&format!("from {module} import")) || l.starts_with(&format!("import {module}"))
    });
    if !imports_function {
        header.push(format!("from {module} import {function}"));
    }

    let imports_pytest = code
        .lines()
        .any(|l| l.trim_start().starts_with("import pytest"));
    if code.contains("pytest.") && !imports_pytest {
        header.push("import pytest".to_string());
    }

    if header.is_empty() {
        return format!("{}\n", code.trim_end());
    }
    format!("{}\n\n{}\n", header.join("\n"), code.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn problem() -> Problem {
        crate::problems::find(&crate::problems::catalog(), "normalize_path")
            .unwrap()
            .clone()
    }

    struct Echo(RefCell<Vec<String>>, &'static str);

    impl ModelClient for Echo {
        fn generate(&self, prompt: &str, n: usize) -> Result<Vec<String>, ModelError> {
            self.0.borrow_mut().push(prompt.to_string());
            Ok(vec![self.1.to_string(); n])
        }

        fn label(&self) -> String {
            "echo:test".into()
        }
    }

    #[test]
    fn mode_parses_with_dashes() {
        assert_eq!("spec-guided".parse::<TestGenMode>().unwrap(), TestGenMode::SpecGuided);
        assert_eq!("Coverage".parse::<TestGenMode>().unwrap(), TestGenMode::Coverage);
        assert!("mutation".parse::<TestGenMode>().is_err());
    }

    #[test]
    fn coverage_prompt_shows_tests_and_rates() {
        let prompt = coverage_prompt(
            &problem(),
            "normalize_path",
            CoverageContext {
                existing_tests: "def test_fixture_01():\n    pass\n",
                current: Some(CoverageReport { line: 90.0, branch: 85.7 }),
            },
        );
        assert!(prompt.contains("90.0% line coverage and 85.7% branch coverage"));
        assert!(prompt.contains("def test_fixture_01():"));
        assert!(prompt.contains("from normalize_path import normalize_path"));
        assert!(prompt.contains(&problem().spec));
    }

    #[test]
    fn spec_prompts_carry_properties_not_implementation() {
        let props = properties_prompt(&problem());
        assert!(props.contains("Do NOT call normalize_path"));

        let tests = spec_tests_prompt(&problem(), "normalize_path", "assert res.startswith('/')\n");
        assert!(tests.contains("```python\nassert res.startswith('/')\n```"));
        assert!(tests.contains("test_spec_<short_description>"));
    }

    #[test]
    fn ask_for_code_extracts_the_fence() {
        let client = Echo(RefCell::default(), "Here:\n```python\ndef test_a():\n    assert True\n```");
        let code = ask_for_code(&client, "p").unwrap();
        assert_eq!(code, "def test_a():\n    assert True");

        let silent = Echo(RefCell::default(), "  ");
        assert!(matches!(
            ask_for_code(&silent, "p"),
            Err(ModelError::ShortResponse { .. })
        ));
    }

    #[test]
    fn materialize_adds_missing_imports_only() {
        let bare = "def test_a():\n    with pytest.raises(ValueError):\n        f(0)";
        assert_eq!(
            materialize_tests(bare, "sol", "f"),
            format!("from sol import f\nimport pytest\n\n{bare}\n")
        );

        let complete = "import pytest\nfrom sol import f\n\ndef test_a():\n    assert f(1)";
        assert_eq!(materialize_tests(complete, "sol", "f"), format!("{complete}\n"));
    }
}
