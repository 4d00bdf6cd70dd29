// src/testgen/session.rs
//
// One coverage session: measure a solution under its fixture tests, then
// add model-written test files one iteration at a time and measure the
// cumulative coverage after each.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CoverageError;
use crate::llm::ModelClient;
use crate::problems::Problem;
use crate::testgen::coverage::{CoverageReport, CoverageRun, PytestCov};
use crate::testgen::fixture::{render_fixture_tests, FIXTURE_FILE};
use crate::testgen::generate::{
    ask_for_code, coverage_prompt, materialize_tests, properties_prompt, spec_tests_prompt,
    CoverageContext, TestGenMode,
};

pub const PROPERTIES_FILE: &str = "properties.py";

/// One measurement. Iteration 0 is the fixture alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoverageRecord {
    pub ts: DateTime<Utc>,
    pub run_id: String,
    pub problem: String,
    /// Model that wrote this iteration's tests; `None` for the fixture.
    pub model: Option<String>,
    pub mode: TestGenMode,
    pub iteration: usize,
    /// Test files measured together, by file name.
    pub tests: Vec<String>,
    pub coverage: Option<CoverageReport>,
    pub tests_passed: bool,
    pub summary: String,
}

pub struct SessionContext<'a> {
    /// Without a client only the fixture is measured.
    pub client: Option<&'a dyn ModelClient>,
    pub runner: &'a PytestCov,
    pub pause: Duration,
    pub run_id: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionPlan {
    pub mode: TestGenMode,
    pub iterations: usize,
}

/// Run a session in `workdir`, which receives the solution module, every
/// test file and the coverage report. Model errors end the session.
pub fn run_session(
    ctx: &SessionContext<'_>,
    problem: &Problem,
    solution: &str,
    plan: SessionPlan,
    workdir: &Path,
) -> Result<Vec<CoverageRecord>, CoverageError> {
    let module = problem.name.as_str();
    write(workdir, &format!("{module}.py"), &format!("{}\n", solution.trim_end()))?;

    let fixture = render_fixture_tests(module, &problem.function, &problem.checks());
    let mut tests = vec![write(workdir, FIXTURE_FILE, &fixture)?];
    let mut sources = vec![fixture];

    let measured = ctx.runner.measure(workdir, module, &tests)?;
    let mut records = vec![record(ctx, problem, plan.mode, 0, None, &tests, &measured)];
    log_iteration(problem, 0, &measured);

    let Some(client) = ctx.client else {
        return Ok(records);
    };
    if plan.iterations == 0 {
        return Ok(records);
    }

    let mut calls = 0usize;
    let mut ask = |prompt: &str| {
        if calls > 0 && !ctx.pause.is_zero() {
            thread::sleep(ctx.pause);
        }
        calls += 1;
        ask_for_code(client, prompt)
    };

    let properties = match plan.mode {
        TestGenMode::SpecGuided => {
            let props = ask(&properties_prompt(problem))?;
            write(workdir, PROPERTIES_FILE, &format!("{props}\n"))?;
            Some(props)
        }
        TestGenMode::Coverage => None,
    };

    let mut current = measured.report;

    for iteration in 1..=plan.iterations {
        let prompt = match &properties {
            Some(props) => spec_tests_prompt(problem, module, props),
            None => {
                let existing = sources.join("\n\n");
                coverage_prompt(
                    problem,
                    module,
                    CoverageContext {
                        existing_tests: &existing,
                        current,
                    },
                )
            }
        };

        let code = ask(&prompt)?;
        let code = materialize_tests(&code, module, &problem.function);
        tests.push(write(workdir, &format!("test_iteration_{iteration}.py"), &code)?);
        sources.push(code);

        let measured = ctx.runner.measure(workdir, module, &tests)?;
        if measured.report.is_none() {
            warn!(problem = %problem.name, iteration, summary = %measured.summary, "no coverage report");
        }
        log_iteration(problem, iteration, &measured);

        records.push(record(
            ctx,
            problem,
            plan.mode,
            iteration,
            Some(client.label()),
            &tests,
            &measured,
        ));
        current = measured.report.or(current);
    }

    Ok(records)
}

fn record(
    ctx: &SessionContext<'_>,
    problem: &Problem,
    mode: TestGenMode,
    iteration: usize,
    model: Option<String>,
    tests: &[PathBuf],
    run: &CoverageRun,
) -> CoverageRecord {
    CoverageRecord {
        ts: Utc::now(),
        run_id: ctx.run_id.to_string(),
        problem: problem.name.clone(),
        model,
        mode,
        iteration,
        tests: tests
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect(),
        coverage: run.report,
        tests_passed: run.tests_passed,
        summary: run.summary.clone(),
    }
}

fn log_iteration(problem: &Problem, iteration: usize, run: &CoverageRun) {
    match run.report {
        Some(c) => info!(
            problem = %problem.name,
            iteration,
            line = c.line,
            branch = c.branch,
            tests_passed = run.tests_passed,
            "coverage measured"
        ),
        None => info!(problem = %problem.name, iteration, "coverage unavailable"),
    }
}

fn write(dir: &Path, name: &str, content: &str) -> Result<PathBuf, CoverageError> {
    let path = dir.join(name);
    fs::create_dir_all(dir)
        .and_then(|_| fs::write(&path, content))
        .map_err(|source| CoverageError::Io {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::error::ModelError;
    use crate::problems::{catalog, find};

    const GENERATED_TESTS: &str = "```python\ndef test_gen_negative():\n    assert is_palindrome_sentence('ab') is False\n```";

    struct Scripted {
        replies: RefCell<Vec<&'static str>>,
        prompts: RefCell<Vec<String>>,
    }

    impl Scripted {
        fn new(mut replies: Vec<&'static str>) -> Self {
            replies.reverse();
            Self {
                replies: RefCell::new(replies),
                prompts: RefCell::default(),
            }
        }
    }

    impl ModelClient for Scripted {
        fn generate(&self, prompt: &str, n: usize) -> Result<Vec<String>, ModelError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            let next = self
                .replies
                .borrow_mut()
                .pop()
                .ok_or_else(|| ModelError::Request("script exhausted".into()))?;
            Ok(vec![next.to_string(); n])
        }

        fn label(&self) -> String {
            "scripted:tests".into()
        }
    }

    fn runner() -> Option<PytestCov> {
        let r = PytestCov::new("python3", Duration::from_secs(120));
        r.available().then_some(r)
    }

    fn palindrome() -> Problem {
        find(&catalog(), "is_palindrome_sentence").unwrap().clone()
    }

    const SOLUTION: &str = "\
def is_palindrome_sentence(s):
    cleaned = [c.lower() for c in s if c.isalnum()]
    return cleaned == cleaned[::-1]
";

    #[test]
    fn fixture_only_without_a_client() {
        let Some(runner) = runner() else { return };
        let dir = tempfile::tempdir().unwrap();
        let ctx = SessionContext {
            client: None,
            runner: &runner,
            pause: Duration::ZERO,
            run_id: "r1",
        };
        let plan = SessionPlan {
            mode: TestGenMode::Coverage,
            iterations: 2,
        };

        let records = run_session(&ctx, &palindrome(), SOLUTION, plan, dir.path()).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].iteration, 0);
        assert_eq!(records[0].tests, vec![FIXTURE_FILE]);
        assert!(records[0].tests_passed, "{}", records[0].summary);
        assert_eq!(records[0].coverage.map(|c| c.line), Some(100.0));
    }

    #[test]
    fn coverage_mode_adds_one_file_per_iteration() {
        let Some(runner) = runner() else { return };
        let dir = tempfile::tempdir().unwrap();
        let client = Scripted::new(vec![GENERATED_TESTS, GENERATED_TESTS]);
        let ctx = SessionContext {
            client: Some(&client),
            runner: &runner,
            pause: Duration::ZERO,
            run_id: "r2",
        };
        let plan = SessionPlan {
            mode: TestGenMode::Coverage,
            iterations: 2,
        };

        let records = run_session(&ctx, &palindrome(), SOLUTION, plan, dir.path()).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(
            records[2].tests,
            vec![FIXTURE_FILE, "test_iteration_1.py", "test_iteration_2.py"]
        );
        assert_eq!(records[1].model.as_deref(), Some("scripted:tests"));
        assert!(records.iter().all(|r| r.tests_passed));

        let written = fs::read_to_string(dir.path().join("test_iteration_1.py")).unwrap();
        assert!(written.starts_with("from is_palindrome_sentence import is_palindrome_sentence\n"));

        let prompts = client.prompts.borrow();
        assert!(prompts[1].contains("def test_gen_negative():"));
    }

    #[test]
    fn spec_guided_asks_for_properties_first() {
        let Some(runner) = runner() else { return };
        let dir = tempfile::tempdir().unwrap();
        let client = Scripted::new(vec!["assert res in (True, False)", GENERATED_TESTS]);
        let ctx = SessionContext {
            client: Some(&client),
            runner: &runner,
            pause: Duration::ZERO,
            run_id: "r3",
        };
        let plan = SessionPlan {
            mode: TestGenMode::SpecGuided,
            iterations: 1,
        };

        let records = run_session(&ctx, &palindrome(), SOLUTION, plan, dir.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].mode, TestGenMode::SpecGuided);

        let props = fs::read_to_string(dir.path().join(PROPERTIES_FILE)).unwrap();
        assert_eq!(props, "assert res in (True, False)\n");

        let prompts = client.prompts.borrow();
        assert!(prompts[0].contains("formal specifications as Python assertions"));
        assert!(prompts[1].contains("assert res in (True, False)"));
    }

    #[test]
    fn model_error_ends_the_session() {
        let Some(runner) = runner() else { return };
        let dir = tempfile::tempdir().unwrap();
        let client = Scripted::new(vec![]);
        let ctx = SessionContext {
            client: Some(&client),
            runner: &runner,
            pause: Duration::ZERO,
            run_id: "r4",
        };
        let plan = SessionPlan {
            mode: TestGenMode::Coverage,
            iterations: 1,
        };

        let err = run_session(&ctx, &palindrome(), SOLUTION, plan, dir.path()).unwrap_err();
        assert!(matches!(err, CoverageError::Model(_)));
    }
}
