//! commands.rs
//!
//! One handler per CLI subcommand. Handlers print their results to stdout
//! and return whether the command succeeded; infrastructure failures come
//! back as errors.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use uuid::Uuid;

use crate::batch::{self, BatchPlan, Connect, Filter};
use crate::codegen::extract::{extract_code, strip_review_notes};
use crate::codegen::inspect::inspect;
use crate::codegen::runner::{run_candidate, run_checks};
use crate::codegen::Candidate;
use crate::config::EvalConfig;
use crate::error::{ConfigError, CoverageError};
use crate::problems::reference::reference;
use crate::problems::{find, load_problems, Problem};
use crate::report::{
    append_jsonl, load_records, model_differences, model_stats, ResultRecord, RunWriters,
    COVERAGE_FILE, RESULTS_FILE,
};
use crate::testgen::{run_session, CoverageRecord, SessionContext, SessionPlan, TestGenMode};

type CmdResult = Result<bool, Box<dyn Error>>;

/// Command-line overrides for `run`.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub k: Option<usize>,
    pub max_repairs: Option<usize>,
    pub out_dir: Option<PathBuf>,
}

/* ============================================================
   run
   ============================================================ */

pub fn run(mut cfg: EvalConfig, filter: Filter, overrides: RunOverrides) -> CmdResult {
    if let Some(k) = overrides.k {
        cfg.k = k;
    }
    if let Some(r) = overrides.max_repairs {
        cfg.max_repairs = r;
    }
    if let Some(dir) = overrides.out_dir {
        cfg.out_dir = dir;
    }
    cfg.validate()?;

    let sandbox = cfg.sandbox();
    if !sandbox.available() {
        return Err(format!("python interpreter `{}` not found", cfg.python).into());
    }

    let problems = load_problems(cfg.problems_dir.as_deref())?;
    let templates = cfg.template_set()?;
    let plan = BatchPlan::new(&cfg, problems, &filter)?;

    let mut writers = RunWriters::open(&cfg.out_dir)?;
    let summary = batch::run_batch(&plan, &templates, &sandbox, &batch::http_connect, &mut writers)?;

    println!(
        "run {}: {} combinations, {} pass@k, {} skipped -> {}",
        summary.run_id,
        summary.completed,
        summary.passed,
        summary.skipped,
        cfg.out_dir.display()
    );

    let records: Vec<ResultRecord> = load_records(&cfg.out_dir.join(RESULTS_FILE))?
        .into_iter()
        .filter(|r| r.run_id == summary.run_id)
        .collect();
    print!("{}", model_report(&records));

    Ok(summary.skipped == 0)
}

/// Pass rate and passed/failed combinations per model, then the
/// combinations on which models disagree.
pub fn model_report(records: &[ResultRecord]) -> String {
    let stats = model_stats(records);
    let mut out = String::new();

    for s in &stats {
        out.push_str(&format!(
            "\n{}:\n  pass rate: {}/{} ({:.1}%)\n",
            s.model,
            s.passed,
            s.total,
            s.pass_rate() * 100.0
        ));
        if !s.passed_combos.is_empty() {
            out.push_str(&format!("  passed: {}\n", s.passed_combos.join(", ")));
        }
        if !s.failed_combos.is_empty() {
            out.push_str(&format!("  failed: {}\n", s.failed_combos.join(", ")));
        }
    }

    if stats.len() > 1 {
        let diff = model_differences(records);
        if diff.is_empty() {
            out.push_str("\nmodels agree on every combination\n");
        } else {
            out.push_str(&format!("\nmodels differ on: {}\n", diff.join(", ")));
        }
    }

    out
}

/* ============================================================
   baseline / check / problems
   ============================================================ */

/// Every fixture against its reference solution.
pub fn baseline() -> CmdResult {
    let problems = load_problems(None)?;
    let mut all_passed = true;

    for problem in &problems {
        let Some(mut solution) = reference(&problem.name) else {
            warn!(problem = %problem.name, "no reference solution");
            all_passed = false;
            continue;
        };

        let checks = problem.checks();
        let outcome = run_checks(solution.as_mut(), &checks);

        if outcome.passed {
            println!("PASS {:<24} {} checks", problem.name, checks.len());
        } else {
            all_passed = false;
            println!("FAIL {}", problem.name);
            for f in &outcome.failures {
                println!("    {f}");
            }
        }
    }

    Ok(all_passed)
}

/// Run a file (raw code or a saved model response) through the sandbox.
pub fn check(cfg: &EvalConfig, problem_name: &str, file: &Path) -> CmdResult {
    let problems = load_problems(cfg.problems_dir.as_deref())?;
    let problem = find(&problems, problem_name)
        .ok_or_else(|| ConfigError::UnknownProblem(problem_name.to_string()))?;

    let text = fs::read_to_string(file)
        .map_err(|e| format!("cannot read {}: {e}", file.display()))?;
    let candidate = Candidate::from_response(&text);

    let inspection = inspect(&candidate.code);
    if inspection.has_syntax_error {
        warn!(file = %file.display(), "candidate does not parse cleanly");
    }

    let sandbox = cfg.sandbox();
    let outcome = run_candidate(&sandbox, &candidate, &problem.function, &problem.checks());

    if outcome.passed {
        println!("PASS {} ({})", problem.name, candidate.id);
    } else {
        println!("FAIL {} ({})", problem.name, candidate.id);
        for f in &outcome.failures {
            println!("  - {f}");
        }
    }

    Ok(outcome.passed)
}

pub fn problems(cfg: &EvalConfig) -> CmdResult {
    for p in load_problems(cfg.problems_dir.as_deref())? {
        let title = p
            .spec
            .lines()
            .find(|l| !l.trim().is_empty() && !l.starts_with('#'))
            .unwrap_or_default();
        println!("{:<24} {:>2} checks  {}", p.name, p.checks().len(), title.trim());
    }
    Ok(true)
}

/* ============================================================
   redebug / export
   ============================================================ */

pub fn redebug(cfg: &EvalConfig, results: Option<&Path>, out_dir: Option<&Path>) -> CmdResult {
    let results = results
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cfg.out_dir.join(RESULTS_FILE));
    let out_dir = out_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cfg.out_dir.join("redebug"));

    let records = load_records(&results)?;
    let problems = load_problems(cfg.problems_dir.as_deref())?;
    let templates = cfg.template_set()?;
    let sandbox = cfg.sandbox();

    let mut writers = RunWriters::open(&out_dir)?;
    let summary = batch::redebug(
        &records,
        cfg,
        &problems,
        &templates,
        &sandbox,
        &batch::http_connect,
        &mut writers,
    )?;

    println!(
        "redebug {}: {} repaired of {} -> {}",
        summary.run_id,
        summary.passed,
        summary.completed,
        out_dir.display()
    );
    Ok(summary.skipped == 0)
}

/* ============================================================
   coverage
   ============================================================ */

#[derive(Debug, Clone, Default)]
pub struct CoverageArgs {
    pub problems: Vec<String>,
    /// Code or a saved response to measure; needs exactly one problem.
    pub solution: Option<PathBuf>,
    /// Otherwise the first passing candidate per problem from this stream.
    pub results: Option<PathBuf>,
    pub mode: Option<TestGenMode>,
    pub iterations: Option<usize>,
    pub model: Vec<String>,
}

pub fn coverage(cfg: &EvalConfig, args: CoverageArgs) -> CmdResult {
    coverage_with(cfg, args, &batch::http_connect)
}

fn coverage_with(cfg: &EvalConfig, args: CoverageArgs, connect: &Connect<'_>) -> CmdResult {
    let problems = load_problems(cfg.problems_dir.as_deref())?;
    let filter = Filter {
        problems: args.problems.clone(),
        strategies: Vec::new(),
        models: args.model.clone(),
    };
    let plan = BatchPlan::new(cfg, problems, &filter)?;
    let solutions = coverage_targets(cfg, &args, &plan.problems)?;

    if solutions.is_empty() {
        println!("no solutions to measure");
        return Ok(false);
    }

    let runner = cfg.coverage_runner();
    if !runner.available() {
        return Err(format!("`{}` cannot import pytest and pytest-cov", cfg.python).into());
    }

    let iterations = args.iterations.unwrap_or(cfg.testgen_iterations);
    let mode = args.mode.unwrap_or(TestGenMode::Coverage);
    let client = match (iterations, plan.models.first()) {
        (0, _) | (_, None) => None,
        (_, Some(model)) => Some(connect(model)?),
    };

    let run_id = Uuid::new_v4().to_string();
    let ctx = SessionContext {
        client: client.as_deref(),
        runner: &runner,
        pause: cfg.pause(),
        run_id: &run_id,
    };
    let session = SessionPlan { mode, iterations };
    let log = cfg.out_dir.join(COVERAGE_FILE);
    let mut all_ok = true;

    for (problem, code) in &solutions {
        let workdir = cfg.out_dir.join("coverage").join(&problem.name);
        match run_session(&ctx, problem, code, session, &workdir) {
            Ok(records) => {
                append_jsonl(&log, &records)?;
                for r in &records {
                    println!("{}", coverage_line(r));
                }
            }
            Err(CoverageError::Model(e)) => {
                warn!(problem = %problem.name, error = %e, "coverage session ended early");
                all_ok = false;
            }
            Err(e) => return Err(e.into()),
        }
    }

    println!("coverage {run_id} -> {}", log.display());
    Ok(all_ok)
}

/// Solution source per selected problem.
fn coverage_targets(
    cfg: &EvalConfig,
    args: &CoverageArgs,
    problems: &[Problem],
) -> Result<Vec<(Problem, String)>, Box<dyn Error>> {
    if let Some(path) = &args.solution {
        let [problem] = problems else {
            return Err("--solution needs exactly one --problem".into());
        };
        let text = fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        return Ok(vec![(problem.clone(), extract_code(&text))]);
    }

    let results = args
        .results
        .clone()
        .unwrap_or_else(|| cfg.out_dir.join(RESULTS_FILE));
    let chosen = select_solutions(&load_records(&results)?, &[]);

    let mut targets = Vec::new();
    for problem in problems {
        match chosen.iter().find(|(name, _)| *name == problem.name) {
            Some((_, candidate)) => {
                targets.push((problem.clone(), strip_review_notes(&candidate.code)));
            }
            None => warn!(problem = %problem.name, "no passing candidate to measure"),
        }
    }
    Ok(targets)
}

fn coverage_line(r: &CoverageRecord) -> String {
    let measured = match r.coverage {
        Some(c) => format!("{:.1}% line, {:.1}% branch", c.line, c.branch),
        None => "no coverage report".to_string(),
    };
    let status = if r.tests_passed { "tests pass" } else { "tests fail" };
    format!(
        "{:<24} iteration {}: {measured} ({status}: {})",
        r.problem, r.iteration, r.summary
    )
}

/// Write one passing solution per problem to `<dir>/<problem>.py`.
pub fn export(results: &Path, dir: &Path, prefer: &[String]) -> CmdResult {
    let records = load_records(results)?;
    let chosen = select_solutions(&records, prefer);

    fs::create_dir_all(dir).map_err(|e| format!("cannot create {}: {e}", dir.display()))?;

    for (problem, candidate) in &chosen {
        let path = dir.join(format!("{problem}.py"));
        let mut code = strip_review_notes(&candidate.code);
        code.push('\n');
        fs::write(&path, code).map_err(|e| format!("cannot write {}: {e}", path.display()))?;
        info!(problem = %problem, candidate = %candidate.id, "exported");
        println!("{} <- {}", path.display(), candidate.id);
    }

    if chosen.is_empty() {
        println!("no passing candidates in {}", results.display());
    }
    Ok(!chosen.is_empty())
}

/// First passing candidate per problem, in record order, trying records of
/// preferred models (by model name or `provider:model`) first. Problems come
/// out sorted by name.
pub fn select_solutions(records: &[ResultRecord], prefer: &[String]) -> Vec<(String, Candidate)> {
    let rank = |r: &ResultRecord| {
        prefer
            .iter()
            .position(|p| *p == r.model.model || *p == r.model.label())
            .unwrap_or(prefer.len())
    };

    let mut ordered: Vec<&ResultRecord> = records.iter().collect();
    ordered.sort_by_key(|r| rank(r));

    let mut chosen: Vec<(String, Candidate)> = Vec::new();
    for record in ordered {
        if chosen.iter().any(|(p, _)| *p == record.problem) {
            continue;
        }
        if let Some(attempt) = record.history.iter().find(|a| a.outcome.passed) {
            chosen.push((record.problem.clone(), attempt.candidate.clone()));
        }
    }

    chosen.sort_by(|a, b| a.0.cmp(&b.0));
    chosen
}
