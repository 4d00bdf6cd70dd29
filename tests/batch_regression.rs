use std::cell::Cell;
use std::fs;
use std::time::Duration;

use serde_json::Value;

use codegen_eval::batch::{redebug, run_batch, BatchPlan, Filter};
use codegen_eval::codegen::Strategy;
use codegen_eval::config::EvalConfig;
use codegen_eval::error::ModelError;
use codegen_eval::executor::{Callable, ExecError, NativeFn, Sandbox};
use codegen_eval::llm::{ModelClient, ModelConfig, TemplateSet};
use codegen_eval::problems::catalog;
use codegen_eval::problems::reference::reference;
use codegen_eval::report::{load_records, RunWriters, PROMPTS_FILE, RESULTS_FILE, SUMMARY_FILE};

/// Source containing "SOLVED" behaves like the reference solution; anything
/// else returns `None` for every call.
struct Marker;

impl Sandbox for Marker {
    fn load(&self, source: &str, symbol: &str) -> Result<Box<dyn Callable>, ExecError> {
        if source.contains("SOLVED") {
            if let Some(f) = reference(symbol) {
                return Ok(f);
            }
        }
        Ok(Box::new(NativeFn::new(|_: &[Value]| Ok(Value::Null))))
    }
}

/// Answers every prompt with the same text; fails after `budget` calls.
struct Canned {
    text: &'static str,
    budget: Cell<usize>,
}

impl ModelClient for Canned {
    fn generate(&self, _prompt: &str, n: usize) -> Result<Vec<String>, ModelError> {
        if self.budget.get() == 0 {
            return Err(ModelError::Status {
                status: 500,
                body: "upstream down".into(),
            });
        }
        self.budget.set(self.budget.get() - 1);
        Ok(vec![self.text.to_string(); n])
    }

    fn label(&self) -> String {
        "canned".into()
    }
}

fn connect(cfg: &ModelConfig) -> Result<Box<dyn ModelClient>, ModelError> {
    match cfg.model.as_str() {
        "solver" => Ok(Box::new(Canned {
            text: "```python\n# SOLVED\n```",
            budget: Cell::new(usize::MAX),
        })),
        "flaky" => Ok(Box::new(Canned {
            text: "pass",
            budget: Cell::new(1),
        })),
        _ => Err(ModelError::MissingApiKey {
            provider: cfg.provider.clone(),
            env: "NOPE_API_KEY".into(),
        }),
    }
}

fn config(models: &[&str]) -> EvalConfig {
    EvalConfig {
        models: models
            .iter()
            .map(|m| ModelConfig {
                provider: "openrouter".into(),
                model: m.to_string(),
                ..ModelConfig::default()
            })
            .collect(),
        strategies: vec![Strategy::Cot, Strategy::SelfRepair],
        k: 2,
        max_repairs: 2,
        ..EvalConfig::default()
    }
}

fn only(problems: &[&str]) -> Filter {
    Filter {
        problems: problems.iter().map(|p| p.to_string()).collect(),
        ..Filter::default()
    }
}

#[test]
fn writes_one_record_prompt_and_row_per_combination() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&["solver"]);
    let plan = BatchPlan::new(&cfg, catalog(), &only(&["evaluate_rpn", "int_to_roman"])).unwrap();
    let mut writers = RunWriters::open(dir.path()).unwrap();

    let summary = run_batch(&plan, &TemplateSet::default(), &Marker, &connect, &mut writers).unwrap();

    assert_eq!(summary.completed, 4);
    assert_eq!(summary.passed, 4);
    assert_eq!(summary.skipped, 0);

    let records = load_records(&dir.path().join(RESULTS_FILE)).unwrap();
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.run_id == summary.run_id));

    let cot = records.iter().find(|r| r.strategy == Strategy::Cot).unwrap();
    assert_eq!(cot.k, 2);
    assert_eq!(cot.successes, 2);
    assert_eq!(cot.history.len(), 2);

    let repair = records.iter().find(|r| r.strategy == Strategy::SelfRepair).unwrap();
    assert_eq!(repair.k, 1);
    assert_eq!(repair.history.len(), 1);

    let prompts = fs::read_to_string(dir.path().join(PROMPTS_FILE)).unwrap();
    assert_eq!(prompts.lines().count(), 4);

    let csv = fs::read_to_string(dir.path().join(SUMMARY_FILE)).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("problem,model,strategy,k,successes,pass@k (0/1)"));
    assert_eq!(lines.next(), Some("evaluate_rpn,openrouter:solver,cot,2,2,1"));
    assert_eq!(lines.count(), 3);
}

#[test]
fn model_errors_skip_only_their_combination() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&["no-key", "flaky"]);
    let plan = BatchPlan::new(&cfg, catalog(), &only(&["merge_intervals"])).unwrap();
    let mut writers = RunWriters::open(dir.path()).unwrap();

    let summary = run_batch(&plan, &TemplateSet::default(), &Marker, &connect, &mut writers).unwrap();

    // no-key never connects; flaky answers cot, then errors on self_repair.
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.skipped, 3);

    let records = load_records(&dir.path().join(RESULTS_FILE)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].model.model, "flaky");
    assert!(!records[0].pass_at_k);
    assert_eq!(records[0].successes, 0);
}

#[test]
fn redebug_continues_failed_records() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first");
    let second = dir.path().join("second");

    // A model that never solves anything leaves failed records behind.
    let failing = |_: &ModelConfig| -> Result<Box<dyn ModelClient>, ModelError> {
        Ok(Box::new(Canned {
            text: "def top_k_frequent(nums, k):\n    return None",
            budget: Cell::new(usize::MAX),
        }))
    };
    let mut cfg = config(&["solver"]);
    cfg.strategies = vec![Strategy::Scot];
    let plan = BatchPlan::new(&cfg, catalog(), &only(&["top_k_frequent"])).unwrap();
    let mut writers = RunWriters::open(&first).unwrap();
    run_batch(&plan, &TemplateSet::default(), &Marker, &failing, &mut writers).unwrap();

    let records = load_records(&first.join(RESULTS_FILE)).unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].pass_at_k);

    let mut writers = RunWriters::open(&second).unwrap();
    let summary = redebug(
        &records,
        &cfg,
        &catalog(),
        &TemplateSet::default(),
        &Marker,
        &connect,
        &mut writers,
    )
    .unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.passed, 1);

    let repaired = load_records(&second.join(RESULTS_FILE)).unwrap();
    assert_eq!(repaired[0].strategy, Strategy::SelfRepair);
    assert_eq!(repaired[0].history.len(), 2);
    assert_eq!(repaired[0].history[0], *records[0].history.last().unwrap());
    assert!(repaired[0].history[1].outcome.passed);
}

#[test]
fn pause_is_taken_from_config() {
    let mut cfg = config(&["solver"]);
    cfg.rate_limit_ms = 5;
    let plan = BatchPlan::new(&cfg, catalog(), &Filter::default()).unwrap();
    assert_eq!(plan.pause, Duration::from_millis(5));
    assert_eq!(plan.combinations(), 20);
    assert_eq!(plan.k, 2);
}
