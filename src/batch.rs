//! batch.rs
//!
//! Sequential sweep over models x strategies x problems. One combination
//! produces one result record, one prompt log entry and one summary row. A
//! model failure costs only the combination that hit it.

use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::codegen::{continue_repair, evaluate, RepairContext, Strategy};
use crate::config::EvalConfig;
use crate::error::{ConfigError, ModelError, ReportError};
use crate::executor::Sandbox;
use crate::llm::backend::Provider;
use crate::llm::{HttpModelClient, ModelClient, ModelConfig, TemplateSet};
use crate::problems::{find, Problem};
use crate::report::{ModelRef, PromptLogEntry, ResultRecord, RunWriters};

/// Builds a client per model; injected so tests run without a network.
pub type Connect<'a> = dyn Fn(&ModelConfig) -> Result<Box<dyn ModelClient>, ModelError> + 'a;

pub fn http_connect(cfg: &ModelConfig) -> Result<Box<dyn ModelClient>, ModelError> {
    Ok(Box::new(HttpModelClient::new(cfg.clone())?))
}

/// Narrows a run. Empty lists mean "everything configured".
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub problems: Vec<String>,
    pub strategies: Vec<Strategy>,
    /// Matches a model's name or its `provider:model` label.
    pub models: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub models: Vec<ModelConfig>,
    pub strategies: Vec<Strategy>,
    pub problems: Vec<Problem>,
    pub k: usize,
    pub max_repairs: usize,
    pub pause: Duration,
}

impl BatchPlan {
    pub fn new(cfg: &EvalConfig, problems: Vec<Problem>, filter: &Filter) -> Result<Self, ConfigError> {
        for name in &filter.problems {
            if find(&problems, name).is_none() {
                return Err(ConfigError::UnknownProblem(name.clone()));
            }
        }

        let problems = problems
            .into_iter()
            .filter(|p| filter.problems.is_empty() || filter.problems.contains(&p.name))
            .collect();

        let strategies = if filter.strategies.is_empty() {
            cfg.strategies.clone()
        } else {
            filter.strategies.clone()
        };

        let models: Vec<ModelConfig> = cfg
            .models
            .iter()
            .filter(|m| {
                filter.models.is_empty()
                    || filter
                        .models
                        .iter()
                        .any(|f| *f == m.model || *f == m.label())
            })
            .cloned()
            .collect();

        if models.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "no configured model matches {:?}",
                filter.models
            )));
        }

        Ok(Self {
            models,
            strategies,
            problems,
            k: cfg.k,
            max_repairs: cfg.max_repairs,
            pause: cfg.pause(),
        })
    }

    pub fn combinations(&self) -> usize {
        self.models.len() * self.strategies.len() * self.problems.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub run_id: String,
    pub completed: usize,
    pub passed: usize,
    pub skipped: usize,
}

/* ============================================================
   Batch run
   ============================================================ */

/// Run every combination in `plan`. Only failures writing the artifacts
/// abort the run.
pub fn run_batch(
    plan: &BatchPlan,
    templates: &TemplateSet,
    sandbox: &dyn Sandbox,
    connect: &Connect<'_>,
    writers: &mut RunWriters,
) -> Result<BatchSummary, ReportError> {
    let mut summary = BatchSummary {
        run_id: Uuid::new_v4().to_string(),
        ..BatchSummary::default()
    };

    info!(
        run_id = %summary.run_id,
        combinations = plan.combinations(),
        out_dir = %writers.dir().display(),
        "batch started"
    );

    let mut first_call = true;

    for model_cfg in &plan.models {
        let client = match connect(model_cfg) {
            Ok(c) => c,
            Err(e) => {
                warn!(model = %model_cfg.label(), error = %e, "skipping model");
                summary.skipped += plan.strategies.len() * plan.problems.len();
                continue;
            }
        };

        let ctx = RepairContext {
            client: client.as_ref(),
            sandbox,
            templates,
            pause: plan.pause,
        };

        for &strategy in &plan.strategies {
            for problem in &plan.problems {
                if !first_call && !plan.pause.is_zero() {
                    thread::sleep(plan.pause);
                }
                first_call = false;

                let checks = problem.checks();
                let eval = match evaluate(strategy, &ctx, problem, &checks, plan.k, plan.max_repairs) {
                    Ok(e) => e,
                    Err(e) => {
                        warn!(
                            model = %model_cfg.label(),
                            strategy = %strategy,
                            problem = %problem.name,
                            error = %e,
                            "combination skipped"
                        );
                        summary.skipped += 1;
                        continue;
                    }
                };

                let ts = Utc::now();
                let k = if strategy.is_sampling() { plan.k } else { 1 };

                writers.prompt(&PromptLogEntry {
                    ts,
                    run_id: summary.run_id.clone(),
                    model: model_cfg.label(),
                    strategy,
                    problem: problem.name.clone(),
                    prompt: eval.prompt.clone(),
                })?;

                let record = ResultRecord {
                    ts,
                    run_id: summary.run_id.clone(),
                    problem: problem.name.clone(),
                    model: model_ref(model_cfg),
                    strategy,
                    k,
                    successes: eval.successes,
                    pass_at_k: eval.pass_at_k(),
                    history: eval.history,
                };
                writers.record(&record)?;

                info!(
                    model = %model_cfg.label(),
                    strategy = %strategy,
                    problem = %problem.name,
                    successes = record.successes,
                    k,
                    "combination done"
                );

                summary.completed += 1;
                if record.pass_at_k {
                    summary.passed += 1;
                }
            }
        }
    }

    info!(
        run_id = %summary.run_id,
        completed = summary.completed,
        passed = summary.passed,
        skipped = summary.skipped,
        "batch finished"
    );

    Ok(summary)
}

/* ============================================================
   Re-debugging failed records
   ============================================================ */

/// Seed the repair loop with the last attempt of every failed record and
/// write the continued histories as new self-repair records.
pub fn redebug(
    records: &[ResultRecord],
    cfg: &EvalConfig,
    problems: &[Problem],
    templates: &TemplateSet,
    sandbox: &dyn Sandbox,
    connect: &Connect<'_>,
    writers: &mut RunWriters,
) -> Result<BatchSummary, ReportError> {
    let mut summary = BatchSummary {
        run_id: Uuid::new_v4().to_string(),
        ..BatchSummary::default()
    };

    let failed: Vec<&ResultRecord> = records.iter().filter(|r| !r.pass_at_k).collect();
    info!(run_id = %summary.run_id, failed = failed.len(), "redebug started");

    for (i, record) in failed.iter().enumerate() {
        let Some(problem) = find(problems, &record.problem) else {
            warn!(problem = %record.problem, "unknown problem in results, skipped");
            summary.skipped += 1;
            continue;
        };
        let Some(seed) = record.history.last().cloned() else {
            summary.skipped += 1;
            continue;
        };

        let model_cfg = model_config_for(cfg, &record.model);
        let client = match connect(&model_cfg) {
            Ok(c) => c,
            Err(e) => {
                warn!(model = %record.model.label(), error = %e, "skipping record");
                summary.skipped += 1;
                continue;
            }
        };

        if i > 0 && !cfg.pause().is_zero() {
            thread::sleep(cfg.pause());
        }

        let ctx = RepairContext {
            client: client.as_ref(),
            sandbox,
            templates,
            pause: cfg.pause(),
        };

        let checks = problem.checks();
        let history = match continue_repair(&ctx, problem, &checks, seed, cfg.max_repairs) {
            Ok(h) => h,
            Err(e) => {
                warn!(problem = %problem.name, error = %e, "redebug skipped");
                summary.skipped += 1;
                continue;
            }
        };

        let passed = history.last().is_some_and(|a| a.outcome.passed);
        writers.record(&ResultRecord {
            ts: Utc::now(),
            run_id: summary.run_id.clone(),
            problem: problem.name.clone(),
            model: record.model.clone(),
            strategy: Strategy::SelfRepair,
            k: 1,
            successes: usize::from(passed),
            pass_at_k: passed,
            history,
        })?;

        info!(problem = %problem.name, model = %record.model.label(), passed, "redebugged");
        summary.completed += 1;
        if passed {
            summary.passed += 1;
        }
    }

    Ok(summary)
}

fn model_ref(cfg: &ModelConfig) -> ModelRef {
    ModelRef {
        provider: cfg
            .provider
            .parse::<Provider>()
            .map(|p| p.to_string())
            .unwrap_or_else(|_| cfg.provider.clone()),
        model: cfg.model.clone(),
    }
}

/// The configured entry for a recorded model, or defaults for it.
fn model_config_for(cfg: &EvalConfig, model: &ModelRef) -> ModelConfig {
    cfg.models
        .iter()
        .find(|m| model_ref(m) == *model)
        .cloned()
        .unwrap_or_else(|| ModelConfig {
            provider: model.provider.clone(),
            model: model.model.clone(),
            ..ModelConfig::default()
        })
}
