use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codegen::candidate::{Attempt, AttemptHistory, Candidate};
use crate::codegen::repair::{run_repair_loop, RepairContext, INITIAL_TEMPLATE};
use crate::codegen::runner::run_candidate;
use crate::error::{ConfigError, ModelError};
use crate::llm::prompt::build_prompt;
use crate::problems::{Check, Problem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Cot,
    Scot,
    SelfPlanning,
    SelfDebugging,
    SelfEdit,
    SelfRepair,
    TestDriven,
    DivideConquer,
}

impl Strategy {
    pub const ALL: [Strategy; 8] = [
        Strategy::Cot,
        Strategy::Scot,
        Strategy::SelfPlanning,
        Strategy::SelfDebugging,
        Strategy::SelfEdit,
        Strategy::SelfRepair,
        Strategy::TestDriven,
        Strategy::DivideConquer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Cot => "cot",
            Strategy::Scot => "scot",
            Strategy::SelfPlanning => "self_planning",
            Strategy::SelfDebugging => "self_debugging",
            Strategy::SelfEdit => "self_edit",
            Strategy::SelfRepair => "self_repair",
            Strategy::TestDriven => "test_driven",
            Strategy::DivideConquer => "divide_conquer",
        }
    }

    /// Template for the first prompt. Self-repair opens with chain-of-thought
    /// and only uses its own template for the follow-up rounds.
    pub fn template_key(&self) -> &'static str {
        match self {
            Strategy::SelfRepair => INITIAL_TEMPLATE,
            other => other.as_str(),
        }
    }

    /// `k` independent samples from one prompt.
    pub fn is_sampling(&self) -> bool {
        !matches!(self, Strategy::SelfRepair)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        Strategy::ALL
            .into_iter()
            .find(|st| st.as_str() == norm)
            .ok_or_else(|| ConfigError::UnknownStrategy(s.to_string()))
    }
}

/// What one problem/strategy/model combination produced.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// First prompt sent to the model.
    pub prompt: String,
    pub successes: usize,
    pub history: AttemptHistory,
}

impl Evaluation {
    pub fn pass_at_k(&self) -> bool {
        self.successes > 0
    }
}

/// Run one strategy on one problem.
///
/// Sampling strategies ask for `k` responses to a single prompt and count
/// the passing ones. Self-repair runs the repair loop and counts 1 if its
/// final attempt passed.
pub fn evaluate(
    strategy: Strategy,
    ctx: &RepairContext<'_>,
    problem: &Problem,
    checks: &[Check],
    k: usize,
    max_repairs: usize,
) -> Result<Evaluation, ModelError> {
    let prompt = build_prompt(ctx.templates, strategy.template_key(), problem);

    if !strategy.is_sampling() {
        let history = run_repair_loop(ctx, problem, checks, max_repairs)?;
        let successes = usize::from(history.last().is_some_and(|a| a.outcome.passed));
        return Ok(Evaluation {
            prompt,
            successes,
            history,
        });
    }

    let responses = ctx.client.generate(&prompt, k)?;
    let mut history = Vec::with_capacity(responses.len());

    for (i, response) in responses.iter().enumerate() {
        let candidate = Candidate::from_response(response);
        let outcome = run_candidate(ctx.sandbox, &candidate, &problem.function, checks);
        debug!(
            problem = %problem.name,
            strategy = %strategy,
            sample = i,
            candidate = %candidate.id,
            passed = outcome.passed,
            "sample tested"
        );
        history.push(Attempt {
            candidate,
            outcome,
            similarity_to_previous: None,
        });
    }

    let successes = history.iter().filter(|a| a.outcome.passed).count();
    Ok(Evaluation {
        prompt,
        successes,
        history,
    })
}
