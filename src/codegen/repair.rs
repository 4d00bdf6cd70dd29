//! codegen/repair.rs
//!
//! The generate, extract, test, repair loop. One model response per round;
//! the latest candidate and its failures feed the next prompt. Model errors
//! end the loop, anything wrong with the candidate's code is just another
//! failed attempt.

use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::codegen::candidate::{Attempt, AttemptHistory, Candidate};
use crate::codegen::runner::run_candidate;
use crate::error::ModelError;
use crate::executor::Sandbox;
use crate::llm::prompt::{build_prompt, build_repair_prompt, TemplateSet};
use crate::llm::ModelClient;
use crate::problems::{Check, Problem};

/// Template used for the first round.
pub const INITIAL_TEMPLATE: &str = "cot";

/// Collaborators shared by every round.
pub struct RepairContext<'a> {
    pub client: &'a dyn ModelClient,
    pub sandbox: &'a dyn Sandbox,
    pub templates: &'a TemplateSet,
    /// Sleep before every model call after the first.
    pub pause: Duration,
}

/// Initial attempt followed by up to `max_repairs` repair rounds.
///
/// Stops at the first passing attempt, so the history holds between 1 and
/// `max_repairs + 1` entries.
pub fn run_repair_loop(
    ctx: &RepairContext<'_>,
    problem: &Problem,
    checks: &[Check],
    max_repairs: usize,
) -> Result<AttemptHistory, ModelError> {
    let prompt = build_prompt(ctx.templates, INITIAL_TEMPLATE, problem);
    let response = generate_one(ctx.client, &prompt)?;

    let candidate = Candidate::from_response(&response);
    let outcome = run_candidate(ctx.sandbox, &candidate, &problem.function, checks);
    debug!(problem = %problem.name, round = 0, passed = outcome.passed, "initial attempt");

    let seed = Attempt {
        candidate,
        outcome,
        similarity_to_previous: None,
    };

    repair_rounds(ctx, problem, checks, vec![seed], max_repairs, true)
}

/// Repair rounds starting from an attempt that already exists (for example
/// one read back from a results file). The seed is the first history entry.
pub fn continue_repair(
    ctx: &RepairContext<'_>,
    problem: &Problem,
    checks: &[Check],
    seed: Attempt,
    max_repairs: usize,
) -> Result<AttemptHistory, ModelError> {
    repair_rounds(ctx, problem, checks, vec![seed], max_repairs, false)
}

fn repair_rounds(
    ctx: &RepairContext<'_>,
    problem: &Problem,
    checks: &[Check],
    mut history: AttemptHistory,
    max_repairs: usize,
    mut called_model: bool,
) -> Result<AttemptHistory, ModelError> {
    for round in 1..=max_repairs {
        let Some(last) = history.last() else {
            break;
        };
        if last.outcome.passed {
            break;
        }

        let prompt = build_repair_prompt(ctx.templates, problem, last);
        let previous = last.candidate.clone();

        if called_model && !ctx.pause.is_zero() {
            thread::sleep(ctx.pause);
        }
        let response = generate_one(ctx.client, &prompt)?;
        called_model = true;

        let candidate = Candidate::from_response(&response);
        let outcome = run_candidate(ctx.sandbox, &candidate, &problem.function, checks);
        let similarity = candidate.similarity(&previous);

        debug!(
            problem = %problem.name,
            round,
            passed = outcome.passed,
            failures = outcome.failures.len(),
            similarity,
            "repair attempt"
        );

        history.push(Attempt {
            candidate,
            outcome,
            similarity_to_previous: Some(similarity),
        });
    }

    if let Some(last) = history.last() {
        info!(
            problem = %problem.name,
            attempts = history.len(),
            passed = last.outcome.passed,
            "repair loop finished"
        );
    }

    Ok(history)
}

fn generate_one(client: &dyn ModelClient, prompt: &str) -> Result<String, ModelError> {
    client
        .generate(prompt, 1)?
        .into_iter()
        .next()
        .ok_or(ModelError::ShortResponse {
            got: 0,
            expected: 1,
        })
}
