//! codegen
//!
//! Candidates, from raw model text to a judged attempt: extraction, static
//! inspection, the check runner, the repair loop and the strategies built
//! on top of it.

pub mod candidate;
pub mod extract;
pub mod inspect;
pub mod repair;
pub mod runner;
pub mod strategy;

pub use candidate::{Attempt, AttemptHistory, Candidate, TestOutcome};
pub use repair::{continue_repair, run_repair_loop, RepairContext};
pub use strategy::{evaluate, Evaluation, Strategy};
