//! codegen-eval
//!
//! Prompt language models for solutions to small algorithmic problems, run
//! every candidate in an isolated Python process against fixed checks, and
//! feed failures back for repair.

pub mod batch;
pub mod codegen;
pub mod commands;
pub mod config;
pub mod error;
pub mod executor;
pub mod llm;
pub mod logger;
pub mod problems;
pub mod report;
pub mod testgen;
