pub mod backend;
pub mod client;
pub mod ollama;
pub mod prompt;

pub use client::{HttpModelClient, ModelClient, ModelConfig};
pub use prompt::{fill_template, TemplateSet};
