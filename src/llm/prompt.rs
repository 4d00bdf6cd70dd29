use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::codegen::candidate::Attempt;
use crate::error::ConfigError;
use crate::problems::Problem;

/// Template names, one per strategy plus the repair follow-up.
pub const TEMPLATE_KEYS: [&str; 8] = [
    "cot",
    "scot",
    "self_planning",
    "self_debugging",
    "self_edit",
    "self_repair",
    "test_driven",
    "divide_conquer",
];

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{([A-Z_]+)\}").expect("placeholder pattern is valid"))
}

/// Replace `{PROBLEM_SPEC}` and every `{KEY}` in `vars` in one pass over the
/// template. Substituted text is never scanned again; unknown keys stay as-is.
pub fn fill_template(template: &str, problem_spec: &str, vars: &[(&str, &str)]) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            if key == "PROBLEM_SPEC" {
                return problem_spec.to_string();
            }
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[derive(Debug, Clone)]
pub struct TemplateSet {
    templates: HashMap<String, String>,
}

impl Default for TemplateSet {
    fn default() -> Self {
        let templates = TEMPLATE_KEYS
            .iter()
            .map(|k| (k.to_string(), default_template(k).trim().to_string()))
            .collect();
        Self { templates }
    }
}

impl TemplateSet {
    /// Defaults overridden by the sections of a markdown file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_markdown(&text))
    }

    /// Sections start at `## <title>` headings, optionally numbered
    /// (`## 6) Self-Repair (Iterative)`). Unrecognized titles are ignored.
    pub fn from_markdown(text: &str) -> Self {
        let mut set = Self::default();

        for (title, body) in split_sections(text) {
            let Some(key) = key_for_title(&title) else {
                continue;
            };
            let body = body.trim();
            if !body.is_empty() {
                set.templates.insert(key.to_string(), body.to_string());
            }
        }

        set
    }

    pub fn get(&self, key: &str) -> &str {
        self.templates.get(key).map(String::as_str).unwrap_or_default()
    }
}

/* ============================================================
   Prompt construction
   ============================================================ */

/// First-round prompt for a strategy template.
pub fn build_prompt(templates: &TemplateSet, template_key: &str, problem: &Problem) -> String {
    fill_template(
        templates.get(template_key),
        &problem.spec,
        &[("FUNCTION_NAME", problem.function.as_str())],
    )
}

/// Repair prompt carrying the latest candidate and its failures verbatim.
pub fn build_repair_prompt(templates: &TemplateSet, problem: &Problem, last: &Attempt) -> String {
    let errors = last.outcome.failures.join("\n");
    fill_template(
        templates.get("self_repair"),
        &problem.spec,
        &[
            ("FUNCTION_NAME", problem.function.as_str()),
            ("CURRENT_CODE", last.candidate.code.as_str()),
            ("TEST_ERRORS", errors.as_str()),
        ],
    )
}

/* ============================================================
   Markdown sections
   ============================================================ */

fn split_sections(text: &str) -> Vec<(String, String)> {
    let mut sections = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in text.lines() {
        if let Some(title) = line.strip_prefix("## ") {
            if let Some(done) = current.take() {
                sections.push(done);
            }
            current = Some((title.trim().to_string(), String::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }

    sections.extend(current);
    sections
}

fn key_for_title(title: &str) -> Option<&'static str> {
    // "6) Self-Repair (Iterative)" -> "self_repair_iterative"
    let without_number = title
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start_matches(')')
        .trim();

    let slug: String = without_number
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    let key = match slug.as_str() {
        s if s.starts_with("stepwise_chain_of_thought") || s == "scot" => "scot",
        s if s.starts_with("chain_of_thought") || s == "cot" => "cot",
        s if s.starts_with("self_planning") => "self_planning",
        s if s.starts_with("self_debugging") => "self_debugging",
        s if s.starts_with("self_edit") => "self_edit",
        s if s.starts_with("self_repair") => "self_repair",
        s if s.starts_with("test_driven") => "test_driven",
        s if s.starts_with("divide_and_conquer") || s.starts_with("divide_conquer") => {
            "divide_conquer"
        }
        _ => return None,
    };
    Some(key)
}

/* ============================================================
   Default templates
   ============================================================ */

fn default_template(key: &str) -> &'static str {
    match key {
        "cot" => {
            r#"
{PROBLEM_SPEC}

Think through the problem step by step: restate the requirements, list the
edge cases, then write the implementation.

Return the complete Python implementation of `{FUNCTION_NAME}` in a single
```python code block.
"#
        }
        "scot" => {
            r#"
{PROBLEM_SPEC}

First write a numbered plan using only sequence, branch and loop steps.
Then translate the plan, step by step, into Python.

Return the complete implementation of `{FUNCTION_NAME}` in a single
```python code block.
"#
        }
        "self_planning" => {
            r#"
{PROBLEM_SPEC}

Phase 1: write a short plan (at most five bullet points).
Phase 2: implement `{FUNCTION_NAME}` following the plan exactly.

Return the implementation in a single ```python code block.
"#
        }
        "self_debugging" => {
            r#"
{PROBLEM_SPEC}

Implement `{FUNCTION_NAME}`. Then trace your code by hand on two examples
from the statement and one edge case, and fix anything the trace reveals.

Return only the final implementation in a single ```python code block.
"#
        }
        "self_edit" => {
            r#"
{PROBLEM_SPEC}

Write a first implementation of `{FUNCTION_NAME}`. Review it critically
against every rule in the statement, then edit it.

Return only the edited implementation in a single ```python code block.
# Self-review comments, if any, go after the code.
"#
        }
        "self_repair" => {
            r#"
{PROBLEM_SPEC}

The implementation below fails some tests.

```python
{CURRENT_CODE}
```

Test failures:
{TEST_ERRORS}

Fix the implementation. Return the complete corrected `{FUNCTION_NAME}` in
a single ```python code block.
"#
        }
        "test_driven" => {
            r#"
{PROBLEM_SPEC}

Follow test-driven development:
1. List five to seven test cases, including edge cases and error cases.
2. Implement `{FUNCTION_NAME}` so every listed case passes.
3. Walk each case through the implementation.

Put the implementation in a single ```python code block.
"#
        }
        "divide_conquer" => {
            r#"
{PROBLEM_SPEC}

Decompose the problem into subproblems, write a helper for each, then
combine them into `{FUNCTION_NAME}`.

Put all helpers and the main function in a single ```python code block.
"#
        }
        _ => "",
    }
}
