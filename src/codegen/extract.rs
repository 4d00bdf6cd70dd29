// src/codegen/extract.rs
//
// Pull source code out of free-form model text.

use std::sync::OnceLock;

use regex::Regex;

fn fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        // Lazy body so the first closing fence ends the block.
        Regex::new(r"(?is)```(?:python|py)?\s*(.+?)```").expect("fence pattern is valid")
    })
}

/// First fenced block, trimmed; the whole text trimmed if there is none.
pub fn extract_code(text: &str) -> String {
    match fence().captures(text).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Drops a `# Self-review` comment block some templates ask the model to
/// append after the code. Code lines after the block are kept.
pub fn strip_review_notes(code: &str) -> String {
    let mut kept = Vec::new();
    let mut skipping = false;

    for line in code.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('#') && trimmed.contains("Self-review") {
            skipping = true;
            continue;
        }

        if skipping && (trimmed.is_empty() || trimmed.starts_with('#')) {
            continue;
        }

        skipping = false;
        kept.push(line);
    }

    kept.join("\n").trim().to_string()
}
