//! problems/mod.rs
//!
//! The problem catalog: statement text, expected function name and the fixed
//! checks each generated candidate is judged by.

pub mod checks;
pub mod reference;

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::error::ConfigError;

pub use checks::{checks_for, Check, Expectation};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Problem {
    pub name: String,
    /// Natural-language statement, substituted for `{PROBLEM_SPEC}`.
    pub spec: String,
    /// Name the candidate must define.
    pub function: String,
}

impl Problem {
    fn builtin(name: &str, spec: &str) -> Self {
        Self {
            name: name.to_string(),
            spec: spec.trim().to_string(),
            function: name.to_string(),
        }
    }

    pub fn checks(&self) -> Vec<Check> {
        checks_for(&self.name).unwrap_or_default()
    }
}

/* ============================================================
   Catalog
   ============================================================ */

pub const PROBLEM_NAMES: [&str; 10] = [
    "cosine_similarity",
    "evaluate_rpn",
    "int_to_roman",
    "is_palindrome_sentence",
    "merge_intervals",
    "min_window_substring",
    "normalize_path",
    "parse_csv_line",
    "sudoku_is_valid",
    "top_k_frequent",
];

pub fn catalog() -> Vec<Problem> {
    PROBLEM_NAMES
        .iter()
        .map(|name| Problem::builtin(name, builtin_spec(name)))
        .collect()
}

pub fn find<'a>(problems: &'a [Problem], name: &str) -> Option<&'a Problem> {
    problems.iter().find(|p| p.name == name)
}

/// Built-in catalog with statements replaced by `<dir>/<name>.md` where such
/// a file exists. Files for names outside the catalog are ignored: without
/// checks there is nothing to judge them by.
pub fn load_problems(dir: Option<&Path>) -> Result<Vec<Problem>, ConfigError> {
    let mut problems = catalog();

    let Some(dir) = dir else {
        return Ok(problems);
    };

    let pattern = dir.join("*.md");
    let pattern = pattern.to_string_lossy();
    let entries = glob::glob(&pattern)
        .map_err(|e| ConfigError::Invalid(format!("bad problems_dir pattern: {e}")))?;

    for path in entries.filter_map(Result::ok) {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let Some(problem) = problems.iter_mut().find(|p| p.name == stem) else {
            debug!(file = %path.display(), "no checks for problem statement, skipping");
            continue;
        };

        problem.spec = fs::read_to_string(&path)
            .map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?
            .trim()
            .to_string();
    }

    Ok(problems)
}

fn builtin_spec(name: &str) -> &'static str {
    match name {
        "cosine_similarity" => {
            r#"
# cosine_similarity

Implement `cosine_similarity(a: List[float], b: List[float]) -> float`.

Return the cosine of the angle between vectors `a` and `b`.
- If the vectors differ in length, raise `ValueError`.
- If either vector has zero magnitude, return `0.0`.
"#
        }
        "evaluate_rpn" => {
            r#"
# evaluate_rpn

Implement `evaluate_rpn(tokens: List[str]) -> int`.

Evaluate an expression in Reverse Polish Notation. Tokens are integers
(possibly negative) or one of `+ - * /`.
- Division truncates toward zero.
- Raise `ValueError` on division by zero, on an operator without two
  operands, on an invalid token, or when more than one value remains.
"#
        }
        "int_to_roman" => {
            r#"
# int_to_roman

Implement `int_to_roman(n: int) -> str`.

Convert `n` to a Roman numeral using subtractive notation (IV, IX, XL, XC,
CD, CM). Valid input is 1..=3999; raise `ValueError` otherwise.
"#
        }
        "is_palindrome_sentence" => {
            r#"
# is_palindrome_sentence

Implement `is_palindrome_sentence(s: str) -> bool`.

Return True if `s` reads the same forwards and backwards after removing every
non-alphanumeric character and ignoring case. The empty string and strings
with no alphanumerics are palindromes.
"#
        }
        "merge_intervals" => {
            r#"
# merge_intervals

Implement `merge_intervals(intervals: List[Tuple[int, int]]) -> List[Tuple[int, int]]`.

Merge all overlapping intervals and return them sorted by start. Intervals
that touch (end == next start) are merged. Input may be unsorted or empty.
"#
        }
        "min_window_substring" => {
            r#"
# min_window_substring

Implement `min_window_substring(s: str, t: str) -> str`.

Return the shortest substring of `s` containing every character of `t`,
counting multiplicity. Matching is case-sensitive. Return `""` if no such
window exists or either input is empty. On ties return the leftmost window.
"#
        }
        "normalize_path" => {
            r#"
# normalize_path

Implement `normalize_path(path: str) -> str`.

Normalize a Unix-style path:
- collapse repeated slashes and drop `.` segments;
- `..` removes the previous segment; at the root of an absolute path it is
  dropped; in a relative path with nothing to remove it is kept;
- absolute paths stay absolute (`/` is the root);
- if the input names a directory (ends with `/`, `.` or `..`) a non-empty,
  non-root result keeps a trailing slash;
- the empty string normalizes to the empty string.
"#
        }
        "parse_csv_line" => {
            r#"
# parse_csv_line

Implement `parse_csv_line(line: str) -> List[str]`.

Split one CSV line into fields. Fields are separated by commas; a field may
be wrapped in double quotes, inside which commas are literal and `""` is an
escaped quote. Whitespace is preserved. An empty line is one empty field.
"#
        }
        "sudoku_is_valid" => {
            r#"
# sudoku_is_valid

Implement `sudoku_is_valid(board: List[List[str]]) -> bool`.

`board` is 9x9 with digits `"1"`..`"9"` or `"."` for empty. Return True if
no row, column or 3x3 box contains a repeated digit. The board need not be
solvable.
"#
        }
        "top_k_frequent" => {
            r#"
# top_k_frequent

Implement `top_k_frequent(nums: List[int], k: int) -> List[int]`.

Return the `k` most frequent values, most frequent first; equal frequencies
are ordered by the smaller value first. Raise `ValueError` if `k < 1` or `k`
exceeds the number of distinct values.
"#
        }
        _ => "",
    }
}
