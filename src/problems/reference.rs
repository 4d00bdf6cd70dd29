//! problems/reference.rs
//!
//! Known-correct native implementations. They validate the check fixtures
//! (`codegen-eval baseline`) and stand in for a sandbox in tests. Errors are
//! raised with the Python class names the checks expect.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::executor::{raised, CallError, Callable, NativeFn};

type Outcome = Result<Value, CallError>;

pub fn reference(problem: &str) -> Option<Box<dyn Callable>> {
    let f: fn(&[Value]) -> Outcome = match problem {
        "cosine_similarity" => cosine_similarity,
        "evaluate_rpn" => evaluate_rpn,
        "int_to_roman" => int_to_roman,
        "is_palindrome_sentence" => is_palindrome_sentence,
        "merge_intervals" => merge_intervals,
        "min_window_substring" => min_window_substring,
        "normalize_path" => normalize_path,
        "parse_csv_line" => parse_csv_line,
        "sudoku_is_valid" => sudoku_is_valid,
        "top_k_frequent" => top_k_frequent,
        _ => return None,
    };
    Some(Box::new(NativeFn::new(f)))
}

fn arg<T: DeserializeOwned>(args: &[Value], i: usize) -> Result<T, CallError> {
    let v = args
        .get(i)
        .ok_or_else(|| raised("TypeError", format!("missing positional argument {i}")))?;
    serde_json::from_value(v.clone()).map_err(|e| raised("TypeError", e.to_string()))
}

/* ============================================================
   Implementations
   ============================================================ */

fn cosine_similarity(args: &[Value]) -> Outcome {
    let a: Vec<f64> = arg(args, 0)?;
    let b: Vec<f64> = arg(args, 1)?;

    if a.len() != b.len() {
        return Err(raised("ValueError", "Vectors must have equal length"));
    }

    let dot: f64 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if na == 0.0 || nb == 0.0 {
        return Ok(json!(0.0));
    }
    Ok(json!(dot / (na * nb)))
}

fn evaluate_rpn(args: &[Value]) -> Outcome {
    let tokens: Vec<String> = arg(args, 0)?;
    let mut stack: Vec<i64> = Vec::new();

    for token in &tokens {
        let op = match token.as_str() {
            "+" | "-" | "*" | "/" => token.as_str(),
            t => {
                let n = t
                    .parse::<i64>()
                    .map_err(|_| raised("ValueError", format!("Invalid token: {t}")))?;
                stack.push(n);
                continue;
            }
        };

        let (Some(b), Some(a)) = (stack.pop(), stack.pop()) else {
            return Err(raised("ValueError", format!("Too few operands for operator: {op}")));
        };

        let value = match op {
            "+" => a.checked_add(b),
            "-" => a.checked_sub(b),
            "*" => a.checked_mul(b),
            _ => {
                if b == 0 {
                    return Err(raised("ValueError", "Division by zero"));
                }
                // i64 division already truncates toward zero
                a.checked_div(b)
            }
        }
        .ok_or_else(|| raised("OverflowError", "integer overflow"))?;

        stack.push(value);
    }

    match stack.as_slice() {
        [result] => Ok(json!(result)),
        [] => Err(raised("ValueError", "Empty expression")),
        _ => Err(raised("ValueError", "Invalid RPN expression: too many operands remaining")),
    }
}

fn int_to_roman(args: &[Value]) -> Outcome {
    const TABLE: [(i64, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];

    let mut n: i64 = arg(args, 0)?;
    if !(1..=3999).contains(&n) {
        return Err(raised("ValueError", "Input must be between 1 and 3999"));
    }

    let mut out = String::new();
    for (value, numeral) in TABLE {
        while n >= value {
            out.push_str(numeral);
            n -= value;
        }
    }
    Ok(json!(out))
}

fn is_palindrome_sentence(args: &[Value]) -> Outcome {
    let s: String = arg(args, 0)?;
    let filtered: Vec<char> = s
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();

    Ok(json!(filtered.iter().eq(filtered.iter().rev())))
}

fn merge_intervals(args: &[Value]) -> Outcome {
    let mut intervals: Vec<(i64, i64)> = arg(args, 0)?;
    intervals.sort_unstable();

    let mut merged: Vec<(i64, i64)> = Vec::with_capacity(intervals.len());
    for (start, end) in intervals {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    Ok(json!(merged))
}

fn min_window_substring(args: &[Value]) -> Outcome {
    let s: String = arg(args, 0)?;
    let t: String = arg(args, 1)?;

    let s: Vec<char> = s.chars().collect();
    if s.is_empty() || t.is_empty() {
        return Ok(json!(""));
    }

    let mut need: HashMap<char, usize> = HashMap::new();
    for c in t.chars() {
        *need.entry(c).or_default() += 1;
    }
    let required = need.len();

    let mut window: HashMap<char, usize> = HashMap::new();
    let mut formed = 0;
    let mut left = 0;
    let mut best: Option<(usize, usize)> = None;

    for (right, &c) in s.iter().enumerate() {
        if let Some(&want) = need.get(&c) {
            let have = window.entry(c).or_default();
            *have += 1;
            if *have == want {
                formed += 1;
            }
        }

        while formed == required {
            if best.map_or(true, |(l, r)| right - left < r - l) {
                best = Some((left, right));
            }

            let lc = s[left];
            if let Some(&want) = need.get(&lc) {
                let have = window.entry(lc).or_default();
                *have -= 1;
                if *have < want {
                    formed -= 1;
                }
            }
            left += 1;
        }
    }

    let out: String = best
        .map(|(l, r)| s[l..=r].iter().collect())
        .unwrap_or_default();
    Ok(json!(out))
}

fn normalize_path(args: &[Value]) -> Outcome {
    let path: String = arg(args, 0)?;
    let absolute = path.starts_with('/');

    let mut stack: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if stack.last().is_some_and(|s| *s != "..") {
                    stack.pop();
                } else if !absolute {
                    stack.push("..");
                }
            }
            s => stack.push(s),
        }
    }

    let body = stack.join("/");
    let mut out = if absolute { format!("/{body}") } else { body };

    // A path naming a directory keeps its trailing slash.
    let last = path.rsplit('/').next().unwrap_or("");
    if matches!(last, "" | "." | "..") && !out.is_empty() && !out.ends_with('/') {
        out.push('/');
    }

    Ok(json!(out))
}

fn parse_csv_line(args: &[Value]) -> Outcome {
    let line: String = arg(args, 0)?;
    let chars: Vec<char> = line.chars().collect();

    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '"' if in_quotes && chars.get(i + 1) == Some(&'"') => {
                field.push('"');
                i += 2;
                continue;
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            c => field.push(c),
        }
        i += 1;
    }
    fields.push(field);

    Ok(json!(fields))
}

fn sudoku_is_valid(args: &[Value]) -> Outcome {
    let board: Vec<Vec<String>> = arg(args, 0)?;
    if board.len() != 9 || board.iter().any(|row| row.len() != 9) {
        return Err(raised("ValueError", "board must be 9x9"));
    }

    let mut rows = [[false; 9]; 9];
    let mut cols = [[false; 9]; 9];
    let mut boxes = [[false; 9]; 9];

    for (r, row) in board.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            if cell == "." {
                continue;
            }
            let d = match cell.parse::<usize>() {
                Ok(d @ 1..=9) => d - 1,
                _ => return Err(raised("ValueError", format!("invalid cell {cell:?}"))),
            };
            let b = (r / 3) * 3 + c / 3;

            if rows[r][d] || cols[c][d] || boxes[b][d] {
                return Ok(json!(false));
            }
            rows[r][d] = true;
            cols[c][d] = true;
            boxes[b][d] = true;
        }
    }

    Ok(json!(true))
}

fn top_k_frequent(args: &[Value]) -> Outcome {
    let nums: Vec<i64> = arg(args, 0)?;
    let k: i64 = arg(args, 1)?;

    if k < 1 {
        return Err(raised("ValueError", "k must be at least 1"));
    }

    let mut freq: HashMap<i64, usize> = HashMap::new();
    for n in &nums {
        *freq.entry(*n).or_default() += 1;
    }

    if k as usize > freq.len() {
        return Err(raised(
            "ValueError",
            "k cannot exceed the number of unique elements in nums",
        ));
    }

    let mut ranked: Vec<(i64, usize)> = freq.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let top: Vec<i64> = ranked.into_iter().take(k as usize).map(|(n, _)| n).collect();
    Ok(json!(top))
}
