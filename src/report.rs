//! report.rs
//!
//! Run artifacts: the results stream (one JSON record per line), the prompt
//! log, and the CSV summary. Every file is append-only and opened once per
//! run.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codegen::{AttemptHistory, Strategy};
use crate::error::ReportError;

pub const RESULTS_FILE: &str = "results.jsonl";
pub const PROMPTS_FILE: &str = "prompts_used.jsonl";
pub const SUMMARY_FILE: &str = "summary.csv";
pub const COVERAGE_FILE: &str = "coverage.jsonl";

pub const SUMMARY_HEADER: &str = "problem,model,strategy,k,successes,pass@k (0/1)";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
}

impl ModelRef {
    pub fn label(&self) -> String {
        format!("{}:{}", self.provider, self.model)
    }
}

/// One problem/strategy/model combination. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultRecord {
    pub ts: DateTime<Utc>,
    pub run_id: String,
    pub problem: String,
    pub model: ModelRef,
    pub strategy: Strategy,
    pub k: usize,
    pub successes: usize,
    pub pass_at_k: bool,
    pub history: AttemptHistory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptLogEntry {
    pub ts: DateTime<Utc>,
    pub run_id: String,
    pub model: String,
    pub strategy: Strategy,
    pub problem: String,
    pub prompt: String,
}

/* ============================================================
   Writers
   ============================================================ */

/// Output sinks for one run.
pub struct RunWriters {
    dir: PathBuf,
    results: BufWriter<File>,
    prompts: BufWriter<File>,
    summary: BufWriter<File>,
}

impl RunWriters {
    /// Create `dir` if needed and open the three artifacts for append. The
    /// CSV header is written only when the summary file is new.
    pub fn open(dir: &Path) -> Result<Self, ReportError> {
        fs::create_dir_all(dir).map_err(|source| ReportError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let summary_path = dir.join(SUMMARY_FILE);
        let summary_is_new = fs::metadata(&summary_path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let mut writers = Self {
            dir: dir.to_path_buf(),
            results: append(&dir.join(RESULTS_FILE))?,
            prompts: append(&dir.join(PROMPTS_FILE))?,
            summary: append(&summary_path)?,
        };

        if summary_is_new {
            let line = format!("{SUMMARY_HEADER}\n");
            writers.write_summary_line(&line)?;
        }

        Ok(writers)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record(&mut self, record: &ResultRecord) -> Result<(), ReportError> {
        let line = serde_json::to_string(record)?;
        let path = self.dir.join(RESULTS_FILE);
        write_line(&mut self.results, &path, &line)?;

        let row = summary_row(record);
        self.write_summary_line(&row)
    }

    pub fn prompt(&mut self, entry: &PromptLogEntry) -> Result<(), ReportError> {
        let line = serde_json::to_string(entry)?;
        let path = self.dir.join(PROMPTS_FILE);
        write_line(&mut self.prompts, &path, &line)
    }

    fn write_summary_line(&mut self, line: &str) -> Result<(), ReportError> {
        let path = self.dir.join(SUMMARY_FILE);
        self.summary
            .write_all(line.as_bytes())
            .and_then(|_| self.summary.flush())
            .map_err(|source| ReportError::Io { path, source })
    }
}

fn append(path: &Path) -> Result<BufWriter<File>, ReportError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(BufWriter::new)
        .map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Append `items` to a JSON-lines file, creating it and its directory.
pub fn append_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ReportError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut w = append(path)?;
    for item in items {
        let line = serde_json::to_string(item)?;
        write_line(&mut w, path, &line)?;
    }
    Ok(())
}

// Flushed per line so an interrupted run keeps every finished record.
fn write_line(w: &mut BufWriter<File>, path: &Path, line: &str) -> Result<(), ReportError> {
    writeln!(w, "{line}")
        .and_then(|_| w.flush())
        .map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/* ============================================================
   CSV
   ============================================================ */

pub fn summary_row(record: &ResultRecord) -> String {
    let fields = [
        record.problem.clone(),
        record.model.label(),
        record.strategy.to_string(),
        record.k.to_string(),
        record.successes.to_string(),
        u8::from(record.pass_at_k).to_string(),
    ];

    let mut row = fields.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(",");
    row.push('\n');
    row
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/* ============================================================
   Per-model report
   ============================================================ */

/// Pass@k tally for one model across the records of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStats {
    pub model: String,
    pub total: usize,
    pub passed: usize,
    /// `problem/strategy` combinations, in record order.
    pub passed_combos: Vec<String>,
    pub failed_combos: Vec<String>,
}

impl ModelStats {
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64
        }
    }
}

fn combo(record: &ResultRecord) -> String {
    format!("{}/{}", record.problem, record.strategy)
}

/// One entry per model, in order of first appearance.
pub fn model_stats(records: &[ResultRecord]) -> Vec<ModelStats> {
    let mut stats: Vec<ModelStats> = Vec::new();

    for record in records {
        let label = record.model.label();
        let idx = match stats.iter().position(|s| s.model == label) {
            Some(i) => i,
            None => {
                stats.push(ModelStats {
                    model: label,
                    total: 0,
                    passed: 0,
                    passed_combos: Vec::new(),
                    failed_combos: Vec::new(),
                });
                stats.len() - 1
            }
        };

        let entry = &mut stats[idx];
        entry.total += 1;
        if record.pass_at_k {
            entry.passed += 1;
            entry.passed_combos.push(combo(record));
        } else {
            entry.failed_combos.push(combo(record));
        }
    }

    stats
}

/// `problem/strategy` combinations that at least two models ran and did not
/// all agree on, sorted. The last record per model and combination wins.
pub fn model_differences(records: &[ResultRecord]) -> Vec<String> {
    let mut outcomes: BTreeMap<String, BTreeMap<String, bool>> = BTreeMap::new();
    for record in records {
        outcomes
            .entry(combo(record))
            .or_default()
            .insert(record.model.label(), record.pass_at_k);
    }

    outcomes
        .into_iter()
        .filter(|(_, by_model)| {
            by_model.len() > 1 && {
                let mut flags = by_model.values();
                let first = flags.next().copied();
                flags.any(|f| Some(*f) != first)
            }
        })
        .map(|(combo, _)| combo)
        .collect()
}

/* ============================================================
   Reading back
   ============================================================ */

/// Every record in a results stream. Blank lines are skipped; anything else
/// that does not parse is an error naming its line.
pub fn load_records(path: &Path) -> Result<Vec<ResultRecord>, ReportError> {
    let io_err = |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(io_err)?;
    let mut records = Vec::new();

    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| ReportError::Malformed {
            path: path.to_path_buf(),
            line: i + 1,
            source,
        })?;
        records.push(record);
    }

    Ok(records)
}
