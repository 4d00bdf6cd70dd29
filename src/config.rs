use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codegen::Strategy;
use crate::error::ConfigError;
use crate::executor::PythonSandbox;
use crate::llm::backend::Provider;
use crate::llm::{ModelConfig, TemplateSet};
use crate::testgen::PytestCov;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvalConfig {
    pub models: Vec<ModelConfig>,
    pub strategies: Vec<Strategy>,
    /// Samples per sampling strategy.
    pub k: usize,
    pub max_repairs: usize,
    /// Sleep between model calls, milliseconds.
    pub rate_limit_ms: u64,
    pub out_dir: PathBuf,
    /// `<name>.md` files here replace built-in problem statements.
    pub problems_dir: Option<PathBuf>,
    /// Markdown template overrides.
    pub templates: Option<PathBuf>,
    pub python: String,
    pub exec_timeout_secs: u64,
    /// Generated test files per `coverage` session.
    pub testgen_iterations: usize,
    /// Wall-clock limit for one pytest-cov run.
    pub coverage_timeout_secs: u64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            models: vec![ModelConfig::default()],
            strategies: Strategy::ALL.to_vec(),
            k: 3,
            max_repairs: 2,
            rate_limit_ms: 0,
            out_dir: PathBuf::from("generated"),
            problems_dir: None,
            templates: None,
            python: "python3".into(),
            exec_timeout_secs: 10,
            testgen_iterations: 2,
            coverage_timeout_secs: 120,
        }
    }
}

pub fn config_path() -> PathBuf {
    let mut dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.push("codegen-eval");
    dir.push("config.toml");
    dir
}

impl EvalConfig {
    /// `path` if given, else the default location. A missing default file
    /// yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (config_path(), false),
        };

        if !explicit && !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let cfg = Self::from_toml(&raw).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.clone(),
                source,
            },
            other => other,
        })?;

        debug!(path = %path.display(), models = cfg.models.len(), "config loaded");
        Ok(cfg)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for m in &self.models {
            m.provider
                .parse::<Provider>()
                .map_err(|_| ConfigError::Invalid(format!("unknown provider `{}`", m.provider)))?;
            if m.model.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "model name missing for provider `{}`",
                    m.provider
                )));
            }
        }
        if self.k == 0 {
            return Err(ConfigError::Invalid("k must be at least 1".into()));
        }
        if self.exec_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "exec_timeout_secs must be at least 1".into(),
            ));
        }
        if self.coverage_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "coverage_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn sandbox(&self) -> PythonSandbox {
        PythonSandbox::new(
            self.python.clone(),
            Duration::from_secs(self.exec_timeout_secs),
        )
    }

    pub fn coverage_runner(&self) -> PytestCov {
        PytestCov::new(
            self.python.clone(),
            Duration::from_secs(self.coverage_timeout_secs),
        )
    }

    pub fn template_set(&self) -> Result<TemplateSet, ConfigError> {
        match &self.templates {
            Some(path) => TemplateSet::load(path),
            None => Ok(TemplateSet::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = EvalConfig::from_toml("").unwrap();
        assert_eq!(cfg, EvalConfig::default());
        assert_eq!(cfg.k, 3);
        assert_eq!(cfg.max_repairs, 2);
        assert_eq!(cfg.strategies.len(), 8);
    }

    #[test]
    fn parses_models_and_strategies() {
        let cfg = EvalConfig::from_toml(
            r#"
k = 5
strategies = ["cot", "self_repair"]
rate_limit_ms = 250

[[models]]
provider = "anthropic"
model = "claude-3-5-haiku-latest"
temperature = 0.2

[[models]]
provider = "ollama"
model = "qwen2.5-coder"
base_url = "http://gpu-box:11434"
"#,
        )
        .unwrap();

        assert_eq!(cfg.k, 5);
        assert_eq!(cfg.strategies, vec![Strategy::Cot, Strategy::SelfRepair]);
        assert_eq!(cfg.models.len(), 2);
        assert_eq!(cfg.models[0].temperature, 0.2);
        assert_eq!(cfg.models[1].base_url.as_deref(), Some("http://gpu-box:11434"));
        assert_eq!(cfg.pause(), Duration::from_millis(250));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = EvalConfig::from_toml("[[models]]\nprovider = \"cohere\"\nmodel = \"x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("cohere")));
    }

    #[test]
    fn unknown_strategy_is_a_parse_error() {
        let err = EvalConfig::from_toml("strategies = [\"tree_of_thought\"]").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn zero_k_is_rejected() {
        assert!(matches!(
            EvalConfig::from_toml("k = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn coverage_settings_have_defaults_and_are_validated() {
        let cfg = EvalConfig::from_toml("testgen_iterations = 3").unwrap();
        assert_eq!(cfg.testgen_iterations, 3);
        assert_eq!(cfg.coverage_timeout_secs, 120);

        assert!(matches!(
            EvalConfig::from_toml("coverage_timeout_secs = 0"),
            Err(ConfigError::Invalid(msg)) if msg.contains("coverage_timeout_secs")
        ));
    }

    #[test]
    fn load_reads_explicit_path_and_errors_when_missing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_repairs = 4").unwrap();

        let cfg = EvalConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.max_repairs, 4);

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            EvalConfig::load(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));
    }
}
