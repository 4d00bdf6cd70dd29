// src/llm/client.rs

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ModelError;
use crate::llm::backend::{build_request, extract_texts, Provider, Request};

/// The capability the repair loop and batch driver consume.
///
/// Synchronous. An error is fatal to that one invocation; nothing here
/// retries.
pub trait ModelClient {
    fn generate(&self, prompt: &str, n: usize) -> Result<Vec<String>, ModelError>;

    /// `provider:model`, used in records and logs.
    fn label(&self) -> String;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Overrides the provider's environment variable. Never written to
    /// result records.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs", skip_serializing)]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            base_url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ModelConfig {
    pub fn label(&self) -> String {
        format!("{}:{}", self.provider, self.model)
    }
}

fn default_temperature() -> f64 {
    0.6
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout_secs() -> u64 {
    120
}

/* ============================================================
   HTTP client
   ============================================================ */

pub struct HttpModelClient {
    cfg: ModelConfig,
    provider: Provider,
    api_key: String,
    http: reqwest::blocking::Client,
}

impl HttpModelClient {
    pub fn new(cfg: ModelConfig) -> Result<Self, ModelError> {
        let provider: Provider = cfg.provider.parse()?;
        let api_key = resolve_api_key(provider, cfg.api_key.as_deref())?;

        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;

        Ok(Self {
            cfg,
            provider,
            api_key,
            http,
        })
    }

    fn send(&self, req: Request) -> Result<Value, ModelError> {
        let mut builder = self.http.post(req.url).json(&req.body);
        for (k, v) in req.headers {
            builder = builder.header(k, v);
        }

        let resp = builder.send()?;
        let status = resp.status();
        let text = resp.text()?;

        if !status.is_success() {
            return Err(ModelError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| ModelError::Parse {
            provider: self.provider.to_string(),
            message: e.to_string(),
        })
    }

    fn request_once(&self, prompt: &str, n: usize) -> Result<Vec<String>, ModelError> {
        let req = build_request(self.provider, &self.cfg, &self.api_key, prompt, n)?;
        let json = self.send(req)?;
        extract_texts(self.provider, &json)
    }
}

impl ModelClient for HttpModelClient {
    fn generate(&self, prompt: &str, n: usize) -> Result<Vec<String>, ModelError> {
        debug!(model = %self.label(), n, prompt_chars = prompt.len(), "generate");

        let texts = if self.provider.native_n() {
            self.request_once(prompt, n)?
        } else {
            let mut out = Vec::with_capacity(n);
            for _ in 0..n {
                out.extend(self.request_once(prompt, 1)?);
            }
            out
        };

        if texts.len() < n {
            return Err(ModelError::ShortResponse {
                got: texts.len(),
                expected: n,
            });
        }

        Ok(texts.into_iter().take(n).collect())
    }

    fn label(&self) -> String {
        self.cfg.label()
    }
}

fn resolve_api_key(provider: Provider, explicit: Option<&str>) -> Result<String, ModelError> {
    if let Some(key) = explicit.filter(|k| !k.trim().is_empty()) {
        return Ok(key.to_string());
    }

    let vars = provider.key_env();
    if vars.is_empty() {
        return Ok(String::new());
    }

    vars.iter()
        .find_map(|v| env::var(v).ok().filter(|k| !k.trim().is_empty()))
        .ok_or_else(|| ModelError::MissingApiKey {
            provider: provider.to_string(),
            env: vars.join(" or "),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_key_beats_environment() {
        let key = resolve_api_key(Provider::OpenAI, Some("from-config")).unwrap();
        assert_eq!(key, "from-config");
    }

    #[test]
    fn ollama_needs_no_key() {
        assert_eq!(resolve_api_key(Provider::Ollama, None).unwrap(), "");
    }

    #[test]
    fn unknown_provider_fails_construction() {
        let cfg = ModelConfig {
            provider: "nope".into(),
            ..ModelConfig::default()
        };
        assert!(matches!(
            HttpModelClient::new(cfg),
            Err(ModelError::UnknownProvider(_))
        ));
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let cfg: ModelConfig = toml::from_str("provider = \"google\"\nmodel = \"gemini-2.0-flash\"").unwrap();
        assert_eq!(cfg.temperature, 0.6);
        assert_eq!(cfg.max_tokens, 1024);
        assert_eq!(cfg.timeout_secs, 120);
        assert_eq!(cfg.label(), "google:gemini-2.0-flash");
    }

    #[test]
    fn api_key_is_never_serialized() {
        let cfg = ModelConfig {
            api_key: Some("secret".into()),
            ..ModelConfig::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("secret"));
    }
}
