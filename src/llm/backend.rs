// src/llm/backend.rs
//
// Provider wire formats: how one prompt becomes an HTTP request and how a
// response body becomes completion texts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::error::ModelError;
use crate::llm::client::ModelConfig;
use crate::llm::ollama;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAI,
    Anthropic,
    Google,
    OpenRouter,
    HuggingFace,
    Ollama,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
            Provider::OpenRouter => "openrouter",
            Provider::HuggingFace => "huggingface",
            Provider::Ollama => "ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::Anthropic => "https://api.anthropic.com/v1",
            Provider::Google => "https://generativelanguage.googleapis.com/v1beta",
            Provider::OpenRouter => "https://openrouter.ai/api/v1",
            Provider::HuggingFace => "https://router.huggingface.co/v1",
            Provider::Ollama => ollama::DEFAULT_BASE_URL,
        }
    }

    /// Environment variables consulted for the API key, in order.
    pub fn key_env(&self) -> &'static [&'static str] {
        match self {
            Provider::OpenAI => &["OPENAI_API_KEY"],
            Provider::Anthropic => &["ANTHROPIC_API_KEY"],
            Provider::Google => &["GOOGLE_API_KEY", "GOOGLE_API_TOKEN"],
            Provider::OpenRouter => &["OPENROUTER_API_KEY"],
            Provider::HuggingFace => &["HUGGINGFACE_API_KEY"],
            Provider::Ollama => &[],
        }
    }

    /// Chat-completions providers return `n` choices from one request; the
    /// rest need one request per sample.
    pub fn native_n(&self) -> bool {
        matches!(
            self,
            Provider::OpenAI | Provider::OpenRouter | Provider::HuggingFace
        )
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "anthropic" => Ok(Provider::Anthropic),
            "google" | "gemini" => Ok(Provider::Google),
            "openrouter" => Ok(Provider::OpenRouter),
            "huggingface" | "hf" => Ok(Provider::HuggingFace),
            "ollama" => Ok(Provider::Ollama),
            _ => Err(ModelError::UnknownProvider(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

/// `base` joined with `path`, tolerating a missing trailing slash on `base`.
pub fn endpoint(base: &str, path: &str) -> Result<Url, ModelError> {
    let bad = |message: String| ModelError::BadUrl {
        url: base.to_string(),
        message,
    };

    let mut base_url = Url::parse(base).map_err(|e| bad(e.to_string()))?;
    if !base_url.path().ends_with('/') {
        let with_slash = format!("{}/", base_url.path());
        base_url.set_path(&with_slash);
    }
    base_url.join(path).map_err(|e| bad(e.to_string()))
}

/// Request for `n` samples (`n` is only sent to native-n providers).
pub fn build_request(
    provider: Provider,
    cfg: &ModelConfig,
    api_key: &str,
    prompt: &str,
    n: usize,
) -> Result<Request, ModelError> {
    let base = cfg
        .base_url
        .as_deref()
        .unwrap_or_else(|| provider.default_base_url());

    match provider {
        Provider::OpenAI | Provider::OpenRouter | Provider::HuggingFace => Ok(Request {
            url: endpoint(base, "chat/completions")?,
            headers: vec![("Authorization", format!("Bearer {api_key}"))],
            body: json!({
                "model": cfg.model,
                "messages": [{ "role": "user", "content": prompt }],
                "temperature": cfg.temperature,
                "max_tokens": cfg.max_tokens,
                "n": n,
            }),
        }),

        Provider::Anthropic => Ok(Request {
            url: endpoint(base, "messages")?,
            headers: vec![
                ("x-api-key", api_key.to_string()),
                ("anthropic-version", "2023-06-01".into()),
            ],
            body: json!({
                "model": cfg.model,
                "max_tokens": cfg.max_tokens,
                "temperature": cfg.temperature,
                "messages": [{ "role": "user", "content": prompt }],
            }),
        }),

        Provider::Google => Ok(Request {
            url: endpoint(base, &format!("models/{}:generateContent", cfg.model))?,
            headers: vec![("x-goog-api-key", api_key.to_string())],
            body: json!({
                "contents": [{ "parts": [{ "text": prompt }] }],
                "generationConfig": {
                    "temperature": cfg.temperature,
                    "maxOutputTokens": cfg.max_tokens,
                },
            }),
        }),

        Provider::Ollama => Ok(Request {
            url: endpoint(base, "api/generate")?,
            headers: Vec::new(),
            body: ollama::request_body(cfg, prompt),
        }),
    }
}

/// All completion texts in the response, in order.
pub fn extract_texts(provider: Provider, v: &Value) -> Result<Vec<String>, ModelError> {
    let parse_err = |message: &str| ModelError::Parse {
        provider: provider.to_string(),
        message: message.to_string(),
    };

    match provider {
        Provider::OpenAI | Provider::OpenRouter | Provider::HuggingFace => {
            let choices = v
                .get("choices")
                .and_then(Value::as_array)
                .ok_or_else(|| parse_err("missing `choices`"))?;

            Ok(choices
                .iter()
                .map(|c| {
                    c.pointer("/message/content")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                })
                .collect())
        }

        Provider::Anthropic => {
            let blocks = v
                .get("content")
                .and_then(Value::as_array)
                .ok_or_else(|| parse_err("missing `content`"))?;

            Ok(vec![blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<String>()])
        }

        Provider::Google => {
            let parts = v
                .pointer("/candidates/0/content/parts")
                .and_then(Value::as_array)
                .ok_or_else(|| parse_err("missing `candidates[0].content.parts`"))?;

            Ok(vec![parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<String>()])
        }

        Provider::Ollama => ollama::extract_text(v)
            .map(|t| vec![t])
            .ok_or_else(|| parse_err("missing `response`")),
    }
}
