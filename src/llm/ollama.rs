// Local Ollama server. No API key, one request per sample.

use serde_json::{json, Value};

use crate::llm::client::ModelConfig;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub fn request_body(cfg: &ModelConfig, prompt: &str) -> Value {
    json!({
        "model": cfg.model,
        "prompt": prompt,
        "stream": false,
        "options": {
            "temperature": cfg.temperature,
            "num_predict": cfg.max_tokens,
        },
    })
}

pub fn extract_text(v: &Value) -> Option<String> {
    v.get("response")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
}
