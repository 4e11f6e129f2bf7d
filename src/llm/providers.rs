//! Provider adapters. Each wraps one HTTP chat endpoint behind the
//! `ProviderAdapter` trait; the router stays agnostic of the wire schemas.

use super::{CallOpts, ProviderAdapter, ResponseFormat};
use crate::config::ProviderConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ZHIPU_DEFAULT_URL: &str = "https://open.bigmodel.cn/api/paas/v4/chat/completions";
const ZHIPU_DEFAULT_MODEL: &str = "glm-4-flash";
const GEMINI_DEFAULT_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Adapter for a provider config entry, `None` for unknown names.
pub fn build_adapter(config: &ProviderConfig) -> Option<Box<dyn ProviderAdapter>> {
    match config.name.as_str() {
        "zhipu_glm" => Some(Box::new(ZhipuGlm::from_config(config))),
        "gemini" => Some(Box::new(Gemini::from_config(config))),
        other => {
            tracing::warn!("unknown llm provider {other}, skipping");
            None
        }
    }
}

fn http_client() -> reqwest::Client {
    // Per-call timeouts are applied on each request; no global client timeout.
    reqwest::Client::builder()
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

// ---------------------------------------------------------------------------
// Zhipu GLM (OpenAI-compatible chat completions)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ChatResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageBody,
}

#[derive(Deserialize)]
struct ChatMessageBody {
    content: String,
}

pub struct ZhipuGlm {
    api_key: String,
    api_url: String,
    model: String,
    client: reqwest::Client,
}

impl ZhipuGlm {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            api_key: config.api_key.trim().to_string(),
            api_url: non_empty_or(&config.api_url, ZHIPU_DEFAULT_URL),
            model: non_empty_or(&config.model, ZHIPU_DEFAULT_MODEL),
            client: http_client(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for ZhipuGlm {
    fn name(&self) -> &str {
        "zhipu_glm"
    }

    async fn invoke(&self, system: &str, user: &str, opts: &CallOpts) -> anyhow::Result<String> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            max_tokens: Some(opts.max_tokens),
            response_format: (opts.response_format == ResponseFormat::Json).then(|| {
                ChatResponseFormat {
                    kind: "json_object".to_string(),
                }
            }),
        };

        let res = self
            .client
            .post(&self.api_url)
            .timeout(Duration::from_millis(opts.timeout_ms))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            anyhow::bail!("GLM API error {status}: {text}");
        }
        let parsed: ChatResponse = res.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        anyhow::ensure!(!content.trim().is_empty(), "GLM returned an empty completion");
        Ok(content)
    }
}

// ---------------------------------------------------------------------------
// Gemini (generateContent)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction")]
    system_instruction: GeminiContent,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    /// Elicits pure JSON without Markdown fences where supported.
    #[serde(rename = "responseMimeType", skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

pub struct Gemini {
    api_key: String,
    api_url: String,
    model: String,
    client: reqwest::Client,
}

impl Gemini {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            api_key: config.api_key.trim().to_string(),
            api_url: non_empty_or(&config.api_url, GEMINI_DEFAULT_URL),
            model: non_empty_or(&config.model, GEMINI_DEFAULT_MODEL),
            client: http_client(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for Gemini {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn invoke(&self, system: &str, user: &str, opts: &CallOpts) -> anyhow::Result<String> {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: user.to_string(),
                }],
            }],
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: system.to_string(),
                }],
            },
            generation_config: GeminiGenerationConfig {
                max_output_tokens: opts.max_tokens,
                response_mime_type: (opts.response_format == ResponseFormat::Json)
                    .then(|| "application/json".to_string()),
            },
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.api_url.trim_end_matches('/'),
            self.model
        );
        let res = self
            .client
            .post(&url)
            .timeout(Duration::from_millis(opts.timeout_ms))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error {status}: {text}");
        }
        let parsed: GeminiResponse = res.json().await?;
        let content = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default();
        anyhow::ensure!(!content.trim().is_empty(), "Gemini returned an empty completion");
        Ok(content)
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_mode_sets_glm_response_format() {
        let req = ChatRequest {
            model: "glm-4-flash".to_string(),
            messages: Vec::new(),
            max_tokens: Some(1024),
            response_format: Some(ChatResponseFormat {
                kind: "json_object".to_string(),
            }),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
    }

    #[test]
    fn gemini_json_mode_sets_mime_type() {
        let config = GeminiGenerationConfig {
            max_output_tokens: 2048,
            response_mime_type: Some("application/json".to_string()),
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["responseMimeType"], "application/json");
        assert_eq!(json["maxOutputTokens"], 2048);
    }

    #[test]
    fn defaults_fill_empty_endpoint_fields() {
        let adapter = ZhipuGlm::from_config(&ProviderConfig {
            name: "zhipu_glm".to_string(),
            api_key: "k".to_string(),
            api_url: String::new(),
            model: String::new(),
        });
        assert_eq!(adapter.api_url, ZHIPU_DEFAULT_URL);
        assert_eq!(adapter.model, ZHIPU_DEFAULT_MODEL);
    }

    #[test]
    fn unknown_provider_builds_nothing() {
        assert!(build_adapter(&ProviderConfig {
            name: "mystery".to_string(),
            api_key: "k".to_string(),
            ..Default::default()
        })
        .is_none());
    }
}
