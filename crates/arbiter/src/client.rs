// HTTP arbiter
//
// One blocking request per ambiguous segment. The linker calls `arbitrate`
// from several worker threads; `reqwest::blocking::Client` is shared.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use streetlink_linker::{Arbiter, ArbiterResult, ArbitrationDecision, ArbitrationRequest};

use crate::config::{ArbiterSettings, Provider, ResolvedArbiterConfig};
use crate::error::ArbiterError;
use crate::parse::parse_reply;
use crate::prompt::{build_system_prompt, build_user_prompt};

const MAX_RETRIES: u32 = 2;
const MAX_BACKOFF_SECS: u64 = 8;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: OpenAIResponseFormat,
}

#[derive(Serialize)]
struct OpenAIResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

// ============================================================================
// Client
// ============================================================================

/// Arbiter backed by a hosted or local language model.
pub struct LlmArbiter {
    config: ResolvedArbiterConfig,
    http: reqwest::blocking::Client,
    label: String,
    initial_backoff: Duration,
}

impl LlmArbiter {
    pub fn new(config: ResolvedArbiterConfig) -> Result<Self, ArbiterError> {
        if !config.provider.is_enabled() {
            return Err(ArbiterError::NotConfigured("arbitration is disabled".into()));
        }
        if config.provider.needs_api_key() && config.api_key.is_none() {
            return Err(ArbiterError::MissingKey {
                provider: config.provider.name().into(),
                env_var: crate::config::env_var_name(config.provider.name()),
            });
        }

        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ArbiterError::Network(e.to_string()))?;
        let label = format!("{}/{}", config.provider.name(), config.model);

        Ok(Self {
            config,
            http,
            label,
            initial_backoff: Duration::from_secs(1),
        })
    }

    /// Build from the `[arbitration]` settings. `Ok(None)` when disabled.
    pub fn from_settings(settings: &ArbiterSettings) -> Result<Option<Self>, ArbiterError> {
        match ResolvedArbiterConfig::resolve(settings)? {
            Some(config) => Self::new(config).map(Some),
            None => Ok(None),
        }
    }

    /// Point the client at a different base URL (proxy, test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.endpoint = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn config(&self) -> &ResolvedArbiterConfig {
        &self.config
    }

    /// Ask the model about one ambiguous segment.
    pub fn ask(&self, request: &ArbitrationRequest) -> Result<ArbitrationDecision, ArbiterError> {
        let system_prompt = build_system_prompt();
        let user_prompt = build_user_prompt(request);

        let content = match self.config.provider {
            Provider::OpenAI => self.call_openai(&system_prompt, &user_prompt)?,
            Provider::Gemini => self.call_gemini(&system_prompt, &user_prompt)?,
            Provider::Local => self.call_ollama(&system_prompt, &user_prompt)?,
            Provider::None => {
                return Err(ArbiterError::NotConfigured("arbitration is disabled".into()))
            }
        };

        log::debug!("{}: reply for {}: {}", self.label, request.segment_id, content.trim());
        parse_reply(&content)
    }

    fn call_openai(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ArbiterError> {
        let api_key = self.config.api_key.as_deref().unwrap_or_default();
        let body = OpenAIRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage { role: "system", content: system_prompt },
                ChatMessage { role: "user", content: user_prompt },
            ],
            temperature: 0.0,
            max_tokens: 64,
            response_format: OpenAIResponseFormat { format_type: "json_object" },
        };
        let url = format!("{}/chat/completions", self.config.endpoint);

        let value = self.post_with_retry(|http| http.post(&url).bearer_auth(api_key).json(&body))?;
        let response: OpenAIResponse =
            serde_json::from_value(value).map_err(|e| ArbiterError::Parse(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ArbiterError::InvalidResponse("No choices in response".into()))
    }

    fn call_gemini(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ArbiterError> {
        let api_key = self.config.api_key.as_deref().unwrap_or_default();
        let body = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: system_prompt }],
            },
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart { text: user_prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.0,
                response_mime_type: "application/json",
            },
        };
        let url = format!("{}/models/{}:generateContent", self.config.endpoint, self.config.model);

        let value = self.post_with_retry(|http| {
            http.post(&url).header("x-goog-api-key", api_key).json(&body)
        })?;
        let response: GeminiResponse =
            serde_json::from_value(value).map_err(|e| ArbiterError::Parse(e.to_string()))?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ArbiterError::InvalidResponse("No candidates in response".into()));
        }
        Ok(text)
    }

    fn call_ollama(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ArbiterError> {
        let body = OllamaRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage { role: "system", content: system_prompt },
                ChatMessage { role: "user", content: user_prompt },
            ],
            stream: false,
            format: "json",
            options: OllamaOptions { temperature: 0.0 },
        };
        let url = format!("{}/api/chat", self.config.endpoint);

        let value = self.post_with_retry(|http| http.post(&url).json(&body))?;
        let response: OllamaResponse =
            serde_json::from_value(value).map_err(|e| ArbiterError::Parse(e.to_string()))?;
        Ok(response.message.content)
    }

    /// Send with retry on 429 and 5xx. Other failures return at once.
    fn post_with_retry(
        &self,
        build_request: impl Fn(&reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder,
    ) -> Result<Value, ArbiterError> {
        let mut backoff = self.initial_backoff;

        for attempt in 0..=MAX_RETRIES {
            let response = match build_request(&self.http).send() {
                Ok(r) => r,
                Err(e) if attempt < MAX_RETRIES && (e.is_timeout() || e.is_connect()) => {
                    log::warn!("{}: {} (attempt {}), retrying", self.label, e, attempt + 1);
                    std::thread::sleep(backoff);
                    backoff = next_backoff(backoff);
                    continue;
                }
                Err(e) => return Err(ArbiterError::Network(e.to_string())),
            };

            let status = response.status().as_u16();
            if response.status().is_success() {
                return response.json().map_err(|e| ArbiterError::Parse(e.to_string()));
            }

            let retryable = status == 429 || status >= 500;
            if retryable && attempt < MAX_RETRIES {
                let wait = retry_after(&response).unwrap_or(backoff);
                log::warn!(
                    "{}: HTTP {} (attempt {}), retrying in {:?}",
                    self.label,
                    status,
                    attempt + 1,
                    wait
                );
                std::thread::sleep(wait);
                backoff = next_backoff(backoff);
                continue;
            }

            let text = response.text().unwrap_or_default();
            return Err(ArbiterError::Api {
                status,
                message: extract_error_message(&text),
            });
        }

        Err(ArbiterError::Network("retries exhausted".into()))
    }
}

impl Arbiter for LlmArbiter {
    fn name(&self) -> &str {
        &self.label
    }

    fn arbitrate(&self, request: &ArbitrationRequest) -> ArbiterResult {
        self.ask(request).map_err(Into::into)
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(Duration::from_secs(MAX_BACKOFF_SECS))
}

fn retry_after(response: &reqwest::blocking::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs.min(MAX_BACKOFF_SECS)))
}

/// Pull a readable message out of a provider error body.
///
/// OpenAI and Gemini send `{"error": {"message": ...}}`, Ollama sends
/// `{"error": "..."}`.
fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        match value.get("error") {
            Some(Value::String(s)) => return s.clone(),
            Some(obj) => {
                if let Some(msg) = obj.get("message").and_then(Value::as_str) {
                    return msg.to_string();
                }
            }
            None => {}
        }
    }
    body.trim().to_string()
}
