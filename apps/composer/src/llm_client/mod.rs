/// LLM Client: the single point of entry for all generative-service calls.
///
/// ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
/// Stages depend on the `GenerativeService` trait; `LlmClient` is the production
/// implementation and tests substitute scripted fakes.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Default text model; `ANTHROPIC_MODEL` overrides it.
const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM refused the request")]
    Refusal,
}

/// One request to the generative service.
///
/// `response_shape` describes the JSON the caller requires; it is appended to the
/// prompt so the model sees it last.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub prompt: String,
    pub response_shape: String,
}

impl GenerationRequest {
    pub fn new(system: &str, prompt: String, response_shape: &str) -> Self {
        Self {
            system: system.to_string(),
            prompt,
            response_shape: response_shape.to_string(),
        }
    }

    /// Prompt text with the required response shape appended.
    pub fn full_prompt(&self) -> String {
        format!(
            "{}\n\nRespond with JSON matching EXACTLY this shape:\n{}",
            self.prompt, self.response_shape
        )
    }
}

/// The external generative capability used by the selector, prop generator and gap filler.
#[async_trait]
pub trait GenerativeService: Send + Sync {
    /// Returns the raw text of the model's answer.
    async fn complete(&self, request: &GenerationRequest) -> Result<String, LlmError>;

    fn model_id(&self) -> &str;
}

/// Calls the service under a timeout and decodes the answer as JSON.
///
/// A timeout is reported as `LlmError::Timeout` and handled by callers exactly
/// like a malformed payload.
pub async fn request_json<T: DeserializeOwned>(
    service: &dyn GenerativeService,
    request: &GenerationRequest,
    timeout: Duration,
) -> Result<T, LlmError> {
    let text = tokio::time::timeout(timeout, service.complete(request))
        .await
        .map_err(|_| LlmError::Timeout(timeout))??;

    let text = strip_json_fences(&text);
    if text.is_empty() {
        return Err(LlmError::EmptyContent);
    }
    serde_json::from_str(text).map_err(LlmError::Parse)
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// Outcome of a single HTTP attempt.
enum Attempt {
    Done(LlmResponse),
    Retry(LlmError),
    Fail(LlmError),
}

/// Anthropic Messages API client with retry on 429/5xx.
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl LlmClient {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        Ok(Self {
            http: Client::builder().timeout(Duration::from_secs(120)).build()?,
            api_key,
            model: MODEL.to_string(),
            max_tokens: MAX_TOKENS,
        })
    }

    /// Overrides the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sends one prompt, retrying transport errors, 429 and 5xx with exponential backoff.
    /// A 429 that survives every retry is reported as `RateLimited`.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<LlmResponse, LlmError> {
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut last_error: Option<LlmError> = None;
        for attempt in 0..MAX_RETRIES {
            if let Some(error) = &last_error {
                let delay = backoff(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "Retrying LLM call");
                tokio::time::sleep(delay).await;
            }

            match self.send_once(&body).await {
                Attempt::Done(response) => {
                    debug!(
                        model = %self.model,
                        input_tokens = response.usage.input_tokens,
                        output_tokens = response.usage.output_tokens,
                        stop_reason = response.stop_reason.as_deref().unwrap_or("unknown"),
                        "LLM call succeeded"
                    );
                    return Ok(response);
                }
                Attempt::Retry(error) => last_error = Some(error),
                Attempt::Fail(error) => return Err(error),
            }
        }

        Err(match last_error {
            None | Some(LlmError::Api { status: 429, .. }) => LlmError::RateLimited { retries: MAX_RETRIES },
            Some(error) => error,
        })
    }

    async fn send_once(&self, body: &AnthropicRequest<'_>) -> Attempt {
        let response = self
            .http
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await;
        let response = match response {
            Ok(response) => response,
            Err(e) => return Attempt::Retry(LlmError::Http(e)),
        };

        let status = response.status();
        if status.is_success() {
            return match response.json::<LlmResponse>().await {
                Ok(parsed) => Attempt::Done(parsed),
                Err(e) => Attempt::Fail(LlmError::Http(e)),
            };
        }

        let raw = response.text().await.unwrap_or_default();
        let error = api_error(status.as_u16(), raw);
        if is_retryable(status) {
            Attempt::Retry(error)
        } else {
            Attempt::Fail(error)
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Delay before `attempt` (1-based retries): 1s, 2s, 4s, ...
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
}

/// Prefers the message inside Anthropic's error envelope over the raw body.
fn api_error(status: u16, raw: String) -> LlmError {
    let message = serde_json::from_str::<AnthropicError>(&raw)
        .map(|e| e.error.message)
        .unwrap_or(raw);
    LlmError::Api { status, message }
}

#[async_trait]
impl GenerativeService for LlmClient {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let system = format!("{}\n\n{}", request.system, prompts::JSON_ONLY_SYSTEM);
        let response = self.call(&request.full_prompt(), &system).await?;

        if response.stop_reason.as_deref() == Some("refusal") {
            return Err(LlmError::Refusal);
        }

        response
            .text()
            .map(str::to_string)
            .ok_or(LlmError::EmptyContent)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Strips a surrounding Markdown code fence (with or without a `json` tag).
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest).trim_start();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
