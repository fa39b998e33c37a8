use crate::error::{check_status, ServiceError};
use crate::gemini_types::{
    GeminiContent, GeminiGenerationConfig, GeminiPart, GeminiPayload, GeminiResponse,
};
use crate::openai_types::{ChatCompletionMessage, ChatCompletionRequest, ChatCompletionResponse};
use crate::types::{ChatMessage, Role};

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const MAX_RESPONSE_TOKENS: u32 = 300;
const TEMPERATURE: f32 = 0.6;

/// Conversational completion: role-tagged turns in (system prompt first), one
/// text response out.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError>;
}

pub struct OpenAICompletion {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAICompletion {
    pub fn new(
        http_client: reqwest::Client,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            api_key,
            model,
            timeout,
        }
    }
}

fn openai_messages(messages: &[ChatMessage]) -> Vec<ChatCompletionMessage> {
    messages
        .iter()
        .map(|m| ChatCompletionMessage {
            role: m.role.as_str().to_string(),
            content: Some(m.content.clone()),
        })
        .collect()
}

#[async_trait]
impl Completion for OpenAICompletion {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        const SERVICE: &str = "openai";
        let payload = ChatCompletionRequest {
            model: self.model.clone(),
            messages: openai_messages(messages),
            max_tokens: Some(MAX_RESPONSE_TOKENS),
            temperature: Some(TEMPERATURE),
        };
        let key = self.api_key.as_str();
        let resp = self
            .http_client
            .post(OPENAI_CHAT_URL)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {key}"))
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(ServiceError::http(SERVICE))?;
        let resp = check_status(SERVICE, resp).await?;
        let resp = resp.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(error=%e, "failed to deserialize openai completion response");
            ServiceError::Decode {
                service: SERVICE,
                reason: e.to_string(),
            }
        })?;
        debug!(usage=?resp.usage, "openai completion");
        resp.text().ok_or(ServiceError::Empty { service: SERVICE })
    }
}

pub struct GeminiCompletion {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl GeminiCompletion {
    pub fn new(
        http_client: reqwest::Client,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            api_key,
            model,
            timeout,
        }
    }
}

/// Gemini takes the system prompt out of band and calls the assistant `model`.
fn gemini_payload(messages: &[ChatMessage]) -> GeminiPayload {
    let text_content = |role: Option<&str>, text: &str| GeminiContent {
        role: role.map(str::to_string),
        parts: vec![GeminiPart {
            text: text.to_string(),
        }],
    };
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let contents = messages
        .iter()
        .filter_map(|m| match m.role {
            Role::System => None,
            Role::User => Some(text_content(Some("user"), &m.content)),
            Role::Assistant => Some(text_content(Some("model"), &m.content)),
        })
        .collect();
    GeminiPayload {
        system_instruction: if system.is_empty() {
            None
        } else {
            Some(text_content(None, &system.join("\n\n")))
        },
        contents,
        generation_config: Some(GeminiGenerationConfig {
            max_output_tokens: MAX_RESPONSE_TOKENS,
            temperature: TEMPERATURE,
        }),
    }
}

#[async_trait]
impl Completion for GeminiCompletion {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        const SERVICE: &str = "gemini";
        let url = format!("{GEMINI_BASE_URL}/{}:generateContent", self.model);
        let resp = self
            .http_client
            .post(url)
            .header("x-goog-api-key", self.api_key.as_str())
            .timeout(self.timeout)
            .json(&gemini_payload(messages))
            .send()
            .await
            .map_err(ServiceError::http(SERVICE))?;
        let resp = check_status(SERVICE, resp).await?;
        let resp = resp.json::<GeminiResponse>().await.map_err(|e| {
            error!(error=%e, "failed to deserialize gemini response");
            ServiceError::Decode {
                service: SERVICE,
                reason: e.to_string(),
            }
        })?;
        resp.text().ok_or(ServiceError::Empty { service: SERVICE })
    }
}
