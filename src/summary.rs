//! Turkish article summaries through a chat-completion model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::SummaryConfig;
use crate::error::ScrapeError;
use crate::utils::HttpClient;

/// System prompt given to the model
pub const SUMMARY_SYSTEM_PROMPT: &str =
    "Sen akademik makale özetleme uzmanısın. Kısa ve öz özetler yaz.";

/// Instruction placed before the article content
pub const SUMMARY_INSTRUCTION: &str = "Bu akademik makaleyi Türkçe özetle:";

/// User message for `article`, cut to `max_chars` characters
pub fn summary_prompt(article: &str, max_chars: usize) -> String {
    let body: String = article.chars().take(max_chars).collect();
    format!("{}\n\n{}", SUMMARY_INSTRUCTION, body)
}

/// Produces a summary for a prompt
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, system_prompt: &str, prompt: &str) -> Result<String, ScrapeError>;

    /// Article characters kept in the prompt
    fn max_input_chars(&self) -> usize {
        usize::MAX
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Mistral chat completions client
#[derive(Debug, Clone)]
pub struct MistralSummarizer {
    http: HttpClient,
    api_key: String,
    endpoint: String,
    model: String,
    max_tokens: u32,
    max_input_chars: usize,
    timeout: Duration,
}

impl MistralSummarizer {
    /// `None` when no API key is configured
    pub fn from_config(http: HttpClient, config: &SummaryConfig) -> Option<Self> {
        let api_key = config.api_key.clone().filter(|k| !k.is_empty())?;
        Some(Self {
            http,
            api_key,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            max_input_chars: config.max_input_chars,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl Summarizer for MistralSummarizer {
    async fn summarize(&self, system_prompt: &str, prompt: &str) -> Result<String, ScrapeError> {
        tracing::info!("Requesting summary from {} ({} chars)", self.model, prompt.chars().count());

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .client()
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| ScrapeError::SummaryUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::SummaryUnavailable(format!(
                "model returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ScrapeError::SummaryUnavailable(format!("model response: {}", e)))?;

        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }
}
