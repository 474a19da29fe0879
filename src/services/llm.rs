use std::time::{Duration, Instant};

use anyhow::Result;
use thiserror::Error;

use crate::config::Config;
use crate::models::{BookRequest, GenerationResponse};
use crate::services::prompt::build_generation_request;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to send request: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("upstream returned status {status}: {body}")]
    UpstreamError { status: u16, body: String },

    #[error("failed to parse upstream response: {source}, response body: {body}")]
    MalformedUpstreamResponse {
        #[source]
        source: serde_json::Error,
        body: String,
    },

    #[error("generation finished unexpectedly with reason: {0}")]
    UpstreamIncomplete(String),

    #[error("upstream returned an empty response text")]
    EmptyUpstreamResult,
}

impl GenerationError {
    /// Caller-facing description. Leaves out upstream bodies and anything
    /// else that belongs in the logs only.
    pub fn summary(&self) -> String {
        match self {
            GenerationError::Timeout(_) => "request to the generation service timed out".to_string(),
            GenerationError::Transport(_) => "generation service is unreachable".to_string(),
            GenerationError::UpstreamError { status, .. } => {
                format!("generation service returned status {status}")
            }
            GenerationError::MalformedUpstreamResponse { .. } => {
                "generation service returned an unreadable response".to_string()
            }
            GenerationError::UpstreamIncomplete(reason) => {
                format!("generation finished unexpectedly with reason: {reason}")
            }
            GenerationError::EmptyUpstreamResult => {
                "generation service returned an empty response".to_string()
            }
        }
    }
}

pub struct LLMClient {
    client: reqwest::Client,
    api_url: String,
    model: String,
    timeout: Duration,
}

impl LLMClient {
    pub fn new(api_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(LLMClient {
            client: reqwest::Client::builder().build()?,
            api_url: api_url.into(),
            model: model.into(),
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.api_url, &config.model, config.upstream_timeout)
    }

    /// Sends one generation request and returns the book text.
    ///
    /// The whole round trip (connect, send, read) shares one deadline.
    /// Nothing is retried.
    pub async fn generate_book(
        &self,
        request: &BookRequest,
        api_key: &str,
    ) -> Result<String, GenerationError> {
        let started = Instant::now();

        let (text, finish_reason) =
            match tokio::time::timeout(self.timeout, self.round_trip(request, api_key)).await {
                Ok(result) => result?,
                Err(_) => return Err(GenerationError::Timeout(self.timeout)),
            };

        if text.is_empty() {
            return match finish_reason {
                Some(reason) if !reason.is_empty() && reason != "stop" => {
                    Err(GenerationError::UpstreamIncomplete(reason))
                }
                _ => Err(GenerationError::EmptyUpstreamResult),
            };
        }

        tracing::info!(
            model = %self.model,
            finish_reason = finish_reason.as_deref().unwrap_or(""),
            chars = text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Book generated"
        );

        Ok(text)
    }

    async fn round_trip(
        &self,
        request: &BookRequest,
        api_key: &str,
    ) -> Result<(String, Option<String>), GenerationError> {
        let payload = build_generation_request(request, &self.model);

        let response = self
            .client
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(GenerationError::Transport)?;

        let status = response.status();
        let body = response.text().await.map_err(GenerationError::Transport)?;

        if !status.is_success() {
            return Err(GenerationError::UpstreamError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerationResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(source) => return Err(GenerationError::MalformedUpstreamResponse { source, body }),
        };

        Ok(parsed.output.into_parts())
    }
}
