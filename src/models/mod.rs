use serde::{Deserialize, Serialize};

/// Body of `POST /generate-book`. Missing fields fall back to their zero
/// value so that validation, not deserialization, reports them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub chapters: i64,
}

impl BookRequest {
    pub fn is_complete(&self) -> bool {
        !self.title.is_empty() && !self.description.is_empty() && self.chapters > 0
    }
}

#[derive(Debug, Serialize)]
pub struct BookResponse {
    pub book: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationInput {
    pub messages: Vec<Message>,
}

/// Payload sent to the text-generation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub input: GenerationInput,
    pub result_format: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerationResponse {
    #[serde(default)]
    pub output: GenerationOutput,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerationOutput {
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Present when the endpoint answers in message form.
    #[serde(default)]
    pub choices: Vec<GenerationChoice>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerationChoice {
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
}

impl GenerationOutput {
    /// Generated text and finish reason, preferring `text` over the first
    /// choice. Either part may be empty.
    pub fn into_parts(self) -> (String, Option<String>) {
        let text = self.text.unwrap_or_default();
        if !text.is_empty() {
            return (text, self.finish_reason);
        }

        match self.choices.into_iter().next() {
            Some(choice) => {
                let content = choice.message.map(|m| m.content).unwrap_or_default();
                let reason = choice.finish_reason.or(self.finish_reason);
                (content, reason)
            }
            None => (text, self.finish_reason),
        }
    }
}
