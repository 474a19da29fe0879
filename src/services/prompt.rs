use crate::models::{BookRequest, GenerationInput, GenerationRequest, Message};

pub const RESULT_FORMAT: &str = "message";

pub fn system_prompt(request: &BookRequest) -> String {
    format!(
        "You are a professional book writer.\n\
         Generate a complete book with the following details:\n\
         - Title: {}\n\
         - Description: {}\n\
         - Number of chapters: {}\n\
         \n\
         The book should have a coherent narrative that follows the description.\n\
         Each chapter should have a title and substantial content.\n\
         Format the book with proper Markdown, including headings for chapters.\n\
         Create a compelling opening and satisfying conclusion.",
        request.title, request.description, request.chapters
    )
}

/// Restates the request as the user turn. The model follows the brief more
/// closely when it sees it twice.
pub fn user_prompt(request: &BookRequest) -> String {
    format!(
        "Please generate a complete book titled '{}' with {} chapters based on this description: {}",
        request.title, request.chapters, request.description
    )
}

pub fn build_generation_request(request: &BookRequest, model: &str) -> GenerationRequest {
    GenerationRequest {
        model: model.to_string(),
        input: GenerationInput {
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system_prompt(request),
                },
                Message {
                    role: "user".to_string(),
                    content: user_prompt(request),
                },
            ],
        },
        result_format: RESULT_FORMAT.to_string(),
    }
}
