//! services/api/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the résumé assistant chat model.
//! It implements the `ChatCompletionService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use resume_review_core::domain::{PromptMessage, PromptRole};
use resume_review_core::ports::{ChatCompletionService, PortError, PortResult};
use tracing::{debug, error};

pub struct OpenAiChatAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiChatAdapter {
    pub fn new(
        client: Client<OpenAIConfig>,
        model: String,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            client,
            model,
            max_tokens,
            temperature,
        }
    }
}

fn build_error(e: OpenAIError) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn to_request_message(
    message: &PromptMessage,
) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    let content = message.content.as_str();
    Ok(match message.role {
        PromptRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        PromptRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        PromptRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
    })
}

#[async_trait]
impl ChatCompletionService for OpenAiChatAdapter {
    async fn complete(&self, messages: &[PromptMessage]) -> PortResult<String> {
        let request_messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()
            .map_err(build_error)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(request_messages)
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
            .build()
            .map_err(build_error)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            error!("Chat completion request failed: {}", e);
            PortError::Upstream(e.to_string())
        })?;

        if let Some(usage) = &response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat completion finished"
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| PortError::Upstream("Chat model returned no content".to_string()))
    }
}
