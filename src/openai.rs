use anyhow::{anyhow, Context};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageArgs,
        CreateChatCompletionRequestArgs, CreateEmbeddingRequestArgs, Role,
    },
    Client,
};
use async_trait::async_trait;

use crate::embeddings::Embedder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub turns: Vec<ChatTurn>,
    pub temperature: f32,
    pub max_tokens: u16,
}

/// Text generation backend used by the drafter and the chat assistant.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<String>;
}

#[derive(Clone)]
pub struct OpenAI {
    client: Client<OpenAIConfig>,
    chat_model: String,
    embedding_model: String,
}

impl OpenAI {
    pub fn new(api_key: &str, chat_model: &str, embedding_model: &str) -> Self {
        let client = Client::with_config(OpenAIConfig::new().with_api_key(api_key));
        Self {
            client,
            chat_model: chat_model.to_string(),
            embedding_model: embedding_model.to_string(),
        }
    }
}

#[async_trait]
impl Completion for OpenAI {
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<String> {
        let messages = request
            .turns
            .into_iter()
            .map(|turn| {
                let role = match turn.role {
                    TurnRole::System => Role::System,
                    TurnRole::User => Role::User,
                    TurnRole::Assistant => Role::Assistant,
                };
                ChatCompletionRequestMessageArgs::default()
                    .role(role)
                    .content(turn.content)
                    .build()
            })
            .collect::<Result<Vec<ChatCompletionRequestMessage>, _>>()
            .context("Failed to build chat messages")?;

        let req = CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .messages(messages)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens)
            .build()
            .context("Failed to build chat completion request")?;

        let response = self
            .client
            .chat()
            .create(req)
            .await
            .context("Chat completion request failed")?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("Chat completion returned no content"))?;
        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl Embedder for OpenAI {
    async fn embed(&self, inputs: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let req = CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input(inputs.to_vec())
            .build()
            .context("Failed to build embedding request")?;
        let mut data = self
            .client
            .embeddings()
            .create(req)
            .await
            .context("Embedding request failed")?
            .data;
        data.sort_by(|a, b| a.index.cmp(&b.index));

        if data.len() != inputs.len() {
            return Err(anyhow!(
                "Inputs and embeddings len does not match: inputs {}, embeddings: {}",
                inputs.len(),
                data.len()
            ));
        }
        Ok(data.into_iter().map(|e| e.embedding).collect())
    }
}
