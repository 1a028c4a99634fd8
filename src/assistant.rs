use std::sync::Arc;

use crate::{
    openai::{ChatTurn, Completion, CompletionRequest},
    types::{Message, Sender},
};

pub const CHAT_TEMPERATURE: f32 = 0.7;
pub const CHAT_MAX_TOKENS: u16 = 500;

const PERSONA: &str = "You are a helpful legal assistant specialized in contract law.";

/// Answers follow-up questions about one stored contract.
pub struct ContractAssistant {
    llm: Arc<dyn Completion>,
}

impl ContractAssistant {
    pub fn new(llm: Arc<dyn Completion>) -> Self {
        Self { llm }
    }

    pub async fn reply(
        &self,
        contract: &str,
        history: &[Message],
        question: &str,
    ) -> anyhow::Result<String> {
        let request = CompletionRequest {
            turns: conversation(contract, history, question),
            temperature: CHAT_TEMPERATURE,
            max_tokens: CHAT_MAX_TOKENS,
        };
        let reply = self.llm.complete(request).await?;
        Ok(reply.trim().to_string())
    }
}

/// Persona and contract first, then prior turns in order, then the question.
pub fn conversation(contract: &str, history: &[Message], question: &str) -> Vec<ChatTurn> {
    let mut turns = Vec::with_capacity(history.len() + 3);
    turns.push(ChatTurn::system(PERSONA));
    turns.push(ChatTurn::system(format!(
        "The user is asking about the following contract:\n\n{contract}"
    )));
    turns.extend(history.iter().map(|m| match m.sender {
        Sender::User => ChatTurn::user(m.content.clone()),
        Sender::Bot => ChatTurn::assistant(m.content.clone()),
    }));
    turns.push(ChatTurn::user(question));
    turns
}
