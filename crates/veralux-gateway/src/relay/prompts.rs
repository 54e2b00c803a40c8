//! System turns prepended to every relayed conversation

use serde::Serialize;

use super::conversation::{ConversationTurn, MAX_CONTEXT_CHARS, Role, truncate_chars};

/// Assistant persona sent as the first system turn
pub const ASSISTANT_PREAMBLE: &str = "You are Lux, the on-site assistant for VeraLux, a Web3 social identity network \
with social feeds, chat circles, wallet and Google sign-in, and marketplace and gaming features. \
Answer questions about VeraLux and how to use the site, and also answer general knowledge questions \
helpfully and accurately. Format answers in lightweight Markdown: short paragraphs, bullet lists \
and inline code where useful. Stay neutral and balanced on political, religious and other sensitive \
topics. Do not give financial, investment, medical or legal advice; suggest consulting a qualified \
professional instead.";

/// Context turn used when the caller supplies none
pub const DEFAULT_CONTEXT: &str = "No page context was provided. For questions about VeraLux, prefer \
information from the VeraLux Help Center and the VeraLux Litepaper. If neither source covers the \
question and you are not sure of the answer, say that you do not know instead of guessing or \
inventing details.";

/// A message in the upstream payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

impl From<&ConversationTurn> for ChatMessage {
    fn from(turn: &ConversationTurn) -> Self {
        Self {
            role: turn.role,
            content: turn.text.clone(),
        }
    }
}

/// Build the context system turn
pub fn context_message(context: Option<&str>) -> ChatMessage {
    match context {
        Some(context) if !context.trim().is_empty() => ChatMessage::system(format!(
            "Page context:\n{}",
            truncate_chars(context, MAX_CONTEXT_CHARS)
        )),
        _ => ChatMessage::system(DEFAULT_CONTEXT),
    }
}

/// Preamble, context turn, then the caller's turns in order
pub fn compose_messages(turns: &[ConversationTurn], context: Option<&str>) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(turns.len() + 2);
    messages.push(ChatMessage::system(ASSISTANT_PREAMBLE));
    messages.push(context_message(context));
    messages.extend(turns.iter().map(ChatMessage::from));
    messages
}
