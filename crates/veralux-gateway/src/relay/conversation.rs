//! Chat request parsing and conversation-turn mapping
//!
//! Callers send `{ messages: [{ sender, content }], context? }`. The history is
//! mapped into role-tagged turns; nothing about a turn outlives the request.

use serde::Serialize;
use serde_json::Value;

use crate::server::ApiError;

/// Maximum characters kept from a single turn
pub const MAX_TURN_CHARS: usize = 8000;

/// Maximum characters kept from the caller-supplied context
pub const MAX_CONTEXT_CHARS: usize = 12000;

/// Role attached to a message sent upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One mapped message of the caller's history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

impl ConversationTurn {
    /// Map a caller-supplied `{ sender, content }` value.
    ///
    /// `sender: "ai"` becomes an assistant turn, anything else a user turn.
    /// Returns `None` when the truncated content is blank.
    pub fn from_input(input: &Value) -> Option<Self> {
        let role = match input.get("sender").and_then(Value::as_str) {
            Some("ai") => Role::Assistant,
            _ => Role::User,
        };

        let content = coerce_text(input.get("content"));
        let text = truncate_chars(&content, MAX_TURN_CHARS);
        if text.trim().is_empty() {
            return None;
        }

        Some(Self {
            role,
            text: text.to_string(),
        })
    }
}

/// Parsed relay request body
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatRequest {
    /// Raw history entries, in caller order
    pub messages: Vec<Value>,
    /// Optional page context supplied by the caller
    pub context: Option<String>,
}

impl ChatRequest {
    /// Parse and validate a relay request body
    pub fn parse(body: &[u8]) -> Result<Self, ApiError> {
        let value: Value = serde_json::from_slice(body).map_err(|e| {
            tracing::debug!("Rejecting chat request body: {e}");
            ApiError::MalformedRequest("Invalid JSON body".to_string())
        })?;

        let Value::Object(mut fields) = value else {
            return Err(ApiError::InvalidSchema(
                "request body must be a JSON object".to_string(),
            ));
        };

        let messages = match fields.remove("messages") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(ApiError::InvalidSchema(
                    "messages must be an array".to_string(),
                ));
            }
        };

        let context = match fields.remove("context") {
            Some(Value::String(context)) => Some(context),
            _ => None,
        };

        Ok(Self { messages, context })
    }

    /// Map the history into upstream turns
    pub fn turns(&self) -> Vec<ConversationTurn> {
        map_turns(&self.messages)
    }
}

/// Map caller history entries into turns, dropping blank ones
pub fn map_turns(messages: &[Value]) -> Vec<ConversationTurn> {
    messages
        .iter()
        .filter_map(ConversationTurn::from_input)
        .collect()
}

/// Cut `text` to at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn coerce_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}
