//! Streaming completion relay
//!
//! Request flow: parse and validate the body, map the history into turns,
//! prepend the system turns, open a streaming upstream request, then hand
//! the upstream body to an abortable pump that feeds the client response.

mod conversation;
mod handler;
mod prompts;
mod stream;
mod upstream;

pub use conversation::{
    ChatRequest, ConversationTurn, MAX_CONTEXT_CHARS, MAX_TURN_CHARS, Role, map_turns,
    truncate_chars,
};
pub use handler::chat_handler;
pub use prompts::{ASSISTANT_PREAMBLE, ChatMessage, DEFAULT_CONTEXT, compose_messages, context_message};
pub use stream::{RelayBody, relay_stream};
pub use upstream::{CompletionRequest, TEMPERATURE, start_completion};
