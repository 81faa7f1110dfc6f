pub mod conversation;
pub mod types;

pub use conversation::{Conversation, SharedConversation, DEFAULT_GREETING, DEFAULT_HISTORY_LIMIT};
pub use types::{Message, Role};
