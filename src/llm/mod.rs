//! Remote chat-completion models

pub mod client;
pub mod config;

pub use client::{ChatCompletionClient, CompletionClient};
pub use config::{CompletionConfig, ModelId, ProviderConfig};
