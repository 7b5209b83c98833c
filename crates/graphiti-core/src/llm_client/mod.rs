pub mod cached;
pub mod client;
pub mod config;
pub mod models;
pub mod openai_client;

pub use cached::CachedLlmClient;
pub use client::{BaseLlmClient, LlmClient};
pub use config::{LlmConfig, ModelSize};
pub use models::{Message, TokenUsage};
pub use openai_client::OpenAiClient;
