pub mod cached;
pub mod client;
pub mod openai;

pub use cached::CachedEmbedderClient;
pub use client::{EmbedderClient, EmbedderConfig, EMBEDDING_DIM};
pub use openai::{OpenAiEmbedder, OpenAiEmbedderConfig};
