pub mod client;
pub mod openai_reranker_client;

pub use client::CrossEncoderClient;
pub use openai_reranker_client::OpenAIRerankerClient;
