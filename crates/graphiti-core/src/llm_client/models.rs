/*
Copyright 2024, Zep Software, Inc.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use serde::{Deserialize, Serialize};

/// A message in a conversation with an LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Token usage information from LLM responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Prompt-builder messages and LLM-client messages are structurally identical but live in
/// separate modules because `prompts` only ever builds messages, never sends them.
impl From<crate::prompts::models::Message> for Message {
    fn from(message: crate::prompts::models::Message) -> Self {
        Self::new(message.role, message.content)
    }
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
    
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }
    
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
    
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}
