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

//! Edge date extraction prompts

use std::collections::HashMap;
use crate::prompts::models::{Message, PromptFunction};

/// Extract the valid_at/invalid_at window for a single fact from the episode it was
/// drawn from.
pub fn extract_dates(context: &HashMap<String, serde_json::Value>) -> Vec<Message> {
    let sys_prompt = "You are an AI assistant that extracts temporal information from edge facts.";

    let fact = context.get("fact").and_then(|v| v.as_str()).unwrap_or("");
    let episode_content = context.get("episode_content").and_then(|v| v.as_str()).unwrap_or("");
    let reference_time = context.get("reference_time").and_then(|v| v.as_str()).unwrap_or("");

    let user_prompt = format!(
        r#"
<FACT>
{fact}
</FACT>

<EPISODE CONTENT>
{episode_content}
</EPISODE CONTENT>

<REFERENCE TIME>
{reference_time}
</REFERENCE TIME>

Given the above fact and the episode it was extracted from, determine when the fact started
holding true (valid_at) and, if the episode indicates it has since stopped holding (invalid_at).
Use ISO 8601 format. Use the reference time to resolve relative dates ("last week", "since 2019").

Respond with JSON: {{"valid_at": "<ISO 8601 timestamp or null>", "invalid_at": "<ISO 8601 timestamp or null>"}}.
"#
    );

    vec![Message::system(sys_prompt), Message::user(user_prompt)]
}

/// Available prompt versions for edge date extraction
pub struct ExtractEdgeDatesPrompt {
    pub extract_dates: PromptFunction,
}

impl Default for ExtractEdgeDatesPrompt {
    fn default() -> Self {
        Self { extract_dates }
    }
}
