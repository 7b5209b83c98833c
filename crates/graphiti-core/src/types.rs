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

use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::cache::Cache;
use crate::cross_encoder::CrossEncoderClient;
use crate::database::GraphDatabase;
use crate::embedder::EmbedderClient;
use crate::llm_client::LlmClient;

/// Core clients required for Graphiti operations.
///
/// `database` is the sole handle onto graph storage; no caller should hold
/// a driver-specific type directly (see `database::traits::GraphDatabase`).
#[derive(Clone)]
pub struct GraphitiClients {
    pub database: Arc<dyn GraphDatabase + Send + Sync>,
    pub llm_client: Arc<dyn LlmClient + Send + Sync>,
    pub embedder: Arc<dyn EmbedderClient + Send + Sync>,
    pub cross_encoder: Arc<dyn CrossEncoderClient + Send + Sync>,
    pub cache: Arc<dyn Cache + Send + Sync>,
    /// Bounds concurrent LLM + embedder calls (default 10).
    pub llm_semaphore: Arc<Semaphore>,
    /// Bounds concurrent driver calls (default 20).
    pub driver_semaphore: Arc<Semaphore>,
}

impl GraphitiClients {
    pub fn new(
        database: Arc<dyn GraphDatabase + Send + Sync>,
        llm_client: Arc<dyn LlmClient + Send + Sync>,
        embedder: Arc<dyn EmbedderClient + Send + Sync>,
        cross_encoder: Arc<dyn CrossEncoderClient + Send + Sync>,
        cache: Arc<dyn Cache + Send + Sync>,
    ) -> Self {
        Self {
            database,
            llm_client,
            embedder,
            cross_encoder,
            cache,
            llm_semaphore: Arc::new(Semaphore::new(crate::helpers::llm_embedder_concurrency())),
            driver_semaphore: Arc::new(Semaphore::new(crate::helpers::driver_semaphore_limit())),
        }
    }
}

/// Default database name constant
pub const DEFAULT_DATABASE: &str = "neo4j";
