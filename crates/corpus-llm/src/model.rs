//! The language model seam used by the classifier and the field filler.

use crate::client::OllamaClient;
use crate::error::{LlmError, LlmResult};
use crate::types::{GenerateOptions, GenerateRequest};
use async_trait::async_trait;
use corpus_config::LlmConfig;
use tracing::debug;

/// Something that turns a prompt into a completion.
///
/// One call is one attempt: implementations bound it with a timeout and do
/// not retry.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send `prompt` and return the raw text of the answer.
    async fn complete(&self, prompt: &str) -> LlmResult<String>;

    /// Model identifier, for logs and error reports.
    fn name(&self) -> &str;
}

/// [`LanguageModel`] backed by an Ollama server.
#[derive(Clone)]
pub struct OllamaModel {
    client: OllamaClient,
    model: String,
    temperature: f32,
}

impl OllamaModel {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.3,
        }
    }

    pub fn from_config(config: &LlmConfig) -> LlmResult<Self> {
        let client = OllamaClient::from_config(config)?;
        Ok(Self::new(client, config.model.clone()).with_temperature(config.temperature))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn client(&self) -> &OllamaClient {
        &self.client
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn complete(&self, prompt: &str) -> LlmResult<String> {
        let request = GenerateRequest::new(&self.model, prompt)
            .with_options(GenerateOptions::new().with_temperature(self.temperature));

        let response = self.client.generate(request).await?;
        debug!(
            "Model {} answered with {} chars",
            self.model,
            response.response.len()
        );

        if response.response.trim().is_empty() {
            return Err(LlmError::EmptyResponse {
                model: self.model.clone(),
            });
        }
        Ok(response.response)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
