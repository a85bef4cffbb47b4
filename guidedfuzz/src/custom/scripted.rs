use anyhow::{Result, anyhow};
use std::collections::VecDeque;

use crate::model::{LanguageModel, ModelRequest, ModelResponse};
use crate::usage::TokenUsage;

/// A [`LanguageModel`] that replays a fixed script of replies and records
/// every request it receives. Once the script runs out every call fails.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    name: String,
    script: VecDeque<Result<ModelResponse, String>>,
    requests: Vec<ModelRequest>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            name: "scripted".to_string(),
            ..Default::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn respond(mut self, content: impl Into<String>) -> Self {
        self.script.push_back(Ok(ModelResponse::new(content)));
        self
    }

    pub fn respond_with_usage(mut self, content: impl Into<String>, usage: TokenUsage) -> Self {
        self.script
            .push_back(Ok(ModelResponse::new(content).with_usage(usage)));
        self
    }

    /// Queues a transport failure.
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.script.push_back(Err(message.into()));
        self
    }

    pub fn requests(&self) -> &[ModelRequest] {
        &self.requests
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn complete(&mut self, request: &ModelRequest) -> Result<ModelResponse> {
        self.requests.push(request.clone());
        match self.script.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted model has no replies left")),
        }
    }
}
