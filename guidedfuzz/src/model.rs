//! The seam between the guidance layer and a language model transport.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::usage::TokenUsage;

/// The stage of a campaign a model call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Seeds for the initial population.
    Init,
    /// Seeds injected while the population evolves.
    Mutation,
    /// Mutation-strategy requests.
    Strategy,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Mutation => "mutation",
            Phase::Strategy => "strategy",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    /// Ask the transport to constrain output to a single JSON object.
    pub json_output: bool,
    pub phase: Phase,
}

impl ModelRequest {
    pub fn new(phase: Phase, prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature,
            json_output: false,
            phase,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelResponse {
    pub content: String,
    /// Token counts, when the transport reports them.
    pub usage: Option<TokenUsage>,
}

impl ModelResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// A request/response language model. Transport, authentication and
/// timeouts are the implementor's concern; any failure is reported as an
/// error and treated by callers as a failed attempt.
pub trait LanguageModel {
    fn model_name(&self) -> &str {
        "unknown"
    }

    fn complete(&mut self, request: &ModelRequest) -> anyhow::Result<ModelResponse>;
}

impl<M: LanguageModel + ?Sized> LanguageModel for &mut M {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn complete(&mut self, request: &ModelRequest) -> anyhow::Result<ModelResponse> {
        (**self).complete(request)
    }
}

impl<M: LanguageModel + ?Sized> LanguageModel for Box<M> {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn complete(&mut self, request: &ModelRequest) -> anyhow::Result<ModelResponse> {
        (**self).complete(request)
    }
}
