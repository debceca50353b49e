//! Language-model completion boundary.
//!
//! Agents never talk to a provider directly. They receive an [`LlmHandle`]
//! wrapping a [`CompletionClient`] implementation, the per-run
//! [`UsageTracker`], and the model settings. Every failure surfaces as an
//! [`LlmError`] so callers can fall back to deterministic text.

pub mod client;
pub mod usage;

pub use client::ChatCompletionsClient;
pub use usage::{Pricing, UsageSummary, UsageTracker};

use crate::config::ModelConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure of a completion call.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("completion endpoint is not configured")]
    Unavailable,

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("cannot connect to completion endpoint at {0}")]
    Connect(String),

    #[error("failed to send request: {0}")]
    Transport(String),

    #[error("completion API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("completion returned empty content")]
    EmptyContent,

    #[error("failed to decode completion response: {0}")]
    Decode(String),
}

/// Token counts reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// One completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Text returned by a provider.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// A text-completion provider.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;

    /// False for clients that fail every call without trying.
    fn is_available(&self) -> bool {
        true
    }
}

/// Client used when no endpoint is configured. Every call fails fast.
#[derive(Debug, Default)]
pub struct UnavailableClient;

#[async_trait]
impl CompletionClient for UnavailableClient {
    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, LlmError> {
        Err(LlmError::Unavailable)
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Purpose of a call, used to break down token usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    SchemaDiscovery,
    InsightGeneration,
    Strategy,
    Report,
    Question,
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallType::SchemaDiscovery => write!(f, "schema_discovery"),
            CallType::InsightGeneration => write!(f, "insight_generation"),
            CallType::Strategy => write!(f, "strategy"),
            CallType::Report => write!(f, "report"),
            CallType::Question => write!(f, "question"),
        }
    }
}

/// Output token limits per call type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudgets {
    pub discovery: u32,
    pub insight: u32,
    pub strategy: u32,
    pub report: u32,
    pub question: u32,
}

impl Default for TokenBudgets {
    fn default() -> Self {
        Self {
            discovery: 800,
            insight: 400,
            strategy: 600,
            report: 3000,
            question: 800,
        }
    }
}

impl TokenBudgets {
    pub fn for_call(&self, call_type: CallType) -> u32 {
        match call_type {
            CallType::SchemaDiscovery => self.discovery,
            CallType::InsightGeneration => self.insight,
            CallType::Strategy => self.strategy,
            CallType::Report => self.report,
            CallType::Question => self.question,
        }
    }
}

/// Model parameters shared by every call in a run.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub budgets: TokenBudgets,
}

impl From<&ModelConfig> for LlmSettings {
    fn from(config: &ModelConfig) -> Self {
        Self {
            model: config.name.clone(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_seconds),
            budgets: TokenBudgets {
                discovery: config.discovery_max_tokens,
                insight: config.insight_max_tokens,
                strategy: config.strategy_max_tokens,
                report: config.report_max_tokens,
                question: config.question_max_tokens,
            },
        }
    }
}

/// What agents hold to reach the language model.
#[derive(Clone)]
pub struct LlmHandle {
    client: Arc<dyn CompletionClient>,
    usage: Arc<UsageTracker>,
    settings: LlmSettings,
}

impl LlmHandle {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        usage: Arc<UsageTracker>,
        settings: LlmSettings,
    ) -> Self {
        Self {
            client,
            usage,
            settings,
        }
    }

    /// Handle for one run: the configured client, a fresh usage tracker
    /// priced from the config, and the model settings.
    pub fn from_config(config: &ModelConfig) -> Self {
        let pricing = Pricing {
            input_per_million: config.input_cost_per_million,
            output_per_million: config.output_cost_per_million,
        };
        Self::new(
            client_from_config(config),
            Arc::new(UsageTracker::new(pricing)),
            LlmSettings::from(config),
        )
    }

    /// Send one system/user prompt pair.
    ///
    /// The output budget comes from the call type. The call is bounded by
    /// the configured timeout. Usage is recorded when the provider reports
    /// it. Blank text is an error.
    pub async fn complete(
        &self,
        agent: &str,
        call_type: CallType,
        system: &str,
        user: &str,
    ) -> Result<String, LlmError> {
        let request = CompletionRequest {
            system: system.to_string(),
            user: user.to_string(),
            model: self.settings.model.clone(),
            max_tokens: self.settings.budgets.for_call(call_type),
            temperature: self.settings.temperature,
        };

        debug!(agent, %call_type, "Sending completion request");

        let completion =
            match tokio::time::timeout(self.settings.timeout, self.client.complete(&request)).await
            {
                Ok(result) => result?,
                Err(_) => return Err(LlmError::Timeout(self.settings.timeout.as_secs())),
            };

        if let Some(usage) = completion.usage {
            self.usage
                .record(agent, call_type, &self.settings.model, usage);
        }

        let text = completion.text.trim();
        if text.is_empty() {
            return Err(LlmError::EmptyContent);
        }
        Ok(text.to_string())
    }

    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// True when calls can possibly succeed.
    pub fn is_enabled(&self) -> bool {
        self.client.is_available()
    }
}

/// Build the completion client described by the model configuration.
///
/// Falls back to [`UnavailableClient`] when disabled, unconfigured, or when
/// the HTTP client cannot be built.
pub fn client_from_config(config: &ModelConfig) -> Arc<dyn CompletionClient> {
    if !config.enabled {
        debug!("Language model disabled; using deterministic text only");
        return Arc::new(UnavailableClient);
    }

    let (api_base, api_key) = match (&config.api_base, &config.api_key) {
        (Some(base), Some(key)) if !base.is_empty() && !key.is_empty() => (base, key),
        _ => {
            warn!("No completion endpoint or API key configured; insights will use templates");
            return Arc::new(UnavailableClient);
        }
    };

    match ChatCompletionsClient::new(api_base, api_key, config.timeout_seconds) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!("Failed to build completion client: {}", e);
            Arc::new(UnavailableClient)
        }
    }
}
