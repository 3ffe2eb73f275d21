pub mod context;
pub mod prompts;

mod openai;

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::{AutoblogError, Result};
use crate::retry::RetryPolicy;

pub use context::{GenerateContext, Turn};
pub use openai::OpenAiBackend;

// -- Backend trait ----------------------------------------------------------

/// Trait that all generation backends implement.
///
/// A backend keeps conversation history server-side: callers create a
/// conversation once and then send only new turns against its id.
#[async_trait::async_trait]
pub trait LlmBackend: Send + Sync {
    /// Human-readable name of this backend (e.g. "OpenAI Responses API").
    fn name(&self) -> &str;

    /// Open a new conversation and return its opaque id.
    async fn create_conversation(&self) -> Result<String>;

    /// Send the context's turns on its conversation and return the reply.
    async fn generate(&self, ctx: &GenerateContext<'_>) -> Result<String>;
}

// -- LlmEngine --------------------------------------------------------------

/// Active backend plus the retry policy applied to every call.
pub struct LlmEngine {
    active: Arc<dyn LlmBackend>,
    retry: RetryPolicy,
}

impl LlmEngine {
    /// Build the engine from config.
    ///
    /// The backend is selected by `config.llm.backend` (overridable with the
    /// `LLM_BACKEND` environment variable).  Valid values: `"openai"`.
    pub fn new(config: &Config) -> Result<Self> {
        let active: Arc<dyn LlmBackend> = match config.llm.backend.as_str() {
            "openai" => Arc::new(OpenAiBackend::new(&config.llm)?),
            other => {
                return Err(AutoblogError::Config(format!(
                    "unknown LLM backend \"{other}\" — available: [openai]"
                )));
            }
        };
        info!(backend = %config.llm.backend, name = active.name(), "LLM backend selected");

        Ok(Self::with_backend(active, RetryPolicy::from_config(&config.retry)))
    }

    pub fn with_backend(active: Arc<dyn LlmBackend>, retry: RetryPolicy) -> Self {
        Self { active, retry }
    }

    /// Return a human-readable description of the active backend.
    pub fn backend_info(&self) -> &str {
        self.active.name()
    }

    pub async fn create_conversation(&self) -> Result<String> {
        let backend = self.active.as_ref();
        self.retry
            .run("create_conversation", move || backend.create_conversation())
            .await
    }

    /// Generate a reply, retrying transient failures with backoff.
    pub async fn generate(&self, ctx: &GenerateContext<'_>) -> Result<String> {
        let backend = self.active.as_ref();
        self.retry.run("generate", move || backend.generate(ctx)).await
    }
}
