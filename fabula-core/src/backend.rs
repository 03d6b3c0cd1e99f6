//! Generation backend capability.
//!
//! The engine treats text generation as a black-box request/response
//! operation. Backends may be slow and may return malformed output;
//! the agents handle retries and parsing, the backend only moves text.

use async_trait::async_trait;
use claude::{Claude, Message, Request};
use thiserror::Error;

/// Errors from a generation backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("API key not configured")]
    NoApiKey,

    #[error("generation provider error: {0}")]
    Provider(String),
}

impl From<claude::Error> for BackendError {
    fn from(error: claude::Error) -> Self {
        match error {
            claude::Error::NoApiKey => BackendError::NoApiKey,
            other => BackendError::Provider(other.to_string()),
        }
    }
}

/// One contextual generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// System instructions (persona, rules, output contract).
    pub system: String,
    /// User context for this turn.
    pub user: String,
    /// Set on retry after a malformed response; backends may trade
    /// creativity for format adherence.
    pub strict: bool,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            strict: false,
        }
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

/// A blocking request/response text generator.
///
/// No partial or streaming semantics: the engine suspends on the call
/// and resumes with the complete raw text.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate raw text for the given request.
    async fn generate(&self, request: GenerationRequest) -> Result<String, BackendError>;

    /// Backend name, for logs.
    fn name(&self) -> &str;
}

/// Generation backend backed by the Claude Messages API.
pub struct ClaudeBackend {
    client: Claude,
    model: Option<String>,
    max_tokens: usize,
    temperature: Option<f32>,
}

impl ClaudeBackend {
    /// Wrap an existing client.
    pub fn new(client: Claude) -> Self {
        Self {
            client,
            model: None,
            max_tokens: 1024,
            temperature: Some(1.0),
        }
    }

    /// Create a backend from the ANTHROPIC_API_KEY environment variable.
    pub fn from_env() -> Result<Self, BackendError> {
        Ok(Self::new(Claude::from_env()?))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[async_trait]
impl GenerationBackend for ClaudeBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<String, BackendError> {
        let mut api_request = Request::new(vec![Message::user(request.user)])
            .with_system(request.system)
            .with_max_tokens(self.max_tokens);

        if let Some(ref model) = self.model {
            api_request = api_request.with_model(model);
        }

        // Strict retries sample greedily to maximize format adherence.
        let temperature = if request.strict {
            Some(0.0)
        } else {
            self.temperature
        };
        if let Some(temp) = temperature {
            api_request = api_request.with_temperature(temp);
        }

        let response = self.client.complete(api_request).await?;
        Ok(response.text)
    }

    fn name(&self) -> &str {
        "claude"
    }
}
