//! Model delegate seam
//!
//! The generative backend is an external collaborator. This module defines
//! the contract the core consumes, a registry for choosing a provider per
//! query, and the deadline/cancellation wrapper every call goes through.
//! Any failure or timeout is terminal for that call; there is no retry here.

use crate::error::AssistantError;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub mod gemini;
pub use gemini::GeminiDelegate;

/// What the caller needs back from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegatePurpose {
    /// Free-form answer to the user's message.
    Answer,
    /// JSON object completing a partially specified command.
    CompleteCommand,
}

#[derive(Debug, Clone)]
pub struct DelegateRequest {
    pub message: String,
    pub prompt_context: String,
    pub purpose: DelegatePurpose,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateResponse {
    pub content: String,
    pub provider: String,
    pub token_usage: Option<u32>,
}

#[async_trait]
pub trait ModelDelegate: Send + Sync {
    fn provider(&self) -> &str;
    async fn generate(&self, request: &DelegateRequest) -> Result<DelegateResponse>;
}

/// Run one delegate call under a deadline, abandoning it if the caller
/// cancels first.
pub async fn call_with_deadline(
    delegate: &dyn ModelDelegate,
    request: &DelegateRequest,
    timeout: Duration,
    cancellation: Option<&CancellationToken>,
) -> Result<DelegateResponse> {
    let call = async {
        match tokio::time::timeout(timeout, delegate.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(AssistantError::DelegateTimeout(timeout.as_millis() as u64)),
        }
    };

    match cancellation {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(AssistantError::Cancelled),
            result = call => result,
        },
        None => call.await,
    }
}

/// Delegates by provider name, with a default.
pub struct DelegateRegistry {
    delegates: HashMap<String, Arc<dyn ModelDelegate>>,
    default_provider: String,
}

impl DelegateRegistry {
    pub fn new(default: Arc<dyn ModelDelegate>) -> Self {
        let default_provider = default.provider().to_string();
        let mut delegates = HashMap::new();
        delegates.insert(default_provider.clone(), default);
        Self {
            delegates,
            default_provider,
        }
    }

    pub fn register(&mut self, delegate: Arc<dyn ModelDelegate>) {
        self.delegates
            .insert(delegate.provider().to_string(), delegate);
    }

    /// Delegate for the requested provider, or the default.
    pub fn resolve(&self, provider: Option<&str>) -> Arc<dyn ModelDelegate> {
        if let Some(name) = provider {
            if let Some(delegate) = self.delegates.get(&name.to_lowercase()) {
                return delegate.clone();
            }
            warn!(provider = name, default = %self.default_provider, "Unknown provider, using default");
        }
        self.delegates[&self.default_provider].clone()
    }

    pub fn list(&self) -> Vec<&str> {
        self.delegates.keys().map(|s| s.as_str()).collect()
    }
}

/// Offline delegate for development and for running without an API key.
/// Keeps the system functional without a model dependency.
pub struct MockDelegate;

#[async_trait]
impl ModelDelegate for MockDelegate {
    fn provider(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &DelegateRequest) -> Result<DelegateResponse> {
        let content = match request.purpose {
            DelegatePurpose::Answer => format!(
                "I'm running without a live model, so here is general guidance only. \
                 For \"{}\": diversify across sectors, size positions to your risk tolerance, \
                 and review your holdings regularly. This is not financial advice.",
                request.message.trim()
            ),
            // No fields can be inferred offline; the coordinator will ask the user.
            DelegatePurpose::CompleteCommand => "{}".to_string(),
        };

        Ok(DelegateResponse {
            token_usage: Some(((request.message.len() + content.len() + 3) / 4) as u32),
            content,
            provider: self.provider().to_string(),
        })
    }
}
