//! Conversational responder
//!
//! Handles everything the classifier could not turn into a portfolio
//! command: questions, advice requests, and anything ambiguous. The message
//! goes to the model delegate together with the caller's portfolio data and
//! preferences. Nothing here touches portfolio state.

use crate::delegate::{call_with_deadline, DelegatePurpose, DelegateRequest, ModelDelegate};
use crate::error::AssistantError;
use crate::execution::render;
use crate::models::{Asset, ExecutionResult, ProcessingType, QueryContext, UserPreferences};
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

/// Upper bound on portfolio JSON forwarded verbatim to the model.
const MAX_PORTFOLIO_CONTEXT_CHARS: usize = 4_000;

pub struct ConversationalResponder {
    timeout: Duration,
}

impl ConversationalResponder {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Answer a delegated message.
    ///
    /// `holdings` is the server-side view of the portfolio, used when the
    /// caller did not send its own `portfolio_data`.
    pub async fn respond(
        &self,
        message: &str,
        context: &QueryContext,
        holdings: Option<&[Asset]>,
        delegate: &dyn ModelDelegate,
    ) -> ExecutionResult {
        let request = DelegateRequest {
            message: message.to_string(),
            prompt_context: build_prompt_context(context, holdings),
            purpose: DelegatePurpose::Answer,
        };

        let mut result = match call_with_deadline(
            delegate,
            &request,
            self.timeout,
            context.cancellation.as_ref(),
        )
        .await
        {
            Ok(response) if !response.content.trim().is_empty() => {
                info!(
                    provider = %response.provider,
                    tokens = ?response.token_usage,
                    "Delegated response received"
                );
                let mut result = ExecutionResult::new(
                    true,
                    response.content.trim(),
                    ProcessingType::Delegated,
                );
                result.metadata.delegate_provider = Some(response.provider);
                result.metadata.delegate_tokens = response.token_usage;
                return result;
            }
            Ok(response) => {
                warn!(provider = %response.provider, "Delegate returned an empty answer");
                ExecutionResult::failure(crate::GENERIC_FALLBACK, ProcessingType::Delegated)
            }
            Err(AssistantError::Cancelled) => ExecutionResult::failure(
                AssistantError::Cancelled.user_message(),
                ProcessingType::Delegated,
            ),
            Err(e) => {
                warn!(provider = delegate.provider(), error = %e, "Delegate call failed");
                ExecutionResult::failure(crate::GENERIC_FALLBACK, ProcessingType::Delegated)
            }
        };

        result.metadata.delegate_provider = Some(delegate.provider().to_string());
        result
    }
}

/// Text block describing the caller's situation for the model.
pub fn build_prompt_context(context: &QueryContext, holdings: Option<&[Asset]>) -> String {
    let mut sections = Vec::new();

    match (&context.portfolio_data, holdings) {
        (Some(data), _) if !data.is_null() => {
            sections.push(format!("Portfolio (client provided):\n{}", portfolio_json(data)));
        }
        (_, Some(assets)) => {
            sections.push(format!("Portfolio:\n{}", render::portfolio_summary(assets)));
        }
        _ => {}
    }

    if let Some(preferences) = &context.user_preferences {
        if let Some(text) = preferences_text(preferences) {
            sections.push(text);
        }
    }

    if context.is_guest_mode {
        sections.push("The user is in a temporary guest session.".to_string());
    }

    sections.join("\n\n")
}

fn portfolio_json(data: &Value) -> String {
    let text = data.to_string();
    if text.len() <= MAX_PORTFOLIO_CONTEXT_CHARS {
        return text;
    }
    let mut cut = MAX_PORTFOLIO_CONTEXT_CHARS;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &text[..cut])
}

fn preferences_text(preferences: &UserPreferences) -> Option<String> {
    let mut lines = Vec::new();
    if let Some(risk) = preferences.risk_tolerance {
        lines.push(format!("- risk tolerance: {}", risk));
    }
    if let Some(horizon) = preferences.time_horizon {
        lines.push(format!("- time horizon: {}", horizon));
    }
    if let Some(notes) = preferences.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        lines.push(format!("- notes: {}", notes.trim()));
    }
    if lines.is_empty() {
        None
    } else {
        Some(format!("Preferences:\n{}", lines.join("\n")))
    }
}
