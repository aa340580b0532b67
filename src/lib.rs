//! Portfolio Assistant
//!
//! Natural-language portfolio management core:
//! - Classifies each message as a deterministic command, a partial command,
//!   or an open question
//! - Applies complete commands to the authenticated or guest portfolio
//!   without involving a model
//! - Completes partial commands through the model delegate, never by guessing
//! - Answers everything else through the model delegate
//!
//! FLOW:
//! RECEIVED → CLASSIFIED → EXECUTING → COMPLETED

pub mod agent;
pub mod analytics;
pub mod api;
pub mod audit;
pub mod classifier;
pub mod config;
pub mod conversational;
pub mod delegate;
pub mod error;
pub mod execution;
pub mod hybrid;
pub mod metrics;
pub mod models;
pub mod state;

pub use error::{AssistantError, Result};

// Re-export common types
pub use models::*;
pub use agent::Orchestrator;
pub use classifier::IntentClassifier;
pub use config::AssistantConfig;

/// Returned whenever a query fails for a reason the user cannot act on.
pub const GENERIC_FALLBACK: &str = "I'm having trouble processing this, please try again.";
