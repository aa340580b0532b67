//! Core data models for the portfolio assistant

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::error::{AssistantError, ValidationError};

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeHorizon {
    ShortTerm,
    MediumTerm,
    LongTerm,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingType {
    Deterministic,
    Hybrid,
    Delegated,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Stock,
    Etf,
    Crypto,
    Other,
}

const CRYPTO_TICKERS: &[&str] = &["BTC", "ETH", "SOL", "ADA", "DOGE", "XRP", "DOT", "LTC", "AVAX"];

const ETF_TICKERS: &[&str] = &[
    "SPY", "QQQ", "VOO", "VTI", "IWM", "DIA", "VEA", "VWO", "AGG", "BND", "GLD", "ARKK",
];

impl AssetType {
    /// Best-effort classification of a normalized ticker.
    pub fn infer(symbol: &str) -> Self {
        if CRYPTO_TICKERS.contains(&symbol) {
            AssetType::Crypto
        } else if ETF_TICKERS.contains(&symbol) {
            AssetType::Etf
        } else {
            AssetType::Stock
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Stock => "stock",
            AssetType::Etf => "etf",
            AssetType::Crypto => "crypto",
            AssetType::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "stock" => AssetType::Stock,
            "etf" => AssetType::Etf,
            "crypto" => AssetType::Crypto,
            _ => AssetType::Other,
        }
    }
}

//
// ================= Commands =================
//

/// A fully specified portfolio command.
///
/// Each action carries exactly the fields it needs, so a `Show` can never
/// carry a price and an `Update` always has a quantity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Command {
    Add {
        symbol: String,
        quantity: Decimal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        price: Option<Decimal>,
    },
    Remove {
        symbol: String,
        /// `None` removes the whole position.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quantity: Option<Decimal>,
    },
    Update {
        symbol: String,
        quantity: Decimal,
    },
    Show {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        symbol: Option<String>,
    },
}

impl Command {
    pub fn action(&self) -> CommandAction {
        match self {
            Command::Add { .. } => CommandAction::Add,
            Command::Remove { .. } => CommandAction::Remove,
            Command::Update { .. } => CommandAction::Update,
            Command::Show { .. } => CommandAction::Show,
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        match self {
            Command::Add { symbol, .. }
            | Command::Remove { symbol, .. }
            | Command::Update { symbol, .. } => Some(symbol),
            Command::Show { symbol } => symbol.as_deref(),
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Command::Show { .. })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommandAction {
    Add,
    Remove,
    Update,
    Show,
}

impl fmt::Display for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandAction::Add => "add",
            CommandAction::Remove => "remove",
            CommandAction::Update => "update",
            CommandAction::Show => "show",
        };
        write!(f, "{}", s)
    }
}

/// A command whose action and symbol are known but whose numeric fields are
/// missing or failed validation. Only the hybrid path consumes drafts.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CommandDraft {
    pub action: CommandAction,
    pub symbol: String,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    pub issue: ValidationError,
}

impl CommandDraft {
    /// Field the user still has to provide.
    pub fn missing_field(&self) -> &'static str {
        self.issue.field()
    }
}

//
// ================= Classification =================
//

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingDecision {
    pub processing_type: ProcessingType,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<CommandDraft>,
}

impl ProcessingDecision {
    pub fn deterministic(command: Command, confidence: f32) -> Self {
        Self {
            processing_type: ProcessingType::Deterministic,
            confidence,
            command: Some(command),
            draft: None,
        }
    }

    pub fn hybrid(draft: CommandDraft, confidence: f32) -> Self {
        Self {
            processing_type: ProcessingType::Hybrid,
            confidence,
            command: None,
            draft: Some(draft),
        }
    }

    pub fn delegated(confidence: f32) -> Self {
        Self {
            processing_type: ProcessingType::Delegated,
            confidence,
            command: None,
            draft: None,
        }
    }
}

//
// ================= Portfolio =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Asset {
    pub symbol: String,
    pub quantity: Decimal,
    pub avg_cost: Option<Decimal>,
    pub asset_type: AssetType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    pub fn new(symbol: &str, quantity: Decimal, avg_cost: Option<Decimal>) -> Self {
        let now = Utc::now();
        Self {
            symbol: symbol.to_string(),
            quantity,
            avg_cost,
            asset_type: AssetType::infer(symbol),
            created_at: now,
            updated_at: now,
        }
    }

    /// Quantity times average cost, when the cost is known and the product
    /// fits in a `Decimal`.
    pub fn cost_basis(&self) -> Option<Decimal> {
        self.avg_cost.and_then(|cost| cost.checked_mul(self.quantity))
    }
}

/// Which portfolio a query operates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PortfolioContext {
    Authenticated { user_id: String },
    Guest { session_id: String },
}

impl PortfolioContext {
    /// Resolve the portfolio from the caller's context flags.
    pub fn from_query(context: &QueryContext) -> crate::Result<Self> {
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        if context.is_guest_mode {
            non_empty(&context.guest_session_id)
                .map(|session_id| PortfolioContext::Guest { session_id })
                .ok_or_else(|| AssistantError::Context("guest mode without a session id".into()))
        } else {
            non_empty(&context.user_id)
                .map(|user_id| PortfolioContext::Authenticated { user_id })
                .ok_or_else(|| AssistantError::Context("no user id on an authenticated query".into()))
        }
    }

    /// Key used for per-portfolio serialization and records.
    pub fn key(&self) -> String {
        match self {
            PortfolioContext::Authenticated { user_id } => format!("user:{}", user_id),
            PortfolioContext::Guest { session_id } => format!("guest:{}", session_id),
        }
    }

    pub fn owner_id(&self) -> &str {
        match self {
            PortfolioContext::Authenticated { user_id } => user_id,
            PortfolioContext::Guest { session_id } => session_id,
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, PortfolioContext::Guest { .. })
    }
}

//
// ================= Query Context =================
//

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    #[serde(default)]
    pub risk_tolerance: Option<RiskTolerance>,
    #[serde(default)]
    pub time_horizon: Option<TimeHorizon>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryContext {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub guest_session_id: Option<String>,
    #[serde(default)]
    pub is_guest_mode: bool,
    #[serde(default)]
    pub portfolio_data: Option<serde_json::Value>,
    #[serde(default)]
    pub user_preferences: Option<UserPreferences>,
    #[serde(default)]
    pub provider: Option<String>,
    /// Cancelled by the caller when the request is aborted.
    #[serde(skip)]
    pub cancellation: Option<CancellationToken>,
}

impl QueryContext {
    pub fn guest(session_id: impl Into<String>) -> Self {
        Self {
            guest_session_id: Some(session_id.into()),
            is_guest_mode: true,
            ..Default::default()
        }
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }
}

//
// ================= Final Result =================
//

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetadata {
    pub portfolio_modified: bool,
    pub assets_affected: Vec<String>,
    pub db_operations: u32,
    pub cache_hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegate_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegate_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_command: Option<Command>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub content: String,
    pub processing_type: ProcessingType,
    pub confidence: f32,
    pub execution_time_ms: u64,
    pub metadata: ExecutionMetadata,
}

impl ExecutionResult {
    pub fn new(success: bool, content: impl Into<String>, processing_type: ProcessingType) -> Self {
        Self {
            success,
            content: content.into(),
            processing_type,
            confidence: 1.0,
            execution_time_ms: 0,
            metadata: ExecutionMetadata::default(),
        }
    }

    pub fn failure(content: impl Into<String>, processing_type: ProcessingType) -> Self {
        Self::new(false, content, processing_type)
    }
}

impl fmt::Display for RiskTolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskTolerance::Low => "Low",
            RiskTolerance::Medium => "Medium",
            RiskTolerance::High => "High",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for TimeHorizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeHorizon::ShortTerm => "Short-Term",
            TimeHorizon::MediumTerm => "Medium-Term",
            TimeHorizon::LongTerm => "Long-Term",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for ProcessingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessingType::Deterministic => "deterministic",
            ProcessingType::Hybrid => "hybrid",
            ProcessingType::Delegated => "delegated",
        };
        write!(f, "{}", s)
    }
}
