//! Hybrid coordinator
//!
//! Resolves a partially specified command by asking the model delegate, in a
//! single round, for the missing numeric fields. A complete and valid answer
//! is handed to the deterministic executor; anything else ends with a
//! clarifying question and no mutation. Missing values are never defaulted.

use crate::classifier::CommandExtractor;
use crate::delegate::{call_with_deadline, DelegatePurpose, DelegateRequest, ModelDelegate};
use crate::execution::{render, DeterministicExecutor};
use crate::models::{
    CommandAction, CommandDraft, ExecutionResult, PortfolioContext, ProcessingType,
};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct HybridCoordinator {
    timeout: Duration,
}

/// Shape the delegate is asked to reply with.
#[derive(Debug, Default, Deserialize)]
struct CompletionReply {
    #[serde(default)]
    quantity: Option<Value>,
    #[serde(default)]
    price: Option<Value>,
    #[serde(default)]
    clarification: Option<String>,
}

impl HybridCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn resolve(
        &self,
        draft: &CommandDraft,
        message: &str,
        delegate: &dyn ModelDelegate,
        executor: &DeterministicExecutor,
        portfolio: &PortfolioContext,
        cancellation: Option<&CancellationToken>,
    ) -> ExecutionResult {
        let request = DelegateRequest {
            message: message.to_string(),
            prompt_context: self.prompt_context(draft, executor, portfolio).await,
            purpose: DelegatePurpose::CompleteCommand,
        };

        let response = match call_with_deadline(delegate, &request, self.timeout, cancellation).await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(symbol = %draft.symbol, error = %e, "Delegate could not complete command");
                let mut result = clarify(clarifying_prompt(draft));
                result.metadata.delegate_provider = Some(delegate.provider().to_string());
                return result;
            }
        };

        let mut result = match parse_reply(&response.content) {
            Some(reply) => self
                .apply_reply(draft, reply, executor, portfolio, cancellation)
                .await,
            None => {
                debug!(symbol = %draft.symbol, "Delegate reply was not a completion object");
                clarify(clarifying_prompt(draft))
            }
        };

        result.processing_type = ProcessingType::Hybrid;
        result.metadata.delegate_provider = Some(response.provider);
        result.metadata.delegate_tokens = response.token_usage;
        result
    }

    async fn apply_reply(
        &self,
        draft: &CommandDraft,
        reply: CompletionReply,
        executor: &DeterministicExecutor,
        portfolio: &PortfolioContext,
        cancellation: Option<&CancellationToken>,
    ) -> ExecutionResult {
        if let Some(question) = reply
            .clarification
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
        {
            return clarify(question.to_string());
        }

        let quantity = reply.quantity.as_ref().and_then(value_text);
        let price = reply.price.as_ref().and_then(value_text);

        match CommandExtractor::complete(draft, quantity.as_deref(), price.as_deref()) {
            Ok(command) => {
                info!(?command, "Hybrid command completed by delegate");
                let mut result = executor
                    .execute_with_cancellation(&command, portfolio, cancellation)
                    .await;
                result.metadata.extracted_command = Some(command);
                result
            }
            Err(issue) => {
                debug!(%issue, "Delegate completion still invalid");
                clarify(clarifying_prompt(draft))
            }
        }
    }

    async fn prompt_context(
        &self,
        draft: &CommandDraft,
        executor: &DeterministicExecutor,
        portfolio: &PortfolioContext,
    ) -> String {
        let mut context = format!(
            "Partially understood command:\n- action: {}\n- symbol: {}\n- quantity: {}\n- price: {}\n- needs: {}\n",
            draft.action,
            draft.symbol,
            draft
                .quantity
                .map(render::quantity)
                .unwrap_or_else(|| "unknown".to_string()),
            draft
                .price
                .map(render::money)
                .unwrap_or_else(|| "unknown".to_string()),
            draft.missing_field(),
        );

        match executor.holdings(portfolio).await {
            Ok(assets) => {
                match assets.iter().find(|a| a.symbol == draft.symbol) {
                    Some(asset) => context.push_str(&format!(
                        "Current holding: {}\n",
                        render::shares(asset.quantity)
                    )),
                    None => context.push_str("Current holding: none\n"),
                }
            }
            Err(e) => warn!(error = %e, "Holdings unavailable for hybrid prompt"),
        }

        context
    }
}

fn clarify(question: String) -> ExecutionResult {
    ExecutionResult::failure(question, ProcessingType::Hybrid)
}

/// Generic question for the field a draft is missing.
pub fn clarifying_prompt(draft: &CommandDraft) -> String {
    let symbol = &draft.symbol;
    match (draft.missing_field(), draft.action) {
        ("price", _) => format!(
            "What price per share should I record for {}? Prices can have at most two decimal places.",
            symbol
        ),
        (_, CommandAction::Add) => format!(
            "How many shares of {} would you like to add? You can include a price too, e.g. \"add 10 {} at $100\".",
            symbol, symbol
        ),
        (_, CommandAction::Remove) => format!(
            "How many shares of {} would you like to remove? Say \"remove {}\" to close the whole position.",
            symbol, symbol
        ),
        (_, CommandAction::Update) => format!(
            "What quantity of {} should I set? For example, \"update {} quantity to 50\".",
            symbol, symbol
        ),
        (field, CommandAction::Show) => {
            format!("Could you restate that with the {} for {}?", field, symbol)
        }
    }
}

/// Pull the first JSON object out of a reply, tolerating code fences and
/// surrounding prose.
fn parse_reply(content: &str) -> Option<CompletionReply> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&content[start..=end]).ok()
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::testing::{Reply, ScriptedDelegate};
    use crate::models::{Asset, Command};
    use crate::state::{GuestPortfolioStore, InMemoryPortfolioStore};
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn setup() -> (HybridCoordinator, DeterministicExecutor, PortfolioContext) {
        (
            HybridCoordinator::new(Duration::from_secs(1)),
            DeterministicExecutor::new(
                Arc::new(InMemoryPortfolioStore::new()),
                Arc::new(GuestPortfolioStore::new()),
            ),
            PortfolioContext::Guest {
                session_id: "g".to_string(),
            },
        )
    }

    fn googl_draft() -> CommandDraft {
        CommandExtractor::draft_missing_quantity(CommandAction::Add, "GOOGL").unwrap()
    }

    async fn holdings(exec: &DeterministicExecutor, portfolio: &PortfolioContext) -> Vec<Asset> {
        exec.holdings(portfolio).await.unwrap()
    }

    #[tokio::test]
    async fn test_complete_reply_executes() {
        let (hybrid, exec, portfolio) = setup();
        let delegate = ScriptedDelegate::new(vec![Reply::Text(
            "```json\n{\"quantity\": 10, \"price\": \"140.50\", \"clarification\": null}\n```".to_string(),
        )]);

        let result = hybrid
            .resolve(&googl_draft(), "add some GOOGL", &delegate, &exec, &portfolio, None)
            .await;

        assert!(result.success);
        assert_eq!(result.processing_type, ProcessingType::Hybrid);
        assert_eq!(result.metadata.delegate_tokens, Some(42));
        assert_eq!(
            result.metadata.extracted_command,
            Some(Command::Add {
                symbol: "GOOGL".to_string(),
                quantity: Decimal::from(10),
                price: Some(Decimal::new(14050, 2)),
            })
        );
        assert_eq!(holdings(&exec, &portfolio).await.len(), 1);
    }

    #[tokio::test]
    async fn test_clarification_applies_nothing() {
        let (hybrid, exec, portfolio) = setup();
        let delegate = ScriptedDelegate::new(vec![Reply::Text(
            r#"{"quantity": null, "price": null, "clarification": "How many GOOGL shares?"}"#
                .to_string(),
        )]);

        let result = hybrid
            .resolve(&googl_draft(), "add some GOOGL", &delegate, &exec, &portfolio, None)
            .await;

        assert!(!result.success);
        assert_eq!(result.processing_type, ProcessingType::Hybrid);
        assert!(!result.metadata.portfolio_modified);
        assert!(holdings(&exec, &portfolio).await.is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_or_invalid_reply_applies_nothing() {
        let (hybrid, exec, portfolio) = setup();
        let replies = vec![
            Reply::Text("{}".to_string()),
            Reply::Text(r#"{"quantity": "-5"}"#.to_string()),
            Reply::Text(r#"{"quantity": "1.234"}"#.to_string()),
            Reply::Text("Sure, I'd buy a few shares.".to_string()),
        ];
        let count = replies.len();
        let delegate = ScriptedDelegate::new(replies);

        for _ in 0..count {
            let result = hybrid
                .resolve(&googl_draft(), "add some GOOGL", &delegate, &exec, &portfolio, None)
                .await;
            assert!(!result.success);
            assert_eq!(result.processing_type, ProcessingType::Hybrid);
            assert_eq!(result.metadata.db_operations, 0);
        }
        assert!(holdings(&exec, &portfolio).await.is_empty());
    }

    #[tokio::test]
    async fn test_delegate_failure_asks_for_field() {
        let (hybrid, exec, portfolio) = setup();
        let delegate = ScriptedDelegate::new(vec![Reply::Fail("503".to_string())]);

        let result = hybrid
            .resolve(&googl_draft(), "add some GOOGL", &delegate, &exec, &portfolio, None)
            .await;

        assert!(!result.success);
        assert_eq!(result.processing_type, ProcessingType::Hybrid);
        assert!(result.content.contains("GOOGL"));
        assert_eq!(delegate.call_count(), 1);
        assert!(holdings(&exec, &portfolio).await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_delegate_call_applies_nothing() {
        let (hybrid, exec, portfolio) = setup();
        let delegate = ScriptedDelegate::new(vec![Reply::Slow(
            Duration::from_millis(100),
            r#"{"quantity": 5}"#.to_string(),
        )]);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result = hybrid
            .resolve(&googl_draft(), "add some GOOGL", &delegate, &exec, &portfolio, Some(&token))
            .await;

        assert!(!result.success);
        assert!(holdings(&exec, &portfolio).await.is_empty());
    }

    #[test]
    fn test_clarifying_prompts_name_the_symbol() {
        let draft = googl_draft();
        assert!(clarifying_prompt(&draft).contains("How many shares of GOOGL"));

        let mut price_draft = draft.clone();
        price_draft.issue = crate::error::ValidationError::TooPrecise { field: "price" };
        assert!(clarifying_prompt(&price_draft).contains("price"));
    }
}
