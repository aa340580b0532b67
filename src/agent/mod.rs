//! Query orchestrator
//!
//! RECEIVED → CLASSIFIED → EXECUTING{deterministic|hybrid|delegated} → COMPLETED
//!
//! `process_query` is the only entry point that reads or changes a
//! portfolio. It always reaches COMPLETED: store, delegate and internal
//! failures, including panics, come back as a result with `success = false`.

use crate::analytics::{self, RiskReport};
use crate::audit::{compute_message_hash, InMemorySessionRecorder, QueryRecord, SessionRecorder};
use crate::classifier::IntentClassifier;
use crate::config::AssistantConfig;
use crate::conversational::ConversationalResponder;
use crate::delegate::{DelegateRegistry, GeminiDelegate, MockDelegate, ModelDelegate};
use crate::error::AssistantError;
use crate::execution::DeterministicExecutor;
use crate::hybrid::HybridCoordinator;
use crate::metrics::{MetricsSnapshot, QueryMetrics};
use crate::models::{
    Asset, Command, ExecutionResult, PortfolioContext, ProcessingDecision, ProcessingType,
    QueryContext,
};
use crate::state::{
    GuestPortfolioStore, InMemoryPortfolioStore, PortfolioStore, PostgresPortfolioStore,
};
use crate::{Result, GENERIC_FALLBACK};
use chrono::Utc;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Main orchestrator that routes each query down one processing path
pub struct Orchestrator {
    executor: DeterministicExecutor,
    hybrid: HybridCoordinator,
    responder: ConversationalResponder,
    delegates: DelegateRegistry,
    recorder: Arc<dyn SessionRecorder>,
    metrics: Arc<QueryMetrics>,
}

impl Orchestrator {
    pub fn new(
        executor: DeterministicExecutor,
        delegates: DelegateRegistry,
        recorder: Arc<dyn SessionRecorder>,
        metrics: Arc<QueryMetrics>,
        delegate_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            hybrid: HybridCoordinator::new(delegate_timeout),
            responder: ConversationalResponder::new(delegate_timeout),
            delegates,
            recorder,
            metrics,
        }
    }

    /// Wire the default components from configuration.
    ///
    /// Uses Postgres for authenticated portfolios when a database URL is set
    /// and the pool can be created, in-memory otherwise. Gemini is the default
    /// delegate when an API key is present; the offline mock is always
    /// registered.
    pub fn from_config(config: &AssistantConfig) -> Result<Self> {
        let authenticated = build_authenticated_store(config.database_url.as_deref());
        let guest: Arc<dyn PortfolioStore> =
            Arc::new(GuestPortfolioStore::with_ttl(config.guest_ttl()));

        let mock: Arc<dyn ModelDelegate> = Arc::new(MockDelegate);
        let delegates = match &config.gemini_api_key {
            Some(key) => {
                let gemini = GeminiDelegate::new(
                    key.clone(),
                    config.gemini_model.clone(),
                    config.delegate_timeout,
                )?;
                info!(model = %config.gemini_model, "Model delegate: gemini");
                let mut registry = DelegateRegistry::new(Arc::new(gemini));
                registry.register(mock);
                registry
            }
            None => {
                warn!("GEMINI_API_KEY not set, using the offline mock delegate");
                DelegateRegistry::new(mock)
            }
        };

        Ok(Self::new(
            DeterministicExecutor::new(authenticated, guest),
            delegates,
            Arc::new(InMemorySessionRecorder::new()),
            Arc::new(QueryMetrics::new()?),
            config.delegate_timeout,
        ))
    }

    /// Side-effect free classification, for monitoring and tooling.
    pub fn classify(&self, message: &str) -> ProcessingDecision {
        IntentClassifier::classify(message)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Metrics in Prometheus text format.
    pub fn metrics_text(&self) -> Result<String> {
        self.metrics.export()
    }

    pub fn providers(&self) -> Vec<&str> {
        self.delegates.list()
    }

    /// Holdings of the portfolio the context selects.
    pub async fn holdings(&self, context: &QueryContext) -> Result<Vec<Asset>> {
        let portfolio = PortfolioContext::from_query(context)?;
        self.executor.holdings(&portfolio).await
    }

    /// Risk metrics for the selected portfolio against caller-supplied
    /// closing prices. Read-only.
    pub async fn risk_report(
        &self,
        context: &QueryContext,
        closes: &HashMap<String, Vec<f64>>,
    ) -> Result<RiskReport> {
        let holdings = self.holdings(context).await?;
        let report = analytics::risk_report(&holdings, closes)?;
        info!(
            assets = report.num_assets,
            unpriced = report.unpriced.len(),
            sharpe_ratio = report.sharpe_ratio,
            "Risk report computed"
        );
        Ok(report)
    }

    /// Process one message. Never fails.
    pub async fn process_query(&self, message: &str, context: &QueryContext) -> ExecutionResult {
        let started = Instant::now();
        let query_id = Uuid::new_v4();
        let portfolio = PortfolioContext::from_query(context);

        debug!(
            %query_id,
            state = "received",
            guest = context.is_guest_mode,
            chars = message.len(),
            "Query received"
        );

        let decision = match std::panic::catch_unwind(|| IntentClassifier::classify(message)) {
            Ok(decision) => decision,
            Err(_) => {
                error!(%query_id, "Classifier panicked");
                let mut result =
                    ExecutionResult::failure(GENERIC_FALLBACK, ProcessingType::Delegated);
                result.confidence = 0.0;
                return self
                    .complete(query_id, message, &portfolio, result, started)
                    .await;
            }
        };

        info!(
            %query_id,
            state = "classified",
            processing_type = %decision.processing_type,
            confidence = decision.confidence,
            "Query classified"
        );

        let outcome = AssertUnwindSafe(self.execute(&decision, message, context, &portfolio))
            .catch_unwind()
            .await;

        let mut result = match outcome {
            Ok(result) => result,
            Err(_) => {
                error!(
                    %query_id,
                    processing_type = %decision.processing_type,
                    "Query processing panicked"
                );
                let mut failed = ExecutionResult::failure(GENERIC_FALLBACK, decision.processing_type);
                failed.metadata.extracted_command = decision.command.clone();
                failed.metadata.assets_affected = attempted_symbol(&decision)
                    .map(|symbol| vec![symbol.to_string()])
                    .unwrap_or_default();
                failed
            }
        };

        result.processing_type = decision.processing_type;
        result.confidence = decision.confidence;
        if result.metadata.extracted_command.is_none() {
            result.metadata.extracted_command = decision.command.clone();
        }

        self.complete(query_id, message, &portfolio, result, started)
            .await
    }

    async fn execute(
        &self,
        decision: &ProcessingDecision,
        message: &str,
        context: &QueryContext,
        portfolio: &Result<PortfolioContext>,
    ) -> ExecutionResult {
        info!(
            state = "executing",
            processing_type = %decision.processing_type,
            "Executing query"
        );
        let cancellation = context.cancellation.as_ref();

        match decision.processing_type {
            ProcessingType::Deterministic | ProcessingType::Hybrid => {
                let portfolio = match portfolio {
                    Ok(portfolio) => portfolio,
                    Err(e) => {
                        warn!(error = %e, "No portfolio for command");
                        return ExecutionResult::failure(
                            e.user_message(),
                            decision.processing_type,
                        );
                    }
                };

                match (&decision.command, &decision.draft) {
                    (Some(command), _) => {
                        self.executor
                            .execute_with_cancellation(command, portfolio, cancellation)
                            .await
                    }
                    (None, Some(draft)) => {
                        let delegate = self.delegates.resolve(context.provider.as_deref());
                        self.hybrid
                            .resolve(
                                draft,
                                message,
                                delegate.as_ref(),
                                &self.executor,
                                portfolio,
                                cancellation,
                            )
                            .await
                    }
                    (None, None) => {
                        let e = AssistantError::Internal(
                            "decision without command or draft".to_string(),
                        );
                        warn!(error = %e, "Malformed processing decision");
                        ExecutionResult::failure(e.user_message(), decision.processing_type)
                    }
                }
            }
            ProcessingType::Delegated => {
                let holdings = match (portfolio, &context.portfolio_data) {
                    (Ok(portfolio), None) => match self.executor.holdings(portfolio).await {
                        Ok(assets) => Some(assets),
                        Err(e) => {
                            warn!(error = %e, "Holdings unavailable for delegated prompt");
                            None
                        }
                    },
                    _ => None,
                };
                let delegate = self.delegates.resolve(context.provider.as_deref());
                self.responder
                    .respond(message, context, holdings.as_deref(), delegate.as_ref())
                    .await
            }
        }
    }

    async fn complete(
        &self,
        query_id: Uuid,
        message: &str,
        portfolio: &Result<PortfolioContext>,
        mut result: ExecutionResult,
        started: Instant,
    ) -> ExecutionResult {
        result.execution_time_ms = started.elapsed().as_millis() as u64;

        let portfolio_key = match portfolio {
            Ok(portfolio) => portfolio.key(),
            Err(_) => "unknown".to_string(),
        };

        let record = QueryRecord {
            record_id: query_id,
            message_hash: compute_message_hash(&portfolio_key, message),
            portfolio_key,
            processing_type: result.processing_type,
            success: result.success,
            confidence: result.confidence,
            portfolio_modified: result.metadata.portfolio_modified,
            execution_time_ms: result.execution_time_ms,
            created_at: Utc::now(),
        };
        if let Err(e) = self.recorder.record(record).await {
            warn!(%query_id, error = %e, "Session recorder failed, result unaffected");
        }

        self.metrics.observe(&result);

        info!(
            %query_id,
            state = "completed",
            processing_type = %result.processing_type,
            success = result.success,
            db_operations = result.metadata.db_operations,
            execution_time_ms = result.execution_time_ms,
            "Query completed"
        );

        result
    }
}

/// Symbol the decision was about to act on, if any.
fn attempted_symbol(decision: &ProcessingDecision) -> Option<&str> {
    decision
        .command
        .as_ref()
        .and_then(Command::symbol)
        .or_else(|| decision.draft.as_ref().map(|draft| draft.symbol.as_str()))
}

fn build_authenticated_store(database_url: Option<&str>) -> Arc<dyn PortfolioStore> {
    if let Some(url) = database_url {
        match PostgresPortfolioStore::connect_lazy(url) {
            Ok(store) => return Arc::new(store),
            Err(error) => {
                warn!(
                    "Failed to initialize postgres portfolio store, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Portfolio store backend: in-memory");
    Arc::new(InMemoryPortfolioStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::testing::FailingRecorder;
    use crate::audit::InMemorySessionRecorder;
    use crate::delegate::testing::{Reply, ScriptedDelegate};
    use crate::state::testing::PanickingStore;
    use rust_decimal::Decimal;
    use tokio_util::sync::CancellationToken;

    fn orchestrator_with(delegate: Arc<dyn ModelDelegate>) -> Orchestrator {
        orchestrator_with_recorder(delegate, Arc::new(InMemorySessionRecorder::new()))
    }

    fn orchestrator_with_recorder(
        delegate: Arc<dyn ModelDelegate>,
        recorder: Arc<dyn SessionRecorder>,
    ) -> Orchestrator {
        Orchestrator::new(
            DeterministicExecutor::new(
                Arc::new(InMemoryPortfolioStore::new()),
                Arc::new(GuestPortfolioStore::new()),
            ),
            DelegateRegistry::new(delegate),
            recorder,
            Arc::new(QueryMetrics::new().unwrap()),
            Duration::from_millis(200),
        )
    }

    fn orchestrator() -> Orchestrator {
        orchestrator_with(Arc::new(MockDelegate))
    }

    fn orchestrator_with_guest_store(guest: Arc<dyn PortfolioStore>) -> Orchestrator {
        Orchestrator::new(
            DeterministicExecutor::new(Arc::new(InMemoryPortfolioStore::new()), guest),
            DelegateRegistry::new(Arc::new(MockDelegate)),
            Arc::new(InMemorySessionRecorder::new()),
            Arc::new(QueryMetrics::new().unwrap()),
            Duration::from_millis(200),
        )
    }

    async fn position(orch: &Orchestrator, context: &QueryContext, symbol: &str) -> Option<Asset> {
        orch.holdings(context)
            .await
            .unwrap()
            .into_iter()
            .find(|a| a.symbol == symbol)
    }

    #[tokio::test]
    async fn test_scenarios_add_show_update() {
        let orch = orchestrator();
        let guest = QueryContext::guest("scenario-a");

        let added = orch
            .process_query("add 100 shares of AAPL at $150 per share", &guest)
            .await;
        assert!(added.success);
        assert_eq!(added.processing_type, ProcessingType::Deterministic);
        assert!(added.confidence >= 0.9);
        assert!(added.metadata.extracted_command.is_some());
        let aapl = position(&orch, &guest, "AAPL").await.unwrap();
        assert_eq!(aapl.quantity, Decimal::from(100));
        assert_eq!(aapl.avg_cost, Some(Decimal::from(150)));

        let shown = orch.process_query("show my AAPL position", &guest).await;
        assert!(shown.success);
        assert!(shown.content.contains("100 shares"));
        assert!(shown.content.contains("$150.00"));
        assert!(!shown.metadata.portfolio_modified);

        let updated = orch
            .process_query("update AAPL quantity to 150", &guest)
            .await;
        assert!(updated.success);
        let aapl = position(&orch, &guest, "AAPL").await.unwrap();
        assert_eq!(aapl.quantity, Decimal::from(150));
        assert_eq!(aapl.avg_cost, Some(Decimal::from(150)));
    }

    #[tokio::test]
    async fn test_remove_unheld_symbol() {
        let orch = orchestrator();
        let result = orch
            .process_query("remove TSLA from my portfolio", &QueryContext::guest("fresh"))
            .await;
        assert!(!result.success);
        assert_eq!(result.processing_type, ProcessingType::Deterministic);
        assert!(result.content.contains("TSLA"));
        assert_eq!(result.metadata.db_operations, 0);
    }

    #[tokio::test]
    async fn test_hybrid_applies_no_mutation() {
        let orch = orchestrator();
        let guest = QueryContext::guest("hybrid");
        let result = orch.process_query("add some GOOGL", &guest).await;

        assert_eq!(result.processing_type, ProcessingType::Hybrid);
        assert!(!result.success);
        assert!(!result.metadata.portfolio_modified);
        assert!(!result.content.is_empty());
        assert!(orch.holdings(&guest).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delegated_question() {
        let delegate = Arc::new(ScriptedDelegate::new(vec![Reply::Text(
            "Spread exposure across several large tech names.".to_string(),
        )]));
        let orch = orchestrator_with(delegate.clone());

        let result = orch
            .process_query(
                "What's the best investment strategy for tech stocks?",
                &QueryContext::user("u1"),
            )
            .await;

        assert_eq!(result.processing_type, ProcessingType::Delegated);
        assert!(result.success);
        assert_eq!(result.metadata.delegate_provider.as_deref(), Some("scripted"));
        assert_eq!(delegate.call_count(), 1);
    }

    #[tokio::test]
    async fn test_delegate_failure_and_timeout_are_contained() {
        let delegate = Arc::new(ScriptedDelegate::new(vec![
            Reply::Fail("upstream 500".to_string()),
            Reply::Slow(Duration::from_secs(2), "too late".to_string()),
        ]));
        let orch = orchestrator_with(delegate);
        let context = QueryContext::user("u1");

        for _ in 0..2 {
            let result = orch.process_query("explain dollar cost averaging", &context).await;
            assert!(!result.success);
            assert_eq!(result.processing_type, ProcessingType::Delegated);
            assert_eq!(result.content, GENERIC_FALLBACK);
        }
    }

    #[tokio::test]
    async fn test_show_is_idempotent_add_is_not() {
        let orch = orchestrator();
        let guest = QueryContext::guest("idem");

        orch.process_query("add 100 MSFT", &guest).await;
        orch.process_query("add 100 MSFT", &guest).await;
        let msft = position(&orch, &guest, "MSFT").await.unwrap();
        assert_eq!(msft.quantity, Decimal::from(200));

        let first = orch.process_query("show my portfolio", &guest).await;
        let second = orch.process_query("show my portfolio", &guest).await;
        assert!(first.success);
        assert_eq!(first.content, second.content);
    }

    #[tokio::test]
    async fn test_concurrent_adds_on_one_portfolio() {
        let orch = Arc::new(orchestrator());
        let guest = QueryContext::guest("race");

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let orch = orch.clone();
                let guest = guest.clone();
                tokio::spawn(async move { orch.process_query("add 50 AAPL", &guest).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().success);
        }

        let aapl = position(&orch, &guest, "AAPL").await.unwrap();
        assert_eq!(aapl.quantity, Decimal::from(100));
    }

    #[tokio::test]
    async fn test_missing_identity() {
        let orch = orchestrator();
        let anonymous = QueryContext::default();

        let command = orch.process_query("add 10 AAPL", &anonymous).await;
        assert!(!command.success);
        assert_eq!(command.processing_type, ProcessingType::Deterministic);

        // Questions need no portfolio.
        let question = orch.process_query("how risky is tech", &anonymous).await;
        assert!(question.success);
        assert_eq!(question.processing_type, ProcessingType::Delegated);
    }

    #[tokio::test]
    async fn test_recorder_failure_does_not_change_result() {
        let orch = orchestrator_with_recorder(Arc::new(MockDelegate), Arc::new(FailingRecorder));
        let result = orch
            .process_query("add 1 BTC at $60000", &QueryContext::guest("rec"))
            .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_queries_are_recorded_and_counted() {
        let recorder = Arc::new(InMemorySessionRecorder::new());
        let orch = orchestrator_with_recorder(Arc::new(MockDelegate), recorder.clone());
        let guest = QueryContext::guest("audit");

        orch.process_query("add 3 ETH at $2000", &guest).await;
        orch.process_query("show my portfolio", &guest).await;

        let records = recorder.list_for_portfolio("guest:audit").await;
        assert_eq!(records.len(), 2);
        assert!(recorder
            .verify_message(records[0].record_id, "add 3 ETH at $2000")
            .await);

        let snapshot = orch.metrics();
        assert_eq!(snapshot.total_queries, 2);
        assert_eq!(snapshot.deterministic, 2);
        assert_eq!(snapshot.portfolio_mutations, 1);
    }

    #[tokio::test]
    async fn test_cancelled_hybrid_applies_nothing() {
        let delegate = Arc::new(ScriptedDelegate::new(vec![Reply::Slow(
            Duration::from_millis(100),
            r#"{"quantity": 10}"#.to_string(),
        )]));
        let orch = orchestrator_with(delegate);
        let token = CancellationToken::new();
        let mut guest = QueryContext::guest("cancel");
        guest.cancellation = Some(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });
        let result = orch.process_query("add some GOOGL", &guest).await;
        canceller.await.unwrap();

        assert!(!result.success);
        assert_eq!(result.processing_type, ProcessingType::Hybrid);
        assert!(orch.holdings(&guest).await.unwrap().is_empty());
    }

    #[test]
    fn test_from_config_without_key_uses_mock() {
        let orch = Orchestrator::from_config(&AssistantConfig::default()).unwrap();
        assert_eq!(orch.providers(), vec!["mock"]);
    }

    #[test]
    fn test_classify_is_pure() {
        let orch = orchestrator();
        let decision = orch.classify("add some GOOGL");
        assert_eq!(decision.processing_type, ProcessingType::Hybrid);
        assert_eq!(orch.metrics().total_queries, 0);
    }

    #[tokio::test]
    async fn test_questions_containing_commands_change_nothing() {
        let orch = orchestrator();
        let guest = QueryContext::guest("curious");
        assert!(orch.process_query("add 100 TSLA", &guest).await.success);

        for question in [
            "Should I sell TSLA?",
            "What if I buy 10 AAPL?",
            "why did I buy 5 NVDA at $100?",
        ] {
            let result = orch.process_query(question, &guest).await;
            assert_eq!(result.processing_type, ProcessingType::Delegated, "{}", question);
            assert!(!result.metadata.portfolio_modified, "{}", question);
            assert_eq!(result.metadata.db_operations, 0, "{}", question);
        }

        let holdings = orch.holdings(&guest).await.unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].symbol, "TSLA");
        assert_eq!(holdings[0].quantity, Decimal::from(100));
    }

    #[tokio::test]
    async fn test_hybrid_remove_never_defaults_to_whole_position() {
        let delegate = Arc::new(ScriptedDelegate::new(vec![Reply::Text(
            r#"{"quantity": null, "price": null, "clarification": null}"#.to_string(),
        )]));
        let orch = orchestrator_with(delegate.clone());
        let guest = QueryContext::guest("partial-sell");
        orch.process_query("add 100 TSLA", &guest).await;

        let result = orch.process_query("sell a few of my TSLA", &guest).await;
        assert_eq!(result.processing_type, ProcessingType::Hybrid);
        assert!(!result.success);
        assert!(!result.metadata.portfolio_modified);
        assert_eq!(delegate.call_count(), 1);

        let tsla = position(&orch, &guest, "TSLA").await.unwrap();
        assert_eq!(tsla.quantity, Decimal::from(100));
    }

    #[tokio::test]
    async fn test_expired_guest_session_reads_empty() {
        let store = Arc::new(GuestPortfolioStore::new());
        let orch = orchestrator_with_guest_store(store.clone());
        let guest = QueryContext::guest("stale");
        orch.process_query("add 10 AAPL at $100", &guest).await;
        store.backdate("stale", chrono::Duration::days(8)).await;

        let shown = orch.process_query("show my portfolio", &guest).await;
        assert!(shown.success);
        assert_eq!(shown.content, "You hold no positions yet.");

        let removed = orch.process_query("remove AAPL", &guest).await;
        assert!(!removed.success);
        assert_eq!(removed.processing_type, ProcessingType::Deterministic);
        assert!(removed.content.contains("don't have a position in AAPL"));
    }

    #[tokio::test]
    async fn test_large_positions_do_not_break_show() {
        let orch = orchestrator();
        let guest = QueryContext::guest("whale");

        let added = orch
            .process_query(
                "add 1000000000000000 shares of AAPL at $1000000000000000",
                &guest,
            )
            .await;
        assert!(added.success);

        for message in ["show my portfolio", "show my AAPL position"] {
            let shown = orch.process_query(message, &guest).await;
            assert!(shown.success, "{}", message);
            assert_ne!(shown.content, GENERIC_FALLBACK, "{}", message);
        }
    }

    #[tokio::test]
    async fn test_panic_keeps_attempted_work_in_metadata() {
        let orch = orchestrator_with_guest_store(Arc::new(PanickingStore));
        let guest = QueryContext::guest("boom");

        let result = orch.process_query("add 10 AAPL at $150", &guest).await;
        assert!(!result.success);
        assert_eq!(result.content, GENERIC_FALLBACK);
        assert_eq!(result.processing_type, ProcessingType::Deterministic);
        assert_eq!(result.metadata.assets_affected, vec!["AAPL".to_string()]);
        assert!(matches!(
            result.metadata.extracted_command,
            Some(Command::Add { .. })
        ));
        assert!(!result.metadata.portfolio_modified);

        let orch = orchestrator_with(Arc::new(ScriptedDelegate::new(vec![Reply::Panic])));
        let result = orch
            .process_query("add some GOOGL", &QueryContext::guest("boom"))
            .await;
        assert!(!result.success);
        assert_eq!(result.processing_type, ProcessingType::Hybrid);
        assert_eq!(result.metadata.assets_affected, vec!["GOOGL".to_string()]);
        assert_eq!(orch.metrics().failed_queries, 1);
    }

    #[tokio::test]
    async fn test_risk_report_reads_holdings() {
        let orch = orchestrator();
        let guest = QueryContext::guest("risk");
        orch.process_query("add 10 AAPL at $100", &guest).await;

        let closes = HashMap::from([("AAPL".to_string(), vec![100.0, 110.0, 99.0])]);
        let report = orch.risk_report(&guest, &closes).await.unwrap();
        assert_eq!(report.num_assets, 1);
        assert_eq!(report.total_value, 990.0);
        assert_eq!(report.max_drawdown, -10.0);

        let empty = orch
            .risk_report(&QueryContext::guest("nobody"), &closes)
            .await;
        assert!(matches!(empty, Err(AssistantError::NotFound(_))));
    }

    #[test]
    fn test_metrics_export() {
        let orch = orchestrator();
        assert!(orch
            .metrics_text()
            .unwrap()
            .contains("assistant_portfolio_mutations_total"));
    }
}
