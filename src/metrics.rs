//! Prometheus metrics for query processing

use crate::error::AssistantError;
use crate::models::{ExecutionResult, ProcessingType};
use crate::Result;
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, Encoder, HistogramVec, IntCounter, IntCounterVec,
    Registry, TextEncoder,
};
use serde::Serialize;

const PROCESSING_TYPES: [ProcessingType; 3] = [
    ProcessingType::Deterministic,
    ProcessingType::Hybrid,
    ProcessingType::Delegated,
];

/// Query metrics on a private registry
pub struct QueryMetrics {
    queries_total: IntCounterVec,
    portfolio_mutations_total: IntCounter,
    db_operations_total: IntCounter,
    cache_hits_total: IntCounter,
    delegate_tokens_total: IntCounter,
    query_duration_seconds: HistogramVec,
    registry: Registry,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_queries: u64,
    pub successful_queries: u64,
    pub failed_queries: u64,
    pub deterministic: u64,
    pub hybrid: u64,
    pub delegated: u64,
    pub portfolio_mutations: u64,
    pub db_operations: u64,
    pub cache_hits: u64,
    pub delegate_tokens: u64,
    pub average_time_ms: f64,
}

impl QueryMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let queries_total = register_int_counter_vec_with_registry!(
            "assistant_queries_total",
            "Queries processed by processing type and outcome",
            &["processing_type", "outcome"],
            registry
        )?;

        let portfolio_mutations_total = register_int_counter_with_registry!(
            "assistant_portfolio_mutations_total",
            "Queries that changed a portfolio",
            registry
        )?;

        let db_operations_total = register_int_counter_with_registry!(
            "assistant_db_operations_total",
            "Portfolio store writes",
            registry
        )?;

        let cache_hits_total = register_int_counter_with_registry!(
            "assistant_cache_hits_total",
            "Queries answered from a cache",
            registry
        )?;

        let delegate_tokens_total = register_int_counter_with_registry!(
            "assistant_delegate_tokens_total",
            "Tokens reported by model delegates",
            registry
        )?;

        let query_duration_seconds = register_histogram_vec_with_registry!(
            "assistant_query_duration_seconds",
            "End-to-end query latency in seconds",
            &["processing_type"],
            vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0],
            registry
        )?;

        Ok(Self {
            queries_total,
            portfolio_mutations_total,
            db_operations_total,
            cache_hits_total,
            delegate_tokens_total,
            query_duration_seconds,
            registry,
        })
    }

    pub fn observe(&self, result: &ExecutionResult) {
        let processing_type = result.processing_type.to_string();
        let outcome = if result.success { "success" } else { "failure" };

        self.queries_total
            .with_label_values(&[processing_type.as_str(), outcome])
            .inc();
        self.query_duration_seconds
            .with_label_values(&[processing_type.as_str()])
            .observe(result.execution_time_ms as f64 / 1000.0);

        if result.metadata.portfolio_modified {
            self.portfolio_mutations_total.inc();
        }
        if result.metadata.cache_hit {
            self.cache_hits_total.inc();
        }
        self.db_operations_total
            .inc_by(u64::from(result.metadata.db_operations));
        if let Some(tokens) = result.metadata.delegate_tokens {
            self.delegate_tokens_total.inc_by(u64::from(tokens));
        }
    }

    fn count(&self, processing_type: ProcessingType, outcome: &str) -> u64 {
        let label = processing_type.to_string();
        self.queries_total
            .with_label_values(&[label.as_str(), outcome])
            .get()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let per_type = |processing_type: ProcessingType| {
            self.count(processing_type, "success") + self.count(processing_type, "failure")
        };
        let successful: u64 = PROCESSING_TYPES
            .iter()
            .map(|t| self.count(*t, "success"))
            .sum();
        let failed: u64 = PROCESSING_TYPES
            .iter()
            .map(|t| self.count(*t, "failure"))
            .sum();
        let total = successful + failed;

        let seconds: f64 = PROCESSING_TYPES
            .iter()
            .map(|t| {
                let label = t.to_string();
                self.query_duration_seconds
                    .with_label_values(&[label.as_str()])
                    .get_sample_sum()
            })
            .sum();

        MetricsSnapshot {
            total_queries: total,
            successful_queries: successful,
            failed_queries: failed,
            deterministic: per_type(ProcessingType::Deterministic),
            hybrid: per_type(ProcessingType::Hybrid),
            delegated: per_type(ProcessingType::Delegated),
            portfolio_mutations: self.portfolio_mutations_total.get(),
            db_operations: self.db_operations_total.get(),
            cache_hits: self.cache_hits_total.get(),
            delegate_tokens: self.delegate_tokens_total.get(),
            average_time_ms: if total == 0 {
                0.0
            } else {
                (seconds * 1000.0 / total as f64 * 100.0).round() / 100.0
            },
        }
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| AssistantError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts_by_type() {
        let metrics = QueryMetrics::new().unwrap();
        assert_eq!(metrics.snapshot().average_time_ms, 0.0);

        let mut ok = ExecutionResult::new(true, "done", ProcessingType::Deterministic);
        ok.execution_time_ms = 10;
        ok.metadata.portfolio_modified = true;
        ok.metadata.db_operations = 1;
        metrics.observe(&ok);

        let mut failed = ExecutionResult::failure("no", ProcessingType::Delegated);
        failed.execution_time_ms = 30;
        failed.metadata.delegate_tokens = Some(100);
        metrics.observe(&failed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_queries, 2);
        assert_eq!(snapshot.successful_queries, 1);
        assert_eq!(snapshot.failed_queries, 1);
        assert_eq!(snapshot.db_operations, 1);
        assert_eq!(snapshot.cache_hits, 0);
        assert_eq!(snapshot.deterministic, 1);
        assert_eq!(snapshot.delegated, 1);
        assert_eq!(snapshot.hybrid, 0);
        assert_eq!(snapshot.portfolio_mutations, 1);
        assert_eq!(snapshot.delegate_tokens, 100);
        assert_eq!(snapshot.average_time_ms, 20.0);
    }

    #[test]
    fn test_export_uses_prometheus_text_format() {
        let metrics = QueryMetrics::new().unwrap();
        metrics.observe(&ExecutionResult::new(true, "ok", ProcessingType::Hybrid));

        let text = metrics.export().unwrap();
        assert!(text.contains("# TYPE assistant_queries_total counter"));
        assert!(text.lines().any(|line| {
            line.starts_with("assistant_queries_total{")
                && line.contains(r#"processing_type="hybrid""#)
                && line.contains(r#"outcome="success""#)
                && line.ends_with(" 1")
        }));
        assert!(text.contains("assistant_query_duration_seconds_bucket"));
    }

    #[test]
    fn test_registries_are_independent() {
        let a = QueryMetrics::new().unwrap();
        let b = QueryMetrics::new().unwrap();
        a.observe(&ExecutionResult::new(true, "ok", ProcessingType::Delegated));
        assert_eq!(a.snapshot().total_queries, 1);
        assert_eq!(b.snapshot().total_queries, 0);
    }
}
