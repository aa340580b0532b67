//! Session recording
//!
//! Every processed query leaves a record: which portfolio it addressed, how
//! it was routed, and whether it succeeded. The raw message is not kept;
//! only its SHA-256 digest, which is enough to check a claimed message
//! against a record later.

use crate::models::ProcessingType;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub record_id: Uuid,
    pub portfolio_key: String,
    pub message_hash: String,
    pub processing_type: ProcessingType,
    pub success: bool,
    pub confidence: f32,
    pub portfolio_modified: bool,
    pub execution_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Sink for query records. Recording is best effort: callers log failures
/// and carry on.
#[async_trait]
pub trait SessionRecorder: Send + Sync {
    async fn record(&self, record: QueryRecord) -> Result<()>;
}

/// Records kept by default before the oldest are evicted.
pub const DEFAULT_RECORD_CAPACITY: usize = 10_000;

#[derive(Default)]
struct RecordLog {
    records: HashMap<Uuid, QueryRecord>,
    order: VecDeque<Uuid>,
}

/// Bounded in-memory recorder. Once full, each new record evicts the oldest.
pub struct InMemorySessionRecorder {
    log: Arc<RwLock<RecordLog>>,
    capacity: usize,
}

impl InMemorySessionRecorder {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RECORD_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            log: Arc::new(RwLock::new(RecordLog::default())),
            capacity: capacity.max(1),
        }
    }

    pub async fn get(&self, record_id: Uuid) -> Option<QueryRecord> {
        self.log.read().await.records.get(&record_id).cloned()
    }

    /// Records for one portfolio, oldest first.
    pub async fn list_for_portfolio(&self, portfolio_key: &str) -> Vec<QueryRecord> {
        let log = self.log.read().await;
        log.order
            .iter()
            .filter_map(|id| log.records.get(id))
            .filter(|record| record.portfolio_key == portfolio_key)
            .cloned()
            .collect()
    }

    /// Whether `message` is the one a record was made for.
    pub async fn verify_message(&self, record_id: Uuid, message: &str) -> bool {
        let log = self.log.read().await;
        match log.records.get(&record_id) {
            Some(record) => compute_message_hash(&record.portfolio_key, message) == record.message_hash,
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.log.read().await.records.len()
    }
}

impl Default for InMemorySessionRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionRecorder for InMemorySessionRecorder {
    async fn record(&self, record: QueryRecord) -> Result<()> {
        let mut log = self.log.write().await;
        let id = record.record_id;
        if log.records.insert(id, record).is_none() {
            log.order.push_back(id);
        }
        while log.order.len() > self.capacity {
            if let Some(oldest) = log.order.pop_front() {
                log.records.remove(&oldest);
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct MessageFingerprint<'a> {
    portfolio_key: &'a str,
    message: &'a str,
}

/// SHA-256 of a message scoped to its portfolio, hex encoded.
/// Streams the JSON form straight into the hasher.
pub fn compute_message_hash(portfolio_key: &str, message: &str) -> String {
    let mut hasher = Sha256::new();
    let fingerprint = MessageFingerprint {
        portfolio_key,
        message,
    };

    if serde_json::to_writer(&mut HashWriter(&mut hasher), &fingerprint).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, message: &str) -> QueryRecord {
        QueryRecord {
            record_id: Uuid::new_v4(),
            portfolio_key: key.to_string(),
            message_hash: compute_message_hash(key, message),
            processing_type: ProcessingType::Deterministic,
            success: true,
            confidence: 0.95,
            portfolio_modified: true,
            execution_time_ms: 3,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_hash_is_stable_and_scoped() {
        let a = compute_message_hash("user:u1", "add 10 AAPL");
        assert_eq!(a.len(), 64);
        assert_eq!(a, compute_message_hash("user:u1", "add 10 AAPL"));
        assert_ne!(a, compute_message_hash("guest:g1", "add 10 AAPL"));
    }

    #[test]
    fn test_unknown_record() {
        let recorder = InMemorySessionRecorder::default();
        let id = Uuid::new_v4();
        assert!(tokio_test::block_on(recorder.get(id)).is_none());
        assert!(!tokio_test::block_on(recorder.verify_message(id, "anything")));
    }

    #[tokio::test]
    async fn test_record_and_verify() {
        let recorder = InMemorySessionRecorder::new();
        let first = record("user:u1", "add 10 AAPL");
        let id = first.record_id;
        recorder.record(first).await.unwrap();
        recorder.record(record("user:u2", "show my portfolio")).await.unwrap();

        assert!(recorder.verify_message(id, "add 10 AAPL").await);
        assert!(!recorder.verify_message(id, "add 11 AAPL").await);
        assert_eq!(recorder.list_for_portfolio("user:u1").await.len(), 1);
        assert_eq!(recorder.len().await, 2);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let recorder = InMemorySessionRecorder::with_capacity(2);
        let first = record("user:u1", "add 1 AAPL");
        let first_id = first.record_id;
        recorder.record(first).await.unwrap();
        recorder.record(record("user:u1", "add 2 AAPL")).await.unwrap();
        recorder.record(record("user:u1", "add 3 AAPL")).await.unwrap();

        assert_eq!(recorder.len().await, 2);
        assert!(recorder.get(first_id).await.is_none());
        let kept: Vec<_> = recorder
            .list_for_portfolio("user:u1")
            .await
            .into_iter()
            .map(|r| r.message_hash)
            .collect();
        assert_eq!(
            kept,
            vec![
                compute_message_hash("user:u1", "add 2 AAPL"),
                compute_message_hash("user:u1", "add 3 AAPL"),
            ]
        );
    }
}
