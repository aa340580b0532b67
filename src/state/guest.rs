//! Guest portfolio store
//!
//! Ephemeral portfolios keyed by a client-issued session id. A session expires
//! after a fixed inactivity window. Expiry is checked lazily on access: an
//! expired session is dropped and behaves as an empty portfolio.

use super::PortfolioStore;
use crate::error::AssistantError;
use crate::models::Asset;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

pub const DEFAULT_GUEST_TTL_DAYS: i64 = 7;

/// Session count at which starting a new session first sweeps expired ones.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone)]
struct GuestSession {
    assets: BTreeMap<String, Asset>,
    last_active: DateTime<Utc>,
}

impl GuestSession {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            assets: BTreeMap::new(),
            last_active: now,
        }
    }
}

pub struct GuestPortfolioStore {
    sessions: Arc<RwLock<HashMap<String, GuestSession>>>,
    ttl: Duration,
}

impl GuestPortfolioStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::days(DEFAULT_GUEST_TTL_DAYS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Number of sessions currently held, expired or not.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Live session for reading or writing, dropping it first if expired.
    ///
    /// Only writes create a session; reads of an unknown id see nothing.
    fn live_session<'a>(
        &self,
        sessions: &'a mut HashMap<String, GuestSession>,
        session_id: &str,
        create: bool,
    ) -> Option<&'a mut GuestSession> {
        let now = Utc::now();

        let expired = sessions
            .get(session_id)
            .map(|s| now - s.last_active > self.ttl)
            .unwrap_or(false);
        if expired {
            debug!(session_id, "Guest session expired, starting empty");
            sessions.remove(session_id);
        }

        if create && sessions.len() >= PRUNE_THRESHOLD && !sessions.contains_key(session_id) {
            let ttl = self.ttl;
            let before = sessions.len();
            sessions.retain(|_, s| now - s.last_active <= ttl);
            debug!(pruned = before - sessions.len(), "Swept expired guest sessions");
        }

        let session = if create {
            Some(
                sessions
                    .entry(session_id.to_string())
                    .or_insert_with(|| GuestSession::new(now)),
            )
        } else {
            sessions.get_mut(session_id)
        }?;

        session.last_active = now;
        Some(session)
    }

    #[cfg(test)]
    pub(crate) async fn backdate(&self, session_id: &str, by: Duration) {
        if let Some(session) = self.sessions.write().await.get_mut(session_id) {
            session.last_active = session.last_active - by;
        }
    }
}

impl Default for GuestPortfolioStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PortfolioStore for GuestPortfolioStore {
    async fn get(&self, session_id: &str, symbol: &str) -> Result<Option<Asset>> {
        let mut sessions = self.sessions.write().await;
        Ok(self
            .live_session(&mut sessions, session_id, false)
            .and_then(|s| s.assets.get(symbol).cloned()))
    }

    async fn insert(&self, session_id: &str, asset: Asset) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = self
            .live_session(&mut sessions, session_id, true)
            .ok_or_else(|| AssistantError::Store("guest session unavailable".to_string()))?;

        if session.assets.contains_key(&asset.symbol) {
            return Err(AssistantError::Store(format!(
                "asset {} already exists in guest session",
                asset.symbol
            )));
        }
        session.assets.insert(asset.symbol.clone(), asset);
        Ok(())
    }

    async fn update(&self, session_id: &str, asset: Asset) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        match self
            .live_session(&mut sessions, session_id, false)
            .and_then(|s| s.assets.get_mut(&asset.symbol))
        {
            Some(existing) => {
                *existing = asset;
                Ok(())
            }
            None => Err(AssistantError::NotFound(format!(
                "asset {} not held in guest session",
                asset.symbol
            ))),
        }
    }

    async fn delete(&self, session_id: &str, symbol: &str) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        Ok(self
            .live_session(&mut sessions, session_id, false)
            .map(|s| s.assets.remove(symbol).is_some())
            .unwrap_or(false))
    }

    async fn list(&self, session_id: &str) -> Result<Vec<Asset>> {
        let mut sessions = self.sessions.write().await;
        Ok(self
            .live_session(&mut sessions, session_id, false)
            .map(|s| s.assets.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = GuestPortfolioStore::new();
        store
            .insert("s1", Asset::new("AAPL", Decimal::from(1), None))
            .await
            .unwrap();

        assert_eq!(store.list("s1").await.unwrap().len(), 1);
        assert!(store.list("s2").await.unwrap().is_empty());
        // reading an unknown session does not create it
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_expired_session_reads_as_empty() {
        let store = GuestPortfolioStore::new();
        store
            .insert("s1", Asset::new("AAPL", Decimal::from(100), None))
            .await
            .unwrap();

        store.backdate("s1", Duration::days(8)).await;

        assert!(store.get("s1", "AAPL").await.unwrap().is_none());
        assert!(store.list("s1").await.unwrap().is_empty());
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_activity_extends_session() {
        let store = GuestPortfolioStore::new();
        store
            .insert("s1", Asset::new("AAPL", Decimal::from(100), None))
            .await
            .unwrap();

        store.backdate("s1", Duration::days(6)).await;
        assert_eq!(store.list("s1").await.unwrap().len(), 1);

        store.backdate("s1", Duration::days(6)).await;
        assert_eq!(store.list("s1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_new_sessions_sweep_expired_ones() {
        let store = GuestPortfolioStore::new();
        for i in 0..PRUNE_THRESHOLD - 1 {
            let id = format!("old-{}", i);
            store
                .insert(&id, Asset::new("AAPL", Decimal::from(1), None))
                .await
                .unwrap();
            store.backdate(&id, Duration::days(8)).await;
        }
        store
            .insert("live", Asset::new("AAPL", Decimal::from(1), None))
            .await
            .unwrap();
        assert_eq!(store.session_count().await, PRUNE_THRESHOLD);

        store
            .insert("newcomer", Asset::new("MSFT", Decimal::from(1), None))
            .await
            .unwrap();
        assert_eq!(store.session_count().await, 2);
        assert_eq!(store.list("live").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_write_after_expiry_starts_fresh() {
        let store = GuestPortfolioStore::new();
        store
            .insert("s1", Asset::new("AAPL", Decimal::from(100), None))
            .await
            .unwrap();
        store.backdate("s1", Duration::days(30)).await;

        store
            .insert("s1", Asset::new("MSFT", Decimal::from(2), None))
            .await
            .unwrap();

        let symbols: Vec<_> = store
            .list("s1")
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.symbol)
            .collect();
        assert_eq!(symbols, vec!["MSFT".to_string()]);
    }
}
