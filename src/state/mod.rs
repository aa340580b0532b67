//! Portfolio persistence layer
//!
//! Authenticated portfolios are keyed by user id; guest portfolios by a
//! client-issued session id with an inactivity expiry. Both sit behind the
//! same [`PortfolioStore`] trait so the executor never cares which one it got.

pub mod guest;
pub mod locks;
pub mod postgres;

pub use guest::GuestPortfolioStore;
pub use locks::KeyedLocks;
pub use postgres::PostgresPortfolioStore;

use crate::error::AssistantError;
use crate::models::Asset;
use crate::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// CRUD over the assets of one portfolio owner.
///
/// At most one asset exists per `(owner, symbol)`. Callers serialize
/// read-modify-write sequences per owner with [`KeyedLocks`].
#[async_trait::async_trait]
pub trait PortfolioStore: Send + Sync {
    async fn get(&self, owner: &str, symbol: &str) -> Result<Option<Asset>>;
    /// Fails if the symbol is already held.
    async fn insert(&self, owner: &str, asset: Asset) -> Result<()>;
    /// Fails with `NotFound` if the symbol is not held.
    async fn update(&self, owner: &str, asset: Asset) -> Result<()>;
    /// Returns whether anything was deleted.
    async fn delete(&self, owner: &str, symbol: &str) -> Result<bool>;
    /// All assets, ordered by symbol.
    async fn list(&self, owner: &str) -> Result<Vec<Asset>>;
}

/// In-memory store for development and tests
pub struct InMemoryPortfolioStore {
    portfolios: Arc<RwLock<HashMap<String, BTreeMap<String, Asset>>>>,
}

impl InMemoryPortfolioStore {
    pub fn new() -> Self {
        Self {
            portfolios: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryPortfolioStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PortfolioStore for InMemoryPortfolioStore {
    async fn get(&self, owner: &str, symbol: &str) -> Result<Option<Asset>> {
        let portfolios = self.portfolios.read().await;
        Ok(portfolios
            .get(owner)
            .and_then(|assets| assets.get(symbol))
            .cloned())
    }

    async fn insert(&self, owner: &str, asset: Asset) -> Result<()> {
        let mut portfolios = self.portfolios.write().await;
        let assets = portfolios.entry(owner.to_string()).or_default();

        if assets.contains_key(&asset.symbol) {
            return Err(AssistantError::Store(format!(
                "asset {} already exists for {}",
                asset.symbol, owner
            )));
        }

        assets.insert(asset.symbol.clone(), asset);
        Ok(())
    }

    async fn update(&self, owner: &str, asset: Asset) -> Result<()> {
        let mut portfolios = self.portfolios.write().await;
        match portfolios
            .get_mut(owner)
            .and_then(|assets| assets.get_mut(&asset.symbol))
        {
            Some(existing) => {
                *existing = asset;
                Ok(())
            }
            None => Err(AssistantError::NotFound(format!(
                "asset {} not held by {}",
                asset.symbol, owner
            ))),
        }
    }

    async fn delete(&self, owner: &str, symbol: &str) -> Result<bool> {
        let mut portfolios = self.portfolios.write().await;
        Ok(portfolios
            .get_mut(owner)
            .map(|assets| assets.remove(symbol).is_some())
            .unwrap_or(false))
    }

    async fn list(&self, owner: &str) -> Result<Vec<Asset>> {
        let portfolios = self.portfolios.read().await;
        Ok(portfolios
            .get(owner)
            .map(|assets| assets.values().cloned().collect())
            .unwrap_or_default())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_in_memory_crud() {
        let store = InMemoryPortfolioStore::new();

        store
            .insert("u1", Asset::new("MSFT", Decimal::from(10), None))
            .await
            .unwrap();
        store
            .insert("u1", Asset::new("AAPL", Decimal::from(5), Some(Decimal::from(150))))
            .await
            .unwrap();

        let listed = store.list("u1").await.unwrap();
        let symbols: Vec<_> = listed.iter().map(|a| a.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);

        // one asset per (owner, symbol)
        assert!(store
            .insert("u1", Asset::new("AAPL", Decimal::from(1), None))
            .await
            .is_err());

        let mut aapl = store.get("u1", "AAPL").await.unwrap().unwrap();
        aapl.quantity = Decimal::from(7);
        store.update("u1", aapl).await.unwrap();
        assert_eq!(
            store.get("u1", "AAPL").await.unwrap().unwrap().quantity,
            Decimal::from(7)
        );

        assert!(store.delete("u1", "AAPL").await.unwrap());
        assert!(!store.delete("u1", "AAPL").await.unwrap());
        assert!(store.list("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = InMemoryPortfolioStore::new();
        let result = store
            .update("u1", Asset::new("TSLA", Decimal::from(1), None))
            .await;
        assert!(matches!(result, Err(AssistantError::NotFound(_))));
    }
}
