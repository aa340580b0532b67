//! Deterministic executor
//!
//! Applies a fully specified command to the authenticated or guest store.
//! The model is NOT involved here.
//!
//! Mutations on one portfolio are serialized with a per-portfolio lock, and
//! each command touches its asset record with exactly one store write, so a
//! command either lands completely or not at all.

pub mod render;

use crate::error::{AssistantError, ValidationError};
use crate::models::{
    Asset, Command, ExecutionMetadata, ExecutionResult, PortfolioContext, ProcessingType,
};
use crate::state::{KeyedLocks, PortfolioStore};
use crate::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Decimal places kept on a recomputed average cost.
const AVG_COST_SCALE: u32 = 6;

pub struct DeterministicExecutor {
    authenticated: Arc<dyn PortfolioStore>,
    guest: Arc<dyn PortfolioStore>,
    locks: KeyedLocks,
}

/// What a command did, before it is rendered into a result.
struct Applied {
    content: String,
}

impl DeterministicExecutor {
    pub fn new(authenticated: Arc<dyn PortfolioStore>, guest: Arc<dyn PortfolioStore>) -> Self {
        Self {
            authenticated,
            guest,
            locks: KeyedLocks::new(),
        }
    }

    fn store_for(&self, portfolio: &PortfolioContext) -> &Arc<dyn PortfolioStore> {
        if portfolio.is_guest() {
            &self.guest
        } else {
            &self.authenticated
        }
    }

    /// Current holdings, used to give the model context on other paths.
    pub async fn holdings(&self, portfolio: &PortfolioContext) -> Result<Vec<Asset>> {
        self.store_for(portfolio).list(portfolio.owner_id()).await
    }

    pub async fn execute(&self, command: &Command, portfolio: &PortfolioContext) -> ExecutionResult {
        self.execute_with_cancellation(command, portfolio, None).await
    }

    /// Execute a command. Never returns an error: every failure becomes a
    /// result with `success = false`.
    ///
    /// A cancelled token is checked after the portfolio lock is taken and
    /// before any write, so nothing is applied once cancellation is observed.
    pub async fn execute_with_cancellation(
        &self,
        command: &Command,
        portfolio: &PortfolioContext,
        cancellation: Option<&CancellationToken>,
    ) -> ExecutionResult {
        let mut metadata = ExecutionMetadata::default();

        let outcome = if command.is_mutation() {
            let _guard = self.locks.acquire(&portfolio.key()).await;
            if cancellation.map(CancellationToken::is_cancelled).unwrap_or(false) {
                Err(AssistantError::Cancelled)
            } else {
                self.apply(command, portfolio, &mut metadata).await
            }
        } else {
            self.apply(command, portfolio, &mut metadata).await
        };

        let mut result = match outcome {
            Ok(applied) => ExecutionResult::new(true, applied.content, ProcessingType::Deterministic),
            Err(e) => {
                if e.is_store_failure() {
                    warn!(
                        portfolio = %portfolio.key(),
                        action = %command.action(),
                        error = %e,
                        "Store failure during execution"
                    );
                } else {
                    debug!(action = %command.action(), error = %e, "Command not applied");
                }
                ExecutionResult::failure(e.user_message(), ProcessingType::Deterministic)
            }
        };

        metadata.portfolio_modified = metadata.db_operations > 0;
        result.metadata = metadata;
        result
    }

    async fn apply(
        &self,
        command: &Command,
        portfolio: &PortfolioContext,
        metadata: &mut ExecutionMetadata,
    ) -> Result<Applied> {
        let store = self.store_for(portfolio);
        let owner = portfolio.owner_id();

        match command {
            Command::Add {
                symbol,
                quantity,
                price,
            } => self.add(store.as_ref(), owner, symbol, *quantity, *price, metadata).await,
            Command::Remove { symbol, quantity } => {
                self.remove(store.as_ref(), owner, symbol, *quantity, metadata).await
            }
            Command::Update { symbol, quantity } => {
                self.update(store.as_ref(), owner, symbol, *quantity, metadata).await
            }
            Command::Show { symbol } => {
                let content = match symbol {
                    Some(symbol) => match store.get(owner, symbol).await? {
                        Some(asset) => render::single_position(&asset),
                        None => format!("You have no position in {}.", symbol),
                    },
                    None => render::portfolio_summary(&store.list(owner).await?),
                };
                Ok(Applied { content })
            }
        }
    }

    async fn add(
        &self,
        store: &dyn PortfolioStore,
        owner: &str,
        symbol: &str,
        quantity: Decimal,
        price: Option<Decimal>,
        metadata: &mut ExecutionMetadata,
    ) -> Result<Applied> {
        let price_text = price
            .map(|p| format!(" at {}", render::money(p)))
            .unwrap_or_default();

        let asset = match store.get(owner, symbol).await? {
            Some(mut existing) => {
                let total = existing
                    .quantity
                    .checked_add(quantity)
                    .ok_or(ValidationError::OutOfRange { field: "quantity" })?;
                if let Some(price) = price {
                    // An unknown existing basis stays unknown rather than
                    // being replaced by the new lot's price.
                    existing.avg_cost = match existing.avg_cost {
                        Some(cost) => Some(
                            weighted_average(existing.quantity, cost, quantity, price, total)
                                .ok_or(ValidationError::OutOfRange { field: "cost basis" })?,
                        ),
                        None => None,
                    };
                }
                existing.quantity = total;
                existing.updated_at = Utc::now();
                store.update(owner, existing.clone()).await?;
                existing
            }
            None => {
                let asset = Asset::new(symbol, quantity, price);
                store.insert(owner, asset.clone()).await?;
                asset
            }
        };

        record_mutation(metadata, symbol);
        info!(symbol, quantity = %quantity, total = %asset.quantity, "Asset added");

        let holding = match asset.avg_cost {
            Some(cost) => format!(
                "You now hold {} of {} at an average cost of {}.",
                render::shares(asset.quantity),
                symbol,
                render::money(cost)
            ),
            None => format!("You now hold {} of {}.", render::shares(asset.quantity), symbol),
        };

        Ok(Applied {
            content: format!(
                "Added {} of {}{}. {}",
                render::shares(quantity),
                symbol,
                price_text,
                holding
            ),
        })
    }

    async fn remove(
        &self,
        store: &dyn PortfolioStore,
        owner: &str,
        symbol: &str,
        quantity: Option<Decimal>,
        metadata: &mut ExecutionMetadata,
    ) -> Result<Applied> {
        let Some(mut existing) = store.get(owner, symbol).await? else {
            return Err(AssistantError::NotFound(format!(
                "You don't have a position in {} to remove.",
                symbol
            )));
        };

        let content = match quantity {
            Some(qty) if qty < existing.quantity => {
                existing.quantity -= qty;
                existing.updated_at = Utc::now();
                let remaining = existing.quantity;
                store.update(owner, existing).await?;
                format!(
                    "Removed {} of {}. {} remain.",
                    render::shares(qty),
                    symbol,
                    render::shares(remaining)
                )
            }
            _ => {
                store.delete(owner, symbol).await?;
                format!(
                    "Removed your entire {} position ({}).",
                    symbol,
                    render::shares(existing.quantity)
                )
            }
        };

        record_mutation(metadata, symbol);
        info!(symbol, quantity = ?quantity, "Asset removed");

        Ok(Applied { content })
    }

    async fn update(
        &self,
        store: &dyn PortfolioStore,
        owner: &str,
        symbol: &str,
        quantity: Decimal,
        metadata: &mut ExecutionMetadata,
    ) -> Result<Applied> {
        let Some(mut existing) = store.get(owner, symbol).await? else {
            return Err(AssistantError::NotFound(format!(
                "You don't have a position in {} to update. Add it first.",
                symbol
            )));
        };

        let previous = existing.quantity;
        existing.quantity = quantity;
        existing.updated_at = Utc::now();
        store.update(owner, existing).await?;

        record_mutation(metadata, symbol);
        info!(symbol, from = %previous, to = %quantity, "Asset quantity updated");

        Ok(Applied {
            content: format!(
                "Updated {} from {} to {}.",
                symbol,
                render::shares(previous),
                render::shares(quantity)
            ),
        })
    }
}

/// Cost-weighted average of two lots, `None` when an intermediate value
/// leaves the `Decimal` range.
fn weighted_average(
    held: Decimal,
    held_cost: Decimal,
    added: Decimal,
    added_price: Decimal,
    total: Decimal,
) -> Option<Decimal> {
    let held_value = held.checked_mul(held_cost)?;
    let added_value = added.checked_mul(added_price)?;
    let average = held_value.checked_add(added_value)?.checked_div(total)?;
    Some(average.round_dp(AVG_COST_SCALE).normalize())
}

fn record_mutation(metadata: &mut ExecutionMetadata, symbol: &str) {
    metadata.db_operations += 1;
    metadata.assets_affected.push(symbol.to_string());
}
