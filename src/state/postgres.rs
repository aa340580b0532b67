//! Postgres-backed store for authenticated portfolios

use super::PortfolioStore;
use crate::error::AssistantError;
use crate::models::{Asset, AssetType};
use crate::Result;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

pub struct PostgresPortfolioStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgresPortfolioStore {
    /// Create a store with a lazily connecting pool; nothing is contacted
    /// until the first query.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)?;

        info!("Portfolio store backend: postgres");

        Ok(Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        })
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS portfolio_assets (
                      user_id TEXT NOT NULL,
                      symbol TEXT NOT NULL,
                      quantity NUMERIC NOT NULL CHECK (quantity > 0),
                      avg_cost NUMERIC CHECK (avg_cost >= 0),
                      asset_type TEXT NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                      PRIMARY KEY (user_id, symbol)
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                AssistantError::Store(format!("Failed to initialize portfolio schema: {}", e))
            })?;

        Ok(())
    }

    fn asset_from_row(row: &PgRow) -> Result<Asset> {
        let asset_type: String = row.try_get("asset_type")?;
        Ok(Asset {
            symbol: row.try_get("symbol")?,
            quantity: row.try_get("quantity")?,
            avg_cost: row.try_get("avg_cost")?,
            asset_type: AssetType::parse(&asset_type),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn store_error(action: &str) -> impl FnOnce(sqlx::Error) -> AssistantError + '_ {
    move |e| AssistantError::Store(format!("Failed to {}: {}", action, e))
}

#[async_trait::async_trait]
impl PortfolioStore for PostgresPortfolioStore {
    async fn get(&self, owner: &str, symbol: &str) -> Result<Option<Asset>> {
        self.ensure_schema().await?;

        let row = sqlx::query(
            r#"
            SELECT symbol, quantity, avg_cost, asset_type, created_at, updated_at
            FROM portfolio_assets
            WHERE user_id = $1 AND symbol = $2
            "#,
        )
        .bind(owner)
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error("load asset"))?;

        row.as_ref().map(Self::asset_from_row).transpose()
    }

    async fn insert(&self, owner: &str, asset: Asset) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query(
            r#"
            INSERT INTO portfolio_assets
              (user_id, symbol, quantity, avg_cost, asset_type, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(owner)
        .bind(&asset.symbol)
        .bind(asset.quantity)
        .bind(asset.avg_cost)
        .bind(asset.asset_type.as_str())
        .bind(asset.created_at)
        .bind(asset.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error("insert asset"))?;

        Ok(())
    }

    async fn update(&self, owner: &str, asset: Asset) -> Result<()> {
        self.ensure_schema().await?;

        let result = sqlx::query(
            r#"
            UPDATE portfolio_assets
            SET quantity = $3, avg_cost = $4, updated_at = $5
            WHERE user_id = $1 AND symbol = $2
            "#,
        )
        .bind(owner)
        .bind(&asset.symbol)
        .bind(asset.quantity)
        .bind(asset.avg_cost)
        .bind(asset.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error("update asset"))?;

        if result.rows_affected() == 0 {
            return Err(AssistantError::NotFound(format!(
                "asset {} not held by {}",
                asset.symbol, owner
            )));
        }
        Ok(())
    }

    async fn delete(&self, owner: &str, symbol: &str) -> Result<bool> {
        self.ensure_schema().await?;

        let result = sqlx::query("DELETE FROM portfolio_assets WHERE user_id = $1 AND symbol = $2")
            .bind(owner)
            .bind(symbol)
            .execute(&self.pool)
            .await
            .map_err(store_error("delete asset"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, owner: &str) -> Result<Vec<Asset>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            r#"
            SELECT symbol, quantity, avg_cost, asset_type, created_at, updated_at
            FROM portfolio_assets
            WHERE user_id = $1
            ORDER BY symbol ASC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error("list assets"))?;

        rows.iter().map(Self::asset_from_row).collect()
    }
}
