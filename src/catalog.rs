//! Persisted, daily-refreshed catalog of tradable symbols.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::types::{self, Code, Exchange};

/// Persistence backend for the catalog cache.
#[async_trait]
pub trait Store: Send + Sync {
    async fn load_all(&self) -> Result<Vec<Code>>;
    async fn replace_all(&self, codes: &[Code]) -> Result<()>;
    async fn last_refreshed(&self) -> Result<Option<chrono::DateTime<Utc>>>;
    async fn mark_refreshed(&self, at: chrono::DateTime<Utc>) -> Result<()>;
}

/// `sqlx`-backed [`Store`], usable with either the `sqlite` or `mysql`
/// driver depending on which pool was handed in.
pub struct SqlStore {
    pool: sqlx::AnyPool,
}

impl SqlStore {
    /// Connects to `url` (an `sqlite://` or `mysql://` URL) and ensures the
    /// schema exists.
    pub async fn connect(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let pool = sqlx::AnyPool::connect(url).await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS catalog_codes (\
                exchange TEXT NOT NULL, \
                code TEXT NOT NULL, \
                name TEXT NOT NULL, \
                multiplier INTEGER NOT NULL, \
                decimal_places INTEGER NOT NULL, \
                last_price REAL NOT NULL, \
                PRIMARY KEY (exchange, code))",
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS catalog_refresh (id INTEGER PRIMARY KEY, refreshed_at TEXT NOT NULL)",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for SqlStore {
    async fn load_all(&self) -> Result<Vec<Code>> {
        let rows = sqlx::query_as::<_, (String, String, String, i64, i64, f64)>(
            "SELECT exchange, code, name, multiplier, decimal_places, last_price FROM catalog_codes",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(exchange, code, name, multiplier, decimal, last_price)| {
                Ok(Code {
                    code,
                    name,
                    exchange: parse_exchange(&exchange)?,
                    multiplier: multiplier as u16,
                    decimal: decimal as i8,
                    last_price,
                })
            })
            .collect()
    }

    async fn replace_all(&self, codes: &[Code]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM catalog_codes").execute(&mut *tx).await?;
        for code in codes {
            sqlx::query(
                "INSERT INTO catalog_codes (exchange, code, name, multiplier, decimal_places, last_price) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(code.exchange.prefix())
            .bind(&code.code)
            .bind(&code.name)
            .bind(i64::from(code.multiplier))
            .bind(i64::from(code.decimal))
            .bind(code.last_price)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn last_refreshed(&self) -> Result<Option<chrono::DateTime<Utc>>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT refreshed_at FROM catalog_refresh WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(s,)| chrono::DateTime::parse_from_rfc3339(&s).ok().map(|d| d.with_timezone(&Utc))))
    }

    async fn mark_refreshed(&self, at: chrono::DateTime<Utc>) -> Result<()> {
        sqlx::query("INSERT INTO catalog_refresh (id, refreshed_at) VALUES (1, ?) ON CONFLICT(id) DO UPDATE SET refreshed_at = excluded.refreshed_at")
            .bind(at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn parse_exchange(s: &str) -> Result<Exchange> {
    match s {
        "sh" => Ok(Exchange::Sh),
        "sz" => Ok(Exchange::Sz),
        "bj" => Ok(Exchange::Bj),
        other => Err(Error::persistence(format!("unknown exchange tag in catalog table: {other:?}"))),
    }
}

/// The in-memory, persisted symbol catalog.
pub struct Catalog {
    store: Arc<dyn Store>,
    cache: RwLock<HashMap<String, Code>>,
}

impl Catalog {
    pub async fn new(store: Arc<dyn Store>) -> Result<Self> {
        let codes = store.load_all().await?;
        let cache = codes.into_iter().map(|c| (c.full_code(), c)).collect();
        Ok(Self {
            store,
            cache: RwLock::new(cache),
        })
    }

    /// Looks up a catalog record by fully qualified code, e.g. `"sh600000"`.
    pub async fn get(&self, full_code: &str) -> Option<Code> {
        self.cache.read().await.get(full_code).cloned()
    }

    /// The display name for a fully qualified code, if known.
    pub async fn name(&self, full_code: &str) -> Option<String> {
        self.get(full_code).await.map(|c| c.name)
    }

    /// Every cached record classified as a stock.
    pub async fn stocks(&self, limit: Option<usize>) -> Vec<Code> {
        self.filtered(types::is_stock, limit).await
    }

    /// Every cached record classified as an ETF.
    pub async fn etfs(&self, limit: Option<usize>) -> Vec<Code> {
        self.filtered(types::is_etf, limit).await
    }

    async fn filtered(&self, predicate: fn(&str) -> bool, limit: Option<usize>) -> Vec<Code> {
        let cache = self.cache.read().await;
        let iter = cache.values().filter(|c| predicate(&c.full_code())).cloned();
        match limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        }
    }

    /// Refetches every exchange's catalog from `client` (BJ via the
    /// dedicated HTTP scraper, since the quote server itself never lists
    /// Beijing Exchange symbols) and persists the result.
    pub async fn refresh(
        &self,
        client: &Client,
        bj_codes: impl Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<Code>>> + Send>>,
    ) -> Result<()> {
        let mut all = Vec::new();
        for exchange in [Exchange::Sh, Exchange::Sz] {
            all.extend(client.code_list_all(exchange).await?);
        }
        all.extend(bj_codes().await?);

        self.store.replace_all(&all).await?;
        self.store.mark_refreshed(Utc::now()).await?;

        let mut cache = self.cache.write().await;
        *cache = all.into_iter().map(|c| (c.full_code(), c)).collect();
        tracing::info!(count = cache.len(), "catalog refreshed");
        Ok(())
    }

    /// Whether a refresh is due: no prior refresh, or the last one happened
    /// before today's 09:00 anchor.
    pub async fn refresh_due(&self, now: chrono::DateTime<chrono::Local>) -> Result<bool> {
        let Some(last) = self.store.last_refreshed().await? else {
            return Ok(true);
        };
        let last_local = last.with_timezone(&chrono::Local);
        let anchor = now
            .date_naive()
            .and_hms_opt(9, 0, 0)
            .expect("09:00:00 is always a valid time");
        Ok(now.naive_local() >= anchor && last_local.naive_local() < anchor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_helpers_agree_with_types_module() {
        assert!(types::is_stock("sh600000"));
        assert!(types::is_etf("sz159915"));
    }
}
