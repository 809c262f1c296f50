//! Persisted, daily-refreshed trading-calendar cache.
//!
//! Trading days are derived from the `sh000001` index's day K-line rather
//! than a hardcoded holiday table, so the cache self-corrects as the
//! exchange publishes its schedule through ordinary bar data.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::client::Client;
use crate::error::Result;
use crate::types::{exchange_inception, Exchange, Period};

/// Stamp every cached trading day with the exchange's `15:00` local close,
/// matching how the original bar timestamps are already anchored.
fn stamp(date: NaiveDate) -> NaiveDateTime {
    NaiveDateTime::new(date, NaiveTime::from_hms_opt(15, 0, 0).unwrap())
}

/// Persistence backend for the workday cache.
#[async_trait]
pub trait Store: Send + Sync {
    async fn load_all(&self) -> Result<BTreeSet<NaiveDate>>;
    async fn append(&self, dates: &[NaiveDate]) -> Result<()>;
}

/// `sqlx`-backed [`Store`].
pub struct SqlStore {
    pool: sqlx::AnyPool,
}

impl SqlStore {
    pub async fn connect(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let pool = sqlx::AnyPool::connect(url).await?;
        sqlx::query("CREATE TABLE IF NOT EXISTS workdays (unix_ts INTEGER PRIMARY KEY)")
            .execute(&pool)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for SqlStore {
    async fn load_all(&self) -> Result<BTreeSet<NaiveDate>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT unix_ts FROM workdays ORDER BY unix_ts")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(ts,)| chrono::DateTime::from_timestamp(ts, 0).map(|d| d.date_naive()))
            .collect())
    }

    async fn append(&self, dates: &[NaiveDate]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for date in dates {
            let ts = stamp(*date).and_utc().timestamp();
            sqlx::query("INSERT OR IGNORE INTO workdays (unix_ts) VALUES (?)")
                .bind(ts)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// The in-memory, persisted trading-day calendar.
pub struct Workday {
    store: Box<dyn Store>,
    cache: tokio::sync::RwLock<BTreeSet<NaiveDate>>,
}

impl Workday {
    pub async fn new(store: Box<dyn Store>) -> Result<Self> {
        let cache = store.load_all().await?;
        Ok(Self {
            store,
            cache: tokio::sync::RwLock::new(cache),
        })
    }

    /// Whether `date` is a known trading day.
    pub async fn is(&self, date: NaiveDate) -> bool {
        self.cache.read().await.contains(&date)
    }

    /// Whether today (local time) is a known trading day.
    pub async fn today_is(&self) -> bool {
        self.is(chrono::Local::now().date_naive()).await
    }

    /// Trading days in `[start, end]`, ascending, calling `f` for each.
    pub async fn range(&self, start: NaiveDate, end: NaiveDate, mut f: impl FnMut(NaiveDate)) {
        let start = start.max(exchange_inception());
        let cache = self.cache.read().await;
        for date in cache.range(start..=end) {
            f(*date);
        }
    }

    /// Trading days in `[start, end]`, descending, calling `f` for each.
    pub async fn range_desc(&self, start: NaiveDate, end: NaiveDate, mut f: impl FnMut(NaiveDate)) {
        let start = start.max(exchange_inception());
        let cache = self.cache.read().await;
        for date in cache.range(start..=end).rev() {
            f(*date);
        }
    }

    /// Fetches `sh000001`'s day K-line since the last cached trading day
    /// and appends any newer bars. On first bring-up (an empty cache) this
    /// pages all the way back to [`exchange_inception`] rather than
    /// settling for a single page, since there is no prior cached day to
    /// bound the paging against.
    pub async fn refresh(&self, client: &Client) -> Result<()> {
        let since = {
            let cache = self.cache.read().await;
            cache.iter().next_back().copied().unwrap_or_else(|| {
                exchange_inception() - Duration::days(1)
            })
        };

        let bars = client
            .kline_until(Exchange::Sh, "000001", Period::Day, true, |bar| {
                bar.time.date() <= since
            })
            .await?;
        let new_dates: Vec<NaiveDate> = bars
            .into_iter()
            .map(|b| b.time.date())
            .filter(|d| *d > since)
            .collect();

        if new_dates.is_empty() {
            return Ok(());
        }
        self.store.append(&new_dates).await?;
        self.cache.write().await.extend(new_dates.iter().copied());
        tracing::info!(added = new_dates.len(), "workday cache refreshed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MemStore {
        dates: std::sync::Mutex<BTreeSet<NaiveDate>>,
    }

    #[async_trait]
    impl Store for MemStore {
        async fn load_all(&self) -> Result<BTreeSet<NaiveDate>> {
            Ok(self.dates.lock().unwrap().clone())
        }

        async fn append(&self, dates: &[NaiveDate]) -> Result<()> {
            self.dates.lock().unwrap().extend(dates.iter().copied());
            Ok(())
        }
    }

    #[tokio::test]
    async fn range_clamps_to_exchange_inception() {
        let mut dates = BTreeSet::new();
        dates.insert(exchange_inception());
        dates.insert(NaiveDate::from_ymd_opt(1991, 1, 2).unwrap());
        let workday = Workday::new(Box::new(MemStore {
            dates: std::sync::Mutex::new(dates),
        }))
        .await
        .unwrap();

        let mut seen = Vec::new();
        workday
            .range(
                NaiveDate::from_ymd_opt(1980, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(1992, 1, 1).unwrap(),
                |d| seen.push(d),
            )
            .await;
        assert_eq!(seen[0], exchange_inception());
    }

    #[tokio::test]
    async fn is_reports_cached_days() {
        let mut dates = BTreeSet::new();
        dates.insert(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        let workday = Workday::new(Box::new(MemStore {
            dates: std::sync::Mutex::new(dates),
        }))
        .await
        .unwrap();
        assert!(workday.is(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()).await);
        assert!(!workday.is(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()).await);
    }
}
