//! Ties a connection [`Pool`], [`Catalog`], and [`Workday`] together behind
//! one scheduler that keeps both caches warm.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::catalog::Catalog;
use crate::client::{Builder, Client, Config};
use crate::dialer::Dialer;
use crate::error::{Error, Result};
use crate::pool::{Factory, Pool};
use crate::types::Code;
use crate::workday::Workday;

type BjCodesFn = dyn Fn() -> Pin<Box<dyn Future<Output = Result<Vec<Code>>> + Send>> + Send + Sync;

/// The per-refresh timeout the manager gives its own shared catalog/workday
/// client, above the ordinary per-[`Client`] default.
const REFRESH_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds fresh [`Client`] connections for a [`Pool`], all sharing one dial
/// strategy and session configuration.
struct ClientFactory {
    dialer: Arc<dyn Dialer>,
    config: Config,
}

#[async_trait]
impl Factory for ClientFactory {
    type Conn = Arc<Client>;

    async fn create(&self) -> Result<Arc<Client>> {
        Builder::manual(Arc::clone(&self.dialer), self.config)
            .connect()
            .await
    }
}

/// Composes a bounded connection pool, the symbol catalog, and the
/// trading-day calendar, and schedules their daily refreshes.
pub struct Manager {
    pool: Arc<Pool<ClientFactory>>,
    /// A single long-lived connection dedicated to catalog/workday refresh,
    /// given a longer timeout than pool-issued clients.
    refresh_client: Arc<Client>,
    pub catalog: Arc<Catalog>,
    pub workday: Arc<Workday>,
    scheduler: JobScheduler,
}

impl Manager {
    /// Dials the dedicated refresh connection, wires up the bounded pool for
    /// ordinary request traffic, and builds (but does not yet start) the
    /// scheduler.
    pub async fn new(
        dialer: Arc<dyn Dialer>,
        config: Config,
        pool_size: usize,
        catalog: Arc<Catalog>,
        workday: Arc<Workday>,
    ) -> Result<Self> {
        let refresh_client = Builder::manual(
            Arc::clone(&dialer),
            Config {
                timeout: REFRESH_TIMEOUT,
                ..config
            },
        )
        .connect()
        .await?;

        let pool = Arc::new(Pool::new(ClientFactory { dialer, config }, pool_size));

        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| Error::persistence("failed to build job scheduler").with_source(e))?;

        Ok(Self {
            pool,
            refresh_client,
            catalog,
            workday,
            scheduler,
        })
    }

    /// Checks a pooled [`Client`] out for ordinary request traffic.
    pub async fn acquire(&self) -> Result<Arc<Client>> {
        self.pool.acquire().await
    }

    /// Returns a [`Client`] checked out via [`Manager::acquire`].
    pub async fn release(&self, client: Arc<Client>) {
        self.pool.release(client).await;
    }

    /// Registers the daily catalog (09:00:10) and workday (09:00:00) refresh
    /// jobs, each retried up to 3 times with a 5 minute backoff, and starts
    /// the scheduler.
    pub async fn start(&self, bj_codes: Arc<BjCodesFn>) -> Result<()> {
        let catalog_client = Arc::clone(&self.refresh_client);
        let catalog = Arc::clone(&self.catalog);
        let workday_client = Arc::clone(&self.refresh_client);
        let workday = Arc::clone(&self.workday);

        let catalog_job = Job::new_async("10 0 9 * * *", move |_uuid, _lock| {
            let client = Arc::clone(&catalog_client);
            let catalog = Arc::clone(&catalog);
            let bj_codes = Arc::clone(&bj_codes);
            Box::pin(async move {
                refresh_with_retries("catalog", 3, Duration::from_secs(300), || {
                    let client = Arc::clone(&client);
                    let catalog = Arc::clone(&catalog);
                    let bj_codes = Arc::clone(&bj_codes);
                    Box::pin(async move { catalog.refresh(&client, || (*bj_codes)()).await })
                })
                .await;
            })
        })
        .map_err(|e| Error::persistence("failed to schedule catalog refresh").with_source(e))?;

        let workday_job = Job::new_async("0 0 9 * * *", move |_uuid, _lock| {
            let client = Arc::clone(&workday_client);
            let workday = Arc::clone(&workday);
            Box::pin(async move {
                refresh_with_retries("workday", 3, Duration::from_secs(300), || {
                    let client = Arc::clone(&client);
                    let workday = Arc::clone(&workday);
                    Box::pin(async move { workday.refresh(&client).await })
                })
                .await;
            })
        })
        .map_err(|e| Error::persistence("failed to schedule workday refresh").with_source(e))?;

        self.scheduler
            .add(catalog_job)
            .await
            .map_err(|e| Error::persistence("failed to register catalog job").with_source(e))?;
        self.scheduler
            .add(workday_job)
            .await
            .map_err(|e| Error::persistence("failed to register workday job").with_source(e))?;
        self.scheduler
            .start()
            .await
            .map_err(|e| Error::persistence("failed to start job scheduler").with_source(e))?;
        Ok(())
    }

    /// Cataloged stocks, via the in-memory [`Catalog`] cache.
    pub async fn range_stocks(&self, limit: Option<usize>) -> Vec<Code> {
        self.catalog.stocks(limit).await
    }

    /// Cataloged ETFs, via the in-memory [`Catalog`] cache.
    pub async fn range_etfs(&self, limit: Option<usize>) -> Vec<Code> {
        self.catalog.etfs(limit).await
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.pool.close().await;
        self.refresh_client.close().await;
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| Error::persistence("failed to shut down job scheduler").with_source(e))
    }
}

async fn refresh_with_retries<Func>(name: &str, attempts: u32, backoff: Duration, mut f: Func)
where
    Func: FnMut() -> Pin<Box<dyn Future<Output = Result<()>> + Send>>,
{
    for attempt in 1..=attempts {
        match f().await {
            Ok(()) => return,
            Err(e) if attempt < attempts => {
                tracing::warn!(%name, attempt, error = %e, "refresh failed, retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                tracing::error!(%name, attempts, error = %e, "refresh failed, giving up");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn refresh_with_retries_stops_on_first_success() {
        let calls = AtomicU32::new(0);
        refresh_with_retries("t", 3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_with_retries_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        refresh_with_retries("t", 3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(Error::upstream("still broken")) })
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
