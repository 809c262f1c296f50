//! A bounded pool of reusable connections.
//!
//! Connections are created lazily, up to `max`, and handed out on
//! `acquire`/returned on `release`; a caller that hits a broken connection
//! calls `discard` instead so the pool knows to make room for a
//! replacement rather than believing it still has `max` live connections.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::error::{Error, Result};

/// Produces new pooled connections on demand.
#[async_trait]
pub trait Factory: Send + Sync {
    type Conn: Send;

    async fn create(&self) -> Result<Self::Conn>;
}

/// A bounded pool over connections of type `F::Conn`.
pub struct Pool<F: Factory> {
    idle: Mutex<VecDeque<F::Conn>>,
    outstanding: AtomicUsize,
    max: usize,
    factory: F,
    notify: Notify,
    closed: AtomicBool,
}

impl<F: Factory> Pool<F> {
    #[must_use]
    pub fn new(factory: F, max: usize) -> Self {
        Self {
            idle: Mutex::new(VecDeque::with_capacity(max)),
            outstanding: AtomicUsize::new(0),
            max,
            factory,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Checks an idle connection out, or creates a new one if under
    /// capacity, or waits for one to be released if the pool is saturated.
    pub async fn acquire(&self) -> Result<F::Conn> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(Error::not_connected("pool is closed"));
            }
            if let Some(conn) = self.idle.lock().await.pop_front() {
                return Ok(conn);
            }
            let current = self.outstanding.load(Ordering::Acquire);
            if current < self.max {
                if self
                    .outstanding
                    .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    continue;
                }
                match self.factory.create().await {
                    Ok(conn) => return Ok(conn),
                    Err(e) => {
                        self.outstanding.fetch_sub(1, Ordering::AcqRel);
                        self.notify.notify_one();
                        return Err(e);
                    }
                }
            }
            self.notify.notified().await;
        }
    }

    /// Returns a still-healthy connection to the idle queue.
    pub async fn release(&self, conn: F::Conn) {
        self.idle.lock().await.push_back(conn);
        self.notify.notify_one();
    }

    /// Drops a broken connection, freeing its slot for a new one.
    pub fn discard(&self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        self.notify.notify_one();
    }

    /// Runs `f` against a pooled connection, releasing it on success and
    /// discarding it on failure.
    pub async fn do_with<R, Func, Fut>(&self, f: Func) -> Result<R>
    where
        Func: FnOnce(F::Conn) -> Fut,
        Fut: Future<Output = (F::Conn, Result<R>)>,
    {
        let conn = self.acquire().await?;
        let (conn, result) = f(conn).await;
        if result.is_ok() {
            self.release(conn).await;
        } else {
            self.discard();
        }
        result
    }

    /// Gracefully closes the pool: idempotent, drops every idle connection,
    /// and wakes any acquire waiters so they observe `NotConnected` instead
    /// of blocking forever.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.idle.lock().await.clear();
        self.notify.notify_waiters();
    }
}

impl<F> Pool<F>
where
    F: Factory + 'static,
    F::Conn: Send + 'static,
{
    /// Runs `f` against a pooled connection in the background, logging
    /// (rather than propagating) acquire failures.
    pub fn spawn<Func, Fut>(self: &Arc<Self>, f: Func)
    where
        Func: FnOnce(F::Conn) -> Fut + Send + 'static,
        Fut: Future<Output = (F::Conn, Result<()>)> + Send + 'static,
    {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            match pool.acquire().await {
                Ok(conn) => {
                    let (conn, result) = f(conn).await;
                    if result.is_ok() {
                        pool.release(conn).await;
                    } else {
                        pool.discard();
                    }
                }
                Err(e) => tracing::warn!(error = %e, "pool: background acquire failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct CountingFactory {
        created: AtomicU32,
    }

    #[async_trait]
    impl Factory for CountingFactory {
        type Conn = u32;

        async fn create(&self) -> Result<u32> {
            Ok(self.created.fetch_add(1, Ordering::SeqCst))
        }
    }

    #[tokio::test]
    async fn acquire_creates_up_to_max_then_reuses() {
        let pool = Pool::new(
            CountingFactory {
                created: AtomicU32::new(0),
            },
            2,
        );
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_eq!((a, b), (0, 1));
        pool.release(a).await;
        let c = pool.acquire().await.unwrap();
        assert_eq!(c, 0);
    }

    #[tokio::test]
    async fn discard_frees_a_slot_for_a_new_connection() {
        let pool = Pool::new(
            CountingFactory {
                created: AtomicU32::new(0),
            },
            1,
        );
        let a = pool.acquire().await.unwrap();
        assert_eq!(a, 0);
        drop(a);
        pool.discard();
        let b = pool.acquire().await.unwrap();
        assert_eq!(b, 1);
    }

    #[tokio::test]
    async fn close_rejects_further_acquires() {
        let pool = Pool::new(
            CountingFactory {
                created: AtomicU32::new(0),
            },
            1,
        );
        pool.close().await;
        assert!(pool.acquire().await.is_err());
    }
}
