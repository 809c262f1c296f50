//! Strategies for picking which quote-server host to connect (or reconnect)
//! to.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// The quote server's well-known default port, used when a host string
/// carries no `:port` suffix.
pub const DEFAULT_PORT: u16 = 7709;

fn ensure_port(host: &str) -> String {
    if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:{DEFAULT_PORT}")
    }
}

/// A pluggable connection strategy.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Establishes a new TCP connection, honoring `cancel`.
    async fn dial(&self, cancel: &CancellationToken) -> Result<TcpStream>;
}

#[async_trait]
impl Dialer for std::sync::Arc<dyn Dialer> {
    async fn dial(&self, cancel: &CancellationToken) -> Result<TcpStream> {
        (**self).dial(cancel).await
    }
}

/// Always dials the same host.
#[derive(Debug, Clone)]
pub struct Single {
    addr: String,
}

impl Single {
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            addr: ensure_port(&host.into()),
        }
    }
}

#[async_trait]
impl Dialer for Single {
    async fn dial(&self, cancel: &CancellationToken) -> Result<TcpStream> {
        dial_one(&self.addr, cancel).await
    }
}

/// Round-robins through a fixed host list, one attempt per call. The cursor
/// advances on every call regardless of whether the attempt succeeds, so a
/// consistently unreachable host does not get retried disproportionately.
#[derive(Debug)]
pub struct Host {
    hosts: Vec<String>,
    next: AtomicUsize,
}

impl Host {
    pub fn new(hosts: impl IntoIterator<Item = impl Into<String>>) -> Result<Self> {
        let hosts: Vec<String> = hosts.into_iter().map(|h| ensure_port(&h.into())).collect();
        if hosts.is_empty() {
            return Err(Error::invalid_argument("host dialer needs at least one host"));
        }
        Ok(Self {
            hosts,
            next: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Dialer for Host {
    async fn dial(&self, cancel: &CancellationToken) -> Result<TcpStream> {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.hosts.len();
        dial_one(&self.hosts[i], cancel).await
    }
}

/// Picks a uniformly random host from a fixed list on every call.
#[derive(Debug)]
pub struct Random {
    hosts: Vec<String>,
}

impl Random {
    pub fn new(hosts: impl IntoIterator<Item = impl Into<String>>) -> Result<Self> {
        let hosts: Vec<String> = hosts.into_iter().map(|h| ensure_port(&h.into())).collect();
        if hosts.is_empty() {
            return Err(Error::invalid_argument("random dialer needs at least one host"));
        }
        Ok(Self { hosts })
    }
}

#[async_trait]
impl Dialer for Random {
    async fn dial(&self, cancel: &CancellationToken) -> Result<TcpStream> {
        let i = rand::thread_rng().gen_range(0..self.hosts.len());
        dial_one(&self.hosts[i], cancel).await
    }
}

/// Probes a fixed host list in order, pausing two seconds between attempts
/// (but not after the last one), returning the first that connects.
/// Honors `cancel` between attempts.
#[derive(Debug)]
pub struct Range {
    hosts: Vec<String>,
}

impl Range {
    pub fn new(hosts: impl IntoIterator<Item = impl Into<String>>) -> Result<Self> {
        let hosts: Vec<String> = hosts.into_iter().map(|h| ensure_port(&h.into())).collect();
        if hosts.is_empty() {
            return Err(Error::invalid_argument("range dialer needs at least one host"));
        }
        Ok(Self { hosts })
    }
}

#[async_trait]
impl Dialer for Range {
    async fn dial(&self, cancel: &CancellationToken) -> Result<TcpStream> {
        let mut last_err = None;
        for (i, host) in self.hosts.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::cancelled("dial cancelled"));
            }
            match dial_one(host, cancel).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    tracing::warn!(host = %host, error = %e, "range dial attempt failed");
                    last_err = Some(e);
                }
            }
            if i + 1 < self.hosts.len() {
                tokio::select! {
                    () = cancel.cancelled() => return Err(Error::cancelled("dial cancelled")),
                    () = tokio::time::sleep(Duration::from_secs(2)) => {}
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::transport("no hosts configured")))
    }
}

async fn dial_one(addr: &str, cancel: &CancellationToken) -> Result<TcpStream> {
    tokio::select! {
        () = cancel.cancelled() => Err(Error::cancelled("dial cancelled")),
        result = TcpStream::connect(addr) => result.map_err(Error::from),
    }
}

/// Measures TCP-dial latency to every host in parallel and returns the
/// reachable ones sorted ascending by latency. Unreachable hosts are
/// dropped, with a warning naming each one.
pub async fn rank_hosts(hosts: &[String]) -> Vec<String> {
    let mut tasks = Vec::with_capacity(hosts.len());
    for host in hosts {
        let addr = ensure_port(host);
        let original = host.clone();
        tasks.push(tokio::spawn(async move {
            let start = Instant::now();
            let result = tokio::time::timeout(Duration::from_secs(3), TcpStream::connect(&addr)).await;
            match result {
                Ok(Ok(_stream)) => Some((original, start.elapsed())),
                _ => None,
            }
        }));
    }

    let mut ranked = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.await {
            Ok(Some((host, latency))) => ranked.push((host, latency)),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "rank_hosts probe task panicked"),
        }
    }
    ranked.sort_by_key(|(_, latency)| *latency);
    ranked.into_iter().map(|(host, _)| host).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_port_appends_default_when_missing() {
        assert_eq!(ensure_port("119.147.212.81"), "119.147.212.81:7709");
        assert_eq!(ensure_port("119.147.212.81:7709"), "119.147.212.81:7709");
    }

    #[test]
    fn host_dialer_rejects_empty_list() {
        assert!(Host::new(Vec::<String>::new()).is_err());
    }

    #[tokio::test]
    async fn host_dialer_round_robins_regardless_of_outcome() {
        let dialer = Host::new(vec!["127.0.0.1:1", "127.0.0.1:2"]).unwrap();
        let cancel = CancellationToken::new();
        let _ = dialer.dial(&cancel).await;
        assert_eq!(dialer.next.load(Ordering::Relaxed), 1);
        let _ = dialer.dial(&cancel).await;
        assert_eq!(dialer.next.load(Ordering::Relaxed), 2);
    }
}
