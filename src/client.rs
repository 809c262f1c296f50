//! The client session: dials a quote server, multiplexes requests over the
//! one connection by `msg_id`, and keeps it alive with a heartbeat.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::comm::Writer;
use crate::dialer::{self, Dialer};
use crate::error::{Error, Kind, Result};
use crate::frame::{Frame, Response};
use crate::message::minute::MinuteBar;
use crate::message::{code_list, connect, count, heart, kline, minute, quote, trade};
use crate::reader::{PendingMap, Reader};
use crate::types::{Code, Exchange, KlineBar, Period, Quote, Trade};

/// The default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
/// The default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Tunable session parameters.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// The on-disk shape of a `config.toml`, for [`Builder::from_config_file`].
#[derive(Debug, Deserialize)]
struct ConfigFile {
    hosts: Vec<String>,
    #[serde(default = "default_strategy")]
    strategy: String,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default = "default_heartbeat_secs")]
    heartbeat_secs: u64,
}

fn default_strategy() -> String {
    "host".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_heartbeat_secs() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL.as_secs()
}

/// Builds a [`Client`], either from a manually constructed [`Dialer`] or
/// from a `config.toml` naming a host list and dial strategy.
pub struct Builder {
    dialer: Arc<dyn Dialer>,
    config: Config,
}

impl Builder {
    /// Creates a builder around an already-constructed dial strategy.
    #[must_use]
    pub fn manual(dialer: impl Dialer + 'static, config: Config) -> Self {
        Self {
            dialer: Arc::new(dialer),
            config,
        }
    }

    /// Loads a `config.toml` naming `hosts`, a `strategy` (`"single"`,
    /// `"host"`, `"random"`, or `"range"`; defaults to `"host"`), and
    /// optional `timeout_secs`/`heartbeat_secs` overrides.
    pub fn from_config_file(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::invalid_argument(format!("could not read {path}")).with_source(e))?;
        let file: ConfigFile = toml::from_str(&text)
            .map_err(|e| Error::invalid_argument(format!("invalid config TOML in {path}")).with_source(e))?;

        let dialer: Arc<dyn Dialer> = match file.strategy.as_str() {
            "single" => Arc::new(dialer::Single::new(
                file.hosts
                    .first()
                    .cloned()
                    .ok_or_else(|| Error::invalid_argument("single strategy needs exactly one host"))?,
            )),
            "random" => Arc::new(dialer::Random::new(file.hosts)?),
            "range" => Arc::new(dialer::Range::new(file.hosts)?),
            "host" => Arc::new(dialer::Host::new(file.hosts)?),
            other => {
                return Err(Error::invalid_argument(format!(
                    "unknown dial strategy {other:?}, expected single/host/random/range"
                )))
            }
        };

        Ok(Self {
            dialer,
            config: Config {
                timeout: Duration::from_secs(file.timeout_secs),
                heartbeat_interval: Duration::from_secs(file.heartbeat_secs),
            },
        })
    }

    /// Dials, performs the handshake, and starts the reader and heartbeat
    /// background tasks.
    pub async fn connect(self) -> Result<Arc<Client>> {
        let client = Arc::new(Client {
            inner: RwLock::new(None),
            msg_id: AtomicU32::new(1),
            dialer: self.dialer,
            config: self.config,
        });
        client.reconnect().await?;

        let heartbeat_client = Arc::clone(&client);
        tokio::spawn(async move {
            heartbeat_client.heartbeat_loop().await;
        });

        Ok(client)
    }
}

struct Inner {
    writer: Writer,
    pending: PendingMap,
    disconnect: CancellationToken,
}

/// A live session to one quote server.
pub struct Client {
    inner: RwLock<Option<Arc<Inner>>>,
    msg_id: AtomicU32,
    dialer: Arc<dyn Dialer>,
    config: Config,
}

impl Client {
    fn next_msg_id(&self) -> u32 {
        self.msg_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn inner(&self) -> Result<Arc<Inner>> {
        self.inner
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::not_connected("client has no active connection"))
    }

    /// Dials a fresh connection, replacing any existing one, and performs
    /// the handshake.
    async fn reconnect(&self) -> Result<()> {
        let cancel = CancellationToken::new();
        let stream = self.dialer.dial(&cancel).await?;
        let (read_half, write_half) = stream.into_split();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader = Reader::new(read_half, Arc::clone(&pending), cancel.clone());
        tokio::spawn(reader.run());

        let inner = Arc::new(Inner {
            writer: Writer::new(write_half),
            pending,
            disconnect: cancel,
        });
        *self.inner.write().await = Some(Arc::clone(&inner));

        let id = self.next_msg_id();
        let frame = connect::request(id);
        let resp = self.send_and_wait(&inner, frame, Duration::from_secs(5)).await?;
        let banner = connect::decode(&resp.data)?;
        tracing::info!(banner = %banner, "connected to quote server");
        Ok(())
    }

    async fn send_and_wait(&self, inner: &Inner, frame: Frame, timeout: Duration) -> Result<Response> {
        let (tx, rx) = oneshot::channel();
        inner.pending.lock().await.insert(frame.msg_id, tx);

        if let Err(e) = inner.writer.write_frame(&frame).await {
            inner.pending.lock().await.remove(&frame.msg_id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(resp))) => Ok(resp),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(Error::not_connected("connection closed before a response arrived")),
            Err(_) => {
                inner.pending.lock().await.remove(&frame.msg_id);
                Err(Error::timeout(format!(
                    "no response for msg_id {} within {timeout:?}",
                    frame.msg_id
                )))
            }
        }
    }

    /// Sends `frame` and awaits its response, transparently reconnecting
    /// once if the current connection has dropped.
    async fn call(&self, frame: Frame) -> Result<Response> {
        let inner = self.inner().await?;
        match self.send_and_wait(&inner, frame.clone(), self.config.timeout).await {
            Err(e) if e.kind() == Kind::NotConnected => {
                tracing::warn!("connection lost, reconnecting");
                self.reconnect().await?;
                let inner = self.inner().await?;
                self.send_and_wait(&inner, frame, self.config.timeout).await
            }
            other => other,
        }
    }

    async fn heartbeat_loop(&self) {
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval);
        loop {
            ticker.tick().await;
            let id = self.next_msg_id();
            if let Err(e) = self.call(heart::request(id)).await {
                tracing::warn!(error = %e, "heartbeat failed");
            }
        }
    }

    /// Gracefully closes the session, cancelling the reader task.
    pub async fn close(&self) {
        if let Some(inner) = self.inner.write().await.take() {
            inner.disconnect.cancel();
        }
    }

    /// The number of tradable symbols listed on `exchange`.
    pub async fn count(&self, exchange: Exchange) -> Result<u16> {
        let id = self.next_msg_id();
        let resp = self.call(count::request(id, exchange)).await?;
        count::decode(&resp.data)
    }

    /// One page (up to [`code_list::PAGE_SIZE`]) of the tradable-symbol
    /// catalog for `exchange`, starting at record `start`.
    pub async fn code_list(&self, exchange: Exchange, start: u16) -> Result<Vec<Code>> {
        let id = self.next_msg_id();
        let resp = self.call(code_list::request(id, exchange, start)).await?;
        code_list::decode(&resp.data, exchange)
    }

    /// The full tradable-symbol catalog for `exchange`, paging until a
    /// short page is returned.
    pub async fn code_list_all(&self, exchange: Exchange) -> Result<Vec<Code>> {
        let mut start = 0u16;
        let mut all = Vec::new();
        loop {
            let page = self.code_list(exchange, start).await?;
            let got = page.len();
            all.extend(page);
            if got < code_list::PAGE_SIZE as usize {
                break;
            }
            start = start.saturating_add(code_list::PAGE_SIZE);
        }
        Ok(all)
    }

    /// A real-time quote snapshot for up to 80 `(exchange, code)` pairs.
    pub async fn quote<'a>(
        &self,
        codes: impl IntoIterator<Item = (Exchange, &'a str)>,
    ) -> Result<Vec<Quote>> {
        let id = self.next_msg_id();
        let resp = self.call(quote::request(id, codes)?).await?;
        quote::decode(&resp.data)
    }

    /// Today's 240-minute time-and-sales ladder for one symbol.
    pub async fn minute(&self, exchange: Exchange, code: &str) -> Result<Vec<MinuteBar>> {
        let id = self.next_msg_id();
        let resp = self.call(minute::request(id, exchange, code)).await?;
        minute::decode(&resp.data, chrono::Local::now().date_naive())
    }

    /// The 240-minute time-and-sales ladder for one symbol on a past
    /// `date`.
    pub async fn history_minute(
        &self,
        date: chrono::NaiveDate,
        exchange: Exchange,
        code: &str,
    ) -> Result<Vec<MinuteBar>> {
        let id = self.next_msg_id();
        let resp = self
            .call(minute::history_request(id, date, exchange, code))
            .await?;
        minute::history_decode(&resp.data, date)
    }

    /// Up to `count` (max 800) live tick records for `code`, starting at
    /// `start`.
    pub async fn minute_trade(
        &self,
        exchange: Exchange,
        code: &str,
        start: u16,
        count: u16,
    ) -> Result<Vec<Trade>> {
        let id = self.next_msg_id();
        let resp = self
            .call(trade::request(id, exchange, code, start, count)?)
            .await?;
        trade::decode(&resp.data, chrono::Local::now().date_naive(), code)
    }

    /// Every live tick recorded for `code` today, paging by 800.
    pub async fn minute_trade_all(&self, exchange: Exchange, code: &str) -> Result<Vec<Trade>> {
        let mut start = 0u16;
        let mut all = Vec::new();
        loop {
            let page = self.minute_trade(exchange, code, start, 800).await?;
            let got = page.len();
            all.extend(page);
            if got < 800 {
                break;
            }
            start = start.saturating_add(800);
        }
        Ok(all)
    }

    /// Up to `count` (max 800) historical tick records for `code` on
    /// `date`, starting at `start`.
    pub async fn history_minute_trade(
        &self,
        date: chrono::NaiveDate,
        exchange: Exchange,
        code: &str,
        start: u16,
        count: u16,
    ) -> Result<Vec<Trade>> {
        let id = self.next_msg_id();
        let resp = self
            .call(trade::history_request(id, date, exchange, code, start, count)?)
            .await?;
        trade::history_decode(&resp.data, date, code)
    }

    /// Every historical tick recorded for `code` on `date`, paging by 800.
    pub async fn history_minute_trade_day(
        &self,
        date: chrono::NaiveDate,
        exchange: Exchange,
        code: &str,
    ) -> Result<Vec<Trade>> {
        let mut start = 0u16;
        let mut all = Vec::new();
        loop {
            let page = self
                .history_minute_trade(date, exchange, code, start, 800)
                .await?;
            let got = page.len();
            all.extend(page);
            if got < 800 {
                break;
            }
            start = start.saturating_add(800);
        }
        Ok(all)
    }

    /// Up to `count` (max 800) K-line bars of `period` for `code`, starting
    /// `start` bars back from the most recent.
    pub async fn kline(
        &self,
        exchange: Exchange,
        code: &str,
        period: Period,
        start: u16,
        count: u16,
    ) -> Result<Vec<KlineBar>> {
        let id = self.next_msg_id();
        let resp = self
            .call(kline::request(id, exchange, code, period, start, count)?)
            .await?;
        let (bars, _last) = kline::decode(&resp.data, period, false, 0)?;
        Ok(bars)
    }

    /// Same as [`Client::kline`], but decodes index-specific fields
    /// (up/down issue counts, index volume scaling).
    pub async fn index_kline(
        &self,
        exchange: Exchange,
        code: &str,
        period: Period,
        start: u16,
        count: u16,
    ) -> Result<Vec<KlineBar>> {
        let id = self.next_msg_id();
        let resp = self
            .call(kline::request(id, exchange, code, period, start, count)?)
            .await?;
        let (bars, _last) = kline::decode(&resp.data, period, true, 0)?;
        Ok(bars)
    }

    /// Pages through every available `period` bar for `code`, stopping once
    /// a page returns fewer than [`kline::MAX_COUNT`] bars. Applies the
    /// `11:30`-reported-as-`13:00` timestamp fix across the whole result.
    pub async fn kline_all(
        &self,
        exchange: Exchange,
        code: &str,
        period: Period,
        is_index: bool,
    ) -> Result<Vec<KlineBar>> {
        self.kline_until(exchange, code, period, is_index, |_| false).await
    }

    /// Like [`Client::kline_all`], but stops paging as soon as `stop`
    /// returns `true` for a bar in the most recently fetched page.
    pub async fn kline_until(
        &self,
        exchange: Exchange,
        code: &str,
        period: Period,
        is_index: bool,
        stop: impl Fn(&KlineBar) -> bool,
    ) -> Result<Vec<KlineBar>> {
        let mut start = 0u16;
        let mut last = 0i64;
        let mut all = Vec::new();
        loop {
            let id = self.next_msg_id();
            let resp = self
                .call(kline::request(id, exchange, code, period, start, kline::MAX_COUNT)?)
                .await?;
            let (mut bars, new_last) = kline::decode(&resp.data, period, is_index, last)?;
            last = new_last;
            let got = bars.len();
            let should_stop = bars.iter().any(&stop);
            all.append(&mut bars);
            if should_stop || got < kline::MAX_COUNT as usize {
                break;
            }
            start = start.saturating_add(kline::MAX_COUNT);
        }
        kline::fix_kline_time(&mut all);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_documented_values() {
        let c = Config::default();
        assert_eq!(c.timeout, Duration::from_secs(2));
        assert_eq!(c.heartbeat_interval, Duration::from_secs(30));
    }

    #[test]
    fn from_config_file_rejects_unknown_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "hosts = [\"1.2.3.4\"]\nstrategy = \"bogus\"\n").unwrap();
        let err = Builder::from_config_file(path.to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind(), Kind::InvalidArgument);
    }

    #[test]
    fn from_config_file_parses_host_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "hosts = [\"1.2.3.4\", \"5.6.7.8\"]\n").unwrap();
        let builder = Builder::from_config_file(path.to_str().unwrap()).unwrap();
        assert_eq!(builder.config.timeout, Duration::from_secs(2));
    }
}
