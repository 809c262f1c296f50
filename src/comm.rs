//! Single-writer guard over the TCP write half.
//!
//! The session, the heartbeat task, and any in-flight request all write to
//! the same socket; [`Writer`] just serializes those writes behind a mutex
//! so two frames never interleave on the wire.

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::frame::Frame;

#[derive(Debug)]
pub struct Writer {
    inner: Mutex<OwnedWriteHalf>,
}

impl Writer {
    pub fn new(inner: OwnedWriteHalf) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Serializes and writes one frame, holding the write lock for the
    /// duration of the syscall.
    pub async fn write_frame(&self, frame: &Frame) -> Result<()> {
        let bytes = frame.to_bytes();
        let mut guard = self.inner.lock().await;
        guard.write_all(&bytes).await?;
        Ok(())
    }
}
