//! Background task that owns the read half and dispatches decoded frames to
//! whichever in-flight request is waiting on them.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::{oneshot, Mutex};

use crate::error::{Error, Result};
use crate::frame::Response;

pub type PendingMap = Arc<Mutex<HashMap<u32, oneshot::Sender<Result<Response>>>>>;

#[derive(Debug)]
pub struct Reader {
    inner: OwnedReadHalf,
    pending: PendingMap,
    disconnect: tokio_util::sync::CancellationToken,
}

impl Reader {
    pub fn new(
        inner: OwnedReadHalf,
        pending: PendingMap,
        disconnect: tokio_util::sync::CancellationToken,
    ) -> Self {
        Self {
            inner,
            pending,
            disconnect,
        }
    }

    /// Runs until cancelled or the connection drops, in which case every
    /// still-pending waiter is resolved with a transport error so no caller
    /// hangs forever on a dead socket.
    pub async fn run(mut self) -> Self {
        loop {
            tokio::select! {
                () = self.disconnect.cancelled() => {
                    tracing::debug!("reader task: disconnecting");
                    break self;
                }
                result = Response::read_from(&mut self.inner) => {
                    match result {
                        Ok(resp) => self.dispatch(resp).await,
                        Err(e) => {
                            tracing::warn!(error = %e, "reader task: connection error");
                            self.drain_pending().await;
                            break self;
                        }
                    }
                }
            }
        }
    }

    async fn dispatch(&self, resp: Response) {
        let waiter = {
            let mut map = self.pending.lock().await;
            map.remove(&resp.msg_id)
        };
        match waiter {
            Some(tx) => {
                let _ = tx.send(Ok(resp));
            }
            None => {
                tracing::warn!(msg_id = resp.msg_id, "response with no matching waiter");
            }
        }
    }

    async fn drain_pending(&self) {
        let mut map = self.pending.lock().await;
        for (_, tx) in map.drain() {
            let _ = tx.send(Err(Error::not_connected("connection closed while waiting for a response")));
        }
    }
}
