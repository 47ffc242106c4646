// SPDX-License-Identifier: MIT OR Apache-2.0
use super::{Transport, TransportError};
use crate::entry::LogEntry;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

type Ack = oneshot::Sender<Result<(), TransportError>>;

enum Command {
    Write(Box<LogEntry>),
    Flush(Ack),
    Close(Ack),
}

/// Moves writes of an inner transport onto a dedicated worker thread.
///
/// `write` only enqueues, so the logging call never waits on the sink.
/// Commands are handled in order, which makes `flush` a drain barrier: it
/// resolves once every entry enqueued before it has been written and the
/// inner transport has flushed.
pub struct QueuedTransport {
    name: String,
    tx: mpsc::UnboundedSender<Command>,
    pending: Arc<AtomicUsize>,
}

impl QueuedTransport {
    /// Start a worker thread owning `inner`.
    pub fn new<T>(inner: T) -> std::io::Result<Self>
    where
        T: Transport + 'static,
    {
        let name = format!("queued:{}", inner.name());
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = Arc::clone(&pending);
        std::thread::Builder::new()
            .name(format!("faultline-{}", inner.name()))
            .spawn(move || worker(inner, rx, worker_pending))?;
        Ok(Self { name, tx, pending })
    }

    /// Entries accepted but not yet written.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    fn closed(&self) -> TransportError {
        TransportError::Closed(self.name.clone())
    }

    async fn request(&self, make: impl FnOnce(Ack) -> Command) -> Result<(), TransportError> {
        let (ack, done) = oneshot::channel();
        self.tx.send(make(ack)).map_err(|_| self.closed())?;
        done.await.map_err(|_| self.closed())?
    }
}

fn worker<T: Transport>(
    inner: T,
    mut rx: mpsc::UnboundedReceiver<Command>,
    pending: Arc<AtomicUsize>,
) {
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            Command::Write(entry) => {
                if let Err(e) = inner.write(&entry) {
                    warn!(transport = inner.name(), error = %e, "queued log write failed");
                }
                pending.fetch_sub(1, Ordering::AcqRel);
            }
            Command::Flush(ack) => {
                let _ = ack.send(futures::executor::block_on(inner.flush()));
            }
            Command::Close(ack) => {
                rx.close();
                while let Ok(queued) = rx.try_recv() {
                    match queued {
                        Command::Write(entry) => {
                            if let Err(e) = inner.write(&entry) {
                                warn!(transport = inner.name(), error = %e, "queued log write failed");
                            }
                            pending.fetch_sub(1, Ordering::AcqRel);
                        }
                        // The final close below flushes everything.
                        Command::Flush(late) => {
                            let _ = late.send(Ok(()));
                        }
                        Command::Close(late) => {
                            let _ = late.send(Ok(()));
                        }
                    }
                }
                let _ = ack.send(futures::executor::block_on(inner.close()));
                return;
            }
        }
    }
}

impl std::fmt::Debug for QueuedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedTransport")
            .field("name", &self.name)
            .field("pending", &self.pending())
            .finish()
    }
}

#[async_trait]
impl Transport for QueuedTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, entry: &LogEntry) -> Result<(), TransportError> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.tx
            .send(Command::Write(Box::new(entry.clone())))
            .map_err(|_| {
                self.pending.fetch_sub(1, Ordering::AcqRel);
                self.closed()
            })
    }

    async fn flush(&self) -> Result<(), TransportError> {
        self.request(Command::Flush).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.request(Command::Close).await
    }
}
