//! Background tasks behind a [`Client`](crate::Client).
//!
//! Three tasks cooperate per client:
//!
//! - the receive loop ([`Driver::run`]) reads frames, runs the [`Session`]
//!   and the handler callbacks, and performs reconnects;
//! - the writer ([`run_writer`]) is the only task that sends, draining the
//!   command channel onto whatever connection is in the shared slot;
//! - the keep-alive ([`run_keepalive`]) queues a `Ping` every interval.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use terra_protocol::ChallengeVariant;
use terra_transport::{Connection, Connector};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{self, JoinHandle};
use tokio::time::{self, Instant};

use crate::client::{Command, Shared};
use crate::session::{Action, Session};
use crate::{ClientError, ClientHandle, Handler};

/// The connection the writer sends on; swapped during reconnects.
pub(crate) type ConnectionSlot<T> = Arc<Mutex<Option<Arc<T>>>>;

/// Why the receive loop stopped.
#[derive(Debug)]
enum Exit {
    /// [`ClientHandle::disconnect`] was called.
    Local,
    /// The server closed the connection.
    Closed,
    /// The writer failed to send.
    SendFailed,
    Failed(ClientError),
}

/// Owns the session and handler for the lifetime of a client.
pub(crate) struct Driver<C: Connector, H: Handler> {
    connector: C,
    slot: ConnectionSlot<C::Connection>,
    session: Session,
    handler: H,
    client: ClientHandle,
    keepalive: Option<JoinHandle<()>>,
}

impl<C: Connector, H: Handler> Driver<C, H> {
    pub(crate) fn new(
        connector: C,
        slot: ConnectionSlot<C::Connection>,
        session: Session,
        handler: H,
        client: ClientHandle,
    ) -> Self {
        Self {
            connector,
            slot,
            session,
            handler,
            client,
            keepalive: None,
        }
    }

    /// Runs until the connection ends, then returns the handler.
    pub(crate) async fn run(mut self, conn: Arc<C::Connection>) -> H {
        let exit = self.receive_loop(conn).await;
        let shared = self.client.shared().clone();
        shared.connected.store(false, Ordering::SeqCst);
        self.session.disconnected();

        if let Some(task) = self.keepalive.take() {
            task.abort();
        }
        self.client.shutdown_writer();

        match exit {
            Exit::Local => {
                tracing::info!("disconnected by request");
            }
            other => {
                // A remote close racing a local disconnect is still local.
                if shared.local_close.load(Ordering::SeqCst) {
                    tracing::info!("disconnected by request");
                } else {
                    let outdated = self.session.outdated_version();
                    tracing::info!(reason = ?other, outdated, "disconnected");
                    self.handler.on_disconnect(&self.client, outdated);
                }
            }
        }
        self.handler
    }

    async fn receive_loop(&mut self, mut conn: Arc<C::Connection>) -> Exit {
        let shared = self.client.shared().clone();
        loop {
            if shared.local_close.load(Ordering::SeqCst) {
                return Exit::Local;
            }

            let received = tokio::select! {
                biased;
                _ = shared.stop.notified() => {
                    if shared.local_close.load(Ordering::SeqCst) {
                        return Exit::Local;
                    }
                    if shared.take_failure() == Some(conn.id()) {
                        return Exit::SendFailed;
                    }
                    // Failure on a connection already replaced.
                    continue;
                }
                received = conn.recv() => received,
            };

            let frame = match received {
                Ok(Some(frame)) => frame,
                Ok(None) => return Exit::Closed,
                Err(e) => return Exit::Failed(e.into()),
            };
            tracing::trace!(id = %conn.id(), len = frame.len(), "frame received");

            let cpu_bound = self.session.config().challenge_variant == ChallengeVariant::Legacy;
            let handled = run_frame_work(cpu_bound, || {
                self.session
                    .handle_frame(&frame, &mut self.handler, &self.client)
            });
            let actions = match handled {
                Ok(actions) => actions,
                Err(e) => return Exit::Failed(e.into()),
            };

            for action in actions {
                match action {
                    Action::Send(msg) => {
                        self.client.send(msg);
                    }
                    Action::StartKeepAlive => self.start_keepalive(),
                    Action::Reconnect { url } => match self.reconnect(&url).await {
                        Ok(next) => conn = next,
                        Err(e) => return Exit::Failed(e),
                    },
                }
            }
        }
    }

    fn start_keepalive(&mut self) {
        if self.keepalive.is_some() {
            return;
        }
        let interval = self.session.config().keepalive_interval;
        tracing::debug!(?interval, "starting keep-alive");
        self.keepalive = Some(tokio::spawn(run_keepalive(self.client.clone(), interval)));
    }

    /// Swaps the connection for one to `url`.
    ///
    /// Frames queued before the swap go out on the old connection; `Init`
    /// is the first frame on the new one.
    async fn reconnect(&mut self, url: &str) -> Result<Arc<C::Connection>, ClientError> {
        self.client.flush().await;

        let mut slot = self.slot.lock().await;
        if let Some(old) = slot.take() {
            if let Err(e) = old.close().await {
                tracing::debug!(id = %old.id(), error = %e, "closing previous connection");
            }
        }

        let conn = Arc::new(self.connector.connect(url).await?);
        conn.send(&self.session.init_message().encode()?).await?;
        // A disconnect during the dial finds the slot empty, so the new
        // connection is ours to close.
        if self.client.shared().local_close.load(Ordering::SeqCst) {
            drop(slot);
            if let Err(e) = conn.close().await {
                tracing::debug!(id = %conn.id(), error = %e, "close failed");
            }
            return Ok(conn);
        }
        *slot = Some(conn.clone());
        drop(slot);

        self.session.reconnected();
        tracing::info!(id = %conn.id(), url, "connected to game server");
        Ok(conn)
    }
}

/// Runs synchronous frame handling for the receive loop.
///
/// CPU-bound work gives up its worker thread on a multi-threaded runtime.
/// A current-thread runtime has no worker to hand off, so it runs in place.
fn run_frame_work<R>(cpu_bound: bool, work: impl FnOnce() -> R) -> R {
    let multi_thread = Handle::try_current()
        .is_ok_and(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread);
    if cpu_bound && multi_thread {
        task::block_in_place(work)
    } else {
        work()
    }
}

/// Drains `commands` onto the connection in `slot` until shutdown.
pub(crate) async fn run_writer<T: Connection>(
    mut commands: mpsc::UnboundedReceiver<Command>,
    slot: ConnectionSlot<T>,
    shared: Arc<Shared>,
) {
    while let Some(cmd) = commands.recv().await {
        match cmd {
            Command::Frame(msg) => {
                let bytes = match msg.encode() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(kind = msg.name(), error = %e, "dropping unencodable message");
                        continue;
                    }
                };

                let guard = slot.lock().await;
                let Some(conn) = guard.as_ref() else {
                    tracing::trace!(kind = msg.name(), "no connection, dropping message");
                    continue;
                };
                if let Err(e) = conn.send(&bytes).await {
                    tracing::warn!(id = %conn.id(), kind = msg.name(), error = %e, "send failed");
                    shared.fail(conn.id());
                    continue;
                }
                tracing::trace!(id = %conn.id(), kind = msg.name(), len = bytes.len(), "sent");
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
            Command::Shutdown => break,
        }
    }

    if let Some(conn) = slot.lock().await.take() {
        if let Err(e) = conn.close().await {
            tracing::debug!(id = %conn.id(), error = %e, "close failed");
        }
    }
    tracing::debug!("writer stopped");
}

/// Queues a `Ping` every `interval` while the client is connected.
pub(crate) async fn run_keepalive(client: ClientHandle, interval: Duration) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    loop {
        ticker.tick().await;
        if !client.is_connected() || !client.ping() {
            break;
        }
    }
    tracing::debug!("keep-alive stopped");
}
