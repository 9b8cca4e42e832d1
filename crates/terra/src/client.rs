//! Public client API: [`Client`] owns the background tasks, [`ClientHandle`]
//! is the cheap, cloneable way to talk to them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};

use terra_protocol::Outbound;
use terra_transport::{Connection, ConnectionId, Connector, WebSocketConnector};
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::task::JoinHandle;

use crate::driver::{run_writer, Driver};
use crate::session::Session;
use crate::{ClientConfig, ClientError, Handler};

/// Commands for the writer task.
#[derive(Debug)]
pub(crate) enum Command {
    /// Encode and send one message on the current connection.
    Frame(Outbound),
    /// Reply once every command queued before this one has been handled.
    Flush(oneshot::Sender<()>),
    /// Close the connection and stop.
    Shutdown,
}

/// Flags shared by the handle, the receive loop, and the keep-alive task.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) connected: AtomicBool,
    /// The close was requested through [`ClientHandle::disconnect`].
    pub(crate) local_close: AtomicBool,
    /// Connection the writer last failed to send on.
    pub(crate) failed: std::sync::Mutex<Option<ConnectionId>>,
    /// Wakes the receive loop out of a pending `recv`.
    pub(crate) stop: Notify,
}

impl Shared {
    /// Reports a send failure on connection `id` to the receive loop.
    pub(crate) fn fail(&self, id: ConnectionId) {
        *self.failed.lock().unwrap_or_else(PoisonError::into_inner) = Some(id);
        self.stop.notify_one();
    }

    pub(crate) fn take_failure(&self) -> Option<ConnectionId> {
        self.failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Handle for sending messages and controlling a running client.
///
/// Every method only enqueues and returns immediately, so it is safe to call
/// from inside [`Handler`] callbacks.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    sender: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl ClientHandle {
    pub(crate) fn new(sender: mpsc::UnboundedSender<Command>, shared: Arc<Shared>) -> Self {
        Self { sender, shared }
    }

    /// A handle wired to a bare channel, for exercising the state machine.
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx, Arc::new(Shared::default())), rx)
    }

    /// Queues `msg` for the writer task.
    ///
    /// Returns `false` if the client has already shut down.
    pub fn send(&self, msg: Outbound) -> bool {
        self.sender.send(Command::Frame(msg)).is_ok()
    }

    /// Asks the lobby to place us in room `room` (4 bits).
    pub fn join_room(&self, room: u8) -> bool {
        self.send(Outbound::JoinRoom { room })
    }

    /// Claims the starting base at map `position`.
    pub fn set_base(&self, position: u32) -> bool {
        self.send(Outbound::SetBase { position })
    }

    pub fn attack(&self, percentage: u16, target: u16) -> bool {
        self.send(Outbound::Attack { percentage, target })
    }

    pub fn send_money(&self, percentage: u16, target: u16) -> bool {
        self.send(Outbound::SendMoney { percentage, target })
    }

    pub fn clan_request(&self, target: u16) -> bool {
        self.send(Outbound::ClanRequest { target })
    }

    pub fn lobby_event(&self, sub_id: u8) -> bool {
        self.send(Outbound::LobbyEvent { sub_id })
    }

    pub fn ping(&self) -> bool {
        self.send(Outbound::Ping)
    }

    /// Closes the connection. [`Handler::on_disconnect`] is not called.
    pub fn disconnect(&self) {
        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.local_close.store(true, Ordering::SeqCst);
        let _ = self.sender.send(Command::Shutdown);
        self.shared.stop.notify_one();
    }

    /// Whether the client currently holds an open connection.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Waits until the writer has handled everything queued so far.
    pub(crate) async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Command::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub(crate) fn shutdown_writer(&self) {
        let _ = self.sender.send(Command::Shutdown);
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

/// A running client.
///
/// Dropping a `Client` does not stop it; call [`ClientHandle::disconnect`]
/// and then [`Client::closed`].
pub struct Client<H: Handler> {
    handle: ClientHandle,
    task: JoinHandle<H>,
}

impl<H: Handler> Client<H> {
    /// Connects to the configured lobby over WebSocket and starts the
    /// background tasks.
    pub async fn start(config: ClientConfig, handler: H) -> Result<Self, ClientError> {
        Self::start_with(config, WebSocketConnector, handler).await
    }

    /// Like [`Client::start`], with a custom [`Connector`].
    ///
    /// Fails if the config is invalid or the lobby cannot be reached; once
    /// this returns `Ok`, every later failure is reported through
    /// [`Handler::on_disconnect`].
    pub async fn start_with<C: Connector>(
        config: ClientConfig,
        connector: C,
        handler: H,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let mut session = Session::new(config);
        let url = session.config().lobby_url.clone();

        let conn = Arc::new(connector.connect(&url).await?);
        conn.send(&session.init_message().encode()?).await?;
        session.connected();
        tracing::info!(id = %conn.id(), url = %url, "connected to lobby");

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        shared.connected.store(true, Ordering::SeqCst);
        let handle = ClientHandle::new(tx, shared.clone());

        let slot = Arc::new(Mutex::new(Some(conn.clone())));
        tokio::spawn(run_writer(rx, slot.clone(), shared));

        let driver = Driver::new(connector, slot, session, handler, handle.clone());
        let task = tokio::spawn(driver.run(conn));

        Ok(Self { handle, task })
    }

    /// Returns a handle for sending messages.
    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    /// Waits for the receive loop to finish and returns the handler.
    ///
    /// Returns `None` if a handler callback panicked.
    pub async fn closed(self) -> Option<H> {
        match self.task.await {
            Ok(handler) => Some(handler),
            Err(e) => {
                tracing::error!(error = %e, "receive loop panicked");
                None
            }
        }
    }
}
