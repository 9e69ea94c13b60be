//! Connection actor for one `graphql-ws` socket.
//!
//! Each connection runs a read pump and a write pump as separate tasks. They
//! share a single-slot outgoing mailbox and a closed flag. Whichever side
//! fails first calls [`WsConnection::close`], which fires the close hook
//! exactly once and stops both pumps.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use gqlws_core::protocol::{DEFAULT_READ_LIMIT, DEFAULT_WRITE_TIMEOUT};
use gqlws_core::{
    Authenticator, Connection, ConnectionId, DataPayload, ErrorDescription, InitPayload, MessageType,
    OperationMessage, StartPayload, User,
};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::transport::{Frame, FrameSink, FrameStream, TransportError};

/// Per-connection limits.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Largest inbound frame accepted, in bytes.
    pub read_limit: usize,
    /// Deadline for each outbound write.
    pub write_timeout: Duration,
    /// Interval of `ka` frames; `None` disables them.
    pub keep_alive: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_limit: DEFAULT_READ_LIMIT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            keep_alive: None,
        }
    }
}

/// Hooks invoked by the read pump. All methods default to doing nothing.
#[async_trait]
pub trait ConnectionEventHandler: Send + Sync {
    /// The client asked to start an operation. Returned errors are sent back
    /// as an `error` frame scoped to `operation_id`.
    async fn on_start(
        &self,
        _connection: &Arc<WsConnection>,
        _operation_id: &str,
        _payload: StartPayload,
    ) -> Result<(), Vec<ErrorDescription>> {
        Ok(())
    }

    async fn on_stop(&self, _connection: &Arc<WsConnection>, _operation_id: &str) {}

    /// Called exactly once, after the connection is marked closed.
    fn on_close(&self, _connection: &Arc<WsConnection>) {}
}

/// A frame handed to the write pump, acknowledged once the pump takes it.
type Outgoing = (OperationMessage, oneshot::Sender<()>);

pub struct WsConnection {
    id: ConnectionId,
    user: RwLock<Option<User>>,
    outgoing: mpsc::Sender<Outgoing>,
    closed: AtomicBool,
    shutdown: CancellationToken,
    handler: Arc<dyn ConnectionEventHandler>,
    authenticator: Option<Arc<dyn Authenticator>>,
    me: Weak<WsConnection>,
}

/// A running connection and its pump tasks.
pub struct ConnectionHandle {
    pub connection: Arc<WsConnection>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Wait for both pumps to exit.
    pub async fn join(self) {
        let id = self.connection.id.clone();
        let (reader, writer) = tokio::join!(self.reader, self.writer);
        for (pump, result) in [("read", reader), ("write", writer)] {
            if let Err(err) = result {
                tracing::error!(connection_id = %id, pump, err = %err, "Pump task failed");
            }
        }
    }
}

impl WsConnection {
    /// Create a connection over the given socket halves and start its pumps.
    pub fn spawn(
        sink: FrameSink,
        stream: FrameStream,
        config: ConnectionConfig,
        handler: Arc<dyn ConnectionEventHandler>,
        authenticator: Option<Arc<dyn Authenticator>>,
    ) -> ConnectionHandle {
        let (tx, rx) = mpsc::channel(1);
        let connection = Arc::new_cyclic(|me| WsConnection {
            id: ConnectionId::new(),
            user: RwLock::new(None),
            outgoing: tx,
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            handler,
            authenticator,
            me: me.clone(),
        });

        tracing::info!(connection_id = %connection.id, "Created connection");

        let writer = tokio::spawn(write_pump(Arc::clone(&connection), sink, rx, config.clone()));
        let reader = tokio::spawn(read_pump(Arc::clone(&connection), stream, config.read_limit));

        ConnectionHandle {
            connection,
            reader,
            writer,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once the connection has been closed.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }

    /// Close the connection. Only the first call has any effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shutdown.cancel();

        if let Some(me) = self.me.upgrade() {
            self.handler.on_close(&me);
        }

        tracing::info!(connection_id = %self.id, "Closed connection");
    }

    /// Hand a message to the write pump and wait until the pump has taken it.
    /// Returns without writing once closed.
    async fn enqueue(&self, message: OperationMessage) {
        if self.is_closed() {
            return;
        }

        let (taken_tx, taken_rx) = oneshot::channel();
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return,
            result = self.outgoing.send((message, taken_tx)) => {
                if result.is_err() {
                    tracing::debug!(connection_id = %self.id, "Dropped message for closed connection");
                    return;
                }
            }
        }

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {}
            _ = taken_rx => {}
        }
    }

    async fn handle_message(self: &Arc<Self>, message: OperationMessage) -> ControlFlow<()> {
        tracing::debug!(
            connection_id = %self.id,
            id = ?message.id,
            kind = %message.kind,
            "Received message"
        );

        let operation_id = message.id.clone().unwrap_or_default();
        match &message.kind {
            MessageType::ConnectionInit => self.handle_init(&message).await,
            MessageType::Start => self.handle_start(&operation_id, &message).await,
            MessageType::Stop => self.handler.on_stop(self, &operation_id).await,
            MessageType::ConnectionTerminate => {
                tracing::info!(connection_id = %self.id, "Connection terminated by client");
                return ControlFlow::Break(());
            }
            _ => tracing::error!(connection_id = %self.id, msg = %message, "Unhandled message"),
        }
        ControlFlow::Continue(())
    }

    async fn handle_init(&self, message: &OperationMessage) {
        let payload = match message.payload_as::<Option<InitPayload>>() {
            Ok(payload) => payload.unwrap_or_default(),
            Err(err) => {
                tracing::warn!(connection_id = %self.id, err = %err, "Invalid connection_init payload");
                self.send_error("Invalid connection_init payload").await;
                return;
            }
        };

        let Some(authenticator) = &self.authenticator else {
            self.enqueue(OperationMessage::connection_ack()).await;
            return;
        };

        match authenticator.authenticate(&payload.auth_token).await {
            Ok(user) => {
                *self.user.write() = Some(user);
                tracing::info!(connection_id = %self.id, "Authenticated connection");
                self.enqueue(OperationMessage::connection_ack()).await;
            }
            Err(err) => {
                tracing::warn!(connection_id = %self.id, err = %err, "Failed to authenticate user");
                self.enqueue(OperationMessage::connection_error(format!(
                    "Failed to authenticate user: {err}"
                )))
                .await;
            }
        }
    }

    async fn handle_start(self: &Arc<Self>, operation_id: &str, message: &OperationMessage) {
        let payload = match message.payload_as::<StartPayload>() {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(
                    connection_id = %self.id,
                    operation_id = %operation_id,
                    err = %err,
                    "Invalid start payload"
                );
                self.send_error("Invalid start payload").await;
                return;
            }
        };

        if let Err(errors) = self.handler.on_start(self, operation_id, payload).await {
            if !errors.is_empty() {
                self.enqueue(OperationMessage::operation_errors(operation_id, &errors))
                    .await;
            }
        }
    }
}

#[async_trait]
impl Connection for WsConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn user(&self) -> Option<User> {
        self.user.read().clone()
    }

    async fn send_data(&self, operation_id: &str, payload: DataPayload) {
        self.enqueue(OperationMessage::data(operation_id, &payload)).await;
    }

    async fn send_error(&self, message: &str) {
        self.enqueue(OperationMessage::error(message)).await;
    }
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

async fn write_pump(
    connection: Arc<WsConnection>,
    mut sink: FrameSink,
    mut outgoing: mpsc::Receiver<Outgoing>,
    config: ConnectionConfig,
) {
    // A zero period disables keep-alive.
    let mut keep_alive = config.keep_alive.filter(|period| !period.is_zero()).map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        let message = tokio::select! {
            biased;
            _ = connection.shutdown.cancelled() => break,
            message = outgoing.recv() => match message {
                Some((message, taken)) => {
                    let _ = taken.send(());
                    message
                }
                None => break,
            },
            _ = next_keep_alive(&mut keep_alive) => OperationMessage::keep_alive(),
        };

        let text = match message.encode() {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(connection_id = %connection.id, err = %err, "Failed to encode message");
                continue;
            }
        };

        tracing::debug!(connection_id = %connection.id, msg = %text, "Send message");

        let written = tokio::select! {
            biased;
            _ = connection.shutdown.cancelled() => break,
            written = write_frame(&mut sink, text, config.write_timeout) => written,
        };
        if let Err(err) = written {
            tracing::warn!(connection_id = %connection.id, err = %err, "Sending message failed");
            break;
        }
    }

    connection.close();
    let _ = tokio::time::timeout(config.write_timeout, sink.close()).await;
}

async fn write_frame(sink: &mut FrameSink, text: String, deadline: Duration) -> Result<(), TransportError> {
    match tokio::time::timeout(deadline, sink.send(text)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::WriteTimeout(deadline)),
    }
}

async fn next_keep_alive(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn read_pump(connection: Arc<WsConnection>, mut stream: FrameStream, read_limit: usize) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = connection.shutdown.cancelled() => break,
            frame = stream.next() => frame,
        };

        let bytes = match frame {
            Some(Ok(Frame::Text(text))) => text.into_bytes(),
            Some(Ok(Frame::Binary(bytes))) => bytes,
            Some(Ok(Frame::Control)) => continue,
            Some(Ok(Frame::Close)) | None => {
                tracing::info!(connection_id = %connection.id, "Socket closed by peer");
                break;
            }
            Some(Err(err)) => {
                tracing::warn!(connection_id = %connection.id, reason = %err, "Closing connection");
                break;
            }
        };

        let message = match OperationMessage::decode(&bytes, read_limit) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(connection_id = %connection.id, reason = %err, "Closing connection");
                break;
            }
        };

        if connection.handle_message(message).await.is_break() {
            break;
        }
    }

    connection.close();
}
