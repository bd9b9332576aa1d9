//! Session: one accepted TCP connection relayed onto one uplink channel.
//!
//! # Data flow
//!
//! ```text
//!  peer ──bytes──► worker task ──{"data": blob}──► uplink
//!  peer ◄──bytes── on_receive  ◄──{"data": blob}── uplink
//! ```
//!
//! The worker task owns the read half of the socket.  The write half lives in
//! an async mutex because the uplink may deliver from any task.
//!
//! # Teardown
//!
//! [`Session::exit`] can be triggered concurrently by the worker (peer closed,
//! read error), by `on_receive` (write failure) or by `on_close` (uplink went
//! away).  The first caller wins under the `exiting` lock and atomically stops
//! the endpoint from accepting further callbacks; every later caller returns
//! immediately.  The winner then releases the socket and the uplink outside the
//! lock, so a callback that is itself waiting on the session never deadlocks.
//!
//! The worker removes the session from the [`SessionRegistry`] only after
//! teardown has finished.  An entry that has left the registry has released
//! everything it owned.

use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, error, info, warn};

use tcpbus_core::{
    data_message, take_data, ChannelError, EndpointState, LocalEndpoint, Message,
    MessagePriority, ServerEndpoint, UplinkHandler,
};

use crate::application::{SessionRecord, SessionRegistry};
use crate::domain::{SessionId, SessionState};

type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;
type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Errors surfaced by a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session already started")]
    AlreadyStarted,

    #[error("uplink: {0}")]
    Channel(#[from] ChannelError),

    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("socket accepted no bytes")]
    WriteZero,

    #[error("socket is closed")]
    SocketClosed,
}

/// Everything a listener hands to each session it creates.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub listener_id: String,
    pub bufsize: usize,
    pub registry: Arc<SessionRegistry>,
}

pub struct Session {
    id: SessionId,
    bufsize: usize,
    registry: Arc<SessionRegistry>,
    record: Arc<SessionRecord>,
    endpoint: Arc<LocalEndpoint>,
    writer: AsyncMutex<Option<BoxedWriter>>,
    exiting: Mutex<bool>,
    started: AtomicBool,
    /// Raised once teardown begins; unblocks the worker's read and any write.
    stop_tx: watch::Sender<bool>,
    /// Raised once teardown has finished.
    exited_tx: watch::Sender<bool>,
}

impl Session {
    /// Creates a session and registers it as `Created`.
    pub fn new(ctx: &SessionContext, peer: Option<SocketAddr>) -> Arc<Self> {
        let id = SessionId::new(&ctx.listener_id);
        let record = ctx.registry.register(id.clone(), peer);
        let endpoint = LocalEndpoint::new(id.as_str());
        let (stop_tx, _) = watch::channel(false);
        let (exited_tx, _) = watch::channel(false);
        debug!("session {id}: created");

        Arc::new(Self {
            id,
            bufsize: ctx.bufsize,
            registry: Arc::clone(&ctx.registry),
            record,
            endpoint,
            writer: AsyncMutex::new(None),
            exiting: Mutex::new(false),
            started: AtomicBool::new(false),
            stop_tx,
            exited_tx,
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.record.state()
    }

    pub fn endpoint_state(&self) -> EndpointState {
        self.endpoint.state()
    }

    pub fn is_exiting(&self) -> bool {
        *self.exiting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connects the uplink, takes ownership of `stream` and spawns the worker.
    ///
    /// # Errors
    ///
    /// - [`SessionError::AlreadyStarted`] on a second call.
    /// - [`SessionError::Channel`] when the uplink refuses the connection.  The
    ///   session has then already been released from the registry.
    ///
    /// If this future unwinds, the caller must call `abandon` to break the
    /// handler reference cycle and free the registry entry.
    pub async fn start(
        self: &Arc<Self>,
        uplink: &Arc<dyn ServerEndpoint>,
        stream: TcpStream,
    ) -> Result<(), SessionError> {
        let (reader, writer) = stream.into_split();
        self.start_with_io(uplink, reader, writer).await
    }

    /// Same as [`Session::start`] over arbitrary byte streams.
    pub async fn start_with_io<R, W>(
        self: &Arc<Self>,
        uplink: &Arc<dyn ServerEndpoint>,
        reader: R,
        writer: W,
    ) -> Result<(), SessionError>
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(SessionError::AlreadyStarted);
        }

        let remote = match uplink.connect(Arc::clone(&self.endpoint)) {
            Ok(remote) => remote,
            Err(e) => {
                self.abandon();
                return Err(e.into());
            }
        };
        self.endpoint
            .set_handler(Arc::clone(self) as Arc<dyn UplinkHandler>);
        self.endpoint.set_remote(remote);
        *self.writer.lock().await = Some(Box::pin(writer));

        self.record.advance_to(SessionState::Started);
        let buffer = vec![0u8; self.bufsize];
        tokio::spawn(Arc::clone(self).run(Box::pin(reader), buffer));
        Ok(())
    }

    /// Releases a session whose worker never started.
    ///
    /// Drops the uplink handler (which holds the session itself), the remote
    /// proxy and the socket write half, then removes the registry entry.
    /// Called when `start` fails or unwinds before spawning the worker.
    pub(crate) fn abandon(&self) {
        *self.exiting.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.endpoint.release();
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
        self.registry.release(&self.id);
        debug!("session {}: abandoned before start", self.id);
    }

    // ── Worker ────────────────────────────────────────────────────────────────

    async fn run(self: Arc<Self>, reader: BoxedReader, buffer: Vec<u8>) {
        info!("session {}: enter worker", self.id);

        let outcome = AssertUnwindSafe(self.relay_inbound(reader, buffer))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("session {}: {e}", self.id),
            Err(_) => error!("session {}: unknown failure in worker", self.id),
        }

        self.exit().await;
        // Another task may have won the exit race; wait for its teardown.
        let mut exited = self.exited_tx.subscribe();
        flag_raised(&mut exited).await;

        self.registry.release(&self.id);
        info!("session {}: exit worker", self.id);
    }

    async fn relay_inbound(
        &self,
        mut reader: BoxedReader,
        mut buffer: Vec<u8>,
    ) -> Result<(), SessionError> {
        let mut stop = self.stop_tx.subscribe();
        let opened = tokio::select! {
            biased;
            () = flag_raised(&mut stop) => {
                debug!("session {}: stop requested while opening uplink", self.id);
                return Ok(());
            }
            opened = self.endpoint.open() => opened,
        };
        if let Err(e) = opened {
            return if self.is_exiting() {
                Ok(())
            } else {
                Err(e.into())
            };
        }
        self.record.advance_to(SessionState::Running);
        debug!("session {}: uplink open", self.id);

        loop {
            let n = tokio::select! {
                biased;
                () = flag_raised(&mut stop) => {
                    debug!("session {}: stop requested", self.id);
                    return Ok(());
                }
                read = reader.read(&mut buffer) => read?,
            };
            if n == 0 {
                info!("session {}: regular close by peer", self.id);
                return Ok(());
            }

            self.record.add_bytes_in(n as u64);
            if let Err(e) = self
                .endpoint
                .send(data_message(&buffer[..n]), MessagePriority::Routine)
            {
                return if self.is_exiting() {
                    Ok(())
                } else {
                    Err(e.into())
                };
            }
        }
    }

    // ── Socket writes ─────────────────────────────────────────────────────────

    /// Writes all of `payload`, looping over partial writes.
    ///
    /// Aborts with [`SessionError::SocketClosed`] as soon as teardown begins.
    async fn write_to_socket(&self, payload: &[u8]) -> Result<(), SessionError> {
        let mut stop = self.stop_tx.subscribe();
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(SessionError::SocketClosed)?;

        let mut written = 0;
        while written < payload.len() {
            let n = tokio::select! {
                biased;
                () = flag_raised(&mut stop) => return Err(SessionError::SocketClosed),
                result = writer.write(&payload[written..]) => result?,
            };
            if n == 0 {
                return Err(SessionError::WriteZero);
            }
            written += n;
            self.record.add_bytes_out(n as u64);
        }

        tokio::select! {
            biased;
            () = flag_raised(&mut stop) => Err(SessionError::SocketClosed),
            result = writer.flush() => result.map_err(SessionError::from),
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Tears the session down.  Safe to call any number of times from any task.
    pub async fn exit(&self) {
        {
            let mut exiting = self.exiting.lock().unwrap_or_else(PoisonError::into_inner);
            if *exiting {
                return;
            }
            *exiting = true;
            self.endpoint.begin_closing();
        }

        info!("session {}: exiting", self.id);
        self.record.advance_to(SessionState::Exiting);
        self.stop_tx.send_replace(true);

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!("session {}: socket shutdown: {e}", self.id);
            }
        }

        if let Err(e) = self.endpoint.close(Message::new()).await {
            debug!("session {}: closing uplink: {e}", self.id);
        }
        self.endpoint.release();

        self.exited_tx.send_replace(true);
        debug!("session {}: torn down", self.id);
    }
}

#[async_trait]
impl UplinkHandler for Session {
    async fn on_close(&self, parameter: Message) {
        info!("session {}: uplink closed ({parameter})", self.id);
        self.exit().await;
    }

    async fn on_receive(&self, message: Message, priority: MessagePriority) {
        debug!("session {}: {priority} message from uplink", self.id);
        let payload = match take_data(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("session {}: {e}; message ignored", self.id);
                return;
            }
        };

        if let Err(e) = self.write_to_socket(&payload).await {
            if self.is_exiting() {
                debug!("session {}: write abandoned: {e}", self.id);
            } else {
                warn!("session {}: write to socket failed: {e}", self.id);
            }
            self.exit().await;
        }
    }

    async fn on_ctrl(&self, request: Message) -> Message {
        info!("session {}: control request {request}", self.id);
        Message::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!("session {}: dropped", self.id);
    }
}

/// Resolves once `rx` reads `true` or its sender is gone.
async fn flag_raised(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
