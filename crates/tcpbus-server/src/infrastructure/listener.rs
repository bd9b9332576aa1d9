//! Listener: configuration, uplink resolution and the accept loop.
//!
//! A [`Listener`] is built from one descriptor instance.  Configuring it only
//! validates settings; nothing touches the network until [`Listener::start`],
//! which resolves the `uplink` endpoint through the injected [`Broker`] and
//! spawns the accept loop as its own Tokio task.
//!
//! # Accept loop
//!
//! 1. Resolve the interface (empty = all interfaces) and bind with the
//!    configured backlog.
//! 2. Publish the bound address on the [`ListenerHandle`].
//! 3. For each accepted connection, create a [`Session`] and start it.  A
//!    session that fails to start is logged and dropped; the loop keeps
//!    accepting.
//!
//! A bind failure or an `accept()` error ends the loop.  Either is logged and
//! visible through [`ListenerHandle::is_finished`].

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use thiserror::Error;
use tokio::net::{lookup_host, TcpListener, TcpSocket};
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{error, info};

use tcpbus_core::{Broker, ServerEndpoint};

use crate::application::SessionRegistry;
use crate::domain::{ConfigError, InstanceDescriptor, ListenerConfig, UPLINK_ENDPOINT};
use crate::infrastructure::session::{Session, SessionContext};

/// Errors raised while configuring or running a listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("not found: \"{0}\"")]
    EndpointNotFound(String),

    #[error("listener {0} already started")]
    AlreadyStarted(String),

    #[error("cannot resolve interface \"{interface}\": {source}")]
    Resolve {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
}

/// A configured listener instance.
pub struct Listener {
    id: String,
    config: ListenerConfig,
    uplink_url: String,
    broker: Arc<dyn Broker>,
    registry: Arc<SessionRegistry>,
    started: AtomicBool,
}

impl Listener {
    /// Validates `descriptor` and builds a listener.
    ///
    /// # Errors
    ///
    /// [`ListenerError::Config`] for a missing or malformed setting, or when
    /// the descriptor has no `uplink` client endpoint.
    pub fn configure(
        descriptor: &InstanceDescriptor,
        broker: Arc<dyn Broker>,
    ) -> Result<Self, ListenerError> {
        info!("configuring listener {}", descriptor.name);
        let config = ListenerConfig::from_settings(&descriptor.settings)?;
        let uplink_url = descriptor
            .client_endpoint(UPLINK_ENDPOINT)
            .ok_or(ConfigError::MissingEndpoint(UPLINK_ENDPOINT))?
            .to_string();

        Ok(Self {
            id: descriptor.name.clone(),
            config,
            uplink_url,
            broker,
            registry: Arc::new(SessionRegistry::new()),
            started: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    pub fn uplink_url(&self) -> &str {
        &self.uplink_url
    }

    /// Live sessions of this listener.
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Resolves the uplink and spawns the accept loop.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`ListenerError::AlreadyStarted`] on a second successful call.
    /// - [`ListenerError::EndpointNotFound`] when the broker does not know the
    ///   uplink URL.  The listener may be started again later.
    pub fn start(&self) -> Result<ListenerHandle, ListenerError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ListenerError::AlreadyStarted(self.id.clone()));
        }
        info!("starting listener {}", self.id);

        let Some(uplink) = self.broker.resolve(&self.uplink_url) else {
            self.started.store(false, Ordering::Release);
            return Err(ListenerError::EndpointNotFound(self.uplink_url.clone()));
        };

        let ctx = SessionContext {
            listener_id: self.id.clone(),
            bufsize: self.config.bufsize,
            registry: Arc::clone(&self.registry),
        };
        let (bound_tx, bound_rx) = watch::channel(None);
        let task = tokio::spawn(run_accept_loop(
            self.id.clone(),
            self.config.clone(),
            ctx,
            uplink,
            bound_tx,
        ));

        Ok(ListenerHandle {
            id: self.id.clone(),
            bound: bound_rx,
            task,
        })
    }
}

/// Handle to a running accept loop.
pub struct ListenerHandle {
    id: String,
    bound: watch::Receiver<Option<SocketAddr>>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Waits until the socket is bound and returns its address.
    ///
    /// Returns `None` if the accept loop ended without binding.
    pub async fn local_addr(&mut self) -> Option<SocketAddr> {
        loop {
            let current = *self.bound.borrow_and_update();
            if current.is_some() {
                return current;
            }
            if self.bound.changed().await.is_err() {
                return *self.bound.borrow();
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.task.abort_handle()
    }

    /// Stops accepting.  Sessions already running are not affected.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Waits for the accept loop to end.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            if e.is_panic() {
                error!("listener {}: accept loop panicked", self.id);
            }
        }
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

async fn run_accept_loop(
    id: String,
    config: ListenerConfig,
    ctx: SessionContext,
    uplink: Arc<dyn ServerEndpoint>,
    bound_tx: watch::Sender<Option<SocketAddr>>,
) {
    info!("listener {id}: enter accept loop");
    if let Err(e) = accept_connections(&id, &config, &ctx, &uplink, &bound_tx).await {
        error!("listener {id}: {e}");
    }
    info!("listener {id}: exit accept loop");
}

async fn accept_connections(
    id: &str,
    config: &ListenerConfig,
    ctx: &SessionContext,
    uplink: &Arc<dyn ServerEndpoint>,
    bound_tx: &watch::Sender<Option<SocketAddr>>,
) -> Result<(), ListenerError> {
    let listener = bind(config).await?;
    let local_addr = listener.local_addr().map_err(ListenerError::Accept)?;
    info!("listener {id}: listening on {local_addr}");
    bound_tx.send_replace(Some(local_addr));

    loop {
        let (stream, peer) = listener.accept().await.map_err(ListenerError::Accept)?;
        info!("listener {id}: accepted connection from {peer} on {local_addr}");

        let session = match std::panic::catch_unwind(AssertUnwindSafe(|| {
            Session::new(ctx, Some(peer))
        })) {
            Ok(session) => session,
            Err(_) => {
                error!("listener {id}: unknown failure creating session for {peer}");
                continue;
            }
        };

        let started = AssertUnwindSafe(session.start(uplink, stream))
            .catch_unwind()
            .await;
        match started {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("listener {id}: session for {peer} failed to start: {e}");
                session.abandon();
            }
            Err(_) => {
                error!("listener {id}: unknown failure starting session for {peer}");
                session.abandon();
            }
        }
    }
}

async fn bind(config: &ListenerConfig) -> Result<TcpListener, ListenerError> {
    let addr = bind_addr(config).await?;
    let bind_error = |source| ListenerError::Bind { addr, source };

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_error)?;
    socket.set_reuseaddr(true).map_err(bind_error)?;
    socket.bind(addr).map_err(bind_error)?;
    socket.listen(config.backlog).map_err(bind_error)
}

/// Empty interface → `0.0.0.0`; an IP literal is used as-is; anything else is
/// looked up as a host name and the first address wins.
async fn bind_addr(config: &ListenerConfig) -> Result<SocketAddr, ListenerError> {
    if config.binds_all_interfaces() {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.port));
    }
    if let Ok(ip) = config.interface.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, config.port));
    }

    let resolve_error = |source| ListenerError::Resolve {
        interface: config.interface.clone(),
        source,
    };
    lookup_host((config.interface.as_str(), config.port))
        .await
        .map_err(resolve_error)?
        .next()
        .ok_or_else(|| resolve_error(io::Error::new(io::ErrorKind::NotFound, "no addresses")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
