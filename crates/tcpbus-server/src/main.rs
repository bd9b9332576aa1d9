//! tcpbus server entry point.
//!
//! This binary opens one TCP listener per descriptor instance and relays every
//! accepted connection onto the instance's `uplink` bus endpoint.  Bytes from
//! the peer travel as `{"data": <blob>}` messages; blob messages from the
//! uplink are written back to the peer.
//!
//! # Usage
//!
//! ```text
//! tcpbus-server [OPTIONS]
//!
//! Options:
//!   -c, --config <PATH>            Descriptor file [default: tcpbus.toml]
//!       --instance <NAME>          Start only this instance (repeatable)
//!       --log-level <FILTER>       Log filter when RUST_LOG is unset
//!       --status-interval <SECS>   Seconds between status lines, 0 = off [default: 0]
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                 | Default       | Description                    |
//! |--------------------------|---------------|--------------------------------|
//! | `TCPBUS_CONFIG`          | `tcpbus.toml` | Descriptor file                |
//! | `TCPBUS_LOG`             | (descriptor)  | Log filter                     |
//! | `TCPBUS_STATUS_INTERVAL` | `0`           | Status line interval (secs)    |
//!
//! The log filter is chosen in this order: `RUST_LOG`, `--log-level`, the
//! descriptor's `log_level`, then `info`.
//!
//! # Built-in services
//!
//! The in-process broker serves `local:echo`, which sends every message back
//! to its sender.  It turns any instance into a TCP echo server and is handy
//! for smoke tests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use futures_util::future::join_all;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tcpbus_core::{Broker, EchoService, MemoryBroker};
use tcpbus_server::application::SessionRegistry;
use tcpbus_server::domain::{InstanceDescriptor, ServerDescriptor};
use tcpbus_server::infrastructure::{load_descriptor, Listener, ListenerHandle};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// TCP-to-message-bus bridge.
#[derive(Debug, Parser)]
#[command(
    name = "tcpbus-server",
    about = "Relays TCP connections onto message-bus uplink channels",
    version
)]
struct Cli {
    /// Path to the TOML descriptor listing listener instances.
    #[arg(long, short, default_value = "tcpbus.toml", env = "TCPBUS_CONFIG")]
    config: PathBuf,

    /// Start only the named instance.  May be given more than once.
    ///
    /// Without this option every instance in the descriptor is started.
    #[arg(long = "instance", value_name = "NAME")]
    instances: Vec<String>,

    /// Log filter used when `RUST_LOG` is not set (e.g. `debug`,
    /// `tcpbus_server=trace`).  Overrides the descriptor's `log_level`.
    #[arg(long, env = "TCPBUS_LOG")]
    log_level: Option<String>,

    /// Seconds between status lines listing live sessions.  `0` disables them.
    #[arg(long, default_value_t = 0, env = "TCPBUS_STATUS_INTERVAL")]
    status_interval: u64,
}

impl Cli {
    /// Log filter to fall back on when `RUST_LOG` is absent.
    fn log_filter(&self, descriptor: &ServerDescriptor) -> String {
        self.log_level
            .clone()
            .or_else(|| descriptor.log_level.clone())
            .unwrap_or_else(|| "info".to_string())
    }

    /// Instances to start, in descriptor order.
    ///
    /// # Errors
    ///
    /// Returns an error if `--instance` names an instance the descriptor does
    /// not define.
    fn select_instances<'a>(
        &self,
        descriptor: &'a ServerDescriptor,
    ) -> anyhow::Result<Vec<&'a InstanceDescriptor>> {
        if self.instances.is_empty() {
            return Ok(descriptor.instances.iter().collect());
        }
        for name in &self.instances {
            descriptor
                .instance(name)
                .with_context(|| format!("instance '{name}' is not defined in the descriptor"))?;
        }
        Ok(descriptor
            .instances
            .iter()
            .filter(|i| self.instances.contains(&i.name))
            .collect())
    }

    fn status_interval(&self) -> Option<Duration> {
        (self.status_interval > 0).then(|| Duration::from_secs(self.status_interval))
    }
}

// ── Status reporting ──────────────────────────────────────────────────────────

fn status_line(listener_id: &str, registry: &SessionRegistry) -> String {
    let sessions = registry.snapshot();
    let bytes_in: u64 = sessions.iter().map(|s| s.bytes_in).sum();
    let bytes_out: u64 = sessions.iter().map(|s| s.bytes_out).sum();
    format!(
        "listener {listener_id}: {} live session(s), {bytes_in} bytes in, {bytes_out} bytes out",
        sessions.len()
    )
}

fn log_status(registries: &[(String, Arc<SessionRegistry>)]) {
    for (id, registry) in registries {
        info!("{}", status_line(id, registry));
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and the descriptor is loaded.
/// 2. `tracing_subscriber` is initialised.
/// 3. The in-process broker is created with the built-in services.
/// 4. Every selected instance is configured and started.  Any failure here
///    aborts startup.
/// 5. The process runs until Ctrl+C or until every accept loop has ended.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let descriptor = load_descriptor(&cli.config)
        .with_context(|| format!("cannot load descriptor {}", cli.config.display()))?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    let fallback = cli.log_filter(&descriptor);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();

    info!("tcpbus server starting, descriptor={}", cli.config.display());

    // ── Bus ───────────────────────────────────────────────────────────────────
    let memory = Arc::new(MemoryBroker::new());
    memory.register("echo", Arc::new(EchoService::new()));
    let broker: Arc<dyn Broker> = memory;

    // ── Listeners ─────────────────────────────────────────────────────────────
    let mut listeners = Vec::new();
    let mut handles: Vec<ListenerHandle> = Vec::new();
    for instance in cli.select_instances(&descriptor)? {
        let listener = Listener::configure(instance, Arc::clone(&broker))
            .with_context(|| format!("cannot configure instance '{}'", instance.name))?;
        let mut handle = listener
            .start()
            .with_context(|| format!("cannot start instance '{}'", instance.name))?;
        match handle.local_addr().await {
            Some(addr) => info!(
                "instance '{}' listening on {addr}, uplink {}",
                listener.id(),
                listener.uplink_url()
            ),
            None => error!("instance '{}' failed to bind", listener.id()),
        }
        listeners.push(listener);
        handles.push(handle);
    }

    let registries: Vec<(String, Arc<SessionRegistry>)> = listeners
        .iter()
        .map(|l| (l.id().to_string(), l.registry()))
        .collect();

    if let Some(period) = cli.status_interval() {
        let registries = registries.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                log_status(&registries);
            }
        });
    }

    // ── Run until Ctrl+C or every listener stops ──────────────────────────────
    let aborts: Vec<_> = handles.iter().map(ListenerHandle::abort_handle).collect();
    let all_stopped = join_all(handles.into_iter().map(ListenerHandle::join));
    tokio::select! {
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("received Ctrl+C, shutting down"),
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        },
        _ = all_stopped => info!("all listeners have stopped"),
    }
    for abort in aborts {
        abort.abort();
    }

    log_status(&registries);
    info!("tcpbus server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
