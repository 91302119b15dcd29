//! Parley chat protocol server.
//!
//! Line-based chat over TCP: clients claim an 8-character identifier, then
//! exchange direct messages and roster queries while a per-session heartbeat
//! watches for dead peers.
//!
//! ## Architecture
//!
//! ```text
//! parley-server
//!   ├─ Server          (bind + accept loop, per-connection supervision)
//!   ├─ Session         (Authorizing → Active → Closed state machine)
//!   ├─ ClientRegistry  (shared identifier → peer-handle map)
//!   ├─ heartbeat       (per-session liveness monitor)
//!   └─ SystemEnv       (production time/randomness)
//! ```
//!
//! One tokio task per connection processes commands; one more per active
//! session runs the heartbeat. The registry is the only state shared across
//! sessions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod env;
mod error;
mod heartbeat;
mod registry;
mod session;
mod system_env;

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::net::TcpListener;

pub use env::Environment;
pub use error::ServerError;
pub use heartbeat::HeartbeatConfig;
pub use registry::{ClientRegistry, OutboxClosed, PeerHandle};
pub use session::SessionError;
pub use system_env::SystemEnv;

use session::Session;

/// Default hard cap on incoming line length, in bytes.
///
/// Generous headroom over the longest legal command
/// (`MESG` + identifier + 256-character body).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 512;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "0.0.0.0:7667").
    pub bind_address: String,
    /// Hard cap on incoming line length in bytes; longer lines are fatal to
    /// the offending connection.
    pub max_line_length: usize,
    /// Heartbeat timing and tolerance.
    pub heartbeat: HeartbeatConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7667".to_string(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

/// The parley server: a TCP listener spawning one supervised session task
/// per connection.
pub struct Server {
    listener: TcpListener,
    registry: ClientRegistry,
    env: SystemEnv,
    config: ServerConfig,
}

impl Server {
    /// Validate the configuration and bind the listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] for unusable heartbeat or framing
    /// parameters, [`ServerError::Transport`] if binding fails.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        if config.heartbeat.max_missed == 0 {
            return Err(ServerError::Config("max_missed must be at least 1".to_string()));
        }
        if config.heartbeat.pong_wait > config.heartbeat.ping_interval {
            return Err(ServerError::Config(
                "pong_wait must not exceed ping_interval".to_string(),
            ));
        }
        if config.max_line_length < parley_proto::MAX_BODY_LEN {
            return Err(ServerError::Config(format!(
                "max_line_length must be at least {}",
                parley_proto::MAX_BODY_LEN
            )));
        }

        let listener = TcpListener::bind(&config.bind_address).await?;

        Ok(Self { listener, registry: ClientRegistry::new(), env: SystemEnv::new(), config })
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections and run sessions until shut down externally.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server listening on {}", self.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((socket, addr)) => {
                    let conn_id = self.env.random_u64();
                    let registry = self.registry.clone();
                    let session = Session::new(
                        conn_id,
                        addr,
                        registry.clone(),
                        self.env.clone(),
                        self.config.heartbeat,
                        self.config.max_line_length,
                    );

                    tokio::spawn(async move {
                        tracing::info!(conn_id, %addr, "client connected");
                        supervise(session.run(socket), conn_id, addr, registry).await;
                    });
                }
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Run one session future to completion, containing its faults.
///
/// A panicking session must neither take down the dispatcher nor leak its
/// registry claim, so panics are caught at this boundary and converted into
/// a teardown via the connection-id backstop.
async fn supervise(
    session: impl Future<Output = Result<(), SessionError>>,
    conn_id: u64,
    addr: std::net::SocketAddr,
    registry: ClientRegistry,
) {
    match AssertUnwindSafe(session).catch_unwind().await {
        Ok(Ok(())) => {
            tracing::info!(conn_id, %addr, "client disconnected");
        }
        Ok(Err(e)) => {
            tracing::warn!(conn_id, %addr, "session error: {}", e);
        }
        Err(_) => {
            tracing::error!(conn_id, %addr, "session panicked");
            if let Some(id) = registry.release_conn(conn_id).await {
                tracing::warn!(conn_id, %id, "released identifier after panic");
            }
        }
    }
}
