//! `BombforgeServer` builder and server loop.
//!
//! This is the entry point for running an arena server. It ties the layers
//! together: transport → protocol → session → room, with one game clock
//! driving every room.

use std::sync::Arc;
use std::time::Duration;

use bombforge_protocol::JsonCodec;
use bombforge_room::{Engine, RoomConfig};
use bombforge_session::SessionConfig;
use bombforge_tick::{ClockConfig, GameClock};
use bombforge_transport::{DEFAULT_MAX_MESSAGE_SIZE, Transport, WebSocketTransport};

use crate::BombforgeError;
use crate::handler::handle_connection;

/// How long a connection may stay silent before it is closed.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Builder for configuring and starting a Bombforge server.
///
/// # Example
///
/// ```rust,ignore
/// use bombforge::prelude::*;
///
/// let server = BombforgeServer::builder()
///     .bind("0.0.0.0:8080")
///     .room_config(RoomConfig { max_players: 2, ..Default::default() })
///     .build()
///     .await?;
/// server.run().await
/// ```
#[derive(Debug, Clone)]
pub struct BombforgeServerBuilder {
    bind_addr: String,
    room_config: RoomConfig,
    session_config: SessionConfig,
    clock_config: ClockConfig,
    read_timeout: Duration,
    max_message_size: usize,
}

impl BombforgeServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            room_config: RoomConfig::default(),
            session_config: SessionConfig::default(),
            clock_config: ClockConfig::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn clock_config(mut self, config: ClockConfig) -> Self {
        self.clock_config = config;
        self
    }

    /// Closes connections that send nothing for this long.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Drops clients that send a message larger than `bytes`.
    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Binds the listener and builds the engine.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`, which is what the browser
    /// client speaks.
    pub async fn build(self) -> Result<BombforgeServer, BombforgeError> {
        let transport = WebSocketTransport::bind(&self.bind_addr)
            .await?
            .with_max_message_size(self.max_message_size);
        let engine = Arc::new(Engine::new(
            JsonCodec,
            self.room_config,
            self.session_config,
        ));
        Ok(BombforgeServer {
            transport,
            engine,
            clock_config: self.clock_config.validated(),
            read_timeout: self.read_timeout,
        })
    }
}

impl Default for BombforgeServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Bombforge server.
///
/// Call [`run()`](Self::run) to start the game clock and accept players.
pub struct BombforgeServer {
    transport: WebSocketTransport,
    engine: Arc<Engine<JsonCodec>>,
    clock_config: ClockConfig,
    read_timeout: Duration,
}

impl BombforgeServer {
    pub fn builder() -> BombforgeServerBuilder {
        BombforgeServerBuilder::new()
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The engine behind this server, for room listing and creation.
    pub fn engine(&self) -> &Arc<Engine<JsonCodec>> {
        &self.engine
    }

    /// Runs the server until the process is terminated.
    ///
    /// Spawns the game clock, then accepts connections and spawns one
    /// handler task per connection. A failed accept is logged and the
    /// loop carries on.
    pub async fn run(mut self) -> Result<(), BombforgeError> {
        let clock = GameClock::new(self.clock_config.clone());
        tokio::spawn(Arc::clone(&self.engine).drive(clock));
        tracing::info!(addr = ?self.local_addr().ok(), "bombforge server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let engine = Arc::clone(&self.engine);
                    let read_timeout = self.read_timeout;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, engine, read_timeout).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
