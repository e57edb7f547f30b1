//! Bombforge arena server.
//!
//! Usage: `bombforge-server [config.toml]`. Without an argument the server
//! reads `bombforge.toml` from the working directory, and runs on defaults
//! if that file does not exist. Log verbosity follows `RUST_LOG`.

mod config;

use bombforge::BombforgeServer;
use tracing::info;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config::DEFAULT_PATH.to_string());
    let config = Config::load(&path)?;
    info!(
        bind = %config.server.bind,
        tick_rate_hz = config.clock.tick_rate_hz,
        max_players = config.room.max_players,
        "starting bombforge"
    );

    let server = BombforgeServer::builder()
        .bind(&config.server.bind)
        .room_config(config.room_config())
        .session_config(config.session_config())
        .clock_config(config.clock_config())
        .read_timeout(config.read_timeout())
        .max_message_size(config.server.max_message_size)
        .build()
        .await?;
    info!(addr = %server.local_addr()?, "listening");

    server.run().await?;
    Ok(())
}
