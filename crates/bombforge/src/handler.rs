//! Per-connection handler: join handshake, inbound decoding, outbound pump.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Read `name` / `room` from the request query and join a room
//!   2. Loop: forward queued frames to the socket, decode inbound frames
//!      into actions and hand them to the engine
//!   3. On exit, for whatever reason, the player leaves the room

use std::sync::Arc;
use std::time::Duration;

use bombforge_protocol::{
    Action, ClientMessage, Codec, Envelope, JoinRequest, PlayerId, RoomId, ServerEvent,
};
use bombforge_room::{Engine, RoomError, Seat};
use bombforge_tick::now;
use bombforge_transport::{Connection, WebSocketConnection};
use tokio::time;

use crate::BombforgeError;

/// Drop guard that removes the player from their room when the handler
/// exits, including on error or panic.
struct SeatGuard<C: Codec> {
    player_id: PlayerId,
    room_id: RoomId,
    engine: Arc<Engine<C>>,
}

impl<C: Codec> Drop for SeatGuard<C> {
    fn drop(&mut self) {
        self.engine.leave(self.player_id, &self.room_id, now());
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    engine: Arc<Engine<C>>,
    read_timeout: Duration,
) -> Result<(), BombforgeError> {
    let conn_id = conn.id();
    let request = JoinRequest::from_query(conn.query());

    let Seat {
        player_id,
        room_id,
        mut receiver,
    } = match engine.join(&request, now()) {
        Ok(seat) => seat,
        Err(e) => {
            tracing::info!(%conn_id, error = %e, "join refused");
            send_error(&conn, engine.codec(), &refusal_message(&e)).await?;
            close_quietly(&conn).await;
            return Err(e.into());
        }
    };
    tracing::info!(%conn_id, %player_id, %room_id, "player connected");

    let _guard = SeatGuard {
        player_id,
        room_id: room_id.clone(),
        engine: Arc::clone(&engine),
    };

    let idle = time::sleep(read_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            frame = receiver.recv() => match frame {
                Some(frame) => conn.send(&frame).await?,
                None => {
                    tracing::debug!(%player_id, "session closed by server");
                    close_quietly(&conn).await;
                    break;
                }
            },
            inbound = conn.recv() => {
                idle.as_mut().reset(time::Instant::now() + read_timeout);
                match inbound {
                    Ok(Some(data)) => {
                        handle_inbound(&conn, &engine, player_id, &room_id, &data).await?;
                    }
                    Ok(None) => {
                        tracing::info!(%player_id, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%player_id, error = %e, "recv error");
                        break;
                    }
                }
            }
            () = &mut idle => {
                tracing::info!(%player_id, "connection timed out");
                close_quietly(&conn).await;
                break;
            }
        }
    }

    // _guard drops here → the player leaves the room.
    Ok(())
}

/// Decodes one inbound frame and applies it. Malformed frames are answered
/// with an `error` event and change nothing.
async fn handle_inbound<C: Codec>(
    conn: &WebSocketConnection,
    engine: &Engine<C>,
    player_id: PlayerId,
    room_id: &RoomId,
    data: &[u8],
) -> Result<(), BombforgeError> {
    let action = match engine
        .codec()
        .decode::<ClientMessage>(data)
        .and_then(Action::try_from)
    {
        Ok(action) => action,
        Err(e) => {
            tracing::debug!(%player_id, error = %e, "rejected inbound message");
            return send_error(conn, engine.codec(), &format!("invalid message: {e}")).await;
        }
    };
    engine.act(player_id, room_id, action, now());
    Ok(())
}

/// The text a refused client sees.
fn refusal_message(err: &RoomError) -> String {
    match err {
        RoomError::RoomFull(_) => "Room is full".to_string(),
        RoomError::InvalidRequest(message) => message.clone(),
        other => other.to_string(),
    }
}

/// Sends an `error{message}` event straight to the socket.
async fn send_error(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    message: &str,
) -> Result<(), BombforgeError> {
    let bytes = codec.encode(&Envelope::new(ServerEvent::error(message)))?;
    conn.send(&bytes).await?;
    Ok(())
}

async fn close_quietly(conn: &WebSocketConnection) {
    if let Err(e) = conn.close().await {
        tracing::trace!(conn_id = %conn.id(), error = %e, "close failed");
    }
}
