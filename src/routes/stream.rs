use rocket::futures::{SinkExt, StreamExt};
use rocket::{State, get};
use rocket_ws as ws;
use tokio::sync::mpsc;

use super::{ApiError, ClientIp, resolve_room};
use crate::coordinator::SessionEvent;
use crate::registry::RoomRegistry;

/// Upgrade to the room's duplex stream. The socket task owns the connection;
/// the coordinator owns the session. They meet over an unbounded channel so
/// a slow socket never stalls the room.
#[get("/api/room/<name>/websocket")]
pub fn websocket(
    ws: ws::WebSocket,
    registry: &State<RoomRegistry>,
    name: &str,
    ip: ClientIp,
) -> Result<ws::Channel<'static>, ApiError> {
    let room = resolve_room(registry, name)?;
    let source_key = ip.0;

    Ok(ws.channel(move |mut stream| {
        Box::pin(async move {
            let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
            let session_id = room.connect(source_key, outbound_tx);

            loop {
                tokio::select! {
                    inbound = stream.next() => match inbound {
                        Some(Ok(ws::Message::Text(text))) => room.inbound(session_id, text),
                        Some(Ok(ws::Message::Close(_))) | None => break,
                        Some(Ok(_)) => {} // ping/pong and binary are not part of the protocol
                        Some(Err(_)) => break,
                    },
                    event = outbound_rx.recv() => match event {
                        Some(SessionEvent::Frame(text)) => {
                            if stream.send(ws::Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Some(SessionEvent::Close { reason }) => {
                            let _ = stream
                                .send(ws::Message::Close(Some(ws::frame::CloseFrame {
                                    code: ws::frame::CloseCode::Normal,
                                    reason: reason.into(),
                                })))
                                .await;
                            break;
                        }
                        None => break,
                    },
                }
            }

            // every exit path releases the session; a second disconnect for
            // an already-reaped session is a no-op
            room.disconnect(session_id);
            Ok(())
        })
    }))
}
