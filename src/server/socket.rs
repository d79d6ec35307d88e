//! Per-connection WebSocket pump

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::time::timeout;
use tracing::{debug, instrument};

use crate::connection::{ConnectionHandle, ConnectionId, Payload};
use crate::relay::SessionEvent;
use crate::shutdown::wait_for_shutdown;
use super::AppState;

/// Drive one upgraded connection until the peer leaves or the server shuts down.
///
/// Inbound frames are fed to the connection's session in arrival order. A
/// separate writer task drains the bounded outbound queue into the socket,
/// so a slow client only delays its own deliveries. Once its queue is full,
/// broadcasts skip it until the writer catches up.
#[instrument(skip(socket, state), fields(connection_id = %id))]
pub async fn handle_socket(socket: WebSocket, id: ConnectionId, state: AppState) {
    let mut shutdown_rx = state.shutdown.subscribe();
    if state.shutdown.is_triggered() {
        debug!(connection_id = %id, "Server is shutting down, refusing connection");
        let _ = socket.close().await;
        return;
    }

    let (mut sink, mut stream) = socket.split();
    let (handle, mut outbound) = ConnectionHandle::bounded(state.outbound_capacity);

    let writer_id = id.clone();
    let writer = tokio::spawn(async move {
        while let Some(payload) = outbound.recv().await {
            if let Err(e) = sink.send(payload.into_message()).await {
                debug!(connection_id = %writer_id, error = %e, "Failed to write to client");
                return;
            }
        }
        // every sender is gone: the session closed
        let _ = sink.close().await;
    });

    let mut session = state.dispatcher.open_session(id.clone(), handle);
    session.handle_event(SessionEvent::Accept);

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(message)) => {
                        if let Some(payload) = Payload::from_message(message) {
                            session.handle_event(SessionEvent::Message(payload));
                        }
                    }
                    Some(Err(e)) => {
                        debug!(connection_id = %id, error = %e, "WebSocket read error");
                        break;
                    }
                }
            }
            _ = wait_for_shutdown(&mut shutdown_rx) => {
                debug!(connection_id = %id, "Closing connection for shutdown");
                break;
            }
        }
    }

    session.handle_event(SessionEvent::Close);
    drop(session);

    if timeout(state.shutdown.timeout(), writer).await.is_err() {
        debug!(connection_id = %id, "Writer did not finish in time, detaching");
    }
}
