//! Manages the WebSocket connection lifecycle for a client session.

use super::{
    client_session::ClientSession,
    protocol::ServerMessage,
    relay::Relay,
};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, instrument};
use uuid::Uuid;

const OUTBOUND_CAPACITY: usize = 256;
/// How long the writer may keep flushing after the relay has ended.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let connections = state.connections.clone();
    ws.on_upgrade(move |socket| connections.track_future(handle_socket(socket, state)))
}

/// Runs one client connection from accept to teardown.
///
/// The client gets `ready` immediately, then the upstream session is opened
/// and the relay takes over until the session stops.
#[instrument(name = "client_session", skip_all, fields(client_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let client_id = Uuid::new_v4();
    tracing::Span::current().record("client_id", tracing::field::display(client_id));
    info!("New client connected");

    let (socket_tx, socket_rx) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let mut writer = tokio::spawn(write_outbound(socket_tx, outbound_rx).in_current_span());

    let session = ClientSession::new(client_id, outbound_tx);
    state.sessions.insert(session.clone()).await;
    session.send(ServerMessage::Ready).await;

    match state.connector.connect().await {
        Ok(upstream) => {
            info!("Upstream session established");
            let relay = Relay::new(
                session.clone(),
                upstream.sink,
                state.tools.clone(),
                state.settings.clone(),
                state.sessions.clone(),
            );
            if let Err(e) = relay.run(socket_rx, upstream.events).await {
                error!(
                    error = %e,
                    server_fault = e.is_server_fault(),
                    "Client session ended with error"
                );
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to open upstream session");
            if session.begin_teardown() {
                session.stop();
                state.sessions.remove(client_id).await;
                session.close_transport().await;
            }
        }
    }

    // A client that stopped reading can keep the writer blocked on the socket.
    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Outbound writer task ended abnormally"),
        Err(_) => {
            debug!("Outbound writer still blocked, aborting it");
            writer.abort();
        }
    }
    info!("Client disconnected");
}

/// Drains queued messages onto the socket, then closes it.
async fn write_outbound(
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<ServerMessage>,
) {
    while let Some(msg) = outbound_rx.recv().await {
        if let Err(e) = send_msg(&mut socket_tx, msg).await {
            debug!(error = %e, "Client transport closed while sending");
            return;
        }
    }
    // The peer may already be gone.
    let _ = socket_tx.send(Message::Close(None)).await;
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
