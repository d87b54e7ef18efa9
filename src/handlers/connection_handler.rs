use std::net::SocketAddr;

use futures_channel::mpsc::unbounded;
use futures_util::StreamExt;
use log::{info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use crate::{
    handlers::command_handler::{execute_command, handle_disconnect, ConnectionSession},
    helpers::{lock, parse_command},
    models::communication::Response,
    server_messages::send_message,
    state::ServerState,
};

/// Drives one WebSocket connection from handshake to close. Plain TCP and
/// TLS streams go through the same path.
pub async fn handle_connection<S>(state: ServerState, raw_stream: S, addr: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    info!("Incoming TCP connection from: {}", &addr);

    let ws_stream = match tokio_tungstenite::accept_async(raw_stream).await {
        Ok(stream) => stream,
        Err(error) => {
            warn!("Handshake with {} error: {}", addr, error);
            return;
        }
    };
    info!("WebSocket connection established: {}", &addr);

    let connection_id = Uuid::new_v4().to_string();
    let (tx, rx) = unbounded();
    lock(&state.peers).insert(connection_id.clone(), tx);

    let (outgoing, mut incoming) = ws_stream.split();
    let forward = tokio::spawn(rx.map(Ok).forward(outgoing));

    let mut session = ConnectionSession::new(connection_id.clone());
    while let Some(frame) = incoming.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(error) => {
                warn!("Connection {} read error: {}", &connection_id, error);
                break;
            }
        };
        if msg.is_close() {
            break;
        }
        if !(msg.is_text() || msg.is_binary()) {
            continue;
        }

        match parse_command(&msg) {
            Ok(command) => execute_command(command, &state, &mut session).await,
            Err(error) => {
                warn!("Error parsing command!: {}", error);
                let response = Response::room_error {
                    message: format!("Malformed message: {}", error),
                };
                send_message(&response, &state.peers, &connection_id);
            }
        }
    }

    info!("{} disconnected", &addr);
    lock(&state.peers).remove(&connection_id);
    forward.abort();
    handle_disconnect(&state, &mut session);
}
