use std::io::Error as IoError;

use log::{info, warn};
use tokio::net::TcpListener;
use tokio_native_tls::TlsAcceptor;

use crate::{handlers::connection_handler::handle_connection, state::ServerState};

/// Accepts connections until the listener fails. Each connection gets its
/// own task; TLS is terminated here when an acceptor is configured.
pub async fn serve(
    listener: TcpListener,
    state: ServerState,
    tls: Option<TlsAcceptor>,
) -> Result<(), IoError> {
    info!("Listening on: {}", listener.local_addr()?);
    loop {
        let (stream, addr) = listener.accept().await?;
        let state = state.clone();
        match tls.clone() {
            Some(acceptor) => {
                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => handle_connection(state, tls_stream, addr).await,
                        Err(error) => warn!("TLS handshake with {} failed: {}", addr, error),
                    }
                });
            }
            None => {
                tokio::spawn(handle_connection(state, stream, addr));
            }
        }
    }
}
