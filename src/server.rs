//! TCP accept loop.

use crate::commands::CommandHandler;
use crate::connection::handle_connection;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Accepts connections forever, spawning one task per client.
///
/// Each task gets its own clone of `handler`; all clones share the same
/// storage. Accept failures are logged and the loop carries on.
pub async fn run(listener: TcpListener, handler: CommandHandler) {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on {}", addr);
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = handler.clone();
                tokio::spawn(handle_connection(stream, addr, handler));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
