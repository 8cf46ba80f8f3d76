//! Accept loop producing one `Session`/`Agent` pair per inbound
//! connection: `TcpListener::bind` then a loop of `accept()` +
//! `tokio::spawn`, decoding framed packets from the first byte rather
//! than requiring a distinguished handshake message.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use crate::error::{CherryError, ErrorCode};
use crate::session::agent;
use crate::session::command::CommandTable;
use crate::session::registry::SessionRegistry;
use crate::session::session::Session;
use crate::session::transport::{Transport, WebSocketTransport};

pub struct ListenerConfig {
    pub heartbeat: Duration,
    pub write_backlog: usize,
    pub max_packet_len: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(60),
            write_backlog: 64,
            max_packet_len: 0xFF_FFFF,
        }
    }
}

/// Binds `addr` and spawns one agent per accepted WebSocket connection,
/// registering it under a locally unique `sid` in `registry`. Runs until
/// the listener itself errors (bind failure) or is dropped/cancelled by
/// its caller.
pub async fn run(
    addr: &str,
    commands: Arc<CommandTable>,
    registry: Arc<SessionRegistry>,
    config: ListenerConfig,
) -> Result<(), CherryError> {
    let listener = TcpListener::bind(addr).await.map_err(|e| CherryError::with_source(ErrorCode::NetError, e))?;
    let next_sid = Arc::new(AtomicU64::new(1));

    loop {
        let (stream, _) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("listener on {addr}: accept failed: {e}");
                continue;
            }
        };

        let commands = Arc::clone(&commands);
        let registry = Arc::clone(&registry);
        let next_sid = Arc::clone(&next_sid);
        let heartbeat = config.heartbeat;
        let write_backlog = config.write_backlog;
        let max_packet_len = config.max_packet_len;

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("listener: websocket handshake failed: {e}");
                    return;
                }
            };

            let sid = next_sid.fetch_add(1, Ordering::Relaxed);
            let session = Arc::new(Session::new(sid));
            let (reader, writer) = WebSocketTransport::new(ws_stream).split();
            let handle = agent::spawn(Box::new(reader), Box::new(writer), session, commands, heartbeat, write_backlog, max_packet_len);
            registry.insert(sid, handle);
        });
    }
}
