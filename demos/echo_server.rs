//! Echo server accepting every supported protocol version.
//!
//! ```text
//! RUST_LOG=debug cargo run --example echo_server -- 127.0.0.1:9001
//! ```

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use websockets_monoio_codec::{Opcode, ServerHandshaker, WebSocketConfig, WsServer};

#[monoio::main(timer_enabled = true)]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let addr = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1:9001".to_owned());
    let server = WsServer::bind(
        addr.as_str(),
        ServerHandshaker::new().subprotocols(["*"]),
        WebSocketConfig::default(),
    )?;
    info!(addr = %server.local_addr()?, "echo server listening");

    loop {
        let (pending, peer) = server.accept().await?;
        monoio::spawn(async move {
            let mut ws = match pending.handshake().await {
                Ok(ws) => ws,
                Err(err) => {
                    warn!(%peer, error = %err, "handshake failed");
                    return;
                }
            };
            info!(%peer, version = ?ws.version(), subprotocol = ?ws.subprotocol(), "client connected");

            loop {
                match ws.recv().await {
                    Ok(Some(frame)) if matches!(frame.opcode, Opcode::Text | Opcode::Binary) => {
                        if let Err(err) = ws.send(frame).await {
                            warn!(%peer, error = %err, "echo failed");
                            break;
                        }
                    }
                    Ok(Some(frame)) => info!(%peer, status = ?frame.status_code(), "peer sent {:?}", frame.opcode),
                    Ok(None) => break,
                    Err(err) => {
                        warn!(%peer, error = %err, "connection error");
                        break;
                    }
                }
            }
            info!(%peer, "client disconnected");
        });
    }
}
