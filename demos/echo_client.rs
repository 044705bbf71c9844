//! A simple echo client example demonstrating basic WebSocket usage.
//!
//! Connects to a WebSocket echo server, sends a message, prints the echo and
//! closes. Pass a URL and optionally a protocol version:
//!
//! ```text
//! cargo run --example echo_client -- ws://127.0.0.1:9001/ 13
//! ```

use anyhow::{Result, bail};
use websockets_monoio_codec::{
    ClientHandshaker, CloseCode, Opcode, WebSocketConfig, WebSocketVersion, WsClient,
};

#[monoio::main(timer_enabled = true)]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let url = args.next().unwrap_or_else(|| "wss://echo.websocket.org/".to_owned());
    let version = match args.next().as_deref() {
        None | Some("13") => WebSocketVersion::V13,
        Some("8") => WebSocketVersion::V08,
        Some("7") => WebSocketVersion::V07,
        Some("0") => WebSocketVersion::V00,
        Some(other) => bail!("unknown protocol version {other}"),
    };

    println!("Connecting to {url} (version {version:?})...");
    let handshaker = ClientHandshaker::new(&url)?.version(version);
    let mut client = WsClient::connect_with(handshaker, WebSocketConfig::default()).await?;

    println!("Connected! Sending message...");
    let message = "Hello from websockets-monoio-codec!";
    client.ws.send_text(message).await?;
    println!("Message sent: {message}");

    // Echo servers often greet first; wait for our own text to come back.
    while let Some(frame) = client.ws.recv().await? {
        match frame.opcode {
            Opcode::Text => {
                let text = std::str::from_utf8(&frame.payload)?;
                println!("Text received: {text}");
                if text == message {
                    break;
                }
            }
            Opcode::Binary => println!("Received binary frame ({} bytes)", frame.payload.len()),
            Opcode::Close => {
                println!("Server closed the connection: {:?}", frame.status_code());
                return Ok(());
            }
            other => println!("Received frame type: {other:?}"),
        }
    }

    client.ws.close(CloseCode::NORMAL, "done").await?;
    println!("Example completed successfully!");
    Ok(())
}
