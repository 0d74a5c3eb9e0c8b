//! Shared test utilities and fixtures
//!
//! A loopback language server: tests accept connections from a real
//! [`Session`](gosandbox_lsp::Session) and script the server side by hand.

#![allow(dead_code)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gosandbox_lsp::LspConfig;
use gosandbox_lsp::codec::{FrameReader, FrameWriter};
use serde_json::{Value, json};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

pub const DOC: &str = "package main\n\nfunc main() {\n\tprintln(\"hi\")\n}\n";
pub const DOC_URI: &str = "file:///workspace/go1/main.go";

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Session config pointed at `url`, without keep-alive noise.
pub fn config_for(url: &str) -> LspConfig {
    LspConfig {
        url: url.to_string(),
        keep_alive_secs: 0,
        ..LspConfig::default()
    }
}

enum Wire {
    Ws(WebSocketStream<TcpStream>),
    Tcp {
        reader: FrameReader<OwnedReadHalf>,
        writer: FrameWriter<OwnedWriteHalf>,
    },
}

/// Server side of one accepted connection.
pub struct ServerConn {
    wire: Wire,
}

impl ServerConn {
    /// Next JSON message from the client, or `None` once it hangs up.
    pub async fn try_recv(&mut self) -> Option<Value> {
        let text = match &mut self.wire {
            Wire::Ws(ws) => loop {
                match ws.next().await? {
                    Ok(Message::Text(text)) => break text,
                    Ok(Message::Close(_)) | Err(_) => return None,
                    Ok(_) => {}
                }
            },
            Wire::Tcp { reader, .. } => reader.read_frame().await.ok()??,
        };
        Some(serde_json::from_str(&text).expect("client sent invalid JSON"))
    }

    pub async fn recv(&mut self) -> Value {
        tokio::time::timeout(RECV_TIMEOUT, self.try_recv())
            .await
            .expect("timed out waiting for a client message")
            .expect("client hung up")
    }

    /// Skip messages until one with `method` arrives.
    pub async fn expect_method(&mut self, method: &str) -> Value {
        loop {
            let message = self.recv().await;
            if message["method"] == method {
                return message;
            }
        }
    }

    pub async fn send(&mut self, message: Value) {
        let text = message.to_string();
        match &mut self.wire {
            Wire::Ws(ws) => ws.send(Message::Text(text)).await.unwrap(),
            Wire::Tcp { writer, .. } => writer.write_frame(&text).await.unwrap(),
        }
    }

    pub async fn reply(&mut self, request: &Value, result: Value) {
        self.send(json!({"jsonrpc": "2.0", "id": request["id"], "result": result}))
            .await;
    }

    pub async fn reply_error(&mut self, request: &Value, code: i64, message: &str) {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": {"code": code, "message": message}
        }))
        .await;
    }

    pub async fn publish_diagnostics(&mut self, uri: &str, diagnostics: Value) {
        self.send(json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": {"uri": uri, "diagnostics": diagnostics}
        }))
        .await;
    }

    /// Answer `initialize` and consume `initialized` + `didOpen`.
    ///
    /// Returns the didOpen params.
    pub async fn serve_handshake(&mut self) -> Value {
        let init = self.expect_method("initialize").await;
        self.reply(&init, json!({"capabilities": {"hoverProvider": true}}))
            .await;
        let initialized = self.recv().await;
        assert_eq!(initialized["method"], "initialized");
        let did_open = self.recv().await;
        assert_eq!(did_open["method"], "textDocument/didOpen");
        did_open["params"].clone()
    }

    pub async fn close(self) {
        match self.wire {
            Wire::Ws(mut ws) => {
                let _ = ws.close(None).await;
            }
            Wire::Tcp { .. } => {}
        }
    }
}

/// A listener on 127.0.0.1 handing out each accepted connection.
pub struct FakeServer {
    pub url: String,
    conns: mpsc::UnboundedReceiver<ServerConn>,
}

impl FakeServer {
    /// Accept WebSocket clients at `ws://127.0.0.1:<port>`.
    pub async fn websocket() -> Self {
        Self::start(false).await
    }

    /// Accept `Content-Length` framed clients at `tcp://127.0.0.1:<port>`.
    pub async fn tcp() -> Self {
        Self::start(true).await
    }

    async fn start(framed: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = if framed {
            format!("tcp://{addr}")
        } else {
            format!("ws://{addr}")
        };
        let (tx, conns) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let wire = if framed {
                    let (read, write) = stream.into_split();
                    Wire::Tcp {
                        reader: FrameReader::new(read),
                        writer: FrameWriter::new(write),
                    }
                } else {
                    match tokio_tungstenite::accept_async(stream).await {
                        Ok(ws) => Wire::Ws(ws),
                        Err(_) => continue,
                    }
                };
                if tx.send(ServerConn { wire }).is_err() {
                    break;
                }
            }
        });

        Self { url, conns }
    }

    pub async fn accept(&mut self) -> ServerConn {
        tokio::time::timeout(RECV_TIMEOUT, self.conns.recv())
            .await
            .expect("timed out waiting for a client")
            .expect("listener stopped")
    }

    pub fn config(&self) -> LspConfig {
        config_for(&self.url)
    }
}
