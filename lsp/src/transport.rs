//! Persistent duplex, message-oriented connection to the language server.
//!
//! A [`Transport`] is a cheap handle over a background driver task. Sending
//! never fails and never blocks: messages sent before the connection opens
//! sit in the outbound channel and are flushed, in call order, once it does.
//! Open, inbound text, errors and close are reported as [`TransportEvent`]s.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use futures_util::{Sink, SinkExt, Stream, StreamExt, future};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::codec::{FrameReader, FrameWriter};

const TCP_SCHEME: &str = "tcp://";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    /// The connection failed or broke. Always followed by `Closed`.
    Error(String),
    Closed,
}

enum WriterCommand {
    Send(String),
    Shutdown,
}

#[derive(Clone)]
pub struct Transport {
    writer_tx: mpsc::UnboundedSender<WriterCommand>,
    open: Arc<AtomicBool>,
}

impl Transport {
    /// Dial `url`: `tcp://host:port` for a framed raw stream, anything else
    /// (`ws://`, `wss://`) as a WebSocket.
    pub fn connect(url: &str) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        match url.strip_prefix(TCP_SCHEME) {
            Some(addr) => Self::tcp(addr.to_string()),
            None => Self::websocket(url.to_string()),
        }
    }

    pub fn websocket(url: String) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        Self::spawn(async move {
            let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .with_context(|| format!("connecting to {url}"))?;
            let (write, read) = stream.split();

            let sink = write.with(|text: String| future::ready(Ok::<_, WsError>(Message::Text(text))));
            let stream = read.filter_map(|message| {
                future::ready(match message {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    Ok(Message::Binary(bytes)) => {
                        Some(String::from_utf8(bytes).context("binary frame is not UTF-8"))
                    }
                    // Control frames are answered by tungstenite itself.
                    Ok(_) => None,
                    Err(e) => Some(Err(anyhow::Error::from(e))),
                })
            });
            Ok((sink, stream))
        })
    }

    pub fn tcp(addr: String) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        Self::spawn(async move {
            let stream = TcpStream::connect(addr.as_str())
                .await
                .with_context(|| format!("connecting to {addr}"))?;
            let (read, write) = stream.into_split();

            let sink = futures_util::sink::unfold(
                FrameWriter::new(write),
                |mut writer, text: String| async move {
                    writer.write_frame(&text).await?;
                    Ok::<_, anyhow::Error>(writer)
                },
            );
            let stream = futures_util::stream::unfold(FrameReader::new(read), |mut reader| async move {
                match reader.read_frame().await {
                    Ok(Some(text)) => Some((Ok(text), reader)),
                    Ok(None) => None,
                    Err(e) => Some((Err(e), reader)),
                }
            });
            Ok((sink, stream))
        })
    }

    /// Run a transport over any text sink/stream pair produced by `connect`.
    pub fn spawn<F, Si, St>(connect: F) -> (Self, mpsc::UnboundedReceiver<TransportEvent>)
    where
        F: Future<Output = anyhow::Result<(Si, St)>> + Send + 'static,
        Si: Sink<String> + Send + 'static,
        Si::Error: Display,
        St: Stream<Item = anyhow::Result<String>> + Send + 'static,
    {
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));

        tokio::spawn(drive(connect, writer_rx, event_tx, Arc::clone(&open)));

        (Self { writer_tx, open }, event_rx)
    }

    /// Queue `text` for sending. Buffered until the connection opens.
    pub fn send(&self, text: String) {
        if self.writer_tx.send(WriterCommand::Send(text)).is_err() {
            tracing::debug!("transport driver stopped; dropping outbound message");
        }
    }

    /// Send only if the connection is open right now; never buffers.
    pub fn send_if_open(&self, text: String) -> bool {
        if !self.is_open() {
            return false;
        }
        self.send(text);
        true
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Ask the driver to close the connection after flushing queued messages.
    pub fn close(&self) {
        let _ = self.writer_tx.send(WriterCommand::Shutdown);
    }
}

async fn drive<F, Si, St>(
    connect: F,
    mut writer_rx: mpsc::UnboundedReceiver<WriterCommand>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    open: Arc<AtomicBool>,
) where
    F: Future<Output = anyhow::Result<(Si, St)>>,
    Si: Sink<String>,
    Si::Error: Display,
    St: Stream<Item = anyhow::Result<String>>,
{
    let (sink, stream) = match connect.await {
        Ok(parts) => parts,
        Err(e) => {
            tracing::warn!("transport connect failed: {e:#}");
            let _ = event_tx.send(TransportEvent::Error(format!("{e:#}")));
            let _ = event_tx.send(TransportEvent::Closed);
            return;
        }
    };
    let mut sink = Box::pin(sink);
    let mut stream = Box::pin(stream);

    open.store(true, Ordering::Release);
    tracing::info!("transport connected");
    let _ = event_tx.send(TransportEvent::Open);

    loop {
        tokio::select! {
            command = writer_rx.recv() => match command {
                Some(WriterCommand::Send(text)) => {
                    if let Err(e) = sink.send(text).await {
                        tracing::warn!("transport write error: {e}");
                        let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
                Some(WriterCommand::Shutdown) | None => {
                    if let Err(e) = sink.close().await {
                        tracing::debug!("transport close error: {e}");
                    }
                    break;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(text)) => {
                    let _ = event_tx.send(TransportEvent::Message(text));
                }
                Some(Err(e)) => {
                    tracing::warn!("transport read error: {e:#}");
                    let _ = event_tx.send(TransportEvent::Error(format!("{e:#}")));
                    break;
                }
                None => {
                    tracing::info!("transport closed by peer");
                    break;
                }
            },
        }
    }

    open.store(false, Ordering::Release);
    let _ = event_tx.send(TransportEvent::Closed);
}
