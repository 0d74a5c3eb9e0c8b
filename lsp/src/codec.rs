//! `Content-Length` framing for stream transports.
//!
//! A language server reached over raw TCP (rather than through the WebSocket
//! bridge) speaks `Content-Length: N\r\n\r\n{json}` frames. The correlator
//! works on whole JSON texts, so frames are read and written as strings and
//! parsing stays in [`crate::rpc`].

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Maximum frame size (4 MiB) to prevent unbounded memory allocation.
const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next frame body as UTF-8 text.
    ///
    /// Returns `Ok(None)` on a clean EOF between frames.
    pub async fn read_frame(&mut self) -> Result<Option<String>> {
        let Some(content_length) = self.read_headers().await? else {
            return Ok(None);
        };

        if content_length > MAX_FRAME_BYTES {
            bail!("Content-Length {content_length} exceeds maximum {MAX_FRAME_BYTES}");
        }

        let mut body = vec![0u8; content_length];
        self.reader
            .read_exact(&mut body)
            .await
            .context("reading frame body")?;

        let text = String::from_utf8(body).context("frame body is not UTF-8")?;
        Ok(Some(text))
    }

    /// Parse headers up to the blank separator line and return `Content-Length`.
    async fn read_headers(&mut self) -> Result<Option<usize>> {
        let mut content_length = None;
        let mut line = String::new();
        let mut started = false;

        loop {
            line.clear();
            let bytes_read = self
                .reader
                .read_line(&mut line)
                .await
                .context("reading header line")?;

            if bytes_read == 0 {
                if started {
                    bail!("unexpected EOF while reading headers");
                }
                return Ok(None);
            }
            started = true;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }

            if let Some((key, value)) = trimmed.split_once(':')
                && key.trim().eq_ignore_ascii_case("Content-Length")
            {
                let len = value
                    .trim()
                    .parse()
                    .context("invalid Content-Length value")?;
                content_length = Some(len);
            }
        }

        content_length
            .map(Some)
            .context("missing Content-Length header")
    }
}

pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write `body` behind a `Content-Length` header (byte count) and flush.
    pub async fn write_frame(&mut self, body: &str) -> Result<()> {
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        self.writer
            .write_all(header.as_bytes())
            .await
            .context("writing frame header")?;
        self.writer
            .write_all(body.as_bytes())
            .await
            .context("writing frame body")?;
        self.writer.flush().await.context("flushing frame")?;
        Ok(())
    }
}
