//! `Content-Length` framing for JSON-RPC over the engine's stdio.
//!
//! Each message on the wire is `Content-Length: N\r\n\r\n` followed by
//! exactly N bytes of JSON. [`RpcReader`] yields decoded frames and
//! distinguishes clean EOF from a stream cut mid-message; [`RpcWriter`]
//! serializes and flushes one frame per call.

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Upper bound on a single frame body. Anything larger is a protocol
/// violation, not a document we want to buffer.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

pub struct RpcReader<R> {
    input: BufReader<R>,
}

impl<R: AsyncRead + Unpin> RpcReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input: BufReader::new(input),
        }
    }

    /// Read the next frame. `Ok(None)` means the peer closed the stream at
    /// a message boundary; EOF anywhere else is an error.
    pub async fn next_frame(&mut self) -> Result<Option<serde_json::Value>> {
        let Some(len) = self.read_content_length().await? else {
            return Ok(None);
        };
        if len > MAX_BODY_BYTES {
            bail!("frame of {len} bytes exceeds the {MAX_BODY_BYTES} byte limit");
        }

        let mut body = vec![0u8; len];
        self.input
            .read_exact(&mut body)
            .await
            .context("stream cut mid-body")?;
        let frame = serde_json::from_slice(&body).context("frame body is not valid JSON")?;
        Ok(Some(frame))
    }

    /// Consume header lines up to the blank separator and return the
    /// announced body length. `Ok(None)` only when EOF precedes any header
    /// byte.
    async fn read_content_length(&mut self) -> Result<Option<usize>> {
        let mut length = None;
        let mut line = String::new();
        let mut at_start = true;

        loop {
            line.clear();
            let n = self
                .input
                .read_line(&mut line)
                .await
                .context("reading frame header")?;
            if n == 0 {
                if at_start {
                    return Ok(None);
                }
                bail!("stream cut mid-headers");
            }
            at_start = false;

            let header = line.trim_end_matches(['\r', '\n']);
            if header.is_empty() {
                break;
            }
            // Header names are matched case-insensitively; unknown headers
            // (Content-Type in practice) are skipped.
            if let Some((name, value)) = header.split_once(':') {
                if name.trim().eq_ignore_ascii_case("content-length") {
                    length = Some(
                        value
                            .trim()
                            .parse::<usize>()
                            .context("unparseable Content-Length")?,
                    );
                }
            }
        }

        match length {
            Some(len) => Ok(Some(len)),
            None => bail!("frame headers carried no Content-Length"),
        }
    }
}

pub struct RpcWriter<W> {
    output: W,
}

impl<W: AsyncWrite + Unpin> RpcWriter<W> {
    pub fn new(output: W) -> Self {
        Self { output }
    }

    pub async fn send_frame(&mut self, frame: &serde_json::Value) -> Result<()> {
        let body = serde_json::to_vec(frame).context("serializing frame")?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        self.output
            .write_all(header.as_bytes())
            .await
            .context("writing frame header")?;
        self.output
            .write_all(&body)
            .await
            .context("writing frame body")?;
        self.output.flush().await.context("flushing frame")?;
        Ok(())
    }
}
