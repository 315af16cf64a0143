//! Event-socket protocol client.
//!
//! The event socket is a line-oriented request/response protocol. Every
//! message from the SBC is a frame of `Key: Value` header lines terminated by
//! a blank line, optionally followed by exactly `Content-Length` bytes of body:
//!
//! ```text
//! Content-Type: api/response
//! Content-Length: 12
//!
//! 3 total.\n...
//! ```
//!
//! A client is used for a single scrape: connect, authenticate, issue
//! commands, close. It never reconnects.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::error::{Result, ScrapeError};
use crate::target::Target;

/// Largest body accepted in a single frame.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Largest number of header lines accepted in a single frame.
const MAX_HEADERS: usize = 64;

/// Longest header line accepted, including its newline.
const MAX_LINE_BYTES: usize = 8 * 1024;

/// Time granted to the best-effort `exit` on close.
const CLOSE_GRACE: Duration = Duration::from_millis(100);

const CONTENT_TYPE_AUTH_REQUEST: &str = "auth/request";
const CONTENT_TYPE_COMMAND_REPLY: &str = "command/reply";
const CONTENT_TYPE_API_RESPONSE: &str = "api/response";
const CONTENT_TYPE_DISCONNECT: &str = "text/disconnect-notice";

/// One framed reply read from the event socket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    /// Header lines in arrival order.
    pub headers: Vec<(String, String)>,
    /// Declared body length, if the frame had one.
    pub content_length: Option<usize>,
    /// Body text.
    pub body: String,
}

impl RawResponse {
    /// Look up a header value (case-insensitive name).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The frame's `Content-Type`, or an empty string.
    pub fn content_type(&self) -> &str {
        self.header("Content-Type").unwrap_or_default()
    }
}

/// A single-owner event-socket connection.
pub struct EslClient<S> {
    stream: Option<BufReader<S>>,
    desynchronized: bool,
}

impl EslClient<TcpStream> {
    /// Open a TCP connection to the target.
    pub async fn connect(target: &Target, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(
            timeout,
            TcpStream::connect((target.host(), target.port())),
        )
        .await
        .map_err(|_| ScrapeError::Timeout("connect".to_string()))?
        .map_err(|e| ScrapeError::Connection {
            target: target.to_string(),
            message: e.to_string(),
        })?;

        // Commands are tiny; don't let Nagle hold them back.
        let _ = stream.set_nodelay(true);

        debug!(sbc = %target, "Connected to event socket");
        Ok(Self::from_stream(stream))
    }
}

impl<S> EslClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already-open byte stream.
    pub fn from_stream(stream: S) -> Self {
        Self {
            stream: Some(BufReader::new(stream)),
            desynchronized: false,
        }
    }

    /// Whether the connection is still open.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Answer the server's `auth/request` greeting with the password.
    pub async fn authenticate(&mut self, password: &str, timeout: Duration) -> Result<()> {
        let command = format!("auth {}", password);
        let result = tokio::time::timeout(timeout, async {
            let greeting = self.read_frame().await?;
            match greeting.content_type() {
                CONTENT_TYPE_AUTH_REQUEST => {}
                CONTENT_TYPE_DISCONNECT => {
                    return Err(ScrapeError::protocol(
                        "server disconnected before authentication",
                    ));
                }
                other => {
                    return Err(ScrapeError::protocol(format!(
                        "expected auth/request greeting, got {:?}",
                        other
                    )));
                }
            }

            self.write_command(&command).await?;
            self.read_frame().await
        })
        .await;

        let reply = self.settle(result, "authenticate")?;
        let reply_text = reply.header("Reply-Text").unwrap_or_default();

        match reply.content_type() {
            CONTENT_TYPE_COMMAND_REPLY if reply_text.starts_with("+OK") => {
                trace!("Event socket authentication accepted");
                Ok(())
            }
            CONTENT_TYPE_COMMAND_REPLY if reply_text.starts_with("-ERR") => {
                Err(ScrapeError::Auth(reply_text.to_string()))
            }
            CONTENT_TYPE_DISCONNECT => Err(ScrapeError::Auth(
                "server disconnected during authentication".to_string(),
            )),
            other => {
                self.desynchronized = true;
                Err(ScrapeError::protocol(format!(
                    "unexpected authentication reply: content-type {:?}, reply {:?}",
                    other, reply_text
                )))
            }
        }
    }

    /// Write a command line and read its framed, length-delimited reply.
    pub async fn send_command(&mut self, command: &str, timeout: Duration) -> Result<RawResponse> {
        if self.desynchronized {
            return Err(ScrapeError::protocol(
                "connection desynchronized by an earlier failure",
            ));
        }

        let result = tokio::time::timeout(timeout, async {
            self.write_command(command).await?;
            let frame = self.read_frame().await?;

            if frame.content_type() == CONTENT_TYPE_DISCONNECT {
                return Err(ScrapeError::protocol("server disconnected"));
            }
            if frame.content_length.is_none() {
                return Err(ScrapeError::protocol(format!(
                    "reply to {:?} has no Content-Length header",
                    command
                )));
            }
            Ok(frame)
        })
        .await;

        self.settle(result, command)
    }

    /// Run an `api` command and return its body.
    ///
    /// A body starting with `-ERR` means the SBC rejected the command; the
    /// connection stays usable.
    pub async fn api(&mut self, command: &str, timeout: Duration) -> Result<String> {
        let frame = self.send_command(&format!("api {}", command), timeout).await?;

        if frame.content_type() != CONTENT_TYPE_API_RESPONSE {
            return Err(ScrapeError::protocol(format!(
                "expected api/response for {:?}, got {:?}",
                command,
                frame.content_type()
            )));
        }

        if frame.body.starts_with("-ERR") {
            return Err(ScrapeError::Command(frame.body.trim_end().to_string()));
        }

        Ok(frame.body)
    }

    /// Release the connection. Safe to call repeatedly and after any failure.
    pub async fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };

        if !self.desynchronized {
            let _ = tokio::time::timeout(CLOSE_GRACE, async {
                stream.write_all(b"exit\n\n").await?;
                stream.flush().await
            })
            .await;
        }
        let _ = tokio::time::timeout(CLOSE_GRACE, stream.shutdown()).await;
        trace!("Event socket connection closed");
    }

    /// Translate a timed step result, marking the connection unusable when
    /// the stream may have been left mid-frame.
    fn settle<T>(
        &mut self,
        result: std::result::Result<Result<T>, tokio::time::error::Elapsed>,
        step: &str,
    ) -> Result<T> {
        let result = result.unwrap_or_else(|_| Err(ScrapeError::Timeout(step.to_string())));
        if let Err(e) = &result
            && e.desynchronizes()
        {
            self.desynchronized = true;
        }
        result
    }

    async fn write_command(&mut self, command: &str) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ScrapeError::protocol("connection already closed"))?;

        let mut line = String::with_capacity(command.len() + 2);
        line.push_str(command);
        line.push_str("\n\n");

        stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ScrapeError::protocol(format!("write failed: {}", e)))?;
        stream
            .flush()
            .await
            .map_err(|e| ScrapeError::protocol(format!("write failed: {}", e)))
    }

    async fn read_frame(&mut self) -> Result<RawResponse> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ScrapeError::protocol("connection already closed"))?;

        let mut frame = RawResponse::default();
        let mut line = String::new();

        loop {
            line.clear();
            let n = (&mut *stream)
                .take(MAX_LINE_BYTES as u64)
                .read_line(&mut line)
                .await
                .map_err(|e| ScrapeError::protocol(format!("read failed: {}", e)))?;
            if n == 0 {
                return Err(ScrapeError::protocol(
                    "connection closed before end of headers",
                ));
            }
            if n >= MAX_LINE_BYTES && !line.ends_with('\n') {
                return Err(ScrapeError::protocol(format!(
                    "header line exceeds {} bytes",
                    MAX_LINE_BYTES
                )));
            }

            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                if frame.headers.is_empty() {
                    // Stray separator between frames.
                    continue;
                }
                break;
            }

            let (key, value) = trimmed.split_once(':').ok_or_else(|| {
                ScrapeError::protocol(format!("malformed header line {:?}", trimmed))
            })?;
            frame
                .headers
                .push((key.trim().to_string(), value.trim().to_string()));

            if frame.headers.len() > MAX_HEADERS {
                return Err(ScrapeError::protocol("too many header lines"));
            }
        }

        if let Some(raw) = frame.header("Content-Length") {
            let length: usize = raw
                .parse()
                .map_err(|_| ScrapeError::protocol(format!("invalid Content-Length {:?}", raw)))?;
            if length > MAX_BODY_BYTES {
                return Err(ScrapeError::protocol(format!(
                    "Content-Length {} exceeds limit of {} bytes",
                    length, MAX_BODY_BYTES
                )));
            }

            let mut body = vec![0u8; length];
            stream.read_exact(&mut body).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    ScrapeError::protocol(format!("truncated body: expected {} bytes", length))
                } else {
                    ScrapeError::protocol(format!("read failed: {}", e))
                }
            })?;

            frame.content_length = Some(length);
            frame.body = String::from_utf8_lossy(&body).into_owned();
        }

        trace!(
            content_type = frame.content_type(),
            length = frame.content_length.unwrap_or(0),
            "Read event socket frame"
        );
        Ok(frame)
    }
}
