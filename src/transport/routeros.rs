//! RouterOS API client.
//!
//! Sentences are sequences of length-prefixed words terminated by an empty
//! word. Replies start with `!re` (one record), `!trap` (command error),
//! `!fatal` (session ends) or `!done` (end of reply).
//!
//! Only the plain-text login of RouterOS 6.43 and later is spoken; a device
//! answering with the older MD5 challenge is rejected as an auth error.
//! `no_ssl_certificate` maps to an unverified handshake: native-tls offers
//! no anonymous-DH ciphers, so a device without any certificate cannot be
//! reached over TLS.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{ConnectTarget, DeviceConnector, DeviceTransport, Record, TransportError};
use crate::config::TlsMode;

/// Longest word accepted from a device.
pub(crate) const MAX_WORD_LEN: usize = 16 * 1024 * 1024;

/// Any byte stream the API can run over.
trait ApiStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ApiStream for T {}

/// Connector for real devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouterOsConnector;

#[async_trait::async_trait]
impl DeviceConnector for RouterOsConnector {
    async fn connect(
        &self,
        target: &ConnectTarget,
    ) -> Result<Box<dyn DeviceTransport>, TransportError> {
        let limit = target.timeout;
        let tcp = timeout(
            limit,
            TcpStream::connect((target.hostname.as_str(), target.port)),
        )
        .await
        .map_err(|_| TransportError::Timeout(limit))??;

        let stream: Box<dyn ApiStream> = match target.tls {
            TlsMode::Disabled => Box::new(tcp),
            mode => {
                let insecure = mode == TlsMode::Unverified;
                let tls = native_tls::TlsConnector::builder()
                    .danger_accept_invalid_certs(insecure)
                    .danger_accept_invalid_hostnames(insecure)
                    .build()?;
                let tls = tokio_native_tls::TlsConnector::from(tls);
                let stream = timeout(limit, tls.connect(&target.hostname, tcp))
                    .await
                    .map_err(|_| TransportError::Timeout(limit))??;
                Box::new(stream)
            }
        };

        let mut conn = ApiConnection::new(stream, limit);
        conn.login(&target.username, &target.password).await?;
        tracing::debug!(
            address = %target.address(),
            tls = ?target.tls,
            "API session established"
        );
        Ok(Box::new(conn))
    }
}

/// One authenticated API session over a byte stream.
pub struct ApiConnection<S> {
    stream: S,
    read_timeout: Duration,
    closed: bool,
}

impl<S> std::fmt::Debug for ApiConnection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConnection")
            .field("read_timeout", &self.read_timeout)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> ApiConnection<S> {
    /// Wrap a connected stream. Each reply sentence must arrive within `read_timeout`.
    pub fn new(stream: S, read_timeout: Duration) -> Self {
        Self {
            stream,
            read_timeout,
            closed: false,
        }
    }

    /// Plain-text login (RouterOS 6.43 and later).
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), TransportError> {
        let name = format!("=name={username}");
        let password = format!("=password={password}");
        match self.exchange("/login", &[&name, &password]).await {
            Ok((_, done)) if done.contains_key("ret") => Err(TransportError::Auth(
                "device requires the pre-6.43 challenge login".to_string(),
            )),
            Ok(_) => Ok(()),
            Err(TransportError::Trap { message, .. }) => Err(TransportError::Auth(message)),
            Err(e) => Err(e),
        }
    }

    async fn call(&mut self, command: &str, args: &[&str]) -> Result<Vec<Record>, TransportError> {
        self.exchange(command, args).await.map(|(records, _)| records)
    }

    /// Send one command; returns the `!re` records and the `!done` attributes.
    async fn exchange(
        &mut self,
        command: &str,
        args: &[&str],
    ) -> Result<(Vec<Record>, Record), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let mut words = Vec::with_capacity(args.len() + 1);
        words.push(command);
        words.extend_from_slice(args);
        if let Err(e) = write_sentence(&mut self.stream, &words).await {
            self.closed = true;
            return Err(e.into());
        }

        let mut records = Vec::new();
        let mut trap = None;
        let done = loop {
            let read = timeout(self.read_timeout, read_sentence(&mut self.stream)).await;
            let sentence = match read {
                Ok(Ok(sentence)) => sentence,
                Ok(Err(e)) => {
                    self.closed = true;
                    return Err(e);
                }
                Err(_) => {
                    self.closed = true;
                    return Err(TransportError::Timeout(self.read_timeout));
                }
            };

            let Some((reply, rest)) = sentence.split_first() else {
                continue;
            };
            match reply.as_str() {
                "!re" => records.push(attributes(rest)),
                "!done" => break attributes(rest),
                "!trap" => {
                    let message = attributes(rest).remove("message").unwrap_or_default();
                    trap = Some(message);
                }
                "!fatal" => {
                    self.closed = true;
                    return Err(TransportError::Fatal(rest.join(" ")));
                }
                "!empty" => {}
                other => {
                    self.closed = true;
                    return Err(TransportError::Protocol(format!(
                        "unexpected reply word '{other}'"
                    )));
                }
            }
        };

        match trap {
            Some(message) => Err(TransportError::Trap {
                command: command.to_string(),
                message,
            }),
            None => Ok((records, done)),
        }
    }
}

#[async_trait::async_trait]
impl<S> DeviceTransport for ApiConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn run(&mut self, command: &str, args: &[&str]) -> Result<Vec<Record>, TransportError> {
        self.call(command, args).await
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(error = %e, "API stream shutdown failed");
        }
    }
}

/// Collect `=key=value` words into a record. Other words (`.tag=`) are skipped.
fn attributes(words: &[String]) -> Record {
    words
        .iter()
        .filter_map(|w| w.strip_prefix('='))
        .filter_map(|w| w.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// =============================================================================
// Framing
// =============================================================================

pub(crate) fn encode_length(len: usize, out: &mut Vec<u8>) {
    let len = len as u32;
    match len {
        0..0x80 => out.push(len as u8),
        0x80..0x4000 => out.extend_from_slice(&(len | 0x8000).to_be_bytes()[2..]),
        0x4000..0x20_0000 => out.extend_from_slice(&(len | 0xC0_0000).to_be_bytes()[1..]),
        0x20_0000..0x1000_0000 => out.extend_from_slice(&(len | 0xE000_0000).to_be_bytes()),
        _ => {
            out.push(0xF0);
            out.extend_from_slice(&len.to_be_bytes());
        }
    }
}

pub(crate) async fn read_length<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<usize, TransportError> {
    let first = reader.read_u8().await?;
    let (mut value, extra) = match first {
        b if b & 0x80 == 0x00 => (u32::from(b), 0),
        b if b & 0xC0 == 0x80 => (u32::from(b & 0x3F), 1),
        b if b & 0xE0 == 0xC0 => (u32::from(b & 0x1F), 2),
        b if b & 0xF0 == 0xE0 => (u32::from(b & 0x0F), 3),
        0xF0 => (0, 4),
        b => {
            return Err(TransportError::Protocol(format!(
                "invalid length prefix 0x{b:02x}"
            )));
        }
    };
    for _ in 0..extra {
        value = (value << 8) | u32::from(reader.read_u8().await?);
    }
    Ok(value as usize)
}

pub(crate) async fn write_sentence<W: AsyncWrite + Unpin>(
    writer: &mut W,
    words: &[&str],
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    for word in words {
        encode_length(word.len(), &mut buf);
        buf.extend_from_slice(word.as_bytes());
    }
    buf.push(0);
    writer.write_all(&buf).await?;
    writer.flush().await
}

pub(crate) async fn read_sentence<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Vec<String>, TransportError> {
    let mut words = Vec::new();
    loop {
        let len = read_length(reader).await?;
        if len == 0 {
            return Ok(words);
        }
        if len > MAX_WORD_LEN {
            return Err(TransportError::Protocol(format!(
                "word of {len} bytes exceeds {MAX_WORD_LEN}"
            )));
        }
        let mut word = vec![0u8; len];
        reader.read_exact(&mut word).await?;
        words.push(String::from_utf8_lossy(&word).into_owned());
    }
}
