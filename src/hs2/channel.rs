//! Byte transports carrying thrift messages to the coordinator.

use super::codec::{self, CodecError};
use super::{Hs2Error, Hs2Result};
use crate::models::ConnectionSettings;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// A request/response pipe for whole thrift messages.
#[async_trait]
pub trait Channel: Send {
    /// Send one encoded call and return the encoded reply.
    async fn round_trip(&mut self, request: Vec<u8>) -> Hs2Result<Vec<u8>>;

    /// Release the underlying transport.
    async fn shutdown(&mut self) {}
}

/// Open the channel described by `settings`.
pub async fn open(settings: &ConnectionSettings) -> Hs2Result<Box<dyn Channel>> {
    if settings.use_http_transport {
        Ok(Box::new(HttpChannel::new(settings)?))
    } else {
        Ok(Box::new(SocketChannel::connect(settings).await?))
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Thrift over HTTP POST, one message per request.
pub struct HttpChannel {
    client: reqwest::Client,
    url: String,
    credentials: Option<(String, String)>,
    timeout_secs: u64,
}

impl HttpChannel {
    pub fn new(settings: &ConnectionSettings) -> Hs2Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.query_timeout)
            .build()?;

        let credentials = if settings.auth_mechanism.sends_credentials() {
            settings.user.as_ref().map(|user| {
                (
                    user.clone(),
                    settings.password.clone().unwrap_or_default(),
                )
            })
        } else {
            None
        };

        Ok(Self {
            client,
            url: settings.http_url(),
            credentials,
            timeout_secs: settings.query_timeout.as_secs(),
        })
    }
}

#[async_trait]
impl Channel for HttpChannel {
    async fn round_trip(&mut self, request: Vec<u8>) -> Hs2Result<Vec<u8>> {
        let mut builder = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-thrift")
            .header(reqwest::header::ACCEPT, "application/x-thrift")
            .body(request);
        if let Some((user, password)) = &self.credentials {
            builder = builder.basic_auth(user, Some(password));
        }

        let response = builder.send().await.map_err(|e| self.map_error(e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Hs2Error::HttpStatus {
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.map_error(e))?;
        Ok(bytes.to_vec())
    }
}

impl HttpChannel {
    fn map_error(&self, err: reqwest::Error) -> Hs2Error {
        if err.is_timeout() {
            Hs2Error::Timeout {
                operation: "HTTP request",
                secs: self.timeout_secs,
            }
        } else {
            Hs2Error::Http(err)
        }
    }
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

const SASL_START: u8 = 1;
const SASL_OK: u8 = 2;
const SASL_BAD: u8 = 3;
const SASL_ERROR: u8 = 4;
const SASL_COMPLETE: u8 = 5;

/// Replies larger than this are treated as corrupt.
const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Thrift over a TCP socket.
///
/// NOSASL connections use the unframed buffered transport; PLAIN and LDAP
/// negotiate SASL PLAIN and then exchange length-prefixed frames.
pub struct SocketChannel {
    stream: TcpStream,
    framed: bool,
    timeout: Duration,
}

impl SocketChannel {
    pub async fn connect(settings: &ConnectionSettings) -> Hs2Result<Self> {
        if settings.use_ssl {
            return Err(Hs2Error::Unsupported(
                "TLS is only available with the HTTP transport; set IMPALA_USE_HTTP_TRANSPORT=true or IMPALA_USE_SSL=false".to_string(),
            ));
        }

        let connect = TcpStream::connect((settings.host.as_str(), settings.port));
        let stream = tokio::time::timeout(settings.connect_timeout, connect)
            .await
            .map_err(|_| Hs2Error::Timeout {
                operation: "connect",
                secs: settings.connect_timeout.as_secs(),
            })??;
        stream.set_nodelay(true)?;

        let mut channel = Self {
            stream,
            framed: settings.auth_mechanism.sends_credentials(),
            timeout: settings.query_timeout,
        };

        if channel.framed {
            let user = settings.user.as_deref().unwrap_or("anonymous");
            let password = settings.password.as_deref().unwrap_or("");
            let negotiate = channel.sasl_plain(user, password);
            tokio::time::timeout(settings.connect_timeout, negotiate)
                .await
                .map_err(|_| Hs2Error::Timeout {
                    operation: "SASL negotiation",
                    secs: settings.connect_timeout.as_secs(),
                })??;
        }
        Ok(channel)
    }

    async fn sasl_plain(&mut self, user: &str, password: &str) -> Hs2Result<()> {
        self.write_sasl(SASL_START, b"PLAIN").await?;

        let mut token = Vec::with_capacity(user.len() + password.len() + 2);
        token.push(0);
        token.extend_from_slice(user.as_bytes());
        token.push(0);
        token.extend_from_slice(password.as_bytes());
        self.write_sasl(SASL_OK, &token).await?;

        let (status, payload) = self.read_sasl().await?;
        match status {
            SASL_COMPLETE => {
                debug!(user, "SASL PLAIN negotiation complete");
                Ok(())
            }
            SASL_BAD | SASL_ERROR => Err(Hs2Error::Sasl(
                String::from_utf8_lossy(&payload).into_owned(),
            )),
            other => Err(Hs2Error::Sasl(format!(
                "unexpected negotiation status {}",
                other
            ))),
        }
    }

    async fn write_sasl(&mut self, status: u8, payload: &[u8]) -> Hs2Result<()> {
        let len = u32::try_from(payload.len())
            .map_err(|_| Hs2Error::Sasl("negotiation payload too large".to_string()))?;
        let mut frame = Vec::with_capacity(5 + payload.len());
        frame.push(status);
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(payload);
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_sasl(&mut self) -> Hs2Result<(u8, Vec<u8>)> {
        let status = self.stream.read_u8().await?;
        let len = self.stream.read_u32().await? as usize;
        if len > MAX_FRAME_LEN {
            return Err(Hs2Error::Sasl(format!("negotiation frame of {} bytes", len)));
        }
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await?;
        Ok((status, payload))
    }

    async fn exchange(&mut self, request: Vec<u8>) -> Hs2Result<Vec<u8>> {
        if self.framed {
            let len = u32::try_from(request.len())
                .map_err(|_| Hs2Error::Protocol("request exceeds frame size".to_string()))?;
            self.stream.write_all(&len.to_be_bytes()).await?;
            self.stream.write_all(&request).await?;
            self.stream.flush().await?;

            let len = self.stream.read_u32().await? as usize;
            if len > MAX_FRAME_LEN {
                return Err(Hs2Error::Protocol(format!("reply frame of {} bytes", len)));
            }
            let mut reply = vec![0u8; len];
            self.stream.read_exact(&mut reply).await?;
            Ok(reply)
        } else {
            self.stream.write_all(&request).await?;
            self.stream.flush().await?;
            self.read_unframed().await
        }
    }

    /// Read until the buffer holds one complete thrift message.
    async fn read_unframed(&mut self) -> Hs2Result<Vec<u8>> {
        let mut reply = Vec::with_capacity(4096);
        let mut chunk = [0u8; 8192];
        loop {
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(Hs2Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "coordinator closed the connection mid-reply",
                )));
            }
            reply.extend_from_slice(&chunk[..n]);
            match codec::message_len(&reply) {
                Ok(len) => {
                    reply.truncate(len);
                    return Ok(reply);
                }
                Err(CodecError::UnexpectedEof) if reply.len() <= MAX_FRAME_LEN => continue,
                Err(CodecError::UnexpectedEof) => {
                    return Err(Hs2Error::Protocol("reply exceeds size limit".to_string()));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[async_trait]
impl Channel for SocketChannel {
    async fn round_trip(&mut self, request: Vec<u8>) -> Hs2Result<Vec<u8>> {
        let secs = self.timeout.as_secs();
        let timeout = self.timeout;
        tokio::time::timeout(timeout, self.exchange(request))
            .await
            .map_err(|_| Hs2Error::Timeout {
                operation: "socket round trip",
                secs,
            })?
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "socket shutdown failed");
        }
    }
}
