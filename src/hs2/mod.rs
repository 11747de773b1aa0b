//! HiveServer2 client used to talk to Impala coordinators.
//!
//! The driver speaks the Thrift binary protocol over either HTTP (the default
//! for Impala behind a load balancer) or a raw TCP socket, optionally wrapped
//! in SASL PLAIN. Everything above this module sees only [`Session`].

pub mod channel;
pub mod client;
pub mod codec;
pub mod messages;
pub mod rowset;

pub use channel::{Channel, HttpChannel, SocketChannel};
pub use client::{Session, StatementOutput};
pub use codec::CodecError;
pub use messages::ColumnDesc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Hs2Error {
    #[error("malformed thrift payload: {0}")]
    Codec(#[from] CodecError),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from coordinator: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SASL negotiation failed: {0}")]
    Sasl(String),

    #[error("{message}")]
    Server {
        message: String,
        sql_state: Option<String>,
    },

    #[error("thrift application exception (type {kind}): {message}")]
    Application { message: String, kind: i32 },

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    #[error("unsupported configuration: {0}")]
    Unsupported(String),
}

pub type Hs2Result<T> = Result<T, Hs2Error>;
