//! Connection settings for the Impala coordinator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Authentication mechanism negotiated with the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthMechanism {
    /// No authentication, unframed transport
    Nosasl,
    Plain,
    Ldap,
}

impl AuthMechanism {
    /// Whether credentials are sent (HTTP basic auth or SASL PLAIN).
    pub fn sends_credentials(&self) -> bool {
        matches!(self, Self::Plain | Self::Ldap)
    }
}

impl fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nosasl => write!(f, "NOSASL"),
            Self::Plain => write!(f, "PLAIN"),
            Self::Ldap => write!(f, "LDAP"),
        }
    }
}

/// Everything needed to open an HS2 session.
#[derive(Clone)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    /// None when connecting anonymously
    pub user: Option<String>,
    /// Contains sensitive data - never log
    pub password: Option<String>,
    /// Database selected when the session opens
    pub database: Option<String>,
    pub auth_mechanism: AuthMechanism,
    pub use_http_transport: bool,
    pub http_path: String,
    pub use_ssl: bool,
    pub connect_timeout: Duration,
    /// Upper bound for a single statement, including polling and fetching
    pub query_timeout: Duration,
}

impl ConnectionSettings {
    /// Endpoint used by the HTTP transport.
    pub fn http_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        let path = self.http_path.trim_start_matches('/');
        format!("{}://{}:{}/{}", scheme, self.host, self.port, path)
    }

    /// Short description safe for logs.
    pub fn describe(&self) -> String {
        let transport = if self.use_http_transport { "http" } else { "socket" };
        format!(
            "{}:{} ({}, {}, ssl={})",
            self.host, self.port, transport, self.auth_mechanism, self.use_ssl
        )
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("database", &self.database)
            .field("auth_mechanism", &self.auth_mechanism)
            .field("use_http_transport", &self.use_http_transport)
            .field("http_path", &self.http_path)
            .field("use_ssl", &self.use_ssl)
            .field("connect_timeout", &self.connect_timeout)
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}
