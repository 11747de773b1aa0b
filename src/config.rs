//! Server settings.
//!
//! Every option is a CLI flag with an environment variable fallback, so the
//! server can be configured entirely from an MCP client's `env` block.

use crate::models::{AuthMechanism, ConnectionSettings, DEFAULT_MAX_ROWS};
use crate::tools::sql_validator::AdmissionPolicy;
use clap::{ArgAction, Parser, ValueEnum};
use std::time::Duration;

pub const DEFAULT_IMPALA_HOST: &str = "coordinator-default-impala.example.com";
pub const DEFAULT_IMPALA_PORT: u16 = 443;
pub const DEFAULT_IMPALA_DATABASE: &str = "default";
pub const DEFAULT_HTTP_PATH: &str = "cliservice";
pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_ENDPOINT: &str = "/mcp";
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LOG_DIR: &str = "/tmp/iceberg-mcp-server";

/// How MCP clients reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// JSON-RPC over stdin/stdout
    #[default]
    Stdio,
    /// Streamable HTTP
    Http,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
        })
    }
}

/// Boolean switch: only a case-insensitive `true` turns it on.
fn parse_flag(value: &str) -> Result<bool, String> {
    Ok(value.trim().eq_ignore_ascii_case("true"))
}

/// Impala connection, MCP transport and logging settings.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "iceberg-mcp-server",
    about = "MCP server exposing Apache Iceberg tables through Cloudera Impala",
    version,
    author
)]
pub struct Config {
    /// Impala coordinator host
    #[arg(long, default_value = DEFAULT_IMPALA_HOST, env = "IMPALA_HOST")]
    pub impala_host: String,

    /// Impala coordinator port
    #[arg(long, default_value_t = DEFAULT_IMPALA_PORT, env = "IMPALA_PORT")]
    pub impala_port: u16,

    /// User name; empty connects anonymously
    #[arg(long, default_value = "", env = "IMPALA_USER")]
    pub impala_user: String,

    /// Password for PLAIN/LDAP authentication
    #[arg(long, default_value = "", env = "IMPALA_PASSWORD", hide_env_values = true)]
    pub impala_password: String,

    /// Database selected when the session opens
    #[arg(long, default_value = DEFAULT_IMPALA_DATABASE, env = "IMPALA_DATABASE")]
    pub impala_database: String,

    /// Authentication mechanism (NOSASL, PLAIN, LDAP)
    #[arg(
        long,
        value_enum,
        ignore_case = true,
        default_value = "LDAP",
        env = "IMPALA_AUTH_MECHANISM"
    )]
    pub impala_auth_mechanism: AuthMechanism,

    /// Speak HS2 over HTTP instead of a raw socket
    #[arg(
        long,
        action = ArgAction::Set,
        value_parser = parse_flag,
        default_value = "true",
        env = "IMPALA_USE_HTTP_TRANSPORT"
    )]
    pub impala_use_http_transport: bool,

    /// HTTP path of the HS2 endpoint
    #[arg(long, default_value = DEFAULT_HTTP_PATH, env = "IMPALA_HTTP_PATH")]
    pub impala_http_path: String,

    /// Use TLS to reach the coordinator
    #[arg(
        long,
        action = ArgAction::Set,
        value_parser = parse_flag,
        default_value = "true",
        env = "IMPALA_USE_SSL"
    )]
    pub impala_use_ssl: bool,

    /// Seconds allowed for opening the HS2 session
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        env = "IMPALA_CONNECT_TIMEOUT"
    )]
    pub connect_timeout: u64,

    /// Seconds a statement may run before it is abandoned
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "IMPALA_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Maximum rows fetched per query
    #[arg(long, default_value_t = DEFAULT_MAX_ROWS, env = "IMPALA_MAX_ROWS")]
    pub max_rows: usize,

    /// Parse admitted queries and reject anything that is not a single read-only statement
    #[arg(
        long,
        action = ArgAction::Set,
        value_parser = parse_flag,
        default_value = "true",
        env = "IMPALA_STRICT_READONLY"
    )]
    pub strict_readonly: bool,

    /// MCP transport
    #[arg(
        short,
        long,
        value_enum,
        default_value = "stdio",
        env = "MCP_TRANSPORT"
    )]
    pub transport: TransportMode,

    /// Listen address for the http transport
    #[arg(long, default_value = DEFAULT_HTTP_HOST, env = "MCP_HTTP_HOST")]
    pub http_host: String,

    /// Listen port for the http transport
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT, env = "MCP_HTTP_PORT")]
    pub http_port: u16,

    /// Path the http transport serves MCP on
    #[arg(long, default_value = DEFAULT_MCP_ENDPOINT, env = "MCP_ENDPOINT")]
    pub mcp_endpoint: String,

    /// Directory for the log file
    #[arg(long, default_value = DEFAULT_LOG_DIR, env = "LOG_DIR")]
    pub log_dir: String,

    /// Default log level
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    /// Log level of the HS2 driver
    #[arg(long, default_value = "info", env = "IMPALA_LOG_LEVEL")]
    pub impala_log_level: String,

    /// Log level of the MCP framework
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL")]
    pub mcp_log_level: String,

    /// Write log records as JSON lines
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Settings for opening the HS2 session.
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            host: self.impala_host.clone(),
            port: self.impala_port,
            user: non_empty(&self.impala_user),
            password: non_empty(&self.impala_password),
            database: non_empty(&self.impala_database),
            auth_mechanism: self.impala_auth_mechanism,
            use_http_transport: self.impala_use_http_transport,
            http_path: self.impala_http_path.clone(),
            use_ssl: self.impala_use_ssl,
            connect_timeout: self.connect_timeout_duration(),
            query_timeout: self.query_timeout_duration(),
        }
    }

    /// Admission policy applied to `execute_query`.
    pub fn admission_policy(&self) -> AdmissionPolicy {
        if self.strict_readonly {
            AdmissionPolicy::strict()
        } else {
            AdmissionPolicy::prefix_only()
        }
    }

    pub fn query_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }

    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

/// Built-in defaults, ignoring the environment.
impl Default for Config {
    fn default() -> Self {
        Self {
            impala_host: DEFAULT_IMPALA_HOST.to_string(),
            impala_port: DEFAULT_IMPALA_PORT,
            impala_user: String::new(),
            impala_password: String::new(),
            impala_database: DEFAULT_IMPALA_DATABASE.to_string(),
            impala_auth_mechanism: AuthMechanism::Ldap,
            impala_use_http_transport: true,
            impala_http_path: DEFAULT_HTTP_PATH.to_string(),
            impala_use_ssl: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            max_rows: DEFAULT_MAX_ROWS,
            strict_readonly: true,
            transport: TransportMode::Stdio,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            log_dir: DEFAULT_LOG_DIR.to_string(),
            log_level: "info".to_string(),
            impala_log_level: "info".to_string(),
            mcp_log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport, TransportMode::Stdio);
        assert_eq!(config.impala_port, 443);
        assert_eq!(config.mcp_endpoint, "/mcp");
        assert_eq!(config.impala_auth_mechanism, AuthMechanism::Ldap);
    }

    #[test]
    fn test_timeout_durations() {
        let config = Config {
            query_timeout: 60,
            connect_timeout: 15,
            ..Config::default()
        };
        assert_eq!(config.query_timeout_duration(), Duration::from_secs(60));
        assert_eq!(config.connect_timeout_duration(), Duration::from_secs(15));
    }

    #[test]
    fn test_parse_flag_only_accepts_true() {
        assert_eq!(parse_flag("true"), Ok(true));
        assert_eq!(parse_flag("TRUE"), Ok(true));
        assert_eq!(parse_flag(" True "), Ok(true));
        assert_eq!(parse_flag("1"), Ok(false));
        assert_eq!(parse_flag("yes"), Ok(false));
        assert_eq!(parse_flag("false"), Ok(false));
        assert_eq!(parse_flag(""), Ok(false));
    }

    #[test]
    fn test_connection_settings_empty_credentials() {
        let settings = Config::default().connection_settings();
        assert_eq!(settings.user, None);
        assert_eq!(settings.password, None);
        assert_eq!(settings.database.as_deref(), Some("default"));
        assert_eq!(settings.http_path, "cliservice");
        assert!(settings.use_http_transport);
        assert!(settings.use_ssl);
    }

    #[test]
    fn test_connection_settings_credentials() {
        let config = Config {
            impala_user: "analyst".to_string(),
            impala_password: "secret".to_string(),
            impala_auth_mechanism: AuthMechanism::Plain,
            impala_use_http_transport: false,
            ..Config::default()
        };
        let settings = config.connection_settings();
        assert_eq!(settings.user.as_deref(), Some("analyst"));
        assert_eq!(settings.password.as_deref(), Some("secret"));
        assert_eq!(settings.auth_mechanism, AuthMechanism::Plain);
        assert!(!settings.use_http_transport);
        assert_eq!(settings.query_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_admission_policy() {
        assert_eq!(Config::default().admission_policy(), AdmissionPolicy::strict());
        let relaxed = Config {
            strict_readonly: false,
            ..Config::default()
        };
        assert_eq!(relaxed.admission_policy(), AdmissionPolicy::prefix_only());
    }

    #[test]
    fn test_parse_from_args() {
        let config = Config::parse_from([
            "iceberg-mcp-server",
            "--impala-host",
            "impala.internal",
            "--impala-port",
            "21050",
            "--impala-auth-mechanism",
            "nosasl",
            "--impala-use-http-transport",
            "False",
            "--impala-use-ssl",
            "false",
            "--max-rows",
            "50",
        ]);
        assert_eq!(config.impala_host, "impala.internal");
        assert_eq!(config.impala_port, 21050);
        assert_eq!(config.impala_auth_mechanism, AuthMechanism::Nosasl);
        assert!(!config.impala_use_http_transport);
        assert!(!config.impala_use_ssl);
        assert_eq!(config.max_rows, 50);
    }
}
