//! Backend access layer.
//!
//! This module provides:
//! - The `Connection` / `Connector` seam
//! - The Impala implementation over HiveServer2
//! - The single-connection manager shared by every tool

pub mod connection;
pub mod impala;
pub mod manager;

pub use connection::{Connection, Connector};
pub use impala::{ImpalaConnection, ImpalaConnector};
pub use manager::ConnectionManager;
