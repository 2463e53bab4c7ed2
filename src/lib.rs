//! Platform common library.
//!
//! Shared plumbing for services that talk to SQL databases (SQLite,
//! PostgreSQL, MySQL) and consume message streams: a traced,
//! transaction-aware query executor, a request `Context`, a client that owns
//! the connection pool, and the consumer contract.

pub mod client;
pub mod config;
pub mod consumer;
pub mod context;
pub mod db;
pub mod error;
pub mod logging;

pub use client::Client;
pub use config::{Config, DatabaseConfig};
pub use context::Context;
pub use error::{ConsumerError, DbError, DbResult};
