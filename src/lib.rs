//! # Rivulet - An In-Memory Key-Value and Stream Store
//!
//! Rivulet speaks the Redis wire protocol (RESP) and keeps two kinds of
//! values in memory: plain strings with optional expiry, and append-only
//! streams addressed by `<ms>-<seq>` entry IDs.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              Rivulet                                │
//! │                                                                     │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐              │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │              │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │              │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘              │
//! │                            │                  │                     │
//! │                            ▼                  ▼                     │
//! │                     ┌─────────────┐    ┌─────────────────────────┐  │
//! │                     │    RESP     │    │          Store          │  │
//! │                     │   Parser    │    │  Keyspace | StreamStore │  │
//! │                     └─────────────┘    └─────────────────────────┘  │
//! │                                                  ▲                  │
//! │                                                  │                  │
//! │                                       ┌──────────┴──────────┐       │
//! │                                       │    ExpiryReaper     │       │
//! │                                       │ (Background Task)   │       │
//! │                                       └─────────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use rivulet::{handle_connection, CommandHandler, ConnectionStats};
//! use rivulet::storage::{ExpiryConfig, ExpiryReaper, Store};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(Store::new());
//!     let _reaper = ExpiryReaper::start(Arc::clone(&store), ExpiryConfig::default());
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind("127.0.0.1:6379").await?;
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         let handler = CommandHandler::new(Arc::clone(&store));
//!         tokio::spawn(handle_connection(stream, addr, handler, Arc::clone(&stats)));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - Server: `PING`, `ECHO`, `DBSIZE`, `COMMAND`, `QUIT`
//! - Strings: `SET key value [PX ms | EX s]`, `GET`, `EXISTS`, `TYPE`
//! - Streams: `XADD`, `XRANGE`, `XREAD [COUNT n] STREAMS ...`, `XLEN`
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP decoding and reply encoding
//! - [`storage`]: Sharded keyspace, streams and the expiry reaper
//! - [`commands`]: The command dispatcher
//! - [`connection`]: Per-client read/execute/reply loop
//! - [`config`]: Command-line and environment configuration
//!
//! ## Design Highlights
//!
//! ### One Namespace
//!
//! A name holds either a string or a stream, never both. `SET` on a stream
//! and `XADD` on a string fail with `WRONGTYPE`.
//!
//! ### Lazy + Active Expiry
//!
//! An expired string is removed when it is next read, and the reaper sweeps
//! up the ones nobody reads. Both paths treat an entry whose deadline is at
//! or before "now" as gone.
//!
//! ### Linearized Appends
//!
//! Stream IDs are resolved and appended under the stream's shard write lock,
//! so concurrent `XADD *` calls in the same millisecond get consecutive
//! sequence numbers.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod storage;

pub use commands::{CommandError, CommandHandler};
pub use config::Config;
pub use connection::{handle_connection, ConnectionError, ConnectionStats};
pub use protocol::{Command, ParseError, RespParser, RespValue};
pub use storage::{ExpiryConfig, ExpiryReaper, Store, StoreError};

/// The default port Rivulet listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host Rivulet binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of Rivulet
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
