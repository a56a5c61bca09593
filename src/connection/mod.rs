//! Client Connections
//!
//! Every accepted socket is served by its own Tokio task running a
//! [`ConnectionHandler`]. The handler owns the read buffer and the parser
//! state for that client; the [`CommandHandler`](crate::commands::CommandHandler)
//! it holds is a cheap handle onto the shared store.
//!
//! ```text
//! ┌──────────────┐  accept()   ┌───────────────────────────────┐
//! │ TcpListener  │────────────>│ tokio::spawn(handle_connection)│
//! │  (main.rs)   │             └───────────────┬───────────────┘
//! └──────────────┘                             │
//!                                              ▼
//!                              read ─> parse ─> execute ─> reply
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use rivulet::commands::CommandHandler;
//! use rivulet::connection::{handle_connection, ConnectionStats};
//! use rivulet::storage::Store;
//! use std::sync::Arc;
//!
//! let store = Arc::new(Store::new());
//! let stats = Arc::new(ConnectionStats::new());
//!
//! let (stream, addr) = listener.accept().await?;
//! let handler = CommandHandler::new(Arc::clone(&store));
//! tokio::spawn(handle_connection(stream, addr, handler, Arc::clone(&stats)));
//! ```

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
