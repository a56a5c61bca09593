//! Command Module
//!
//! Turns decoded commands into replies by running them against the store.
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │ Command
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Store       │  (storage module)
//! └─────────────────┘
//! ```

pub mod handler;

pub use handler::{CommandError, CommandHandler};
