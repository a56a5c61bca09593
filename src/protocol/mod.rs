//! RESP Protocol Implementation
//!
//! The wire codec for Rivulet. It knows how bytes are framed, not what
//! commands mean.
//!
//! ## Modules
//!
//! - `command`: The decoded [`Command`] (upper-cased name + arguments)
//! - `parser`: Zero-copy decoder for array and inline requests
//! - `types`: The [`RespValue`] reply enum and its serialization
//!
//! ## Example
//!
//! ```
//! use rivulet::protocol::{parse_command, RespValue};
//! use bytes::BytesMut;
//!
//! // Decoding a request
//! let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n"[..]);
//! let command = parse_command(&mut buf).unwrap().unwrap();
//! assert_eq!(command.name, "GET");
//!
//! // Encoding a reply
//! let reply = RespValue::bulk_string("Ariz");
//! assert_eq!(reply.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod command;
pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use command::Command;
pub use parser::{parse_command, ParseError, ParseResult, RespParser};
pub use types::RespValue;
