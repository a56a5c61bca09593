//! RESP Reply Types
//!
//! Every reply the server sends is a [`RespValue`]. Each variant starts with a
//! type prefix byte and is terminated with CRLF:
//!
//! - `+` Simple String: `+OK\r\n`
//! - `-` Error: `-ERR unknown command 'FOO'\r\n`
//! - `:` Integer: `:1000\r\n`
//! - `$` Bulk String: `$5\r\nhello\r\n` (null: `$-1\r\n`)
//! - `*` Array: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`
//!
//! Bulk strings carry their length up front, so payloads may contain any
//! bytes, CRLF included.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A value in the RESP protocol, as sent back to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Status reply. CR and LF are encoded as spaces.
    SimpleString(String),

    /// Error reply. The first word is the error kind (`ERR`, `WRONGTYPE`).
    Error(String),

    /// 64-bit signed integer.
    Integer(i64),

    /// Binary-safe, length-prefixed string.
    BulkString(Bytes),

    /// The null bulk string, `$-1\r\n`.
    Null,

    /// Arrays can contain any RESP type, including nested arrays.
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Creates a new simple string response.
    ///
    /// # Example
    /// ```
    /// use rivulet::protocol::types::RespValue;
    /// let ok = RespValue::simple_string("OK");
    /// assert_eq!(ok.serialize(), b"+OK\r\n");
    /// ```
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Creates a new error response.
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    /// Creates a new bulk string response.
    ///
    /// # Example
    /// ```
    /// use rivulet::protocol::types::RespValue;
    /// let bulk = RespValue::bulk_string("hello");
    /// assert_eq!(bulk.serialize(), b"$5\r\nhello\r\n");
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// Common response for successful operations
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    /// Serializes the value to its wire representation.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.serialize_into(&mut buf);
        buf.to_vec()
    }

    /// Serializes the value into an existing buffer.
    ///
    /// The connection layer reuses one write buffer per client, so replies
    /// to pipelined commands are batched into a single write.
    pub fn serialize_into(&self, buf: &mut BytesMut) {
        match self {
            RespValue::SimpleString(s) => write_status(buf, prefix::SIMPLE_STRING, s),
            RespValue::Error(s) => write_status(buf, prefix::ERROR, s),
            RespValue::Integer(n) => write_line(buf, prefix::INTEGER, n.to_string().as_bytes()),
            RespValue::BulkString(data) => {
                write_line(buf, prefix::BULK_STRING, data.len().to_string().as_bytes());
                buf.put_slice(data);
                buf.put_slice(CRLF);
            }
            RespValue::Null => write_line(buf, prefix::BULK_STRING, b"-1"),
            RespValue::Array(values) => {
                write_line(buf, prefix::ARRAY, values.len().to_string().as_bytes());
                for value in values {
                    value.serialize_into(buf);
                }
            }
        }
    }

    /// Upper bound on the number of bytes `serialize` will produce.
    fn encoded_len(&self) -> usize {
        // prefix + up to 20 digits + CRLF
        const HEADER: usize = 1 + 20 + 2;
        match self {
            RespValue::SimpleString(s) | RespValue::Error(s) => 1 + s.len() + 2,
            RespValue::Integer(_) | RespValue::Null => HEADER,
            RespValue::BulkString(data) => HEADER + data.len() + 2,
            RespValue::Array(values) => {
                HEADER + values.iter().map(RespValue::encoded_len).sum::<usize>()
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }
}

#[inline]
fn write_line(buf: &mut BytesMut, prefix: u8, content: &[u8]) {
    buf.put_u8(prefix);
    buf.put_slice(content);
    buf.put_slice(CRLF);
}

/// Writes a one-line status or error reply. Error text can quote client
/// bytes, so CR and LF become spaces to keep the reply on a single line.
fn write_status(buf: &mut BytesMut, prefix: u8, content: &str) {
    buf.put_u8(prefix);
    buf.extend(
        content
            .bytes()
            .map(|byte| if byte == b'\r' || byte == b'\n' { b' ' } else { byte }),
    );
    buf.put_slice(CRLF);
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "{}", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) if values.is_empty() => write!(f, "(empty array)"),
            RespValue::Array(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, v)?;
                }
                Ok(())
            }
        }
    }
}
