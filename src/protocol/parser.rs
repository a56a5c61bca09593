//! Zero-Copy Command Decoder
//!
//! This module turns the raw bytes a client sends into [`Command`]s.
//!
//! ## Accepted Shapes
//!
//! 1. **Array form** (what every real client sends):
//!    `*<N>\r\n` followed by N bulk strings `$<len>\r\n<bytes>\r\n`.
//! 2. **Inline form** (handy from `telnet`/`nc`): a single line of
//!    space-separated tokens, used whenever the first byte is not `*`.
//!
//! ## How the Decoder Works
//!
//! [`RespParser::parse_command`] scans the buffer without copying. It returns:
//! - `Ok(Some(command))` - a full frame was decoded and split off the buffer
//! - `Ok(None)` - the frame is incomplete, read more bytes and call again
//! - `Err(ParseError)` - the payload is malformed
//!
//! Once a frame is known to be complete it is split off the connection buffer
//! with `split_to(..).freeze()`, and every argument is a `Bytes::slice` into
//! that frame. No argument bytes are copied.
//!
//! ## Recoverable Errors
//!
//! Some errors are only detected after the frame boundaries are known (empty
//! command, command name that is not UTF-8). Those frames have already been
//! consumed, so the connection can reply with an error and keep going; see
//! [`ParseError::is_recoverable`]. Every other error leaves the decoder unable
//! to find the start of the next command.

use crate::protocol::command::Command;
use crate::protocol::types::{prefix, CRLF};
use bytes::BytesMut;
use thiserror::Error;

/// Errors that can occur while decoding a command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// An array element was not introduced by `$`
    #[error("expected '$', got '{0}'")]
    ExpectedBulkString(char),

    /// A length line did not hold an integer
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Bulk string length is negative
    #[error("invalid bulk length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative or absurdly large
    #[error("invalid multibulk length: {0}")]
    InvalidArrayLength(i64),

    /// Protocol violation (missing CRLF, etc.)
    #[error("{0}")]
    ProtocolError(String),

    /// The message exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The frame was well delimited but does not form a command
    #[error("{0}")]
    InvalidCommand(String),
}

impl ParseError {
    /// Returns true if the offending frame was consumed and decoding can
    /// continue with the next command.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ParseError::InvalidCommand(_))
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of elements in a request array
pub const MAX_ARRAY_LEN: i64 = 1024 * 1024;

/// Maximum length of an inline command line
pub const MAX_INLINE_SIZE: usize = 64 * 1024;

/// Longest `*<n>` / `$<n>` header we wait for before giving up
const MAX_LENGTH_LINE: usize = 32;

/// A zero-copy command decoder.
///
/// The decoder keeps a scratch buffer of argument offsets that is reused
/// between commands, so steady-state decoding only allocates the argument
/// vector handed to the dispatcher.
///
/// # Example
///
/// ```
/// use rivulet::protocol::RespParser;
/// use bytes::BytesMut;
///
/// let mut parser = RespParser::new();
/// let mut buffer = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n"[..]);
///
/// let command = parser.parse_command(&mut buffer).unwrap().unwrap();
/// assert_eq!(command.name, "GET");
/// assert_eq!(command.args, vec![bytes::Bytes::from("name")]);
/// assert!(buffer.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    /// `(start, end)` byte offsets of every element of the current frame
    spans: Vec<(usize, usize)>,
}

impl RespParser {
    pub fn new() -> Self {
        Self { spans: Vec::new() }
    }

    /// Attempts to decode one command from the front of `buf`.
    ///
    /// On success the frame is removed from `buf`. When more data is needed
    /// `buf` is left untouched.
    pub fn parse_command(&mut self, buf: &mut BytesMut) -> ParseResult<Option<Command>> {
        if buf.is_empty() {
            return Ok(None);
        }

        self.spans.clear();
        let scanned = if buf[0] == prefix::ARRAY {
            self.scan_array(buf)?
        } else {
            self.scan_inline(buf)?
        };

        let consumed = match scanned {
            Some(consumed) => consumed,
            None => return Ok(None),
        };

        let frame = buf.split_to(consumed).freeze();
        let mut parts = self.spans.iter().map(|&(start, end)| frame.slice(start..end));

        let name = parts
            .next()
            .ok_or_else(|| ParseError::InvalidCommand("empty command".to_string()))?;
        let name = std::str::from_utf8(&name).map_err(|_| {
            ParseError::InvalidCommand("command name is not valid UTF-8".to_string())
        })?;

        Ok(Some(Command::new(name, parts.collect())))
    }

    /// Scans `*<N>\r\n` followed by N bulk strings.
    ///
    /// Returns the total frame length once every element is buffered.
    fn scan_array(&mut self, buf: &[u8]) -> ParseResult<Option<usize>> {
        debug_assert!(buf[0] == prefix::ARRAY);

        let (count, mut pos) = match read_length_line(buf, 1)? {
            Some(header) => header,
            None => return Ok(None),
        };

        if !(0..=MAX_ARRAY_LEN).contains(&count) {
            return Err(ParseError::InvalidArrayLength(count));
        }

        for _ in 0..count {
            if pos >= buf.len() {
                return Ok(None);
            }
            if buf[pos] != prefix::BULK_STRING {
                return Err(ParseError::ExpectedBulkString(char::from(buf[pos])));
            }

            let (length, data_start) = match read_length_line(buf, pos + 1)? {
                Some(header) => header,
                None => return Ok(None),
            };

            if length < 0 {
                return Err(ParseError::InvalidBulkLength(length));
            }
            let length = length as usize;
            if length > MAX_BULK_SIZE {
                return Err(ParseError::MessageTooLarge {
                    size: length,
                    max: MAX_BULK_SIZE,
                });
            }

            let data_end = data_start + length;
            if buf.len() < data_end + 2 {
                return Ok(None);
            }
            if &buf[data_end..data_end + 2] != CRLF {
                return Err(ParseError::ProtocolError(
                    "bulk string missing trailing CRLF".to_string(),
                ));
            }

            self.spans.push((data_start, data_end));
            pos = data_end + 2;
        }

        Ok(Some(pos))
    }

    /// Scans a single inline line, terminated by `\n` (optionally `\r\n`).
    fn scan_inline(&mut self, buf: &[u8]) -> ParseResult<Option<usize>> {
        let newline = match buf.iter().position(|&b| b == b'\n') {
            Some(pos) => pos,
            None if buf.len() > MAX_INLINE_SIZE => {
                return Err(ParseError::MessageTooLarge {
                    size: buf.len(),
                    max: MAX_INLINE_SIZE,
                })
            }
            None => return Ok(None),
        };

        let line_end = if newline > 0 && buf[newline - 1] == b'\r' {
            newline - 1
        } else {
            newline
        };

        let mut start = None;
        for (i, &b) in buf[..line_end].iter().enumerate() {
            match (b == b' ' || b == b'\t', start) {
                (true, Some(s)) => {
                    self.spans.push((s, i));
                    start = None;
                }
                (false, None) => start = Some(i),
                _ => {}
            }
        }
        if let Some(s) = start {
            self.spans.push((s, line_end));
        }

        Ok(Some(newline + 1))
    }
}

/// Reads a `<integer>\r\n` line starting at `start`.
///
/// Returns the integer and the offset just past the CRLF.
fn read_length_line(buf: &[u8], start: usize) -> ParseResult<Option<(i64, usize)>> {
    let rest = buf.get(start..).unwrap_or_default();
    let end = match find_crlf(rest) {
        Some(pos) => pos,
        None if rest.len() > MAX_LENGTH_LINE => {
            return Err(ParseError::ProtocolError(
                "length line is missing CRLF".to_string(),
            ))
        }
        None => return Ok(None),
    };

    let digits = &rest[..end];
    let n = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ParseError::InvalidInteger(String::from_utf8_lossy(digits).into_owned()))?;

    Ok(Some((n, start + end + 2)))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|window| window == CRLF)
}

/// Decodes a single command from `buf` with a fresh parser.
pub fn parse_command(buf: &mut BytesMut) -> ParseResult<Option<Command>> {
    RespParser::new().parse_command(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn buffer(input: &[u8]) -> BytesMut {
        BytesMut::from(input)
    }

    fn args(values: &[&str]) -> Vec<Bytes> {
        values.iter().map(|v| Bytes::from(v.to_string())).collect()
    }

    #[test]
    fn test_parse_array_command() {
        let mut buf = buffer(b"*3\r\n$3\r\nSET\r\n$8\r\nuser:101\r\n$4\r\nAriz\r\n");
        let cmd = parse_command(&mut buf).unwrap().unwrap();
        assert_eq!(cmd.name, "SET");
        assert_eq!(cmd.args, args(&["user:101", "Ariz"]));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_command_name_is_case_insensitive() {
        let mut buf = buffer(b"*1\r\n$4\r\nping\r\n");
        let cmd = parse_command(&mut buf).unwrap().unwrap();
        assert_eq!(cmd.name, "PING");
    }

    #[test]
    fn test_parse_incomplete_leaves_buffer() {
        let inputs: [&[u8]; 6] = [
            b"*",
            b"*2\r\n",
            b"*2\r\n$3\r\nGET\r\n",
            b"*2\r\n$3\r\nGET\r\n$4",
            b"*2\r\n$3\r\nGET\r\n$4\r\nna",
            b"*2\r\n$3\r\nGET\r\n$4\r\nname\r",
        ];
        for input in inputs {
            let mut buf = buffer(input);
            assert_eq!(parse_command(&mut buf).unwrap(), None, "input {:?}", input);
            assert_eq!(&buf[..], input);
        }
    }

    #[test]
    fn test_parse_pipelined_commands() {
        let mut buf = buffer(b"*1\r\n$4\r\nPING\r\n*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n");
        let mut parser = RespParser::new();

        let first = parser.parse_command(&mut buf).unwrap().unwrap();
        assert_eq!(first.name, "PING");

        let second = parser.parse_command(&mut buf).unwrap().unwrap();
        assert_eq!(second.name, "ECHO");
        assert_eq!(second.args, args(&["hi"]));

        assert_eq!(parser.parse_command(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_binary_safe_bulk_string() {
        // Payload containing CRLF and a NUL byte
        let mut buf = buffer(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$5\r\na\r\n\x00b\r\n");
        let cmd = parse_command(&mut buf).unwrap().unwrap();
        assert_eq!(cmd.args[1], Bytes::from_static(b"a\r\n\x00b"));
    }

    #[test]
    fn test_empty_bulk_string() {
        let mut buf = buffer(b"*2\r\n$4\r\nECHO\r\n$0\r\n\r\n");
        let cmd = parse_command(&mut buf).unwrap().unwrap();
        assert_eq!(cmd.args, vec![Bytes::new()]);
    }

    #[test]
    fn test_parse_inline_command() {
        let mut buf = buffer(b"SET  foo   bar\r\n");
        let cmd = parse_command(&mut buf).unwrap().unwrap();
        assert_eq!(cmd.name, "SET");
        assert_eq!(cmd.args, args(&["foo", "bar"]));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_parse_inline_with_bare_newline() {
        let mut buf = buffer(b"ping\n");
        let cmd = parse_command(&mut buf).unwrap().unwrap();
        assert_eq!(cmd.name, "PING");
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn test_parse_inline_incomplete() {
        let mut buf = buffer(b"PING");
        assert_eq!(parse_command(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_invalid_array_count() {
        let mut buf = buffer(b"*abc\r\n");
        assert!(matches!(
            parse_command(&mut buf),
            Err(ParseError::InvalidInteger(_))
        ));

        let mut buf = buffer(b"*-1\r\n");
        assert_eq!(
            parse_command(&mut buf),
            Err(ParseError::InvalidArrayLength(-1))
        );
    }

    #[test]
    fn test_element_without_bulk_prefix() {
        let mut buf = buffer(b"*1\r\n+PING\r\n");
        let err = parse_command(&mut buf).unwrap_err();
        assert_eq!(err, ParseError::ExpectedBulkString('+'));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_invalid_bulk_length() {
        let mut buf = buffer(b"*1\r\n$x\r\nPING\r\n");
        assert!(matches!(
            parse_command(&mut buf),
            Err(ParseError::InvalidInteger(_))
        ));

        let mut buf = buffer(b"*1\r\n$-5\r\n");
        assert_eq!(
            parse_command(&mut buf),
            Err(ParseError::InvalidBulkLength(-5))
        );
    }

    #[test]
    fn test_bulk_length_mismatch() {
        let mut buf = buffer(b"*1\r\n$2\r\nPING\r\n");
        assert!(matches!(
            parse_command(&mut buf),
            Err(ParseError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_bulk_too_large() {
        let mut buf = buffer(b"*1\r\n$999999999999\r\n");
        assert!(matches!(
            parse_command(&mut buf),
            Err(ParseError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_empty_array_is_recoverable() {
        let mut buf = buffer(b"*0\r\n*1\r\n$4\r\nPING\r\n");
        let err = parse_command(&mut buf).unwrap_err();
        assert!(err.is_recoverable());

        // The empty frame was consumed; the next command decodes normally
        let cmd = parse_command(&mut buf).unwrap().unwrap();
        assert_eq!(cmd.name, "PING");
    }

    #[test]
    fn test_blank_inline_line_is_recoverable() {
        let mut buf = buffer(b"   \r\nPING\r\n");
        assert!(parse_command(&mut buf).unwrap_err().is_recoverable());
        assert_eq!(parse_command(&mut buf).unwrap().unwrap().name, "PING");
    }

    #[test]
    fn test_non_utf8_command_name_is_recoverable() {
        let mut buf = buffer(b"*1\r\n$2\r\n\xff\xfe\r\n");
        assert!(parse_command(&mut buf).unwrap_err().is_recoverable());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_roundtrip_set_command() {
        let wire = b"*5\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n$2\r\nPX\r\n$3\r\n100\r\n";
        let mut buf = buffer(wire);
        let cmd = parse_command(&mut buf).unwrap().unwrap();
        assert_eq!(cmd.to_resp().serialize(), wire.to_vec());
    }

    #[test]
    fn test_inline_roundtrip_normalizes_to_array() {
        let mut buf = buffer(b"set foo bar\r\n");
        let cmd = parse_command(&mut buf).unwrap().unwrap();
        assert_eq!(
            cmd.to_resp().serialize(),
            b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n".to_vec()
        );
    }
}
