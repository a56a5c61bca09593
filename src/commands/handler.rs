//! Command Dispatcher
//!
//! Maps a decoded [`Command`] to its handler and renders the result as a
//! RESP reply.
//!
//! ## Supported Commands
//!
//! ### Connection / Server
//! - `PING [message]`
//! - `ECHO message`
//! - `DBSIZE`
//! - `COMMAND` - Handshake probe sent by `redis-cli`; answered with `*0`
//! - `QUIT` - Replies `+OK`; the connection closes afterwards
//!
//! ### Strings
//! - `SET key value [PX milliseconds | EX seconds]`
//! - `GET key`
//! - `EXISTS key [key ...]`
//! - `TYPE key`
//!
//! ### Streams
//! - `XADD stream id field value [field value ...]`
//! - `XRANGE stream start end [COUNT n]`
//! - `XREAD [COUNT n] STREAMS stream [stream ...] id [id ...]`
//! - `XLEN stream`
//!
//! Every handler validates its arguments completely before it touches the
//! store, so a rejected command never changes state.

use crate::protocol::{Command, RespValue};
use crate::storage::{Bound, Store, StoreError, StreamEntry, StreamId};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Errors produced while validating or running a command.
///
/// The `Display` text is the exact error reply, minus the leading `-`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpireTime(String),

    #[error(
        "ERR Unbalanced '{0}' list of streams: for each stream key an ID must be specified."
    )]
    UnbalancedStreams(String),

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

type CommandResult = Result<RespValue, CommandError>;

/// Executes commands against a shared [`Store`].
///
/// Cheap to clone; every connection gets its own handle.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    store: Arc<Store>,
}

impl CommandHandler {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Executes a command and returns the reply to send.
    ///
    /// Failures are rendered as error replies; this never fails.
    pub fn execute(&self, command: Command) -> RespValue {
        trace!(command = %command.name, args = command.args.len(), "Executing command");

        match self.dispatch(&command.name, &command.args) {
            Ok(reply) => reply,
            Err(e) => RespValue::error(e.to_string()),
        }
    }

    fn dispatch(&self, name: &str, args: &[Bytes]) -> CommandResult {
        match name {
            "PING" => self.cmd_ping(args),
            "ECHO" => self.cmd_echo(args),
            "DBSIZE" => self.cmd_dbsize(args),
            "COMMAND" => Ok(RespValue::array(Vec::new())),
            "QUIT" => Ok(RespValue::ok()),

            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "EXISTS" => self.cmd_exists(args),
            "TYPE" => self.cmd_type(args),

            "XADD" => self.cmd_xadd(args),
            "XRANGE" => self.cmd_xrange(args),
            "XREAD" => self.cmd_xread(args),
            "XLEN" => self.cmd_xlen(args),

            _ => Err(CommandError::UnknownCommand(name.to_ascii_lowercase())),
        }
    }

    // ========================================================================
    // Server commands
    // ========================================================================

    /// PING [message]
    fn cmd_ping(&self, args: &[Bytes]) -> CommandResult {
        match args {
            [] => Ok(RespValue::pong()),
            [message] => Ok(RespValue::bulk_string(message.clone())),
            _ => Err(arity("ping")),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Bytes]) -> CommandResult {
        match args {
            [message] => Ok(RespValue::bulk_string(message.clone())),
            _ => Err(arity("echo")),
        }
    }

    /// DBSIZE
    fn cmd_dbsize(&self, args: &[Bytes]) -> CommandResult {
        if !args.is_empty() {
            return Err(arity("dbsize"));
        }
        Ok(RespValue::integer(self.store.dbsize() as i64))
    }

    // ========================================================================
    // String commands
    // ========================================================================

    /// SET key value [PX milliseconds | EX seconds]
    fn cmd_set(&self, args: &[Bytes]) -> CommandResult {
        let (key, value, options) = match args {
            [key, value, options @ ..] => (key, value, options),
            _ => return Err(arity("set")),
        };

        let mut ttl: Option<Duration> = None;
        let mut options = options.iter();
        while let Some(option) = options.next() {
            let in_millis = if option.eq_ignore_ascii_case(b"PX") {
                true
            } else if option.eq_ignore_ascii_case(b"EX") {
                false
            } else {
                return Err(CommandError::Syntax);
            };

            // Only one expiry option is allowed
            if ttl.is_some() {
                return Err(CommandError::Syntax);
            }

            let amount = options.next().ok_or(CommandError::Syntax)?;
            ttl = Some(parse_ttl(amount, in_millis)?);
        }

        self.store.set(key.clone(), value.clone(), ttl)?;
        Ok(RespValue::ok())
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> CommandResult {
        let [key] = args else {
            return Err(arity("get"));
        };

        Ok(match self.store.get(key)? {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        })
    }

    /// EXISTS key [key ...]
    fn cmd_exists(&self, args: &[Bytes]) -> CommandResult {
        if args.is_empty() {
            return Err(arity("exists"));
        }

        let count = args.iter().filter(|key| self.store.exists(key)).count();
        Ok(RespValue::integer(count as i64))
    }

    /// TYPE key
    fn cmd_type(&self, args: &[Bytes]) -> CommandResult {
        let [key] = args else {
            return Err(arity("type"));
        };

        Ok(RespValue::simple_string(self.store.key_type(key).as_str()))
    }

    // ========================================================================
    // Stream commands
    // ========================================================================

    /// XADD stream id field value [field value ...]
    fn cmd_xadd(&self, args: &[Bytes]) -> CommandResult {
        let (key, id, pairs) = match args {
            [key, id, pairs @ ..] if !pairs.is_empty() && pairs.len() % 2 == 0 => {
                (key, id, pairs)
            }
            _ => return Err(arity("xadd")),
        };

        let fields = pairs
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect();

        let id = self.store.xadd(key.clone(), id, fields)?;
        Ok(RespValue::bulk_string(id.to_string()))
    }

    /// XRANGE stream start end [COUNT n]
    fn cmd_xrange(&self, args: &[Bytes]) -> CommandResult {
        let (key, start, end, count) = match args {
            [key, start, end] => (key, start, end, None),
            [key, start, end, option, count] => {
                if !option.eq_ignore_ascii_case(b"COUNT") {
                    return Err(CommandError::Syntax);
                }
                (key, start, end, Some(parse_count(count)?))
            }
            [_, _, _, _] => return Err(CommandError::Syntax),
            _ => return Err(arity("xrange")),
        };

        let start = StreamId::parse_bound(start, Bound::Start)?;
        let end = StreamId::parse_bound(end, Bound::End)?;

        let entries = self.store.xrange(key, start, end, count)?;
        Ok(entries_reply(entries))
    }

    /// XREAD [COUNT n] STREAMS stream [stream ...] id [id ...]
    ///
    /// Each stream returns entries strictly after its ID, one entry unless
    /// `COUNT` says otherwise.
    fn cmd_xread(&self, args: &[Bytes]) -> CommandResult {
        let (count, rest) = match args {
            [option, value, tail @ ..] if option.eq_ignore_ascii_case(b"COUNT") => {
                match parse_count(value)? {
                    0 => return Err(CommandError::NotAnInteger),
                    count => (count, tail),
                }
            }
            _ => (1, args),
        };

        let streams_and_ids = match rest {
            [keyword, tail @ ..] if keyword.eq_ignore_ascii_case(b"STREAMS") => tail,
            [] => return Err(arity("xread")),
            _ => return Err(CommandError::Syntax),
        };

        if streams_and_ids.is_empty() {
            return Err(arity("xread"));
        }
        if streams_and_ids.len() % 2 != 0 {
            return Err(CommandError::UnbalancedStreams("xread".to_string()));
        }

        let (keys, ids) = streams_and_ids.split_at(streams_and_ids.len() / 2);
        let requests = keys
            .iter()
            .zip(ids)
            .map(|(key, id)| {
                StreamId::parse_bound(id, Bound::Start).map(|after| (key.clone(), after))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let results = self.store.xread(&requests, count)?;
        Ok(RespValue::array(
            results
                .into_iter()
                .map(|(key, entries)| {
                    RespValue::array(vec![RespValue::bulk_string(key), entries_reply(entries)])
                })
                .collect(),
        ))
    }

    /// XLEN stream
    fn cmd_xlen(&self, args: &[Bytes]) -> CommandResult {
        let [key] = args else {
            return Err(arity("xlen"));
        };

        Ok(RespValue::integer(self.store.xlen(key)? as i64))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn arity(command: &str) -> CommandError {
    CommandError::WrongArity(command.to_string())
}

/// Parses a base-10 signed integer argument.
fn parse_integer(arg: &[u8]) -> Result<i64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::NotAnInteger)
}

/// Parses a `COUNT` argument. Negative values are out of range.
fn parse_count(arg: &[u8]) -> Result<usize, CommandError> {
    usize::try_from(parse_integer(arg)?).map_err(|_| CommandError::NotAnInteger)
}

/// Parses the amount after `PX`/`EX`. Anything but a positive integer whose
/// millisecond value fits in an `i64` is an invalid expire time.
fn parse_ttl(arg: &[u8], in_millis: bool) -> Result<Duration, CommandError> {
    let invalid = || CommandError::InvalidExpireTime("set".to_string());

    let amount = parse_integer(arg).map_err(|_| invalid())?;
    let millis = if in_millis {
        Some(amount)
    } else {
        amount.checked_mul(1000)
    };

    match millis {
        Some(ms) if ms > 0 => Ok(Duration::from_millis(ms as u64)),
        _ => Err(invalid()),
    }
}

/// `[id, [field, value, ...]]` for each entry.
fn entries_reply(entries: Vec<StreamEntry>) -> RespValue {
    RespValue::array(
        entries
            .into_iter()
            .map(|entry| {
                let fields = entry
                    .fields
                    .into_iter()
                    .flat_map(|(field, value)| {
                        [RespValue::bulk_string(field), RespValue::bulk_string(value)]
                    })
                    .collect();
                RespValue::array(vec![
                    RespValue::bulk_string(entry.id.to_string()),
                    RespValue::array(fields),
                ])
            })
            .collect(),
    )
}
