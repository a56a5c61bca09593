//! Decoded client commands.

use crate::protocol::types::RespValue;
use bytes::Bytes;

/// A single request decoded from the wire.
///
/// `name` is always upper-cased so dispatch is case-insensitive. Arguments
/// are `Bytes` slices into the frame they were decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<Bytes>,
}

impl Command {
    pub fn new(name: impl AsRef<str>, args: Vec<Bytes>) -> Self {
        Self {
            name: name.as_ref().to_ascii_uppercase(),
            args,
        }
    }

    /// Re-encodes the command as an array of bulk strings.
    pub fn to_resp(&self) -> RespValue {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(RespValue::bulk_string(Bytes::from(self.name.clone())));
        parts.extend(self.args.iter().cloned().map(RespValue::BulkString));
        RespValue::array(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_uppercased() {
        let cmd = Command::new("xAdd", vec![]);
        assert_eq!(cmd.name, "XADD");
    }

    #[test]
    fn test_to_resp() {
        let cmd = Command::new("get", vec![Bytes::from("name")]);
        assert_eq!(
            cmd.to_resp().serialize(),
            b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n"
        );
    }
}
