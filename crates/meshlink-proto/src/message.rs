//! System-channel message protocol.
//!
//! Every message starts with a one-byte type tag followed by a
//! tag-specific body. Integers are big-endian.

use thiserror::Error;

use crate::address::Address;

/// Message type identifiers.
pub mod msg_type {
    /// Player announces (or changes) its display name.
    pub const NAME: u8 = 0x02;
    /// Host tells a player to connect to a newcomer; from a non-host it
    /// acknowledges such a connection.
    pub const CONNECT: u8 = 0x04;
    /// Sender asks for the address the receiver sees it at.
    pub const IP_REQUEST: u8 = 0x06;
    pub const IP_RESPONSE: u8 = 0x08;
}

/// Size of the fixed name field on the wire, including the terminating NUL.
pub const MAX_NAME_LENGTH: usize = 32;

/// System-channel messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemMessage {
    Name { name: String },
    Connect { address: Address },
    IpRequest,
    IpResponse { address: Address },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Empty system message")]
    Empty,

    #[error("Unknown system message type: {0}")]
    UnknownTag(u8),

    #[error("Truncated system message (type {tag}): expected {expected} bytes, got {actual}")]
    Truncated {
        tag: u8,
        expected: usize,
        actual: usize,
    },
}

/// Cut `name` to what fits in the wire name field.
///
/// Keeps at most `MAX_NAME_LENGTH - 1` bytes, never splits a character and
/// stops at an embedded NUL.
pub fn truncate_name(name: &str) -> &str {
    let name = name.split('\0').next().unwrap_or_default();
    let limit = MAX_NAME_LENGTH - 1;
    if name.len() <= limit {
        return name;
    }
    let mut end = limit;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

impl SystemMessage {
    pub fn tag(&self) -> u8 {
        match self {
            SystemMessage::Name { .. } => msg_type::NAME,
            SystemMessage::Connect { .. } => msg_type::CONNECT,
            SystemMessage::IpRequest => msg_type::IP_REQUEST,
            SystemMessage::IpResponse { .. } => msg_type::IP_RESPONSE,
        }
    }

    /// Encode the message to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![self.tag()];
        match self {
            SystemMessage::Name { name } => {
                // Fixed-size, NUL padded name field
                let name_bytes = truncate_name(name).as_bytes();
                let mut field = [0u8; MAX_NAME_LENGTH];
                field[..name_bytes.len()].copy_from_slice(name_bytes);
                buf.extend_from_slice(&field);
            }
            SystemMessage::Connect { address } | SystemMessage::IpResponse { address } => {
                address.encode_into(&mut buf);
            }
            SystemMessage::IpRequest => {}
        }
        buf
    }

    /// Decode a message from bytes. Trailing bytes are ignored.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let Some((&tag, body)) = data.split_first() else {
            return Err(DecodeError::Empty);
        };

        let need = |expected: usize| {
            if body.len() < expected {
                Err(DecodeError::Truncated {
                    tag,
                    expected,
                    actual: body.len(),
                })
            } else {
                Ok(())
            }
        };

        match tag {
            msg_type::NAME => {
                need(MAX_NAME_LENGTH)?;
                let field = &body[..MAX_NAME_LENGTH];
                let end = field.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LENGTH);
                let name = String::from_utf8_lossy(&field[..end]);
                Ok(SystemMessage::Name {
                    name: truncate_name(&name).to_string(),
                })
            }
            msg_type::CONNECT | msg_type::IP_RESPONSE => {
                need(Address::ENCODED_LEN)?;
                let address = Address::decode_from(body).ok_or(DecodeError::Truncated {
                    tag,
                    expected: Address::ENCODED_LEN,
                    actual: body.len(),
                })?;
                if tag == msg_type::CONNECT {
                    Ok(SystemMessage::Connect { address })
                } else {
                    Ok(SystemMessage::IpResponse { address })
                }
            }
            msg_type::IP_REQUEST => Ok(SystemMessage::IpRequest),
            other => Err(DecodeError::UnknownTag(other)),
        }
    }
}
