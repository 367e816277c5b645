//! Netstring framing.
//!
//! A netstring is a self-delimiting encoding of a byte payload:
//!
//! ```text
//! <decimal length>:<payload>,
//!
//! Example:
//! Payload: hello world!
//! Frame:   12:hello world!,
//! ```
//!
//! The length prefix is plain ASCII digits without leading zeros (`0:,` is
//! the empty payload). Decoding never returns a partial payload: it either
//! yields exactly the framed bytes or a [`FramingError`].

use bytes::{BufMut, BytesMut};
use thiserror::Error;

/// Longest accepted length prefix, in digits.
const MAX_LENGTH_DIGITS: usize = 20;

/// Errors produced while decoding a netstring.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    #[error("netstring has no length prefix")]
    MissingLength,
    #[error("netstring length has a leading zero")]
    LeadingZero,
    #[error("invalid byte 0x{byte:02x} in netstring length at offset {offset}")]
    InvalidLengthByte { byte: u8, offset: usize },
    #[error("netstring length does not fit in memory")]
    LengthOverflow,
    #[error("netstring is missing the ':' separator")]
    MissingSeparator,
    #[error("netstring payload truncated: expected {expected} bytes, got {available}")]
    Truncated { expected: usize, available: usize },
    #[error("netstring terminator is missing (found {found:?})")]
    MissingTerminator { found: Option<u8> },
    #[error("{extra} unexpected bytes after netstring terminator")]
    TrailingBytes { extra: usize },
}

/// Result of decoding the leading frame of a byte stream.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded<'a> {
    /// A complete frame: its payload and the number of bytes it occupied.
    Complete { payload: &'a [u8], consumed: usize },
    /// More bytes are needed to finish the frame.
    Incomplete,
}

/// Encode `payload` as a netstring.
pub fn encode(payload: &[u8]) -> BytesMut {
    let len = payload.len().to_string();
    let mut frame = BytesMut::with_capacity(len.len() + payload.len() + 2);
    frame.put_slice(len.as_bytes());
    frame.put_u8(b':');
    frame.put_slice(payload);
    frame.put_u8(b',');
    frame
}

/// Decode a buffer holding exactly one netstring.
pub fn decode(frame: &[u8]) -> Result<&[u8], FramingError> {
    let (length, header_len) = match parse_header(frame)? {
        Some(header) => header,
        None => {
            if frame.is_empty() {
                return Err(FramingError::MissingLength);
            }
            return Err(FramingError::MissingSeparator);
        }
    };

    let body = &frame[header_len..];
    if body.len() < length {
        return Err(FramingError::Truncated {
            expected: length,
            available: body.len(),
        });
    }

    match body.get(length) {
        Some(b',') => {}
        found => {
            return Err(FramingError::MissingTerminator {
                found: found.copied(),
            })
        }
    }

    let extra = body.len() - length - 1;
    if extra > 0 {
        return Err(FramingError::TrailingBytes { extra });
    }

    Ok(&body[..length])
}

/// Decode the leading netstring of `input`, which may hold a partial frame
/// or several frames back to back.
pub fn decode_prefix(input: &[u8]) -> Result<Decoded<'_>, FramingError> {
    let (length, header_len) = match parse_header(input)? {
        Some(header) => header,
        None => return Ok(Decoded::Incomplete),
    };

    let end = header_len
        .checked_add(length)
        .ok_or(FramingError::LengthOverflow)?;

    match input.get(end) {
        None => Ok(Decoded::Incomplete),
        Some(b',') => Ok(Decoded::Complete {
            payload: &input[header_len..end],
            consumed: end + 1,
        }),
        Some(&other) => Err(FramingError::MissingTerminator { found: Some(other) }),
    }
}

/// Parse `<digits>:`, returning the declared length and the header size.
///
/// `Ok(None)` means the input ended inside the length prefix.
fn parse_header(input: &[u8]) -> Result<Option<(usize, usize)>, FramingError> {
    let mut length: usize = 0;

    for (offset, &byte) in input.iter().enumerate() {
        match byte {
            b'0'..=b'9' => {
                if offset == MAX_LENGTH_DIGITS {
                    return Err(FramingError::LengthOverflow);
                }
                if offset == 1 && input[0] == b'0' {
                    return Err(FramingError::LeadingZero);
                }
                length = length
                    .checked_mul(10)
                    .and_then(|l| l.checked_add(usize::from(byte - b'0')))
                    .ok_or(FramingError::LengthOverflow)?;
            }
            b':' if offset == 0 => return Err(FramingError::MissingLength),
            b':' => return Ok(Some((length, offset + 1))),
            _ if offset == 0 => return Err(FramingError::MissingLength),
            _ => return Err(FramingError::InvalidLengthByte { byte, offset }),
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!(&encode(b"hello world!")[..], b"12:hello world!,");
        assert_eq!(&encode(b"")[..], b"0:,");
    }

    #[test]
    fn test_decode_roundtrip() {
        let payload = br#"{"jsonrpc":"2.0","id":1,"method":"print"}"#;
        let frame = encode(payload);
        assert_eq!(decode(&frame).unwrap(), &payload[..]);

        // Payload may contain the delimiter characters themselves
        let frame = encode(b"3:a,b,");
        assert_eq!(decode(&frame).unwrap(), b"3:a,b,");
    }

    #[test]
    fn test_decode_empty_payload() {
        assert_eq!(decode(b"0:,").unwrap(), b"");
    }

    #[test]
    fn test_decode_missing_length() {
        assert_eq!(decode(b""), Err(FramingError::MissingLength));
        assert_eq!(decode(b":abc,"), Err(FramingError::MissingLength));
        assert_eq!(decode(b"abc"), Err(FramingError::MissingLength));
    }

    #[test]
    fn test_decode_missing_separator() {
        assert_eq!(decode(b"5"), Err(FramingError::MissingSeparator));
        assert_eq!(
            decode(b"5hello,"),
            Err(FramingError::InvalidLengthByte {
                byte: b'h',
                offset: 1
            })
        );
    }

    #[test]
    fn test_decode_leading_zero() {
        assert_eq!(decode(b"05:hello,"), Err(FramingError::LeadingZero));
    }

    #[test]
    fn test_decode_truncated() {
        assert_eq!(
            decode(b"10:hello,"),
            Err(FramingError::Truncated {
                expected: 10,
                available: 6
            })
        );
    }

    #[test]
    fn test_decode_wrong_length() {
        // Declared length shorter than the payload: the byte after the
        // declared payload is not the terminator.
        assert_eq!(
            decode(b"3:hello,"),
            Err(FramingError::MissingTerminator { found: Some(b'l') })
        );
        assert_eq!(
            decode(b"5:hello"),
            Err(FramingError::MissingTerminator { found: None })
        );
    }

    #[test]
    fn test_decode_trailing_bytes() {
        assert_eq!(
            decode(b"5:hello,5:world,"),
            Err(FramingError::TrailingBytes { extra: 8 })
        );
    }

    #[test]
    fn test_decode_overflow() {
        assert_eq!(
            decode(b"99999999999999999999999:x,"),
            Err(FramingError::LengthOverflow)
        );
    }

    #[test]
    fn test_decode_prefix_incomplete() {
        assert_eq!(decode_prefix(b""), Ok(Decoded::Incomplete));
        assert_eq!(decode_prefix(b"12"), Ok(Decoded::Incomplete));
        assert_eq!(decode_prefix(b"12:hello"), Ok(Decoded::Incomplete));
        assert_eq!(decode_prefix(b"5:hello"), Ok(Decoded::Incomplete));
    }

    #[test]
    fn test_decode_prefix_multiple_frames() {
        let input = b"5:hello,5:world,2:";
        match decode_prefix(input) {
            Ok(Decoded::Complete { payload, consumed }) => {
                assert_eq!(payload, b"hello");
                assert_eq!(consumed, 8);
                match decode_prefix(&input[consumed..]) {
                    Ok(Decoded::Complete { payload, consumed }) => {
                        assert_eq!(payload, b"world");
                        assert_eq!(consumed, 8);
                    }
                    other => panic!("unexpected: {:?}", other),
                }
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(decode_prefix(&input[16..]), Ok(Decoded::Incomplete));
    }

    #[test]
    fn test_decode_prefix_errors() {
        assert_eq!(
            decode_prefix(b"5:hello!"),
            Err(FramingError::MissingTerminator { found: Some(b'!') })
        );
        assert_eq!(decode_prefix(b"{\"a\":1}"), Err(FramingError::MissingLength));
    }
}
