//! Receiver acknowledgement decoding
//!
//! A receiver answers every step with one status byte. `0` means success;
//! `1` and `2` are followed by a message line terminated by `\n`. OpenSSH
//! sinks report recoverable errors with `1` and fatal ones with `2`.

use bytes::{Buf, Bytes, BytesMut};

use crate::ProtocolError;

/// Status byte for success
pub const ACK_OK: u8 = 0;
/// Status byte for a recoverable error
pub const ACK_WARNING: u8 = 1;
/// Status byte for a fatal error
pub const ACK_ERROR: u8 = 2;

/// One acknowledgement from the receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// Step accepted
    Ok,
    /// Recoverable error with message
    Warning(String),
    /// Fatal error with message
    Error(String),
}

impl Ack {
    /// Whether the receiver accepted the step
    pub fn is_ok(&self) -> bool {
        matches!(self, Ack::Ok)
    }

    /// Message text, if any
    pub fn message(&self) -> Option<&str> {
        match self {
            Ack::Ok => None,
            Ack::Warning(msg) | Ack::Error(msg) => Some(msg),
        }
    }

    /// Wire form, used by receivers
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Ack::Ok => Bytes::from_static(&[ACK_OK]),
            Ack::Warning(msg) => Self::with_message(ACK_WARNING, msg),
            Ack::Error(msg) => Self::with_message(ACK_ERROR, msg),
        }
    }

    fn with_message(code: u8, msg: &str) -> Bytes {
        let mut buf = Vec::with_capacity(msg.len() + 2);
        buf.push(code);
        buf.extend_from_slice(msg.as_bytes());
        buf.push(b'\n');
        Bytes::from(buf)
    }
}

/// Incremental decoder for receiver output
#[derive(Debug, Default)]
pub struct AckDecoder {
    buf: BytesMut,
}

impl AckDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the receiver
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes buffered but not yet decoded
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete acknowledgement.
    ///
    /// Returns `Ok(None)` when more input is needed. An unknown status byte
    /// discards everything buffered.
    pub fn next_ack(&mut self) -> Result<Option<Ack>, ProtocolError> {
        let Some(&code) = self.buf.first() else {
            return Ok(None);
        };

        match code {
            ACK_OK => {
                self.buf.advance(1);
                Ok(Some(Ack::Ok))
            }
            ACK_WARNING | ACK_ERROR => {
                let Some(end) = self.buf.iter().position(|b| *b == b'\n') else {
                    return Ok(None);
                };
                let line = self.buf.split_to(end + 1);
                let msg = String::from_utf8_lossy(&line[1..end]).trim_end_matches('\r').to_string();
                if code == ACK_WARNING {
                    Ok(Some(Ack::Warning(msg)))
                } else {
                    Ok(Some(Ack::Error(msg)))
                }
            }
            other => {
                self.buf.clear();
                Err(ProtocolError::InvalidAck(other))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_sequence() {
        let mut decoder = AckDecoder::new();
        decoder.push(b"\x00\x00\x01scp: protocol error: unexpected <newline>\n");

        assert_eq!(decoder.next_ack().unwrap(), Some(Ack::Ok));
        assert_eq!(decoder.next_ack().unwrap(), Some(Ack::Ok));
        assert_eq!(
            decoder.next_ack().unwrap(),
            Some(Ack::Warning("scp: protocol error: unexpected <newline>".to_string()))
        );
        assert_eq!(decoder.next_ack().unwrap(), None);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_message_split_across_reads() {
        let mut decoder = AckDecoder::new();
        decoder.push(b"\x02scp: /nope: No such");
        assert_eq!(decoder.next_ack().unwrap(), None);

        decoder.push(b" file or directory\n\x00");
        let ack = decoder.next_ack().unwrap().unwrap();
        assert_eq!(ack.message(), Some("scp: /nope: No such file or directory"));
        assert!(!ack.is_ok());
        assert_eq!(decoder.next_ack().unwrap(), Some(Ack::Ok));
    }

    #[test]
    fn test_unknown_status_byte() {
        let mut decoder = AckDecoder::new();
        decoder.push(b"Welcome\n\x00");
        assert!(matches!(decoder.next_ack(), Err(ProtocolError::InvalidAck(b'W'))));
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_wire_form() {
        assert_eq!(Ack::Ok.to_bytes(), Bytes::from_static(b"\x00"));
        assert_eq!(Ack::Error("boom".into()).to_bytes(), Bytes::from_static(b"\x02boom\n"));
    }
}
