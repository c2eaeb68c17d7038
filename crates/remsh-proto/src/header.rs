//! File header framing

use std::fmt;

use bytes::Bytes;

use crate::ProtocolError;

/// Permission bits announced for pushed files
pub const DEFAULT_MODE: u32 = 0o755;

/// Largest permission value the header can carry
const MAX_MODE: u32 = 0o7777;

/// Header line announcing a single regular file to the receiver.
///
/// Encodes as `C<mode> <size> <name>\n` with the mode in four octal digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Permission bits
    pub mode: u32,
    /// Exact payload length in bytes
    pub size: u64,
    /// Target file name inside the receiver's directory
    pub name: String,
}

impl FileHeader {
    /// Create a header with the default mode
    pub fn new(size: u64, name: impl Into<String>) -> Self {
        Self {
            mode: DEFAULT_MODE,
            size,
            name: name.into(),
        }
    }

    /// Override the permission bits
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Reject headers a receiver could not accept or that would break framing
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.mode > MAX_MODE {
            return Err(ProtocolError::InvalidMode(self.mode));
        }
        let name = self.name.as_str();
        if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\n') {
            return Err(ProtocolError::InvalidName(self.name.clone()));
        }
        Ok(())
    }

    /// Encode the header line, trailing newline included
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        self.validate()?;
        Ok(Bytes::from(format!("{}\n", self)))
    }

    /// Parse a header line, with or without its trailing newline
    pub fn parse(line: &[u8]) -> Result<Self, ProtocolError> {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let line = std::str::from_utf8(line)
            .map_err(|_| ProtocolError::InvalidHeader("not valid UTF-8".to_string()))?;

        let rest = line
            .strip_prefix('C')
            .ok_or_else(|| ProtocolError::InvalidHeader(format!("expected 'C' record, got {:?}", line)))?;

        let mut fields = rest.splitn(3, ' ');
        let (mode, size, name) = match (fields.next(), fields.next(), fields.next()) {
            (Some(mode), Some(size), Some(name)) => (mode, size, name),
            _ => return Err(ProtocolError::InvalidHeader(format!("truncated record {:?}", line))),
        };

        if mode.len() != 4 {
            return Err(ProtocolError::InvalidHeader(format!("bad mode {:?}", mode)));
        }
        let mode = u32::from_str_radix(mode, 8)
            .map_err(|_| ProtocolError::InvalidHeader(format!("bad mode {:?}", mode)))?;
        let size = size
            .parse::<u64>()
            .map_err(|_| ProtocolError::InvalidHeader(format!("bad size {:?}", size)))?;

        let header = Self {
            mode,
            size,
            name: name.to_string(),
        };
        header.validate()?;
        Ok(header)
    }
}

impl fmt::Display for FileHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{:04o} {} {}", self.mode, self.size, self.name)
    }
}
