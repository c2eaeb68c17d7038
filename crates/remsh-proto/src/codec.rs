//! Streaming a file into a receiver

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{FileHeader, ProtocolError};

/// Terminator written after the payload: a zero status byte and a newline.
///
/// The receiver consumes the zero byte as the end-of-file status and reads
/// the newline as the start of a new record, which it rejects.
pub const END_OF_FILE: &[u8] = b"\x00\n";

/// Write one file record: header, exactly `header.size` bytes from `reader`,
/// then [`END_OF_FILE`], then flush.
///
/// Returns the number of payload bytes copied. A source shorter than the
/// announced size fails with [`ProtocolError::ShortSource`]; a longer one is
/// truncated to the announced size.
pub async fn send_file<W, R>(writer: &mut W, header: &FileHeader, reader: R) -> Result<u64, ProtocolError>
where
    W: AsyncWrite + Unpin + ?Sized,
    R: AsyncRead + Unpin,
{
    let encoded = header.encode()?;
    writer.write_all(&encoded).await?;

    let mut payload = reader.take(header.size);
    let copied = tokio::io::copy(&mut payload, &mut *writer).await?;
    if copied != header.size {
        return Err(ProtocolError::ShortSource {
            expected: header.size,
            actual: copied,
        });
    }

    writer.write_all(END_OF_FILE).await?;
    writer.flush().await?;
    Ok(copied)
}
