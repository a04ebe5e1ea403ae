//! Async PDU framing for the collector side of a connection.
//!
//! Same wire layout as [`crate::pdu::codec`]; only the I/O differs.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::pdu::codec::{Encode, PduHeader, HEADER_LEN};

/// Read one complete PDU.
///
/// Returns `(header, pdu_bytes)` with the header included in the bytes, or
/// `None` on clean EOF before a header starts. `max_pdu_bytes` caps `len`.
pub async fn read_pdu<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    max_pdu_bytes: u32,
) -> std::io::Result<Option<(PduHeader, Vec<u8>)>> {
    let mut head = [0u8; HEADER_LEN];
    match reader.read_exact(&mut head).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let header = PduHeader::decode(&head, max_pdu_bytes).map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, format!("bad PDU header: {}", e))
    })?;

    let mut pdu = vec![0u8; header.len as usize];
    pdu[..HEADER_LEN].copy_from_slice(&head);
    reader.read_exact(&mut pdu[HEADER_LEN..]).await?;
    Ok(Some((header, pdu)))
}

/// Encode `body` and write it as one PDU.
pub async fn write_pdu<W: AsyncWriteExt + Unpin, T: Encode>(
    writer: &mut W,
    from: u32,
    body: &T,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    body.encode(from, &mut buf);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}
