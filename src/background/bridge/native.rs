//! Native messaging framing: every message is a 32-bit length in native byte order followed by
//! that many bytes of UTF-8 JSON.

use std::io::ErrorKind;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame accepted in either direction. Browsers refuse anything above this from a host.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Reads the next frame. `None` means the browser closed the pipe.
pub async fn read_frame(reader: &mut (impl AsyncRead + Unpin)) -> Result<Option<Vec<u8>>> {
    let mut length = [0u8; 4];
    let mut filled = 0;
    while filled < length.len() {
        match reader.read(&mut length[filled..]).await {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => bail!("Input ended inside a frame header after {filled} bytes"),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    let length = u32::from_ne_bytes(length) as usize;
    if length > MAX_FRAME_SIZE {
        bail!("Incoming frame of {length} bytes exceeds {MAX_FRAME_SIZE}");
    }

    let mut payload = vec![0; length];
    reader
        .read_exact(&mut payload)
        .await
        .with_context(|| format!("Frame ended before its {length} bytes"))?;
    Ok(Some(payload))
}

pub async fn write_frame(writer: &mut (impl AsyncWrite + Unpin), payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_SIZE {
        bail!("Outgoing frame of {} bytes exceeds {MAX_FRAME_SIZE}", payload.len());
    }
    writer.write_all(&(payload.len() as u32).to_ne_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::{read_frame, write_frame, MAX_FRAME_SIZE};

    #[tokio::test]
    async fn test_frames_are_read_in_order() -> Result<()> {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, br#"{"type":"registerPopup"}"#).await?;
        write_frame(&mut buffer, b"{}").await?;

        let mut reader = buffer.as_slice();
        assert_eq!(
            read_frame(&mut reader).await?.as_deref(),
            Some(br#"{"type":"registerPopup"}"#.as_slice())
        );
        assert_eq!(read_frame(&mut reader).await?.as_deref(), Some(b"{}".as_slice()));
        assert_eq!(read_frame(&mut reader).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_length_prefix_uses_native_byte_order() -> Result<()> {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, b"abc").await?;
        assert_eq!(&buffer[..4], &3u32.to_ne_bytes());
        Ok(())
    }

    #[tokio::test]
    async fn test_truncated_frame_is_an_error() {
        let mut buffer = 10u32.to_ne_bytes().to_vec();
        buffer.extend_from_slice(b"abc");
        assert!(read_frame(&mut buffer.as_slice()).await.is_err());
    }

    #[tokio::test]
    async fn test_partial_header_is_an_error() {
        let buffer = 3u32.to_ne_bytes();
        assert!(read_frame(&mut &buffer[..2]).await.is_err());
        assert!(read_frame(&mut &buffer[..1]).await.is_err());
        assert_eq!(read_frame(&mut &buffer[..0]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_frames_are_rejected() {
        let buffer = ((MAX_FRAME_SIZE + 1) as u32).to_ne_bytes();
        assert!(read_frame(&mut buffer.as_slice()).await.is_err());

        let payload = vec![b' '; MAX_FRAME_SIZE + 1];
        assert!(write_frame(&mut Vec::new(), &payload).await.is_err());
    }
}
