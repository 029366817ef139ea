//! Length-prefixed message framing: 4-byte big-endian length + JSON body.

use anyhow::Context;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Inbound bodies larger than this are treated as a link fault.
pub const MAX_FRAME_BYTES: usize = 1_048_576;

/// Write one framed message body.
pub async fn write_frame(
    stream: &mut (impl AsyncWriteExt + Unpin),
    body: &[u8],
) -> anyhow::Result<()> {
    let len = body.len() as u32;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one framed message body.
pub async fn read_frame(stream: &mut (impl AsyncReadExt + Unpin)) -> anyhow::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.context("reading message length")?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        anyhow::bail!("Message too large: {} bytes", len);
    }
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await.context("reading message body")?;
    Ok(body)
}
