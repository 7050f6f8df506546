use tokio::io::{AsyncRead, AsyncReadExt};

/// Read a message from the stream, prefixed with a u32 length.
pub async fn receive_length_prefix(
    stream: &mut (impl AsyncRead + Unpin),
    mut buf: Vec<u8>,
) -> std::io::Result<Vec<u8>> {
    let length = stream.read_u32().await?;

    buf.resize(length as usize, Default::default());
    stream.read_exact(&mut buf).await?;

    Ok(buf)
}

/// Read a u32 length prefixed string.  Servers use this for failure
/// reasons and the desktop name, neither of which is guaranteed to be utf8.
pub async fn read_string(stream: &mut (impl AsyncRead + Unpin)) -> std::io::Result<String> {
    let buf = receive_length_prefix(stream, Vec::new()).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Read and throw away `count` bytes.
pub async fn skip(stream: &mut (impl AsyncRead + Unpin), count: usize) -> std::io::Result<()> {
    let copied = tokio::io::copy(&mut stream.take(count as u64), &mut tokio::io::sink()).await?;
    if copied < count as u64 {
        return Err(std::io::ErrorKind::UnexpectedEof.into());
    }
    Ok(())
}
