use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::handshake::PixelFormat;

pub const ENCODING_RAW: i32 = 0;

const SET_PIXEL_FORMAT: u8 = 0;
const SET_ENCODINGS: u8 = 2;
const FRAMEBUFFER_UPDATE_REQUEST: u8 = 3;
const KEY_EVENT: u8 = 4;
const POINTER_EVENT: u8 = 5;

async fn send(writer: &mut (impl AsyncWrite + Unpin), msg: &[u8]) -> std::io::Result<()> {
    trace!("Sending: {:?}", msg);
    writer.write_all(msg).await?;
    writer.flush().await
}

pub async fn set_pixel_format(
    writer: &mut (impl AsyncWrite + Unpin),
    format: &PixelFormat,
) -> std::io::Result<()> {
    let mut msg = vec![SET_PIXEL_FORMAT, 0, 0, 0];
    msg.extend_from_slice(&format.to_bytes());
    send(writer, &msg).await
}

pub async fn set_encodings(
    writer: &mut (impl AsyncWrite + Unpin),
    encodings: &[i32],
) -> std::io::Result<()> {
    let mut msg = vec![SET_ENCODINGS, 0];
    msg.extend_from_slice(&(encodings.len() as u16).to_be_bytes());
    for encoding in encodings {
        msg.extend_from_slice(&encoding.to_be_bytes());
    }
    send(writer, &msg).await
}

pub async fn framebuffer_update_request(
    writer: &mut (impl AsyncWrite + Unpin),
    incremental: bool,
    (x, y): (u16, u16),
    (width, height): (u16, u16),
) -> std::io::Result<()> {
    let mut msg = vec![FRAMEBUFFER_UPDATE_REQUEST, incremental as u8];
    for value in [x, y, width, height] {
        msg.extend_from_slice(&value.to_be_bytes());
    }
    send(writer, &msg).await
}

pub async fn key_event(
    writer: &mut (impl AsyncWrite + Unpin),
    down: bool,
    keysym: u32,
) -> std::io::Result<()> {
    let mut msg = vec![KEY_EVENT, down as u8, 0, 0];
    msg.extend_from_slice(&keysym.to_be_bytes());
    send(writer, &msg).await
}

pub async fn pointer_event(
    writer: &mut (impl AsyncWrite + Unpin),
    buttons: u8,
    x: u16,
    y: u16,
) -> std::io::Result<()> {
    let mut msg = vec![POINTER_EVENT, buttons];
    msg.extend_from_slice(&x.to_be_bytes());
    msg.extend_from_slice(&y.to_be_bytes());
    send(writer, &msg).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pointer_event() {
        let mut buf = Vec::new();
        pointer_event(&mut buf, 1, 352, 50).await.unwrap();
        assert_eq!(buf, [5, 1, 0x01, 0x60, 0x00, 0x32]);
    }

    #[tokio::test]
    async fn test_key_event() {
        let mut buf = Vec::new();
        key_event(&mut buf, true, 0xff0d).await.unwrap();
        key_event(&mut buf, false, 0xff0d).await.unwrap();
        assert_eq!(
            buf,
            [4, 1, 0, 0, 0, 0, 0xff, 0x0d, 4, 0, 0, 0, 0, 0, 0xff, 0x0d]
        );
    }

    #[tokio::test]
    async fn test_set_encodings() {
        let mut buf = Vec::new();
        set_encodings(&mut buf, &[ENCODING_RAW, -223]).await.unwrap();
        assert_eq!(buf, [2, 0, 0, 2, 0, 0, 0, 0, 0xff, 0xff, 0xff, 0x21]);
    }

    #[tokio::test]
    async fn test_framebuffer_update_request() {
        let mut buf = Vec::new();
        framebuffer_update_request(&mut buf, false, (0, 0), (1920, 1080))
            .await
            .unwrap();
        assert_eq!(buf, [3, 0, 0, 0, 0, 0, 0x07, 0x80, 0x04, 0x38]);
    }
}
