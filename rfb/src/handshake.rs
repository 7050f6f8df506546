use anyhow::{bail, Context, Result};
use nom::{
    bytes::complete::{tag, take_while_m_n},
    combinator::map_res,
    sequence::{delimited, separated_pair},
    Finish, IResult,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::auth;
use crate::stream_utils::read_string;

const SECURITY_INVALID: u8 = 0;
const SECURITY_NONE: u8 = 1;
const SECURITY_VNC_AUTH: u8 = 2;

/// Protocol versions this client can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Version {
    V3_3,
    V3_7,
    V3_8,
}
impl Version {
    /// Pick the version to answer a server with.  Unknown minor versions
    /// between the published ones fall back to 3.3.
    pub fn negotiate(major: u16, minor: u16) -> Result<Version> {
        match (major, minor) {
            (0..=2, _) | (3, 0..=2) => bail!("Unsupported server protocol version {major}.{minor}"),
            (3, 7) => Ok(Version::V3_7),
            (3, 8..) | (4.., _) => Ok(Version::V3_8),
            (3, _) => Ok(Version::V3_3),
        }
    }

    fn banner(self) -> &'static [u8; 12] {
        match self {
            Version::V3_3 => b"RFB 003.003\n",
            Version::V3_7 => b"RFB 003.007\n",
            Version::V3_8 => b"RFB 003.008\n",
        }
    }
}

/// Parses the 12 byte `RFB xxx.yyy\n` greeting.
fn protocol_version(data: &str) -> IResult<&str, (u16, u16)> {
    let number = || map_res(take_while_m_n(3, 3, |c: char| c.is_ascii_digit()), str::parse::<u16>);
    delimited(tag("RFB "), separated_pair(number(), tag("."), number()), tag("\n"))(data)
}

/// The pixel layout used by a server or requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub bits_per_pixel: u8,
    pub depth: u8,
    pub big_endian: bool,
    pub true_colour: bool,
    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}
impl PixelFormat {
    /// 32 bits per pixel little-endian with red in the low byte, so a raw
    /// pixel is laid out as `[r, g, b, _]`.
    pub fn rgbx() -> Self {
        Self {
            bits_per_pixel: 32,
            depth: 24,
            big_endian: false,
            true_colour: true,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 0,
            green_shift: 8,
            blue_shift: 16,
        }
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        let mut buf = [0u8; 16];
        buf[0] = self.bits_per_pixel;
        buf[1] = self.depth;
        buf[2] = self.big_endian as u8;
        buf[3] = self.true_colour as u8;
        buf[4..6].copy_from_slice(&self.red_max.to_be_bytes());
        buf[6..8].copy_from_slice(&self.green_max.to_be_bytes());
        buf[8..10].copy_from_slice(&self.blue_max.to_be_bytes());
        buf[10] = self.red_shift;
        buf[11] = self.green_shift;
        buf[12] = self.blue_shift;
        buf
    }

    pub fn from_bytes(buf: &[u8; 16]) -> Self {
        Self {
            bits_per_pixel: buf[0],
            depth: buf[1],
            big_endian: buf[2] != 0,
            true_colour: buf[3] != 0,
            red_max: u16::from_be_bytes([buf[4], buf[5]]),
            green_max: u16::from_be_bytes([buf[6], buf[7]]),
            blue_max: u16::from_be_bytes([buf[8], buf[9]]),
            red_shift: buf[10],
            green_shift: buf[11],
            blue_shift: buf[12],
        }
    }
}

/// What the server tells us about its desktop once the handshake is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInit {
    pub width: u16,
    pub height: u16,
    pub pixel_format: PixelFormat,
    pub name: String,
}

/// Run the version, security and initialisation phases of the protocol.
pub async fn handshake<S>(stream: &mut S, password: Option<&str>) -> Result<ServerInit>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut greeting = [0u8; 12];
    stream
        .read_exact(&mut greeting)
        .await
        .context("Reading server protocol version")?;
    let greeting = String::from_utf8_lossy(&greeting);
    let (_, (major, minor)) = protocol_version(&greeting)
        .finish()
        .map_err(|_| anyhow::anyhow!("Not an RFB server, greeting was {:?}", greeting))?;
    let version = Version::negotiate(major, minor)?;
    debug!("Server speaks {major}.{minor}, answering with {:?}", version);

    stream.write_all(version.banner()).await?;
    stream.flush().await?;

    let security = choose_security(stream, version, password.is_some()).await?;
    debug!("Using security type {security}");

    if security == SECURITY_VNC_AUTH {
        let challenge = {
            let mut challenge = [0u8; 16];
            stream.read_exact(&mut challenge).await?;
            challenge
        };
        let password = password.unwrap_or_default();
        let response = auth::vnc_response(password.as_bytes(), &challenge)?;
        stream.write_all(&response).await?;
        stream.flush().await?;
    }

    // 3.3 and 3.7 skip the result when no authentication took place
    if version == Version::V3_8 || security == SECURITY_VNC_AUTH {
        let result = stream.read_u32().await.context("Reading security result")?;
        if result != 0 {
            let reason = if version == Version::V3_8 {
                read_string(stream).await.unwrap_or_default()
            } else {
                String::new()
            };
            bail!("Authentication failed: {}", reason_or(reason, "password rejected"));
        }
    }

    // ClientInit, ask to share the desktop with other clients
    stream.write_all(&[1]).await?;
    stream.flush().await?;

    let width = stream.read_u16().await?;
    let height = stream.read_u16().await?;
    let mut pixel_format = [0u8; 16];
    stream.read_exact(&mut pixel_format).await?;
    let name = read_string(stream).await?;

    Ok(ServerInit {
        width,
        height,
        pixel_format: PixelFormat::from_bytes(&pixel_format),
        name,
    })
}

async fn choose_security<S>(stream: &mut S, version: Version, has_password: bool) -> Result<u8>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if version == Version::V3_3 {
        // the server decides on its own
        let security = stream.read_u32().await?;
        return match u8::try_from(security) {
            Ok(SECURITY_INVALID) => {
                let reason = read_string(stream).await.unwrap_or_default();
                bail!("Server refused connection: {}", reason_or(reason, "no reason given"))
            }
            Ok(SECURITY_NONE) => Ok(SECURITY_NONE),
            Ok(SECURITY_VNC_AUTH) => Ok(SECURITY_VNC_AUTH),
            _ => bail!("Unsupported security type {security}"),
        };
    }

    let count = stream.read_u8().await?;
    if count == 0 {
        let reason = read_string(stream).await.unwrap_or_default();
        bail!("Server refused connection: {}", reason_or(reason, "no reason given"));
    }
    let mut offered = vec![0u8; count as usize];
    stream.read_exact(&mut offered).await?;
    debug!("Server offers security types {:?}", offered);

    let chosen = if has_password && offered.contains(&SECURITY_VNC_AUTH) {
        SECURITY_VNC_AUTH
    } else if offered.contains(&SECURITY_NONE) {
        SECURITY_NONE
    } else if offered.contains(&SECURITY_VNC_AUTH) {
        bail!("Server requires a password but none is configured")
    } else {
        bail!("No supported security type among {:?}", offered)
    };

    stream.write_all(&[chosen]).await?;
    stream.flush().await?;
    Ok(chosen)
}

fn reason_or(reason: String, fallback: &str) -> String {
    if reason.is_empty() {
        fallback.to_string()
    } else {
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_version() {
        let (rest, version) = protocol_version("RFB 003.008\n").unwrap();
        assert_eq!(version, (3, 8));
        assert!(rest.is_empty());
        assert!(protocol_version("SSH-2.0-Open").is_err());
        assert!(protocol_version("RFB 3.8\n").is_err());
    }

    #[test]
    fn test_negotiate() {
        assert_eq!(Version::negotiate(3, 3).unwrap(), Version::V3_3);
        assert_eq!(Version::negotiate(3, 5).unwrap(), Version::V3_3);
        assert_eq!(Version::negotiate(3, 7).unwrap(), Version::V3_7);
        assert_eq!(Version::negotiate(3, 8).unwrap(), Version::V3_8);
        // apple remote desktop
        assert_eq!(Version::negotiate(3, 889).unwrap(), Version::V3_8);
        assert!(Version::negotiate(3, 2).is_err());
    }

    #[test]
    fn test_pixel_format_bytes() {
        let format = PixelFormat::rgbx();
        let bytes = format.to_bytes();
        assert_eq!(
            bytes,
            [32, 24, 0, 1, 0, 255, 0, 255, 0, 255, 0, 8, 16, 0, 0, 0]
        );
        assert_eq!(PixelFormat::from_bytes(&bytes), format);
    }

    fn server_init_bytes() -> Vec<u8> {
        let mut data = vec![0x04, 0x00, 0x03, 0x00];
        data.extend_from_slice(&PixelFormat::rgbx().to_bytes());
        data.extend_from_slice(&[0, 0, 0, 4]);
        data.extend_from_slice(b"desk");
        data
    }

    #[tokio::test]
    async fn test_handshake_no_auth_3_8() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let server = tokio::spawn(async move {
            server.write_all(b"RFB 003.008\n").await.unwrap();
            let mut version = [0u8; 12];
            server.read_exact(&mut version).await.unwrap();
            assert_eq!(&version, b"RFB 003.008\n");

            server.write_all(&[1, SECURITY_NONE]).await.unwrap();
            assert_eq!(server.read_u8().await.unwrap(), SECURITY_NONE);
            server.write_u32(0).await.unwrap();

            // shared flag
            assert_eq!(server.read_u8().await.unwrap(), 1);
            server.write_all(&server_init_bytes()).await.unwrap();
        });

        let init = handshake(&mut client, None).await.unwrap();
        server.await.unwrap();
        assert_eq!(init.width, 1024);
        assert_eq!(init.height, 768);
        assert_eq!(init.name, "desk");
    }

    #[tokio::test]
    async fn test_handshake_vnc_auth_3_3() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let server = tokio::spawn(async move {
            server.write_all(b"RFB 003.003\n").await.unwrap();
            let mut version = [0u8; 12];
            server.read_exact(&mut version).await.unwrap();
            assert_eq!(&version, b"RFB 003.003\n");

            server.write_u32(SECURITY_VNC_AUTH as u32).await.unwrap();
            let challenge = [7u8; 16];
            server.write_all(&challenge).await.unwrap();
            let mut response = [0u8; 16];
            server.read_exact(&mut response).await.unwrap();
            assert_eq!(response, auth::vnc_response(b"winmage", &challenge).unwrap());
            server.write_u32(0).await.unwrap();

            assert_eq!(server.read_u8().await.unwrap(), 1);
            server.write_all(&server_init_bytes()).await.unwrap();
        });

        let init = handshake(&mut client, Some("winmage")).await.unwrap();
        server.await.unwrap();
        assert_eq!(init.pixel_format, PixelFormat::rgbx());
    }

    #[tokio::test]
    async fn test_handshake_rejected_password() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            server.write_all(b"RFB 003.008\n").await.unwrap();
            let mut version = [0u8; 12];
            server.read_exact(&mut version).await.unwrap();
            server.write_all(&[2, SECURITY_NONE, SECURITY_VNC_AUTH]).await.unwrap();
            assert_eq!(server.read_u8().await.unwrap(), SECURITY_VNC_AUTH);
            server.write_all(&[0u8; 16]).await.unwrap();
            let mut response = [0u8; 16];
            server.read_exact(&mut response).await.unwrap();
            server.write_u32(1).await.unwrap();
            server.write_u32(13).await.unwrap();
            server.write_all(b"bad password!").await.unwrap();
        });

        let err = handshake(&mut client, Some("wrong")).await.unwrap_err();
        assert!(err.to_string().contains("bad password!"), "{err}");
    }

    #[tokio::test]
    async fn test_handshake_refused() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            server.write_all(b"RFB 003.007\n").await.unwrap();
            let mut version = [0u8; 12];
            server.read_exact(&mut version).await.unwrap();
            server.write_u8(0).await.unwrap();
            server.write_u32(8).await.unwrap();
            server.write_all(b"too many").await.unwrap();
        });

        let err = handshake(&mut client, None).await.unwrap_err();
        assert!(err.to_string().contains("too many"), "{err}");
    }

    #[tokio::test]
    async fn test_handshake_needs_password() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            server.write_all(b"RFB 003.008\n").await.unwrap();
            let mut version = [0u8; 12];
            server.read_exact(&mut version).await.unwrap();
            server.write_all(&[1, SECURITY_VNC_AUTH]).await.unwrap();
        });

        let err = handshake(&mut client, None).await.unwrap_err();
        assert!(err.to_string().contains("password"), "{err}");
    }
}
