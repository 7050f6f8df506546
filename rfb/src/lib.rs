use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info};
use traits::async_trait;
use traits::display::{Button, Connector, RemoteDisplay, Target};

pub mod auth;
pub mod handshake;
pub mod keysym;
pub mod receiver;
pub mod sender;
pub mod stream_utils;

use handshake::{PixelFormat, ServerInit};
use keysym::KeyInput;
use receiver::Framebuffer;

/// How long a screen capture may wait for the server before giving up.
pub const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

/// Open a TCP connection and run the handshake against an RFB server.
pub async fn connect(addr: impl ToSocketAddrs, password: Option<&str>) -> Result<Session<TcpStream>> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Session::new(stream, password).await
}

/// Connects to RFB servers over TCP.
#[derive(Debug, Default, Clone, Copy)]
pub struct RfbConnector;

#[async_trait]
impl Connector for RfbConnector {
    type Session = Session<TcpStream>;

    async fn connect(&self, target: &Target) -> Result<Self::Session> {
        info!("Connecting to {}:{}", target.host, target.port);
        let session = connect((target.host.as_str(), target.port), target.password.as_deref())
            .await
            .with_context(|| format!("Could not connect to {}:{}", target.host, target.port))?;
        info!(
            "Connected to '{}' ({}x{})",
            session.init.name, session.init.width, session.init.height
        );
        Ok(session)
    }
}

/// One authenticated connection to a remote desktop.
pub struct Session<S> {
    stream: S,
    init: ServerInit,
    buttons: u8,
    position: (u16, u16),
    capture_timeout: Duration,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Run the handshake over an already open stream and switch the server
    /// to a pixel format we can decode.
    pub async fn new(mut stream: S, password: Option<&str>) -> Result<Self> {
        let init = handshake::handshake(&mut stream, password).await?;
        debug!("Server init: {:?}", init);

        sender::set_pixel_format(&mut stream, &PixelFormat::rgbx()).await?;
        sender::set_encodings(&mut stream, &[sender::ENCODING_RAW]).await?;

        Ok(Self {
            stream,
            init,
            buttons: 0,
            position: (0, 0),
            capture_timeout: CAPTURE_TIMEOUT,
        })
    }

    pub fn server_init(&self) -> &ServerInit {
        &self.init
    }

    async fn send_pointer(&mut self) -> Result<()> {
        let (x, y) = self.position;
        debug!("Pointer at ({x}, {y}) buttons {:#05b}", self.buttons);
        sender::pointer_event(&mut self.stream, self.buttons, x, y).await?;
        Ok(())
    }

    pub fn set_capture_timeout(&mut self, timeout: Duration) {
        self.capture_timeout = timeout;
    }

    /// Grab the whole screen.
    pub async fn capture(&mut self) -> Result<image::RgbImage> {
        let limit = self.capture_timeout;
        let mut framebuffer = Framebuffer::new(self.init.width, self.init.height);
        tokio::time::timeout(limit, self.fill(&mut framebuffer))
            .await
            .with_context(|| {
                format!(
                    "Timed out waiting for the screen after {:?}, {} pixels missing",
                    limit,
                    framebuffer.missing()
                )
            })??;
        framebuffer.into_image()
    }

    /// Keep asking for the whole screen until every pixel has arrived.
    /// Servers may answer a request with only part of the area.
    async fn fill(&mut self, framebuffer: &mut Framebuffer) -> Result<()> {
        let size = (self.init.width, self.init.height);
        while !framebuffer.is_complete() {
            sender::framebuffer_update_request(&mut self.stream, false, (0, 0), size).await?;
            receiver::receive_update(&mut self.stream, framebuffer).await?;
            if !framebuffer.is_complete() {
                debug!("Screen incomplete, {} pixels missing", framebuffer.missing());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<S> RemoteDisplay for Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn capture_screen(&mut self, path: &Path) -> Result<()> {
        let image = self.capture().await?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Creating directory {}", parent.display()))?;
        }
        image
            .save(path)
            .with_context(|| format!("Saving screenshot to {}", path.display()))?;
        debug!("Wrote {}x{} screenshot", image.width(), image.height());
        Ok(())
    }

    async fn mouse_move(&mut self, x: u16, y: u16) -> Result<()> {
        self.position = (x, y);
        self.send_pointer().await
    }

    async fn mouse_press(&mut self, button: Button) -> Result<()> {
        self.buttons |= button.mask();
        self.send_pointer().await
    }

    async fn mouse_release(&mut self, button: Button) -> Result<()> {
        self.buttons &= !button.mask();
        self.send_pointer().await
    }

    async fn key_press(&mut self, key: &str) -> Result<()> {
        match KeyInput::parse(key) {
            KeyInput::Chord(keysyms) => {
                for keysym in &keysyms {
                    sender::key_event(&mut self.stream, true, *keysym).await?;
                }
                for keysym in keysyms.iter().rev() {
                    sender::key_event(&mut self.stream, false, *keysym).await?;
                }
            }
            KeyInput::Text(keysyms) => {
                for keysym in keysyms {
                    sender::key_event(&mut self.stream, true, keysym).await?;
                    sender::key_event(&mut self.stream, false, keysym).await?;
                }
            }
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        info!("Disconnecting from '{}'", self.init.name);
        self.stream.shutdown().await?;
        Ok(())
    }
}
