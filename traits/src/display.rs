use std::path::Path;

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opens sessions against a remote display server.
#[async_trait]
pub trait Connector {
    /// The session type handed back once the connection is authenticated.
    type Session: RemoteDisplay + Send;

    /// Connect and authenticate against the target.
    async fn connect(&self, target: &Target) -> Result<Self::Session>;
}

/// An open session on a remote display.
#[async_trait]
pub trait RemoteDisplay {
    /// Capture the whole remote screen and write it as an image to `path`.
    async fn capture_screen(&mut self, path: &Path) -> Result<()>;
    /// Move the pointer to an absolute position, keeping the button state.
    async fn mouse_move(&mut self, x: u16, y: u16) -> Result<()>;
    /// Press a button at the current pointer position.
    async fn mouse_press(&mut self, button: Button) -> Result<()>;
    /// Release a button at the current pointer position.
    async fn mouse_release(&mut self, button: Button) -> Result<()>;
    /// Press and release a named key, a key combination or a run of text.
    async fn key_press(&mut self, key: &str) -> Result<()>;
    /// Close the session.
    async fn disconnect(&mut self) -> Result<()>;
}

/// Where and how to connect.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Target {
    /// host name or address of the server
    pub host: String,
    /// tcp port of the server
    pub port: u16,
    /// shared secret, used once during the handshake
    pub password: Option<String>,
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A pointer button.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Button {
    /// The primary button
    Left,
    /// The middle button (or wheel click)
    Middle,
    /// The secondary button
    Right,
}
impl Button {
    /// Bit of this button in a pointer event button mask.
    pub fn mask(self) -> u8 {
        match self {
            Button::Left => 1,
            Button::Middle => 1 << 1,
            Button::Right => 1 << 2,
        }
    }
}
