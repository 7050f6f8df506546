use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use crate::sender::ENCODING_RAW;
use crate::stream_utils::{receive_length_prefix, skip};

const FRAMEBUFFER_UPDATE: u8 = 0;
const SET_COLOUR_MAP_ENTRIES: u8 = 1;
const BELL: u8 = 2;
const SERVER_CUT_TEXT: u8 = 3;

/// A copy of the remote screen, 3 bytes per pixel.
pub struct Framebuffer {
    width: u16,
    height: u16,
    pixels: Vec<u8>,
    /// one flag per pixel, set once any rectangle has written it
    covered: Vec<bool>,
    missing: usize,
}
impl Framebuffer {
    pub fn new(width: u16, height: u16) -> Self {
        let area = width as usize * height as usize;
        Self {
            width,
            height,
            pixels: vec![0; area * 3],
            covered: vec![false; area],
            missing: area,
        }
    }

    /// Whether every pixel of the screen has arrived.
    pub fn is_complete(&self) -> bool {
        self.missing == 0
    }

    /// Pixels not yet written by any rectangle.
    pub fn missing(&self) -> usize {
        self.missing
    }

    /// Copy a raw rectangle of `[r, g, b, _]` pixels in, clipping anything
    /// that falls outside the screen.
    fn apply_raw(&mut self, x: u16, y: u16, width: u16, height: u16, data: &[u8]) {
        let (x, y, width, height) = (x as usize, y as usize, width as usize, height as usize);
        let screen_width = self.width as usize;
        let visible_width = width.min(screen_width.saturating_sub(x));
        let visible_height = height.min((self.height as usize).saturating_sub(y));
        if visible_width == 0 || visible_height == 0 {
            return;
        }

        for row in 0..visible_height {
            let src = &data[row * width * 4..][..visible_width * 4];
            let dst_start = ((y + row) * screen_width + x) * 3;
            let dst = &mut self.pixels[dst_start..][..visible_width * 3];
            for (dst, src) in dst.chunks_exact_mut(3).zip(src.chunks_exact(4)) {
                dst.copy_from_slice(&src[..3]);
            }

            let covered_start = (y + row) * screen_width + x;
            for covered in &mut self.covered[covered_start..][..visible_width] {
                if !*covered {
                    *covered = true;
                    self.missing -= 1;
                }
            }
        }
    }

    pub fn into_image(self) -> Result<image::RgbImage> {
        image::RgbImage::from_vec(self.width as u32, self.height as u32, self.pixels)
            .ok_or_else(|| anyhow::anyhow!("Couldn't build image from framebuffer"))
    }
}

/// Read server messages until a framebuffer update has arrived, applying it
/// to `framebuffer`.  Other messages are read and dropped.
pub async fn receive_update(
    reader: &mut (impl AsyncRead + Unpin),
    framebuffer: &mut Framebuffer,
) -> Result<()> {
    loop {
        let message = reader.read_u8().await.context("Reading server message")?;
        match message {
            FRAMEBUFFER_UPDATE => {
                skip(reader, 1).await?;
                let rects = reader.read_u16().await?;
                trace!("Framebuffer update with {rects} rectangles");
                for _ in 0..rects {
                    receive_rect(reader, framebuffer).await?;
                }
                return Ok(());
            }
            SET_COLOUR_MAP_ENTRIES => {
                skip(reader, 3).await?;
                let colours = reader.read_u16().await?;
                skip(reader, colours as usize * 6).await?;
                debug!("Ignoring {colours} colour map entries");
            }
            BELL => {
                debug!("Received bell");
            }
            SERVER_CUT_TEXT => {
                skip(reader, 3).await?;
                let text = receive_length_prefix(reader, Vec::new()).await?;
                debug!("Ignoring {} bytes of cut text", text.len());
            }
            _ => bail!("Unknown server message type {message}"),
        }
    }
}

async fn receive_rect(
    reader: &mut (impl AsyncRead + Unpin),
    framebuffer: &mut Framebuffer,
) -> Result<()> {
    let x = reader.read_u16().await?;
    let y = reader.read_u16().await?;
    let width = reader.read_u16().await?;
    let height = reader.read_u16().await?;
    let encoding = reader.read_i32().await?;
    trace!("Rectangle {width}x{height} at ({x}, {y}) encoding {encoding}");

    if encoding != ENCODING_RAW {
        bail!("Server sent unsupported encoding {encoding}");
    }

    let mut data = vec![0u8; width as usize * height as usize * 4];
    reader
        .read_exact(&mut data)
        .await
        .context("Reading raw rectangle")?;
    framebuffer.apply_raw(x, y, width, height, &data);
    Ok(())
}
