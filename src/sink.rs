//! The output surface.
//!
//! A frame leaves the process through exactly one of two variants:
//!
//! * [`DeviceSink`] — raw bytes into the framebuffer device.  This is the
//!   real deployment: the panel reads the device memory directly, there is
//!   no double-buffering and no back-pressure, so a frame is "presented"
//!   the moment the write completes.
//! * [`PreviewSink`] — the frame encoded as a PNG at a well-known path, for
//!   development machines without a framebuffer.
//!
//! Which variant runs is decided once at startup by [`Sink::probe`]; it is
//! never re-decided per frame.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use embedded_graphics::prelude::RgbColor;
use image::RgbImage;
use log::info;

use crate::error::PresentError;
use crate::frame::Frame;

/// Anything that can take a finished frame.
///
/// The render loop is generic over this so tests can substitute a scripted
/// sink.
pub trait Present {
    fn present(&mut self, frame: &Frame) -> Result<(), PresentError>;
}

// ---------------------------------------------------------------------------
// Framebuffer device
// ---------------------------------------------------------------------------

/// Writes frames into a framebuffer device at a fixed byte offset.
pub struct DeviceSink {
    device: File,
    offset: u64,
}

impl DeviceSink {
    /// Open the device for writing.  Failing here means the device is
    /// absent or inaccessible — the caller falls back to the preview.
    pub fn open(path: &Path, offset: u64) -> Result<Self, PresentError> {
        let device = OpenOptions::new().write(true).open(path)?;
        Ok(Self { device, offset })
    }
}

impl Present for DeviceSink {
    fn present(&mut self, frame: &Frame) -> Result<(), PresentError> {
        self.device.seek(SeekFrom::Start(self.offset))?;
        // write_all: a short write is a failure, not a success — a
        // half-updated panel must be retried next tick.
        self.device.write_all(frame.bytes())?;
        self.device.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PNG preview
// ---------------------------------------------------------------------------

/// Saves frames as a PNG for development without a panel.
pub struct PreviewSink {
    path: PathBuf,
    announced: bool,
}

impl PreviewSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            announced: false,
        }
    }
}

impl Present for PreviewSink {
    fn present(&mut self, frame: &Frame) -> Result<(), PresentError> {
        let image = RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
            let rgb = frame
                .pixel(x, y)
                .map(|c| [c.r(), c.g(), c.b()])
                .unwrap_or([0, 0, 0]);
            image::Rgb(rgb)
        });
        image.save(&self.path)?;

        if !self.announced {
            info!("preview frames going to {}", self.path.display());
            self.announced = true;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Startup selection
// ---------------------------------------------------------------------------

/// The output surface chosen at startup.
pub enum Sink {
    Device(DeviceSink),
    Preview(PreviewSink),
}

impl Sink {
    /// Probe the framebuffer once and pick the surface for the lifetime of
    /// the process.
    pub fn probe(framebuffer: &Path, offset: u64, preview_path: &Path) -> Sink {
        match DeviceSink::open(framebuffer, offset) {
            Ok(device) => {
                info!("framebuffer {} found, writing frames to it", framebuffer.display());
                Sink::Device(device)
            }
            Err(err) => {
                info!(
                    "no usable framebuffer at {} ({err}), falling back to PNG preview",
                    framebuffer.display()
                );
                Sink::Preview(PreviewSink::new(preview_path))
            }
        }
    }
}

impl Present for Sink {
    fn present(&mut self, frame: &Frame) -> Result<(), PresentError> {
        match self {
            Sink::Device(device) => device.present(frame),
            Sink::Preview(preview) => preview.present(frame),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
