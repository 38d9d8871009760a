//! The owned pixel buffer handed from the compositor to the sink.
//!
//! A [`Frame`] is `width × height` pixels, row-major, no padding, in one of
//! the fixed [`PixelFormat`] channel orders.  It implements
//! [`DrawTarget`] so the compositor can use ordinary `embedded-graphics`
//! primitives and fonts; the byte layout underneath is exactly what the
//! panel reads, so [`Frame::bytes`] can go to the device verbatim.

use std::convert::Infallible;

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use serde::Deserialize;

/// Channel order of the output surface.  Fixed configuration — there is no
/// runtime format negotiation with the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 4 bytes per pixel, blue first.  The target panel wants this, with
    /// the alpha byte left at zero.
    Bgra,
    /// 4 bytes per pixel, red first, alpha zero.
    Rgba,
    /// 3 bytes per pixel, blue first.
    Bgr,
    /// 3 bytes per pixel, red first.
    Rgb,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra | PixelFormat::Rgba => 4,
            PixelFormat::Bgr | PixelFormat::Rgb => 3,
        }
    }
}

/// One full output image, produced fresh by the compositor every tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    bytes: Vec<u8>,
}

impl Frame {
    /// A black frame of the given geometry.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            bytes: vec![0; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// The raw bytes, in device order.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.format.bytes_per_pixel()
    }

    /// Write one pixel.  Out-of-bounds coordinates are ignored, so drawing
    /// code may clip naturally at the frame edges.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgb888) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = self.offset(x, y);
        let (r, g, b) = (color.r(), color.g(), color.b());
        match self.format {
            PixelFormat::Bgra => {
                // Alpha stays zero; the panel ignores it but wants the byte.
                self.bytes[i..i + 4].copy_from_slice(&[b, g, r, 0]);
            }
            PixelFormat::Rgba => {
                self.bytes[i..i + 4].copy_from_slice(&[r, g, b, 0]);
            }
            PixelFormat::Bgr => {
                self.bytes[i..i + 3].copy_from_slice(&[b, g, r]);
            }
            PixelFormat::Rgb => {
                self.bytes[i..i + 3].copy_from_slice(&[r, g, b]);
            }
        }
    }

    /// Read one pixel back, or `None` out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb888> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.offset(x, y);
        let color = match self.format {
            PixelFormat::Bgra => Rgb888::new(self.bytes[i + 2], self.bytes[i + 1], self.bytes[i]),
            PixelFormat::Rgba => Rgb888::new(self.bytes[i], self.bytes[i + 1], self.bytes[i + 2]),
            PixelFormat::Bgr => Rgb888::new(self.bytes[i + 2], self.bytes[i + 1], self.bytes[i]),
            PixelFormat::Rgb => Rgb888::new(self.bytes[i], self.bytes[i + 1], self.bytes[i + 2]),
        };
        Some(color)
    }
}

impl OriginDimensions for Frame {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for Frame {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x >= 0 && point.y >= 0 {
                self.set_pixel(point.x as u32, point.y as u32, color);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};

    #[test]
    fn new_frame_is_black_and_correctly_sized() {
        let frame = Frame::new(720, 720, PixelFormat::Bgra);
        assert_eq!(frame.bytes().len(), 720 * 720 * 4);
        assert!(frame.bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn bgra_byte_order() {
        let mut frame = Frame::new(2, 2, PixelFormat::Bgra);
        frame.set_pixel(1, 0, Rgb888::new(10, 20, 30));

        // Second pixel of the first row.
        assert_eq!(&frame.bytes()[4..8], &[30, 20, 10, 0]);
    }

    #[test]
    fn rgb_byte_order() {
        let mut frame = Frame::new(2, 1, PixelFormat::Rgb);
        frame.set_pixel(0, 0, Rgb888::new(10, 20, 30));

        assert_eq!(&frame.bytes()[0..3], &[10, 20, 30]);
    }

    #[test]
    fn row_major_addressing() {
        let mut frame = Frame::new(3, 2, PixelFormat::Rgba);
        frame.set_pixel(0, 1, Rgb888::new(255, 0, 0));

        // First pixel of the second row: 3 pixels * 4 bytes in.
        assert_eq!(&frame.bytes()[12..16], &[255, 0, 0, 0]);
    }

    #[test]
    fn pixel_roundtrips_for_every_format() {
        for format in [
            PixelFormat::Bgra,
            PixelFormat::Rgba,
            PixelFormat::Bgr,
            PixelFormat::Rgb,
        ] {
            let mut frame = Frame::new(4, 4, format);
            let color = Rgb888::new(64, 131, 53);
            frame.set_pixel(2, 3, color);
            assert_eq!(frame.pixel(2, 3), Some(color), "format {format:?}");
        }
    }

    #[test]
    fn out_of_bounds_writes_are_ignored() {
        let mut frame = Frame::new(2, 2, PixelFormat::Bgra);
        frame.set_pixel(2, 0, Rgb888::new(255, 255, 255));
        frame.set_pixel(0, 2, Rgb888::new(255, 255, 255));

        assert!(frame.bytes().iter().all(|&b| b == 0));
        assert!(frame.pixel(2, 0).is_none());
    }

    #[test]
    fn draws_embedded_graphics_primitives() {
        let mut frame = Frame::new(10, 10, PixelFormat::Bgra);
        Rectangle::new(Point::new(2, 2), Size::new(4, 4))
            .into_styled(PrimitiveStyle::with_fill(Rgb888::new(0, 0, 255)))
            .draw(&mut frame)
            .unwrap();

        assert_eq!(frame.pixel(3, 3), Some(Rgb888::new(0, 0, 255)));
        assert_eq!(frame.pixel(0, 0), Some(Rgb888::new(0, 0, 0)), "outside stays black");
    }

    #[test]
    fn negative_coordinates_are_clipped() {
        let mut frame = Frame::new(4, 4, PixelFormat::Bgra);
        Rectangle::new(Point::new(-2, -2), Size::new(3, 3))
            .into_styled(PrimitiveStyle::with_fill(Rgb888::new(255, 255, 255)))
            .draw(&mut frame)
            .unwrap();

        // Only the overlapping corner lands in the frame.
        assert_eq!(frame.pixel(0, 0), Some(Rgb888::new(255, 255, 255)));
        assert_eq!(frame.pixel(2, 2), Some(Rgb888::new(0, 0, 0)));
    }
}
