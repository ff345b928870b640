//! Bit-packed 1-bpp frame storage.
//!
//! One [`PackedBuffer`] holds exactly one full frame in the panel's native
//! page layout: bit `y % 8` of byte `x + (y / 8) * WIDTH` is the lit/unlit
//! state of pixel (x, y). That layout is what the SSD1306 controller consumes
//! directly, so a presented frame is blitted without any repacking.

use core::convert::Infallible;

use embedded_graphics::pixelcolor::RgbColor;
use embedded_graphics::prelude::Point;

use crate::color;
use crate::Color;

/// Computes the byte size of a packed buffer for the given panel geometry.
#[must_use]
pub const fn compute_buffer_size(width: usize, height: usize) -> usize {
    (width * height + 7) / 8
}

/// One full frame at 1 bit per pixel, in SSD1306 page layout.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PackedBuffer<const WIDTH: usize, const HEIGHT: usize, const SIZE: usize> {
    buffer: [u8; SIZE],
}

impl<const WIDTH: usize, const HEIGHT: usize, const SIZE: usize>
    PackedBuffer<WIDTH, HEIGHT, SIZE>
{
    /// Create a new zeroed frame buffer.
    #[must_use]
    pub const fn new() -> Self {
        assert!(WIDTH > 0 && HEIGHT > 0);
        // page addressing needs a whole number of 8-pixel pages
        assert!(HEIGHT % 8 == 0);
        assert!(SIZE == compute_buffer_size(WIDTH, HEIGHT));
        Self { buffer: [0; SIZE] }
    }

    /// Set pixel (x, y) lit or unlit. Out-of-range coordinates are skipped.
    pub fn set_lit(&mut self, x: usize, y: usize, lit: bool) {
        if x >= WIDTH || y >= HEIGHT {
            return;
        }
        let index = x + (y / 8) * WIDTH;
        let mask = 1u8 << (y % 8);
        if lit {
            self.buffer[index] |= mask;
        } else {
            self.buffer[index] &= !mask;
        }
    }

    /// Returns whether pixel (x, y) is lit; false out of range.
    #[must_use]
    pub fn is_lit(&self, x: usize, y: usize) -> bool {
        if x >= WIDTH || y >= HEIGHT {
            return false;
        }
        self.buffer[x + (y / 8) * WIDTH] & (1 << (y % 8)) != 0
    }

    /// Set a pixel from an RGB888 color through the luminance threshold.
    pub fn set_pixel(&mut self, p: Point, color: Color) {
        if p.x < 0 || p.y < 0 {
            return;
        }
        self.set_lit(
            p.x as usize,
            p.y as usize,
            color::to_monochrome(color.r(), color.g(), color.b()),
        );
    }

    /// Zero every pixel.
    pub fn clear(&mut self) {
        self.buffer = [0; SIZE];
    }

    /// Overwrite this frame wholesale with another.
    pub fn copy_from(&mut self, other: &Self) {
        self.buffer = other.buffer;
    }

    /// The packed bytes in page layout, ready to blit.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Number of lit pixels in the frame.
    #[must_use]
    pub fn lit_count(&self) -> usize {
        self.buffer.iter().map(|b| b.count_ones() as usize).sum()
    }
}

impl<const WIDTH: usize, const HEIGHT: usize, const SIZE: usize> Default
    for PackedBuffer<WIDTH, HEIGHT, SIZE>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const WIDTH: usize, const HEIGHT: usize, const SIZE: usize>
    embedded_graphics::prelude::OriginDimensions for PackedBuffer<WIDTH, HEIGHT, SIZE>
{
    fn size(&self) -> embedded_graphics::prelude::Size {
        embedded_graphics::prelude::Size::new(WIDTH as u32, HEIGHT as u32)
    }
}

impl<const WIDTH: usize, const HEIGHT: usize, const SIZE: usize>
    embedded_graphics::draw_target::DrawTarget for PackedBuffer<WIDTH, HEIGHT, SIZE>
{
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = embedded_graphics::Pixel<Self::Color>>,
    {
        for pixel in pixels {
            self.set_pixel(pixel.0, pixel.1);
        }
        Ok(())
    }
}

#[cfg(feature = "log")]
impl<const WIDTH: usize, const HEIGHT: usize, const SIZE: usize> core::fmt::Debug
    for PackedBuffer<WIDTH, HEIGHT, SIZE>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PackedBuffer")
            .field("width", &WIDTH)
            .field("height", &HEIGHT)
            .field("bytes", &SIZE)
            .field("lit", &self.lit_count())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl<const WIDTH: usize, const HEIGHT: usize, const SIZE: usize> defmt::Format
    for PackedBuffer<WIDTH, HEIGHT, SIZE>
{
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "PackedBuffer<{}, {}>", WIDTH, HEIGHT);
        defmt::write!(f, " bytes: {}", SIZE);
        defmt::write!(f, " lit: {}", self.lit_count());
    }
}
