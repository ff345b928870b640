//! Hardware transport behind a display backend.
//!
//! The backend core only needs three things from the silicon: clear the
//! controller's frame RAM image, place a packed bitmap into it, and push it
//! to the glass. [`Transport`] is that seam; [`Ssd1306`] drives the real
//! controller over I2C. Tests substitute a recording transport.

use embedded_graphics::prelude::Point;
use embedded_graphics::prelude::Size;
use embedded_hal::i2c::I2c;

/// Transport contract consumed by [`crate::oled::OledDmd`].
///
/// All methods are synchronous bus operations; errors are the bus's own and
/// propagate unchanged. There are no retryable failures at this layer.
pub trait Transport {
    /// Bus error type.
    type Error;

    /// Bring up the controller. Called once at backend construction;
    /// failure is fatal to construction.
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Zero the staged frame image.
    fn clear(&mut self) -> Result<(), Self::Error>;

    /// Place a page-packed 1-bpp bitmap into the staged frame image.
    ///
    /// `origin.y` must be page-aligned (a multiple of 8); rows and columns
    /// falling outside the panel are skipped.
    fn blit(&mut self, origin: Point, bitmap: &[u8], size: Size) -> Result<(), Self::Error>;

    /// Push the staged frame image to the glass.
    fn present(&mut self) -> Result<(), Self::Error>;
}

/// Default I2C address of SSD1306 modules (0x3D is the 128x64 alternate).
pub const DEFAULT_ADDRESS: u8 = 0x3C;

// data chunk size per I2C transaction; the controller's address pointer
// carries across transactions
const CHUNK: usize = 16;

const CONTROL_COMMAND: u8 = 0x00;
const CONTROL_DATA: u8 = 0x40;

const SET_DISPLAY_OFF: u8 = 0xAE;
const SET_DISPLAY_ON: u8 = 0xAF;
const SET_CLOCK_DIV: u8 = 0xD5;
const SET_MULTIPLEX: u8 = 0xA8;
const SET_DISPLAY_OFFSET: u8 = 0xD3;
const SET_START_LINE: u8 = 0x40;
const SET_CHARGE_PUMP: u8 = 0x8D;
const SET_MEMORY_MODE: u8 = 0x20;
const SET_SEGMENT_REMAP: u8 = 0xA1;
const SET_COM_SCAN_DEC: u8 = 0xC8;
const SET_COM_PINS: u8 = 0xDA;
const SET_CONTRAST: u8 = 0x81;
const SET_PRECHARGE: u8 = 0xD9;
const SET_VCOM_DESELECT: u8 = 0xDB;
const RESUME_FROM_RAM: u8 = 0xA4;
const SET_NORMAL_DISPLAY: u8 = 0xA6;
const SET_COLUMN_RANGE: u8 = 0x21;
const SET_PAGE_RANGE: u8 = 0x22;

/// SSD1306 controller over I2C, holding the staged frame image.
pub struct Ssd1306<I2C, const WIDTH: usize, const HEIGHT: usize, const SIZE: usize> {
    i2c: I2C,
    address: u8,
    staging: [u8; SIZE],
}

impl<I2C, const WIDTH: usize, const HEIGHT: usize, const SIZE: usize>
    Ssd1306<I2C, WIDTH, HEIGHT, SIZE>
where
    I2C: I2c,
{
    /// Create a driver at the default address.
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, DEFAULT_ADDRESS)
    }

    /// Create a driver at a specific I2C address.
    pub fn with_address(i2c: I2C, address: u8) -> Self {
        assert!(HEIGHT % 8 == 0);
        assert!(SIZE == crate::framebuffer::compute_buffer_size(WIDTH, HEIGHT));
        Self {
            i2c,
            address,
            staging: [0; SIZE],
        }
    }

    /// Release the bus.
    pub fn release(self) -> I2C {
        self.i2c
    }

    fn command(&mut self, bytes: &[u8]) -> Result<(), I2C::Error> {
        debug_assert!(bytes.len() <= CHUNK);
        // control byte 0x00 introduces a command stream
        let mut buf = [CONTROL_COMMAND; CHUNK + 1];
        buf[1..=bytes.len()].copy_from_slice(bytes);
        self.i2c.write(self.address, &buf[..=bytes.len()])
    }

    fn set_window(&mut self) -> Result<(), I2C::Error> {
        self.command(&[
            SET_COLUMN_RANGE,
            0,
            WIDTH as u8 - 1,
            SET_PAGE_RANGE,
            0,
            (HEIGHT / 8) as u8 - 1,
        ])
    }
}

impl<I2C, const WIDTH: usize, const HEIGHT: usize, const SIZE: usize> Transport
    for Ssd1306<I2C, WIDTH, HEIGHT, SIZE>
where
    I2C: I2c,
{
    type Error = I2C::Error;

    fn init(&mut self) -> Result<(), Self::Error> {
        let com_pins: u8 = if HEIGHT == 32 { 0x02 } else { 0x12 };
        self.command(&[SET_DISPLAY_OFF])?;
        self.command(&[SET_CLOCK_DIV, 0x80])?;
        self.command(&[SET_MULTIPLEX, HEIGHT as u8 - 1])?;
        self.command(&[SET_DISPLAY_OFFSET, 0x00])?;
        self.command(&[SET_START_LINE])?;
        // switched-capacitor charge pump, the usual module wiring
        self.command(&[SET_CHARGE_PUMP, 0x14])?;
        self.command(&[SET_MEMORY_MODE, 0x00])?;
        self.command(&[SET_SEGMENT_REMAP])?;
        self.command(&[SET_COM_SCAN_DEC])?;
        self.command(&[SET_COM_PINS, com_pins])?;
        self.command(&[SET_CONTRAST, 0x8F])?;
        self.command(&[SET_PRECHARGE, 0xF1])?;
        self.command(&[SET_VCOM_DESELECT, 0x40])?;
        self.command(&[RESUME_FROM_RAM])?;
        self.command(&[SET_NORMAL_DISPLAY])?;
        self.command(&[SET_DISPLAY_ON])?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        self.staging = [0; SIZE];
        Ok(())
    }

    fn blit(&mut self, origin: Point, bitmap: &[u8], size: Size) -> Result<(), Self::Error> {
        if origin.x < 0 || origin.y < 0 || origin.y % 8 != 0 {
            return Ok(());
        }
        let x0 = origin.x as usize;
        let page0 = origin.y as usize / 8;
        let width = size.width as usize;
        let pages = (size.height as usize) / 8;
        for page in 0..pages {
            if page0 + page >= HEIGHT / 8 {
                break;
            }
            for x in 0..width {
                if x0 + x >= WIDTH {
                    break;
                }
                let Some(&byte) = bitmap.get(page * width + x) else {
                    return Ok(());
                };
                self.staging[(page0 + page) * WIDTH + x0 + x] = byte;
            }
        }
        Ok(())
    }

    fn present(&mut self) -> Result<(), Self::Error> {
        self.set_window()?;
        let mut buf = [CONTROL_DATA; CHUNK + 1];
        let mut offset = 0;
        while offset < SIZE {
            let len = CHUNK.min(SIZE - offset);
            buf[1..=len].copy_from_slice(&self.staging[offset..offset + len]);
            self.i2c.write(self.address, &buf[..=len])?;
            offset += len;
        }
        Ok(())
    }
}
