//! Monochrome OLED backend for DMD-style virtual panels.
//!
//! Upstream DMD rendering code produces full-color frames — packed RGB888
//! triples, RGB565 words, or palette-indexed bytes — at the resolution of a
//! virtual dot-matrix panel. This crate reduces those frames to the 1
//! bit-per-pixel reality of a small SSD1306-class OLED and presents them
//! tear-free at a bounded refresh rate:
//!
//! - [`framebuffer::PackedBuffer`] — page-layout 1-bpp frame storage sized
//!   exactly to the hardware pixel count / 8.
//! - [`color`] — RGB888/RGB565 to monochrome and grayscale reduction using
//!   the Rec. 601 luma weights.
//! - [`dither`] — Floyd–Steinberg error diffusion for full-panel RGB888
//!   fills, so continuous-tone content keeps its average luminance instead of
//!   collapsing to all-on or all-off.
//! - [`zones`] — zone-addressed partial updates mapping a flat zone-sized
//!   input onto a rectangular sub-region of the panel.
//! - [`oled::OledDmd`] — the backend itself: double-buffered (working +
//!   active) presentation throttled to ~30 Hz over a [`transport::Transport`].
//!
//! The working buffer implements [`embedded_graphics::draw_target::DrawTarget`]
//! with [`Rgb888`] pixels, so embedded-graphics primitives can draw straight
//! into a frame; the color reduction happens at the pixel-write boundary.
//!
//! ## Available Feature Flags
//!
//! ### `defmt` Feature
//! Implements `defmt::Format` for the buffer and backend types so they can be
//! emitted with the `defmt` logging framework. No functional changes.
//!
//! ### `log` Feature
//! Implements `core::fmt::Debug` for the buffer and backend types for use
//! with `log`-style formatting. No functional changes.
#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use embedded_graphics::pixelcolor::Rgb888;

pub mod color;
pub mod config;
pub mod dither;
pub mod font;
pub mod framebuffer;
pub mod oled;
pub mod transport;
pub mod zones;

pub use config::DisplayConfig;
pub use config::RgbOrder;
pub use framebuffer::compute_buffer_size;
pub use framebuffer::PackedBuffer;
pub use oled::OledDmd;
pub use oled::OledDmd128x32;
pub use transport::Ssd1306;
pub use transport::Transport;

/// Color type accepted by the draw surface.
pub type Color = Rgb888;

/// Capability contract shared by all display backends.
///
/// Upstream panel-rendering code drives one of these per received frame or
/// per pixel-update command; backends for different panel technologies share
/// this contract and nothing else. Operations that only touch CPU-side
/// buffers are infallible; operations that reach the hardware bus return the
/// transport's error.
pub trait DisplayDriver {
    /// Error produced by the hardware transport behind this backend.
    type Error;

    /// Draw one pixel from an RGB888 triple.
    fn draw_pixel_rgb888(&mut self, x: u16, y: u16, r: u8, g: u8, b: u8);

    /// Draw one pixel from a packed RGB565 word.
    fn draw_pixel_rgb565(&mut self, x: u16, y: u16, color: u16);

    /// Clear the working buffer and the physical display immediately.
    fn clear_screen(&mut self) -> Result<(), Self::Error>;

    /// Set the panel brightness; a silent no-op on hardware without the
    /// capability.
    fn set_brightness(&mut self, level: u8);

    /// Fill the whole panel with a solid color.
    fn fill_screen(&mut self, r: u8, g: u8, b: u8);

    /// Render text using the built-in 4x6 glyph table.
    ///
    /// `transparent` skips unlit glyph pixels instead of blanking them;
    /// `inverted` flips lit and unlit.
    #[allow(clippy::too_many_arguments)]
    fn display_text(
        &mut self,
        text: &str,
        x: u16,
        y: u16,
        r: u8,
        g: u8,
        b: u8,
        transparent: bool,
        inverted: bool,
    );

    /// Fill one zone from a tightly packed zone-sized RGB888 buffer.
    fn fill_zone_rgb888(&mut self, idx: u8, data: &[u8]);

    /// Fill one zone from a tightly packed zone-sized RGB565 buffer
    /// (little-endian words).
    fn fill_zone_rgb565(&mut self, idx: u8, data: &[u8]);

    /// Fill the whole panel from a panel-sized RGB888 buffer, dithered.
    ///
    /// The buffer is mutated in place to carry quantization error forward;
    /// it is borrowed for this call only.
    fn fill_panel_rgb888(&mut self, data: &mut [u8]);

    /// Fill the whole panel from one palette index per pixel.
    fn fill_panel_palette(&mut self, indices: &[u8], palette: &[u8]);

    /// Like [`Self::fill_panel_palette`], but only redraws pixels whose
    /// palette index is flagged in `affected`; everything else keeps its
    /// previous state.
    fn fill_panel_changed_palette(&mut self, indices: &[u8], palette: &[u8], affected: &[bool]);
}
