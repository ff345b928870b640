//! The SSD1306-class OLED backend.
//!
//! [`OledDmd`] owns two [`PackedBuffer`]s. Every draw operation lands in the
//! *working* buffer; on a throttled refresh the working buffer is copied to
//! the *active* buffer, blitted, and presented, then copied back so the next
//! frame starts from the last presented state instead of blank. The physical
//! display never sees a partially drawn frame.

use embedded_graphics::prelude::Point;
use embedded_graphics::prelude::Size;

use crate::color;
use crate::config::DisplayConfig;
use crate::dither;
use crate::font;
use crate::framebuffer::compute_buffer_size;
use crate::framebuffer::PackedBuffer;
use crate::transport::Transport;
use crate::zones;
use crate::DisplayDriver;

/// Minimum interval between presentations: ~30 Hz.
pub const REFRESH_INTERVAL_MS: u32 = 33;

/// Double-buffered monochrome backend over a [`Transport`].
///
/// `ZONE_WIDTH` x `ZONE_HEIGHT` zones tile the `WIDTH` x `HEIGHT` panel for
/// partial updates. Both frame buffers are allocated inline and live for the
/// backend's entire lifetime; nothing is resized at runtime.
pub struct OledDmd<
    T,
    const WIDTH: usize,
    const HEIGHT: usize,
    const ZONE_WIDTH: usize,
    const ZONE_HEIGHT: usize,
    const SIZE: usize,
> {
    transport: T,
    config: DisplayConfig,
    working: PackedBuffer<WIDTH, HEIGHT, SIZE>,
    active: PackedBuffer<WIDTH, HEIGHT, SIZE>,
    last_refresh_ms: u32,
}

/// The shipped panel geometry: 128x32 pixels in 8x4 zones.
pub type OledDmd128x32<T> = OledDmd<T, 128, 32, 8, 4, { compute_buffer_size(128, 32) }>;

impl<
        T,
        const WIDTH: usize,
        const HEIGHT: usize,
        const ZONE_WIDTH: usize,
        const ZONE_HEIGHT: usize,
        const SIZE: usize,
    > OledDmd<T, WIDTH, HEIGHT, ZONE_WIDTH, ZONE_HEIGHT, SIZE>
where
    T: Transport,
{
    /// Bring up the transport and start from a cleared panel.
    ///
    /// A transport failure here is fatal: there is no degraded mode without
    /// a display.
    pub fn new(transport: T, config: DisplayConfig) -> Result<Self, T::Error> {
        let mut backend = Self {
            transport,
            config,
            working: PackedBuffer::new(),
            active: PackedBuffer::new(),
            last_refresh_ms: 0,
        };
        backend.transport.init()?;
        backend.transport.clear()?;
        backend.transport.present()?;
        Ok(backend)
    }

    /// Copy working to active and push the active frame to the glass.
    ///
    /// The glass keeps showing the previous frame until this returns.
    pub fn swap_buffers(&mut self) -> Result<(), T::Error> {
        self.active.copy_from(&self.working);
        self.transport.clear()?;
        self.transport.blit(
            Point::zero(),
            self.active.as_bytes(),
            Size::new(WIDTH as u32, HEIGHT as u32),
        )?;
        self.transport.present()
    }

    /// Reseed the working buffer from the last presented frame.
    ///
    /// Callers then only need to redraw what changed instead of composing
    /// every frame from scratch.
    pub fn copy_frame_buffer(&mut self) {
        self.working.copy_from(&self.active);
    }

    /// Throttled refresh: swap + reseed if at least [`REFRESH_INTERVAL_MS`]
    /// has elapsed since the last presentation, otherwise a no-op.
    ///
    /// `now_ms` is the caller's monotonic millisecond tick; the comparison
    /// is wraparound-safe, so a u32 tick counter that overflows is fine.
    /// Returns whether a frame was presented.
    pub fn update_display(&mut self, now_ms: u32) -> Result<bool, T::Error> {
        if now_ms.wrapping_sub(self.last_refresh_ms) < REFRESH_INTERVAL_MS {
            return Ok(false);
        }
        self.swap_buffers()?;
        self.copy_frame_buffer();
        self.last_refresh_ms = now_ms;
        Ok(true)
    }

    /// Replace the device configuration.
    pub fn apply_config(&mut self, config: DisplayConfig) {
        self.config = config;
    }

    /// Current device configuration.
    #[must_use]
    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    /// The frame being drawn into. Implements
    /// [`embedded_graphics::draw_target::DrawTarget`] for primitive drawing.
    pub fn working_mut(&mut self) -> &mut PackedBuffer<WIDTH, HEIGHT, SIZE> {
        &mut self.working
    }

    /// The frame being drawn into.
    #[must_use]
    pub fn working(&self) -> &PackedBuffer<WIDTH, HEIGHT, SIZE> {
        &self.working
    }

    /// The most recently presented frame.
    #[must_use]
    pub fn active(&self) -> &PackedBuffer<WIDTH, HEIGHT, SIZE> {
        &self.active
    }
}

impl<
        T,
        const WIDTH: usize,
        const HEIGHT: usize,
        const ZONE_WIDTH: usize,
        const ZONE_HEIGHT: usize,
        const SIZE: usize,
    > DisplayDriver for OledDmd<T, WIDTH, HEIGHT, ZONE_WIDTH, ZONE_HEIGHT, SIZE>
where
    T: Transport,
{
    type Error = T::Error;

    fn draw_pixel_rgb888(&mut self, x: u16, y: u16, r: u8, g: u8, b: u8) {
        let (r, g, b) = self.config.rgb_order.remap(r, g, b);
        self.working
            .set_lit(usize::from(x), usize::from(y), color::to_monochrome(r, g, b));
    }

    fn draw_pixel_rgb565(&mut self, x: u16, y: u16, color: u16) {
        self.working
            .set_lit(usize::from(x), usize::from(y), color::to_monochrome565(color));
    }

    fn clear_screen(&mut self) -> Result<(), Self::Error> {
        // clearing bypasses the refresh throttle
        self.working.clear();
        self.transport.clear()?;
        self.transport.present()
    }

    fn set_brightness(&mut self, level: u8) {
        // recorded only; this controller drives an emulated panel with no
        // brightness DAC, and the capability contract wants a silent no-op
        self.config.brightness = level;
    }

    fn fill_screen(&mut self, r: u8, g: u8, b: u8) {
        zones::fill_screen(&mut self.working, r, g, b, self.config.rgb_order);
    }

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
    ) {
        for (ti, c) in text.chars().enumerate() {
            for row in 0..font::GLYPH_HEIGHT {
                let line = font::glyph_line(c, row as u8);
                for column in 0..font::GLYPH_WIDTH {
                    let mut lit = (line >> (3 - column)) & 0x1 != 0;
                    if inverted {
                        lit = !lit;
                    }
                    if transparent && !lit {
                        continue;
                    }
                    let px = usize::from(x) + usize::from(column) + ti * usize::from(font::GLYPH_WIDTH);
                    let py = usize::from(y) + usize::from(row);
                    let (r, g, b) = if lit { (r, g, b) } else { (0, 0, 0) };
                    let (r, g, b) = self.config.rgb_order.remap(r, g, b);
                    self.working.set_lit(px, py, color::to_monochrome(r, g, b));
                }
            }
        }
    }

    fn fill_zone_rgb888(&mut self, idx: u8, data: &[u8]) {
        zones::fill_zone_rgb888(
            &mut self.working,
            idx,
            data,
            ZONE_WIDTH,
            ZONE_HEIGHT,
            self.config.rgb_order,
        );
    }

    fn fill_zone_rgb565(&mut self, idx: u8, data: &[u8]) {
        zones::fill_zone_rgb565(&mut self.working, idx, data, ZONE_WIDTH, ZONE_HEIGHT);
    }

    fn fill_panel_rgb888(&mut self, data: &mut [u8]) {
        dither::fill_panel_rgb888(data, &mut self.working, self.config.rgb_order);
    }

    fn fill_panel_palette(&mut self, indices: &[u8], palette: &[u8]) {
        zones::fill_panel_palette(&mut self.working, indices, palette, self.config.rgb_order);
    }

    fn fill_panel_changed_palette(&mut self, indices: &[u8], palette: &[u8], affected: &[bool]) {
        zones::fill_panel_changed_palette(
            &mut self.working,
            indices,
            palette,
            affected,
            self.config.rgb_order,
        );
    }
}

#[cfg(feature = "log")]
impl<
        T,
        const WIDTH: usize,
        const HEIGHT: usize,
        const ZONE_WIDTH: usize,
        const ZONE_HEIGHT: usize,
        const SIZE: usize,
    > core::fmt::Debug for OledDmd<T, WIDTH, HEIGHT, ZONE_WIDTH, ZONE_HEIGHT, SIZE>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OledDmd")
            .field("width", &WIDTH)
            .field("height", &HEIGHT)
            .field("zone", &(ZONE_WIDTH, ZONE_HEIGHT))
            .field("working_lit", &self.working.lit_count())
            .field("active_lit", &self.active.lit_count())
            .field("last_refresh_ms", &self.last_refresh_ms)
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl<
        T,
        const WIDTH: usize,
        const HEIGHT: usize,
        const ZONE_WIDTH: usize,
        const ZONE_HEIGHT: usize,
        const SIZE: usize,
    > defmt::Format for OledDmd<T, WIDTH, HEIGHT, ZONE_WIDTH, ZONE_HEIGHT, SIZE>
{
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "OledDmd<{}, {}>", WIDTH, HEIGHT);
        defmt::write!(f, " working_lit: {}", self.working.lit_count());
        defmt::write!(f, " active_lit: {}", self.active.lit_count());
        defmt::write!(f, " last_refresh_ms: {}", self.last_refresh_ms);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec;
    use std::vec::Vec;

    use super::*;
    use crate::config::RgbOrder;

    const W: usize = 128;
    const H: usize = 32;
    const S: usize = compute_buffer_size(W, H);

    type Backend = OledDmd128x32<MockTransport>;

    #[derive(Default)]
    struct MockTransport {
        inits: usize,
        clears: usize,
        presents: usize,
        last_blit: Vec<u8>,
        fail_init: bool,
    }

    impl Transport for MockTransport {
        type Error = ();

        fn init(&mut self) -> Result<(), Self::Error> {
            self.inits += 1;
            if self.fail_init {
                return Err(());
            }
            Ok(())
        }

        fn clear(&mut self) -> Result<(), Self::Error> {
            self.clears += 1;
            Ok(())
        }

        fn blit(&mut self, _origin: Point, bitmap: &[u8], _size: Size) -> Result<(), Self::Error> {
            self.last_blit = bitmap.to_vec();
            Ok(())
        }

        fn present(&mut self) -> Result<(), Self::Error> {
            self.presents += 1;
            Ok(())
        }
    }

    fn backend() -> Backend {
        OledDmd::new(MockTransport::default(), DisplayConfig::default()).unwrap()
    }

    #[test]
    fn test_construction_clears_and_presents_once() {
        let backend = backend();
        assert_eq!(backend.transport.inits, 1);
        assert_eq!(backend.transport.clears, 1);
        assert_eq!(backend.transport.presents, 1);
        assert_eq!(backend.working().lit_count(), 0);
        assert_eq!(backend.active().lit_count(), 0);
    }

    #[test]
    fn test_construction_fails_when_transport_does() {
        let transport = MockTransport {
            fail_init: true,
            ..MockTransport::default()
        };
        assert!(OledDmd128x32::new(transport, DisplayConfig::default()).is_err());
    }

    #[test]
    fn test_swap_then_copy_leaves_buffers_identical() {
        let mut backend = backend();
        backend.draw_pixel_rgb888(3, 7, 255, 255, 255);
        backend.draw_pixel_rgb888(90, 30, 255, 255, 255);
        backend.swap_buffers().unwrap();
        backend.copy_frame_buffer();
        assert_eq!(backend.working().as_bytes(), backend.active().as_bytes());
        assert!(backend.active().is_lit(3, 7));
    }

    #[test]
    fn test_swap_blits_the_presented_frame() {
        let mut backend = backend();
        backend.draw_pixel_rgb888(0, 0, 255, 255, 255);
        backend.swap_buffers().unwrap();
        assert_eq!(
            backend.transport.last_blit.as_slice(),
            backend.active().as_bytes()
        );
        assert_eq!(backend.transport.presents, 2);
    }

    #[test]
    fn test_update_display_throttles_to_interval() {
        let mut backend = backend();
        assert!(backend.update_display(100).unwrap());
        // within 33 ms of the last refresh: no present
        assert!(!backend.update_display(110).unwrap());
        assert!(!backend.update_display(132).unwrap());
        assert_eq!(backend.transport.presents, 2);
        // interval elapsed: presents again
        assert!(backend.update_display(140).unwrap());
        assert_eq!(backend.transport.presents, 3);
    }

    #[test]
    fn test_update_display_survives_clock_wraparound() {
        let mut backend = backend();
        assert!(backend.update_display(u32::MAX - 10).unwrap());
        // 16 ms elapsed across the wrap: still throttled
        assert!(!backend.update_display(5).unwrap());
        // 41 ms elapsed across the wrap: presents
        assert!(backend.update_display(30).unwrap());
    }

    #[test]
    fn test_update_display_reseeds_working_from_active() {
        let mut backend = backend();
        backend.draw_pixel_rgb888(12, 3, 255, 255, 255);
        assert!(backend.update_display(50).unwrap());
        assert_eq!(backend.working().as_bytes(), backend.active().as_bytes());
        assert!(backend.working().is_lit(12, 3));
    }

    #[test]
    fn test_clear_screen_bypasses_throttle() {
        let mut backend = backend();
        backend.draw_pixel_rgb888(1, 1, 255, 255, 255);
        assert!(backend.update_display(100).unwrap());
        // immediately afterwards, still inside the throttle window
        backend.clear_screen().unwrap();
        assert_eq!(backend.working().lit_count(), 0);
        assert_eq!(backend.transport.presents, 3);
    }

    #[test]
    fn test_draw_pixel_thresholds() {
        let mut backend = backend();
        backend.draw_pixel_rgb888(0, 0, 128, 128, 128);
        backend.draw_pixel_rgb888(1, 0, 127, 127, 127);
        assert!(backend.working().is_lit(0, 0));
        assert!(!backend.working().is_lit(1, 0));
    }

    #[test]
    fn test_draw_pixel_rgb565() {
        let mut backend = backend();
        backend.draw_pixel_rgb565(0, 0, 0xFFFF);
        backend.draw_pixel_rgb565(1, 0, 0x0000);
        assert!(backend.working().is_lit(0, 0));
        assert!(!backend.working().is_lit(1, 0));
    }

    #[test]
    fn test_rgb_order_applies_to_draws() {
        let config = DisplayConfig {
            rgb_order: RgbOrder::Grb,
            ..DisplayConfig::default()
        };
        let mut backend = OledDmd128x32::new(MockTransport::default(), config).unwrap();
        // first channel carries green on this sender: luma 149, lit
        backend.draw_pixel_rgb888(0, 0, 255, 0, 0);
        assert!(backend.working().is_lit(0, 0));
        // the same bytes as canonical red would be luma 76, unlit
        backend.apply_config(DisplayConfig::default());
        backend.draw_pixel_rgb888(0, 0, 255, 0, 0);
        assert!(!backend.working().is_lit(0, 0));
    }

    #[test]
    fn test_set_brightness_is_a_silent_no_op() {
        let mut backend = backend();
        let presents = backend.transport.presents;
        backend.set_brightness(7);
        assert_eq!(backend.config().brightness, 7);
        assert_eq!(backend.transport.presents, presents);
        assert_eq!(backend.transport.clears, 1);
    }

    #[test]
    fn test_fill_screen() {
        let mut backend = backend();
        backend.fill_screen(255, 255, 255);
        assert_eq!(backend.working().lit_count(), W * H);
        backend.fill_screen(0, 0, 0);
        assert_eq!(backend.working().lit_count(), 0);
    }

    #[test]
    fn test_fill_panel_rgb888_dithers_into_working() {
        let mut backend = backend();
        let mut data = vec![255u8; W * H * 3];
        backend.fill_panel_rgb888(&mut data);
        assert_eq!(backend.working().lit_count(), W * H);
        // nothing presented until the next refresh tick
        assert_eq!(backend.transport.presents, 1);
    }

    #[test]
    fn test_fill_zone_only_touches_its_zone() {
        let mut backend = backend();
        let data = vec![255u8; 8 * 4 * 3];
        backend.fill_zone_rgb888(0, &data);
        assert_eq!(backend.working().lit_count(), 8 * 4);
        assert!(backend.working().is_lit(0, 0));
        assert!(!backend.working().is_lit(8, 0));
        assert!(!backend.working().is_lit(0, 4));
    }

    #[test]
    fn test_display_text_draws_glyph_pixels() {
        let mut backend = backend();
        backend.display_text("T", 0, 0, 255, 255, 255, false, false);
        // 'T' row 0 is 1110, row 1 is 0100
        assert!(backend.working().is_lit(0, 0));
        assert!(backend.working().is_lit(1, 0));
        assert!(backend.working().is_lit(2, 0));
        assert!(!backend.working().is_lit(3, 0));
        assert!(backend.working().is_lit(1, 1));
        assert!(!backend.working().is_lit(0, 1));
    }

    #[test]
    fn test_display_text_advances_by_glyph_width() {
        let mut backend = backend();
        backend.display_text("TT", 0, 0, 255, 255, 255, false, false);
        assert!(backend.working().is_lit(4, 0));
        assert!(backend.working().is_lit(6, 0));
    }

    #[test]
    fn test_display_text_transparent_keeps_background() {
        // opaque text blanks the unlit glyph pixels, transparent text
        // leaves the background under them untouched
        let mut opaque = backend();
        opaque.fill_screen(255, 255, 255);
        opaque.display_text("T", 0, 0, 255, 255, 255, false, false);
        assert!(!opaque.working().is_lit(3, 0));

        let mut transparent = backend();
        transparent.fill_screen(255, 255, 255);
        transparent.display_text("T", 0, 0, 255, 255, 255, true, false);
        assert!(transparent.working().is_lit(3, 0));
        assert!(transparent.working().is_lit(0, 0));
    }

    #[test]
    fn test_display_text_inverted_flips_pixels() {
        let mut backend = backend();
        backend.display_text("T", 0, 0, 255, 255, 255, false, true);
        assert!(!backend.working().is_lit(0, 0));
        assert!(!backend.working().is_lit(1, 0));
        assert!(backend.working().is_lit(3, 0));
    }

    #[test]
    fn test_changed_palette_matches_plain_palette_fill() {
        let palette = [0u8, 0, 0, 255, 255, 255];
        let mut indices = vec![0u8; W * H];
        for (i, index) in indices.iter_mut().enumerate() {
            *index = (i % 2) as u8;
        }

        let mut plain = backend();
        let mut changed = backend();
        plain.fill_panel_palette(&indices, &palette);
        changed.fill_panel_changed_palette(&indices, &palette, &[true; 256]);
        assert_eq!(plain.working().as_bytes(), changed.working().as_bytes());

        // with no flags set the frame is untouched
        let snapshot: Vec<u8> = changed.working().as_bytes().to_vec();
        changed.fill_panel_changed_palette(&indices, &palette, &[false; 256]);
        assert_eq!(changed.working().as_bytes(), snapshot.as_slice());
    }
}
