//! Off-screen 1bpp render target.

use alloc::{vec, vec::Vec};
use core::convert::Infallible;

use embedded_graphics::{
    Pixel,
    draw_target::DrawTarget,
    geometry::{OriginDimensions, Size},
    pixelcolor::BinaryColor,
};

/// 1bpp canvas sized to the attached display.
///
/// Rows are packed left to right; bit 7 is the first pixel in each byte. A set
/// bit is ink, a cleared bit is background. Inversion is a property of the
/// panel and is applied when the canvas is presented.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Canvas {
    width: usize,
    height: usize,
    line_bytes: usize,
    bytes: Vec<u8>,
}

impl Canvas {
    /// Creates a blank (all background) canvas.
    pub fn new(width: usize, height: usize) -> Self {
        let line_bytes = width.div_ceil(8);
        Self {
            width,
            height,
            line_bytes,
            bytes: vec![0u8; line_bytes * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Packed bytes per row.
    pub fn line_bytes(&self) -> usize {
        self.line_bytes
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Fills the canvas with ink (`on = true`) or background.
    pub fn clear(&mut self, on: bool) {
        self.bytes.fill(if on { 0xFF } else { 0x00 });
    }

    /// Sets a pixel state. Returns `false` when the pixel is off-canvas.
    pub fn set_pixel(&mut self, x: usize, y: usize, on: bool) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }

        let byte_index = y * self.line_bytes + (x / 8);
        let bit_mask = 1u8 << (7 - (x % 8));

        if on {
            self.bytes[byte_index] |= bit_mask;
        } else {
            self.bytes[byte_index] &= !bit_mask;
        }

        true
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<bool> {
        if x >= self.width || y >= self.height {
            return None;
        }

        let byte_index = y * self.line_bytes + (x / 8);
        let bit_mask = 1u8 << (7 - (x % 8));
        Some((self.bytes[byte_index] & bit_mask) != 0)
    }

    /// Packed payload of row `y` (zero-based).
    pub fn row(&self, y: usize) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }

        let start = y * self.line_bytes;
        Some(&self.bytes[start..start + self.line_bytes])
    }

    /// Iterates over packed rows from top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.bytes.chunks_exact(self.line_bytes.max(1))
    }

    /// Number of ink pixels; used by tests and diagnostics.
    pub fn ink_count(&self) -> usize {
        self.bytes.iter().map(|b| b.count_ones() as usize).sum()
    }
}

impl DrawTarget for Canvas {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 {
                continue;
            }

            let _ = self.set_pixel(point.x as usize, point.y as usize, color.is_on());
        }

        Ok(())
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.width as u32, self.height as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_bit_mapping_is_msb_first_within_byte() {
        let mut canvas = Canvas::new(16, 2);

        assert!(canvas.set_pixel(0, 0, true));
        assert!(canvas.set_pixel(7, 0, true));
        assert!(canvas.set_pixel(8, 0, true));

        let row = canvas.row(0).unwrap();
        assert_eq!(row[0], 0b1000_0001);
        assert_eq!(row[1], 0b1000_0000);
    }

    #[test]
    fn odd_width_rounds_row_up_to_whole_bytes() {
        let canvas = Canvas::new(13, 3);
        assert_eq!(canvas.line_bytes(), 2);
        assert_eq!(canvas.bytes().len(), 6);
        assert_eq!(canvas.rows().count(), 3);
    }

    #[test]
    fn out_of_bounds_pixel_is_ignored() {
        let mut canvas = Canvas::new(8, 8);

        assert!(!canvas.set_pixel(8, 0, true));
        assert!(!canvas.set_pixel(0, 8, true));
        assert_eq!(canvas.ink_count(), 0);
        assert_eq!(canvas.pixel(8, 8), None);
    }

    #[test]
    fn negative_draw_coordinates_are_clipped() {
        use embedded_graphics::geometry::Point;

        let mut canvas = Canvas::new(8, 8);
        canvas
            .draw_iter([
                Pixel(Point::new(-1, 0), BinaryColor::On),
                Pixel(Point::new(2, 3), BinaryColor::On),
            ])
            .unwrap();

        assert_eq!(canvas.ink_count(), 1);
        assert_eq!(canvas.pixel(2, 3), Some(true));
    }
}
