//! Scaled monospace text on a 1bpp target.

use core::fmt::Write;

use embedded_graphics::{
    Drawable, Pixel,
    draw_target::DrawTarget,
    geometry::{Dimensions, OriginDimensions, Point, Size},
    mono_font::{MonoFont, MonoTextStyle, ascii::FONT_6X10},
    pixelcolor::BinaryColor,
    primitives::Rectangle,
    text::{Baseline, Text},
};
use heapless::String;

use super::layout::{Alignment, TextSize, aligned_x};
use crate::time::DateTime;

pub const BASE_FONT: &MonoFont<'static> = &FONT_6X10;

/// Horizontal advance of one base glyph.
pub const GLYPH_ADVANCE: i32 = 6;
pub const GLYPH_HEIGHT: i32 = 10;

pub fn text_width(text: &str, size: TextSize) -> i32 {
    text.chars().count() as i32 * GLYPH_ADVANCE * size.x as i32
}

pub fn line_height(size: TextSize) -> i32 {
    GLYPH_HEIGHT * size.y as i32
}

/// Draw target adapter that blows every pixel up to a `size.x` by `size.y`
/// block, placed relative to `origin`.
pub struct ScaledTarget<'a, T> {
    inner: &'a mut T,
    origin: Point,
    size: TextSize,
}

impl<'a, T> ScaledTarget<'a, T> {
    pub fn new(inner: &'a mut T, origin: Point, size: TextSize) -> Self {
        Self {
            inner,
            origin,
            size,
        }
    }
}

impl<T> DrawTarget for ScaledTarget<'_, T>
where
    T: DrawTarget<Color = BinaryColor>,
{
    type Color = BinaryColor;
    type Error = T::Error;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let sx = self.size.x.max(1) as i32;
        let sy = self.size.y.max(1) as i32;
        let block = Size::new(sx as u32, sy as u32);

        for Pixel(point, color) in pixels {
            let top_left = Point::new(self.origin.x + point.x * sx, self.origin.y + point.y * sy);
            self.inner.fill_solid(&Rectangle::new(top_left, block), color)?;
        }

        Ok(())
    }
}

impl<T> OriginDimensions for ScaledTarget<'_, T>
where
    T: Dimensions,
{
    fn size(&self) -> Size {
        let inner = self.inner.bounding_box().size;
        Size::new(
            inner.width.div_ceil(self.size.x.max(1) as u32),
            inner.height.div_ceil(self.size.y.max(1) as u32),
        )
    }
}

/// Draws `text` with its top-left corner at `origin`.
pub fn draw_text<T>(target: &mut T, origin: Point, text: &str, size: TextSize) -> Result<(), T::Error>
where
    T: DrawTarget<Color = BinaryColor>,
{
    let style = MonoTextStyle::new(BASE_FONT, BinaryColor::On);
    let mut scaled = ScaledTarget::new(target, origin, size);
    Text::with_baseline(text, Point::zero(), style, Baseline::Top).draw(&mut scaled)?;
    Ok(())
}

/// Prints one line at `cursor_y` with the given alignment, then moves the
/// cursor below it.
pub fn print_aligned<T>(
    target: &mut T,
    cursor_y: &mut i32,
    text: &str,
    align: Alignment,
    size: TextSize,
) -> Result<(), T::Error>
where
    T: DrawTarget<Color = BinaryColor>,
{
    let surface_width = target.bounding_box().size.width as i32;
    let x = aligned_x(align, surface_width, text_width(text, size));
    draw_text(target, Point::new(x, *cursor_y), text, size)?;
    *cursor_y += line_height(size);
    Ok(())
}

pub fn format_date(now: &DateTime) -> String<16> {
    let mut out = String::new();
    let _ = write!(out, "{:4}/{:2}/{:2}", now.year, now.month, now.day);
    out
}

pub fn format_time(now: &DateTime) -> String<16> {
    let mut out = String::new();
    let _ = write!(out, "{:02}:{:02}:{:02}", now.hour, now.minute, now.second);
    out
}

pub fn format_battery(percent: i16) -> String<16> {
    let mut out = String::new();
    let _ = write!(out, "BAT. {:03}", percent);
    out
}
