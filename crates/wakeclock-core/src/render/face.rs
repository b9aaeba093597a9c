//! The clock face: greeting, date, time and battery gauge.

use embedded_graphics::{draw_target::DrawTarget, pixelcolor::BinaryColor};

use super::{
    Canvas,
    layout::{DisplayLayout, TextRegion},
    text::{format_battery, format_date, format_time, print_aligned},
};
use crate::time::DateTime;

/// Everything the clock face shows.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ClockReading {
    pub now: DateTime,
    /// Charge in percent; `-1` when the gauge could not be read.
    pub battery_percent: i16,
}

pub const DEFAULT_GREETING: [&str; 2] = ["Button was", "pressed at"];

#[derive(Clone, Copy, Debug)]
pub struct ClockFace<'a> {
    pub layout: DisplayLayout,
    pub greeting: [&'a str; 2],
}

impl Default for ClockFace<'static> {
    fn default() -> Self {
        Self::new(DisplayLayout::default(), DEFAULT_GREETING)
    }
}

impl<'a> ClockFace<'a> {
    pub const fn new(layout: DisplayLayout, greeting: [&'a str; 2]) -> Self {
        Self { layout, greeting }
    }

    /// Renders into a fresh canvas of the given size.
    pub fn render(&self, width: usize, height: usize, reading: &ClockReading) -> Canvas {
        let mut canvas = Canvas::new(width, height);
        match self.draw(&mut canvas, reading) {
            Ok(()) => canvas,
            Err(never) => match never {},
        }
    }

    pub fn draw<T>(&self, target: &mut T, reading: &ClockReading) -> Result<(), T::Error>
    where
        T: DrawTarget<Color = BinaryColor>,
    {
        let height = target.bounding_box().size.height as i32;
        let mut cursor_y = 0;

        let mut line = |target: &mut T, region: &TextRegion, text: &str| {
            cursor_y = region.anchor.resolve(height, cursor_y);
            print_aligned(target, &mut cursor_y, text, region.align, region.size)
        };

        line(target, &self.layout.greeting[0], self.greeting[0])?;
        line(target, &self.layout.greeting[1], self.greeting[1])?;
        line(
            target,
            &self.layout.battery,
            format_battery(reading.battery_percent).as_str(),
        )?;
        line(target, &self.layout.date, format_date(&reading.now).as_str())?;
        line(target, &self.layout.time, format_time(&reading.now).as_str())?;

        Ok(())
    }
}
