//! Full-screen text console for sync progress.

use embedded_graphics::geometry::Point;

use super::{
    Canvas, Display,
    layout::TextSize,
    text::{GLYPH_ADVANCE, draw_text, line_height},
};

/// Terminal-style progress output over the whole screen.
///
/// Text flows left to right and wraps at the right edge. Every call presents
/// the updated canvas so progress dots show up while a wait is running.
pub struct StatusConsole<'d, D: Display> {
    display: &'d mut D,
    canvas: Canvas,
    x: i32,
    y: i32,
    size: TextSize,
}

impl<'d, D: Display> StatusConsole<'d, D> {
    pub fn new(display: &'d mut D, size: TextSize) -> Self {
        let (width, height) = display.size();
        Self {
            display,
            canvas: Canvas::new(width, height),
            x: 0,
            y: 0,
            size,
        }
    }

    pub fn print(&mut self, text: &str) -> Result<(), D::Error> {
        self.write(text);
        self.display.present(&self.canvas)
    }

    pub fn println(&mut self, text: &str) -> Result<(), D::Error> {
        self.write(text);
        self.newline();
        self.display.present(&self.canvas)
    }

    /// Blanks the screen and homes the cursor.
    pub fn clear(&mut self) -> Result<(), D::Error> {
        self.canvas.clear(false);
        self.x = 0;
        self.y = 0;
        self.display.present(&self.canvas)
    }

    pub fn cursor(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    fn write(&mut self, text: &str) {
        let advance = GLYPH_ADVANCE * self.size.x as i32;
        let width = self.canvas.width() as i32;
        let mut glyph = [0u8; 4];

        for ch in text.chars() {
            if ch == '\n' {
                self.newline();
                continue;
            }

            if self.x + advance > width {
                self.newline();
            }

            let s = ch.encode_utf8(&mut glyph);
            match draw_text(&mut self.canvas, Point::new(self.x, self.y), s, self.size) {
                Ok(()) => {}
                Err(never) => match never {},
            }
            self.x += advance;
        }
    }

    fn newline(&mut self) {
        let step = line_height(self.size);
        self.x = 0;
        self.y += step;

        // Out of rows: start over from the top.
        if self.y + step > self.canvas.height() as i32 {
            self.canvas.clear(false);
            self.y = 0;
        }
    }
}
