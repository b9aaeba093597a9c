//! Panel preview on a text terminal.

use std::io::{self, Write};

use wakeclock_core::render::{Canvas, Display};

/// Pixels per character cell.
const CELL_WIDTH: usize = 4;
const CELL_HEIGHT: usize = 8;
/// Glyphs by the share of inked pixels in a cell.
const SHADES: [char; 4] = [' ', '.', ':', '#'];

/// Renders each presented canvas as ASCII art, skipping repeats.
pub struct TerminalDisplay<W> {
    out: W,
    width: usize,
    height: usize,
    inverted: bool,
    clear_screen: bool,
    last: Option<Canvas>,
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W, width: usize, height: usize, clear_screen: bool) -> Self {
        Self {
            out,
            width,
            height,
            inverted: false,
            clear_screen,
            last: None,
        }
    }

    fn shade(&self, canvas: &Canvas, cx: usize, cy: usize) -> char {
        let mut lit = 0;
        for y in cy * CELL_HEIGHT..((cy + 1) * CELL_HEIGHT).min(canvas.height()) {
            for x in cx * CELL_WIDTH..((cx + 1) * CELL_WIDTH).min(canvas.width()) {
                // Inversion applies at presentation, as on the panel.
                if canvas.pixel(x, y) == Some(!self.inverted) {
                    lit += 1;
                }
            }
        }

        let index = lit * (SHADES.len() - 1) / (CELL_WIDTH * CELL_HEIGHT);
        SHADES[index.min(SHADES.len() - 1)]
    }

    fn draw(&mut self, canvas: &Canvas) -> io::Result<()> {
        let columns = canvas.width().div_ceil(CELL_WIDTH);
        let rows = canvas.height().div_ceil(CELL_HEIGHT);

        let mut frame = String::with_capacity((columns + 3) * (rows + 2));
        frame.push('+');
        frame.extend(std::iter::repeat_n('-', columns));
        frame.push_str("+\n");
        for cy in 0..rows {
            frame.push('|');
            for cx in 0..columns {
                frame.push(self.shade(canvas, cx, cy));
            }
            frame.push_str("|\n");
        }
        frame.push('+');
        frame.extend(std::iter::repeat_n('-', columns));
        frame.push_str("+\n");

        if self.clear_screen {
            write!(self.out, "\x1b[H\x1b[2J")?;
        }
        self.out.write_all(frame.as_bytes())?;
        self.out.flush()
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Display for TerminalDisplay<W> {
    type Error = io::ErrorKind;

    fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn set_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }

    fn present(&mut self, canvas: &Canvas) -> Result<(), Self::Error> {
        if self.last.as_ref() == Some(canvas) {
            return Ok(());
        }

        self.draw(canvas).map_err(|err| err.kind())?;
        self.last = Some(canvas.clone());
        Ok(())
    }
}
