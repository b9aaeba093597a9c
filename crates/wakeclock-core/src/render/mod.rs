//! Clock face rendering onto an owned 1bpp canvas.

pub mod canvas;
pub mod console;
pub mod face;
pub mod layout;
pub mod text;

pub use canvas::Canvas;
pub use console::StatusConsole;
pub use face::{ClockFace, ClockReading, DEFAULT_GREETING};
pub use layout::{Alignment, Anchor, DisplayLayout, TextRegion, TextSize};

/// Screen that shows a whole canvas per call.
pub trait Display {
    type Error: core::fmt::Debug;

    /// Resolution in pixels as `(width, height)`.
    fn size(&self) -> (usize, usize);

    /// Swaps ink and background at blit time.
    fn set_inverted(&mut self, inverted: bool);

    /// Pushes the canvas to the panel in a single transaction.
    fn present(&mut self, canvas: &Canvas) -> Result<(), Self::Error>;
}
