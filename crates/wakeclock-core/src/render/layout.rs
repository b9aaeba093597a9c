//! Screen regions, resolved against the canvas size at render time.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Alignment {
    Left,
    Center,
    Right,
}

/// Cursor x for a line of `text_width` pixels on a `surface_width` surface.
///
/// Signed on purpose: text wider than the surface starts left of zero and is
/// clipped by the canvas.
pub fn aligned_x(alignment: Alignment, surface_width: i32, text_width: i32) -> i32 {
    match alignment {
        Alignment::Left => 0,
        Alignment::Center => (surface_width - text_width) / 2,
        Alignment::Right => surface_width - text_width,
    }
}

/// Per-axis glyph magnification.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TextSize {
    pub x: u8,
    pub y: u8,
}

impl TextSize {
    pub const SMALL: Self = Self { x: 2, y: 2 };
    pub const LARGE: Self = Self { x: 3, y: 6 };

    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }
}

/// Vertical placement of a line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Anchor {
    /// Percentage of the surface height.
    Percent(u8),
    /// Directly under the previously printed line.
    Below,
}

impl Anchor {
    pub fn resolve(self, surface_height: i32, cursor_y: i32) -> i32 {
        match self {
            Anchor::Percent(percent) => surface_height * percent as i32 / 100,
            Anchor::Below => cursor_y,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TextRegion {
    pub anchor: Anchor,
    pub align: Alignment,
    pub size: TextSize,
}

impl TextRegion {
    pub const fn new(anchor: Anchor, align: Alignment, size: TextSize) -> Self {
        Self {
            anchor,
            align,
            size,
        }
    }
}

/// Where each element of the clock face goes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DisplayLayout {
    pub greeting: [TextRegion; 2],
    pub battery: TextRegion,
    pub date: TextRegion,
    pub time: TextRegion,
}

impl Default for DisplayLayout {
    fn default() -> Self {
        Self {
            greeting: [
                TextRegion::new(Anchor::Percent(0), Alignment::Center, TextSize::SMALL),
                TextRegion::new(Anchor::Below, Alignment::Center, TextSize::SMALL),
            ],
            battery: TextRegion::new(Anchor::Percent(90), Alignment::Right, TextSize::SMALL),
            date: TextRegion::new(Anchor::Percent(30), Alignment::Center, TextSize::LARGE),
            time: TextRegion::new(Anchor::Below, Alignment::Center, TextSize::LARGE),
        }
    }
}
