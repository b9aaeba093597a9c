//! Battery reading, wake source arming and deep sleep.

/// Pin level that wakes the chip.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WakeLevel {
    Low,
    High,
}

/// The single GPIO armed before deep sleep.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WakeSource {
    pub gpio: u8,
    pub level: WakeLevel,
    pub pull_up: bool,
}

impl WakeSource {
    /// Active-low button with the internal pull-up enabled.
    pub const fn button(gpio: u8) -> Self {
        Self {
            gpio,
            level: WakeLevel::Low,
            pull_up: true,
        }
    }
}

pub trait Power {
    type Error: core::fmt::Debug;

    /// Remaining charge in percent.
    fn battery_level(&mut self) -> Result<i16, Self::Error>;
    fn arm_wake(&mut self, source: WakeSource) -> Result<(), Self::Error>;
    /// Powers down until the armed source fires. Execution restarts at reset.
    fn deep_sleep(&mut self) -> !;
}

/// Linear LiPo discharge curve between `empty_mv` and `full_mv`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BatteryCurve {
    pub empty_mv: u32,
    pub full_mv: u32,
}

impl Default for BatteryCurve {
    fn default() -> Self {
        Self {
            empty_mv: 3300,
            full_mv: 4150,
        }
    }
}

impl BatteryCurve {
    pub fn percent(&self, millivolts: u32) -> i16 {
        if millivolts <= self.empty_mv {
            return 0;
        }
        if millivolts >= self.full_mv || self.full_mv <= self.empty_mv {
            return 100;
        }

        let span = self.full_mv - self.empty_mv;
        ((millivolts - self.empty_mv) * 100 / span) as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_clamps_outside_range() {
        let curve = BatteryCurve::default();
        assert_eq!(curve.percent(3000), 0);
        assert_eq!(curve.percent(3300), 0);
        assert_eq!(curve.percent(4150), 100);
        assert_eq!(curve.percent(4400), 100);
    }

    #[test]
    fn curve_is_linear_inside_range() {
        let curve = BatteryCurve::default();
        assert_eq!(curve.percent(3725), 50);
        assert_eq!(curve.percent(3385), 10);
    }
}
