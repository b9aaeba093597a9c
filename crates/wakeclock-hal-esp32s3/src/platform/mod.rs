pub mod battery;
pub mod rtc_clock;
