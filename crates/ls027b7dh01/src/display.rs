//! Panel driver: one chip-select window per frame, VCOM toggled in software.

use embedded_hal::{delay::DelayNs, digital::OutputPin, spi::SpiBus};
use wakeclock_core::render::{Canvas, Display};

use crate::protocol::{
    CMD_CLEAR, CMD_WRITE, HEIGHT, LINE_BYTES, WIDTH, command_byte, encode_line_address,
};

const CS_SETUP_NS: u32 = 3_000;
const CS_HOLD_NS: u32 = 1_000;
const CLEAR_HOLD_NS: u32 = 220_000;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DisplayError<SpiErr, DispErr, EmdErr, CsErr> {
    Spi(SpiErr),
    Disp(DispErr),
    Emd(EmdErr),
    Cs(CsErr),
    /// Canvas does not match the panel resolution.
    Geometry,
    Protocol,
}

pub type SharpDisplayResult<SpiErr, DispErr, EmdErr, CsErr> =
    Result<(), DisplayError<SpiErr, DispErr, EmdErr, CsErr>>;

/// LS027B7DH01 memory LCD on a bare SPI bus with a GPIO chip select.
///
/// VCOM is toggled in software on every transaction (EMD held low).
#[derive(Debug)]
pub struct SharpDisplay<SPI, DISP, EMD, CS, DL> {
    spi: SPI,
    disp: DISP,
    emd: EMD,
    cs: CS,
    delay: DL,
    vcom_high: bool,
    inverted: bool,
}

impl<SPI, DISP, EMD, CS, DL> SharpDisplay<SPI, DISP, EMD, CS, DL>
where
    SPI: SpiBus<u8>,
    DISP: OutputPin,
    EMD: OutputPin,
    CS: OutputPin,
    DL: DelayNs,
{
    pub fn new(spi: SPI, disp: DISP, emd: EMD, cs: CS, delay: DL) -> Self {
        Self {
            spi,
            disp,
            emd,
            cs,
            delay,
            vcom_high: false,
            inverted: false,
        }
    }

    /// Puts the panel in serial VCOM mode and enables display output.
    pub fn initialize(&mut self) -> SharpDisplayResult<SPI::Error, DISP::Error, EMD::Error, CS::Error> {
        self.disp.set_high().map_err(DisplayError::Disp)?;
        self.emd.set_low().map_err(DisplayError::Emd)?;
        self.cs.set_low().map_err(DisplayError::Cs)?;

        self.delay.delay_us(60);
        Ok(())
    }

    /// Blanks the panel memory.
    pub fn clear_all(&mut self) -> SharpDisplayResult<SPI::Error, DISP::Error, EMD::Error, CS::Error> {
        self.transaction(CLEAR_HOLD_NS, |spi, vcom_high| {
            spi.write(&[command_byte(CMD_CLEAR, vcom_high), 0x00, 0x00])
                .map_err(DisplayError::Spi)
        })
    }

    /// Writes every line of `canvas` in a single CS-high transaction.
    pub fn flush_canvas(
        &mut self,
        canvas: &Canvas,
    ) -> SharpDisplayResult<SPI::Error, DISP::Error, EMD::Error, CS::Error> {
        if canvas.width() != WIDTH || canvas.height() != HEIGHT {
            return Err(DisplayError::Geometry);
        }

        let mask = if self.inverted { 0xFF } else { 0x00 };
        self.transaction(CS_HOLD_NS, |spi, vcom_high| {
            spi.write(&[command_byte(CMD_WRITE, vcom_high)])
                .map_err(DisplayError::Spi)?;

            // Each line: address, 50 data bytes, dummy byte.
            let mut line = [0u8; LINE_BYTES + 2];
            for (index, row) in canvas.rows().enumerate() {
                line[0] = encode_line_address(index as u16 + 1).ok_or(DisplayError::Protocol)?;
                for (dst, src) in line[1..=LINE_BYTES].iter_mut().zip(row) {
                    *dst = src ^ mask;
                }
                spi.write(&line).map_err(DisplayError::Spi)?;
            }

            // Closing dummy byte of the frame.
            spi.write(&[0x00]).map_err(DisplayError::Spi)
        })
    }

    /// Runs `body` with CS raised and a fresh VCOM polarity, then drains the
    /// bus and drops CS after `hold_ns`.
    fn transaction<F>(
        &mut self,
        hold_ns: u32,
        body: F,
    ) -> SharpDisplayResult<SPI::Error, DISP::Error, EMD::Error, CS::Error>
    where
        F: FnOnce(&mut SPI, bool) -> SharpDisplayResult<SPI::Error, DISP::Error, EMD::Error, CS::Error>,
    {
        self.vcom_high = !self.vcom_high;
        self.cs.set_high().map_err(DisplayError::Cs)?;
        self.delay.delay_ns(CS_SETUP_NS);

        let result = body(&mut self.spi, self.vcom_high)
            .and_then(|()| self.spi.flush().map_err(DisplayError::Spi));

        self.delay.delay_ns(hold_ns);
        self.cs.set_low().map_err(DisplayError::Cs)?;
        result
    }
}

impl<SPI, DISP, EMD, CS, DL> Display for SharpDisplay<SPI, DISP, EMD, CS, DL>
where
    SPI: SpiBus<u8>,
    DISP: OutputPin,
    EMD: OutputPin,
    CS: OutputPin,
    DL: DelayNs,
{
    type Error = DisplayError<SPI::Error, DISP::Error, EMD::Error, CS::Error>;

    fn size(&self) -> (usize, usize) {
        (WIDTH, HEIGHT)
    }

    fn set_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }

    fn present(&mut self, canvas: &Canvas) -> Result<(), Self::Error> {
        self.flush_canvas(canvas)
    }
}


#[cfg(test)]
mod tests {
    use std::{cell::RefCell, convert::Infallible, rc::Rc};

    use embedded_hal::{digital, spi};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        CsHigh,
        CsLow,
        Write(Vec<u8>),
    }

    type Log = Rc<RefCell<Vec<Event>>>;

    struct Bus(Log);

    impl spi::ErrorType for Bus {
        type Error = Infallible;
    }

    impl SpiBus<u8> for Bus {
        fn read(&mut self, words: &mut [u8]) -> Result<(), Infallible> {
            words.fill(0);
            Ok(())
        }

        fn write(&mut self, words: &[u8]) -> Result<(), Infallible> {
            self.0.borrow_mut().push(Event::Write(words.to_vec()));
            Ok(())
        }

        fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Infallible> {
            read.fill(0);
            self.write(write)
        }

        fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Infallible> {
            self.write(words)
        }

        fn flush(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
    }

    /// Records chip-select edges; other pins pass `None`.
    struct Pin(Option<Log>);

    impl digital::ErrorType for Pin {
        type Error = Infallible;
    }

    impl OutputPin for Pin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            if let Some(log) = &self.0 {
                log.borrow_mut().push(Event::CsLow);
            }
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            if let Some(log) = &self.0 {
                log.borrow_mut().push(Event::CsHigh);
            }
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn panel() -> (SharpDisplay<Bus, Pin, Pin, Pin, NoDelay>, Log) {
        let log = Log::default();
        let display = SharpDisplay::new(
            Bus(log.clone()),
            Pin(None),
            Pin(None),
            Pin(Some(log.clone())),
            NoDelay,
        );
        (display, log)
    }

    fn pattern() -> Canvas {
        let mut canvas = Canvas::new(WIDTH, HEIGHT);
        for y in 0..HEIGHT {
            canvas.set_pixel((y * 7) % WIDTH, y, true);
        }
        canvas
    }

    /// Bytes clocked out between each CS rise and fall.
    fn windows(log: &Log) -> Vec<Vec<u8>> {
        let mut windows = Vec::new();
        let mut open: Option<Vec<u8>> = None;
        for event in log.borrow().iter() {
            match event {
                Event::CsHigh => open = Some(Vec::new()),
                Event::CsLow => windows.extend(open.take()),
                Event::Write(bytes) => {
                    open.as_mut().expect("write outside CS window").extend(bytes)
                }
            }
        }
        windows
    }

    fn expected_frame(canvas: &Canvas, command: u8, mask: u8) -> Vec<u8> {
        let mut frame = vec![command];
        for (index, row) in canvas.rows().enumerate() {
            frame.push(encode_line_address(index as u16 + 1).unwrap());
            frame.extend(row.iter().map(|byte| byte ^ mask));
            frame.push(0x00);
        }
        frame.push(0x00);
        frame
    }

    #[test]
    fn present_sends_the_whole_frame_in_one_window() {
        let (mut display, log) = panel();
        let canvas = pattern();

        display.present(&canvas).unwrap();

        let windows = windows(&log);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].len(), 1 + HEIGHT * (LINE_BYTES + 2) + 1);
        assert_eq!(windows[0], expected_frame(&canvas, 0xC0, 0x00));
    }

    #[test]
    fn vcom_alternates_between_frames() {
        let (mut display, log) = panel();
        let canvas = pattern();

        display.present(&canvas).unwrap();
        display.present(&canvas).unwrap();

        let windows = windows(&log);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0][0], 0xC0);
        assert_eq!(windows[1][0], 0x80);
    }

    #[test]
    fn inversion_is_applied_to_line_data() {
        let (mut display, log) = panel();
        let canvas = pattern();

        display.set_inverted(true);
        display.present(&canvas).unwrap();

        assert_eq!(windows(&log), [expected_frame(&canvas, 0xC0, 0xFF)]);
        assert_eq!(canvas.pixel(0, 0), Some(true));
    }

    #[test]
    fn clear_is_a_single_short_window() {
        let (mut display, log) = panel();

        display.clear_all().unwrap();

        assert_eq!(windows(&log), [vec![0x60, 0x00, 0x00]]);
    }

    #[test]
    fn mismatched_canvas_is_rejected_without_touching_the_bus() {
        let (mut display, log) = panel();

        assert_eq!(
            display.present(&Canvas::new(WIDTH, HEIGHT - 1)),
            Err(DisplayError::Geometry)
        );
        assert!(log.borrow().is_empty());
    }
}
