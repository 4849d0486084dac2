//! Shared fixtures for the inline test modules.

use core::convert::Infallible;
use std::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

use embassy_time::Duration;
use embedded_hal::digital::{ErrorType as PinErrorType, OutputPin};
use embedded_io_async::{Error as IoError, ErrorKind, ErrorType, Write};

use crate::config::{ModemConfig, NoPin};
use crate::resources::Resources;

pub type TestResources<W> = Resources<W, 128, 4, 4>;

/// Capture buffer shared between the test body and the writer handed to the
/// transport.
#[derive(Clone, Default)]
pub struct SharedBuf {
    data: Rc<RefCell<Vec<u8>>>,
}

impl SharedBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writer(&self) -> BufWriter {
        BufWriter { buf: self.clone() }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.borrow().clone()
    }

    pub fn clear(&self) {
        self.data.borrow_mut().clear();
    }

    /// Number of times `needle` occurs in the captured transmit stream.
    pub fn count_occurrences(&self, needle: &[u8]) -> usize {
        let data = self.data.borrow();
        if needle.is_empty() {
            return 0;
        }
        data.windows(needle.len()).filter(|w| w == &needle).count()
    }
}

pub struct BufWriter {
    buf: SharedBuf,
}

impl ErrorType for BufWriter {
    type Error = Infallible;
}

impl Write for BufWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.buf.data.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
}

/// Writer whose every operation fails.
pub struct FailWriter;

#[derive(Debug)]
pub struct FailError;

impl IoError for FailError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl ErrorType for FailWriter {
    type Error = FailError;
}

impl Write for FailWriter {
    async fn write(&mut self, _buf: &[u8]) -> Result<usize, Self::Error> {
        Err(FailError)
    }
}

/// Config without a DTR pin and with automatic handling off.
#[derive(Default)]
pub struct TestConfig;

impl ModemConfig for TestConfig {
    type DtrPin = NoPin;

    fn dtr_pin(&mut self) -> Option<&mut Self::DtrPin> {
        None
    }
}

/// Observable stand-in for the DTR output pin.
#[derive(Clone, Default)]
pub struct PinProbe {
    state: Rc<RefCell<Option<bool>>>,
}

impl PinProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pin(&self) -> ProbePin {
        ProbePin {
            probe: self.clone(),
        }
    }

    /// Last driven level, if the pin was driven at all.
    pub fn level(&self) -> Option<bool> {
        *self.state.borrow()
    }
}

pub struct ProbePin {
    probe: PinProbe,
}

impl PinErrorType for ProbePin {
    type Error = Infallible;
}

impl OutputPin for ProbePin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        *self.probe.state.borrow_mut() = Some(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        *self.probe.state.borrow_mut() = Some(true);
        Ok(())
    }
}

/// Config driving a [`PinProbe`] with automatic DTR/UART handling enabled.
pub struct AutoUartConfig {
    pin: ProbePin,
    pub inactivity: Duration,
}

impl AutoUartConfig {
    pub fn new(probe: &PinProbe, inactivity: Duration) -> Self {
        Self {
            pin: probe.pin(),
            inactivity,
        }
    }
}

impl ModemConfig for AutoUartConfig {
    type DtrPin = ProbePin;

    const AUTOMATIC_UART: bool = true;

    fn uart_inactivity(&self) -> Duration {
        self.inactivity
    }

    fn dtr_pin(&mut self) -> Option<&mut Self::DtrPin> {
        Some(&mut self.pin)
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
