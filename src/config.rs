use core::convert::Infallible;
use embedded_hal::digital::{ErrorType, OutputPin, PinState};
use embassy_time::Duration;

use crate::module_timing::default_uart_inactivity;

pub struct NoPin;

impl ErrorType for NoPin {
    type Error = core::convert::Infallible;
}

impl OutputPin for NoPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Wrapper inverting the polarity of a DTR pin, for boards where the wake
/// line is wired active-low.
pub struct ReverseOutputPin<P: OutputPin<Error = Infallible>>(pub P);

impl<P: OutputPin<Error = Infallible>> ErrorType for ReverseOutputPin<P> {
    type Error = Infallible;
}

impl<P: OutputPin<Error = Infallible>> OutputPin for ReverseOutputPin<P> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }

    fn set_state(&mut self, state: PinState) -> Result<(), Self::Error> {
        match state {
            PinState::Low => self.0.set_state(PinState::High),
            PinState::High => self.0.set_state(PinState::Low),
        }
    }
}

/// Board-level configuration for the serial modem transport.
pub trait ModemConfig {
    type DtrPin: OutputPin;

    /// Whether the DTR/UART wake line is managed automatically from RI and
    /// inactivity, starting at init.
    const AUTOMATIC_UART: bool = false;

    /// Inactivity window after which an automatically enabled wake line is
    /// dropped again.
    fn uart_inactivity(&self) -> Duration {
        default_uart_inactivity()
    }

    fn dtr_pin(&mut self) -> Option<&mut Self::DtrPin>;

    /// Catch-all receiver for notification lines, registered at init and
    /// invoked ahead of the filtered monitors for every dispatched line.
    fn notification_handler(&self) -> Option<fn(&str)> {
        None
    }
}
