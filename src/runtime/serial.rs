//! Adapters onto the generic non-blocking serial traits.
//!
//! Lets the transceiver slot into code written against
//! `embedded_hal_nb::serial`. Reads are the polling-consumption path, so
//! they only yield data on a [`UartRx`] opened without a delivery
//! callback; writes map the partial-accept queue onto `WouldBlock`.

use core::convert::Infallible;

use embedded_hal_nb::serial::{ErrorType, Read, Write};

use super::{UartRx, UartTx};

impl ErrorType for UartRx {
    type Error = Infallible;
}

impl Read<u8> for UartRx {
    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        self.try_read().ok_or(nb::Error::WouldBlock)
    }
}

impl ErrorType for UartTx {
    type Error = Infallible;
}

impl Write<u8> for UartTx {
    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        if UartTx::write(self, &[word]) == 1 {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        if self.pending() == 0 {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}
