//! The board's I2C peripheral, wrapped so its errors can be decoded by the actuator layer.

use embassy_stm32::{
    i2c::{self, I2c},
    mode::Blocking,
};
use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};
use voltaic_lib::actuator::{BusError, DecodeError};

/// A blocking I2C bus. Every transaction is bounded by the peripheral's own timeout.
pub struct Twi(I2c<'static, Blocking, i2c::Master>);

impl Twi {
    /// Constructs a new [`Twi`].
    pub fn new(i2c: I2c<'static, Blocking, i2c::Master>) -> Self {
        Self(i2c)
    }
}

/// An error from the I2C peripheral.
#[derive(Debug)]
pub struct TwiError(i2c::Error);

impl embedded_hal::i2c::Error for TwiError {
    fn kind(&self) -> ErrorKind {
        self.0.kind()
    }
}

impl DecodeError for TwiError {
    fn decode(&self) -> BusError {
        match self.0 {
            i2c::Error::Timeout => BusError::Timeout,
            i2c::Error::Overrun => BusError::BufferOverflow,
            // the peripheral doesn't report which byte went unacknowledged
            i2c::Error::Nack => BusError::AddressNack,
            _ => BusError::Other,
        }
    }
}

impl ErrorType for Twi {
    type Error = TwiError;
}

impl embedded_hal::i2c::I2c for Twi {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        embedded_hal::i2c::I2c::transaction(&mut self.0, address, operations).map_err(TwiError)
    }
}
