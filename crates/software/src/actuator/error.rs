//! Bus failures, configuration failures and misuse of device handles.

use super::{BoardId, DeviceId};
use core::fmt;
use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

/// Why a single bus transaction failed.
///
/// Bus errors are always recovered locally: they're logged with their [`reason`](Self::reason) and the
/// operation that hit them is abandoned. A flaky board must never stop actuation of the healthy ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// More data than fits the transmit buffer.
    BufferOverflow,
    /// Nobody acknowledged the address; usually an absent or unpowered board.
    AddressNack,
    /// The board acknowledged its address but refused a data byte.
    DataNack,
    /// The transaction didn't complete within the bus timeout.
    Timeout,
    /// Anything else: arbitration loss, bus errors, HAL-specific failures.
    Other,
}

impl BusError {
    /// A human-readable explanation, suitable for logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::BufferOverflow => "data too long to fit in transmit buffer",
            Self::AddressNack => "received NACK on transmit of address",
            Self::DataNack => "received NACK on transmit of data",
            Self::Timeout => "timeout",
            Self::Other => "other error",
        }
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Translates a HAL's I2C error into a [`BusError`].
///
/// [`ErrorKind`] has no notion of a timeout, so a HAL which can tell a bus timeout apart from other failures
/// should wrap its error type and implement this trait on the wrapper.
pub trait DecodeError {
    /// Returns the [`BusError`] this error represents.
    fn decode(&self) -> BusError;
}

impl DecodeError for ErrorKind {
    fn decode(&self) -> BusError {
        match self {
            ErrorKind::Overrun => BusError::BufferOverflow,
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address) => BusError::AddressNack,
            ErrorKind::NoAcknowledge(_) => BusError::DataNack,
            _ => BusError::Other,
        }
    }
}

/// Reasons [`Actuators::begin`][super::Actuators::begin] could not bring up the bus at all.
///
/// Any of these means total failure: no board will be driven. The caller decides whether to carry on without
/// actuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BeginError {
    /// The configuration table didn't name a single board.
    ConfigurationEmpty,
    /// The configuration table describes more boards or channels than the tables can hold.
    CapacityExceeded,
    /// The board at this table position has a channel layout that matches no supported chip.
    UnsupportedBoard {
        /// Position of the offending entry in the configuration table.
        index: usize,
    },
    /// A bus multiplexer didn't respond, so nothing behind it can be addressed safely.
    MuxUnreachable {
        /// Multiplexer cluster which failed.
        cluster: u8,
        /// What went wrong.
        error: BusError,
    },
}

impl fmt::Display for BeginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigurationEmpty => f.write_str("no boards configured"),
            Self::CapacityExceeded => f.write_str("too many boards or channels configured"),
            Self::UnsupportedBoard { index } => {
                write!(f, "board {index} matches no supported chip family")
            }
            Self::MuxUnreachable { cluster, error } => {
                write!(f, "multiplexer cluster {cluster} unreachable: {error}")
            }
        }
    }
}

/// Programming errors caught at the boundary of the actuator layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceError {
    /// No logical device has this handle.
    InvalidDevice(DeviceId),
    /// No board has this handle.
    InvalidBoard(BoardId),
    /// The device exists but can't do what was asked, e.g. an analog write to a digital output.
    WrongCapability(DeviceId),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDevice(device) => write!(f, "no logical device {}", device.0),
            Self::InvalidBoard(board) => write!(f, "no board {}", board.0),
            Self::WrongCapability(device) => {
                write!(f, "logical device {} doesn't support that operation", device.0)
            }
        }
    }
}
