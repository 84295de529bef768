//! The actuator layer owns the physical bus: the table of boards, the table of logical devices (one per channel),
//! and every transaction that goes out on the wire.
//!
//! Callers address channels only by [`DeviceId`]. Writes are buffered per board and marked dirty; nothing touches
//! the bus until [`Actuators::flush`], which issues at most one transaction per dirty board. That way every change a
//! control-loop tick makes to one board goes out together.
//!
//! Bus failures never escape as errors from the per-tick operations. They are logged with their decoded reason and
//! the operation is dropped, so one flaky board can't stall actuation of the others. Boards that fail their probe
//! are marked invalid and skipped until [`Actuators::reset_board`] brings them back.

pub mod board;
pub mod chip;
pub mod error;
pub mod mux;

#[cfg(test)]
pub(crate) mod fake;

pub use board::{Board, BoardLocation, MuxSegment};
pub use chip::ChipFamily;
pub use error::{BeginError, BusError, DecodeError, DeviceError};

use chip::ads1115;
use embedded_hal::i2c::I2c;
use tinyvec::ArrayVec;

/// Bus clock for high-speed mode. The HAL applies it when constructing the bus handed to [`Actuators::new`].
pub const BUS_CLOCK_HZ: u32 = 800_000;

/// Most analog channels any supported board carries.
pub const MAX_ANALOG_PER_BOARD: usize = 8;

/// Capacity of the board table.
pub const MAX_BOARDS: usize = 32;

/// Capacity of the logical device table.
pub const MAX_DEVICES: usize = 256;

/// Stable handle for one channel on one board, assigned densely in board order when the tables are built.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceId(pub u16);

/// Position of a board in the configuration table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BoardId(pub u8);

/// What a logical device does.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Capability {
    /// A DAC channel.
    #[default]
    AnalogOut,
    /// An ADC channel, with the input multiplexer code that selects it.
    AnalogIn(ads1115::InputMux),
    /// A digital output line.
    DigitalOut,
}

/// A logical device entry: which board, which channel on it, and what it can do.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Device {
    board: u8,
    channel: u8,
    capability: Capability,
}

/// The seam through which voices drive their channels.
///
/// [`Actuators`] is the real implementation; tests substitute their own.
pub trait AnalogOutput {
    /// Buffers `value` for the analog output `device`.
    fn set_analog_out(&mut self, device: DeviceId, value: u16) -> Result<(), DeviceError>;

    /// Sends everything buffered since the last flush. Returns the number of boards whose write failed.
    fn flush(&mut self) -> usize;
}

/// The actuator abstraction layer: board table, device table and the bus they sit on.
pub struct Actuators<B> {
    bus: B,
    boards: ArrayVec<[Board; MAX_BOARDS]>,
    devices: ArrayVec<[Device; MAX_DEVICES]>,
    awaiting_conversion: Option<DeviceId>,
    on_sample: Option<fn(i16)>,
}

impl<B> Actuators<B>
where
    B: I2c,
    B::Error: DecodeError,
{
    /// Constructs an [`Actuators`] with empty tables. Call [`begin`](Self::begin) before using it.
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            boards: ArrayVec::new(),
            devices: ArrayVec::new(),
            awaiting_conversion: None,
            on_sample: None,
        }
    }

    /// Gives the bus back.
    pub fn release(self) -> B {
        self.bus
    }

    /// Builds the board and device tables from `table`, then probes and initializes the hardware.
    ///
    /// Entries after a [`BoardLocation::END`] are ignored. On success returns the number of unreachable boards:
    /// zero means fully healthy, anything more means degraded (those boards are skipped). An empty table is refused
    /// before any bus traffic happens.
    pub fn begin(&mut self, table: &[BoardLocation]) -> Result<usize, BeginError> {
        self.build_tables(table)?;
        info!(
            "[i2c] {} boards, {} logical devices",
            self.boards.len(),
            self.devices.len()
        );

        // every multiplexer must answer, otherwise nothing behind it can be addressed safely
        let mut probed_clusters = 0_u8;
        for board in self.boards.iter() {
            let Some(segment) = board.location().mux else {
                continue;
            };
            if probed_clusters & (1 << segment.cluster) != 0 {
                continue;
            }
            probed_clusters |= 1 << segment.cluster;
            mux::deselect(&mut self.bus, segment.cluster).map_err(|error| {
                BeginError::MuxUnreachable {
                    cluster: segment.cluster,
                    error,
                }
            })?;
        }

        let mut unreachable = 0;
        for index in 0..self.boards.len() {
            let board = BoardId(index as u8);
            if self.probe(board) {
                self.init_board(board);
            } else {
                let location = self.boards[index].location();
                warn!(
                    "[i2c] unable to reach board {} at {=u8:#x} (mux {}): {}",
                    index,
                    location.address,
                    location.mux,
                    location.name
                );
                unreachable += 1;
            }
        }
        Ok(unreachable)
    }

    fn build_tables(&mut self, table: &[BoardLocation]) -> Result<(), BeginError> {
        self.boards.clear();
        self.devices.clear();
        self.awaiting_conversion = None;

        for (index, location) in table.iter().take_while(|l| !l.is_end()).enumerate() {
            let board = Board::new(*location).ok_or(BeginError::UnsupportedBoard { index })?;
            if self.boards.try_push(board).is_some()
                || self.devices.len() + location.channel_count() > MAX_DEVICES
            {
                return Err(BeginError::CapacityExceeded);
            }

            let board = index as u8;
            let channels = (0..location.analog_out)
                .map(|channel| (channel, Capability::AnalogOut))
                .chain((0..location.analog_in).map(|channel| {
                    (channel, Capability::AnalogIn(board::input_mux(channel)))
                }))
                .chain((0..location.digital_out).map(|channel| (channel, Capability::DigitalOut)));
            for (channel, capability) in channels {
                self.devices.push(Device {
                    board,
                    channel,
                    capability,
                });
            }
        }

        if self.boards.is_empty() {
            return Err(BeginError::ConfigurationEmpty);
        }
        Ok(())
    }

    /// Address-only probe of `board` through its segment; updates and returns its validity.
    fn probe(&mut self, board: BoardId) -> bool {
        let Some(entry) = self.boards.get_mut(usize::from(board.0)) else {
            return false;
        };
        let location = *entry.location();
        let result = mux::with_segment(&mut self.bus, location.mux, |bus| {
            bus.write(location.address, &[])
        });
        if let Err(error) = result {
            debug!(
                "[i2c] probe of {=u8:#x} failed: {}",
                location.address,
                error.reason()
            );
        }
        entry.set_valid(result.is_ok());
        result.is_ok()
    }

    fn init_board(&mut self, board: BoardId) {
        let Some(entry) = self.boards.get(usize::from(board.0)) else {
            return;
        };
        let location = *entry.location();
        let sequence = entry.family().init_sequence();
        let result = mux::with_segment(&mut self.bus, location.mux, |bus| {
            sequence
                .iter()
                .try_for_each(|frame| bus.write(location.address, frame))
        });
        match result {
            Ok(()) => debug!("[i2c] initialized {}", location.name),
            Err(error) => error!(
                "[i2c] initializing {} at {=u8:#x} failed: {}",
                location.name,
                location.address,
                error.reason()
            ),
        }
        if entry.family() == ChipFamily::Ads1115 {
            self.awaiting_conversion = None;
        }
    }

    /// Re-probes `board` through its segment and records the outcome. Returns the board's new validity.
    pub fn validate_board(&mut self, board: BoardId) -> Result<bool, DeviceError> {
        if usize::from(board.0) >= self.boards.len() {
            return Err(DeviceError::InvalidBoard(board));
        }
        Ok(self.probe(board))
    }

    /// Probes `board` and, if it answers, runs its family's init sequence again. This is how an invalid board is
    /// returned to service. Returns the board's new validity.
    pub fn reset_board(&mut self, board: BoardId) -> Result<bool, DeviceError> {
        let valid = self.validate_board(board)?;
        if valid {
            self.init_board(board);
        }
        Ok(valid)
    }

    fn device(&self, device: DeviceId) -> Result<Device, DeviceError> {
        self.devices
            .get(usize::from(device.0))
            .copied()
            .ok_or(DeviceError::InvalidDevice(device))
    }

    /// Buffers a DAC code for `device` and marks its channel dirty; nothing is sent until [`flush`](Self::flush).
    ///
    /// Writes to invalid boards are dropped silently.
    pub fn set_analog_out(&mut self, device: DeviceId, value: u16) -> Result<(), DeviceError> {
        let entry = self.device(device)?;
        if entry.capability != Capability::AnalogOut {
            return Err(DeviceError::WrongCapability(device));
        }
        let board = &mut self.boards[usize::from(entry.board)];
        if board.is_valid() {
            board.set_analog(entry.channel, value);
        }
        Ok(())
    }

    /// Buffers a level for digital output `device` and marks its line dirty; nothing is sent until
    /// [`flush`](Self::flush).
    ///
    /// Writes to invalid boards are dropped silently.
    pub fn set_digital_out(&mut self, device: DeviceId, value: bool) -> Result<(), DeviceError> {
        let entry = self.device(device)?;
        if entry.capability != Capability::DigitalOut {
            return Err(DeviceError::WrongCapability(device));
        }
        let board = &mut self.boards[usize::from(entry.board)];
        if board.is_valid() {
            board.set_digital(entry.channel, value);
        }
        Ok(())
    }

    /// Sends every board's pending changes, one transaction per dirty board, in the family's wire format.
    ///
    /// Dirty masks are cleared whether or not the write succeeds; failed writes are logged, not retried. Returns the
    /// number of boards whose write failed.
    pub fn flush(&mut self) -> usize {
        let mut failures = 0;
        let mut frame = [0_u8; board::MAX_FRAME];
        for board in self.boards.iter_mut().filter(|b| b.dirty() != 0) {
            let len = board.encode_pending(&mut frame);
            let location = *board.location();
            if board.is_valid() && len > 0 {
                trace!(
                    "[i2c] {} write {=[u8]:#x}",
                    location.name,
                    frame[..len]
                );
                let result = mux::with_segment(&mut self.bus, location.mux, |bus| {
                    bus.write(location.address, &frame[..len])
                });
                if let Err(error) = result {
                    error!(
                        "[i2c] writing {} at {=u8:#x} failed: {}",
                        location.name,
                        location.address,
                        error.reason()
                    );
                    failures += 1;
                }
            }
            board.clear_dirty();
        }
        failures
    }

    /// Starts a single-shot conversion on analog input `device` and remembers it as awaiting conversion.
    ///
    /// Does nothing if the device's board is invalid or the start command fails (the failure is logged).
    pub fn start_conversion(&mut self, device: DeviceId) -> Result<(), DeviceError> {
        let entry = self.device(device)?;
        let Capability::AnalogIn(mux) = entry.capability else {
            return Err(DeviceError::WrongCapability(device));
        };
        let board = &self.boards[usize::from(entry.board)];
        if !board.is_valid() {
            return Ok(());
        }
        let location = *board.location();
        let command = ads1115::encode_config(&ads1115::Config::start_single(mux));
        match mux::with_segment(&mut self.bus, location.mux, |bus| {
            bus.write(location.address, &command)
        }) {
            Ok(()) => self.awaiting_conversion = Some(device),
            Err(error) => error!(
                "[adc] starting conversion on device {} failed: {}",
                device.0,
                error.reason()
            ),
        }
        Ok(())
    }

    /// Checks on the conversion started by [`start_conversion`](Self::start_conversion). Never blocks; call it every
    /// tick.
    ///
    /// Nothing is read while the ADC's board is invalid. When the ADC reports it is no longer busy, reads the result, hands it to the sample callback (if one is set),
    /// returns it, and stops waiting. Otherwise returns `None`.
    pub fn poll(&mut self) -> Option<i16> {
        let device = self.awaiting_conversion?;
        let entry = self.device(device).ok()?;
        let board = &self.boards[usize::from(entry.board)];
        if !board.is_valid() {
            return None;
        }
        let location = *board.location();

        let result = mux::with_segment(&mut self.bus, location.mux, |bus| {
            let mut register = [0_u8; 2];
            bus.write_read(
                location.address,
                &[ads1115::CONFIG_REGISTER],
                &mut register,
            )?;
            if !ads1115::is_idle(u16::from_be_bytes(register)) {
                return Ok(None);
            }
            bus.write_read(
                location.address,
                &[ads1115::CONVERSION_REGISTER],
                &mut register,
            )?;
            Ok(Some(i16::from_be_bytes(register)))
        });

        match result {
            Ok(Some(sample)) => {
                self.awaiting_conversion = None;
                trace!("[adc] device {} sampled {}", device.0, sample);
                if let Some(on_sample) = self.on_sample {
                    on_sample(sample);
                }
                Some(sample)
            }
            Ok(None) => None,
            Err(error) => {
                error!(
                    "[adc] polling device {} failed: {}",
                    device.0,
                    error.reason()
                );
                None
            }
        }
    }

    /// Registers the function [`poll`](Self::poll) calls with each completed raw sample.
    pub fn set_sample_callback(&mut self, on_sample: fn(i16)) {
        self.on_sample = Some(on_sample);
    }

    /// Returns `true` if `device` exists and its board answered its last probe.
    pub fn is_port_valid(&self, device: DeviceId) -> bool {
        self.device(device)
            .is_ok_and(|entry| self.boards[usize::from(entry.board)].is_valid())
    }

    /// Returns `true` if `device` is an analog input on a valid board.
    pub fn is_analog_in(&self, device: DeviceId) -> bool {
        self.is_port_valid(device)
            && matches!(
                self.device(device).map(|d| d.capability),
                Ok(Capability::AnalogIn(_))
            )
    }

    /// Returns `true` if `device` is an analog output on a valid board.
    pub fn is_analog_out(&self, device: DeviceId) -> bool {
        self.is_port_valid(device)
            && self.device(device).map(|d| d.capability) == Ok(Capability::AnalogOut)
    }

    /// Returns `true` if `device` is a digital output on a valid board.
    pub fn is_digital_out(&self, device: DeviceId) -> bool {
        self.is_port_valid(device)
            && self.device(device).map(|d| d.capability) == Ok(Capability::DigitalOut)
    }

    /// Getter.
    pub fn board(&self, board: BoardId) -> Option<&Board> {
        self.boards.get(usize::from(board.0))
    }

    /// Number of boards in the table.
    pub fn board_count(&self) -> usize {
        self.boards.len()
    }

    /// Number of logical devices in the table.
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

impl<B> AnalogOutput for Actuators<B>
where
    B: I2c,
    B::Error: DecodeError,
{
    fn set_analog_out(&mut self, device: DeviceId, value: u16) -> Result<(), DeviceError> {
        Actuators::set_analog_out(self, device, value)
    }

    fn flush(&mut self) -> usize {
        Actuators::flush(self)
    }
}
