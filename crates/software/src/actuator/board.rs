//! Boards: where they sit on the bus, and the output they have buffered but not yet sent.

use super::{
    MAX_ANALOG_PER_BOARD,
    chip::{ChipFamily, ads1115, mcp4728, mcp47feb, pcf857x},
    mux,
};

/// Longest frame any family writes during a flush.
pub const MAX_FRAME: usize = mcp47feb::MAX_FRAME;

/// One sub-bus of a TCA9548A-style bus multiplexer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MuxSegment {
    /// Which multiplexer, 0 through 7; the multiplexer answers at `0x70 + cluster`.
    pub cluster: u8,
    /// Which of its eight downstream buses, 0 through 7.
    pub slice: u8,
}

impl MuxSegment {
    /// Returns `true` if a TCA9548A can address this segment: cluster and slice both 0 through 7.
    pub fn is_addressable(&self) -> bool {
        self.cluster < mux::CLUSTERS && self.slice < mux::SLICES
    }
}

/// Where a board lives on the bus and what it carries: one entry of the bus configuration table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BoardLocation {
    /// The multiplexer segment in front of the board, or `None` if it sits on the main bus.
    pub mux: Option<MuxSegment>,
    /// 7-bit bus address.
    pub address: u8,
    /// Number of analog output channels.
    pub analog_out: u8,
    /// Number of analog input channels.
    pub analog_in: u8,
    /// Number of digital output lines.
    pub digital_out: u8,
    /// Diagnostic name.
    pub name: &'static str,
}

impl BoardLocation {
    /// Terminates a configuration table early; entries after it are ignored.
    pub const END: Self = Self {
        mux: None,
        address: 0xFF,
        analog_out: 0,
        analog_in: 0,
        digital_out: 0,
        name: "",
    };

    /// A DAC board with `channels` analog outputs.
    pub const fn analog_out(
        mux: Option<MuxSegment>,
        address: u8,
        channels: u8,
        name: &'static str,
    ) -> Self {
        Self {
            mux,
            address,
            analog_out: channels,
            analog_in: 0,
            digital_out: 0,
            name,
        }
    }

    /// An ADC board with `channels` analog inputs.
    pub const fn analog_in(
        mux: Option<MuxSegment>,
        address: u8,
        channels: u8,
        name: &'static str,
    ) -> Self {
        Self {
            mux,
            address,
            analog_out: 0,
            analog_in: channels,
            digital_out: 0,
            name,
        }
    }

    /// An I/O expander with `lines` digital outputs.
    pub const fn digital_out(
        mux: Option<MuxSegment>,
        address: u8,
        lines: u8,
        name: &'static str,
    ) -> Self {
        Self {
            mux,
            address,
            analog_out: 0,
            analog_in: 0,
            digital_out: lines,
            name,
        }
    }

    /// Returns `true` for [`BoardLocation::END`].
    pub fn is_end(&self) -> bool {
        self.address == Self::END.address
    }

    /// Total logical devices the board contributes.
    pub fn channel_count(&self) -> usize {
        usize::from(self.analog_out) + usize::from(self.analog_in) + usize::from(self.digital_out)
    }
}

/// Pending output values, laid out per chip family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelBuffer {
    /// DAC codes, one per channel.
    AnalogOut([u16; MAX_ANALOG_PER_BOARD]),
    /// ADC boards don't buffer output.
    AnalogIn,
    /// Output latch bits, one per line.
    DigitalOut(u16),
}

impl Default for ChannelBuffer {
    fn default() -> Self {
        Self::AnalogOut([0; MAX_ANALOG_PER_BOARD])
    }
}

/// A physically addressed chip and its buffered, not yet flushed, output.
#[derive(Debug, Default, Clone, Copy)]
pub struct Board {
    location: BoardLocation,
    family: ChipFamily,
    valid: bool,
    dirty: u16,
    buffer: ChannelBuffer,
}

impl Board {
    /// Constructs an (as yet unprobed, hence invalid) [`Board`], or `None` if no supported chip has its layout or
    /// its multiplexer segment can't be addressed.
    pub fn new(location: BoardLocation) -> Option<Self> {
        if location.mux.is_some_and(|segment| !segment.is_addressable()) {
            return None;
        }
        let family = ChipFamily::from_counts(
            location.analog_out,
            location.analog_in,
            location.digital_out,
        )?;
        let buffer = match family {
            ChipFamily::Mcp47feb28 | ChipFamily::Mcp4728 => {
                ChannelBuffer::AnalogOut([0; MAX_ANALOG_PER_BOARD])
            }
            ChipFamily::Ads1115 => ChannelBuffer::AnalogIn,
            ChipFamily::Pcf8574 | ChipFamily::Pcf8575 => ChannelBuffer::DigitalOut(0),
        };
        Some(Self {
            location,
            family,
            valid: false,
            dirty: 0,
            buffer,
        })
    }

    /// Getter.
    pub fn location(&self) -> &BoardLocation {
        &self.location
    }

    /// Getter.
    pub fn family(&self) -> ChipFamily {
        self.family
    }

    /// Whether the last probe of this board succeeded.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(super) fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    /// One bit per channel holding a value that hasn't been flushed.
    pub fn dirty(&self) -> u16 {
        self.dirty
    }

    pub(super) fn clear_dirty(&mut self) {
        self.dirty = 0;
    }

    /// Buffers a DAC code. Returns `false` if this isn't a DAC board or the channel doesn't exist.
    pub(super) fn set_analog(&mut self, channel: u8, value: u16) -> bool {
        match &mut self.buffer {
            ChannelBuffer::AnalogOut(values) if channel < self.location.analog_out => {
                values[usize::from(channel)] = value;
                self.dirty |= 1 << channel;
                true
            }
            _ => false,
        }
    }

    /// Buffers an output latch bit. Returns `false` if this isn't an expander or the line doesn't exist.
    pub(super) fn set_digital(&mut self, line: u8, value: bool) -> bool {
        match &mut self.buffer {
            ChannelBuffer::DigitalOut(lines) if line < self.location.digital_out => {
                if value {
                    *lines |= 1 << line;
                } else {
                    *lines &= !(1 << line);
                }
                self.dirty |= 1 << line;
                true
            }
            _ => false,
        }
    }

    /// Encodes the pending output in this family's wire format. Returns the frame length, zero if there is nothing
    /// to send.
    ///
    /// Families that can address single channels carry only the dirty ones; the others always carry everything.
    pub fn encode_pending(&self, frame: &mut [u8; MAX_FRAME]) -> usize {
        if self.dirty == 0 {
            return 0;
        }
        match (self.family, &self.buffer) {
            (ChipFamily::Mcp47feb28, ChannelBuffer::AnalogOut(values)) => {
                mcp47feb::encode_changed(values, self.dirty, frame)
            }
            (ChipFamily::Mcp4728, ChannelBuffer::AnalogOut(values)) => {
                frame[..mcp4728::FRAME_LEN].copy_from_slice(&mcp4728::encode(values));
                mcp4728::FRAME_LEN
            }
            (ChipFamily::Pcf8574 | ChipFamily::Pcf8575, ChannelBuffer::DigitalOut(lines)) => {
                frame[..pcf857x::FRAME_LEN]
                    .copy_from_slice(&pcf857x::encode(*lines, self.location.digital_out));
                pcf857x::FRAME_LEN
            }
            _ => 0,
        }
    }
}

/// Input multiplexer code for channel `channel` of an ADC board.
pub(super) fn input_mux(channel: u8) -> ads1115::InputMux {
    ads1115::InputMux::single_ended(channel).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn octal_dac() -> Board {
        Board::new(BoardLocation::analog_out(None, 0x60, 8, "octal")).unwrap()
    }

    #[test]
    fn unsupported_layout() {
        assert!(Board::new(BoardLocation::analog_out(None, 0x60, 2, "dual")).is_none());
    }

    #[test]
    fn unaddressable_segment_rejected() {
        for segment in [
            MuxSegment { cluster: 8, slice: 0 },
            MuxSegment { cluster: 0, slice: 8 },
        ] {
            assert!(
                Board::new(BoardLocation::analog_out(Some(segment), 0x60, 8, "octal")).is_none(),
                "Expected {:?} to be rejected",
                segment
            );
        }
        assert!(Board::new(BoardLocation::analog_out(
            Some(MuxSegment { cluster: 7, slice: 7 }),
            0x60,
            8,
            "octal"
        ))
        .is_some());
    }

    #[test]
    fn new_board_is_invalid_and_clean() {
        let board = octal_dac();
        assert!(!board.is_valid(), "Boards start unprobed");
        assert_eq!(0, board.dirty(), "Expected left but got right");
    }

    #[test]
    fn analog_write_marks_channel_dirty() {
        let mut board = octal_dac();
        assert!(board.set_analog(5, 1000));
        assert!(board.set_analog(0, 10));
        assert_eq!(0b0010_0001, board.dirty(), "Expected left but got right");
    }

    #[test]
    fn out_of_range_channel_rejected() {
        let mut board = Board::new(BoardLocation::analog_out(None, 0x61, 4, "quad")).unwrap();
        assert!(!board.set_analog(4, 1000));
        assert!(!board.set_digital(0, true), "DAC boards have no digital lines");
        assert_eq!(0, board.dirty(), "Expected left but got right");
    }

    #[test]
    fn digital_write_sets_and_clears_lines() {
        let mut board = Board::new(BoardLocation::digital_out(None, 0x20, 16, "gates")).unwrap();
        board.set_digital(9, true);
        board.set_digital(3, true);
        board.set_digital(3, false);
        let mut frame = [0; MAX_FRAME];
        let len = board.encode_pending(&mut frame);
        assert_eq!(&[0x00, 0x02][..], &frame[..len], "Expected left but got right");
        assert_eq!(0b10_0000_1000, board.dirty(), "Both touched lines are dirty");
    }

    #[test]
    fn quad_dac_encodes_everything() {
        let mut board = Board::new(BoardLocation::analog_out(None, 0x61, 4, "quad")).unwrap();
        board.set_analog(2, 0x0456);
        let mut frame = [0; MAX_FRAME];
        let len = board.encode_pending(&mut frame);
        assert_eq!(
            &[0, 0, 0, 0, 0x04, 0x56, 0, 0][..],
            &frame[..len],
            "Expected left but got right"
        );
    }

    #[test]
    fn clean_board_encodes_nothing() {
        let mut frame = [0; MAX_FRAME];
        assert_eq!(0, octal_dac().encode_pending(&mut frame));
    }
}
