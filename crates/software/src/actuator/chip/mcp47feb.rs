//! MCP47FEB28: octal 12-bit DAC with individually addressable volatile registers.

use crate::actuator::MAX_ANALOG_PER_BOARD;

/// Channel count.
pub const CHANNELS: usize = 8;

/// Longest frame [`encode_changed`] can produce: a command byte and two data bytes per channel.
pub const MAX_FRAME: usize = CHANNELS * 3;

const VREF_REGISTER: u8 = 0x08;
const POWER_DOWN_REGISTER: u8 = 0x09;
const GAIN_REGISTER: u8 = 0x0A;

/// Command byte for a volatile write to `register`: the address sits in the top five bits, the low bits select
/// the write command (`00`) and must be clear.
pub const fn write_command(register: u8) -> u8 {
    register << 3
}

/// Writes issued after a successful probe: power-down, reference and gain registers cleared, every channel zeroed.
pub const INIT_SEQUENCE: &[&[u8]] = &[
    &[write_command(POWER_DOWN_REGISTER), 0, 0],
    &[write_command(VREF_REGISTER), 0, 0],
    &[write_command(GAIN_REGISTER), 0, 0],
    &[write_command(0), 0, 0],
    &[write_command(1), 0, 0],
    &[write_command(2), 0, 0],
    &[write_command(3), 0, 0],
    &[write_command(4), 0, 0],
    &[write_command(5), 0, 0],
    &[write_command(6), 0, 0],
    &[write_command(7), 0, 0],
];

/// Encodes only the channels whose bit is set in `dirty`: register command, then the value high byte first.
///
/// Returns the frame length.
pub fn encode_changed(
    values: &[u16; MAX_ANALOG_PER_BOARD],
    dirty: u16,
    frame: &mut [u8; MAX_FRAME],
) -> usize {
    let mut len = 0;
    for (channel, value) in values.iter().enumerate().take(CHANNELS) {
        if dirty & (1 << channel) != 0 {
            let [high, low] = value.to_be_bytes();
            frame[len] = write_command(channel as u8);
            frame[len + 1] = high;
            frame[len + 2] = low;
            len += 3;
        }
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_only_dirty_channels() {
        let mut values = [0_u16; MAX_ANALOG_PER_BOARD];
        values[1] = 0x0123;
        values[2] = 0x0FFF;
        values[6] = 0x0800;
        let mut frame = [0_u8; MAX_FRAME];

        let len = encode_changed(&values, 0b0100_0010, &mut frame);

        assert_eq!(
            &[0x08, 0x01, 0x23, 0x30, 0x08, 0x00][..],
            &frame[..len],
            "Expected left but got right"
        );
    }

    #[test]
    fn clean_mask_encodes_nothing() {
        let values = [0x0FFF_u16; MAX_ANALOG_PER_BOARD];
        let mut frame = [0_u8; MAX_FRAME];
        assert_eq!(0, encode_changed(&values, 0, &mut frame));
    }

    #[test]
    fn init_sequence_resets_config_then_channels() {
        assert_eq!(11, INIT_SEQUENCE.len(), "Expected left but got right");
        assert_eq!(&[0x48, 0, 0][..], INIT_SEQUENCE[0]);
        assert_eq!(&[0x40, 0, 0][..], INIT_SEQUENCE[1]);
        assert_eq!(&[0x50, 0, 0][..], INIT_SEQUENCE[2]);
        assert_eq!(&[0x38, 0, 0][..], INIT_SEQUENCE[10]);
    }
}
