//! MCP4728: quad 12-bit DAC. Its fast-write command can't target single channels, so every flush rewrites all
//! four.

use crate::actuator::MAX_ANALOG_PER_BOARD;

/// Channel count.
pub const CHANNELS: usize = 4;

/// Length of a fast-write frame.
pub const FRAME_LEN: usize = CHANNELS * 2;

/// Writes issued after a successful probe: power-down, reference and gain general commands, then a fast write of
/// zero to every channel.
pub const INIT_SEQUENCE: &[&[u8]] = &[&[0xA0], &[0x80], &[0xC0], &[0; FRAME_LEN]];

/// Encodes a fast write of all four channels, high byte first.
///
/// Values are 12-bit; the upper nibble of each high byte carries the power-down bits and is kept clear.
pub fn encode(values: &[u16; MAX_ANALOG_PER_BOARD]) -> [u8; FRAME_LEN] {
    let mut frame = [0_u8; FRAME_LEN];
    for (pair, value) in frame.chunks_exact_mut(2).zip(values.iter()) {
        pair.copy_from_slice(&(value & 0x0FFF).to_be_bytes());
    }
    frame
}
