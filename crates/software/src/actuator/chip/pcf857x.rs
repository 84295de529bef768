//! PCF8574 (8 lines) and PCF8575 (16 lines) quasi-bidirectional I/O expanders, used as digital outputs.

/// Length of an output-latch frame.
pub const FRAME_LEN: usize = 2;

/// Writes issued after a successful probe: every output latch low.
pub const INIT_SEQUENCE: &[&[u8]] = &[&[0, 0]];

/// Encodes the output latches, low port first.
///
/// The 8-line part has only one port; it receives the same byte twice and keeps the last.
pub fn encode(lines: u16, line_count: u8) -> [u8; FRAME_LEN] {
    let [low, high] = lines.to_le_bytes();
    if line_count <= 8 { [low, low] } else { [low, high] }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixteen_lines_low_port_first() {
        assert_eq!([0x34, 0x12], encode(0x1234, 16), "Expected left but got right");
    }

    #[test]
    fn eight_lines_repeat_the_port() {
        assert_eq!([0x81, 0x81], encode(0x0081, 8), "Expected left but got right");
    }
}
