//! Wire encodings for the supported chip families.
//!
//! Everything here is a pure function of channel values, so each family's layout can be checked against its
//! datasheet without hardware.

pub mod ads1115;
pub mod mcp4728;
pub mod mcp47feb;
pub mod pcf857x;

/// The kinds of chip a board can carry. A board's family follows from its channel counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipFamily {
    /// Octal DAC with selective channel writes.
    Mcp47feb28,
    /// Quad DAC, always written in full.
    #[default]
    Mcp4728,
    /// Four-channel ADC.
    Ads1115,
    /// 8-line digital expander.
    Pcf8574,
    /// 16-line digital expander.
    Pcf8575,
}

impl ChipFamily {
    /// Identifies the chip from a board's analog-out, analog-in and digital-out channel counts.
    ///
    /// Exactly one of the counts may be non-zero.
    pub fn from_counts(analog_out: u8, analog_in: u8, digital_out: u8) -> Option<Self> {
        match (analog_out, analog_in, digital_out) {
            (8, 0, 0) => Some(Self::Mcp47feb28),
            (4, 0, 0) => Some(Self::Mcp4728),
            (0, 4, 0) => Some(Self::Ads1115),
            (0, 0, 8) => Some(Self::Pcf8574),
            (0, 0, 16) => Some(Self::Pcf8575),
            _ => None,
        }
    }

    /// Writes to issue, one transaction each, when a board of this family is brought up.
    pub fn init_sequence(&self) -> &'static [&'static [u8]] {
        match self {
            Self::Mcp47feb28 => mcp47feb::INIT_SEQUENCE,
            Self::Mcp4728 => mcp4728::INIT_SEQUENCE,
            Self::Ads1115 => ads1115::INIT_SEQUENCE,
            Self::Pcf8574 | Self::Pcf8575 => pcf857x::INIT_SEQUENCE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_by_counts() {
        assert_eq!(Some(ChipFamily::Mcp47feb28), ChipFamily::from_counts(8, 0, 0));
        assert_eq!(Some(ChipFamily::Mcp4728), ChipFamily::from_counts(4, 0, 0));
        assert_eq!(Some(ChipFamily::Ads1115), ChipFamily::from_counts(0, 4, 0));
        assert_eq!(Some(ChipFamily::Pcf8574), ChipFamily::from_counts(0, 0, 8));
        assert_eq!(Some(ChipFamily::Pcf8575), ChipFamily::from_counts(0, 0, 16));
    }

    #[test]
    fn reject_unknown_layouts() {
        assert_eq!(None, ChipFamily::from_counts(1, 0, 0), "Single DACs aren't supported");
        assert_eq!(None, ChipFamily::from_counts(4, 4, 0), "Mixed boards aren't supported");
        assert_eq!(None, ChipFamily::from_counts(0, 0, 0), "Empty boards aren't supported");
    }
}
