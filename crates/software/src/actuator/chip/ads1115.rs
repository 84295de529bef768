//! ADS1115: 4-channel 16-bit delta-sigma ADC.
//!
//! Only single-ended, single-shot conversions are used. The config register is modelled as a typed [`Config`]
//! rather than a pile of shifted constants; [`Config::to_register`] and [`Config::from_register`] translate
//! to and from the 16-bit layout documented in the datasheet (table 8-3):
//!
//! ```text
//!  15 | 14..12 | 11..9 | 8    | 7..5 | 4         | 3        | 2        | 1..0
//!  OS | MUX    | PGA   | MODE | DR   | COMP_MODE | COMP_POL | COMP_LAT | COMP_QUE
//! ```

use measurements::Voltage;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

/// Channel count in single-ended mode.
pub const CHANNELS: usize = 4;

/// Pointer register value selecting the conversion result.
pub const CONVERSION_REGISTER: u8 = 0b00;
/// Pointer register value selecting the config register.
pub const CONFIG_REGISTER: u8 = 0b01;
/// Pointer register value selecting the comparator low threshold.
pub const LOW_THRESHOLD_REGISTER: u8 = 0b10;
/// Pointer register value selecting the comparator high threshold.
pub const HIGH_THRESHOLD_REGISTER: u8 = 0b11;

const LOW_THRESHOLD_DEFAULT: u16 = 0x8000;
const HIGH_THRESHOLD_DEFAULT: u16 = 0x7FFF;

const OS_POS: u16 = 15;
const MUX_POS: u16 = 12;
const PGA_POS: u16 = 9;
const MODE_POS: u16 = 8;
const DR_POS: u16 = 5;
const COMP_MODE_POS: u16 = 4;
const COMP_POL_POS: u16 = 3;
const COMP_LAT_POS: u16 = 2;
const COMP_QUE_POS: u16 = 0;

/// Input multiplexer selection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputMux {
    /// AIN0 relative to AIN1.
    #[default]
    Ain0Ain1 = 0b000,
    /// AIN0 relative to AIN3.
    Ain0Ain3 = 0b001,
    /// AIN1 relative to AIN3.
    Ain1Ain3 = 0b010,
    /// AIN2 relative to AIN3.
    Ain2Ain3 = 0b011,
    /// AIN0 single-ended.
    Ain0Gnd = 0b100,
    /// AIN1 single-ended.
    Ain1Gnd = 0b101,
    /// AIN2 single-ended.
    Ain2Gnd = 0b110,
    /// AIN3 single-ended.
    Ain3Gnd = 0b111,
}

impl InputMux {
    /// The single-ended selector for a board channel, if the channel exists.
    pub fn single_ended(channel: u8) -> Option<Self> {
        match channel {
            0 => Some(Self::Ain0Gnd),
            1 => Some(Self::Ain1Gnd),
            2 => Some(Self::Ain2Gnd),
            3 => Some(Self::Ain3Gnd),
            _ => None,
        }
    }
}

/// Programmable gain amplifier setting, named by full-scale range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gain {
    /// ±6.144 V.
    Fs6_144 = 0b000,
    /// ±4.096 V.
    Fs4_096 = 0b001,
    /// ±2.048 V.
    Fs2_048 = 0b010,
    /// ±1.024 V.
    Fs1_024 = 0b011,
    /// ±0.512 V.
    Fs0_512 = 0b100,
    /// ±0.256 V. Codes `0b101` through `0b111` all select this range.
    Fs0_256 = 0b101,
}

impl Gain {
    /// The full-scale range in volts.
    pub fn full_scale_volts(&self) -> f64 {
        match self {
            Self::Fs6_144 => 6.144,
            Self::Fs4_096 => 4.096,
            Self::Fs2_048 => 2.048,
            Self::Fs1_024 => 1.024,
            Self::Fs0_512 => 0.512,
            Self::Fs0_256 => 0.256,
        }
    }

    /// Converts a raw conversion result taken at this gain to a [`Voltage`].
    pub fn voltage(&self, raw: i16) -> Voltage {
        Voltage::from_volts(f64::from(raw) * self.full_scale_volts() / 32768.0)
    }

    fn from_bits(bits: u16) -> Self {
        Self::from_u16(bits).unwrap_or(Self::Fs0_256)
    }
}

/// Conversion mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Convert back to back.
    Continuous = 0,
    /// Convert once per start command, then power down.
    SingleShot = 1,
}

/// Samples per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataRate {
    /// 8 SPS.
    Sps8 = 0b000,
    /// 16 SPS.
    Sps16 = 0b001,
    /// 32 SPS.
    Sps32 = 0b010,
    /// 64 SPS.
    Sps64 = 0b011,
    /// 128 SPS.
    Sps128 = 0b100,
    /// 250 SPS.
    Sps250 = 0b101,
    /// 475 SPS.
    Sps475 = 0b110,
    /// 860 SPS.
    Sps860 = 0b111,
}

/// Comparator queue: how many out-of-window conversions assert ALERT, or disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ComparatorQueue {
    /// Assert after one conversion.
    One = 0b00,
    /// Assert after two conversions.
    Two = 0b01,
    /// Assert after four conversions.
    Four = 0b10,
    /// Comparator disabled, ALERT high-impedance.
    Disabled = 0b11,
}

/// The config register, field by field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Operational status. Writing `true` starts a single conversion; reading `true` means no conversion is in
    /// progress.
    pub os: bool,
    /// Input multiplexer.
    pub mux: InputMux,
    /// Full-scale range.
    pub gain: Gain,
    /// Conversion mode.
    pub mode: Mode,
    /// Data rate.
    pub data_rate: DataRate,
    /// `true` for window comparator, `false` for traditional.
    pub comparator_window: bool,
    /// `true` for an active-high ALERT pin.
    pub comparator_active_high: bool,
    /// `true` to latch ALERT until read.
    pub comparator_latching: bool,
    /// Comparator queue.
    pub comparator_queue: ComparatorQueue,
}

impl Config {
    /// Power-on reset value, `0x8583`.
    pub const RESET: Self = Self {
        os: true,
        mux: InputMux::Ain0Ain1,
        gain: Gain::Fs2_048,
        mode: Mode::SingleShot,
        data_rate: DataRate::Sps128,
        comparator_window: false,
        comparator_active_high: false,
        comparator_latching: false,
        comparator_queue: ComparatorQueue::Disabled,
    };

    /// The command that starts a single conversion of `mux` at ±6.144 V and 128 SPS, comparator disabled.
    pub const fn start_single(mux: InputMux) -> Self {
        Self {
            os: true,
            mux,
            gain: Gain::Fs6_144,
            ..Self::RESET
        }
    }

    /// Packs the fields into the register layout.
    pub const fn to_register(&self) -> u16 {
        ((self.os as u16) << OS_POS)
            | ((self.mux as u16) << MUX_POS)
            | ((self.gain as u16) << PGA_POS)
            | ((self.mode as u16) << MODE_POS)
            | ((self.data_rate as u16) << DR_POS)
            | ((self.comparator_window as u16) << COMP_MODE_POS)
            | ((self.comparator_active_high as u16) << COMP_POL_POS)
            | ((self.comparator_latching as u16) << COMP_LAT_POS)
            | ((self.comparator_queue as u16) << COMP_QUE_POS)
    }

    /// Unpacks a register value read from the chip.
    pub fn from_register(register: u16) -> Self {
        let bit = |pos: u16| register & (1 << pos) != 0;
        let field = |pos: u16, width: u16| (register >> pos) & ((1 << width) - 1);
        Self {
            os: bit(OS_POS),
            mux: InputMux::from_u16(field(MUX_POS, 3)).unwrap_or_default(),
            gain: Gain::from_bits(field(PGA_POS, 3)),
            mode: Mode::from_u16(field(MODE_POS, 1)).unwrap_or(Mode::SingleShot),
            data_rate: DataRate::from_u16(field(DR_POS, 3)).unwrap_or(DataRate::Sps128),
            comparator_window: bit(COMP_MODE_POS),
            comparator_active_high: bit(COMP_POL_POS),
            comparator_latching: bit(COMP_LAT_POS),
            comparator_queue: ComparatorQueue::from_u16(field(COMP_QUE_POS, 2))
                .unwrap_or(ComparatorQueue::Disabled),
        }
    }
}

/// `true` when a config register value read back from the chip says no conversion is running.
pub fn is_idle(register: u16) -> bool {
    Config::from_register(register).os
}

/// Gain used by [`Config::start_single`], for converting its results.
pub const SAMPLE_GAIN: Gain = Gain::Fs6_144;

const IDLE_CONFIG: u16 = Config::RESET.to_register() & !(1 << OS_POS);

/// Writes issued after a successful probe: reset config without starting a conversion, default thresholds.
pub const INIT_SEQUENCE: &[&[u8]] = &[
    &[
        CONFIG_REGISTER,
        (IDLE_CONFIG >> 8) as u8,
        IDLE_CONFIG as u8,
    ],
    &[
        LOW_THRESHOLD_REGISTER,
        (LOW_THRESHOLD_DEFAULT >> 8) as u8,
        LOW_THRESHOLD_DEFAULT as u8,
    ],
    &[
        HIGH_THRESHOLD_REGISTER,
        (HIGH_THRESHOLD_DEFAULT >> 8) as u8,
        HIGH_THRESHOLD_DEFAULT as u8,
    ],
];

/// Encodes a write of `config` to the config register.
pub fn encode_config(config: &Config) -> [u8; 3] {
    let [high, low] = config.to_register().to_be_bytes();
    [CONFIG_REGISTER, high, low]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_value_round_trips() {
        assert_eq!(0x8583, Config::RESET.to_register(), "Expected left but got right");
        assert_eq!(Config::RESET, Config::from_register(0x8583), "Expected left but got right");
    }

    #[test]
    fn start_single_selects_channel_gain_and_rate() {
        let expected = [0xC183, 0xD183, 0xE183, 0xF183];
        for (channel, register) in expected.into_iter().enumerate() {
            let mux = InputMux::single_ended(channel as u8).unwrap();
            assert_eq!(
                register,
                Config::start_single(mux).to_register(),
                "Expected left but got right"
            );
        }
        assert_eq!(None, InputMux::single_ended(4));
    }

    #[test]
    fn decodes_every_field() {
        // OS clear, AIN2/AIN3, ±0.512 V, continuous, 860 SPS, window, active high, latching, queue of two
        let config = Config::from_register(0b0_011_100_0_111_1_1_1_01);
        assert_eq!(
            Config {
                os: false,
                mux: InputMux::Ain2Ain3,
                gain: Gain::Fs0_512,
                mode: Mode::Continuous,
                data_rate: DataRate::Sps860,
                comparator_window: true,
                comparator_active_high: true,
                comparator_latching: true,
                comparator_queue: ComparatorQueue::Two,
            },
            config,
            "Expected left but got right"
        );
    }

    #[test]
    fn aliased_gain_codes_decode_to_lowest_range() {
        assert_eq!(Gain::Fs0_256, Config::from_register(0b111 << PGA_POS).gain);
    }

    #[test]
    fn busy_bit() {
        assert!(is_idle(0x8583), "Should be idle");
        assert!(!is_idle(0x0583), "Should be converting");
    }

    #[test]
    fn init_sequence() {
        assert_eq!(&[0x01, 0x05, 0x83][..], INIT_SEQUENCE[0]);
        assert_eq!(&[0x02, 0x80, 0x00][..], INIT_SEQUENCE[1]);
        assert_eq!(&[0x03, 0x7F, 0xFF][..], INIT_SEQUENCE[2]);
    }

    #[test]
    fn sample_voltage() {
        let voltage = Gain::Fs4_096.voltage(16384);
        assert!((voltage.as_volts() - 2.048).abs() < 1e-9, "Expected 2.048 V");
        let voltage = SAMPLE_GAIN.voltage(-32768);
        assert!((voltage.as_volts() + 6.144).abs() < 1e-9, "Expected -6.144 V");
    }
}
