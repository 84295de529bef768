//! This module contains both user-configurable settings (implemented as enums and plain structs) and traits to make
//! them easier to work with in code.

use crate::envelope::{Envelope, Level, Stage};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};

/// A trait which allows infinite cycling of an enum's variants.
///
/// Useful for pushbutton user interfaces, allowing presses to advance from the current to the next variant,
/// cycling back to the beginning when all variants have been exhausted.
pub trait CycleConfig {
    /// Return the next variant, cycling back to the beginning as needed.
    fn cycle(self) -> Self
    where
        Self: FromPrimitive + ToPrimitive + Sized,
    {
        self.to_u8()
            .and_then(|index| <Self as FromPrimitive>::from_u8(index + 1))
            .or_else(|| <Self as FromPrimitive>::from_u8(0))
            .unwrap_or(self)
    }
}

/// Determines how the sustain pedal holds back the end of a voice's release.
///
/// A held voice keeps ramping down through its release, but doesn't finish (and free itself) until the pedal lets
/// it go.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, ToPrimitive, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DamperMode {
    /// The pedal is ignored.
    #[default]
    Off,
    /// Releases are held while the pedal is down, like the damper of a piano.
    Normal,
    /// Releases are held while the pedal is up, for pedals wired the other way round.
    Invert,
}
impl CycleConfig for DamperMode {}

impl DamperMode {
    /// Returns `true` if a voice in release should be held, given the pedal state.
    pub fn holds(&self, pedal_down: bool) -> bool {
        match self {
            Self::Off => false,
            Self::Normal => pedal_down,
            Self::Invert => !pedal_down,
        }
    }
}

/// A complete envelope shape, applied to a voice in one go.
///
/// Times are in milliseconds; levels are fractions of the voice's full range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeSettings {
    /// Time from `bottom` to `top`.
    pub attack_ms: f32,
    /// Time from `top` to `sustain`. Anything under 8 ms skips the decay entirely.
    pub decay_ms: f32,
    /// Time from wherever the voice was when it ended back to `bottom`.
    pub release_ms: f32,
    /// Resting level.
    pub bottom: f32,
    /// Attack peak. A voice whose peak is zero won't start.
    pub top: f32,
    /// Level held after decay.
    pub sustain: f32,
    /// `false` for loudness (VCA) voices, `true` for voices doing other jobs, such as filter sweeps. Dual-use voices
    /// aren't pinned to their peak while sustaining.
    pub dual_use: bool,
}

impl Default for EnvelopeSettings {
    fn default() -> Self {
        Self {
            attack_ms: 10.0,
            decay_ms: 200.0,
            release_ms: 300.0,
            bottom: 0.0,
            top: 1.0,
            sustain: 0.7,
            dual_use: false,
        }
    }
}

impl EnvelopeSettings {
    /// Writes every setting into `voice`. Takes effect from the voice's next start.
    pub fn apply(&self, voice: &mut Envelope) {
        voice.set_time(Stage::Attack, self.attack_ms);
        voice.set_time(Stage::Decay, self.decay_ms);
        voice.set_time(Stage::Release, self.release_ms);
        voice.set_level(Level::Bottom, self.bottom);
        voice.set_level(Level::Top, self.top);
        voice.set_level(Level::Sustain, self.sustain);
        voice.set_dual_use(self.dual_use);
    }

    /// Reads the current settings back out of `voice`.
    pub fn of(voice: &Envelope) -> Self {
        Self {
            attack_ms: voice.time(Stage::Attack),
            decay_ms: voice.time(Stage::Decay),
            release_ms: voice.time(Stage::Release),
            bottom: voice.level(Level::Bottom),
            top: voice.level(Level::Top),
            sustain: voice.level(Level::Sustain),
            dual_use: voice.is_dual_use(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::DeviceId;
    use crate::envelope::GroupId;

    #[derive(Debug, Clone, Copy, ToPrimitive, FromPrimitive, PartialEq)]
    enum Alpha {
        A,
        B,
        C,
    }
    impl CycleConfig for Alpha {}

    #[test]
    fn cycle() {
        let config = Alpha::A.cycle();
        assert_eq!(
            Alpha::B,
            config,
            "Should advance to next variant; expected left but got right"
        );

        let config = config.cycle();
        assert_eq!(
            Alpha::C,
            config,
            "Should advance to next variant; expected left but got right"
        );

        let config = config.cycle();
        assert_eq!(
            Alpha::A,
            config,
            "Should wrap around to first variant; expected left but got right"
        );
    }

    #[test]
    fn damper_mode_cycles_through_all_modes() {
        let mode = DamperMode::default();
        assert_eq!(DamperMode::Off, mode, "Expected left but got right");
        assert_eq!(DamperMode::Normal, mode.cycle(), "Expected left but got right");
        assert_eq!(DamperMode::Invert, mode.cycle().cycle(), "Expected left but got right");
        assert_eq!(DamperMode::Off, mode.cycle().cycle().cycle(), "Expected left but got right");
    }

    #[test]
    fn damper_polarity() {
        assert!(!DamperMode::Off.holds(true));
        assert!(!DamperMode::Off.holds(false));
        assert!(DamperMode::Normal.holds(true));
        assert!(!DamperMode::Normal.holds(false));
        assert!(!DamperMode::Invert.holds(true));
        assert!(DamperMode::Invert.holds(false));
    }

    #[test]
    fn settings_round_trip_through_a_voice() {
        let settings = EnvelopeSettings {
            attack_ms: 5.0,
            decay_ms: 40.0,
            release_ms: 120.0,
            bottom: 0.1,
            top: 0.9,
            sustain: 0.5,
            dual_use: true,
        };
        let mut voice = Envelope::new(0, "vcf", DeviceId(3), 4095.0, GroupId(0));
        settings.apply(&mut voice);
        assert_eq!(settings, EnvelopeSettings::of(&voice), "Expected left but got right");
    }
}
