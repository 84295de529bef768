use super::{ActiveCount, Envelope, GroupId, VoiceId};
use crate::{
    actuator::{AnalogOutput, DeviceError, DeviceId},
    configuration::DamperMode,
    modulation::Modulation,
};
use core::fmt;
use tinyvec::ArrayVec;

/// Capacity of the voice arena.
pub const MAX_VOICES: usize = 64;

/// Capacity of the group arena.
pub const MAX_GROUPS: usize = 16;

/// Programming errors caught at the boundary of the [`EnvelopeGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GeneratorError {
    /// The voice or group arena is full.
    CapacityExceeded,
    /// No group has this handle.
    InvalidGroup(GroupId),
    /// No voice has this handle.
    InvalidVoice(VoiceId),
    /// The voice's output channel was rejected by the actuator layer.
    Device(DeviceError),
}

impl fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded => f.write_str("no room for another voice or group"),
            Self::InvalidGroup(group) => write!(f, "no voice group {}", group.0),
            Self::InvalidVoice(voice) => write!(f, "no voice {}", voice.0),
            Self::Device(error) => write!(f, "{error}"),
        }
    }
}

impl From<DeviceError> for GeneratorError {
    fn from(error: DeviceError) -> Self {
        Self::Device(error)
    }
}

/// Owns every voice and every group's [`ActiveCount`], and drives them once per control-loop tick.
#[derive(Debug, Default)]
pub struct EnvelopeGenerator {
    voices: ArrayVec<[Envelope; MAX_VOICES]>,
    groups: ArrayVec<[ActiveCount; MAX_GROUPS]>,
    /// Triangle value from the latest tick, so out-of-tick writes match what the last tick wrote.
    triangle: f32,
}

impl EnvelopeGenerator {
    /// Constructs an empty [`EnvelopeGenerator`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a group of voices which share an [`ActiveCount`].
    pub fn new_group(&mut self) -> Result<GroupId, GeneratorError> {
        let id = GroupId(self.groups.len() as u8);
        match self.groups.try_push(ActiveCount::default()) {
            None => Ok(id),
            Some(_) => Err(GeneratorError::CapacityExceeded),
        }
    }

    /// Adds an idle voice writing to `channel`, whose full scale is `range` device units, counted in `group`.
    pub fn new_voice(
        &mut self,
        index: u8,
        name: &'static str,
        channel: DeviceId,
        range: f32,
        group: GroupId,
    ) -> Result<VoiceId, GeneratorError> {
        if usize::from(group.0) >= self.groups.len() {
            return Err(GeneratorError::InvalidGroup(group));
        }
        let id = VoiceId(self.voices.len() as u8);
        match self
            .voices
            .try_push(Envelope::new(index, name, channel, range, group))
        {
            None => {
                debug!("[env] {} {}: new voice on device {}", index, name, channel.0);
                Ok(id)
            }
            Some(_) => Err(GeneratorError::CapacityExceeded),
        }
    }

    /// Getter.
    pub fn voice(&self, voice: VoiceId) -> Option<&Envelope> {
        self.voices.get(usize::from(voice.0))
    }

    /// Mutable access to a voice's settings. Starting, ending and clearing go through the generator so the group
    /// counts stay right.
    pub fn voice_mut(&mut self, voice: VoiceId) -> Option<&mut Envelope> {
        self.voices.get_mut(usize::from(voice.0))
    }

    /// Iterates over every voice, in creation order.
    pub fn voices(&self) -> impl Iterator<Item = &Envelope> {
        self.voices.iter()
    }

    /// Number of sounding voices in `group`.
    pub fn active_count(&self, group: GroupId) -> Option<u8> {
        self.groups.get(usize::from(group.0)).map(ActiveCount::get)
    }

    fn with_voice<T>(
        &mut self,
        voice: VoiceId,
        op: impl FnOnce(&mut Envelope, &mut ActiveCount) -> T,
    ) -> Result<T, GeneratorError> {
        let envelope = self
            .voices
            .get_mut(usize::from(voice.0))
            .ok_or(GeneratorError::InvalidVoice(voice))?;
        let count = self
            .groups
            .get_mut(usize::from(envelope.group().0))
            .ok_or(GeneratorError::InvalidGroup(envelope.group()))?;
        Ok(op(envelope, count))
    }

    /// See [`Envelope::start`].
    pub fn start(&mut self, voice: VoiceId) -> Result<(), GeneratorError> {
        self.with_voice(voice, |envelope, count| envelope.start(count))
    }

    /// See [`Envelope::start_modulated`].
    pub fn start_modulated(&mut self, voice: VoiceId, modulated: bool) -> Result<(), GeneratorError> {
        self.with_voice(voice, |envelope, count| {
            envelope.start_modulated(modulated, count)
        })
    }

    /// See [`Envelope::end`].
    pub fn end(&mut self, voice: VoiceId) -> Result<(), GeneratorError> {
        self.with_voice(voice, |envelope, _| envelope.end())
    }

    /// Clears the voice and writes its resting level right away.
    pub fn clear(
        &mut self,
        voice: VoiceId,
        output: &mut impl AnalogOutput,
    ) -> Result<(), GeneratorError> {
        let triangle = self.triangle;
        self.with_voice(voice, |envelope, count| {
            envelope.clear(count);
            envelope.update(triangle, output)
        })??;
        Ok(())
    }

    /// Mutes or unmutes the voice, clearing it and writing its resting level right away.
    pub fn mute(
        &mut self,
        voice: VoiceId,
        muted: bool,
        output: &mut impl AnalogOutput,
    ) -> Result<(), GeneratorError> {
        let triangle = self.triangle;
        self.with_voice(voice, |envelope, count| {
            envelope.mute(muted, count);
            envelope.update(triangle, output)
        })??;
        Ok(())
    }

    /// Passes the sustain pedal state to every voice.
    pub fn set_damper(&mut self, down: bool) {
        for voice in self.voices.iter_mut() {
            voice.set_damper(down);
        }
    }

    /// Sets the damper mode of every voice.
    pub fn set_damper_mode(&mut self, mode: DamperMode) {
        debug!("[env] damper mode {}", mode);
        for voice in self.voices.iter_mut() {
            voice.set_damper_mode(mode);
        }
    }

    /// Runs one control-loop tick: advances `modulation`, processes and updates every sounding voice, then flushes
    /// `output` once so each board gets at most one transaction.
    ///
    /// Returns the number of boards whose flush failed.
    pub fn tick(
        &mut self,
        delta_ms: f32,
        modulation: &mut impl Modulation,
        output: &mut impl AnalogOutput,
    ) -> usize {
        modulation.tick(delta_ms);
        self.triangle = modulation.triangle();

        for envelope in self.voices.iter_mut().filter(|v| v.is_active()) {
            let Some(count) = self.groups.get_mut(usize::from(envelope.group().0)) else {
                continue;
            };
            envelope.process(delta_ms, count);
            if let Err(error) = envelope.update(self.triangle, output) {
                error!(
                    "[env] {} {}: write failed: {}",
                    envelope.index(),
                    envelope.name(),
                    error
                );
            }
        }

        output.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        actuator::{Actuators, BoardLocation, fake::FakeBus},
        envelope::{EnvelopeState, Level, Stage},
        modulation::SoftLfo,
    };
    use std::{vec, vec::Vec};

    /// Records analog writes and counts flushes.
    #[derive(Default)]
    struct Recorder {
        writes: Vec<(DeviceId, u16)>,
        flushes: usize,
    }

    impl AnalogOutput for Recorder {
        fn set_analog_out(&mut self, device: DeviceId, value: u16) -> Result<(), DeviceError> {
            self.writes.push((device, value));
            Ok(())
        }

        fn flush(&mut self) -> usize {
            self.flushes += 1;
            0
        }
    }

    fn shaped(generator: &mut EnvelopeGenerator, voice: VoiceId) {
        let envelope = generator.voice_mut(voice).unwrap();
        envelope.set_time(Stage::Attack, 10.0);
        envelope.set_time(Stage::Decay, 20.0);
        envelope.set_time(Stage::Release, 30.0);
        envelope.set_level(Level::Top, 1.0);
        envelope.set_level(Level::Sustain, 0.5);
    }

    #[test]
    fn voices_need_an_existing_group() {
        let mut generator = EnvelopeGenerator::new();
        assert_eq!(
            Err(GeneratorError::InvalidGroup(GroupId(0))),
            generator.new_voice(0, "vca", DeviceId(0), 4095.0, GroupId(0)),
            "Expected left but got right"
        );
        let group = generator.new_group().unwrap();
        assert_eq!(
            Ok(VoiceId(0)),
            generator.new_voice(0, "vca", DeviceId(0), 4095.0, group),
            "Expected left but got right"
        );
        assert_eq!(
            Err(GeneratorError::InvalidVoice(VoiceId(1))),
            generator.start(VoiceId(1)),
            "Expected left but got right"
        );
    }

    #[test]
    fn arenas_are_bounded() {
        let mut generator = EnvelopeGenerator::new();
        for _ in 0..MAX_GROUPS {
            generator.new_group().unwrap();
        }
        assert_eq!(
            Err(GeneratorError::CapacityExceeded),
            generator.new_group(),
            "Expected left but got right"
        );
        for i in 0..MAX_VOICES {
            generator
                .new_voice(i as u8, "v", DeviceId(i as u16), 1.0, GroupId(0))
                .unwrap();
        }
        assert_eq!(
            Err(GeneratorError::CapacityExceeded),
            generator.new_voice(0, "v", DeviceId(0), 1.0, GroupId(0)),
            "Expected left but got right"
        );
    }

    #[test]
    fn group_counts_sounding_voices() {
        let mut generator = EnvelopeGenerator::new();
        let mut lfo = SoftLfo::new();
        let mut output = Recorder::default();
        let group = generator.new_group().unwrap();
        let other = generator.new_group().unwrap();
        let vca = generator.new_voice(0, "vca", DeviceId(0), 4095.0, group).unwrap();
        let vcf = generator.new_voice(1, "vcf", DeviceId(1), 4095.0, group).unwrap();
        let lone = generator.new_voice(2, "lone", DeviceId(2), 4095.0, other).unwrap();
        for voice in [vca, vcf, lone] {
            shaped(&mut generator, voice);
        }

        generator.start(vca).unwrap();
        generator.start(vcf).unwrap();
        generator.start(lone).unwrap();
        assert_eq!(Some(2), generator.active_count(group), "Expected left but got right");
        assert_eq!(Some(1), generator.active_count(other), "Expected left but got right");

        generator.end(vca).unwrap();
        generator.end(vcf).unwrap();
        for _ in 0..20 {
            generator.tick(1.0, &mut lfo, &mut output);
        }
        assert_eq!(Some(0), generator.active_count(group), "Expected left but got right");
        assert_eq!(Some(1), generator.active_count(other), "Expected left but got right");

        generator.mute(lone, true, &mut output).unwrap();
        assert_eq!(Some(0), generator.active_count(other), "Expected left but got right");
        assert_eq!(Some(&(DeviceId(2), 0)), output.writes.last(), "Mute should write the resting level");
    }

    #[test]
    fn tick_processes_only_active_voices_then_flushes_once() {
        let mut generator = EnvelopeGenerator::new();
        let mut lfo = SoftLfo::new();
        let mut output = Recorder::default();
        let group = generator.new_group().unwrap();
        let playing = generator.new_voice(0, "a", DeviceId(5), 1000.0, group).unwrap();
        let resting = generator.new_voice(1, "b", DeviceId(6), 1000.0, group).unwrap();
        shaped(&mut generator, playing);
        shaped(&mut generator, resting);

        generator.start(playing).unwrap();
        for _ in 0..6 {
            generator.tick(1.0, &mut lfo, &mut output);
        }
        assert_eq!(6, output.flushes, "Expected left but got right");
        assert!(
            output.writes.iter().all(|(device, _)| *device == DeviceId(5)),
            "Idle voices shouldn't write"
        );
        assert_eq!(
            Some(&(DeviceId(5), 500)),
            output.writes.last(),
            "Expected left but got right"
        );
        assert_eq!(
            EnvelopeState::Idle,
            generator.voice(resting).unwrap().state(),
            "Expected left but got right"
        );
    }

    #[test]
    fn damper_applies_to_every_voice() {
        let mut generator = EnvelopeGenerator::new();
        let mut lfo = SoftLfo::new();
        let mut output = Recorder::default();
        let group = generator.new_group().unwrap();
        let voice = generator.new_voice(0, "vca", DeviceId(0), 4095.0, group).unwrap();
        shaped(&mut generator, voice);
        generator.set_damper_mode(DamperMode::Normal);
        generator.set_damper(true);

        generator.start(voice).unwrap();
        for _ in 0..40 {
            generator.tick(1.0, &mut lfo, &mut output);
        }
        generator.end(voice).unwrap();
        for _ in 0..100 {
            generator.tick(1.0, &mut lfo, &mut output);
        }
        assert_eq!(Some(1), generator.active_count(group), "Pedal should hold the voice");

        generator.set_damper(false);
        generator.tick(1.0, &mut lfo, &mut output);
        assert_eq!(Some(0), generator.active_count(group), "Expected left but got right");
    }

    #[test]
    fn voices_on_one_board_share_a_transaction() {
        let mut actuators = Actuators::new(FakeBus::default());
        assert_eq!(
            Ok(0),
            actuators.begin(&[BoardLocation::analog_out(None, 0x60, 8, "octal")]),
            "Expected left but got right"
        );

        let mut generator = EnvelopeGenerator::new();
        let mut lfo = SoftLfo::new();
        let group = generator.new_group().unwrap();
        for channel in 0..3 {
            let voice = generator
                .new_voice(channel, "v", DeviceId(u16::from(channel)), 4095.0, group)
                .unwrap();
            shaped(&mut generator, voice);
            generator.start(voice).unwrap();
        }

        // the first tick only sets up the attacks, the second moves all three
        assert_eq!(0, generator.tick(1.0, &mut lfo, &mut actuators));
        assert_eq!(0, generator.tick(1.0, &mut lfo, &mut actuators));

        let bus = actuators.release();
        let (init, ticks) = bus.writes.split_at(bus.writes.len() - 1);
        assert_eq!(
            Some(&(0x60, vec![0x38, 0, 0])),
            init.last(),
            "Nothing but the init sequence should precede the tick's write"
        );
        assert_eq!(
            vec![(0x60, vec![0x00, 0x01, 0x99, 0x08, 0x01, 0x99, 0x10, 0x01, 0x99])],
            ticks,
            "Expected one write carrying all three channels"
        );
    }
}
