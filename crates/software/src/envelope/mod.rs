//! One ADSR voice: a time-domain state machine which computes a 0..1 level every control-loop tick and writes it,
//! scaled to its channel's range, through the actuator layer.
//!
//! Voices are owned and driven by an [`EnvelopeGenerator`]; the only thing a voice knows about the hardware is the
//! [`DeviceId`] of its output channel.

mod generator;
pub use generator::*;

use crate::{
    actuator::{AnalogOutput, DeviceError, DeviceId},
    configuration::DamperMode,
};

/// Decay times shorter than this skip the decay stage; the voice holds at its peak instead.
pub const NO_DECAY_MS: f32 = 8.0;

/// Decay ends once its countdown reaches this many milliseconds.
pub const DECAY_DONE_MS: f32 = 10.0;

/// Release ends once its countdown reaches this many milliseconds.
pub const RELEASE_DONE_MS: f32 = 20.0;

/// How strongly the low-frequency modulation moves a voice started with [`Envelope::start_modulated`].
pub const MODULATION_SCALE: f32 = 0.2;

/// Where a voice is in its contour.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EnvelopeState {
    /// Silent and free for the next note.
    #[default]
    Idle,
    /// Started, waiting for the next tick to set up the attack.
    Start,
    /// Ramping from bottom to top.
    Attack,
    /// Ramping from top to sustain.
    Decay,
    /// Holding.
    Sustain,
    /// Ramping back to bottom.
    Release,
}

/// The timed stages of a contour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stage {
    /// Time from bottom to top.
    Attack,
    /// Time from top to sustain.
    Decay,
    /// Time back down to bottom.
    Release,
}

/// The target levels of a contour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    /// Resting level, where attacks start and releases end.
    Bottom,
    /// Attack peak.
    Top,
    /// Level held after decay.
    Sustain,
}

/// Handle for a voice owned by an [`EnvelopeGenerator`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VoiceId(pub u8);

/// Handle for a group of voices sharing an [`ActiveCount`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GroupId(pub u8);

/// The number of voices of one group currently sounding.
///
/// A voice counts itself in exactly once when it starts and out exactly once when it returns to
/// [`EnvelopeState::Idle`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ActiveCount(u8);

impl ActiveCount {
    /// Getter.
    pub fn get(&self) -> u8 {
        self.0
    }

    fn increment(&mut self) {
        self.0 = self.0.saturating_add(1);
    }

    fn decrement(&mut self) {
        self.0 = self.0.saturating_sub(1);
    }
}

/// A single ADSR voice bound to one analog output channel.
#[derive(Debug, Clone, Copy)]
pub struct Envelope {
    // identity, fixed at construction
    index: u8,
    name: &'static str,
    channel: DeviceId,
    range: f32,
    group: GroupId,

    state: EnvelopeState,
    active: bool,
    trigger_end: bool,
    muted: bool,
    dirty: bool,
    peak_level: bool,
    no_decay: bool,

    // user settings
    dual_use: bool,
    modulated: bool,
    modulation_scale: f32,
    damper_mode: DamperMode,
    damper: bool,
    expression: f32,
    top: f32,
    bottom: f32,
    set_sustain: f32,
    attack_ms: f32,
    decay_ms: f32,
    release_ms: f32,

    // runtime
    sustain: f32,
    delta: f32,
    timer: f32,
    target_time: f32,
    current: f32,
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new(0, "", DeviceId::default(), 0.0, GroupId::default())
    }
}

impl Envelope {
    /// Constructs an idle, silent [`Envelope`] writing to `channel`, whose full scale is `range` device units.
    ///
    /// `index` and `name` only identify the voice in logs.
    pub fn new(index: u8, name: &'static str, channel: DeviceId, range: f32, group: GroupId) -> Self {
        Self {
            index,
            name,
            channel,
            range,
            group,
            state: EnvelopeState::Idle,
            active: false,
            trigger_end: false,
            muted: false,
            dirty: false,
            peak_level: false,
            no_decay: false,
            dual_use: false,
            modulated: false,
            modulation_scale: MODULATION_SCALE,
            damper_mode: DamperMode::Off,
            damper: false,
            expression: 1.0,
            top: 0.0,
            bottom: 0.0,
            set_sustain: 0.0,
            attack_ms: 0.0,
            decay_ms: 0.0,
            release_ms: 0.0,
            sustain: 0.0,
            delta: 0.0,
            timer: 0.0,
            target_time: 0.0,
            current: 0.0,
        }
    }

    /// Begins a new contour. Does nothing if the voice is already sounding, muted, or has a peak of zero.
    pub fn start(&mut self, count: &mut ActiveCount) {
        if self.active || self.top == 0.0 || self.muted {
            return;
        }
        self.active = true;
        self.state = EnvelopeState::Start;
        count.increment();
        debug!("[env] {} {}: starting", self.index, self.name);
    }

    /// Enables or disables low-frequency modulation at the default depth, then [`start`](Self::start)s.
    pub fn start_modulated(&mut self, modulated: bool, count: &mut ActiveCount) {
        self.modulated = modulated;
        self.modulation_scale = MODULATION_SCALE;
        self.start(count);
    }

    /// Asks the voice to release on its next tick, from wherever it is. Does nothing if it isn't sounding.
    pub fn end(&mut self) {
        if self.active {
            self.trigger_end = true;
        }
    }

    /// Silences the voice immediately and returns it to [`EnvelopeState::Idle`], resting at its bottom level.
    ///
    /// The new level goes out with the next [`update`](Self::update).
    pub fn clear(&mut self, count: &mut ActiveCount) {
        if self.active {
            count.decrement();
        }
        self.active = false;
        self.trigger_end = false;
        self.state = EnvelopeState::Idle;
        self.current = self.bottom;
        self.dirty = true;
        trace!("[env] {} {}: cleared", self.index, self.name);
    }

    /// Mutes or unmutes the voice. Either way it is cleared; a muted voice ignores [`start`](Self::start).
    pub fn mute(&mut self, muted: bool, count: &mut ActiveCount) {
        self.muted = muted;
        debug!("[env] {} {}: mute set to {}", self.index, self.name, muted);
        self.clear(count);
    }

    /// Advances the state machine by `delta_ms`.
    pub fn process(&mut self, delta_ms: f32, count: &mut ActiveCount) {
        if self.modulated {
            self.dirty = true;
        }

        if self.trigger_end && self.state != EnvelopeState::Release {
            self.state = EnvelopeState::Release;
            self.timer = self.release_ms;
            self.delta = self.current - self.bottom;
            trace!(
                "[env] {} {}: {} ms from level {} to {}",
                self.index,
                self.name,
                self.release_ms,
                self.current,
                self.bottom
            );
            return;
        }

        match self.state {
            EnvelopeState::Start => {
                self.current = self.bottom;
                self.sustain = self.set_sustain;
                self.no_decay = self.decay_ms < NO_DECAY_MS;
                self.timer = 0.0;
                self.delta = self.top - self.bottom;
                self.peak_level = false;
                self.target_time = self.attack_ms;
                self.state = EnvelopeState::Attack;
                trace!(
                    "[env] {} {}: {} ms from level {} to {}",
                    self.index,
                    self.name,
                    self.attack_ms,
                    self.current,
                    self.top
                );
            }
            EnvelopeState::Attack => {
                self.timer += delta_ms;
                self.dirty = true;
                if self.timer < self.target_time {
                    self.current = self.bottom + (self.timer / self.target_time) * self.delta;
                    return;
                }
                self.current = self.top;
                if self.no_decay {
                    self.timer = 0.0;
                    self.state = EnvelopeState::Sustain;
                    trace!("[env] {} {}: holding at {}", self.index, self.name, self.current);
                } else {
                    self.timer = self.decay_ms;
                    self.delta = self.top - self.sustain;
                    self.target_time = 0.0;
                    self.state = EnvelopeState::Decay;
                }
            }
            EnvelopeState::Decay => {
                self.timer -= delta_ms;
                self.dirty = true;
                if self.timer > DECAY_DONE_MS {
                    self.current = self.sustain + (self.timer / self.decay_ms) * self.delta;
                    return;
                }
                self.current = self.sustain;
                self.timer = 0.0;
                self.state = EnvelopeState::Sustain;
                self.peak_level = self.sustain >= self.top;
                trace!("[env] {} {}: sustained at {}", self.index, self.name, self.current);
            }
            EnvelopeState::Sustain => {
                if self.peak_level && !self.dual_use && self.current != self.top {
                    self.current = self.top;
                    self.dirty = true;
                }
            }
            EnvelopeState::Release => {
                self.trigger_end = false;
                self.timer -= delta_ms;
                if self.timer > RELEASE_DONE_MS {
                    self.current = self.bottom + (self.timer / self.release_ms) * self.delta;
                    self.dirty = true;
                    return;
                }
                if self.damper_mode.holds(self.damper) {
                    // parked at the threshold until the pedal lets go
                    self.timer = RELEASE_DONE_MS;
                    return;
                }
                self.clear(count);
            }
            EnvelopeState::Idle => {
                error!(
                    "[env] {} {}: processed while idle but active, clearing",
                    self.index, self.name
                );
                self.clear(count);
            }
        }
    }

    /// Writes the voice's level to its channel if it changed since the last write.
    ///
    /// `triangle` is the modulation source's current triangle value, applied only when modulation is enabled. The
    /// level is scaled to the channel's range and by the expression gain.
    pub fn update(&mut self, triangle: f32, output: &mut impl AnalogOutput) -> Result<(), DeviceError> {
        if !self.dirty {
            return Ok(());
        }
        self.dirty = false;

        let mut level = self.current;
        if self.modulated {
            level = (level + level * triangle * self.modulation_scale).clamp(0.0, 1.0);
        }
        let code = (self.range * level * self.expression) as u16;
        output.set_analog_out(self.channel, code)
    }

    /// Overwrites the current level and writes it straight to the channel, ignoring expression and modulation.
    pub fn set_current(&mut self, level: f32, output: &mut impl AnalogOutput) -> Result<(), DeviceError> {
        self.current = level;
        output.set_analog_out(self.channel, (level * self.range) as u16)
    }

    /// Writes a raw device code to the channel, bypassing the envelope entirely.
    pub fn set_override(&self, code: u16, output: &mut impl AnalogOutput) -> Result<(), DeviceError> {
        output.set_analog_out(self.channel, code)
    }

    /// Sets the post-scale gain, 0 to 1.
    pub fn set_expression(&mut self, level: f32) {
        self.expression = level;
    }

    /// Records whether the sustain pedal is down.
    pub fn set_damper(&mut self, down: bool) {
        self.damper = down;
    }

    /// Setter.
    pub fn set_damper_mode(&mut self, mode: DamperMode) {
        self.damper_mode = mode;
    }

    /// Setter.
    pub fn set_dual_use(&mut self, dual_use: bool) {
        self.dual_use = dual_use;
    }

    /// Enables or disables low-frequency modulation without starting the voice.
    pub fn set_modulation(&mut self, modulated: bool) {
        self.modulated = modulated;
        debug!("[env] {} {}: modulation {}", self.index, self.name, modulated);
    }

    /// Sets the duration of `stage` in milliseconds.
    pub fn set_time(&mut self, stage: Stage, ms: f32) {
        match stage {
            Stage::Attack => self.attack_ms = ms,
            Stage::Decay => self.decay_ms = ms,
            Stage::Release => self.release_ms = ms,
        }
        debug!("[env] {} {}: {} time set to {} ms", self.index, self.name, stage, ms);
    }

    /// Duration of `stage` in milliseconds.
    pub fn time(&self, stage: Stage) -> f32 {
        match stage {
            Stage::Attack => self.attack_ms,
            Stage::Decay => self.decay_ms,
            Stage::Release => self.release_ms,
        }
    }

    /// Sets a target level, as a fraction of full range. Takes effect from the next start.
    pub fn set_level(&mut self, level: Level, value: f32) {
        match level {
            Level::Bottom => self.bottom = value,
            Level::Top => self.top = value,
            Level::Sustain => self.set_sustain = value,
        }
        debug!("[env] {} {}: {} level set to {}", self.index, self.name, level, value);
    }

    /// A target level, as a fraction of full range.
    pub fn level(&self, level: Level) -> f32 {
        match level {
            Level::Bottom => self.bottom,
            Level::Top => self.top,
            Level::Sustain => self.set_sustain,
        }
    }

    /// Getter.
    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    /// The level before modulation, range and expression are applied.
    pub fn current(&self) -> f32 {
        self.current
    }

    /// Getter.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Getter.
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Getter.
    pub fn is_dual_use(&self) -> bool {
        self.dual_use
    }

    /// Getter.
    pub fn is_modulated(&self) -> bool {
        self.modulated
    }

    /// Getter.
    pub fn damper_mode(&self) -> DamperMode {
        self.damper_mode
    }

    /// The output channel.
    pub fn channel(&self) -> DeviceId {
        self.channel
    }

    /// Getter.
    pub fn group(&self) -> GroupId {
        self.group
    }

    /// Getter.
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Getter.
    pub fn name(&self) -> &'static str {
        self.name
    }
}
