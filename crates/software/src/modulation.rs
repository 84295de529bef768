//! Low-frequency modulation sources, consumed by the envelope generator once per tick.

use core::f32::consts::TAU;
use num_traits::Float;

/// Multiplier mapping a 7-bit coarse rate onto the 12-bit rate code.
const COARSE_MULTIPLIER: f32 = 32.245;

/// Largest rate code.
pub const MAX_RATE_CODE: u16 = 4095;

/// Frequency in Hz of one rate code step.
const HZ_PER_CODE: f32 = 0.014648;

/// A bipolar waveform source advanced once per control-loop tick.
pub trait Modulation {
    /// Advances the waveform by `delta_ms`.
    fn tick(&mut self, delta_ms: f32);

    /// Current triangle value, -1 to 1.
    fn triangle(&self) -> f32;

    /// Current sine value, -1 to 1.
    fn sine(&self) -> f32;
}

/// A triangle and sine LFO computed in software.
///
/// Both outputs are scaled by a depth, typically the modulation wheel, which starts at zero so the LFO is silent
/// until something turns it up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftLfo {
    coarse: u8,
    fine: u16,
    code: u16,
    wavelength_ms: f32,
    phase_ms: f32,
    triangle: f32,
    sine: f32,
    depth: f32,
}

impl Default for SoftLfo {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftLfo {
    /// Constructs a [`SoftLfo`] at the slowest rate, with zero depth.
    pub fn new() -> Self {
        let mut lfo = Self {
            coarse: 0,
            fine: 1,
            code: 1,
            wavelength_ms: 0.0,
            phase_ms: 0.0,
            triangle: 0.0,
            sine: 0.0,
            depth: 0.0,
        };
        lfo.set_code(1);
        lfo
    }

    /// Sets the coarse rate, 0 to 127.
    pub fn set_coarse(&mut self, coarse: u8) {
        self.coarse = coarse;
        self.combine();
    }

    /// Sets the fine rate. Zero is treated as one.
    pub fn set_fine(&mut self, fine: u16) {
        self.fine = fine.max(1);
        self.combine();
    }

    fn combine(&mut self) {
        let code = f32::from(self.coarse) * COARSE_MULTIPLIER + f32::from(self.fine);
        self.set_code(code.min(f32::from(MAX_RATE_CODE)) as u16);
    }

    /// Sets the rate code directly, capped at [`MAX_RATE_CODE`].
    pub fn set_code(&mut self, code: u16) {
        self.code = code.clamp(1, MAX_RATE_CODE);
        self.wavelength_ms = 1000.0 / self.frequency_hz();
        trace!("[lfo] rate code {} = {} ms", self.code, self.wavelength_ms);
    }

    /// Getter.
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Frequency in Hz.
    pub fn frequency_hz(&self) -> f32 {
        f32::from(self.code) * HZ_PER_CODE
    }

    /// Length of one cycle in milliseconds.
    pub fn wavelength_ms(&self) -> f32 {
        self.wavelength_ms
    }

    /// Sets the output multiplier, 0 to 1.
    pub fn set_depth(&mut self, depth: f32) {
        self.depth = depth;
    }

    /// Getter.
    pub fn depth(&self) -> f32 {
        self.depth
    }
}

impl Modulation for SoftLfo {
    fn tick(&mut self, delta_ms: f32) {
        // a stalled frame can span several cycles
        self.phase_ms = (self.phase_ms + delta_ms) % self.wavelength_ms;

        let position = self.phase_ms / self.wavelength_ms;
        let doubled = position * 2.0;
        self.triangle = if doubled > 1.0 {
            (1.0 - (doubled - 1.0) - 0.5) * 2.0
        } else {
            (doubled - 0.5) * 2.0
        };
        self.sine = Float::sin(position * TAU);
    }

    fn triangle(&self) -> f32 {
        self.triangle * self.depth
    }

    fn sine(&self) -> f32 {
        self.sine * self.depth
    }
}
