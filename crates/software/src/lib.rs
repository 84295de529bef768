//! This crate contains architecture-agnostic logic for Voltaic, firmware which turns note, pedal and modulation
//! events into continuously varying control voltages for an analog synthesizer. The voltages are produced by DAC
//! boards hanging off a single [I2C](https://en.wikipedia.org/wiki/I%C2%B2C) bus, several of them behind bus
//! multiplexers.
//!
//! Two pieces do the real work:
//! - the [`envelope`] engine, which runs one ADSR state machine per voice and computes a 0..1 level every
//!   control-loop tick, and
//! - the [`actuator`] layer, which maps small-integer channel handles onto physical chips, buffers writes, and
//!   coalesces each tick's changes into at most one bus transaction per board.
//!
//! Everything here is `no_std` and free of hardware specifics beyond the [`embedded_hal::i2c::I2c`] trait, so it
//! can be tested on the host.

#![deny(missing_docs)]
#![no_std]

#[cfg(test)]
extern crate std;

// must come first so the logging macros are visible to the modules below
mod fmt;

/// Logical channels, physical boards and the chip families behind them.
pub mod actuator;

pub mod configuration;

/// Per-voice ADSR state machines and the generator which drives them.
pub mod envelope;

pub mod frame_clock;

pub mod modulation;
