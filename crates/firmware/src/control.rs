//! The control loop: the only task which touches the envelope generator and the bus.

use crate::{
    damper::DamperModeSpy,
    performance::{GateSpy, PedalSpy},
    rig::{self, Voicing},
    twi::Twi,
};
use defmt::{debug, error, info, warn};
use embassy_stm32::gpio::Output;
use embassy_time::{Duration, Instant, Ticker};
use voltaic_lib::{
    actuator::{Actuators, chip::ads1115},
    envelope::EnvelopeGenerator,
    frame_clock::{FrameClock, Heartbeat},
    modulation::SoftLfo,
};

/// Control-loop period.
pub const TICK: Duration = Duration::from_millis(1);

/// Ticks between conversions of the depth pot.
const POT_INTERVAL: u32 = 50;

/// Ticks between frame timing reports.
const REPORT_INTERVAL: u32 = 10_000;

/// Pot voltage which means full modulation depth.
const POT_FULL_SCALE_VOLTS: f64 = 3.3;

/// Everything the control loop owns.
pub struct Controller {
    /// The bus and every board on it.
    pub actuators: Actuators<Twi>,
    /// Every voice.
    pub generator: EnvelopeGenerator,
    /// Voice handles.
    pub voicing: Voicing,
    /// Shared modulation source.
    pub lfo: SoftLfo,
    /// Status LED pattern.
    pub heartbeat: Heartbeat,
}

/// Logs each completed pot conversion.
pub fn on_pot_sample(sample: i16) {
    debug!(
        "[adc] pot at {} V",
        ads1115::SAMPLE_GAIN.voltage(sample).as_volts()
    );
}

/// Runs one control-loop tick every [`TICK`]: frame clock, player input, envelopes and flush, pot, heartbeat.
#[embassy_executor::task]
pub async fn control_loop(
    controller: &'static mut Controller,
    mut heartbeat_led: Output<'static>,
    mut gate: GateSpy<'static>,
    mut pedal: PedalSpy<'static>,
    mut damper_mode: DamperModeSpy<'static>,
) -> ! {
    let Controller {
        actuators,
        generator,
        voicing,
        lfo,
        heartbeat,
    } = controller;

    let mut clock = FrameClock::new();
    let mut ticker = Ticker::every(TICK);
    let mut ticks: u32 = 0;
    // note channel of the most recent gate, rotated on every new note so held releases keep ringing
    let mut channel = rig::NOTE_CHANNELS - 1;

    if let Some(mode) = damper_mode.try_get() {
        generator.set_damper_mode(mode);
    }

    loop {
        let delta_ms = clock.mark(Instant::now());

        if let Some(mode) = damper_mode.try_changed() {
            generator.set_damper_mode(mode);
        }
        if let Some(down) = pedal.try_changed() {
            generator.set_damper(down);
        }
        if let Some(open) = gate.try_changed() {
            if open {
                channel = (channel + 1) % rig::NOTE_CHANNELS;
            }
            let note = voicing.notes[channel];
            let handled = if open {
                generator
                    .start(note.vca)
                    .and_then(|_| generator.start_modulated(note.vcf, true))
            } else {
                generator
                    .end(note.vca)
                    .and_then(|_| generator.end(note.vcf))
            };
            if let Err(e) = handled {
                error!("[env] channel {}: {}", channel, e);
            }
            debug!(
                "[env] channel {} {}: {} VCA and {} VCF voices sounding",
                channel,
                if open { "on" } else { "off" },
                generator.active_count(voicing.vca_group),
                generator.active_count(voicing.vcf_group)
            );
            if let Err(e) = actuators.set_digital_out(rig::gate(channel), open) {
                error!("[i2c] gate {}: {}", channel, e);
            }
        }

        let failures = generator.tick(delta_ms, &mut *lfo, &mut *actuators);
        if failures > 0 {
            warn!("[i2c] {} boards failed to flush", failures);
        }

        if let Some(sample) = actuators.poll() {
            let volts = ads1115::SAMPLE_GAIN.voltage(sample).as_volts();
            lfo.set_depth((volts / POT_FULL_SCALE_VOLTS).clamp(0.0, 1.0) as f32);
        }
        if ticks % POT_INTERVAL == 0 {
            if let Err(e) = actuators.start_conversion(rig::DEPTH_POT) {
                error!("[adc] {}", e);
            }
        }

        if heartbeat.advance(delta_ms) {
            heartbeat_led.set_high();
        } else {
            heartbeat_led.set_low();
        }

        ticks = ticks.wrapping_add(1);
        if ticks % REPORT_INTERVAL == 0 {
            info!(
                "[clock] up {} ms, frame avg {} ms, longest {} ms",
                clock.runtime().as_millis(),
                clock.average_ms(),
                clock.take_longest()
            );
        }

        ticker.next().await;
    }
}
