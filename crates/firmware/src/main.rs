//! Voltaic is [Embassy](https://embassy.dev)-based firmware which shapes the control voltages of an analog
//! synthesizer. Each note drives a pair of ADSR envelopes, one for loudness (VCA) and one for filter cutoff (VCF),
//! whose levels are written every millisecond to DAC boards on a shared I2C bus. The firmware runs on the
//! [Nucleo-F767ZI development board](https://www.st.com/en/evaluation-tools/nucleo-f767zi.html), which is powered
//! by an F7-series STM32 microcontroller.
//!
//! The player's key opens a gate, the sustain pedal holds sounding notes according to the selected
//! [`DamperMode`][`voltaic_lib::configuration::DamperMode`], and a front panel pot sets how deeply the filter
//! envelopes are modulated.
//!
//! For details about the hardware or how to use the device, see the `README`.

#![no_std]
#![no_main]

mod control;
mod damper;
mod performance;
mod rig;
mod twi;

use crate::{
    control::Controller,
    damper::DAMPER_MODE_SYNC,
    performance::{GATE_SYNC, PEDAL_SYNC},
    twi::Twi,
};
use defmt::*;
use embassy_executor::Spawner;
use embassy_stm32::{
    Config,
    exti::ExtiInput,
    gpio::{Level, Output, Pull, Speed},
    i2c::{self, I2c},
    time::Hertz,
};
use static_cell::StaticCell;
use voltaic_lib::{
    actuator::{Actuators, BUS_CLOCK_HZ},
    envelope::EnvelopeGenerator,
    frame_clock::Heartbeat,
    modulation::SoftLfo,
};

use {defmt_rtt as _, panic_probe as _};

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Initializing Voltaic");

    let mut config = Config::default();
    {
        use embassy_stm32::rcc::*;
        // hse: high-speed external clock
        config.rcc.hse = Some(Hse {
            freq: Hertz(8_000_000),
            mode: HseMode::Bypass,
        });

        // pll: phase-locked loop, crucial for dividing clock
        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL216,
            divp: Some(PllPDiv::DIV2), // 8mhz / 4 * 216 / 2 = 216Mhz
            divq: None,
            divr: None,
        });
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        // I2C1 is clocked from APB1, which must not exceed 54Mhz
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;
        config.rcc.sys = Sysclk::PLL1_P;
    }
    let p = embassy_stm32::init(config);

    // per the Nucleo board manual (UM1974), PB8 and PB9 are broken out as the Arduino SCL and SDA pins
    let mut i2c_config = i2c::Config::default();
    i2c_config.frequency = Hertz(BUS_CLOCK_HZ);
    let i2c = I2c::new_blocking(p.I2C1, p.PB8, p.PB9, i2c_config);

    let mut heartbeat = Heartbeat::new();
    let mut actuators = Actuators::new(Twi::new(i2c));
    match actuators.begin(rig::BOARDS) {
        Ok(0) => info!("[i2c] all boards ready"),
        Ok(unreachable) => {
            warn!("[i2c] running degraded, {} boards unreachable", unreachable);
            heartbeat.set_failing(true);
        }
        Err(e) => {
            error!("[i2c] bus setup failed: {}", e);
            heartbeat.set_failing(true);
        }
    }
    actuators.set_sample_callback(control::on_pot_sample);

    let mut generator = EnvelopeGenerator::new();
    let voicing = unwrap!(rig::build_voices(&mut generator));

    static CONTROLLER: StaticCell<Controller> = StaticCell::new();
    let controller = CONTROLLER.init(Controller {
        actuators,
        generator,
        voicing,
        lfo: SoftLfo::new(),
        heartbeat,
    });

    let key = ExtiInput::new(p.PC13, p.EXTI13, Pull::None);
    let pedal = ExtiInput::new(p.PD0, p.EXTI0, Pull::Up);
    unwrap!(spawner.spawn(performance::performance_input(
        key,
        pedal,
        GATE_SYNC.sender(),
        PEDAL_SYNC.sender()
    )));

    let button = ExtiInput::new(p.PD1, p.EXTI1, Pull::Up);
    unwrap!(spawner.spawn(damper::select_damper_mode(
        button,
        DAMPER_MODE_SYNC.sender()
    )));

    let red_led = Output::new(p.PB14, Level::Low, Speed::Low);
    let damper_mode = unwrap!(DAMPER_MODE_SYNC.receiver());
    unwrap!(spawner.spawn(damper::display_damper_mode(red_led, damper_mode)));

    let green_led = Output::new(p.PB0, Level::Low, Speed::Low);
    unwrap!(spawner.spawn(control::control_loop(
        controller,
        green_led,
        GATE_SYNC.anon_receiver(),
        PEDAL_SYNC.anon_receiver(),
        DAMPER_MODE_SYNC.anon_receiver()
    )));
}
