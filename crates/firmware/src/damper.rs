//! Tasks and types related to the [damper mode](`DamperMode`) setting.

use defmt::info;
use embassy_stm32::{exti::ExtiInput, gpio::Output};
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    watch::{AnonReceiver, Receiver, Sender, Watch},
};
use embassy_time::Timer;
use num_traits::ToPrimitive;
use voltaic_lib::configuration::{CycleConfig, DamperMode};

const DAMPER_MODE_RECEIVER_CNT: usize = 1;
/// Syncs the [damper mode](`DamperMode`) across tasks.
pub static DAMPER_MODE_SYNC: Watch<CriticalSectionRawMutex, DamperMode, DAMPER_MODE_RECEIVER_CNT> =
    Watch::new_with(DamperMode::Normal);
pub type DamperModeSender<'a> =
    Sender<'a, CriticalSectionRawMutex, DamperMode, DAMPER_MODE_RECEIVER_CNT>;
pub type DamperModeReceiver<'a> =
    Receiver<'a, CriticalSectionRawMutex, DamperMode, DAMPER_MODE_RECEIVER_CNT>;
pub type DamperModeSpy<'a> =
    AnonReceiver<'a, CriticalSectionRawMutex, DamperMode, DAMPER_MODE_RECEIVER_CNT>;

/// Handles button presses, cycling through the [`DamperMode`] settings.
#[embassy_executor::task]
pub async fn select_damper_mode(
    mut button: ExtiInput<'static>,
    damper_mode: DamperModeSender<'static>,
) -> ! {
    loop {
        button.wait_for_falling_edge().await;

        let new_state = damper_mode.try_get().unwrap_or_default().cycle();
        info!("Damper mode set to {}", new_state);
        damper_mode.send(new_state);
    }
}

/// Provides a quick and dirty status indicator for the [`DamperMode`].
///
/// Each cycle is divided in half. The LED remains dark for one half. For the other, the
/// LED lights up N times (where N is one more than the index of the selected mode).
#[embassy_executor::task]
pub async fn display_damper_mode(
    mut led: Output<'static>,
    mut damper_mode: DamperModeReceiver<'static>,
) -> ! {
    const BLINK_SLEEP_MS: u64 = 1_000_000;

    loop {
        led.set_low();
        Timer::after_micros(BLINK_SLEEP_MS).await;

        // since the index starts with 0, 1 is added or else the LED wouldn't blink at all for the zeroth mode
        let blink_cnt = damper_mode
            .get()
            .await
            .to_u8()
            .unwrap_or_default()
            .saturating_add(1);
        // mult by two to account for the "off" periods, sub 1 so the LED always starts and ends lit
        let animation_frames = blink_cnt * 2 - 1;
        let mut counter = animation_frames;
        while counter > 0 {
            led.toggle();
            Timer::after_micros(BLINK_SLEEP_MS / u64::from(animation_frames)).await;
            counter -= 1;
        }
    }
}
