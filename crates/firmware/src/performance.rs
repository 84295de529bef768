//! The player's inputs: a key which opens the gate and a sustain pedal.

use defmt::debug;
use embassy_futures::select::{Either, select};
use embassy_stm32::exti::ExtiInput;
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    watch::{AnonReceiver, Sender, Watch},
};

const GATE_RECEIVER_CNT: usize = 0;
/// Syncs the gate (key down) state across tasks.
pub static GATE_SYNC: Watch<CriticalSectionRawMutex, bool, GATE_RECEIVER_CNT> = Watch::new();
pub type GateSender<'a> = Sender<'a, CriticalSectionRawMutex, bool, GATE_RECEIVER_CNT>;
pub type GateSpy<'a> = AnonReceiver<'a, CriticalSectionRawMutex, bool, GATE_RECEIVER_CNT>;

const PEDAL_RECEIVER_CNT: usize = 0;
/// Syncs the sustain pedal (down) state across tasks.
pub static PEDAL_SYNC: Watch<CriticalSectionRawMutex, bool, PEDAL_RECEIVER_CNT> = Watch::new();
pub type PedalSender<'a> = Sender<'a, CriticalSectionRawMutex, bool, PEDAL_RECEIVER_CNT>;
pub type PedalSpy<'a> = AnonReceiver<'a, CriticalSectionRawMutex, bool, PEDAL_RECEIVER_CNT>;

/// Watches the key and the pedal, publishing every change.
///
/// The key reads high while pressed. The pedal is a normally open switch to ground, so it reads low while down.
#[embassy_executor::task]
pub async fn performance_input(
    mut key: ExtiInput<'static>,
    mut pedal: ExtiInput<'static>,
    gate: GateSender<'static>,
    sustain: PedalSender<'static>,
) -> ! {
    gate.send(key.is_high());
    sustain.send(pedal.is_low());

    loop {
        match select(key.wait_for_any_edge(), pedal.wait_for_any_edge()).await {
            Either::First(_) => {
                let open = key.is_high();
                debug!("Gate {}", open);
                gate.send(open);
            }
            Either::Second(_) => {
                let down = pedal.is_low();
                debug!("Pedal {}", down);
                sustain.send(down);
            }
        }
    }
}
