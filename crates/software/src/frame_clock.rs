//! Frame timing for the control loop, and the heartbeat LED pattern that rides on it.

use embassy_time::{Duration, Instant};

/// Frames longer than this are assumed to be stalls caused by debug output, and don't count towards the longest
/// frame.
pub const STALL_MS: f32 = 210.0;

/// Measures the time between control-loop ticks.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameClock {
    started: Option<Instant>,
    last: Option<Instant>,
    runtime: Duration,
    delta_ms: f32,
    average_ms: f32,
    longest_ms: f32,
}

impl FrameClock {
    /// Constructs a [`FrameClock`] which hasn't seen a frame yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the start of a frame at `now`, returning the milliseconds since the previous mark (zero for the first).
    pub fn mark(&mut self, now: Instant) -> f32 {
        let started = *self.started.get_or_insert(now);
        let elapsed = self
            .last
            .replace(now)
            .and_then(|last| now.checked_duration_since(last))
            .unwrap_or_default();
        self.runtime = now.checked_duration_since(started).unwrap_or_default();

        self.delta_ms = elapsed.as_micros() as f32 / 1000.0;
        self.average_ms = if self.average_ms == 0.0 {
            self.delta_ms
        } else {
            (self.average_ms + self.delta_ms) / 2.0
        };
        if self.delta_ms <= STALL_MS && self.delta_ms > self.longest_ms {
            self.longest_ms = self.delta_ms;
        }
        self.delta_ms
    }

    /// Time since the first mark.
    pub fn runtime(&self) -> Duration {
        self.runtime
    }

    /// Length of the latest frame in milliseconds.
    pub fn delta_ms(&self) -> f32 {
        self.delta_ms
    }

    /// Running average frame length in milliseconds, weighted towards recent frames.
    pub fn average_ms(&self) -> f32 {
        self.average_ms
    }

    /// Returns the longest frame since the last call, and starts measuring afresh.
    pub fn take_longest(&mut self) -> f32 {
        core::mem::take(&mut self.longest_ms)
    }
}

/// How often the heartbeat pattern advances.
pub const HEARTBEAT_STEP_MS: f32 = 10.0;

/// Steps in one heartbeat cycle.
const HEARTBEAT_CYCLE: u32 = 100;

/// Steps between blinks in fail mode.
const FAIL_BLINK: u32 = 25;

/// Drives a status LED: a short pulse once a second when healthy, with extra blinks every 250 ms in fail mode.
#[derive(Debug, Clone, Copy)]
pub struct Heartbeat {
    accumulated_ms: f32,
    counter: u32,
    failing: bool,
    lit: bool,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            accumulated_ms: 0.0,
            counter: 1,
            failing: false,
            lit: false,
        }
    }
}

impl Heartbeat {
    /// Constructs a healthy [`Heartbeat`] which lights on its first step.
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches fail mode on or off.
    pub fn set_failing(&mut self, failing: bool) {
        if failing != self.failing {
            info!("[clock] heartbeat fail mode {}", failing);
        }
        self.failing = failing;
    }

    /// Getter.
    pub fn is_failing(&self) -> bool {
        self.failing
    }

    /// Accumulates `delta_ms` of frame time and returns whether the LED should be lit.
    pub fn advance(&mut self, delta_ms: f32) -> bool {
        self.accumulated_ms += delta_ms;
        if self.accumulated_ms >= HEARTBEAT_STEP_MS {
            self.accumulated_ms = 0.0;
            self.step();
        }
        self.lit
    }

    fn step(&mut self) {
        self.counter -= 1;
        if self.counter == 0 {
            self.lit = true;
            self.counter = HEARTBEAT_CYCLE;
        }
        if self.failing {
            self.lit = self.counter % FAIL_BLINK == 0;
        }
        if self.counter == HEARTBEAT_CYCLE - 2 {
            self.lit = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    #[test]
    fn first_mark_is_zero() {
        let mut clock = FrameClock::new();
        assert_eq!(0.0, clock.mark(Instant::from_millis(500)), "Expected left but got right");
        assert_eq!(Duration::from_millis(0), clock.runtime(), "Expected left but got right");
    }

    #[test]
    fn deltas_and_runtime() {
        let mut clock = FrameClock::new();
        clock.mark(Instant::from_millis(100));
        assert_eq!(2.0, clock.mark(Instant::from_millis(102)), "Expected left but got right");
        assert_eq!(0.5, clock.mark(Instant::from_micros(102_500)), "Expected left but got right");
        assert_eq!(Duration::from_micros(2_500), clock.runtime(), "Expected left but got right");
    }

    #[test]
    fn average_leans_on_recent_frames() {
        let mut clock = FrameClock::new();
        clock.mark(Instant::from_millis(0));
        clock.mark(Instant::from_millis(4));
        assert_eq!(4.0, clock.average_ms(), "First real frame seeds the average");
        clock.mark(Instant::from_millis(6));
        assert_eq!(3.0, clock.average_ms(), "Expected left but got right");
    }

    #[test]
    fn longest_ignores_stalls_and_resets() {
        let mut clock = FrameClock::new();
        clock.mark(Instant::from_millis(0));
        clock.mark(Instant::from_millis(3));
        clock.mark(Instant::from_millis(500));
        clock.mark(Instant::from_millis(501));
        assert_eq!(3.0, clock.take_longest(), "Expected left but got right");
        assert_eq!(0.0, clock.take_longest(), "Expected left but got right");
    }

    /// LED state at each 10 ms step over `steps` steps.
    fn pattern(heartbeat: &mut Heartbeat, steps: usize) -> Vec<bool> {
        (0..steps).map(|_| heartbeat.advance(10.0)).collect()
    }

    #[test]
    fn healthy_pulse_once_a_second() {
        let mut heartbeat = Heartbeat::new();
        let lit: Vec<usize> = pattern(&mut heartbeat, 300)
            .into_iter()
            .enumerate()
            .filter_map(|(step, lit)| lit.then_some(step))
            .collect();
        assert_eq!(
            std::vec![0, 1, 100, 101, 200, 201],
            lit,
            "Expected left but got right"
        );
    }

    #[test]
    fn fail_mode_adds_blinks() {
        let mut heartbeat = Heartbeat::new();
        heartbeat.set_failing(true);
        let lit: Vec<usize> = pattern(&mut heartbeat, 100)
            .into_iter()
            .enumerate()
            .filter_map(|(step, lit)| lit.then_some(step))
            .collect();
        assert_eq!(std::vec![0, 25, 50, 75], lit, "Expected left but got right");
    }

    #[test]
    fn short_frames_accumulate() {
        let mut heartbeat = Heartbeat::new();
        assert!(!heartbeat.advance(4.0));
        assert!(!heartbeat.advance(4.0));
        assert!(heartbeat.advance(4.0), "Third frame crosses 10 ms");
    }
}
