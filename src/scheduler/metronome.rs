// Lookahead metronome - self-clocked pulse generator
// No shared transport: a coarse re-arm tick (itself a timer trigger)
// pre-schedules every pulse due within the lookahead window, so pulse
// timing never depends on the tick's punctuality. A delayed tick is
// caught up by the timer's in-order drain, never dropped.

use crate::audio::click::ClickKind;
use crate::audio::clock::ClockSource;
use crate::error::{EngineError, EngineResult};
use crate::scheduler::bridge::{TriggerPayload, TriggerSink, VisualSyncBridge};
use crate::scheduler::timer::{TriggerHandle, TriggerTimer};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// How far ahead pulses are pre-scheduled on each tick.
/// Must exceed the re-arm period plus its jitter or gaps appear.
const LOOKAHEAD_WINDOW: f64 = 0.120;
/// Re-arm tick period (window = 3x period, margin for a delayed pump)
const REARM_PERIOD: f64 = 0.040;

/// Metronome settings
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MetronomeConfig {
    /// Beats per minute
    pub bpm: f64,
    /// Beats per measure (time signature numerator)
    pub beats_per_measure: u32,
    /// Pulses per beat (1 = quarter notes, 2 = eighths, ...)
    pub subdivision: u32,
    /// Click gain, 0.0 to 1.0
    pub volume: f32,
}

impl MetronomeConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !self.bpm.is_finite() || self.bpm <= 0.0 {
            return Err(EngineError::InvalidScheduleState(format!(
                "bpm {} must be > 0",
                self.bpm
            )));
        }
        if self.beats_per_measure < 1 {
            return Err(EngineError::InvalidScheduleState(
                "beats_per_measure must be >= 1".into(),
            ));
        }
        if self.subdivision < 1 {
            return Err(EngineError::InvalidScheduleState(
                "subdivision must be >= 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(EngineError::InvalidScheduleState(format!(
                "volume {} out of range 0..1",
                self.volume
            )));
        }
        Ok(())
    }

    /// Seconds between consecutive pulses
    pub fn pulse_interval(&self) -> f64 {
        60.0 / (self.bpm * self.subdivision as f64)
    }

    /// Pulses per measure
    pub fn pulses_per_measure(&self) -> u64 {
        self.beats_per_measure as u64 * self.subdivision as u64
    }
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            beats_per_measure: 4,
            subdivision: 1,
            volume: 0.8,
        }
    }
}

struct MetronomeState {
    running: bool,
    config: MetronomeConfig,
    /// Total pulses scheduled since activation
    pulse_counter: u64,
    /// Wall-clock time of the next pulse to schedule
    next_pulse_time: f64,
    /// Pre-scheduled pulses, oldest first, pruned once fired
    pulse_handles: VecDeque<(f64, TriggerHandle)>,
    rearm_handle: Option<TriggerHandle>,
}

struct MetronomeShared {
    clock: Arc<dyn ClockSource>,
    timer: Arc<TriggerTimer>,
    sink: Arc<dyn TriggerSink>,
    bridge: Arc<dyn VisualSyncBridge>,
    state: Mutex<MetronomeState>,
    /// Bumped on start/stop/config change; stale ticks and pulses check it
    epoch: AtomicU64,
}

/// Free-running metronome scheduler (idle <-> running)
pub struct Metronome {
    shared: Arc<MetronomeShared>,
}

impl Metronome {
    pub fn new(
        clock: Arc<dyn ClockSource>,
        timer: Arc<TriggerTimer>,
        sink: Arc<dyn TriggerSink>,
        bridge: Arc<dyn VisualSyncBridge>,
    ) -> Self {
        Self {
            shared: Arc::new(MetronomeShared {
                clock,
                timer,
                sink,
                bridge,
                state: Mutex::new(MetronomeState {
                    running: false,
                    config: MetronomeConfig::default(),
                    pulse_counter: 0,
                    next_pulse_time: 0.0,
                    pulse_handles: VecDeque::new(),
                    rearm_handle: None,
                }),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// idle -> running: reset the pulse counter and start pulsing now
    pub fn start(&self, config: MetronomeConfig) -> EngineResult<()> {
        config.validate()?;
        let mut state = self.shared.state.lock().unwrap();
        let epoch = Self::invalidate(&self.shared, &mut state);

        state.running = true;
        state.config = config;
        state.pulse_counter = 0;
        state.next_pulse_time = self.shared.clock.now();

        Self::schedule_window(&self.shared, &mut state, epoch);
        Self::arm(&self.shared, &mut state, epoch);
        Ok(())
    }

    /// running -> idle: cancel every pre-scheduled pulse and the tick
    pub fn stop(&self) {
        let mut state = self.shared.state.lock().unwrap();
        if !state.running {
            return;
        }
        Self::invalidate(&self.shared, &mut state);
        state.running = false;
    }

    /// Replace the configuration. While running, pending pulses computed
    /// at the old rate are discarded and pulsing recomputes from now;
    /// the pulse counter (measure phase) is preserved.
    pub fn set_config(&self, config: MetronomeConfig) -> EngineResult<()> {
        config.validate()?;
        let mut state = self.shared.state.lock().unwrap();
        state.config = config;
        if state.running {
            let epoch = Self::invalidate(&self.shared, &mut state);
            state.next_pulse_time = self.shared.clock.now();
            Self::schedule_window(&self.shared, &mut state, epoch);
            Self::arm(&self.shared, &mut state, epoch);
        }
        Ok(())
    }

    /// Volume applies at fire time; no rescheduling needed
    pub fn set_volume(&self, volume: f32) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(EngineError::InvalidScheduleState(format!(
                "volume {volume} out of range 0..1"
            )));
        }
        self.shared.state.lock().unwrap().config.volume = volume;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().unwrap().running
    }

    pub fn config(&self) -> MetronomeConfig {
        self.shared.state.lock().unwrap().config
    }

    /// Bump the epoch and cancel everything outstanding. Returns the new
    /// epoch for fresh registrations.
    fn invalidate(
        shared: &Arc<MetronomeShared>,
        state: &mut MutexGuard<'_, MetronomeState>,
    ) -> u64 {
        let epoch = shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        shared
            .timer
            .cancel_batch(state.pulse_handles.drain(..).map(|(_, h)| h));
        if let Some(handle) = state.rearm_handle.take() {
            shared.timer.cancel(&handle);
        }
        epoch
    }

    /// Pre-schedule every pulse due within the lookahead window
    fn schedule_window(
        shared: &Arc<MetronomeShared>,
        state: &mut MutexGuard<'_, MetronomeState>,
        epoch: u64,
    ) {
        let horizon = shared.clock.now() + LOOKAHEAD_WINDOW;
        while state.next_pulse_time < horizon {
            let at = state.next_pulse_time;
            let pulse_in_measure = state.pulse_counter % state.config.pulses_per_measure();
            let kind = if pulse_in_measure == 0 {
                ClickKind::Downbeat
            } else if pulse_in_measure % state.config.subdivision as u64 == 0 {
                ClickKind::Beat
            } else {
                ClickKind::Subdivision
            };

            let pulse_shared = Arc::clone(shared);
            let handle = shared.timer.schedule(at, move || {
                Self::fire_pulse(&pulse_shared, epoch, kind, pulse_in_measure, at);
            });
            state.pulse_handles.push_back((at, handle));

            state.pulse_counter += 1;
            state.next_pulse_time += state.config.pulse_interval();
        }
    }

    /// Register the next re-arm tick
    fn arm(
        shared: &Arc<MetronomeShared>,
        state: &mut MutexGuard<'_, MetronomeState>,
        epoch: u64,
    ) {
        let tick_shared = Arc::clone(shared);
        let at = shared.clock.now() + REARM_PERIOD;
        state.rearm_handle = Some(shared.timer.schedule(at, move || {
            Self::rearm_tick(&tick_shared, epoch);
        }));
    }

    fn rearm_tick(shared: &Arc<MetronomeShared>, epoch: u64) {
        let mut state = shared.state.lock().unwrap();
        if shared.epoch.load(Ordering::SeqCst) != epoch || !state.running {
            return;
        }

        // Prune handles whose pulses have fired
        let now = shared.clock.now();
        while matches!(state.pulse_handles.front(), Some((at, _)) if *at <= now) {
            state.pulse_handles.pop_front();
        }

        Self::schedule_window(shared, &mut state, epoch);
        Self::arm(shared, &mut state, epoch);
    }

    fn fire_pulse(
        shared: &Arc<MetronomeShared>,
        epoch: u64,
        kind: ClickKind,
        pulse_in_measure: u64,
        at: f64,
    ) {
        let state = shared.state.lock().unwrap();
        if shared.epoch.load(Ordering::SeqCst) != epoch || !state.running {
            return;
        }
        let volume = state.config.volume;
        shared
            .sink
            .trigger(TriggerPayload::Click { kind }, volume, at, 0.0);
        shared.bridge.beat(pulse_in_measure);
        drop(state);
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clock::ManualClock;

    struct CollectingSink {
        fired: Mutex<Vec<(ClickKind, f32, f64)>>,
    }

    impl CollectingSink {
        fn new() -> Self {
            Self {
                fired: Mutex::new(Vec::new()),
            }
        }

        fn kinds(&self) -> Vec<ClickKind> {
            self.fired.lock().unwrap().iter().map(|(k, _, _)| *k).collect()
        }

        fn times(&self) -> Vec<f64> {
            self.fired.lock().unwrap().iter().map(|(_, _, at)| *at).collect()
        }
    }

    impl TriggerSink for CollectingSink {
        fn trigger(&self, payload: TriggerPayload, velocity: f32, at: f64, _duration: f64) {
            if let TriggerPayload::Click { kind } = payload {
                self.fired.lock().unwrap().push((kind, velocity, at));
            }
        }
    }

    struct CollectingBridge {
        pulses: Mutex<Vec<u64>>,
    }

    impl VisualSyncBridge for CollectingBridge {
        fn active_notes_changed(&self, _active: &std::collections::HashSet<u64>) {}
        fn beat(&self, pulse: u64) {
            self.pulses.lock().unwrap().push(pulse);
        }
    }

    struct Rig {
        metronome: Metronome,
        sink: Arc<CollectingSink>,
        bridge: Arc<CollectingBridge>,
        clock: Arc<ManualClock>,
        timer: Arc<TriggerTimer>,
    }

    fn rig() -> Rig {
        let clock = Arc::new(ManualClock::new());
        let timer = Arc::new(TriggerTimer::new());
        let sink = Arc::new(CollectingSink::new());
        let bridge = Arc::new(CollectingBridge {
            pulses: Mutex::new(Vec::new()),
        });
        let metronome = Metronome::new(
            Arc::clone(&clock) as Arc<dyn ClockSource>,
            Arc::clone(&timer),
            Arc::clone(&sink) as Arc<dyn TriggerSink>,
            Arc::clone(&bridge) as Arc<dyn VisualSyncBridge>,
        );
        Rig {
            metronome,
            sink,
            bridge,
            clock,
            timer,
        }
    }

    fn config(bpm: f64, beats: u32, subdivision: u32) -> MetronomeConfig {
        MetronomeConfig {
            bpm,
            beats_per_measure: beats,
            subdivision,
            volume: 0.8,
        }
    }

    /// Advance in 10ms steps, draining due triggers like the pump would
    fn run_for(rig: &Rig, seconds: f64) {
        let steps = (seconds / 0.01).round() as usize;
        for _ in 0..steps {
            rig.clock.advance(0.01);
            rig.timer.fire_due(rig.clock.now());
        }
    }

    #[test]
    fn test_60_bpm_four_four_fires_on_the_second() {
        let rig = rig();
        rig.metronome.start(config(60.0, 4, 1)).unwrap();
        rig.timer.fire_due(rig.clock.now());
        run_for(&rig, 3.99);

        // Exactly 4 pulses over the 4-second window, at t = 0, 1, 2, 3
        let times = rig.sink.times();
        assert_eq!(times, vec![0.0, 1.0, 2.0, 3.0]);

        // Pulse 0 is the accented downbeat, pulses 1-3 are not
        let kinds = rig.sink.kinds();
        assert_eq!(
            kinds,
            vec![
                ClickKind::Downbeat,
                ClickKind::Beat,
                ClickKind::Beat,
                ClickKind::Beat
            ]
        );
    }

    #[test]
    fn test_downbeat_repeats_each_measure() {
        let rig = rig();
        rig.metronome.start(config(240.0, 3, 1)).unwrap();
        rig.timer.fire_due(rig.clock.now());
        run_for(&rig, 1.49); // 6 pulses at 0.25s spacing

        assert_eq!(
            rig.sink.kinds(),
            vec![
                ClickKind::Downbeat,
                ClickKind::Beat,
                ClickKind::Beat,
                ClickKind::Downbeat,
                ClickKind::Beat,
                ClickKind::Beat,
            ]
        );
        assert_eq!(*rig.bridge.pulses.lock().unwrap(), vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_subdivision_pulses_between_beats() {
        let rig = rig();
        rig.metronome.start(config(120.0, 2, 2)).unwrap();
        rig.timer.fire_due(rig.clock.now());
        run_for(&rig, 0.99); // 4 pulses at 0.25s spacing

        assert_eq!(
            rig.sink.kinds(),
            vec![
                ClickKind::Downbeat,
                ClickKind::Subdivision,
                ClickKind::Beat,
                ClickKind::Subdivision,
            ]
        );
    }

    #[test]
    fn test_pulse_spacing_is_steady() {
        let rig = rig();
        rig.metronome.start(config(100.0, 4, 1)).unwrap();
        rig.timer.fire_due(rig.clock.now());
        run_for(&rig, 3.0);

        let times = rig.sink.times();
        assert!(times.len() >= 4);
        for pair in times.windows(2) {
            assert!((pair[1] - pair[0] - 0.6).abs() < 1e-9);
        }
    }

    #[test]
    fn test_stop_cancels_pending_pulses() {
        let rig = rig();
        rig.metronome.start(config(60.0, 4, 1)).unwrap();
        rig.timer.fire_due(rig.clock.now());
        run_for(&rig, 1.5);
        let fired_before = rig.sink.times().len();

        rig.metronome.stop();
        assert!(!rig.metronome.is_running());
        run_for(&rig, 3.0);
        assert_eq!(rig.sink.times().len(), fired_before);

        // Stopping again is a quiet no-op
        rig.metronome.stop();
    }

    #[test]
    fn test_bpm_change_discards_stale_pulses() {
        let rig = rig();
        rig.metronome.start(config(60.0, 4, 1)).unwrap();
        rig.timer.fire_due(rig.clock.now());
        run_for(&rig, 0.5); // downbeat at 0 fired; pulse at 1.0 pending

        rig.metronome.set_config(config(120.0, 4, 1)).unwrap();
        run_for(&rig, 1.2);

        // Pulsing recomputed from the change time (0.5): pulses at 0.5,
        // 1.0, 1.5 at the new half-second interval; nothing at the stale
        // old-rate placement computed before the change
        let times = rig.sink.times();
        assert_eq!(times, vec![0.0, 0.5, 1.0, 1.5]);
    }

    #[test]
    fn test_delayed_tick_catches_up_in_order() {
        let rig = rig();
        rig.metronome.start(config(240.0, 4, 1)).unwrap();
        rig.timer.fire_due(rig.clock.now());

        // Simulate a stalled pump: the clock jumps a full second with no
        // drains in between, then a single drain happens
        rig.clock.advance(1.0);
        rig.timer.fire_due(rig.clock.now());

        // Every overdue pulse fired, in time order, none dropped
        let times = rig.sink.times();
        assert_eq!(times, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_volume_applies_to_prescheduled_pulses() {
        let rig = rig();
        rig.metronome.start(config(60.0, 4, 1)).unwrap();
        // Pulse at t=0 is already registered; volume changes before it fires
        rig.metronome.set_volume(0.25).unwrap();
        rig.timer.fire_due(rig.clock.now());

        let fired = rig.sink.fired.lock().unwrap();
        assert_eq!(fired[0].1, 0.25);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let rig = rig();
        assert!(rig.metronome.start(config(0.0, 4, 1)).is_err());
        assert!(rig.metronome.start(config(-10.0, 4, 1)).is_err());
        assert!(rig.metronome.start(config(120.0, 0, 1)).is_err());
        assert!(rig.metronome.start(config(120.0, 4, 0)).is_err());
        assert!(
            rig.metronome
                .start(MetronomeConfig {
                    volume: 1.5,
                    ..MetronomeConfig::default()
                })
                .is_err()
        );
        assert!(!rig.metronome.is_running());
        assert!(rig.metronome.set_volume(2.0).is_err());
    }

    #[test]
    fn test_restart_resets_measure_phase() {
        let rig = rig();
        rig.metronome.start(config(240.0, 4, 1)).unwrap();
        rig.timer.fire_due(rig.clock.now());
        run_for(&rig, 0.6); // partway into the measure

        rig.metronome.stop();
        rig.metronome.start(config(240.0, 4, 1)).unwrap();
        rig.timer.fire_due(rig.clock.now());

        // Restart begins a fresh measure with a downbeat
        assert_eq!(*rig.sink.kinds().last().unwrap(), ClickKind::Downbeat);
    }

    #[test]
    fn test_config_roundtrips_through_serde() {
        let config = config(96.0, 3, 2);
        let json = serde_json::to_string(&config).unwrap();
        let back: MetronomeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
