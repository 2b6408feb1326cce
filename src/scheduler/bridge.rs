// Trigger sink and visual sync bridge seams
// The sink is the audio-producing side effect of a fired trigger; the
// bridge feeds the presentation layer. Audio triggers are never dropped
// by design; visual updates are coalesced and may be.

use crate::audio::click::ClickKind;
use crate::audio::clock::{ClockSource, SampleClock};
use crate::messaging::channels::{CommandProducer, UpdateProducer};
use crate::messaging::command::AudioCommand;
use crate::messaging::update::VisualUpdate;
use crate::scheduler::event::EventId;
use crate::scheduler::timer::TriggerTimer;
use ringbuf::traits::Producer;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// What a fired trigger should sound like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPayload {
    /// A pitched note
    Note { pitch: u8 },
    /// A metronome click
    Click { kind: ClickKind },
}

/// Audio-producing consumer of fired triggers.
///
/// `trigger` is fire-and-forget and must not block the scheduling loop.
/// `at` is the clock time the sound should start; `velocity` is a
/// normalized 0..1 gain; `duration` is in wall-clock seconds (already
/// tempo-scaled by the scheduler).
pub trait TriggerSink: Send + Sync {
    fn trigger(&self, payload: TriggerPayload, velocity: f32, at: f64, duration: f64);
}

/// Best-effort presentation-layer notifications.
///
/// `active_notes_changed` receives coalesced snapshots at frame cadence;
/// intermediate states may be skipped, the final state never is.
pub trait VisualSyncBridge: Send + Sync {
    fn active_notes_changed(&self, active: &HashSet<EventId>);
    fn beat(&self, pulse: u64);
}

/// Sink that does nothing (detached playback, tests)
pub struct NullSink;

impl TriggerSink for NullSink {
    fn trigger(&self, _payload: TriggerPayload, _velocity: f32, _at: f64, _duration: f64) {}
}

/// Bridge that does nothing
pub struct NullBridge;

impl VisualSyncBridge for NullBridge {
    fn active_notes_changed(&self, _active: &HashSet<EventId>) {}
    fn beat(&self, _pulse: u64) {}
}

/// Production sink: converts trigger times to sample offsets and pushes
/// commands into the ring buffer drained by the audio callback.
pub struct AudioSink {
    producer: Mutex<CommandProducer>,
    clock: SampleClock,
}

impl AudioSink {
    pub fn new(producer: CommandProducer, clock: SampleClock) -> Self {
        Self {
            producer: Mutex::new(producer),
            clock,
        }
    }

    fn push(&self, command: AudioCommand) {
        let mut producer = self.producer.lock().unwrap();
        if producer.try_push(command).is_err() {
            eprintln!("Warning: audio command buffer full, trigger dropped");
        }
    }

    /// Kill all sounding voices (transport stop)
    pub fn stop_all(&self) {
        self.push(AudioCommand::StopAll);
    }
}

impl TriggerSink for AudioSink {
    fn trigger(&self, payload: TriggerPayload, velocity: f32, at: f64, duration: f64) {
        // A trigger aimed at the past starts at the next possible sample
        let start_sample = self.clock.seconds_to_samples(at.max(self.clock.now()));

        let command = match payload {
            TriggerPayload::Click { kind } => AudioCommand::Click {
                kind,
                gain: velocity,
                start_sample,
            },
            TriggerPayload::Note { pitch } => AudioCommand::Tone {
                pitch,
                gain: velocity,
                start_sample,
                duration_samples: self.clock.seconds_to_samples(duration),
            },
        };
        self.push(command);
    }
}

/// Production bridge: forwards updates over a ring buffer for the UI
/// thread to drain. A full buffer drops the update (visual state is
/// best-effort; the next snapshot supersedes it).
pub struct ChannelBridge {
    producer: Mutex<UpdateProducer>,
}

impl ChannelBridge {
    pub fn new(producer: UpdateProducer) -> Self {
        Self {
            producer: Mutex::new(producer),
        }
    }
}

impl VisualSyncBridge for ChannelBridge {
    fn active_notes_changed(&self, active: &HashSet<EventId>) {
        let mut ids: Vec<EventId> = active.iter().copied().collect();
        ids.sort_unstable();
        let _ = self
            .producer
            .lock()
            .unwrap()
            .try_push(VisualUpdate::ActiveNotes(ids));
    }

    fn beat(&self, pulse: u64) {
        let _ = self.producer.lock().unwrap().try_push(VisualUpdate::Beat(pulse));
    }
}

struct ActiveInner {
    active: HashSet<EventId>,
    dirty: bool,
    flush_scheduled: bool,
    last_flush: f64,
}

struct ActiveShared {
    inner: Mutex<ActiveInner>,
    bridge: Arc<dyn VisualSyncBridge>,
    clock: Arc<dyn ClockSource>,
    timer: Arc<TriggerTimer>,
    frame_period: f64,
}

/// Tracks which notes are sounding and forwards the set to the bridge,
/// coalesced to presentation-frame cadence.
///
/// A change inside the cadence window marks the set dirty and schedules a
/// trailing flush on the trigger timer, so the final state is always
/// delivered even when no further note events arrive.
#[derive(Clone)]
pub struct ActiveNotes {
    shared: Arc<ActiveShared>,
}

impl ActiveNotes {
    pub fn new(
        bridge: Arc<dyn VisualSyncBridge>,
        clock: Arc<dyn ClockSource>,
        timer: Arc<TriggerTimer>,
        frame_period: f64,
    ) -> Self {
        Self {
            shared: Arc::new(ActiveShared {
                inner: Mutex::new(ActiveInner {
                    active: HashSet::new(),
                    dirty: false,
                    flush_scheduled: false,
                    last_flush: f64::NEG_INFINITY,
                }),
                bridge,
                clock,
                timer,
                frame_period,
            }),
        }
    }

    pub fn note_on(&self, id: EventId) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.active.insert(id);
        inner.dirty = true;
        Self::flush_or_defer(&self.shared, inner);
    }

    pub fn note_off(&self, id: EventId) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.active.remove(&id);
        inner.dirty = true;
        Self::flush_or_defer(&self.shared, inner);
    }

    /// Empty the set and flush immediately, ignoring the cadence (stop path)
    pub fn clear(&self) {
        let snapshot = {
            let mut inner = self.shared.inner.lock().unwrap();
            inner.active.clear();
            inner.dirty = false;
            inner.last_flush = self.shared.clock.now();
            inner.active.clone()
        };
        self.shared.bridge.active_notes_changed(&snapshot);
    }

    pub fn contains(&self, id: EventId) -> bool {
        self.shared.inner.lock().unwrap().active.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.shared.inner.lock().unwrap().active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn flush_or_defer(
        shared: &Arc<ActiveShared>,
        mut inner: std::sync::MutexGuard<'_, ActiveInner>,
    ) {
        let now = shared.clock.now();
        if now - inner.last_flush >= shared.frame_period {
            let snapshot = inner.active.clone();
            inner.dirty = false;
            inner.last_flush = now;
            drop(inner);
            shared.bridge.active_notes_changed(&snapshot);
        } else if !inner.flush_scheduled {
            inner.flush_scheduled = true;
            let at = inner.last_flush + shared.frame_period;
            drop(inner);
            let deferred = Arc::clone(shared);
            // Trailing flush so the last state of a burst is delivered
            shared.timer.schedule(at, move || Self::flush_deferred(&deferred));
        }
    }

    fn flush_deferred(shared: &Arc<ActiveShared>) {
        let snapshot = {
            let mut inner = shared.inner.lock().unwrap();
            inner.flush_scheduled = false;
            if !inner.dirty {
                return;
            }
            inner.dirty = false;
            inner.last_flush = shared.clock.now();
            inner.active.clone()
        };
        shared.bridge.active_notes_changed(&snapshot);
    }
}
