// Note scheduler - plays a loaded piece against the transport
// Every mutation is cancel-all-then-rebuild: the registered trigger set
// always equals the not-yet-fired events passing the current filter,
// placed for the current tempo and loop window. A scheduling epoch,
// checked under the state lock at fire time, closes the race between a
// popped-but-not-yet-run trigger and a concurrent mutation.

use crate::audio::clock::ClockSource;
use crate::error::{EngineError, EngineResult};
use crate::scheduler::bridge::{ActiveNotes, TriggerPayload, TriggerSink};
use crate::scheduler::event::{Channel, EventList, TimedEvent};
use crate::scheduler::timer::{TriggerHandle, TriggerTimer};
use crate::scheduler::transport::{Transport, TransportStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

struct SchedulerState {
    events: EventList,
    handles: Vec<TriggerHandle>,
}

struct SchedulerShared {
    clock: Arc<dyn ClockSource>,
    timer: Arc<TriggerTimer>,
    sink: Arc<dyn TriggerSink>,
    transport: Arc<Transport>,
    active: ActiveNotes,
    state: Mutex<SchedulerState>,
    /// Bumped (under the state lock) by every rebuild; trigger actions
    /// compare their captured value against it before producing sound.
    epoch: AtomicU64,
}

/// Schedules a piece's note events as cancellable triggers.
pub struct NoteScheduler {
    shared: Arc<SchedulerShared>,
}

impl NoteScheduler {
    pub fn new(
        clock: Arc<dyn ClockSource>,
        timer: Arc<TriggerTimer>,
        sink: Arc<dyn TriggerSink>,
        transport: Arc<Transport>,
        active: ActiveNotes,
    ) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                clock,
                timer,
                sink,
                transport,
                active,
                state: Mutex::new(SchedulerState {
                    events: EventList::default(),
                    handles: Vec::new(),
                }),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Replace the loaded piece. Reschedules in place when playing.
    pub fn load(&self, events: Vec<TimedEvent>) -> EngineResult<()> {
        let list = EventList::new(events)?;
        let mut state = self.shared.state.lock().unwrap();
        state.events = list;
        Self::rebuild(&self.shared, &mut state);
        Ok(())
    }

    /// stopped|paused -> playing, scheduling from the current position
    pub fn play(&self) {
        let mut state = self.shared.state.lock().unwrap();
        self.shared.transport.play(self.shared.clock.now());
        Self::rebuild(&self.shared, &mut state);
    }

    /// Freeze the position. Handles stay registered; the epoch/status
    /// guard keeps them silent, and the next `play` re-derives them.
    pub fn pause(&self) {
        let _state = self.shared.state.lock().unwrap();
        self.shared.transport.pause(self.shared.clock.now());
    }

    /// Cancel everything, reset to position 0, clear active tracking
    pub fn stop(&self) {
        let mut state = self.shared.state.lock().unwrap();
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        self.shared.timer.cancel_batch(state.handles.drain(..));
        self.shared.transport.stop();
        drop(state);
        self.shared.active.clear();
    }

    /// Jump to `position` (transport seconds) in any state
    pub fn seek(&self, position: f64) -> EngineResult<()> {
        if !position.is_finite() || position < 0.0 {
            return Err(EngineError::InvalidScheduleState(format!(
                "seek target {position} out of range"
            )));
        }
        let mut state = self.shared.state.lock().unwrap();
        self.shared.transport.seek(self.shared.clock.now(), position);
        Self::rebuild(&self.shared, &mut state);
        Ok(())
    }

    /// Change the tempo multiplier for all future placements
    pub fn set_tempo(&self, multiplier: f64) -> EngineResult<()> {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(EngineError::InvalidScheduleState(format!(
                "tempo multiplier {multiplier} must be > 0"
            )));
        }
        let mut state = self.shared.state.lock().unwrap();
        self.shared
            .transport
            .set_tempo(self.shared.clock.now(), multiplier);
        Self::rebuild(&self.shared, &mut state);
        Ok(())
    }

    /// Activate a loop region
    pub fn set_loop(&self, start: f64, end: f64) -> EngineResult<()> {
        if !start.is_finite() || !end.is_finite() || start < 0.0 || end <= start {
            return Err(EngineError::InvalidScheduleState(format!(
                "loop region ({start}, {end}) is not a valid window"
            )));
        }
        let mut state = self.shared.state.lock().unwrap();
        self.shared.transport.set_loop(start, end);
        Self::rebuild(&self.shared, &mut state);
        Ok(())
    }

    /// Deactivate the loop region
    pub fn clear_loop(&self) {
        let mut state = self.shared.state.lock().unwrap();
        self.shared.transport.clear_loop();
        Self::rebuild(&self.shared, &mut state);
    }

    /// Flip a channel's mute; pending triggers on that channel are
    /// cancelled by the rebuild. Returns true if the channel is now muted.
    pub fn toggle_channel_mute(&self, channel: Channel) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        let muted = self.shared.transport.toggle_mute(channel);
        Self::rebuild(&self.shared, &mut state);
        muted
    }

    pub fn position(&self) -> f64 {
        self.shared.transport.position(self.shared.clock.now())
    }

    pub fn status(&self) -> TransportStatus {
        self.shared.transport.status()
    }

    pub fn transport(&self) -> Arc<Transport> {
        Arc::clone(&self.shared.transport)
    }

    /// Cancel the current trigger set and derive a fresh one from the
    /// transport state. No-op derivation unless playing.
    fn rebuild(shared: &Arc<SchedulerShared>, state: &mut MutexGuard<'_, SchedulerState>) {
        let epoch = shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        shared.timer.cancel_batch(state.handles.drain(..));

        if !shared.transport.status().is_playing() {
            return;
        }

        let now = shared.clock.now();
        let position = shared.transport.position(now);
        let tempo = shared.transport.tempo_multiplier();
        let mutes = shared.transport.muted_channels();
        let loop_region = shared.transport.loop_region();

        let (window_start, window_end) = match loop_region {
            Some((start, end)) => (start, end),
            None => (position, f64::INFINITY),
        };

        let mut handles = Vec::new();
        for event in state.events.events() {
            if event.start_time < window_start || event.start_time >= window_end {
                continue;
            }
            // Never fire retroactively
            if event.start_time < position {
                continue;
            }
            if mutes.contains(&event.channel) {
                continue;
            }

            let wall_on = now + (event.start_time - position) / tempo;

            // Sustained events spanning the loop boundary are truncated
            // at the boundary, not wrapped
            let end_time = event.end_time.unwrap_or(event.start_time);
            let end_time = if loop_region.is_some() {
                end_time.min(window_end)
            } else {
                end_time
            };
            let wall_duration = (end_time - event.start_time).max(0.0) / tempo;

            let on_shared = Arc::clone(shared);
            let on_event = *event;
            handles.push(shared.timer.schedule(wall_on, move || {
                Self::fire_note_on(&on_shared, epoch, &on_event, wall_on, wall_duration);
            }));

            let off_shared = Arc::clone(shared);
            let off_id = event.id;
            handles.push(shared.timer.schedule(wall_on + wall_duration, move || {
                Self::fire_note_off(&off_shared, epoch, off_id);
            }));
        }

        if let Some((loop_start, loop_end)) = loop_region {
            let wall_wrap = now + (loop_end - position).max(0.0) / tempo;
            let wrap_shared = Arc::clone(shared);
            handles.push(shared.timer.schedule(wall_wrap, move || {
                Self::fire_loop_wrap(&wrap_shared, epoch, loop_start);
            }));
        }

        state.handles = handles;
    }

    fn fire_note_on(
        shared: &Arc<SchedulerShared>,
        epoch: u64,
        event: &TimedEvent,
        at: f64,
        wall_duration: f64,
    ) {
        // Guard under the state lock: a fire racing a mutation either
        // completes before the mutation takes the lock or sees its epoch
        let state = shared.state.lock().unwrap();
        if shared.epoch.load(Ordering::SeqCst) != epoch
            || !shared.transport.status().is_playing()
        {
            return;
        }
        shared.sink.trigger(
            TriggerPayload::Note { pitch: event.pitch },
            event.velocity as f32 / 127.0,
            at,
            wall_duration,
        );
        shared.active.note_on(event.id);
        drop(state);
    }

    fn fire_note_off(shared: &Arc<SchedulerShared>, epoch: u64, id: u64) {
        let state = shared.state.lock().unwrap();
        if shared.epoch.load(Ordering::SeqCst) != epoch
            || !shared.transport.status().is_playing()
        {
            return;
        }
        shared.active.note_off(id);
        drop(state);
    }

    fn fire_loop_wrap(shared: &Arc<SchedulerShared>, epoch: u64, loop_start: f64) {
        let mut state = shared.state.lock().unwrap();
        if shared.epoch.load(Ordering::SeqCst) != epoch
            || !shared.transport.status().is_playing()
            || shared.transport.loop_region().is_none()
        {
            return;
        }
        // Atomic wrap: seek back to the loop start and re-derive
        shared
            .transport
            .seek(shared.clock.now(), loop_start);
        Self::rebuild(shared, &mut state);
    }
}

impl Drop for NoteScheduler {
    fn drop(&mut self) {
        // Abandoning the scheduler takes the same full-cancel path as stop
        self.stop();
    }
}
