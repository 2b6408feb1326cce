// Playback engine facade - wires output, clock, timer and schedulers
// This is the caller-facing surface: one engine per session, mutated from
// one thread at a time. The audio stream is ref-counted across the note
// scheduler and the metronome: resumed when the first activates, paused
// again when the last deactivates.

use crate::audio::clock::{ClockSource, SampleClock};
use crate::audio::output::AudioOutput;
use crate::error::EngineResult;
use crate::messaging::channels::{
    UpdateConsumer, create_command_channel, create_update_channel,
};
use crate::scheduler::bridge::{ActiveNotes, AudioSink, ChannelBridge};
use crate::scheduler::event::{Channel, TimedEvent};
use crate::scheduler::metronome::{Metronome, MetronomeConfig};
use crate::scheduler::playback::NoteScheduler;
use crate::scheduler::timer::{TriggerPump, TriggerTimer};
use crate::scheduler::transport::{Transport, TransportStatus};
use std::sync::Arc;
use std::time::Duration;

// Ringbuffer capacities, sized for worst-case trigger bursts:
// a dense piece at high tempo stays under ~100 triggers per pump period,
// and visual updates are already coalesced to frame cadence.
const COMMAND_RINGBUFFER_CAPACITY: usize = 256;
const UPDATE_RINGBUFFER_CAPACITY: usize = 256;

/// Pump drain period. Far coarser than audio rate; correctness only
/// requires it to stay under the firing horizon.
const PUMP_PERIOD: Duration = Duration::from_millis(2);
/// Triggers fire this many seconds early, carrying their exact target
/// time, so the callback can place them sample-accurately.
const PUMP_HORIZON: f64 = 0.010;
/// Presentation-frame cadence for coalesced visual updates
const FRAME_PERIOD: f64 = 1.0 / 30.0;

/// One playback session: a note scheduler and a metronome sharing a
/// clock, a trigger timer and the audio output.
pub struct PlaybackEngine {
    // Dropped first: joins the drain thread before anything it touches goes
    pump: TriggerPump,
    scheduler: NoteScheduler,
    metronome: Metronome,
    sink: Arc<AudioSink>,
    output: AudioOutput,
    playback_active: bool,
    metronome_active: bool,
}

impl PlaybackEngine {
    /// Open the default audio output and start the scheduling machinery.
    /// Returns the engine and the consumer end of the visual update
    /// channel for a UI thread to drain.
    pub fn new() -> EngineResult<(Self, UpdateConsumer)> {
        let (command_tx, command_rx) = create_command_channel(COMMAND_RINGBUFFER_CAPACITY);
        let (update_tx, update_rx) = create_update_channel(UPDATE_RINGBUFFER_CAPACITY);

        let output = AudioOutput::new(command_rx)?;
        let clock: SampleClock = output.clock();
        let clock_dyn: Arc<dyn ClockSource> = Arc::new(clock.clone());

        let timer = Arc::new(TriggerTimer::new());
        let sink = Arc::new(AudioSink::new(command_tx, clock.clone()));
        let bridge = Arc::new(ChannelBridge::new(update_tx));

        let active = ActiveNotes::new(
            Arc::clone(&bridge) as _,
            Arc::clone(&clock_dyn),
            Arc::clone(&timer),
            FRAME_PERIOD,
        );

        let scheduler = NoteScheduler::new(
            Arc::clone(&clock_dyn),
            Arc::clone(&timer),
            Arc::clone(&sink) as _,
            Arc::new(Transport::new()),
            active,
        );

        let metronome = Metronome::new(
            Arc::clone(&clock_dyn),
            Arc::clone(&timer),
            Arc::clone(&sink) as _,
            bridge,
        );

        let pump = TriggerPump::start(Arc::clone(&timer), clock_dyn, PUMP_PERIOD, PUMP_HORIZON);

        Ok((
            Self {
                pump,
                scheduler,
                metronome,
                sink,
                output,
                playback_active: false,
                metronome_active: false,
            },
            update_rx,
        ))
    }

    /// Load a piece, replacing the current one
    pub fn load(&self, events: Vec<TimedEvent>) -> EngineResult<()> {
        self.scheduler.load(events)
    }

    /// Start playback. Resumes the audio output first; failing that fails
    /// the whole call and playback does not start.
    pub fn play(&mut self) -> EngineResult<()> {
        if !self.playback_active {
            self.acquire_output()?;
            self.playback_active = true;
        }
        self.scheduler.play();
        Ok(())
    }

    /// Freeze the position. The output stream stays up so resuming is
    /// glitch-free; the stream is only released by `stop`.
    pub fn pause(&self) {
        self.scheduler.pause();
    }

    /// Cancel all pending triggers, kill sounding voices, reset to 0
    pub fn stop(&mut self) {
        self.scheduler.stop();
        self.sink.stop_all();
        if self.playback_active {
            self.playback_active = false;
            self.release_output();
        }
    }

    pub fn seek(&self, position: f64) -> EngineResult<()> {
        self.scheduler.seek(position)
    }

    pub fn set_tempo(&self, multiplier: f64) -> EngineResult<()> {
        self.scheduler.set_tempo(multiplier)
    }

    pub fn set_loop(&self, start: f64, end: f64) -> EngineResult<()> {
        self.scheduler.set_loop(start, end)
    }

    pub fn clear_loop(&self) {
        self.scheduler.clear_loop()
    }

    pub fn toggle_channel_mute(&self, channel: Channel) -> bool {
        self.scheduler.toggle_channel_mute(channel)
    }

    pub fn position(&self) -> f64 {
        self.scheduler.position()
    }

    pub fn status(&self) -> TransportStatus {
        self.scheduler.status()
    }

    /// Start the metronome (acquires the output on idle -> running)
    pub fn metronome_start(&mut self, config: MetronomeConfig) -> EngineResult<()> {
        config.validate()?;
        if !self.metronome_active {
            self.acquire_output()?;
            self.metronome_active = true;
        }
        self.metronome.start(config)
    }

    /// Stop the metronome and release its output hold
    pub fn metronome_stop(&mut self) {
        self.metronome.stop();
        if self.metronome_active {
            self.metronome_active = false;
            self.release_output();
        }
    }

    pub fn metronome_set_config(&self, config: MetronomeConfig) -> EngineResult<()> {
        self.metronome.set_config(config)
    }

    pub fn metronome_set_volume(&self, volume: f32) -> EngineResult<()> {
        self.metronome.set_volume(volume)
    }

    pub fn metronome_running(&self) -> bool {
        self.metronome.is_running()
    }

    /// Master output volume (0.0 to 1.0)
    pub fn set_volume(&self, volume: f32) {
        self.output.volume.set(volume.clamp(0.0, 1.0));
    }

    /// Resume the stream when the first scheduler activates
    fn acquire_output(&self) -> EngineResult<()> {
        if !self.playback_active && !self.metronome_active {
            self.output.resume()?;
        }
        Ok(())
    }

    /// Suspend the stream when the last scheduler deactivates
    fn release_output(&self) {
        if !self.playback_active && !self.metronome_active {
            if let Err(e) = self.output.suspend() {
                eprintln!("Warning: failed to suspend audio output: {e}");
            }
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        // Abandoning the session takes the same path as an explicit stop
        self.stop();
        self.metronome_stop();
        self.pump.stop();
    }
}
