// Practice Engine - real-time playback core for the practice app
// Library exports for the application shell and for tests

pub mod audio;
pub mod engine;
pub mod error;
pub mod messaging;
pub mod scheduler;

// Re-export commonly used types for convenience
pub use audio::clock::{ClockSource, ManualClock, SampleClock};
pub use engine::PlaybackEngine;
pub use error::{EngineError, EngineResult};
pub use messaging::channels::{create_command_channel, create_update_channel};
pub use messaging::update::VisualUpdate;
pub use scheduler::{
    ActiveNotes, Channel, EventId, EventList, Metronome, MetronomeConfig, NoteScheduler,
    TimedEvent, TriggerHandle, TriggerPayload, TriggerPump, TriggerSink, TriggerTimer, Transport,
    TransportStatus, VisualSyncBridge,
};
