// Scheduler module - trigger timer, transport, note playback, metronome

pub mod bridge;
pub mod event;
pub mod metronome;
pub mod playback;
pub mod timer;
pub mod transport;

pub use bridge::{
    ActiveNotes, AudioSink, ChannelBridge, NullBridge, NullSink, TriggerPayload, TriggerSink,
    VisualSyncBridge,
};
pub use event::{Channel, EventId, EventList, TimedEvent, generate_event_id};
pub use metronome::{Metronome, MetronomeConfig};
pub use playback::NoteScheduler;
pub use timer::{TriggerHandle, TriggerId, TriggerPump, TriggerTimer};
pub use transport::{Transport, TransportStatus};
