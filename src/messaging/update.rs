// Visual updates - Bridge -> presentation layer
// Coalesced snapshots, not per-trigger traffic: the UI may consume these
// at its own cadence and only ever sees the latest state it drained.

use crate::scheduler::event::EventId;

#[derive(Debug, Clone)]
pub enum VisualUpdate {
    /// The set of currently sounding note events changed
    ActiveNotes(Vec<EventId>),
    /// A metronome pulse fired (pulse index within the measure)
    Beat(u64),
}
