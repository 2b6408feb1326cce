// Command types - Scheduler -> Audio callback
// Start times are absolute clock samples, not deltas: a delta would go
// stale between push and drain, an absolute sample position cannot.

use crate::audio::click::ClickKind;

#[derive(Debug, Clone, Copy)]
pub enum AudioCommand {
    /// Start a metronome click
    Click {
        kind: ClickKind,
        gain: f32,
        start_sample: u64,
    },
    /// Start a pitched tone
    Tone {
        pitch: u8,
        gain: f32,
        start_sample: u64,
        duration_samples: u64,
    },
    /// Kill all sounding voices immediately
    StopAll,
}
