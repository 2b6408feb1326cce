// Engine error types
// Resource failures bubble to the caller; bookkeeping stays infallible

use thiserror::Error;

/// Errors surfaced to the caller of the playback engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Audio output could not be acquired or resumed (no device, device
    /// busy, stream build/play failure). Fatal to the current session.
    #[error("audio output unavailable: {0}")]
    AudioUnavailable(String),

    /// A control operation was rejected synchronously (invalid seek target,
    /// non-positive tempo, loop end before start, bad metronome config,
    /// malformed event data). State is unchanged.
    #[error("invalid schedule state: {0}")]
    InvalidScheduleState(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
