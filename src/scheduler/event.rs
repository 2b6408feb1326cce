// Timed events - the notes a scheduler plays
// Events are immutable once loaded; any change is replace-and-reschedule

use crate::error::{EngineError, EngineResult};
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for timed events
pub type EventId = u64;

/// Global event ID generator (atomic for thread-safety)
static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique event ID
pub fn generate_event_id() -> EventId {
    NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed)
}

/// A logical voice that can be muted as a unit
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    LeftHand,
    RightHand,
    Accompaniment,
    Click,
}

/// A pitched event placed on the transport timeline.
///
/// Times are in transport seconds, independent of the tempo multiplier;
/// the scheduler maps them to wall-clock time when registering triggers.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TimedEvent {
    /// Unique identifier for this event
    #[serde(default = "generate_event_id")]
    pub id: EventId,

    /// MIDI note number (0-127, where 60 = C4)
    pub pitch: u8,

    /// Start time in transport seconds
    pub start_time: f64,

    /// End time in transport seconds, for sustained events
    #[serde(default)]
    pub end_time: Option<f64>,

    /// MIDI velocity (0-127)
    pub velocity: u8,

    /// Voice this event belongs to
    pub channel: Channel,
}

impl TimedEvent {
    /// Creates a new event with a fresh id
    pub fn new(
        pitch: u8,
        start_time: f64,
        end_time: Option<f64>,
        velocity: u8,
        channel: Channel,
    ) -> Self {
        Self {
            id: generate_event_id(),
            pitch,
            start_time,
            end_time,
            velocity,
            channel,
        }
    }

    /// Duration in transport seconds (zero for instantaneous events)
    pub fn duration(&self) -> f64 {
        match self.end_time {
            Some(end) => (end - self.start_time).max(0.0),
            None => 0.0,
        }
    }

    fn validate(&self) -> EngineResult<()> {
        if self.pitch > 127 {
            return Err(EngineError::InvalidScheduleState(format!(
                "event {}: pitch {} out of MIDI range",
                self.id, self.pitch
            )));
        }
        if self.velocity > 127 {
            return Err(EngineError::InvalidScheduleState(format!(
                "event {}: velocity {} out of MIDI range",
                self.id, self.velocity
            )));
        }
        if !self.start_time.is_finite() || self.start_time < 0.0 {
            return Err(EngineError::InvalidScheduleState(format!(
                "event {}: invalid start time {}",
                self.id, self.start_time
            )));
        }
        if let Some(end) = self.end_time {
            if !end.is_finite() || end < self.start_time {
                return Err(EngineError::InvalidScheduleState(format!(
                    "event {}: end time {} before start time {}",
                    self.id, end, self.start_time
                )));
            }
        }
        Ok(())
    }
}

/// A validated collection of timed events forming one piece or exercise
#[derive(Debug, Clone, Default)]
pub struct EventList {
    events: Vec<TimedEvent>,
}

impl EventList {
    /// Build a list, validating every event
    pub fn new(mut events: Vec<TimedEvent>) -> EngineResult<Self> {
        for event in &events {
            event.validate()?;
        }
        // Stable order by start time keeps scheduling deterministic
        events.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        Ok(Self { events })
    }

    /// Load a piece from the JSON produced by the curriculum service
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let events: Vec<TimedEvent> = serde_json::from_str(json)
            .map_err(|e| EngineError::InvalidScheduleState(format!("bad event data: {e}")))?;
        Self::new(events)
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// End of the last event in transport seconds
    pub fn duration(&self) -> f64 {
        self.events
            .iter()
            .map(|e| e.end_time.unwrap_or(e.start_time))
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_are_unique() {
        let a = TimedEvent::new(60, 0.0, None, 100, Channel::LeftHand);
        let b = TimedEvent::new(60, 0.0, None, 100, Channel::LeftHand);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_event_duration() {
        let held = TimedEvent::new(60, 1.0, Some(2.5), 100, Channel::RightHand);
        assert!((held.duration() - 1.5).abs() < 1e-9);

        let tap = TimedEvent::new(60, 1.0, None, 100, Channel::RightHand);
        assert_eq!(tap.duration(), 0.0);
    }

    #[test]
    fn test_list_sorts_by_start_time() {
        let list = EventList::new(vec![
            TimedEvent::new(64, 2.0, None, 90, Channel::RightHand),
            TimedEvent::new(60, 0.0, None, 90, Channel::RightHand),
            TimedEvent::new(62, 1.0, None, 90, Channel::RightHand),
        ])
        .unwrap();

        let starts: Vec<f64> = list.events().iter().map(|e| e.start_time).collect();
        assert_eq!(starts, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_list_duration() {
        let list = EventList::new(vec![
            TimedEvent::new(60, 0.0, Some(4.0), 90, Channel::LeftHand),
            TimedEvent::new(64, 2.0, None, 90, Channel::RightHand),
        ])
        .unwrap();
        assert_eq!(list.duration(), 4.0);
    }

    #[test]
    fn test_validation_rejects_bad_events() {
        assert!(EventList::new(vec![TimedEvent::new(
            200,
            0.0,
            None,
            90,
            Channel::LeftHand
        )])
        .is_err());

        assert!(EventList::new(vec![TimedEvent::new(
            60,
            -1.0,
            None,
            90,
            Channel::LeftHand
        )])
        .is_err());

        assert!(EventList::new(vec![TimedEvent::new(
            60,
            2.0,
            Some(1.0),
            90,
            Channel::LeftHand
        )])
        .is_err());
    }

    #[test]
    fn test_from_json() {
        let json = r#"[
            {"pitch": 60, "start_time": 0.0, "end_time": 0.5, "velocity": 100, "channel": "left_hand"},
            {"pitch": 72, "start_time": 0.5, "velocity": 80, "channel": "right_hand"}
        ]"#;

        let list = EventList::from_json(json).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.events()[0].pitch, 60);
        assert_eq!(list.events()[0].channel, Channel::LeftHand);
        assert_eq!(list.events()[1].end_time, None);
    }

    #[test]
    fn test_from_json_rejects_malformed_input() {
        assert!(EventList::from_json("not json").is_err());
        assert!(EventList::from_json(r#"[{"pitch": 60}]"#).is_err());
    }
}
