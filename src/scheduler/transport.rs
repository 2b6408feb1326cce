// Transport - playback position state machine for the note scheduler
// Position is derived from an anchor pair (transport seconds, clock
// seconds) so reading it never needs a lock; every control operation
// re-anchors. Thread-safe via atomics (f64 stored as bits).

use crate::scheduler::event::Channel;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Transport status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportStatus {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl TransportStatus {
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportStatus::Playing)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, TransportStatus::Stopped)
    }
}

/// Shared playback-position state.
///
/// While playing, `position(now) = anchor_position + (now - anchor_clock)
/// * tempo_multiplier`; paused or stopped, the anchor position is the
/// position. The derived position is monotonically non-decreasing while
/// playing except across an explicit seek or loop wrap.
#[derive(Debug)]
pub struct Transport {
    playing: AtomicBool,
    paused: AtomicBool,
    /// Transport seconds at the anchor (f64 bits)
    anchor_position: AtomicU64,
    /// Clock seconds at the anchor (f64 bits)
    anchor_clock: AtomicU64,
    /// Wall-seconds advance per transport-second (f64 bits, > 0)
    tempo_multiplier: AtomicU64,
    loop_enabled: AtomicBool,
    loop_start: AtomicU64,
    loop_end: AtomicU64,
    channel_mutes: Mutex<HashSet<Channel>>,
}

fn store_f64(cell: &AtomicU64, value: f64) {
    cell.store(value.to_bits(), Ordering::Relaxed);
}

fn load_f64(cell: &AtomicU64) -> f64 {
    f64::from_bits(cell.load(Ordering::Relaxed))
}

impl Transport {
    pub fn new() -> Self {
        Self {
            playing: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            anchor_position: AtomicU64::new(0f64.to_bits()),
            anchor_clock: AtomicU64::new(0f64.to_bits()),
            tempo_multiplier: AtomicU64::new(1f64.to_bits()),
            loop_enabled: AtomicBool::new(false),
            loop_start: AtomicU64::new(0f64.to_bits()),
            loop_end: AtomicU64::new(0f64.to_bits()),
            channel_mutes: Mutex::new(HashSet::new()),
        }
    }

    pub fn status(&self) -> TransportStatus {
        if self.playing.load(Ordering::Relaxed) {
            TransportStatus::Playing
        } else if self.paused.load(Ordering::Relaxed) {
            TransportStatus::Paused
        } else {
            TransportStatus::Stopped
        }
    }

    /// Position in transport seconds at clock time `now`
    pub fn position(&self, now: f64) -> f64 {
        let anchor_position = load_f64(&self.anchor_position);
        if self.playing.load(Ordering::Relaxed) {
            let elapsed = now - load_f64(&self.anchor_clock);
            anchor_position + elapsed * self.tempo_multiplier()
        } else {
            anchor_position
        }
    }

    pub fn tempo_multiplier(&self) -> f64 {
        load_f64(&self.tempo_multiplier)
    }

    /// stopped|paused -> playing, anchored at `now`
    pub fn play(&self, now: f64) {
        if self.playing.load(Ordering::Relaxed) {
            return;
        }
        store_f64(&self.anchor_clock, now);
        self.playing.store(true, Ordering::Relaxed);
        self.paused.store(false, Ordering::Relaxed);
    }

    /// playing -> paused, freezing the derived position
    pub fn pause(&self, now: f64) {
        if !self.playing.load(Ordering::Relaxed) {
            return;
        }
        let frozen = self.position(now);
        store_f64(&self.anchor_position, frozen);
        self.playing.store(false, Ordering::Relaxed);
        self.paused.store(true, Ordering::Relaxed);
    }

    /// any state -> stopped, position reset to 0
    pub fn stop(&self) {
        self.playing.store(false, Ordering::Relaxed);
        self.paused.store(false, Ordering::Relaxed);
        store_f64(&self.anchor_position, 0.0);
    }

    /// Set the position in any state, re-anchoring at `now`
    pub fn seek(&self, now: f64, position: f64) {
        debug_assert!(position.is_finite() && position >= 0.0);
        store_f64(&self.anchor_position, position);
        store_f64(&self.anchor_clock, now);
    }

    /// Change the transport-to-wall-clock rate for all future placements,
    /// freezing the position at `now` first so it does not jump
    pub fn set_tempo(&self, now: f64, multiplier: f64) {
        debug_assert!(multiplier.is_finite() && multiplier > 0.0);
        let frozen = self.position(now);
        store_f64(&self.anchor_position, frozen);
        store_f64(&self.anchor_clock, now);
        store_f64(&self.tempo_multiplier, multiplier);
    }

    pub fn set_loop(&self, start: f64, end: f64) {
        debug_assert!(end > start && start >= 0.0);
        store_f64(&self.loop_start, start);
        store_f64(&self.loop_end, end);
        self.loop_enabled.store(true, Ordering::Relaxed);
    }

    pub fn clear_loop(&self) {
        self.loop_enabled.store(false, Ordering::Relaxed);
    }

    pub fn loop_region(&self) -> Option<(f64, f64)> {
        if self.loop_enabled.load(Ordering::Relaxed) {
            Some((load_f64(&self.loop_start), load_f64(&self.loop_end)))
        } else {
            None
        }
    }

    /// Flip a channel's mute state; returns true if the channel is now muted
    pub fn toggle_mute(&self, channel: Channel) -> bool {
        let mut mutes = self.channel_mutes.lock().unwrap();
        if !mutes.insert(channel) {
            mutes.remove(&channel);
            false
        } else {
            true
        }
    }

    pub fn is_muted(&self, channel: Channel) -> bool {
        self.channel_mutes.lock().unwrap().contains(&channel)
    }

    pub fn muted_channels(&self) -> HashSet<Channel> {
        self.channel_mutes.lock().unwrap().clone()
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let transport = Transport::new();
        assert_eq!(transport.status(), TransportStatus::Stopped);
        assert_eq!(transport.position(0.0), 0.0);
        assert_eq!(transport.tempo_multiplier(), 1.0);
        assert_eq!(transport.loop_region(), None);
    }

    #[test]
    fn test_position_advances_only_while_playing() {
        let transport = Transport::new();

        // Stopped: position stays put regardless of clock time
        assert_eq!(transport.position(5.0), 0.0);

        transport.play(10.0);
        assert_eq!(transport.status(), TransportStatus::Playing);
        assert!((transport.position(12.5) - 2.5).abs() < 1e-9);

        transport.pause(12.5);
        assert_eq!(transport.status(), TransportStatus::Paused);
        // Clock keeps moving, position does not
        assert!((transport.position(20.0) - 2.5).abs() < 1e-9);

        // Resume: position continues from where it froze
        transport.play(20.0);
        assert!((transport.position(21.0) - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_stop_resets_position() {
        let transport = Transport::new();
        transport.play(0.0);
        assert!(transport.position(3.0) > 0.0);

        transport.stop();
        assert_eq!(transport.status(), TransportStatus::Stopped);
        assert_eq!(transport.position(100.0), 0.0);
    }

    #[test]
    fn test_seek_in_any_state() {
        let transport = Transport::new();

        transport.seek(0.0, 7.0);
        assert_eq!(transport.position(0.0), 7.0);

        transport.play(1.0);
        transport.seek(2.0, 1.5);
        assert!((transport.position(2.0) - 1.5).abs() < 1e-9);
        assert!((transport.position(3.0) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_tempo_scales_position_rate() {
        let transport = Transport::new();
        transport.play(0.0);

        // 2 clock seconds at 1x
        transport.set_tempo(2.0, 2.0);
        // Position frozen at 2.0 when the tempo changed
        assert!((transport.position(2.0) - 2.0).abs() < 1e-9);
        // 1 more clock second at 2x advances 2 transport seconds
        assert!((transport.position(3.0) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_tempo_change_does_not_jump_position() {
        let transport = Transport::new();
        transport.play(0.0);

        let before = transport.position(5.0);
        transport.set_tempo(5.0, 0.5);
        let after = transport.position(5.0);
        assert!((before - after).abs() < 1e-9);
    }

    #[test]
    fn test_loop_region() {
        let transport = Transport::new();
        transport.set_loop(2.0, 6.0);
        assert_eq!(transport.loop_region(), Some((2.0, 6.0)));

        transport.clear_loop();
        assert_eq!(transport.loop_region(), None);
    }

    #[test]
    fn test_channel_mutes_toggle() {
        let transport = Transport::new();
        assert!(!transport.is_muted(Channel::LeftHand));

        assert!(transport.toggle_mute(Channel::LeftHand));
        assert!(transport.is_muted(Channel::LeftHand));
        assert!(!transport.is_muted(Channel::RightHand));

        assert!(!transport.toggle_mute(Channel::LeftHand));
        assert!(!transport.is_muted(Channel::LeftHand));
    }

    #[test]
    fn test_play_while_playing_keeps_anchor() {
        let transport = Transport::new();
        transport.play(0.0);
        // Redundant play must not re-anchor (which would rewind position)
        transport.play(5.0);
        assert!((transport.position(5.0) - 5.0).abs() < 1e-9);
    }
}
