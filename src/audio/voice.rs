// Voice pool mixed by the audio callback
// Click voices replay a pre-generated buffer, tone voices run a sine
// with a short attack/release envelope. Each voice carries a sample
// countdown so sounds start at their exact position within a buffer.

use crate::audio::click::{ClickBank, ClickKind, midi_to_freq};
use std::f32::consts::PI;

/// Attack ramp for tones, in seconds (avoids clicks at note start)
const TONE_ATTACK_SECONDS: f32 = 0.005;
/// Release ramp for tones, in seconds
const TONE_RELEASE_SECONDS: f32 = 0.020;

#[derive(Debug, Clone)]
enum VoiceKind {
    Click {
        kind: ClickKind,
        position: usize,
    },
    Tone {
        phase: f32,
        phase_increment: f32,
        elapsed: u64,
        total: u64,
        attack_samples: u64,
        release_samples: u64,
    },
}

/// One sounding (or pending) voice
#[derive(Debug, Clone)]
struct Voice {
    /// Samples to wait before the first audible sample
    delay: u32,
    gain: f32,
    kind: VoiceKind,
}

impl Voice {
    fn next_sample(&mut self, bank: &ClickBank) -> f32 {
        if self.delay > 0 {
            self.delay -= 1;
            return 0.0;
        }

        match &mut self.kind {
            VoiceKind::Click { kind, position } => {
                let samples = bank.get(*kind);
                if *position < samples.len() {
                    let s = samples[*position] * self.gain;
                    *position += 1;
                    s
                } else {
                    0.0
                }
            }
            VoiceKind::Tone {
                phase,
                phase_increment,
                elapsed,
                total,
                attack_samples,
                release_samples,
            } => {
                if *elapsed >= *total {
                    return 0.0;
                }

                let envelope = if *elapsed < *attack_samples {
                    *elapsed as f32 / *attack_samples as f32
                } else if *total - *elapsed < *release_samples {
                    (*total - *elapsed) as f32 / *release_samples as f32
                } else {
                    1.0
                };

                let s = phase.sin() * envelope * self.gain;
                *phase += *phase_increment;
                if *phase > 2.0 * PI {
                    *phase -= 2.0 * PI;
                }
                *elapsed += 1;
                s
            }
        }
    }

    fn finished(&self, bank: &ClickBank) -> bool {
        if self.delay > 0 {
            return false;
        }
        match &self.kind {
            VoiceKind::Click { position, .. } => *position >= bank.click_samples(),
            VoiceKind::Tone { elapsed, total, .. } => elapsed >= total,
        }
    }
}

/// Fixed-capacity pool of active voices.
///
/// Capacity is pre-allocated; when the pool is saturated new voices are
/// ignored rather than allocating or blocking in the callback.
pub struct VoicePool {
    voices: Vec<Voice>,
    bank: ClickBank,
    sample_rate: f32,
    max_voices: usize,
}

impl VoicePool {
    pub fn new(sample_rate: f32, max_voices: usize) -> Self {
        Self {
            voices: Vec::with_capacity(max_voices),
            bank: ClickBank::new(sample_rate),
            sample_rate,
            max_voices,
        }
    }

    /// Start a click voice `delay` samples from now
    pub fn start_click(&mut self, kind: ClickKind, gain: f32, delay: u32) {
        if self.voices.len() >= self.max_voices {
            return;
        }
        self.voices.push(Voice {
            delay,
            gain,
            kind: VoiceKind::Click { kind, position: 0 },
        });
    }

    /// Start a tone voice at a MIDI pitch, `delay` samples from now,
    /// lasting `duration_samples`
    pub fn start_tone(&mut self, pitch: u8, gain: f32, delay: u32, duration_samples: u64) {
        if self.voices.len() >= self.max_voices {
            return;
        }

        let attack = (TONE_ATTACK_SECONDS * self.sample_rate) as u64;
        let release = (TONE_RELEASE_SECONDS * self.sample_rate) as u64;
        let total = duration_samples.max(attack + release);

        self.voices.push(Voice {
            delay,
            gain,
            kind: VoiceKind::Tone {
                phase: 0.0,
                phase_increment: 2.0 * PI * midi_to_freq(pitch) / self.sample_rate,
                elapsed: 0,
                total,
                attack_samples: attack.max(1),
                release_samples: release.max(1),
            },
        });
    }

    /// Kill every voice immediately (transport stop)
    pub fn clear(&mut self) {
        self.voices.clear();
    }

    /// Number of live voices (pending or sounding)
    pub fn active(&self) -> usize {
        self.voices.len()
    }

    /// Mix one mono sample from all voices and drop finished ones
    pub fn next_sample(&mut self) -> f32 {
        let bank = &self.bank;
        let mut mixed = 0.0;
        for voice in &mut self.voices {
            mixed += voice.next_sample(bank);
        }
        self.voices.retain(|v| !v.finished(bank));
        mixed
    }
}
