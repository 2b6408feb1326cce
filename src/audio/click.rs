// Click sound generation for the metronome
// Pre-generates short sine bursts so the audio callback never synthesizes

use std::f32::consts::PI;

/// Which click variant to play
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    /// First pulse of a measure (accented)
    Downbeat,
    /// Main beat
    Beat,
    /// Subdivision pulse between beats
    Subdivision,
}

/// Pre-generated click sounds, one buffer per kind.
///
/// Higher frequency and amplitude for the downbeat accent, a quieter and
/// lower burst for subdivisions.
#[derive(Debug, Clone)]
pub struct ClickBank {
    downbeat: Vec<f32>,
    beat: Vec<f32>,
    subdivision: Vec<f32>,
}

impl ClickBank {
    /// Duration of a click in milliseconds
    const CLICK_DURATION_MS: f32 = 10.0;

    pub fn new(sample_rate: f32) -> Self {
        let num_samples = ((Self::CLICK_DURATION_MS / 1000.0) * sample_rate) as usize;

        Self {
            downbeat: Self::generate_click(sample_rate, num_samples, 1200.0, 0.6),
            beat: Self::generate_click(sample_rate, num_samples, 800.0, 0.4),
            subdivision: Self::generate_click(sample_rate, num_samples, 600.0, 0.25),
        }
    }

    /// Generate a short click using a sine wave with an exponential decay
    fn generate_click(
        sample_rate: f32,
        num_samples: usize,
        frequency: f32,
        amplitude: f32,
    ) -> Vec<f32> {
        let mut samples = Vec::with_capacity(num_samples);
        let phase_increment = 2.0 * PI * frequency / sample_rate;

        for i in 0..num_samples {
            let t = i as f32 / num_samples as f32;
            let envelope = (-t * 8.0).exp();

            let phase = i as f32 * phase_increment;
            samples.push(phase.sin() * envelope * amplitude);
        }

        samples
    }

    /// Get the sample buffer for a click kind
    pub fn get(&self, kind: ClickKind) -> &[f32] {
        match kind {
            ClickKind::Downbeat => &self.downbeat,
            ClickKind::Beat => &self.beat,
            ClickKind::Subdivision => &self.subdivision,
        }
    }

    /// Duration of one click in samples
    pub fn click_samples(&self) -> usize {
        self.downbeat.len()
    }
}

/// Frequency in Hz of a MIDI note number (A4 = 69 = 440 Hz)
pub fn midi_to_freq(pitch: u8) -> f32 {
    440.0 * 2f32.powf((pitch as f32 - 69.0) / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_generation() {
        let bank = ClickBank::new(48000.0);

        let downbeat = bank.get(ClickKind::Downbeat);
        let beat = bank.get(ClickKind::Beat);
        let subdivision = bank.get(ClickKind::Subdivision);

        assert!(!downbeat.is_empty());
        // Same duration for all kinds: 10ms at 48kHz = 480 samples
        assert_eq!(downbeat.len(), 480);
        assert_eq!(beat.len(), 480);
        assert_eq!(subdivision.len(), 480);

        // Accent is louder than beat, beat louder than subdivision
        let peak = |s: &[f32]| s.iter().map(|x| x.abs()).fold(0.0f32, f32::max);
        assert!(peak(downbeat) > peak(beat));
        assert!(peak(beat) > peak(subdivision));
    }

    #[test]
    fn test_click_decays_to_silence() {
        let bank = ClickBank::new(48000.0);
        let samples = bank.get(ClickKind::Downbeat);

        let head_peak = samples[..48].iter().map(|x| x.abs()).fold(0.0f32, f32::max);
        let tail_peak = samples[432..].iter().map(|x| x.abs()).fold(0.0f32, f32::max);
        assert!(tail_peak < head_peak * 0.1);
    }

    #[test]
    fn test_midi_to_freq() {
        assert!((midi_to_freq(69) - 440.0).abs() < 1e-3);
        // One octave down halves the frequency
        assert!((midi_to_freq(57) - 220.0).abs() < 1e-3);
        // Middle C
        assert!((midi_to_freq(60) - 261.626).abs() < 0.01);
    }
}
