// Audio output - CPAL stream and real-time callback
//
// The callback is the engine's ground truth for time: it advances the
// SampleClock once per buffer. Inside the callback: no allocations, no
// I/O, no blocking locks. Commands arrive over a lock-free ring buffer
// and voices start at their absolute sample position, so placement stays
// sample-accurate regardless of when the command was drained.
//
// Note: on macOS (CoreAudio) the Stream is not Send/Sync, so the
// AudioOutput stays on the thread that created it; everything that needs
// audio from another thread goes through the command channel.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};

use crate::audio::clock::SampleClock;
use crate::audio::params::AtomicF32;
use crate::audio::voice::VoicePool;
use crate::error::{EngineError, EngineResult};
use crate::messaging::channels::CommandConsumer;
use crate::messaging::command::AudioCommand;

/// Maximum simultaneous voices in the callback's pool
const MAX_VOICES: usize = 64;

/// Output device, stream and the clock it drives
pub struct AudioOutput {
    _device: Device,
    stream: Stream,
    clock: SampleClock,
    sample_rate: f32,
    pub volume: AtomicF32,
}

impl AudioOutput {
    /// Open the default output device and build a (paused) stream fed by
    /// `command_rx`. The stream starts on [`AudioOutput::resume`].
    pub fn new(command_rx: CommandConsumer) -> EngineResult<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::AudioUnavailable("no output device found".into()))?;

        let supported_config = device
            .default_output_config()
            .map_err(|e| EngineError::AudioUnavailable(format!("device config: {e}")))?;

        let sample_format = supported_config.sample_format();
        let sample_rate = supported_config.sample_rate().0 as f32;
        let channels = supported_config.channels() as usize;
        let config: StreamConfig = supported_config.into();

        let clock = SampleClock::new(sample_rate as f64);
        let volume = AtomicF32::new(0.8);

        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(
                &device,
                &config,
                channels,
                command_rx,
                clock.clone(),
                volume.clone(),
                sample_rate,
            ),
            SampleFormat::I16 => Self::build_stream::<i16>(
                &device,
                &config,
                channels,
                command_rx,
                clock.clone(),
                volume.clone(),
                sample_rate,
            ),
            SampleFormat::U16 => Self::build_stream::<u16>(
                &device,
                &config,
                channels,
                command_rx,
                clock.clone(),
                volume.clone(),
                sample_rate,
            ),
            other => Err(EngineError::AudioUnavailable(format!(
                "unsupported sample format {other:?}"
            ))),
        }?;

        Ok(Self {
            _device: device,
            stream,
            clock,
            sample_rate,
            volume,
        })
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        channels: usize,
        mut command_rx: CommandConsumer,
        clock: SampleClock,
        volume: AtomicF32,
        sample_rate: f32,
    ) -> EngineResult<Stream>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        let mut pool = VoicePool::new(sample_rate, MAX_VOICES);

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let now = clock.current_sample();

                    while let Some(command) =
                        ringbuf::traits::Consumer::try_pop(&mut command_rx)
                    {
                        match command {
                            AudioCommand::Click {
                                kind,
                                gain,
                                start_sample,
                            } => {
                                let delay = start_sample
                                    .saturating_sub(now)
                                    .min(u32::MAX as u64)
                                    as u32;
                                pool.start_click(kind, gain, delay);
                            }
                            AudioCommand::Tone {
                                pitch,
                                gain,
                                start_sample,
                                duration_samples,
                            } => {
                                let delay = start_sample
                                    .saturating_sub(now)
                                    .min(u32::MAX as u64)
                                    as u32;
                                pool.start_tone(pitch, gain, delay, duration_samples);
                            }
                            AudioCommand::StopAll => pool.clear(),
                        }
                    }

                    let master = volume.get();
                    for frame in data.chunks_mut(channels) {
                        let sample = (pool.next_sample() * master).clamp(-1.0, 1.0);
                        for out in frame.iter_mut() {
                            *out = Sample::from_sample::<f32>(sample);
                        }
                    }

                    clock.advance(data.len() / channels);
                },
                move |err| {
                    eprintln!("Audio stream error: {err}");
                },
                None,
            )
            .map_err(|e| EngineError::AudioUnavailable(format!("build stream: {e}")))?;

        // Leave the stream paused until the first activation
        stream
            .pause()
            .map_err(|e| EngineError::AudioUnavailable(format!("pause stream: {e}")))?;

        Ok(stream)
    }

    /// Resume the output stream. Precondition of any playback; a failure
    /// here is surfaced to the caller, never swallowed.
    pub fn resume(&self) -> EngineResult<()> {
        self.stream
            .play()
            .map_err(|e| EngineError::AudioUnavailable(format!("resume stream: {e}")))
    }

    /// Pause the output stream (called when the last active scheduler
    /// deactivates)
    pub fn suspend(&self) -> EngineResult<()> {
        self.stream
            .pause()
            .map_err(|e| EngineError::AudioUnavailable(format!("suspend stream: {e}")))
    }

    /// The clock this stream advances
    pub fn clock(&self) -> SampleClock {
        self.clock.clone()
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}
