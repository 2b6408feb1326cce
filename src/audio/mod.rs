// Audio module - output stream, clock and callback-side voices

pub mod click;
pub mod clock;
pub mod output;
pub mod params;
pub mod voice;

pub use click::{ClickBank, ClickKind};
pub use clock::{ClockSource, ManualClock, SampleClock};
pub use output::AudioOutput;
pub use params::AtomicF32;
pub use voice::VoicePool;
