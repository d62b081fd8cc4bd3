#![doc = include_str!("../README.md")]

// private mods (partly re-exported)
mod engine;
mod error;
mod event;
mod scope;
mod voice;

// public, flat re-exports
pub use engine::WavetableSynth;
pub use error::Error;
pub use event::{NoteEvent, TimedEvent};
pub use filter::FilterMode;
pub use scope::ScopeReader;

// public mods
pub mod effect;
pub mod envelope;
pub mod filter;
pub mod lfo;
pub mod modulation;
pub mod oscillator;
pub mod parameter;
pub mod params;
pub mod settings;
pub mod utils;
pub mod wavetable;

// -------------------------------------------------------------------------------------------------

/// Fixed voice pool size. Voices are created once and recycled forever; the active voice
/// cap is a separate, user adjustable setting.
pub const MAX_VOICES: usize = 50;

/// Fixed sub-block length in frames: the temporal resolution of all modulation sources.
/// Modulation is recomputed once per sub-block, not once per sample, bounding modulation
/// latency against the CPU cost of re-evaluating every source per sample.
pub const SUB_BLOCK_FRAMES: usize = 32;
