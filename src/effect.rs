//! Post-mix effects: a single capability trait and the chain members, composed into a
//! user-ordered list by the engine.

use strum::{Display, EnumIter, EnumString};

use crate::utils::tempo::Transport;

// -------------------------------------------------------------------------------------------------

pub mod chorus;
pub mod delay;
pub mod distortion;
pub mod dynamics;
pub mod eq;
pub mod gate;
pub mod reverb;

// -------------------------------------------------------------------------------------------------

/// An audio effect processing interleaved stereo buffers in place.
///
/// `prepare` runs on a control thread and may allocate (delay buffers etc.); `process`
/// and `reset` run on the real-time audio thread and must not block or allocate.
/// Parameters are plain setters, driven per sub-block by the engine from resolved
/// modulation matrix values.
pub trait Effect: Send {
    /// A static name for logging and diagnostics.
    fn name(&self) -> &'static str;

    /// Initialize for the given sample rate and the longest buffer `process` will see.
    fn prepare(&mut self, sample_rate: u32, max_block_frames: usize);

    /// Process an interleaved stereo buffer in place.
    fn process(&mut self, output: &mut [f32], transport: &Transport);

    /// Clear all internal state (delay lines, envelopes), e.g. after a missed block.
    fn reset(&mut self);
}

// -------------------------------------------------------------------------------------------------

/// The chain members, in their default order. The user-configured order is an array of
/// these; each effect is additionally enable-gated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, EnumIter, EnumString)]
pub enum FxSlot {
    Gate,
    Chorus,
    Distortion,
    Delay,
    Eq,
    Dynamics,
    Reverb,
}

/// Number of effects in the chain.
pub const NUM_FX_SLOTS: usize = 7;

/// The default chain order.
pub const DEFAULT_FX_ORDER: [FxSlot; NUM_FX_SLOTS] = [
    FxSlot::Gate,
    FxSlot::Chorus,
    FxSlot::Distortion,
    FxSlot::Delay,
    FxSlot::Eq,
    FxSlot::Dynamics,
    FxSlot::Reverb,
];
