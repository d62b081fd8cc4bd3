//! Note and controller input events, delivered sample aligned with each render call.

// -------------------------------------------------------------------------------------------------

/// A single note or controller event.
///
/// Continuous values (velocity, pressure, timbre, controller values) are normalized to
/// \[0, 1\]; wheel and per-note pitch bend are normalized to \[-1, 1\] and scaled by the
/// engine's pitch bend range setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteEvent {
    /// Start a new note.
    NoteOn { note: u8, velocity: f32, channel: u8 },
    /// Release a playing note.
    NoteOff { note: u8, channel: u8 },
    /// Global pitch bend wheel, -1..=1.
    PitchBend { value: f32 },
    /// Per-note (MPE) pitch bend, -1..=1.
    NotePitchBend { note: u8, value: f32 },
    /// Per-note (MPE) pressure/aftertouch, 0..=1.
    NotePressure { note: u8, pressure: f32 },
    /// Per-note (MPE) timbre (CC74 style), 0..=1.
    NoteTimbre { note: u8, timbre: f32 },
    /// MIDI continuous controller, number 0..=119, value 0..=1.
    Controller { number: u8, value: f32 },
    /// Release all playing notes (with release tails).
    AllNotesOff,
}

// -------------------------------------------------------------------------------------------------

/// A [`NoteEvent`] bound to a sample frame offset within the current render call.
///
/// Events passed to `process` must be ordered by frame. They are dispatched at sub-block
/// granularity, which bounds their timing jitter to the sub-block length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedEvent {
    /// Sample frame offset relative to the start of the render call.
    pub frame: u32,
    /// The event itself.
    pub event: NoteEvent,
}

impl TimedEvent {
    pub fn new(frame: u32, event: NoteEvent) -> Self {
        Self { frame, event }
    }
}
