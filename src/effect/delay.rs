//! Stereo delay with feedback and cross-feedback, free-running or tempo-synced.
//!
//! The delay time is linearly smoothed towards its target so free (unsynced) time changes
//! tape-glide instead of clicking. Tempo-synced times are resolved to seconds by the
//! engine before they arrive here.

use crate::{
    effect::Effect,
    utils::{
        delay_line::DelayLine,
        smoothed::{LinearSmoothedValue, SmoothedValue},
        tempo::Transport,
    },
};

// -------------------------------------------------------------------------------------------------

/// Longest supported delay time in seconds.
pub const MAX_DELAY_SECONDS: f32 = 4.0;

// -------------------------------------------------------------------------------------------------

/// Stereo feedback/cross-feedback delay.
pub struct DelayEffect {
    left: DelayLine<1>,
    right: DelayLine<1>,
    /// Delay time in seconds, smoothed.
    time: LinearSmoothedValue,
    /// Feedback gain, 0..=1.
    feedback: f32,
    /// Cross-channel feedback gain, 0..=1.
    cross_feedback: f32,
    /// Dry/wet mix, 0..=1.
    mix: f32,
    sample_rate: u32,
}

impl DelayEffect {
    pub fn new() -> Self {
        Self {
            left: DelayLine::new(0),
            right: DelayLine::new(0),
            time: LinearSmoothedValue::with_ramp_duration(0.25, 0.05, 44100),
            feedback: 0.3,
            cross_feedback: 0.0,
            mix: 0.5,
            sample_rate: 0,
        }
    }

    /// Set delay time in seconds, feedback/cross-feedback/mix gains 0..=1.
    pub fn set_params(&mut self, time: f32, feedback: f32, cross_feedback: f32, mix: f32) {
        self.time.set_target(time.clamp(0.001, MAX_DELAY_SECONDS));
        self.feedback = feedback.clamp(0.0, 1.0);
        self.cross_feedback = cross_feedback.clamp(0.0, 1.0);
        self.mix = mix.clamp(0.0, 1.0);
    }
}

impl Default for DelayEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for DelayEffect {
    fn name(&self) -> &'static str {
        "DelayEffect"
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_frames: usize) {
        self.sample_rate = sample_rate;
        let max_frames = (MAX_DELAY_SECONDS * sample_rate as f32).ceil() as usize + 2;
        self.left = DelayLine::new(max_frames);
        self.right = DelayLine::new(max_frames);
        self.time.set_sample_rate(sample_rate);
    }

    fn process(&mut self, output: &mut [f32], _transport: &Transport) {
        debug_assert!(self.sample_rate > 0, "Delay not prepared");
        let sample_rate = self.sample_rate as f32;

        for frame in output.chunks_exact_mut(2) {
            let delay_frames = (self.time.next() * sample_rate).max(1.0);

            let wet_left = self.left.read(delay_frames)[0];
            let wet_right = self.right.read(delay_frames)[0];

            // feedback stays in channel, cross-feedback swaps channels
            self.left
                .write([frame[0] + wet_left * self.feedback + wet_right * self.cross_feedback]);
            self.right
                .write([frame[1] + wet_right * self.feedback + wet_left * self.cross_feedback]);

            frame[0] = frame[0] * (1.0 - self.mix) + wet_left * self.mix;
            frame[1] = frame[1] * (1.0 - self.mix) + wet_right * self.mix;
        }
    }

    fn reset(&mut self) {
        self.left.flush();
        self.right.flush();
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 8000;

    fn prepared_delay(time: f32, feedback: f32, cross: f32, mix: f32) -> DelayEffect {
        let mut delay = DelayEffect::new();
        delay.prepare(SAMPLE_RATE, 512);
        delay.set_params(time, feedback, cross, mix);
        // swallow the initial time ramp
        let mut warmup = vec![0.0f32; 2048];
        delay.process(&mut warmup, &Transport::default());
        delay.reset();
        delay
    }

    #[test]
    fn echoes_arrive_after_delay_time() {
        let mut delay = prepared_delay(0.1, 0.5, 0.0, 1.0);

        let frames = SAMPLE_RATE as usize; // one second
        let mut buffer = vec![0.0f32; frames * 2];
        buffer[0] = 1.0;
        delay.process(&mut buffer, &Transport::default());

        let tap = |seconds: f32| {
            let frame = (seconds * SAMPLE_RATE as f32) as usize;
            buffer[frame * 2].abs()
        };
        // first and second echo with decaying feedback
        assert!(tap(0.1) > 0.9);
        assert!(tap(0.2) > 0.4 && tap(0.2) < 0.6);
        assert!(tap(0.05) < 0.01);
    }

    #[test]
    fn cross_feedback_moves_echo_to_other_channel() {
        let mut delay = prepared_delay(0.05, 0.0, 0.8, 1.0);

        let frames = SAMPLE_RATE as usize / 2;
        let mut buffer = vec![0.0f32; frames * 2];
        buffer[0] = 1.0; // left channel impulse only
        delay.process(&mut buffer, &Transport::default());

        let frame_at = |seconds: f32| {
            let frame = (seconds * SAMPLE_RATE as f32) as usize;
            (buffer[frame * 2].abs(), buffer[frame * 2 + 1].abs())
        };
        // first echo on the left, second echo crossed into the right
        let (left1, right1) = frame_at(0.05);
        assert!(left1 > 0.9 && right1 < 0.01);
        let (left2, right2) = frame_at(0.1);
        assert!(right2 > 0.7 && left2 < 0.01, "left={left2} right={right2}");
    }
}
