//! Plate-style reverb: predelay into an input lowpass, then a parallel comb bank with
//! in-loop damping and a serial allpass diffusor per channel.

use crate::{
    effect::Effect,
    utils::{delay_line::DelayLine, tempo::Transport},
};

// -------------------------------------------------------------------------------------------------

/// Comb delay lengths in samples at 44.1 kHz, classic plate tuning.
const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
/// Allpass delay lengths in samples at 44.1 kHz.
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];
/// Extra samples on the right channel to decorrelate the stereo image.
const STEREO_SPREAD: usize = 23;
/// Fixed wet path gain to keep the comb bank sum in range.
const WET_GAIN: f32 = 0.015;
/// Longest supported predelay in seconds.
pub const MAX_PREDELAY_SECONDS: f32 = 0.1;

// -------------------------------------------------------------------------------------------------

struct Comb {
    delay: DelayLine<1>,
    base_frames: f32,
    filter_state: f32,
}

impl Comb {
    fn process(&mut self, input: f32, size: f32, feedback: f32, damp: f32) -> f32 {
        let frames = (self.base_frames * size).max(2.0);
        let output = self.delay.read(frames)[0];
        self.filter_state = output * (1.0 - damp) + self.filter_state * damp;
        self.delay.write([input + self.filter_state * feedback]);
        output
    }
}

struct Allpass {
    delay: DelayLine<1>,
    frames: f32,
}

impl Allpass {
    fn process(&mut self, input: f32) -> f32 {
        const FEEDBACK: f32 = 0.5;
        let buffered = self.delay.read(self.frames)[0];
        self.delay.write([input + buffered * FEEDBACK]);
        buffered - input
    }
}

// -------------------------------------------------------------------------------------------------

/// Plate reverb over the stereo mix.
pub struct ReverbEffect {
    /// Room size, 0..=1, scales the comb lengths.
    size: f32,
    /// Tail length, 0..=1, maps to comb feedback.
    decay: f32,
    /// Input lowpass cutoff in Hz.
    lowpass_hz: f32,
    /// In-loop damping cutoff in Hz; lower values darken the tail faster.
    damping_hz: f32,
    /// Predelay in seconds.
    predelay: f32,
    /// Dry/wet mix, 0..=1.
    mix: f32,

    predelay_line: DelayLine<2>,
    lowpass_state: [f32; 2],
    combs: [Vec<Comb>; 2],
    allpasses: [Vec<Allpass>; 2],
    sample_rate: u32,
}

impl ReverbEffect {
    pub fn new() -> Self {
        Self {
            size: 0.5,
            decay: 0.5,
            lowpass_hz: 10_000.0,
            damping_hz: 10_000.0,
            predelay: 0.0,
            mix: 0.3,
            predelay_line: DelayLine::new(0),
            lowpass_state: [0.0; 2],
            combs: [Vec::new(), Vec::new()],
            allpasses: [Vec::new(), Vec::new()],
            sample_rate: 0,
        }
    }

    /// Set all reverb parameters: size/decay/mix 0..=1, lowpass/damping in Hz, predelay
    /// in seconds.
    pub fn set_params(
        &mut self,
        size: f32,
        decay: f32,
        lowpass_hz: f32,
        damping_hz: f32,
        predelay: f32,
        mix: f32,
    ) {
        self.size = size.clamp(0.0, 1.0);
        self.decay = decay.clamp(0.0, 1.0);
        self.lowpass_hz = lowpass_hz.clamp(16.0, 20_000.0);
        self.damping_hz = damping_hz.clamp(16.0, 20_000.0);
        self.predelay = predelay.clamp(0.0, MAX_PREDELAY_SECONDS);
        self.mix = mix.clamp(0.0, 1.0);
    }

    #[inline]
    fn size_factor(&self) -> f32 {
        0.6 + self.size * 0.8
    }

    #[inline]
    fn comb_feedback(&self) -> f32 {
        0.7 + self.decay * 0.28
    }
}

impl Default for ReverbEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for ReverbEffect {
    fn name(&self) -> &'static str {
        "ReverbEffect"
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_frames: usize) {
        self.sample_rate = sample_rate;
        let rate_scale = sample_rate as f32 / 44100.0;
        // capacity for the largest size factor
        let capacity = |tuning: usize| ((tuning + STEREO_SPREAD) as f32 * rate_scale * 1.5) as usize + 2;

        for channel in 0..2 {
            let spread = if channel == 0 { 0 } else { STEREO_SPREAD };
            self.combs[channel] = COMB_TUNINGS
                .iter()
                .map(|tuning| Comb {
                    delay: DelayLine::new(capacity(*tuning)),
                    base_frames: (*tuning + spread) as f32 * rate_scale,
                    filter_state: 0.0,
                })
                .collect();
            self.allpasses[channel] = ALLPASS_TUNINGS
                .iter()
                .map(|tuning| Allpass {
                    delay: DelayLine::new(capacity(*tuning)),
                    frames: (*tuning + spread) as f32 * rate_scale,
                })
                .collect();
        }
        self.predelay_line =
            DelayLine::new((MAX_PREDELAY_SECONDS * sample_rate as f32) as usize + 2);
    }

    fn process(&mut self, output: &mut [f32], _transport: &Transport) {
        debug_assert!(self.sample_rate > 0, "Reverb not prepared");
        let sample_rate = self.sample_rate as f32;

        let size = self.size_factor();
        let feedback = self.comb_feedback();
        let damp = (1.0 - self.damping_hz / 20_000.0).clamp(0.0, 0.95);
        let lowpass_coeff =
            1.0 - (-std::f32::consts::TAU * self.lowpass_hz / sample_rate).exp();
        let predelay_frames = (self.predelay * sample_rate).max(1.0);

        for frame in output.chunks_exact_mut(2) {
            let delayed = {
                self.predelay_line.write([frame[0], frame[1]]);
                self.predelay_line.read(predelay_frames)
            };

            for channel in 0..2 {
                let state = &mut self.lowpass_state[channel];
                *state += (delayed[channel] - *state) * lowpass_coeff;
                let input = *state;

                let mut wet = 0.0;
                for comb in &mut self.combs[channel] {
                    wet += comb.process(input, size, feedback, damp);
                }
                for allpass in &mut self.allpasses[channel] {
                    wet = allpass.process(wet);
                }
                wet *= WET_GAIN;

                frame[channel] = frame[channel] * (1.0 - self.mix) + wet * self.mix;
            }
        }
    }

    fn reset(&mut self) {
        self.predelay_line.flush();
        self.lowpass_state = [0.0; 2];
        for channel in 0..2 {
            for comb in &mut self.combs[channel] {
                comb.delay.flush();
                comb.filter_state = 0.0;
            }
            for allpass in &mut self.allpasses[channel] {
                allpass.delay.flush();
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------
