//! Dynamics processor: a feed-forward compressor with a limiter mode, computing its gain
//! in the dB domain from an attack/release envelope follower.

use crate::{
    effect::Effect,
    utils::{db_to_linear, linear_to_db, tempo::Transport, MINUS_INF_IN_DB},
};

// -------------------------------------------------------------------------------------------------

/// Ratio value treated as "limit": everything above threshold is held at threshold.
pub const LIMITER_RATIO: f32 = 20.0;

// -------------------------------------------------------------------------------------------------

/// Envelope follower running on dB values, with separate attack and release times.
#[derive(Debug, Clone)]
struct EnvelopeFollower {
    current: f32,
    attack_coeff: f32,
    release_coeff: f32,
    sample_rate: u32,
}

impl EnvelopeFollower {
    fn new(sample_rate: u32) -> Self {
        let mut follower = Self {
            current: MINUS_INF_IN_DB,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            sample_rate,
        };
        follower.set_times(0.01, 0.1);
        follower
    }

    fn set_times(&mut self, attack: f32, release: f32) {
        let coeff = |time: f32| {
            if time > 0.0 && self.sample_rate > 0 {
                (-1.0 / (time * self.sample_rate as f32)).exp()
            } else {
                0.0
            }
        };
        self.attack_coeff = coeff(attack);
        self.release_coeff = coeff(release);
    }

    #[inline]
    fn process(&mut self, input_db: f32) -> f32 {
        let coeff = if input_db > self.current {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.current = input_db + coeff * (self.current - input_db);
        self.current
    }

    fn reset(&mut self) {
        self.current = MINUS_INF_IN_DB;
    }
}

// -------------------------------------------------------------------------------------------------

/// Compressor/limiter over the stereo mix. Both channels share one gain computer keyed
/// from the louder channel, so the stereo image does not shift under compression.
pub struct DynamicsEffect {
    /// Threshold in dB.
    threshold_db: f32,
    /// Compression ratio, 1..=LIMITER_RATIO. At LIMITER_RATIO the effect limits.
    ratio: f32,
    /// Make-up gain in dB.
    makeup_db: f32,
    attack: f32,
    release: f32,
    follower: EnvelopeFollower,
    sample_rate: u32,
}

impl DynamicsEffect {
    pub fn new() -> Self {
        Self {
            threshold_db: -12.0,
            ratio: 4.0,
            makeup_db: 0.0,
            attack: 0.01,
            release: 0.1,
            follower: EnvelopeFollower::new(44100),
            sample_rate: 0,
        }
    }

    /// Set threshold (dB), ratio (1..=LIMITER_RATIO), attack/release (seconds) and
    /// make-up gain (dB).
    pub fn set_params(
        &mut self,
        threshold_db: f32,
        ratio: f32,
        attack: f32,
        release: f32,
        makeup_db: f32,
    ) {
        self.threshold_db = threshold_db.clamp(-60.0, 0.0);
        self.ratio = ratio.clamp(1.0, LIMITER_RATIO);
        self.makeup_db = makeup_db.clamp(-24.0, 24.0);
        if self.attack != attack || self.release != release {
            self.attack = attack.max(0.0);
            self.release = release.max(0.0);
            self.follower.set_times(self.attack, self.release);
        }
    }

    #[inline]
    fn gain_reduction_db(&self, level_db: f32) -> f32 {
        let over = level_db - self.threshold_db;
        if over <= 0.0 {
            0.0
        } else if self.ratio >= LIMITER_RATIO {
            -over
        } else {
            over / self.ratio - over
        }
    }
}

impl Default for DynamicsEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for DynamicsEffect {
    fn name(&self) -> &'static str {
        "DynamicsEffect"
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_frames: usize) {
        self.sample_rate = sample_rate;
        self.follower = EnvelopeFollower::new(sample_rate);
        self.follower.set_times(self.attack, self.release);
    }

    fn process(&mut self, output: &mut [f32], _transport: &Transport) {
        debug_assert!(self.sample_rate > 0, "Dynamics not prepared");
        let makeup = db_to_linear(self.makeup_db);

        for frame in output.chunks_exact_mut(2) {
            let key = frame[0].abs().max(frame[1].abs());
            let level_db = self.follower.process(linear_to_db(key));
            let gain = db_to_linear(self.gain_reduction_db(level_db)) * makeup;
            frame[0] *= gain;
            frame[1] *= gain;
        }
    }

    fn reset(&mut self) {
        self.follower.reset();
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 48000;

    fn settled_rms(dynamics: &mut DynamicsEffect, amplitude: f32) -> f32 {
        let mut buffer = vec![0.0f32; 48000];
        for (index, sample) in buffer.iter_mut().enumerate() {
            *sample = (std::f32::consts::TAU * 440.0 * (index / 2) as f32
                / SAMPLE_RATE as f32)
                .sin()
                * amplitude;
        }
        dynamics.process(&mut buffer, &Transport::default());
        let tail = &buffer[buffer.len() / 2..];
        (tail.iter().map(|s| s * s).sum::<f32>() / tail.len() as f32).sqrt()
    }

    #[test]
    fn compresses_above_threshold() {
        let mut dynamics = DynamicsEffect::new();
        dynamics.prepare(SAMPLE_RATE, 512);
        dynamics.set_params(-20.0, 4.0, 0.001, 0.05, 0.0);

        // full scale sine: ~20 dB over threshold, 4:1 leaves ~5 dB over
        let compressed = settled_rms(&mut dynamics, 1.0);
        let expected = db_to_linear(-20.0 + 20.0 / 4.0) / std::f32::consts::SQRT_2;
        assert!(
            (compressed - expected).abs() < expected * 0.3,
            "rms {compressed} vs expected {expected}"
        );
    }

    #[test]
    fn leaves_quiet_audio_untouched() {
        let mut dynamics = DynamicsEffect::new();
        dynamics.prepare(SAMPLE_RATE, 512);
        dynamics.set_params(-12.0, 8.0, 0.001, 0.05, 0.0);

        let quiet = settled_rms(&mut dynamics, 0.05); // ~-26 dB, below threshold
        let expected = 0.05 / std::f32::consts::SQRT_2;
        assert!((quiet - expected).abs() < expected * 0.05);
    }

    #[test]
    fn limiter_mode_pins_to_threshold() {
        let mut dynamics = DynamicsEffect::new();
        dynamics.prepare(SAMPLE_RATE, 512);
        dynamics.set_params(-12.0, LIMITER_RATIO, 0.0005, 0.05, 0.0);

        let limited = settled_rms(&mut dynamics, 1.0);
        let ceiling = db_to_linear(-12.0);
        assert!(limited <= ceiling * 1.1, "rms {limited} above ceiling {ceiling}");
    }
}
