//! Distortion: a mode selector between mutually exclusive algorithms - a plain
//! waveshaper, a bit crusher and two amp emulation voicings. Only the selected mode
//! processes; the others stay untouched.

use strum::{Display, EnumIter, EnumString};

use crate::{
    effect::Effect,
    utils::tempo::Transport,
};

// -------------------------------------------------------------------------------------------------

/// The selectable distortion algorithms.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Display, EnumIter, EnumString)]
pub enum DistortionMode {
    /// Symmetric clipping waveshaper driven by a single amount.
    #[default]
    Shaper,
    /// Sample rate and bit depth reduction.
    Crush,
    /// Bright, compressing amp voicing.
    FireAmp,
    /// Dark, aggressive amp voicing.
    GrindAmp,
}

// -------------------------------------------------------------------------------------------------

/// Parameters of the crusher mode.
#[derive(Debug, Clone, Copy)]
pub struct CrushParams {
    /// Sample rate reduction, 0..=1 (1 = strongest decimation).
    pub rate: f32,
    /// Bit depth reduction, 0..=1 (1 = fewest levels).
    pub rez: f32,
    /// Blend between soft and hard quantization, 0..=1.
    pub hard: f32,
    /// Dry/wet mix, 0..=1.
    pub mix: f32,
}

impl Default for CrushParams {
    fn default() -> Self {
        Self {
            rate: 0.5,
            rez: 0.5,
            hard: 0.8,
            mix: 1.0,
        }
    }
}

/// Parameters of the two amp modes.
#[derive(Debug, Clone, Copy)]
pub struct AmpParams {
    /// Input gain, 0..=1.
    pub gain: f32,
    /// Tone control, 0..=1 (dark to bright).
    pub tone: f32,
    /// Output level, 0..=1.
    pub output: f32,
    /// Dry/wet mix, 0..=1.
    pub mix: f32,
}

impl Default for AmpParams {
    fn default() -> Self {
        Self {
            gain: 0.5,
            tone: 0.5,
            output: 0.8,
            mix: 1.0,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Multi-algorithm distortion effect.
pub struct DistortionEffect {
    mode: DistortionMode,
    /// Shaper drive amount, 0..=1.
    amount: f32,
    crush: CrushParams,
    fire: AmpParams,
    grind: AmpParams,
    // crusher state
    hold: [f32; 2],
    hold_phase: f32,
    // amp tone filter state, one pole per channel
    tone_state: [f32; 2],
    sample_rate: u32,
}

impl DistortionEffect {
    pub fn new() -> Self {
        Self {
            mode: DistortionMode::default(),
            amount: 0.2,
            crush: CrushParams::default(),
            fire: AmpParams::default(),
            grind: AmpParams::default(),
            hold: [0.0; 2],
            hold_phase: 0.0,
            tone_state: [0.0; 2],
            sample_rate: 0,
        }
    }

    pub fn set_mode(&mut self, mode: DistortionMode) {
        if self.mode != mode {
            self.mode = mode;
            self.reset();
        }
    }

    /// Set the shaper mode drive amount, 0..=1.
    pub fn set_amount(&mut self, amount: f32) {
        self.amount = amount.clamp(0.0, 1.0);
    }

    pub fn set_crush_params(&mut self, params: CrushParams) {
        self.crush = params;
    }

    pub fn set_fire_params(&mut self, params: AmpParams) {
        self.fire = params;
    }

    pub fn set_grind_params(&mut self, params: AmpParams) {
        self.grind = params;
    }

    #[inline]
    fn shaper(sample: f32, amount: f32) -> f32 {
        // drive into a cubic soft clipper, then hard limit at the inverse drive
        let drive = 1.0 + amount * 9.0;
        let clip = 1.0 / (2.0 * amount.max(0.05));
        let boosted = sample * drive;
        let shaped = if boosted.abs() >= 1.0 {
            boosted.signum()
        } else {
            1.5 * (boosted - boosted.powi(3) / 3.0)
        };
        shaped.clamp(-clip, clip)
    }

    fn process_crush(&mut self, output: &mut [f32]) {
        let params = self.crush;
        // hold factor: 1.0 keeps every sample, higher values repeat held samples
        let hold_frames = 1.0 + params.rate * params.rate * 63.0;
        let levels = (2.0f32).powf(2.0 + (1.0 - params.rez) * 10.0);

        for frame in output.chunks_exact_mut(2) {
            self.hold_phase += 1.0;
            if self.hold_phase >= hold_frames {
                self.hold_phase -= hold_frames;
                self.hold = [frame[0], frame[1]];
            }
            for channel in 0..2 {
                let held = self.hold[channel];
                let quantized = (held * levels).floor() / levels;
                let crushed = quantized * params.hard + held * (1.0 - params.hard);
                frame[channel] =
                    frame[channel] * (1.0 - params.mix) + crushed * params.mix;
            }
        }
    }

    fn process_amp(&mut self, output: &mut [f32], bright: bool) {
        let params = if bright { self.fire } else { self.grind };
        let drive = 1.0 + params.gain * params.gain * 40.0;
        // tone: one pole lowpass opening with the tone control
        let tone_coeff = 0.05 + params.tone * 0.9;
        let out_gain = params.output * 1.2;

        for frame in output.chunks_exact_mut(2) {
            for channel in 0..2 {
                let dry = frame[channel];
                let boosted = dry * drive;
                let shaped = if bright {
                    // symmetric atan stage, compressing towards a bright edge
                    (2.0 / std::f32::consts::PI) * boosted.atan()
                } else {
                    // asymmetric stage: harder clipping on the negative half
                    if boosted >= 0.0 {
                        1.0 - (-boosted).exp()
                    } else {
                        -0.8 * (1.0 - boosted.exp())
                    }
                };
                let state = &mut self.tone_state[channel];
                *state += (shaped - *state) * tone_coeff;
                let toned = *state;
                frame[channel] = dry * (1.0 - params.mix) + toned * out_gain * params.mix;
            }
        }
    }
}

impl Default for DistortionEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for DistortionEffect {
    fn name(&self) -> &'static str {
        "DistortionEffect"
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_frames: usize) {
        self.sample_rate = sample_rate;
    }

    fn process(&mut self, output: &mut [f32], _transport: &Transport) {
        match self.mode {
            DistortionMode::Shaper => {
                let amount = self.amount;
                for sample in output.iter_mut() {
                    *sample = Self::shaper(*sample, amount);
                }
            }
            DistortionMode::Crush => self.process_crush(output),
            DistortionMode::FireAmp => self.process_amp(output, true),
            DistortionMode::GrindAmp => self.process_amp(output, false),
        }
    }

    fn reset(&mut self) {
        self.hold = [0.0; 2];
        self.hold_phase = 0.0;
        self.tone_state = [0.0; 2];
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shaper_saturates_and_stays_bounded() {
        let mut distortion = DistortionEffect::new();
        distortion.prepare(48000, 512);
        distortion.set_mode(DistortionMode::Shaper);
        distortion.set_amount(0.8);

        let mut buffer: Vec<f32> = (0..512).map(|i| (i as f32 * 0.1).sin() * 2.0).collect();
        distortion.process(&mut buffer, &Transport::default());
        let clip = 1.0 / (2.0 * 0.8);
        assert!(buffer.iter().all(|s| s.abs() <= clip + 1e-6));
        assert!(buffer.iter().any(|s| (s.abs() - clip).abs() < 1e-3));
    }

    #[test]
    fn crush_quantizes_levels() {
        let mut distortion = DistortionEffect::new();
        distortion.prepare(48000, 512);
        distortion.set_mode(DistortionMode::Crush);
        distortion.set_crush_params(CrushParams {
            rate: 0.0,
            rez: 1.0, // 4 quantization levels
            hard: 1.0,
            mix: 1.0,
        });

        let mut buffer: Vec<f32> = (0..1024).map(|i| (i as f32 * 0.01).sin()).collect();
        distortion.process(&mut buffer, &Transport::default());

        // count distinct output values: must collapse to very few levels
        let mut values: Vec<i32> = buffer.iter().map(|s| (s * 1000.0).round() as i32).collect();
        values.sort_unstable();
        values.dedup();
        assert!(values.len() <= 10, "got {} distinct levels", values.len());
    }

    #[test]
    fn amp_modes_differ() {
        let input: Vec<f32> = (0..512).map(|i| (i as f32 * 0.05).sin() * 0.8).collect();

        let render = |mode: DistortionMode| {
            let mut distortion = DistortionEffect::new();
            distortion.prepare(48000, 512);
            distortion.set_mode(mode);
            let mut buffer = input.clone();
            distortion.process(&mut buffer, &Transport::default());
            buffer
        };

        let fire = render(DistortionMode::FireAmp);
        let grind = render(DistortionMode::GrindAmp);
        assert!(fire.iter().all(|s| s.is_finite()));
        assert!(grind.iter().all(|s| s.is_finite()));
        let difference: f32 = fire
            .iter()
            .zip(&grind)
            .map(|(a, b)| (a - b).abs())
            .sum();
        assert!(difference > 1.0, "amp voicings should sound different");
    }
}
