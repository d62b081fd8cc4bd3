//! Five band equalizer: low shelf, three bells, high shelf, built on the shared SVF core.

use crate::{
    effect::Effect,
    filter::{SvfCoefficients, SvfSection, SvfShape},
    utils::tempo::Transport,
};

// -------------------------------------------------------------------------------------------------

/// Number of EQ bands.
pub const NUM_EQ_BANDS: usize = 5;

/// Fixed band center/corner frequencies in Hz.
const BAND_FREQUENCIES: [f32; NUM_EQ_BANDS] = [80.0, 250.0, 1000.0, 3500.0, 10_000.0];

const BAND_SHAPES: [SvfShape; NUM_EQ_BANDS] = [
    SvfShape::LowShelf,
    SvfShape::Bell,
    SvfShape::Bell,
    SvfShape::Bell,
    SvfShape::HighShelf,
];

/// Gain range of each band in dB.
pub const EQ_GAIN_RANGE_DB: f32 = 24.0;

// -------------------------------------------------------------------------------------------------

/// Five band EQ effect with fixed band frequencies and adjustable band gains.
pub struct EqEffect {
    gains_db: [f32; NUM_EQ_BANDS],
    coefficients: [SvfCoefficients; NUM_EQ_BANDS],
    sections: [[SvfSection; 2]; NUM_EQ_BANDS], // [band][channel]
    coefficients_dirty: bool,
    sample_rate: u32,
}

impl EqEffect {
    pub fn new() -> Self {
        Self {
            gains_db: [0.0; NUM_EQ_BANDS],
            coefficients: Default::default(),
            sections: Default::default(),
            coefficients_dirty: true,
            sample_rate: 0,
        }
    }

    /// Set the gain of one band in dB, clamped to +/-[`EQ_GAIN_RANGE_DB`].
    pub fn set_band_gain(&mut self, band: usize, gain_db: f32) {
        if band < NUM_EQ_BANDS {
            let gain_db = gain_db.clamp(-EQ_GAIN_RANGE_DB, EQ_GAIN_RANGE_DB);
            if self.gains_db[band] != gain_db {
                self.gains_db[band] = gain_db;
                self.coefficients_dirty = true;
            }
        }
    }

    fn update_coefficients(&mut self) {
        for band in 0..NUM_EQ_BANDS {
            self.coefficients[band].set(
                BAND_SHAPES[band],
                self.sample_rate,
                BAND_FREQUENCIES[band],
                std::f32::consts::FRAC_1_SQRT_2,
                self.gains_db[band],
            );
        }
        self.coefficients_dirty = false;
    }
}

impl Default for EqEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for EqEffect {
    fn name(&self) -> &'static str {
        "EqEffect"
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_frames: usize) {
        self.sample_rate = sample_rate;
        self.coefficients_dirty = true;
    }

    fn process(&mut self, output: &mut [f32], _transport: &Transport) {
        debug_assert!(self.sample_rate > 0, "EQ not prepared");
        if self.coefficients_dirty {
            self.update_coefficients();
        }
        for frame in output.chunks_exact_mut(2) {
            for band in 0..NUM_EQ_BANDS {
                // flat bands still run to keep state warm for click free gain changes
                let coefficients = &self.coefficients[band];
                for (channel, sample) in frame.iter_mut().enumerate() {
                    *sample = self.sections[band][channel]
                        .process_sample(coefficients, *sample as f64)
                        as f32;
                }
            }
        }
    }

    fn reset(&mut self) {
        for band in &mut self.sections {
            for section in band {
                section.reset();
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::f32::consts::TAU;

    use super::*;

    const SAMPLE_RATE: u32 = 48000;

    fn rms_at(eq: &mut EqEffect, frequency: f32) -> f32 {
        eq.reset();
        let mut buffer = vec![0.0f32; 8192 * 2];
        for (index, frame) in buffer.chunks_exact_mut(2).enumerate() {
            let sample = (TAU * frequency * index as f32 / SAMPLE_RATE as f32).sin();
            frame[0] = sample;
            frame[1] = sample;
        }
        eq.process(&mut buffer, &Transport::default());
        let tail = &buffer[buffer.len() / 2..];
        (tail.iter().map(|s| s * s).sum::<f32>() / tail.len() as f32).sqrt()
    }

    #[test]
    fn flat_settings_pass_audio_unchanged() {
        let mut eq = EqEffect::new();
        eq.prepare(SAMPLE_RATE, 512);
        let rms = rms_at(&mut eq, 1000.0);
        assert!((rms - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.05);
    }

    #[test]
    fn band_gain_boosts_its_frequency_only() {
        let mut eq = EqEffect::new();
        eq.prepare(SAMPLE_RATE, 512);
        eq.set_band_gain(2, 12.0); // 1 kHz bell

        let boosted = rms_at(&mut eq, 1000.0);
        let neighbour = rms_at(&mut eq, 100.0);
        let flat_reference = std::f32::consts::FRAC_1_SQRT_2;
        assert!(boosted > flat_reference * 2.0, "1 kHz should be boosted");
        assert!((neighbour - flat_reference).abs() < 0.1, "100 Hz should stay flat");
    }

    #[test]
    fn cut_attenuates() {
        let mut eq = EqEffect::new();
        eq.prepare(SAMPLE_RATE, 512);
        eq.set_band_gain(0, -18.0); // low shelf cut

        let low = rms_at(&mut eq, 50.0);
        assert!(low < 0.2, "low shelf cut should attenuate 50 Hz, rms {low}");
    }
}
