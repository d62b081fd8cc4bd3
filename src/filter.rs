//! Per-voice multimode filter and the shared state variable filter core.
//!
//! The SVF design follows Andrew Simper's linear trapezoidal state variable filter
//! (<http://cytomic.com/files/dsp/SvfLinearTrapOptimised2.pdf>). It stays stable when
//! modulated at audio rate, which matters here since cutoff moves per block.

use strum::{Display, EnumIter, EnumString};

// -------------------------------------------------------------------------------------------------

/// Hard cutoff clamps applied after pitch-space cutoff computation. The upper bound is
/// additionally limited to Nyquist at runtime.
pub const MIN_CUTOFF_HZ: f32 = 4.0;
pub const MAX_CUTOFF_HZ: f32 = 20_000.0;

/// Base Q of a resonance-less filter.
const FLAT_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Map a resonance amount 0..=1 to a Q factor. Approaches a high-Q asymptote near the top
/// of the range without ever reaching instability.
#[inline]
pub fn resonance_to_q(resonance: f32) -> f32 {
    FLAT_Q / (1.0 - resonance.clamp(0.0, 1.0) * 0.99)
}

// -------------------------------------------------------------------------------------------------

/// Response shapes computable by [`SvfCoefficients`]. The voice filter uses the first
/// four; bell and shelf shapes serve the EQ effect.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Display, EnumIter, EnumString)]
pub enum SvfShape {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
    Bell,
    LowShelf,
    HighShelf,
}

/// Precomputed SVF coefficients, shared by all sections (channels, cascade stages) that
/// run the same settings.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SvfCoefficients {
    a1: f64,
    a2: f64,
    a3: f64,
    m0: f64,
    m1: f64,
    m2: f64,
}

impl SvfCoefficients {
    /// Compute coefficients for the given shape. `cutoff` is clamped into
    /// \[[`MIN_CUTOFF_HZ`], min([`MAX_CUTOFF_HZ`], Nyquist)\] and `q` to a sane positive
    /// range, so this never fails on musically reachable input. `gain_db` is only used by
    /// bell and shelf shapes.
    pub fn set(&mut self, shape: SvfShape, sample_rate: u32, cutoff: f32, q: f32, gain_db: f32) {
        debug_assert!(sample_rate > 0, "Invalid sample rate");
        let nyquist = sample_rate as f32 / 2.0;
        let cutoff = cutoff.clamp(MIN_CUTOFF_HZ, MAX_CUTOFF_HZ.min(nyquist * 0.99)) as f64;
        let q = q.clamp(0.025, 40.0) as f64;

        let g = f64::tan(std::f64::consts::PI * cutoff / sample_rate as f64);
        match shape {
            SvfShape::Lowpass => {
                let k = 1.0 / q;
                self.set_a(g, k);
                (self.m0, self.m1, self.m2) = (0.0, 0.0, 1.0);
            }
            SvfShape::Highpass => {
                let k = 1.0 / q;
                self.set_a(g, k);
                (self.m0, self.m1, self.m2) = (1.0, -k, -1.0);
            }
            SvfShape::Bandpass => {
                let k = 1.0 / q;
                self.set_a(g, k);
                (self.m0, self.m1, self.m2) = (0.0, 1.0, 0.0);
            }
            SvfShape::Notch => {
                let k = 1.0 / q;
                self.set_a(g, k);
                (self.m0, self.m1, self.m2) = (1.0, -k, 0.0);
            }
            SvfShape::Bell => {
                let a = f64::powf(10.0, gain_db as f64 / 40.0);
                let k = 1.0 / (q * a);
                self.set_a(g, k);
                (self.m0, self.m1, self.m2) = (1.0, k * (a * a - 1.0), 0.0);
            }
            SvfShape::LowShelf => {
                let a = f64::powf(10.0, gain_db as f64 / 40.0);
                let g = g / f64::sqrt(a);
                let k = 1.0 / q;
                self.set_a(g, k);
                (self.m0, self.m1, self.m2) = (1.0, k * (a - 1.0), a * a - 1.0);
            }
            SvfShape::HighShelf => {
                let a = f64::powf(10.0, gain_db as f64 / 40.0);
                let g = g * f64::sqrt(a);
                let k = 1.0 / q;
                self.set_a(g, k);
                (self.m0, self.m1, self.m2) = (a * a, k * (1.0 - a) * a, 1.0 - a * a);
            }
        }
    }

    fn set_a(&mut self, g: f64, k: f64) {
        self.a1 = 1.0 / (1.0 + g * (g + k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;
    }
}

/// One SVF section: the two integrator states.
#[derive(Debug, Default, Clone)]
pub struct SvfSection {
    ic1eq: f64,
    ic2eq: f64,
}

impl SvfSection {
    /// Apply the filter on a single sample.
    #[inline]
    pub fn process_sample(&mut self, c: &SvfCoefficients, input: f64) -> f64 {
        let v0 = input;
        let v3 = v0 - self.ic2eq;
        let v1 = c.a1 * self.ic1eq + c.a2 * v3;
        let v2 = self.ic2eq + c.a2 * self.ic1eq + c.a3 * v3;
        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;
        c.m0 * v0 + c.m1 * v1 + c.m2 * v2
    }

    /// Clear filter state, e.g. when a voice restarts.
    #[inline]
    pub fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }
}

// -------------------------------------------------------------------------------------------------

/// Filter modes of the per-voice filter: four responses at two slopes each.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Display, EnumIter, EnumString)]
pub enum FilterMode {
    #[default]
    Lowpass12,
    Lowpass24,
    Highpass12,
    Highpass24,
    Bandpass12,
    Bandpass24,
    Notch12,
    Notch24,
}

impl FilterMode {
    fn shape(&self) -> SvfShape {
        match self {
            Self::Lowpass12 | Self::Lowpass24 => SvfShape::Lowpass,
            Self::Highpass12 | Self::Highpass24 => SvfShape::Highpass,
            Self::Bandpass12 | Self::Bandpass24 => SvfShape::Bandpass,
            Self::Notch12 | Self::Notch24 => SvfShape::Notch,
        }
    }

    fn cascaded(&self) -> bool {
        matches!(
            self,
            Self::Lowpass24 | Self::Highpass24 | Self::Bandpass24 | Self::Notch24
        )
    }
}

// -------------------------------------------------------------------------------------------------

/// Stereo per-voice filter: one or two cascaded SVF sections per channel depending on the
/// selected slope.
#[derive(Debug, Clone)]
pub struct VoiceFilter {
    mode: FilterMode,
    coefficients: SvfCoefficients,
    sections: [[SvfSection; 2]; 2], // [channel][cascade stage]
    cutoff: f32,
    q: f32,
    sample_rate: u32,
}

impl VoiceFilter {
    pub fn new(sample_rate: u32) -> Self {
        assert!(sample_rate > 0, "Invalid sample rate");
        let mut filter = Self {
            mode: FilterMode::default(),
            coefficients: SvfCoefficients::default(),
            sections: Default::default(),
            cutoff: 1000.0,
            q: FLAT_Q,
            sample_rate,
        };
        filter.apply();
        filter
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        assert!(sample_rate > 0, "Invalid sample rate");
        if self.sample_rate != sample_rate {
            self.sample_rate = sample_rate;
            self.apply();
        }
    }

    pub fn set_mode(&mut self, mode: FilterMode) {
        if self.mode != mode {
            self.mode = mode;
            self.apply();
        }
    }

    /// Set cutoff in Hz and resonance as a Q factor. Values are clamped internally.
    pub fn set_params(&mut self, cutoff: f32, q: f32) {
        if self.cutoff != cutoff || self.q != q {
            self.cutoff = cutoff;
            self.q = q;
            self.apply();
        }
    }

    /// Currently applied cutoff in Hz.
    #[inline]
    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    fn apply(&mut self) {
        self.coefficients
            .set(self.mode.shape(), self.sample_rate, self.cutoff, self.q, 0.0);
    }

    pub fn reset(&mut self) {
        for channel in &mut self.sections {
            for section in channel {
                section.reset();
            }
        }
    }

    /// Filter an interleaved stereo buffer in place.
    pub fn process(&mut self, output: &mut [f32]) {
        let cascaded = self.mode.cascaded();
        for frame in output.chunks_exact_mut(2) {
            for (channel, sample) in frame.iter_mut().enumerate() {
                let mut value = self.sections[channel][0]
                    .process_sample(&self.coefficients, *sample as f64);
                if cascaded {
                    value = self.sections[channel][1].process_sample(&self.coefficients, value);
                }
                *sample = value as f32;
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

    fn sine_buffer(frequency: f32, frames: usize) -> Vec<f32> {
        let mut buffer = vec![0.0f32; frames * 2];
        for (index, frame) in buffer.chunks_exact_mut(2).enumerate() {
            let sample = (TAU * frequency * index as f32 / SAMPLE_RATE as f32).sin();
            frame[0] = sample;
            frame[1] = sample;
        }
        buffer
    }

    fn peak_after_transient(buffer: &[f32]) -> f32 {
        buffer[buffer.len() / 2..]
            .iter()
            .fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    #[test]
    fn lowpass_attenuates_high_frequencies() {
        let mut filter = VoiceFilter::new(SAMPLE_RATE);
        filter.set_mode(FilterMode::Lowpass12);
        filter.set_params(500.0, FLAT_Q);

        let mut high = sine_buffer(8000.0, 2048);
        filter.process(&mut high);
        assert!(peak_after_transient(&high) < 0.05);

        filter.reset();
        let mut low = sine_buffer(100.0, 2048);
        filter.process(&mut low);
        assert!(peak_after_transient(&low) > 0.9);
    }

    #[test]
    fn cascaded_slope_attenuates_harder() {
        let attenuation = |mode: FilterMode| {
            let mut filter = VoiceFilter::new(SAMPLE_RATE);
            filter.set_mode(mode);
            filter.set_params(500.0, FLAT_Q);
            let mut buffer = sine_buffer(4000.0, 2048);
            filter.process(&mut buffer);
            peak_after_transient(&buffer)
        };
        let slope_12 = attenuation(FilterMode::Lowpass12);
        let slope_24 = attenuation(FilterMode::Lowpass24);
        assert!(
            slope_24 < slope_12 / 4.0,
            "24 dB mode should attenuate much harder: {slope_24} vs {slope_12}"
        );
    }

    #[test]
    fn highpass_and_notch_behave() {
        let mut filter = VoiceFilter::new(SAMPLE_RATE);
        filter.set_mode(FilterMode::Highpass12);
        filter.set_params(2000.0, FLAT_Q);
        let mut low = sine_buffer(100.0, 2048);
        filter.process(&mut low);
        assert!(peak_after_transient(&low) < 0.05);

        let mut filter = VoiceFilter::new(SAMPLE_RATE);
        filter.set_mode(FilterMode::Notch12);
        filter.set_params(1000.0, 2.0);
        let mut at_notch = sine_buffer(1000.0, 4096);
        filter.process(&mut at_notch);
        let mut off_notch = sine_buffer(100.0, 4096);
        let mut filter2 = VoiceFilter::new(SAMPLE_RATE);
        filter2.set_mode(FilterMode::Notch12);
        filter2.set_params(1000.0, 2.0);
        filter2.process(&mut off_notch);
        assert!(peak_after_transient(&at_notch) * 2.0 < peak_after_transient(&off_notch));
    }

    #[test]
    fn resonance_curve_is_bounded() {
        assert!((resonance_to_q(0.0) - FLAT_Q).abs() < 1e-6);
        // monotonically increasing
        let mut last = 0.0;
        for step in 0..=100 {
            let q = resonance_to_q(step as f32 / 100.0);
            assert!(q > last);
            last = q;
        }
        // finite at the top of the range
        assert!(resonance_to_q(1.0).is_finite());
        assert!(resonance_to_q(1.0) < 100.0);
    }

    #[test]
    fn extreme_cutoffs_are_clamped() {
        let mut filter = VoiceFilter::new(SAMPLE_RATE);
        filter.set_params(-100.0, FLAT_Q);
        let mut buffer = sine_buffer(440.0, 512);
        filter.process(&mut buffer);
        assert!(buffer.iter().all(|s| s.is_finite()));

        filter.set_params(1.0e9, FLAT_Q);
        let mut buffer = sine_buffer(440.0, 512);
        filter.process(&mut buffer);
        assert!(buffer.iter().all(|s| s.is_finite()));
    }
}
