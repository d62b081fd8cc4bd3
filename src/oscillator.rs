//! Wavetable oscillator playback: unison stacking, frame morphing and waveshaping.

use rand::{rngs::SmallRng, Rng, SeedableRng};
use strum::{Display, EnumIter, EnumString};

use crate::{
    utils::{midi_note_to_hertz, panning_factors},
    wavetable::WavetableSet,
};

// -------------------------------------------------------------------------------------------------

/// Max unison voices per oscillator unit.
pub const MAX_UNISON: usize = 8;

// -------------------------------------------------------------------------------------------------

/// Per-block playback parameters of a [`WavetableOscillator`], resolved from the modulation
/// matrix by the owning voice before rendering.
#[derive(Debug, Clone, Copy)]
pub struct WavetableOscParams {
    /// Number of unison voices, 1..=MAX_UNISON.
    pub unison: usize,
    /// Linear output gain.
    pub gain: f32,
    /// Frame morph position, 0..=1.
    pub position: f32,
    /// Unison detune spread in +/- semitones.
    pub detune: f32,
    /// Unison stereo spread, -1..=1.
    pub spread: f32,
    /// Stereo panning, -1..=1.
    pub pan: f32,
    /// Formant shift, -1..=1. Positive values stretch the spectrum up by reading the
    /// cycle faster and padding with silence.
    pub formant: f32,
    /// Phase bend, -1..=1. Warps the read phase with a power curve.
    pub bend: f32,
}

impl Default for WavetableOscParams {
    fn default() -> Self {
        Self {
            unison: 1,
            gain: 1.0,
            position: 0.0,
            detune: 0.0,
            spread: 0.0,
            pan: 0.0,
            formant: 0.0,
            bend: 0.0,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A single wavetable oscillator unit with up to [`MAX_UNISON`] stacked unison voices.
///
/// The oscillator holds only phase state; the table set it reads from is passed into
/// `process_adding`, so table sets can be swapped without touching voices.
#[derive(Debug, Clone)]
pub struct WavetableOscillator {
    phases: [f32; MAX_UNISON],
    sample_rate: u32,
}

impl WavetableOscillator {
    pub fn new(sample_rate: u32) -> Self {
        assert!(sample_rate > 0, "Invalid sample rate");
        Self {
            phases: [0.0; MAX_UNISON],
            sample_rate,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        assert!(sample_rate > 0, "Invalid sample rate");
        self.sample_rate = sample_rate;
    }

    /// Set all unison start phases for a new note. With the retrigger policy the caller
    /// passes the deterministic `i/N` distribution, else uniformly random phases.
    pub fn note_on(&mut self, phases: &[f32; MAX_UNISON]) {
        for (phase, new_phase) in self.phases.iter_mut().zip(phases) {
            *phase = new_phase.rem_euclid(1.0);
        }
    }

    /// Deterministic unison phase distribution for retriggered notes: voice `i` of `n`
    /// starts at phase `i/n`.
    pub fn spread_phases(unison: usize) -> [f32; MAX_UNISON] {
        let unison = unison.clamp(1, MAX_UNISON);
        let mut phases = [0.0; MAX_UNISON];
        for (index, phase) in phases.iter_mut().enumerate().take(unison) {
            *phase = index as f32 / unison as f32;
        }
        phases
    }

    /// Uniformly random unison phases, avoiding the comb filtering of identical phases on
    /// every note while keeping note-to-note tonal consistency.
    pub fn random_phases(rng: &mut SmallRng) -> [f32; MAX_UNISON] {
        let mut phases = [0.0; MAX_UNISON];
        for phase in phases.iter_mut() {
            *phase = rng.random::<f32>();
        }
        phases
    }

    /// Render and add one block into the interleaved stereo `output` at the given
    /// fractional MIDI note pitch.
    pub fn process_adding(
        &mut self,
        midi_note: f32,
        params: &WavetableOscParams,
        table: &WavetableSet,
        output: &mut [f32],
    ) {
        let unison = params.unison.clamp(1, MAX_UNISON);
        // constant power over the unison stack
        let unison_gain = params.gain / (unison as f32).sqrt();

        let shaped = params.bend.abs() > 1e-3 || params.formant.abs() > 1e-3;
        let bend_exponent = (params.bend * 2.0).exp2();
        let formant_factor = (params.formant * 2.0).exp2();

        let nyquist = self.sample_rate as f32 / 2.0;

        for voice in 0..unison {
            let offset = unison_offset(voice, unison);
            let frequency = midi_note_to_hertz(midi_note + params.detune * offset);
            if frequency >= nyquist {
                continue;
            }
            let phase_incr = frequency / self.sample_rate as f32;
            let band = table.band_for_frequency(frequency);

            let pan = (params.pan + params.spread * offset).clamp(-1.0, 1.0);
            let (pan_l, pan_r) = panning_factors(pan);
            let gain_l = pan_l * unison_gain;
            let gain_r = pan_r * unison_gain;

            let mut phase = self.phases[voice];
            for frame in output.chunks_exact_mut(2) {
                let sample = if shaped {
                    let warped = phase.powf(bend_exponent);
                    let read_phase = warped * formant_factor;
                    if read_phase >= 1.0 {
                        0.0
                    } else {
                        band.lookup(read_phase, params.position)
                    }
                } else {
                    band.lookup(phase, params.position)
                };

                frame[0] += sample * gain_l;
                frame[1] += sample * gain_r;

                phase += phase_incr;
                if phase >= 1.0 {
                    phase -= 1.0;
                }
            }
            self.phases[voice] = phase;
        }
    }
}

#[inline]
fn unison_offset(voice: usize, unison: usize) -> f32 {
    if unison <= 1 {
        0.0
    } else {
        2.0 * voice as f32 / (unison - 1) as f32 - 1.0
    }
}

// -------------------------------------------------------------------------------------------------

/// Waveforms of the analog-style sub oscillator. Each shape is rendered through the same
/// band-limited table path as the wavetables, so the sub stays alias free too.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Display, EnumIter, EnumString)]
pub enum AnalogWave {
    #[default]
    Sine,
    Triangle,
    Saw,
    Pulse50,
    Pulse25,
    Pulse12,
}

impl AnalogWave {
    /// Evaluate the naive (non band-limited) waveform at phase 0..1. Used as table build
    /// input only, never on the render path.
    pub fn evaluate(&self, phase: f32) -> f32 {
        match self {
            Self::Sine => (std::f32::consts::TAU * phase).sin(),
            Self::Triangle => {
                if phase < 0.5 {
                    4.0 * phase - 1.0
                } else {
                    3.0 - 4.0 * phase
                }
            }
            Self::Saw => 2.0 * phase - 1.0,
            Self::Pulse50 => pulse(phase, 0.5),
            Self::Pulse25 => pulse(phase, 0.25),
            Self::Pulse12 => pulse(phase, 0.125),
        }
    }
}

#[inline]
fn pulse(phase: f32, width: f32) -> f32 {
    if phase < width {
        1.0
    } else {
        -1.0
    }
}

// -------------------------------------------------------------------------------------------------

/// Noise colors of the per-voice noise generator.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Display, EnumIter, EnumString)]
pub enum NoiseType {
    #[default]
    White,
    Pink,
}

/// White/pink noise source. Pink noise uses Paul Kellet's economy filter.
#[derive(Debug, Clone)]
pub struct NoiseGenerator {
    rng: SmallRng,
    pink: [f32; 3],
}

impl NoiseGenerator {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_os_rng(),
            pink: [0.0; 3],
        }
    }

    pub fn note_on(&mut self) {
        self.pink = [0.0; 3];
    }

    /// Render and add one block of noise into the interleaved stereo `output`.
    pub fn process_adding(
        &mut self,
        noise_type: NoiseType,
        gain_left: f32,
        gain_right: f32,
        output: &mut [f32],
    ) {
        for frame in output.chunks_exact_mut(2) {
            let white = self.rng.random::<f32>() * 2.0 - 1.0;
            let sample = match noise_type {
                NoiseType::White => white,
                NoiseType::Pink => {
                    let [b0, b1, b2] = self.pink;
                    let b0 = 0.99765 * b0 + white * 0.099_046;
                    let b1 = 0.963 * b1 + white * 0.296_516_4;
                    let b2 = 0.57 * b2 + white * 1.052_691_3;
                    self.pink = [b0, b1, b2];
                    (b0 + b1 + b2 + white * 0.1848) * 0.2
                }
            };
            frame[0] += sample * gain_left;
            frame[1] += sample * gain_right;
        }
    }
}

impl Default for NoiseGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::f32::consts::TAU;

    use rustfft::{num_complex::Complex, FftPlanner};

    use super::*;

    const SAMPLE_RATE: u32 = 48000;

    fn sine_set() -> WavetableSet {
        WavetableSet::from_waveform(|p| (TAU * p).sin(), 2048, SAMPLE_RATE).unwrap()
    }

    fn saw_set() -> WavetableSet {
        WavetableSet::from_waveform(|p| 2.0 * p - 1.0, 2048, SAMPLE_RATE).unwrap()
    }

    #[test]
    fn renders_pitched_sine() {
        let set = sine_set();
        let mut osc = WavetableOscillator::new(SAMPLE_RATE);
        osc.note_on(&[0.0; MAX_UNISON]);

        let params = WavetableOscParams::default();
        let mut output = vec![0.0f32; 512 * 2];
        osc.process_adding(69.0, &params, &set, &mut output);

        // center panned equal power: both channels at 1/sqrt(2)
        let expected_gain = panning_factors(0.0).0;
        for (index, frame) in output.chunks_exact(2).enumerate().take(256) {
            let expected = (TAU * 440.0 * index as f32 / SAMPLE_RATE as f32).sin() * expected_gain;
            assert!(
                (frame[0] - expected).abs() < 1e-2,
                "frame {index}: expected {expected}, got {}",
                frame[0]
            );
            assert!((frame[0] - frame[1]).abs() < 1e-6);
        }
    }

    #[test]
    fn unison_phases_are_deterministic_on_retrigger() {
        let phases = WavetableOscillator::spread_phases(4);
        assert_eq!(&phases[..4], &[0.0, 0.25, 0.5, 0.75]);

        let set = sine_set();
        let params = WavetableOscParams {
            unison: 4,
            detune: 0.1,
            spread: 0.5,
            ..WavetableOscParams::default()
        };

        let render = || {
            let mut osc = WavetableOscillator::new(SAMPLE_RATE);
            osc.note_on(&phases);
            let mut output = vec![0.0f32; 256];
            osc.process_adding(60.0, &params, &set, &mut output);
            output
        };
        assert_eq!(render(), render());
    }

    #[test]
    fn full_pitch_range_stays_below_nyquist() {
        // structural half of the aliasing-free property: for every playable note the
        // selected band keeps all harmonics below Nyquist
        let set = saw_set();
        let nyquist = SAMPLE_RATE as f32 / 2.0;
        for note in 0..=131 {
            let frequency = midi_note_to_hertz(note as f32);
            let band = set.band_for_frequency(frequency);
            let max_harmonics = (nyquist / band.top_frequency()).floor();
            assert!(
                frequency * max_harmonics <= nyquist + 1.0,
                "note {note} may alias"
            );
        }
    }

    #[test]
    fn rendered_spectrum_is_alias_free() {
        // spectral half: render a bin-aligned high fundamental from an all-harmonics
        // source and verify all signal energy sits on harmonic bins
        let set = saw_set();
        let window = 4096usize;
        let fundamental_bin = 256usize;
        let frequency = SAMPLE_RATE as f32 * fundamental_bin as f32 / window as f32;
        let note = crate::utils::hertz_to_midi_note(frequency);

        let mut osc = WavetableOscillator::new(SAMPLE_RATE);
        osc.note_on(&[0.0; MAX_UNISON]);
        let params = WavetableOscParams::default();
        let mut output = vec![0.0f32; window * 2];
        osc.process_adding(note, &params, &set, &mut output);

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window);
        let mut spectrum: Vec<Complex<f32>> = output
            .chunks_exact(2)
            .map(|frame| Complex::new(frame[0], 0.0))
            .collect();
        fft.process(&mut spectrum);

        let mut harmonic_energy = 0.0f64;
        let mut total_energy = 0.0f64;
        for (bin, value) in spectrum.iter().enumerate().take(window / 2).skip(1) {
            let energy = (value.norm_sqr()) as f64;
            total_energy += energy;
            // allow a little leakage around each harmonic bin
            if bin % fundamental_bin <= 1 || bin % fundamental_bin >= fundamental_bin - 1 {
                harmonic_energy += energy;
            }
        }
        assert!(total_energy > 0.0);
        let alias_ratio = 1.0 - harmonic_energy / total_energy;
        assert!(
            alias_ratio < 0.01,
            "non-harmonic (aliased) energy ratio too high: {alias_ratio}"
        );
    }

    #[test]
    fn noise_stays_in_range_and_stereo() {
        let mut noise = NoiseGenerator::new();
        let mut output = vec![0.0f32; 2048];
        noise.process_adding(NoiseType::White, 0.5, 0.5, &mut output);
        assert!(output.iter().any(|s| s.abs() > 0.01));
        assert!(output.iter().all(|s| s.abs() <= 0.5));

        let mut output = vec![0.0f32; 8192];
        noise.note_on();
        noise.process_adding(NoiseType::Pink, 1.0, 1.0, &mut output);
        assert!(output.iter().any(|s| s.abs() > 0.01));
        assert!(output.iter().all(|s| s.abs() <= 1.5));
    }
}
