//! Band-limited wavetable sets.
//!
//! A [`WavetableSet`] is built from a raw single- or multi-frame cycle buffer and holds one
//! band-limited copy of every frame per pitch band. Bands are spaced one octave apart: band
//! `b` keeps only the harmonics that stay below Nyquist for the highest fundamental of that
//! band, so oscillator playback stays alias free across the full MIDI pitch range as long as
//! the right band is selected for the played fundamental.
//!
//! Building runs on a control thread and allocates freely; rendering only reads.

use rustfft::{num_complex::Complex, FftPlanner};

use crate::{
    error::Error,
    utils::midi_note_to_hertz,
};

// -------------------------------------------------------------------------------------------------

/// Number of octave-wide pitch bands per table set, covering MIDI notes 0..=131.
const NUM_BANDS: usize = 11;

/// Upper limit for frames (morph positions) in a single table set.
const MAX_FRAMES: usize = 256;

// -------------------------------------------------------------------------------------------------

/// One pitch band of a [`WavetableSet`]: every source frame, band-limited for this band.
#[derive(Debug, Clone)]
pub(crate) struct WavetableBand {
    /// Highest fundamental frequency this band may be played at without aliasing.
    top_frequency: f32,
    /// One table per frame, each `frame_size + 1` samples long. The extra guard sample
    /// repeats the first sample so phase interpolation never needs to wrap.
    frames: Vec<Box<[f32]>>,
}

impl WavetableBand {
    #[inline]
    pub fn top_frequency(&self) -> f32 {
        self.top_frequency
    }

    /// Read a single sample with fractional phase (0..1) and fractional frame morph
    /// position (0..1), bilinearly interpolated.
    #[inline]
    pub fn lookup(&self, phase: f32, frame_position: f32) -> f32 {
        let frame_size = self.frames[0].len() - 1;

        let index = phase * frame_size as f32;
        let index_floor = (index as usize).min(frame_size - 1);
        let index_frac = index - index_floor as f32;

        let sample_at = |frame: &[f32]| -> f32 {
            let a = frame[index_floor];
            let b = frame[index_floor + 1];
            a + (b - a) * index_frac
        };

        if self.frames.len() == 1 {
            return sample_at(&self.frames[0]);
        }

        let frame_pos = frame_position.clamp(0.0, 1.0) * (self.frames.len() - 1) as f32;
        let frame_floor = (frame_pos as usize).min(self.frames.len() - 2);
        let frame_frac = frame_pos - frame_floor as f32;

        let a = sample_at(&self.frames[frame_floor]);
        let b = sample_at(&self.frames[frame_floor + 1]);
        a + (b - a) * frame_frac
    }
}

// -------------------------------------------------------------------------------------------------

/// An ordered set of band-limited lookup tables built from raw single-cycle waveform frames.
#[derive(Debug, Clone)]
pub struct WavetableSet {
    frame_size: usize,
    frame_count: usize,
    bands: Vec<WavetableBand>,
}

impl WavetableSet {
    /// Build a new band-limited table set.
    ///
    /// `raw` holds one or more single-cycle frames of `frame_size` samples each. A trailing
    /// partial frame is ignored. Fails when the frame size is unusable or no complete frame
    /// is present - the caller is expected to keep its previous set in that case.
    pub fn build(raw: &[f32], frame_size: usize, sample_rate: u32) -> Result<Self, Error> {
        assert!(sample_rate > 0, "Invalid sample rate");
        if frame_size < 4 || !frame_size.is_power_of_two() {
            return Err(Error::WavetableError(format!(
                "unusable cycle length {frame_size}: must be a power of two >= 4"
            )));
        }
        let frame_count = raw.len() / frame_size;
        if frame_count == 0 {
            return Err(Error::WavetableError(format!(
                "source holds {len} samples: too short for a single {frame_size} sample cycle",
                len = raw.len()
            )));
        }
        let frame_count = frame_count.min(MAX_FRAMES);

        // One forward FFT per source frame, reused for every band.
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(frame_size);
        let inverse = planner.plan_fft_inverse(frame_size);

        let mut spectra = Vec::with_capacity(frame_count);
        for frame in raw.chunks_exact(frame_size).take(frame_count) {
            let mut spectrum: Vec<Complex<f32>> =
                frame.iter().map(|s| Complex::new(*s, 0.0)).collect();
            forward.process(&mut spectrum);
            spectra.push(spectrum);
        }

        let nyquist = sample_rate as f32 / 2.0;
        let mut scratch = vec![Complex::new(0.0f32, 0.0); frame_size];

        let mut bands = Vec::with_capacity(NUM_BANDS);
        for band_index in 0..NUM_BANDS {
            let top_note = 12.0 * (band_index + 1) as f32;
            let top_frequency = midi_note_to_hertz(top_note);
            let max_harmonics =
                ((nyquist / top_frequency) as usize).clamp(1, frame_size / 2 - 1);

            let mut frames = Vec::with_capacity(frame_count);
            for spectrum in &spectra {
                scratch.copy_from_slice(spectrum);
                // drop DC, Nyquist and everything above the band's harmonic limit
                scratch[0] = Complex::new(0.0, 0.0);
                for bin in (max_harmonics + 1)..=(frame_size - max_harmonics - 1) {
                    scratch[bin] = Complex::new(0.0, 0.0);
                }
                inverse.process(&mut scratch);

                let scale = 1.0 / frame_size as f32;
                let mut table = vec![0.0f32; frame_size + 1];
                for (out, bin) in table.iter_mut().zip(&scratch) {
                    *out = bin.re * scale;
                }
                table[frame_size] = table[0]; // guard sample
                frames.push(table.into_boxed_slice());
            }

            bands.push(WavetableBand {
                top_frequency,
                frames,
            });
        }

        Ok(Self {
            frame_size,
            frame_count,
            bands,
        })
    }

    /// Build a single-frame table set from a waveform function evaluated over one cycle.
    /// Used for the analog sub oscillator shapes and as the factory default table.
    pub fn from_waveform<F>(waveform: F, frame_size: usize, sample_rate: u32) -> Result<Self, Error>
    where
        F: Fn(f32) -> f32,
    {
        let mut cycle = vec![0.0f32; frame_size];
        for (index, sample) in cycle.iter_mut().enumerate() {
            *sample = waveform(index as f32 / frame_size as f32);
        }
        Self::build(&cycle, frame_size, sample_rate)
    }

    /// Samples per single cycle frame.
    #[inline]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Number of morphable frames.
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Select the band for the given fundamental frequency: the lowest band whose kept
    /// harmonics stay below Nyquist at this fundamental.
    #[inline]
    pub(crate) fn band_for_frequency(&self, frequency: f32) -> &WavetableBand {
        for band in &self.bands {
            if frequency <= band.top_frequency {
                return band;
            }
        }
        self.bands.last().unwrap_or_else(|| unreachable!())
    }
}

// -------------------------------------------------------------------------------------------------
