//! Low frequency modulation sources: the multi-shape LFO and the step sequencer LFO.
//!
//! Every logical LFO exists twice in the engine: as a mono instance that free-runs across
//! notes and as a poly instance per voice whose phase follows the note-on retrigger policy.
//! Both are always computed; the modulation matrix decides which one a connection reads.

use rand::{rngs::SmallRng, Rng, SeedableRng};
use strum::{Display, EnumIter, EnumString};

// -------------------------------------------------------------------------------------------------

/// Waveshapes of an [`Lfo`]. All shapes output bipolar values in \[-1, 1\].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Display, EnumIter, EnumString)]
pub enum LfoShape {
    #[default]
    Sine,
    Triangle,
    SawUp,
    SawDown,
    Square,
    /// Square between +1 and 0 instead of +1 and -1.
    SquarePos,
    /// A new random level at the start of every cycle.
    SampleAndHold,
    /// Random levels, linearly interpolated across each cycle.
    Noise,
    StepUp3,
    StepUp4,
    StepUp8,
    StepDown3,
    StepDown4,
    StepDown8,
    Pyramid3,
    Pyramid5,
    Pyramid9,
}

// -------------------------------------------------------------------------------------------------

/// LFO parameters, applied per block by the owning voice or the engine.
#[derive(Debug, Clone, Copy)]
pub struct LfoParams {
    pub shape: LfoShape,
    /// Rate in Hz. Tempo synced rates are resolved to Hz by the caller.
    pub frequency: f32,
    /// Phase offset, -1..=1 (full cycle).
    pub phase_offset: f32,
    /// Output offset, added after depth scaling.
    pub offset: f32,
    /// Output depth, -1..=1.
    pub depth: f32,
    /// Onset delay in seconds before the LFO starts moving.
    pub delay: f32,
    /// Fade time in seconds. Positive fades the output in after the delay,
    /// negative fades it out.
    pub fade: f32,
}

impl Default for LfoParams {
    fn default() -> Self {
        Self {
            shape: LfoShape::Sine,
            frequency: 1.0,
            phase_offset: 0.0,
            offset: 0.0,
            depth: 1.0,
            delay: 0.0,
            fade: 0.0,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A single LFO instance. Evaluated once per block; `output` holds the block's value.
#[derive(Debug, Clone)]
pub struct Lfo {
    params: LfoParams,
    phase: f32,
    delay_samples_left: u32,
    fade_samples_done: u32,
    hold_level: f32,
    noise_from: f32,
    noise_to: f32,
    output: f32,
    rng: SmallRng,
    sample_rate: u32,
}

impl Lfo {
    pub fn new(sample_rate: u32) -> Self {
        assert!(sample_rate > 0, "Invalid sample rate");
        Self {
            params: LfoParams::default(),
            phase: 0.0,
            delay_samples_left: 0,
            fade_samples_done: 0,
            hold_level: 0.0,
            noise_from: 0.0,
            noise_to: 0.0,
            output: 0.0,
            rng: SmallRng::from_os_rng(),
            sample_rate,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        assert!(sample_rate > 0, "Invalid sample rate");
        self.sample_rate = sample_rate;
    }

    pub fn set_params(&mut self, params: LfoParams) {
        self.params = params;
    }

    /// Restart phase, delay and fade state for free-running use.
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.delay_samples_left = (self.params.delay * self.sample_rate as f32) as u32;
        self.fade_samples_done = 0;
        self.output = 0.0;
    }

    /// Retrigger for a new note. `start_phase` follows the oscillator phase policy:
    /// `Some(phase)` for deterministic retriggering, `None` for a random start phase.
    pub fn note_on(&mut self, start_phase: Option<f32>) {
        self.reset();
        self.phase = match start_phase {
            Some(phase) => phase.rem_euclid(1.0),
            None => self.rng.random::<f32>(),
        };
        self.roll_random_levels();
    }

    fn roll_random_levels(&mut self) {
        self.hold_level = self.rng.random::<f32>() * 2.0 - 1.0;
        self.noise_from = self.noise_to;
        self.noise_to = self.rng.random::<f32>() * 2.0 - 1.0;
    }

    /// Advance by one block of samples and update the block output value.
    pub fn process(&mut self, num_samples: usize) {
        let mut samples = num_samples as u32;

        if self.delay_samples_left > 0 {
            let waited = self.delay_samples_left.min(samples);
            self.delay_samples_left -= waited;
            samples -= waited;
        }
        if samples == 0 {
            self.output = 0.0;
            return;
        }

        let phase_incr = self.params.frequency.max(0.0) / self.sample_rate as f32;
        self.phase += phase_incr * samples as f32;
        while self.phase >= 1.0 {
            self.phase -= 1.0;
            self.roll_random_levels();
        }
        self.fade_samples_done = self.fade_samples_done.saturating_add(samples);

        let eval_phase = (self.phase + self.params.phase_offset).rem_euclid(1.0);
        let raw = self.evaluate(eval_phase);
        let value = raw * self.params.depth * self.fade_factor() + self.params.offset;
        self.output = value.clamp(-1.0, 1.0);
    }

    /// The block output value, bipolar.
    #[inline]
    pub fn output(&self) -> f32 {
        self.output
    }

    /// Current phase 0..1, exposed for visualization.
    #[inline]
    pub fn phase(&self) -> f32 {
        self.phase
    }

    fn fade_factor(&self) -> f32 {
        let fade = self.params.fade;
        if fade == 0.0 {
            return 1.0;
        }
        let fade_samples = (fade.abs() * self.sample_rate as f32).max(1.0);
        let progress = (self.fade_samples_done as f32 / fade_samples).min(1.0);
        if fade > 0.0 {
            progress
        } else {
            1.0 - progress
        }
    }

    fn evaluate(&self, phase: f32) -> f32 {
        match self.params.shape {
            LfoShape::Sine => (std::f32::consts::TAU * phase).sin(),
            LfoShape::Triangle => {
                if phase < 0.5 {
                    4.0 * phase - 1.0
                } else {
                    3.0 - 4.0 * phase
                }
            }
            LfoShape::SawUp => 2.0 * phase - 1.0,
            LfoShape::SawDown => 1.0 - 2.0 * phase,
            LfoShape::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            LfoShape::SquarePos => {
                if phase < 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            LfoShape::SampleAndHold => self.hold_level,
            LfoShape::Noise => self.noise_from + (self.noise_to - self.noise_from) * phase,
            LfoShape::StepUp3 => step_up(phase, 3),
            LfoShape::StepUp4 => step_up(phase, 4),
            LfoShape::StepUp8 => step_up(phase, 8),
            LfoShape::StepDown3 => -step_up(phase, 3),
            LfoShape::StepDown4 => -step_up(phase, 4),
            LfoShape::StepDown8 => -step_up(phase, 8),
            LfoShape::Pyramid3 => pyramid(phase, 3),
            LfoShape::Pyramid5 => pyramid(phase, 5),
            LfoShape::Pyramid9 => pyramid(phase, 9),
        }
    }
}

#[inline]
fn step_up(phase: f32, steps: u32) -> f32 {
    let step = ((phase * steps as f32) as u32).min(steps - 1);
    -1.0 + 2.0 * step as f32 / (steps - 1) as f32
}

#[inline]
fn pyramid(phase: f32, levels: u32) -> f32 {
    let period = 2 * (levels - 1);
    let step = ((phase * period as f32) as u32).min(period - 1);
    let step = if step < levels { step } else { period - step };
    -1.0 + 2.0 * step as f32 / (levels - 1) as f32
}

// -------------------------------------------------------------------------------------------------

/// Max number of steps in a [`StepLfo`] pattern.
pub const MAX_STEP_LFO_STEPS: usize = 32;

/// Step sequencer LFO: user-drawn per-step levels, stepped through at a tempo-derived
/// rate, linearly interpolating from the current to the next step.
#[derive(Debug, Clone)]
pub struct StepLfo {
    levels: [f32; MAX_STEP_LFO_STEPS],
    num_steps: usize,
    /// Steps per second.
    rate: f32,
    /// Position in steps, 0..num_steps.
    position: f32,
    output: f32,
    rng: SmallRng,
    sample_rate: u32,
}

impl StepLfo {
    pub fn new(sample_rate: u32) -> Self {
        assert!(sample_rate > 0, "Invalid sample rate");
        Self {
            levels: [0.0; MAX_STEP_LFO_STEPS],
            num_steps: 8,
            rate: 4.0,
            position: 0.0,
            output: 0.0,
            rng: SmallRng::from_os_rng(),
            sample_rate,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        assert!(sample_rate > 0, "Invalid sample rate");
        self.sample_rate = sample_rate;
    }

    /// Set the step rate in steps per second.
    pub fn set_rate(&mut self, steps_per_second: f32) {
        self.rate = steps_per_second.max(0.0);
    }

    /// Set the number of active steps, clamped to 2..=MAX_STEP_LFO_STEPS.
    pub fn set_num_steps(&mut self, num_steps: usize) {
        self.num_steps = num_steps.clamp(2, MAX_STEP_LFO_STEPS);
    }

    /// Set the level of a single step, -1..=1.
    pub fn set_step(&mut self, index: usize, level: f32) {
        if let Some(step) = self.levels.get_mut(index) {
            *step = level.clamp(-1.0, 1.0);
        }
    }

    pub fn reset(&mut self) {
        self.position = 0.0;
        self.output = 0.0;
    }

    /// Retrigger for a new note: `Some(phase)` restarts at the given pattern position
    /// (0..1), `None` picks a random position.
    pub fn note_on(&mut self, start_phase: Option<f32>) {
        let phase = match start_phase {
            Some(phase) => phase.rem_euclid(1.0),
            None => self.rng.random::<f32>(),
        };
        self.position = phase * self.num_steps as f32;
    }

    /// Advance by one block of samples and update the block output value.
    pub fn process(&mut self, num_samples: usize) {
        self.position += self.rate * num_samples as f32 / self.sample_rate as f32;
        while self.position >= self.num_steps as f32 {
            self.position -= self.num_steps as f32;
        }

        let current = (self.position as usize).min(self.num_steps - 1);
        let next = (current + 1) % self.num_steps;
        let frac = self.position - current as f32;
        self.output = self.levels[current] + (self.levels[next] - self.levels[current]) * frac;
    }

    /// The block output value, bipolar.
    #[inline]
    pub fn output(&self) -> f32 {
        self.output
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    const SAMPLE_RATE: u32 = 1000;

    #[test]
    fn all_shapes_stay_bipolar() {
        for shape in LfoShape::iter() {
            let mut lfo = Lfo::new(SAMPLE_RATE);
            lfo.set_params(LfoParams {
                shape,
                frequency: 7.3,
                ..LfoParams::default()
            });
            lfo.note_on(Some(0.0));
            for _ in 0..500 {
                lfo.process(13);
                let out = lfo.output();
                assert!((-1.0..=1.0).contains(&out), "{shape} out of range: {out}");
            }
        }
    }

    #[test]
    fn sine_lfo_tracks_its_rate() {
        let mut lfo = Lfo::new(SAMPLE_RATE);
        lfo.set_params(LfoParams {
            frequency: 1.0,
            ..LfoParams::default()
        });
        lfo.note_on(Some(0.0));

        // quarter cycle: sine peaks
        lfo.process((SAMPLE_RATE / 4) as usize);
        assert!((lfo.output() - 1.0).abs() < 0.05);
        // half cycle later: sine bottoms out
        lfo.process((SAMPLE_RATE / 2) as usize);
        assert!((lfo.output() + 1.0).abs() < 0.05);
    }

    #[test]
    fn delay_holds_output_at_zero() {
        let mut lfo = Lfo::new(SAMPLE_RATE);
        lfo.set_params(LfoParams {
            shape: LfoShape::Square,
            frequency: 2.0,
            delay: 0.1,
            ..LfoParams::default()
        });
        lfo.note_on(Some(0.0));

        lfo.process(50); // still inside the 100 sample delay
        assert_eq!(lfo.output(), 0.0);
        lfo.process(100);
        assert!(lfo.output().abs() > 0.5);
    }

    #[test]
    fn fade_in_ramps_amplitude() {
        let mut lfo = Lfo::new(SAMPLE_RATE);
        lfo.set_params(LfoParams {
            shape: LfoShape::Square, // constant +1 in the first half cycle
            frequency: 0.5,
            fade: 0.5,
            ..LfoParams::default()
        });
        lfo.note_on(Some(0.0));

        lfo.process(100);
        let early = lfo.output();
        lfo.process(300);
        let late = lfo.output();
        assert!(early > 0.0 && late > early, "fade should ramp: {early} -> {late}");
        assert!((late - 0.8).abs() < 0.05);
    }

    #[test]
    fn sample_and_hold_holds_within_cycle() {
        let mut lfo = Lfo::new(SAMPLE_RATE);
        lfo.set_params(LfoParams {
            shape: LfoShape::SampleAndHold,
            frequency: 1.0,
            ..LfoParams::default()
        });
        lfo.note_on(Some(0.0));

        lfo.process(100);
        let first = lfo.output();
        lfo.process(100); // same cycle
        assert_eq!(lfo.output(), first);
    }

    #[test]
    fn step_lfo_interpolates_between_steps() {
        let mut step_lfo = StepLfo::new(SAMPLE_RATE);
        step_lfo.set_num_steps(4);
        step_lfo.set_step(0, 0.0);
        step_lfo.set_step(1, 1.0);
        step_lfo.set_step(2, 0.0);
        step_lfo.set_step(3, -1.0);
        step_lfo.set_rate(1.0); // one step per second
        step_lfo.note_on(Some(0.0));

        // halfway into step 0: halfway between step 0 and step 1 levels
        step_lfo.process(500);
        assert!((step_lfo.output() - 0.5).abs() < 0.01);
        // halfway into step 1
        step_lfo.process(1000);
        assert!((step_lfo.output() - 0.5).abs() < 0.01);
        // halfway into step 3: interpolating back towards step 0
        step_lfo.process(2000);
        assert!((step_lfo.output() + 0.5).abs() < 0.01);
    }

    #[test]
    fn step_lfo_wraps_pattern() {
        let mut step_lfo = StepLfo::new(SAMPLE_RATE);
        step_lfo.set_num_steps(2);
        step_lfo.set_step(0, 1.0);
        step_lfo.set_step(1, -1.0);
        step_lfo.set_rate(2.0);
        step_lfo.note_on(Some(0.0));

        step_lfo.process(2000); // exactly two full patterns
        let wrapped = step_lfo.output();
        step_lfo.note_on(Some(0.0));
        step_lfo.process(1000); // one full pattern
        assert!((step_lfo.output() - wrapped).abs() < 0.01);
    }
}
