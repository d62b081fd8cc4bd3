//! Pattern gate: a tempo-synced step sequence that opens and closes the two channels
//! independently, with attack/release smoothed transitions.

use crate::{
    effect::Effect,
    utils::tempo::Transport,
};

// -------------------------------------------------------------------------------------------------

/// Number of gate pattern steps.
pub const NUM_GATE_STEPS: usize = 16;

// -------------------------------------------------------------------------------------------------

/// Tempo-synced stereo pattern gate.
pub struct GateEffect {
    steps_left: [bool; NUM_GATE_STEPS],
    steps_right: [bool; NUM_GATE_STEPS],
    length: usize,
    /// Steps per second, resolved from the beat setting by the engine.
    step_rate: f32,
    attack_coeff: f32,
    release_coeff: f32,
    attack_seconds: f32,
    release_seconds: f32,
    /// Pattern position in steps.
    position: f32,
    envelope: [f32; 2],
    sample_rate: u32,
}

impl GateEffect {
    pub fn new() -> Self {
        Self {
            steps_left: [true; NUM_GATE_STEPS],
            steps_right: [true; NUM_GATE_STEPS],
            length: 8,
            step_rate: 4.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            attack_seconds: 0.1,
            release_seconds: 0.1,
            position: 0.0,
            envelope: [1.0; 2],
            sample_rate: 0,
        }
    }

    /// Set the on/off state of one pattern step for both channels.
    pub fn set_step(&mut self, index: usize, left: bool, right: bool) {
        if index < NUM_GATE_STEPS {
            self.steps_left[index] = left;
            self.steps_right[index] = right;
        }
    }

    /// Set the number of active pattern steps, 2..=NUM_GATE_STEPS.
    pub fn set_length(&mut self, length: usize) {
        self.length = length.clamp(2, NUM_GATE_STEPS);
    }

    /// Set the step rate in steps per second.
    pub fn set_step_rate(&mut self, steps_per_second: f32) {
        self.step_rate = steps_per_second.max(0.0);
    }

    /// Set the opening transition time in seconds.
    pub fn set_attack(&mut self, seconds: f32) {
        self.attack_seconds = seconds.max(0.0);
        self.attack_coeff = transition_coefficient(self.attack_seconds, self.sample_rate);
    }

    /// Set the closing transition time in seconds.
    pub fn set_release(&mut self, seconds: f32) {
        self.release_seconds = seconds.max(0.0);
        self.release_coeff = transition_coefficient(self.release_seconds, self.sample_rate);
    }
}

#[inline]
fn transition_coefficient(seconds: f32, sample_rate: u32) -> f32 {
    if sample_rate == 0 || seconds <= 0.0 {
        0.0
    } else {
        (-1.0 / (seconds * sample_rate as f32)).exp()
    }
}

impl Default for GateEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for GateEffect {
    fn name(&self) -> &'static str {
        "GateEffect"
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_frames: usize) {
        self.sample_rate = sample_rate;
        self.set_attack(self.attack_seconds);
        self.set_release(self.release_seconds);
    }

    fn process(&mut self, output: &mut [f32], _transport: &Transport) {
        debug_assert!(self.sample_rate > 0, "Gate not prepared");
        let step_incr = self.step_rate / self.sample_rate as f32;
        let length = self.length as f32;

        for frame in output.chunks_exact_mut(2) {
            let step = (self.position as usize).min(self.length - 1);
            let targets = [
                if self.steps_left[step] { 1.0 } else { 0.0 },
                if self.steps_right[step] { 1.0 } else { 0.0 },
            ];
            for channel in 0..2 {
                let target: f32 = targets[channel];
                let coeff = if target > self.envelope[channel] {
                    self.attack_coeff
                } else {
                    self.release_coeff
                };
                self.envelope[channel] = target + (self.envelope[channel] - target) * coeff;
                frame[channel] *= self.envelope[channel];
            }

            self.position += step_incr;
            while self.position >= length {
                self.position -= length;
            }
        }
    }

    fn reset(&mut self) {
        self.position = 0.0;
        self.envelope = [1.0; 2];
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 1000;

    #[test]
    fn gates_off_steps_and_passes_on_steps() {
        let mut gate = GateEffect::new();
        gate.prepare(SAMPLE_RATE, 64);
        gate.set_length(4);
        // pattern: on, off, on, off
        gate.set_step(0, true, true);
        gate.set_step(1, false, false);
        gate.set_step(2, true, true);
        gate.set_step(3, false, false);
        gate.set_step_rate(1.0); // one step per second
        gate.set_attack(0.01);
        gate.set_release(0.01);
        gate.reset();

        let transport = Transport::default();
        // 4 seconds of constant full scale input, processed in blocks
        let mut output = Vec::new();
        for _ in 0..40 {
            let mut block = vec![1.0f32; 100 * 2];
            gate.process(&mut block, &transport);
            output.extend(block);
        }

        // sample the middle of each step, well clear of the transition windows
        let sample_at = |seconds: f32| output[(seconds * SAMPLE_RATE as f32) as usize * 2];
        assert!(sample_at(0.5) > 0.95, "on step should pass");
        assert!(sample_at(1.5) < 0.05, "off step should gate");
        assert!(sample_at(2.5) > 0.95, "on step should pass");
        assert!(sample_at(3.5) < 0.05, "off step should gate");
    }

    #[test]
    fn channels_gate_independently() {
        let mut gate = GateEffect::new();
        gate.prepare(SAMPLE_RATE, 64);
        gate.set_length(2);
        gate.set_step(0, true, false);
        gate.set_step(1, true, false);
        gate.set_step_rate(1.0);
        gate.set_attack(0.001);
        gate.set_release(0.001);
        gate.reset();

        let transport = Transport::default();
        let mut block = vec![1.0f32; 200 * 2];
        gate.process(&mut block, &transport);

        let frame = &block[300..302];
        assert!(frame[0] > 0.95);
        assert!(frame[1] < 0.05);
    }

    #[test]
    fn transitions_are_smoothed() {
        let mut gate = GateEffect::new();
        gate.prepare(SAMPLE_RATE, 64);
        gate.set_length(2);
        gate.set_step(0, true, true);
        gate.set_step(1, false, false);
        gate.set_step_rate(2.0);
        gate.set_attack(0.05);
        gate.set_release(0.05);
        gate.reset();

        let transport = Transport::default();
        let mut block = vec![1.0f32; 1000 * 2];
        gate.process(&mut block, &transport);

        // no sample-to-sample jumps bigger than the smoothing allows
        for pair in block.chunks_exact(2).collect::<Vec<_>>().windows(2) {
            let jump = (pair[1][0] - pair[0][0]).abs();
            assert!(jump < 0.1, "gate transition clicked: {jump}");
        }
    }
}
