//! Smooth transitions between a current and a target value.
//!
//! Smoothing is applied to avoid clicks on volume or other DSP parameter changes.

use std::fmt::Debug;

// -------------------------------------------------------------------------------------------------

/// Provides smooth transitions between a current and target f32 value.
pub trait SmoothedValue: Debug {
    /// Access to the current, possibly ramped value.
    #[must_use]
    fn current(&self) -> f32;
    /// Access to the target value.
    #[must_use]
    fn target(&self) -> f32;

    /// Ramp, if needed, and get the current ramped value, else return the target value.
    #[must_use]
    fn next(&mut self) -> f32 {
        if self.need_ramp() {
            self.ramp();
            self.current()
        } else {
            self.target()
        }
    }

    /// Test if ramping is necessary. When ramping is not necessary, parameter changes
    /// may be applied in blocks without calling `next` or `ramp`, which usually is faster.
    #[must_use]
    fn need_ramp(&self) -> bool;
    /// Move current towards the target value, when ramping is necessary, else do nothing.
    fn ramp(&mut self);

    /// Set current and target to the same value.
    fn init(&mut self, value: f32);
    /// Set a new target value and ramp current, when current is different from the target.
    fn set_target(&mut self, target: f32);

    /// Update sample rate of the smoothed value. Smoothed values are expected to be ramped
    /// once per audio frame and the ramping scales with the sample rate.
    fn set_sample_rate(&mut self, sample_rate: u32);
}

// -------------------------------------------------------------------------------------------------

/// Exponentially smoothed value, using an inertial one-pole approach.
///
/// The value changes gradually towards the target based on the configurable inertia factor.
/// This should be the default smoothed value for volume alike parameters.
#[derive(Debug, Clone)]
pub struct ExponentialSmoothedValue {
    current: f32,
    target: f32,
    inertia: f32,
    sample_rate_comp: f32,
}

impl ExponentialSmoothedValue {
    pub const DEFAULT_INERTIA: f32 = 0.02;

    pub const fn new(value: f32, sample_rate: u32) -> Self {
        Self::with_inertia(value, Self::DEFAULT_INERTIA, sample_rate)
    }

    pub const fn with_inertia(value: f32, inertia: f32, sample_rate: u32) -> Self {
        assert!(inertia > 0.0 && inertia <= 1.0, "Invalid inertia");
        assert!(sample_rate > 0, "Invalid sample rate");

        let sample_rate_comp = 44100.0 / sample_rate as f32;
        ExponentialSmoothedValue {
            current: value,
            target: value,
            inertia,
            sample_rate_comp,
        }
    }

    #[inline(always)]
    pub fn inertia(&self) -> f32 {
        self.inertia
    }
}

impl SmoothedValue for ExponentialSmoothedValue {
    #[inline(always)]
    fn current(&self) -> f32 {
        self.current
    }

    #[inline(always)]
    fn target(&self) -> f32 {
        self.target
    }

    fn need_ramp(&self) -> bool {
        const EPSILON: f32 = f32::EPSILON * 100.0;
        let inertia_add = (self.target - self.current) * self.inertia * self.sample_rate_comp;
        inertia_add.abs() > EPSILON
    }

    fn ramp(&mut self) {
        self.current += (self.target - self.current) * self.inertia * self.sample_rate_comp;
    }

    fn init(&mut self, value: f32) {
        self.current = value;
        self.target = value;
    }

    fn set_target(&mut self, target: f32) {
        self.target = target;
        if !self.need_ramp() {
            self.current = self.target;
        }
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate_comp = 44100.0 / sample_rate as f32;
    }
}

// -------------------------------------------------------------------------------------------------

/// Linearly smoothed value, ramping towards the target over a fixed time.
///
/// Unlike [`ExponentialSmoothedValue`] the target is reached exactly, after the configured
/// ramp duration, which makes this the right smoother for pitch glides and delay times.
#[derive(Debug, Clone)]
pub struct LinearSmoothedValue {
    current: f32,
    target: f32,
    ramp_seconds: f32,
    step: f32,
    pending_steps: u32,
    sample_rate: u32,
}

impl LinearSmoothedValue {
    pub const DEFAULT_RAMP_SECONDS: f32 = 0.005;

    pub const fn new(value: f32, sample_rate: u32) -> Self {
        Self::with_ramp_duration(value, Self::DEFAULT_RAMP_SECONDS, sample_rate)
    }

    pub const fn with_ramp_duration(value: f32, ramp_seconds: f32, sample_rate: u32) -> Self {
        assert!(ramp_seconds >= 0.0, "Invalid ramp duration");
        assert!(sample_rate > 0, "Invalid sample rate");

        Self {
            current: value,
            target: value,
            ramp_seconds,
            step: 0.0,
            pending_steps: 0,
            sample_rate,
        }
    }

    /// Ramp duration towards new targets in seconds.
    pub fn ramp_duration(&self) -> f32 {
        self.ramp_seconds
    }
    /// Set a new ramp duration in seconds, applied with the next `set_target` call.
    pub fn set_ramp_duration(&mut self, ramp_seconds: f32) {
        assert!(ramp_seconds >= 0.0, "Invalid ramp duration");
        self.ramp_seconds = ramp_seconds;
    }

    /// Advance the ramp by multiple sample frames at once.
    pub fn ramp_multiple(&mut self, frames: u32) {
        let steps = frames.min(self.pending_steps);
        self.current += self.step * steps as f32;
        self.pending_steps -= steps;
        if self.pending_steps == 0 {
            self.current = self.target;
        }
    }
}

impl SmoothedValue for LinearSmoothedValue {
    #[inline(always)]
    fn current(&self) -> f32 {
        self.current
    }

    #[inline(always)]
    fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    fn need_ramp(&self) -> bool {
        self.pending_steps > 0
    }

    #[inline]
    fn ramp(&mut self) {
        if self.pending_steps > 0 {
            self.current += self.step;
            self.pending_steps -= 1;
            if self.pending_steps == 0 {
                self.current = self.target;
            }
        }
    }

    fn init(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.pending_steps = 0;
        self.step = 0.0;
    }

    fn set_target(&mut self, target: f32) {
        if target == self.target && self.pending_steps > 0 {
            return;
        }
        self.target = target;
        let ramp_frames = (self.ramp_seconds * self.sample_rate as f32).round() as u32;
        if ramp_frames == 0 || (target - self.current).abs() <= f32::EPSILON * 100.0 {
            self.current = target;
            self.pending_steps = 0;
            self.step = 0.0;
        } else {
            self.pending_steps = ramp_frames;
            self.step = (target - self.current) / ramp_frames as f32;
        }
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        assert!(sample_rate > 0, "Invalid sample rate");
        self.sample_rate = sample_rate;
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exp_smoothed_value() {
        let mut value = ExponentialSmoothedValue::new(0.0, 44100);
        assert_eq!(value.current(), 0.0);
        assert!(!value.need_ramp());

        value.set_target(1.0);
        assert!(value.need_ramp());
        value.ramp();
        assert!(value.current() > 0.0 && value.current() < 1.0);

        // converges onto the target
        for _ in 0..100_000 {
            let _ = value.next();
        }
        assert!((value.current() - 1.0).abs() < 1e-3);

        value.init(0.5);
        assert_eq!(value.current(), 0.5);
        assert_eq!(value.target(), 0.5);
        assert!(!value.need_ramp());
    }

    #[test]
    fn linear_smoothed_value() {
        const SAMPLE_RATE: u32 = 1000;
        let mut value = LinearSmoothedValue::with_ramp_duration(0.0, 0.1, SAMPLE_RATE);
        value.set_target(1.0);

        // reaches the target after exactly ramp_seconds * sample_rate steps
        for _ in 0..100 {
            value.ramp();
        }
        assert_eq!(value.current(), 1.0);
        assert!(!value.need_ramp());

        // block ramping matches single stepping
        value.init(0.0);
        value.set_target(1.0);
        value.ramp_multiple(50);
        assert!((value.current() - 0.5).abs() < 1e-4);
        value.ramp_multiple(1000);
        assert_eq!(value.current(), 1.0);
    }
}
