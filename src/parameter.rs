//! Modulation destination parameter descriptors.

use std::ops::RangeInclusive;

use four_cc::FourCC;

// -------------------------------------------------------------------------------------------------

/// Value scaling of a [`FloatParameter`], mapping between the normalized \[0, 1\] range and
/// the parameter's real value range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterScaling {
    /// Evenly mapped.
    Linear,
    /// Skewed mapping: normalized values are raised to `1/skew` before mapping into the
    /// range, so `skew < 1.0` gives low range values more resolution (times, frequencies)
    /// and `skew > 1.0` emphasizes the top of the range (decibel levels).
    Skewed(f32),
}

impl ParameterScaling {
    #[inline]
    fn to_range(self, normalized: f32, min: f32, max: f32) -> f32 {
        let normalized = normalized.clamp(0.0, 1.0);
        match self {
            Self::Linear => min + (max - min) * normalized,
            Self::Skewed(skew) => min + (max - min) * normalized.powf(1.0 / skew),
        }
    }

    #[inline]
    fn to_normalized(self, value: f32, min: f32, max: f32) -> f32 {
        let proportion = if max > min {
            ((value - min) / (max - min)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        match self {
            Self::Linear => proportion,
            Self::Skewed(skew) => proportion.powf(skew),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Describes a single modulation destination: a named, ranged, scaled scalar.
///
/// The descriptor is immutable after registration. The base (user) value and the resolved
/// (modulated, smoothed) value live in the modulation matrix, not here.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatParameter {
    id: FourCC,
    name: &'static str,
    unit: &'static str,
    range: RangeInclusive<f32>,
    default: f32,
    scaling: ParameterScaling,
}

impl FloatParameter {
    /// Create a new parameter with a linear value scaling.
    pub fn new(id: FourCC, name: &'static str, range: RangeInclusive<f32>, default: f32) -> Self {
        assert!(range.start() < range.end(), "Invalid parameter range");
        assert!(range.contains(&default), "Default value out of range");
        Self {
            id,
            name,
            unit: "",
            range,
            default,
            scaling: ParameterScaling::Linear,
        }
    }

    /// Set a display unit, e.g. "Hz" or "dB".
    pub fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    /// Set a non linear value scaling.
    pub fn with_scaling(mut self, scaling: ParameterScaling) -> Self {
        if let ParameterScaling::Skewed(skew) = scaling {
            assert!(skew > 0.0, "Invalid skew factor");
        }
        self.scaling = scaling;
        self
    }

    /// The unique id of the parameter.
    #[inline]
    pub fn id(&self) -> FourCC {
        self.id
    }
    /// The display name of the parameter.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
    /// The display unit of the parameter.
    #[inline]
    pub fn unit(&self) -> &'static str {
        self.unit
    }
    /// The parameter's valid value range.
    #[inline]
    pub fn range(&self) -> &RangeInclusive<f32> {
        &self.range
    }
    /// The parameter's default value.
    #[inline]
    pub fn default_value(&self) -> f32 {
        self.default
    }
    /// The parameter's value scaling.
    #[inline]
    pub fn scaling(&self) -> ParameterScaling {
        self.scaling
    }

    /// Clamp the given value into the parameter's range.
    #[inline]
    pub fn clamp_value(&self, value: f32) -> f32 {
        value.clamp(*self.range.start(), *self.range.end())
    }

    /// Map a normalized \[0, 1\] value into the parameter's range, applying scaling.
    #[inline]
    pub fn denormalize_value(&self, normalized: f32) -> f32 {
        self.scaling
            .to_range(normalized, *self.range.start(), *self.range.end())
    }

    /// Map a range value to the normalized \[0, 1\] range, applying scaling.
    #[inline]
    pub fn normalize_value(&self, value: f32) -> f32 {
        self.scaling
            .to_normalized(value, *self.range.start(), *self.range.end())
    }
}

// -------------------------------------------------------------------------------------------------
