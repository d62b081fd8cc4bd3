//! Modulation routing: sources, destinations and their connections.
//!
//! Sources and destination parameters are registered once at engine construction and are
//! immutable for the process lifetime - only their values and connections change. The
//! [`matrix::ModMatrix`] resolves, smooths and applies combined modulation per block.

use four_cc::FourCC;

// -------------------------------------------------------------------------------------------------

pub(crate) mod matrix;

// -------------------------------------------------------------------------------------------------

/// Identifies a registered modulation source. Stable for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModSourceId(pub(crate) u16);

/// Identifies a registered modulation destination parameter. Stable for the process
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(pub(crate) u16);

// -------------------------------------------------------------------------------------------------

/// Shaping curve applied to a source value before depth weighting. Curves act on the
/// magnitude of the source value, preserving its sign for bipolar sources.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ModCurve {
    #[default]
    Linear,
    /// Square law: emphasizes the low end of the source range.
    Exponential,
    /// Smoothstep: eases both ends of the source range.
    SCurve,
}

impl ModCurve {
    #[inline]
    pub(crate) fn shape(&self, raw: f32, bipolar: bool) -> f32 {
        let (magnitude, sign) = if bipolar {
            (raw.abs().min(1.0), raw.signum())
        } else {
            (raw.clamp(0.0, 1.0), 1.0)
        };
        let shaped = match self {
            Self::Linear => magnitude,
            Self::Exponential => magnitude * magnitude,
            Self::SCurve => magnitude * magnitude * (3.0 - 2.0 * magnitude),
        };
        shaped * sign
    }
}

// -------------------------------------------------------------------------------------------------

/// A single modulation routing: source, depth and curve. Destinations keep a list of these
/// (many-to-one fan-in).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModConnection {
    pub source: ModSourceId,
    /// Modulation depth, -1..=1, in the destination's normalized value space.
    pub depth: f32,
    pub curve: ModCurve,
}

impl ModConnection {
    pub fn new(source: ModSourceId, depth: f32) -> Self {
        Self {
            source,
            depth,
            curve: ModCurve::Linear,
        }
    }

    pub fn with_curve(mut self, curve: ModCurve) -> Self {
        self.curve = curve;
        self
    }
}

// -------------------------------------------------------------------------------------------------

/// Static description of a registered modulation source.
#[derive(Debug, Clone)]
pub struct ModSourceInfo {
    pub(crate) id: FourCC,
    pub(crate) name: String,
    /// Bipolar sources output -1..=1, unipolar sources 0..=1.
    pub(crate) bipolar: bool,
    /// Poly sources hold one value per voice, mono sources a single shared value.
    pub(crate) poly: bool,
}

impl ModSourceInfo {
    #[inline]
    pub fn id(&self) -> FourCC {
        self.id
    }
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
    #[inline]
    pub fn is_bipolar(&self) -> bool {
        self.bipolar
    }
    #[inline]
    pub fn is_poly(&self) -> bool {
        self.poly
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curves_shape_magnitudes() {
        // unipolar: plain mapping of the 0..1 range
        assert_eq!(ModCurve::Linear.shape(0.5, false), 0.5);
        assert_eq!(ModCurve::Exponential.shape(0.5, false), 0.25);
        assert_eq!(ModCurve::SCurve.shape(0.5, false), 0.5);
        assert_eq!(ModCurve::SCurve.shape(0.0, false), 0.0);
        assert_eq!(ModCurve::SCurve.shape(1.0, false), 1.0);

        // bipolar: sign is preserved, magnitude is shaped
        assert_eq!(ModCurve::Exponential.shape(-0.5, true), -0.25);
        assert_eq!(ModCurve::Linear.shape(-1.0, true), -1.0);

        // out of range inputs are clamped
        assert_eq!(ModCurve::Linear.shape(2.0, false), 1.0);
        assert_eq!(ModCurve::Linear.shape(-2.0, true), -1.0);
    }
}
