//! The modulation matrix: per-block resolution and smoothing of destination values.

use four_cc::FourCC;

use crate::{
    modulation::{ModConnection, ModSourceId, ModSourceInfo, ParamId},
    parameter::FloatParameter,
};

// -------------------------------------------------------------------------------------------------

/// Default smoothing time constant for resolved destination values. Avoids audible
/// stepping when modulation amounts change between blocks.
pub(crate) const DEFAULT_SMOOTHING_SECONDS: f32 = 0.02;

/// Longest catch-up distance for lazily advanced smoothers, in samples.
const MAX_CATCHUP_SAMPLES: u64 = 1 << 20;

// -------------------------------------------------------------------------------------------------

/// Resolved output value of one destination, smoothed over blocks.
///
/// Smoothers advance lazily: the first query within a block moves the value by one block
/// worth of smoothing, later queries in the same block are idempotent.
#[derive(Debug, Clone, Copy)]
struct SmoothedOutput {
    current: f32,
    block_stamp: u64,
}

impl SmoothedOutput {
    fn new(value: f32) -> Self {
        Self {
            current: value,
            block_stamp: 0,
        }
    }

    #[inline]
    fn advance(&mut self, target: f32, coeff: f32, block_stamp: u64, block_len: usize) -> f32 {
        if self.block_stamp != block_stamp {
            let elapsed_blocks = block_stamp.saturating_sub(self.block_stamp);
            self.block_stamp = block_stamp;

            let samples = (elapsed_blocks * block_len as u64).min(MAX_CATCHUP_SAMPLES);
            let keep = coeff.powi(samples.min(i32::MAX as u64) as i32);
            self.current = target + (self.current - target) * keep;
            if (self.current - target).abs() < 1e-6 {
                self.current = target;
            }
        }
        self.current
    }

    #[inline]
    fn snap(&mut self, target: f32, block_stamp: u64) {
        self.current = target;
        self.block_stamp = block_stamp;
    }
}

// -------------------------------------------------------------------------------------------------

/// One registered destination: its descriptor, base value, connections and resolved
/// (smoothed) outputs.
#[derive(Debug, Clone)]
struct Destination {
    parameter: FloatParameter,
    /// Whether this destination accepts per-voice modulation.
    poly: bool,
    /// The user's base value, in the parameter's normalized space.
    base_normalized: f32,
    connections: Vec<ModConnection>,
    /// Per sample smoothing coefficient.
    smooth_coeff: f32,
    mono_output: SmoothedOutput,
    /// One smoothed output per voice; empty until `build`, and for mono destinations.
    voice_outputs: Box<[SmoothedOutput]>,
}

/// Max expected connections per destination; more push beyond this capacity but then
/// allocate on the control thread.
const TYPICAL_CONNECTIONS: usize = 4;

// -------------------------------------------------------------------------------------------------

/// Central modulation registry and resolver.
///
/// Poly destinations must be queried once per voice per block via
/// [`Self::voice_value`]; mono destinations once per block via [`Self::value`].
/// A destination with zero connections resolves to its own base value, unmodified.
///
/// Mono destinations ignore connections from poly sources; there is no single voice whose
/// value could be used.
#[derive(Debug)]
pub(crate) struct ModMatrix {
    sources: Vec<ModSourceInfo>,
    destinations: Vec<Destination>,
    /// Latest mono source values, one per source (poly slots unused).
    mono_values: Vec<f32>,
    /// Latest per-voice source values, `voice_index * sources.len() + source_index`.
    poly_values: Vec<f32>,
    num_voices: usize,
    sample_rate: u32,
    block_stamp: u64,
    block_len: usize,
    /// Set once the first mono destination is registered; poly registrations are
    /// rejected from then on (the registration order defines the mono/poly split).
    mono_registration_started: bool,
    built: bool,
}

impl ModMatrix {
    pub fn new(sample_rate: u32) -> Self {
        assert!(sample_rate > 0, "Invalid sample rate");
        Self {
            sources: Vec::new(),
            destinations: Vec::new(),
            mono_values: Vec::new(),
            poly_values: Vec::new(),
            num_voices: 0,
            sample_rate,
            block_stamp: 1,
            block_len: 1,
            mono_registration_started: false,
            built: false,
        }
    }

    // --- registration (startup only) ---

    /// Register a mono modulation source: one value shared by all voices.
    pub fn add_mono_source(
        &mut self,
        id: FourCC,
        name: impl Into<String>,
        bipolar: bool,
    ) -> ModSourceId {
        self.add_source(id, name.into(), bipolar, false)
    }

    /// Register a poly modulation source: one value per voice.
    pub fn add_poly_source(
        &mut self,
        id: FourCC,
        name: impl Into<String>,
        bipolar: bool,
    ) -> ModSourceId {
        self.add_source(id, name.into(), bipolar, true)
    }

    fn add_source(&mut self, id: FourCC, name: String, bipolar: bool, poly: bool) -> ModSourceId {
        assert!(!self.built, "Sources must be registered before build");
        let index = self.sources.len();
        self.sources.push(ModSourceInfo {
            id,
            name,
            bipolar,
            poly,
        });
        self.mono_values.push(0.0);
        ModSourceId(index as u16)
    }

    /// Register a destination parameter. Poly destinations must all be registered before
    /// the first mono one - the registration order defines the mono/poly split.
    pub fn add_parameter(&mut self, parameter: FloatParameter, poly: bool) -> ParamId {
        assert!(!self.built, "Parameters must be registered before build");
        assert!(
            !poly || !self.mono_registration_started,
            "Poly parameters must be registered before the first mono parameter"
        );
        if !poly {
            self.mono_registration_started = true;
        }

        let base_normalized = parameter.normalize_value(parameter.default_value());
        let initial = parameter.denormalize_value(base_normalized);
        let smooth_coeff = smoothing_coefficient(DEFAULT_SMOOTHING_SECONDS, self.sample_rate);

        let index = self.destinations.len();
        self.destinations.push(Destination {
            parameter,
            poly,
            base_normalized,
            connections: Vec::with_capacity(TYPICAL_CONNECTIONS),
            smooth_coeff,
            mono_output: SmoothedOutput::new(initial),
            voice_outputs: Box::new([]),
        });
        ParamId(index as u16)
    }

    /// Finish registration: allocate per-voice storage for the given pool size.
    pub fn build(&mut self, num_voices: usize) {
        assert!(!self.built, "Matrix already built");
        assert!(num_voices > 0, "Voice pool must not be empty");
        self.num_voices = num_voices;
        self.poly_values = vec![0.0; num_voices * self.sources.len()];
        for destination in &mut self.destinations {
            if destination.poly {
                let initial = destination
                    .parameter
                    .denormalize_value(destination.base_normalized);
                destination.voice_outputs =
                    vec![SmoothedOutput::new(initial); num_voices].into_boxed_slice();
            }
        }
        self.built = true;
    }

    // --- lookups ---

    pub fn find_parameter(&self, id: FourCC) -> Option<ParamId> {
        self.destinations
            .iter()
            .position(|d| d.parameter.id() == id)
            .map(|index| ParamId(index as u16))
    }

    pub fn find_source(&self, id: FourCC) -> Option<ModSourceId> {
        self.sources
            .iter()
            .position(|s| s.id == id)
            .map(|index| ModSourceId(index as u16))
    }

    pub fn parameter(&self, id: ParamId) -> &FloatParameter {
        &self.destinations[id.0 as usize].parameter
    }

    pub fn parameters(&self) -> impl Iterator<Item = (ParamId, &FloatParameter)> {
        self.destinations
            .iter()
            .enumerate()
            .map(|(index, d)| (ParamId(index as u16), &d.parameter))
    }

    pub fn source_info(&self, id: ModSourceId) -> &ModSourceInfo {
        &self.sources[id.0 as usize]
    }

    pub fn sources(&self) -> impl Iterator<Item = (ModSourceId, &ModSourceInfo)> {
        self.sources
            .iter()
            .enumerate()
            .map(|(index, s)| (ModSourceId(index as u16), s))
    }

    // --- base values & connections (control thread, under the engine lock) ---

    /// Set a destination's base (user) value in real units, clamped into its range.
    pub fn set_base_value(&mut self, id: ParamId, value: f32) {
        let destination = &mut self.destinations[id.0 as usize];
        let value = destination.parameter.clamp_value(value);
        destination.base_normalized = destination.parameter.normalize_value(value);
    }

    /// A destination's base (user) value in real units.
    pub fn base_value(&self, id: ParamId) -> f32 {
        let destination = &self.destinations[id.0 as usize];
        destination
            .parameter
            .denormalize_value(destination.base_normalized)
    }

    /// Add or update a connection. A connection with an effectively zero depth removes
    /// the routing instead.
    pub fn set_connection(&mut self, target: ParamId, connection: ModConnection) {
        const THRESHOLD: f32 = 0.001;
        let destination = &mut self.destinations[target.0 as usize];
        if let Some(existing) = destination
            .connections
            .iter_mut()
            .find(|c| c.source == connection.source)
        {
            if connection.depth.abs() < THRESHOLD {
                destination
                    .connections
                    .retain(|c| c.source != connection.source);
            } else {
                *existing = connection;
            }
        } else if connection.depth.abs() >= THRESHOLD {
            destination.connections.push(connection);
        }
    }

    /// Remove all connections of a destination.
    pub fn clear_connections(&mut self, target: ParamId) {
        self.destinations[target.0 as usize].connections.clear();
    }

    /// Currently active connections of a destination.
    pub fn connections(&self, target: ParamId) -> &[ModConnection] {
        &self.destinations[target.0 as usize].connections
    }

    // --- source values (audio thread) ---

    /// Set the shared value of a mono source.
    #[inline]
    pub fn set_mono_value(&mut self, source: ModSourceId, value: f32) {
        self.mono_values[source.0 as usize] = value;
    }

    /// Set the per-voice value of a poly source.
    #[inline]
    pub fn set_voice_value(&mut self, voice_index: usize, source: ModSourceId, value: f32) {
        debug_assert!(voice_index < self.num_voices);
        self.poly_values[voice_index * self.sources.len() + source.0 as usize] = value;
    }

    // --- per block resolution (audio thread) ---

    /// Start a new modulation block. All smoothers advance by `block_len` samples when
    /// they are next queried.
    pub fn begin_block(&mut self, block_len: usize) {
        debug_assert!(self.built, "Matrix must be built before processing");
        self.block_stamp += 1;
        self.block_len = block_len.max(1);
    }

    /// Resolved, smoothed value of a destination for the whole instrument.
    #[inline]
    pub fn value(&mut self, id: ParamId) -> f32 {
        let target = self.resolve(id, None);
        let destination = &mut self.destinations[id.0 as usize];
        destination.mono_output.advance(
            target,
            destination.smooth_coeff,
            self.block_stamp,
            self.block_len,
        )
    }

    /// Resolved, smoothed value of a destination for one voice. Mono destinations
    /// resolve through the mono path.
    #[inline]
    pub fn voice_value(&mut self, voice_index: usize, id: ParamId) -> f32 {
        if !self.destinations[id.0 as usize].poly {
            return self.value(id);
        }
        let target = self.resolve(id, Some(voice_index));
        let destination = &mut self.destinations[id.0 as usize];
        destination.voice_outputs[voice_index].advance(
            target,
            destination.smooth_coeff,
            self.block_stamp,
            self.block_len,
        )
    }

    /// Resolve a destination to its target value: base plus depth-weighted, curve-shaped
    /// sum of all connected sources, clipped to the declared range.
    fn resolve(&self, id: ParamId, voice_index: Option<usize>) -> f32 {
        let destination = &self.destinations[id.0 as usize];
        let mut normalized = destination.base_normalized;
        for connection in &destination.connections {
            let source_index = connection.source.0 as usize;
            let source = &self.sources[source_index];
            let raw = if source.poly {
                match voice_index {
                    Some(voice) => self.poly_values[voice * self.sources.len() + source_index],
                    // mono destinations ignore poly sources
                    None => continue,
                }
            } else {
                self.mono_values[source_index]
            };
            normalized += connection.curve.shape(raw, source.bipolar) * connection.depth;
        }
        destination
            .parameter
            .denormalize_value(normalized.clamp(0.0, 1.0))
    }

    /// Snap all per-voice smoothers of a voice to their current targets. Called when a
    /// voice starts, so a recycled voice does not glide in from its previous note.
    pub fn snap_voice(&mut self, voice_index: usize) {
        for index in 0..self.destinations.len() {
            if self.destinations[index].poly {
                let target = self.resolve(ParamId(index as u16), Some(voice_index));
                self.destinations[index].voice_outputs[voice_index]
                    .snap(target, self.block_stamp);
            }
        }
    }

    /// Snap all mono smoothers to their current targets, e.g. after a missed-block reset.
    pub fn snap_mono(&mut self) {
        for index in 0..self.destinations.len() {
            let target = self.resolve(ParamId(index as u16), None);
            self.destinations[index]
                .mono_output
                .snap(target, self.block_stamp);
        }
    }
}

#[inline]
fn smoothing_coefficient(seconds: f32, sample_rate: u32) -> f32 {
    (-1.0 / (seconds * sample_rate as f32)).exp()
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::modulation::ModCurve;

    use super::*;

    const SAMPLE_RATE: u32 = 48000;

    fn matrix_with(
        poly_params: Vec<FloatParameter>,
        mono_params: Vec<FloatParameter>,
    ) -> (ModMatrix, Vec<ParamId>, Vec<ParamId>) {
        let mut matrix = ModMatrix::new(SAMPLE_RATE);
        let poly_ids = poly_params
            .into_iter()
            .map(|p| matrix.add_parameter(p, true))
            .collect();
        let mono_ids = mono_params
            .into_iter()
            .map(|p| matrix.add_parameter(p, false))
            .collect();
        (matrix, poly_ids, mono_ids)
    }

    fn param(id: &[u8; 4], range: std::ops::RangeInclusive<f32>, default: f32) -> FloatParameter {
        FloatParameter::new(FourCC(*id), "Test", range, default)
    }

    #[test]
    fn zero_connections_resolve_to_base_value() {
        let (mut matrix, poly, mono) = matrix_with(
            vec![param(b"cut ", 0.0..=135.0, 64.0)],
            vec![param(b"levl", -100.0..=0.0, -6.0)],
        );
        matrix.build(4);
        matrix.begin_block(32);

        // the base value comes back exactly, poly and mono
        assert_eq!(matrix.voice_value(0, poly[0]), matrix.base_value(poly[0]));
        assert_eq!(matrix.value(mono[0]), matrix.base_value(mono[0]));

        // changing the base converges onto the new base
        matrix.set_base_value(poly[0], 100.0);
        for _ in 0..1000 {
            matrix.begin_block(32);
            let _ = matrix.voice_value(0, poly[0]);
        }
        assert!((matrix.voice_value(0, poly[0]) - 100.0).abs() < 1e-3);
    }

    #[test]
    fn poly_sources_resolve_per_voice() {
        let (mut matrix, poly, _) =
            matrix_with(vec![param(b"pos ", 0.0..=1.0, 0.5)], vec![]);
        let env = matrix.add_poly_source(FourCC(*b"env1"), "Envelope 1", false);
        matrix.build(2);

        matrix.set_connection(poly[0], ModConnection::new(env, 0.5));
        matrix.set_voice_value(0, env, 0.0);
        matrix.set_voice_value(1, env, 1.0);

        // run enough blocks for smoothing to settle
        for _ in 0..2000 {
            matrix.begin_block(32);
            let _ = matrix.voice_value(0, poly[0]);
            let _ = matrix.voice_value(1, poly[0]);
        }
        assert!((matrix.voice_value(0, poly[0]) - 0.5).abs() < 1e-3);
        assert!((matrix.voice_value(1, poly[0]) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn resolved_values_clamp_to_range() {
        let (mut matrix, poly, _) =
            matrix_with(vec![param(b"pos ", 0.0..=1.0, 0.9)], vec![]);
        let env = matrix.add_poly_source(FourCC(*b"env1"), "Envelope 1", false);
        matrix.build(1);

        matrix.set_connection(poly[0], ModConnection::new(env, 1.0));
        matrix.set_voice_value(0, env, 1.0);
        for _ in 0..2000 {
            matrix.begin_block(32);
            let _ = matrix.voice_value(0, poly[0]);
        }
        // 0.9 + 1.0 clamps to the top of the range, never beyond
        let value = matrix.voice_value(0, poly[0]);
        assert!((value - 1.0).abs() < 1e-4);
        assert!(value.is_finite());
    }

    #[test]
    fn mono_destinations_ignore_poly_sources() {
        let (mut matrix, _, mono) =
            matrix_with(vec![], vec![param(b"levl", 0.0..=1.0, 0.5)]);
        let env = matrix.add_poly_source(FourCC(*b"env1"), "Envelope 1", false);
        let wheel = matrix.add_mono_source(FourCC(*b"pb  "), "Pitch Bend", true);
        matrix.build(2);

        matrix.set_connection(mono[0], ModConnection::new(env, 1.0));
        matrix.set_voice_value(0, env, 1.0);
        for _ in 0..100 {
            matrix.begin_block(32);
            let _ = matrix.value(mono[0]);
        }
        // the poly connection contributes nothing to the mono resolution
        assert!((matrix.value(mono[0]) - 0.5).abs() < 1e-4);

        // but a mono source does
        matrix.set_connection(mono[0], ModConnection::new(wheel, 0.25));
        matrix.set_mono_value(wheel, 1.0);
        for _ in 0..2000 {
            matrix.begin_block(32);
            let _ = matrix.value(mono[0]);
        }
        assert!((matrix.value(mono[0]) - 0.75).abs() < 1e-3);
    }

    #[test]
    fn connections_update_and_remove() {
        let (mut matrix, poly, _) =
            matrix_with(vec![param(b"pos ", 0.0..=1.0, 0.0)], vec![]);
        let lfo = matrix.add_poly_source(FourCC(*b"lfo1"), "LFO 1", true);
        matrix.build(1);

        matrix.set_connection(poly[0], ModConnection::new(lfo, 0.5));
        assert_eq!(matrix.connections(poly[0]).len(), 1);

        // same source updates in place
        matrix.set_connection(
            poly[0],
            ModConnection::new(lfo, 0.8).with_curve(ModCurve::SCurve),
        );
        assert_eq!(matrix.connections(poly[0]).len(), 1);
        assert_eq!(matrix.connections(poly[0])[0].depth, 0.8);

        // zero depth removes
        matrix.set_connection(poly[0], ModConnection::new(lfo, 0.0));
        assert!(matrix.connections(poly[0]).is_empty());
    }

    #[test]
    fn smoothing_steps_towards_target() {
        let (mut matrix, _, mono) =
            matrix_with(vec![], vec![param(b"levl", 0.0..=1.0, 0.0)]);
        let wheel = matrix.add_mono_source(FourCC(*b"pb  "), "Pitch Bend", true);
        matrix.build(1);
        matrix.set_connection(mono[0], ModConnection::new(wheel, 1.0));

        matrix.begin_block(32);
        assert_eq!(matrix.value(mono[0]), 0.0);

        // a full scale jump does not arrive within one block
        matrix.set_mono_value(wheel, 1.0);
        matrix.begin_block(32);
        let first = matrix.value(mono[0]);
        assert!(first > 0.0 && first < 0.2);

        // repeated queries within one block are idempotent
        assert_eq!(matrix.value(mono[0]), first);

        // ~5 time constants later it has converged
        let blocks = (5.0 * DEFAULT_SMOOTHING_SECONDS * SAMPLE_RATE as f32 / 32.0) as usize;
        for _ in 0..blocks {
            matrix.begin_block(32);
            let _ = matrix.value(mono[0]);
        }
        assert!((matrix.value(mono[0]) - 1.0).abs() < 0.01);
    }

    #[test]
    fn snap_voice_skips_smoothing() {
        let (mut matrix, poly, _) =
            matrix_with(vec![param(b"pos ", 0.0..=1.0, 0.0)], vec![]);
        let env = matrix.add_poly_source(FourCC(*b"env1"), "Envelope 1", false);
        matrix.build(1);
        matrix.set_connection(poly[0], ModConnection::new(env, 1.0));

        matrix.begin_block(32);
        matrix.set_voice_value(0, env, 1.0);
        matrix.snap_voice(0);
        assert!((matrix.voice_value(0, poly[0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn lookup_by_fourcc() {
        let (matrix, poly, _) = {
            let (mut matrix, poly, mono) = matrix_with(
                vec![param(b"cut ", 0.0..=135.0, 64.0)],
                vec![param(b"levl", -100.0..=0.0, 0.0)],
            );
            matrix.build(1);
            (matrix, poly, mono)
        };
        assert_eq!(matrix.find_parameter(FourCC(*b"cut ")), Some(poly[0]));
        assert_eq!(matrix.find_parameter(FourCC(*b"none")), None);
        assert_eq!(matrix.parameter(poly[0]).name(), "Test");
    }
}
