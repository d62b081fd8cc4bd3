//! A voice: the complete per-note signal chain. Two wavetable oscillator units, a sub
//! oscillator and a noise generator feed the per-voice filter (or bypass it per unit),
//! shaped by the amplitude envelope. All per-voice modulation sources (envelopes, LFOs,
//! step LFO, note expressions) live here and are seeded into the matrix once per block.
//!
//! Voices are pool-allocated once at engine construction and recycled forever; nothing on
//! the render path allocates.

use rand::{rngs::SmallRng, SeedableRng};

use crate::{
    envelope::AnalogAdsr,
    filter::{resonance_to_q, VoiceFilter, MAX_CUTOFF_HZ, MIN_CUTOFF_HZ},
    lfo::{Lfo, LfoParams, StepLfo},
    modulation::matrix::ModMatrix,
    oscillator::{NoiseGenerator, WavetableOscillator, WavetableOscParams, MAX_UNISON},
    params::{ModSources, ParamIds, FILTER_NOTE_RANGE},
    settings::{GlideMode, SynthSettings, NUM_ENVS, NUM_LFOS, NUM_OSCS},
    utils::{
        buffer::{add_buffer, clear_buffer, scale_buffer},
        db_to_linear, midi_note_to_hertz, panning_factors,
        tempo::{beat_frequency, Transport},
        velocity_to_gain,
    },
    wavetable::WavetableSet,
    SUB_BLOCK_FRAMES,
};

// -------------------------------------------------------------------------------------------------

/// Voice lifecycle states: `Idle -> Starting -> Sounding -> Releasing -> Idle`.
/// `Starting` only exists within a note-on call; it is never observed across blocks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    #[default]
    Idle,
    Starting,
    Sounding,
    Releasing,
}

// -------------------------------------------------------------------------------------------------

/// Everything a voice needs from the engine for one block.
pub(crate) struct VoiceContext<'a> {
    pub matrix: &'a mut ModMatrix,
    pub sources: &'a ModSources,
    pub params: &'a ParamIds,
    pub settings: &'a SynthSettings,
    pub osc_tables: [&'a WavetableSet; NUM_OSCS],
    pub sub_table: &'a WavetableSet,
    pub transport: &'a Transport,
    /// Mono pitch wheel position, -1..=1.
    pub wheel_bend: f32,
    pub sample_rate: u32,
}

// -------------------------------------------------------------------------------------------------

/// Linear pitch glide over the note number: reaches a new target after exactly the
/// configured glide time, regardless of distance.
#[derive(Debug, Clone)]
pub(crate) struct NoteGlide {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
}

impl NoteGlide {
    fn new() -> Self {
        Self {
            current: 60.0,
            target: 60.0,
            step: 0.0,
            remaining: 0,
        }
    }

    /// Jump to a note without gliding.
    pub fn jump_to(&mut self, note: f32) {
        self.current = note;
        self.target = note;
        self.remaining = 0;
    }

    /// Glide from the current position to a new target over `seconds`.
    pub fn glide_to(&mut self, note: f32, seconds: f32, sample_rate: u32) {
        self.target = note;
        self.remaining = ((seconds * sample_rate as f32) as u32).max(1);
        self.step = (note - self.current) / self.remaining as f32;
    }

    pub fn advance(&mut self, frames: usize) {
        let steps = (frames as u32).min(self.remaining);
        self.current += self.step * steps as f32;
        self.remaining -= steps;
        if self.remaining == 0 {
            self.current = self.target;
        }
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }
}

// -------------------------------------------------------------------------------------------------

pub(crate) struct Voice {
    /// Slot index in the pool; also the matrix voice index.
    index: usize,
    state: VoiceState,
    note: u8,
    channel: u8,
    velocity: f32,
    /// Monotonic note-on order, used by the "oldest" steal policy.
    serial: u64,
    // MPE per-note expression values, normalized
    pressure: f32,
    timbre: f32,
    note_bend: f32,

    glide: NoteGlide,
    oscs: [WavetableOscillator; NUM_OSCS],
    sub: WavetableOscillator,
    noise: NoiseGenerator,
    filter: VoiceFilter,
    filter_env: AnalogAdsr,
    amp_env: AnalogAdsr,
    mod_envs: [AnalogAdsr; NUM_ENVS],
    lfos: [Lfo; NUM_LFOS],
    step_lfo: StepLfo,
    rng: SmallRng,

    // per block resolved values
    osc_notes: [f32; NUM_OSCS],
    osc_params: [WavetableOscParams; NUM_OSCS],
    sub_note: f32,
    sub_level: f32,
    sub_pan: f32,
    noise_gains: (f32, f32),
    amp_gain: f32,
    /// Live state hint: current cutoff in MIDI note space.
    filter_cutoff_note: f32,

    pre_filter: [f32; SUB_BLOCK_FRAMES * 2],
}

impl Voice {
    pub fn new(index: usize, sample_rate: u32) -> Self {
        Self {
            index,
            state: VoiceState::Idle,
            note: 0,
            channel: 0,
            velocity: 0.0,
            serial: 0,
            pressure: 0.0,
            timbre: 0.0,
            note_bend: 0.0,
            glide: NoteGlide::new(),
            oscs: std::array::from_fn(|_| WavetableOscillator::new(sample_rate)),
            sub: WavetableOscillator::new(sample_rate),
            noise: NoiseGenerator::new(),
            filter: VoiceFilter::new(sample_rate),
            filter_env: AnalogAdsr::new(sample_rate),
            amp_env: AnalogAdsr::new(sample_rate),
            mod_envs: std::array::from_fn(|_| AnalogAdsr::new(sample_rate)),
            lfos: std::array::from_fn(|_| Lfo::new(sample_rate)),
            step_lfo: StepLfo::new(sample_rate),
            rng: SmallRng::from_os_rng(),
            osc_notes: [60.0; NUM_OSCS],
            osc_params: [WavetableOscParams::default(); NUM_OSCS],
            sub_note: 48.0,
            sub_level: 0.0,
            sub_pan: 0.0,
            noise_gains: (0.0, 0.0),
            amp_gain: 1.0,
            filter_cutoff_note: 64.0,
            pre_filter: [0.0; SUB_BLOCK_FRAMES * 2],
        }
    }

    #[inline]
    pub fn state(&self) -> VoiceState {
        self.state
    }
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self.state, VoiceState::Sounding | VoiceState::Releasing)
    }
    #[inline]
    pub fn note(&self) -> u8 {
        self.note
    }
    #[inline]
    pub fn channel(&self) -> u8 {
        self.channel
    }
    #[inline]
    pub fn serial(&self) -> u64 {
        self.serial
    }
    #[inline]
    pub fn velocity(&self) -> f32 {
        self.velocity
    }
    /// The glided note number as currently sounding.
    #[inline]
    pub fn current_note(&self) -> f32 {
        self.glide.current()
    }
    /// Live state hint: current filter cutoff in MIDI note space.
    #[inline]
    pub fn filter_cutoff_note(&self) -> f32 {
        self.filter_cutoff_note
    }
    /// Live state hint: current morph position of an oscillator unit, 0..=1.
    #[inline]
    pub fn wavetable_position(&self, osc: usize) -> f32 {
        self.osc_params[osc].position
    }
    #[cfg(test)]
    pub fn amp_env_output(&self) -> f32 {
        self.amp_env.output()
    }

    /// Bind this voice to a note and restart all per-voice generators.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &mut self,
        note: u8,
        channel: u8,
        velocity: f32,
        serial: u64,
        glide_from: Option<f32>,
        ctx: &mut VoiceContext,
    ) {
        self.state = VoiceState::Starting;
        self.note = note;
        self.channel = channel;
        self.velocity = velocity.clamp(0.0, 1.0);
        self.serial = serial;
        self.pressure = 0.0;
        self.timbre = 0.0;
        self.note_bend = 0.0;

        let glide = &ctx.settings.global;
        match glide_from {
            Some(from) if glide.glide_mode != GlideMode::Off => {
                self.glide.jump_to(from);
                self.glide
                    .glide_to(note as f32, glide.glide_time, ctx.sample_rate);
            }
            _ => self.glide.jump_to(note as f32),
        }

        self.seed_note_sources(ctx);

        // restart generators
        for (index, osc) in self.oscs.iter_mut().enumerate() {
            let settings = &ctx.settings.oscs[index];
            let phases = if settings.retrigger {
                WavetableOscillator::spread_phases(settings.unison)
            } else {
                WavetableOscillator::random_phases(&mut self.rng)
            };
            osc.note_on(&phases);
        }
        let sub_phases = if ctx.settings.sub.retrigger {
            [0.0; MAX_UNISON]
        } else {
            WavetableOscillator::random_phases(&mut self.rng)
        };
        self.sub.note_on(&sub_phases);
        self.noise.note_on();

        self.filter.reset();
        self.filter_env.reset();
        self.filter_env.note_on();

        for env in &mut self.mod_envs {
            env.reset();
            env.note_on();
        }
        for (index, lfo) in self.lfos.iter_mut().enumerate() {
            let retrigger = ctx.settings.lfos[index].retrigger;
            lfo.note_on(if retrigger { Some(0.0) } else { None });
        }
        self.step_lfo.reset();
        let step_retrigger = ctx.settings.step_lfo.retrigger;
        self.step_lfo
            .note_on(if step_retrigger { Some(0.0) } else { None });

        self.amp_env.reset();
        self.amp_env.note_on();

        // resolve the first block without smoothing from the recycled voice's past
        self.update_params(0, ctx);
        ctx.matrix.snap_voice(self.index);

        self.state = VoiceState::Sounding;
    }

    /// Re-attack while staying bound (mono retrigger): envelopes restart per their
    /// retrigger flags, oscillator phases keep running.
    pub fn retrigger(&mut self, note: u8, velocity: f32, ctx: &mut VoiceContext) {
        self.note = note;
        self.velocity = velocity.clamp(0.0, 1.0);

        let global = &ctx.settings.global;
        if global.glide_mode != GlideMode::Off {
            self.glide
                .glide_to(note as f32, global.glide_time, ctx.sample_rate);
        } else {
            self.glide.jump_to(note as f32);
        }

        self.seed_note_sources(ctx);

        if ctx.settings.amp.retrigger {
            // hard restart so the re-attack is audible from silence
            self.amp_env.reset();
            self.amp_env.note_on();
        }
        if ctx.settings.filter.retrigger {
            self.filter_env.reset();
            self.filter_env.note_on();
        }
        for (index, env) in self.mod_envs.iter_mut().enumerate() {
            if ctx.settings.envs[index].retrigger {
                env.reset();
                env.note_on();
            }
        }
        self.state = VoiceState::Sounding;
    }

    /// Glide to a new note target without touching any envelope (mono legato).
    pub fn glide_to(&mut self, note: u8, ctx: &mut VoiceContext) {
        self.note = note;
        let global = &ctx.settings.global;
        if global.glide_mode != GlideMode::Off {
            self.glide
                .glide_to(note as f32, global.glide_time, ctx.sample_rate);
        } else {
            self.glide.jump_to(note as f32);
        }
        self.seed_note_sources(ctx);
    }

    fn seed_note_sources(&mut self, ctx: &mut VoiceContext) {
        let matrix = &mut *ctx.matrix;
        let sources = ctx.sources;
        matrix.set_voice_value(self.index, sources.velocity, self.velocity);
        matrix.set_voice_value(self.index, sources.note, self.note as f32 / 127.0);
        matrix.set_voice_value(self.index, sources.pressure, self.pressure);
        matrix.set_voice_value(self.index, sources.timbre, self.timbre);
        matrix.set_voice_value(self.index, sources.note_pitchbend, self.note_bend);
    }

    /// Release the note: envelopes enter their release stage. The voice recycles once
    /// the amplitude envelope reports idle.
    pub fn note_off(&mut self) {
        if self.is_active() {
            self.amp_env.note_off();
            self.filter_env.note_off();
            for env in &mut self.mod_envs {
                env.note_off();
            }
            self.state = VoiceState::Releasing;
        }
    }

    /// Force the voice back to idle immediately (steal, missed-block reset).
    pub fn kill(&mut self) {
        self.state = VoiceState::Idle;
        self.amp_env.reset();
        self.filter_env.reset();
        for env in &mut self.mod_envs {
            env.reset();
        }
    }

    /// Render one sub-block into the cleared interleaved stereo `output` and advance all
    /// per-voice state. Returns true when the voice finished (amp envelope went idle) -
    /// checked by the engine once per block, after the block.
    pub fn process(&mut self, output: &mut [f32], ctx: &mut VoiceContext) -> bool {
        debug_assert!(self.is_active(), "Only active voices render");
        debug_assert!(output.len() <= SUB_BLOCK_FRAMES * 2);

        let frames = output.len() / 2;
        self.update_params(frames, ctx);

        clear_buffer(&mut self.pre_filter[..output.len()]);
        let (pre, post) = (&mut self.pre_filter[..output.len()], output);

        for (index, osc) in self.oscs.iter_mut().enumerate() {
            let settings = &ctx.settings.oscs[index];
            if settings.enabled {
                let target: &mut [f32] = if settings.through_filter {
                    &mut *pre
                } else {
                    &mut *post
                };
                osc.process_adding(
                    self.osc_notes[index],
                    &self.osc_params[index],
                    ctx.osc_tables[index],
                    target,
                );
            }
        }
        if ctx.settings.sub.enabled {
            let target: &mut [f32] = if ctx.settings.sub.through_filter {
                &mut *pre
            } else {
                &mut *post
            };
            let sub_params = WavetableOscParams {
                gain: self.sub_level,
                pan: self.sub_pan,
                ..WavetableOscParams::default()
            };
            self.sub
                .process_adding(self.sub_note, &sub_params, ctx.sub_table, target);
        }
        if ctx.settings.noise.enabled {
            let target: &mut [f32] = if ctx.settings.noise.through_filter {
                &mut *pre
            } else {
                &mut *post
            };
            self.noise.process_adding(
                ctx.settings.noise.noise_type,
                self.noise_gains.0,
                self.noise_gains.1,
                target,
            );
        }

        // velocity gain ahead of the filter, like the rest of the per-voice gain staging
        scale_buffer(pre, self.amp_gain);
        scale_buffer(post, self.amp_gain);

        if ctx.settings.filter.enabled {
            self.filter.process(pre);
        }
        add_buffer(post, pre);

        self.amp_env.process_multiplying(post);

        if self.amp_env.is_idle() {
            self.state = VoiceState::Idle;
            true
        } else {
            false
        }
    }

    /// Per-block parameter update: seed poly modulation sources, advance modulation
    /// generators by one block, resolve all per-voice parameters from the matrix.
    fn update_params(&mut self, frames: usize, ctx: &mut VoiceContext) {
        let index = self.index;
        let settings = ctx.settings;
        let sources = ctx.sources;
        let params = ctx.params;
        let matrix = &mut *ctx.matrix;

        matrix.set_voice_value(index, sources.note, self.note as f32 / 127.0);

        // glided pitch, plus additive pitch bend in semitone space
        let mut glided = self.glide.current();
        if settings.global.glide_mode == GlideMode::Glissando {
            glided = glided.round();
        }
        let bend_range = settings.global.pitch_bend_range;
        let mut bend = ctx.wheel_bend * bend_range;
        if settings.global.mpe {
            bend += self.note_bend * bend_range;
        }

        for osc_index in 0..NUM_OSCS {
            if !settings.oscs[osc_index].enabled {
                continue;
            }
            let ids = &params.oscs[osc_index];
            self.osc_notes[osc_index] = glided
                + bend
                + matrix.voice_value(index, ids.tune)
                + matrix.voice_value(index, ids.finetune) / 100.0;
            self.osc_params[osc_index] = WavetableOscParams {
                unison: settings.oscs[osc_index].unison,
                gain: db_to_linear(matrix.voice_value(index, ids.level)),
                position: matrix.voice_value(index, ids.position) / 100.0,
                detune: matrix.voice_value(index, ids.detune),
                spread: matrix.voice_value(index, ids.spread) / 100.0,
                pan: matrix.voice_value(index, ids.pan),
                formant: matrix.voice_value(index, ids.formant),
                bend: matrix.voice_value(index, ids.bend),
            };
        }

        if settings.sub.enabled {
            self.sub_note = glided + bend + matrix.voice_value(index, params.sub.tune);
            self.sub_level = db_to_linear(matrix.voice_value(index, params.sub.level));
            self.sub_pan = matrix.voice_value(index, params.sub.pan);
        }
        if settings.noise.enabled {
            let level = db_to_linear(matrix.voice_value(index, params.noise.level));
            let (left, right) = panning_factors(matrix.voice_value(index, params.noise.pan));
            self.noise_gains = (level * left, level * right);
        }

        // amplitude staging
        let amp_ids = &params.amp;
        self.amp_env.set_attack(matrix.voice_value(index, amp_ids.attack));
        self.amp_env.set_decay(matrix.voice_value(index, amp_ids.decay));
        self.amp_env
            .set_sustain(matrix.voice_value(index, amp_ids.sustain) / 100.0);
        self.amp_env
            .set_release(matrix.voice_value(index, amp_ids.release));
        let amp_sensitivity = matrix.voice_value(index, amp_ids.velocity_tracking) / 100.0;
        self.amp_gain = velocity_to_gain(self.velocity, amp_sensitivity);

        // filter: cutoff computed in pitch space for perceptually linear modulation
        if !settings.filter.enabled {
            matrix.set_voice_value(index, sources.filter_env, 0.0);
        } else {
            let ids = &params.filter;
            self.filter_env.set_attack(matrix.voice_value(index, ids.attack));
            self.filter_env.set_decay(matrix.voice_value(index, ids.decay));
            self.filter_env
                .set_sustain(matrix.voice_value(index, ids.sustain) / 100.0);
            self.filter_env
                .set_release(matrix.voice_value(index, ids.release));
            self.filter_env.process(frames);

            let env_output = self.filter_env.output();
            let sensitivity = matrix.voice_value(index, ids.velocity_tracking) / 100.0;
            let sensitivity = self.velocity * sensitivity + 1.0 - sensitivity;

            let mut cutoff_note = matrix.voice_value(index, ids.frequency);
            cutoff_note += (self.note as f32 - 60.0)
                * matrix.voice_value(index, ids.key_tracking)
                / 100.0;
            cutoff_note += env_output
                * sensitivity
                * matrix.voice_value(index, ids.env_amount)
                * FILTER_NOTE_RANGE;

            let max_cutoff = MAX_CUTOFF_HZ.min(ctx.sample_rate as f32 / 2.0);
            let cutoff = midi_note_to_hertz(cutoff_note).clamp(MIN_CUTOFF_HZ, max_cutoff);
            let q = resonance_to_q(matrix.voice_value(index, ids.resonance) / 100.0);

            self.filter.set_mode(settings.filter.mode);
            self.filter.set_params(cutoff, q);
            self.filter_cutoff_note = cutoff_note;

            matrix.set_voice_value(index, sources.filter_env, env_output);
        }

        // auxiliary envelopes
        for env_index in 0..NUM_ENVS {
            if settings.envs[env_index].enabled {
                let ids = &params.envs[env_index];
                let env = &mut self.mod_envs[env_index];
                env.set_attack(matrix.voice_value(index, ids.attack));
                env.set_decay(matrix.voice_value(index, ids.decay));
                env.set_sustain(matrix.voice_value(index, ids.sustain) / 100.0);
                env.set_release(matrix.voice_value(index, ids.release));
                env.process(frames);
                matrix.set_voice_value(index, sources.envs[env_index], env.output());
            } else {
                matrix.set_voice_value(index, sources.envs[env_index], 0.0);
            }
        }

        // poly LFOs
        for lfo_index in 0..NUM_LFOS {
            if settings.lfos[lfo_index].enabled {
                let lfo_settings = &settings.lfos[lfo_index];
                let ids = &params.lfos[lfo_index];
                let frequency = if lfo_settings.tempo_sync {
                    beat_frequency(lfo_settings.beat, ctx.transport)
                } else {
                    matrix.voice_value(index, ids.rate)
                };
                self.lfos[lfo_index].set_params(LfoParams {
                    shape: lfo_settings.shape,
                    frequency,
                    phase_offset: matrix.voice_value(index, ids.phase),
                    offset: matrix.voice_value(index, ids.offset),
                    depth: matrix.voice_value(index, ids.depth),
                    fade: matrix.voice_value(index, ids.fade),
                    delay: matrix.voice_value(index, ids.delay),
                });
                self.lfos[lfo_index].process(frames);
                matrix.set_voice_value(
                    index,
                    sources.lfos[lfo_index],
                    self.lfos[lfo_index].output(),
                );
            } else {
                matrix.set_voice_value(index, sources.lfos[lfo_index], 0.0);
            }
        }

        // poly step LFO
        if settings.step_lfo.enabled {
            let step_settings = &settings.step_lfo;
            self.step_lfo
                .set_rate(beat_frequency(step_settings.beat, ctx.transport));
            self.step_lfo.set_num_steps(step_settings.length);
            for (step, level) in step_settings.levels.iter().enumerate().take(step_settings.length)
            {
                self.step_lfo.set_step(step, *level);
            }
            self.step_lfo.process(frames);
            matrix.set_voice_value(index, sources.step_lfo, self.step_lfo.output());
        } else {
            matrix.set_voice_value(index, sources.step_lfo, 0.0);
        }

        self.glide.advance(frames);
    }

    // --- MPE per-note expression updates ---

    pub fn set_pressure(&mut self, pressure: f32, matrix: &mut ModMatrix, sources: &ModSources) {
        self.pressure = pressure.clamp(0.0, 1.0);
        matrix.set_voice_value(self.index, sources.pressure, self.pressure);
    }

    pub fn set_timbre(&mut self, timbre: f32, matrix: &mut ModMatrix, sources: &ModSources) {
        self.timbre = timbre.clamp(0.0, 1.0);
        matrix.set_voice_value(self.index, sources.timbre, self.timbre);
    }

    pub fn set_note_bend(&mut self, bend: f32, matrix: &mut ModMatrix, sources: &ModSources) {
        self.note_bend = bend.clamp(-1.0, 1.0);
        matrix.set_voice_value(self.index, sources.note_pitchbend, self.note_bend);
    }
}

// -------------------------------------------------------------------------------------------------
