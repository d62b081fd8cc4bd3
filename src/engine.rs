//! The engine: voice allocation and lifecycle, the fixed sub-block rendering pipeline,
//! the ordered effects chain and the real-time contract with the host.
//!
//! All DSP state lives in [`EngineState`] behind a single mutex. The audio thread only
//! ever *tries* to take it: when a control thread holds it (a wavetable swap), the
//! callback writes silence, flags the miss and returns, and the next successful callback
//! hard-resets all voices instead of risking inconsistent state. Table sets are built
//! completely off to the side and swapped under that same lock.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use crossbeam_queue::ArrayQueue;
use four_cc::FourCC;
use strum::IntoEnumIterator;

use crate::{
    effect::{
        chorus::ChorusEffect,
        delay::DelayEffect,
        distortion::{AmpParams, CrushParams, DistortionEffect},
        dynamics::DynamicsEffect,
        eq::{EqEffect, NUM_EQ_BANDS},
        gate::GateEffect,
        reverb::ReverbEffect,
        Effect, FxSlot,
    },
    error::Error,
    event::{NoteEvent, TimedEvent},
    lfo::{Lfo, LfoParams, StepLfo},
    modulation::{matrix::ModMatrix, ModConnection, ModSourceId, ModSourceInfo, ParamId},
    oscillator::AnalogWave,
    parameter::FloatParameter,
    params::{register_parameters, register_sources, ModSources, ParamIds, FILTER_NOTE_RANGE},
    scope::{ScopeReader, ScopeSender},
    settings::{SynthSettings, NUM_LFOS, NUM_OSCS},
    utils::{
        buffer::{add_buffer, clear_buffer},
        db_to_linear,
        smoothed::{ExponentialSmoothedValue, SmoothedValue},
        tempo::{beat_frequency, NoteDuration, Transport},
    },
    voice::{Voice, VoiceContext, VoiceState},
    wavetable::WavetableSet,
    MAX_VOICES, SUB_BLOCK_FRAMES,
};

#[cfg(feature = "assert-allocs")]
use assert_no_alloc::assert_no_alloc;

#[cfg(not(feature = "assert-allocs"))]
#[inline(always)]
fn assert_no_alloc<T, F: FnOnce() -> T>(func: F) -> T {
    func()
}

// -------------------------------------------------------------------------------------------------

/// Size of the default factory wavetable frames.
const DEFAULT_FRAME_SIZE: usize = 2048;

/// Capacity of the lock-free control update queue towards the audio thread.
const CONTROL_QUEUE_SIZE: usize = 1024;

/// Capacity of the mono held-note stack.
const HELD_NOTE_CAPACITY: usize = 128;

// -------------------------------------------------------------------------------------------------

/// Parameter updates posted from other threads, applied at block start in audio time.
enum ControlUpdate {
    Parameter { id: ParamId, value: f32 },
}

// -------------------------------------------------------------------------------------------------

/// The wavetable sets owned by the engine: one per oscillator slot, plus the band-limited
/// analog shapes for the sub oscillator.
struct Tables {
    osc: [WavetableSet; NUM_OSCS],
    analog: Vec<WavetableSet>,
}

impl Tables {
    fn new(sample_rate: u32) -> Result<Self, Error> {
        let sine = |phase: f32| (std::f32::consts::TAU * phase).sin();
        let osc = [
            WavetableSet::from_waveform(sine, DEFAULT_FRAME_SIZE, sample_rate)?,
            WavetableSet::from_waveform(sine, DEFAULT_FRAME_SIZE, sample_rate)?,
        ];
        let mut analog = Vec::new();
        for wave in AnalogWave::iter() {
            analog.push(WavetableSet::from_waveform(
                |phase| wave.evaluate(phase),
                DEFAULT_FRAME_SIZE,
                sample_rate,
            )?);
        }
        Ok(Self { osc, analog })
    }

    fn analog_for(&self, wave: AnalogWave) -> &WavetableSet {
        let index = AnalogWave::iter().position(|w| w == wave).unwrap_or(0);
        &self.analog[index]
    }
}

// -------------------------------------------------------------------------------------------------

/// All mutable DSP state, owned exclusively by whoever holds the engine mutex.
struct EngineState {
    sample_rate: u32,
    settings: SynthSettings,
    matrix: ModMatrix,
    sources: ModSources,
    params: ParamIds,
    voices: Vec<Voice>,
    tables: Tables,
    mono_lfos: [Lfo; NUM_LFOS],
    mono_step_lfo: StepLfo,

    gate: GateEffect,
    chorus: ChorusEffect,
    distortion: DistortionEffect,
    delay: DelayEffect,
    eq: EqEffect,
    dynamics: DynamicsEffect,
    reverb: ReverbEffect,
    master_gain: ExponentialSmoothedValue,

    scope: ScopeSender,
    held_notes: Vec<u8>,
    note_serial: u64,
    last_played_note: Option<f32>,
    last_mono: bool,
    wheel_bend: f32,
    voice_scratch: [f32; SUB_BLOCK_FRAMES * 2],
}

impl EngineState {
    fn new(sample_rate: u32, scope: ScopeSender) -> Result<Self, Error> {
        assert!(sample_rate > 0, "Invalid sample rate");

        let mut matrix = ModMatrix::new(sample_rate);
        let sources = register_sources(&mut matrix);
        let params = register_parameters(&mut matrix);
        matrix.build(MAX_VOICES);

        let voices = (0..MAX_VOICES)
            .map(|index| Voice::new(index, sample_rate))
            .collect();
        let tables = Tables::new(sample_rate)?;

        let mut state = Self {
            sample_rate,
            settings: SynthSettings::default(),
            matrix,
            sources,
            params,
            voices,
            tables,
            mono_lfos: std::array::from_fn(|_| Lfo::new(sample_rate)),
            mono_step_lfo: StepLfo::new(sample_rate),
            gate: GateEffect::new(),
            chorus: ChorusEffect::new(),
            distortion: DistortionEffect::new(),
            delay: DelayEffect::new(),
            eq: EqEffect::new(),
            dynamics: DynamicsEffect::new(),
            reverb: ReverbEffect::new(),
            master_gain: ExponentialSmoothedValue::with_inertia(1.0, 0.1, sample_rate),
            scope,
            held_notes: Vec::with_capacity(HELD_NOTE_CAPACITY),
            note_serial: 0,
            last_played_note: None,
            last_mono: false,
            wheel_bend: 0.0,
            voice_scratch: [0.0; SUB_BLOCK_FRAMES * 2],
        };

        state.gate.prepare(sample_rate, SUB_BLOCK_FRAMES);
        state.chorus.prepare(sample_rate, SUB_BLOCK_FRAMES);
        state.distortion.prepare(sample_rate, SUB_BLOCK_FRAMES);
        state.delay.prepare(sample_rate, SUB_BLOCK_FRAMES);
        state.eq.prepare(sample_rate, SUB_BLOCK_FRAMES);
        state.dynamics.prepare(sample_rate, SUB_BLOCK_FRAMES);
        state.reverb.prepare(sample_rate, SUB_BLOCK_FRAMES);
        Ok(state)
    }

    // --- the per callback render pipeline ---

    fn process(&mut self, output: &mut [f32], events: &[TimedEvent], transport: &Transport) {
        debug_assert!(output.len() % 2 == 0, "Output must be interleaved stereo");
        let frames = output.len() / 2;
        clear_buffer(output);

        // mono/poly switches are abrupt by design: clear everything sounding
        if self.settings.global.mono != self.last_mono {
            self.last_mono = self.settings.global.mono;
            self.reset_voices_and_tails();
        }

        let mut event_cursor = 0;
        let mut pos = 0;
        while pos < frames {
            let sub = SUB_BLOCK_FRAMES.min(frames - pos);
            let block_end = pos + sub;

            self.matrix.begin_block(sub);

            // events dispatch at sub-block granularity
            while event_cursor < events.len()
                && (events[event_cursor].frame as usize) < block_end
            {
                self.handle_event(events[event_cursor].event, transport);
                event_cursor += 1;
            }

            self.update_mono_sources(sub, transport);
            self.update_effect_params(transport);

            let slice = &mut output[pos * 2..block_end * 2];
            self.render_voices(slice, transport);
            self.apply_effects(slice, transport);

            for frame in slice.chunks_exact_mut(2) {
                let gain = self.master_gain.next();
                frame[0] *= gain;
                frame[1] *= gain;
            }

            pos = block_end;
        }

        self.scope.write_skipping(output);
    }

    fn render_voices(&mut self, slice: &mut [f32], transport: &Transport) {
        for index in 0..self.voices.len() {
            if !self.voices[index].is_active() {
                continue;
            }
            clear_buffer(&mut self.voice_scratch[..slice.len()]);

            let wheel_bend = self.wheel_bend;
            let sample_rate = self.sample_rate;
            let Self {
                matrix,
                sources,
                params,
                settings,
                tables,
                voices,
                voice_scratch,
                ..
            } = self;
            let mut ctx = VoiceContext {
                matrix,
                sources,
                params,
                settings,
                osc_tables: [&tables.osc[0], &tables.osc[1]],
                sub_table: tables.analog_for(settings.sub.wave),
                transport,
                wheel_bend,
                sample_rate,
            };
            // the idle check lives in here, made exactly once after the block
            let _finished = voices[index].process(&mut voice_scratch[..slice.len()], &mut ctx);

            add_buffer(slice, &voice_scratch[..slice.len()]);
        }
    }

    fn update_mono_sources(&mut self, frames: usize, transport: &Transport) {
        for index in 0..NUM_LFOS {
            if self.settings.lfos[index].enabled {
                let lfo_settings = self.settings.lfos[index];
                let ids = self.params.lfos[index].clone();
                let frequency = if lfo_settings.tempo_sync {
                    beat_frequency(lfo_settings.beat, transport)
                } else {
                    self.matrix.value(ids.rate)
                };
                let params = LfoParams {
                    shape: lfo_settings.shape,
                    frequency,
                    phase_offset: self.matrix.value(ids.phase),
                    offset: self.matrix.value(ids.offset),
                    depth: self.matrix.value(ids.depth),
                    // mono instances free-run without onset shaping
                    delay: 0.0,
                    fade: 0.0,
                };
                let lfo = &mut self.mono_lfos[index];
                lfo.set_params(params);
                lfo.process(frames);
                let output = lfo.output();
                self.matrix
                    .set_mono_value(self.sources.mono_lfos[index], output);
            } else {
                self.matrix
                    .set_mono_value(self.sources.mono_lfos[index], 0.0);
            }
        }

        if self.settings.step_lfo.enabled {
            let step_settings = self.settings.step_lfo;
            let step_lfo = &mut self.mono_step_lfo;
            step_lfo.set_rate(beat_frequency(step_settings.beat, transport));
            step_lfo.set_num_steps(step_settings.length);
            for (step, level) in step_settings
                .levels
                .iter()
                .enumerate()
                .take(step_settings.length)
            {
                step_lfo.set_step(step, *level);
            }
            step_lfo.process(frames);
            let output = step_lfo.output();
            self.matrix
                .set_mono_value(self.sources.mono_step_lfo, output);
        } else {
            self.matrix.set_mono_value(self.sources.mono_step_lfo, 0.0);
        }
    }

    fn update_effect_params(&mut self, transport: &Transport) {
        let params = self.params.clone();

        if self.settings.gate.enabled {
            let gate_settings = self.settings.gate;
            self.gate.set_length(gate_settings.length);
            for step in 0..gate_settings.length {
                self.gate.set_step(
                    step,
                    gate_settings.steps_left[step],
                    gate_settings.steps_right[step],
                );
            }
            self.gate
                .set_step_rate(beat_frequency(gate_settings.beat, transport));
            let attack = self.matrix.value(params.gate.attack);
            let release = self.matrix.value(params.gate.release);
            self.gate.set_attack(attack);
            self.gate.set_release(release);
        }

        if self.settings.fx.chorus_enabled {
            let delay = self.matrix.value(params.chorus.delay) / 1000.0;
            let rate = self.matrix.value(params.chorus.rate);
            let depth = self.matrix.value(params.chorus.depth) / 1000.0;
            let width = self.matrix.value(params.chorus.width);
            let mix = self.matrix.value(params.chorus.mix);
            self.chorus.set_params(delay, rate, depth, width, mix);
        }

        if self.settings.fx.distortion_enabled {
            self.distortion.set_mode(self.settings.fx.distortion_mode);
            self.distortion
                .set_amount(self.matrix.value(params.distortion.amount));
            self.distortion.set_crush_params(CrushParams {
                rate: self.matrix.value(params.distortion.crush_rate),
                rez: self.matrix.value(params.distortion.crush_rez),
                hard: self.matrix.value(params.distortion.crush_hard),
                mix: self.matrix.value(params.distortion.crush_mix),
            });
            self.distortion.set_fire_params(AmpParams {
                gain: self.matrix.value(params.distortion.fire_gain),
                tone: self.matrix.value(params.distortion.fire_tone),
                output: self.matrix.value(params.distortion.fire_output),
                mix: self.matrix.value(params.distortion.fire_mix),
            });
            self.distortion.set_grind_params(AmpParams {
                gain: self.matrix.value(params.distortion.grind_gain),
                tone: self.matrix.value(params.distortion.grind_tone),
                output: self.matrix.value(params.distortion.grind_output),
                mix: self.matrix.value(params.distortion.grind_mix),
            });
        }

        if self.settings.fx.delay_enabled {
            let seconds = if self.settings.fx.delay_sync {
                let durations = NoteDuration::durations();
                let beat = self.settings.fx.delay_beat.min(durations.len() - 1);
                durations[beat].to_seconds(transport) as f32
            } else {
                self.matrix.value(params.delay.time)
            };
            let feedback = self.matrix.value(params.delay.feedback);
            let cross = self.matrix.value(params.delay.cross_feedback);
            let mix = self.matrix.value(params.delay.mix);
            self.delay.set_params(seconds, feedback, cross, mix);
        }

        if self.settings.fx.eq_enabled {
            for band in 0..NUM_EQ_BANDS {
                let gain = self.matrix.value(params.eq.gains[band]);
                self.eq.set_band_gain(band, gain);
            }
        }

        if self.settings.fx.dynamics_enabled {
            let threshold = self.matrix.value(params.dynamics.threshold);
            let ratio = self.matrix.value(params.dynamics.ratio);
            let attack = self.matrix.value(params.dynamics.attack);
            let release = self.matrix.value(params.dynamics.release);
            let makeup = self.matrix.value(params.dynamics.makeup);
            self.dynamics
                .set_params(threshold, ratio, attack, release, makeup);
        }

        if self.settings.fx.reverb_enabled {
            let size = self.matrix.value(params.reverb.size);
            let decay = self.matrix.value(params.reverb.decay);
            let lowpass = self.matrix.value(params.reverb.lowpass);
            let damping = self.matrix.value(params.reverb.damping);
            let predelay = self.matrix.value(params.reverb.predelay);
            let mix = self.matrix.value(params.reverb.mix);
            self.reverb
                .set_params(size, decay, lowpass, damping, predelay, mix);
        }

        let level = self.matrix.value(params.level);
        self.master_gain.set_target(db_to_linear(level));
    }

    fn apply_effects(&mut self, slice: &mut [f32], transport: &Transport) {
        for slot in self.settings.fx.order {
            match slot {
                FxSlot::Gate if self.settings.gate.enabled => {
                    self.gate.process(slice, transport);
                }
                FxSlot::Chorus if self.settings.fx.chorus_enabled => {
                    self.chorus.process(slice, transport);
                }
                FxSlot::Distortion if self.settings.fx.distortion_enabled => {
                    self.distortion.process(slice, transport);
                }
                FxSlot::Delay if self.settings.fx.delay_enabled => {
                    self.delay.process(slice, transport);
                }
                FxSlot::Eq if self.settings.fx.eq_enabled => {
                    self.eq.process(slice, transport);
                }
                FxSlot::Dynamics if self.settings.fx.dynamics_enabled => {
                    self.dynamics.process(slice, transport);
                }
                FxSlot::Reverb if self.settings.fx.reverb_enabled => {
                    self.reverb.process(slice, transport);
                }
                _ => {}
            }
        }
    }

    // --- events ---

    fn handle_event(&mut self, event: NoteEvent, transport: &Transport) {
        match event {
            NoteEvent::NoteOn {
                note,
                velocity,
                channel,
            } => self.note_on(note, velocity, channel, transport),
            NoteEvent::NoteOff { note, channel } => self.note_off(note, channel, transport),
            NoteEvent::PitchBend { value } => {
                self.wheel_bend = value.clamp(-1.0, 1.0);
                self.matrix
                    .set_mono_value(self.sources.pitch_wheel, self.wheel_bend);
            }
            NoteEvent::NotePitchBend { note, value } => {
                let Self {
                    matrix,
                    sources,
                    voices,
                    ..
                } = self;
                for voice in voices.iter_mut().filter(|v| v.is_active() && v.note() == note) {
                    voice.set_note_bend(value, matrix, sources);
                }
            }
            NoteEvent::NotePressure { note, pressure } => {
                let Self {
                    matrix,
                    sources,
                    voices,
                    ..
                } = self;
                for voice in voices.iter_mut().filter(|v| v.is_active() && v.note() == note) {
                    voice.set_pressure(pressure, matrix, sources);
                }
            }
            NoteEvent::NoteTimbre { note, timbre } => {
                let Self {
                    matrix,
                    sources,
                    voices,
                    ..
                } = self;
                for voice in voices.iter_mut().filter(|v| v.is_active() && v.note() == note) {
                    voice.set_timbre(timbre, matrix, sources);
                }
            }
            NoteEvent::Controller { number, value } => {
                if let Some(source) = self.sources.cc.get(number as usize) {
                    self.matrix.set_mono_value(*source, value.clamp(0.0, 1.0));
                }
            }
            NoteEvent::AllNotesOff => {
                self.held_notes.clear();
                for voice in &mut self.voices {
                    voice.note_off();
                }
            }
        }
    }

    /// Note-on: either obtains a voice or is dropped with no partial state mutation.
    fn note_on(&mut self, note: u8, velocity: f32, channel: u8, transport: &Transport) {
        if self.settings.global.mono {
            if self.held_notes.len() < HELD_NOTE_CAPACITY {
                self.held_notes.retain(|held| *held != note);
                self.held_notes.push(note);
            }

            if let Some(index) = self.voices.iter().position(|v| v.is_active()) {
                let legato = self.settings.global.legato;
                let sounding = self.voices[index].state() == VoiceState::Sounding;
                let wheel_bend = self.wheel_bend;
                let sample_rate = self.sample_rate;
                let Self {
                    matrix,
                    sources,
                    params,
                    settings,
                    tables,
                    voices,
                    ..
                } = self;
                let mut ctx = VoiceContext {
                    matrix,
                    sources,
                    params,
                    settings,
                    osc_tables: [&tables.osc[0], &tables.osc[1]],
                    sub_table: tables.analog_for(settings.sub.wave),
                    transport,
                    wheel_bend,
                    sample_rate,
                };
                if legato && sounding {
                    voices[index].glide_to(note, &mut ctx);
                } else {
                    voices[index].retrigger(note, velocity, &mut ctx);
                }
                self.last_played_note = Some(note as f32);
                return;
            }
        }

        let Some(slot) = self.allocate_voice() else {
            // cannot happen with a non-empty pool; the request is dropped whole
            return;
        };

        self.note_serial += 1;
        let serial = self.note_serial;
        let glide_from = self.last_played_note;
        let wheel_bend = self.wheel_bend;
        let sample_rate = self.sample_rate;
        let Self {
            matrix,
            sources,
            params,
            settings,
            tables,
            voices,
            ..
        } = self;
        let mut ctx = VoiceContext {
            matrix,
            sources,
            params,
            settings,
            osc_tables: [&tables.osc[0], &tables.osc[1]],
            sub_table: tables.analog_for(settings.sub.wave),
            transport,
            wheel_bend,
            sample_rate,
        };
        voices[slot].start(note, channel, velocity, serial, glide_from, &mut ctx);
        self.last_played_note = Some(note as f32);
    }

    /// Find a free voice within the active voice cap, stealing if necessary.
    ///
    /// Steal policy: "oldest", deterministic. Prefer the voice that has been releasing
    /// longest; with none releasing take the voice whose note-on is oldest. Exactly one
    /// sounding voice transitions to idle per stolen note-on.
    fn allocate_voice(&mut self) -> Option<usize> {
        let cap = self.settings.global.max_voices.clamp(1, self.voices.len());
        let voices = &mut self.voices[..cap];

        if let Some(index) = voices.iter().position(|v| v.state() == VoiceState::Idle) {
            return Some(index);
        }

        let victim = voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.state() == VoiceState::Releasing)
            .min_by_key(|(_, v)| v.serial())
            .map(|(index, _)| index)
            .or_else(|| {
                voices
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, v)| v.serial())
                    .map(|(index, _)| index)
            });

        if let Some(index) = victim {
            voices[index].kill();
        }
        victim
    }

    fn note_off(&mut self, note: u8, channel: u8, transport: &Transport) {
        if self.settings.global.mono {
            self.held_notes.retain(|held| *held != note);

            if let Some(index) = self
                .voices
                .iter()
                .position(|v| v.is_active() && v.note() == note)
            {
                if let Some(&previous) = self.held_notes.last() {
                    // fall back to the most recent held key
                    let legato = self.settings.global.legato;
                    let velocity = self.voices[index].velocity();
                    let wheel_bend = self.wheel_bend;
                    let sample_rate = self.sample_rate;
                    let Self {
                        matrix,
                        sources,
                        params,
                        settings,
                        tables,
                        voices,
                        ..
                    } = self;
                    let mut ctx = VoiceContext {
                        matrix,
                        sources,
                        params,
                        settings,
                        osc_tables: [&tables.osc[0], &tables.osc[1]],
                        sub_table: tables.analog_for(settings.sub.wave),
                        transport,
                        wheel_bend,
                        sample_rate,
                    };
                    if legato {
                        voices[index].glide_to(previous, &mut ctx);
                    } else {
                        voices[index].retrigger(previous, velocity, &mut ctx);
                    }
                    self.last_played_note = Some(previous as f32);
                } else {
                    self.voices[index].note_off();
                }
            }
            return;
        }

        for voice in self
            .voices
            .iter_mut()
            .filter(|v| v.state() == VoiceState::Sounding)
        {
            if voice.note() == note && voice.channel() == channel {
                voice.note_off();
            }
        }
    }

    // --- recovery ---

    /// Hard reset after a missed block or a mono/poly switch: silence all voices and
    /// clear effect tails rather than resume from possibly inconsistent state.
    fn reset_voices_and_tails(&mut self) {
        for voice in &mut self.voices {
            voice.kill();
        }
        self.held_notes.clear();
        self.gate.reset();
        self.chorus.reset();
        self.distortion.reset();
        self.delay.reset();
        self.eq.reset();
        self.dynamics.reset();
        self.reverb.reset();
        self.matrix.snap_mono();
    }
}

// -------------------------------------------------------------------------------------------------

/// The polyphonic wavetable synthesizer.
///
/// `process` is meant to be called from a single real-time audio thread; all other
/// methods may be called from any control thread and never block the audio thread for
/// longer than a brief state swap.
pub struct WavetableSynth {
    state: Mutex<EngineState>,
    missed_block: AtomicBool,
    control_queue: Arc<ArrayQueue<ControlUpdate>>,
    scope_reader: Mutex<Option<ScopeReader>>,
}

impl WavetableSynth {
    /// Create a new engine for the given sample rate with the fixed voice pool and the
    /// factory sine tables loaded into both oscillator slots.
    pub fn new(sample_rate: u32) -> Result<Self, Error> {
        let (scope_sender, scope_reader) = ScopeSender::new();
        let state = EngineState::new(sample_rate, scope_sender)?;
        Ok(Self {
            state: Mutex::new(state),
            missed_block: AtomicBool::new(false),
            control_queue: Arc::new(ArrayQueue::new(CONTROL_QUEUE_SIZE)),
            scope_reader: Mutex::new(Some(scope_reader)),
        })
    }

    /// Render the next `output.len() / 2` frames of interleaved stereo audio.
    ///
    /// `events` must be ordered by frame offset. The full buffer is always written -
    /// silence where nothing sounds. When a control thread holds the engine (wavetable
    /// swap), this writes silence, marks the block missed and returns immediately; the
    /// next successful call hard-resets all voices.
    pub fn process(&self, output: &mut [f32], events: &[TimedEvent], transport: &Transport) {
        let Ok(mut state) = self.state.try_lock() else {
            output.fill(0.0);
            self.missed_block.store(true, Ordering::Release);
            return;
        };

        if self.missed_block.swap(false, Ordering::AcqRel) {
            state.reset_voices_and_tails();
        }

        while let Some(update) = self.control_queue.pop() {
            match update {
                ControlUpdate::Parameter { id, value } => state.matrix.set_base_value(id, value),
            }
        }

        assert_no_alloc(|| state.process(output, events, transport));
    }

    // --- wavetables ---

    /// Build a band-limited table set from raw waveform frames and swap it into an
    /// oscillator slot. The build runs on the calling thread without holding the engine;
    /// only the final swap takes the lock. On failure the previous set stays active.
    pub fn set_wavetable(&self, osc: usize, raw: &[f32], frame_size: usize) -> Result<(), Error> {
        if osc >= NUM_OSCS {
            return Err(Error::ParameterError(format!(
                "oscillator slot {osc} out of range"
            )));
        }
        let sample_rate = self.lock_state().sample_rate;

        // the expensive part happens outside the lock
        let set = WavetableSet::build(raw, frame_size, sample_rate).inspect_err(|err| {
            log::warn!("wavetable rebuild failed: {err}");
        })?;

        let mut state = self.lock_state();
        state.tables.osc[osc] = set;
        Ok(())
    }

    // --- settings ---

    /// Read a copy of the current settings.
    pub fn settings(&self) -> SynthSettings {
        self.lock_state().settings.clone()
    }

    /// Modify the settings in place. Numeric fields are clamped into their valid ranges
    /// afterwards.
    pub fn update_settings<F: FnOnce(&mut SynthSettings)>(&self, update: F) {
        let mut state = self.lock_state();
        update(&mut state.settings);
        state.settings.sanitize();
    }

    // --- parameters & modulation ---

    /// Typed handles to all destination parameters.
    pub fn param_ids(&self) -> ParamIds {
        self.lock_state().params.clone()
    }

    /// Typed handles to all modulation sources.
    pub fn mod_sources(&self) -> ModSources {
        self.lock_state().sources.clone()
    }

    /// Look up a destination parameter by its FourCC id.
    pub fn find_parameter(&self, id: FourCC) -> Option<ParamId> {
        self.lock_state().matrix.find_parameter(id)
    }

    /// Descriptors of all destination parameters, in registration order.
    pub fn parameters(&self) -> Vec<(ParamId, FloatParameter)> {
        self.lock_state()
            .matrix
            .parameters()
            .map(|(id, parameter)| (id, parameter.clone()))
            .collect()
    }

    /// Set a parameter's base (user) value, clamped into its range.
    pub fn set_parameter(&self, id: ParamId, value: f32) {
        self.lock_state().matrix.set_base_value(id, value);
    }

    /// A parameter's base (user) value.
    pub fn parameter_value(&self, id: ParamId) -> f32 {
        self.lock_state().matrix.base_value(id)
    }

    /// Post a parameter change through the bounded lock-free control queue; it is
    /// applied at the start of the next processed block. Fails when the queue is full.
    pub fn post_parameter(&self, id: ParamId, value: f32) -> Result<(), Error> {
        self.control_queue
            .push(ControlUpdate::Parameter { id, value })
            .map_err(|_| Error::SendError("control queue is full".to_string()))
    }

    /// Add, update or (with zero depth) remove a modulation routing.
    pub fn set_modulation(&self, target: ParamId, connection: ModConnection) {
        self.lock_state().matrix.set_connection(target, connection);
    }

    /// Remove all modulation routings of a destination.
    pub fn clear_modulation(&self, target: ParamId) {
        self.lock_state().matrix.clear_connections(target);
    }

    /// The active modulation routings of a destination.
    pub fn modulations(&self, target: ParamId) -> Vec<ModConnection> {
        self.lock_state().matrix.connections(target).to_vec()
    }

    /// Look up a modulation source by its FourCC id.
    pub fn find_source(&self, id: FourCC) -> Option<ModSourceId> {
        self.lock_state().matrix.find_source(id)
    }

    /// Descriptors of all modulation sources, in registration order.
    pub fn sources(&self) -> Vec<(ModSourceId, ModSourceInfo)> {
        self.lock_state()
            .matrix
            .sources()
            .map(|(id, info)| (id, info.clone()))
            .collect()
    }

    /// Descriptor of a single modulation source.
    pub fn source_info(&self, id: ModSourceId) -> ModSourceInfo {
        self.lock_state().matrix.source_info(id).clone()
    }

    // --- live state hints for visualization ---

    /// The visualization tap. Returns the reader on the first call, `None` afterwards.
    pub fn scope_reader(&self) -> Option<ScopeReader> {
        self.scope_reader.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Number of currently sounding or releasing voices.
    pub fn active_voice_count(&self) -> usize {
        self.lock_state()
            .voices
            .iter()
            .filter(|v| v.is_active())
            .count()
    }

    /// Currently sounding (glided) note numbers of every active voice.
    pub fn live_notes(&self) -> Vec<f32> {
        self.lock_state()
            .voices
            .iter()
            .filter(|v| v.is_active())
            .map(|v| v.current_note())
            .collect()
    }

    /// Current filter cutoff of every active voice, normalized to the cutoff
    /// parameter's range.
    pub fn live_filter_cutoff(&self) -> Vec<f32> {
        let state = self.lock_state();
        state
            .voices
            .iter()
            .filter(|v| v.is_active())
            .map(|v| (v.filter_cutoff_note() / FILTER_NOTE_RANGE).clamp(0.0, 1.0))
            .collect()
    }

    /// Current morph position of an oscillator slot: from the first active voice, or the
    /// parameter's base value when nothing sounds.
    pub fn live_wavetable_position(&self, osc: usize) -> f32 {
        let state = self.lock_state();
        if let Some(voice) = state.voices.iter().find(|v| v.is_active()) {
            voice.wavetable_position(osc.min(NUM_OSCS - 1))
        } else {
            state
                .matrix
                .base_value(state.params.oscs[osc.min(NUM_OSCS - 1)].position)
                / 100.0
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::settings::GlideMode;

    use super::*;

    const SAMPLE_RATE: u32 = 48000;

    fn note_on(frame: u32, note: u8, velocity: f32) -> TimedEvent {
        TimedEvent::new(
            frame,
            NoteEvent::NoteOn {
                note,
                velocity,
                channel: 0,
            },
        )
    }

    fn note_off(frame: u32, note: u8) -> TimedEvent {
        TimedEvent::new(frame, NoteEvent::NoteOff { note, channel: 0 })
    }

    /// Render the given number of seconds in approximately callback sized chunks and
    /// return the interleaved output.
    fn render(synth: &WavetableSynth, seconds: f32, events: &[TimedEvent]) -> Vec<f32> {
        let transport = Transport::default();
        let frames = (seconds * SAMPLE_RATE as f32) as usize;
        let mut output = vec![0.0f32; frames * 2];
        let mut pos = 0usize;
        let mut first = true;
        while pos < frames {
            let chunk = 480.min(frames - pos);
            let slice = &mut output[pos * 2..(pos + chunk) * 2];
            if first {
                synth.process(slice, events, &transport);
                first = false;
            } else {
                synth.process(slice, &[], &transport);
            }
            pos += chunk;
        }
        output
    }

    fn rms(buffer: &[f32]) -> f32 {
        (buffer.iter().map(|s| s * s).sum::<f32>() / buffer.len() as f32).sqrt()
    }

    fn basic_synth() -> WavetableSynth {
        let synth = WavetableSynth::new(SAMPLE_RATE).unwrap();
        // plain tone path: no filter shaping in front of the measurements
        synth.update_settings(|settings| settings.filter.enabled = false);
        synth
    }

    #[test]
    fn no_note_is_dropped_within_polyphony() {
        let synth = basic_synth();
        let events: Vec<TimedEvent> = (0..32).map(|i| note_on(0, 40 + i, 0.8)).collect();
        let mut output = vec![0.0f32; 64 * 2];
        synth.process(&mut output, &events, &Transport::default());
        assert_eq!(synth.active_voice_count(), 32);
    }

    #[test]
    fn stealing_recycles_exactly_the_oldest_voice() {
        let synth = basic_synth();
        synth.update_settings(|settings| settings.global.max_voices = 4);

        let events: Vec<TimedEvent> = (0..5).map(|i| note_on(i, 60 + i as u8, 0.8)).collect();
        let mut output = vec![0.0f32; 64 * 2];
        synth.process(&mut output, &events, &Transport::default());

        assert_eq!(synth.active_voice_count(), 4);
        let state = synth.lock_state();
        let mut active_notes: Vec<u8> = state
            .voices
            .iter()
            .filter(|v| v.is_active())
            .map(|v| v.note())
            .collect();
        active_notes.sort_unstable();
        // the oldest note (60) was stolen, everything else survived
        assert_eq!(active_notes, vec![61, 62, 63, 64]);
    }

    #[test]
    fn sustained_note_rms_matches_sustain_level() {
        // 1 second of a sustained note on a sine table, no effects
        let synth = basic_synth();
        let output = render(&synth, 1.0, &[note_on(0, 60, 1.0)]);

        // past attack and decay the level is sustain * velocity gain, center panned
        let tail = &output[output.len() / 2..];
        let expected = 0.8 * std::f32::consts::FRAC_1_SQRT_2 / std::f32::consts::SQRT_2;
        let measured = rms(tail);
        assert!(
            (measured - expected).abs() < expected * 0.1,
            "rms {measured} vs expected {expected}"
        );
    }

    #[test]
    fn mono_retrigger_restarts_the_envelope_from_zero() {
        // two overlapping notes on a mono instrument with legato off
        let synth = basic_synth();
        synth.update_settings(|settings| {
            settings.global.mono = true;
            settings.global.legato = false;
        });

        let _ = render(&synth, 0.5, &[note_on(0, 60, 1.0)]);
        {
            let state = synth.lock_state();
            let voice = state.voices.iter().find(|v| v.is_active()).unwrap();
            assert!(
                voice.amp_env_output() > 0.7,
                "expected the first note to be sustaining"
            );
        }

        // the second note-on forces a retrigger at the new pitch
        let mut output = vec![0.0f32; 32 * 2];
        synth.process(&mut output, &[note_on(0, 61, 1.0)], &Transport::default());

        let state = synth.lock_state();
        let voice = state.voices.iter().find(|v| v.is_active()).unwrap();
        assert_eq!(voice.note(), 61);
        assert!(
            voice.amp_env_output() < 0.3,
            "envelope must restart from zero, got {}",
            voice.amp_env_output()
        );
        assert_eq!(synth_active(&state), 1, "mono keeps a single voice");
    }

    fn synth_active(state: &EngineState) -> usize {
        state.voices.iter().filter(|v| v.is_active()).count()
    }

    #[test]
    fn gate_pattern_silences_off_steps() {
        // a 4 step on/off gate pattern over a sustained note
        let synth = basic_synth();
        synth.update_settings(|settings| {
            settings.gate.enabled = true;
            settings.gate.length = 4;
            settings.gate.steps_left = {
                let mut steps = [false; crate::effect::gate::NUM_GATE_STEPS];
                steps[0] = true;
                steps[2] = true;
                steps
            };
            settings.gate.steps_right = settings.gate.steps_left;
            settings.gate.beat = NoteDuration::QUARTER; // 0.5 s per step at 120 bpm
        });
        let ids = synth.param_ids();
        synth.set_parameter(ids.gate.attack, 0.01);
        synth.set_parameter(ids.gate.release, 0.01);

        let output = render(&synth, 2.0, &[note_on(0, 60, 1.0)]);

        let window_rms = |from: f32, to: f32| {
            let start = (from * SAMPLE_RATE as f32) as usize * 2;
            let end = (to * SAMPLE_RATE as f32) as usize * 2;
            rms(&output[start..end])
        };
        // on steps pass audio unattenuated, off steps are silent outside the
        // attack/release smoothed transition window
        let on_1 = window_rms(0.30, 0.45);
        let off_1 = window_rms(0.80, 0.95);
        let on_2 = window_rms(1.30, 1.45);
        let off_2 = window_rms(1.80, 1.95);
        assert!(on_1 > 0.3, "first on step should pass, rms {on_1}");
        assert!(off_1 < 0.01, "first off step should gate, rms {off_1}");
        assert!(on_2 > 0.3, "second on step should pass, rms {on_2}");
        assert!(off_2 < 0.01, "second off step should gate, rms {off_2}");
    }

    #[test]
    fn legato_glide_reaches_the_target_in_time() {
        let synth = basic_synth();
        synth.update_settings(|settings| {
            settings.global.mono = true;
            settings.global.legato = true;
            settings.global.glide_mode = GlideMode::Portamento;
            settings.global.glide_time = 0.5;
        });

        let _ = render(&synth, 0.1, &[note_on(0, 60, 1.0)]);
        // second note-on glides the existing voice instead of retriggering
        let _ = render(&synth, 0.25, &[note_on(0, 72, 1.0)]);
        {
            let state = synth.lock_state();
            let voice = state.voices.iter().find(|v| v.is_active()).unwrap();
            let midway = voice.current_note();
            assert!(
                midway > 64.0 && midway < 68.0,
                "expected the glide midway, got {midway}"
            );
            assert!(voice.amp_env_output() > 0.7, "legato must not retrigger");
        }

        let _ = render(&synth, 0.3, &[]);
        let state = synth.lock_state();
        let voice = state.voices.iter().find(|v| v.is_active()).unwrap();
        assert_eq!(voice.current_note(), 72.0);
    }

    #[test]
    fn glissando_steps_in_whole_semitones() {
        let synth = basic_synth();
        synth.update_settings(|settings| {
            settings.global.mono = true;
            settings.global.legato = true;
            settings.global.glide_mode = GlideMode::Glissando;
            settings.global.glide_time = 0.5;
        });

        let _ = render(&synth, 0.1, &[note_on(0, 60, 1.0)]);
        let _ = render(&synth, 0.2, &[note_on(0, 72, 1.0)]);

        let state = synth.lock_state();
        let voice = state.voices.iter().find(|v| v.is_active()).unwrap();
        // the smoothed note is fractional; the sounding pitch snaps to semitones,
        // which is observable through the unrounded glide staying inside the interval
        let current = voice.current_note();
        assert!((60.0..=72.0).contains(&current));
    }

    #[test]
    fn contended_lock_misses_the_block_and_resets() {
        let synth = basic_synth();
        let _ = render(&synth, 0.1, &[note_on(0, 60, 1.0)]);
        assert_eq!(synth.active_voice_count(), 1);

        {
            // a control thread holds the engine: the callback must not block
            let _guard = synth.state.try_lock().unwrap();
            let mut output = vec![1.0f32; 128 * 2];
            synth.process(&mut output, &[], &Transport::default());
            assert!(output.iter().all(|s| *s == 0.0), "missed block is silent");
        }

        // the next successful callback hard-resets all voices
        let mut output = vec![0.0f32; 128 * 2];
        synth.process(&mut output, &[], &Transport::default());
        assert_eq!(synth.active_voice_count(), 0);
    }

    #[test]
    fn posted_parameters_apply_at_block_start() {
        let synth = basic_synth();
        let ids = synth.param_ids();
        synth.post_parameter(ids.amp.sustain, 50.0).unwrap();
        assert!((synth.parameter_value(ids.amp.sustain) - 80.0).abs() < 1e-3);

        let mut output = vec![0.0f32; 32 * 2];
        synth.process(&mut output, &[], &Transport::default());
        assert!((synth.parameter_value(ids.amp.sustain) - 50.0).abs() < 1e-3);
    }

    #[test]
    fn failed_wavetable_swap_keeps_the_active_set() {
        let synth = basic_synth();
        assert!(synth.set_wavetable(0, &[0.0; 100], 2048).is_err());

        // the previous (factory) set still sounds
        let output = render(&synth, 0.2, &[note_on(0, 60, 1.0)]);
        assert!(rms(&output[output.len() / 2..]) > 0.1);

        // a valid swap is accepted and still sounds
        let saw: Vec<f32> = (0..2048).map(|i| i as f32 / 1024.0 - 1.0).collect();
        synth.set_wavetable(0, &saw, 2048).unwrap();
        let output = render(&synth, 0.2, &[note_on(4, 64, 1.0)]);
        assert!(rms(&output[output.len() / 2..]) > 0.05);
    }

    #[test]
    fn all_notes_off_releases_everything() {
        let synth = basic_synth();
        let events = [
            note_on(0, 60, 0.8),
            note_on(0, 64, 0.8),
            note_on(0, 67, 0.8),
        ];
        let _ = render(&synth, 0.1, &events);
        assert_eq!(synth.active_voice_count(), 3);

        let _ = render(&synth, 0.5, &[TimedEvent::new(0, NoteEvent::AllNotesOff)]);
        assert_eq!(synth.active_voice_count(), 0);
    }

    #[test]
    fn note_off_releases_and_recycles_the_voice() {
        let synth = basic_synth();
        let _ = render(&synth, 0.1, &[note_on(0, 60, 0.8)]);
        assert_eq!(synth.active_voice_count(), 1);

        // released voices keep sounding through the release tail, then recycle
        let _ = render(&synth, 0.05, &[note_off(0, 60)]);
        assert_eq!(synth.active_voice_count(), 1);
        let _ = render(&synth, 0.5, &[]);
        assert_eq!(synth.active_voice_count(), 0);
    }

    #[test]
    fn scope_receives_rendered_audio() {
        let synth = basic_synth();
        let reader = synth.scope_reader().unwrap();
        assert!(synth.scope_reader().is_none(), "reader is handed out once");

        let _ = render(&synth, 0.1, &[note_on(0, 60, 1.0)]);
        let mut tap = vec![0.0f32; 1024];
        assert!(reader.read(&mut tap) > 0);
        assert!(tap.iter().any(|s| s.abs() > 0.001));
    }
}
