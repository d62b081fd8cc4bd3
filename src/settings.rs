//! Plain (non-modulatable) engine configuration: enables, wave and mode selections,
//! patterns, voicing behavior. Modulatable scalars live in the modulation matrix as
//! destination parameters instead.

use strum::{Display, EnumIter, EnumString};

use crate::{
    effect::{distortion::DistortionMode, gate::NUM_GATE_STEPS, FxSlot, DEFAULT_FX_ORDER, NUM_FX_SLOTS},
    filter::FilterMode,
    lfo::{LfoShape, MAX_STEP_LFO_STEPS},
    oscillator::{AnalogWave, NoiseType, MAX_UNISON},
    utils::tempo::NoteDuration,
    MAX_VOICES,
};

// -------------------------------------------------------------------------------------------------

/// Number of wavetable oscillator units per voice.
pub const NUM_OSCS: usize = 2;
/// Number of auxiliary modulation envelopes per voice.
pub const NUM_ENVS: usize = 3;
/// Number of LFOs (each with a mono and a poly instance).
pub const NUM_LFOS: usize = 3;

// -------------------------------------------------------------------------------------------------

/// Pitch glide behavior between successive notes.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Display, EnumIter, EnumString)]
pub enum GlideMode {
    #[default]
    Off,
    /// Stepped glide: the glided pitch snaps to whole semitones.
    Glissando,
    /// Continuous glide.
    Portamento,
}

// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OscSettings {
    pub enabled: bool,
    /// Deterministic unison phases on note start; false randomizes them per note.
    pub retrigger: bool,
    pub unison: usize,
    /// Route this unit through the voice filter (false bypasses it).
    pub through_filter: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubSettings {
    pub enabled: bool,
    pub retrigger: bool,
    pub wave: AnalogWave,
    pub through_filter: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseSettings {
    pub enabled: bool,
    pub noise_type: NoiseType,
    pub through_filter: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSettings {
    pub enabled: bool,
    /// Restart the filter envelope on legato retriggers.
    pub retrigger: bool,
    pub mode: FilterMode,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvSettings {
    pub enabled: bool,
    pub retrigger: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LfoSettings {
    pub enabled: bool,
    /// Deterministic phase on note start for the poly instance; false randomizes.
    pub retrigger: bool,
    pub shape: LfoShape,
    /// Use `beat` against the host tempo instead of the free rate parameter.
    pub tempo_sync: bool,
    /// Index into [`NoteDuration::durations`].
    pub beat: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLfoSettings {
    pub enabled: bool,
    pub retrigger: bool,
    /// Index into [`NoteDuration::durations`]; one step per duration.
    pub beat: usize,
    /// Active steps, 2..=MAX_STEP_LFO_STEPS.
    pub length: usize,
    /// Per-step levels, -1..=1.
    pub levels: [f32; MAX_STEP_LFO_STEPS],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmpSettings {
    /// Restart the amplitude envelope from zero on mono retriggers.
    pub retrigger: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateSettings {
    pub enabled: bool,
    /// Index into [`NoteDuration::durations`]; one gate step per duration.
    pub beat: usize,
    /// Active steps, 2..=NUM_GATE_STEPS.
    pub length: usize,
    pub steps_left: [bool; NUM_GATE_STEPS],
    pub steps_right: [bool; NUM_GATE_STEPS],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FxSettings {
    /// User-configured effect order.
    pub order: [FxSlot; NUM_FX_SLOTS],
    pub distortion_mode: DistortionMode,
    pub chorus_enabled: bool,
    pub distortion_enabled: bool,
    pub delay_enabled: bool,
    /// Sync the delay time to `delay_beat` instead of the free time parameter.
    pub delay_sync: bool,
    pub delay_beat: usize,
    pub eq_enabled: bool,
    pub dynamics_enabled: bool,
    pub reverb_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalSettings {
    /// Mono mode: a single sounding voice, new notes retrigger or glide it.
    pub mono: bool,
    /// In mono mode, overlapping notes glide instead of retriggering envelopes.
    pub legato: bool,
    pub glide_mode: GlideMode,
    /// Glide time in seconds: the time to reach a new note target.
    pub glide_time: f32,
    /// Active voice cap, 1..=MAX_VOICES.
    pub max_voices: usize,
    /// Honor MPE per-note expression events.
    pub mpe: bool,
    /// Pitch bend range in semitones for the wheel and per-note bends.
    pub pitch_bend_range: f32,
}

// -------------------------------------------------------------------------------------------------

/// The complete non-modulatable engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthSettings {
    pub oscs: [OscSettings; NUM_OSCS],
    pub sub: SubSettings,
    pub noise: NoiseSettings,
    pub filter: FilterSettings,
    pub envs: [EnvSettings; NUM_ENVS],
    pub lfos: [LfoSettings; NUM_LFOS],
    pub step_lfo: StepLfoSettings,
    pub amp: AmpSettings,
    pub gate: GateSettings,
    pub fx: FxSettings,
    pub global: GlobalSettings,
}

impl Default for SynthSettings {
    fn default() -> Self {
        let osc = OscSettings {
            enabled: false,
            retrigger: false,
            unison: 1,
            through_filter: true,
        };
        let mut gate_steps = [false; NUM_GATE_STEPS];
        for (index, step) in gate_steps.iter_mut().enumerate() {
            *step = index % 2 == 0 || index % 5 == 0;
        }
        Self {
            oscs: [
                OscSettings {
                    enabled: true,
                    ..osc
                },
                osc,
            ],
            sub: SubSettings {
                enabled: false,
                retrigger: false,
                wave: AnalogWave::Triangle,
                through_filter: true,
            },
            noise: NoiseSettings {
                enabled: false,
                noise_type: NoiseType::White,
                through_filter: true,
            },
            filter: FilterSettings {
                enabled: true,
                retrigger: true,
                mode: FilterMode::Lowpass12,
            },
            envs: [EnvSettings {
                enabled: false,
                retrigger: true,
            }; NUM_ENVS],
            lfos: [LfoSettings {
                enabled: false,
                retrigger: true,
                shape: LfoShape::Sine,
                tempo_sync: false,
                beat: NoteDuration::QUARTER,
            }; NUM_LFOS],
            step_lfo: StepLfoSettings {
                enabled: false,
                retrigger: true,
                beat: NoteDuration::QUARTER,
                length: 8,
                levels: [0.0; MAX_STEP_LFO_STEPS],
            },
            amp: AmpSettings { retrigger: true },
            gate: GateSettings {
                enabled: false,
                beat: NoteDuration::EIGHTH,
                length: 8,
                steps_left: gate_steps,
                steps_right: gate_steps,
            },
            fx: FxSettings {
                order: DEFAULT_FX_ORDER,
                distortion_mode: DistortionMode::Shaper,
                chorus_enabled: false,
                distortion_enabled: false,
                delay_enabled: false,
                delay_sync: false,
                delay_beat: NoteDuration::QUARTER,
                eq_enabled: false,
                dynamics_enabled: false,
                reverb_enabled: false,
            },
            global: GlobalSettings {
                mono: false,
                legato: false,
                glide_mode: GlideMode::Off,
                glide_time: 0.3,
                max_voices: 40,
                mpe: false,
                pitch_bend_range: 2.0,
            },
        }
    }
}

impl SynthSettings {
    /// Clamp every field that has numeric limits into its valid range.
    pub(crate) fn sanitize(&mut self) {
        for osc in &mut self.oscs {
            osc.unison = osc.unison.clamp(1, MAX_UNISON);
        }
        self.step_lfo.length = self.step_lfo.length.clamp(2, MAX_STEP_LFO_STEPS);
        self.gate.length = self.gate.length.clamp(2, NUM_GATE_STEPS);
        self.global.max_voices = self.global.max_voices.clamp(1, MAX_VOICES);
        self.global.glide_time = self.global.glide_time.clamp(0.001, 20.0);
        self.global.pitch_bend_range = self.global.pitch_bend_range.clamp(0.0, 48.0);
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = SynthSettings::default();
        assert!(settings.oscs[0].enabled);
        assert!(!settings.oscs[1].enabled);
        assert!(settings.filter.enabled);
        assert!(!settings.global.mono);
        assert_eq!(settings.global.max_voices, 40);
        assert_eq!(settings.fx.order, DEFAULT_FX_ORDER);
    }

    #[test]
    fn sanitize_clamps_ranges() {
        let mut settings = SynthSettings::default();
        settings.oscs[0].unison = 100;
        settings.global.max_voices = 0;
        settings.gate.length = 1;
        settings.sanitize();
        assert_eq!(settings.oscs[0].unison, MAX_UNISON);
        assert_eq!(settings.global.max_voices, 1);
        assert_eq!(settings.gate.length, 2);
    }
}
