//! Registration of all modulation sources and destination parameters.
//!
//! Everything here runs once at engine construction. The registration order of the
//! destinations is significant: all poly-eligible (per-voice) parameters come first, the
//! master level parameter marks the start of the mono-only block (global and effect
//! parameters), mirroring how the matrix disambiguates per-voice vs. shared resolution.

use four_cc::FourCC;

use crate::{
    effect::eq::{EQ_GAIN_RANGE_DB, NUM_EQ_BANDS},
    modulation::{matrix::ModMatrix, ModSourceId, ParamId},
    parameter::{FloatParameter, ParameterScaling},
    settings::{NUM_ENVS, NUM_LFOS, NUM_OSCS},
};

// -------------------------------------------------------------------------------------------------

/// Number of MIDI continuous controllers exposed as mono modulation sources.
pub const NUM_CC_SOURCES: usize = 120;

/// Typed handles to every registered modulation source.
#[derive(Debug, Clone)]
pub struct ModSources {
    // poly sources, one value per voice
    pub velocity: ModSourceId,
    pub note: ModSourceId,
    pub pressure: ModSourceId,
    pub timbre: ModSourceId,
    pub note_pitchbend: ModSourceId,
    pub filter_env: ModSourceId,
    pub envs: [ModSourceId; NUM_ENVS],
    pub lfos: [ModSourceId; NUM_LFOS],
    pub step_lfo: ModSourceId,
    // mono sources, one value for the whole instrument
    pub pitch_wheel: ModSourceId,
    pub mono_lfos: [ModSourceId; NUM_LFOS],
    pub mono_step_lfo: ModSourceId,
    pub cc: [ModSourceId; NUM_CC_SOURCES],
}

pub(crate) fn register_sources(matrix: &mut ModMatrix) -> ModSources {
    let poly = |matrix: &mut ModMatrix, id: &[u8; 4], name: &str, bipolar| {
        matrix.add_poly_source(FourCC(*id), name.to_string(), bipolar)
    };
    let mono = |matrix: &mut ModMatrix, id: &[u8; 4], name: &str, bipolar| {
        matrix.add_mono_source(FourCC(*id), name.to_string(), bipolar)
    };

    let velocity = poly(matrix, b"vel ", "MIDI Velocity", false);
    let note = poly(matrix, b"note", "MIDI Note Number", false);
    let pressure = poly(matrix, b"mpep", "MPE Pressure", false);
    let timbre = poly(matrix, b"mpet", "MPE Timbre", false);
    let note_pitchbend = poly(matrix, b"mpeb", "MPE Pitch Bend", true);
    let filter_env = poly(matrix, b"fenv", "Filter Envelope", false);

    let mut envs = [ModSourceId(0); NUM_ENVS];
    for (index, env) in envs.iter_mut().enumerate() {
        let id = [b'e', b'n', b'v', b'1' + index as u8];
        *env = poly(matrix, &id, &format!("Envelope {}", index + 1), false);
    }
    let mut lfos = [ModSourceId(0); NUM_LFOS];
    for (index, lfo) in lfos.iter_mut().enumerate() {
        let id = [b'l', b'f', b'o', b'1' + index as u8];
        *lfo = poly(matrix, &id, &format!("LFO {}", index + 1), true);
    }
    let step_lfo = poly(matrix, b"step", "Step LFO", true);

    let pitch_wheel = mono(matrix, b"pb  ", "Pitch Bend", true);
    let mut mono_lfos = [ModSourceId(0); NUM_LFOS];
    for (index, lfo) in mono_lfos.iter_mut().enumerate() {
        let id = [b'm', b'l', b'f', b'1' + index as u8];
        *lfo = mono(matrix, &id, &format!("LFO {} (Mono)", index + 1), true);
    }
    let mono_step_lfo = mono(matrix, b"mstp", "Step LFO (Mono)", true);

    let mut cc = [ModSourceId(0); NUM_CC_SOURCES];
    for (index, source) in cc.iter_mut().enumerate() {
        let id = [b'c', b'c', b'0' + (index / 10) as u8, b'0' + (index % 10) as u8];
        *source = mono(matrix, &id, &format!("CC {index}"), false);
    }

    ModSources {
        velocity,
        note,
        pressure,
        timbre,
        note_pitchbend,
        filter_env,
        envs,
        lfos,
        step_lfo,
        pitch_wheel,
        mono_lfos,
        mono_step_lfo,
        cc,
    }
}

// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OscParamIds {
    /// Coarse tune in semitones.
    pub tune: ParamId,
    /// Fine tune in cents.
    pub finetune: ParamId,
    /// Level in dB.
    pub level: ParamId,
    /// Wavetable morph position in percent.
    pub position: ParamId,
    /// Unison detune in +/- semitones.
    pub detune: ParamId,
    /// Unison stereo spread in percent.
    pub spread: ParamId,
    pub pan: ParamId,
    pub formant: ParamId,
    pub bend: ParamId,
}

#[derive(Debug, Clone)]
pub struct SubParamIds {
    pub tune: ParamId,
    pub level: ParamId,
    pub pan: ParamId,
}

#[derive(Debug, Clone)]
pub struct NoiseParamIds {
    pub level: ParamId,
    pub pan: ParamId,
}

#[derive(Debug, Clone)]
pub struct FilterParamIds {
    /// Key tracking amount in percent.
    pub key_tracking: ParamId,
    /// Velocity sensitivity of the envelope amount in percent.
    pub velocity_tracking: ParamId,
    /// Base cutoff in MIDI note space.
    pub frequency: ParamId,
    /// Resonance in percent.
    pub resonance: ParamId,
    /// Envelope amount, -1..=1 of the full cutoff range.
    pub env_amount: ParamId,
    pub attack: ParamId,
    pub decay: ParamId,
    pub sustain: ParamId,
    pub release: ParamId,
}

#[derive(Debug, Clone)]
pub struct EnvParamIds {
    pub attack: ParamId,
    pub decay: ParamId,
    pub sustain: ParamId,
    pub release: ParamId,
}

#[derive(Debug, Clone)]
pub struct LfoParamIds {
    /// Free rate in Hz.
    pub rate: ParamId,
    pub phase: ParamId,
    pub offset: ParamId,
    pub depth: ParamId,
    pub fade: ParamId,
    pub delay: ParamId,
}

#[derive(Debug, Clone)]
pub struct AmpParamIds {
    pub attack: ParamId,
    pub decay: ParamId,
    pub sustain: ParamId,
    pub release: ParamId,
    pub velocity_tracking: ParamId,
}

#[derive(Debug, Clone)]
pub struct GateParamIds {
    pub attack: ParamId,
    pub release: ParamId,
}

#[derive(Debug, Clone)]
pub struct ChorusParamIds {
    /// Base delay in ms.
    pub delay: ParamId,
    /// Modulation depth in ms.
    pub depth: ParamId,
    /// Rate in Hz.
    pub rate: ParamId,
    pub width: ParamId,
    pub mix: ParamId,
}

#[derive(Debug, Clone)]
pub struct DistortionParamIds {
    pub amount: ParamId,
    pub crush_rate: ParamId,
    pub crush_rez: ParamId,
    pub crush_hard: ParamId,
    pub crush_mix: ParamId,
    pub fire_gain: ParamId,
    pub fire_tone: ParamId,
    pub fire_output: ParamId,
    pub fire_mix: ParamId,
    pub grind_gain: ParamId,
    pub grind_tone: ParamId,
    pub grind_output: ParamId,
    pub grind_mix: ParamId,
}

#[derive(Debug, Clone)]
pub struct DelayParamIds {
    /// Free delay time in seconds.
    pub time: ParamId,
    pub feedback: ParamId,
    pub cross_feedback: ParamId,
    pub mix: ParamId,
}

#[derive(Debug, Clone)]
pub struct EqParamIds {
    /// Band gains in dB, low shelf / three bells / high shelf.
    pub gains: [ParamId; NUM_EQ_BANDS],
}

#[derive(Debug, Clone)]
pub struct DynamicsParamIds {
    pub threshold: ParamId,
    pub ratio: ParamId,
    pub attack: ParamId,
    pub release: ParamId,
    pub makeup: ParamId,
}

#[derive(Debug, Clone)]
pub struct ReverbParamIds {
    pub size: ParamId,
    pub decay: ParamId,
    pub lowpass: ParamId,
    pub damping: ParamId,
    pub predelay: ParamId,
    pub mix: ParamId,
}

/// Typed handles to every registered destination parameter.
#[derive(Debug, Clone)]
pub struct ParamIds {
    pub oscs: [OscParamIds; NUM_OSCS],
    pub sub: SubParamIds,
    pub noise: NoiseParamIds,
    pub filter: FilterParamIds,
    pub envs: [EnvParamIds; NUM_ENVS],
    pub lfos: [LfoParamIds; NUM_LFOS],
    pub amp: AmpParamIds,
    /// Master output level in dB. The first mono destination: everything registered
    /// from here on resolves once per block for the whole instrument.
    pub level: ParamId,
    pub gate: GateParamIds,
    pub chorus: ChorusParamIds,
    pub distortion: DistortionParamIds,
    pub delay: DelayParamIds,
    pub eq: EqParamIds,
    pub dynamics: DynamicsParamIds,
    pub reverb: ReverbParamIds,
}

// -------------------------------------------------------------------------------------------------

/// The time scaling used for all envelope segment parameters.
const TIME_SCALING: ParameterScaling = ParameterScaling::Skewed(0.2);
/// The level scaling used for all dB level parameters.
const LEVEL_SCALING: ParameterScaling = ParameterScaling::Skewed(4.0);

const OSC_NAMES: [[&str; 9]; NUM_OSCS] = [
    [
        "OSC1 Tune", "OSC1 Fine Tune", "OSC1 Level", "OSC1 Pos", "OSC1 Detune", "OSC1 Spread",
        "OSC1 Pan", "OSC1 Formant", "OSC1 Bend",
    ],
    [
        "OSC2 Tune", "OSC2 Fine Tune", "OSC2 Level", "OSC2 Pos", "OSC2 Detune", "OSC2 Spread",
        "OSC2 Pan", "OSC2 Formant", "OSC2 Bend",
    ],
];

const ENV_NAMES: [[&str; 4]; NUM_ENVS] = [
    ["ENV1 Attack", "ENV1 Decay", "ENV1 Sustain", "ENV1 Release"],
    ["ENV2 Attack", "ENV2 Decay", "ENV2 Sustain", "ENV2 Release"],
    ["ENV3 Attack", "ENV3 Decay", "ENV3 Sustain", "ENV3 Release"],
];

const LFO_NAMES: [[&str; 6]; NUM_LFOS] = [
    ["LFO1 Rate", "LFO1 Phase", "LFO1 Offset", "LFO1 Depth", "LFO1 Fade", "LFO1 Delay"],
    ["LFO2 Rate", "LFO2 Phase", "LFO2 Offset", "LFO2 Depth", "LFO2 Fade", "LFO2 Delay"],
    ["LFO3 Rate", "LFO3 Phase", "LFO3 Offset", "LFO3 Depth", "LFO3 Fade", "LFO3 Delay"],
];

const EQ_NAMES: [&str; NUM_EQ_BANDS] = [
    "EQ Low Gain",
    "EQ Low Mid Gain",
    "EQ Mid Gain",
    "EQ High Mid Gain",
    "EQ High Gain",
];

/// Highest filter cutoff expressed in MIDI note space (the note of 20 kHz).
pub(crate) const FILTER_NOTE_RANGE: f32 = 135.0;

pub(crate) fn register_parameters(matrix: &mut ModMatrix) -> ParamIds {
    let oscs = std::array::from_fn(|index| {
        let names = &OSC_NAMES[index];
        let id = |suffix: &[u8; 2]| FourCC([b'o', b'1' + index as u8, suffix[0], suffix[1]]);
        let poly = true;
        OscParamIds {
            tune: matrix.add_parameter(
                FloatParameter::new(id(b"tn"), names[0], -36.0..=36.0, 0.0).with_unit("st"),
                poly,
            ),
            finetune: matrix.add_parameter(
                FloatParameter::new(id(b"ft"), names[1], -100.0..=100.0, 0.0).with_unit("ct"),
                poly,
            ),
            level: matrix.add_parameter(
                FloatParameter::new(id(b"lv"), names[2], -100.0..=0.0, 0.0)
                    .with_unit("dB")
                    .with_scaling(LEVEL_SCALING),
                poly,
            ),
            position: matrix.add_parameter(
                FloatParameter::new(id(b"ps"), names[3], 0.0..=100.0, 0.0).with_unit("%"),
                poly,
            ),
            detune: matrix.add_parameter(
                FloatParameter::new(id(b"dt"), names[4], 0.0..=0.5, 0.0).with_unit("st"),
                poly,
            ),
            spread: matrix.add_parameter(
                FloatParameter::new(id(b"sp"), names[5], -100.0..=100.0, 0.0).with_unit("%"),
                poly,
            ),
            pan: matrix.add_parameter(
                FloatParameter::new(id(b"pn"), names[6], -1.0..=1.0, 0.0),
                poly,
            ),
            formant: matrix.add_parameter(
                FloatParameter::new(id(b"fm"), names[7], -1.0..=1.0, 0.0),
                poly,
            ),
            bend: matrix.add_parameter(
                FloatParameter::new(id(b"bd"), names[8], -1.0..=1.0, 0.0),
                poly,
            ),
        }
    });

    let sub = SubParamIds {
        tune: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"sbtn"), "SUB Tune", -36.0..=36.0, -12.0).with_unit("st"),
            true,
        ),
        level: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"sblv"), "SUB Level", -100.0..=0.0, 0.0)
                .with_unit("dB")
                .with_scaling(LEVEL_SCALING),
            true,
        ),
        pan: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"sbpn"), "SUB Pan", -1.0..=1.0, 0.0),
            true,
        ),
    };

    let noise = NoiseParamIds {
        level: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"nslv"), "Noise Level", -100.0..=0.0, 0.0)
                .with_unit("dB")
                .with_scaling(LEVEL_SCALING),
            true,
        ),
        pan: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"nspn"), "Noise Pan", -1.0..=1.0, 0.0),
            true,
        ),
    };

    let filter = FilterParamIds {
        key_tracking: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"flky"), "FLT Key", 0.0..=100.0, 0.0).with_unit("%"),
            true,
        ),
        velocity_tracking: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"flvl"), "FLT Vel", 0.0..=100.0, 0.0).with_unit("%"),
            true,
        ),
        frequency: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"flfq"), "FLT Freq", 0.0..=FILTER_NOTE_RANGE, 64.0),
            true,
        ),
        resonance: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"flrs"), "FLT Res", 0.0..=100.0, 0.0).with_unit("%"),
            true,
        ),
        env_amount: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"flam"), "FLT Amount", -1.0..=1.0, 0.0),
            true,
        ),
        attack: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"flat"), "FLT Attack", 0.0..=60.0, 0.1)
                .with_unit("s")
                .with_scaling(TIME_SCALING),
            true,
        ),
        decay: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"fldc"), "FLT Decay", 0.0..=60.0, 0.1)
                .with_unit("s")
                .with_scaling(TIME_SCALING),
            true,
        ),
        sustain: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"flsu"), "FLT Sustain", 0.0..=100.0, 80.0).with_unit("%"),
            true,
        ),
        release: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"flrl"), "FLT Release", 0.0..=60.0, 0.1)
                .with_unit("s")
                .with_scaling(TIME_SCALING),
            true,
        ),
    };

    let envs = std::array::from_fn(|index| {
        let names = &ENV_NAMES[index];
        let id = |suffix: u8| FourCC([b'e', b'1' + index as u8, suffix, b' ']);
        EnvParamIds {
            attack: matrix.add_parameter(
                FloatParameter::new(id(b'a'), names[0], 0.0..=60.0, 0.1)
                    .with_unit("s")
                    .with_scaling(TIME_SCALING),
                true,
            ),
            decay: matrix.add_parameter(
                FloatParameter::new(id(b'd'), names[1], 0.0..=60.0, 0.1)
                    .with_unit("s")
                    .with_scaling(TIME_SCALING),
                true,
            ),
            sustain: matrix.add_parameter(
                FloatParameter::new(id(b's'), names[2], 0.0..=100.0, 80.0).with_unit("%"),
                true,
            ),
            release: matrix.add_parameter(
                FloatParameter::new(id(b'r'), names[3], 0.0..=60.0, 0.1)
                    .with_unit("s")
                    .with_scaling(TIME_SCALING),
                true,
            ),
        }
    });

    let lfos = std::array::from_fn(|index| {
        let names = &LFO_NAMES[index];
        let id = |suffix: &[u8; 2]| FourCC([b'l', b'1' + index as u8, suffix[0], suffix[1]]);
        LfoParamIds {
            rate: matrix.add_parameter(
                FloatParameter::new(id(b"rt"), names[0], 0.0..=50.0, 10.0)
                    .with_unit("Hz")
                    .with_scaling(ParameterScaling::Skewed(0.3)),
                true,
            ),
            phase: matrix.add_parameter(
                FloatParameter::new(id(b"ph"), names[1], -1.0..=1.0, 0.0),
                true,
            ),
            offset: matrix.add_parameter(
                FloatParameter::new(id(b"of"), names[2], -1.0..=1.0, 0.0),
                true,
            ),
            depth: matrix.add_parameter(
                FloatParameter::new(id(b"dp"), names[3], -1.0..=1.0, 1.0),
                true,
            ),
            fade: matrix.add_parameter(
                FloatParameter::new(id(b"fd"), names[4], -60.0..=60.0, 0.0).with_unit("s"),
                true,
            ),
            delay: matrix.add_parameter(
                FloatParameter::new(id(b"dl"), names[5], 0.0..=60.0, 0.0)
                    .with_unit("s")
                    .with_scaling(TIME_SCALING),
                true,
            ),
        }
    });

    let amp = AmpParamIds {
        attack: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"amat"), "Attack", 0.0..=60.0, 0.1)
                .with_unit("s")
                .with_scaling(TIME_SCALING),
            true,
        ),
        decay: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"amdc"), "Decay", 0.0..=60.0, 0.1)
                .with_unit("s")
                .with_scaling(TIME_SCALING),
            true,
        ),
        sustain: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"amsu"), "Sustain", 0.0..=100.0, 80.0).with_unit("%"),
            true,
        ),
        release: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"amrl"), "Release", 0.0..=60.0, 0.1)
                .with_unit("s")
                .with_scaling(TIME_SCALING),
            true,
        ),
        velocity_tracking: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"amvt"), "Vel", 0.0..=100.0, 100.0).with_unit("%"),
            true,
        ),
    };

    // master level marks the mono/poly split: mono-only destinations from here on
    let level = matrix.add_parameter(
        FloatParameter::new(FourCC(*b"levl"), "Level", -100.0..=0.0, 0.0)
            .with_unit("dB")
            .with_scaling(LEVEL_SCALING),
        false,
    );

    let gate = GateParamIds {
        attack: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"gtat"), "Gate Attack", 0.0..=1.0, 0.1)
                .with_unit("s")
                .with_scaling(TIME_SCALING),
            false,
        ),
        release: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"gtrl"), "Gate Release", 0.0..=1.0, 0.1)
                .with_unit("s")
                .with_scaling(TIME_SCALING),
            false,
        ),
    };

    let chorus = ChorusParamIds {
        delay: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"chdl"), "Chorus Delay", 0.1..=30.0, 1.0).with_unit("ms"),
            false,
        ),
        depth: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"chdp"), "Chorus Depth", 0.1..=20.0, 1.0).with_unit("ms"),
            false,
        ),
        rate: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"chrt"), "Chorus Speed", 0.1..=10.0, 3.0).with_unit("Hz"),
            false,
        ),
        width: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"chwd"), "Chorus Width", 0.0..=1.0, 0.5),
            false,
        ),
        mix: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"chmx"), "Chorus Mix", 0.0..=1.0, 0.5),
            false,
        ),
    };

    let unit_param = |id: &[u8; 4], name: &'static str, default: f32| {
        FloatParameter::new(FourCC(*id), name, 0.0..=1.0, default)
    };
    let distortion = DistortionParamIds {
        amount: matrix.add_parameter(unit_param(b"dsam", "Dist Amount", 0.2), false),
        crush_rate: matrix.add_parameter(unit_param(b"crrt", "Crush Rate", 0.5), false),
        crush_rez: matrix.add_parameter(unit_param(b"crrz", "Crush Rez", 0.5), false),
        crush_hard: matrix.add_parameter(unit_param(b"crhd", "Crush Hard", 0.8), false),
        crush_mix: matrix.add_parameter(unit_param(b"crmx", "Crush Mix", 1.0), false),
        fire_gain: matrix.add_parameter(unit_param(b"fagn", "Fire Gain", 0.5), false),
        fire_tone: matrix.add_parameter(unit_param(b"fatn", "Fire Tone", 0.5), false),
        fire_output: matrix.add_parameter(unit_param(b"faot", "Fire Output", 0.8), false),
        fire_mix: matrix.add_parameter(unit_param(b"famx", "Fire Mix", 1.0), false),
        grind_gain: matrix.add_parameter(unit_param(b"gagn", "Grind Gain", 0.5), false),
        grind_tone: matrix.add_parameter(unit_param(b"gatn", "Grind Tone", 0.5), false),
        grind_output: matrix.add_parameter(unit_param(b"gaot", "Grind Output", 0.8), false),
        grind_mix: matrix.add_parameter(unit_param(b"gamx", "Grind Mix", 1.0), false),
    };

    let delay = DelayParamIds {
        time: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"dltm"), "Delay Time", 0.001..=4.0, 0.25)
                .with_unit("s")
                .with_scaling(ParameterScaling::Skewed(0.3)),
            false,
        ),
        feedback: matrix.add_parameter(unit_param(b"dlfb", "Delay FB", 0.3), false),
        cross_feedback: matrix.add_parameter(unit_param(b"dlcf", "Delay CF", 0.0), false),
        mix: matrix.add_parameter(unit_param(b"dlmx", "Delay Mix", 0.5), false),
    };

    let eq = EqParamIds {
        gains: std::array::from_fn(|index| {
            let id = FourCC([b'e', b'q', b'1' + index as u8, b'g']);
            matrix.add_parameter(
                FloatParameter::new(id, EQ_NAMES[index], -EQ_GAIN_RANGE_DB..=EQ_GAIN_RANGE_DB, 0.0)
                    .with_unit("dB"),
                false,
            )
        }),
    };

    let dynamics = DynamicsParamIds {
        threshold: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"dyth"), "Dyn Threshold", -60.0..=0.0, -12.0)
                .with_unit("dB"),
            false,
        ),
        ratio: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"dyra"), "Dyn Ratio", 1.0..=20.0, 4.0)
                .with_scaling(ParameterScaling::Skewed(0.5)),
            false,
        ),
        attack: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"dyat"), "Dyn Attack", 0.0..=1.0, 0.01)
                .with_unit("s")
                .with_scaling(TIME_SCALING),
            false,
        ),
        release: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"dyrl"), "Dyn Release", 0.0..=1.0, 0.1)
                .with_unit("s")
                .with_scaling(TIME_SCALING),
            false,
        ),
        makeup: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"dymk"), "Dyn Makeup", -24.0..=24.0, 0.0).with_unit("dB"),
            false,
        ),
    };

    let reverb = ReverbParamIds {
        size: matrix.add_parameter(unit_param(b"rvsz", "Reverb Size", 0.5), false),
        decay: matrix.add_parameter(unit_param(b"rvdc", "Reverb Decay", 0.5), false),
        lowpass: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"rvlp"), "Reverb Lowpass", 16.0..=20000.0, 10000.0)
                .with_unit("Hz")
                .with_scaling(ParameterScaling::Skewed(0.3)),
            false,
        ),
        damping: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"rvdm"), "Reverb Damping", 16.0..=20000.0, 10000.0)
                .with_unit("Hz")
                .with_scaling(ParameterScaling::Skewed(0.3)),
            false,
        ),
        predelay: matrix.add_parameter(
            FloatParameter::new(FourCC(*b"rvpd"), "Reverb Predelay", 0.0..=0.1, 0.0)
                .with_unit("s"),
            false,
        ),
        mix: matrix.add_parameter(unit_param(b"rvmx", "Reverb Mix", 0.3), false),
    };

    ParamIds {
        oscs,
        sub,
        noise,
        filter,
        envs,
        lfos,
        amp,
        level,
        gate,
        chorus,
        distortion,
        delay,
        eq,
        dynamics,
        reverb,
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_produces_unique_ids() {
        let mut matrix = ModMatrix::new(48000);
        let sources = register_sources(&mut matrix);
        let params = register_parameters(&mut matrix);
        matrix.build(2);

        // all parameter FourCCs are unique
        let mut ids: Vec<FourCC> = matrix.parameters().map(|(_, p)| p.id()).collect();
        let count = ids.len();
        ids.sort_by_key(|id| id.0);
        ids.dedup();
        assert_eq!(ids.len(), count, "duplicate parameter FourCC registered");

        // all source FourCCs are unique
        let mut source_ids: Vec<FourCC> = matrix.sources().map(|(_, s)| s.id()).collect();
        let source_count = source_ids.len();
        source_ids.sort_by_key(|id| id.0);
        source_ids.dedup();
        assert_eq!(source_ids.len(), source_count, "duplicate source FourCC");

        // well known handles resolve
        assert_eq!(matrix.find_parameter(FourCC(*b"levl")), Some(params.level));
        assert_eq!(matrix.find_source(FourCC(*b"vel ")), Some(sources.velocity));
    }

    #[test]
    fn voice_parameters_precede_the_mono_split() {
        let mut matrix = ModMatrix::new(48000);
        let _sources = register_sources(&mut matrix);
        let params = register_parameters(&mut matrix);
        matrix.build(1);

        // every per-voice parameter id is smaller than the split marker
        assert!(params.oscs[1].bend.0 < params.level.0);
        assert!(params.amp.velocity_tracking.0 < params.level.0);
        // every effect parameter follows it
        assert!(params.reverb.mix.0 > params.level.0);
        assert!(params.gate.attack.0 > params.level.0);
    }
}
