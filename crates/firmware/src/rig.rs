//! The boards wired to this controller, and the voices laid out across them.

use voltaic_lib::{
    actuator::{BoardLocation, DeviceId, MuxSegment},
    configuration::EnvelopeSettings,
    envelope::{EnvelopeGenerator, GeneratorError, GroupId, VoiceId},
};

/// The bus configuration table. Logical devices are numbered densely in this order:
///
/// | devices | board                            |
/// |---------|----------------------------------|
/// | 0..8    | loudness DAC (MCP47FEB28)        |
/// | 8..12   | filter DAC (MCP4728)             |
/// | 12..20  | gate expander (PCF8574), muxed   |
/// | 20..24  | front panel pots (ADS1115)       |
pub const BOARDS: &[BoardLocation] = &[
    BoardLocation::analog_out(None, 0x60, 8, "VCA"),
    BoardLocation::analog_out(None, 0x61, 4, "VCF"),
    BoardLocation::digital_out(Some(MuxSegment { cluster: 0, slice: 0 }), 0x20, 8, "gates"),
    BoardLocation::analog_in(None, 0x48, 4, "pots"),
];

/// Number of notes which can sound at once.
pub const NOTE_CHANNELS: usize = 4;

/// Full scale of a 12-bit DAC.
pub const DAC_RANGE: f32 = 4095.0;

const VCA_FIRST: u16 = 0;
const VCF_FIRST: u16 = 8;
const GATE_FIRST: u16 = 12;

/// The pot which sets modulation depth.
pub const DEPTH_POT: DeviceId = DeviceId(20);

/// Gate output for note channel `channel`.
pub fn gate(channel: usize) -> DeviceId {
    DeviceId(GATE_FIRST + channel as u16)
}

/// Loudness contour: quick attack, gentle decay, held firmly at sustain.
pub const VCA: EnvelopeSettings = EnvelopeSettings {
    attack_ms: 8.0,
    decay_ms: 250.0,
    release_ms: 400.0,
    bottom: 0.0,
    top: 1.0,
    sustain: 0.8,
    dual_use: false,
};

/// Filter contour: slower sweep that settles lower.
pub const VCF: EnvelopeSettings = EnvelopeSettings {
    attack_ms: 40.0,
    decay_ms: 600.0,
    release_ms: 300.0,
    bottom: 0.1,
    top: 0.9,
    sustain: 0.4,
    dual_use: true,
};

/// The pair of voices shaping one note.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoteVoices {
    /// Loudness.
    pub vca: VoiceId,
    /// Filter cutoff.
    pub vcf: VoiceId,
}

/// Every voice of the rig, by note channel, and the groups counting them.
#[derive(Debug, Default, Clone, Copy)]
pub struct Voicing {
    /// Voices per note channel.
    pub notes: [NoteVoices; NOTE_CHANNELS],
    /// Counts sounding loudness voices.
    pub vca_group: GroupId,
    /// Counts sounding filter voices.
    pub vcf_group: GroupId,
}

/// Creates the rig's voices in `generator` and shapes them with the default presets.
pub fn build_voices(generator: &mut EnvelopeGenerator) -> Result<Voicing, GeneratorError> {
    let mut voicing = Voicing {
        vca_group: generator.new_group()?,
        vcf_group: generator.new_group()?,
        ..Voicing::default()
    };

    for (channel, note) in voicing.notes.iter_mut().enumerate() {
        let index = channel as u8;
        let offset = channel as u16;
        note.vca = generator.new_voice(
            index,
            "VCA",
            DeviceId(VCA_FIRST + offset),
            DAC_RANGE,
            voicing.vca_group,
        )?;
        note.vcf = generator.new_voice(
            index,
            "VCF",
            DeviceId(VCF_FIRST + offset),
            DAC_RANGE,
            voicing.vcf_group,
        )?;

        for (voice, preset) in [(note.vca, VCA), (note.vcf, VCF)] {
            if let Some(envelope) = generator.voice_mut(voice) {
                preset.apply(envelope);
            }
        }
    }
    Ok(voicing)
}
