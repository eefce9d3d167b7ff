//! Packed DX7 voice data
//!
//! A bulk dump is 32 voices of 128 bytes each. Operators are stored in
//! reverse order: the first 17-byte record in a voice is operator 6.

use serde::{Deserialize, Serialize};

use super::FormatError;

/// Size of a 32-voice bulk dump.
pub const BULK_DUMP_LENGTH: usize = 4096;

/// Number of voices in a bulk dump.
pub const VOICE_COUNT: usize = 32;

/// Size of one packed voice.
pub const VOICE_LENGTH: usize = 128;

/// Number of operators in a DX7 voice.
pub const OPERATOR_COUNT: usize = 6;

/// Size of one packed operator record.
pub const OP_DATA_LENGTH: usize = 17;

const GLOBALS_OFFSET: usize = OP_DATA_LENGTH * OPERATOR_COUNT;
const NAME_LENGTH: usize = 10;

/// All parameters of a single DX7 voice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkDump {
    /// Operators 1 to 6, in that order
    pub ops: Vec<Op>,
    pub pitch_eg: Eg,
    /// Raw algorithm number, 0-31
    pub algorithm: i8,
    pub osc_key_sync: bool,
    pub feedback: i8,
    pub lfo: Lfo,
    pub transpose: i8,
    pub name: String,
}

impl BulkDump {
    /// Decode the first voice of a bulk dump
    pub fn parse(data: &[u8]) -> Result<Self, FormatError> {
        check_length(data)?;
        Ok(Self::from_voice(&data[..VOICE_LENGTH]))
    }

    /// Decode every voice of a bulk dump
    pub fn parse_bank(data: &[u8]) -> Result<Vec<Self>, FormatError> {
        check_length(data)?;
        Ok(data.chunks_exact(VOICE_LENGTH).map(Self::from_voice).collect())
    }

    /// Decode one 128-byte packed voice
    fn from_voice(data: &[u8]) -> Self {
        let mut ops = Vec::with_capacity(OPERATOR_COUNT);
        for op in 1..=OPERATOR_COUNT {
            let offset = op_offset(op);
            ops.push(Op::from_bytes(&data[offset..offset + OP_DATA_LENGTH]));
        }

        let g = &data[GLOBALS_OFFSET..];
        Self {
            ops,
            pitch_eg: Eg::from_bytes(&g[0..8]),
            algorithm: (g[8] & 0x1F) as i8,
            osc_key_sync: g[9] & 0x08 != 0,
            feedback: (g[9] & 0x07) as i8,
            lfo: Lfo::from_bytes(&g[10..15]),
            transpose: g[15] as i8,
            name: voice_name(&g[16..16 + NAME_LENGTH]),
        }
    }

    /// Algorithm number as shown on the instrument, 1-32
    pub fn algorithm_number(&self) -> u8 {
        self.algorithm as u8 + 1
    }

    /// Operator by its 1-based number
    pub fn op(&self, number: usize) -> Option<&Op> {
        number.checked_sub(1).and_then(|i| self.ops.get(i))
    }

    /// Encode back into a 128-byte packed voice
    pub fn to_voice(&self) -> [u8; VOICE_LENGTH] {
        let mut out = [0u8; VOICE_LENGTH];
        for (i, op) in self.ops.iter().enumerate().take(OPERATOR_COUNT) {
            let offset = op_offset(i + 1);
            out[offset..offset + OP_DATA_LENGTH].copy_from_slice(&op.to_bytes());
        }

        let g = &mut out[GLOBALS_OFFSET..];
        g[0..8].copy_from_slice(&self.pitch_eg.to_bytes());
        g[8] = self.algorithm as u8 & 0x1F;
        g[9] = (u8::from(self.osc_key_sync) << 3) | (self.feedback as u8 & 0x07);
        g[10..15].copy_from_slice(&self.lfo.to_bytes());
        g[15] = self.transpose as u8;
        let name = self.name.as_bytes();
        for (i, b) in g[16..16 + NAME_LENGTH].iter_mut().enumerate() {
            *b = name.get(i).copied().unwrap_or(b' ');
        }
        out
    }
}

fn check_length(data: &[u8]) -> Result<(), FormatError> {
    if data.len() != BULK_DUMP_LENGTH {
        return Err(FormatError::InvalidLength {
            expected: BULK_DUMP_LENGTH,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Byte offset of an operator's record within a voice.
fn op_offset(number: usize) -> usize {
    (OPERATOR_COUNT - number) * OP_DATA_LENGTH
}

fn voice_name(data: &[u8]) -> String {
    data.iter()
        .map(|&b| match b & 0x7F {
            c @ 0x20..=0x7E => c as char,
            _ => ' ',
        })
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Parameters for a single operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op {
    pub amp: Eg,
    pub kbd_level_scaling: KbdLevelScaling,
    pub kbd_rate_scaling: i8,
    pub output_level: i8,
    pub kbd_velocity_sensitivity: i8,
    pub amp_mod_sensitivity: i8,
    pub oscillator: Oscillator,
}

impl Op {
    /// Decode a 17-byte operator record
    fn from_bytes(data: &[u8]) -> Self {
        Self {
            amp: Eg::from_bytes(&data[0..8]),
            kbd_level_scaling: KbdLevelScaling::from_bytes(&data[8..12]),
            kbd_rate_scaling: kbd_rate_scaling(data[12]),
            kbd_velocity_sensitivity: kbd_velocity_sensitivity(data[13]),
            amp_mod_sensitivity: amp_mod_sensitivity(data[13]),
            output_level: data[14] as i8,
            oscillator: Oscillator {
                mode: OscMode::from(data[15]),
                freq_coarse: freq_coarse(data[15]),
                freq_fine: data[16] as i8,
                detune: osc_detune(data[12]),
            },
        }
    }

    /// Encode into a 17-byte operator record
    pub fn to_bytes(&self) -> [u8; OP_DATA_LENGTH] {
        let mut out = [0u8; OP_DATA_LENGTH];
        out[0..8].copy_from_slice(&self.amp.to_bytes());
        out[8..12].copy_from_slice(&self.kbd_level_scaling.to_bytes());
        out[12] = ((self.oscillator.detune as u8 & 0x0F) << 3)
            | (self.kbd_rate_scaling as u8 & 0x07);
        out[13] = ((self.kbd_velocity_sensitivity as u8 & 0x07) << 2)
            | (self.amp_mod_sensitivity as u8 & 0x03);
        out[14] = self.output_level as u8;
        out[15] = ((self.oscillator.freq_coarse as u8 & 0x1F) << 1) | self.oscillator.mode as u8;
        out[16] = self.oscillator.freq_fine as u8;
        out
    }
}

/// Oscillator parameters of an operator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Oscillator {
    pub mode: OscMode,
    pub freq_coarse: i8,
    pub freq_fine: i8,
    /// 0-14, where 7 is no detune
    pub detune: i8,
}

impl Oscillator {
    /// Frequency ratio relative to the played note, if in ratio mode
    pub fn ratio(&self) -> Option<f32> {
        match self.mode {
            OscMode::Ratio => {
                let coarse = if self.freq_coarse == 0 { 0.5 } else { self.freq_coarse as f32 };
                Some(coarse * (1.0 + self.freq_fine as f32 / 100.0))
            }
            OscMode::Fixed => None,
        }
    }
}

/// Oscillator frequency mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OscMode {
    Ratio = 0,
    Fixed = 1,
}

impl From<u8> for OscMode {
    fn from(b: u8) -> Self {
        if b & 0x01 == 0 {
            OscMode::Ratio
        } else {
            OscMode::Fixed
        }
    }
}

/// Keyboard level scaling parameters of an operator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KbdLevelScaling {
    pub breakpoint: i8,
    pub left_depth: i8,
    pub right_depth: i8,
    pub left_curve: Curve,
    pub right_curve: Curve,
}

impl KbdLevelScaling {
    /// Decode from 4 bytes
    fn from_bytes(data: &[u8]) -> Self {
        Self {
            breakpoint: data[0] as i8,
            left_depth: data[1] as i8,
            right_depth: data[2] as i8,
            left_curve: Curve::from(left_curve(data[3]) as u8),
            right_curve: Curve::from(right_curve(data[3]) as u8),
        }
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        [
            self.breakpoint as u8,
            self.left_depth as u8,
            self.right_depth as u8,
            ((self.right_curve as u8) << 2) | self.left_curve as u8,
        ]
    }
}

/// Keyboard level scaling curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Curve {
    NegativeLinear = 0,
    NegativeExponential = 1,
    PositiveExponential = 2,
    PositiveLinear = 3,
}

impl From<u8> for Curve {
    fn from(b: u8) -> Self {
        match b & 0x03 {
            0 => Curve::NegativeLinear,
            1 => Curve::NegativeExponential,
            2 => Curve::PositiveExponential,
            _ => Curve::PositiveLinear,
        }
    }
}

/// Envelope generator: four rates followed by four levels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Eg {
    pub r1: i8,
    pub r2: i8,
    pub r3: i8,
    pub r4: i8,
    pub l1: i8,
    pub l2: i8,
    pub l3: i8,
    pub l4: i8,
}

impl Eg {
    /// Decode from 8 bytes
    fn from_bytes(data: &[u8]) -> Self {
        Self {
            r1: data[0] as i8,
            r2: data[1] as i8,
            r3: data[2] as i8,
            r4: data[3] as i8,
            l1: data[4] as i8,
            l2: data[5] as i8,
            l3: data[6] as i8,
            l4: data[7] as i8,
        }
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        [self.r1, self.r2, self.r3, self.r4, self.l1, self.l2, self.l3, self.l4].map(|v| v as u8)
    }
}

/// Low frequency oscillator parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lfo {
    pub speed: i8,
    pub delay: i8,
    pub pitch_mod_depth: i8,
    pub amp_mod_depth: i8,
    pub pitch_mod_sensitivity: i8,
    /// 0-5, see [`LfoWave`]
    pub waveform: i8,
    pub key_sync: bool,
}

impl Lfo {
    /// Decode from 5 bytes
    fn from_bytes(data: &[u8]) -> Self {
        Self {
            speed: data[0] as i8,
            delay: data[1] as i8,
            pitch_mod_depth: data[2] as i8,
            amp_mod_depth: data[3] as i8,
            pitch_mod_sensitivity: ((data[4] & 0x70) >> 4) as i8,
            waveform: ((data[4] & 0x0E) >> 1) as i8,
            key_sync: data[4] & 0x01 != 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; 5] {
        [
            self.speed as u8,
            self.delay as u8,
            self.pitch_mod_depth as u8,
            self.amp_mod_depth as u8,
            ((self.pitch_mod_sensitivity as u8 & 0x07) << 4)
                | ((self.waveform as u8 & 0x07) << 1)
                | u8::from(self.key_sync),
        ]
    }

    /// Waveform, if the stored value is one the instrument defines
    pub fn wave(&self) -> Option<LfoWave> {
        match self.waveform {
            0 => Some(LfoWave::Triangle),
            1 => Some(LfoWave::SawDown),
            2 => Some(LfoWave::SawUp),
            3 => Some(LfoWave::Square),
            4 => Some(LfoWave::Sine),
            5 => Some(LfoWave::SampleAndHold),
            _ => None,
        }
    }
}

/// LFO waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LfoWave {
    Triangle,
    SawDown,
    SawUp,
    Square,
    Sine,
    SampleAndHold,
}

/// Keyboard rate scaling, bits 0-2.
pub fn kbd_rate_scaling(b: u8) -> i8 {
    (b & 0x07) as i8
}

/// Oscillator detune, bits 3-6.
pub fn osc_detune(b: u8) -> i8 {
    ((b & 0x78) >> 3) as i8
}

/// Keyboard velocity sensitivity, bits 2-4.
pub fn kbd_velocity_sensitivity(b: u8) -> i8 {
    ((b & 0x1C) >> 2) as i8
}

/// Amp modulation sensitivity, bits 0-1.
pub fn amp_mod_sensitivity(b: u8) -> i8 {
    (b & 0x03) as i8
}

/// Keyboard level scaling left curve, bits 0-1.
pub fn left_curve(b: u8) -> i8 {
    (b & 0x03) as i8
}

/// Keyboard level scaling right curve, bits 2-3.
pub fn right_curve(b: u8) -> i8 {
    ((b & 0x0C) >> 2) as i8
}

/// Oscillator coarse frequency, bits 1-5.
pub fn freq_coarse(b: u8) -> i8 {
    ((b & 0x3E) >> 1) as i8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_op() -> [u8; OP_DATA_LENGTH] {
        [
            99, 80, 70, 60, // rates
            99, 90, 50, 0, // levels
            39, 10, 20, 0x0E, // breakpoint, depths, curves
            0x53, // detune 10, rate scaling 3
            0x0D, // velocity sensitivity 3, ams 1
            87,   // output level
            0x05, // coarse 2, fixed
            42,   // fine
        ]
    }

    #[test]
    fn test_right_curve() {
        let cases = [
            (0x00..=0x03, 0),
            (0x04..=0x07, 1),
            (0x08..=0x0B, 2),
            (0x0C..=0x0F, 3),
            (0x10..=0x13, 0),
        ];
        for (range, expected) in cases {
            for b in range {
                assert_eq!(right_curve(b), expected, "right_curve({:#04X})", b);
            }
        }
        assert_eq!(right_curve(0x03), 0);
        assert_eq!(right_curve(0x08), 2);
        assert_eq!(right_curve(0x0F), 3);
    }

    #[test]
    fn test_osc_detune() {
        assert_eq!(osc_detune(0x07), 0);
        assert_eq!(osc_detune(0x38), 7);
        assert_eq!(osc_detune(0x70), 14);
        assert_eq!(osc_detune(0x80), 0);
    }

    #[test]
    fn test_bit_fields_stay_in_range() {
        for b in 0..=u8::MAX {
            assert!((0..=7).contains(&kbd_rate_scaling(b)));
            assert!((0..=15).contains(&osc_detune(b)));
            assert!((0..=7).contains(&kbd_velocity_sensitivity(b)));
            assert!((0..=3).contains(&amp_mod_sensitivity(b)));
            assert!((0..=3).contains(&left_curve(b)));
            assert!((0..=3).contains(&right_curve(b)));
            assert!((0..=31).contains(&freq_coarse(b)));
        }
    }

    #[test]
    fn test_op_fields() {
        let op = Op::from_bytes(&sample_op());

        assert_eq!(op.amp.r1, 99);
        assert_eq!(op.amp.r4, 60);
        assert_eq!(op.amp.l2, 90);
        assert_eq!(op.amp.l4, 0);
        assert_eq!(op.kbd_level_scaling.breakpoint, 39);
        assert_eq!(op.kbd_level_scaling.left_depth, 10);
        assert_eq!(op.kbd_level_scaling.right_depth, 20);
        assert_eq!(op.kbd_level_scaling.left_curve, Curve::PositiveExponential);
        assert_eq!(op.kbd_level_scaling.right_curve, Curve::PositiveLinear);
        assert_eq!(op.kbd_rate_scaling, 3);
        assert_eq!(op.oscillator.detune, 10);
        assert_eq!(op.kbd_velocity_sensitivity, 3);
        assert_eq!(op.amp_mod_sensitivity, 1);
        assert_eq!(op.output_level, 87);
        assert_eq!(op.oscillator.mode, OscMode::Fixed);
        assert_eq!(op.oscillator.freq_coarse, 2);
        assert_eq!(op.oscillator.freq_fine, 42);
    }

    #[test]
    fn test_op_round_trip() {
        let bytes = sample_op();
        assert_eq!(Op::from_bytes(&bytes).to_bytes(), bytes);
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        for len in [0, 128, 4095, 4097] {
            assert!(matches!(
                BulkDump::parse(&vec![0u8; len]),
                Err(FormatError::InvalidLength { expected: 4096, actual }) if actual == len
            ));
            assert!(BulkDump::parse_bank(&vec![0u8; len]).is_err());
        }
    }

    #[test]
    fn test_operators_are_stored_in_reverse() {
        let mut data = vec![0u8; BULK_DUMP_LENGTH];
        for record in 0..OPERATOR_COUNT {
            // output level carries the record position
            data[record * OP_DATA_LENGTH + 14] = record as u8 + 10;
        }
        let dump = BulkDump::parse(&data).unwrap();

        assert_eq!(dump.ops.len(), 6);
        assert_eq!(dump.op(6).unwrap().output_level, 10);
        assert_eq!(dump.op(1).unwrap().output_level, 15);
        assert!(dump.op(0).is_none());
        assert!(dump.op(7).is_none());
    }

    #[test]
    fn test_global_fields() {
        let mut data = vec![0u8; BULK_DUMP_LENGTH];
        let g = &mut data[GLOBALS_OFFSET..VOICE_LENGTH];
        g[0..8].copy_from_slice(&[94, 67, 95, 60, 50, 50, 50, 50]);
        g[8] = 0xE4; // algorithm 4 (number 5), high bits ignored
        g[9] = 0x0E; // key sync, feedback 6
        g[10..16].copy_from_slice(&[35, 0, 5, 0, 0x39, 24]);
        g[16..].copy_from_slice(b"ELEC PIANO");

        let dump = BulkDump::parse(&data).unwrap();
        assert_eq!(dump.pitch_eg.r1, 94);
        assert_eq!(dump.pitch_eg.l4, 50);
        assert_eq!(dump.algorithm, 4);
        assert_eq!(dump.algorithm_number(), 5);
        assert!(dump.osc_key_sync);
        assert_eq!(dump.feedback, 6);
        assert_eq!(dump.lfo.speed, 35);
        assert_eq!(dump.lfo.pitch_mod_depth, 5);
        assert_eq!(dump.lfo.pitch_mod_sensitivity, 3);
        assert_eq!(dump.lfo.waveform, 4);
        assert_eq!(dump.lfo.wave(), Some(LfoWave::Sine));
        assert!(dump.lfo.key_sync);
        assert_eq!(dump.transpose, 24);
        assert_eq!(dump.name, "ELEC PIANO");
    }

    #[test]
    fn test_parse_bank() {
        let mut data = vec![0u8; BULK_DUMP_LENGTH];
        for voice in 0..VOICE_COUNT {
            data[voice * VOICE_LENGTH + GLOBALS_OFFSET + 8] = voice as u8;
            let name = voice * VOICE_LENGTH + 118;
            data[name..name + 10].copy_from_slice(b"VOICE     ");
        }
        let bank = BulkDump::parse_bank(&data).unwrap();

        assert_eq!(bank.len(), 32);
        assert_eq!(bank[0], BulkDump::parse(&data).unwrap());
        assert_eq!(bank[31].algorithm_number(), 32);
        assert_eq!(bank[12].name, "VOICE");
    }

    #[test]
    fn test_voice_round_trip() {
        let mut voice = [0u8; VOICE_LENGTH];
        for record in 0..OPERATOR_COUNT {
            let start = record * OP_DATA_LENGTH;
            voice[start..start + OP_DATA_LENGTH].copy_from_slice(&sample_op());
            voice[record * OP_DATA_LENGTH + 14] = record as u8;
        }
        voice[GLOBALS_OFFSET + 8] = 21;
        voice[GLOBALS_OFFSET + 9] = 0x0B;
        voice[GLOBALS_OFFSET + 14] = 0x2B;
        voice[118..].copy_from_slice(b"BRASS   1 ");

        let dump = BulkDump::from_voice(&voice);
        assert_eq!(dump.name, "BRASS   1");
        assert_eq!(dump.to_voice(), voice);
    }

    #[test]
    fn test_oscillator_ratio() {
        let mut osc = Oscillator { mode: OscMode::Ratio, freq_coarse: 0, freq_fine: 0, detune: 7 };
        assert_eq!(osc.ratio(), Some(0.5));
        osc.freq_coarse = 2;
        osc.freq_fine = 50;
        assert_eq!(osc.ratio(), Some(3.0));
        osc.mode = OscMode::Fixed;
        assert_eq!(osc.ratio(), None);
    }
}
