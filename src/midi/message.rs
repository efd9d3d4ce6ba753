use std::fmt;

use crate::error::InvalidMessage;

/// Status bytes and controller numbers used by the message constructors.
pub mod status {
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const POLY_PRESSURE: u8 = 0xA0;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    pub const CHANNEL_PRESSURE: u8 = 0xD0;
    pub const PITCH_BEND: u8 = 0xE0;

    pub const SYSEX_START: u8 = 0xF0;
    pub const MTC_QUARTER_FRAME: u8 = 0xF1;
    pub const SONG_POSITION: u8 = 0xF2;
    pub const SONG_SELECT: u8 = 0xF3;
    pub const TUNE_REQUEST: u8 = 0xF6;
    pub const SYSEX_END: u8 = 0xF7;

    pub const TIMING_CLOCK: u8 = 0xF8;
    pub const START: u8 = 0xFA;
    pub const CONTINUE: u8 = 0xFB;
    pub const STOP: u8 = 0xFC;
    pub const ACTIVE_SENSING: u8 = 0xFE;
    pub const SYSTEM_RESET: u8 = 0xFF;
}

pub mod controller {
    pub const BANK_SELECT_MSB: u8 = 0;
    pub const MODULATION: u8 = 1;
    pub const BREATH_CONTROLLER: u8 = 2;
    pub const FOOT_CONTROLLER: u8 = 4;
    pub const CHANNEL_VOLUME: u8 = 7;
    pub const BALANCE: u8 = 8;
    pub const PAN: u8 = 10;
    pub const EXPRESSION: u8 = 11;
    pub const BANK_SELECT_LSB: u8 = 32;
    pub const ALL_SOUND_OFF: u8 = 120;
    pub const RESET_ALL_CONTROLLERS: u8 = 121;
    pub const LOCAL_CONTROL: u8 = 122;
    pub const ALL_NOTES_OFF: u8 = 123;
}

/// A MIDI channel, stored zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Channel(u8);

impl Channel {
    /// Zero-based channel index, 0..=15.
    pub fn new(index: u8) -> Option<Self> {
        (index < 16).then_some(Self(index))
    }

    /// One-based channel number as shown to users, 1..=16.
    pub fn from_number(number: u8) -> Option<Self> {
        number.checked_sub(1).and_then(Self::new)
    }

    pub fn index(self) -> u8 {
        self.0
    }

    pub fn number(self) -> u8 {
        self.0 + 1
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// One complete MIDI 1.0 wire message.
///
/// A `MidiMessage` can only be obtained through [`MidiMessage::new`] or one
/// of the typed constructors, so holding one means the bytes already passed
/// framing validation: a status byte, the exact number of 7-bit data bytes
/// that status requires, or a `0xF0 .. 0xF7` system exclusive frame.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MidiMessage(Vec<u8>);

impl MidiMessage {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, InvalidMessage> {
        let bytes = bytes.into();
        validate(&bytes)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn status(&self) -> u8 {
        self.0[0]
    }

    /// Channel of a channel voice message, `None` for system messages.
    pub fn channel(&self) -> Option<Channel> {
        let status = self.status();
        (status < status::SYSEX_START).then(|| Channel(status & 0x0F))
    }

    pub fn is_sysex(&self) -> bool {
        self.status() == status::SYSEX_START
    }

    fn channel_message(kind: u8, channel: Channel, data: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(1 + data.len());
        bytes.push((kind & 0xF0) | channel.index());
        bytes.extend(data.iter().map(|b| b & 0x7F));
        Self(bytes)
    }

    pub fn note_off(channel: Channel, note: u8, velocity: u8) -> Self {
        Self::channel_message(status::NOTE_OFF, channel, &[note, velocity])
    }

    pub fn note_on(channel: Channel, note: u8, velocity: u8) -> Self {
        Self::channel_message(status::NOTE_ON, channel, &[note, velocity])
    }

    pub fn poly_pressure(channel: Channel, note: u8, value: u8) -> Self {
        Self::channel_message(status::POLY_PRESSURE, channel, &[note, value])
    }

    pub fn control_change(channel: Channel, cc: u8, value: u8) -> Self {
        Self::channel_message(status::CONTROL_CHANGE, channel, &[cc, value])
    }

    pub fn program_change(channel: Channel, program: u8) -> Self {
        Self::channel_message(status::PROGRAM_CHANGE, channel, &[program])
    }

    pub fn channel_pressure(channel: Channel, value: u8) -> Self {
        Self::channel_message(status::CHANNEL_PRESSURE, channel, &[value])
    }

    /// 14-bit pitch bend, 8192 is centre. Values above 16383 are masked.
    pub fn pitch_bend(channel: Channel, value: u16) -> Self {
        let lsb = (value & 0x7F) as u8;
        let msb = ((value >> 7) & 0x7F) as u8;
        Self::channel_message(status::PITCH_BEND, channel, &[lsb, msb])
    }

    /// Bank select as the MSB then LSB control change pair.
    pub fn bank_select(channel: Channel, bank: u16) -> [Self; 2] {
        [
            Self::control_change(channel, controller::BANK_SELECT_MSB, (bank >> 7) as u8),
            Self::control_change(channel, controller::BANK_SELECT_LSB, bank as u8),
        ]
    }

    pub fn modulation(channel: Channel, value: u8) -> Self {
        Self::control_change(channel, controller::MODULATION, value)
    }

    pub fn breath_controller(channel: Channel, value: u8) -> Self {
        Self::control_change(channel, controller::BREATH_CONTROLLER, value)
    }

    pub fn foot_controller(channel: Channel, value: u8) -> Self {
        Self::control_change(channel, controller::FOOT_CONTROLLER, value)
    }

    pub fn channel_volume(channel: Channel, value: u8) -> Self {
        Self::control_change(channel, controller::CHANNEL_VOLUME, value)
    }

    pub fn balance(channel: Channel, value: u8) -> Self {
        Self::control_change(channel, controller::BALANCE, value)
    }

    pub fn pan(channel: Channel, value: u8) -> Self {
        Self::control_change(channel, controller::PAN, value)
    }

    pub fn expression(channel: Channel, value: u8) -> Self {
        Self::control_change(channel, controller::EXPRESSION, value)
    }

    pub fn all_sound_off(channel: Channel) -> Self {
        Self::control_change(channel, controller::ALL_SOUND_OFF, 0)
    }

    pub fn reset_all_controllers(channel: Channel) -> Self {
        Self::control_change(channel, controller::RESET_ALL_CONTROLLERS, 0)
    }

    pub fn local_control(channel: Channel, on: bool) -> Self {
        Self::control_change(channel, controller::LOCAL_CONTROL, if on { 127 } else { 0 })
    }

    pub fn all_notes_off(channel: Channel) -> Self {
        Self::control_change(channel, controller::ALL_NOTES_OFF, 0)
    }

    /// System common message (0xF1..=0xF6) with its data bytes.
    pub fn system_common(status: u8, data: &[u8]) -> Result<Self, InvalidMessage> {
        let mut bytes = Vec::with_capacity(1 + data.len());
        bytes.push(status);
        bytes.extend_from_slice(data);
        if !(status::MTC_QUARTER_FRAME..=status::TUNE_REQUEST).contains(&status) {
            return Err(InvalidMessage::UndefinedStatus { status });
        }
        Self::new(bytes)
    }

    pub fn system_realtime(status: u8) -> Result<Self, InvalidMessage> {
        if status < status::TIMING_CLOCK {
            return Err(InvalidMessage::UndefinedStatus { status });
        }
        Self::new(vec![status])
    }

    /// Complete system exclusive frame, including `0xF0` and `0xF7`.
    pub fn sysex(bytes: impl Into<Vec<u8>>) -> Result<Self, InvalidMessage> {
        let bytes = bytes.into();
        match bytes.first() {
            Some(&status::SYSEX_START) => Self::new(bytes),
            Some(&byte) => Err(InvalidMessage::MissingStatus { byte }),
            None => Err(InvalidMessage::Empty),
        }
    }

    /// Parses a hex dump such as `"F0 7E 7F 09 01 F7"` into a sysex message.
    pub fn sysex_from_hex(hex: &str) -> Result<Self, InvalidMessage> {
        Self::sysex(parse_hex(hex)?)
    }
}

impl fmt::Debug for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MidiMessage({:02X?})", self.0)
    }
}

impl AsRef<[u8]> for MidiMessage {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<Vec<u8>> for MidiMessage {
    type Error = InvalidMessage;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        Self::new(bytes)
    }
}

impl TryFrom<&[u8]> for MidiMessage {
    type Error = InvalidMessage;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::new(bytes.to_vec())
    }
}

/// Number of data bytes following `status`, `None` for undefined statuses
/// and for sysex, which is variable length.
fn data_len(status: u8) -> Option<usize> {
    match status {
        0x80..=0xBF | 0xE0..=0xEF => Some(2),
        0xC0..=0xDF => Some(1),
        status::MTC_QUARTER_FRAME | status::SONG_SELECT => Some(1),
        status::SONG_POSITION => Some(2),
        status::TUNE_REQUEST => Some(0),
        0xF8..=0xFF => Some(0),
        _ => None,
    }
}

fn validate(bytes: &[u8]) -> Result<(), InvalidMessage> {
    let (&first, rest) = bytes.split_first().ok_or(InvalidMessage::Empty)?;
    if first & 0x80 == 0 {
        return Err(InvalidMessage::MissingStatus { byte: first });
    }

    let data = if first == status::SYSEX_START {
        match rest.split_last() {
            Some((&status::SYSEX_END, payload)) => payload,
            _ => return Err(InvalidMessage::UnterminatedSysex),
        }
    } else {
        let expected = data_len(first).ok_or(InvalidMessage::UndefinedStatus { status: first })?;
        if rest.len() != expected {
            return Err(InvalidMessage::WrongLength {
                status: first,
                expected,
                actual: rest.len(),
            });
        }
        rest
    };

    match data.iter().position(|b| b & 0x80 != 0) {
        Some(i) => Err(InvalidMessage::DataByteOutOfRange {
            index: i + 1,
            byte: data[i],
        }),
        None => Ok(()),
    }
}

fn parse_hex(hex: &str) -> Result<Vec<u8>, InvalidMessage> {
    let digits: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    let invalid = || InvalidMessage::InvalidHex(hex.to_string());
    if digits.len() % 2 != 0 || !digits.is_ascii() {
        return Err(invalid());
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(number: u8) -> Channel {
        Channel::from_number(number).unwrap()
    }

    #[test]
    fn accepts_well_formed_messages() {
        for bytes in [
            vec![0x90, 60, 127],
            vec![0xC3, 5],
            vec![0xF2, 0x10, 0x20],
            vec![0xF6],
            vec![0xF8],
            vec![0xF0, 0xF7],
            vec![0xF0, 0x7E, 0x7F, 0x09, 0x01, 0xF7],
        ] {
            assert!(MidiMessage::new(bytes.clone()).is_ok(), "{bytes:02X?}");
        }
    }

    #[test]
    fn rejects_malformed_messages() {
        assert_eq!(MidiMessage::new(vec![]), Err(InvalidMessage::Empty));
        assert_eq!(
            MidiMessage::new(vec![0x3C, 0x40]),
            Err(InvalidMessage::MissingStatus { byte: 0x3C })
        );
        assert_eq!(
            MidiMessage::new(vec![0x90, 0x80, 0x40]),
            Err(InvalidMessage::DataByteOutOfRange { index: 1, byte: 0x80 })
        );
        assert_eq!(
            MidiMessage::new(vec![0xB0, 7]),
            Err(InvalidMessage::WrongLength {
                status: 0xB0,
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            MidiMessage::new(vec![0xF4]),
            Err(InvalidMessage::UndefinedStatus { status: 0xF4 })
        );
        assert_eq!(
            MidiMessage::new(vec![0xF7]),
            Err(InvalidMessage::UndefinedStatus { status: 0xF7 })
        );
        assert_eq!(
            MidiMessage::new(vec![0xF0, 0x01, 0x02]),
            Err(InvalidMessage::UnterminatedSysex)
        );
        assert_eq!(
            MidiMessage::new(vec![0xF0, 0x01, 0x90, 0xF7]),
            Err(InvalidMessage::DataByteOutOfRange { index: 2, byte: 0x90 })
        );
    }

    #[test]
    fn channel_numbering() {
        assert_eq!(Channel::from_number(0), None);
        assert_eq!(Channel::from_number(17), None);
        assert_eq!(ch(1).index(), 0);
        assert_eq!(ch(16).index(), 15);
        assert_eq!(Channel::new(16), None);
    }

    #[test]
    fn constructors_mask_data_bytes() {
        let msg = MidiMessage::control_change(ch(2), 7, 200);
        assert_eq!(msg.as_bytes(), &[0xB1, 7, 200 & 0x7F]);
        assert_eq!(msg.channel(), Some(ch(2)));

        let msg = MidiMessage::program_change(ch(16), 10);
        assert_eq!(msg.as_bytes(), &[0xCF, 10]);
    }

    #[test]
    fn pitch_bend_is_lsb_first() {
        assert_eq!(MidiMessage::pitch_bend(ch(1), 8192).as_bytes(), &[0xE0, 0x00, 0x40]);
        assert_eq!(MidiMessage::pitch_bend(ch(1), 16383).as_bytes(), &[0xE0, 0x7F, 0x7F]);
    }

    #[test]
    fn bank_select_splits_msb_and_lsb() {
        let [msb, lsb] = MidiMessage::bank_select(ch(1), 130);
        assert_eq!(msb.as_bytes(), &[0xB0, controller::BANK_SELECT_MSB, 1]);
        assert_eq!(lsb.as_bytes(), &[0xB0, controller::BANK_SELECT_LSB, 2]);
    }

    #[test]
    fn sysex_from_hex_ignores_whitespace() {
        let msg = MidiMessage::sysex_from_hex("F0 43 10 4C 00 00 7E 00 F7").unwrap();
        assert!(msg.is_sysex());
        assert_eq!(msg.len(), 9);

        assert!(matches!(
            MidiMessage::sysex_from_hex("F0 4"),
            Err(InvalidMessage::InvalidHex(_))
        ));
        assert!(matches!(
            MidiMessage::sysex_from_hex("F0 ZZ F7"),
            Err(InvalidMessage::InvalidHex(_))
        ));
        assert_eq!(
            MidiMessage::sysex_from_hex("90 3C 40"),
            Err(InvalidMessage::MissingStatus { byte: 0x90 })
        );
    }

    #[test]
    fn system_messages() {
        assert_eq!(
            MidiMessage::system_realtime(status::START).unwrap().as_bytes(),
            &[0xFA]
        );
        assert!(MidiMessage::system_realtime(0x90).is_err());
        assert_eq!(
            MidiMessage::system_common(status::SONG_SELECT, &[3]).unwrap().as_bytes(),
            &[0xF3, 3]
        );
        assert!(MidiMessage::system_common(status::SONG_SELECT, &[]).is_err());
        assert!(MidiMessage::system_common(status::SYSEX_START, &[]).is_err());
        assert_eq!(MidiMessage::system_realtime(status::START).unwrap().channel(), None);
    }
}
