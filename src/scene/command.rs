use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::error::CommandError;
use crate::midi::{Channel, MidiMessage, controller, status};

/// Every command name a scene may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    NoteOn,
    NoteOff,
    PolyPressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchBend,
    BankSelect,
    Modulation,
    BreathController,
    FootController,
    ChannelVolume,
    Balance,
    Pan,
    Expression,
    AllSoundOff,
    ResetAllControllers,
    LocalControl,
    AllNotesOff,
    SystemCommon,
    SystemRealtime,
    SystemExclusive,
}

const KIND_NAMES: &[(CommandKind, &str)] = &[
    (CommandKind::NoteOn, "note_on"),
    (CommandKind::NoteOff, "note_off"),
    (CommandKind::PolyPressure, "poly_pressure"),
    (CommandKind::ControlChange, "control_change"),
    (CommandKind::ProgramChange, "program_change"),
    (CommandKind::ChannelPressure, "channel_pressure"),
    (CommandKind::PitchBend, "pitch_bend"),
    (CommandKind::BankSelect, "bank_select"),
    (CommandKind::Modulation, "modulation"),
    (CommandKind::BreathController, "breath_controller"),
    (CommandKind::FootController, "foot_controller"),
    (CommandKind::ChannelVolume, "channel_volume"),
    (CommandKind::Balance, "balance"),
    (CommandKind::Pan, "pan"),
    (CommandKind::Expression, "expression"),
    (CommandKind::AllSoundOff, "all_sound_off"),
    (CommandKind::ResetAllControllers, "reset_all_controllers"),
    (CommandKind::LocalControl, "local_control"),
    (CommandKind::AllNotesOff, "all_notes_off"),
    (CommandKind::SystemCommon, "system_common"),
    (CommandKind::SystemRealtime, "system_realtime"),
    (CommandKind::SystemExclusive, "system_exclusive"),
];

impl CommandKind {
    pub fn name(self) -> &'static str {
        KIND_NAMES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map_or("", |(_, name)| name)
    }

    pub fn all() -> impl Iterator<Item = CommandKind> {
        KIND_NAMES.iter().map(|(kind, _)| *kind)
    }

    /// System messages carry no channel, so they do not accept `ch=`.
    pub fn is_system(self) -> bool {
        matches!(
            self,
            CommandKind::SystemCommon | CommandKind::SystemRealtime | CommandKind::SystemExclusive
        )
    }

    fn build(self, args: &mut Args) -> Result<Command, CommandError> {
        use CommandKind::*;

        let channel = if self.is_system() {
            None
        } else {
            args.channel()?
        };
        let cc_shortcut = |cc: u8, default: u8, args: &mut Args| -> Result<Command, CommandError> {
            Ok(Command::ControlChange {
                channel,
                cc,
                value: args.take_u7("value", default)?,
            })
        };

        match self {
            NoteOn => Ok(Command::NoteOn {
                channel,
                note: args.take_u7("note", 60)?,
                velocity: args.take_u7("velocity", 127)?,
            }),
            NoteOff => Ok(Command::NoteOff {
                channel,
                note: args.take_u7("note", 60)?,
                velocity: args.take_u7("velocity", 0)?,
            }),
            PolyPressure => Ok(Command::PolyPressure {
                channel,
                note: args.take_u7("note", 60)?,
                value: args.take_u7("value", 0)?,
            }),
            ControlChange => Ok(Command::ControlChange {
                channel,
                cc: args.take_u7("cc", 0)?,
                value: args.take_u7("value", 0)?,
            }),
            ProgramChange => Ok(Command::ProgramChange {
                channel,
                program: args.take_u7("program", 0)?,
            }),
            ChannelPressure => Ok(Command::ChannelPressure {
                channel,
                value: args.take_u7("value", 0)?,
            }),
            PitchBend => Ok(Command::PitchBend {
                channel,
                value: args.take("value", 0..=16383)?.unwrap_or(8192) as u16,
            }),
            BankSelect => {
                let bank = args.take("bank", 0..=16383)?;
                let msb = args.take("msb", 0..=127)?;
                let lsb = args.take("lsb", 0..=127)?;
                let (msb, lsb) = match (bank, msb, lsb) {
                    (Some(bank), None, None) => {
                        (Some((bank >> 7) as u8), Some((bank & 0x7F) as u8))
                    }
                    (Some(_), msb, _) => {
                        let other = if msb.is_some() { "msb" } else { "lsb" };
                        return Err(CommandError::ConflictingArguments {
                            command: self.name().to_string(),
                            arg: "bank".to_string(),
                            other: other.to_string(),
                        });
                    }
                    (None, msb, lsb) => (msb.map(|v| v as u8), lsb.map(|v| v as u8)),
                };
                if msb.is_none() && lsb.is_none() {
                    return Err(CommandError::MissingArgument {
                        command: self.name().to_string(),
                        arg: "bank".to_string(),
                    });
                }
                Ok(Command::BankSelect { channel, msb, lsb })
            }
            Modulation => cc_shortcut(controller::MODULATION, 0, args),
            BreathController => cc_shortcut(controller::BREATH_CONTROLLER, 0, args),
            FootController => cc_shortcut(controller::FOOT_CONTROLLER, 0, args),
            ChannelVolume => cc_shortcut(controller::CHANNEL_VOLUME, 127, args),
            Balance => cc_shortcut(controller::BALANCE, 63, args),
            Pan => cc_shortcut(controller::PAN, 63, args),
            Expression => cc_shortcut(controller::EXPRESSION, 127, args),
            AllSoundOff => Ok(Command::ControlChange {
                channel,
                cc: controller::ALL_SOUND_OFF,
                value: 0,
            }),
            ResetAllControllers => Ok(Command::ControlChange {
                channel,
                cc: controller::RESET_ALL_CONTROLLERS,
                value: 0,
            }),
            LocalControl => {
                let on = args.take("value", 0..=1)?.unwrap_or(1) == 1;
                Ok(Command::ControlChange {
                    channel,
                    cc: controller::LOCAL_CONTROL,
                    value: if on { 127 } else { 0 },
                })
            }
            AllNotesOff => Ok(Command::ControlChange {
                channel,
                cc: controller::ALL_NOTES_OFF,
                value: 0,
            }),
            SystemCommon => {
                let status = args
                    .take("status", status::MTC_QUARTER_FRAME as u32..=status::TUNE_REQUEST as u32)?
                    .ok_or_else(|| CommandError::MissingArgument {
                        command: self.name().to_string(),
                        arg: "status".to_string(),
                    })?;
                let mut data = Vec::new();
                if let Some(d1) = args.take("data1", 0..=127)? {
                    data.push(d1 as u8);
                }
                if let Some(d2) = args.take("data2", 0..=127)? {
                    data.push(d2 as u8);
                }
                Ok(Command::System(MidiMessage::system_common(status as u8, &data)?))
            }
            SystemRealtime => {
                let status = args
                    .take("status", status::TIMING_CLOCK as u32..=status::SYSTEM_RESET as u32)?
                    .unwrap_or(status::TIMING_CLOCK as u32);
                Ok(Command::System(MidiMessage::system_realtime(status as u8)?))
            }
            SystemExclusive => {
                let hex = args.raw.trim();
                let hex = hex.strip_prefix("value=").unwrap_or(hex);
                Ok(Command::System(MidiMessage::sysex_from_hex(hex)?))
            }
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CommandKind {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KIND_NAMES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(kind, _)| *kind)
            .ok_or_else(|| CommandError::UnknownCommand(s.to_string()))
    }
}

/// A scene command resolved to the message(s) it sends.
///
/// A `channel` of `None` means the engine's default channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    NoteOn {
        channel: Option<Channel>,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        channel: Option<Channel>,
        note: u8,
        velocity: u8,
    },
    PolyPressure {
        channel: Option<Channel>,
        note: u8,
        value: u8,
    },
    ControlChange {
        channel: Option<Channel>,
        cc: u8,
        value: u8,
    },
    ProgramChange {
        channel: Option<Channel>,
        program: u8,
    },
    ChannelPressure {
        channel: Option<Channel>,
        value: u8,
    },
    PitchBend {
        channel: Option<Channel>,
        value: u16,
    },
    BankSelect {
        channel: Option<Channel>,
        msb: Option<u8>,
        lsb: Option<u8>,
    },
    System(MidiMessage),
}

impl Command {
    pub fn messages(&self, default_channel: Channel) -> Vec<MidiMessage> {
        let ch = |channel: &Option<Channel>| channel.unwrap_or(default_channel);
        match self {
            Command::NoteOn {
                channel,
                note,
                velocity,
            } => vec![MidiMessage::note_on(ch(channel), *note, *velocity)],
            Command::NoteOff {
                channel,
                note,
                velocity,
            } => vec![MidiMessage::note_off(ch(channel), *note, *velocity)],
            Command::PolyPressure {
                channel,
                note,
                value,
            } => vec![MidiMessage::poly_pressure(ch(channel), *note, *value)],
            Command::ControlChange { channel, cc, value } => {
                vec![MidiMessage::control_change(ch(channel), *cc, *value)]
            }
            Command::ProgramChange { channel, program } => {
                vec![MidiMessage::program_change(ch(channel), *program)]
            }
            Command::ChannelPressure { channel, value } => {
                vec![MidiMessage::channel_pressure(ch(channel), *value)]
            }
            Command::PitchBend { channel, value } => {
                vec![MidiMessage::pitch_bend(ch(channel), *value)]
            }
            Command::BankSelect { channel, msb, lsb } => {
                let channel = ch(channel);
                msb.map(|v| MidiMessage::control_change(channel, controller::BANK_SELECT_MSB, v))
                    .into_iter()
                    .chain(lsb.map(|v| {
                        MidiMessage::control_change(channel, controller::BANK_SELECT_LSB, v)
                    }))
                    .collect()
            }
            Command::System(message) => vec![message.clone()],
        }
    }
}

/// Parses `name key=value ...`. Values are decimal, or hex with an `h`
/// suffix (`7Fh`). `system_exclusive` takes a hex dump instead of
/// arguments, optionally written as `value=...`.
impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (name, rest) = line
            .split_once(char::is_whitespace)
            .unwrap_or((line, ""));
        if name.is_empty() {
            return Err(CommandError::Empty);
        }

        let kind: CommandKind = name.parse()?;
        let mut args = if kind == CommandKind::SystemExclusive {
            Args::raw(kind, rest)
        } else {
            Args::parse(kind, rest)?
        };
        let command = kind.build(&mut args)?;
        args.finish()?;
        Ok(command)
    }
}

struct Args {
    command: &'static str,
    values: HashMap<String, u32>,
    raw: String,
}

impl Args {
    fn parse(kind: CommandKind, rest: &str) -> Result<Self, CommandError> {
        let mut values = HashMap::new();
        for arg in rest.split_whitespace() {
            let (name, raw) = arg
                .split_once('=')
                .ok_or_else(|| CommandError::MalformedArgument {
                    arg: arg.to_string(),
                })?;
            let value = parse_number(raw).ok_or_else(|| CommandError::InvalidNumber {
                arg: name.to_string(),
                value: raw.to_string(),
            })?;
            values.insert(name.to_string(), value);
        }
        Ok(Self {
            command: kind.name(),
            values,
            raw: String::new(),
        })
    }

    /// Arguments taken verbatim, for commands that are not `key=value` based.
    fn raw(kind: CommandKind, rest: &str) -> Self {
        Self {
            command: kind.name(),
            values: HashMap::new(),
            raw: rest.to_string(),
        }
    }

    fn take(&mut self, name: &str, range: RangeInclusive<u32>) -> Result<Option<u32>, CommandError> {
        match self.values.remove(name) {
            None => Ok(None),
            Some(value) if range.contains(&value) => Ok(Some(value)),
            Some(value) => Err(CommandError::OutOfRange {
                arg: name.to_string(),
                value,
                min: *range.start(),
                max: *range.end(),
            }),
        }
    }

    fn take_u7(&mut self, name: &str, default: u8) -> Result<u8, CommandError> {
        Ok(self.take(name, 0..=127)?.map_or(default, |v| v as u8))
    }

    fn channel(&mut self) -> Result<Option<Channel>, CommandError> {
        Ok(self
            .take("ch", 1..=16)?
            .and_then(|n| Channel::from_number(n as u8)))
    }

    fn finish(self) -> Result<(), CommandError> {
        match self.values.into_keys().min() {
            Some(arg) => Err(CommandError::UnknownArgument {
                command: self.command.to_string(),
                arg,
            }),
            None => Ok(()),
        }
    }
}

fn parse_number(s: &str) -> Option<u32> {
    match s.strip_suffix(['h', 'H']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Command, CommandError> {
        line.parse()
    }

    fn ch(number: u8) -> Channel {
        Channel::from_number(number).unwrap()
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in CommandKind::all() {
            assert_eq!(kind.name().parse::<CommandKind>().unwrap(), kind);
        }
    }

    #[test]
    fn parses_arguments_and_defaults() {
        assert_eq!(
            parse("note_on").unwrap(),
            Command::NoteOn {
                channel: None,
                note: 60,
                velocity: 127
            }
        );
        assert_eq!(
            parse("  control_change cc=7 value=7Fh ch=10 ").unwrap(),
            Command::ControlChange {
                channel: Some(ch(10)),
                cc: 7,
                value: 127
            }
        );
        assert_eq!(
            parse("pitch_bend").unwrap(),
            Command::PitchBend {
                channel: None,
                value: 8192
            }
        );
    }

    #[test]
    fn shortcuts_resolve_to_control_changes() {
        assert_eq!(
            parse("channel_volume").unwrap(),
            Command::ControlChange {
                channel: None,
                cc: controller::CHANNEL_VOLUME,
                value: 127
            }
        );
        assert_eq!(
            parse("local_control value=0").unwrap(),
            Command::ControlChange {
                channel: None,
                cc: controller::LOCAL_CONTROL,
                value: 0
            }
        );
    }

    #[test]
    fn bank_select_from_bank_number() {
        let command = parse("bank_select bank=300 ch=3").unwrap();
        let bytes: Vec<Vec<u8>> = command
            .messages(ch(1))
            .into_iter()
            .map(MidiMessage::into_bytes)
            .collect();
        assert_eq!(bytes, vec![vec![0xB2, 0, 2], vec![0xB2, 32, 44]]);

        let command = parse("bank_select lsb=5").unwrap();
        assert_eq!(command.messages(ch(1)).len(), 1);

        assert!(matches!(
            parse("bank_select"),
            Err(CommandError::MissingArgument { .. })
        ));
    }

    #[test]
    fn default_channel_applies() {
        let command = parse("program_change program=4").unwrap();
        assert_eq!(command.messages(ch(5))[0].as_bytes(), &[0xC4, 4]);
    }

    #[test]
    fn system_commands() {
        let sysex = parse("system_exclusive F0 7E 7F 09 01 F7").unwrap();
        assert_eq!(
            sysex.messages(ch(1))[0].as_bytes(),
            &[0xF0, 0x7E, 0x7F, 0x09, 0x01, 0xF7]
        );
        assert_eq!(parse("system_exclusive value=F07E7F0901F7").unwrap(), sysex);

        let realtime = parse("system_realtime status=FAh").unwrap();
        assert_eq!(realtime.messages(ch(1))[0].as_bytes(), &[0xFA]);

        let common = parse("system_common status=F3h data1=2").unwrap();
        assert_eq!(common.messages(ch(1))[0].as_bytes(), &[0xF3, 2]);

        assert!(matches!(
            parse("system_common status=F2h data1=2"),
            Err(CommandError::InvalidMessage(_))
        ));
    }

    #[test]
    fn rejects_bad_commands() {
        assert_eq!(parse("   "), Err(CommandError::Empty));
        assert_eq!(
            parse("send_note_on"),
            Err(CommandError::UnknownCommand("send_note_on".into()))
        );
        assert_eq!(
            parse("note_on pitch=60"),
            Err(CommandError::UnknownArgument {
                command: "note_on".into(),
                arg: "pitch".into()
            })
        );
        assert_eq!(
            parse("note_on 60"),
            Err(CommandError::MalformedArgument { arg: "60".into() })
        );
        assert_eq!(
            parse("note_on note=sixty"),
            Err(CommandError::InvalidNumber {
                arg: "note".into(),
                value: "sixty".into()
            })
        );
        assert_eq!(
            parse("note_on note=128"),
            Err(CommandError::OutOfRange {
                arg: "note".into(),
                value: 128,
                min: 0,
                max: 127
            })
        );
        assert!(matches!(
            parse("note_on ch=17"),
            Err(CommandError::OutOfRange { .. })
        ));
        assert!(matches!(
            parse("system_exclusive F0 01 02"),
            Err(CommandError::InvalidMessage(_))
        ));
        assert_eq!(
            parse("system_realtime ch=3"),
            Err(CommandError::UnknownArgument {
                command: "system_realtime".into(),
                arg: "ch".into()
            })
        );
        assert_eq!(
            parse("system_common status=F3h data1=2 ch=1"),
            Err(CommandError::UnknownArgument {
                command: "system_common".into(),
                arg: "ch".into()
            })
        );
        assert_eq!(
            parse("bank_select bank=1 msb=5"),
            Err(CommandError::ConflictingArguments {
                command: "bank_select".into(),
                arg: "bank".into(),
                other: "msb".into()
            })
        );
        assert_eq!(
            parse("bank_select bank=1 lsb=5"),
            Err(CommandError::ConflictingArguments {
                command: "bank_select".into(),
                arg: "bank".into(),
                other: "lsb".into()
            })
        );
    }
}
