use thiserror::Error;

/// Result alias for sequencer operations.
pub type Result<T> = std::result::Result<T, SequencerError>;

/// Errors returned synchronously by [`Sequencer`](crate::Sequencer) operations.
#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("invalid MIDI message: {0}")]
    InvalidMessage(#[from] InvalidMessage),
    #[error("MIDI output port unavailable: {0}")]
    PortUnavailable(#[source] PortError),
    #[error("sequencer closed")]
    SequencerClosed,
}

/// Why a byte sequence is not a complete MIDI 1.0 message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidMessage {
    #[error("message is empty")]
    Empty,
    #[error("first byte {byte:#04x} is not a status byte")]
    MissingStatus { byte: u8 },
    #[error("status byte {status:#04x} is undefined")]
    UndefinedStatus { status: u8 },
    #[error("status {status:#04x} takes {expected} data byte(s), got {actual}")]
    WrongLength {
        status: u8,
        expected: usize,
        actual: usize,
    },
    #[error("data byte {byte:#04x} at position {index} has its top bit set")]
    DataByteOutOfRange { index: usize, byte: u8 },
    #[error("system exclusive message is not terminated by 0xf7")]
    UnterminatedSysex,
    #[error("invalid hex string {0:?}")]
    InvalidHex(String),
}

/// Failures opening or writing to a MIDI output port.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("failed to initialise MIDI output: {0}")]
    Init(String),
    #[error("no MIDI output port matches {0:?}")]
    NotFound(String),
    #[error("failed to connect to {port:?}: {reason}")]
    Connect { port: String, reason: String },
    #[error("failed to send to {port:?}: {reason}")]
    Send { port: String, reason: String },
    #[error("no output port connected")]
    NotConnected,
}

/// A scene command that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("command {command:?} does not take argument {arg:?}")]
    UnknownArgument { command: String, arg: String },
    #[error("command {command:?} requires argument {arg:?}")]
    MissingArgument { command: String, arg: String },
    #[error("command {command:?} cannot combine {arg:?} with {other:?}")]
    ConflictingArguments {
        command: String,
        arg: String,
        other: String,
    },
    #[error("argument {arg:?} is not of the form name=value")]
    MalformedArgument { arg: String },
    #[error("argument {arg:?} has invalid number {value:?}")]
    InvalidNumber { arg: String, value: String },
    #[error("argument {arg:?} value {value} is out of range {min}..={max}")]
    OutOfRange {
        arg: String,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error(transparent)]
    InvalidMessage(#[from] InvalidMessage),
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("unknown scene {0:?}")]
    UnknownScene(String),
    #[error(transparent)]
    Sequencer(#[from] SequencerError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),
    #[error("scene {scene:?}: {source}")]
    Command {
        scene: String,
        #[source]
        source: CommandError,
    },
    #[error("scene {0:?} is defined more than once")]
    DuplicateScene(String),
    #[error("default scene {0:?} is not defined")]
    UnknownDefaultScene(String),
    #[error("default channel {0} is out of range 1..=16")]
    InvalidChannel(u8),
}
