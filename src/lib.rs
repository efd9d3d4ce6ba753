//! Scene-driven MIDI output.
//!
//! The [`Sequencer`] owns a MIDI output port and a queue of messages tagged
//! with a delay in ticks; a background thread writes each message once its
//! tick comes up. [`SceneEngine`] turns scene changes into queued messages.

pub mod config;
pub mod error;
pub mod midi;
pub mod scene;
pub mod sequencer;
pub mod timing;

pub use config::AppConfig;
pub use error::{
    CommandError, ConfigError, InvalidMessage, PortError, Result, SceneError, SequencerError,
};
pub use midi::{Channel, MidiMessage, MidirOutput, OutputPort};
pub use scene::{Command, CommandKind, Scene, SceneEngine};
pub use sequencer::{MidiSender, Sequencer, SequencerState, TransmissionFailure};
pub use timing::{Clock, IntervalClock, ManualClock, manual_clock};
