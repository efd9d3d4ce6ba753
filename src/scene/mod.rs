mod command;

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

pub use command::{Command, CommandKind};

use crate::error::SceneError;
use crate::midi::{Channel, MidiMessage};
use crate::sequencer::MidiSender;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scene {
    pub name: String,
    pub title: String,
    pub on_enter: Vec<Command>,
    pub on_exit: Vec<Command>,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            name,
            on_enter: Vec::new(),
            on_exit: Vec::new(),
        }
    }
}

/// Fires scene commands into a sequencer when the active scene changes.
pub struct SceneEngine {
    scenes: ArcSwap<Vec<Scene>>,
    current: Mutex<Option<String>>,
    sender: MidiSender,
    default_channel: Channel,
}

impl SceneEngine {
    pub fn new(scenes: Vec<Scene>, sender: MidiSender, default_channel: Channel) -> Self {
        Self {
            scenes: ArcSwap::from_pointee(scenes),
            current: Mutex::new(None),
            sender,
            default_channel,
        }
    }

    pub fn scenes(&self) -> Arc<Vec<Scene>> {
        self.scenes.load_full()
    }

    pub fn current(&self) -> Option<String> {
        self.current.lock().clone()
    }

    /// Leaves the current scene and enters `name`.
    ///
    /// The current scene's exit commands are queued first, then the new
    /// scene's enter commands. Within each list a command is delayed by its
    /// position, one tick apart. Switching to the active scene fires its exit
    /// and enter lists again.
    pub fn switch_to(&self, name: &str) -> Result<(), SceneError> {
        let scenes = self.scenes.load();
        let next = scenes
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| SceneError::UnknownScene(name.to_string()))?;

        let mut current = self.current.lock();
        let mut batch = Vec::new();
        if let Some(previous) = current
            .as_deref()
            .and_then(|c| scenes.iter().find(|s| s.name == c))
        {
            tracing::debug!(scene = %previous.name, commands = previous.on_exit.len(), "exit");
            self.collect(&previous.on_exit, &mut batch);
        }

        tracing::info!(scene = %next.name, commands = next.on_enter.len(), "enter");
        self.collect(&next.on_enter, &mut batch);
        self.sender.enqueue_all(batch)?;
        *current = Some(next.name.clone());
        Ok(())
    }

    fn collect(&self, commands: &[Command], batch: &mut Vec<(MidiMessage, u64)>) {
        for (index, command) in commands.iter().enumerate() {
            for message in command.messages(self.default_channel) {
                batch.push((message, index as u64));
            }
        }
    }

    /// Replaces the scene table. The current scene is kept if a scene of the
    /// same name still exists.
    pub fn reload(&self, scenes: Vec<Scene>) {
        let mut current = self.current.lock();
        if let Some(name) = current.as_deref() {
            if !scenes.iter().any(|s| s.name == name) {
                tracing::info!(scene = name, "current scene removed by reload");
                *current = None;
            }
        }
        self.scenes.store(Arc::new(scenes));
        tracing::debug!("scene table reloaded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Sequencer;
    use crate::midi::{MemoryPort, MemoryPortLog};
    use crate::timing::{ClockDriver, ManualClock, manual_clock};

    fn scene(name: &str, enter: &[&str], exit: &[&str]) -> Scene {
        Scene {
            on_enter: enter.iter().map(|l| l.parse().unwrap()).collect(),
            on_exit: exit.iter().map(|l| l.parse().unwrap()).collect(),
            ..Scene::new(name)
        }
    }

    fn setup() -> (Sequencer<ManualClock>, ClockDriver, MemoryPortLog, SceneEngine) {
        let (clock, driver) = manual_clock();
        let sequencer = Sequencer::with_clock(clock);
        let port = MemoryPort::new("out");
        let log = port.log();
        sequencer.set_output(port).unwrap();
        sequencer.start().unwrap();

        let scenes = vec![
            scene(
                "verse",
                &["program_change program=1", "channel_volume value=90"],
                &["all_notes_off"],
            ),
            scene("chorus", &["program_change program=2 ch=2"], &[]),
        ];
        let engine = SceneEngine::new(
            scenes,
            sequencer.sender(),
            Channel::from_number(1).unwrap(),
        );
        (sequencer, driver, log, engine)
    }

    #[test]
    fn enter_commands_are_one_tick_apart() {
        let (_sequencer, driver, log, engine) = setup();
        engine.switch_to("verse").unwrap();
        assert_eq!(engine.current().as_deref(), Some("verse"));

        assert!(driver.tick());
        assert_eq!(log.sent(), vec![vec![0xC0, 1]]);
        assert!(driver.tick());
        assert_eq!(log.sent(), vec![vec![0xC0, 1], vec![0xB0, 7, 90]]);
    }

    #[test]
    fn exit_commands_precede_enter_commands() {
        let (sequencer, driver, log, engine) = setup();
        engine.switch_to("verse").unwrap();
        driver.advance(2);
        engine.switch_to("chorus").unwrap();
        assert_eq!(sequencer.pending(), 2);
        driver.advance(1);

        let sent = log.sent();
        assert_eq!(&sent[2..], &[vec![0xB0, 123, 0], vec![0xC1, 2]]);
    }

    #[test]
    fn unknown_scene_leaves_state_alone() {
        let (sequencer, _driver, _log, engine) = setup();
        engine.switch_to("verse").unwrap();
        let pending = sequencer.pending();
        assert!(matches!(
            engine.switch_to("bridge"),
            Err(SceneError::UnknownScene(_))
        ));
        assert_eq!(sequencer.pending(), pending);
        assert_eq!(engine.current().as_deref(), Some("verse"));
    }

    #[test]
    fn reload_drops_missing_current_scene() {
        let (_sequencer, _driver, _log, engine) = setup();
        engine.switch_to("chorus").unwrap();
        engine.reload(vec![scene("chorus", &[], &[]), scene("outro", &[], &[])]);
        assert_eq!(engine.current().as_deref(), Some("chorus"));
        engine.reload(vec![scene("outro", &[], &[])]);
        assert_eq!(engine.current(), None);
        assert_eq!(engine.scenes().len(), 1);
    }

    #[test]
    fn closed_sequencer_is_reported() {
        let (sequencer, _driver, _log, engine) = setup();
        sequencer.shutdown().unwrap();
        assert!(matches!(
            engine.switch_to("verse"),
            Err(SceneError::Sequencer(crate::SequencerError::SequencerClosed))
        ));
        assert_eq!(engine.current(), None);
    }
}
