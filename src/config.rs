use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::midi::Channel;
use crate::scene::{Command, Scene};
use crate::timing::DEFAULT_TICK_PERIOD;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub midi: MidiConfig,
    pub default_scene: Option<String>,
    pub scenes: Vec<SceneConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiConfig {
    pub client_name: String,
    /// Output port name, name fragment or index.
    pub port: Option<String>,
    /// Channel 1..=16 for commands without `ch=`.
    pub channel: u8,
    pub tick_period_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub on_enter: Vec<String>,
    #[serde(default)]
    pub on_exit: Vec<String>,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            client_name: "scenemidi".to_string(),
            port: None,
            channel: 1,
            tick_period_ms: DEFAULT_TICK_PERIOD.as_millis() as u64,
        }
    }
}

impl AppConfig {
    /// Reads and validates a RON config file. Every scene command is parsed
    /// here, so a typo fails the load instead of a later scene change.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_ron(&text)?;
        tracing::debug!(path = %path.display(), scenes = config.scenes.len(), "config loaded");
        Ok(config)
    }

    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = ron::from_str(text)?;
        config.scenes()?;
        config.default_channel()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn default_channel(&self) -> Result<Channel, ConfigError> {
        Channel::from_number(self.midi.channel).ok_or(ConfigError::InvalidChannel(self.midi.channel))
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.midi.tick_period_ms.max(1))
    }

    /// Builds the scene table, checking names are unique and the default
    /// scene exists.
    pub fn scenes(&self) -> Result<Vec<Scene>, ConfigError> {
        let mut seen = HashSet::new();
        let mut scenes = Vec::with_capacity(self.scenes.len());
        for config in &self.scenes {
            if !seen.insert(config.name.as_str()) {
                return Err(ConfigError::DuplicateScene(config.name.clone()));
            }
            scenes.push(config.build()?);
        }

        if let Some(default) = &self.default_scene {
            if !seen.contains(default.as_str()) {
                return Err(ConfigError::UnknownDefaultScene(default.clone()));
            }
        }
        Ok(scenes)
    }
}

impl SceneConfig {
    fn build(&self) -> Result<Scene, ConfigError> {
        let parse = |lines: &[String]| -> Result<Vec<Command>, ConfigError> {
            lines
                .iter()
                .filter(|line| !line.trim().is_empty())
                .map(|line| {
                    line.parse::<Command>().map_err(|source| ConfigError::Command {
                        scene: self.name.clone(),
                        source,
                    })
                })
                .collect()
        };

        Ok(Scene {
            name: self.name.clone(),
            title: self.title.clone().unwrap_or_else(|| self.name.clone()),
            on_enter: parse(&self.on_enter)?,
            on_exit: parse(&self.on_exit)?,
        })
    }
}
