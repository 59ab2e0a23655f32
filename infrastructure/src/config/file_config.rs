//! Configuration file schema
//!
//! The TOML surface mirrors what the system needs to run one recurring
//! cycle: a `[settings]` block with the group title and schedule, a
//! `[[persons]]` roster, credentials for the channels in use, and an
//! optional `[persistence]` path for the durable pending-request store.
//!
//! ```toml
//! [settings]
//! title = "Game Night"
//! interval = 7
//! offset = 2
//! utc_offset_minutes = -300
//! contact = "Sun 10:00"
//! deadline = "Mon 10:00"
//!
//! [[persons]]
//! name = "Alice"
//! request_channel = "discord"
//! response_channel = "discord"
//! id = "189234657123456789"
//!
//! [channels.discord]
//! token = "..."
//!
//! [persistence]
//! path = "freeday-pending.json"
//! ```

use crate::timer::{TriggerError, TriggerSpec};
use chrono::FixedOffset;
use freeday_application::CycleSettings;
use freeday_domain::{Person, Roster};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors found while loading or validating configuration.
///
/// All of these are fatal at startup, before any cycle runs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration could not be loaded: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("No persons configured")]
    NoPersons,

    #[error("Duplicate person name: {0}")]
    DuplicatePerson(String),

    #[error("Person '{person}' uses channel '{channel}', which has no configuration")]
    UnknownChannel { person: String, channel: String },

    #[error("Interval must cover at least one day")]
    InvalidInterval,

    #[error("UTC offset out of range: {0} minutes")]
    InvalidUtcOffset(i32),

    #[error("Invalid {which} trigger: {source}")]
    InvalidTrigger {
        which: &'static str,
        source: TriggerError,
    },
}

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub settings: Settings,
    pub persons: Vec<Person>,
    pub channels: Channels,
    pub persistence: Persistence,
}

/// `[settings]` block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Title of the group, shown in every channel message
    pub title: String,
    /// Stable name scoping durable records; defaults to the title
    pub owner: Option<String>,
    /// How many days to ask availability for each cycle
    pub interval: u32,
    /// Days after the contact day before the asked-about window starts
    pub offset: u32,
    /// Timezone as a fixed offset from UTC, in minutes
    pub utc_offset_minutes: i32,
    /// When persons are contacted ("Sun 10:00" weekly, "10:00" daily)
    pub contact: String,
    /// When collection closes and results go out
    pub deadline: String,
    /// Bound, in seconds, on the deadline's wait for background collection
    pub collect_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            title: "freeday".to_string(),
            owner: None,
            interval: 7,
            offset: 1,
            utc_offset_minutes: 0,
            contact: "Sun 10:00".to_string(),
            deadline: "Mon 10:00".to_string(),
            collect_timeout_secs: 60,
        }
    }
}

/// `[channels]` block: credentials per supported channel
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Channels {
    pub discord: Option<DiscordChannel>,
    pub telegram: Option<TelegramChannel>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscordChannel {
    /// Bot token
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelegramChannel {
    /// Bot token
    pub token: String,
}

/// `[persistence]` block
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Persistence {
    /// Path of the durable pending-request store; absent means in-memory
    /// only (a restart mid-cycle then loses the in-flight handles)
    pub path: Option<PathBuf>,
}

impl FileConfig {
    /// Validate everything that must hold before the first cycle runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.persons.is_empty() {
            return Err(ConfigError::NoPersons);
        }

        let mut seen = HashSet::new();
        for person in &self.persons {
            if !seen.insert(person.name.as_str()) {
                return Err(ConfigError::DuplicatePerson(person.name.clone()));
            }
            for channel in [&person.request_channel, &person.response_channel] {
                if !self.channel_configured(channel) {
                    return Err(ConfigError::UnknownChannel {
                        person: person.name.clone(),
                        channel: channel.clone(),
                    });
                }
            }
        }

        if self.settings.interval == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        self.tz()?;
        self.contact_spec()?;
        self.deadline_spec()?;
        Ok(())
    }

    fn channel_configured(&self, name: &str) -> bool {
        match name {
            "discord" => self.channels.discord.is_some(),
            "telegram" => self.channels.telegram.is_some(),
            _ => false,
        }
    }

    /// The stable owner name scoping durable records.
    pub fn owner(&self) -> &str {
        self.settings
            .owner
            .as_deref()
            .unwrap_or(&self.settings.title)
    }

    pub fn tz(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.settings.utc_offset_minutes * 60)
            .ok_or(ConfigError::InvalidUtcOffset(self.settings.utc_offset_minutes))
    }

    pub fn contact_spec(&self) -> Result<TriggerSpec, ConfigError> {
        TriggerSpec::parse(&self.settings.contact).map_err(|source| ConfigError::InvalidTrigger {
            which: "contact",
            source,
        })
    }

    pub fn deadline_spec(&self) -> Result<TriggerSpec, ConfigError> {
        TriggerSpec::parse(&self.settings.deadline).map_err(|source| {
            ConfigError::InvalidTrigger {
                which: "deadline",
                source,
            }
        })
    }

    pub fn roster(&self) -> Roster {
        Roster::new(self.persons.clone())
    }

    /// The orchestrator settings this configuration describes.
    pub fn cycle_settings(&self) -> Result<CycleSettings, ConfigError> {
        Ok(CycleSettings {
            owner: self.owner().to_string(),
            title: self.settings.title.clone(),
            offset: self.settings.offset,
            interval: self.settings.interval,
            collect_timeout: Duration::from_secs(self.settings.collect_timeout_secs),
            tz: self.tz()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> FileConfig {
        let mut config = FileConfig::default();
        config.persons = vec![Person {
            name: "Alice".to_string(),
            request_channel: "discord".to_string(),
            response_channel: "discord".to_string(),
            channel_id: "1".to_string(),
        }];
        config.channels.discord = Some(DiscordChannel {
            token: "token".to_string(),
        });
        config
    }

    #[test]
    fn test_valid_config_passes() {
        valid().validate().unwrap();
    }

    #[test]
    fn test_empty_roster_is_fatal() {
        let mut config = valid();
        config.persons.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoPersons)));
    }

    #[test]
    fn test_duplicate_person_is_fatal() {
        let mut config = valid();
        config.persons.push(config.persons[0].clone());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicatePerson(name)) if name == "Alice"
        ));
    }

    #[test]
    fn test_unconfigured_channel_is_fatal() {
        let mut config = valid();
        config.persons[0].response_channel = "telegram".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownChannel { channel, .. }) if channel == "telegram"
        ));
    }

    #[test]
    fn test_bad_trigger_is_fatal() {
        let mut config = valid();
        config.settings.deadline = "whenever".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTrigger { which: "deadline", .. })
        ));
    }

    #[test]
    fn test_bad_utc_offset_is_fatal() {
        let mut config = valid();
        config.settings.utc_offset_minutes = 100_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUtcOffset(_))
        ));
    }

    #[test]
    fn test_owner_falls_back_to_title() {
        let mut config = valid();
        config.settings.title = "Game Night".to_string();
        assert_eq!(config.owner(), "Game Night");

        config.settings.owner = Some("game-night".to_string());
        assert_eq!(config.owner(), "game-night");
    }

    #[test]
    fn test_toml_round_trip() {
        let raw = r#"
            [settings]
            title = "Game Night"
            interval = 5
            offset = 2
            contact = "Sat 09:00"
            deadline = "Sun 09:00"

            [[persons]]
            name = "Alice"
            request_channel = "discord"
            response_channel = "discord"
            id = "42"

            [channels.discord]
            token = "secret"
        "#;

        let config: FileConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.settings.interval, 5);
        assert_eq!(config.persons[0].channel_id, "42");
        config.validate().unwrap();

        let settings = config.cycle_settings().unwrap();
        assert_eq!(settings.owner, "Game Night");
        assert_eq!(settings.collect_timeout, Duration::from_secs(60));
    }
}
