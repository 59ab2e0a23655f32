//! Configuration loading and validation

mod file_config;
mod loader;

pub use file_config::{
    Channels, ConfigError, DiscordChannel, FileConfig, Persistence, Settings, TelegramChannel,
};
pub use loader::ConfigLoader;
