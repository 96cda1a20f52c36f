//! Configuration: TOML settings file with one table per concern.
//!
//! ```no_run
//! use provision_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new("settings.toml");
//! config.load_or_create().unwrap();
//!
//! config.settings_mut().mirror.max_retries = 5;
//! config.update_section(ConfigSection::Mirror).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    ms, ConfigSection, LoggingSettings, MirrorSettings, PathSettings, PayloadSettings, Settings,
    TimingSettings, ToolSettings,
};
