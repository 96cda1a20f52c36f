//! Config manager: load, save, and section-level atomic updates.
//!
//! Writes go to `<file>.toml.tmp` and are renamed over the real file.
//! Section updates re-read the file and replace one table through
//! `toml_edit`, leaving the other tables (and their comments) as they are.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use super::settings::{ConfigSection, Settings};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Owns the settings file and the in-memory [`Settings`].
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

impl ConfigManager {
    /// Manager for `config_path`. Nothing is read until `load*` is called.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// In-memory changes persist only through `save()` or `update_section()`.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Load from disk; the file must exist.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        self.settings = toml::from_str(&content)?;
        Ok(())
    }

    /// Load from disk, writing defaults first if the file is missing.
    ///
    /// A file with unknown tables or missing keys is rewritten in full.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)?;
            let (settings, needs_rewrite) = Self::parse_and_check(&content)?;
            self.settings = settings;

            if needs_rewrite {
                tracing::info!(
                    "Normalizing config file {}",
                    self.config_path.display()
                );
                self.save()?;
            }
        } else {
            tracing::info!("Creating default config at {}", self.config_path.display());
            self.settings = Settings::default();
            self.save()?;
        }
        Ok(())
    }

    /// Create the backup and log folders.
    pub fn ensure_dirs_exist(&self) -> ConfigResult<()> {
        for dir in [self.backups_folder(), self.logs_folder()] {
            if !dir.exists() {
                fs::create_dir_all(&dir)?;
            }
        }
        Ok(())
    }

    pub fn payload_folder(&self) -> PathBuf {
        PathBuf::from(&self.settings.paths.payload_folder)
    }

    pub fn backups_folder(&self) -> PathBuf {
        PathBuf::from(&self.settings.paths.backups_folder)
    }

    pub fn logs_folder(&self) -> PathBuf {
        PathBuf::from(&self.settings.paths.logs_folder)
    }

    pub fn tools_folder(&self) -> PathBuf {
        PathBuf::from(&self.settings.paths.tools_folder)
    }

    fn parse_and_check(content: &str) -> ConfigResult<(Settings, bool)> {
        let doc: DocumentMut = content.parse()?;
        let settings: Settings = toml::from_str(content)?;

        let has_unknown = doc.iter().any(|(key, _)| {
            !ConfigSection::ALL
                .iter()
                .any(|section| section.table_name() == key)
        });

        // A missing key shows up as a difference in key count per table.
        let complete: DocumentMut = toml::to_string_pretty(&settings)?.parse()?;
        let has_missing = ConfigSection::ALL.iter().any(|section| {
            let name = section.table_name();
            let present = doc
                .get(name)
                .and_then(Item::as_table)
                .map(|t| t.len())
                .unwrap_or(0);
            let expected = complete
                .get(name)
                .and_then(Item::as_table)
                .map(|t| t.len())
                .unwrap_or(0);
            present < expected
        });

        Ok((settings, has_unknown || has_missing))
    }

    /// Write the full file atomically.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.render()?;
        self.atomic_write(&content)?;
        Ok(())
    }

    /// Replace one table on disk with the in-memory values.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let current = if self.config_path.exists() {
            fs::read_to_string(&self.config_path)?
        } else {
            String::new()
        };

        let mut doc: DocumentMut = if current.is_empty() {
            DocumentMut::new()
        } else {
            current.parse()?
        };

        let section_doc: DocumentMut = self.section_toml(section)?.parse()?;
        doc[section.table_name()] = Item::Table(section_doc.as_table().clone());

        self.atomic_write(&doc.to_string())?;
        Ok(())
    }

    fn section_toml(&self, section: ConfigSection) -> ConfigResult<String> {
        let s = &self.settings;
        let text = match section {
            ConfigSection::Paths => toml::to_string_pretty(&s.paths)?,
            ConfigSection::Tools => toml::to_string_pretty(&s.tools)?,
            ConfigSection::Payload => toml::to_string_pretty(&s.payload)?,
            ConfigSection::Timing => toml::to_string_pretty(&s.timing)?,
            ConfigSection::Mirror => toml::to_string_pretty(&s.mirror)?,
            ConfigSection::Logging => toml::to_string_pretty(&s.logging)?,
        };
        Ok(text)
    }

    /// Full file text, one commented table per section.
    fn render(&self) -> ConfigResult<String> {
        let mut output = String::from("# Device provisioner configuration\n\n");

        for section in ConfigSection::ALL {
            output.push_str(&format!("# {}\n", section.comment()));
            output.push_str(&format!("[{}]\n", section.table_name()));
            output.push_str(self.section_toml(section)?.trim_end());
            output.push_str("\n\n");
        }

        Ok(output)
    }

    fn atomic_write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.config_path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &self.config_path)
    }
}
