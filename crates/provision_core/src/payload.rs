//! Payload layout on the host and paths on the device.
//!
//! The payload folder and every backup share one layout:
//!
//! ```text
//! <root>/
//!   apk_files/<package files>
//!   sdcard/files/...
//!   data/files/...
//!   data/MainDatabase.db
//!   data/<package>_preferences.xml
//!   backup_info.json          (backups only)
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::device::{Device, DeviceAddress};

pub const DATABASE_FILE: &str = "MainDatabase.db";
pub const BACKUP_PREFIX: &str = "backup_";
pub const BACKUP_INFO_FILE: &str = "backup_info.json";

/// Host-side payload tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadLayout {
    root: PathBuf,
}

impl PayloadLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn apk_dir(&self) -> PathBuf {
        self.root.join("apk_files")
    }

    pub fn package_file(&self, name: &str) -> PathBuf {
        self.apk_dir().join(name)
    }

    pub fn sdcard_dir(&self) -> PathBuf {
        self.root.join("sdcard")
    }

    pub fn sdcard_files(&self) -> PathBuf {
        self.sdcard_dir().join("files")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn data_files(&self) -> PathBuf {
        self.data_dir().join("files")
    }

    pub fn database(&self) -> PathBuf {
        self.data_dir().join(DATABASE_FILE)
    }

    pub fn preferences(&self, package: &str) -> PathBuf {
        self.data_dir().join(format!("{}_preferences.xml", package))
    }

    pub fn info_file(&self) -> PathBuf {
        self.root.join(BACKUP_INFO_FILE)
    }

    /// Create `apk_files/`, `sdcard/` and `data/`.
    pub fn create_dirs(&self) -> io::Result<()> {
        for dir in [self.apk_dir(), self.sdcard_dir(), self.data_dir()] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Regular files below `path`, recursively. Zero if it doesn't exist.
pub fn count_files(path: &Path) -> usize {
    WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .count()
}

/// On-device locations for one application package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePaths {
    package: String,
}

impl DevicePaths {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// `/data/data/<pkg>`
    pub fn data_dir(&self) -> String {
        format!("/data/data/{}", self.package)
    }

    pub fn files_dir(&self) -> String {
        format!("{}/files", self.data_dir())
    }

    pub fn databases_dir(&self) -> String {
        format!("{}/databases", self.data_dir())
    }

    pub fn shared_prefs_dir(&self) -> String {
        format!("{}/shared_prefs", self.data_dir())
    }

    pub fn database_file(&self) -> String {
        format!("{}/{}", self.databases_dir(), DATABASE_FILE)
    }

    pub fn preferences_file(&self) -> String {
        format!("{}/{}_preferences.xml", self.shared_prefs_dir(), self.package)
    }

    /// `/sdcard/Android/data/<pkg>`
    pub fn external_dir(&self) -> String {
        format!("/sdcard/Android/data/{}", self.package)
    }

    pub fn external_files_dir(&self) -> String {
        format!("{}/files", self.external_dir())
    }

    /// Directories created before payload transfer.
    pub fn transfer_dirs(&self) -> [String; 4] {
        [
            self.files_dir(),
            self.databases_dir(),
            self.shared_prefs_dir(),
            self.external_files_dir(),
        ]
    }
}

/// Where an install takes its payload from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InstallSource {
    /// The configured payload folder.
    #[default]
    Payload,
    /// A named backup under the backups folder.
    Backup(String),
}

impl InstallSource {
    pub fn resolve(&self, payload_folder: &Path, backups_folder: &Path) -> PayloadLayout {
        match self {
            InstallSource::Payload => PayloadLayout::new(payload_folder),
            InstallSource::Backup(name) => PayloadLayout::new(backups_folder.join(name)),
        }
    }
}

/// Contents of `backup_info.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub device_ip: String,
    pub device_port: u16,
    pub device_model: Option<String>,
    pub android_version: Option<String>,
    /// `YYYYmmdd_HHMMSS`
    pub timestamp: String,
    pub backup_name: String,
}

impl BackupMetadata {
    pub fn new(device: &Device, timestamp: impl Into<String>) -> Self {
        let timestamp = timestamp.into();
        Self {
            device_ip: device.address.ip.clone(),
            device_port: device.address.port,
            device_model: device.model.clone(),
            android_version: device.version.clone(),
            backup_name: backup_dir_name(&device.address, &timestamp),
            timestamp,
        }
    }

    pub fn write_to(&self, layout: &PayloadLayout) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(layout.info_file(), json)
    }

    pub fn read_from(layout: &PayloadLayout) -> Option<Self> {
        let text = fs::read_to_string(layout.info_file()).ok()?;
        serde_json::from_str(&text).ok()
    }
}

/// Current local time as `YYYYmmdd_HHMMSS`.
pub fn backup_timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// `backup_<ip with dots as underscores>_<timestamp>`
pub fn backup_dir_name(address: &DeviceAddress, timestamp: &str) -> String {
    format!("{}{}_{}", BACKUP_PREFIX, address.file_safe_ip(), timestamp)
}

/// One backup folder found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub name: String,
    pub path: PathBuf,
    pub metadata: Option<BackupMetadata>,
}

/// Backup folders under `backups_folder`, newest first.
///
/// A missing folder yields an empty list.
pub fn list_backups(backups_folder: &Path) -> Vec<BackupEntry> {
    let entries = match fs::read_dir(backups_folder) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("No backups in {}: {}", backups_folder.display(), e);
            return Vec::new();
        }
    };

    let mut backups: Vec<BackupEntry> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(BACKUP_PREFIX) {
                return None;
            }
            let path = entry.path();
            Some(BackupEntry {
                metadata: BackupMetadata::read_from(&PayloadLayout::new(&path)),
                name,
                path,
            })
        })
        .collect();

    backups.sort_by(|a, b| b.name.cmp(&a.name));
    backups
}
