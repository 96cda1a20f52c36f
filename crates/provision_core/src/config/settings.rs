//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::GuardTiming;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Folder layout.
    #[serde(default)]
    pub paths: PathSettings,

    /// External executables.
    #[serde(default)]
    pub tools: ToolSettings,

    /// What gets installed and how the device is configured.
    #[serde(default)]
    pub payload: PayloadSettings,

    /// Delays, poll intervals and command timeouts.
    #[serde(default)]
    pub timing: TimingSettings,

    /// Screen mirroring.
    #[serde(default)]
    pub mirror: MirrorSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Identifies one TOML table of the settings file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Paths,
    Tools,
    Payload,
    Timing,
    Mirror,
    Logging,
}

impl ConfigSection {
    pub const ALL: [ConfigSection; 6] = [
        ConfigSection::Paths,
        ConfigSection::Tools,
        ConfigSection::Payload,
        ConfigSection::Timing,
        ConfigSection::Mirror,
        ConfigSection::Logging,
    ];

    /// TOML table name.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Tools => "tools",
            ConfigSection::Payload => "payload",
            ConfigSection::Timing => "timing",
            ConfigSection::Mirror => "mirror",
            ConfigSection::Logging => "logging",
        }
    }

    /// Comment written above the table in generated files.
    pub fn comment(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "Payload, backup, log and bundled tool folders",
            ConfigSection::Tools => "Device tool and mirror tool executables",
            ConfigSection::Payload => "Installed application and device configuration",
            ConfigSection::Timing => "Delays, poll intervals and timeouts (milliseconds)",
            ConfigSection::Mirror => "Screen mirroring window and retry policy",
            ConfigSection::Logging => "Logging configuration",
        }
    }
}

/// Folder layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Payload root (apk_files/, sdcard/, data/).
    #[serde(default = "default_payload_folder")]
    pub payload_folder: String,

    /// Where backups are written and listed from.
    #[serde(default = "default_backups_folder")]
    pub backups_folder: String,

    /// Folder for log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,

    /// Bundled device tool / mirror tool folder.
    #[serde(default = "default_tools_folder")]
    pub tools_folder: String,
}

fn default_payload_folder() -> String {
    "install_files".to_string()
}

fn default_backups_folder() -> String {
    "backups".to_string()
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

fn default_tools_folder() -> String {
    "tools".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            payload_folder: default_payload_folder(),
            backups_folder: default_backups_folder(),
            logs_folder: default_logs_folder(),
            tools_folder: default_tools_folder(),
        }
    }
}

/// External executables (bare names are looked up in the tools folder, then PATH).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    #[serde(default = "default_device_tool")]
    pub device_tool: String,

    #[serde(default = "default_mirror_tool")]
    pub mirror_tool: String,
}

fn default_device_tool() -> String {
    "adb".to_string()
}

fn default_mirror_tool() -> String {
    "scrcpy".to_string()
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            device_tool: default_device_tool(),
            mirror_tool: default_mirror_tool(),
        }
    }
}

/// Application payload and device configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadSettings {
    /// Package name of the provisioned application.
    #[serde(default = "default_app_package")]
    pub app_package: String,

    /// Package files under `apk_files/`, installed in this order.
    #[serde(default = "default_package_files")]
    pub package_files: Vec<String>,

    /// Runtime permissions granted to the app.
    #[serde(default = "default_permissions")]
    pub permissions: Vec<String>,

    /// Activity set as default home (relative to the package).
    #[serde(default = "default_home_activity")]
    pub home_activity: String,

    /// `system_locales` value.
    #[serde(default = "default_locale")]
    pub locale: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_country")]
    pub country: String,

    /// Input method enabled and selected on the device.
    #[serde(default = "default_keyboard_ime")]
    pub keyboard_ime: String,

    /// File name used for the package binary in backups.
    #[serde(default = "default_backup_apk_name")]
    pub backup_apk_name: String,
}

fn default_app_package() -> String {
    "com.releasetech.eightpresso.basic".to_string()
}

fn default_package_files() -> Vec<String> {
    vec![
        "rustdesk-1.1.9.apk".to_string(),
        "hangulkeyboard.apk".to_string(),
        "EasyCard-A_v1.0.3.0_mod.apk".to_string(),
        "EightPresso.apk".to_string(),
    ]
}

fn default_permissions() -> Vec<String> {
    [
        "android.permission.WRITE_SECURE_SETTINGS",
        "android.permission.ACCESS_FINE_LOCATION",
        "android.permission.ACCESS_COARSE_LOCATION",
        "android.permission.READ_EXTERNAL_STORAGE",
        "android.permission.WRITE_EXTERNAL_STORAGE",
        "android.permission.CAMERA",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

fn default_home_activity() -> String {
    ".MainActivity".to_string()
}

fn default_locale() -> String {
    "ko-KR".to_string()
}

fn default_language() -> String {
    "ko".to_string()
}

fn default_country() -> String {
    "KR".to_string()
}

fn default_keyboard_ime() -> String {
    "com.google.android.inputmethod.korean/.KoreanIme".to_string()
}

fn default_backup_apk_name() -> String {
    "EightPresso.apk".to_string()
}

impl Default for PayloadSettings {
    fn default() -> Self {
        Self {
            app_package: default_app_package(),
            package_files: default_package_files(),
            permissions: default_permissions(),
            home_activity: default_home_activity(),
            locale: default_locale(),
            language: default_language(),
            country: default_country(),
            keyboard_ime: default_keyboard_ime(),
            backup_apk_name: default_backup_apk_name(),
        }
    }
}

impl PayloadSettings {
    /// `<package>/<activity>` component for the home app.
    pub fn home_component(&self) -> String {
        format!("{}/{}", self.app_package, self.home_activity)
    }

    /// Preferences file name (`<package>_preferences.xml`).
    pub fn preferences_file(&self) -> String {
        format!("{}_preferences.xml", self.app_package)
    }
}

/// Delays, poll intervals and timeouts, all in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub command_timeout_ms: u64,
    pub install_timeout_ms: u64,
    pub state_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    pub connect_attempts: u32,
    pub ready_poll_interval_ms: u64,
    pub root_restart_delay_ms: u64,
    pub root_ready_wait_ms: u64,
    pub launch_settle_ms: u64,
    pub mirror_settle_ms: u64,
    pub transfer_attempts: u32,
    pub transfer_retry_delay_ms: u64,
    pub sdcard_push_timeout_ms: u64,
    pub app_files_push_timeout_ms: u64,
    pub database_push_timeout_ms: u64,
    pub preferences_push_timeout_ms: u64,
    pub pull_timeout_ms: u64,
    pub reboot_initial_delay_ms: u64,
    pub reboot_ready_wait_ms: u64,
    pub post_reboot_settle_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            command_timeout_ms: 60_000,
            install_timeout_ms: 120_000,
            state_timeout_ms: 5_000,
            connect_timeout_ms: 10_000,
            reconnect_delay_ms: 2_000,
            connect_attempts: 3,
            ready_poll_interval_ms: 2_000,
            root_restart_delay_ms: 3_000,
            root_ready_wait_ms: 30_000,
            launch_settle_ms: 5_000,
            mirror_settle_ms: 3_000,
            transfer_attempts: 3,
            transfer_retry_delay_ms: 2_000,
            sdcard_push_timeout_ms: 600_000,
            app_files_push_timeout_ms: 300_000,
            database_push_timeout_ms: 120_000,
            preferences_push_timeout_ms: 60_000,
            pull_timeout_ms: 300_000,
            reboot_initial_delay_ms: 5_000,
            reboot_ready_wait_ms: 60_000,
            post_reboot_settle_ms: 5_000,
        }
    }
}

impl TimingSettings {
    /// Every delay zero and every timeout short; for driving fakes.
    pub fn immediate() -> Self {
        Self {
            command_timeout_ms: 100,
            install_timeout_ms: 100,
            state_timeout_ms: 100,
            connect_timeout_ms: 100,
            reconnect_delay_ms: 0,
            connect_attempts: 3,
            ready_poll_interval_ms: 0,
            root_restart_delay_ms: 0,
            root_ready_wait_ms: 0,
            launch_settle_ms: 0,
            mirror_settle_ms: 0,
            transfer_attempts: 3,
            transfer_retry_delay_ms: 0,
            sdcard_push_timeout_ms: 100,
            app_files_push_timeout_ms: 100,
            database_push_timeout_ms: 100,
            preferences_push_timeout_ms: 100,
            pull_timeout_ms: 100,
            reboot_initial_delay_ms: 0,
            reboot_ready_wait_ms: 0,
            post_reboot_settle_ms: 0,
        }
    }

    pub fn guard_timing(&self) -> GuardTiming {
        GuardTiming {
            state_timeout: ms(self.state_timeout_ms),
            connect_timeout: ms(self.connect_timeout_ms),
            reconnect_delay: ms(self.reconnect_delay_ms),
        }
    }
}

/// Screen mirroring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorSettings {
    /// Start mirroring during installs.
    pub enabled: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Failed attempts allowed before giving up.
    pub max_retries: u32,
    /// Prefix of the per-attempt window correlation title.
    pub title_prefix: String,
    pub probe_timeout_ms: u64,
    pub initial_search_delay_ms: u64,
    pub search_interval_ms: u64,
    pub monitor_interval_ms: u64,
    pub retry_delay_ms: u64,
    pub reconnect_delay_ms: u64,
    pub terminate_grace_ms: u64,
    pub kill_grace_ms: u64,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            window_width: 960,
            window_height: 540,
            max_retries: 10,
            title_prefix: "RT1018_EMBED".to_string(),
            probe_timeout_ms: 10_000,
            initial_search_delay_ms: 2_000,
            search_interval_ms: 1_000,
            monitor_interval_ms: 1_000,
            retry_delay_ms: 5_000,
            reconnect_delay_ms: 2_000,
            terminate_grace_ms: 5_000,
            kill_grace_ms: 2_000,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Keep device-tool output out of the log unless a step fails.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Number of device-tool output lines shown after a failure.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Prefix log lines with the time of day.
    #[serde(default = "default_true")]
    pub show_timestamps: bool,
}

fn default_true() -> bool {
    true
}

fn default_error_tail() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            compact: true,
            error_tail: default_error_tail(),
            show_timestamps: true,
        }
    }
}

/// Milliseconds to `Duration`.
pub fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_fills_defaults() {
        let settings: Settings = toml::from_str(
            "[payload]\napp_package = \"com.example.kiosk\"\n[timing]\nreboot_ready_wait_ms = 90000\n",
        )
        .unwrap();

        assert_eq!(settings.payload.app_package, "com.example.kiosk");
        assert_eq!(settings.payload.package_files.len(), 4);
        assert_eq!(settings.timing.reboot_ready_wait_ms, 90_000);
        assert_eq!(settings.timing.root_ready_wait_ms, 30_000);
        assert_eq!(settings.mirror.max_retries, 10);
    }

    #[test]
    fn derived_names() {
        let payload = PayloadSettings::default();
        assert_eq!(
            payload.home_component(),
            "com.releasetech.eightpresso.basic/.MainActivity"
        );
        assert_eq!(
            payload.preferences_file(),
            "com.releasetech.eightpresso.basic_preferences.xml"
        );
    }

    #[test]
    fn guard_timing_from_settings() {
        let timing = TimingSettings::default().guard_timing();
        assert_eq!(timing.reconnect_delay, Duration::from_secs(2));
        assert_eq!(timing.state_timeout, Duration::from_secs(5));
    }
}
