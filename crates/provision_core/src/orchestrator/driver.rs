//! Provisioning driver: runs install and backup pipelines for device batches.
//!
//! The driver is what a front end talks to. It checks preconditions once,
//! then runs each device sequentially on the calling thread, or on a worker
//! thread via [`ProvisioningDriver::spawn_install`] with events marshalled
//! back over a channel.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Local;
use parking_lot::Mutex;

use crate::config::Settings;
use crate::device::{CommandExecutor, ConnectionGuard, Device};
use crate::logging::{LogCallback, LogConfig, RunLogger};
use crate::mirror::MirrorTrigger;
use crate::payload::{backup_dir_name, backup_timestamp, BackupMetadata, InstallSource, PayloadLayout};
use crate::transfer::{TransferCategory, TransferStatus, TransferSummary, TransferTracker};

use super::errors::{ProvisionError, ProvisionResult};
use super::pipeline::PipelineRunResult;
use super::types::{BackupState, Context, InstallState, ProgressCallback};
use super::{create_backup_pipeline, create_install_pipeline};

/// Timeout for the global housekeeping commands.
const HOUSEKEEPING_TIMEOUT: Duration = Duration::from_secs(10);

/// Log callback shared by every run in a batch.
pub type SharedLogCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Presentation hooks for a run.
#[derive(Clone, Default)]
pub struct RunCallbacks {
    pub log: Option<SharedLogCallback>,
    pub progress: Option<ProgressCallback>,
}

impl RunCallbacks {
    fn log_callback(&self) -> Option<LogCallback> {
        self.log.clone().map(|cb| {
            let boxed: LogCallback = Box::new(move |line: &str| cb(line));
            boxed
        })
    }
}

/// Result of one device's install run.
#[derive(Debug, Clone)]
pub struct DeviceRunReport {
    pub device: Device,
    pub run_name: String,
    pub transfers: TransferTracker,
    pub steps: PipelineRunResult,
    pub missing: Vec<String>,
    pub log_path: Option<PathBuf>,
}

impl DeviceRunReport {
    pub fn summary(&self) -> TransferSummary {
        self.transfers.summary()
    }

    pub fn succeeded(&self) -> bool {
        self.summary().all_succeeded()
    }
}

/// Success and failure count of one category across a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryCount {
    pub category: TransferCategory,
    pub success: usize,
    pub failed: usize,
}

/// Result of an install batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub runs: Vec<DeviceRunReport>,
}

impl BatchReport {
    pub fn device_count(&self) -> usize {
        self.runs.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.runs.iter().all(DeviceRunReport::succeeded)
    }

    pub fn category_counts(&self) -> Vec<CategoryCount> {
        TransferCategory::ALL
            .iter()
            .map(|&category| {
                let statuses = self.runs.iter().map(|r| r.transfers.get(category).status);
                let (success, failed) = statuses.fold((0, 0), |(s, f), status| match status {
                    TransferStatus::Success => (s + 1, f),
                    TransferStatus::Failed => (s, f + 1),
                    TransferStatus::Pending => (s, f),
                });
                CategoryCount {
                    category,
                    success,
                    failed,
                }
            })
            .collect()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let succeeded = self.runs.iter().filter(|r| r.succeeded()).count();
        write!(f, "{}/{} device(s) fully provisioned", succeeded, self.device_count())?;
        let failed: Vec<String> = self
            .category_counts()
            .into_iter()
            .filter(|c| c.failed > 0)
            .map(|c| format!("{} {}", c.category, c.failed))
            .collect();
        if !failed.is_empty() {
            write!(f, "; failures: {}", failed.join(", "))?;
        }
        Ok(())
    }
}

/// Result of a backup run.
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub name: String,
    pub path: PathBuf,
    pub metadata: BackupMetadata,
    pub pulled: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub steps: PipelineRunResult,
    pub log_path: Option<PathBuf>,
}

/// Events sent from a worker thread to the front end.
pub enum DriverEvent {
    Log(String),
    Progress {
        step: String,
        percent: u32,
        message: String,
    },
    InstallFinished(ProvisionResult<BatchReport>),
    BackupFinished(ProvisionResult<BackupReport>),
}

/// Runs provisioning for device batches.
pub struct ProvisioningDriver {
    settings: Arc<Settings>,
    executor: Arc<dyn CommandExecutor>,
    mirror: Option<Arc<dyn MirrorTrigger>>,
    log_config: LogConfig,
}

impl ProvisioningDriver {
    pub fn new(settings: Settings, executor: Arc<dyn CommandExecutor>) -> Self {
        let log_config = LogConfig::from(&settings.logging);
        Self {
            settings: Arc::new(settings),
            executor,
            mirror: None,
            log_config,
        }
    }

    pub fn with_mirror(mut self, mirror: Arc<dyn MirrorTrigger>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn with_log_config(mut self, config: LogConfig) -> Self {
        self.log_config = config;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn logs_folder(&self) -> PathBuf {
        PathBuf::from(&self.settings.paths.logs_folder)
    }

    fn open_logger(&self, run_name: &str, callbacks: &RunCallbacks) -> Arc<RunLogger> {
        Arc::new(RunLogger::open_or_detached(
            run_name,
            self.logs_folder(),
            self.log_config.clone(),
            callbacks.log_callback(),
        ))
    }

    /// Copy of `device` with the reported version and model filled in.
    fn describe(&self, device: &Device, logger: &RunLogger) -> Device {
        let guard = ConnectionGuard::new(self.executor.clone(), self.settings.timing.guard_timing());
        let mut described = device.clone();
        if !guard.describe(&mut described) {
            logger.debug(&format!(
                "Could not read version and model from {}",
                device.address
            ));
        }
        described
    }

    fn context(
        &self,
        device: &Device,
        payload: PayloadLayout,
        logger: Arc<RunLogger>,
        callbacks: &RunCallbacks,
    ) -> Context {
        Context::new(
            device.clone(),
            self.settings.clone(),
            payload,
            logger,
            self.executor.clone(),
        )
        .with_mirror(self.mirror.clone())
        .with_progress_callback(callbacks.progress.clone())
    }

    /// Install onto every device in turn.
    ///
    /// The payload directory is checked once, before any device is
    /// touched; after that nothing a device does stops the batch.
    pub fn run_install(
        &self,
        devices: &[Device],
        source: &InstallSource,
        callbacks: &RunCallbacks,
    ) -> ProvisionResult<BatchReport> {
        let layout = source.resolve(
            Path::new(&self.settings.paths.payload_folder),
            Path::new(&self.settings.paths.backups_folder),
        );
        if !layout.exists() {
            return Err(ProvisionError::precondition(format!(
                "payload directory does not exist: {}",
                layout.root().display()
            )));
        }
        if devices.is_empty() {
            return Err(ProvisionError::precondition("no devices selected"));
        }

        tracing::info!(
            "Installing {} onto {} device(s)",
            layout.root().display(),
            devices.len()
        );

        let mut report = BatchReport::default();
        for (i, device) in devices.iter().enumerate() {
            tracing::info!("Device {}/{}: {}", i + 1, devices.len(), device.address);
            report.runs.push(self.install_device(device, &layout, callbacks));
        }

        tracing::info!("{}", report);
        Ok(report)
    }

    /// One device's install run. Never fails; problems end up in the report.
    pub fn install_device(
        &self,
        device: &Device,
        layout: &PayloadLayout,
        callbacks: &RunCallbacks,
    ) -> DeviceRunReport {
        let run_name = format!(
            "install_{}_{}",
            device.address.file_safe_ip(),
            Local::now().format("%Y%m%d_%H%M%S")
        );
        let logger = self.open_logger(&run_name, callbacks);
        let device = self.describe(device, &logger);
        let ctx = self.context(&device, layout.clone(), logger.clone(), callbacks);

        logger.phase(&format!("Provisioning {}", device));
        let mut state = InstallState::new();
        let steps = create_install_pipeline().run(&ctx, &mut state);

        let pending = state.transfers.fail_pending("not executed");
        if pending > 0 {
            tracing::debug!("{} transfer(s) never ran on {}", pending, device.address);
        }

        let summary = state.transfers.summary();
        if summary.all_succeeded() {
            logger.success(&summary.to_string());
        } else {
            logger.warn(&summary.to_string());
        }
        logger.phase(&format!("Finished {}", device.address));
        logger.flush();

        DeviceRunReport {
            device,
            run_name,
            transfers: state.transfers,
            steps,
            missing: state.missing,
            log_path: logger.log_path().map(Path::to_path_buf),
        }
    }

    /// Back up exactly one device into a fresh folder under the backups folder.
    pub fn run_backup(
        &self,
        devices: &[Device],
        callbacks: &RunCallbacks,
    ) -> ProvisionResult<BackupReport> {
        let device = match devices {
            [device] => device,
            _ => {
                return Err(ProvisionError::precondition(format!(
                    "select exactly one device for backup ({} selected)",
                    devices.len()
                )));
            }
        };

        let timestamp = backup_timestamp();
        let name = backup_dir_name(&device.address, &timestamp);
        let layout = PayloadLayout::new(Path::new(&self.settings.paths.backups_folder).join(&name));
        layout
            .create_dirs()
            .map_err(|e| ProvisionError::setup_failed(&name, e.to_string()))?;

        let logger = self.open_logger(&name, callbacks);
        let device = self.describe(device, &logger);
        let ctx = self.context(&device, layout.clone(), logger.clone(), callbacks);

        logger.phase(&format!("Backing up {}", device));
        let mut state = BackupState::new();
        let steps = create_backup_pipeline().run(&ctx, &mut state);

        let metadata = BackupMetadata::new(&device, timestamp);
        if let Err(e) = metadata.write_to(&layout) {
            logger.warn(&format!("Could not write backup info: {}", e));
        }

        logger.success(&format!(
            "Backup {}: {} pulled, {} failed",
            name,
            state.pulled.len(),
            state.failed.len()
        ));
        logger.flush();

        Ok(BackupReport {
            path: layout.root().to_path_buf(),
            name,
            metadata,
            pulled: state.pulled,
            failed: state.failed,
            steps,
            log_path: logger.log_path().map(Path::to_path_buf),
        })
    }

    /// Run an install batch on a worker thread.
    pub fn spawn_install(
        self: &Arc<Self>,
        devices: Vec<Device>,
        source: InstallSource,
    ) -> (JoinHandle<()>, Receiver<DriverEvent>) {
        let (tx, rx) = mpsc::channel();
        let driver = Arc::clone(self);
        let handle = thread::spawn(move || {
            let callbacks = channel_callbacks(&tx);
            let result = driver.run_install(&devices, &source, &callbacks);
            let _ = tx.send(DriverEvent::InstallFinished(result));
        });
        (handle, rx)
    }

    /// Run a backup on a worker thread.
    pub fn spawn_backup(self: &Arc<Self>, devices: Vec<Device>) -> (JoinHandle<()>, Receiver<DriverEvent>) {
        let (tx, rx) = mpsc::channel();
        let driver = Arc::clone(self);
        let handle = thread::spawn(move || {
            let callbacks = channel_callbacks(&tx);
            let result = driver.run_backup(&devices, &callbacks);
            let _ = tx.send(DriverEvent::BackupFinished(result));
        });
        (handle, rx)
    }

    /// Exit housekeeping: stop mirroring, drop connections, stop the tool server.
    pub fn shutdown(&self) {
        if let Some(ref mirror) = self.mirror {
            if !mirror.stop_mirror() {
                tracing::debug!("Mirror supervisor already gone");
            }
        }
        for args in [["disconnect"], ["kill-server"]] {
            if let Err(e) = self.executor.run(None, &args, HOUSEKEEPING_TIMEOUT) {
                tracing::debug!("{} failed: {}", args[0], e);
            }
        }
        tracing::info!("Device connections closed");
    }
}

/// Callbacks that forward into `tx`. A closed receiver drops events.
fn channel_callbacks(tx: &Sender<DriverEvent>) -> RunCallbacks {
    let log_tx = Mutex::new(tx.clone());
    let progress_tx = Mutex::new(tx.clone());
    RunCallbacks {
        log: Some(Arc::new(move |line: &str| {
            let _ = log_tx.lock().send(DriverEvent::Log(line.to_string()));
        })),
        progress: Some(Arc::new(move |step: &str, percent: u32, message: &str| {
            let _ = progress_tx.lock().send(DriverEvent::Progress {
                step: step.to_string(),
                percent,
                message: message.to_string(),
            });
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingSettings;
    use crate::device::{DeviceAddress, ErrorKind};
    use crate::event_loop::EventLoop;
    use crate::mirror::{MirrorConfig, MirrorState, MirrorSupervisor, WindowHandle};
    use crate::test_support::{
        test_device, write_payload, FakeLauncher, FakeWindowHost, Failure, RecordingTrigger,
        ScriptedDevice,
    };
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        settings: Settings,
    }

    fn fixture(with_payload: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.timing = TimingSettings::immediate();
        settings.paths.payload_folder = dir.path().join("install_files").to_string_lossy().into_owned();
        settings.paths.backups_folder = dir.path().join("backups").to_string_lossy().into_owned();
        settings.paths.logs_folder = dir.path().join("logs").to_string_lossy().into_owned();
        if with_payload {
            write_payload(Path::new(&settings.paths.payload_folder));
        }
        Fixture { _dir: dir, settings }
    }

    fn driver(fixture: &Fixture, device: &Arc<ScriptedDevice>) -> ProvisioningDriver {
        let executor: Arc<dyn CommandExecutor> = device.clone();
        ProvisioningDriver::new(fixture.settings.clone(), executor)
    }

    #[test]
    fn healthy_device_transfers_everything() {
        let fx = fixture(true);
        let device = Arc::new(ScriptedDevice::new());
        let report = driver(&fx, &device)
            .run_install(&[test_device()], &InstallSource::Payload, &RunCallbacks::default())
            .unwrap();

        let run = &report.runs[0];
        let summary = run.summary();
        assert_eq!((summary.success, summary.total()), (5, 5));
        assert_eq!(summary.ratio(), 1.0);
        assert!(report.all_succeeded());
        assert!(run.log_path.as_ref().unwrap().exists());
    }

    #[test]
    fn database_timeout_fails_only_that_category() {
        let fx = fixture(true);
        let device = Arc::new(ScriptedDevice::new().failing("push", "MainDatabase.db", Failure::Timeout));
        let report = driver(&fx, &device)
            .run_install(&[test_device()], &InstallSource::Payload, &RunCallbacks::default())
            .unwrap();

        let summary = report.runs[0].summary();
        assert_eq!((summary.success, summary.failed), (4, 1));
        let failure = &summary.failures[0];
        assert_eq!(failure.category, TransferCategory::Database);
        assert_eq!(failure.classification.kind, ErrorKind::Timeout);
        assert_eq!(failure.classification.remedy(), "check network");
        assert!(summary.to_string().contains("database [timeout]"));
    }

    #[test]
    fn missing_mirror_still_runs_all_ten_steps() {
        let fx = fixture(true);
        let device = Arc::new(ScriptedDevice::new());
        let report = driver(&fx, &device)
            .run_install(&[test_device()], &InstallSource::Payload, &RunCallbacks::default())
            .unwrap();

        let steps = &report.runs[0].steps;
        assert_eq!(steps.steps_run(), 10);
        assert_eq!(steps.warned.len(), 1);
        assert_eq!(steps.warned[0].0, "StartMirror");
        assert_eq!(device.count_calls("reboot"), 1);
    }

    #[test]
    fn absent_mirror_tool_stops_supervisor_while_install_completes() {
        let fx = fixture(true);
        let device = Arc::new(ScriptedDevice::new());
        let launcher = FakeLauncher::unavailable();
        let host = FakeWindowHost::new(&launcher);
        let supervisor = MirrorSupervisor::new(
            MirrorConfig::default(),
            Box::new(launcher.clone()),
            Box::new(host),
        )
        .with_surface(WindowHandle(1));
        let (mut event_loop, handle) = EventLoop::new(supervisor);

        let trigger: Arc<dyn MirrorTrigger> = Arc::new(handle);
        let driver = Arc::new(driver(&fx, &device).with_mirror(trigger));
        let (worker, events) = driver.spawn_install(vec![test_device()], InstallSource::Payload);
        worker.join().unwrap();
        event_loop.advance(Duration::from_secs(60));

        let sup = event_loop.handler();
        assert_eq!(sup.state(), MirrorState::Stopped);
        assert_eq!(sup.retry_count(), 0);
        assert!(sup.device().is_none());
        assert_eq!(launcher.launches(), 0);
        assert!(event_loop.timers().is_empty());

        let report = match events.try_iter().last() {
            Some(DriverEvent::InstallFinished(Ok(report))) => report,
            _ => panic!("install did not finish"),
        };
        let run = &report.runs[0];
        assert_eq!(run.steps.steps_run(), 10);
        assert!(run.steps.soft_failed.is_empty());
        assert_eq!(run.summary().success, 5);
        assert_eq!(device.count_calls("reboot"), 1);
    }

    #[test]
    fn every_run_ends_with_five_terminal_results() {
        let fx = fixture(true);
        let device = Arc::new(
            ScriptedDevice::new()
                .failing("push", "sdcard", Failure::Command("error: device offline".into()))
                .with_owner(None),
        );
        let report = driver(&fx, &device)
            .run_install(&[test_device()], &InstallSource::Payload, &RunCallbacks::default())
            .unwrap();

        let transfers = &report.runs[0].transfers;
        assert!(transfers.results().iter().all(|r| r.is_terminal()));
        assert_eq!(transfers.count(TransferStatus::Pending), 0);
        assert_eq!(transfers.failed_count(), 2);
    }

    #[test]
    fn batch_runs_devices_in_order_and_counts_categories() {
        let fx = fixture(true);
        let device = Arc::new(ScriptedDevice::new());
        let second = Device::new(DeviceAddress::new("10.0.0.8", 5555));
        let trigger = Arc::new(RecordingTrigger::default());
        let as_trigger: Arc<dyn MirrorTrigger> = trigger.clone();

        let report = driver(&fx, &device)
            .with_mirror(as_trigger)
            .run_install(
                &[test_device(), second],
                &InstallSource::Payload,
                &RunCallbacks::default(),
            )
            .unwrap();

        assert_eq!(report.device_count(), 2);
        assert_eq!(trigger.started(), vec!["10.0.0.7:5555", "10.0.0.8:5555"]);
        let counts = report.category_counts();
        assert!(counts.iter().all(|c| c.success == 2 && c.failed == 0));
        assert!(report.to_string().starts_with("2/2 device(s)"));
    }

    #[test]
    fn missing_payload_fails_before_any_command() {
        let fx = fixture(false);
        let device = Arc::new(ScriptedDevice::new());
        let err = driver(&fx, &device)
            .run_install(&[test_device()], &InstallSource::Payload, &RunCallbacks::default())
            .unwrap_err();

        assert!(matches!(err, ProvisionError::PreconditionFailed(_)));
        assert!(device.calls().is_empty());
    }

    #[test]
    fn install_from_named_backup() {
        let fx = fixture(false);
        let backup = Path::new(&fx.settings.paths.backups_folder).join("backup_10_0_0_7_20260101_120000");
        write_payload(&backup);

        let device = Arc::new(ScriptedDevice::new());
        let report = driver(&fx, &device)
            .run_install(
                &[test_device()],
                &InstallSource::Backup("backup_10_0_0_7_20260101_120000".into()),
                &RunCallbacks::default(),
            )
            .unwrap();
        assert_eq!(report.runs[0].summary().success, 5);
    }

    #[test]
    fn backup_requires_exactly_one_device() {
        let fx = fixture(false);
        let device = Arc::new(ScriptedDevice::new());
        let driver = driver(&fx, &device);

        for devices in [vec![], vec![test_device(), test_device()]] {
            let err = driver.run_backup(&devices, &RunCallbacks::default()).unwrap_err();
            assert!(matches!(err, ProvisionError::PreconditionFailed(_)));
        }
        assert!(device.calls().is_empty());
        assert!(!Path::new(&fx.settings.paths.backups_folder).exists());
    }

    #[test]
    fn backup_writes_layout_and_metadata() {
        let fx = fixture(false);
        let device = Arc::new(ScriptedDevice::new());
        let report = driver(&fx, &device)
            .run_backup(&[test_device()], &RunCallbacks::default())
            .unwrap();

        assert!(report.name.starts_with("backup_10_0_0_7_"));
        assert_eq!(report.steps.steps_run(), 6);
        assert_eq!(report.pulled.len(), 5);
        assert_eq!(device.count_calls("pull"), 5);
        assert!(report.path.join("apk_files").is_dir());

        let info = fs::read_to_string(report.path.join("backup_info.json")).unwrap();
        let metadata: BackupMetadata = serde_json::from_str(&info).unwrap();
        assert_eq!(metadata.device_ip, "10.0.0.7");
        assert_eq!(metadata.device_model.as_deref(), Some("RT1018"));
        assert_eq!(metadata, report.metadata);
    }

    #[test]
    fn backup_records_reported_model_and_version() {
        let fx = fixture(false);
        let device = Arc::new(ScriptedDevice::new());
        let address_only = Device::new(DeviceAddress::new("10.0.0.7", 5555));

        let report = driver(&fx, &device)
            .run_backup(&[address_only], &RunCallbacks::default())
            .unwrap();

        assert_eq!(device.count_matching("getprop"), 2);
        assert_eq!(report.metadata.device_model.as_deref(), Some("RT1018"));
        assert_eq!(report.metadata.android_version.as_deref(), Some("11"));

        let info = fs::read_to_string(report.path.join("backup_info.json")).unwrap();
        let written: BackupMetadata = serde_json::from_str(&info).unwrap();
        assert_eq!(written.device_model.as_deref(), Some("RT1018"));
    }

    #[test]
    fn unreadable_properties_leave_metadata_empty() {
        let fx = fixture(false);
        let device = Arc::new(ScriptedDevice::new().failing(
            "shell",
            "getprop",
            Failure::Command("error: closed".into()),
        ));
        let address_only = Device::new(DeviceAddress::new("10.0.0.7", 5555));

        let report = driver(&fx, &device)
            .run_backup(&[address_only], &RunCallbacks::default())
            .unwrap();

        assert_eq!(report.metadata.device_model, None);
        assert_eq!(report.metadata.android_version, None);
        assert_eq!(report.steps.steps_run(), 6);
    }

    #[test]
    fn install_reports_described_device() {
        let fx = fixture(true);
        let device = Arc::new(ScriptedDevice::new());
        let address_only = Device::new(DeviceAddress::new("10.0.0.7", 5555));

        let report = driver(&fx, &device)
            .run_install(&[address_only], &InstallSource::Payload, &RunCallbacks::default())
            .unwrap();

        let run = &report.runs[0];
        assert_eq!(run.device.model.as_deref(), Some("RT1018"));
        let log = fs::read_to_string(run.log_path.as_ref().unwrap()).unwrap();
        assert!(log.contains("Android 11 (RT1018)"));
    }

    #[test]
    fn worker_thread_marshals_events() {
        let fx = fixture(true);
        let device = Arc::new(ScriptedDevice::new());
        let driver = Arc::new(driver(&fx, &device));

        let (handle, events) = driver.spawn_install(vec![test_device()], InstallSource::Payload);
        handle.join().unwrap();

        let events: Vec<DriverEvent> = events.try_iter().collect();
        assert!(events.iter().any(|e| matches!(e, DriverEvent::Log(line) if line.contains("[6/10]"))));
        assert!(events.iter().any(|e| matches!(e, DriverEvent::Progress { percent: 100, .. })));
        match events.last() {
            Some(DriverEvent::InstallFinished(Ok(report))) => assert!(report.all_succeeded()),
            _ => panic!("install did not finish"),
        }
    }

    #[test]
    fn shutdown_stops_mirror_and_releases_devices() {
        let fx = fixture(false);
        let device = Arc::new(ScriptedDevice::new());
        let trigger = Arc::new(RecordingTrigger::default());
        let as_trigger: Arc<dyn MirrorTrigger> = trigger.clone();

        driver(&fx, &device).with_mirror(as_trigger).shutdown();

        assert_eq!(trigger.stops(), 1);
        let global: Vec<String> = device
            .calls()
            .into_iter()
            .filter(|c| c.device.is_none())
            .map(|c| c.line())
            .collect();
        assert_eq!(global, vec!["disconnect", "kill-server"]);
    }
}
