//! Command implementations.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Context as _, Result};

use provision_core::config::{ms, ConfigManager, Settings};
use provision_core::device::tools::{locate_device_tool, preferred_path};
use provision_core::device::{CommandExecutor, Device, DeviceAddress, DeviceCommandRunner};
use provision_core::event_loop::{EventLoop, LoopHandle};
use provision_core::logging::LogConfig;
use provision_core::mirror::{
    platform_window_host, MirrorCommand, MirrorConfig, MirrorLauncher, MirrorState,
    MirrorSupervisor, MirrorTrigger, ToolMirrorLauncher,
};
use provision_core::orchestrator::{BatchReport, DriverEvent, ProvisioningDriver};
use provision_core::payload::{list_backups, InstallSource};

/// Mirror event loop running on its own thread.
struct MirrorHost {
    handle: LoopHandle<MirrorCommand>,
    thread: JoinHandle<MirrorSupervisor>,
}

impl MirrorHost {
    fn start(settings: &Settings, tools_dir: &Path) -> Self {
        let launcher = ToolMirrorLauncher::bundled(
            tools_dir,
            &settings.tools.mirror_tool,
            ms(settings.mirror.probe_timeout_ms),
        );
        let supervisor = MirrorSupervisor::new(
            MirrorConfig::from(&settings.mirror),
            Box::new(launcher),
            platform_window_host(),
        )
        .with_status_callback(Box::new(|state: MirrorState, note: &str| {
            tracing::info!("Mirror {}: {}", state, note);
        }));

        let (event_loop, handle) = EventLoop::new(supervisor);
        let thread = thread::spawn(move || event_loop.run());
        Self { handle, thread }
    }

    fn trigger(&self) -> Arc<dyn MirrorTrigger> {
        Arc::new(self.handle.clone())
    }

    fn stop(self) {
        self.handle.stop_mirror();
        self.handle.shutdown();
        match self.thread.join() {
            Ok(supervisor) => tracing::debug!("Mirror supervisor exited in state {}", supervisor.state()),
            Err(_) => tracing::error!("Mirror event loop panicked"),
        }
    }
}

pub struct App {
    settings: Settings,
    tools_dir: PathBuf,
    backups_dir: PathBuf,
    verbose: bool,
}

impl App {
    pub fn new(config: &ConfigManager, verbose: bool) -> Self {
        Self {
            settings: config.settings().clone(),
            tools_dir: config.tools_folder(),
            backups_dir: config.backups_folder(),
            verbose,
        }
    }

    fn executor(&self) -> Arc<dyn CommandExecutor> {
        let tool = preferred_path(&self.tools_dir, &self.settings.tools.device_tool);
        Arc::new(DeviceCommandRunner::new(tool).with_tools_dir(&self.tools_dir))
    }

    fn driver(&self, mirror: Option<&MirrorHost>) -> ProvisioningDriver {
        let mut driver = ProvisioningDriver::new(self.settings.clone(), self.executor());
        if self.verbose {
            driver = driver.with_log_config(LogConfig::debug());
        }
        match mirror {
            Some(host) => driver.with_mirror(host.trigger()),
            None => driver,
        }
    }

    pub fn install(&self, addresses: &[String], from_backup: Option<String>, mirror: bool) -> Result<()> {
        let devices = parse_devices(addresses)?;
        let source = match from_backup {
            Some(name) => InstallSource::Backup(name),
            None => InstallSource::Payload,
        };

        let mirror = (mirror && self.settings.mirror.enabled)
            .then(|| MirrorHost::start(&self.settings, &self.tools_dir));
        let driver = Arc::new(self.driver(mirror.as_ref()));

        let (worker, events) = driver.spawn_install(devices, source);
        let result = drain_events(events, |event| match event {
            DriverEvent::InstallFinished(result) => Some(result.map_err(anyhow::Error::from)),
            _ => None,
        });
        join_worker(worker);

        driver.shutdown();
        if let Some(host) = mirror {
            host.stop();
        }

        let report = result?;
        print_batch(&report);
        Ok(())
    }

    pub fn backup(&self, addresses: &[String]) -> Result<()> {
        let devices = parse_devices(addresses)?;
        let driver = Arc::new(self.driver(None));

        let (worker, events) = driver.spawn_backup(devices);
        let result = drain_events(events, |event| match event {
            DriverEvent::BackupFinished(result) => Some(result.map_err(anyhow::Error::from)),
            _ => None,
        });
        join_worker(worker);
        driver.shutdown();

        let report = result?;
        println!("Backup written to {}", report.path.display());
        println!("  pulled: {}", report.pulled.join(", "));
        for (label, reason) in &report.failed {
            println!("  failed: {} ({})", label, reason);
        }
        Ok(())
    }

    pub fn mirror(&self, address: &str) -> Result<()> {
        let device = parse_devices(&[address.to_string()])?
            .pop()
            .ok_or_else(|| anyhow!("no device given"))?;

        let host = MirrorHost::start(&self.settings, &self.tools_dir);
        let driver = self.driver(Some(&host));
        if !host.trigger().start_mirror(&device) {
            bail!("mirror event loop is not running");
        }

        println!("Mirroring {} - press Enter to stop", device.address);
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("reading stdin")?;

        driver.shutdown();
        host.stop();
        Ok(())
    }

    pub fn list_backups(&self) {
        let backups = list_backups(&self.backups_dir);
        if backups.is_empty() {
            println!("No backups in {}", self.backups_dir.display());
            return;
        }
        for backup in backups {
            match backup.metadata {
                Some(meta) => println!(
                    "{}  {}:{}  {}  Android {}",
                    backup.name,
                    meta.device_ip,
                    meta.device_port,
                    meta.device_model.as_deref().unwrap_or("Unknown"),
                    meta.android_version.as_deref().unwrap_or("Unknown"),
                ),
                None => println!("{}  (no backup info)", backup.name),
            }
        }
    }

    pub fn check_tools(&self) -> Result<()> {
        let device_tool = locate_device_tool(&self.tools_dir, &self.settings.tools.device_tool);
        match device_tool {
            Some(ref tool) => println!(
                "device tool: {} ({})",
                tool.path.display(),
                if tool.bundled { "bundled" } else { "PATH" }
            ),
            None => println!("device tool: not found"),
        }

        let launcher = ToolMirrorLauncher::bundled(
            &self.tools_dir,
            &self.settings.tools.mirror_tool,
            ms(self.settings.mirror.probe_timeout_ms),
        );
        match launcher.probe() {
            Ok(()) => println!("mirror tool: {}", launcher.tool().display()),
            Err(e) => println!("mirror tool: {}", e),
        }

        if device_tool.is_none() {
            bail!("device tool '{}' is required", self.settings.tools.device_tool);
        }
        Ok(())
    }
}

fn parse_devices(addresses: &[String]) -> Result<Vec<Device>> {
    addresses
        .iter()
        .map(|text| {
            let address: DeviceAddress = text
                .parse()
                .with_context(|| format!("bad device address '{}'", text))?;
            let mut device = Device::new(address);
            device.selected = true;
            Ok(device)
        })
        .collect()
}

/// Print log lines until `finish` recognizes the final event.
fn drain_events<T>(
    events: Receiver<DriverEvent>,
    mut finish: impl FnMut(DriverEvent) -> Option<Result<T>>,
) -> Result<T> {
    for event in events {
        match event {
            DriverEvent::Log(line) => println!("{}", line),
            DriverEvent::Progress {
                step,
                percent,
                message,
            } => tracing::debug!("{:>3}% {} - {}", percent, step, message),
            other => {
                if let Some(result) = finish(other) {
                    return result;
                }
            }
        }
    }
    Err(anyhow!("worker exited without a result"))
}

fn join_worker(worker: JoinHandle<()>) {
    if worker.join().is_err() {
        tracing::error!("Provisioning worker panicked");
    }
}

fn print_batch(report: &BatchReport) {
    println!();
    for run in &report.runs {
        println!("{}: {}", run.device.address, run.summary());
        if let Some(ref path) = run.log_path {
            println!("  log: {}", path.display());
        }
    }
    println!("{}", report);
}
