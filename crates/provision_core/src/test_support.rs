//! Hand-written fakes shared by unit tests.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::{Settings, TimingSettings};
use crate::device::{CommandExecutor, Device, DeviceAddress, DeviceError, DeviceResult};
use crate::logging::{LogConfig, RunLogger};
use crate::mirror::{
    LaunchRequest, MirrorError, MirrorExit, MirrorLauncher, MirrorProcess, MirrorResult,
    MirrorTrigger, Placement, WindowHandle, WindowHost,
};
use crate::orchestrator::Context;
use crate::payload::PayloadLayout;

/// Default settings with every delay zeroed.
pub(crate) fn test_settings() -> Settings {
    Settings {
        timing: TimingSettings::immediate(),
        ..Settings::default()
    }
}

pub(crate) fn test_device() -> Device {
    Device::new(DeviceAddress::new("10.0.0.7", 5555))
        .with_version("11")
        .with_model("RT1018")
}

/// Context for one run against `device`, with the payload rooted at `root`.
pub(crate) fn test_context(device: Arc<ScriptedDevice>, root: &Path) -> Context {
    let executor: Arc<dyn CommandExecutor> = device;
    let logger = Arc::new(RunLogger::detached("test", LogConfig::default(), None));
    Context::new(
        test_device(),
        Arc::new(test_settings()),
        PayloadLayout::new(root),
        logger,
        executor,
    )
}

/// Complete payload for the default settings under `root`.
pub(crate) fn write_payload(root: &Path) -> PayloadLayout {
    let layout = PayloadLayout::new(root);
    let settings = Settings::default();
    layout.create_dirs().unwrap();
    fs::create_dir_all(layout.sdcard_files()).unwrap();
    fs::create_dir_all(layout.data_files()).unwrap();

    for name in &settings.payload.package_files {
        fs::write(layout.package_file(name), b"apk").unwrap();
    }
    fs::write(layout.sdcard_files().join("menu.json"), b"{}").unwrap();
    fs::write(layout.sdcard_files().join("logo.png"), b"png").unwrap();
    fs::write(layout.data_files().join("state.bin"), b"state").unwrap();
    fs::write(layout.database(), b"sqlite").unwrap();
    fs::write(layout.preferences(&settings.payload.app_package), b"<map/>").unwrap();
    layout
}

/// How a scripted command fails.
#[derive(Debug, Clone)]
pub(crate) enum Failure {
    Timeout,
    Command(String),
}

struct FailureRule {
    subcommand: String,
    contains: String,
    failure: Failure,
    /// `None` fails forever.
    remaining: Option<u32>,
}

/// A recorded device-tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Call {
    pub device: Option<String>,
    pub args: Vec<String>,
}

impl Call {
    pub fn line(&self) -> String {
        self.args.join(" ")
    }
}

/// Scripted device implementing [`CommandExecutor`].
///
/// Answers like a healthy rooted device unless told otherwise, and records
/// every call.
pub(crate) struct ScriptedDevice {
    calls: Mutex<Vec<Call>>,
    offline_polls: Mutex<u32>,
    root_output: String,
    owner: Option<String>,
    rules: Mutex<Vec<FailureRule>>,
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            offline_polls: Mutex::new(0),
            root_output: "adbd is already running as root\n".to_string(),
            owner: Some("u0_a57".to_string()),
            rules: Mutex::new(Vec::new()),
        }
    }

    /// The first `polls` `get-state` calls report the device offline.
    pub fn offline_for_polls(self, polls: u32) -> Self {
        *self.offline_polls.lock() = polls;
        self
    }

    pub fn with_root_output(mut self, output: &str) -> Self {
        self.root_output = output.to_string();
        self
    }

    /// `None` makes `stat` answer `unknown`.
    pub fn with_owner(mut self, owner: Option<&str>) -> Self {
        self.owner = owner.map(str::to_string);
        self
    }

    /// Every call to `subcommand` whose arguments contain `contains` fails.
    pub fn failing(self, subcommand: &str, contains: &str, failure: Failure) -> Self {
        self.push_rule(subcommand, contains, failure, None);
        self
    }

    /// Like [`failing`](Self::failing), for the first `times` matching calls.
    pub fn failing_times(self, subcommand: &str, contains: &str, times: u32, failure: Failure) -> Self {
        self.push_rule(subcommand, contains, failure, Some(times));
        self
    }

    fn push_rule(&self, subcommand: &str, contains: &str, failure: Failure, remaining: Option<u32>) {
        self.rules.lock().push(FailureRule {
            subcommand: subcommand.to_string(),
            contains: contains.to_string(),
            failure,
            remaining,
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Calls whose first argument is `subcommand`.
    pub fn count_calls(&self, subcommand: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.args.first().map(String::as_str) == Some(subcommand))
            .count()
    }

    /// Calls whose joined arguments contain `text`.
    pub fn count_matching(&self, text: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.line().contains(text))
            .count()
    }

    fn scripted_failure(&self, args: &[&str]) -> Option<Failure> {
        let line = args.join(" ");
        let mut rules = self.rules.lock();
        for rule in rules.iter_mut() {
            if args.first() != Some(&rule.subcommand.as_str()) || !line.contains(&rule.contains) {
                continue;
            }
            match rule.remaining {
                Some(0) => continue,
                Some(ref mut n) => *n -= 1,
                None => {}
            }
            return Some(rule.failure.clone());
        }
        None
    }

    fn respond(&self, args: &[&str]) -> String {
        match args {
            ["root"] => self.root_output.clone(),
            ["shell", "stat", ..] => match self.owner {
                Some(ref owner) => format!("{}\n", owner),
                None => "unknown\n".to_string(),
            },
            ["shell", "ls", path] if path.ends_with(".db") => format!("{}\n", path),
            ["shell", "ls", _] => "a.bin\n".to_string(),
            ["shell", "pm", "path", _] => "package:/data/app/x/base.apk\n".to_string(),
            ["shell", "getprop", "ro.build.version.release"] => "11\n".to_string(),
            ["shell", "getprop", "ro.product.model"] => "RT1018\n".to_string(),
            _ => String::new(),
        }
    }
}

impl CommandExecutor for ScriptedDevice {
    fn run(
        &self,
        device: Option<&DeviceAddress>,
        args: &[&str],
        timeout: Duration,
    ) -> DeviceResult<String> {
        self.calls.lock().push(Call {
            device: device.map(|d| d.to_string()),
            args: args.iter().map(|a| a.to_string()).collect(),
        });
        let line = args.join(" ");

        if args.first() == Some(&"get-state") {
            let mut offline = self.offline_polls.lock();
            if *offline > 0 {
                *offline -= 1;
                return Err(DeviceError::command(line, 1, "error: device offline"));
            }
        }

        match self.scripted_failure(args) {
            Some(Failure::Timeout) => Err(DeviceError::timeout(line, timeout)),
            Some(Failure::Command(stderr)) => Err(DeviceError::command(line, 1, stderr)),
            None if args.first() == Some(&"get-state") => Ok("device\n".to_string()),
            None => Ok(self.respond(args)),
        }
    }
}

struct ProcessShared {
    pid: u32,
    title: String,
    exit: Option<MirrorExit>,
}

struct FakeProcess {
    shared: Arc<Mutex<ProcessShared>>,
}

impl FakeProcess {
    fn end(&self, code: Option<i32>) {
        let mut shared = self.shared.lock();
        if shared.exit.is_none() {
            shared.exit = Some(MirrorExit { code });
        }
    }
}

impl MirrorProcess for FakeProcess {
    fn id(&self) -> u32 {
        self.shared.lock().pid
    }

    fn try_wait(&mut self) -> io::Result<Option<MirrorExit>> {
        Ok(self.shared.lock().exit)
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.end(None);
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.end(None);
        Ok(())
    }

    fn wait_timeout(&mut self, _timeout: Duration) -> io::Result<Option<MirrorExit>> {
        Ok(self.shared.lock().exit)
    }
}

#[derive(Default)]
struct LauncherState {
    unavailable: bool,
    crash_remaining: u32,
    processes: Vec<Arc<Mutex<ProcessShared>>>,
}

/// Fake mirror launcher; processes live until told to exit.
#[derive(Clone, Default)]
pub(crate) struct FakeLauncher {
    state: Arc<Mutex<LauncherState>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe fails as if the tool were not installed.
    pub fn unavailable() -> Self {
        let launcher = Self::default();
        launcher.state.lock().unavailable = true;
        launcher
    }

    /// The next `n` launched processes exit immediately.
    pub fn crash_next(&self, n: u32) {
        self.state.lock().crash_remaining = n;
    }

    pub fn launches(&self) -> usize {
        self.state.lock().processes.len()
    }

    pub fn titles(&self) -> Vec<String> {
        self.state
            .lock()
            .processes
            .iter()
            .map(|p| p.lock().title.clone())
            .collect()
    }

    pub fn alive(&self) -> usize {
        self.state
            .lock()
            .processes
            .iter()
            .filter(|p| p.lock().exit.is_none())
            .count()
    }

    /// Every running process exits with `code`.
    pub fn exit_all(&self, code: Option<i32>) {
        for process in self.state.lock().processes.iter() {
            let mut process = process.lock();
            if process.exit.is_none() {
                process.exit = Some(MirrorExit { code });
            }
        }
    }

    fn is_running(&self, title: &str) -> bool {
        self.state
            .lock()
            .processes
            .iter()
            .any(|p| {
                let p = p.lock();
                p.title == title && p.exit.is_none()
            })
    }
}

impl MirrorLauncher for FakeLauncher {
    fn probe(&self) -> MirrorResult<()> {
        if self.state.lock().unavailable {
            Err(MirrorError::unavailable("scrcpy"))
        } else {
            Ok(())
        }
    }

    fn launch(&self, request: &LaunchRequest) -> MirrorResult<Box<dyn MirrorProcess>> {
        let mut state = self.state.lock();
        let exit = if state.crash_remaining > 0 {
            state.crash_remaining -= 1;
            Some(MirrorExit { code: Some(1) })
        } else {
            None
        };

        let shared = Arc::new(Mutex::new(ProcessShared {
            pid: 1000 + state.processes.len() as u32,
            title: request.title.clone(),
            exit,
        }));
        state.processes.push(shared.clone());
        Ok(Box::new(FakeProcess { shared }))
    }
}

#[derive(Default)]
struct HostState {
    unsupported: bool,
    failing_embeds: u32,
    failing_reparents: u32,
    windows: HashMap<String, WindowHandle>,
    embedded: Vec<(WindowHandle, String)>,
    parent: Option<WindowHandle>,
    placements: usize,
}

/// Fake window host: a window exists for every running fake process.
#[derive(Clone)]
pub(crate) struct FakeWindowHost {
    launcher: FakeLauncher,
    state: Arc<Mutex<HostState>>,
}

impl FakeWindowHost {
    pub fn new(launcher: &FakeLauncher) -> Self {
        Self {
            launcher: launcher.clone(),
            state: Arc::new(Mutex::new(HostState::default())),
        }
    }

    pub fn unsupported(launcher: &FakeLauncher) -> Self {
        let host = Self::new(launcher);
        host.state.lock().unsupported = true;
        host
    }

    /// The next `n` embeds fail at decoration stripping.
    pub fn fail_embeds(&self, n: u32) {
        self.state.lock().failing_embeds = n;
    }

    /// The next `n` reparent calls fail.
    pub fn fail_reparents(&self, n: u32) {
        self.state.lock().failing_reparents = n;
    }

    pub fn parented_to(&self) -> Option<WindowHandle> {
        self.state.lock().parent
    }

    pub fn placements(&self) -> usize {
        self.state.lock().placements
    }

    /// Embedded windows whose process is still running.
    pub fn live_embedded_windows(&self) -> usize {
        let titles: Vec<String> = self
            .state
            .lock()
            .embedded
            .iter()
            .map(|(_, title)| title.clone())
            .collect();
        titles.iter().filter(|t| self.launcher.is_running(t)).count()
    }
}

impl WindowHost for FakeWindowHost {
    fn is_supported(&self) -> bool {
        !self.state.lock().unsupported
    }

    fn find_window(&self, title: &str) -> Option<WindowHandle> {
        if !self.launcher.is_running(title) {
            return None;
        }
        let mut state = self.state.lock();
        let next = WindowHandle(100 + state.windows.len() as isize);
        Some(*state.windows.entry(title.to_string()).or_insert(next))
    }

    fn strip_decorations(&self, window: WindowHandle) -> MirrorResult<()> {
        let mut state = self.state.lock();
        if state.failing_embeds > 0 {
            state.failing_embeds -= 1;
            return Err(MirrorError::embed("window refused style change"));
        }
        let title = state
            .windows
            .iter()
            .find(|(_, handle)| **handle == window)
            .map(|(title, _)| title.clone())
            .unwrap_or_default();
        state.embedded.push((window, title));
        Ok(())
    }

    fn set_parent(&self, _window: WindowHandle, parent: WindowHandle) -> MirrorResult<()> {
        let mut state = self.state.lock();
        if state.failing_reparents > 0 {
            state.failing_reparents -= 1;
            return Err(MirrorError::embed("SetParent failed"));
        }
        state.parent = Some(parent);
        Ok(())
    }

    fn set_position_and_size(&self, _window: WindowHandle, _placement: Placement) -> MirrorResult<()> {
        self.state.lock().placements += 1;
        Ok(())
    }
}

/// Records mirror start/stop requests.
#[derive(Default)]
pub(crate) struct RecordingTrigger {
    started: Mutex<Vec<String>>,
    stops: Mutex<usize>,
}

impl RecordingTrigger {
    pub fn started(&self) -> Vec<String> {
        self.started.lock().clone()
    }

    pub fn stops(&self) -> usize {
        *self.stops.lock()
    }
}

impl MirrorTrigger for RecordingTrigger {
    fn start_mirror(&self, device: &Device) -> bool {
        self.started.lock().push(device.address.to_string());
        true
    }

    fn stop_mirror(&self) -> bool {
        *self.stops.lock() += 1;
        true
    }
}
