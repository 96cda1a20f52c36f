//! Mirror process supervisor.
//!
//! Runs on the event loop. Each attempt launches the mirror tool with a
//! fresh window title, searches for that window, embeds it into the host
//! surface and then watches the process. Crashes and launch failures are
//! retried a bounded number of times; an unexpected exit after a successful
//! embed reconnects without using up a retry.
//!
//! ```text
//! Idle ─► Starting ─► WindowSearch ─► Embedded ─► Monitoring
//!            │             │                          │
//!            └──────► Retrying ◄──────────────────────┘
//!                          │
//!                       Stopped
//! ```

use std::fmt;
use std::time::Duration;

use uuid::Uuid;

use crate::config::{ms, MirrorSettings};
use crate::device::Device;
use crate::event_loop::{LoopHandler, TimerId, TimerQueue};

use super::errors::MirrorError;
use super::process::{LaunchRequest, MirrorLauncher};
use super::session::MirrorSession;
use super::window::{Placement, WindowHandle, WindowHost};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MirrorState {
    #[default]
    Idle,
    Starting,
    WindowSearch,
    Embedded,
    Monitoring,
    Retrying,
    Stopped,
}

impl fmt::Display for MirrorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MirrorState::Idle => "idle",
            MirrorState::Starting => "starting",
            MirrorState::WindowSearch => "searching for window",
            MirrorState::Embedded => "embedded",
            MirrorState::Monitoring => "monitoring",
            MirrorState::Retrying => "retrying",
            MirrorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Requests posted to the supervisor from other threads.
#[derive(Debug, Clone)]
pub enum MirrorCommand {
    /// Mirror this device, replacing any current session.
    Start(Device),
    /// User stop.
    Stop,
    /// Surface the mirror window is embedded into.
    AttachSurface(Option<WindowHandle>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorTimer {
    Search,
    Monitor,
    Restart,
}

/// Timing and window parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    pub width: u32,
    pub height: u32,
    /// Failed attempts before giving up.
    pub max_retries: u32,
    pub title_prefix: String,
    pub initial_search_delay: Duration,
    pub search_interval: Duration,
    pub monitor_interval: Duration,
    pub retry_delay: Duration,
    pub reconnect_delay: Duration,
    pub terminate_grace: Duration,
    pub kill_grace: Duration,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self::from(&MirrorSettings::default())
    }
}

impl From<&MirrorSettings> for MirrorConfig {
    fn from(settings: &MirrorSettings) -> Self {
        Self {
            width: settings.window_width,
            height: settings.window_height,
            max_retries: settings.max_retries,
            title_prefix: settings.title_prefix.clone(),
            initial_search_delay: ms(settings.initial_search_delay_ms),
            search_interval: ms(settings.search_interval_ms),
            monitor_interval: ms(settings.monitor_interval_ms),
            retry_delay: ms(settings.retry_delay_ms),
            reconnect_delay: ms(settings.reconnect_delay_ms),
            terminate_grace: ms(settings.terminate_grace_ms),
            kill_grace: ms(settings.kill_grace_ms),
        }
    }
}

/// Receives state changes with a short human-readable note.
pub type StatusCallback = Box<dyn Fn(MirrorState, &str) + Send>;

pub struct MirrorSupervisor {
    config: MirrorConfig,
    launcher: Box<dyn MirrorLauncher>,
    host: Box<dyn WindowHost>,
    surface: Option<WindowHandle>,
    state: MirrorState,
    device: Option<Device>,
    retry_count: u32,
    user_stopped: bool,
    session: Option<MirrorSession>,
    /// Delayed relaunch (retry or reconnect).
    restart_timer: Option<TimerId>,
    on_status: Option<StatusCallback>,
}

impl MirrorSupervisor {
    pub fn new(
        config: MirrorConfig,
        launcher: Box<dyn MirrorLauncher>,
        host: Box<dyn WindowHost>,
    ) -> Self {
        Self {
            config,
            launcher,
            host,
            surface: None,
            state: MirrorState::Idle,
            device: None,
            retry_count: 0,
            user_stopped: false,
            session: None,
            restart_timer: None,
            on_status: None,
        }
    }

    pub fn with_surface(mut self, surface: WindowHandle) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_status_callback(mut self, callback: StatusCallback) -> Self {
        self.on_status = Some(callback);
        self
    }

    pub fn state(&self) -> MirrorState {
        self.state
    }

    /// Device the supervisor is trying to mirror.
    pub fn device(&self) -> Option<&Device> {
        self.device.as_ref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_title(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.title())
    }

    pub fn embedded_window(&self) -> Option<WindowHandle> {
        self.session.as_ref().and_then(|s| s.window())
    }

    pub fn restart_pending(&self) -> bool {
        self.restart_timer.is_some()
    }

    /// Begin mirroring `device`, tearing down any current session first.
    pub fn start(&mut self, device: Device, timers: &mut TimerQueue<MirrorTimer>) {
        if !self.host.is_supported() {
            tracing::warn!("Mirror window embedding is not supported on this platform");
            self.set_state(MirrorState::Stopped, "embedding not supported");
            return;
        }

        if self.session.is_some() || self.restart_timer.is_some() {
            tracing::debug!("Stopping current mirror session before starting a new one");
            self.cancel_restart(timers);
            self.close_session(timers);
        }

        self.user_stopped = false;
        self.retry_count = 0;
        tracing::info!("Starting mirror for {}", device.address);
        self.device = Some(device);
        self.launch(timers);
    }

    /// User stop: nothing restarts until the next `start`.
    pub fn stop(&mut self, timers: &mut TimerQueue<MirrorTimer>) {
        self.user_stopped = true;
        self.cancel_restart(timers);
        if self.session.is_some() {
            tracing::info!("Stopping mirror");
        }
        self.close_session(timers);
        self.device = None;
        self.set_state(MirrorState::Stopped, "stopped");
    }

    pub fn attach_surface(&mut self, surface: Option<WindowHandle>) {
        self.surface = surface;
    }

    fn set_state(&mut self, state: MirrorState, note: &str) {
        self.state = state;
        if let Some(ref callback) = self.on_status {
            callback(state, note);
        }
    }

    fn cancel_restart(&mut self, timers: &mut TimerQueue<MirrorTimer>) {
        if let Some(id) = self.restart_timer.take() {
            timers.cancel(id);
        }
    }

    fn close_session(&mut self, timers: &mut TimerQueue<MirrorTimer>) {
        if let Some(session) = self.session.take() {
            session.close(timers, self.config.terminate_grace, self.config.kill_grace);
        }
    }

    fn new_title(&self) -> String {
        format!("{}_{}", self.config.title_prefix, Uuid::new_v4().simple())
    }

    fn launch(&mut self, timers: &mut TimerQueue<MirrorTimer>) {
        self.restart_timer = None;
        let Some(address) = self.device.as_ref().map(|d| d.address.clone()) else {
            return;
        };
        self.set_state(MirrorState::Starting, "starting");

        let result = self.launcher.probe().and_then(|()| {
            let request = LaunchRequest {
                address,
                title: self.new_title(),
                width: self.config.width,
                height: self.config.height,
            };
            self.launcher
                .launch(&request)
                .map(|process| MirrorSession::new(process, request.title))
        });

        match result {
            Ok(mut session) => {
                tracing::debug!(
                    "Mirror process {} started, window title {}",
                    session.pid(),
                    session.title()
                );
                let search = timers.schedule(self.config.initial_search_delay, MirrorTimer::Search);
                session.set_search_timer(Some(search));
                self.session = Some(session);
                self.set_state(MirrorState::WindowSearch, "waiting for window");
            }
            Err(e) if !e.is_retryable() => {
                tracing::warn!("Mirror unavailable, continuing without screen view: {}", e);
                self.device = None;
                self.set_state(MirrorState::Stopped, "mirror tool unavailable");
            }
            Err(e) => self.fail_attempt(e, timers),
        }
    }

    /// Count a failed attempt and schedule the next one while under the cap.
    fn fail_attempt(&mut self, error: MirrorError, timers: &mut TimerQueue<MirrorTimer>) {
        self.retry_count += 1;
        let max = self.config.max_retries;

        if !self.user_stopped && self.device.is_some() && self.retry_count < max {
            tracing::warn!(
                "Mirror attempt failed ({}), retrying ({}/{})",
                error,
                self.retry_count,
                max
            );
            self.restart_timer = Some(timers.schedule(self.config.retry_delay, MirrorTimer::Restart));
            let note = format!("retrying ({}/{})", self.retry_count, max);
            self.set_state(MirrorState::Retrying, &note);
        } else {
            tracing::warn!("Mirror failed to start: {}", error);
            self.device = None;
            self.retry_count = 0;
            self.set_state(MirrorState::Stopped, "failed to start");
        }
    }

    fn on_search(&mut self, timers: &mut TimerQueue<MirrorTimer>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.set_search_timer(None);

        if let Some(window) = self.host.find_window(session.title()) {
            tracing::debug!("Found mirror window {:?}", window);
            match self.embed(window) {
                Ok(()) => {
                    if let Some(session) = self.session.as_mut() {
                        session.set_window(window);
                    }
                    self.set_state(MirrorState::Embedded, "embedded");
                    tracing::info!("Mirror window embedded");
                    self.retry_count = 0;
                    self.schedule_monitor(timers);
                }
                Err(e) => {
                    self.close_session(timers);
                    self.fail_attempt(e, timers);
                }
            }
            return;
        }

        match session.exit_status() {
            None => {
                let search = timers.schedule(self.config.search_interval, MirrorTimer::Search);
                session.set_search_timer(Some(search));
            }
            Some(exit) => {
                tracing::debug!("Mirror process died before its window appeared");
                self.close_session(timers);
                self.fail_attempt(MirrorError::crashed(exit.code), timers);
            }
        }
    }

    fn embed(&self, window: WindowHandle) -> Result<(), MirrorError> {
        self.host.strip_decorations(window)?;
        if let Some(surface) = self.surface {
            self.host.set_parent(window, surface)?;
        }
        self.host
            .set_position_and_size(window, self.placement())
    }

    fn placement(&self) -> Placement {
        Placement::at_origin(self.config.width, self.config.height)
    }

    fn schedule_monitor(&mut self, timers: &mut TimerQueue<MirrorTimer>) {
        let monitor = timers.schedule(self.config.monitor_interval, MirrorTimer::Monitor);
        if let Some(session) = self.session.as_mut() {
            session.set_monitor_timer(Some(monitor));
        }
        if self.state != MirrorState::Monitoring {
            self.set_state(MirrorState::Monitoring, "monitoring");
        }
    }

    fn on_monitor(&mut self, timers: &mut TimerQueue<MirrorTimer>) {
        let placement = self.placement();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.set_monitor_timer(None);

        let Some(exit) = session.exit_status() else {
            if let Some(window) = session.window() {
                if let Err(e) = self.host.set_position_and_size(window, placement) {
                    tracing::debug!("Re-positioning mirror window failed: {}", e);
                }
            }
            self.schedule_monitor(timers);
            return;
        };

        self.close_session(timers);

        if !self.user_stopped && self.device.is_some() {
            let note = if exit.code == Some(2) {
                "device rebooted or disconnected"
            } else {
                "disconnected unexpectedly"
            };
            tracing::info!("Mirror {}, reconnecting", note);
            self.restart_timer =
                Some(timers.schedule(self.config.reconnect_delay, MirrorTimer::Restart));
            self.set_state(MirrorState::Retrying, "reconnecting");
        } else {
            tracing::info!("Mirror stopped (exit code {:?})", exit.code);
            self.device = None;
            self.set_state(MirrorState::Stopped, "stopped");
        }
    }

    fn on_restart(&mut self, timers: &mut TimerQueue<MirrorTimer>) {
        self.restart_timer = None;
        if self.user_stopped || self.device.is_none() {
            return;
        }
        self.launch(timers);
    }
}

impl LoopHandler for MirrorSupervisor {
    type Message = MirrorCommand;
    type Timer = MirrorTimer;

    fn on_message(&mut self, message: MirrorCommand, timers: &mut TimerQueue<MirrorTimer>) {
        match message {
            MirrorCommand::Start(device) => self.start(device, timers),
            MirrorCommand::Stop => self.stop(timers),
            MirrorCommand::AttachSurface(surface) => self.attach_surface(surface),
        }
    }

    fn on_timer(&mut self, timer: MirrorTimer, timers: &mut TimerQueue<MirrorTimer>) {
        match timer {
            MirrorTimer::Search => self.on_search(timers),
            MirrorTimer::Monitor => self.on_monitor(timers),
            MirrorTimer::Restart => self.on_restart(timers),
        }
    }

    fn on_shutdown(&mut self, timers: &mut TimerQueue<MirrorTimer>) {
        self.stop(timers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::{EventLoop, LoopHandle};
    use crate::test_support::{FakeLauncher, FakeWindowHost};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn device() -> Device {
        Device::new("10.0.0.7".parse().unwrap())
    }

    fn config(max_retries: u32) -> MirrorConfig {
        MirrorConfig {
            max_retries,
            ..MirrorConfig::default()
        }
    }

    fn supervisor_loop(
        launcher: &FakeLauncher,
        host: &FakeWindowHost,
        max_retries: u32,
    ) -> (EventLoop<MirrorSupervisor>, LoopHandle<MirrorCommand>) {
        let supervisor = MirrorSupervisor::new(
            config(max_retries),
            Box::new(launcher.clone()),
            Box::new(host.clone()),
        )
        .with_surface(WindowHandle(1));
        EventLoop::new(supervisor)
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn embeds_and_monitors() {
        let launcher = FakeLauncher::new();
        let host = FakeWindowHost::new(&launcher);
        let (mut event_loop, handle) = supervisor_loop(&launcher, &host, 10);

        handle.post(MirrorCommand::Start(device()));
        event_loop.advance(Duration::ZERO);
        assert_eq!(event_loop.handler().state(), MirrorState::WindowSearch);

        event_loop.advance(secs(2));
        let sup = event_loop.handler();
        assert_eq!(sup.state(), MirrorState::Monitoring);
        assert!(sup.embedded_window().is_some());
        assert_eq!(host.parented_to(), Some(WindowHandle(1)));
        assert!(sup.session_title().unwrap().starts_with("RT1018_EMBED_"));

        // Monitoring keeps re-asserting placement.
        let placed = host.placements();
        event_loop.advance(secs(3));
        assert_eq!(host.placements(), placed + 3);
        assert_eq!(launcher.launches(), 1);
    }

    #[test]
    fn every_attempt_gets_a_fresh_title() {
        let launcher = FakeLauncher::new();
        launcher.crash_next(1);
        let host = FakeWindowHost::new(&launcher);
        let (mut event_loop, handle) = supervisor_loop(&launcher, &host, 10);

        handle.post(MirrorCommand::Start(device()));
        event_loop.advance(secs(20));

        let titles = launcher.titles();
        assert_eq!(titles.len(), 2);
        assert_ne!(titles[0], titles[1]);
    }

    #[test]
    fn retry_budget_is_n_launch_attempts() {
        for max in [1, 3, 10] {
            let launcher = FakeLauncher::new();
            launcher.crash_next(u32::MAX);
            let host = FakeWindowHost::new(&launcher);
            let (mut event_loop, handle) = supervisor_loop(&launcher, &host, max);

            handle.post(MirrorCommand::Start(device()));
            event_loop.advance(secs(600));

            let sup = event_loop.handler();
            assert_eq!(launcher.launches(), max as usize, "max_retries = {}", max);
            assert_eq!(sup.state(), MirrorState::Stopped);
            assert!(sup.device().is_none());
            assert!(event_loop.timers().is_empty());
        }
    }

    #[test]
    fn successful_embed_resets_retry_count() {
        let launcher = FakeLauncher::new();
        launcher.crash_next(2);
        let host = FakeWindowHost::new(&launcher);
        let (mut event_loop, handle) = supervisor_loop(&launcher, &host, 10);

        handle.post(MirrorCommand::Start(device()));
        event_loop.advance(secs(2));
        assert_eq!(event_loop.handler().retry_count(), 1);

        event_loop.advance(secs(30));
        assert_eq!(event_loop.handler().state(), MirrorState::Monitoring);
        assert_eq!(event_loop.handler().retry_count(), 0);
        assert_eq!(launcher.launches(), 3);
    }

    #[test]
    fn missing_mirror_tool_stops_without_retry() {
        let launcher = FakeLauncher::unavailable();
        let host = FakeWindowHost::new(&launcher);
        let (mut event_loop, handle) = supervisor_loop(&launcher, &host, 10);

        handle.post(MirrorCommand::Start(device()));
        event_loop.advance(secs(60));

        let sup = event_loop.handler();
        assert_eq!(sup.state(), MirrorState::Stopped);
        assert_eq!(sup.retry_count(), 0);
        assert!(sup.device().is_none());
        assert_eq!(launcher.launches(), 0);
        assert!(event_loop.timers().is_empty());
    }

    #[test]
    fn unsupported_host_refuses_to_start() {
        let launcher = FakeLauncher::new();
        let host = FakeWindowHost::unsupported(&launcher);
        let (mut event_loop, handle) = supervisor_loop(&launcher, &host, 10);

        handle.post(MirrorCommand::Start(device()));
        event_loop.advance(secs(5));

        assert_eq!(event_loop.handler().state(), MirrorState::Stopped);
        assert_eq!(launcher.launches(), 0);
    }

    #[test]
    fn unexpected_exit_reconnects_without_counting_a_retry() {
        let launcher = FakeLauncher::new();
        let host = FakeWindowHost::new(&launcher);
        let (mut event_loop, handle) = supervisor_loop(&launcher, &host, 10);

        handle.post(MirrorCommand::Start(device()));
        event_loop.advance(secs(3));
        assert_eq!(event_loop.handler().state(), MirrorState::Monitoring);

        launcher.exit_all(Some(2));
        event_loop.advance(secs(1));
        let sup = event_loop.handler();
        assert_eq!(sup.state(), MirrorState::Retrying);
        assert!(sup.restart_pending());
        assert_eq!(sup.retry_count(), 0);

        event_loop.advance(secs(5));
        assert_eq!(event_loop.handler().state(), MirrorState::Monitoring);
        assert_eq!(launcher.launches(), 2);
    }

    #[test]
    fn user_stop_cancels_pending_reconnect() {
        let launcher = FakeLauncher::new();
        let host = FakeWindowHost::new(&launcher);
        let (mut event_loop, handle) = supervisor_loop(&launcher, &host, 10);

        handle.post(MirrorCommand::Start(device()));
        event_loop.advance(secs(3));
        launcher.exit_all(None);
        event_loop.advance(secs(1));
        assert!(event_loop.handler().restart_pending());

        handle.post(MirrorCommand::Stop);
        event_loop.advance(secs(60));

        let sup = event_loop.handler();
        assert_eq!(sup.state(), MirrorState::Stopped);
        assert!(sup.device().is_none());
        assert!(!sup.restart_pending());
        assert_eq!(launcher.launches(), 1);
        assert!(event_loop.timers().is_empty());
    }

    #[test]
    fn user_stop_terminates_the_process() {
        let launcher = FakeLauncher::new();
        let host = FakeWindowHost::new(&launcher);
        let (mut event_loop, handle) = supervisor_loop(&launcher, &host, 10);

        handle.post(MirrorCommand::Start(device()));
        event_loop.advance(secs(3));
        assert_eq!(launcher.alive(), 1);

        handle.post(MirrorCommand::Stop);
        event_loop.advance(Duration::ZERO);

        assert_eq!(launcher.alive(), 0);
        assert!(!event_loop.handler().has_session());
        assert!(event_loop.timers().is_empty());
    }

    #[test]
    fn restart_leaves_one_process_and_one_window() {
        let launcher = FakeLauncher::new();
        let host = FakeWindowHost::new(&launcher);
        let (mut event_loop, handle) = supervisor_loop(&launcher, &host, 10);

        handle.post(MirrorCommand::Start(device()));
        event_loop.advance(secs(3));

        // Restart mid-search and mid-monitoring.
        handle.post(MirrorCommand::Start(device()));
        event_loop.advance(secs(1));
        handle.post(MirrorCommand::Start(Device::new("10.0.0.8".parse().unwrap())));
        event_loop.advance(secs(5));

        assert_eq!(launcher.launches(), 3);
        assert_eq!(launcher.alive(), 1);
        assert_eq!(host.live_embedded_windows(), 1);
        assert_eq!(
            event_loop.handler().device().map(|d| d.address.ip.as_str()),
            Some("10.0.0.8")
        );
    }

    #[test]
    fn embed_failure_is_retried() {
        let launcher = FakeLauncher::new();
        let host = FakeWindowHost::new(&launcher);
        host.fail_embeds(1);
        let (mut event_loop, handle) = supervisor_loop(&launcher, &host, 10);

        handle.post(MirrorCommand::Start(device()));
        event_loop.advance(secs(2));
        assert_eq!(event_loop.handler().state(), MirrorState::Retrying);
        assert_eq!(launcher.alive(), 0);

        event_loop.advance(secs(10));
        assert_eq!(event_loop.handler().state(), MirrorState::Monitoring);
    }

    #[test]
    fn failed_reparent_is_retried_not_embedded() {
        let launcher = FakeLauncher::new();
        let host = FakeWindowHost::new(&launcher);
        host.fail_reparents(1);
        let (mut event_loop, handle) = supervisor_loop(&launcher, &host, 10);

        handle.post(MirrorCommand::Start(device()));
        event_loop.advance(secs(2));
        let sup = event_loop.handler();
        assert_eq!(sup.state(), MirrorState::Retrying);
        assert_eq!(sup.retry_count(), 1);
        assert!(sup.embedded_window().is_none());
        assert_eq!(host.parented_to(), None);

        event_loop.advance(secs(10));
        assert_eq!(event_loop.handler().state(), MirrorState::Monitoring);
        assert_eq!(host.parented_to(), Some(WindowHandle(1)));
    }

    #[test]
    fn status_callback_sees_every_transition() {
        let launcher = FakeLauncher::new();
        let host = FakeWindowHost::new(&launcher);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let supervisor = MirrorSupervisor::new(
            config(10),
            Box::new(launcher.clone()),
            Box::new(host.clone()),
        )
        .with_surface(WindowHandle(1))
        .with_status_callback(Box::new(move |state: MirrorState, _note: &str| {
            record.lock().push(state);
        }));
        let (mut event_loop, handle) = EventLoop::new(supervisor);

        handle.post(MirrorCommand::Start(device()));
        event_loop.advance(secs(5));

        let seen = seen.lock().clone();
        let embedded = seen.iter().position(|s| *s == MirrorState::Embedded).unwrap();
        assert_eq!(seen.get(embedded + 1), Some(&MirrorState::Monitoring));
        assert_eq!(seen.iter().filter(|s| **s == MirrorState::Monitoring).count(), 1);
    }

    #[test]
    fn shutdown_stops_mirroring() {
        let launcher = FakeLauncher::new();
        let host = FakeWindowHost::new(&launcher);
        let (mut event_loop, handle) = supervisor_loop(&launcher, &host, 10);

        handle.post(MirrorCommand::Start(device()));
        event_loop.advance(secs(3));
        handle.shutdown();
        event_loop.advance(Duration::ZERO);

        assert!(event_loop.is_finished());
        assert_eq!(launcher.alive(), 0);
        assert_eq!(event_loop.handler().state(), MirrorState::Stopped);
    }
}
