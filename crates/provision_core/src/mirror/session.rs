//! One mirror attempt: process, correlation title, window, timers.

use std::time::Duration;

use crate::event_loop::{TimerId, TimerQueue};

use super::process::{MirrorExit, MirrorProcess};
use super::window::WindowHandle;

pub struct MirrorSession {
    process: Box<dyn MirrorProcess>,
    title: String,
    window: Option<WindowHandle>,
    search_timer: Option<TimerId>,
    monitor_timer: Option<TimerId>,
}

impl MirrorSession {
    pub fn new(process: Box<dyn MirrorProcess>, title: String) -> Self {
        Self {
            process,
            title,
            window: None,
            search_timer: None,
            monitor_timer: None,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn pid(&self) -> u32 {
        self.process.id()
    }

    pub fn window(&self) -> Option<WindowHandle> {
        self.window
    }

    pub fn set_window(&mut self, window: WindowHandle) {
        self.window = Some(window);
    }

    pub fn set_search_timer(&mut self, id: Option<TimerId>) {
        self.search_timer = id;
    }

    pub fn set_monitor_timer(&mut self, id: Option<TimerId>) {
        self.monitor_timer = id;
    }

    /// `Some` once the process has exited. A failed status query counts as exited.
    pub fn exit_status(&mut self) -> Option<MirrorExit> {
        match self.process.try_wait() {
            Ok(exit) => exit,
            Err(e) => {
                tracing::debug!("Mirror process status unavailable: {}", e);
                Some(MirrorExit { code: None })
            }
        }
    }

    /// Cancel timers, then end the process: terminate, wait `grace`, kill,
    /// wait `kill_grace`.
    pub fn close<T>(mut self, timers: &mut TimerQueue<T>, grace: Duration, kill_grace: Duration) {
        for id in [self.search_timer.take(), self.monitor_timer.take()]
            .into_iter()
            .flatten()
        {
            timers.cancel(id);
        }

        if self.exit_status().is_some() {
            return;
        }

        let pid = self.process.id();
        let exited = match self.process.terminate() {
            Ok(()) => matches!(self.process.wait_timeout(grace), Ok(Some(_))),
            Err(e) => {
                tracing::debug!("Terminating mirror process {} failed: {}", pid, e);
                false
            }
        };

        if !exited {
            tracing::debug!("Force killing mirror process {}", pid);
            if let Err(e) = self.process.kill() {
                tracing::debug!("Killing mirror process {} failed: {}", pid, e);
            }
            let _ = self.process.wait_timeout(kill_grace);
        }
    }
}
