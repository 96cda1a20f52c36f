//! Connection guard: make sure a device answers before touching it.
//!
//! Network devices drop off regularly (always after a reboot, sometimes
//! mid-transfer), so the guard is consulted before every transfer attempt
//! rather than once per run.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::logging::RunLogger;

use super::errors::{DeviceError, DeviceResult};
use super::runner::CommandExecutor;
use super::types::{ConnectionStatus, Device, DeviceAddress};

/// Default number of polls made by [`ConnectionGuard::ensure_connected`].
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;

/// Timeouts and delays used by the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardTiming {
    /// Timeout for a single `get-state` query.
    pub state_timeout: Duration,
    /// Timeout for a `connect` command.
    pub connect_timeout: Duration,
    /// Pause after issuing `connect` before polling again.
    pub reconnect_delay: Duration,
}

impl Default for GuardTiming {
    fn default() -> Self {
        Self {
            state_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(2),
        }
    }
}

/// Ensures devices are reachable, reconnecting when they are not.
pub struct ConnectionGuard {
    executor: Arc<dyn CommandExecutor>,
    timing: GuardTiming,
    logger: Option<Arc<RunLogger>>,
}

impl ConnectionGuard {
    pub fn new(executor: Arc<dyn CommandExecutor>, timing: GuardTiming) -> Self {
        Self {
            executor,
            timing,
            logger: None,
        }
    }

    /// Report reconnect attempts to a run log as well as tracing.
    pub fn with_logger(mut self, logger: Arc<RunLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn timing(&self) -> &GuardTiming {
        &self.timing
    }

    /// One `get-state` poll. Ready means exit 0 and state `device`.
    pub fn is_ready(&self, address: &DeviceAddress) -> bool {
        match self
            .executor
            .run(Some(address), &["get-state"], self.timing.state_timeout)
        {
            Ok(out) => out.trim() == "device",
            Err(e) => {
                tracing::debug!("get-state for {} failed: {}", address, e);
                false
            }
        }
    }

    /// Global `connect <address>`.
    pub fn reconnect(&self, address: &DeviceAddress) -> DeviceResult<String> {
        let target = address.to_string();
        self.executor
            .run(None, &["connect", &target], self.timing.connect_timeout)
    }

    /// Poll up to `max_attempts` times, reconnecting between polls.
    ///
    /// Returns `false` when the device never became ready; this is a soft
    /// signal and never an error.
    pub fn ensure_connected(&self, address: &DeviceAddress, max_attempts: u32) -> bool {
        for attempt in 1..=max_attempts {
            if self.is_ready(address) {
                if attempt > 1 {
                    self.info("Device reconnected");
                }
                return true;
            }

            tracing::debug!(
                "Device {} offline, reconnect attempt {}/{}",
                address,
                attempt,
                max_attempts
            );
            self.info(&format!(
                "Reconnecting to device... ({}/{})",
                attempt, max_attempts
            ));

            if attempt < max_attempts {
                if let Err(e) = self.reconnect(address) {
                    tracing::debug!("connect {} failed: {}", address, e);
                }
                pause(self.timing.reconnect_delay);
            }
        }

        self.warn(&format!("Device {} could not be reconnected", address));
        false
    }

    /// [`ensure_connected`](Self::ensure_connected) as a `Result`.
    pub fn require_connected(&self, address: &DeviceAddress, max_attempts: u32) -> DeviceResult<()> {
        if self.ensure_connected(address, max_attempts) {
            Ok(())
        } else {
            Err(DeviceError::connectivity(address.to_string(), max_attempts))
        }
    }

    /// Fill in the device's reported Android version and model.
    ///
    /// A property that can not be read keeps its previous value. Returns
    /// whether both were read.
    pub fn describe(&self, device: &mut Device) -> bool {
        let version = self.read_property(&device.address, "ro.build.version.release");
        let model = self.read_property(&device.address, "ro.product.model");
        let complete = version.is_some() && model.is_some();

        if version.is_some() || model.is_some() {
            device.status = ConnectionStatus::Connected;
        }
        if let Some(version) = version {
            device.version = Some(version);
        }
        if let Some(model) = model {
            device.model = Some(model);
        }
        complete
    }

    fn read_property(&self, address: &DeviceAddress, name: &str) -> Option<String> {
        match self
            .executor
            .run(Some(address), &["shell", "getprop", name], self.timing.state_timeout)
        {
            Ok(out) => Some(out.trim().to_string()).filter(|value| !value.is_empty()),
            Err(e) => {
                tracing::debug!("getprop {} on {} failed: {}", name, address, e);
                None
            }
        }
    }

    /// Poll every `interval` until the device is ready or `max_wait` passes.
    ///
    /// Used after operations that restart the device daemon (root, reboot).
    pub fn wait_until_ready(
        &self,
        address: &DeviceAddress,
        max_wait: Duration,
        interval: Duration,
    ) -> bool {
        let started = Instant::now();
        let deadline = started + max_wait;
        loop {
            if self.is_ready(address) {
                self.info(&format!(
                    "Device ready after {}s",
                    started.elapsed().as_secs()
                ));
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            if let Err(e) = self.reconnect(address) {
                tracing::debug!("connect {} failed: {}", address, e);
            }
            pause(interval);
        }
    }

    fn info(&self, message: &str) {
        if let Some(ref logger) = self.logger {
            logger.info(message);
        }
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
        if let Some(ref logger) = self.logger {
            logger.warn(message);
        }
    }
}

/// Sleep the calling worker thread; zero durations return immediately.
pub(crate) fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}
