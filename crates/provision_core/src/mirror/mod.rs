//! Screen mirroring: supervising the external mirror tool.
//!
//! [`MirrorSupervisor`] runs on the event loop. Device runs on worker
//! threads reach it only through a [`MirrorTrigger`], normally a
//! `LoopHandle<MirrorCommand>`.

mod errors;
mod process;
mod session;
mod supervisor;
mod window;

pub use errors::{MirrorError, MirrorResult};
pub use process::{
    ChildProcess, LaunchRequest, MirrorExit, MirrorLauncher, MirrorProcess, ToolMirrorLauncher,
};
pub use session::MirrorSession;
pub use supervisor::{
    MirrorCommand, MirrorConfig, MirrorState, MirrorSupervisor, MirrorTimer, StatusCallback,
};
#[cfg(windows)]
pub use window::Win32WindowHost;
pub use window::{platform_window_host, Placement, UnsupportedWindowHost, WindowHandle, WindowHost};

use crate::device::Device;
use crate::event_loop::LoopHandle;

/// Fire-and-forget mirror control for worker threads.
pub trait MirrorTrigger: Send + Sync {
    /// Returns `false` if the request could not be delivered.
    fn start_mirror(&self, device: &Device) -> bool;

    fn stop_mirror(&self) -> bool;
}

impl MirrorTrigger for LoopHandle<MirrorCommand> {
    fn start_mirror(&self, device: &Device) -> bool {
        self.post(MirrorCommand::Start(device.clone()))
    }

    fn stop_mirror(&self) -> bool {
        self.post(MirrorCommand::Stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::EventLoop;
    use crate::test_support::{FakeLauncher, FakeWindowHost};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn worker_thread_start_reaches_supervisor() {
        let launcher = FakeLauncher::new();
        let host = FakeWindowHost::new(&launcher);
        let supervisor = MirrorSupervisor::new(
            MirrorConfig::default(),
            Box::new(launcher.clone()),
            Box::new(host),
        );
        let (mut event_loop, handle) = EventLoop::new(supervisor);

        let trigger: Arc<dyn MirrorTrigger> = Arc::new(handle);
        let worker = {
            let trigger = trigger.clone();
            thread::spawn(move || {
                trigger.start_mirror(&Device::new("10.0.0.3".parse().unwrap()))
            })
        };
        assert!(worker.join().unwrap());

        event_loop.advance(Duration::from_secs(3));
        assert_eq!(event_loop.handler().state(), MirrorState::Monitoring);
        assert_eq!(launcher.launches(), 1);
    }
}
