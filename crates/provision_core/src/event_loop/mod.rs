//! Single-threaded event loop with timers.
//!
//! The loop owns one [`LoopHandler`] and its [`TimerQueue`]. Other threads
//! never touch the handler; they post messages through a cloneable
//! [`LoopHandle`].
//!
//! ```text
//! worker thread ──post(msg)──► mpsc ──► EventLoop ──► handler.on_message
//!                                       TimerQueue ─► handler.on_timer
//! ```

mod timer;

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::{Duration, Instant};

pub use timer::{TimerId, TimerQueue};

/// State machine driven by the loop.
pub trait LoopHandler {
    type Message: Send + 'static;
    type Timer;

    fn on_message(&mut self, message: Self::Message, timers: &mut TimerQueue<Self::Timer>);

    fn on_timer(&mut self, timer: Self::Timer, timers: &mut TimerQueue<Self::Timer>);

    /// Last call before the loop exits.
    fn on_shutdown(&mut self, _timers: &mut TimerQueue<Self::Timer>) {}
}

enum Envelope<M> {
    Message(M),
    Shutdown,
}

/// Sending side of the loop. Cheap to clone, usable from any thread.
pub struct LoopHandle<M> {
    sender: Sender<Envelope<M>>,
}

impl<M> Clone for LoopHandle<M> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<M> LoopHandle<M> {
    /// Queue a message. Returns `false` once the loop has exited.
    pub fn post(&self, message: M) -> bool {
        self.sender.send(Envelope::Message(message)).is_ok()
    }

    /// Ask the loop to exit after the messages already queued.
    pub fn shutdown(&self) -> bool {
        self.sender.send(Envelope::Shutdown).is_ok()
    }
}

pub struct EventLoop<H: LoopHandler> {
    handler: H,
    timers: TimerQueue<H::Timer>,
    receiver: Receiver<Envelope<H::Message>>,
    finished: bool,
}

impl<H: LoopHandler> EventLoop<H> {
    pub fn new(handler: H) -> (Self, LoopHandle<H::Message>) {
        let (sender, receiver) = mpsc::channel();
        let event_loop = Self {
            handler,
            timers: TimerQueue::new(Instant::now()),
            receiver,
            finished: false,
        };
        (event_loop, LoopHandle { sender })
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn timers(&self) -> &TimerQueue<H::Timer> {
        &self.timers
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Block, dispatching messages and timers against the wall clock, until
    /// shutdown is requested or every handle is dropped.
    pub fn run(mut self) -> H {
        tracing::debug!("Event loop started");
        while !self.finished {
            self.timers.set_now(Instant::now());
            self.fire_due();

            let received = match self.timers.time_until_next() {
                Some(wait) => self.receiver.recv_timeout(wait),
                None => self
                    .receiver
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(envelope) => self.dispatch(envelope),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => self.finish(),
            }
        }
        tracing::debug!("Event loop stopped");
        self.handler
    }

    /// Dispatch everything already queued and every timer due by wall-clock
    /// time, without blocking. Returns `false` once the loop has finished.
    pub fn run_pending(&mut self) -> bool {
        self.drain_messages();
        if !self.finished {
            self.timers.set_now(Instant::now());
            self.fire_due();
            self.drain_messages();
        }
        !self.finished
    }

    /// Advance virtual time by `by`, firing timers at their own deadlines.
    ///
    /// Timers scheduled while advancing fire too if they fall inside the
    /// window. Queued messages are handled first and between timer batches.
    pub fn advance(&mut self, by: Duration) {
        self.drain_messages();
        let target = self.timers.now() + by;
        while !self.finished {
            match self.timers.next_deadline() {
                Some(deadline) if deadline <= target => {
                    self.timers.set_now(deadline);
                    self.fire_due();
                    self.drain_messages();
                }
                _ => break,
            }
        }
        self.timers.set_now(target);
    }

    fn fire_due(&mut self) {
        while let Some((_, timer)) = self.timers.pop_due() {
            self.handler.on_timer(timer, &mut self.timers);
        }
    }

    fn drain_messages(&mut self) {
        while !self.finished {
            match self.receiver.try_recv() {
                Ok(envelope) => self.dispatch(envelope),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.finish(),
            }
        }
    }

    fn dispatch(&mut self, envelope: Envelope<H::Message>) {
        match envelope {
            Envelope::Message(message) => self.handler.on_message(message, &mut self.timers),
            Envelope::Shutdown => self.finish(),
        }
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.handler.on_shutdown(&mut self.timers);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// Echoes messages into a log and re-arms a ticker a fixed number of times.
    #[derive(Default)]
    struct Recorder {
        seen: Vec<String>,
        ticks_left: u32,
        shut_down: bool,
    }

    enum Msg {
        Note(&'static str),
        StartTicking(u32),
    }

    impl LoopHandler for Recorder {
        type Message = Msg;
        type Timer = &'static str;

        fn on_message(&mut self, message: Msg, timers: &mut TimerQueue<Self::Timer>) {
            match message {
                Msg::Note(text) => self.seen.push(text.to_string()),
                Msg::StartTicking(n) => {
                    self.ticks_left = n;
                    timers.schedule(Duration::from_secs(1), "tick");
                }
            }
        }

        fn on_timer(&mut self, timer: &'static str, timers: &mut TimerQueue<Self::Timer>) {
            self.seen.push(timer.to_string());
            self.ticks_left -= 1;
            if self.ticks_left > 0 {
                timers.schedule(Duration::from_secs(1), "tick");
            }
        }

        fn on_shutdown(&mut self, _timers: &mut TimerQueue<Self::Timer>) {
            self.shut_down = true;
        }
    }

    #[test]
    fn virtual_time_fires_rescheduled_timers() {
        let (mut event_loop, handle) = EventLoop::new(Recorder::default());
        handle.post(Msg::StartTicking(3));

        event_loop.advance(Duration::from_millis(2500));
        assert_eq!(event_loop.handler().seen, vec!["tick", "tick"]);

        event_loop.advance(Duration::from_secs(10));
        assert_eq!(event_loop.handler().seen.len(), 3);
        assert!(event_loop.timers().is_empty());
    }

    #[test]
    fn messages_from_other_threads_are_delivered_in_order() {
        let (event_loop, handle) = EventLoop::new(Recorder::default());

        let worker = {
            let handle = handle.clone();
            thread::spawn(move || {
                handle.post(Msg::Note("first"));
                handle.post(Msg::Note("second"));
                handle.shutdown();
            })
        };
        worker.join().unwrap();
        drop(handle);

        let recorder = event_loop.run();
        assert_eq!(recorder.seen, vec!["first", "second"]);
        assert!(recorder.shut_down);
    }

    #[test]
    fn dropping_every_handle_ends_the_loop() {
        let (mut event_loop, handle) = EventLoop::new(Recorder::default());
        drop(handle);

        assert!(!event_loop.run_pending());
        assert!(event_loop.handler().shut_down);
    }
}
