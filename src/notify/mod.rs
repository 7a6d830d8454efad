//! Cooldown-gated notification of detection events.
//!
//! Each aggregator task owns one [`NotificationState`] and drains one or more
//! detection queues. A positive event fires the outbound call only when the
//! cooldown window since the last attempt has elapsed; the window restarts on
//! every attempt whether or not the endpoint acknowledged it.

#[cfg(feature = "http-notify")]
mod http;

#[cfg(feature = "http-notify")]
pub use http::HttpNotifier;

use crate::clock::Clock;
use crate::event::DetectionEvent;
use crate::queue::QueueReceiver;
use anyhow::Result;
use crossbeam_channel::Select;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-channel suppression window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationState {
    pub last_sent: Option<Duration>,
    pub cooldown: Duration,
}

/// What the cooldown policy made of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Negative event; nothing to do.
    Ignored,
    /// Positive event inside the cooldown window.
    Suppressed { remaining: Duration },
    Send,
}

impl Decision {
    pub fn should_send(self) -> bool {
        matches!(self, Decision::Send)
    }
}

impl NotificationState {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last_sent: None,
            cooldown,
        }
    }

    /// Apply the cooldown rule to `event` observed at `now`.
    pub fn evaluate(self, event: DetectionEvent, now: Duration) -> (Decision, Self) {
        if !event.detected {
            return (Decision::Ignored, self);
        }
        if let Some(last) = self.last_sent {
            let elapsed = now.saturating_sub(last);
            if elapsed < self.cooldown {
                let remaining = self.cooldown - elapsed;
                return (Decision::Suppressed { remaining }, self);
            }
        }
        let next = Self {
            last_sent: Some(now),
            ..self
        };
        (Decision::Send, next)
    }

    /// Returns whether to send, plus the state to carry forward.
    pub fn on_event(self, event: DetectionEvent, now: Duration) -> (bool, Self) {
        let (decision, next) = self.evaluate(event, now);
        (decision.should_send(), next)
    }
}

/// Outbound side of the notifier (an HTTP endpoint on the device).
pub trait NotificationSink: Send {
    fn send(&mut self, event: &DetectionEvent) -> Result<()>;
}

impl<T: NotificationSink + ?Sized> NotificationSink for Box<T> {
    fn send(&mut self, event: &DetectionEvent) -> Result<()> {
        (**self).send(event)
    }
}

/// Sink that only records the notification in the log. Used when the crate is
/// built without `http-notify`.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn send(&mut self, event: &DetectionEvent) -> Result<()> {
        info!(source = event.source.label(), "notification (log only)");
        Ok(())
    }
}

/// Long-running decision loop for one notification channel.
pub struct Notifier<S, C> {
    channel: String,
    state: NotificationState,
    sink: S,
    clock: C,
    attempts: u64,
}

impl<S: NotificationSink, C: Clock> Notifier<S, C> {
    pub fn new(channel: impl Into<String>, cooldown: Duration, sink: S, clock: C) -> Self {
        Self {
            channel: channel.into(),
            state: NotificationState::new(cooldown),
            sink,
            clock,
            attempts: 0,
        }
    }

    pub fn state(&self) -> NotificationState {
        self.state
    }

    /// Outbound calls attempted so far, successful or not.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Evaluate one event and perform the outbound call if it qualifies.
    pub fn handle(&mut self, event: DetectionEvent) -> Decision {
        let now = self.clock.now();
        let (decision, next) = self.state.evaluate(event, now);
        self.state = next;
        match decision {
            Decision::Ignored => {}
            Decision::Suppressed { remaining } => {
                info!(
                    channel = %self.channel,
                    source = event.source.label(),
                    remaining_s = remaining.as_secs(),
                    "detection inside cooldown window; notification suppressed"
                );
            }
            Decision::Send => {
                self.attempts += 1;
                info!(
                    channel = %self.channel,
                    source = event.source.label(),
                    "detection confirmed; notifying endpoint"
                );
                // The window is already restarted; a failed call is not retried.
                if let Err(err) = self.sink.send(&event) {
                    warn!(channel = %self.channel, "notification failed: {err:#}");
                }
            }
        }
        decision
    }

    /// Drain a single queue until its producers are gone.
    pub fn run(&mut self, events: QueueReceiver<DetectionEvent>) {
        while let Some(event) = events.recv() {
            self.handle(event);
        }
        debug!(channel = %self.channel, "event queue closed; notifier exiting");
    }

    /// Drain several queues through one state. No ordering is assumed between
    /// queues; each event is judged as it arrives.
    pub fn run_shared(&mut self, queues: &[QueueReceiver<DetectionEvent>]) {
        let mut open = vec![true; queues.len()];
        loop {
            let mut select = Select::new();
            let mut slots = Vec::with_capacity(queues.len());
            for (idx, queue) in queues.iter().enumerate() {
                if open[idx] {
                    select.recv(queue.channel());
                    slots.push(idx);
                }
            }
            if slots.is_empty() {
                break;
            }
            let op = select.select();
            let idx = slots[op.index()];
            match op.recv(queues[idx].channel()) {
                Ok(event) => {
                    self.handle(event);
                }
                Err(_) => open[idx] = false,
            }
        }
        debug!(channel = %self.channel, "all event queues closed; notifier exiting");
    }
}
