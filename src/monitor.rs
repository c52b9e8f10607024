use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Duration, Instant, Interval, MissedTickBehavior};

use crate::codec::{Envelope, OutboundFrame};
use crate::events::{EventChannel, EventKind, ListenerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    Connect,
    End,
}

/// Tracks `connect`/`end` and re-sends `create` on a fixed period while
/// disconnected. No backoff, no retry limit.
pub(crate) struct ConnectionMonitor {
    envelope: Envelope,
    state: watch::Sender<ConnectionState>,
    period: Duration,
    timer: Option<Interval>,
    listeners: Vec<ListenerId>,
}

impl ConnectionMonitor {
    pub(crate) fn new(envelope: Envelope, period: Duration) -> (Self, watch::Receiver<ConnectionState>) {
        let (state, state_rx) = watch::channel(ConnectionState::Disconnected);
        (
            Self {
                envelope,
                state,
                period,
                timer: None,
                listeners: Vec::new(),
            },
            state_rx,
        )
    }

    /// Subscribes to the hub; the returned receiver carries the transitions
    /// the monitor must apply.
    pub(crate) fn attach(&mut self, events: &EventChannel) -> mpsc::UnboundedReceiver<Signal> {
        let (tx, rx) = mpsc::unbounded_channel();
        for (kind, signal) in [(EventKind::Connect, Signal::Connect), (EventKind::End, Signal::End)] {
            let tx = tx.clone();
            self.listeners.push(events.on(kind, move |_| {
                let _ = tx.send(signal);
            }));
        }
        rx
    }

    pub(crate) fn detach(&mut self, events: &EventChannel) {
        for id in self.listeners.drain(..) {
            events.off(id);
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn is_reconnecting(&self) -> bool {
        self.timer.is_some()
    }

    /// First connect attempt, made once at construction.
    pub(crate) fn start(&mut self) {
        self.state.send_replace(ConnectionState::Connecting);
        self.connect();
    }

    pub(crate) fn apply(&mut self, signal: Signal) {
        match signal {
            Signal::Connect => {
                if self.timer.take().is_some() {
                    tracing::debug!("reconnect timer cleared");
                }
                self.set_state(ConnectionState::Connected);
            }
            Signal::End => {
                self.set_state(ConnectionState::Disconnected);
                if self.timer.is_none() {
                    let mut timer = interval_at(Instant::now() + self.period, self.period);
                    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.timer = Some(timer);
                    tracing::debug!(period = ?self.period, "reconnect timer armed");
                }
            }
        }
    }

    /// Resolves on the next reconnect tick; never resolves while no timer
    /// is armed.
    pub(crate) async fn tick(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    pub(crate) fn connect(&self) {
        if let Err(e) = self.envelope.send(&OutboundFrame::Create) {
            tracing::warn!("connect attempt failed: {e}");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::info!("connection {previous:?} -> {state:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use crate::port::ChannelPort;
    use std::sync::Arc;

    fn monitor() -> (
        ConnectionMonitor,
        watch::Receiver<ConnectionState>,
        mpsc::UnboundedReceiver<crate::port::PostedMessage>,
    ) {
        let (port, posted) = ChannelPort::new(None);
        let (monitor, state) =
            ConnectionMonitor::new(Envelope::new(Arc::new(port)), Duration::from_millis(500));
        (monitor, state, posted)
    }

    #[tokio::test]
    async fn start_sends_create_and_enters_connecting() {
        let (mut monitor, state, mut posted) = monitor();
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);
        monitor.start();
        assert_eq!(*state.borrow(), ConnectionState::Connecting);
        assert_eq!(posted.recv().await.unwrap().json(), serde_json::json!({"type": "create"}));
    }

    #[tokio::test]
    async fn end_arms_once_and_connect_clears() {
        let (mut monitor, _state, _posted) = monitor();
        monitor.apply(Signal::End);
        assert!(monitor.is_reconnecting());
        assert_eq!(monitor.state(), ConnectionState::Disconnected);
        monitor.apply(Signal::End);
        assert!(monitor.is_reconnecting());
        monitor.apply(Signal::Connect);
        assert!(!monitor.is_reconnecting());
        assert_eq!(monitor.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_fires_after_one_period() {
        let (mut monitor, _state, _posted) = monitor();
        monitor.apply(Signal::End);
        let started = Instant::now();
        monitor.tick().await;
        assert_eq!(started.elapsed(), Duration::from_millis(500));
        monitor.tick().await;
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn hub_events_become_signals_until_detached() {
        let (mut monitor, _state, _posted) = monitor();
        let events = EventChannel::new();
        let mut signals = monitor.attach(&events);
        events.emit(&Event::End);
        events.emit(&Event::Connect);
        assert_eq!(signals.recv().await, Some(Signal::End));
        assert_eq!(signals.recv().await, Some(Signal::Connect));
        monitor.detach(&events);
        assert_eq!(events.listener_count(EventKind::Connect), 0);
        assert_eq!(events.listener_count(EventKind::End), 0);
    }
}
