//! Periodic liveness checks
//!
//! The poller is the only place that reconnects: every tick either probes the
//! live session or, when there is none, tries a fresh connect. It can be
//! paused and resumed without stopping the task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::command::Command;
use crate::connection::ConnectionManager;
use crate::error::Error;
use crate::state::ConnectionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum PollerState {
    Idle,
    Polling,
    Healthy,
    Degraded,
    Paused,
}

pub struct Poller {
    manager: ConnectionManager,
    interval: Duration,
    state: watch::Sender<PollerState>,
    enabled: watch::Receiver<bool>,
    failures: u32,
}

impl Poller {
    /// Start polling on `manager` at its configured interval. The first tick
    /// is immediate.
    pub fn spawn(manager: ConnectionManager) -> PollerHandle {
        let cancel = CancellationToken::new();
        let (state, state_rx) = watch::channel(PollerState::Idle);
        let (enabled, enabled_rx) = watch::channel(true);

        let poller = Poller {
            manager: manager.clone(),
            interval: manager.poll_interval(),
            state,
            enabled: enabled_rx,
            failures: 0,
        };
        let task = tokio::spawn(poller.run(cancel.clone()));

        PollerHandle {
            manager,
            control: PollerControl {
                enabled: Arc::new(enabled),
                state: state_rx,
            },
            cancel,
            task,
        }
    }

    fn ticker(&self) -> Interval {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = self.ticker();

        loop {
            if !*self.enabled.borrow_and_update() {
                self.state.send_replace(PollerState::Paused);
                tracing::debug!("polling paused");

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    Ok(()) = self.enabled.changed() => {}
                }
                // resuming starts a fresh schedule with an immediate tick
                ticker = self.ticker();
                continue;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Ok(()) = self.enabled.changed() => continue,
                _ = ticker.tick() => {}
            }

            let keep_going = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                keep_going = self.tick() => keep_going,
            };
            if !keep_going {
                break;
            }
        }

        self.state.send_replace(PollerState::Idle);
        tracing::debug!("poller stopped");
    }

    async fn tick(&mut self) -> bool {
        self.state.send_replace(PollerState::Polling);

        let result = match self.manager.state().connection {
            ConnectionStatus::Disconnected => self.manager.connect().await.map(|_| ()),
            ConnectionStatus::Connected => self.manager.send(Command::Probe).await.map(|_| ()),
        };

        // a failed connect or send has already dropped its session
        match result {
            Ok(()) => {
                if self.failures > 0 {
                    tracing::info!(failures = self.failures, "device reachable again");
                }
                self.failures = 0;
                self.state.send_replace(PollerState::Healthy);
                true
            }
            Err(Error::Cancelled) => false,
            Err(e) => {
                self.failures += 1;
                tracing::warn!(error = %e, failures = self.failures, "poll failed");
                self.state.send_replace(PollerState::Degraded);
                true
            }
        }
    }
}

/// Pause and resume switch for a running poller
#[derive(Clone)]
pub struct PollerControl {
    enabled: Arc<watch::Sender<bool>>,
    state: watch::Receiver<PollerState>,
}

impl PollerControl {
    pub fn state(&self) -> PollerState {
        *self.state.borrow()
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.borrow()
    }

    /// Stop ticking. Returns once a tick that was in flight has finished, so
    /// no poll-driven connect can land after this.
    pub async fn pause(&self) {
        self.enabled.send_replace(false);

        let mut state = self.state.clone();
        while *state.borrow_and_update() != PollerState::Paused {
            if state.changed().await.is_err() {
                break;
            }
        }
    }

    pub fn resume(&self) {
        self.enabled.send_replace(true);
    }
}

pub struct PollerHandle {
    manager: ConnectionManager,
    control: PollerControl,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn state(&self) -> PollerState {
        self.control.state()
    }

    pub fn control(&self) -> PollerControl {
        self.control.clone()
    }

    /// Stop ticking and shut the connection down. Does not wait for an
    /// in-flight tick to finish on its own.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.manager.shutdown().await;
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "poller task ended abnormally");
        }
    }
}
