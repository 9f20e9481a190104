//! Last known device state and change detection

use tokio::sync::watch;

use crate::codec::DecodedResponse;
use crate::command::{InputMask, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Enabled flag per input, as last reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
pub struct InputStatus {
    pub sdi: bool,
    pub hdmi: bool,
    pub dvi: bool,
}

impl InputStatus {
    pub fn get(&self, signal: Signal) -> bool {
        match signal {
            Signal::Sdi => self.sdi,
            Signal::Hdmi => self.hdmi,
            Signal::Dvi => self.dvi,
        }
    }

    /// The enabled input, if exactly one is enabled.
    pub fn active(&self) -> Option<Signal> {
        let mut enabled = Signal::ALL.iter().copied().filter(|s| self.get(*s));
        match (enabled.next(), enabled.next()) {
            (Some(signal), None) => Some(signal),
            _ => None,
        }
    }
}

impl From<InputMask> for InputStatus {
    fn from(mask: InputMask) -> Self {
        Self {
            sdi: mask.contains(Signal::Sdi),
            hdmi: mask.contains(Signal::Hdmi),
            dvi: mask.contains(Signal::Dvi),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct DeviceState {
    pub brightness: u8,
    pub blackout: bool,
    pub inputs: InputStatus,
    pub connection: ConnectionStatus,
}

impl DeviceState {
    /// Normal output is the complement of blackout.
    pub fn normal_active(&self) -> bool {
        !self.blackout
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            brightness: 0,
            blackout: false,
            inputs: InputStatus::default(),
            connection: ConnectionStatus::Disconnected,
        }
    }
}

/// A single field-level difference between two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    Input {
        source: Signal,
        old: bool,
        new: bool,
    },
    Brightness {
        old: u8,
        new: u8,
    },
    Blackout {
        old: bool,
        new: bool,
    },
    Connection {
        old: ConnectionStatus,
        new: ConnectionStatus,
    },
}

/// Owns the current [`DeviceState`]. There is exactly one writer; readers
/// hold a [`StateReader`] and only ever see whole snapshots.
#[derive(Debug)]
pub struct DeviceStateStore {
    tx: watch::Sender<DeviceState>,
}

impl Default for DeviceStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceStateStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(DeviceState::default());
        Self { tx }
    }

    pub fn snapshot(&self) -> DeviceState {
        self.tx.borrow().clone()
    }

    pub fn reader(&self) -> StateReader {
        StateReader {
            rx: self.tx.subscribe(),
        }
    }

    /// Merge a device reply into the state and return what changed.
    pub fn apply(&mut self, decoded: &DecodedResponse) -> Vec<StateChange> {
        let old = self.snapshot();
        let mut new = old.clone();

        match *decoded {
            DecodedResponse::Status {
                brightness,
                blackout,
                inputs,
            } => {
                new.brightness = brightness;
                new.blackout = blackout;
                new.inputs = inputs.into();
            }
            DecodedResponse::InputSwitched(inputs) => new.inputs = inputs.into(),
            DecodedResponse::ModeSet { blackout } => new.blackout = blackout,
            DecodedResponse::BrightnessSet(level) => new.brightness = level,
        }

        let changes = diff(&old, &new);
        if !changes.is_empty() {
            self.tx.send_replace(new);
        }
        changes
    }

    pub fn set_connection(&mut self, status: ConnectionStatus) -> Option<StateChange> {
        let old = self.tx.borrow().connection;
        if old == status {
            return None;
        }

        self.tx.send_modify(|state| state.connection = status);
        Some(StateChange::Connection { old, new: status })
    }
}

/// Differences from `old` to `new`: inputs in [`Signal::ALL`] order, then
/// brightness, blackout and connection.
pub fn diff(old: &DeviceState, new: &DeviceState) -> Vec<StateChange> {
    let mut changes = Vec::new();

    for source in Signal::ALL.iter().copied() {
        let (was, is) = (old.inputs.get(source), new.inputs.get(source));
        if was != is {
            changes.push(StateChange::Input {
                source,
                old: was,
                new: is,
            });
        }
    }

    if old.brightness != new.brightness {
        changes.push(StateChange::Brightness {
            old: old.brightness,
            new: new.brightness,
        });
    }

    if old.blackout != new.blackout {
        changes.push(StateChange::Blackout {
            old: old.blackout,
            new: new.blackout,
        });
    }

    if old.connection != new.connection {
        changes.push(StateChange::Connection {
            old: old.connection,
            new: new.connection,
        });
    }

    changes
}

/// Read-only view on the store
#[derive(Debug, Clone)]
pub struct StateReader {
    rx: watch::Receiver<DeviceState>,
}

impl StateReader {
    pub fn snapshot(&self) -> DeviceState {
        self.rx.borrow().clone()
    }

    /// Wait until the state differs from the last snapshot seen by this
    /// reader. Returns `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<DeviceState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}
