//! Outbound notifications derived from state diffs

use tokio::sync::broadcast;

use crate::command::Signal;
use crate::state::{ConnectionStatus, StateChange};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum DeviceEvent {
    InputSourceChanged { source: Signal },
    BrightnessUpdated { value: u8 },
    BlackoutSwitched,
    ConnectionChanged { status: ConnectionStatus },
}

/// Events for one exchange, in a fixed order: input, brightness, blackout,
/// connection. At most one input event is produced, for the first input (in
/// [`Signal::ALL`] order) that became enabled.
pub fn events_for(changes: &[StateChange]) -> Vec<DeviceEvent> {
    let mut input = None;
    let mut brightness = None;
    let mut blackout = false;
    let mut connection = None;

    for change in changes {
        match *change {
            StateChange::Input {
                source,
                old: false,
                new: true,
            } => {
                let first = input.map_or(true, |current: Signal| {
                    Signal::ALL.iter().position(|s| *s == source)
                        < Signal::ALL.iter().position(|s| *s == current)
                });
                if first {
                    input = Some(source);
                }
            }
            StateChange::Input { .. } => {}
            StateChange::Brightness { new, .. } => brightness = Some(new),
            StateChange::Blackout { old, new } => blackout |= old != new,
            StateChange::Connection { new, .. } => connection = Some(new),
        }
    }

    let mut events = Vec::new();
    if let Some(source) = input {
        events.push(DeviceEvent::InputSourceChanged { source });
    }
    if let Some(value) = brightness {
        events.push(DeviceEvent::BrightnessUpdated { value });
    }
    if blackout {
        events.push(DeviceEvent::BlackoutSwitched);
    }
    if let Some(status) = connection {
        events.push(DeviceEvent::ConnectionChanged { status });
    }
    events
}

#[derive(Debug, Clone)]
pub struct EventDispatcher {
    tx: broadcast::Sender<DeviceEvent>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.tx.subscribe()
    }

    /// Publish the events for `changes` and return them.
    pub fn dispatch(&self, changes: &[StateChange]) -> Vec<DeviceEvent> {
        let events = events_for(changes);
        for event in &events {
            tracing::debug!(?event, "device event");
            // no subscribers is fine
            let _ = self.tx.send(*event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecodedResponse;
    use crate::command::InputMask;
    use crate::state::DeviceStateStore;

    #[test]
    fn blackout_emits_once() {
        let mut store = DeviceStateStore::new();
        let changes = store.apply(&DecodedResponse::ModeSet { blackout: true });
        assert_eq!(events_for(&changes), vec![DeviceEvent::BlackoutSwitched]);

        let changes = store.apply(&DecodedResponse::ModeSet { blackout: false });
        assert_eq!(events_for(&changes), vec![DeviceEvent::BlackoutSwitched]);
    }

    #[test]
    fn input_change_names_new_source() {
        let mut store = DeviceStateStore::new();
        store.apply(&DecodedResponse::InputSwitched(InputMask::only(Signal::Sdi)));

        let changes = store.apply(&DecodedResponse::InputSwitched(InputMask::only(
            Signal::Hdmi,
        )));
        assert_eq!(
            events_for(&changes),
            vec![DeviceEvent::InputSourceChanged {
                source: Signal::Hdmi
            }]
        );
    }

    #[test]
    fn fixed_order_regardless_of_input() {
        let changes = [
            StateChange::Connection {
                old: ConnectionStatus::Disconnected,
                new: ConnectionStatus::Connected,
            },
            StateChange::Blackout {
                old: true,
                new: false,
            },
            StateChange::Brightness { old: 1, new: 2 },
            StateChange::Input {
                source: Signal::Dvi,
                old: false,
                new: true,
            },
            StateChange::Input {
                source: Signal::Hdmi,
                old: false,
                new: true,
            },
        ];

        assert_eq!(
            events_for(&changes),
            vec![
                DeviceEvent::InputSourceChanged {
                    source: Signal::Hdmi
                },
                DeviceEvent::BrightnessUpdated { value: 2 },
                DeviceEvent::BlackoutSwitched,
                DeviceEvent::ConnectionChanged {
                    status: ConnectionStatus::Connected
                },
            ]
        );
    }

    #[test]
    fn disabled_input_is_silent() {
        let changes = [StateChange::Input {
            source: Signal::Sdi,
            old: true,
            new: false,
        }];
        assert!(events_for(&changes).is_empty());
    }

    #[tokio::test]
    async fn dispatch_broadcasts() {
        let dispatcher = EventDispatcher::new();
        let mut rx = dispatcher.subscribe();

        let sent = dispatcher.dispatch(&[StateChange::Brightness { old: 0, new: 9 }]);
        assert_eq!(sent, vec![DeviceEvent::BrightnessUpdated { value: 9 }]);
        assert_eq!(
            rx.recv().await.unwrap(),
            DeviceEvent::BrightnessUpdated { value: 9 }
        );
    }
}
