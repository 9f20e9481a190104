//! Client for network attached LED display controllers.
//!
//! [`ConnectionManager`] owns the TCP session and serializes every command on
//! it, [`Poller`] keeps checking that the device is alive and reconnects when
//! it is not, and every reply is folded into a [`DeviceState`] whose changes
//! come out as [`DeviceEvent`]s.

pub mod codec;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod poller;
pub mod state;

pub use codec::{DecodedResponse, Frame};
pub use command::{Brightness, Command, DisplayMode, InputMask, Signal};
pub use config::{Config, DEFAULT_PORT};
pub use connection::{ConnectionManager, Session};
pub use error::{Error, Result};
pub use events::{DeviceEvent, EventDispatcher};
pub use poller::{Poller, PollerControl, PollerHandle, PollerState};
pub use state::{
    ConnectionStatus, DeviceState, DeviceStateStore, InputStatus, StateChange, StateReader,
};
