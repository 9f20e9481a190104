use std::fmt;

use ledctl::{
    Command, ConnectionManager, ConnectionStatus, DeviceState, DisplayMode, PollerControl,
    PollerState, Signal,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serde::formats::Bincode;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

pub mod logging;

pub const DEFAULT_SOCKET: &str = "/run/ledctld/socket";

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize, clap::Subcommand)]
pub enum Action {
    /// Open a fresh session to the controller
    Connect,
    /// Select the active input (sdi, hdmi, dvi)
    SwitchInput { signal: Signal },
    /// Black out the wall or return to normal output (blackout, normal)
    SetBlackoutMode { mode: DisplayMode },
    /// Set brightness in percent (0-100)
    SetBrightness { percentage: f64 },
    /// Print the last known device state
    Status,
    /// Talk to a controller at another address from now on
    Retarget { host: String, port: u16 },
    /// Stop polling and close the session
    Disable,
    /// Resume polling; the next tick reconnects
    Enable,
}

#[derive(Debug, serde::Deserialize, serde::Serialize)]
pub struct SocketPayload {
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Reply {
    Done,
    Status(StatusReport),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum InputState {
    Enabled,
    Disabled,
}

/// Read-only status surface handed to control clients
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct StatusReport {
    pub brightness: u8,
    pub blackout: bool,
    pub normal: bool,
    pub inputs: Vec<(Signal, InputState)>,
    pub connection: ConnectionStatus,
    pub poller: PollerState,
}

impl StatusReport {
    pub fn new(state: &DeviceState, poller: PollerState) -> Self {
        let inputs = Signal::ALL
            .iter()
            .map(|signal| {
                let input = if state.inputs.get(*signal) {
                    InputState::Enabled
                } else {
                    InputState::Disabled
                };
                (*signal, input)
            })
            .collect();

        Self {
            brightness: state.brightness,
            blackout: state.blackout,
            normal: state.normal_active(),
            inputs,
            connection: state.connection,
            poller,
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "connection: {:?}", self.connection)?;
        writeln!(f, "polling:    {:?}", self.poller)?;
        writeln!(f, "brightness: {}", self.brightness)?;
        writeln!(f, "blackout:   {}", self.blackout)?;
        writeln!(f, "normal:     {}", self.normal)?;
        for (signal, input) in &self.inputs {
            writeln!(f, "{:<11} {:?}", format!("{}:", signal), input)?;
        }
        Ok(())
    }
}

fn done<T>(result: ledctl::Result<T>) -> Reply {
    match result {
        Ok(_) => Reply::Done,
        Err(e) => Reply::Error(e.to_string()),
    }
}

/// Run one control action against the device.
///
/// Parameter errors are answered before anything is queued on the session.
pub async fn execute(
    manager: &ConnectionManager,
    poller: &PollerControl,
    action: &Action,
) -> Reply {
    let command = match action {
        Action::Status => {
            return Reply::Status(StatusReport::new(&manager.state(), poller.state()))
        }
        Action::Connect => return done(manager.connect().await),
        Action::Retarget { host, port } => {
            return done(manager.retarget(host.clone(), *port).await)
        }
        Action::Disable => {
            poller.pause().await;
            return done(manager.disconnect().await);
        }
        Action::Enable => {
            poller.resume();
            return Reply::Done;
        }
        Action::SwitchInput { signal } => Command::SwitchInput(*signal),
        Action::SetBlackoutMode { mode } => Command::set_mode(*mode),
        Action::SetBrightness { percentage } => match Command::brightness_percent(*percentage) {
            Ok(command) => command,
            Err(e) => return Reply::Error(e.to_string()),
        },
    };

    done(manager.send(command).await)
}

pub type ServerTransport<T> = tokio_serde::Framed<
    Framed<T, LengthDelimitedCodec>,
    SocketPayload,
    Reply,
    Bincode<SocketPayload, Reply>,
>;

pub type ClientTransport<T> = tokio_serde::Framed<
    Framed<T, LengthDelimitedCodec>,
    Reply,
    SocketPayload,
    Bincode<Reply, SocketPayload>,
>;

pub fn server_transport<T: AsyncRead + AsyncWrite>(stream: T) -> ServerTransport<T> {
    tokio_serde::Framed::new(
        Framed::new(stream, LengthDelimitedCodec::new()),
        Bincode::default(),
    )
}

pub fn client_transport<T: AsyncRead + AsyncWrite>(stream: T) -> ClientTransport<T> {
    tokio_serde::Framed::new(
        Framed::new(stream, LengthDelimitedCodec::new()),
        Bincode::default(),
    )
}
