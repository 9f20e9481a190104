use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("can't connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("reply does not match the command in flight")]
    UnexpectedResponse,
    #[error("device closed the connection")]
    ConnectionClosed,
    #[error("no active session")]
    NotConnected,
    #[error("operation cancelled")]
    Cancelled,
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors that mean the link to the device can no longer be trusted.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Error::Connect { .. }
                | Error::Timeout(_)
                | Error::Checksum { .. }
                | Error::MalformedFrame(_)
                | Error::UnexpectedResponse
                | Error::ConnectionClosed
                | Error::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
