use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use futures::{SinkExt, TryStreamExt};
use ledctl::{Config, ConnectionManager, DeviceEvent, Poller, PollerControl};
use ledctld::logging::{init_logging, LoggingMode};
use ledctld::*;
use tokio::sync::broadcast::{self, error::RecvError};

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error(transparent)]
    Ledctl(#[from] ledctl::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Logging(#[from] logging::LoggingError),

    #[error("{0} exists and is not a socket")]
    SocketPathTaken(PathBuf),
}

/// Keeps a session to an LED display controller and serves control requests
#[derive(Debug, Parser)]
struct Args {
    /// Controller address
    #[clap(long)]
    host: String,
    #[clap(long, default_value_t = ledctl::DEFAULT_PORT)]
    port: u16,
    #[clap(long, default_value_t = 3000)]
    connect_timeout_ms: u64,
    #[clap(long, default_value_t = 2000)]
    response_timeout_ms: u64,
    #[clap(long, default_value_t = 5000)]
    poll_interval_ms: u64,
    /// Control socket, unless one is passed in by the service manager
    #[clap(long, default_value = DEFAULT_SOCKET)]
    socket: PathBuf,
    #[clap(short, long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> Config {
        let mut config = Config::new(self.host.clone());
        config.port = self.port;
        config.connect_timeout = Duration::from_millis(self.connect_timeout_ms);
        config.response_timeout = Duration::from_millis(self.response_timeout_ms);
        config.poll_interval = Duration::from_millis(self.poll_interval_ms);
        config
    }
}

async fn handle_client(
    manager: &ConnectionManager,
    poller: &PollerControl,
    stream: tokio::net::UnixStream,
) -> Result<(), Error> {
    let mut payloads = server_transport(stream);

    while let Some(payload) = payloads.try_next().await? {
        tracing::debug!(action = ?payload.action, "control request");
        let reply = execute(manager, poller, &payload.action).await;
        if let Reply::Error(message) = &reply {
            tracing::warn!(action = ?payload.action, %message, "action failed");
        }
        payloads.send(reply).await?;
    }

    Ok(())
}

async fn log_events(mut events: broadcast::Receiver<DeviceEvent>) {
    loop {
        match events.recv().await {
            Ok(DeviceEvent::InputSourceChanged { source }) => {
                tracing::info!(%source, "input source changed")
            }
            Ok(DeviceEvent::BrightnessUpdated { value }) => {
                tracing::info!(value, "brightness updated")
            }
            Ok(DeviceEvent::BlackoutSwitched) => tracing::info!("blackout switched"),
            Ok(DeviceEvent::ConnectionChanged { status }) => {
                tracing::info!(?status, "connection status changed")
            }
            Err(RecvError::Lagged(missed)) => tracing::warn!(missed, "event log lagging"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn control_listener(path: &Path) -> Result<tokio::net::UnixListener, Error> {
    let mut listenfd = listenfd::ListenFd::from_env();
    if let Some(listener) = listenfd.take_unix_listener(0)? {
        listener.set_nonblocking(true)?;
        return Ok(tokio::net::UnixListener::from_std(listener)?);
    }

    // left over from a previous run
    if let Ok(meta) = std::fs::symlink_metadata(path) {
        if !meta.file_type().is_socket() {
            return Err(Error::SocketPathTaken(path.to_path_buf()));
        }
        std::fs::remove_file(path)?;
    }
    Ok(tokio::net::UnixListener::bind(path)?)
}

async fn run(args: Args) -> Result<(), Error> {
    init_logging(if args.verbose {
        LoggingMode::Verbose
    } else {
        LoggingMode::Normal
    })?;

    let config = args.config();
    let manager = ConnectionManager::spawn(config.clone())?;
    tokio::spawn(log_events(manager.subscribe_events()));
    let poller = Poller::spawn(manager.clone());

    let listener = control_listener(&args.socket)?;
    tracing::info!(device = %config.addr(), "ledctld started");

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    let manager = manager.clone();
                    let control = poller.control();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(&manager, &control, stream).await {
                            tracing::warn!(error = %e, "control client failed");
                        }
                    });
                }
                Err(e) => tracing::warn!(error = %e, "listener error"),
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tracing::info!("shutting down");
    poller.shutdown().await;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("ledctld: {}", e);
        std::process::exit(1);
    }
}
