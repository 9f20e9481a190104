//! Socket lifecycle and the single send path to the controller
//!
//! A [`ConnectionManager`] is a cheap handle onto one background task. That
//! task owns the [`Session`], the state store and the event dispatcher, and
//! serves requests strictly one at a time in arrival order, so a reply can
//! always be attributed to the request that is in flight.

use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::codec::{DecodedResponse, FrameCodec};
use crate::command::Command;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{DeviceEvent, EventDispatcher};
use crate::state::{ConnectionStatus, DeviceState, DeviceStateStore, StateReader};

const QUEUE_DEPTH: usize = 32;

/// A live TCP connection to the controller
pub struct Session {
    host: String,
    port: u16,
    framed: Framed<TcpStream, FrameCodec>,
    response_timeout: Duration,
    last_exchange: Instant,
}

impl Session {
    /// Connect and probe. Only a valid status reply within
    /// `connect_timeout` yields a session; the reply is returned with it.
    pub async fn open(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        response_timeout: Duration,
    ) -> Result<(Self, DecodedResponse)> {
        let handshake = async {
            let stream = TcpStream::connect((host, port)).await?;
            stream.set_nodelay(true)?;

            let mut session = Session {
                host: host.to_string(),
                port,
                framed: Framed::new(stream, FrameCodec),
                response_timeout,
                last_exchange: Instant::now(),
            };
            let status = session
                .exchange_within(&Command::Probe, connect_timeout)
                .await?;
            Ok::<_, Error>((session, status))
        };

        let reason = match tokio::time::timeout(connect_timeout, handshake).await {
            Ok(Ok(opened)) => return Ok(opened),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("no probe reply within {:?}", connect_timeout),
        };
        Err(Error::Connect {
            addr: format!("{}:{}", host, port),
            reason,
        })
    }

    /// Send one command and wait for its reply.
    pub async fn exchange(&mut self, command: &Command) -> Result<DecodedResponse> {
        self.exchange_within(command, self.response_timeout).await
    }

    async fn exchange_within(
        &mut self,
        command: &Command,
        limit: Duration,
    ) -> Result<DecodedResponse> {
        tracing::trace!(?command, "sending");

        let framed = &mut self.framed;
        let round_trip = async {
            framed.send(*command).await?;
            match framed.next().await {
                Some(reply) => reply,
                None => Err(Error::ConnectionClosed),
            }
        };

        let reply = tokio::time::timeout(limit, round_trip)
            .await
            .map_err(|_| Error::Timeout(limit))??;
        if !reply.answers(command) {
            return Err(Error::UnexpectedResponse);
        }

        tracing::trace!(?reply, "received");
        self.last_exchange = Instant::now();
        Ok(reply)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn last_exchange(&self) -> Instant {
        self.last_exchange
    }
}

enum Request {
    Connect {
        resp: oneshot::Sender<Result<DeviceState>>,
    },
    Send {
        command: Command,
        resp: oneshot::Sender<Result<DecodedResponse>>,
    },
    Disconnect {
        resp: oneshot::Sender<()>,
    },
    Retarget {
        host: String,
        port: u16,
        resp: oneshot::Sender<Result<()>>,
    },
}

/// Handle onto the task that owns the device session
#[derive(Clone)]
pub struct ConnectionManager {
    tx: mpsc::Sender<Request>,
    state: StateReader,
    events: EventDispatcher,
    cancel: CancellationToken,
    poll_interval: Duration,
}

impl ConnectionManager {
    /// Start the session task. Must be called within a tokio runtime. No
    /// connection is made until [`connect`](Self::connect) is called.
    pub fn spawn(config: Config) -> Result<Self> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let store = DeviceStateStore::new();
        let events = EventDispatcher::new();
        let cancel = CancellationToken::new();

        let manager = Self {
            tx,
            state: store.reader(),
            events: events.clone(),
            cancel: cancel.clone(),
            poll_interval: config.poll_interval,
        };

        let actor = Actor {
            config,
            session: None,
            store,
            events,
            rx,
        };
        tokio::spawn(actor.run(cancel));

        Ok(manager)
    }

    /// Open a fresh session, replacing any existing one.
    pub async fn connect(&self) -> Result<DeviceState> {
        self.request(|resp| Request::Connect { resp }).await?
    }

    /// Queue a command behind any others and wait for the device's reply.
    pub async fn send(&self, command: Command) -> Result<DecodedResponse> {
        self.request(|resp| Request::Send { command, resp }).await?
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.request(|resp| Request::Disconnect { resp }).await
    }

    /// Point the manager at another controller. The current session is
    /// closed; the next [`connect`](Self::connect) goes to the new address.
    pub async fn retarget(&self, host: impl Into<String>, port: u16) -> Result<()> {
        let host = host.into();
        self.request(|resp| Request::Retarget { host, port, resp }).await?
    }

    /// Liveness period this manager was configured with.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn state(&self) -> DeviceState {
        self.state.snapshot()
    }

    pub fn state_reader(&self) -> StateReader {
        self.state.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Abort whatever is in flight, fail every queued request with
    /// [`Error::Cancelled`] and close the socket. Returns once the session
    /// task has released the socket.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tx.closed().await;
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let (resp, rx) = oneshot::channel();
        self.tx
            .send(build(resp))
            .await
            .map_err(|_| Error::Cancelled)?;
        // a dropped responder means the task was cancelled mid-request
        rx.await.map_err(|_| Error::Cancelled)
    }
}

struct Actor {
    config: Config,
    session: Option<Session>,
    store: DeviceStateStore,
    events: EventDispatcher,
    rx: mpsc::Receiver<Request>,
}

impl Actor {
    async fn run(mut self, cancel: CancellationToken) {
        loop {
            let request = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                request = self.rx.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.handle(request) => {}
            }
        }

        self.disconnect("shutdown");
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
        tracing::debug!("session task stopped");
    }

    async fn handle(&mut self, request: Request) {
        match request {
            Request::Connect { resp } => {
                let result = self.connect().await;
                let _ = resp.send(result);
            }
            Request::Send { command, resp } => {
                let result = self.send(command).await;
                let _ = resp.send(result);
            }
            Request::Disconnect { resp } => {
                self.disconnect("requested");
                let _ = resp.send(());
            }
            Request::Retarget { host, port, resp } => {
                let _ = resp.send(self.retarget(host, port));
            }
        }
    }

    async fn connect(&mut self) -> Result<DeviceState> {
        // a new session never reuses the old socket
        self.session = None;

        let config = &self.config;
        let opened = Session::open(
            &config.host,
            config.port,
            config.connect_timeout,
            config.response_timeout,
        )
        .await;

        match opened {
            Ok((session, status)) => {
                tracing::info!(host = session.host(), port = session.port(), "connected");
                self.session = Some(session);

                let mut changes = self.store.apply(&status);
                changes.extend(self.store.set_connection(ConnectionStatus::Connected));
                self.events.dispatch(&changes);
                Ok(self.store.snapshot())
            }
            Err(e) => {
                tracing::warn!(error = %e, "connect failed");
                self.disconnect("connect failed");
                Err(e)
            }
        }
    }

    async fn send(&mut self, command: Command) -> Result<DecodedResponse> {
        let session = self.session.as_mut().ok_or(Error::NotConnected)?;

        match session.exchange(&command).await {
            Ok(reply) => {
                let changes = self.store.apply(&reply);
                self.events.dispatch(&changes);
                Ok(reply)
            }
            Err(e) => {
                tracing::warn!(error = %e, ?command, "exchange failed");
                self.disconnect("exchange failed");
                Err(e)
            }
        }
    }

    fn retarget(&mut self, host: String, port: u16) -> Result<()> {
        let mut config = self.config.clone();
        config.host = host;
        config.port = port;
        config.validate()?;

        tracing::info!(from = %self.config.addr(), to = %config.addr(), "retargeting");
        self.config = config;
        self.disconnect("retargeted");
        Ok(())
    }

    fn disconnect(&mut self, reason: &str) {
        if let Some(session) = self.session.take() {
            tracing::info!(
                host = session.host(),
                reason,
                idle = ?session.last_exchange().elapsed(),
                "closing session"
            );
        }

        if let Some(change) = self.store.set_connection(ConnectionStatus::Disconnected) {
            self.events.dispatch(&[change]);
        }
    }
}
