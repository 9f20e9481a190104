#![allow(dead_code)]

use std::convert::TryFrom;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ledctl::codec::{self, PROBE, SET_BRIGHTNESS, SET_MODE, SWITCH_INPUT};
use ledctl::{Config, InputMask};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Answer,
    Silent,
    /// reply to everything with a status frame
    WrongKind,
    /// answer with the last byte flipped
    BadChecksum,
    /// send all but the last byte of the answer, then hang up
    Truncated,
}

struct Model {
    brightness: u8,
    blackout: bool,
    inputs: u8,
}

struct Shared {
    behavior: Mutex<Behavior>,
    model: Mutex<Model>,
    requests: Mutex<Vec<Vec<u8>>>,
    accepted: AtomicUsize,
    closed: AtomicUsize,
    pipelined: AtomicBool,
}

/// In-process stand-in for the display controller
#[derive(Clone)]
pub struct FakeDevice {
    addr: SocketAddr,
    reply_delay: Duration,
    shared: Arc<Shared>,
}

impl FakeDevice {
    pub async fn start() -> Self {
        Self::with_delay(Duration::from_millis(0)).await
    }

    pub async fn with_delay(reply_delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let device = FakeDevice {
            addr: listener.local_addr().unwrap(),
            reply_delay,
            shared: Arc::new(Shared {
                behavior: Mutex::new(Behavior::Answer),
                model: Mutex::new(Model {
                    brightness: 100,
                    blackout: false,
                    inputs: 0x01,
                }),
                requests: Mutex::new(Vec::new()),
                accepted: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                pipelined: AtomicBool::new(false),
            }),
        };

        let acceptor = device.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                acceptor.shared.accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(acceptor.clone().serve(stream));
            }
        });

        device
    }

    pub fn config(&self) -> Config {
        let mut config = Config::new("127.0.0.1");
        config.port = self.addr.port();
        config.connect_timeout = Duration::from_millis(200);
        config.response_timeout = Duration::from_millis(200);
        config.poll_interval = Duration::from_millis(400);
        config
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.shared.behavior.lock().unwrap() = behavior;
    }

    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.shared.requests.lock().unwrap().clone()
    }

    pub fn accepted(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Whether a request ever arrived before the previous one was answered.
    pub fn pipelined(&self) -> bool {
        self.shared.pipelined.load(Ordering::SeqCst)
    }

    async fn serve(self, mut stream: TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 64];

        'conn: loop {
            while let Some(len) = request_len(&buf) {
                let frame: Vec<u8> = buf.drain(..len).collect();
                self.shared.requests.lock().unwrap().push(frame.clone());

                let behavior = *self.shared.behavior.lock().unwrap();
                if behavior == Behavior::Silent {
                    continue;
                }

                if self.reply_delay > Duration::from_millis(0) {
                    tokio::time::sleep(self.reply_delay).await;
                }
                if !buf.is_empty() {
                    self.shared.pipelined.store(true, Ordering::SeqCst);
                }
                if let Ok(n) = stream.try_read(&mut chunk) {
                    if n > 0 {
                        self.shared.pipelined.store(true, Ordering::SeqCst);
                        buf.extend_from_slice(&chunk[..n]);
                    }
                }

                let reply = self.reply_to(&frame, behavior);
                if stream.write_all(&reply).await.is_err() || behavior == Behavior::Truncated {
                    break 'conn;
                }
            }

            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }

        self.shared.closed.fetch_add(1, Ordering::SeqCst);
    }

    fn reply_to(&self, frame: &[u8], behavior: Behavior) -> Vec<u8> {
        let mut model = self.shared.model.lock().unwrap();
        let echo = behavior != Behavior::WrongKind && frame[1] != PROBE;

        if echo {
            match frame[1] {
                SWITCH_INPUT => model.inputs = frame[2],
                SET_MODE => model.blackout = frame[2] == 0x01,
                SET_BRIGHTNESS => model.brightness = frame[2],
                _ => {}
            }
        }

        let mut reply = if echo {
            frame.to_vec()
        } else {
            codec::status_frame(
                model.brightness,
                InputMask::try_from(model.inputs).unwrap(),
                model.blackout,
            )
            .into_bytes()
        };

        match behavior {
            Behavior::BadChecksum => {
                let last = reply.len() - 1;
                reply[last] ^= 0xFF;
            }
            Behavior::Truncated => {
                reply.pop();
            }
            _ => {}
        }
        reply
    }
}

fn request_len(buf: &[u8]) -> Option<usize> {
    let code = *buf.get(1)?;
    let len = if code == PROBE { 3 } else { 4 };
    if buf.len() >= len {
        Some(len)
    } else {
        None
    }
}

/// Address nobody listens on.
pub async fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
