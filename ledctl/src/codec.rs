//! Wire frames exchanged with the controller
//!
//! Every frame is `HEADER | code | payload | checksum`, where the checksum is
//! the wrapping 8-bit sum of all preceding bytes. Frame length is fixed per
//! command code, so the stream needs no length field.

use std::convert::TryFrom;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::command::{Command, InputMask};
use crate::error::{Error, Result};

pub const HEADER: u8 = 0xA5;

pub const PROBE: u8 = 0x01;
pub const SWITCH_INPUT: u8 = 0x02;
pub const SET_MODE: u8 = 0x03;
pub const SET_BRIGHTNESS: u8 = 0x04;

const MODE_NORMAL: u8 = 0x00;
const MODE_BLACKOUT: u8 = 0x01;

/// Length of the device's reply to `code`, checksum included.
fn reply_len(code: u8) -> Option<usize> {
    match code {
        PROBE => Some(6),
        SWITCH_INPUT | SET_MODE | SET_BRIGHTNESS => Some(4),
        _ => None,
    }
}

/// One complete frame, checksum included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    fn build(code: u8, payload: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(payload.len() + 3);
        bytes.push(HEADER);
        bytes.push(code);
        bytes.extend_from_slice(payload);
        bytes.push(checksum(&bytes));
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// What the device reported back for one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedResponse {
    Status {
        brightness: u8,
        blackout: bool,
        inputs: InputMask,
    },
    InputSwitched(InputMask),
    ModeSet {
        blackout: bool,
    },
    BrightnessSet(u8),
}

impl DecodedResponse {
    /// Whether this reply answers `command`.
    pub fn answers(&self, command: &Command) -> bool {
        matches!(
            (self, command),
            (DecodedResponse::Status { .. }, Command::Probe)
                | (DecodedResponse::InputSwitched(_), Command::SwitchInput(_))
                | (DecodedResponse::ModeSet { .. }, Command::SetMode { .. })
                | (DecodedResponse::BrightnessSet(_), Command::SetBrightness(_))
        )
    }
}

pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

pub fn encode(command: &Command) -> Frame {
    match command {
        Command::Probe => Frame::build(PROBE, &[]),
        Command::SwitchInput(signal) => Frame::build(SWITCH_INPUT, &[signal.bit()]),
        Command::SetMode { blackout } => Frame::build(SET_MODE, &[mode_byte(*blackout)]),
        Command::SetBrightness(brightness) => {
            Frame::build(SET_BRIGHTNESS, &[brightness.level()])
        }
    }
}

/// Status report the device sends in reply to a probe.
pub fn status_frame(brightness: u8, inputs: InputMask, blackout: bool) -> Frame {
    Frame::build(PROBE, &[brightness, inputs.bits(), mode_byte(blackout)])
}

pub fn decode(bytes: &[u8]) -> Result<DecodedResponse> {
    let (header, code) = match bytes {
        [header, code, ..] => (*header, *code),
        _ => {
            return Err(Error::MalformedFrame(format!(
                "{} byte frame is too short",
                bytes.len()
            )))
        }
    };

    if header != HEADER {
        return Err(Error::MalformedFrame(format!(
            "bad header {:#04x}",
            header
        )));
    }

    let len = reply_len(code)
        .ok_or_else(|| Error::MalformedFrame(format!("unknown command code {:#04x}", code)))?;
    if bytes.len() != len {
        return Err(Error::MalformedFrame(format!(
            "code {:#04x} expects {} bytes, got {}",
            code,
            len,
            bytes.len()
        )));
    }

    let (body, trailer) = bytes.split_at(len - 1);
    let expected = checksum(body);
    if expected != trailer[0] {
        return Err(Error::Checksum {
            expected,
            actual: trailer[0],
        });
    }

    let payload = &body[2..];
    let response = match code {
        PROBE => DecodedResponse::Status {
            brightness: payload[0],
            inputs: InputMask::try_from(payload[1])?,
            blackout: parse_mode(payload[2])?,
        },
        SWITCH_INPUT => DecodedResponse::InputSwitched(InputMask::try_from(payload[0])?),
        SET_MODE => DecodedResponse::ModeSet {
            blackout: parse_mode(payload[0])?,
        },
        _ => DecodedResponse::BrightnessSet(payload[0]),
    };
    Ok(response)
}

fn mode_byte(blackout: bool) -> u8 {
    if blackout {
        MODE_BLACKOUT
    } else {
        MODE_NORMAL
    }
}

fn parse_mode(byte: u8) -> Result<bool> {
    match byte {
        MODE_NORMAL => Ok(false),
        MODE_BLACKOUT => Ok(true),
        other => Err(Error::MalformedFrame(format!(
            "unknown mode byte {:#04x}",
            other
        ))),
    }
}

/// Splits the reply stream into frames and decodes them.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = DecodedResponse;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<DecodedResponse>> {
        if src.len() < 2 {
            return Ok(None);
        }

        // the stream cannot be resynchronized without a length field
        let len = match (src[0], reply_len(src[1])) {
            (HEADER, Some(len)) => len,
            _ => {
                let head = [src[0], src[1]];
                src.clear();
                return Err(Error::MalformedFrame(format!(
                    "unexpected frame start {:02x?}",
                    head
                )));
            }
        };

        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        let frame = src.split_to(len);
        decode(&frame).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<DecodedResponse>> {
        match self.decode(src)? {
            Some(reply) => Ok(Some(reply)),
            None if src.is_empty() => Ok(None),
            None => {
                let partial = src.len();
                src.clear();
                Err(Error::MalformedFrame(format!(
                    "stream ended {} bytes into a frame",
                    partial
                )))
            }
        }
    }
}

impl Encoder<Command> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<()> {
        dst.extend_from_slice(encode(&item).as_bytes());
        Ok(())
    }
}
