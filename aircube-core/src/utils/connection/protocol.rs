//! Line-delimited JSON command protocol.
//!
//! Inbound bytes are cut into frames by [`FrameAssembler`]; each frame is one
//! `{"cmd":...,"value":...}` object. Every handled frame produces exactly one
//! reply line.

use alloc::string::String;
use heapless::Vec;
use serde::{Deserialize, Serialize};

use super::telemetry::round2;
use crate::utils::controllers::DeviceContext;

/// Reassembly buffer size in bytes.
pub const FRAME_CAPACITY: usize = 256;

const LED_BUSY: &str = "led state busy";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    Malformed,
    UnknownCommand,
    MissingValue,
    /// A frame outgrew the reassembly buffer.
    Overflow,
}

impl ProtocolError {
    pub fn reason(self) -> &'static str {
        match self {
            Self::Malformed => "malformed json",
            Self::UnknownCommand => "unknown command",
            Self::MissingValue => "missing value field",
            Self::Overflow => "frame too long",
        }
    }
}

impl core::fmt::Display for ProtocolError {
    fn fmt(
        &self,
        f: &mut core::fmt::Formatter<'_>,
    ) -> core::fmt::Result {
        f.write_str(self.reason())
    }
}

/// Result of pushing one byte into the assembler.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameEvent<const N: usize> {
    /// Need more bytes.
    Pending,
    /// A complete, non-blank frame (terminator excluded).
    Frame(Vec<u8, N>),
    /// The buffer filled before a terminator; its contents were dropped.
    Overflow,
}

/// Splits a byte stream into frames.
///
/// A frame ends at `\n` or at the `}` that closes the outermost brace.
/// Braces inside JSON strings are not counted.
#[derive(Debug, Default)]
pub struct FrameAssembler<const N: usize> {
    buf: Vec<u8, N>,
    depth: u32,
    in_string: bool,
    escaped: bool,
}

impl<const N: usize> FrameAssembler<N> {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            depth: 0,
            in_string: false,
            escaped: false,
        }
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;
    }

    pub fn push(
        &mut self,
        byte: u8,
    ) -> FrameEvent<N> {
        match byte {
            b'\n' => return self.take(),
            b'\r' if self.buf.is_empty() => return FrameEvent::Pending,
            _ => {}
        }

        if self.buf.push(byte).is_err() {
            self.reset();
            return FrameEvent::Overflow;
        }

        if self.in_string {
            match byte {
                _ if self.escaped => self.escaped = false,
                b'\\' => self.escaped = true,
                b'"' => self.in_string = false,
                _ => {}
            }
            return FrameEvent::Pending;
        }

        match byte {
            b'"' => self.in_string = true,
            b'{' => self.depth += 1,
            b'}' if self.depth > 0 => {
                self.depth -= 1;
                if self.depth == 0 {
                    return self.take();
                }
            }
            _ => {}
        }
        FrameEvent::Pending
    }

    fn take(&mut self) -> FrameEvent<N> {
        let frame = core::mem::take(&mut self.buf);
        self.reset();
        if frame.iter().all(u8::is_ascii_whitespace) {
            FrameEvent::Pending
        } else {
            FrameEvent::Frame(frame)
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    cmd: heapless::String<32>,
    value: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SetIntensity(f64),
    SetReadoutPeriod(f64),
    GetConfig,
}

impl Command {
    pub fn parse(frame: &[u8]) -> Result<Self, ProtocolError> {
        let env: Envelope = serde_json::from_slice(frame).map_err(|_| ProtocolError::Malformed)?;
        let value = || env.value.ok_or(ProtocolError::MissingValue);
        match env.cmd.as_str() {
            "get_config" => Ok(Self::GetConfig),
            "set_intensity" => Ok(Self::SetIntensity(value()?)),
            "set_readout_period" => Ok(Self::SetReadoutPeriod(value()?)),
            _ => Err(ProtocolError::UnknownCommand),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfigReport {
    pub intensity: f32,
    pub readout_period: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Ack {
        status: &'static str,
        cmd: &'static str,
        value: f32,
    },
    Config {
        config: ConfigReport,
    },
    Error {
        status: &'static str,
        msg: &'static str,
    },
}

impl Reply {
    pub fn ack(
        cmd: &'static str,
        value: f32,
    ) -> Self {
        Self::Ack {
            status: "ok",
            cmd,
            value: round2(value),
        }
    }

    pub fn config(
        intensity: f32,
        readout_period: u32,
    ) -> Self {
        Self::Config {
            config: ConfigReport {
                intensity: round2(intensity),
                readout_period,
            },
        }
    }

    pub fn error(msg: &'static str) -> Self {
        Self::Error {
            status: "error",
            msg,
        }
    }

    /// One newline-terminated JSON line.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

impl From<ProtocolError> for Reply {
    fn from(e: ProtocolError) -> Self {
        Reply::error(e.reason())
    }
}

/// Execute one command against the shared state.
pub async fn execute(
    ctx: &DeviceContext,
    cmd: Command,
) -> Reply {
    match cmd {
        Command::SetIntensity(v) => match ctx.leds.set_intensity(v as f32).await {
            Ok(applied) => {
                tracing::info!("LED intensity set to {:.2}", applied);
                Reply::ack("set_intensity", applied)
            }
            Err(_) => Reply::error(LED_BUSY),
        },
        Command::SetReadoutPeriod(v) => {
            let period = ctx.set_readout_period(v);
            tracing::info!("Sensor readout period set to {} ms", period);
            Reply::ack("set_readout_period", period as f32)
        }
        Command::GetConfig => match ctx.leds.intensity().await {
            Ok(intensity) => Reply::config(intensity, ctx.readout_period_ms()),
            Err(_) => Reply::error(LED_BUSY),
        },
    }
}

/// Parse and execute one frame.
pub async fn handle_frame(
    ctx: &DeviceContext,
    frame: &[u8],
) -> Reply {
    match Command::parse(frame) {
        Ok(cmd) => execute(ctx, cmd).await,
        Err(e) => {
            tracing::warn!("Rejected command: {}", e);
            e.into()
        }
    }
}
