//! The fixed-format packets exchanged with the Pico over serial.
//!
//! Host to device, 145 bytes:
//!
//! ```text
//! | flag: u8 | led_0: f32 LE | led_1: f32 LE | ... | led_35: f32 LE |
//! ```
//!
//! Device to host, 8 bytes:
//!
//! ```text
//! | x: f32 LE | y: f32 LE |
//! ```
//!
//! There is no framing, checksum, or length prefix. Both sides rely on the
//! lengths being fixed.

use nom::{
    combinator::map,
    error::{Error, ErrorKind},
    multi::count,
    number::complete::{le_f32, u8},
    sequence::tuple,
    Err as NomErr, IResult,
};

use std::fmt;

/// Number of LED intensities in one sensor vector.
pub const LED_COUNT: usize = 36;

/// One intensity reading per LED.
pub type LedVector = [f32; LED_COUNT];

/// Size of an [InputPacket] on the wire.
pub const INPUT_PACKET_LEN: usize = 1 + LED_COUNT * 4;

/// Size of an [OutputPacket] on the wire.
pub const OUTPUT_PACKET_LEN: usize = 8;

/// Tells the device whether the host is going to read the prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalFlag {
    /// The sample only lets the device adapt; the host ignores the answer.
    Warmup,
    /// The host reads back and scores the prediction.
    Evaluate,
}

impl EvalFlag {
    /// The byte that leads the packet.
    pub fn as_byte(self) -> u8 {
        match self {
            EvalFlag::Warmup => 0,
            EvalFlag::Evaluate => 1,
        }
    }

    /// The firmware only checks for `1`; anything else is a warmup.
    pub fn from_byte(b: u8) -> Self {
        if b == 1 {
            EvalFlag::Evaluate
        } else {
            EvalFlag::Warmup
        }
    }
}

/// Errors produced while decoding packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Fewer bytes were available than the packet needs.
    Truncated {
        /// Bytes the packet needs
        expected: usize,
        /// Bytes that were there
        found: usize,
    },
    /// The parser failed for some other reason.
    Malformed(ErrorKind),
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PacketError::Truncated { expected, found } => {
                write!(f, "truncated packet: expected {expected} bytes, found {found}")
            }
            PacketError::Malformed(kind) => write!(f, "malformed packet: {kind:?}"),
        }
    }
}

impl std::error::Error for PacketError {}

/// A sensor vector sent from the host to the device.
#[derive(Debug, Clone, PartialEq)]
pub struct InputPacket {
    /// Whether a scored answer is expected
    pub flag: EvalFlag,
    /// LED intensities, in LED index order
    pub leds: LedVector,
}

/// A position estimate sent from the device back to the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputPacket {
    /// Estimated x, in millimetres
    pub x: f32,
    /// Estimated y, in millimetres
    pub y: f32,
}

fn parse_input_packet(b: &[u8]) -> IResult<&[u8], InputPacket> {
    map(
        tuple((u8, count(le_f32, LED_COUNT))),
        |(flag, leds): (u8, Vec<f32>)| {
            let mut arr = [0.0; LED_COUNT];
            arr.copy_from_slice(&leds);
            InputPacket {
                flag: EvalFlag::from_byte(flag),
                leds: arr,
            }
        },
    )(b)
}

fn parse_output_packet(b: &[u8]) -> IResult<&[u8], OutputPacket> {
    map(tuple((le_f32, le_f32)), |(x, y)| OutputPacket { x, y })(b)
}

fn check_len(b: &[u8], expected: usize) -> Result<(), PacketError> {
    if b.len() < expected {
        Err(PacketError::Truncated {
            expected,
            found: b.len(),
        })
    } else {
        Ok(())
    }
}

fn to_packet_error(e: NomErr<Error<&[u8]>>) -> PacketError {
    match e {
        NomErr::Error(Error { code, .. }) | NomErr::Failure(Error { code, .. }) => {
            PacketError::Malformed(code)
        }
        NomErr::Incomplete(_) => PacketError::Malformed(ErrorKind::Eof),
    }
}

impl InputPacket {
    /// Builds a packet from a flag and a vector.
    pub fn new(flag: EvalFlag, leds: LedVector) -> Self {
        Self { flag, leds }
    }

    /// Serializes the packet into its 145 byte wire form.
    pub fn encode(&self) -> [u8; INPUT_PACKET_LEN] {
        let mut buf = [0u8; INPUT_PACKET_LEN];
        buf[0] = self.flag.as_byte();
        for (chunk, v) in buf[1..].chunks_exact_mut(4).zip(self.leds.iter()) {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
        buf
    }

    /// Parses one packet off the front of `b`, handing back whatever
    /// follows it.
    pub fn decode(b: &[u8]) -> Result<(&[u8], Self), PacketError> {
        check_len(b, INPUT_PACKET_LEN)?;
        parse_input_packet(b).map_err(to_packet_error)
    }
}

impl OutputPacket {
    /// Serializes the packet into its 8 byte wire form.
    pub fn encode(&self) -> [u8; OUTPUT_PACKET_LEN] {
        let mut buf = [0u8; OUTPUT_PACKET_LEN];
        buf[..4].copy_from_slice(&self.x.to_le_bytes());
        buf[4..].copy_from_slice(&self.y.to_le_bytes());
        buf
    }

    /// Parses a response. Extra trailing bytes are ignored.
    pub fn decode(b: &[u8]) -> Result<Self, PacketError> {
        check_len(b, OUTPUT_PACKET_LEN)?;
        parse_output_packet(b)
            .map(|(_rest, packet)| packet)
            .map_err(to_packet_error)
    }
}
