//! The host side of the request/response exchange with the Pico.
//!
//! Every [InputPacket] the host writes is answered by exactly one
//! [OutputPacket]. Reads block until the answer arrives or the port's read
//! timeout runs out; there is no retry.

use crate::packet::{
    EvalFlag, InputPacket, LedVector, OutputPacket, PacketError, LED_COUNT, OUTPUT_PACKET_LEN,
};
use crate::Position;

use log::{debug, trace};
use serial2::SerialPort;
use std::{
    fmt,
    io::{self, Read, Write},
    path::Path,
    time::Duration,
};

/// Baud rate the firmware listens at.
pub const DEFAULT_BAUD: u32 = 9600;

/// How long to wait for an answer before giving up. Inference on the Pico
/// is quick, but the first packet after boot can take a while.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(100);

/// Errors produced while talking to the device.
#[derive(Debug)]
pub enum LinkError {
    /// No answer arrived within the read timeout.
    Timeout,
    /// The port failed.
    IoError(io::Error),
    /// The answer could not be decoded.
    Packet(PacketError),
    /// An input vector did not have one value per LED.
    WrongLength(usize),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LinkError::Timeout => write!(f, "timed out waiting for the device"),
            LinkError::IoError(e) => write!(f, "io error: {e}"),
            LinkError::Packet(e) => write!(f, "bad response: {e}"),
            LinkError::WrongLength(n) => {
                write!(f, "expected {LED_COUNT} LED values, got {n}")
            }
        }
    }
}

impl std::error::Error for LinkError {}

impl From<io::Error> for LinkError {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => LinkError::Timeout,
            _ => LinkError::IoError(value),
        }
    }
}

impl From<PacketError> for LinkError {
    fn from(value: PacketError) -> Self {
        Self::Packet(value)
    }
}

/// Scales `leds` to unit Euclidean length. An all-zero vector is left as is.
pub fn normalize(leds: &[f32]) -> Result<LedVector, LinkError> {
    if leds.len() != LED_COUNT {
        return Err(LinkError::WrongLength(leds.len()));
    }
    let mut out = [0.0; LED_COUNT];
    out.copy_from_slice(leds);

    let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        out.iter_mut().for_each(|v| *v /= norm);
    }
    Ok(out)
}

/// Talks to a device over any byte stream, usually a serial port.
#[derive(Debug)]
pub struct PicoLink<P>
where
    P: Read + Write,
{
    port: P,
}

/// Opens a serial port and wraps it in a [PicoLink].
pub fn open_serial(
    path: impl AsRef<Path>,
    baud: u32,
    timeout: Duration,
) -> Result<PicoLink<SerialPort>, LinkError> {
    let mut port = SerialPort::open(path.as_ref(), baud)?;
    port.set_read_timeout(timeout)?;
    debug!(
        "Opened {} at {} baud, read timeout {:?}",
        path.as_ref().display(),
        baud,
        timeout
    );
    Ok(PicoLink::new(port))
}

impl<P> PicoLink<P>
where
    P: Read + Write,
{
    /// Wraps an already opened stream.
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Gives the stream back.
    pub fn into_inner(self) -> P {
        self.port
    }

    fn exchange(&mut self, leds: &[f32], flag: EvalFlag) -> Result<Position, LinkError> {
        let packet = InputPacket::new(flag, normalize(leds)?);
        self.port.write_all(&packet.encode())?;
        self.port.flush()?;

        let mut response = [0u8; OUTPUT_PACKET_LEN];
        self.port.read_exact(&mut response)?;
        let OutputPacket { x, y } = OutputPacket::decode(&response)?;
        trace!("{:?} packet answered with ({}, {})", flag, x, y);

        Ok(Position::new(x, y))
    }

    /// Sends every input, normalized, to the device.
    ///
    /// With [EvalFlag::Evaluate] the predictions come back in input order.
    /// With [EvalFlag::Warmup] the device still answers every packet; the
    /// answers are drained to keep the stream in step and an empty vector is
    /// returned.
    pub fn predict<I>(&mut self, inputs: I, flag: EvalFlag) -> Result<Vec<Position>, LinkError>
    where
        I: IntoIterator,
        I::Item: AsRef<[f32]>,
    {
        let mut out = Vec::new();
        let mut last = None;
        for leds in inputs {
            let p = self.exchange(leds.as_ref(), flag)?;
            match flag {
                EvalFlag::Evaluate => out.push(p),
                EvalFlag::Warmup => last = Some(p),
            }
        }
        if let Some(p) = last {
            debug!("Model warmup response: {}", p);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::INPUT_PACKET_LEN;
    use std::io::Cursor;

    /// A port that records what was written and replays canned answers.
    struct Loopback {
        written: Vec<u8>,
        answers: Cursor<Vec<u8>>,
    }

    impl Loopback {
        fn answering(positions: &[(f32, f32)]) -> Self {
            let answers = positions
                .iter()
                .flat_map(|&(x, y)| OutputPacket { x, y }.encode())
                .collect();
            Self {
                written: Vec::new(),
                answers: Cursor::new(answers),
            }
        }
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.answers.read(buf)?;
            if n == 0 && !buf.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no answer"));
            }
            Ok(n)
        }
    }

    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn normalize_to_unit_length() {
        let mut leds = [0.0; LED_COUNT];
        leds[0] = 3.0;
        leds[1] = 4.0;
        let n = normalize(&leds).unwrap();
        assert!((n[0] - 0.6).abs() < 1e-6);
        assert!((n[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_is_left_alone() {
        assert_eq!(normalize(&[0.0; LED_COUNT]).unwrap(), [0.0; LED_COUNT]);
    }

    #[test]
    fn wrong_length_rejected() {
        assert!(matches!(normalize(&[1.0; 12]), Err(LinkError::WrongLength(12))));
    }

    #[test]
    fn evaluate_returns_answers_in_order() {
        let port = Loopback::answering(&[(1.0, 2.0), (3.0, 4.0)]);
        let mut link = PicoLink::new(port);
        let inputs = vec![vec![1.0; LED_COUNT], vec![2.0; LED_COUNT]];

        let out = link.predict(&inputs, EvalFlag::Evaluate).unwrap();
        assert_eq!(out, vec![Position::new(1.0, 2.0), Position::new(3.0, 4.0)]);

        let port = link.into_inner();
        assert_eq!(port.written.len(), 2 * INPUT_PACKET_LEN);
        assert_eq!(port.written[0], 1);
        // both inputs normalize to the same vector
        assert_eq!(
            port.written[1..INPUT_PACKET_LEN],
            port.written[INPUT_PACKET_LEN + 1..]
        );
        let expected = (1.0f32 / 6.0).to_le_bytes();
        assert_eq!(&port.written[1..5], &expected);
    }

    #[test]
    fn warmup_drains_every_answer() {
        let port = Loopback::answering(&[(0.0, 0.0), (5.0, 5.0), (9.0, 9.0)]);
        let mut link = PicoLink::new(port);
        let inputs = vec![vec![1.0; LED_COUNT]; 2];

        assert!(link.predict(&inputs, EvalFlag::Warmup).unwrap().is_empty());
        // the third answer is still waiting, proving exactly two were read
        let next = link
            .predict([vec![1.0; LED_COUNT]], EvalFlag::Evaluate)
            .unwrap();
        assert_eq!(next, vec![Position::new(9.0, 9.0)]);

        let port = link.into_inner();
        assert_eq!(port.written[0], 0);
        assert_eq!(port.written[INPUT_PACKET_LEN], 0);
        assert_eq!(port.written[2 * INPUT_PACKET_LEN], 1);
    }

    #[test]
    fn silent_device_times_out() {
        let mut link = PicoLink::new(Loopback::answering(&[]));
        let err = link
            .predict([vec![1.0; LED_COUNT]], EvalFlag::Evaluate)
            .unwrap_err();
        assert!(matches!(err, LinkError::Timeout));
    }
}
