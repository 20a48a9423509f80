//! A stand-in for the Pico that lives in the host process.
//!
//! It speaks the same byte protocol as the firmware: every complete
//! 145 byte packet written to it is answered with one 8 byte position. The
//! network is replaced by a nearest-fingerprint lookup over a reference
//! grid, which is good enough to exercise the harness end to end without
//! hardware.

use crate::grid::{IntensityGrid, MM_PER_CELL};
use crate::link::normalize;
use crate::packet::{EvalFlag, InputPacket, LedVector, OutputPacket, INPUT_PACKET_LEN, LED_COUNT};
use crate::Position;

use log::{debug, trace, warn};
use std::{
    collections::VecDeque,
    fmt,
    io::{self, Read, Write},
};

/// Errors produced while building a [SimulatedPico].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedDeviceError {
    /// The reference grid does not have one value per LED.
    LedCountMismatch(usize),
    /// No reference cell survived the stride.
    NoFingerprints,
}

impl fmt::Display for SimulatedDeviceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SimulatedDeviceError::LedCountMismatch(n) => {
                write!(f, "reference grid has {n} LEDs, expected {LED_COUNT}")
            }
            SimulatedDeviceError::NoFingerprints => write!(f, "reference grid has no valid cells"),
        }
    }
}

impl std::error::Error for SimulatedDeviceError {}

/// Configures a [SimulatedPico] before it is built.
#[derive(Debug, Clone)]
pub struct SimulatedPicoBuilder {
    stride: usize,
}

impl Default for SimulatedPicoBuilder {
    fn default() -> Self {
        Self { stride: 1 }
    }
}

impl SimulatedPicoBuilder {
    /// Only keep every `stride`-th row and column of the reference grid,
    /// the way the firmware keeps a downsampled copy. Zero is treated as 1.
    pub fn stride(self, stride: usize) -> Self {
        Self {
            stride: stride.max(1),
        }
    }

    /// Builds the device with `grid` as its reference map.
    pub fn build(self, grid: &IntensityGrid) -> Result<SimulatedPico, SimulatedDeviceError> {
        if grid.leds() != LED_COUNT {
            return Err(SimulatedDeviceError::LedCountMismatch(grid.leds()));
        }

        let fingerprints: Vec<(Position, LedVector)> = grid
            .valid_indices()
            .into_iter()
            .filter(|&flat| {
                let cell = grid.location(flat);
                cell.x as usize % self.stride == 0 && cell.y as usize % self.stride == 0
            })
            .filter_map(|flat| {
                normalize(grid.cell(flat))
                    .ok()
                    .map(|v| (grid.location(flat).scaled(MM_PER_CELL), v))
            })
            .collect();

        if fingerprints.is_empty() {
            return Err(SimulatedDeviceError::NoFingerprints);
        }
        debug!(
            "Simulated device holds {} fingerprints (stride {})",
            fingerprints.len(),
            self.stride
        );

        Ok(SimulatedPico {
            fingerprints,
            inbox: Vec::new(),
            outbox: VecDeque::new(),
            warmups: 0,
            evaluations: 0,
        })
    }
}

/// An in-process device answering packets from a fingerprint map.
#[derive(Debug)]
pub struct SimulatedPico {
    fingerprints: Vec<(Position, LedVector)>,
    inbox: Vec<u8>,
    outbox: VecDeque<u8>,
    warmups: usize,
    evaluations: usize,
}

impl SimulatedPico {
    /// Make a [SimulatedPicoBuilder].
    pub fn builder() -> SimulatedPicoBuilder {
        SimulatedPicoBuilder::default()
    }

    /// Number of warmup packets received so far.
    pub fn warmups(&self) -> usize {
        self.warmups
    }

    /// Number of evaluation packets received so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// The reference location whose fingerprint points the same way as
    /// `leds`, in millimetres.
    pub fn estimate(&self, leds: &LedVector) -> Position {
        let mut input = *leds;
        let norm = input.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            input.iter_mut().for_each(|v| *v /= norm);
        }

        let mut best = (f32::NEG_INFINITY, Position::default());
        for (location, fingerprint) in &self.fingerprints {
            let similarity: f32 = fingerprint.iter().zip(&input).map(|(a, b)| a * b).sum();
            if similarity > best.0 {
                best = (similarity, *location);
            }
        }
        best.1
    }

    fn handle(&mut self, packet: InputPacket) {
        match packet.flag {
            EvalFlag::Warmup => self.warmups += 1,
            EvalFlag::Evaluate => self.evaluations += 1,
        }
        let Position { x, y } = self.estimate(&packet.leds);
        trace!("Simulated device answering {:?} with ({}, {})", packet.flag, x, y);
        self.outbox.extend(OutputPacket { x, y }.encode());
    }
}

impl Write for SimulatedPico {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inbox.extend_from_slice(buf);

        let mut consumed = 0;
        while self.inbox.len() - consumed >= INPUT_PACKET_LEN {
            match InputPacket::decode(&self.inbox[consumed..]) {
                Ok((_rest, packet)) => self.handle(packet),
                Err(e) => warn!("Simulated device dropped a packet: {}", e),
            }
            consumed += INPUT_PACKET_LEN;
        }
        self.inbox.drain(..consumed);

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for SimulatedPico {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.outbox.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "simulated device has nothing to say",
            ));
        }
        let n = buf.len().min(self.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lambertian::synthesize_grid;
    use crate::link::PicoLink;

    #[test]
    fn exact_fingerprint_is_found() {
        let grid = synthesize_grid(30, 20);
        let device = SimulatedPico::builder().build(&grid).unwrap();

        // cell (17, 9)
        let flat = 9 * 30 + 17;
        let mut leds = [0.0; LED_COUNT];
        leds.copy_from_slice(grid.cell(flat));
        // brightness scaling does not change the answer
        leds.iter_mut().for_each(|v| *v *= 0.3);

        assert_eq!(device.estimate(&leds), Position::new(170.0, 90.0));
    }

    #[test]
    fn stride_limits_answers_to_kept_cells() {
        let grid = synthesize_grid(30, 20);
        let device = SimulatedPico::builder().stride(5).build(&grid).unwrap();

        let mut leds = [0.0; LED_COUNT];
        leds.copy_from_slice(grid.cell(9 * 30 + 17));
        let p = device.estimate(&leds);
        assert_eq!(p.x % 50.0, 0.0);
        assert_eq!(p.y % 50.0, 0.0);
    }

    #[test]
    fn rejects_wrong_led_count() {
        let grid = IntensityGrid::new(1, 1, 3, vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(
            SimulatedPico::builder().build(&grid).unwrap_err(),
            SimulatedDeviceError::LedCountMismatch(3)
        );
    }

    #[test]
    fn answers_every_packet_even_when_split() {
        let grid = synthesize_grid(10, 10);
        let mut device = SimulatedPico::builder().build(&grid).unwrap();

        let mut leds = [0.0; LED_COUNT];
        leds.copy_from_slice(grid.cell(0));
        let mut bytes = InputPacket::new(EvalFlag::Warmup, leds).encode().to_vec();
        bytes.extend_from_slice(&InputPacket::new(EvalFlag::Evaluate, leds).encode());

        // dribble the bytes in awkward pieces
        for chunk in bytes.chunks(100) {
            device.write_all(chunk).unwrap();
        }
        assert_eq!((device.warmups(), device.evaluations()), (1, 1));

        let mut answers = [0u8; 16];
        device.read_exact(&mut answers).unwrap();
        assert_eq!(
            OutputPacket::decode(&answers[8..]).unwrap(),
            OutputPacket { x: 0.0, y: 0.0 }
        );

        let mut more = [0u8; 1];
        assert_eq!(
            device.read(&mut more).unwrap_err().kind(),
            io::ErrorKind::TimedOut
        );
    }

    #[test]
    fn drives_a_link() {
        let grid = synthesize_grid(40, 40);
        let device = SimulatedPico::builder().build(&grid).unwrap();
        let mut link = PicoLink::new(device);

        let inputs: Vec<Vec<f32>> = [0, 41, 1599].iter().map(|&i| grid.cell(i).to_vec()).collect();
        let out = link.predict(&inputs, EvalFlag::Evaluate).unwrap();
        assert_eq!(
            out,
            vec![
                Position::new(0.0, 0.0),
                Position::new(10.0, 10.0),
                Position::new(390.0, 390.0),
            ]
        );
    }
}
