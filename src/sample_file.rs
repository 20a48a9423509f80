//! This module provides an API to read and write [SampleFile]s, a file format
//! holding recorded (or synthesized) sensor vectors together with the
//! location each one was taken at. They are what the `replay` command feeds
//! to the device. The files have the following structure:
//!
//! - First there is a header that contains some metadata:
//!   - The number of LEDs per vector
//!   - The number of samples
//!   - A free-form description of where the samples came from
//!   - Optionally, the [AgingConfig] of the run that produced them
//! - Then there is a seperator, which is a byte of all 1s; `0xFF`.
//! - Finally, the samples. Each sample is `n_leds` intensities followed by
//!   its `x` and `y` in millimetres, all little-endian `f32`s.
//!
//! The header is encoded using [serde] and [ron]. In the file, it appears
//! as follows:
//!
//! ```text
//! (n_leds:36,n_samples:1000,source:"test set of grid.npy",config:None)
//! ```

use crate::experiment::AgingConfig;
use crate::{Position, Sample};

use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    fmt,
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

const DELIMITER: u8 = 0xFF;

/// This struct contains the header and samples of a recording.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleFile {
    header: SampleFileHeader,
    samples: Vec<Sample>,
}

/// This struct contains the header data for a [SampleFile].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
struct SampleFileHeader {
    n_leds: u64,
    n_samples: u64,
    source: String,
    config: Option<AgingConfig>,
}

/// A nice little error that we can return if things go wrong throughout
/// the process of reading, building, or writing a [SampleFile].
#[derive(Debug)]
pub enum SampleFileError {
    /// Returned when building from samples that do not all have the same
    /// number of LEDs.
    UnequalLedCounts,

    /// Returned when trying to read a [SampleFile], but are not able to find
    /// the delimiter between the header and sample binary.
    NoDelimiter,

    /// Returned when the sample binary is shorter or longer than the header
    /// says.
    LengthMismatch {
        /// Bytes the header calls for
        expected: usize,
        /// Bytes found after the delimiter
        found: usize,
    },

    /// Returned when io fails when reading or writing files.
    IoError(std::io::Error),

    /// Returned when serialization of the header fails.
    RonError(ron::Error),

    /// Returned when deserialization of the header fails.
    RonSpannedError(ron::de::SpannedError),
}

impl fmt::Display for SampleFileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use SampleFileError as SFE;
        let msg = match self {
            SFE::UnequalLedCounts => Cow::from("samples have unequal LED counts"),
            SFE::NoDelimiter => Cow::from("no delimiter in sample file"),
            SFE::LengthMismatch { expected, found } => Cow::from(format!(
                "sample data should be {} bytes, found {}",
                expected, found
            )),
            SFE::IoError(error) => Cow::from(format!("io error: {}", error)),
            SFE::RonError(error) => Cow::from(format!("ron error: {}", error)),
            SFE::RonSpannedError(error) => Cow::from(format!("ron spanning error: {}", error)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for SampleFileError {}

impl SampleFile {
    /// Make a [SampleFileBuilder], which can be used to describe the source
    /// and add samples, before building the [SampleFile].
    pub fn builder() -> SampleFileBuilder {
        SampleFileBuilder::new()
    }

    /// Number of LEDs in every sample.
    pub fn n_leds(&self) -> usize {
        self.header.n_leds as usize
    }

    /// Where the samples came from.
    pub fn source(&self) -> &str {
        &self.header.source
    }

    /// The aging configuration that produced the samples, if any.
    pub fn config(&self) -> Option<&AgingConfig> {
        self.header.config.as_ref()
    }

    /// The recorded samples, locations in millimetres.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Write out a [SampleFile] to the path provided.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), SampleFileError> {
        let handle = File::create(path).map_err(SampleFileError::IoError)?;
        let mut writer = BufWriter::new(handle);
        self.to_file(&mut writer)?;
        writer.flush().map_err(SampleFileError::IoError)
    }

    /// Write out a [SampleFile] to the [Write]able object provided.
    pub fn to_file(&self, file: &mut impl Write) -> Result<(), SampleFileError> {
        let h_str = ron::ser::to_string(&self.header).map_err(SampleFileError::RonError)?;

        file.write_all(h_str.as_bytes())
            .map_err(SampleFileError::IoError)?;

        file.write_all(&[DELIMITER])
            .map_err(SampleFileError::IoError)?;

        let s_buf: Vec<u8> = self
            .samples
            .iter()
            .flat_map(|s| {
                s.leds
                    .iter()
                    .chain([s.location.x, s.location.y].iter())
                    .flat_map(|f| f.to_le_bytes())
                    .collect::<Vec<u8>>()
            })
            .collect();

        file.write_all(&s_buf).map_err(SampleFileError::IoError)
    }

    /// Read a [SampleFile] from the path provided.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SampleFileError> {
        let handle = File::open(path).map_err(SampleFileError::IoError)?;
        Self::from_file(&mut BufReader::new(handle))
    }

    /// Read a [SampleFile] from the [Read]able object provided.
    pub fn from_file(file: &mut impl Read) -> Result<Self, SampleFileError> {
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)
            .map_err(SampleFileError::IoError)?;

        let delim_idx = raw
            .iter()
            .position(|e| *e == DELIMITER)
            .ok_or(SampleFileError::NoDelimiter)?;

        let (header_buf, samples_buf) = raw.split_at(delim_idx);
        let samples_buf = &samples_buf[1..];

        let header = ron::de::from_bytes::<SampleFileHeader>(header_buf)
            .map_err(SampleFileError::RonSpannedError)?;

        let n_leds = usize::try_from(header.n_leds).unwrap_or(usize::MAX);
        let floats_per_sample = n_leds.saturating_add(2);
        // usize::MAX stands for a length no buffer can have
        let expected = usize::try_from(header.n_samples)
            .ok()
            .and_then(|n| n.checked_mul(floats_per_sample))
            .and_then(|floats| floats.checked_mul(4))
            .unwrap_or(usize::MAX);
        if samples_buf.len() != expected {
            return Err(SampleFileError::LengthMismatch {
                expected,
                found: samples_buf.len(),
            });
        }

        let floats: Vec<f32> = samples_buf
            .chunks_exact(4)
            .map(|bs| f32::from_le_bytes([bs[0], bs[1], bs[2], bs[3]]))
            .collect();

        let samples = floats
            .chunks_exact(floats_per_sample)
            .map(|c| {
                let (leds, xy) = c.split_at(n_leds);
                Sample {
                    leds: leds.to_vec(),
                    location: Position::new(xy[0], xy[1]),
                }
            })
            .collect();

        Ok(SampleFile { header, samples })
    }
}

/// This builder contains the data required to make a [SampleFile].
#[derive(Debug, Clone, Default)]
pub struct SampleFileBuilder {
    source: String,
    config: Option<AgingConfig>,
    samples: Vec<Sample>,
}

impl SampleFileBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Describes where the samples come from.
    pub fn set_source(self, source: impl Into<String>) -> Self {
        SampleFileBuilder {
            source: source.into(),
            ..self
        }
    }

    /// Records the aging configuration that produced the samples.
    pub fn set_config(self, config: AgingConfig) -> Self {
        SampleFileBuilder {
            config: Some(config),
            ..self
        }
    }

    /// Adds one sample. Its location should already be in millimetres.
    pub fn add_sample(mut self, sample: Sample) -> Self {
        self.samples.push(sample);
        self
    }

    /// Adds many samples at once.
    pub fn add_samples(mut self, samples: impl IntoIterator<Item = Sample>) -> Self {
        self.samples.extend(samples);
        self
    }

    /// Builds a [SampleFile], returning
    /// [SampleFileError::UnequalLedCounts] if the samples disagree on how
    /// many LEDs there are.
    pub fn build(self) -> Result<SampleFile, SampleFileError> {
        let lens: Vec<usize> = self.samples.iter().map(|s| s.leds.len()).collect();
        if !lens.windows(2).all(|w| w[0] == w[1]) {
            return Err(SampleFileError::UnequalLedCounts);
        }

        Ok(SampleFile {
            header: SampleFileHeader {
                n_leds: lens.first().copied().unwrap_or(0) as u64,
                n_samples: self.samples.len() as u64,
                source: self.source,
                config: self.config,
            },
            samples: self.samples,
        })
    }
}
