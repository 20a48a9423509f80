//! A reader for NumPy's `.npy` container, which is how the measured
//! intensity grids are stored.
//!
//! The file starts with a binary preamble:
//!
//! - the magic string `\x93NUMPY`
//! - a major and a minor version byte
//! - the header length, a little-endian `u16` for version 1 and a `u32` for
//!   versions 2 and 3
//!
//! The header itself is a Python dict literal, padded with spaces and
//! terminated by a newline:
//!
//! ```text
//! {'descr': '<f4', 'fortran_order': False, 'shape': (300, 300, 36), }
//! ```
//!
//! After that comes the raw, C-ordered array data. Only little-endian
//! `f4` and `f8` arrays are understood; everything is handed back as `f32`.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, multispace0, u64 as dec_u64},
    combinator::{map, opt, value},
    multi::separated_list0,
    number::complete::{le_u16, le_u32, u8 as byte},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    Finish, IResult,
};

use std::{
    borrow::Cow,
    fmt,
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

const MAGIC: &[u8] = b"\x93NUMPY";

/// Everything that can go wrong while reading a `.npy` file.
#[derive(Debug)]
pub enum NpyError {
    /// Returned when the underlying reader fails.
    IoError(std::io::Error),
    /// The file does not start with `\x93NUMPY`.
    BadMagic,
    /// Only format versions 1 through 3 exist.
    UnsupportedVersion(u8),
    /// The header dict could not be parsed.
    Header(String),
    /// The header dict is missing one of `descr`, `fortran_order`, `shape`.
    MissingKey(&'static str),
    /// The array holds something other than little-endian floats.
    UnsupportedDtype(String),
    /// Column-major arrays are not supported.
    FortranOrder,
    /// The payload is shorter than the shape promises.
    Truncated {
        /// Bytes the shape calls for
        expected: usize,
        /// Bytes that were actually there
        found: usize,
    },
    /// The array does not have the dimensions the caller needs.
    BadShape(Vec<usize>),
}

impl fmt::Display for NpyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            NpyError::IoError(error) => Cow::from(format!("io error: {}", error)),
            NpyError::BadMagic => Cow::from("not a .npy file"),
            NpyError::UnsupportedVersion(v) => Cow::from(format!("unsupported .npy version {}", v)),
            NpyError::Header(h) => Cow::from(format!("could not parse header near {:?}", h)),
            NpyError::MissingKey(k) => Cow::from(format!("header has no '{}' entry", k)),
            NpyError::UnsupportedDtype(d) => Cow::from(format!("unsupported dtype {}", d)),
            NpyError::FortranOrder => Cow::from("fortran ordered arrays are not supported"),
            NpyError::Truncated { expected, found } => Cow::from(format!(
                "array data truncated: expected {} bytes, found {}",
                expected, found
            )),
            NpyError::BadShape(shape) => Cow::from(format!("unexpected array shape {:?}", shape)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for NpyError {}

impl From<std::io::Error> for NpyError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}

/// The element types we know how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    F32,
    F64,
}

impl Dtype {
    fn from_descr(descr: &str) -> Result<Self, NpyError> {
        match descr {
            "<f4" => Ok(Dtype::F32),
            "<f8" => Ok(Dtype::F64),
            other => Err(NpyError::UnsupportedDtype(other.to_owned())),
        }
    }

    fn size(self) -> usize {
        match self {
            Dtype::F32 => 4,
            Dtype::F64 => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum HeaderValue {
    Str(String),
    Bool(bool),
    Shape(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq)]
struct Header {
    dtype: Dtype,
    shape: Vec<usize>,
}

fn parse_quoted(s: &str) -> IResult<&str, String> {
    map(
        alt((
            delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
            delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
        )),
        |cs: &str| cs.to_owned(),
    )(s)
}

fn parse_bool(s: &str) -> IResult<&str, bool> {
    alt((value(true, tag("True")), value(false, tag("False"))))(s)
}

fn comma(s: &str) -> IResult<&str, char> {
    delimited(multispace0, char(','), multispace0)(s)
}

fn parse_shape(s: &str) -> IResult<&str, Vec<usize>> {
    delimited(
        pair(char('('), multispace0),
        terminated(
            separated_list0(comma, map(dec_u64, |n| n as usize)),
            opt(comma),
        ),
        pair(multispace0, char(')')),
    )(s)
}

fn parse_value(s: &str) -> IResult<&str, HeaderValue> {
    alt((
        map(parse_quoted, HeaderValue::Str),
        map(parse_bool, HeaderValue::Bool),
        map(parse_shape, HeaderValue::Shape),
    ))(s)
}

fn parse_entry(s: &str) -> IResult<&str, (String, HeaderValue)> {
    separated_pair(
        parse_quoted,
        tuple((multispace0, char(':'), multispace0)),
        parse_value,
    )(s)
}

fn parse_dict(s: &str) -> IResult<&str, Vec<(String, HeaderValue)>> {
    delimited(
        pair(char('{'), multispace0),
        terminated(separated_list0(comma, parse_entry), opt(comma)),
        pair(multispace0, char('}')),
    )(s)
}

fn parse_preamble(b: &[u8]) -> IResult<&[u8], (u8, u8)> {
    preceded(tag(MAGIC), pair(byte, byte))(b)
}

fn header_len_v1(b: &[u8]) -> IResult<&[u8], usize> {
    map(le_u16, |n| n as usize)(b)
}

fn header_len_v2(b: &[u8]) -> IResult<&[u8], usize> {
    map(le_u32, |n| n as usize)(b)
}

impl Header {
    fn parse(text: &str) -> Result<Self, NpyError> {
        let (_rest, entries) = preceded(multispace0, parse_dict)(text)
            .finish()
            .map_err(|e| NpyError::Header(e.input.chars().take(32).collect()))?;

        let lookup = |key: &'static str| {
            entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .ok_or(NpyError::MissingKey(key))
        };

        let dtype = match lookup("descr")? {
            HeaderValue::Str(d) => Dtype::from_descr(&d)?,
            other => return Err(NpyError::Header(format!("descr = {:?}", other))),
        };
        match lookup("fortran_order")? {
            HeaderValue::Bool(false) => {}
            HeaderValue::Bool(true) => return Err(NpyError::FortranOrder),
            other => return Err(NpyError::Header(format!("fortran_order = {:?}", other))),
        }
        let shape = match lookup("shape")? {
            HeaderValue::Shape(shape) => shape,
            other => return Err(NpyError::Header(format!("shape = {:?}", other))),
        };

        Ok(Header { dtype, shape })
    }
}

/// An n-dimensional array read out of a `.npy` file, flattened in C order.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl NpyArray {
    /// Read an array from the path provided.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, NpyError> {
        let mut handle = BufReader::new(File::open(path)?);
        Self::from_reader(&mut handle)
    }

    /// Read an array from the [Read]able object provided.
    pub fn from_reader(reader: &mut impl Read) -> Result<Self, NpyError> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        Self::from_bytes(&raw)
    }

    /// Parse an array out of an in-memory `.npy` image.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, NpyError> {
        let (rest, (major, _minor)) = parse_preamble(raw)
            .finish()
            .map_err(|_| NpyError::BadMagic)?;

        let len_parser: fn(&[u8]) -> IResult<&[u8], usize> = match major {
            1 => header_len_v1,
            2 | 3 => header_len_v2,
            v => return Err(NpyError::UnsupportedVersion(v)),
        };
        let (rest, header_len) = len_parser(rest).finish().map_err(|_| NpyError::Truncated {
            expected: MAGIC.len() + 4,
            found: raw.len(),
        })?;

        if rest.len() < header_len {
            return Err(NpyError::Truncated {
                expected: header_len,
                found: rest.len(),
            });
        }
        let (header_buf, payload) = rest.split_at(header_len);

        // v3 headers are utf-8, v1/v2 are latin-1; both are ascii in practice
        let header_text = String::from_utf8_lossy(header_buf);
        let header = Header::parse(&header_text)?;

        let expected = header
            .shape
            .iter()
            .try_fold(header.dtype.size(), |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| NpyError::BadShape(header.shape.clone()))?;
        if payload.len() < expected {
            return Err(NpyError::Truncated {
                expected,
                found: payload.len(),
            });
        }

        let payload = &payload[..expected];
        let data = match header.dtype {
            Dtype::F32 => payload
                .chunks_exact(4)
                .map(|bs| f32::from_le_bytes([bs[0], bs[1], bs[2], bs[3]]))
                .collect(),
            Dtype::F64 => payload
                .chunks_exact(8)
                .map(|bs| {
                    let mut eight = [0u8; 8];
                    eight.copy_from_slice(bs);
                    f64::from_le_bytes(eight) as f32
                })
                .collect(),
        };

        Ok(NpyArray {
            shape: header.shape,
            data,
        })
    }

    /// The dimensions of the array, outermost first.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// The flattened elements, in C order.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Hands over the flattened elements.
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }
}
