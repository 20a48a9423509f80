//! Turns a model binary into C source the firmware can compile in, in the
//! same shape `xxd -i` produces:
//!
//! ```c
//! unsigned char model_int8_tflite[] = {
//!   0x1c, 0x00, 0x00, 0x00, 0x54, 0x46, 0x4c, 0x33, 0x14, 0x00, 0x20, 0x00,
//!   0x04, 0x00
//! };
//! unsigned int model_int8_tflite_len = 14;
//! ```

use log::info;
use std::{fmt::Write as _, fs, io, path::Path};

const BYTES_PER_LINE: usize = 12;

/// The C identifier for a file: its name with every character that is not
/// allowed in an identifier (the `.` of the extension, mostly) replaced by
/// `_`.
pub fn array_name(path: impl AsRef<Path>) -> String {
    let file_name = path
        .as_ref()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut name: String = file_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Renders `data` as a C byte array named `name`, followed by its length.
pub fn to_c_array(data: &[u8], name: &str) -> String {
    let mut out = String::with_capacity(data.len() * 6 + 64);

    // writing into a String cannot fail
    let _ = writeln!(out, "unsigned char {}[] = {{", name);
    let n_lines = data.chunks(BYTES_PER_LINE).len();
    for (i, chunk) in data.chunks(BYTES_PER_LINE).enumerate() {
        let line: Vec<String> = chunk.iter().map(|b| format!("0x{:02x}", b)).collect();
        let sep = if i + 1 < n_lines { "," } else { "" };
        let _ = writeln!(out, "  {}{}", line.join(", "), sep);
    }
    let _ = writeln!(out, "}};");
    let _ = writeln!(out, "unsigned int {}_len = {};", name, data.len());

    out
}

/// Reads `input` and writes its C array rendering to `output`. The array
/// is named after `input` unless `name` is given.
pub fn convert_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    name: Option<&str>,
) -> io::Result<()> {
    let data = fs::read(input.as_ref())?;
    let name = name
        .map(str::to_owned)
        .unwrap_or_else(|| array_name(input.as_ref()));

    fs::write(output.as_ref(), to_c_array(&data, &name))?;
    info!(
        "Converted {} ({} bytes) to C array {} in {}",
        input.as_ref().display(),
        data.len(),
        name,
        output.as_ref().display()
    );
    Ok(())
}
