use std::{error::Error, fmt::Display};

/// Errors from drawing or reading the terminal.
#[derive(Debug)]
pub enum GuiError {
    /// Terminal IO failed.
    IOError(std::io::Error),
    /// There was nothing to choose from.
    NoPorts,
}

impl Display for GuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuiError::IOError(e) => write!(f, "terminal error: {e}"),
            GuiError::NoPorts => write!(f, "no serial ports found, is the Pico plugged in?"),
        }
    }
}

impl Error for GuiError {}

impl From<std::io::Error> for GuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}
