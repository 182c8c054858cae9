use std::{error::Error, fmt::Display};

/// What can go wrong while a view is up.
#[derive(Debug)]
pub enum GuiError {
    /// The terminal could not be driven.
    IOError(std::io::Error),
    /// There was nothing to pick from.
    NoPorts,
}

impl Display for GuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuiError::IOError(e) => write!(f, "terminal error: {}", e),
            GuiError::NoPorts => write!(f, "no serial ports to choose from"),
        }
    }
}

impl Error for GuiError {}

impl From<std::io::Error> for GuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}
