//! Sample sources
//!
//! Produces successive pressure readings from either the physical serial
//! link or the deterministic decay simulation.

mod serial;
pub mod sim;

pub use serial::{parse_sample_line, SerialLink};

use std::time::Duration;

use thiserror::Error;

/// Default baud rate for the sensor link
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Serial read timeout
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors from a sample source
#[derive(Error, Debug)]
pub enum SourceError {
    /// The serial link could not be opened or failed mid-read
    #[error("serial port error: {0}")]
    Serial(String),

    /// A sample line was not valid UTF-8
    #[error("invalid UTF-8 in sample line")]
    Decode,

    /// A sample line did not parse as a pressure value
    #[error("unparseable sample value: {0:?}")]
    Parse(String),

    /// The link dropped mid-read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
