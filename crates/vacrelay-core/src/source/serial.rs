//! Serial link handling
//!
//! Low-level access to the gauge's serial feed. The gauge prints one ASCII
//! reading per line; availability is polled with `bytes_to_read` so the
//! producer never blocks past its read timeout.

use std::io::{self, Read};

use serialport::SerialPort;

use super::{SourceError, READ_TIMEOUT};

/// An open serial connection to the gauge
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    pending: Vec<u8>,
}

impl SerialLink {
    /// Open the link with a short read timeout
    pub fn open(name: &str, baud_rate: u32) -> Result<Self, SourceError> {
        let port = serialport::new(name, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| SourceError::Serial(e.to_string()))?;
        Ok(Self {
            port,
            pending: Vec::new(),
        })
    }

    /// Poll for one complete line without blocking.
    ///
    /// Returns `Ok(None)` when no full line has arrived yet. Errors are
    /// link-level failures; the caller decides whether to reconnect.
    pub fn poll_line(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        if let Some(line) = split_line(&mut self.pending) {
            return Ok(Some(line));
        }

        let available = self
            .port
            .bytes_to_read()
            .map_err(|e| SourceError::Serial(e.to_string()))? as usize;
        if available == 0 {
            return Ok(None);
        }

        let mut buf = vec![0u8; available.min(512)];
        match self.port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(n) => {
                self.pending.extend_from_slice(&buf[..n]);
                Ok(split_line(&mut self.pending))
            }
            Err(ref e)
                if e.kind() == io::ErrorKind::TimedOut
                    || e.kind() == io::ErrorKind::WouldBlock =>
            {
                Ok(None)
            }
            Err(e) => Err(SourceError::Io(e)),
        }
    }
}

/// Detach the first complete line from `pending`, without its terminator
fn split_line(pending: &mut Vec<u8>) -> Option<Vec<u8>> {
    let pos = pending.iter().position(|&b| b == b'\n')?;
    let mut line: Vec<u8> = pending.drain(..=pos).collect();
    line.pop();
    Some(line)
}

/// Decode one raw line as a pressure value.
///
/// The feed is ASCII text; surrounding whitespace (including `\r` from CRLF
/// terminators) is not significant. A blank line yields `Ok(None)`.
pub fn parse_sample_line(line: &[u8]) -> Result<Option<f64>, SourceError> {
    let text = std::str::from_utf8(line).map_err(|_| SourceError::Decode)?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .map(Some)
        .map_err(|_| SourceError::Parse(trimmed.to_string()))
}
