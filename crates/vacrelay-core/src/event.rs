//! Viewer wire protocol
//!
//! Events pushed to connected viewers and the commands they may send back.
//! Everything crosses the boundary as JSON text frames.

use serde::{Deserialize, Serialize};

/// An event delivered to connected viewers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RelayEvent {
    /// One pressure sample, broadcast to every viewer
    NewData {
        /// Pressure in bar
        pressure: f64,
        /// True when the sample came from the decay simulation
        is_simulation: bool,
    },
    /// Current logging session state; sent to a viewer on connect and
    /// broadcast on every start/stop
    LoggingStatus {
        /// Whether a logging session is active
        active: bool,
        /// File name of the active session's log, if any
        filename: Option<String>,
    },
    /// The decay simulation was restarted from t = 0
    SimulationRestarted,
    /// A command failed; delivered only to the requester
    Error {
        /// Human-readable failure description
        message: String,
    },
}

/// A command a viewer may send over its connection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ViewerCommand {
    /// Begin a new logging session
    StartLogging,
    /// End the active logging session
    StopLogging,
    /// Restart the decay simulation (no-op in Live mode)
    RestartSimulation,
}
