//! # VacRelay Core Library
//!
//! Core functionality for the VacRelay pressure telemetry relay.
//!
//! This library provides:
//! - The single background producer that reads a vacuum gauge (serial link
//!   or deterministic decay simulation) and fans samples out to viewers
//! - Session-scoped CSV pressure logging
//! - The broadcast boundary viewers subscribe through
//! - The viewer wire protocol (events and commands)
//!
//! ## Example
//!
//! ```rust,ignore
//! use vacrelay_core::prelude::*;
//!
//! let relay = Relay::new(RelayConfig::simulated(), EventBus::default());
//! let mut events = relay.bus().subscribe();
//!
//! // A viewer connection lazily starts the producer.
//! let status = relay.clone().on_viewer_connect().await;
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

#![warn(missing_docs)]

pub mod bus;
pub mod config;
pub mod datalog;
pub mod error;
pub mod event;
pub mod relay;
pub mod sample;
pub mod source;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bus::EventBus;
    pub use crate::config::{RelayConfig, SourceMode};
    pub use crate::datalog::SessionLog;
    pub use crate::error::RelayError;
    pub use crate::event::{RelayEvent, ViewerCommand};
    pub use crate::relay::Relay;
    pub use crate::sample::{Sample, SampleOrigin};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
