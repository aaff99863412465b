//! Pressure samples
//!
//! One timestamped gauge reading with an origin tag.

use chrono::{DateTime, Local};

/// Where a sample came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOrigin {
    /// Read from the physical sensor link
    Live,
    /// Produced by the decay simulation
    Simulated,
}

/// A single pressure reading, immutable once produced
#[derive(Debug, Clone)]
pub struct Sample {
    /// Wall-clock time the sample was produced
    pub at: DateTime<Local>,
    /// Pressure in bar
    pub pressure: f64,
    /// Origin tag
    pub origin: SampleOrigin,
}

impl Sample {
    /// Create a sample stamped with the current time
    pub fn new(pressure: f64, origin: SampleOrigin) -> Self {
        Self {
            at: Local::now(),
            pressure,
            origin,
        }
    }

    /// True if the sample was produced by the simulation
    pub fn is_simulation(&self) -> bool {
        self.origin == SampleOrigin::Simulated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_tag() {
        assert!(Sample::new(1.0, SampleOrigin::Simulated).is_simulation());
        assert!(!Sample::new(1.0, SampleOrigin::Live).is_simulation());
    }
}
