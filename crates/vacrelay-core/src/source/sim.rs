//! Decay simulation
//!
//! Deterministic pump-down model used when no physical gauge is attached:
//! an exponential decay from ~1.1 bar toward the measurement floor.

use std::time::Duration;

/// Lowest pressure the model reports, in bar
pub const PRESSURE_FLOOR: f64 = 1e-6;

/// Decay time constant, in seconds
pub const DECAY_TAU_SECS: f64 = 10.0;

/// Pressure at the start of a pump-down, in bar
pub const INITIAL_PRESSURE: f64 = 1.1;

/// Simulated pressure after `elapsed` time of pumping.
///
/// Strictly decreasing until the floor is reached, then constant at the
/// floor forever after.
pub fn pressure_at(elapsed: Duration) -> f64 {
    let decayed = INITIAL_PRESSURE * (-elapsed.as_secs_f64() / DECAY_TAU_SECS).exp();
    decayed.max(PRESSURE_FLOOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_initial_pressure() {
        assert_eq!(pressure_at(Duration::ZERO), INITIAL_PRESSURE);
    }

    #[test]
    fn test_one_tau_of_decay() {
        let expected = INITIAL_PRESSURE * (-1.0f64).exp();
        let actual = pressure_at(Duration::from_secs(10));
        assert!((actual - expected).abs() < 1e-12, "got {actual}");
    }

    #[test]
    fn test_floor_reached_and_held() {
        // e^-12 is far below the floor already.
        assert_eq!(pressure_at(Duration::from_secs(120)), PRESSURE_FLOOR);
        assert_eq!(pressure_at(Duration::from_secs(3600)), PRESSURE_FLOOR);
    }

    #[test]
    fn test_strictly_decreasing_until_floor() {
        let mut last = f64::INFINITY;
        for secs in 0..60 {
            let p = pressure_at(Duration::from_secs(secs));
            if last > PRESSURE_FLOOR {
                assert!(p < last || secs == 0, "not decreasing at t={secs}s");
            } else {
                assert_eq!(p, PRESSURE_FLOOR);
            }
            last = p;
        }
    }
}
