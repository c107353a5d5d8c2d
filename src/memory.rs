//! Token-capacity accounting for a single device.

use crate::error::SimError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A device's token budget.
///
/// `threshold` is advisory: schedulers consult [`Memory::safe_capacity`] for
/// admission decisions, but [`Memory::request`]/[`Memory::release`] enforce
/// only the hard `capacity`. This split lets individual policies decide how
/// aggressively to push past the soft line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    capacity: u64,
    vacancies: u64,
    threshold: f64,
    peak_usage: u64,
}

impl Memory {
    pub fn new(capacity: u64, threshold: f64) -> Self {
        Self {
            capacity,
            vacancies: capacity,
            threshold,
            peak_usage: 0,
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn available(&self) -> u64 {
        self.vacancies
    }

    pub fn occupied(&self) -> u64 {
        self.capacity - self.vacancies
    }

    pub fn safe_capacity(&self) -> f64 {
        self.capacity as f64 * self.threshold
    }

    pub fn peak_usage(&self) -> u64 {
        self.peak_usage
    }

    /// Succeeds iff `n <= vacancies`. Never partial.
    pub fn request(&mut self, n: u64) -> bool {
        if n > self.vacancies {
            return false;
        }
        self.vacancies -= n;
        self.peak_usage = self.peak_usage.max(self.occupied());
        true
    }

    /// Returns `n` tokens to the pool. Over-release is a programming fault.
    pub fn release(&mut self, n: u64) -> Result<(), SimError> {
        if self.vacancies + n > self.capacity {
            warn!(n, vacancies = self.vacancies, capacity = self.capacity, "over-release");
            return Err(SimError::Invariant(format!(
                "release({n}) would exceed capacity {} (vacancies={})",
                self.capacity, self.vacancies
            )));
        }
        self.vacancies += n;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_and_release_round_trip() {
        let mut m = Memory::new(100, 1.0);
        assert!(m.request(40));
        assert_eq!(m.available(), 60);
        assert_eq!(m.peak_usage(), 40);
        m.release(40).unwrap();
        assert_eq!(m.available(), 100);
    }

    #[test]
    fn request_never_partial() {
        let mut m = Memory::new(10, 1.0);
        assert!(!m.request(11));
        assert_eq!(m.available(), 10);
    }

    #[test]
    fn over_release_is_invariant_error() {
        let mut m = Memory::new(10, 1.0);
        assert!(m.release(1).is_err());
    }

    #[test]
    fn safe_capacity_is_threshold_scaled() {
        let m = Memory::new(100, 0.8);
        assert_eq!(m.safe_capacity(), 80.0);
    }
}
