//! Opaque identifiers that replace object back-references.

use std::fmt;

/// Identifies a device within the simulator's device vector.
///
/// Using an index instead of a back-pointer to the owning `GlobalScheduler`
/// or `Allocator` sidesteps the cyclic-ownership problem those two
/// components would otherwise create: devices live in one `Vec<Device>`
/// owned by the simulator, and everyone else addresses them by `DeviceId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// Identifies a job for logging and test assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}
