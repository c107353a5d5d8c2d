//! Typed error hierarchy for the simulator.

use thiserror::Error;

/// Top-level error type surfaced by the simulator.
///
/// Only the `Invariant`, `Config`, and `RowParse` variants are ever returned
/// as `Err` from a public function. Admission rejection and transient
/// allocation failure are expected control flow, not errors — they are
/// modeled as [`crate::scheduler::AddOutcome`] and a `tracing::warn!` call
/// site respectively, never as a `SimError`.
#[derive(Error, Debug)]
pub enum SimError {
    /// A programming fault: over-release of memory, removing a job that is
    /// not present in a queue, an invalid job state at routing. These are
    /// bugs, not expected runtime conditions, so the driver aborts the run.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// A fatal configuration problem discovered at load/validate time,
    /// before the first tick runs.
    #[error("configuration error: {0}")]
    Config(String),

    /// A CSV row failed to parse. Logged and the row is skipped; this
    /// variant exists so the generator has something to log via `#[from]`
    /// conversion, but it is never propagated out of the generator.
    #[error("row parse error: {0}")]
    RowParse(#[from] csv::Error),
}

pub type SimResult<T> = Result<T, SimError>;
