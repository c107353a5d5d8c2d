//! Request lifecycle record and progress state.

use crate::ids::JobId;
use serde::{Deserialize, Serialize};

/// Where a job currently sits in its prefill/decode lifecycle.
///
/// Transitions are monotonic: `Initial -> Prefill -> Decode -> Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Initial,
    Prefill,
    Decode,
    Finished,
}

/// A single request moving through the fleet.
///
/// A `Job` is never `Clone`: it lives in exactly one queue at a time (the
/// global pending queue, a device's local scheduler, or a finished list),
/// moved by value between them. That ownership discipline is what makes
/// "no job on two devices simultaneously" a consequence of the type system
/// rather than something that has to be checked at runtime.
#[derive(Debug, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub state: JobState,
    pub arrival_time: u64,
    pub init_size: u64,
    pub final_size: u64,
    pub current_size: u64,
    pub swap_size: u64,

    pub prefill_start: Option<u64>,
    pub prefill_finish: Option<u64>,
    pub decode_start: Option<u64>,
    pub decode_finish: Option<u64>,
    pub execution_time: u64,

    // SRPT anti-starvation bookkeeping; unused by other policies.
    pub last_scheduled: Option<u64>,
    pub starvation_count: u64,
    pub quantum: i64,
    pub is_priority: bool,
}

impl Job {
    pub fn new(id: JobId, arrival_time: u64, init_size: u64, expected_output: u64) -> Self {
        Self {
            id,
            state: JobState::Initial,
            arrival_time,
            init_size,
            final_size: init_size + expected_output,
            current_size: 0,
            swap_size: 0,
            prefill_start: None,
            prefill_finish: None,
            decode_start: None,
            decode_finish: None,
            execution_time: 0,
            last_scheduled: None,
            starvation_count: 0,
            quantum: 0,
            is_priority: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.current_size >= self.final_size || self.decode_finish.is_some()
    }

    /// Remaining output tokens to emit (SRPT's ranking key).
    pub fn remaining_work(&self) -> u64 {
        self.final_size.saturating_sub(self.current_size)
    }

    /// Advance one tick's worth of progress. Always bumps `execution_time`;
    /// DECODE additionally sets `decode_start` on first call and grows
    /// `current_size` by one token. PREFILL sets `prefill_start` on first
    /// call but does not touch `current_size` — prefill tokens were
    /// reserved up front, not grown incrementally.
    pub fn advance(&mut self, now: u64) {
        self.execution_time += 1;
        match self.state {
            JobState::Decode => {
                if self.decode_start.is_none() {
                    self.decode_start = Some(now);
                }
                self.current_size += 1;
            }
            JobState::Prefill => {
                if self.prefill_start.is_none() {
                    self.prefill_start = Some(now);
                }
            }
            JobState::Initial | JobState::Finished => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(JobId(1), 0, 10, 5)
    }

    #[test]
    fn final_size_is_init_plus_output() {
        assert_eq!(job().final_size, 15);
    }

    #[test]
    fn decode_advance_sets_start_once_and_grows_current_size() {
        let mut j = job();
        j.state = JobState::Decode;
        j.current_size = 10;
        j.advance(3);
        assert_eq!(j.decode_start, Some(3));
        assert_eq!(j.current_size, 11);
        j.advance(4);
        assert_eq!(j.decode_start, Some(3));
        assert_eq!(j.current_size, 12);
    }

    #[test]
    fn prefill_advance_does_not_change_current_size() {
        let mut j = job();
        j.state = JobState::Prefill;
        j.advance(0);
        assert_eq!(j.prefill_start, Some(0));
        assert_eq!(j.current_size, 0);
    }

    #[test]
    fn is_finished_on_size_or_timestamp() {
        let mut j = job();
        j.current_size = 15;
        assert!(j.is_finished());
        let mut j2 = job();
        j2.decode_finish = Some(9);
        assert!(j2.is_finished());
    }
}
