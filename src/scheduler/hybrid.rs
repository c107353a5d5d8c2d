//! Hybrid scheduler: collocates chunked prefill and round-robin decode on
//! one device.

use super::prefill::FcfsPrefill;
use super::round_robin::RoundRobin;
use super::{AddOutcome, LocalScheduler, StepOutput};
use crate::error::SimError;
use crate::ids::JobId;
use crate::job::{Job, JobState};
use crate::memory::Memory;

/// Composes an [`FcfsPrefill`] and a [`RoundRobin`] over the same device.
/// `add_job` routes on the job's current state; `step` runs prefill first,
/// then decode, and unions their outputs.
///
/// `collocate_threshold` is passed straight through as the decode
/// sub-scheduler's `batch`: it bounds how many decode jobs the collocated
/// RR may pick per tick, exactly as it would for a standalone RR.
pub struct Hybrid {
    prefill: FcfsPrefill,
    decode: RoundRobin,
}

impl Hybrid {
    pub fn new(chunk_size: u64, chunk_time: u64, collocate_threshold: usize, time_slice: u64) -> Self {
        Self {
            prefill: FcfsPrefill::new(chunk_size, chunk_time),
            decode: RoundRobin::new(collocate_threshold, time_slice),
        }
    }
}

impl LocalScheduler for Hybrid {
    fn add_job(&mut self, job: Job, now: u64, memory: &Memory) -> AddOutcome {
        match job.state {
            JobState::Initial | JobState::Prefill => self.prefill.add_job(job, now, memory),
            JobState::Decode => self.decode.add_job(job, now, memory),
            JobState::Finished => AddOutcome::Rejected(job),
        }
    }

    fn remove_job(&mut self, id: JobId) -> Result<Job, SimError> {
        self.prefill.remove_job(id).or_else(|_| self.decode.remove_job(id))
    }

    fn step(&mut self, now: u64, memory: &mut Memory) -> StepOutput {
        // Same flow as any other prefill-capable device: the prefill
        // sub-scheduler hands a finished job back to the caller, which
        // re-queues it at the global scheduler for redispatch (it will
        // typically land right back on this device if it's the only
        // collocated one capable of DECODE).
        let prefill_out = self.prefill.step(now, memory);
        let decode_out = self.decode.step(now, memory);

        StepOutput {
            executed: prefill_out.executed.into_iter().chain(decode_out.executed).collect(),
            finished: decode_out.finished,
            handback: prefill_out.handback,
        }
    }

    fn pick_movable_job(&self, stages: &[JobState]) -> Option<JobId> {
        self.prefill.pick_movable_job(stages).or_else(|| self.decode.pick_movable_job(stages))
    }

    fn preempt_job(&mut self, id: JobId, memory: &mut Memory) -> Option<Job> {
        self.prefill.preempt_job(id, memory).or_else(|| self.decode.preempt_job(id, memory))
    }

    fn num_jobs(&self) -> usize {
        self.prefill.num_jobs() + self.decode.num_jobs()
    }
}
