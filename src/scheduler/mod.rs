//! Local scheduling policies: the per-device half of the dispatch story.
//!
//! Every policy implements [`LocalScheduler`]. FCFS, Round-Robin, and SRPT
//! additionally share one tested drain/select/run template
//! ([`drain_finished`] + [`run_selected`]) instead of each re-deriving the
//! drain-finished/pick/request/advance sequence, mirroring the shared
//! pipeline-stage pattern used for admission gating elsewhere in this
//! codebase.

pub mod fcfs;
pub mod hybrid;
pub mod prefill;
pub mod round_robin;
pub mod srpt;

use crate::error::SimError;
use crate::ids::JobId;
use crate::job::{Job, JobState};
use crate::memory::Memory;
use std::collections::VecDeque;
use tracing::warn;

/// Result of offering a job to a local scheduler's `add_job`.
///
/// Rejection is expected control flow (the dispatcher simply tries the next
/// device), so it is carried as data rather than as an `Err` — matching the
/// admission-rejection category in the error design.
pub enum AddOutcome {
    Accepted,
    Rejected(Job),
}

/// What happened during one call to [`LocalScheduler::step`].
#[derive(Default)]
pub struct StepOutput {
    /// Jobs that executed (received at least the mandatory 1-token advance)
    /// this tick.
    pub executed: Vec<JobId>,
    /// Jobs that reached `Finished` this tick; the caller folds these into
    /// the global scheduler's finished-job list.
    pub finished: Vec<Job>,
    /// Jobs whose prefill completed this tick and that must be handed back
    /// to the global scheduler for re-dispatch as DECODE jobs. Plain
    /// decode-oriented schedulers (FCFS/RR/SRPT) never populate this; only
    /// the prefill-aware policies do.
    pub handback: Vec<Job>,
}

/// The behavior every local scheduling policy must provide.
pub trait LocalScheduler {
    fn add_job(&mut self, job: Job, now: u64, memory: &Memory) -> AddOutcome;
    fn remove_job(&mut self, id: JobId) -> Result<Job, SimError>;
    fn step(&mut self, now: u64, memory: &mut Memory) -> StepOutput;
    /// Nominate a job eligible for cross-device migration, restricted to
    /// jobs currently in one of `stages`. Does not remove it.
    fn pick_movable_job(&self, stages: &[JobState]) -> Option<JobId>;
    /// Forcibly remove `id`. If the job held memory, release it and record
    /// `swap_size` so it can be resumed elsewhere. Double-preempt (id not
    /// present) is a no-op returning `None`.
    fn preempt_job(&mut self, id: JobId, memory: &mut Memory) -> Option<Job>;
    fn num_jobs(&self) -> usize;
}

/// Drains and releases memory for every finished job in `run_queue`,
/// marking it `Finished` and moving it into the returned vector. Shared by
/// every decode-oriented policy's `step`.
pub fn drain_finished(run_queue: &mut VecDeque<Job>, memory: &mut Memory) -> Vec<Job> {
    let mut finished = Vec::new();
    let mut i = 0;
    while i < run_queue.len() {
        if run_queue[i].is_finished() {
            let mut job = run_queue.remove(i).unwrap();
            if job.current_size > 0 {
                if let Err(e) = memory.release(job.current_size) {
                    warn!(error = %e, "release on finished job failed");
                }
                job.current_size = 0;
            }
            job.state = JobState::Finished;
            finished.push(job);
        } else {
            i += 1;
        }
    }
    finished
}

/// The shared per-tick execution template described for FCFS/RR/SRPT:
/// finished-job cleanup has already happened (by the caller, via
/// [`drain_finished`]); this function takes the policy-specific selection
/// (`picked`, in priority order) and runs the memory/advance protocol on
/// each.
pub fn run_selected(
    run_queue: &mut VecDeque<Job>,
    picked: &[usize],
    now: u64,
    memory: &mut Memory,
) -> Vec<JobId> {
    let mut executed = Vec::new();
    for &idx in picked {
        let job = &mut run_queue[idx];

        if job.current_size == 0 && job.swap_size > 0 && job.decode_start.is_some() {
            if memory.request(job.swap_size) {
                job.current_size = job.swap_size;
                job.swap_size = 0;
            } else {
                warn!(job = %job.id, need = job.swap_size, "swap-in failed, waiting for memory");
                continue;
            }
        } else if job.current_size == 0 && job.decode_start.is_none() {
            if memory.request(job.init_size) {
                job.current_size = job.init_size;
                job.decode_start = Some(now);
            } else {
                warn!(job = %job.id, need = job.init_size, "initial allocation failed, waiting for memory");
                continue;
            }
        }

        if memory.request(1) {
            job.advance(now);
        } else {
            warn!(job = %job.id, "1-token advance failed, waiting for memory");
            continue;
        }

        executed.push(job.id);

        if job.is_finished() {
            job.decode_finish = Some(now);
        }
    }
    executed
}

/// Shared `pick_movable_job`: prefer a not-yet-running job beyond the first
/// `batch` entries (to minimize memory-transfer cost of the move); fall
/// back to the first running job beyond `batch` if none are idle.
pub fn pick_movable(run_queue: &VecDeque<Job>, batch: usize, stages: &[JobState]) -> Option<JobId> {
    let mut fallback = None;
    for (i, job) in run_queue.iter().enumerate() {
        if !stages.contains(&job.state) {
            continue;
        }
        if i < batch {
            continue;
        }
        if job.current_size == 0 {
            return Some(job.id);
        } else if fallback.is_none() {
            fallback = Some(job.id);
        }
    }
    fallback
}

/// Shared `preempt_job`: remove `id` from `run_queue`. If it was resident,
/// release its memory and record `swap_size` so a later scheduler can
/// resume it.
pub fn preempt(run_queue: &mut VecDeque<Job>, id: JobId, memory: &mut Memory) -> Option<Job> {
    let idx = run_queue.iter().position(|j| j.id == id)?;
    let mut job = run_queue.remove(idx).unwrap();
    if job.current_size > 0 {
        if let Err(e) = memory.release(job.current_size) {
            warn!(error = %e, "release during preempt failed");
        }
        job.swap_size = job.current_size;
        job.current_size = 0;
    }
    Some(job)
}

/// Total memory a run queue would need if every job ran: resident jobs
/// contribute `current_size`, non-resident ones contribute `init_size`.
pub fn expected_memory(run_queue: &VecDeque<Job>) -> u64 {
    run_queue
        .iter()
        .map(|j| if j.current_size == 0 { j.init_size } else { j.current_size })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::JobId;

    fn job(id: u64, init: u64, out: u64) -> Job {
        let mut j = Job::new(JobId(id), 0, init, out);
        j.state = JobState::Decode;
        j
    }

    #[test]
    fn run_selected_first_run_allocates_init_then_advances() {
        let mut mem = Memory::new(100, 1.0);
        let mut q = VecDeque::from([job(1, 10, 5)]);
        let executed = run_selected(&mut q, &[0], 0, &mut mem);
        assert_eq!(executed, vec![JobId(1)]);
        assert_eq!(q[0].current_size, 11);
        assert_eq!(q[0].decode_start, Some(0));
    }

    #[test]
    fn drain_finished_releases_and_marks() {
        let mut mem = Memory::new(100, 1.0);
        mem.request(15);
        let mut j = job(1, 10, 5);
        j.current_size = 15;
        let mut q = VecDeque::from([j]);
        let finished = drain_finished(&mut q, &mut mem);
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].state, JobState::Finished);
        assert_eq!(mem.available(), 100);
        assert!(q.is_empty());
    }

    #[test]
    fn pick_movable_skips_first_batch_prefers_idle() {
        let mut q = VecDeque::new();
        q.push_back(job(1, 10, 5));
        let mut running = job(2, 10, 5);
        running.current_size = 10;
        q.push_back(running);
        q.push_back(job(3, 10, 5));
        let picked = pick_movable(&q, 1, &[JobState::Decode]);
        assert_eq!(picked, Some(JobId(3)));
    }
}
