//! Chunked-prefill local scheduling: FCFS-Prefill and its round-robin variant.

use super::{AddOutcome, LocalScheduler, StepOutput};
use crate::error::SimError;
use crate::ids::JobId;
use crate::job::{Job, JobState};
use crate::memory::Memory;
use std::collections::VecDeque;
use tracing::{debug, warn};

fn expected_ticks(init_size: u64, chunk_size: u64, chunk_time: u64) -> u64 {
    let chunks = (init_size + chunk_size - 1) / chunk_size;
    chunks * chunk_time
}

/// Models prefill as a fixed-duration, memory-resident workload: one job
/// runs to completion before the next is admitted.
pub struct FcfsPrefill {
    chunk_size: u64,
    chunk_time: u64,
    run_queue: VecDeque<Job>,
    cur_job: Option<Job>,
    cur_job_time: u64,
    cur_job_expected_time: u64,
}

impl FcfsPrefill {
    pub fn new(chunk_size: u64, chunk_time: u64) -> Self {
        Self {
            chunk_size,
            chunk_time,
            run_queue: VecDeque::new(),
            cur_job: None,
            cur_job_time: 0,
            cur_job_expected_time: 0,
        }
    }
}

impl LocalScheduler for FcfsPrefill {
    fn add_job(&mut self, mut job: Job, _now: u64, _memory: &Memory) -> AddOutcome {
        job.state = JobState::Initial;
        self.run_queue.push_back(job);
        AddOutcome::Accepted
    }

    fn remove_job(&mut self, id: JobId) -> Result<Job, SimError> {
        if self.cur_job.as_ref().map(|j| j.id) == Some(id) {
            return Err(SimError::Invariant(format!("{id} is mid-prefill, cannot remove")));
        }
        let idx = self
            .run_queue
            .iter()
            .position(|j| j.id == id)
            .ok_or_else(|| SimError::Invariant(format!("{id} not in FCFS-Prefill queue")))?;
        Ok(self.run_queue.remove(idx).unwrap())
    }

    fn step(&mut self, now: u64, memory: &mut Memory) -> StepOutput {
        if let Some(mut job) = self.cur_job.take() {
            if self.cur_job_time >= self.cur_job_expected_time {
                if let Err(e) = memory.release(job.init_size) {
                    warn!(error = %e, "release on prefill completion failed");
                }
                job.state = JobState::Decode;
                job.prefill_finish = Some(now);
                debug!(job = %job.id, "prefill complete, handing back");
                self.cur_job_time = 0;
                self.cur_job_expected_time = 0;
                return StepOutput { handback: vec![job], ..Default::default() };
            }
            self.cur_job_time += 1;
            job.advance(now);
            let id = job.id;
            self.cur_job = Some(job);
            return StepOutput { executed: vec![id], ..Default::default() };
        }

        let Some(mut job) = self.run_queue.pop_front() else {
            return StepOutput::default();
        };

        if !memory.request(job.init_size) {
            warn!(job = %job.id, need = job.init_size, "prefill allocation failed, waiting for memory");
            self.run_queue.push_front(job);
            return StepOutput::default();
        }

        job.state = JobState::Prefill;
        job.prefill_start = Some(now);
        self.cur_job_expected_time = expected_ticks(job.init_size, self.chunk_size, self.chunk_time);
        // The kickoff tick counts as the first tick of progress.
        self.cur_job_time = 1;
        job.advance(now);
        let id = job.id;
        self.cur_job = Some(job);
        StepOutput { executed: vec![id], ..Default::default() }
    }

    fn pick_movable_job(&self, _stages: &[JobState]) -> Option<JobId> {
        // Prefill jobs are not movable: their in-flight chunk state cannot
        // be transferred cheaply (mirrors the original source, which
        // stubs this to always refuse).
        None
    }

    fn preempt_job(&mut self, _id: JobId, _memory: &mut Memory) -> Option<Job> {
        None
    }

    fn num_jobs(&self) -> usize {
        self.run_queue.len() + usize::from(self.cur_job.is_some())
    }
}

struct Progress {
    job: Job,
    expected_time: u64,
    total_running_time: u64,
    iter_running_time: u64,
    memory_allocated: bool,
}

/// Interleaves multiple prefilling jobs, round-robining which one receives
/// each `chunk_time` budget.
pub struct RrPrefill {
    chunk_size: u64,
    chunk_time: u64,
    run_queue: VecDeque<Progress>,
    cur: Option<Progress>,
}

impl RrPrefill {
    pub fn new(chunk_size: u64, chunk_time: u64) -> Self {
        Self { chunk_size, chunk_time, run_queue: VecDeque::new(), cur: None }
    }
}

impl LocalScheduler for RrPrefill {
    fn add_job(&mut self, mut job: Job, _now: u64, _memory: &Memory) -> AddOutcome {
        job.state = JobState::Initial;
        let expected_time = expected_ticks(job.init_size, self.chunk_size, self.chunk_time);
        self.run_queue.push_back(Progress {
            job,
            expected_time,
            total_running_time: 0,
            iter_running_time: 0,
            memory_allocated: false,
        });
        AddOutcome::Accepted
    }

    fn remove_job(&mut self, id: JobId) -> Result<Job, SimError> {
        let idx = self
            .run_queue
            .iter()
            .position(|p| p.job.id == id)
            .ok_or_else(|| SimError::Invariant(format!("{id} not in RR-Prefill queue")))?;
        Ok(self.run_queue.remove(idx).unwrap().job)
    }

    fn step(&mut self, now: u64, memory: &mut Memory) -> StepOutput {
        if let Some(mut p) = self.cur.take() {
            if p.total_running_time >= p.expected_time {
                if let Err(e) = memory.release(p.job.init_size) {
                    warn!(error = %e, "release on prefill completion failed");
                }
                p.job.state = JobState::Decode;
                p.job.prefill_finish = Some(now);
                return StepOutput { handback: vec![p.job], ..Default::default() };
            }
            if p.iter_running_time >= self.chunk_time {
                p.iter_running_time = 0;
                self.run_queue.push_back(p);
                // Force a re-pick this tick.
                return self.step(now, memory);
            }
            p.total_running_time += 1;
            p.iter_running_time += 1;
            p.job.advance(now);
            let id = p.job.id;
            self.cur = Some(p);
            return StepOutput { executed: vec![id], ..Default::default() };
        }

        if self.run_queue.is_empty() {
            return StepOutput::default();
        }

        let near_full = memory.occupied() as f64 > memory.safe_capacity();
        let mut p = if near_full {
            match self.run_queue.iter().position(|p| p.memory_allocated) {
                Some(idx) => self.run_queue.remove(idx).unwrap(),
                None => return StepOutput::default(),
            }
        } else {
            let mut p = self.run_queue.pop_front().unwrap();
            if !p.memory_allocated {
                if !memory.request(p.job.init_size) {
                    warn!(job = %p.job.id, "RR-Prefill allocation failed, waiting for memory");
                    self.run_queue.push_front(p);
                    return StepOutput::default();
                }
                p.memory_allocated = true;
            }
            p.job.state = JobState::Prefill;
            p.job.prefill_start = Some(now);
            p.total_running_time = 0;
            p.iter_running_time = 0;
            p
        };

        p.job.advance(now);
        p.iter_running_time += 1;
        p.total_running_time += 1;
        let id = p.job.id;
        self.cur = Some(p);
        StepOutput { executed: vec![id], ..Default::default() }
    }

    fn pick_movable_job(&self, _stages: &[JobState]) -> Option<JobId> {
        None
    }

    fn preempt_job(&mut self, _id: JobId, _memory: &mut Memory) -> Option<Job> {
        None
    }

    fn num_jobs(&self) -> usize {
        self.run_queue.len() + usize::from(self.cur.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::JobId;

    #[test]
    fn scenario_four_prefill_takes_four_ticks() {
        // Two devices P(PREFILL, cap=100, FCFS-Prefill{chunk=32, chunk_time=2});
        // job (init=64, out=10) -> prefill takes ceil(64/32)*2 = 4 ticks,
        // prefill_finish = 4.
        let mut s = FcfsPrefill::new(32, 2);
        let mut mem = Memory::new(100, 1.0);
        s.add_job(Job::new(JobId(1), 0, 64, 10), 0, &mem);

        let mut prefill_finish = None;
        for t in 0..10u64 {
            let out = s.step(t, &mut mem);
            if let Some(job) = out.handback.into_iter().find(|j| j.id == JobId(1)) {
                prefill_finish = job.prefill_finish;
                break;
            }
        }
        assert_eq!(prefill_finish, Some(4));
    }

    #[test]
    fn expected_ticks_rounds_up_chunks() {
        assert_eq!(expected_ticks(64, 32, 2), 4);
        assert_eq!(expected_ticks(65, 32, 2), 6);
    }
}
