//! First-Come-First-Served local scheduling.

use super::{drain_finished, pick_movable, preempt, run_selected, AddOutcome, LocalScheduler, StepOutput};
use crate::error::SimError;
use crate::ids::JobId;
use crate::job::{Job, JobState};
use crate::memory::Memory;
use std::collections::VecDeque;

/// Scans the queue head and selects up to `batch` jobs whose memory need
/// fits into what's available; stops (does not skip past) the first job
/// that does not fit — FCFS is strict about queue order.
pub struct Fcfs {
    batch: usize,
    run_queue: VecDeque<Job>,
}

impl Fcfs {
    pub fn new(batch: usize) -> Self {
        Self { batch, run_queue: VecDeque::new() }
    }

    fn pick_next_task(&self, memory: &Memory) -> Vec<usize> {
        let mut chosen = Vec::new();
        let mut available = memory.available() as i64;
        for i in 0..self.batch.min(self.run_queue.len()) {
            let job = &self.run_queue[i];
            if job.current_size > 0 {
                chosen.push(i);
                available -= 1;
            } else if available > job.init_size as i64 {
                available -= job.init_size as i64;
                chosen.push(i);
            } else {
                break;
            }
        }
        chosen
    }
}

impl LocalScheduler for Fcfs {
    fn add_job(&mut self, mut job: Job, _now: u64, _memory: &Memory) -> AddOutcome {
        job.state = JobState::Decode;
        self.run_queue.push_back(job);
        AddOutcome::Accepted
    }

    fn remove_job(&mut self, id: JobId) -> Result<Job, SimError> {
        let idx = self
            .run_queue
            .iter()
            .position(|j| j.id == id)
            .ok_or_else(|| SimError::Invariant(format!("{id} not in FCFS run queue")))?;
        Ok(self.run_queue.remove(idx).unwrap())
    }

    fn step(&mut self, now: u64, memory: &mut Memory) -> StepOutput {
        let finished = drain_finished(&mut self.run_queue, memory);
        if self.run_queue.is_empty() {
            return StepOutput { finished, ..Default::default() };
        }
        let picked = self.pick_next_task(memory);
        let executed = run_selected(&mut self.run_queue, &picked, now, memory);
        StepOutput { executed, finished, handback: Vec::new() }
    }

    fn pick_movable_job(&self, stages: &[JobState]) -> Option<JobId> {
        pick_movable(&self.run_queue, self.batch, stages)
    }

    fn preempt_job(&mut self, id: JobId, memory: &mut Memory) -> Option<Job> {
        preempt(&mut self.run_queue, id, memory)
    }

    fn num_jobs(&self) -> usize {
        self.run_queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::JobId;

    #[test]
    fn stops_at_first_job_that_does_not_fit() {
        let mut s = Fcfs::new(3);
        let mut mem = Memory::new(12, 1.0);
        s.add_job(Job::new(JobId(1), 0, 10, 5), 0, &mem);
        s.add_job(Job::new(JobId(2), 0, 10, 5), 0, &mem);
        let out = s.step(0, &mut mem);
        // job 1 takes init(10)+1 = 11, leaving 1 token; job 2 needs >10 to fit, so it stops.
        assert_eq!(out.executed, vec![JobId(1)]);
    }

    #[test]
    fn single_job_scenario_one() {
        // Single MIXED device, FCFS{batch=1}, capacity=100, threshold=1.0;
        // job (init=10, out=5) arriving at t=0.
        let mut s = Fcfs::new(1);
        let mut mem = Memory::new(100, 1.0);
        s.add_job(Job::new(JobId(1), 0, 10, 5), 0, &mem);
        let mut decode_start = None;
        let mut decode_finish = None;
        for t in 0..20u64 {
            let out = s.step(t, &mut mem);
            if decode_start.is_none() {
                if let Some(j) = out.executed.first() {
                    if *j == JobId(1) {
                        decode_start = Some(t);
                    }
                }
            }
            if let Some(j) = out.finished.into_iter().find(|j| j.id == JobId(1)) {
                decode_finish = j.decode_finish;
                break;
            }
        }
        assert_eq!(decode_start, Some(0));
        // init_size(10) is bulk-allocated on the same tick decode_start is
        // recorded, so only `expected_output` (5) further 1-token advances
        // are needed to reach final_size=15; decode_finish lands at t=4.
        assert_eq!(decode_finish, Some(4));
    }
}
