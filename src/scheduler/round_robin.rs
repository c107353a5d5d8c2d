//! Round-Robin local scheduling with admission, swap, and time-sliced rotation.

use super::{drain_finished, expected_memory, pick_movable, preempt, run_selected, AddOutcome, LocalScheduler, StepOutput};
use crate::error::SimError;
use crate::ids::JobId;
use crate::job::{Job, JobState};
use crate::memory::Memory;
use std::collections::VecDeque;
use tracing::debug;

pub struct RoundRobin {
    batch: usize,
    time_slice: u64,
    run_queue: VecDeque<Job>,
    wait_queue: VecDeque<Job>,
}

impl RoundRobin {
    pub fn new(batch: usize, time_slice: u64) -> Self {
        Self {
            batch,
            time_slice,
            run_queue: VecDeque::new(),
            wait_queue: VecDeque::new(),
        }
    }

    /// Promote wait_queue entries to the run queue while there is room,
    /// then pick the first `batch` jobs and ensure each has memory (or
    /// evict the run queue's tail resident job to make room).
    fn pick_next_task(&mut self, memory: &mut Memory) -> Vec<usize> {
        while (expected_memory(&self.run_queue) as f64) < memory.safe_capacity() && !self.wait_queue.is_empty() {
            let job = self.wait_queue.pop_front().unwrap();
            self.run_queue.push_back(job);
        }

        let n = self.batch.min(self.run_queue.len());
        for idx in 0..n {
            if self.run_queue[idx].current_size > 0 {
                continue;
            }
            let need = if self.run_queue[idx].swap_size > 0 {
                self.run_queue[idx].swap_size
            } else {
                self.run_queue[idx].init_size
            };
            while !memory.request(need) {
                // Evict the last resident job (never index 0, never a
                // job we've already selected for this tick).
                let victim = (self.run_queue.len() - 1..=idx.max(1)).rev().find(|&i| self.run_queue[i].current_size > 0);
                match victim {
                    Some(v) => {
                        let job = &mut self.run_queue[v];
                        let freed = job.current_size;
                        let _ = memory.release(freed);
                        job.swap_size = freed;
                        job.current_size = 0;
                        debug!(job = %job.id, freed, "swapped out for admission");
                    }
                    None => break,
                }
            }
        }

        let picked: Vec<usize> = (0..n).collect();
        picked
    }

    fn rotate(&mut self, now: u64) {
        if self.time_slice > 0 && now % self.time_slice == 0 && !self.run_queue.is_empty() {
            let job = self.run_queue.pop_front().unwrap();
            self.run_queue.push_back(job);
        }
    }
}

impl LocalScheduler for RoundRobin {
    fn add_job(&mut self, mut job: Job, _now: u64, memory: &Memory) -> AddOutcome {
        job.state = JobState::Decode;
        if job.init_size as f64 <= memory.safe_capacity() - expected_memory(&self.run_queue) as f64 {
            self.run_queue.push_back(job);
        } else {
            self.wait_queue.push_back(job);
        }
        AddOutcome::Accepted
    }

    fn remove_job(&mut self, id: JobId) -> Result<Job, SimError> {
        if let Some(idx) = self.run_queue.iter().position(|j| j.id == id) {
            return Ok(self.run_queue.remove(idx).unwrap());
        }
        if let Some(idx) = self.wait_queue.iter().position(|j| j.id == id) {
            return Ok(self.wait_queue.remove(idx).unwrap());
        }
        Err(SimError::Invariant(format!("{id} not in RR queues")))
    }

    fn step(&mut self, now: u64, memory: &mut Memory) -> StepOutput {
        let finished = drain_finished(&mut self.run_queue, memory);
        if self.run_queue.is_empty() {
            return StepOutput { finished, ..Default::default() };
        }
        let picked = self.pick_next_task(memory);
        let executed = run_selected(&mut self.run_queue, &picked, now, memory);
        self.rotate(now);
        StepOutput { executed, finished, handback: Vec::new() }
    }

    fn pick_movable_job(&self, stages: &[JobState]) -> Option<JobId> {
        pick_movable(&self.run_queue, self.batch, stages)
    }

    fn preempt_job(&mut self, id: JobId, memory: &mut Memory) -> Option<Job> {
        preempt(&mut self.run_queue, id, memory)
    }

    fn num_jobs(&self) -> usize {
        self.run_queue.len() + self.wait_queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::JobId;

    #[test]
    fn rotation_happens_once_per_slice_boundary() {
        let mut s = RoundRobin::new(1, 2);
        let mut mem = Memory::new(100, 1.0);
        s.add_job(Job::new(JobId(1), 0, 5, 4), 0, &mem);
        s.add_job(Job::new(JobId(2), 0, 5, 4), 0, &mem);

        let mut starts = Vec::new();
        for t in 0..10u64 {
            let out = s.step(t, &mut mem);
            for id in out.executed {
                if starts.len() < 2 && !starts.contains(&id) {
                    starts.push(id);
                }
            }
        }
        // both jobs eventually get a turn, and rotation is visible in the
        // order they're first picked (job 1 at t=0, job 2 after rotation).
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[0], JobId(1));
    }

    #[test]
    fn oversized_job_waits_in_wait_queue() {
        let mut s = RoundRobin::new(1, 5);
        let mem = Memory::new(10, 1.0);
        s.add_job(Job::new(JobId(1), 0, 20, 5), 0, &mem);
        assert_eq!(s.num_jobs(), 1);
        assert!(s.run_queue.is_empty());
    }
}
