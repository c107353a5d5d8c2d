//! Shortest-Remaining-Processing-Time scheduling with anti-starvation.

use super::{drain_finished, expected_memory, pick_movable, preempt, run_selected, AddOutcome, LocalScheduler, StepOutput};
use crate::error::SimError;
use crate::ids::JobId;
use crate::job::{Job, JobState};
use crate::memory::Memory;
use std::collections::VecDeque;
use tracing::debug;

/// Anti-starvation controls; both must be set for them to take effect.
#[derive(Debug, Clone, Copy)]
pub struct StarvationControl {
    pub priority_quantum: i64,
    pub starvation_threshold: u64,
}

pub struct Srpt {
    batch: usize,
    run_queue: VecDeque<Job>,
    wait_queue: VecDeque<Job>,
    starvation: Option<StarvationControl>,
}

impl Srpt {
    pub fn new(batch: usize, starvation: Option<StarvationControl>) -> Self {
        Self {
            batch,
            run_queue: VecDeque::new(),
            wait_queue: VecDeque::new(),
            starvation,
        }
    }

    fn pick_next_task(&mut self, memory: &mut Memory) -> Vec<usize> {
        while (expected_memory(&self.run_queue) as f64) < memory.safe_capacity() && !self.wait_queue.is_empty() {
            let job = self.wait_queue.pop_front().unwrap();
            self.run_queue.push_back(job);
        }

        // Priority bit is cleared once its quantum is exhausted, checked at
        // the top of each selection pass.
        for job in self.run_queue.iter_mut() {
            if job.is_priority && job.quantum <= 0 {
                job.is_priority = false;
            }
        }

        let mut order: Vec<usize> = (0..self.run_queue.len()).collect();
        order.sort_by_key(|&i| {
            let j = &self.run_queue[i];
            (!j.is_priority, j.remaining_work())
        });

        let batch = self.batch.min(order.len());
        let selected = &order[..batch];

        for idx in 0..self.run_queue.len() {
            if self.run_queue[idx].current_size > 0 {
                continue;
            }
            if !selected.contains(&idx) {
                continue;
            }
            let need = if self.run_queue[idx].swap_size > 0 {
                self.run_queue[idx].swap_size
            } else {
                self.run_queue[idx].init_size
            };
            while !memory.request(need) {
                let victim = (1..self.run_queue.len())
                    .rev()
                    .find(|&i| i != idx && self.run_queue[i].current_size > 0);
                match victim {
                    Some(v) => {
                        let job = &mut self.run_queue[v];
                        let freed = job.current_size;
                        let _ = memory.release(freed);
                        job.swap_size = freed;
                        job.current_size = 0;
                        debug!(job = %job.id, freed, "swapped out to make room for SRPT pick");
                    }
                    None => break,
                }
            }
        }

        if let Some(ctrl) = self.starvation {
            let now_len = self.run_queue.len();
            for &i in selected {
                if self.run_queue[i].is_priority {
                    self.run_queue[i].quantum -= 1;
                }
            }
            for &i in &order[batch..] {
                self.run_queue[i].starvation_count += 1;
            }
            for i in 0..now_len {
                if self.run_queue[i].starvation_count >= ctrl.starvation_threshold {
                    self.run_queue[i].is_priority = true;
                    self.run_queue[i].starvation_count = 0;
                    self.run_queue[i].quantum = ctrl.priority_quantum;
                }
            }
        }

        selected.to_vec()
    }
}

impl LocalScheduler for Srpt {
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
        Err(SimError::Invariant(format!("{id} not in SRPT queues")))
    }

    fn step(&mut self, now: u64, memory: &mut Memory) -> StepOutput {
        let finished = drain_finished(&mut self.run_queue, memory);
        if self.run_queue.is_empty() {
            return StepOutput { finished, ..Default::default() };
        }
        let picked = self.pick_next_task(memory);
        let executed = run_selected(&mut self.run_queue, &picked, now, memory);
        for &idx in &picked {
            if let Some(job) = self.run_queue.get_mut(idx) {
                job.last_scheduled = Some(now);
            }
        }
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
    fn shorter_job_preempts_selection_order() {
        let mut s = Srpt::new(1, None);
        let mem = Memory::new(1000, 1.0);
        s.add_job(Job::new(JobId(1), 0, 0, 100), 0, &mem);
        s.add_job(Job::new(JobId(2), 1, 0, 2), 1, &mem);

        let mut mem = mem;
        // first tick: only job 1 exists and runs.
        let out0 = s.step(0, &mut mem);
        assert_eq!(out0.executed, vec![JobId(1)]);
        // from t=1 on, job 2 (shorter remaining work) should win selection.
        let out1 = s.step(1, &mut mem);
        assert_eq!(out1.executed, vec![JobId(2)]);
    }

    #[test]
    fn starvation_grants_priority_after_threshold() {
        let ctrl = StarvationControl { priority_quantum: 1, starvation_threshold: 3 };
        let mut s = Srpt::new(1, Some(ctrl));
        let mem = Memory::new(1000, 1.0);
        s.add_job(Job::new(JobId(1), 0, 0, 100), 0, &mem);
        s.add_job(Job::new(JobId(2), 0, 0, 2), 0, &mem);
        let mut mem = mem;
        for t in 0..4u64 {
            s.step(t, &mut mem);
        }
        assert!(s.run_queue.iter().find(|j| j.id == JobId(1)).unwrap().is_priority);
    }
}
