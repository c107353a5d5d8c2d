//! A device binds memory, a local scheduler, and a role tag, with a
//! warm-up gate at online time.

use crate::job::{Job, JobState};
use crate::memory::Memory;
use crate::scheduler::{AddOutcome, LocalScheduler, StepOutput};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const WARM_UP_TIME: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceTag {
    Prefill,
    Decode,
    Mixed,
}

pub struct Device {
    pub name: String,
    pub tag: DeviceTag,
    pub memory: Memory,
    pub scheduler: Box<dyn LocalScheduler>,
    pub warm_up_remaining: u64,
}

impl Device {
    pub fn new(name: impl Into<String>, tag: DeviceTag, memory: Memory, scheduler: Box<dyn LocalScheduler>) -> Self {
        Self { name: name.into(), tag, memory, scheduler, warm_up_remaining: 0 }
    }

    pub fn is_warming_up(&self) -> bool {
        self.warm_up_remaining > 0
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.num_jobs() == 0
    }

    pub fn job_state_supported(&self, job: &Job) -> bool {
        match self.tag {
            DeviceTag::Prefill => matches!(job.state, JobState::Prefill | JobState::Initial),
            DeviceTag::Decode => matches!(job.state, JobState::Decode),
            DeviceTag::Mixed => true,
        }
    }

    pub fn add_job(&mut self, job: Job, now: u64) -> AddOutcome {
        if self.is_warming_up() {
            return AddOutcome::Rejected(job);
        }
        if !self.job_state_supported(&job) {
            return AddOutcome::Rejected(job);
        }
        self.scheduler.add_job(job, now, &self.memory)
    }

    pub fn step(&mut self, now: u64) -> StepOutput {
        if self.is_warming_up() {
            debug!(device = %self.name, remaining = self.warm_up_remaining, "warming up");
            self.warm_up_remaining -= 1;
            return StepOutput::default();
        }
        self.scheduler.step(now, &mut self.memory)
    }

    /// Dimensionless saturation score used for dispatch ordering. Lower is
    /// better.
    pub fn workload(&self, weights: &crate::global_scheduler::WorkloadWeights) -> f64 {
        weights.jobs_weight * self.scheduler.num_jobs() as f64
            + weights.memory_weight * (self.memory.occupied() as f64 / self.memory.safe_capacity())
    }

    pub fn warm_up(&mut self) {
        self.warm_up_remaining = WARM_UP_TIME;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::JobId;
    use crate::scheduler::fcfs::Fcfs;

    fn device(tag: DeviceTag) -> Device {
        Device::new("d0", tag, Memory::new(100, 1.0), Box::new(Fcfs::new(1)))
    }

    #[test]
    fn warm_up_blocks_admission_and_stepping() {
        let mut d = device(DeviceTag::Mixed);
        d.warm_up();
        assert!(d.is_warming_up());
        let outcome = d.add_job(Job::new(JobId(1), 0, 10, 5), 0);
        assert!(matches!(outcome, AddOutcome::Rejected(_)));
        let out = d.step(0);
        assert!(out.executed.is_empty());
        assert_eq!(d.warm_up_remaining, WARM_UP_TIME - 1);
    }

    #[test]
    fn decode_device_rejects_initial_job() {
        let mut d = device(DeviceTag::Decode);
        let outcome = d.add_job(Job::new(JobId(1), 0, 10, 5), 0);
        assert!(matches!(outcome, AddOutcome::Rejected(_)));
    }
}
