//! Role-aware dispatch, proactive load balancing, and the pending job queue.

use crate::device::{Device, DeviceTag};
use crate::ids::DeviceId;
use crate::job::{Job, JobState};
use crate::scheduler::AddOutcome;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{info, instrument, warn};

/// Constants behind the workload saturation metric, exposed so a config
/// can retune them instead of them being baked-in magic numbers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkloadWeights {
    pub jobs_weight: f64,
    pub memory_weight: f64,
    pub load_balance_ratio: f64,
    pub busy_threshold: f64,
}

impl Default for WorkloadWeights {
    fn default() -> Self {
        Self {
            jobs_weight: 0.02,
            memory_weight: 1.0,
            load_balance_ratio: 1.2,
            busy_threshold: 1.5,
        }
    }
}

pub struct GlobalScheduler {
    pending: VecDeque<Job>,
    visible: Vec<DeviceId>,
    dispatch_counts: HashMap<DeviceId, u64>,
    pub perform_load_balance: bool,
    pub weights: WorkloadWeights,
}

impl GlobalScheduler {
    pub fn new(device_ids: impl IntoIterator<Item = DeviceId>, perform_load_balance: bool, weights: WorkloadWeights) -> Self {
        Self {
            pending: VecDeque::new(),
            visible: device_ids.into_iter().collect(),
            dispatch_counts: HashMap::new(),
            perform_load_balance,
            weights,
        }
    }

    pub fn receive_job(&mut self, job: Job) {
        self.pending.push_back(job);
    }

    pub fn add_device(&mut self, id: DeviceId) {
        if !self.visible.contains(&id) {
            self.visible.push(id);
        }
    }

    pub fn remove_device(&mut self, id: DeviceId) {
        self.visible.retain(|d| *d != id);
    }

    pub fn dispatch_count(&self, id: DeviceId) -> u64 {
        self.dispatch_counts.get(&id).copied().unwrap_or(0)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn capable_devices_sorted(&self, devices: &[Device], job: &Job) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self
            .visible
            .iter()
            .copied()
            .filter(|id| devices[id.0].job_state_supported(job))
            .collect();
        ids.sort_by(|a, b| {
            devices[a.0]
                .workload(&self.weights)
                .partial_cmp(&devices[b.0].workload(&self.weights))
                .unwrap()
        });
        ids
    }

    #[instrument(skip(self, devices))]
    fn dispatch_job(&mut self, devices: &mut [Device], mut job: Job, now: u64) -> Result<(), Job> {
        let candidates = self.capable_devices_sorted(devices, &job);
        for id in candidates {
            match devices[id.0].add_job(job, now) {
                AddOutcome::Accepted => {
                    *self.dispatch_counts.entry(id).or_insert(0) += 1;
                    return Ok(());
                }
                AddOutcome::Rejected(returned) => job = returned,
            }
        }
        warn!(job = %job.id, "no capable device accepted job, leaving in queue");
        Err(job)
    }

    /// One tick: optionally load-balance, then try to dispatch every
    /// pending job (in FIFO snapshot order) once.
    pub fn step(&mut self, devices: &mut [Device], now: u64) {
        if self.perform_load_balance {
            self.proactively_load_balance(devices, now);
        }

        let snapshot: Vec<Job> = self.pending.drain(..).collect();
        for job in snapshot {
            if let Err(rejected) = self.dispatch_job(devices, job, now) {
                self.pending.push_back(rejected);
            }
        }
    }

    /// Two passes per tick: prefill-capable pool over `[Initial, Prefill]`,
    /// decode-capable pool over `[Decode]`. Both passes make at most one
    /// move — the two original passes differed here, and this unifies
    /// them rather than letting one of them drain an entire pool in a
    /// single tick.
    fn proactively_load_balance(&mut self, devices: &mut [Device], now: u64) {
        self.load_balance_pass(devices, now, &[JobState::Initial, JobState::Prefill], |d| {
            matches!(d.tag, DeviceTag::Prefill | DeviceTag::Mixed)
        });
        self.load_balance_pass(devices, now, &[JobState::Decode], |d| {
            matches!(d.tag, DeviceTag::Decode | DeviceTag::Mixed)
        });
    }

    fn load_balance_pass(&mut self, devices: &mut [Device], now: u64, stages: &[JobState], in_pool: impl Fn(&Device) -> bool) {
        let pool: Vec<DeviceId> = self.visible.iter().copied().filter(|id| in_pool(&devices[id.0])).collect();
        if pool.len() < 2 {
            return;
        }

        let light = *pool
            .iter()
            .min_by(|a, b| devices[a.0].workload(&self.weights).partial_cmp(&devices[b.0].workload(&self.weights)).unwrap())
            .unwrap();
        let light_workload = devices[light.0].workload(&self.weights);

        let mut heavy_sorted = pool.clone();
        heavy_sorted
            .sort_by(|a, b| devices[b.0].workload(&self.weights).partial_cmp(&devices[a.0].workload(&self.weights)).unwrap());

        for heavy in heavy_sorted {
            if heavy == light {
                continue;
            }
            let heavy_workload = devices[heavy.0].workload(&self.weights);
            if heavy_workload <= self.weights.load_balance_ratio * light_workload {
                continue;
            }
            let heavy_device = &mut devices[heavy.0];
            let Some(job_id) = heavy_device.scheduler.pick_movable_job(stages) else {
                continue;
            };
            let Some(job) = heavy_device.scheduler.preempt_job(job_id, &mut heavy_device.memory) else {
                continue;
            };
            match devices[light.0].add_job(job, now) {
                AddOutcome::Accepted => {
                    info!(from = %heavy, to = %light, "load balance move");
                }
                AddOutcome::Rejected(job) => {
                    // Re-queue rather than lose the job.
                    self.pending.push_back(job);
                }
            }
            return;
        }
    }

    pub fn all_devices_busy(&self, devices: &[Device]) -> bool {
        self.visible.iter().all(|id| devices[id.0].workload(&self.weights) > self.weights.busy_threshold)
    }

    pub fn visible_devices(&self) -> &[DeviceId] {
        &self.visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::JobId;
    use crate::job::Job;
    use crate::memory::Memory;
    use crate::scheduler::fcfs::Fcfs;

    fn dev(name: &str, tag: DeviceTag) -> Device {
        Device::new(name, tag, Memory::new(100, 1.0), Box::new(Fcfs::new(1)))
    }

    #[test]
    fn dispatch_picks_lightest_capable_device() {
        let mut devices = vec![dev("d0", DeviceTag::Mixed), dev("d1", DeviceTag::Mixed)];
        devices[0].scheduler.add_job(Job::new(JobId(99), 0, 5, 5), 0, &devices[0].memory);

        let mut gs = GlobalScheduler::new([DeviceId(0), DeviceId(1)], false, WorkloadWeights::default());
        gs.receive_job(Job::new(JobId(1), 0, 10, 5));
        gs.step(&mut devices, 0);

        assert_eq!(gs.dispatch_count(DeviceId(1)), 1);
        assert_eq!(gs.dispatch_count(DeviceId(0)), 0);
    }

    #[test]
    fn unroutable_job_stays_pending() {
        let mut devices = vec![dev("d0", DeviceTag::Decode)];
        let mut gs = GlobalScheduler::new([DeviceId(0)], false, WorkloadWeights::default());
        gs.receive_job(Job::new(JobId(1), 0, 10, 5)); // Initial job, no prefill/mixed device
        gs.step(&mut devices, 0);
        assert_eq!(gs.pending_len(), 1);
    }

    #[test]
    fn all_devices_busy_uses_threshold() {
        let devices = vec![dev("d0", DeviceTag::Mixed)];
        let gs = GlobalScheduler::new([DeviceId(0)], false, WorkloadWeights::default());
        assert!(!gs.all_devices_busy(&devices));
    }
}
