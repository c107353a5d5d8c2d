//! Idle-driven offline / saturation-driven online device control loop.

use crate::device::{Device, DeviceTag};
use crate::global_scheduler::GlobalScheduler;
use crate::ids::DeviceId;
use std::collections::HashMap;
use tracing::info;

/// Per-tick idle/online/offline control loop.
///
/// `idle_threshold < 0` disables the allocator entirely (no device is ever
/// offlined or onlined).
pub struct Allocator {
    idle_threshold: i64,
    online: Vec<DeviceId>,
    offline: Vec<DeviceId>,
    idle_counter: HashMap<DeviceId, u64>,
    on_duty_counter: HashMap<DeviceId, u64>,
    tag_online_counts: HashMap<DeviceTag, u64>,
}

impl Allocator {
    pub fn new(idle_threshold: i64, initial_online: Vec<DeviceId>, devices: &[Device]) -> Self {
        let mut tag_online_counts = HashMap::new();
        for &id in &initial_online {
            *tag_online_counts.entry(devices[id.0].tag).or_insert(0) += 1;
        }
        Self {
            idle_threshold,
            online: initial_online,
            offline: Vec::new(),
            idle_counter: HashMap::new(),
            on_duty_counter: HashMap::new(),
            tag_online_counts,
        }
    }

    pub fn online_devices(&self) -> &[DeviceId] {
        &self.online
    }

    pub fn offline_devices(&self) -> &[DeviceId] {
        &self.offline
    }

    pub fn all_devices(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.online.iter().copied().chain(self.offline.iter().copied())
    }

    pub fn on_duty_ticks(&self, id: DeviceId) -> u64 {
        self.on_duty_counter.get(&id).copied().unwrap_or(0)
    }

    /// Preserves at least one prefill-capable and one decode-capable
    /// device online; MIXED devices must satisfy both counts since they
    /// cover both roles.
    fn okay_to_offline(&self, tag: DeviceTag) -> bool {
        let prefill_online = self.tag_online_counts.get(&DeviceTag::Prefill).copied().unwrap_or(0)
            + self.tag_online_counts.get(&DeviceTag::Mixed).copied().unwrap_or(0);
        let decode_online = self.tag_online_counts.get(&DeviceTag::Decode).copied().unwrap_or(0)
            + self.tag_online_counts.get(&DeviceTag::Mixed).copied().unwrap_or(0);
        match tag {
            DeviceTag::Prefill => prefill_online >= 2,
            DeviceTag::Decode => decode_online >= 2,
            DeviceTag::Mixed => prefill_online >= 2 && decode_online >= 2,
        }
    }

    pub fn step(&mut self, devices: &mut [Device], global: &mut GlobalScheduler, weights: &crate::global_scheduler::WorkloadWeights) {
        if self.idle_threshold < 0 {
            return;
        }

        let mut to_offline = Vec::new();
        for &id in &self.online {
            *self.on_duty_counter.entry(id).or_insert(0) += 1;

            let device = &devices[id.0];
            if device.is_warming_up() {
                continue;
            }

            let workload = device.workload(weights);
            if workload < 1e-6 {
                let counter = self.idle_counter.entry(id).or_insert(0);
                *counter += 1;
                if *counter as i64 >= self.idle_threshold && self.okay_to_offline(device.tag) {
                    to_offline.push(id);
                }
            } else {
                self.idle_counter.insert(id, 0);
            }
        }

        for id in to_offline {
            self.offline_device(id, devices, global);
        }

        if global.all_devices_busy(devices) && !self.offline.is_empty() {
            let id = self.offline[0];
            self.online_device(id, devices, global);
        }
    }

    fn offline_device(&mut self, id: DeviceId, devices: &[Device], global: &mut GlobalScheduler) {
        self.online.retain(|d| *d != id);
        self.offline.push(id);
        let tag = devices[id.0].tag;
        if let Some(c) = self.tag_online_counts.get_mut(&tag) {
            *c = c.saturating_sub(1);
        }
        self.idle_counter.insert(id, 0);
        global.remove_device(id);
        info!(device = %id, "offlined");
    }

    fn online_device(&mut self, id: DeviceId, devices: &mut [Device], global: &mut GlobalScheduler) {
        self.offline.retain(|d| *d != id);
        self.online.push(id);
        let tag = devices[id.0].tag;
        *self.tag_online_counts.entry(tag).or_insert(0) += 1;
        self.idle_counter.insert(id, 0);
        devices[id.0].warm_up();
        global.add_device(id);
        info!(device = %id, "onlined, warming up");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::global_scheduler::WorkloadWeights;
    use crate::memory::Memory;
    use crate::scheduler::fcfs::Fcfs;

    fn dev(tag: DeviceTag) -> Device {
        Device::new("d", tag, Memory::new(100, 1.0), Box::new(Fcfs::new(1)))
    }

    #[test]
    fn mixed_with_two_online_allows_offlining_one() {
        let devices = vec![dev(DeviceTag::Mixed), dev(DeviceTag::Mixed)];
        let alloc = Allocator::new(3, vec![DeviceId(0), DeviceId(1)], &devices);
        assert!(alloc.okay_to_offline(DeviceTag::Mixed));
    }

    #[test]
    fn mixed_with_one_online_refuses_offlining() {
        let devices = vec![dev(DeviceTag::Mixed)];
        let alloc = Allocator::new(3, vec![DeviceId(0)], &devices);
        assert!(!alloc.okay_to_offline(DeviceTag::Mixed));
    }

    #[test]
    fn disabled_allocator_does_nothing() {
        let mut devices = vec![dev(DeviceTag::Mixed), dev(DeviceTag::Mixed)];
        let mut alloc = Allocator::new(-1, vec![DeviceId(0), DeviceId(1)], &devices);
        let mut gs = GlobalScheduler::new([DeviceId(0), DeviceId(1)], false, WorkloadWeights::default());
        alloc.step(&mut devices, &mut gs, &WorkloadWeights::default());
        assert_eq!(alloc.online_devices().len(), 2);
        assert!(alloc.offline_devices().is_empty());
    }
}
