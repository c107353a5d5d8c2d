//! Declarative run configuration, deserialized from YAML or JSON and
//! validated once at load time.

use crate::device::{Device, DeviceTag};
use crate::error::SimError;
use crate::global_scheduler::WorkloadWeights;
use crate::memory::Memory;
use crate::scheduler::fcfs::Fcfs;
use crate::scheduler::hybrid::Hybrid;
use crate::scheduler::prefill::{FcfsPrefill, RrPrefill};
use crate::scheduler::round_robin::RoundRobin;
use crate::scheduler::srpt::{Srpt, StarvationControl};
use crate::scheduler::LocalScheduler;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(tag = "kind")]
pub enum SchedulerConfig {
    Fcfs { batch: usize },
    RoundRobin { batch: usize, time_slice: u64 },
    Srpt { batch: usize, priority_quantum: Option<i64>, starvation_threshold: Option<u64> },
    FcfsPrefill { chunk_size: u64, chunk_time: u64 },
    RrPrefill { chunk_size: u64, chunk_time: u64 },
    Hybrid { chunk_size: u64, chunk_time: u64, collocate_threshold: usize, time_slice: u64 },
}

impl SchedulerConfig {
    fn build(&self) -> Box<dyn LocalScheduler> {
        match *self {
            SchedulerConfig::Fcfs { batch } => Box::new(Fcfs::new(batch)),
            SchedulerConfig::RoundRobin { batch, time_slice } => Box::new(RoundRobin::new(batch, time_slice)),
            SchedulerConfig::Srpt { batch, priority_quantum, starvation_threshold } => {
                let starvation = match (priority_quantum, starvation_threshold) {
                    (Some(priority_quantum), Some(starvation_threshold)) => {
                        Some(StarvationControl { priority_quantum, starvation_threshold })
                    }
                    _ => None,
                };
                Box::new(Srpt::new(batch, starvation))
            }
            SchedulerConfig::FcfsPrefill { chunk_size, chunk_time } => Box::new(FcfsPrefill::new(chunk_size, chunk_time)),
            SchedulerConfig::RrPrefill { chunk_size, chunk_time } => Box::new(RrPrefill::new(chunk_size, chunk_time)),
            SchedulerConfig::Hybrid { chunk_size, chunk_time, collocate_threshold, time_slice } => {
                Box::new(Hybrid::new(chunk_size, chunk_time, collocate_threshold, time_slice))
            }
        }
    }

    fn validate(&self, name: &str) -> Result<(), SimError> {
        let batch_ok = match *self {
            SchedulerConfig::Fcfs { batch } => batch > 0,
            SchedulerConfig::RoundRobin { batch, .. } => batch > 0,
            SchedulerConfig::Srpt { batch, .. } => batch > 0,
            SchedulerConfig::FcfsPrefill { chunk_size, chunk_time } => chunk_size > 0 && chunk_time > 0,
            SchedulerConfig::RrPrefill { chunk_size, chunk_time } => chunk_size > 0 && chunk_time > 0,
            SchedulerConfig::Hybrid { chunk_size, chunk_time, collocate_threshold, .. } => {
                chunk_size > 0 && chunk_time > 0 && collocate_threshold > 0
            }
        };
        if !batch_ok {
            return Err(SimError::Config(format!("device '{name}': batch/chunk parameters must be positive")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    pub name: String,
    pub tag: DeviceTag,
    pub capacity: u64,
    pub threshold: f64,
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub start_offline: bool,
}

impl DeviceConfig {
    fn validate(&self) -> Result<(), SimError> {
        if self.capacity == 0 {
            return Err(SimError::Config(format!("device '{}': capacity must be positive", self.name)));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(SimError::Config(format!("device '{}': threshold must be in [0,1]", self.name)));
        }
        self.scheduler.validate(&self.name)
    }

    pub fn build(&self) -> Device {
        Device::new(self.name.clone(), self.tag, Memory::new(self.capacity, self.threshold), self.scheduler.build())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind")]
pub enum GeneratorConfig {
    Random {
        speed: f64,
        total_limit: u64,
        #[serde(default)]
        dropout: f64,
        init_size_mean: f64,
        init_size_std: f64,
        output_size_mean: f64,
        output_size_std: f64,
    },
    Csv {
        speed: f64,
        total_limit: u64,
        #[serde(default)]
        dropout: f64,
        traces: Vec<CsvTraceConfig>,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CsvTraceConfig {
    pub nickname: String,
    pub file_path: String,
    pub fraction: f64,
}

impl GeneratorConfig {
    fn validate(&self) -> Result<(), SimError> {
        match self {
            GeneratorConfig::Random { speed, total_limit, dropout, .. } => {
                if *speed <= 0.0 || *total_limit == 0 || !(0.0..1.0).contains(dropout) {
                    return Err(SimError::Config("random generator: speed/total_limit/dropout out of range".into()));
                }
            }
            GeneratorConfig::Csv { speed, total_limit, dropout, traces, .. } => {
                if *speed <= 0.0 || *total_limit == 0 || !(0.0..1.0).contains(dropout) {
                    return Err(SimError::Config("csv generator: speed/total_limit/dropout out of range".into()));
                }
                if traces.is_empty() {
                    return Err(SimError::Config("csv generator: at least one trace is required".into()));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AllocatorConfig {
    /// `< 0` disables the allocator.
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold: i64,
}

fn default_idle_threshold() -> i64 {
    -1
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self { idle_threshold: default_idle_threshold() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulatorConfig {
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub perform_load_balance: bool,
    #[serde(default)]
    pub allocator: AllocatorConfig,
    #[serde(default)]
    pub workload_weights: WorkloadWeights,
    pub generator: GeneratorConfig,
    pub max_time: u64,
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        if self.devices.is_empty() {
            return Err(SimError::Config("at least one device is required".into()));
        }
        for device in &self.devices {
            device.validate()?;
        }
        self.generator.validate()?;
        if self.max_time == 0 {
            return Err(SimError::Config("max_time must be positive".into()));
        }
        let has_prefill_capable = self.devices.iter().any(|d| matches!(d.tag, DeviceTag::Prefill | DeviceTag::Mixed));
        let has_decode_capable = self.devices.iter().any(|d| matches!(d.tag, DeviceTag::Decode | DeviceTag::Mixed));
        if !has_prefill_capable || !has_decode_capable {
            return Err(SimError::Config(
                "fleet must contain at least one prefill-capable and one decode-capable device".into(),
            ));
        }
        Ok(())
    }

    pub fn from_yaml(s: &str) -> Result<Self, SimError> {
        let cfg: SimulatorConfig = serde_yaml::from_str(s).map_err(|e| SimError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json(s: &str) -> Result<Self, SimError> {
        let cfg: SimulatorConfig = serde_json::from_str(s).map_err(|e| SimError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
max_time: 100
devices:
  - name: d0
    tag: Mixed
    capacity: 1000
    threshold: 0.9
    scheduler:
      kind: Fcfs
      batch: 4
generator:
  kind: Random
  speed: 1.0
  total_limit: 10
  init_size_mean: 512.0
  init_size_std: 10.0
  output_size_mean: 64.0
  output_size_std: 5.0
"#
    }

    #[test]
    fn parses_minimal_config() {
        let cfg = SimulatorConfig::from_yaml(minimal_yaml()).unwrap();
        assert_eq!(cfg.devices.len(), 1);
    }

    #[test]
    fn rejects_fleet_with_no_decode_capable_device() {
        let yaml = minimal_yaml().replace("tag: Mixed", "tag: Prefill");
        assert!(SimulatorConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn rejects_zero_batch() {
        let yaml = minimal_yaml().replace("batch: 4", "batch: 0");
        assert!(SimulatorConfig::from_yaml(&yaml).is_err());
    }
}
