//! The discrete-tick driver loop: generate, dispatch, step every device,
//! run the allocator, advance the clock.

use crate::allocator::Allocator;
use crate::config::{GeneratorConfig, SimulatorConfig};
use crate::device::Device;
use crate::error::SimError;
use crate::generator::csv::{CsvGenerator, TraceRow};
use crate::generator::random::RandomGenerator;
use crate::generator::Generator;
use crate::global_scheduler::GlobalScheduler;
use crate::ids::DeviceId;
use crate::job::Job;
use rand_distr::Normal;
use std::fs;
use tracing::{info, instrument};

enum AnyGenerator {
    Random(RandomGenerator<Normal<f64>, Normal<f64>>),
    Csv(CsvGenerator),
}

impl AnyGenerator {
    fn generate(&mut self, now: u64, global: &mut GlobalScheduler, rng: &mut impl rand::Rng) -> u64 {
        match self {
            AnyGenerator::Random(g) => g.generate_jobs(now, global, rng),
            AnyGenerator::Csv(g) => g.generate_jobs(now, global, rng),
        }
    }

    fn is_finished(&self) -> bool {
        match self {
            AnyGenerator::Random(g) => g.is_finished(),
            AnyGenerator::Csv(g) => g.is_finished(),
        }
    }
}

fn build_generator(cfg: &GeneratorConfig) -> Result<AnyGenerator, SimError> {
    match cfg {
        GeneratorConfig::Random { speed, total_limit, dropout, init_size_mean, init_size_std, output_size_mean, output_size_std } => {
            let init_dist = Normal::new(*init_size_mean, *init_size_std)
                .map_err(|e| SimError::Config(format!("invalid init-size distribution: {e}")))?;
            let output_dist = Normal::new(*output_size_mean, *output_size_std)
                .map_err(|e| SimError::Config(format!("invalid output-size distribution: {e}")))?;
            Ok(AnyGenerator::Random(RandomGenerator::new(*speed, *total_limit, *dropout, init_dist, output_dist)))
        }
        GeneratorConfig::Csv { speed, total_limit, dropout, traces } => {
            let traces: Vec<(String, String, f64)> =
                traces.iter().map(|t| (t.nickname.clone(), t.file_path.clone(), t.fraction)).collect();
            let gen = CsvGenerator::new(*speed, *total_limit, *dropout, traces, |path| {
                let mut reader = csv::Reader::from_path(path)?;
                let mut rows: Vec<TraceRow> = Vec::new();
                for record in reader.deserialize() {
                    rows.push(record?);
                }
                Ok(rows)
            })?;
            Ok(AnyGenerator::Csv(gen))
        }
    }
}

/// Owns the whole fleet and runs it tick by tick to completion.
pub struct Simulator {
    devices: Vec<Device>,
    global: GlobalScheduler,
    allocator: Allocator,
    generator: AnyGenerator,
    max_time: u64,
    now: u64,
    pub finished: Vec<Job>,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Result<Self, SimError> {
        config.validate()?;
        let devices: Vec<Device> = config.devices.iter().map(|d| d.build()).collect();
        let all_ids: Vec<DeviceId> = (0..devices.len()).map(DeviceId).collect();
        let online_ids: Vec<DeviceId> = config
            .devices
            .iter()
            .enumerate()
            .filter(|(_, d)| !d.start_offline)
            .map(|(i, _)| DeviceId(i))
            .collect();

        let global = GlobalScheduler::new(all_ids, config.perform_load_balance, config.workload_weights);
        let allocator = Allocator::new(config.allocator.idle_threshold, online_ids, &devices);
        let generator = build_generator(&config.generator)?;

        Ok(Self {
            devices,
            global,
            allocator,
            generator,
            max_time: config.max_time,
            now: 0,
            finished: Vec::new(),
        })
    }

    fn all_devices_idle(&self) -> bool {
        self.devices.iter().all(Device::is_finished)
    }

    #[instrument(skip(self))]
    fn tick(&mut self, rng: &mut impl rand::Rng) {
        self.generator.generate(self.now, &mut self.global, rng);
        self.global.step(&mut self.devices, self.now);

        for device in &mut self.devices {
            let out = device.step(self.now);
            for job in out.handback {
                self.global.receive_job(job);
            }
            self.finished.extend(out.finished);
        }

        let weights = self.global.weights;
        self.allocator.step(&mut self.devices, &mut self.global, &weights);
        self.now += 1;
    }

    /// Runs until `max_time` elapses or the generator is finished and every
    /// device has drained its queues, whichever comes first.
    pub fn run(&mut self) -> Result<(), SimError> {
        let mut rng = rand::thread_rng();
        info!(max_time = self.max_time, devices = self.devices.len(), "starting run");
        while self.now < self.max_time {
            if self.generator.is_finished() && self.global.pending_len() == 0 && self.all_devices_idle() {
                break;
            }
            self.tick(&mut rng);
        }
        info!(ticks = self.now, finished = self.finished.len(), "run complete");
        Ok(())
    }

    pub fn now(&self) -> u64 {
        self.now
    }
}

pub fn load_config(path: &str) -> Result<SimulatorConfig, SimError> {
    let text = fs::read_to_string(path).map_err(|e| SimError::Config(format!("reading {path}: {e}")))?;
    if path.ends_with(".json") {
        SimulatorConfig::from_json(&text)
    } else {
        SimulatorConfig::from_yaml(&text)
    }
}
