//! Synthetic arrivals drawn from injected init/output-size distributions.

use super::{Generator, GeneratorState};
use crate::global_scheduler::GlobalScheduler;
use crate::ids::JobId;
use crate::job::Job;
use rand::Rng;
use rand_distr::Distribution;

/// Draws `init_size` and `expected_output` independently from the two
/// configured distributions on every accepted arrival, mirroring the
/// original `RandomGenerator.try_add_one_job`'s `p = init_size_fn()`,
/// `m = output_size_fn()` pair.
pub struct RandomGenerator<Di, Do> {
    state: GeneratorState,
    init_size_dist: Di,
    output_size_dist: Do,
    pub counter_init: Vec<u64>,
    pub counter_output: Vec<u64>,
}

impl<Di, Do> RandomGenerator<Di, Do>
where
    Di: Distribution<f64>,
    Do: Distribution<f64>,
{
    pub fn new(speed: f64, total_limit: u64, dropout: f64, init_size_dist: Di, output_size_dist: Do) -> Self {
        Self {
            state: GeneratorState::new(speed, total_limit, dropout),
            init_size_dist,
            output_size_dist,
            counter_init: Vec::new(),
            counter_output: Vec::new(),
        }
    }
}

impl<Di, Do> Generator for RandomGenerator<Di, Do>
where
    Di: Distribution<f64>,
    Do: Distribution<f64>,
{
    fn try_add_one_job(&mut self, now: u64, global: &mut GlobalScheduler, job_id: u64) -> bool {
        let mut rng = rand::thread_rng();
        let init_size = self.init_size_dist.sample(&mut rng).round().max(1.0) as u64;
        let output_size = self.output_size_dist.sample(&mut rng).round().max(1.0) as u64;

        let job = Job::new(JobId(job_id), now, init_size, output_size);
        global.receive_job(job);
        self.counter_init.push(init_size);
        self.counter_output.push(output_size);
        true
    }

    fn speed(&self) -> f64 {
        self.state.speed
    }

    fn dropout(&self) -> f64 {
        self.state.dropout
    }

    fn total_limit(&self) -> u64 {
        self.state.total_limit
    }

    fn generated_count(&self) -> u64 {
        self.state.generated_count
    }

    fn increment_generated(&mut self) {
        self.state.generated_count += 1;
    }

    fn accumulator_mut(&mut self) -> &mut f64 {
        &mut self.state.acc
    }

    fn next_job_id(&mut self) -> u64 {
        let id = self.state.next_job_id;
        self.state.next_job_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::DeviceId;
    use rand_distr::Normal;

    #[test]
    fn accumulator_emits_floor_of_speed_per_tick() {
        let mut gen = RandomGenerator::new(2.3, 100, 0.0, Normal::new(512.0, 10.0).unwrap(), Normal::new(64.0, 5.0).unwrap());
        let mut global = GlobalScheduler::new([DeviceId(0)], false, Default::default());
        let mut rng = rand::thread_rng();
        let added = gen.generate_jobs(0, &mut global, &mut rng);
        assert_eq!(added, 2);
        assert!((gen.state.acc - 0.3).abs() < 1e-9);
    }

    #[test]
    fn stops_once_total_limit_reached() {
        let mut gen = RandomGenerator::new(5.0, 2, 0.0, Normal::new(512.0, 10.0).unwrap(), Normal::new(64.0, 5.0).unwrap());
        let mut global = GlobalScheduler::new([DeviceId(0)], false, Default::default());
        let mut rng = rand::thread_rng();
        gen.generate_jobs(0, &mut global, &mut rng);
        assert!(gen.is_finished());
        assert_eq!(gen.generated_count(), 2);
    }
}
