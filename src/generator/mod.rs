//! Arrival process: a fractional-rate accumulator feeding the global
//! scheduler's pending queue.

pub mod csv;
pub mod random;

use crate::global_scheduler::GlobalScheduler;
use rand::Rng;
use tracing::debug;

/// Every concrete generator implements only `try_add_one_job`; the rest of
/// the accumulator/dropout/counting contract is shared here in
/// [`Generator::generate_jobs`], the same way the local schedulers share
/// [`crate::scheduler::run_selected`].
pub trait Generator {
    /// Construct and submit exactly one job to `global`. Returns whether a
    /// job was actually added (a parse failure or similar should return
    /// `false` without panicking).
    fn try_add_one_job(&mut self, now: u64, global: &mut GlobalScheduler, job_id: u64) -> bool;

    fn speed(&self) -> f64;
    fn dropout(&self) -> f64;
    fn total_limit(&self) -> u64;
    fn generated_count(&self) -> u64;
    fn increment_generated(&mut self);
    fn accumulator_mut(&mut self) -> &mut f64;

    fn is_finished(&self) -> bool {
        self.generated_count() >= self.total_limit()
    }

    fn next_job_id(&mut self) -> u64;

    /// Called once per tick. Accumulates fractional jobs and attempts
    /// `floor(acc)` creations, dropping some fraction of them, stopping
    /// early once [`Generator::is_finished`].
    fn generate_jobs(&mut self, now: u64, global: &mut GlobalScheduler, rng: &mut impl Rng) -> u64 {
        let speed = self.speed();
        *self.accumulator_mut() += speed;
        let attempts = self.accumulator_mut().floor() as u64;
        *self.accumulator_mut() -= attempts as f64;

        let mut added = 0;
        for _ in 0..attempts {
            if self.is_finished() {
                break;
            }
            if rng.gen::<f64>() < self.dropout() {
                continue;
            }
            let id = self.next_job_id();
            if self.try_add_one_job(now, global, id) {
                self.increment_generated();
                added += 1;
            }
        }
        if added > 0 {
            debug!(added, "generated jobs this tick");
        }
        added
    }
}

/// Shared bookkeeping every concrete generator embeds: the name-your-fields
/// equivalent of the original `BaseGenerator`'s attributes.
pub struct GeneratorState {
    pub speed: f64,
    pub total_limit: u64,
    pub dropout: f64,
    pub generated_count: u64,
    pub next_job_id: u64,
    pub acc: f64,
}

impl GeneratorState {
    pub fn new(speed: f64, total_limit: u64, dropout: f64) -> Self {
        Self { speed, total_limit, dropout, generated_count: 0, next_job_id: 1, acc: 0.0 }
    }
}
