//! Replay arrivals from one or more weighted CSV traces.

use super::{Generator, GeneratorState};
use crate::error::SimError;
use crate::global_scheduler::GlobalScheduler;
use crate::ids::JobId;
use crate::job::Job;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct TraceRow {
    #[serde(rename = "ContextTokens")]
    context_tokens: String,
    #[serde(rename = "GeneratedTokens")]
    generated_tokens: String,
}

/// One weighted trace file plus its replay cursor.
struct CsvSource {
    nickname: String,
    rows: Vec<TraceRow>,
    /// How many rows from this source should be drawn overall, computed
    /// once at construction as `fraction * total_limit` (the last source
    /// absorbs the rounding remainder so the counts sum exactly).
    target_count: u64,
    current_index: u64,
}

impl CsvSource {
    fn has_more(&self) -> bool {
        self.current_index < self.target_count
    }
}

/// Replays weighted CSV traces in round-robin-by-exhaustion order: the
/// first source with remaining quota is used until its `target_count` is
/// reached, then the next one takes over. Mirrors the original
/// `CSVGenerator`'s `__current_source`/`try_add_one_job` pair.
pub struct CsvGenerator {
    state: GeneratorState,
    sources: Vec<CsvSource>,
}

impl CsvGenerator {
    /// `traces` is `(nickname, file_path, fraction)`; `rows_by_path` lets
    /// the caller supply already-parsed CSV bytes instead of touching the
    /// filesystem from library code.
    pub fn new(
        speed: f64,
        total_limit: u64,
        dropout: f64,
        traces: Vec<(String, String, f64)>,
        rows_by_path: impl Fn(&str) -> Result<Vec<TraceRow>, SimError>,
    ) -> Result<Self, SimError> {
        let fraction_sum: f64 = traces.iter().map(|(_, _, f)| f).sum();
        if (fraction_sum - 1.0).abs() > 1e-6 {
            return Err(SimError::Config(format!(
                "trace fractions must sum to 1.0, got {fraction_sum}"
            )));
        }

        let n = traces.len();
        let mut sources = Vec::with_capacity(n);
        let mut allocated = 0u64;
        for (i, (nickname, path, fraction)) in traces.into_iter().enumerate() {
            let rows = rows_by_path(&path)?;
            let target_count = if i + 1 == n {
                total_limit - allocated
            } else {
                (fraction * total_limit as f64).round() as u64
            };
            allocated += target_count;
            if (rows.len() as u64) < target_count {
                return Err(SimError::Config(format!(
                    "trace '{nickname}' has {} rows but needs {target_count}",
                    rows.len()
                )));
            }
            sources.push(CsvSource { nickname, rows, target_count, current_index: 0 });
        }

        Ok(Self { state: GeneratorState::new(speed, total_limit, dropout), sources })
    }

    fn current_source_mut(&mut self) -> Option<&mut CsvSource> {
        self.sources.iter_mut().find(|s| s.has_more())
    }
}

impl Generator for CsvGenerator {
    fn try_add_one_job(&mut self, now: u64, global: &mut GlobalScheduler, job_id: u64) -> bool {
        let Some(source) = self.current_source_mut() else {
            return false;
        };
        let Some(row) = source.rows.get(source.current_index as usize) else {
            return false;
        };
        let nickname = source.nickname.clone();
        source.current_index += 1;

        let init_size: u64 = match row.context_tokens.trim().parse() {
            Ok(v) => v,
            Err(e) => {
                warn!(trace = %nickname, error = %e, "unparseable ContextTokens");
                return false;
            }
        };
        let expected_output: u64 = match row.generated_tokens.trim().parse() {
            Ok(v) => v,
            Err(e) => {
                warn!(trace = %nickname, error = %e, "unparseable GeneratedTokens");
                return false;
            }
        };

        global.receive_job(Job::new(JobId(job_id), now, init_size, expected_output));
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

    fn rows(n: usize) -> Vec<TraceRow> {
        (0..n)
            .map(|i| TraceRow { context_tokens: (100 + i).to_string(), generated_tokens: "32".to_string() })
            .collect()
    }

    #[test]
    fn fraction_sum_must_be_one() {
        let err = CsvGenerator::new(
            1.0,
            10,
            0.0,
            vec![("a".into(), "a.csv".into(), 0.5), ("b".into(), "b.csv".into(), 0.6)],
            |_| Ok(rows(20)),
        );
        assert!(err.is_err());
    }

    #[test]
    fn last_source_absorbs_remainder() {
        let gen = CsvGenerator::new(
            1.0,
            10,
            0.0,
            vec![("a".into(), "a.csv".into(), 0.34), ("b".into(), "b.csv".into(), 0.66)],
            |_| Ok(rows(20)),
        )
        .unwrap();
        assert_eq!(gen.sources[0].target_count, 3);
        assert_eq!(gen.sources[1].target_count, 7);
    }

    #[test]
    fn insufficient_rows_is_config_error() {
        let err = CsvGenerator::new(1.0, 10, 0.0, vec![("a".into(), "a.csv".into(), 1.0)], |_| Ok(rows(2)));
        assert!(err.is_err());
    }

    #[test]
    fn switches_source_once_first_is_exhausted() {
        let mut gen = CsvGenerator::new(
            10.0,
            4,
            0.0,
            vec![("a".into(), "a.csv".into(), 0.5), ("b".into(), "b.csv".into(), 0.5)],
            |_| Ok(rows(2)),
        )
        .unwrap();
        let mut global = GlobalScheduler::new([DeviceId(0)], false, Default::default());
        let mut rng = rand::thread_rng();
        gen.generate_jobs(0, &mut global, &mut rng);
        assert_eq!(gen.generated_count(), 4);
        assert_eq!(gen.sources[0].current_index, 2);
        assert_eq!(gen.sources[1].current_index, 2);
    }
}
