//! Summary statistics computed from a finished run's job list.

use crate::job::Job;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, Default)]
pub struct Distribution {
    pub average: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

impl Distribution {
    fn from_samples(mut samples: Vec<f64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let n = samples.len();
        let average = samples.iter().sum::<f64>() / n as f64;
        let p95 = samples[percentile_index(n, 0.95)];
        let p99 = samples[percentile_index(n, 0.99)];
        let max = *samples.last().unwrap();
        Self { average, p95, p99, max }
    }
}

fn percentile_index(n: usize, p: f64) -> usize {
    ((n as f64 * p).floor() as usize).min(n - 1)
}

/// End-of-run metrics. `waiting` is `decode_start - arrival_time` (the
/// prefill/queueing delay), `turnaround` is `decode_finish - arrival_time`,
/// `service` is `decode_finish - decode_start`, `normalized_turnaround` is
/// turnaround scaled by output length, and `ttft` ("time to first token")
/// duplicates `waiting` under the name the original metric is usually
/// reported under.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub total_time: u64,
    pub finished_jobs: usize,
    pub throughput: f64,
    pub waiting: Distribution,
    pub turnaround: Distribution,
    pub service: Distribution,
    pub normalized_turnaround: Distribution,
    pub ttft: Distribution,
}

impl Report {
    pub fn from_jobs(total_time: u64, jobs: &[Job]) -> Self {
        let mut waiting = Vec::with_capacity(jobs.len());
        let mut turnaround = Vec::with_capacity(jobs.len());
        let mut service = Vec::with_capacity(jobs.len());
        let mut normalized_turnaround = Vec::with_capacity(jobs.len());
        let mut ttft = Vec::with_capacity(jobs.len());

        for job in jobs {
            let (Some(decode_start), Some(decode_finish)) = (job.decode_start, job.decode_finish) else {
                continue;
            };
            let w = (decode_start.saturating_sub(job.arrival_time)) as f64;
            let t = (decode_finish.saturating_sub(job.arrival_time)) as f64;
            let s = (decode_finish.saturating_sub(decode_start)) as f64;
            let output_len = (job.final_size - job.init_size).max(1) as f64;

            waiting.push(w);
            turnaround.push(t);
            service.push(s);
            normalized_turnaround.push(t / output_len);
            ttft.push(w);
        }

        let throughput = if total_time > 0 { jobs.len() as f64 / total_time as f64 } else { 0.0 };

        Self {
            total_time,
            finished_jobs: jobs.len(),
            throughput,
            waiting: Distribution::from_samples(waiting),
            turnaround: Distribution::from_samples(turnaround),
            service: Distribution::from_samples(service),
            normalized_turnaround: Distribution::from_samples(normalized_turnaround),
            ttft: Distribution::from_samples(ttft),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::JobId;

    fn finished_job(id: u64, arrival: u64, init: u64, out: u64, decode_start: u64, decode_finish: u64) -> Job {
        let mut j = Job::new(JobId(id), arrival, init, out);
        j.decode_start = Some(decode_start);
        j.decode_finish = Some(decode_finish);
        j
    }

    #[test]
    fn percentile_index_clamps_to_last() {
        assert_eq!(percentile_index(1, 0.95), 0);
        assert_eq!(percentile_index(20, 0.95), 19);
    }

    #[test]
    fn report_computes_basic_metrics() {
        let jobs = vec![
            finished_job(1, 0, 10, 5, 0, 4),
            finished_job(2, 0, 10, 5, 1, 6),
        ];
        let report = Report::from_jobs(10, &jobs);
        assert_eq!(report.finished_jobs, 2);
        assert_eq!(report.waiting.average, 0.5);
        assert_eq!(report.turnaround.max, 6.0);
    }

    #[test]
    fn unfinished_jobs_are_excluded() {
        let unfinished = Job::new(JobId(1), 0, 10, 5);
        let report = Report::from_jobs(10, &[unfinished]);
        assert_eq!(report.waiting.average, 0.0);
    }
}
