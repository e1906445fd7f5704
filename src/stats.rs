// MEANDER-LAB: Replication Experiments for Distributed Stream Queries on Emulated Mobile Networks
// Copyright (C) 2024-2025 Roland Schmid <roschmi@ethz.ch> and Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Module aggregating per-trial metrics into per-configuration summary files.

use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use lazy_static::lazy_static;
use ordered_float::OrderedFloat;
use regex::Regex;
use statrs::statistics::Statistics;
use thiserror::Error;

use crate::experiments::config_trial_dir;

/// Latency percentile extracted from the trial logs.
pub const LATENCY_PERCENTILE: &str = "95";

lazy_static! {
    static ref TPUT_RE: Regex = Regex::new(r"sink_sink_mean_tput=(\d+)").unwrap();
    static ref LAT_RE: Regex =
        Regex::new(&format!(r"{LATENCY_PERCENTILE}%_lat=(\d+)")).unwrap();
}

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("could not read {}: {source}", .path.display())]
    UnreadableLog {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not find {pattern} in {}", .path.display())]
    MetricNotFound {
        pattern: &'static str,
        path: PathBuf,
    },
    #[error("no samples for k={k}, mobility={mobility}")]
    Empty { k: usize, mobility: f64 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A scalar metric extracted once per trial.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Metric {
    Throughput,
    Latency,
}

impl Metric {
    pub fn log_file(&self) -> &'static str {
        match self {
            Metric::Throughput => "tput.txt",
            Metric::Latency => "latency.txt",
        }
    }

    /// Suffix of the summary data files (`<k>k-<suffix>.data`).
    pub fn suffix(&self) -> &'static str {
        match self {
            Metric::Throughput => "tput",
            Metric::Latency => "lat",
        }
    }

    fn regex(&self) -> &'static Regex {
        match self {
            Metric::Throughput => &TPUT_RE,
            Metric::Latency => &LAT_RE,
        }
    }

    fn pattern(&self) -> &'static str {
        match self {
            Metric::Throughput => "sink_sink_mean_tput",
            Metric::Latency => "95%_lat",
        }
    }

    /// Extract the metric from a trial's log directory.
    ///
    /// The first matching line wins; a log without any match is a fatal parse
    /// error naming the offending file.
    pub fn extract(&self, trial_dir: &Path) -> Result<f64, StatsError> {
        let path = trial_dir.join(self.log_file());
        let content = fs::read_to_string(&path).map_err(|source| StatsError::UnreadableLog {
            path: path.clone(),
            source,
        })?;
        for line in content.lines() {
            if let Some(captures) = self.regex().captures(line) {
                // the capture group is all digits
                return Ok(captures.get(1).unwrap().as_str().parse().unwrap());
            }
        }
        Err(StatsError::MetricNotFound {
            pattern: self.pattern(),
            path,
        })
    }
}

/// Samples of one configuration, keyed by trial index.
pub type ConfigSamples = BTreeMap<usize, f64>;

/// All samples of a run: k -> mobility -> trial -> value.
pub type RawSamples = BTreeMap<usize, BTreeMap<OrderedFloat<f64>, ConfigSamples>>;

/// Summary statistics of one configuration's sample set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Summary {
    pub mean: f64,
    pub std_dev: f64,
    pub max: f64,
    pub min: f64,
    pub median: f64,
    pub lower_quartile: f64,
    pub upper_quartile: f64,
}

/// Summarize a sample set; `None` when empty.
///
/// The standard deviation is the sample standard deviation (n - 1 divisor;
/// 0.0 for a single sample). Quartiles follow the median-split convention:
/// the lower/upper quartile is the median of the lower/upper half of the
/// sorted samples, halves excluding the middle element for odd sizes.
pub fn summarize(samples: &[f64]) -> Option<Summary> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();

    let (lower_quartile, upper_quartile) = if n == 1 {
        (sorted[0], sorted[0])
    } else {
        (mid(&sorted[..n / 2]), mid(&sorted[(n + 1) / 2..]))
    };

    Some(Summary {
        mean: Statistics::mean(&sorted),
        std_dev: if n < 2 {
            0.0
        } else {
            Statistics::std_dev(&sorted)
        },
        max: Statistics::max(&sorted),
        min: Statistics::min(&sorted),
        median: mid(&sorted),
        lower_quartile,
        upper_quartile,
    })
}

fn mid(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Extract one metric across all configurations and trials of a run.
pub fn collect_metrics(
    run_dir: &Path,
    ks: &[usize],
    mobilities: &[f64],
    trials: &[usize],
    metric: Metric,
) -> Result<RawSamples, StatsError> {
    let mut raw: RawSamples = BTreeMap::new();
    for &k in ks {
        for &mobility in mobilities {
            let samples: &mut ConfigSamples = raw
                .entry(k)
                .or_default()
                .entry(OrderedFloat(mobility))
                .or_default();
            for &trial in trials {
                let value = metric.extract(&config_trial_dir(run_dir, k, mobility, trial))?;
                samples.insert(trial, value);
            }
        }
    }
    Ok(raw)
}

/// Samples divided by the k=1 baseline of the same (mobility, trial).
///
/// Callers must only invoke this when a k=1 configuration was run.
pub fn relative_samples(raw: &RawSamples) -> RawSamples {
    let Some(baseline) = raw.get(&1) else {
        return RawSamples::new();
    };
    raw.iter()
        .map(|(&k, per_mob)| {
            let rel = per_mob
                .iter()
                .map(|(mob, trials)| {
                    let rel_trials = trials
                        .iter()
                        .filter_map(|(&trial, &value)| {
                            let base = baseline.get(mob)?.get(&trial)?;
                            Some((trial, value / base))
                        })
                        .collect();
                    (*mob, rel_trials)
                })
                .collect();
            (k, rel)
        })
        .collect()
}

/// Aggregate one metric over a finished run and write the summary files.
///
/// For every k, writes `<k>k-<suffix>.data` with one line per mobility value
/// in ascending order. When a k=1 baseline configuration exists, a parallel
/// `<k>k-rel-<suffix>.data` set normalized against it is written as well.
/// Nothing is written if any trial log fails to parse.
pub fn record_statistics(
    run_dir: &Path,
    ks: &[usize],
    mobilities: &[f64],
    trials: &[usize],
    metric: Metric,
) -> Result<(), StatsError> {
    let raw = collect_metrics(run_dir, ks, mobilities, trials, metric)?;
    write_summary_files(run_dir, &raw, metric, false)?;

    if raw.contains_key(&1) {
        write_summary_files(run_dir, &relative_samples(&raw), metric, true)?;
    } else {
        log::debug!("no k=1 baseline among {ks:?}; skipping relative summaries");
    }
    Ok(())
}

fn write_summary_files(
    run_dir: &Path,
    samples: &RawSamples,
    metric: Metric,
    relative: bool,
) -> Result<(), StatsError> {
    for (&k, per_mob) in samples {
        let name = if relative {
            format!("{k}k-rel-{}.data", metric.suffix())
        } else {
            format!("{k}k-{}.data", metric.suffix())
        };
        let mut file = fs::File::create(run_dir.join(name))?;
        writeln!(file, "#k={k}")?;
        writeln!(file, "#mob mean ? stdDev max min med lq uq")?;
        for (mob, trials) in per_mob {
            let values: Vec<f64> = trials.values().copied().collect();
            let s = summarize(&values).ok_or(StatsError::Empty {
                k,
                mobility: mob.into_inner(),
            })?;
            writeln!(
                file,
                "{:.4} {:.1} 1 {:.1} {:.1} {:.1} {:.1} {:.1} {:.1}",
                mob.into_inner(),
                s.mean,
                s.std_dev,
                s.max,
                s.min,
                s.median,
                s.lower_quartile,
                s.upper_quartile
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn summary_of_the_fixed_sample_set() {
        let s = summarize(&[10.0, 20.0, 30.0, 40.0]).unwrap();
        assert_eq!(s.mean, 25.0);
        assert_eq!(s.min, 10.0);
        assert_eq!(s.max, 40.0);
        assert_eq!(s.median, 25.0);
        // median-split: lq = median{10, 20}, uq = median{30, 40}
        assert_eq!(s.lower_quartile, 15.0);
        assert_eq!(s.upper_quartile, 35.0);
        assert!((s.std_dev - 12.909944487358056).abs() < 1e-9);
    }

    #[test]
    fn summary_excludes_the_middle_element_for_odd_sizes() {
        let s = summarize(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(s.median, 3.0);
        assert_eq!(s.lower_quartile, 1.5);
        assert_eq!(s.upper_quartile, 4.5);
    }

    #[test]
    fn summary_of_a_single_sample() {
        let s = summarize(&[7.0]).unwrap();
        assert_eq!(s.mean, 7.0);
        assert_eq!(s.std_dev, 0.0);
        assert_eq!(s.median, 7.0);
        assert_eq!(s.lower_quartile, 7.0);
        assert_eq!(s.upper_quartile, 7.0);
        assert!(summarize(&[]).is_none());
    }

    fn write_log(run_dir: &Path, k: usize, mob: f64, trial: usize, file: &str, body: &str) {
        let dir = config_trial_dir(run_dir, k, mob, trial);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), body).unwrap();
    }

    #[test]
    fn throughput_extraction_takes_the_first_match() {
        let dir = tempfile::tempdir().unwrap();
        write_log(
            dir.path(),
            1,
            0.0,
            0,
            "tput.txt",
            "src_sink_mean_tput=99\nsink_sink_mean_tput=1200\nsink_sink_mean_tput=1300\n",
        );
        let trial = config_trial_dir(dir.path(), 1, 0.0, 0);
        assert_eq!(Metric::Throughput.extract(&trial).unwrap(), 1200.0);
    }

    #[test]
    fn missing_metric_names_the_offending_file() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), 1, 0.0, 0, "latency.txt", "no metrics here\n");
        let trial = config_trial_dir(dir.path(), 1, 0.0, 0);
        let err = Metric::Latency.extract(&trial).unwrap_err();
        match err {
            StatsError::MetricNotFound { pattern, path } => {
                assert_eq!(pattern, "95%_lat");
                assert_eq!(path, trial.join("latency.txt"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn relative_samples_divide_by_the_baseline() {
        let mut raw = RawSamples::new();
        raw.entry(1)
            .or_default()
            .insert(OrderedFloat(2.0), BTreeMap::from_iter([(0, 50.0), (1, 40.0)]));
        raw.entry(3)
            .or_default()
            .insert(OrderedFloat(2.0), BTreeMap::from_iter([(0, 75.0), (1, 10.0)]));

        let rel = relative_samples(&raw);
        assert_eq!(rel[&1][&OrderedFloat(2.0)][&0], 1.0);
        assert_eq!(rel[&3][&OrderedFloat(2.0)][&0], 1.5);
        assert_eq!(rel[&3][&OrderedFloat(2.0)][&1], 0.25);
    }

    #[test]
    fn record_statistics_writes_absolute_and_relative_files() {
        let dir = tempfile::tempdir().unwrap();
        for (k, base) in [(1, 1000), (2, 1500)] {
            for (t, off) in [(0usize, 0), (1, 100)] {
                write_log(
                    dir.path(),
                    k,
                    0.0,
                    t,
                    "tput.txt",
                    &format!("sink_sink_mean_tput={}\n", base + off),
                );
                write_log(
                    dir.path(),
                    k,
                    2.0,
                    t,
                    "tput.txt",
                    &format!("sink_sink_mean_tput={}\n", base - 200 + off),
                );
            }
        }

        record_statistics(dir.path(), &[1, 2], &[0.0, 2.0], &[0, 1], Metric::Throughput)
            .unwrap();

        let abs = fs::read_to_string(dir.path().join("2k-tput.data")).unwrap();
        let lines: Vec<&str> = abs.lines().collect();
        assert_eq!(lines[0], "#k=2");
        assert_eq!(lines[1], "#mob mean ? stdDev max min med lq uq");
        assert_eq!(
            lines[2],
            "0.0000 1550.0 1 70.7 1600.0 1500.0 1550.0 1500.0 1600.0"
        );
        assert_eq!(
            lines[3],
            "2.0000 1350.0 1 70.7 1400.0 1300.0 1350.0 1300.0 1400.0"
        );

        // relative: k=2 at mobility 0 -> {1500/1000, 1600/1100}
        let rel = fs::read_to_string(dir.path().join("2k-rel-tput.data")).unwrap();
        let line = rel.lines().nth(2).unwrap();
        assert!(line.starts_with("0.0000 1.5 1 "));
    }

    #[test]
    fn parse_failure_aborts_without_writing_any_summary() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), 1, 0.0, 0, "tput.txt", "sink_sink_mean_tput=10\n");
        write_log(dir.path(), 2, 0.0, 0, "tput.txt", "nothing useful\n");

        let err = record_statistics(dir.path(), &[1, 2], &[0.0], &[0], Metric::Throughput)
            .unwrap_err();
        assert!(matches!(err, StatsError::MetricNotFound { .. }));
        assert!(!dir.path().join("1k-tput.data").exists());
        assert!(!dir.path().join("2k-tput.data").exists());
    }
}
