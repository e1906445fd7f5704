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
//! Module sweeping all configurations of an experiment run, trial by trial.

use indicatif::{ProgressBar, ProgressStyle};

use crate::session::{run_trial, runtime::EmulationRuntime, SessionError, TrialContext};

use super::ExperimentParams;

/// Run every trial of every (k, mobility) configuration, strictly
/// sequentially: the emulation runtime supports one live session at a time.
///
/// The first failing trial aborts the sweep; completed trials keep their
/// result directories.
pub async fn run_experiment(
    rt: &dyn EmulationRuntime,
    params: &ExperimentParams,
    ks: &[usize],
    mobilities: &[f64],
    trials: &[usize],
    run_id: &str,
) -> Result<(), SessionError> {
    let bar = ProgressBar::new((ks.len() * mobilities.len() * trials.len()) as u64);
    bar.set_style(
        ProgressStyle::with_template("{wide_bar} {pos}/{len} trials, elapsed: {elapsed}, eta: {eta}")
            .unwrap(),
    );
    bar.tick();

    for &k in ks {
        for &mobility in mobilities {
            for &trial in trials {
                log::info!("*** running trial {trial} (k={k}, mobility={mobility:.2}) ***");
                let ctx = TrialContext {
                    run_id,
                    k,
                    mobility,
                    trial,
                };
                run_trial(rt, params, &ctx).await?;
                bar.inc(1);
            }
        }
    }
    bar.finish_and_clear();
    Ok(())
}
