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
//! Module rendering the recorded data files with the external gnuplot tool.

use std::path::Path;

use tokio::process::Command;

/// Plot configurations rendered after every run.
pub const PLOTS: [&str; 8] = [
    "tput_vs_mobility",
    "median_tput_vs_mobility",
    "latency_vs_mobility",
    "tput_vs_mobility_stddev",
    "latency_vs_mobility_stddev",
    "rel_tput_vs_mobility_stddev",
    "rel_latency_vs_mobility_stddev",
    "tput_vs_netsize_stddev",
];

/// Render all plots of a run. Plotting is best-effort: a missing gnuplot or a
/// broken plot config is logged and skipped, never fatal.
pub async fn render_all(plot_dir: &Path, data_dir: &Path, run_id: &str) {
    for plot in PLOTS {
        if let Err(e) = render(plot, plot_dir, data_dir, run_id).await {
            log::warn!("could not render {plot}: {e}");
        }
    }
}

async fn render(
    plot: &str,
    plot_dir: &Path,
    data_dir: &Path,
    run_id: &str,
) -> Result<(), std::io::Error> {
    let run_dir = data_dir.join(run_id);
    let status = Command::new("gnuplot")
        .arg("-e")
        .arg(format!(
            "timestr='{run_id}';outputdir='{}'",
            data_dir.display()
        ))
        .arg(plot_dir.join(format!("{plot}.plt")))
        .current_dir(&run_dir)
        .status()
        .await?;
    if !status.success() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("gnuplot exited with {status}"),
        ));
    }
    Ok(())
}
