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
//! Module describing experiment configurations and the trial sweep.

pub mod runner;

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::{
    session::watcher::POLL_INTERVAL,
    topology::{QueryShape, ShapeParams},
    util::PathBufExt,
};

pub use crate::session::runtime::WirelessModel;

/// Network-layer routing service started on workers and routers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString, Serialize)]
pub enum RoutingAlg {
    #[default]
    #[strum(serialize = "OLSR")]
    Olsr,
    #[strum(serialize = "OLSRETX")]
    OlsrEtx,
}

/// Parameters shared by every configuration of one experiment run.
#[derive(Clone, Debug, Serialize)]
pub struct ExperimentParams {
    /// Total emulated node count (master excluded).
    pub nodes: usize,
    /// Chain height of the query.
    pub h: usize,
    pub query: QueryShape,
    pub shape: ShapeParams,
    pub routing: RoutingAlg,
    pub model: WirelessModel,
    /// Control network CIDR; `None` disables the control net.
    pub controlnet: Option<String>,
    pub preserve_dirs: bool,
    /// Export the provisioning record to `session.json` before instantiation.
    pub save_config: bool,
    /// Name of a mapping-constraints file under the static dir.
    pub constraints: Option<String>,
    /// Name of a static placement file under the static dir.
    pub placement: Option<String>,
    /// Mobility trace refresh interval.
    pub refresh_ms: u64,
    pub poll_interval: Duration,
    /// Liveness bound on the completion wait; `None` waits unboundedly.
    pub liveness_timeout: Option<Duration>,
    /// Delay between data collection and teardown.
    pub settle: Duration,
    pub verbose: bool,
    /// Root of all experiment runs' result trees.
    pub data_dir: PathBuf,
    /// Directory holding static placement and constraint files.
    pub static_dir: PathBuf,
    /// Custom service definitions handed to the emulation runtime.
    pub services_dir: PathBuf,
    /// Plot configuration scripts (`<name>.plt`).
    pub plot_dir: PathBuf,
    /// The query engine's executable artifact, staged into every session.
    pub query_jar: PathBuf,
    /// External mobility-trace generator executable.
    pub trace_script: PathBuf,
    /// External script regenerating derived result files per trial.
    pub results_script: PathBuf,
}

impl Default for ExperimentParams {
    fn default() -> Self {
        Self {
            nodes: 10,
            h: 2,
            query: QueryShape::Chain,
            shape: ShapeParams::default(),
            routing: RoutingAlg::Olsr,
            model: WirelessModel::Emane,
            controlnet: Some("172.16.0.0/24".to_string()),
            preserve_dirs: false,
            save_config: false,
            constraints: None,
            placement: None,
            refresh_ms: 500,
            poll_interval: POLL_INTERVAL,
            liveness_timeout: Some(Duration::from_secs(3600)),
            settle: Duration::from_secs(5),
            verbose: false,
            data_dir: PathBuf::from("log"),
            static_dir: PathBuf::from("static"),
            services_dir: PathBuf::from("vldb/myservices"),
            plot_dir: PathBuf::from("vldb/config"),
            query_jar: PathBuf::from("lib/meander-0.0.1-SNAPSHOT.jar"),
            trace_script: PathBuf::from("gen_mobility_trace.py"),
            results_script: PathBuf::from("gen_results.py"),
        }
    }
}

impl ExperimentParams {
    /// Key/value view for the `session_params.txt` artifact.
    pub fn to_keyvalues(&self) -> Vec<(String, String)> {
        vec![
            ("nodes".to_string(), self.nodes.to_string()),
            ("h".to_string(), self.h.to_string()),
            ("query".to_string(), self.query.to_string()),
            ("sources".to_string(), self.shape.sources.to_string()),
            ("sinks".to_string(), self.shape.sinks.to_string()),
            ("fanin".to_string(), self.shape.fan_in.to_string()),
            ("net-routing".to_string(), self.routing.to_string()),
            ("model".to_string(), self.model.to_string()),
            (
                "controlnet".to_string(),
                self.controlnet.clone().unwrap_or_default(),
            ),
            ("preserve".to_string(), self.preserve_dirs.to_string()),
            ("saveconfig".to_string(), self.save_config.to_string()),
            (
                "constraints".to_string(),
                self.constraints.clone().unwrap_or_default(),
            ),
            (
                "placement".to_string(),
                self.placement.clone().unwrap_or_default(),
            ),
            ("refresh_ms".to_string(), self.refresh_ms.to_string()),
        ]
    }
}

/// Root directory of one experiment run.
pub fn run_dir(data_dir: &Path, run_id: &str) -> PathBuf {
    data_dir.then(run_id)
}

/// Result directory of one trial: `<run>/<k>k/<mobility>m/<trial>s`.
pub fn trial_dir(data_dir: &Path, run_id: &str, k: usize, mobility: f64, trial: usize) -> PathBuf {
    config_trial_dir(&run_dir(data_dir, run_id), k, mobility, trial)
}

/// Trial directory relative to an already-resolved run directory.
pub fn config_trial_dir(run_dir: &Path, k: usize, mobility: f64, trial: usize) -> PathBuf {
    run_dir
        .then(format!("{k}k"))
        .then(format!("{mobility:.2}m"))
        .then(format!("{trial}s"))
}

/// Recorded operator mapping of an earlier run of the same trial index.
pub fn mapping_record(data_dir: &Path, run_id: &str, trial: usize) -> PathBuf {
    run_dir(data_dir, run_id).join(format!("session{trial}sMappingRecord.txt"))
}

/// Trial indices to run: all of `0..sessions`, or just the one named by
/// `--specific`.
pub fn trial_indices(sessions: usize, specific: bool) -> Vec<usize> {
    if specific {
        vec![sessions]
    } else {
        (0..sessions).collect()
    }
}
