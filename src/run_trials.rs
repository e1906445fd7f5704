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
use std::{error::Error, fs, path::PathBuf, time::Duration};

use clap::Parser;

use meander_lab::{
    experiments::{runner::run_experiment, trial_indices, ExperimentParams, RoutingAlg,
        WirelessModel},
    session::{runtime::ShellRuntime, watcher::POLL_INTERVAL},
    topology::{parse_shape, ShapeParams},
    util,
};

/// Run the trials of a single (replication factor, mobility) configuration,
/// without the statistics pass.
#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// Replication factor.
    #[arg(long, default_value_t = 2)]
    k: usize,
    /// Chain length of the query.
    #[arg(long, default_value_t = 2)]
    h: usize,
    /// Query type (chain, fr, join, debsGC13, nameAssist, heatMap).
    #[arg(long, default_value = "chain")]
    query: String,
    /// Pause time / mobility value; 0 keeps the nodes static.
    #[arg(long, default_value_t = 2.0)]
    pausetime: f64,
    /// Number of trials to run.
    #[arg(long, default_value_t = 1)]
    sessions: usize,
    /// Only run the single trial with index `--sessions`.
    #[arg(long)]
    specific: bool,
    /// Total number of emulated nodes in the network.
    #[arg(long, default_value_t = 10)]
    nodes: usize,
    /// Disable the control network.
    #[arg(long = "disable-ctrl-net")]
    disable_ctrl_net: bool,
    /// Wireless model (Emane, Basic).
    #[arg(long)]
    model: Option<WirelessModel>,
    /// Network-layer routing algorithm (OLSR, OLSRETX).
    #[arg(long, default_value = "OLSRETX")]
    routing: RoutingAlg,
    /// Preserve session directories after teardown.
    #[arg(long)]
    preserve: bool,
    /// Export each session's provisioning record before instantiation.
    #[arg(long)]
    saveconfig: bool,
    /// Initial mapping constraints for each trial (file under the static dir).
    #[arg(long)]
    constraints: Option<String>,
    /// Explicit static placement to use for all trials (file under the static dir).
    #[arg(long)]
    placement: Option<String>,
    /// Source count of the fan-in query.
    #[arg(long, default_value_t = 4)]
    sources: usize,
    /// Sink count of the fan-in query.
    #[arg(long, default_value_t = 1)]
    sinks: usize,
    /// Fan-in of the fan-in query's join tree.
    #[arg(long, default_value_t = 2)]
    fanin: usize,
    /// Mobility trace refresh interval in milliseconds.
    #[arg(long = "refresh-ms", default_value_t = 500)]
    refresh_ms: u64,
    /// Liveness bound per trial in seconds; 0 waits unboundedly.
    #[arg(long = "timeout-secs", default_value_t = 3600)]
    timeout_secs: u64,
    /// Verbose emulation runtime output.
    #[arg(long)]
    verbose: bool,
    /// Runtime adapter executable.
    #[arg(long, default_value = "core-adapter")]
    adapter: PathBuf,
    /// Root of the experiment result trees.
    #[arg(long = "data-dir", default_value = "log")]
    data_dir: PathBuf,
    /// Directory holding static placement and constraint files.
    #[arg(long = "static-dir", default_value = "static")]
    static_dir: PathBuf,
    /// Custom service definitions handed to the emulation runtime.
    #[arg(long = "services-dir", default_value = "vldb/myservices")]
    services_dir: PathBuf,
    /// The query engine's executable artifact.
    #[arg(long, default_value = "lib/meander-0.0.1-SNAPSHOT.jar")]
    jar: PathBuf,
    /// External mobility-trace generator.
    #[arg(long = "trace-script", default_value = "gen_mobility_trace.py")]
    trace_script: PathBuf,
    /// External script regenerating derived result files per trial.
    #[arg(long = "results-script", default_value = "gen_results.py")]
    results_script: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    util::init_logging();

    let args = Args::parse();
    let trials = trial_indices(args.sessions, args.specific);
    let mut params = ExperimentParams {
        nodes: args.nodes,
        h: args.h,
        query: parse_shape(&args.query)?,
        shape: ShapeParams {
            sources: args.sources,
            sinks: args.sinks,
            fan_in: args.fanin,
        },
        routing: args.routing,
        model: args.model.unwrap_or_default(),
        controlnet: (!args.disable_ctrl_net).then(|| "172.16.0.0/24".to_string()),
        preserve_dirs: args.preserve,
        save_config: args.saveconfig,
        constraints: args.constraints.clone(),
        placement: args.placement.clone(),
        refresh_ms: args.refresh_ms,
        poll_interval: POLL_INTERVAL,
        liveness_timeout: (args.timeout_secs > 0).then(|| Duration::from_secs(args.timeout_secs)),
        settle: Duration::from_secs(5),
        verbose: args.verbose,
        data_dir: args.data_dir.clone(),
        static_dir: args.static_dir.clone(),
        plot_dir: PathBuf::new(),
        services_dir: args.services_dir.clone(),
        query_jar: args.jar.clone(),
        trace_script: args.trace_script.clone(),
        results_script: args.results_script.clone(),
    };

    fs::create_dir_all(&params.data_dir)?;
    params.data_dir = fs::canonicalize(&params.data_dir)?;

    let run_id = util::run_timestamp();
    log::info!("starting run {run_id}");
    let rt = ShellRuntime::new(&args.adapter);
    run_experiment(
        &rt,
        &params,
        &[args.k],
        &[args.pausetime],
        &trials,
        &run_id,
    )
    .await?;

    Ok(())
}
