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
    experiments::{run_dir, runner::run_experiment, trial_indices, ExperimentParams, RoutingAlg,
        WirelessModel},
    plot,
    session::{runtime::ShellRuntime, watcher::POLL_INTERVAL},
    stats::{record_statistics, Metric},
    topology::{parse_shape, ShapeParams},
    util,
};

/// Run replicated stream-query experiments on the emulation runtime and
/// aggregate their throughput/latency statistics.
#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// Replication factors to sweep.
    #[arg(long, default_value = "1,2,3,5")]
    ks: String,
    /// Chain length of the query.
    #[arg(long, default_value_t = 2)]
    h: usize,
    /// Query type (chain, fr, join, debsGC13, nameAssist, heatMap).
    #[arg(long, default_value = "chain")]
    query: String,
    /// Pause times / mobility values to sweep; 0 keeps the nodes static.
    #[arg(long, default_value = "0.0,2.0,4.0,6.0,8.0")]
    pausetimes: String,
    /// Number of trials per configuration.
    #[arg(long, default_value_t = 2)]
    sessions: usize,
    /// Only run the single trial with index `--sessions`.
    #[arg(long)]
    specific: bool,
    /// Re-aggregate and plot an existing run (run id) instead of executing.
    #[arg(long = "plot-only")]
    plot_only: Option<String>,
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
    #[arg(long, default_value = "OLSR")]
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
    /// Plot configuration scripts.
    #[arg(long = "plot-dir", default_value = "vldb/config")]
    plot_dir: PathBuf,
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

impl Args {
    fn to_params(&self) -> Result<ExperimentParams, Box<dyn Error>> {
        Ok(ExperimentParams {
            nodes: self.nodes,
            h: self.h,
            query: parse_shape(&self.query)?,
            shape: ShapeParams {
                sources: self.sources,
                sinks: self.sinks,
                fan_in: self.fanin,
            },
            routing: self.routing,
            model: self.model.unwrap_or_default(),
            controlnet: (!self.disable_ctrl_net).then(|| "172.16.0.0/24".to_string()),
            preserve_dirs: self.preserve,
            save_config: self.saveconfig,
            constraints: self.constraints.clone(),
            placement: self.placement.clone(),
            refresh_ms: self.refresh_ms,
            poll_interval: POLL_INTERVAL,
            liveness_timeout: (self.timeout_secs > 0)
                .then(|| Duration::from_secs(self.timeout_secs)),
            settle: Duration::from_secs(5),
            verbose: self.verbose,
            data_dir: self.data_dir.clone(),
            static_dir: self.static_dir.clone(),
            services_dir: self.services_dir.clone(),
            plot_dir: self.plot_dir.clone(),
            query_jar: self.jar.clone(),
            trace_script: self.trace_script.clone(),
            results_script: self.results_script.clone(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    util::init_logging();

    let args = Args::parse();
    let ks = util::parse_usize_list(&args.ks)?;
    let mobilities = util::parse_f64_list(&args.pausetimes)?;
    let trials = trial_indices(args.sessions, args.specific);
    let mut params = args.to_params()?;

    // hook scripts run from inside the session directories
    fs::create_dir_all(&params.data_dir)?;
    params.data_dir = fs::canonicalize(&params.data_dir)?;

    let run_id = match &args.plot_only {
        Some(run_id) => run_id.clone(),
        None => {
            let run_id = util::run_timestamp();
            log::info!("starting run {run_id}");
            let rt = ShellRuntime::new(&args.adapter);
            run_experiment(&rt, &params, &ks, &mobilities, &trials, &run_id).await?;
            run_id
        }
    };

    let run = run_dir(&params.data_dir, &run_id);
    record_statistics(&run, &ks, &mobilities, &trials, Metric::Throughput)?;
    record_statistics(&run, &ks, &mobilities, &trials, Metric::Latency)?;

    plot::render_all(&params.plot_dir, &params.data_dir, &run_id).await;
    util::make_world_accessible(&run)?;

    Ok(())
}
