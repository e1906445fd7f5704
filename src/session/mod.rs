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
//! Module driving the lifecycle of one trial's emulation session.
//!
//! A trial walks created -> provisioned -> mobility-wired -> instantiated ->
//! running -> collected -> shutdown; shutdown is reached even when a step
//! fails, and the first error is re-raised afterwards.

pub mod artifacts;
pub mod runtime;
pub mod watcher;

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use serde::Serialize;
use thiserror::Error;

use crate::{
    experiments::{self, ExperimentParams},
    mobility::{node_map, MobilityConfig, MobilityError, TraceGenerator},
    placement::{grid_position, initial_placements, PlacementError, GRID_OFFSET, GRID_SPACING},
    topology::{worker_counts, TopologyError},
    NodeId, Position, WorkerCountPlan,
};

use self::runtime::{
    EmulationRuntime, EmulationSession, HookPhase, NodeSpec, RuntimeError, SessionConfig,
    WirelessConfig,
};
use self::watcher::{CompletionMarker, CompletionWatcher, WatcherError};

/// Service started on the master node.
pub const MASTER_SERVICE: &str = "MeanderMaster";

/// Services every node runs, before routing and query services are appended.
pub const BASE_SERVICES: [&str; 2] = ["IPForward", "SSH"];

/// Name of the `n`-th query worker service instance on a node.
pub fn worker_service(instance: usize) -> String {
    format!("MeanderWorker{instance}")
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid query configuration: {0}")]
    Topology(#[from] TopologyError),
    #[error("invalid placement: {0}")]
    Placement(#[from] PlacementError),
    #[error("could not find session constraints: {}", .0.display())]
    MissingConstraints(PathBuf),
    #[error("mobility setup failed: {0}")]
    Mobility(#[from] MobilityError),
    #[error("emulation runtime error: {0}")]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Completion(#[from] WatcherError),
    #[error("could not export the session record: {0}")]
    Export(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coordinates of one trial within an experiment run.
#[derive(Clone, Copy, Debug)]
pub struct TrialContext<'a> {
    pub run_id: &'a str,
    pub k: usize,
    pub mobility: f64,
    pub trial: usize,
}

/// Run a single trial against the emulation runtime.
///
/// Configuration errors (bad shape/replication combination, missing placement
/// or constraint files, insufficient capacity) abort before any session is
/// created. Once a session exists it is shut down unconditionally, also when
/// provisioning or the completion wait fail; the first error wins.
pub async fn run_trial(
    rt: &dyn EmulationRuntime,
    params: &ExperimentParams,
    ctx: &TrialContext<'_>,
) -> Result<CompletionMarker, SessionError> {
    let plan = worker_counts(params.query, ctx.k, params.h, &params.shape, params.nodes)?;
    log::info!("worker counts: {plan:?}");

    let placement_file = params.placement.as_ref().map(|n| params.static_dir.join(n));
    let placements = initial_placements(placement_file.as_deref(), ctx.mobility)?;
    let constraints = resolve_constraints(params, ctx)?;

    let cfg = SessionConfig {
        services_dir: params.services_dir.clone(),
        emane_log_level: 1,
        verbose: params.verbose,
        preserve_dirs: params.preserve_dirs,
        controlnet: params.controlnet.clone(),
    };
    let mut session = rt.create_session(&cfg).await?;

    let result = provision_and_wait(
        session.as_mut(),
        params,
        ctx,
        &plan,
        placements.as_ref(),
        constraints.as_deref(),
    )
    .await;

    log::info!("shutting down session");
    match (result, session.shutdown().await) {
        (Ok(marker), Ok(())) => Ok(marker),
        (Ok(_), Err(shutdown_err)) => Err(shutdown_err.into()),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(shutdown_err)) => {
            log::error!("session shutdown also failed: {shutdown_err}");
            Err(err)
        }
    }
}

async fn provision_and_wait(
    session: &mut dyn EmulationSession,
    params: &ExperimentParams,
    ctx: &TrialContext<'_>,
    plan: &WorkerCountPlan,
    placements: Option<&HashMap<usize, Position>>,
    constraints: Option<&Path>,
) -> Result<CompletionMarker, SessionError> {
    let session_dir = session.session_dir().to_path_buf();

    artifacts::write_all(&session_dir, params, ctx.k, ctx.mobility, ctx.trial)?;
    artifacts::stage_query_jar(&params.query_jar, &session_dir)?;

    let trace = if ctx.mobility > 0.0 {
        TraceGenerator::new(&params.trace_script)
            .generate(&session_dir, ctx.trial, ctx.mobility, params.nodes)
            .await?
    } else {
        None
    };

    let wlan = session
        .add_wireless(&WirelessConfig::for_model(params.model))
        .await?;

    // The master sits one slot past the grid, apart from the workers.
    let master_services = BASE_SERVICES
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(MASTER_SERVICE.to_string()))
        .collect();
    session
        .add_node(&NodeSpec {
            id: 2,
            name: "n2".to_string(),
            services: master_services,
            position: grid_position(2 + params.nodes, params.nodes - 1, GRID_OFFSET, GRID_SPACING)?,
            address: None,
        })
        .await?;

    let routed_services: Vec<String> = BASE_SERVICES
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(params.routing.to_string()))
        .collect();

    log::info!("creating workers");
    let mut mobile_nodes: Vec<NodeId> = Vec::new();
    for i in 3..3 + plan.len() {
        let mut services = routed_services.clone();
        services.extend((1..=plan[i - 3]).map(worker_service));
        let id = session
            .add_node(&node_spec(i, services, placements, params.nodes)?)
            .await?;
        mobile_nodes.push(id);
    }

    log::info!("creating routers");
    for i in 3 + plan.len()..2 + params.nodes {
        let id = session
            .add_node(&node_spec(i, routed_services.clone(), placements, params.nodes)?)
            .await?;
        mobile_nodes.push(id);
    }

    if let Some(constraints) = constraints {
        fs::copy(constraints, session_dir.join("mappingRecordIn.txt"))?;
    }

    if let Some(trace_file) = trace {
        let map = node_map(params.nodes - 1, &mobile_nodes)?;
        session
            .set_mobility(
                wlan,
                &MobilityConfig {
                    trace_file,
                    refresh_ms: params.refresh_ms,
                    node_map: map,
                },
            )
            .await?;
    }

    session
        .add_hook(
            HookPhase::DataCollect,
            "datacollect.sh",
            &datacollect_script(params, ctx),
        )
        .await?;
    session.set_node_count(1 + params.nodes).await?;

    if params.save_config {
        export_session_record(&session_dir, params, ctx, plan)?;
    }

    log::info!("instantiating session {}", ctx.trial);
    session.instantiate().await?;

    log::info!("waiting for a query worker/master to terminate");
    let watcher = CompletionWatcher::for_plan(
        &session_dir,
        plan,
        params.poll_interval,
        params.liveness_timeout,
    );
    let marker = watcher.wait().await?;

    log::info!("collecting data");
    session.collect_data().await?;
    tokio::time::sleep(params.settle).await;

    Ok(marker)
}

fn node_spec(
    i: usize,
    services: Vec<String>,
    placements: Option<&HashMap<usize, Position>>,
    nodes: usize,
) -> Result<NodeSpec, SessionError> {
    let position = match placements {
        Some(map) => map
            .get(&i)
            .copied()
            .ok_or(PlacementError::MissingNode(i))?,
        None => grid_position(i, nodes - 1, GRID_OFFSET, GRID_SPACING)?,
    };
    Ok(NodeSpec {
        id: i as NodeId,
        name: format!("n{i}"),
        services,
        position,
        address: Some(format!("10.0.0.{}/32", i - 1)),
    })
}

/// Pick the mapping-constraint input for this trial, if any.
///
/// A mapping recorded by an earlier run of the same trial index takes
/// precedence; otherwise a constraints file named in the configuration is
/// required to exist.
fn resolve_constraints(
    params: &ExperimentParams,
    ctx: &TrialContext<'_>,
) -> Result<Option<PathBuf>, SessionError> {
    let recorded = experiments::mapping_record(&params.data_dir, ctx.run_id, ctx.trial);
    if recorded.exists() {
        return Ok(Some(recorded));
    }
    match params.constraints.as_deref() {
        Some(name) if !name.is_empty() => {
            let path = params.static_dir.join(name);
            if path.exists() {
                Ok(Some(path))
            } else {
                Err(SessionError::MissingConstraints(path))
            }
        }
        _ => Ok(None),
    }
}

fn datacollect_script(params: &ExperimentParams, ctx: &TrialContext<'_>) -> String {
    let run_dir = experiments::run_dir(&params.data_dir, ctx.run_id);
    let trial_dir =
        experiments::trial_dir(&params.data_dir, ctx.run_id, ctx.k, ctx.mobility, ctx.trial);
    format!(
        r#"#!/bin/sh
# session hook script; runs on the host once the runtime reaches the
# data collection state

resultsDir={results}
runDir={run}

mkdir -p $resultsDir

# copy every node's query logs and recorded mapping into the results dir
for d in n*.conf
do
    cp $d/log1/*.log $resultsDir
    if [ -e "$d/log2" ]
    then
        cp $d/log2/*.log $resultsDir
    fi
    cp $d/mappingRecordOut.txt $resultsDir
    cp $d/mappingRecordOut.txt $runDir/session{trial}sMappingRecord.txt
done

# mobility params, if this trial had any
cp r_waypoints.params $resultsDir

{regen} --expDir $resultsDir
chmod -R go+rw $resultsDir
"#,
        results = trial_dir.display(),
        run = run_dir.display(),
        trial = ctx.trial,
        regen = params.results_script.display(),
    )
}

#[derive(Serialize)]
struct SessionRecord<'a> {
    k: usize,
    mobility: f64,
    trial: usize,
    worker_counts: &'a [usize],
    params: &'a ExperimentParams,
}

fn export_session_record(
    session_dir: &Path,
    params: &ExperimentParams,
    ctx: &TrialContext<'_>,
    plan: &WorkerCountPlan,
) -> Result<(), SessionError> {
    let record = SessionRecord {
        k: ctx.k,
        mobility: ctx.mobility,
        trial: ctx.trial,
        worker_counts: plan,
        params,
    };
    let file = fs::File::create(session_dir.join("session.json"))?;
    serde_json::to_writer_pretty(file, &record)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::mobility::MobilityConfig;

    struct MockRuntime {
        session_dir: PathBuf,
        fail_on_node: Option<NodeId>,
        write_marker: bool,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl MockRuntime {
        fn new(session_dir: PathBuf) -> Self {
            Self {
                session_dir,
                fail_on_node: None,
                write_marker: true,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmulationRuntime for MockRuntime {
        async fn create_session(
            &self,
            _cfg: &SessionConfig,
        ) -> Result<Box<dyn EmulationSession>, RuntimeError> {
            fs::create_dir_all(&self.session_dir)?;
            self.calls.lock().unwrap().push("create".to_string());
            Ok(Box::new(MockSession {
                session_dir: self.session_dir.clone(),
                fail_on_node: self.fail_on_node,
                write_marker: self.write_marker,
                calls: self.calls.clone(),
            }))
        }
    }

    struct MockSession {
        session_dir: PathBuf,
        fail_on_node: Option<NodeId>,
        write_marker: bool,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl MockSession {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    #[async_trait]
    impl EmulationSession for MockSession {
        fn session_dir(&self) -> &Path {
            &self.session_dir
        }

        async fn add_wireless(&mut self, cfg: &WirelessConfig) -> Result<NodeId, RuntimeError> {
            self.record("wireless");
            Ok(cfg.id)
        }

        async fn add_node(&mut self, spec: &NodeSpec) -> Result<NodeId, RuntimeError> {
            if self.fail_on_node == Some(spec.id) {
                return Err(RuntimeError::Adapter {
                    status: "exit status: 1".to_string(),
                    stderr: "node creation failed".to_string(),
                });
            }
            self.record(format!("node {}", spec.name));
            Ok(spec.id)
        }

        async fn set_mobility(
            &mut self,
            _wlan: NodeId,
            _cfg: &MobilityConfig,
        ) -> Result<(), RuntimeError> {
            self.record("mobility");
            Ok(())
        }

        async fn add_hook(
            &mut self,
            _phase: HookPhase,
            name: &str,
            _script: &str,
        ) -> Result<(), RuntimeError> {
            self.record(format!("hook {name}"));
            Ok(())
        }

        async fn set_node_count(&mut self, count: usize) -> Result<(), RuntimeError> {
            self.record(format!("node-count {count}"));
            Ok(())
        }

        async fn instantiate(&mut self) -> Result<(), RuntimeError> {
            self.record("instantiate");
            if self.write_marker {
                let conf = self.session_dir.join("n2.conf");
                fs::create_dir_all(&conf)?;
                fs::write(conf.join("master.shutdown"), "")?;
            }
            Ok(())
        }

        async fn collect_data(&mut self) -> Result<(), RuntimeError> {
            self.record("collect");
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<(), RuntimeError> {
            self.record("shutdown");
            Ok(())
        }
    }

    fn test_params(dir: &Path) -> ExperimentParams {
        let jar = dir.join("meander.jar");
        fs::write(&jar, b"jar").unwrap();
        ExperimentParams {
            data_dir: dir.join("log"),
            static_dir: dir.join("static"),
            query_jar: jar,
            poll_interval: Duration::from_millis(10),
            liveness_timeout: Some(Duration::from_millis(200)),
            settle: Duration::ZERO,
            ..Default::default()
        }
    }

    fn ctx(k: usize) -> TrialContext<'static> {
        TrialContext {
            run_id: "10-42-07-Wed060826",
            k,
            mobility: 0.0,
            trial: 0,
        }
    }

    #[tokio::test]
    async fn trial_provisions_master_workers_and_routers() {
        let dir = tempfile::tempdir().unwrap();
        let rt = MockRuntime::new(dir.path().join("session"));
        let params = test_params(dir.path());

        // chain, k=2, h=2 -> 6 workers, 1 master, 3 filler routers
        let marker = run_trial(&rt, &params, &ctx(2)).await.unwrap();
        assert_eq!(marker.process, "master");

        let calls = rt.calls();
        let nodes: Vec<_> = calls
            .iter()
            .filter(|c| c.starts_with("node "))
            .cloned()
            .collect();
        assert_eq!(
            nodes,
            [
                "node n2", "node n3", "node n4", "node n5", "node n6", "node n7", "node n8",
                "node n9", "node n10", "node n11"
            ]
        );
        assert_eq!(calls.last().unwrap(), "shutdown");
        assert!(calls.contains(&"collect".to_string()));

        // session artifacts were persisted
        let session_dir = dir.path().join("session");
        assert_eq!(
            fs::read_to_string(session_dir.join("k.txt")).unwrap(),
            "2"
        );
        assert!(session_dir.join("lib").join("meander.jar").exists());
    }

    #[tokio::test]
    async fn teardown_runs_when_provisioning_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut rt = MockRuntime::new(dir.path().join("session"));
        rt.fail_on_node = Some(5);
        let params = test_params(dir.path());

        let err = run_trial(&rt, &params, &ctx(2)).await.unwrap_err();
        assert!(matches!(err, SessionError::Runtime(_)));

        let calls = rt.calls();
        assert_eq!(calls.last().unwrap(), "shutdown");
        assert!(!calls.contains(&"instantiate".to_string()));
    }

    #[tokio::test]
    async fn stuck_trial_fails_with_liveness_timeout_but_still_tears_down() {
        let dir = tempfile::tempdir().unwrap();
        let mut rt = MockRuntime::new(dir.path().join("session"));
        rt.write_marker = false;
        let params = test_params(dir.path());

        let err = run_trial(&rt, &params, &ctx(1)).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Completion(WatcherError::LivenessTimeout(_))
        ));
        assert_eq!(rt.calls().last().unwrap(), "shutdown");
    }

    #[tokio::test]
    async fn missing_required_constraints_abort_before_provisioning() {
        let dir = tempfile::tempdir().unwrap();
        let rt = MockRuntime::new(dir.path().join("session"));
        let mut params = test_params(dir.path());
        params.constraints = Some("constraints.txt".to_string());

        let err = run_trial(&rt, &params, &ctx(1)).await.unwrap_err();
        assert!(matches!(err, SessionError::MissingConstraints(_)));
        assert!(rt.calls().is_empty());
    }

    #[tokio::test]
    async fn recorded_mapping_takes_precedence_and_is_copied_in() {
        let dir = tempfile::tempdir().unwrap();
        let rt = MockRuntime::new(dir.path().join("session"));
        let params = test_params(dir.path());
        let context = ctx(1);

        let record = experiments::mapping_record(&params.data_dir, context.run_id, context.trial);
        fs::create_dir_all(record.parent().unwrap()).unwrap();
        fs::write(&record, "n3=op1\n").unwrap();

        run_trial(&rt, &params, &context).await.unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("session").join("mappingRecordIn.txt")).unwrap(),
            "n3=op1\n"
        );
    }

    #[tokio::test]
    async fn invalid_shape_combination_aborts_before_any_session_exists() {
        let dir = tempfile::tempdir().unwrap();
        let rt = MockRuntime::new(dir.path().join("session"));
        let mut params = test_params(dir.path());
        params.query = crate::topology::QueryShape::Join;
        params.h = 2;

        let err = run_trial(&rt, &params, &ctx(2)).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Topology(TopologyError::JoinHeight(2))
        ));
        assert!(rt.calls().is_empty());
    }
}
