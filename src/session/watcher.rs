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
//! Module detecting distributed-query completion through shutdown marker files.

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use thiserror::Error;

use crate::WorkerCountPlan;

/// Polling cadence of the completion watcher.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("no query process wrote a shutdown marker within {0:?}")]
    LivenessTimeout(Duration),
}

/// The marker that ended the wait.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionMarker {
    pub node: String,
    pub process: String,
    pub path: PathBuf,
}

/// Polls the session directory until any master or worker process signals
/// that it has finished, by creating `<node>.conf/<process>.shutdown`.
#[derive(Clone, Debug)]
pub struct CompletionWatcher {
    session_dir: PathBuf,
    node_names: Vec<String>,
    processes: Vec<String>,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl CompletionWatcher {
    /// Watcher over the master node and the plan's worker nodes.
    ///
    /// The master node is node 2, workers follow at 3..3+len(plan). Worker
    /// process names run up to the largest per-node instance count.
    pub fn for_plan(
        session_dir: impl Into<PathBuf>,
        plan: &WorkerCountPlan,
        poll_interval: Duration,
        timeout: Option<Duration>,
    ) -> Self {
        let node_names = (2..3 + plan.len()).map(|i| format!("n{i}")).collect();
        let max_workers = plan.iter().copied().max().unwrap_or(0);
        let processes = std::iter::once("master".to_string())
            .chain((1..=max_workers).map(|w| format!("worker{w}")))
            .collect();
        Self {
            session_dir: session_dir.into(),
            node_names,
            processes,
            poll_interval,
            timeout,
        }
    }

    /// Single sweep over all (node, process) pairs; no suspension.
    pub fn poll_once(&self) -> Option<CompletionMarker> {
        for node in &self.node_names {
            for process in &self.processes {
                let path = self
                    .session_dir
                    .join(format!("{node}.conf"))
                    .join(format!("{process}.shutdown"));
                if path.exists() {
                    return Some(CompletionMarker {
                        node: node.clone(),
                        process: process.clone(),
                        path,
                    });
                }
            }
        }
        None
    }

    /// Suspend until the first marker appears.
    ///
    /// A timeout of `None` waits unboundedly; with `Some(t)` a trial that
    /// produces no marker within `t` fails with [`WatcherError::LivenessTimeout`].
    pub async fn wait(&self) -> Result<CompletionMarker, WatcherError> {
        let started = Instant::now();
        loop {
            if let Some(marker) = self.poll_once() {
                log::info!(
                    "shutdown marker for node {} ({}) - done waiting",
                    marker.node,
                    marker.process
                );
                return Ok(marker);
            }
            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    return Err(WatcherError::LivenessTimeout(timeout));
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;

    fn watcher(dir: &std::path::Path, timeout: Option<Duration>) -> CompletionWatcher {
        CompletionWatcher::for_plan(dir, &vec![1, 2, 1], Duration::from_millis(10), timeout)
    }

    #[test]
    fn watches_master_and_all_plan_workers() {
        let w = watcher(std::path::Path::new("/tmp"), None);
        assert_eq!(w.node_names, ["n2", "n3", "n4", "n5"]);
        assert_eq!(w.processes, ["master", "worker1", "worker2"]);
    }

    #[test]
    fn poll_once_finds_a_marker() {
        let dir = tempfile::tempdir().unwrap();
        let w = watcher(dir.path(), None);
        assert!(w.poll_once().is_none());

        let conf = dir.path().join("n4.conf");
        fs::create_dir(&conf).unwrap();
        fs::write(conf.join("worker2.shutdown"), "").unwrap();

        let marker = w.poll_once().unwrap();
        assert_eq!(marker.node, "n4");
        assert_eq!(marker.process, "worker2");
    }

    #[tokio::test]
    async fn wait_returns_once_a_marker_appears() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("n2.conf");
        fs::create_dir(&conf).unwrap();

        let w = watcher(dir.path(), None);
        let marker_path = conf.join("master.shutdown");
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            fs::write(marker_path, "").unwrap();
        });

        let marker = w.wait().await.unwrap();
        assert_eq!(marker.node, "n2");
        assert_eq!(marker.process, "master");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn wait_times_out_without_markers() {
        let dir = tempfile::tempdir().unwrap();
        let w = watcher(dir.path(), Some(Duration::from_millis(50)));
        assert!(matches!(
            w.wait().await,
            Err(WatcherError::LivenessTimeout(_))
        ));
    }
}
