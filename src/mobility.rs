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
//! Module wiring node mobility: trace generation (external collaborator) and ns2-script config.

use std::path::{Path, PathBuf};

use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;

use crate::NodeId;

#[derive(Debug, Error)]
pub enum MobilityError {
    #[error("could not invoke the trace generator: {0}")]
    Io(#[from] std::io::Error),
    #[error("trace generator failed ({status}): {stderr}")]
    Generator { status: String, stderr: String },
    #[error("invalid node mapping: {trace_indices} trace indices for {nodes} nodes")]
    InvalidNodeMap { trace_indices: usize, nodes: usize },
}

/// External mobility-trace generator.
///
/// The generator is an opaque collaborator: it receives the session directory,
/// the trial index and the mobility parameters, and prints the path of the
/// produced trace file (or nothing, when the profile yields no movement).
#[derive(Clone, Debug)]
pub struct TraceGenerator {
    script: PathBuf,
}

impl TraceGenerator {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
        }
    }

    /// Generate a mobility trace for one trial.
    ///
    /// The velocity range handed to the generator is synthesized from the
    /// configuration's mobility value as `(mobility - 1, mobility + 1)`.
    pub async fn generate(
        &self,
        session_dir: &Path,
        trial: usize,
        mobility: f64,
        nodes: usize,
    ) -> Result<Option<PathBuf>, MobilityError> {
        let output = Command::new(&self.script)
            .arg("--out")
            .arg(session_dir)
            .arg("--session")
            .arg(trial.to_string())
            .arg("--low")
            .arg(format!("{}", mobility - 1.0))
            .arg("--high")
            .arg(format!("{}", mobility + 1.0))
            .arg("--nodes")
            .arg(nodes.to_string())
            .output()
            .await?;

        if !output.status.success() {
            return Err(MobilityError::Generator {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let Some(name) = stdout.lines().map(str::trim).filter(|l| !l.is_empty()).last() else {
            return Ok(None);
        };
        let trace = PathBuf::from(name);
        let trace = if trace.is_absolute() {
            trace
        } else {
            session_dir.join(trace)
        };
        log::debug!("trace file: {}", trace.display());
        Ok(Some(trace))
    }
}

/// ns2-script mobility configuration attached to the wireless medium.
#[derive(Clone, Debug, Serialize)]
pub struct MobilityConfig {
    pub trace_file: PathBuf,
    pub refresh_ms: u64,
    pub node_map: String,
}

impl MobilityConfig {
    /// Key/value view in the form the emulation runtime's ns2script model expects.
    pub fn to_keyvalues(&self) -> Vec<(String, String)> {
        vec![
            ("file".to_string(), self.trace_file.display().to_string()),
            ("refresh_ms".to_string(), self.refresh_ms.to_string()),
            ("loop".to_string(), "1".to_string()),
            ("autostart".to_string(), "1.0".to_string()),
            ("map".to_string(), self.node_map.clone()),
            ("script_start".to_string(), String::new()),
            ("script_pause".to_string(), String::new()),
            ("script_stop".to_string(), String::new()),
        ]
    }
}

/// Map trace node indices onto provisioned node ids, `idx:id` comma-joined.
///
/// Trace coordinates are indexed from zero while the runtime numbers the
/// provisioned nodes; both sequences must line up one-to-one.
pub fn node_map(trace_indices: usize, nodes: &[NodeId]) -> Result<String, MobilityError> {
    if trace_indices != nodes.len() {
        return Err(MobilityError::InvalidNodeMap {
            trace_indices,
            nodes: nodes.len(),
        });
    }
    Ok(nodes
        .iter()
        .enumerate()
        .map(|(idx, id)| format!("{idx}:{id}"))
        .join(","))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn node_map_pairs_indices_with_ids() {
        assert_eq!(node_map(3, &[3, 4, 5]).unwrap(), "0:3,1:4,2:5");
    }

    #[test]
    fn node_map_rejects_mismatched_lengths() {
        assert!(matches!(
            node_map(2, &[3, 4, 5]),
            Err(MobilityError::InvalidNodeMap {
                trace_indices: 2,
                nodes: 3
            })
        ));
    }

    #[test]
    fn keyvalues_carry_the_trace_wiring() {
        let cfg = MobilityConfig {
            trace_file: PathBuf::from("/tmp/session/rwpt.ns_movements"),
            refresh_ms: 500,
            node_map: "0:3,1:4".to_string(),
        };
        let kvs = cfg.to_keyvalues();
        assert_eq!(kvs[0].0, "file");
        assert_eq!(kvs[0].1, "/tmp/session/rwpt.ns_movements");
        assert_eq!(kvs[1], ("refresh_ms".to_string(), "500".to_string()));
        assert_eq!(kvs[4], ("map".to_string(), "0:3,1:4".to_string()));
    }
}
