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
//! Narrow interface of the external network-emulation runtime.
//!
//! The runtime owns virtual nodes, links and process supervision; this crate
//! only decides what to provision where. [`ShellRuntime`] drives a runtime
//! adapter executable, one subcommand per operation.

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::Serialize;
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tokio::process::Command;

use crate::{mobility::MobilityConfig, NodeId, Position};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("could not invoke the runtime adapter: {0}")]
    Io(#[from] std::io::Error),
    #[error("runtime adapter failed ({status}): {stderr}")]
    Adapter { status: String, stderr: String },
    #[error("malformed runtime adapter response: {0}")]
    Response(String),
}

/// Session-wide settings handed to the runtime at creation time.
#[derive(Clone, Debug, Serialize)]
pub struct SessionConfig {
    pub services_dir: PathBuf,
    pub emane_log_level: u8,
    pub verbose: bool,
    pub preserve_dirs: bool,
    pub controlnet: Option<String>,
}

/// Wireless propagation model backing the shared medium.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString, Serialize)]
pub enum WirelessModel {
    /// EMANE IEEE 802.11abg model.
    #[default]
    #[strum(serialize = "Emane")]
    Emane,
    /// Basic on/off range model.
    #[strum(serialize = "Basic")]
    Basic,
}

/// The shared wireless medium all workers and routers attach to.
#[derive(Clone, Debug, Serialize)]
pub struct WirelessConfig {
    pub id: NodeId,
    pub name: String,
    pub model: WirelessModel,
    pub position: Position,
    pub options: Vec<(String, String)>,
}

impl WirelessConfig {
    /// 802.11 medium tuned for a ~915 m ping range at 1:1 pixels to meters.
    pub fn emane_80211() -> Self {
        Self {
            id: 1,
            name: "wlan1".to_string(),
            model: WirelessModel::Emane,
            position: (80, 50),
            options: [
                ("mode", "3"),
                ("propagationmodel", "2ray"),
                ("multicastrate", "4"),
                ("unicastrate", "4"),
                ("txpower", "-10.0"),
                ("flowcontrolenable", "on"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        }
    }

    /// Basic range model, matched to the effective EMANE range and bandwidth.
    pub fn basic_range() -> Self {
        Self {
            id: 1,
            name: "wlan1".to_string(),
            model: WirelessModel::Basic,
            position: (80, 50),
            options: [("range", "500"), ("bandwidth", "11000")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn for_model(model: WirelessModel) -> Self {
        match model {
            WirelessModel::Emane => Self::emane_80211(),
            WirelessModel::Basic => Self::basic_range(),
        }
    }
}

/// One emulated node to provision: master, worker, or router-only filler.
#[derive(Clone, Debug, Serialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub name: String,
    /// Colon-joined onto the adapter command line.
    pub services: Vec<String>,
    pub position: Position,
    /// Address on the shared wireless medium; the master attaches none.
    pub address: Option<String>,
}

/// Runtime state transition a hook script can be attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, Serialize)]
pub enum HookPhase {
    #[strum(serialize = "datacollect")]
    DataCollect,
}

/// Factory for live emulation sessions.
#[async_trait]
pub trait EmulationRuntime: Send + Sync {
    async fn create_session(
        &self,
        cfg: &SessionConfig,
    ) -> Result<Box<dyn EmulationSession>, RuntimeError>;
}

/// One live session: the exclusively-owned provisioning handle for a trial.
///
/// Methods mirror the runtime's lifecycle; `shutdown` must always be called,
/// also after an error in any earlier step.
#[async_trait]
pub trait EmulationSession: Send {
    /// Directory the runtime created for this session's working files.
    fn session_dir(&self) -> &Path;

    async fn add_wireless(&mut self, cfg: &WirelessConfig) -> Result<NodeId, RuntimeError>;

    async fn add_node(&mut self, spec: &NodeSpec) -> Result<NodeId, RuntimeError>;

    async fn set_mobility(&mut self, wlan: NodeId, cfg: &MobilityConfig)
        -> Result<(), RuntimeError>;

    /// Register `script` to run on the host once the runtime reaches `phase`.
    async fn add_hook(
        &mut self,
        phase: HookPhase,
        name: &str,
        script: &str,
    ) -> Result<(), RuntimeError>;

    async fn set_node_count(&mut self, count: usize) -> Result<(), RuntimeError>;

    /// Hand control to the runtime to materialize nodes, links and processes.
    async fn instantiate(&mut self) -> Result<(), RuntimeError>;

    async fn collect_data(&mut self) -> Result<(), RuntimeError>;

    async fn shutdown(&mut self) -> Result<(), RuntimeError>;
}

/// Runtime implementation driving an adapter executable.
#[derive(Clone, Debug)]
pub struct ShellRuntime {
    adapter: PathBuf,
}

impl ShellRuntime {
    pub fn new(adapter: impl Into<PathBuf>) -> Self {
        Self {
            adapter: adapter.into(),
        }
    }
}

async fn run_adapter(
    adapter: &Path,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String, RuntimeError> {
    let output = Command::new(adapter).args(args).output().await?;
    if !output.status.success() {
        return Err(RuntimeError::Adapter {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[async_trait]
impl EmulationRuntime for ShellRuntime {
    async fn create_session(
        &self,
        cfg: &SessionConfig,
    ) -> Result<Box<dyn EmulationSession>, RuntimeError> {
        let mut args = vec![
            "create-session".to_string(),
            "--services-dir".to_string(),
            cfg.services_dir.display().to_string(),
            "--emane-log-level".to_string(),
            cfg.emane_log_level.to_string(),
        ];
        if let Some(controlnet) = &cfg.controlnet {
            args.push("--controlnet".to_string());
            args.push(controlnet.clone());
        }
        if cfg.preserve_dirs {
            args.push("--preserve".to_string());
        }
        if cfg.verbose {
            args.push("--verbose".to_string());
        }

        let stdout = run_adapter(&self.adapter, &args).await?;
        let session_dir = stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .ok_or_else(|| {
                RuntimeError::Response("create-session returned no session directory".to_string())
            })?;
        log::info!("created session at {session_dir}");

        Ok(Box::new(ShellSession {
            adapter: self.adapter.clone(),
            session_dir: PathBuf::from(session_dir),
        }))
    }
}

struct ShellSession {
    adapter: PathBuf,
    session_dir: PathBuf,
}

impl ShellSession {
    fn base_args(&self, op: &str) -> Vec<String> {
        vec![
            op.to_string(),
            "--session".to_string(),
            self.session_dir.display().to_string(),
        ]
    }
}

#[async_trait]
impl EmulationSession for ShellSession {
    fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    async fn add_wireless(&mut self, cfg: &WirelessConfig) -> Result<NodeId, RuntimeError> {
        let mut args = self.base_args("add-wireless");
        args.extend([
            "--id".to_string(),
            cfg.id.to_string(),
            "--name".to_string(),
            cfg.name.clone(),
            "--model".to_string(),
            cfg.model.to_string(),
            "--x".to_string(),
            cfg.position.0.to_string(),
            "--y".to_string(),
            cfg.position.1.to_string(),
        ]);
        for (key, value) in &cfg.options {
            args.push("--opt".to_string());
            args.push(format!("{key}={value}"));
        }
        run_adapter(&self.adapter, &args).await?;
        Ok(cfg.id)
    }

    async fn add_node(&mut self, spec: &NodeSpec) -> Result<NodeId, RuntimeError> {
        let mut args = self.base_args("add-node");
        args.extend([
            "--id".to_string(),
            spec.id.to_string(),
            "--name".to_string(),
            spec.name.clone(),
            "--x".to_string(),
            spec.position.0.to_string(),
            "--y".to_string(),
            spec.position.1.to_string(),
            "--services".to_string(),
            spec.services.join(":"),
        ]);
        if let Some(address) = &spec.address {
            args.push("--address".to_string());
            args.push(address.clone());
        }
        run_adapter(&self.adapter, &args).await?;
        log::debug!(
            "created node {} ({}) at ({}, {})",
            spec.name,
            spec.address.as_deref().unwrap_or("no interface"),
            spec.position.0,
            spec.position.1
        );
        Ok(spec.id)
    }

    async fn set_mobility(
        &mut self,
        wlan: NodeId,
        cfg: &MobilityConfig,
    ) -> Result<(), RuntimeError> {
        let mut args = self.base_args("set-mobility");
        args.extend(["--wlan".to_string(), wlan.to_string()]);
        for (key, value) in cfg.to_keyvalues() {
            args.push("--opt".to_string());
            args.push(format!("{key}={value}"));
        }
        run_adapter(&self.adapter, &args).await?;
        Ok(())
    }

    async fn add_hook(
        &mut self,
        phase: HookPhase,
        name: &str,
        script: &str,
    ) -> Result<(), RuntimeError> {
        let script_path = self.session_dir.join(name);
        std::fs::write(&script_path, script)?;

        let mut args = self.base_args("add-hook");
        args.extend([
            "--phase".to_string(),
            phase.to_string(),
            "--script".to_string(),
            script_path.display().to_string(),
        ]);
        run_adapter(&self.adapter, &args).await?;
        Ok(())
    }

    async fn set_node_count(&mut self, count: usize) -> Result<(), RuntimeError> {
        let mut args = self.base_args("set-node-count");
        args.extend(["--count".to_string(), count.to_string()]);
        run_adapter(&self.adapter, &args).await?;
        Ok(())
    }

    async fn instantiate(&mut self) -> Result<(), RuntimeError> {
        run_adapter(&self.adapter, &self.base_args("instantiate")).await?;
        Ok(())
    }

    async fn collect_data(&mut self) -> Result<(), RuntimeError> {
        run_adapter(&self.adapter, &self.base_args("collect-data")).await?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), RuntimeError> {
        run_adapter(&self.adapter, &self.base_args("shutdown")).await?;
        Ok(())
    }
}
