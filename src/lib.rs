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
//! Library for orchestrating replicated stream-query experiments on an emulated wireless network.

/// Identifier of a provisioned node within the emulation runtime.
pub type NodeId = u32;

/// A 2-D coordinate in the emulated physical space (1 pixel = 1 meter).
pub type Position = (i64, i64);

/// Ordered per-node worker counts produced by the topology compiler.
pub type WorkerCountPlan = Vec<usize>;

pub mod experiments;
pub mod mobility;
pub mod placement;
pub mod plot;
pub mod session;
pub mod stats;
pub mod topology;
pub mod util;

pub mod prelude {
    pub use super::{
        experiments::{runner::run_experiment, ExperimentParams},
        placement::grid_position,
        session::{run_trial, SessionError, TrialContext},
        stats::{record_statistics, summarize, Metric},
        topology::{worker_counts, QueryShape, ShapeParams},
        NodeId, Position, WorkerCountPlan,
    };
}
