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
//! Module compiling a query topology into per-node worker counts.

use std::str::FromStr;

use serde::Serialize;
use strum_macros::{Display, EnumString};
use thiserror::Error;

use crate::WorkerCountPlan;

/// Shape of the distributed query to deploy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
pub enum QueryShape {
    /// Linear pipeline of `h` replicated stages between a source and a sink.
    #[strum(serialize = "chain")]
    #[serde(rename = "chain")]
    Chain,
    /// Fanout-ring variant of the chain; same worker layout.
    #[strum(serialize = "fr")]
    #[serde(rename = "fr")]
    FanoutRing,
    /// Two chains joined by a single join stage; only height 1 is supported.
    #[strum(serialize = "join")]
    #[serde(rename = "join")]
    Join,
    /// Fixed 23-stage DEBS Grand Challenge 2013 benchmark query.
    #[strum(serialize = "debsGC13")]
    #[serde(rename = "debsGC13")]
    DebsGc13,
    /// Name-assist demo query: a double source followed by `1 + 3k` stages.
    #[strum(serialize = "nameAssist")]
    #[serde(rename = "nameAssist")]
    NameAssist,
    /// Fan-in aggregation query joining `sources` streams down to `sinks`.
    #[strum(serialize = "heatMap")]
    #[serde(rename = "heatMap")]
    HeatMap,
}

/// Extra parameters consumed by the fan-in aggregation shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ShapeParams {
    pub sources: usize,
    pub sinks: usize,
    pub fan_in: usize,
}

impl Default for ShapeParams {
    fn default() -> Self {
        Self {
            sources: 4,
            sinks: 1,
            fan_in: 2,
        }
    }
}

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("unknown query type: {0}")]
    UnknownShape(String),
    #[error("join queries only support a chain height of 1 (got {0})")]
    JoinHeight(usize),
    #[error("the 23-stage benchmark only supports k <= 2 and h <= 1 (got k={k}, h={h})")]
    BenchmarkRange { k: usize, h: usize },
    #[error("fan-in must be at least 2 (got {0})")]
    InvalidFanIn(usize),
    #[error(
        "not enough worker nodes for the fan-in query: need {needed}, only {available} available"
    )]
    InsufficientCapacity { needed: usize, available: usize },
}

/// Number of logical stages in the DEBS GC'13 benchmark query.
const BENCHMARK_STAGES: usize = 23;

/// Stage indices receiving one extra replica when h > 0.
///
/// Branches A and B each replicate their RB, RM and RF operators.
const BENCHMARK_H_INCREMENTS: [usize; 6] = [1, 5, 9, 12, 16, 20];

/// Additional stage indices (RCB, RCM, LF per branch) incremented when k > 1.
const BENCHMARK_K_INCREMENTS: [usize; 6] = [2, 6, 10, 13, 17, 21];

/// Parse a user-supplied query shape name.
pub fn parse_shape(name: &str) -> Result<QueryShape, TopologyError> {
    QueryShape::from_str(name).map_err(|_| TopologyError::UnknownShape(name.to_string()))
}

/// Compile the worker-count plan for a query deployment.
///
/// The returned plan holds one entry per logical worker node (master excluded);
/// each entry is the number of worker service instances to start on that node.
/// Pure and deterministic in its inputs. `nodes` is the configured total node
/// count and only constrains the fan-in shape's capacity check.
pub fn worker_counts(
    shape: QueryShape,
    k: usize,
    h: usize,
    extra: &ShapeParams,
    nodes: usize,
) -> Result<WorkerCountPlan, TopologyError> {
    match shape {
        QueryShape::Chain | QueryShape::FanoutRing | QueryShape::Join => {
            let mut plan = vec![1; 2 + k * h];
            if shape == QueryShape::Join {
                if h != 1 {
                    return Err(TopologyError::JoinHeight(h));
                }
                plan.push(1);
            }
            Ok(plan)
        }
        QueryShape::DebsGc13 => {
            if k > 2 || h > 1 {
                return Err(TopologyError::BenchmarkRange { k, h });
            }
            let mut plan = vec![1; BENCHMARK_STAGES];
            if h > 0 {
                for &stage in &BENCHMARK_H_INCREMENTS {
                    plan[stage] += 1;
                }
                if k > 1 {
                    for &stage in &BENCHMARK_K_INCREMENTS {
                        plan[stage] += 1;
                    }
                }
            }
            Ok(plan)
        }
        QueryShape::NameAssist => {
            let mut plan = vec![2];
            plan.extend(std::iter::repeat(1).take(1 + k * 3));
            Ok(plan)
        }
        QueryShape::HeatMap => {
            let join_ops = join_tree_size(extra.sources, extra.fan_in)?;
            let needed = extra.sources + k * (join_ops + extra.sinks);
            let available = nodes.saturating_sub(2);
            if available < needed {
                // Co-locating replicas of the same operator (or the sources)
                // would change the failure domains under test, so refuse.
                return Err(TopologyError::InsufficientCapacity { needed, available });
            }
            Ok(vec![1; needed])
        }
    }
}

/// Total number of join operators in a fan-in tree over `sources` leaves.
///
/// Accumulates `parents = ceil(children / fan_in)` level by level until a
/// single root remains.
fn join_tree_size(sources: usize, fan_in: usize) -> Result<usize, TopologyError> {
    if fan_in < 2 {
        return Err(TopologyError::InvalidFanIn(fan_in));
    }
    let mut children = sources;
    let mut join_ops = 0;
    while children > 1 {
        let parents = children.div_ceil(fan_in);
        join_ops += parents;
        children = parents;
    }
    Ok(join_ops)
}
