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
//! Module placing emulated nodes in physical space, on a grid or from a static placement file.

use std::{collections::HashMap, path::Path};

use thiserror::Error;

use crate::Position;

/// First node index mapped onto the grid (node 2 is the master, placed apart).
pub const GRID_OFFSET: usize = 3;

/// Grid spacing in emulated meters, chosen below the wireless ping range.
pub const GRID_SPACING: i64 = 600;

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("invalid grid offset for node {index}: {offset}")]
    IndexBeforeOffset { index: usize, offset: usize },
    #[error("cannot lay out a grid for zero nodes")]
    EmptyGrid,
    #[error("no placement recorded for node {0}")]
    MissingNode(usize),
    #[error("malformed placement record on line {line}: expected id,x,y")]
    BadRecord { line: usize },
    #[error("could not read placement file: {0}")]
    Read(#[from] csv::Error),
}

/// Grid coordinate of node `index` on a square grid over `nodes` slots.
///
/// Deterministic in its inputs, so repeated trials reproduce the same layout.
pub fn grid_position(
    index: usize,
    nodes: usize,
    offset: usize,
    spacing: i64,
) -> Result<Position, PlacementError> {
    if index < offset {
        return Err(PlacementError::IndexBeforeOffset { index, offset });
    }
    if nodes == 0 {
        return Err(PlacementError::EmptyGrid);
    }
    let dim = (nodes as f64).sqrt().ceil() as usize;
    let col = (index - offset) % dim;
    let row = (index - offset) / dim;
    Ok((spacing * col as i64, spacing * row as i64))
}

/// Load a static placement file: one `id,x,y` record per line.
pub fn load_static_placements(path: &Path) -> Result<HashMap<usize, Position>, PlacementError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut placements = HashMap::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let line = i + 1;
        let mut fields = record.iter();
        let (Some(id), Some(x), Some(y), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(PlacementError::BadRecord { line });
        };
        let (Ok(id), Ok(x), Ok(y)) = (id.parse(), x.parse(), y.parse()) else {
            return Err(PlacementError::BadRecord { line });
        };
        placements.insert(id, (x, y));
    }
    Ok(placements)
}

/// Resolve the static placements to use for a trial, if any.
///
/// A placement file only applies to static layouts: once mobility is enabled
/// the trace drives all positions and the file is ignored.
pub fn initial_placements(
    placement_file: Option<&Path>,
    mobility: f64,
) -> Result<Option<HashMap<usize, Position>>, PlacementError> {
    match placement_file {
        Some(path) if mobility == 0.0 => Ok(Some(load_static_placements(path)?)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    #[test]
    fn grid_is_deterministic() {
        for index in 3..12 {
            assert_eq!(
                grid_position(index, 9, GRID_OFFSET, GRID_SPACING).unwrap(),
                grid_position(index, 9, GRID_OFFSET, GRID_SPACING).unwrap()
            );
        }
    }

    #[test]
    fn grid_is_injective_within_one_grid() {
        let nodes = 9; // dim = 3
        let positions: Vec<_> = (GRID_OFFSET..GRID_OFFSET + nodes)
            .map(|i| grid_position(i, nodes, GRID_OFFSET, GRID_SPACING).unwrap())
            .collect();
        for (a, pa) in positions.iter().enumerate() {
            for (b, pb) in positions.iter().enumerate() {
                if a != b {
                    assert_ne!(pa, pb);
                }
            }
        }
    }

    #[test]
    fn grid_wraps_at_the_row_boundary() {
        // nodes = 9 -> dim = 3, spacing 600
        assert_eq!(grid_position(3, 9, 3, 600).unwrap(), (0, 0));
        assert_eq!(grid_position(4, 9, 3, 600).unwrap(), (600, 0));
        assert_eq!(grid_position(5, 9, 3, 600).unwrap(), (1200, 0));
        assert_eq!(grid_position(6, 9, 3, 600).unwrap(), (0, 600));
        assert_eq!(grid_position(11, 9, 3, 600).unwrap(), (1200, 1200));
    }

    #[test]
    fn grid_rejects_indices_before_the_offset() {
        assert!(matches!(
            grid_position(2, 9, 3, 600),
            Err(PlacementError::IndexBeforeOffset {
                index: 2,
                offset: 3
            })
        ));
    }

    #[test]
    fn static_placements_parse() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "3,0,0").unwrap();
        writeln!(file, "4,600,0").unwrap();
        writeln!(file, "5,0,600").unwrap();
        file.flush().unwrap();

        let placements = load_static_placements(file.path()).unwrap();
        assert_eq!(placements.len(), 3);
        assert_eq!(placements[&4], (600, 0));
    }

    #[test]
    fn static_placements_reject_malformed_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "3,0,0").unwrap();
        writeln!(file, "4,sixhundred,0").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            load_static_placements(file.path()),
            Err(PlacementError::BadRecord { line: 2 })
        ));
    }

    #[test]
    fn mobility_overrides_static_placements() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "3,0,0").unwrap();
        file.flush().unwrap();

        assert!(initial_placements(Some(file.path()), 2.0)
            .unwrap()
            .is_none());
        assert!(initial_placements(Some(file.path()), 0.0)
            .unwrap()
            .is_some());
        assert!(initial_placements(None, 0.0).unwrap().is_none());
    }
}
