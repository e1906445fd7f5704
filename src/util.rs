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
//! Utility module collection of functions

use std::{
    fs,
    num::{ParseFloatError, ParseIntError},
    path::{Path, PathBuf},
};

pub fn init_logging() {
    log4rs::init_file("log4rs.yml", Default::default()).unwrap();
}

/// Timestamp identifying one experiment run, e.g. `10-42-07-Wed060826`.
pub fn run_timestamp() -> String {
    chrono::Local::now().format("%H-%M-%S-%a%d%m%y").to_string()
}

/// Parse a comma-separated list of replication factors.
pub fn parse_usize_list(list: &str) -> Result<Vec<usize>, ParseIntError> {
    list.split(',').map(|x| x.trim().parse()).collect()
}

/// Parse a comma-separated list of mobility/pause-time values.
pub fn parse_f64_list(list: &str) -> Result<Vec<f64>, ParseFloatError> {
    list.split(',').map(|x| x.trim().parse()).collect()
}

/// Open up a result tree for other users: the external collaborators run
/// under different uids than the emulation runtime.
pub fn make_world_accessible(root: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(root, fs::Permissions::from_mode(0o777))?;
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                make_world_accessible(&entry.path())?;
            } else {
                fs::set_permissions(entry.path(), fs::Permissions::from_mode(0o777))?;
            }
        }
    }
    Ok(())
}

pub trait PathBufExt: Sized {
    fn then(self, p: impl AsRef<Path>) -> PathBuf;
}

impl PathBufExt for PathBuf {
    fn then(mut self, p: impl AsRef<Path>) -> PathBuf {
        self.push(p);
        self
    }
}

impl PathBufExt for &Path {
    fn then(self, p: impl AsRef<Path>) -> PathBuf {
        let mut path = self.to_path_buf();
        path.push(p);
        path
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lists_parse() {
        assert_eq!(parse_usize_list("1,2,3,5").unwrap(), vec![1, 2, 3, 5]);
        assert_eq!(
            parse_f64_list("0.0, 2.0,4.0").unwrap(),
            vec![0.0, 2.0, 4.0]
        );
        assert!(parse_usize_list("1,x").is_err());
        assert!(parse_f64_list("").is_err());
    }

    #[test]
    fn then_chains_path_segments() {
        assert_eq!(
            Path::new("log").then("run").then("1k"),
            PathBuf::from("log/run/1k")
        );
    }
}
