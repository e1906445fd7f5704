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
//! Session-scoped text artifacts, persisted for post-hoc debugging of a trial.

use std::{fs, io, path::Path};

use crate::{experiments::ExperimentParams, topology::ShapeParams};

/// Persist the trial's key parameters as plain text files in the session
/// directory. Downstream tooling greps these; none are read back by the
/// orchestration itself.
pub fn write_all(
    session_dir: &Path,
    params: &ExperimentParams,
    k: usize,
    mobility: f64,
    trial: usize,
) -> io::Result<()> {
    fs::write(session_dir.join("k.txt"), k.to_string())?;
    fs::write(session_dir.join("h.txt"), params.h.to_string())?;
    fs::write(session_dir.join("query.txt"), params.query.to_string())?;
    write_extra_params(session_dir, &params.shape)?;
    write_session_params(session_dir, params, k, mobility, trial)?;
    Ok(())
}

fn write_extra_params(session_dir: &Path, shape: &ShapeParams) -> io::Result<()> {
    let body = format!(
        "sources={}\nsinks={}\nfanin={}\n",
        shape.sources, shape.sinks, shape.fan_in
    );
    fs::write(session_dir.join("extra_params.txt"), body)
}

fn write_session_params(
    session_dir: &Path,
    params: &ExperimentParams,
    k: usize,
    mobility: f64,
    trial: usize,
) -> io::Result<()> {
    let mut body = String::new();
    body.push_str(&format!("k={k}\n"));
    body.push_str(&format!("mobility={mobility}\n"));
    body.push_str(&format!("session={trial}\n"));
    for (key, value) in params.to_keyvalues() {
        body.push_str(&format!("{key}={value}\n"));
    }
    fs::write(session_dir.join("session_params.txt"), body)
}

/// Stage the query engine's executable jar into the session's private `lib/`.
pub fn stage_query_jar(jar: &Path, session_dir: &Path) -> io::Result<()> {
    let dest = session_dir.join("lib");
    fs::create_dir_all(&dest)?;
    let name = jar
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "jar path has no file name"))?;
    fs::copy(jar, dest.join(name))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::experiments::ExperimentParams;

    #[test]
    fn artifacts_are_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let params = ExperimentParams::default();
        write_all(dir.path(), &params, 3, 2.0, 1).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("k.txt")).unwrap(), "3");
        assert_eq!(fs::read_to_string(dir.path().join("h.txt")).unwrap(), "2");
        assert_eq!(
            fs::read_to_string(dir.path().join("query.txt")).unwrap(),
            "chain"
        );
        let extra = fs::read_to_string(dir.path().join("extra_params.txt")).unwrap();
        assert!(extra.contains("sources=4"));
        assert!(extra.contains("fanin=2"));
        let session = fs::read_to_string(dir.path().join("session_params.txt")).unwrap();
        assert!(session.contains("k=3\n"));
        assert!(session.contains("mobility=2\n"));
        assert!(session.contains("nodes=10\n"));
    }

    #[test]
    fn jar_lands_in_the_lib_dir() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("meander.jar");
        fs::write(&jar, b"jar bytes").unwrap();

        let session = dir.path().join("session");
        fs::create_dir(&session).unwrap();
        stage_query_jar(&jar, &session).unwrap();

        assert_eq!(
            fs::read(session.join("lib").join("meander.jar")).unwrap(),
            b"jar bytes"
        );
    }
}
