//! Concorde subprocess backend.
//!
//! Writes the TSPLIB problem file, runs `concorde -o <solution> -x <problem>`
//! from the solution's directory (Concorde drops scratch files in its working
//! directory), and reads the solution back. A non-zero exit status is logged
//! but not fatal; the solution file decides.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};

use super::tsplib::{read_solution, write_problem, SequencingFiles};
use super::{require_square, Permutation, TourError, TourSolver};
use crate::distance::DistanceMatrix;

#[derive(Clone, Debug)]
pub struct ConcordeSolver {
    pub executable: PathBuf,
    pub files: SequencingFiles,
}

impl ConcordeSolver {
    pub fn new(executable: impl Into<PathBuf>, files: SequencingFiles) -> Self {
        Self {
            executable: executable.into(),
            files,
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf, TourError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

impl TourSolver for ConcordeSolver {
    fn name(&self) -> &str {
        "concorde"
    }

    fn solve_cyclic_tour(&self, matrix: &DistanceMatrix) -> Result<Permutation, TourError> {
        let frames = require_square(matrix)?;
        let problem = absolute(&self.files.problem)?;
        let solution = absolute(&self.files.solution)?;

        write_problem(&problem, matrix)?;
        debug!(path = %problem.display(), frames, "wrote TSP problem");
        // A solution left over from an earlier run must not be mistaken for this one.
        if solution.exists() {
            std::fs::remove_file(&solution)?;
        }

        let mut cmd = Command::new(&self.executable);
        cmd.arg("-o").arg(&solution).arg("-x").arg(&problem);
        if let Some(dir) = solution.parent() {
            cmd.current_dir(dir);
        }
        info!(program = %self.executable.display(), "running tour solver");
        let output = cmd.output().map_err(|source| TourError::SolverLaunch {
            program: self.executable.clone(),
            source,
        })?;
        if !output.status.success() {
            warn!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "tour solver exited unsuccessfully"
            );
        }
        read_solution(&solution, frames)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-concorde.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn reads_solution_written_by_the_solver() {
        let dir = tempdir().unwrap();
        // $2 is the solution path; the body ignores the problem.
        let exe = script(dir.path(), "printf '3\\n0 2 1\\n' > \"$2\"");
        let files = SequencingFiles::from_prefix(&dir.path().join("run"));
        let solver = ConcordeSolver::new(exe, files.clone());
        let m = DistanceMatrix::from_element(3, 3, 1.0);
        let perm = solver.solve_cyclic_tour(&m).unwrap();
        assert_eq!(perm.as_slice(), &[0, 2, 1]);
        assert!(files.problem.exists());
    }

    #[test]
    fn stale_solution_is_not_reused() {
        let dir = tempdir().unwrap();
        let exe = script(dir.path(), "exit 3");
        let files = SequencingFiles::from_prefix(&dir.path().join("run"));
        std::fs::write(&files.solution, "3\n0 1 2\n").unwrap();
        let solver = ConcordeSolver::new(exe, files);
        let m = DistanceMatrix::from_element(3, 3, 1.0);
        assert!(matches!(
            solver.solve_cyclic_tour(&m),
            Err(TourError::SolutionNotFound(_))
        ));
    }

    #[test]
    fn missing_executable_is_a_launch_error() {
        let dir = tempdir().unwrap();
        let files = SequencingFiles::from_prefix(&dir.path().join("run"));
        let solver = ConcordeSolver::new(dir.path().join("no-such-solver"), files);
        let m = DistanceMatrix::from_element(2, 2, 1.0);
        assert!(matches!(
            solver.solve_cyclic_tour(&m),
            Err(TourError::SolverLaunch { .. })
        ));
    }
}
