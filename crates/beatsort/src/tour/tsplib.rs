//! TSPLIB problem files and Concorde solution files.
//!
//! Problem: explicit full-matrix TSPLIB with integer weights (each entry
//! truncated toward zero, formatted right-aligned in width 4, single-space
//! separated). Solution: whitespace-separated integers, the first being the
//! node count and the rest the visiting order.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::{require_square, Permutation, TourError};
use crate::distance::DistanceMatrix;

/// Locations of the problem and solution files of one sequencing run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequencingFiles {
    pub problem: PathBuf,
    pub solution: PathBuf,
}

impl SequencingFiles {
    /// `<prefix>_edge_weight.txt` and `<prefix>_solution.txt`.
    pub fn from_prefix(prefix: &Path) -> Self {
        let with = |suffix: &str| {
            let mut s = prefix.as_os_str().to_owned();
            s.push(suffix);
            PathBuf::from(s)
        };
        Self {
            problem: with("_edge_weight.txt"),
            solution: with("_solution.txt"),
        }
    }

    /// Default prefix for an input: `<dir>/<stem>_tsp_file`.
    pub fn for_input(input: &Path) -> Self {
        Self::from_prefix(&crate::io::sibling_path(input, "_tsp_file"))
    }
}

/// Render `matrix` as a TSPLIB explicit full-matrix problem.
pub fn format_problem(matrix: &DistanceMatrix) -> Result<String, TourError> {
    let n = require_square(matrix)?;
    let mut out = String::new();
    // Header lines match what existing solution tooling was fed, including
    // the redundant `Type:TSP` line.
    let _ = writeln!(out, "NAME: Periodic data");
    let _ = writeln!(out, "Type:TSP");
    let _ = writeln!(out, "COMMENT: {n} frames");
    let _ = writeln!(out, "TYPE: TSP");
    let _ = writeln!(out, "DIMENSION: {n}");
    let _ = writeln!(out, "EDGE_WEIGHT_TYPE: EXPLICIT");
    let _ = writeln!(out, "EDGE_WEIGHT_FORMAT: FULL_MATRIX");
    let _ = writeln!(out, "EDGE_WEIGHT_SECTION");
    for i in 0..n {
        let row: Vec<String> = (0..n)
            .map(|j| format!("{:4}", matrix[(i, j)].trunc() as i64))
            .collect();
        out.push_str(&row.join(" "));
        out.push('\n');
    }
    out.push_str("EOF");
    Ok(out)
}

fn create_parent(path: &Path) -> Result<(), TourError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(std::fs::create_dir_all(parent)?),
        _ => Ok(()),
    }
}

pub fn write_problem(path: &Path, matrix: &DistanceMatrix) -> Result<(), TourError> {
    let text = format_problem(matrix)?;
    create_parent(path)?;
    std::fs::write(path, text)?;
    Ok(())
}

/// Parse solution text into the raw visiting order (count line stripped).
pub fn parse_solution(text: &str, path: &Path) -> Result<Vec<usize>, TourError> {
    let malformed = |reason: String| TourError::MalformedSolution {
        path: path.to_path_buf(),
        reason,
    };
    let mut tokens = text.split_whitespace().map(|tok| {
        tok.parse::<usize>()
            .map_err(|_| malformed(format!("'{tok}' is not a non-negative integer")))
    });
    let count = tokens
        .next()
        .ok_or_else(|| malformed("file is empty".into()))??;
    let order = tokens.collect::<Result<Vec<_>, _>>()?;
    if order.len() != count {
        return Err(malformed(format!(
            "header announces {count} nodes but {} follow",
            order.len()
        )));
    }
    Ok(order)
}

/// Read and validate a solution for a stack with `frames` time points.
pub fn read_solution(path: &Path, frames: usize) -> Result<Permutation, TourError> {
    if !path.exists() {
        return Err(TourError::SolutionNotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    Permutation::for_frames(parse_solution(&text, path)?, frames)
}

/// Write a solution in Concorde's layout (count, then 10 indices per line).
pub fn write_solution(path: &Path, permutation: &Permutation) -> Result<(), TourError> {
    let mut out = format!("{}\n", permutation.len());
    for chunk in permutation.as_slice().chunks(10) {
        let line: Vec<String> = chunk.iter().map(usize::to_string).collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    create_parent(path)?;
    std::fs::write(path, out)?;
    Ok(())
}
