//! Stack and side-file I/O.
//!
//! Purpose
//! - Load the input of either stage: a single `.npy` array (3-D or 5-D) or a
//!   directory of TIFF slices; write results as `.npy`.
//! - Read and write the shift text file that lets a previous estimate be
//!   re-applied without re-running the optimizer.
//!
//! Conventions
//! - Outputs default to `<input-stem>_<suffix>` beside the input, where the
//!   stem stops at the first `.` of the file name.
//!
//! References
//! - Code cross-refs: `npy::{read_npy, write_npy}`, `tiff_dir::read_tiff_dir`

pub mod npy;
pub mod tiff_dir;

pub use npy::{read_npy, write_npy, SampleType};
pub use tiff_dir::read_tiff_dir;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::stack::{promote_to_5d, Stack, StackError};

/// Errors raised while reading or writing stacks and side files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("input {0} does not exist")]
    NotFound(PathBuf),
    #[error("no TIFF files found in {0}")]
    EmptyDirectory(PathBuf),
    #[error("unsupported input {0}: expected an .npy file or a directory of TIFF slices")]
    UnsupportedFormat(PathBuf),
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A stack plus the sample type it was stored with.
#[derive(Clone, Debug)]
pub struct LoadedStack {
    pub stack: Stack,
    pub dtype: SampleType,
}

/// Load an `.npy` file or a directory of TIFF slices as a 5-D stack.
pub fn load_stack(path: &Path) -> Result<LoadedStack, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    let (stack, dtype) = if path.is_dir() {
        read_tiff_dir(path)?
    } else if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("npy")) {
        let (array, dtype) = read_npy(path)?;
        (promote_to_5d(array)?, dtype)
    } else {
        return Err(LoadError::UnsupportedFormat(path.to_path_buf()));
    };
    info!(path = %path.display(), shape = ?stack.dim(), dtype = ?dtype, "loaded stack");
    Ok(LoadedStack { stack, dtype })
}

/// File-name stem up to the first `.` (`movie.ome.npy` → `movie`).
pub fn input_stem(input: &Path) -> String {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stack".to_string());
    match name.find('.') {
        Some(0) | None => name,
        Some(i) => name[..i].to_string(),
    }
}

/// `<dir-of-input>/<input-stem><suffix>`.
pub fn sibling_path(input: &Path, suffix: &str) -> PathBuf {
    let dir = input.parent().unwrap_or_else(|| Path::new(""));
    dir.join(format!("{}{}", input_stem(input), suffix))
}

/// Read a shift file: a single floating-point value.
pub fn read_shift(path: &Path) -> Result<f64, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut tokens = text.split_whitespace();
    let value = match (tokens.next(), tokens.next()) {
        (Some(tok), None) => tok.parse::<f64>().map_err(|e| LoadError::Malformed {
            path: path.to_path_buf(),
            reason: format!("'{tok}' is not a number: {e}"),
        })?,
        _ => {
            return Err(LoadError::Malformed {
                path: path.to_path_buf(),
                reason: "expected exactly one value".into(),
            })
        }
    };
    Ok(value)
}

/// Write a shift file in a form [`read_shift`] accepts.
pub fn write_shift(path: &Path, shift: f64) -> Result<(), LoadError> {
    std::fs::write(path, format!("{shift}\n"))?;
    Ok(())
}
