use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::ffi::OsString;
use std::fs;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Metadata used to generate a provenance sidecar.
pub struct Payload {
    pub stage: &'static str,
    pub inputs: Vec<String>,
    pub params: Value,
    pub results: Value,
}

impl Payload {
    pub fn new(stage: &'static str, params: Value) -> Self {
        Self {
            stage,
            inputs: Vec::new(),
            params,
            results: Value::Null,
        }
    }

    pub fn with_input(mut self, input: &Path) -> Self {
        self.inputs.push(input.to_string_lossy().into_owned());
        self
    }

    pub fn with_results(mut self, results: Value) -> Self {
        self.results = results;
        self
    }
}

/// Write `<artifact>.provenance.json` containing the git commit, callsite, params, results, and outputs.
#[track_caller]
pub fn write_sidecar<P: AsRef<Path>>(artifact: P, payload: Payload) -> Result<PathBuf> {
    let artifact = artifact.as_ref();
    let provenance_path = provenance_path(artifact);
    if let Some(parent) = provenance_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating provenance dir {}", parent.display()))?;
        }
    }

    let callsite = Location::caller();
    let doc = json!({
        "code_rev": code_revision(),
        "version": beatsort::VERSION,
        "callsite": {
            "file": callsite.file(),
            "line": callsite.line()
        },
        "stage": payload.stage,
        "inputs": payload.inputs,
        "params": payload.params,
        "results": payload.results,
        "outputs": [artifact.to_string_lossy()]
    });
    fs::write(&provenance_path, serde_json::to_vec_pretty(&doc)?)
        .with_context(|| format!("writing {}", provenance_path.display()))?;
    Ok(provenance_path)
}

/// `heart_sorted.npy` → `heart_sorted.provenance.json`.
fn provenance_path(artifact: &Path) -> PathBuf {
    let stem = artifact
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from("artifact"));
    let mut name = stem;
    name.push(".provenance.json");
    artifact.with_file_name(name)
}

/// Revision recorded in sidecars: `GIT_COMMIT` (build time, then run time),
/// else the checkout's HEAD, else `"unknown"`.
pub fn code_revision() -> String {
    let non_empty = |rev: String| (!rev.is_empty()).then_some(rev);
    option_env!("GIT_COMMIT")
        .map(str::to_owned)
        .and_then(non_empty)
        .or_else(|| std::env::var("GIT_COMMIT").ok().and_then(non_empty))
        .or_else(git_head)
        .unwrap_or_else(|| "unknown".to_owned())
}

fn git_head() -> Option<String> {
    let out = Command::new("git").args(["rev-parse", "HEAD"]).output().ok()?;
    if !out.status.success() {
        return None;
    }
    let rev = String::from_utf8(out.stdout).ok()?;
    let rev = rev.trim();
    (!rev.is_empty()).then(|| rev.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn provenance_path_rewrites_extension() {
        let base = Path::new("/data/heart_sorted.npy");
        let derived = provenance_path(base);
        assert_eq!(derived, Path::new("/data/heart_sorted.provenance.json"));
    }

    #[test]
    fn revision_is_never_empty() {
        let rev = code_revision();
        assert!(!rev.is_empty());
        assert!(!rev.contains(char::is_whitespace));
    }

    #[test]
    fn write_sidecar_records_stage_and_results() {
        let dir = tempdir().unwrap();
        let artifact = dir.path().join("heart_unsheared.npy");
        fs::write(&artifact, b"").unwrap();
        let payload = Payload::new("unshear", json!({"y_downsizing": 4}))
            .with_input(Path::new("heart_sorted.npy"))
            .with_results(json!({"shift": 0.5}));
        let prov_path = write_sidecar(&artifact, payload).unwrap();
        assert!(prov_path.exists());
        let parsed: Value = serde_json::from_slice(&fs::read(prov_path).unwrap()).unwrap();
        assert_eq!(parsed["outputs"][0], artifact.to_string_lossy().as_ref());
        assert_eq!(parsed["stage"], "unshear");
        assert_eq!(parsed["inputs"][0], "heart_sorted.npy");
        assert_eq!(parsed["results"]["shift"], 0.5);
    }
}
