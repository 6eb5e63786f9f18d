//! Batch compilation: one schema file or a directory of them, one header per unit.
//!
//! Units are independent. A unit that fails to load or compile is recorded in the report
//! and the rest of the batch still runs; only successful units are ever written.

use crate::codegen::{Artifact, GeneratorConfig};
use crate::error::Error;
use crate::loader;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("no schema files (*.yaml, *.yml) in {}", .0.display())]
    NoSchemas(PathBuf),
    #[error("{} is neither a file nor a directory", .0.display())]
    NotFound(PathBuf),
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> BatchError + '_ {
    move |source| BatchError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Outcome of one unit.
#[derive(Debug)]
pub struct UnitReport {
    pub source: PathBuf,
    pub outcome: Result<Artifact, Error>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub units: Vec<UnitReport>,
}

impl BatchReport {
    /// True when every unit compiled.
    pub fn is_success(&self) -> bool {
        self.units.iter().all(|u| u.outcome.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Path, &Error)> {
        self.units
            .iter()
            .filter_map(|u| u.outcome.as_ref().err().map(|e| (u.source.as_path(), e)))
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.units.iter().filter_map(|u| u.outcome.as_ref().ok())
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().map(|e| e == ext).unwrap_or(false)
}

/// Schema files named by `path`. A file yields itself. A directory yields its `*.yaml`
/// files, then its `*.yml` files whose stem has no `.yaml` sibling, each group sorted.
pub fn discover(path: &Path) -> Result<Vec<PathBuf>, BatchError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(BatchError::NotFound(path.to_path_buf()));
    }
    let mut yaml = Vec::new();
    let mut yml = Vec::new();
    for entry in std::fs::read_dir(path).map_err(io_error(path))? {
        let p = entry.map_err(io_error(path))?.path();
        if !p.is_file() {
            continue;
        }
        if has_extension(&p, "yaml") {
            yaml.push(p);
        } else if has_extension(&p, "yml") {
            yml.push(p);
        }
    }
    yaml.sort();
    yml.sort();
    yml.retain(|p| !yaml.iter().any(|y| y.file_stem() == p.file_stem()));
    yaml.extend(yml);
    if yaml.is_empty() {
        return Err(BatchError::NoSchemas(path.to_path_buf()));
    }
    Ok(yaml)
}

/// Load and compile one schema file.
pub fn compile_file(path: &Path, config: &GeneratorConfig) -> Result<Artifact, Error> {
    let protocol = loader::load_file(path)?;
    let source_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(crate::compile(protocol, &source_name, config)?)
}

/// Compile every unit `path` names, in discovery order. A unit whose output file name an
/// earlier unit already claimed fails with [`Error::Collision`].
pub fn compile_path(path: &Path, config: &GeneratorConfig) -> Result<BatchReport, BatchError> {
    let mut report = BatchReport::default();
    let mut claimed: HashMap<String, PathBuf> = HashMap::new();
    for source in discover(path)? {
        let outcome = compile_file(&source, config).and_then(|artifact| match claimed.get(&artifact.file_name) {
            Some(first) => Err(Error::Collision {
                file_name: artifact.file_name,
                first: first.clone(),
            }),
            None => {
                claimed.insert(artifact.file_name.clone(), source.clone());
                Ok(artifact)
            }
        });
        match &outcome {
            Ok(artifact) => info!(source = %source.display(), output = %artifact.file_name, "compiled unit"),
            Err(e) => warn!(source = %source.display(), error = %e, "unit failed"),
        }
        report.units.push(UnitReport { source, outcome });
    }
    Ok(report)
}

/// Write every successful artifact into `out_dir`, creating it if needed.
pub fn write_artifacts(report: &BatchReport, out_dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
    std::fs::create_dir_all(out_dir).map_err(io_error(out_dir))?;
    let mut written = Vec::new();
    for artifact in report.artifacts() {
        let target = out_dir.join(&artifact.file_name);
        std::fs::write(&target, &artifact.contents).map_err(io_error(&target))?;
        written.push(target);
    }
    Ok(written)
}
