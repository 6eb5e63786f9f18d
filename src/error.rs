//! Unit-scoped errors.
//!
//! Structural and validation failures come from the [loader](crate::loader) as
//! [`LoadError`](crate::loader::LoadError); resolution, bit-geometry and consistency failures
//! come from the compiler core as [`CompileError`]. Both carry the unit name, so a batch can
//! report each failure on its own line.

use crate::loader::LoadError;
use std::path::PathBuf;

/// What went wrong while resolving or compiling a unit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileErrorKind {
    #[error("unknown type '{0}'")]
    UnresolvedSymbol(String),
    #[error("bit slice '{slice}' spans bits {offset}..{end} but the storage is {storage_bits} bits")]
    SliceOutOfRange {
        slice: String,
        offset: u32,
        end: u32,
        storage_bits: u32,
    },
    #[error("bit slices '{first}' and '{second}' overlap")]
    SliceOverlap { first: String, second: String },
    #[error("duplicate {what} '{name}'")]
    Duplicate { what: &'static str, name: String },
    #[error("struct containment cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
    #[error("{0}")]
    Inconsistent(String),
}

/// A compile failure, scoped to unit, entity (enum or struct) and optionally a field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("protocol '{unit}': {entity}{}: {kind}", at_field(.field))]
pub struct CompileError {
    pub unit: String,
    pub entity: String,
    pub field: Option<String>,
    pub kind: CompileErrorKind,
}

fn at_field(field: &Option<String>) -> String {
    field.as_ref().map(|f| format!(".{f}")).unwrap_or_default()
}

impl CompileError {
    pub fn new(unit: &str, entity: &str, field: Option<&str>, kind: CompileErrorKind) -> Self {
        CompileError {
            unit: unit.to_string(),
            entity: entity.to_string(),
            field: field.map(str::to_string),
            kind,
        }
    }
}

/// Any failure of a single unit.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// Another unit in the same batch already produces this output file.
    #[error("output {file_name} is already produced by {}", .first.display())]
    Collision { file_name: String, first: PathBuf },
}
