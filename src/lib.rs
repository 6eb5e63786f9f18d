//! # biogen: binary protocol code generator
//!
//! Compiles declarative protocol schemas (enums, structs, ordered fields with explicit wire
//! types) into C++17 headers with byte-exact `parse`/`serialize` methods built on the
//! `binary-io` helper. Generated code never produces undefined enum values from wire data:
//! raw values with no declared enumerator map to the first one declared.
//!
//! ## Pipeline
//!
//! - [`loader`]: YAML document to [`ProtocolDef`], with structural validation
//! - [`resolve`]: symbol tables, field kinds, bit plans, guard checks, struct order
//! - [`codegen`]: one header per unit
//! - [`codec`]: a reference interpreter of the same wire layout, used to test it
//!
//! ## Example schema
//!
//! ```yaml
//! protocol:
//!   name: Sensor
//!   namespace: acme::sensor
//!   byte_order: big_endian
//! enums:
//!   - name: Mode
//!     type: u8
//!     values:
//!       - { name: Idle, value: 0 }
//!       - { name: Run, value: 1 }
//! structs:
//!   - name: Reading
//!     fields:
//!       - { name: magic, type: u32, expected: 0x53454E53 }
//!       - name: ctrl
//!         type: bitfield_u8
//!         bits:
//!           - { name: valid, offset: 0, width: 1 }
//!           - { name: mode, offset: 1, width: 1, type: Mode }
//!       - { name: value, type: i32, condition: "valid" }
//! ```

pub mod ast;
pub mod batch;
pub mod bits;
pub mod codec;
pub mod codegen;
pub mod dump;
pub mod error;
pub mod expr;
pub mod loader;
pub mod resolve;
pub mod value;

pub use ast::ProtocolDef;
pub use codec::{Codec, CodecError, Decoded};
pub use codegen::{Artifact, GeneratorConfig};
pub use error::{CompileError, CompileErrorKind, Error};
pub use loader::LoadError;
pub use resolve::{FieldKind, ResolvedProtocol};
pub use value::{Record, Value};

/// Resolve `protocol` and generate its header. `source_name` is recorded in the header.
pub fn compile(protocol: ProtocolDef, source_name: &str, config: &GeneratorConfig) -> Result<Artifact, CompileError> {
    let resolved = ResolvedProtocol::resolve(protocol)?;
    Ok(codegen::generate(&resolved, source_name, config))
}

/// Load a YAML schema from text and compile it.
pub fn compile_str(text: &str, source_name: &str, config: &GeneratorConfig) -> Result<Artifact, Error> {
    let protocol = loader::load_str(text, source_name)?;
    Ok(compile(protocol, source_name, config)?)
}

/// Load a YAML schema from text and resolve it, for use with the [`Codec`].
pub fn resolve_str(text: &str, source_name: &str) -> Result<ResolvedProtocol, Error> {
    let protocol = loader::load_str(text, source_name)?;
    Ok(ResolvedProtocol::resolve(protocol)?)
}
