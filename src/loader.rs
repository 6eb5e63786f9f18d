//! Load YAML schema documents into the entity model.
//!
//! Loading is two steps: YAML text to a raw document (rejecting unknown keys), then a
//! structural validation pass over the raw document. Cross references (type names, enum
//! names in bit slices, guard expressions) are not checked here; that is the job of
//! [`resolve`](crate::resolve).

use crate::ast::*;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("empty schema document: {0}")]
    Empty(String),
    #[error("malformed YAML in {unit}: {source}")]
    Syntax {
        unit: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("schema validation failed for {unit} at {location}: {message}")]
    Validation {
        unit: String,
        location: String,
        message: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocument {
    protocol: RawProtocol,
    #[serde(default)]
    enums: Vec<RawEnum>,
    #[serde(default)]
    structs: Vec<RawStruct>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProtocol {
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    byte_order: RawByteOrder,
    #[serde(default)]
    description: String,
    #[serde(default)]
    includes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawByteOrder {
    #[default]
    LittleEndian,
    BigEndian,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEnum {
    name: String,
    #[serde(rename = "type")]
    underlying: String,
    #[serde(default)]
    description: String,
    values: Vec<RawEnumValue>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEnumValue {
    name: String,
    value: IntLiteral,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStruct {
    name: String,
    #[serde(default)]
    description: String,
    fields: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawField {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    description: String,
    length: Option<i64>,
    element_type: Option<String>,
    expected: Option<IntLiteral>,
    pad_size: Option<i64>,
    condition: Option<String>,
    bits: Option<Vec<RawBit>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBit {
    name: String,
    offset: i64,
    width: i64,
    #[serde(rename = "type")]
    enum_type: Option<String>,
    #[serde(default)]
    description: String,
}

/// Integer as written in YAML: a plain integer, or text such as `"0xFF01"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IntLiteral {
    Signed(i64),
    Unsigned(u64),
    Text(String),
}

impl IntLiteral {
    fn to_i128(&self) -> Option<i128> {
        match self {
            IntLiteral::Signed(v) => Some(*v as i128),
            IntLiteral::Unsigned(v) => Some(*v as i128),
            IntLiteral::Text(s) => parse_int_text(s),
        }
    }
}

/// Parse decimal, `0x` hex or `0b` binary text, with an optional leading minus.
pub fn parse_int_text(text: &str) -> Option<i128> {
    let s = text.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (radix, digits) = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        (16, hex)
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        (2, bin)
    } else {
        (10, digits)
    };
    // Digits only: no sign after the prefix.
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let magnitude = i128::from_str_radix(digits, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Identifier rule shared by every name in a document: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_namespace(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

const ENUM_UNDERLYING: [&str; 8] = ["u8", "u16", "u32", "u64", "i8", "i16", "i32", "i64"];

/// Load one schema file.
pub fn load_file(path: &Path) -> Result<ProtocolDef, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_str(&text, &path.display().to_string())
}

/// Load a schema document from text. `unit` names the source in error messages.
pub fn load_str(text: &str, unit: &str) -> Result<ProtocolDef, LoadError> {
    if text.trim().is_empty() {
        return Err(LoadError::Empty(unit.to_string()));
    }
    let value: serde_yaml::Value = serde_yaml::from_str(text).map_err(|source| LoadError::Syntax {
        unit: unit.to_string(),
        source,
    })?;
    if value.is_null() {
        return Err(LoadError::Empty(unit.to_string()));
    }
    let raw: RawDocument = serde_yaml::from_value(value).map_err(|e| LoadError::Validation {
        unit: unit.to_string(),
        location: "document".to_string(),
        message: e.to_string(),
    })?;
    Builder { unit }.build(raw)
}

struct Builder<'a> {
    unit: &'a str,
}

impl<'a> Builder<'a> {
    fn fail<T>(&self, location: impl Into<String>, message: impl Into<String>) -> Result<T, LoadError> {
        Err(LoadError::Validation {
            unit: self.unit.to_string(),
            location: location.into(),
            message: message.into(),
        })
    }

    fn ident(&self, location: &str, name: &str) -> Result<String, LoadError> {
        if is_identifier(name) {
            Ok(name.to_string())
        } else {
            self.fail(location, format!("'{}' is not a valid identifier", name))
        }
    }

    fn positive(&self, location: &str, key: &str, v: Option<i64>) -> Result<Option<u64>, LoadError> {
        match v {
            None => Ok(None),
            Some(n) if n >= 1 => Ok(Some(n as u64)),
            Some(n) => self.fail(location, format!("{} must be at least 1 (got {})", key, n)),
        }
    }

    fn build(&self, raw: RawDocument) -> Result<ProtocolDef, LoadError> {
        let p = raw.protocol;
        let name = self.ident("protocol.name", &p.name)?;
        if !p.namespace.is_empty() && !is_namespace(&p.namespace) {
            return self.fail("protocol.namespace", format!("'{}' is not a valid namespace", p.namespace));
        }
        let byte_order = match p.byte_order {
            RawByteOrder::LittleEndian => ByteOrder::Little,
            RawByteOrder::BigEndian => ByteOrder::Big,
        };
        let mut enums = Vec::with_capacity(raw.enums.len());
        for (i, e) in raw.enums.into_iter().enumerate() {
            enums.push(self.build_enum(&format!("enums[{}]", i), e)?);
        }
        let mut structs = Vec::with_capacity(raw.structs.len());
        for (i, s) in raw.structs.into_iter().enumerate() {
            structs.push(self.build_struct(&format!("structs[{}]", i), s)?);
        }
        Ok(ProtocolDef {
            name,
            namespace: p.namespace,
            byte_order,
            description: p.description,
            includes: p.includes,
            enums,
            structs,
        })
    }

    fn build_enum(&self, loc: &str, raw: RawEnum) -> Result<EnumDef, LoadError> {
        let name = self.ident(&format!("{}.name", loc), &raw.name)?;
        if !ENUM_UNDERLYING.contains(&raw.underlying.as_str()) {
            return self.fail(
                format!("{}.type", loc),
                format!("'{}' is not an integer type (expected one of {})", raw.underlying, ENUM_UNDERLYING.join(", ")),
            );
        }
        if raw.values.is_empty() {
            return self.fail(format!("{}.values", loc), "an enum needs at least one value");
        }
        let mut values = Vec::with_capacity(raw.values.len());
        for (i, v) in raw.values.into_iter().enumerate() {
            let vloc = format!("{}.values[{}]", loc, i);
            let vname = self.ident(&format!("{}.name", vloc), &v.name)?;
            let value = match v.value.to_i128() {
                Some(x) => x,
                None => return self.fail(format!("{}.value", vloc), format!("{:?} is not an integer", v.value)),
            };
            values.push(EnumValue {
                name: vname,
                value,
                description: v.description,
            });
        }
        Ok(EnumDef {
            name,
            underlying: raw.underlying,
            values,
            description: raw.description,
        })
    }

    fn build_struct(&self, loc: &str, raw: RawStruct) -> Result<StructDef, LoadError> {
        let name = self.ident(&format!("{}.name", loc), &raw.name)?;
        if raw.fields.is_empty() {
            return self.fail(format!("{}.fields", loc), "a struct needs at least one field");
        }
        let mut fields = Vec::with_capacity(raw.fields.len());
        for (i, f) in raw.fields.into_iter().enumerate() {
            fields.push(self.build_field(&format!("{}.fields[{}]", loc, i), f)?);
        }
        Ok(StructDef {
            name,
            fields,
            description: raw.description,
        })
    }

    fn build_field(&self, loc: &str, raw: RawField) -> Result<FieldDef, LoadError> {
        let name = self.ident(&format!("{}.name", loc), &raw.name)?;
        let expected = match raw.expected {
            None => None,
            Some(lit) => match lit.to_i128() {
                Some(v) => Some(v),
                None => return self.fail(format!("{}.expected", loc), format!("{:?} is not an integer", lit)),
            },
        };
        let bits = match raw.bits {
            None => Vec::new(),
            Some(b) if b.is_empty() => {
                return self.fail(format!("{}.bits", loc), "bits needs at least one slice");
            }
            Some(b) => {
                let mut out = Vec::with_capacity(b.len());
                for (i, bit) in b.into_iter().enumerate() {
                    out.push(self.build_bit(&format!("{}.bits[{}]", loc, i), bit)?);
                }
                out
            }
        };
        Ok(FieldDef {
            name,
            type_name: raw.type_name,
            description: raw.description,
            length: self.positive(loc, "length", raw.length)?,
            element_type: raw.element_type,
            expected,
            pad_size: self.positive(loc, "pad_size", raw.pad_size)?,
            condition: raw.condition,
            bits,
        })
    }

    fn build_bit(&self, loc: &str, raw: RawBit) -> Result<BitSlice, LoadError> {
        let name = self.ident(&format!("{}.name", loc), &raw.name)?;
        if raw.offset < 0 || raw.offset > u32::MAX as i64 {
            return self.fail(loc, format!("offset must be a non-negative bit index (got {})", raw.offset));
        }
        if raw.width < 1 || raw.width > u32::MAX as i64 {
            return self.fail(loc, format!("width must be at least 1 (got {})", raw.width));
        }
        let enum_type = match raw.enum_type {
            Some(t) => Some(self.ident(&format!("{}.type", loc), &t)?),
            None => None,
        };
        Ok(BitSlice {
            name,
            offset: raw.offset as u32,
            width: raw.width as u32,
            enum_type,
            description: raw.description,
        })
    }
}
