//! Entity model for protocol schemas, plus the static primitive type registry.
//!
//! Entities are built once (by the [loader](crate::loader) or by hand), resolved once by
//! [`ResolvedProtocol::resolve`](crate::resolve::ResolvedProtocol::resolve), then only read.

/// Numeric class of a primitive wire type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericClass {
    Unsigned,
    Signed,
    Float,
}

/// A built-in fixed-width wire type.
#[derive(Debug, PartialEq, Eq)]
pub struct PrimitiveType {
    /// Schema name, e.g. `u16`.
    pub name: &'static str,
    /// Storage width in bytes.
    pub size: usize,
    pub class: NumericClass,
    /// C++ spelling used in generated code.
    pub cpp_type: &'static str,
}

/// All primitive types understood by the binary-io helper.
pub static PRIMITIVES: [PrimitiveType; 10] = [
    PrimitiveType { name: "u8", size: 1, class: NumericClass::Unsigned, cpp_type: "uint8_t" },
    PrimitiveType { name: "u16", size: 2, class: NumericClass::Unsigned, cpp_type: "uint16_t" },
    PrimitiveType { name: "u32", size: 4, class: NumericClass::Unsigned, cpp_type: "uint32_t" },
    PrimitiveType { name: "u64", size: 8, class: NumericClass::Unsigned, cpp_type: "uint64_t" },
    PrimitiveType { name: "i8", size: 1, class: NumericClass::Signed, cpp_type: "int8_t" },
    PrimitiveType { name: "i16", size: 2, class: NumericClass::Signed, cpp_type: "int16_t" },
    PrimitiveType { name: "i32", size: 4, class: NumericClass::Signed, cpp_type: "int32_t" },
    PrimitiveType { name: "i64", size: 8, class: NumericClass::Signed, cpp_type: "int64_t" },
    PrimitiveType { name: "f32", size: 4, class: NumericClass::Float, cpp_type: "float" },
    PrimitiveType { name: "f64", size: 8, class: NumericClass::Float, cpp_type: "double" },
];

/// Reserved bitfield markers and the unsigned storage each one reads and writes.
pub static BITFIELD_STORAGE: [(&str, &str); 3] = [
    ("bitfield_u8", "u8"),
    ("bitfield_u16", "u16"),
    ("bitfield_u32", "u32"),
];

impl PrimitiveType {
    /// Look a primitive up by schema name.
    pub fn lookup(name: &str) -> Option<&'static PrimitiveType> {
        PRIMITIVES.iter().find(|p| p.name == name)
    }

    /// Storage type behind a `bitfield_*` marker.
    pub fn bitfield_storage(marker: &str) -> Option<&'static PrimitiveType> {
        BITFIELD_STORAGE
            .iter()
            .find(|(m, _)| *m == marker)
            .and_then(|(_, storage)| Self::lookup(storage))
    }

    /// Smallest unsigned primitive with at least `bits` bits.
    pub fn smallest_unsigned(bits: u32) -> &'static PrimitiveType {
        let name = match bits {
            0..=8 => "u8",
            9..=16 => "u16",
            17..=32 => "u32",
            _ => "u64",
        };
        Self::lookup(name).unwrap_or(&PRIMITIVES[3])
    }

    pub fn bits(&self) -> u32 {
        (self.size * 8) as u32
    }

    pub fn is_integer(&self) -> bool {
        self.class != NumericClass::Float
    }

    /// binary-io reader method, e.g. `read_u16`.
    pub fn read_method(&self) -> String {
        format!("read_{}", self.name)
    }

    /// binary-io writer method, e.g. `write_u16`.
    pub fn write_method(&self) -> String {
        format!("write_{}", self.name)
    }

    /// Inclusive value range for integer types; `None` for floats.
    pub fn range(&self) -> Option<(i128, i128)> {
        let bits = self.bits();
        match self.class {
            NumericClass::Unsigned => Some((0, (1i128 << bits) - 1)),
            NumericClass::Signed => Some((-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)),
            NumericClass::Float => None,
        }
    }

    pub fn contains(&self, value: i128) -> bool {
        self.range()
            .map(|(lo, hi)| value >= lo && value <= hi)
            .unwrap_or(false)
    }
}

/// Byte order of multi-byte primitives, fixed per unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    /// binary-io codec behind this byte order.
    pub fn codec(self) -> &'static str {
        match self {
            ByteOrder::Little => "LittleEndianCodec",
            ByteOrder::Big => "BigEndianCodec",
        }
    }

    pub fn reader_alias(self) -> &'static str {
        match self {
            ByteOrder::Little => "LEReader",
            ByteOrder::Big => "BEReader",
        }
    }

    pub fn writer_alias(self) -> &'static str {
        match self {
            ByteOrder::Little => "LEWriter",
            ByteOrder::Big => "BEWriter",
        }
    }
}

/// One named constant within an enum.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub name: String,
    pub value: i128,
    pub description: String,
}

/// An enumeration backed by an integer primitive. `values[0]` is the fallback for raw
/// inputs that match no declared value.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub name: String,
    /// Key into the primitive registry.
    pub underlying: String,
    pub values: Vec<EnumValue>,
    pub description: String,
}

impl EnumDef {
    /// Total raw → symbolic conversion: first declared match, else the first declared value.
    pub fn symbol_for(&self, raw: i128) -> Option<&EnumValue> {
        self.values
            .iter()
            .find(|v| v.value == raw)
            .or_else(|| self.values.first())
    }

    pub fn value_named(&self, name: &str) -> Option<&EnumValue> {
        self.values.iter().find(|v| v.name == name)
    }

    pub fn fallback(&self) -> Option<&EnumValue> {
        self.values.first()
    }
}

/// One named bit range inside a bitfield field.
#[derive(Debug, Clone, PartialEq)]
pub struct BitSlice {
    pub name: String,
    /// Offset from the least-significant bit.
    pub offset: u32,
    pub width: u32,
    /// Enum this slice maps to, if any.
    pub enum_type: Option<String>,
    pub description: String,
}

/// A single field of a struct, as declared.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldDef {
    pub name: String,
    /// Declared type string: primitive, enum, struct or reserved marker.
    pub type_name: String,
    pub description: String,
    /// Fixed element/byte count for bytes, string and array fields.
    pub length: Option<u64>,
    /// Element type for arrays.
    pub element_type: Option<String>,
    /// Magic-number / version check applied on parse.
    pub expected: Option<i128>,
    /// Byte count for padding fields.
    pub pad_size: Option<u64>,
    /// Guard over earlier members; the field is absent from the wire when false.
    pub condition: Option<String>,
    /// Bit slices (bitfields only).
    pub bits: Vec<BitSlice>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        FieldDef {
            name: name.into(),
            type_name: type_name.into(),
            ..FieldDef::default()
        }
    }
}

/// A binary-serializable struct. Field order is wire order.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub description: String,
}

/// One schema unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProtocolDef {
    pub name: String,
    /// C++ namespace path (may contain `::`); empty for none.
    pub namespace: String,
    pub byte_order: ByteOrder,
    pub description: String,
    /// Extra includes emitted verbatim (`<x>` stays angled, anything else is quoted).
    pub includes: Vec<String>,
    pub enums: Vec<EnumDef>,
    pub structs: Vec<StructDef>,
}
