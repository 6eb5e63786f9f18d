//! Bit-packing planner for `bitfield_*` fields.
//!
//! A bitfield reads one unsigned integer of its storage width and splits it into named
//! slices. Each slice is `(raw >> offset) & mask(width)` on unpack; pack ORs the masked
//! slice values back at their offsets, starting from zero. Bits no slice claims are ignored
//! on read and written as zero.

use crate::ast::{BitSlice, EnumDef, PrimitiveType};
use crate::error::CompileErrorKind;

/// How a slice is represented as a struct member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceRepr {
    /// Width 1, no enum: a boolean.
    Bool,
    /// Index into the unit's enum list.
    Enum(usize),
    /// Smallest unsigned integer holding the slice width.
    Unsigned(&'static PrimitiveType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSlice {
    pub name: String,
    pub offset: u32,
    pub width: u32,
    pub repr: SliceRepr,
}

impl PlannedSlice {
    /// Mask of `width` low bits.
    pub fn mask(&self) -> u64 {
        width_mask(self.width)
    }

    /// Mask of the bits this slice occupies in the storage integer.
    pub fn placed_mask(&self) -> u64 {
        self.mask() << self.offset
    }
}

/// Validated slice layout of one bitfield field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitPlan {
    pub storage: &'static PrimitiveType,
    pub slices: Vec<PlannedSlice>,
}

pub fn width_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Validate slice geometry and choose member representations.
///
/// `enums` is the unit's enum list; `enum_index` maps a name to its position in it.
pub fn plan(
    storage: &'static PrimitiveType,
    slices: &[BitSlice],
    enums: &[EnumDef],
    enum_index: impl Fn(&str) -> Option<usize>,
) -> Result<BitPlan, CompileErrorKind> {
    if slices.is_empty() {
        return Err(CompileErrorKind::Inconsistent(
            "a bitfield needs at least one bit slice".to_string(),
        ));
    }
    let storage_bits = storage.bits();
    let mut planned: Vec<PlannedSlice> = Vec::with_capacity(slices.len());
    for s in slices {
        if s.width == 0 {
            return Err(CompileErrorKind::Inconsistent(format!(
                "bit slice '{}' has zero width",
                s.name
            )));
        }
        let end = s.offset.saturating_add(s.width);
        if end > storage_bits {
            return Err(CompileErrorKind::SliceOutOfRange {
                slice: s.name.clone(),
                offset: s.offset,
                end,
                storage_bits,
            });
        }
        let repr = match &s.enum_type {
            Some(enum_name) => {
                let idx = enum_index(enum_name).ok_or_else(|| {
                    CompileErrorKind::Inconsistent(format!(
                        "bit slice '{}' references undefined enum '{}'",
                        s.name, enum_name
                    ))
                })?;
                let limit = width_mask(s.width) as i128;
                if let Some(v) = enums[idx].values.iter().find(|v| v.value < 0 || v.value > limit) {
                    return Err(CompileErrorKind::Inconsistent(format!(
                        "value {}::{} = {} does not fit in the {}-bit slice '{}'",
                        enums[idx].name, v.name, v.value, s.width, s.name
                    )));
                }
                SliceRepr::Enum(idx)
            }
            None if s.width == 1 => SliceRepr::Bool,
            None => SliceRepr::Unsigned(PrimitiveType::smallest_unsigned(s.width)),
        };
        let slice = PlannedSlice {
            name: s.name.clone(),
            offset: s.offset,
            width: s.width,
            repr,
        };
        if let Some(prev) = planned.iter().find(|p| p.name == slice.name) {
            return Err(CompileErrorKind::Duplicate {
                what: "bit slice",
                name: prev.name.clone(),
            });
        }
        if let Some(prev) = planned.iter().find(|p| p.placed_mask() & slice.placed_mask() != 0) {
            return Err(CompileErrorKind::SliceOverlap {
                first: prev.name.clone(),
                second: slice.name.clone(),
            });
        }
        planned.push(slice);
    }
    Ok(BitPlan {
        storage,
        slices: planned,
    })
}

impl BitPlan {
    /// Raw per-slice values, in slice order.
    pub fn unpack(&self, raw: u64) -> Vec<u64> {
        self.slices
            .iter()
            .map(|s| (raw >> s.offset) & s.mask())
            .collect()
    }

    /// Pack per-slice raw values (same order as `slices`). Excess high bits of each value
    /// are masked off so a slice never spills into its neighbours.
    pub fn pack(&self, values: &[u64]) -> u64 {
        self.slices
            .iter()
            .zip(values)
            .fold(0u64, |acc, (s, v)| acc | ((v & s.mask()) << s.offset))
    }

    /// All bits claimed by some slice.
    pub fn declared_mask(&self) -> u64 {
        self.slices.iter().fold(0, |acc, s| acc | s.placed_mask())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::EnumValue;

    fn slice(name: &str, offset: u32, width: u32) -> BitSlice {
        BitSlice {
            name: name.to_string(),
            offset,
            width,
            enum_type: None,
            description: String::new(),
        }
    }

    fn storage(name: &str) -> &'static PrimitiveType {
        PrimitiveType::lookup(name).expect("primitive")
    }

    fn no_enums(_: &str) -> Option<usize> {
        None
    }

    fn mode_enum() -> EnumDef {
        EnumDef {
            name: "Mode".into(),
            underlying: "u8".into(),
            values: ["Off", "On", "Auto"]
                .iter()
                .enumerate()
                .map(|(i, n)| EnumValue {
                    name: n.to_string(),
                    value: i as i128,
                    description: String::new(),
                })
                .collect(),
            description: String::new(),
        }
    }

    #[test]
    fn representations_follow_width_and_enum() {
        let enums = vec![mode_enum()];
        let mut mode = slice("mode", 1, 2);
        mode.enum_type = Some("Mode".into());
        let plan = plan(
            storage("u8"),
            &[slice("enable", 0, 1), mode, slice("channel", 3, 4)],
            &enums,
            |n| (n == "Mode").then_some(0),
        )
        .expect("plan");
        assert_eq!(plan.slices[0].repr, SliceRepr::Bool);
        assert_eq!(plan.slices[1].repr, SliceRepr::Enum(0));
        assert_eq!(plan.slices[2].repr, SliceRepr::Unsigned(storage("u8")));

        let wide = plan_u32(&[slice("addr", 0, 16), slice("data", 16, 16)]);
        assert_eq!(wide.slices[0].repr, SliceRepr::Unsigned(storage("u16")));
        let odd = plan_u32(&[slice("big", 0, 17)]);
        assert_eq!(odd.slices[0].repr, SliceRepr::Unsigned(storage("u32")));
    }

    fn plan_u32(slices: &[BitSlice]) -> BitPlan {
        plan(storage("u32"), slices, &[], no_enums).expect("plan")
    }

    #[test]
    fn rejects_slice_past_storage_width() {
        let err = plan(storage("u8"), &[slice("x", 6, 3)], &[], no_enums).unwrap_err();
        assert_eq!(
            err,
            CompileErrorKind::SliceOutOfRange {
                slice: "x".into(),
                offset: 6,
                end: 9,
                storage_bits: 8
            }
        );
        assert!(plan(storage("u16"), &[slice("x", 8, 8)], &[], no_enums).is_ok());
    }

    #[test]
    fn rejects_overlap() {
        let err = plan(storage("u16"), &[slice("a", 0, 4), slice("b", 3, 2)], &[], no_enums).unwrap_err();
        assert_eq!(
            err,
            CompileErrorKind::SliceOverlap {
                first: "a".into(),
                second: "b".into()
            }
        );
    }

    #[test]
    fn rejects_undefined_enum_and_oversized_values() {
        let mut s = slice("mode", 0, 2);
        s.enum_type = Some("Missing".into());
        assert!(matches!(
            plan(storage("u8"), &[s], &[], no_enums),
            Err(CompileErrorKind::Inconsistent(_))
        ));

        let enums = vec![mode_enum()];
        let mut narrow = slice("mode", 0, 1);
        narrow.enum_type = Some("Mode".into());
        assert!(matches!(
            plan(storage("u8"), &[narrow], &enums, |_| Some(0)),
            Err(CompileErrorKind::Inconsistent(_))
        ));
    }

    #[test]
    fn unpack_extracts_shifted_masks() {
        let plan = plan(
            storage("u8"),
            &[slice("enable", 0, 1), slice("mode", 1, 3), slice("channel", 4, 4)],
            &[],
            no_enums,
        )
        .expect("plan");
        assert_eq!(plan.unpack(0b1010_0111), vec![1, 0b011, 0b1010]);
        assert_eq!(plan.pack(&[1, 0b011, 0b1010]), 0b1010_0111);
    }

    #[test]
    fn unpack_then_pack_is_identity_on_declared_bits() {
        let plan = plan(
            storage("u16"),
            &[slice("a", 0, 1), slice("b", 2, 5), slice("c", 9, 7)],
            &[],
            no_enums,
        )
        .expect("plan");
        let declared = plan.declared_mask();
        for raw in 0..=u16::MAX as u64 {
            let packed = plan.pack(&plan.unpack(raw));
            assert_eq!(packed, raw & declared, "raw {:#06x}", raw);
        }
    }

    #[test]
    fn pack_masks_oversized_values() {
        let plan = plan(storage("u8"), &[slice("lo", 0, 4), slice("hi", 4, 4)], &[], no_enums).expect("plan");
        assert_eq!(plan.pack(&[0xFF, 0]), 0x0F);
    }
}
