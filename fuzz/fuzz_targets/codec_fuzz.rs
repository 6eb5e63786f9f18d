//! Codec fuzz target: decode arbitrary bytes with a schema that uses every field kind.
//! Neither decoding nor re-encoding what decoded may panic.
//! Build with: cargo fuzz run codec_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
const SCHEMA: &str = r#"
protocol:
  name: Fuzz
  byte_order: big_endian
enums:
  - name: Kind
    type: u8
    values:
      - { name: A, value: 0 }
      - { name: B, value: 1 }
      - { name: C, value: 7 }
structs:
  - name: Inner
    fields:
      - { name: id, type: u16 }
      - { name: kind, type: Kind }
  - name: Frame
    fields:
      - { name: magic, type: u8, expected: 0x5A }
      - name: flags
        type: bitfield_u8
        bits:
          - { name: has_extra, offset: 0, width: 1 }
          - { name: kind_bits, offset: 1, width: 3, type: Kind }
          - { name: level, offset: 4, width: 4 }
      - { name: reserved, type: padding, pad_size: 1 }
      - { name: extra, type: i32, condition: "has_extra" }
      - { name: label, type: string, length: 4 }
      - { name: items, type: array, element_type: Inner, length: 2 }
      - { name: ratio, type: f32 }
"#;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let protocol = match biogen::resolve_str(SCHEMA, "fuzz.yaml") {
        Ok(p) => p,
        Err(_) => return,
    };
    let codec = biogen::Codec::new(&protocol);
    if let Ok(decoded) = codec.decode("Frame", data) {
        let _ = codec.encode("Frame", &decoded.record);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run codec_fuzz");
}
