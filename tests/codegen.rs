//! Generated header text: layout, per-kind parse/serialize statements, enums, config.

use biogen::{compile_str, CompileErrorKind, Error, GeneratorConfig};

fn header(schema: &str) -> String {
    compile_str(schema, "proto.yaml", &GeneratorConfig::default())
        .expect("compile")
        .contents
}

fn assert_contains(code: &str, needle: &str) {
    assert!(code.contains(needle), "missing {:?} in:\n{}", needle, code);
}

fn position(code: &str, needle: &str) -> usize {
    code.find(needle)
        .unwrap_or_else(|| panic!("missing {:?} in:\n{}", needle, code))
}

const MSG: &str = "protocol: { name: Msg }\nstructs:\n  - name: Msg\n    fields:\n      - { name: value, type: u8 }\n";

#[test]
fn single_byte_struct_little_endian() {
    let code = header(MSG);
    assert_contains(&code, "struct Msg {\n  uint8_t value{};\n");
    assert_contains(&code, "bio::Status parse(bio::LEReader& reader) {");
    assert_contains(&code, "bio::Status serialize(bio::LEWriter& writer) const {");
    assert_contains(&code, "if (!reader.read_u8(value)) return bio::Status::OutOfRange();");
    assert_contains(&code, "if (!writer.write_u8(value)) return bio::Status::OutOfRange();");
    assert_contains(&code, "using LEReader = ByteReaderT<LittleEndianCodec>;");
    assert_contains(&code, "using LEWriter = ByteWriterT<LittleEndianCodec>;");
    assert!(!code.contains("BEReader"));
    assert_eq!(code.matches("return bio::Status::Ok();").count(), 2);
}

#[test]
fn file_layout_and_naming() {
    let schema = r#"
protocol:
  name: Sensor
  namespace: acme::sensor
  includes: ["<vector>", "acme/time.hpp"]
enums:
  - name: Mode
    type: u8
    values: [{ name: Off, value: 0 }]
structs:
  - name: Frame
    fields:
      - { name: mode, type: Mode }
"#;
    let artifact = compile_str(schema, "sensor.yaml", &GeneratorConfig::default()).expect("compile");
    assert_eq!(artifact.file_name, "sensor_protocol.hpp");
    let code = artifact.contents;
    assert!(code.starts_with(
        "// Generated by biogen from sensor.yaml. Do not edit.\n#ifndef SENSOR_PROTOCOL_HPP_\n#define SENSOR_PROTOCOL_HPP_\n"
    ));
    assert!(code.ends_with("}  // namespace acme::sensor\n\n#endif  // SENSOR_PROTOCOL_HPP_\n"));

    let order = [
        "#include <array>",
        "#include <cstddef>",
        "#include <cstdint>",
        "#include \"binary-io/binary-io.hpp\"",
        "#include <vector>",
        "#include \"acme/time.hpp\"",
        "namespace bio {",
        "namespace acme::sensor {",
        "enum class Mode",
        "struct Frame",
    ];
    let positions: Vec<usize> = order.iter().map(|n| position(&code, n)).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "out of order: {:?}", positions);
}

#[test]
fn empty_namespace_emits_no_block() {
    let code = header(MSG);
    assert!(!code.contains("namespace Msg"));
    assert_eq!(code.matches("namespace ").count(), 2, "only the bio alias block:\n{}", code);
}

#[test]
fn big_endian_selects_the_other_alias_pair() {
    let code = header("protocol: { name: B, byte_order: big_endian }\nstructs:\n  - name: S\n    fields:\n      - { name: v, type: u16 }\n");
    assert_contains(&code, "using BEReader = ByteReaderT<BigEndianCodec>;");
    assert_contains(&code, "bio::Status parse(bio::BEReader& reader) {");
    assert_contains(&code, "bio::Status serialize(bio::BEWriter& writer) const {");
    assert!(!code.contains("LittleEndianCodec"));
}

#[test]
fn enum_block_is_total() {
    let schema = r#"
protocol: { name: E }
enums:
  - name: Color
    type: u8
    description: Paint colour
    values:
      - { name: Red, value: 0 }
      - { name: Green, value: 1 }
      - { name: Blue, value: 2 }
      - { name: Verde, value: 1 }
  - name: Level
    type: i16
    values:
      - { name: Low, value: -1 }
      - { name: High, value: 0x100 }
structs:
  - name: S
    fields:
      - { name: c, type: Color }
"#;
    let code = header(schema);
    assert_contains(&code, "/// Paint colour\nenum class Color : uint8_t {\n  Red = 0x0,\n  Green = 0x1,\n  Blue = 0x2,\n  Verde = 0x1,\n};");
    assert_contains(&code, "inline Color ColorFromRaw(uint8_t raw) {");
    assert_contains(&code, "case 0x1: return Color::Green;");
    assert!(!code.contains("return Color::Verde;"));
    assert_contains(&code, "default: return Color::Red;");
    assert_contains(&code, "inline uint8_t ColorToRaw(Color value) {\n  return static_cast<uint8_t>(value);\n}");
    assert_contains(&code, "Low = -0x1,");
    assert_contains(&code, "case -0x1: return Level::Low;");
    assert_contains(&code, "inline Level LevelFromRaw(int16_t raw) {");
    assert_contains(&code, "Color c{Color::Red};");
}

#[test]
fn signed_minimums_are_spelled_as_signed_literals() {
    let schema = r#"
protocol: { name: MinInt }
enums:
  - name: Edge
    type: i32
    values:
      - { name: Floor, value: -2147483648 }
      - { name: Zero, value: 0 }
structs:
  - name: S
    fields:
      - { name: e, type: Edge }
      - { name: v, type: i32, expected: -2147483648 }
      - { name: w, type: i64, expected: -2147483649 }
"#;
    let code = header(schema);
    assert_contains(&code, "Floor = (-0x7FFFFFFF - 1),");
    assert_contains(&code, "case (-0x7FFFFFFF - 1): return Edge::Floor;");
    assert_contains(&code, "int32_t v{(-0x7FFFFFFF - 1)};");
    assert_contains(&code, "if (v != (-0x7FFFFFFF - 1)) return bio::Status::OutOfRange();");
    assert_contains(&code, "int64_t w{-0x80000001LL};");
    assert!(!code.contains("-0x80000000"));
}

#[test]
fn enum_field_reads_through_converter() {
    let schema = r#"
protocol: { name: E }
enums:
  - name: Dir
    type: u16
    values: [{ name: Up, value: 0 }, { name: Down, value: 1 }]
structs:
  - name: S
    fields:
      - { name: dir, type: Dir, expected: 1 }
      - { name: dirs, type: array, element_type: Dir, length: 4 }
"#;
    let code = header(schema);
    assert_contains(&code, "Dir dir{Dir::Down};");
    assert_contains(
        &code,
        "    {\n      uint16_t _dir_raw = 0;\n      if (!reader.read_u16(_dir_raw)) return bio::Status::OutOfRange();\n      if (_dir_raw != 0x1) return bio::Status::OutOfRange();  // dir: expected 0x1\n      dir = DirFromRaw(_dir_raw);\n    }\n",
    );
    assert_contains(&code, "if (!writer.write_u16(DirToRaw(dir))) return bio::Status::OutOfRange();");
    assert_contains(&code, "std::array<Dir, 4> dirs = [] { std::array<Dir, 4> a{}; a.fill(Dir::Up); return a; }();");
    assert_contains(&code, "for (auto& elem : dirs) {");
    assert_contains(&code, "elem = DirFromRaw(_raw);");
    assert_contains(&code, "for (const auto& elem : dirs) {");
    assert_contains(&code, "if (!writer.write_u16(DirToRaw(elem))) return bio::Status::OutOfRange();");
}

#[test]
fn bitfield_unpack_and_pack() {
    let schema = r#"
protocol: { name: Bits }
enums:
  - name: Mode
    type: u8
    values: [{ name: Off, value: 0 }, { name: On, value: 1 }, { name: Auto, value: 2 }]
structs:
  - name: S
    fields:
      - name: ctrl
        type: bitfield_u8
        bits:
          - { name: enable, offset: 0, width: 1 }
          - { name: mode, offset: 1, width: 2, type: Mode }
          - { name: channel, offset: 3, width: 5, description: radio channel }
"#;
    let code = header(schema);
    assert_contains(&code, "bool enable{};");
    assert_contains(&code, "Mode mode{Mode::Off};");
    assert_contains(&code, "uint8_t channel{};  // radio channel");
    assert!(!code.contains("ctrl{"), "the bitfield itself is not a member");

    assert_contains(&code, "uint8_t _ctrl_raw = 0;");
    assert_contains(&code, "if (!reader.read_u8(_ctrl_raw)) return bio::Status::OutOfRange();");
    assert_contains(&code, "enable = ((_ctrl_raw >> 0) & 0x1) != 0;");
    assert_contains(&code, "mode = ModeFromRaw(static_cast<uint8_t>((_ctrl_raw >> 1) & 0x3));");
    assert_contains(&code, "channel = static_cast<uint8_t>((_ctrl_raw >> 3) & 0x1F);");

    assert_contains(&code, "_ctrl_raw = static_cast<uint8_t>(_ctrl_raw | ((static_cast<uint8_t>(enable ? 1 : 0) & 0x1) << 0));");
    assert_contains(&code, "_ctrl_raw = static_cast<uint8_t>(_ctrl_raw | ((static_cast<uint8_t>(ModeToRaw(mode)) & 0x3) << 1));");
    assert_contains(&code, "_ctrl_raw = static_cast<uint8_t>(_ctrl_raw | ((static_cast<uint8_t>(channel) & 0x1F) << 3));");
    assert_contains(&code, "if (!writer.write_u8(_ctrl_raw)) return bio::Status::OutOfRange();");
}

#[test]
fn wide_bitfield_slices_use_smallest_unsigned() {
    let code = header(
        "protocol: { name: W }\nstructs:\n  - name: S\n    fields:\n      - name: word\n        type: bitfield_u32\n        bits:\n          - { name: addr, offset: 0, width: 12 }\n          - { name: data, offset: 12, width: 20 }\n",
    );
    assert_contains(&code, "uint16_t addr{};");
    assert_contains(&code, "uint32_t data{};");
    assert_contains(&code, "data = static_cast<uint32_t>((_word_raw >> 12) & 0xFFFFF);");
    assert_contains(&code, "if (!reader.read_u32(_word_raw))");
}

#[test]
fn expected_value_check_and_default() {
    let code = header(
        "protocol: { name: M }\nstructs:\n  - name: H\n    fields:\n      - { name: magic, type: u32, expected: 0xDEADBEEF }\n",
    );
    assert_contains(&code, "uint32_t magic{0xDEADBEEF};");
    assert_contains(
        &code,
        "if (!reader.read_u32(magic)) return bio::Status::OutOfRange();\n    if (magic != 0xDEADBEEF) return bio::Status::OutOfRange();  // magic: expected 0xDEADBEEF\n",
    );
    assert_eq!(code.matches("!= 0xDEADBEEF").count(), 1, "checked on parse only");
}

#[test]
fn conditional_field_guards_both_directions() {
    let code = header(
        "protocol: { name: C }\nstructs:\n  - name: S\n    fields:\n      - { name: flags, type: u8 }\n      - { name: extra, type: u32, condition: \"flags & 0x01\" }\n",
    );
    assert_contains(
        &code,
        "    if (flags & 0x01) {\n      if (!reader.read_u32(extra)) return bio::Status::OutOfRange();\n    } else {\n      extra = 0;\n    }\n",
    );
    assert_contains(
        &code,
        "    if (flags & 0x01) {\n      if (!writer.write_u32(extra)) return bio::Status::OutOfRange();\n    }\n",
    );
}

#[test]
fn padding_skips_and_fills() {
    let code = header(
        "protocol: { name: P }\nstructs:\n  - name: S\n    fields:\n      - { name: a, type: u8 }\n      - { name: reserved, type: padding, pad_size: 3 }\n      - { name: b, type: u8 }\n",
    );
    assert!(!code.contains("reserved{"), "padding is never a member");
    let a = position(&code, "reader.read_u8(a)");
    let skip = position(&code, "if (!reader.skip(3)) return bio::Status::OutOfRange();");
    let b = position(&code, "reader.read_u8(b)");
    assert!(a < skip && skip < b);
    assert_contains(&code, "constexpr std::array<uint8_t, 3> _reserved_fill{};");
    assert_contains(&code, "if (!writer.write_bytes(_reserved_fill.data(), 3)) return bio::Status::OutOfRange();");
}

#[test]
fn fixed_size_kinds_and_nested_structs() {
    let schema = r#"
protocol: { name: K }
structs:
  - name: Outer
    description: Holds an inner
    fields:
      - { name: inner, type: Inner }
      - { name: data, type: bytes, length: 16 }
      - { name: name, type: string, length: 32 }
      - { name: values, type: array, element_type: u16, length: 4 }
      - { name: items, type: array, element_type: Inner, length: 2 }
  - name: Inner
    fields:
      - { name: x, type: f64 }
"#;
    let code = header(schema);
    assert!(position(&code, "struct Inner {") < position(&code, "struct Outer {"));
    assert_contains(&code, "/// Holds an inner\nstruct Outer {");
    assert_contains(&code, "Inner inner{};");
    assert_contains(&code, "if (auto status = inner.parse(reader); !status) return status;");
    assert_contains(&code, "if (auto status = inner.serialize(writer); !status) return status;");
    assert_contains(&code, "std::array<uint8_t, 16> data{};");
    assert_contains(&code, "if (!reader.read_bytes(data.data(), 16)) return bio::Status::OutOfRange();");
    assert_contains(&code, "std::array<char, 32> name{};");
    assert_contains(&code, "if (!writer.write_bytes(name.data(), 32)) return bio::Status::OutOfRange();");
    assert_contains(&code, "std::array<uint16_t, 4> values{};");
    assert_contains(&code, "if (!reader.read_u16(elem)) return bio::Status::OutOfRange();");
    assert_contains(&code, "std::array<Inner, 2> items{};");
    assert_contains(&code, "if (auto status = elem.parse(reader); !status) return status;");
    assert_contains(&code, "double x{};");
    assert_contains(&code, "if (!reader.read_f64(x)) return bio::Status::OutOfRange();");
}

#[test]
fn config_changes_include_and_indent() {
    let config = GeneratorConfig {
        helper_include: "third_party/bio.hpp".to_string(),
        indent: 4,
    };
    let code = compile_str(MSG, "msg.yaml", &config).expect("compile").contents;
    assert_contains(&code, "#include \"third_party/bio.hpp\"");
    assert_contains(&code, "\n        if (!reader.read_u8(value)) return bio::Status::OutOfRange();\n");
}

#[test]
fn compilation_is_deterministic() {
    let schema = r#"
protocol: { name: D, namespace: d }
enums:
  - { name: A, type: u8, values: [{ name: X, value: 1 }, { name: Y, value: 2 }] }
structs:
  - name: S2
    fields: [{ name: s1, type: S1 }, { name: a, type: A }]
  - name: S1
    fields: [{ name: v, type: i64 }]
  - name: S3
    fields: [{ name: v, type: u8 }]
"#;
    let config = GeneratorConfig::default();
    let first = compile_str(schema, "d.yaml", &config).expect("first");
    let second = compile_str(schema, "d.yaml", &config).expect("second");
    assert_eq!(first, second);
}

#[test]
fn unresolved_type_fails_the_unit() {
    let err = compile_str(
        "protocol: { name: Bad }\nstructs:\n  - name: S\n    fields:\n      - { name: x, type: nonexistent_type_xyz }\n",
        "bad.yaml",
        &GeneratorConfig::default(),
    )
    .unwrap_err();
    match err {
        Error::Compile(e) => {
            assert_eq!(e.unit, "Bad");
            assert_eq!(e.field.as_deref(), Some("x"));
            assert_eq!(e.kind, CompileErrorKind::UnresolvedSymbol("nonexistent_type_xyz".into()));
            assert_eq!(e.to_string(), "protocol 'Bad': S.x: unknown type 'nonexistent_type_xyz'");
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn bit_geometry_errors_fail_the_unit() {
    let overlap = "protocol: { name: G }\nstructs:\n  - name: S\n    fields:\n      - name: f\n        type: bitfield_u8\n        bits:\n          - { name: a, offset: 0, width: 4 }\n          - { name: b, offset: 3, width: 2 }\n";
    match compile_str(overlap, "g.yaml", &GeneratorConfig::default()) {
        Err(Error::Compile(e)) => assert!(matches!(e.kind, CompileErrorKind::SliceOverlap { .. })),
        other => panic!("unexpected: {:?}", other),
    }
    let wide = overlap.replace("offset: 3, width: 2", "offset: 6, width: 3");
    match compile_str(&wide, "g.yaml", &GeneratorConfig::default()) {
        Err(Error::Compile(e)) => assert!(matches!(e.kind, CompileErrorKind::SliceOutOfRange { .. })),
        other => panic!("unexpected: {:?}", other),
    }
}
