//! Benchmark: resolve + generate for a mid-sized schema, and reference-codec decode/encode
//! of one instance of its largest struct.

use biogen::{compile_str, resolve_str, Codec, GeneratorConfig};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn schema(structs: usize) -> String {
    let mut s = String::from(
        "protocol:\n  name: Bench\n  namespace: bench::wire\nenums:\n  - name: Kind\n    type: u8\n    values:\n      - { name: A, value: 0 }\n      - { name: B, value: 1 }\n      - { name: C, value: 2 }\nstructs:\n",
    );
    for i in 0..structs {
        s.push_str(&format!(
            "  - name: S{i}\n    fields:\n      - {{ name: magic, type: u16, expected: 0xBEEF }}\n      - name: flags\n        type: bitfield_u16\n        bits:\n          - {{ name: present, offset: 0, width: 1 }}\n          - {{ name: kind, offset: 1, width: 2, type: Kind }}\n          - {{ name: count, offset: 3, width: 9 }}\n      - {{ name: body, type: u64, condition: \"present\" }}\n      - {{ name: pad, type: padding, pad_size: 2 }}\n      - {{ name: tag, type: string, length: 12 }}\n      - {{ name: samples, type: array, element_type: i32, length: 16 }}\n",
        ));
        if i > 0 {
            s.push_str(&format!("      - {{ name: prev, type: S{} }}\n", i - 1));
        }
    }
    s
}

fn bench_compile(c: &mut Criterion) {
    let text = schema(40);
    let config = GeneratorConfig::default();
    c.bench_function("compile_40_structs", |b| {
        b.iter(|| compile_str(black_box(&text), "bench.yaml", &config).expect("compile"))
    });
}

fn bench_codec(c: &mut Criterion) {
    let text = schema(8);
    let protocol = resolve_str(&text, "bench.yaml").expect("resolve");
    let codec = Codec::new(&protocol);
    let mut record = codec.default_record("S7").expect("default");
    record.set("present", biogen::Value::Bool(true));
    let bytes = codec.encode("S7", &record).expect("encode");

    c.bench_function("decode_nested_8", |b| {
        b.iter(|| codec.decode("S7", black_box(&bytes)).expect("decode"))
    });
    c.bench_function("decode_encode_nested_8", |b| {
        b.iter(|| {
            let d = codec.decode("S7", black_box(&bytes)).expect("decode");
            codec.encode("S7", &d.record).expect("encode")
        })
    });
}

criterion_group!(benches, bench_compile, bench_codec);
criterion_main!(benches);
