//! Struct blocks: members, `parse` and `serialize`.

use super::{fields, CodeWriter};
use crate::resolve::ResolvedProtocol;
use tracing::debug;

pub(crate) fn emit(w: &mut CodeWriter, protocol: &ResolvedProtocol, idx: usize) {
    let s = protocol.struct_def(idx);
    let order = protocol.byte_order();

    w.doc(&s.description);
    w.line(format!("struct {} {{", s.name));
    w.indent();
    for (f, rf) in protocol.fields(idx) {
        fields::declare(w, protocol, f, &rf.kind);
    }
    w.blank();

    w.line(format!("bio::Status parse(bio::{}& reader) {{", order.reader_alias()));
    w.indent();
    for (f, rf) in protocol.fields(idx) {
        fields::parse(w, protocol, f, rf);
    }
    w.line("return bio::Status::Ok();");
    w.dedent();
    w.line("}");
    w.blank();

    w.line(format!("bio::Status serialize(bio::{}& writer) const {{", order.writer_alias()));
    w.indent();
    for (f, rf) in protocol.fields(idx) {
        fields::serialize(w, protocol, f, rf);
    }
    w.line("return bio::Status::Ok();");
    w.dedent();
    w.line("}");
    w.dedent();
    w.line("};");

    debug!(name = %s.name, fields = s.fields.len(), "emitted struct");
}
