//! Human-readable container dump for debugging.

use std::fmt::Write as _;

use typecask_format::kind::{KIND_COUNT, Kind};

use super::{Container, TypeId};

/// Render a summary of an open container: header fields, per-kind record
/// counts, and one line per type.
pub fn dump(container: &Container<'_>) -> String {
    let mut out = String::new();

    dump_header(&mut out, container);
    dump_kind_counts(&mut out, container);
    dump_types(&mut out, container);

    out
}

fn dump_header(out: &mut String, c: &Container<'_>) {
    let _ = writeln!(out, "container: {:?}, {} types", c.version(), c.type_count());
    if let Some(name) = c.cu_name() {
        let _ = writeln!(out, "  unit: {name}");
    }
    if let Some(name) = c.parent_name() {
        let label = c.parent_label().unwrap_or("<none>");
        let _ = writeln!(out, "  parent: {name} @ {label}");
    }
    let h = &c.header;
    let _ = writeln!(
        out,
        "  sections: labels {} objects {} functions {} variables {} types {} strings {}+{}",
        h.label_off, h.obj_off, h.func_off, h.var_off, h.type_off, h.str_off, h.str_len,
    );
}

fn dump_kind_counts(out: &mut String, c: &Container<'_>) {
    let mut pop = [0usize; KIND_COUNT];
    for id in 1..=c.type_count() {
        if let Some(view) = c.type_at(TypeId(c.index_to_id(id))) {
            pop[view.kind() as usize] += 1;
        }
    }
    let _ = writeln!(out, "kinds:");
    for raw in 0..KIND_COUNT as u8 {
        let Some(kind) = Kind::from_u8(raw) else {
            continue;
        };
        if pop[kind as usize] > 0 {
            let _ = writeln!(out, "  {:10} {}", kind.name(), pop[kind as usize]);
        }
    }
}

fn dump_types(out: &mut String, c: &Container<'_>) {
    let _ = writeln!(out, "types:");
    for idx in 1..=c.type_count() {
        let id = TypeId(c.index_to_id(idx));
        let Some(view) = c.type_at(id) else {
            continue;
        };
        let name = view.name();
        let name = if name.is_empty() { "<anon>" } else { name };
        let mut line = format!("  [{}] {} {}", id.0, view.kind().name(), name);
        match view.kind() {
            k if k.references_type() => {
                let _ = write!(line, " -> {}", view.rec.size_or_type);
            }
            Kind::Forward => {
                if let Some(tag) = view.forward_tag() {
                    let _ = write!(line, " ({})", tag.name());
                }
            }
            _ => {
                let _ = write!(line, " size {}", view.size());
            }
        }
        if view.vlen() > 0 {
            let _ = write!(line, " vlen {}", view.vlen());
        }
        let _ = writeln!(out, "{line}");
    }
}
