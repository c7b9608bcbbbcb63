//! ELF symbol-table translation.
//!
//! Pairs each OBJECT/FUNC symbol with its entry in the body's object and
//! function sub-sections. The sub-sections carry no symbol names; the
//! pairing relies on the producer emitting entries in exactly symbol-table
//! order, so the walk here is a pair of cursors, not a search.

use log::debug;
use typecask_format::FormatError;
use typecask_format::kind::Kind;
use typecask_format::preamble::Header;
use typecask_format::record::unpack_info;
use typecask_format::strtab;

use super::OpenError;

/// Symbol and string table from the host object file.
pub struct SymtabSource<'a> {
    /// Raw symbol-table bytes.
    pub data: &'a [u8],
    /// Symbol entry stride: 16 (ELF32) or 24 (ELF64).
    pub entsize: usize,
    /// The symbol table's own string table.
    pub strtab: &'a [u8],
}

/// Data model of the host object, inferred from the symbol entry stride.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataModel {
    Ilp32,
    Lp64,
    /// No symbol table was supplied; nothing to infer.
    Native,
}

const ELF32_SYM_SIZE: usize = 16;
const ELF64_SYM_SIZE: usize = 24;

const STT_OBJECT: u8 = 1;
const STT_FUNC: u8 = 2;

const SHN_UNDEF: u16 = 0;
const SHN_ABS: u16 = 0xfff1;

/// Reserved scoping markers emitted by some producers; never carry types.
const RESERVED_NAMES: [&str; 2] = ["_START_", "_END_"];

struct Sym<'a> {
    name: &'a str,
    stt: u8,
    shndx: u16,
    value: u64,
}

fn decode_sym<'a>(entry: &[u8], entsize: usize, strings: &'a [u8]) -> Sym<'a> {
    let ne_u32 = |off: usize| {
        u32::from_ne_bytes([entry[off], entry[off + 1], entry[off + 2], entry[off + 3]])
    };
    let ne_u16 = |off: usize| u16::from_ne_bytes([entry[off], entry[off + 1]]);

    let (name_ref, info, shndx, value) = if entsize == ELF32_SYM_SIZE {
        (ne_u32(0), entry[12], ne_u16(14), u64::from(ne_u32(4)))
    } else {
        let value = u64::from_ne_bytes([
            entry[8], entry[9], entry[10], entry[11], entry[12], entry[13], entry[14], entry[15],
        ]);
        (ne_u32(0), entry[4], ne_u16(6), value)
    };
    Sym {
        name: strtab::string_at(strings, name_ref).unwrap_or(""),
        stt: info & 0x0f,
        shndx,
        value,
    }
}

/// Build the per-symbol translation table.
///
/// Each slot is the byte offset of the symbol's entry in the object or
/// function sub-section, or `None` for symbols that carry no type
/// information.
pub(super) fn translate(
    src: &SymtabSource<'_>,
    header: &Header,
    body: &[u8],
) -> Result<(Vec<Option<u32>>, DataModel), OpenError> {
    let model = match src.entsize {
        ELF32_SYM_SIZE => DataModel::Ilp32,
        ELF64_SYM_SIZE => DataModel::Lp64,
        other => return Err(OpenError::Corrupt(FormatError::BadSymbolStride(other))),
    };

    let func_off = header.func_off as usize;
    let obj_index_off = header.obj_index_off as usize;

    let mut objtoff = header.obj_off as usize;
    let mut functoff = func_off;
    let mut map = Vec::with_capacity(src.data.len() / src.entsize);

    for entry in src.data.chunks_exact(src.entsize) {
        let sym = decode_sym(entry, src.entsize, src.strtab);

        let skip = sym.name.is_empty()
            || sym.shndx == SHN_UNDEF
            || RESERVED_NAMES.contains(&sym.name)
            || (sym.shndx == SHN_ABS && sym.value == 0);
        if skip {
            map.push(None);
            continue;
        }

        match sym.stt {
            STT_OBJECT => {
                if objtoff >= func_off {
                    map.push(None);
                } else {
                    map.push(Some(objtoff as u32));
                    objtoff += 4;
                }
            }
            STT_FUNC => {
                if functoff + 4 > obj_index_off {
                    map.push(None);
                    continue;
                }
                map.push(Some(functoff as u32));
                // A pad entry is a lone info word; a real entry is the info
                // word, the return type, and vlen parameter slots.
                let info = unpack_info(u32::from_ne_bytes([
                    body[functoff],
                    body[functoff + 1],
                    body[functoff + 2],
                    body[functoff + 3],
                ]))?;
                if info.kind == Kind::Unknown && info.vlen == 0 {
                    functoff += 4;
                } else {
                    functoff += (info.vlen as usize + 2) * 4;
                }
            }
            _ => map.push(None),
        }
    }

    debug!(
        "translated {} symbols ({} mapped)",
        map.len(),
        map.iter().filter(|m| m.is_some()).count(),
    );
    Ok((map, model))
}
