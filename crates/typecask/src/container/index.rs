//! Two-pass type-section indexer.
//!
//! Pass 1 counts records per kind and validates every record's geometry
//! against the section bounds. Pass 2 assigns sequential ids in stream
//! order, records byte offsets, fills the four name maps under their
//! per-kind insertion rules, and derives the pointer table. A post-pass
//! propagates pointer entries through anonymous typedefs.

use indexmap::IndexMap;
use log::debug;
use typecask_format::FormatError;
use typecask_format::kind::{KIND_COUNT, Kind};
use typecask_format::preamble::Header;
use typecask_format::record::RecordHeader;
use typecask_format::strtab;

use super::{FormatVersion, OpenError, id_to_index, same_side};

/// Everything pass 2 produced; moved wholesale into the container handle.
pub(super) struct TypeIndex {
    pub typemax: u32,
    pub type_offsets: Vec<u32>,
    pub ptrtab: Vec<u32>,
    pub structs: IndexMap<String, u32>,
    pub unions: IndexMap<String, u32>,
    pub enums: IndexMap<String, u32>,
    pub names: IndexMap<String, u32>,
}

fn zeroed_table(len: usize) -> Result<Vec<u32>, OpenError> {
    let mut table = Vec::new();
    table
        .try_reserve_exact(len)
        .map_err(|_| OpenError::OutOfMemory)?;
    table.resize(len, 0);
    Ok(table)
}

pub(super) fn build(
    body: &[u8],
    header: &Header,
    version: FormatVersion,
    child: bool,
) -> Result<TypeIndex, OpenError> {
    let type_off = header.type_off as usize;
    let str_off = header.str_off as usize;
    let strings = &body[str_off..];
    let boundary = version.id_boundary();

    // Pass 1: count populations and validate geometry.
    let mut pop = [0usize; KIND_COUNT];
    let mut typemax: u64 = 0;
    let mut pos = type_off;
    while pos < str_off {
        let rec = RecordHeader::decode(&body[pos..str_off])?;
        let total = rec.total_len()?;
        if pos + total > str_off {
            return Err(OpenError::Corrupt(FormatError::RecordPastEnd));
        }
        pop[rec.info.kind as usize] += 1;
        if rec.info.kind == Kind::Forward {
            // A forward declaration occupies a slot in the map of the tag
            // kind it declares.
            let tag = typecask_format::record::forward_tag_kind(rec.size_or_type);
            pop[tag as usize] += 1;
        }
        typemax += 1;
        pos += total;
    }
    if typemax > u64::from(boundary) {
        return Err(OpenError::Corrupt(FormatError::TooManyTypes(typemax)));
    }
    let typemax = typemax as u32;

    let type_offsets = zeroed_table(typemax as usize + 1)?;
    let ptrtab = zeroed_table(typemax as usize + 1)?;
    let other_named: usize = (0..KIND_COUNT as u8)
        .filter_map(Kind::from_u8)
        .filter(|k| k.in_shared_namespace())
        .map(|k| pop[k as usize])
        .sum();

    let mut index = TypeIndex {
        typemax,
        type_offsets,
        ptrtab,
        structs: IndexMap::with_capacity(pop[Kind::Struct as usize]),
        unions: IndexMap::with_capacity(pop[Kind::Union as usize]),
        enums: IndexMap::with_capacity(pop[Kind::Enum as usize]),
        names: IndexMap::with_capacity(other_named),
    };

    // Pass 2: assign ids 1..=typemax in stream order.
    let mut long_composites = 0usize;
    let mut pos = type_off;
    let mut idx: u32 = 0;
    while pos < str_off {
        let rec = RecordHeader::decode(&body[pos..str_off])?;
        idx += 1;
        index.type_offsets[idx as usize] = pos as u32;

        let name = strtab::string_at(strings, rec.name).unwrap_or("");
        if !name.is_empty() {
            match rec.info.kind {
                // Bitfield variants of a base type reuse its name; keep one
                // entry, with root visibility deciding conflicts.
                Kind::Integer | Kind::Float => {
                    if rec.info.is_root {
                        index.names.insert(name.to_owned(), idx);
                    } else {
                        index.names.entry(name.to_owned()).or_insert(idx);
                    }
                }
                Kind::Function
                | Kind::Typedef
                | Kind::Pointer
                | Kind::Volatile
                | Kind::Const
                | Kind::Restrict => {
                    index.names.entry(name.to_owned()).or_insert(idx);
                }
                Kind::Struct | Kind::Union => {
                    if rec.size >= typecask_format::record::LSTRUCT_THRESHOLD {
                        long_composites += 1;
                    }
                    let map = if rec.info.kind == Kind::Struct {
                        &mut index.structs
                    } else {
                        &mut index.unions
                    };
                    map.insert(name.to_owned(), idx);
                }
                Kind::Enum => {
                    index.enums.insert(name.to_owned(), idx);
                }
                // A definition or an earlier forward of the same tag stays
                // discoverable; a second forward is a no-op.
                Kind::Forward => {
                    let tag = typecask_format::record::forward_tag_kind(rec.size_or_type);
                    let map = match tag {
                        Kind::Union => &mut index.unions,
                        Kind::Enum => &mut index.enums,
                        _ => &mut index.structs,
                    };
                    map.entry(name.to_owned()).or_insert(idx);
                }
                Kind::Unknown | Kind::Array | Kind::Slice => {}
            }
        }

        if rec.info.kind == Kind::Pointer {
            let pointee = rec.size_or_type;
            if same_side(pointee, boundary, child) {
                let pointee_idx = id_to_index(pointee, boundary);
                if pointee_idx != 0 && pointee_idx <= typemax {
                    // Last pointer wins when several target the same type.
                    index.ptrtab[pointee_idx as usize] = idx;
                }
            }
        }

        pos += rec.total_len()?;
    }

    propagate_through_typedefs(body, str_off, strings, boundary, child, &mut index)?;

    debug!(
        "indexed {} types ({} structs, {} unions, {} enums, {} other named, {} long composites)",
        index.typemax,
        index.structs.len(),
        index.unions.len(),
        index.enums.len(),
        index.names.len(),
        long_composites,
    );
    Ok(index)
}

/// Let "pointer to anonymous-typedef-of-T" resolve as "pointer to T".
fn propagate_through_typedefs(
    body: &[u8],
    str_off: usize,
    strings: &[u8],
    boundary: u32,
    child: bool,
    index: &mut TypeIndex,
) -> Result<(), OpenError> {
    for idx in 1..=index.typemax {
        let ptr_idx = index.ptrtab[idx as usize];
        if ptr_idx == 0 {
            continue;
        }
        let off = index.type_offsets[idx as usize] as usize;
        let rec = RecordHeader::decode(&body[off..str_off])?;
        if rec.info.kind != Kind::Typedef {
            continue;
        }
        let anonymous = strtab::string_at(strings, rec.name).unwrap_or("").is_empty();
        if !anonymous {
            continue;
        }
        let wrapped = rec.size_or_type;
        if !same_side(wrapped, boundary, child) {
            continue;
        }
        let wrapped_idx = id_to_index(wrapped, boundary);
        if wrapped_idx != 0 && wrapped_idx <= index.typemax {
            index.ptrtab[wrapped_idx as usize] = ptr_idx;
        }
    }
    Ok(())
}
