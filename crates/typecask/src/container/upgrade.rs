//! Upgrade of v1 type records to the current encoding.
//!
//! Two passes: measure the size delta of every record under the current
//! encoding rules, then re-encode into a fresh buffer, relocating the
//! string section by the accumulated delta. Everything before the type
//! section is copied unchanged. The walk works with offsets into the old
//! and new buffers; nothing holds a pointer across the reallocation.

use log::debug;
use typecask_format::FormatError;
use typecask_format::compat::{
    ArrayInfoV1, MembersV1, ParamsV1, RecordHeaderV1, V1_LSTRUCT_THRESHOLD,
};
use typecask_format::kind::Kind;
use typecask_format::preamble::Header;
use typecask_format::record::{
    ARRAY_INFO_SIZE, ArrayInfo, LSIZE_SENTINEL, LSTRUCT_THRESHOLD, LONG_RECORD_SIZE,
    MAX_SMALL_SIZE, Member, SHORT_RECORD_SIZE, pack_info,
};

use super::OpenError;

pub(super) fn upgrade(body: &[u8], header: &Header) -> Result<(Vec<u8>, Header), OpenError> {
    let type_start = header.type_off as usize;
    let type_end = header.str_off as usize;

    // Pass 1: measure every record under both encodings.
    let mut delta: i64 = 0;
    let mut pos = type_start;
    while pos < type_end {
        let rec = RecordHeaderV1::decode(&body[pos..type_end])?;
        let old_total = rec.total_len()?;
        if pos + old_total > type_end {
            return Err(OpenError::Corrupt(FormatError::RecordPastEnd));
        }
        let new_total = new_record_len(&rec)?;
        delta += new_total as i64 - old_total as i64;
        pos += old_total;
    }

    let new_str_off = header.str_off as i64 + delta;
    if new_str_off < header.type_off as i64 || new_str_off > i64::from(u32::MAX) {
        return Err(OpenError::Corrupt(FormatError::BadHeaderField {
            field: "str_off",
        }));
    }
    let new_str_off = new_str_off as usize;

    // Pass 2: re-encode in lockstep into a fresh buffer.
    let mut out = Vec::with_capacity(new_str_off + header.str_len as usize);
    out.extend_from_slice(&body[..type_start]);

    let mut pos = type_start;
    while pos < type_end {
        let rec = RecordHeaderV1::decode(&body[pos..type_end])?;
        let old_total = rec.total_len()?;
        let new_total = new_record_len(&rec)?;
        let trailing = &body[pos + rec.header_len..pos + old_total];
        let record_start = out.len();
        reencode(&rec, trailing, &mut out)?;
        debug_assert_eq!(
            out.len() - record_start,
            new_total,
            "re-encoded {} record length drifted from the measuring pass",
            rec.info.kind.name(),
        );
        pos += old_total;
    }

    // The re-encoded stream must land exactly where the measuring pass put
    // the relocated string section.
    if out.len() != new_str_off {
        debug_assert!(false, "upgrade measuring pass disagreed with re-encoding");
        return Err(OpenError::Corrupt(FormatError::UpgradeLengthMismatch));
    }
    out.extend_from_slice(&body[type_end..]);

    debug!(
        "type section upgraded: {} -> {} bytes",
        type_end - type_start,
        new_str_off - type_start,
    );

    let mut new_header = *header;
    new_header.str_off = new_str_off as u32;
    Ok((out, new_header))
}

fn takes_size(kind: Kind) -> bool {
    !kind.references_type() && kind != Kind::Forward
}

/// Total length of a v1 record once re-encoded in the current layout.
fn new_record_len(rec: &RecordHeaderV1) -> Result<usize, FormatError> {
    let kind = rec.info.kind;
    let vlen = rec.info.vlen as usize;

    let fixed = if takes_size(kind) && rec.size > MAX_SMALL_SIZE {
        LONG_RECORD_SIZE
    } else {
        SHORT_RECORD_SIZE
    };

    let trailing = match kind {
        Kind::Unknown => 0,
        Kind::Integer | Kind::Float => 4,
        Kind::Pointer
        | Kind::Typedef
        | Kind::Volatile
        | Kind::Const
        | Kind::Restrict
        | Kind::Forward => 0,
        // Halfword parameters widen to full words, and the v1 pad halfword
        // disappears.
        Kind::Function => vlen * 4,
        Kind::Array => ARRAY_INFO_SIZE,
        Kind::Enum => rec.trailing_len()?,
        Kind::Struct | Kind::Union => {
            if rec.size < LSTRUCT_THRESHOLD {
                vlen * 12
            } else {
                vlen * 16
            }
        }
        Kind::Slice => return Err(FormatError::BadKind(Kind::Slice as u8)),
    };
    Ok(fixed + trailing)
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_ne_bytes());
}

fn reencode(rec: &RecordHeaderV1, trailing: &[u8], out: &mut Vec<u8>) -> Result<(), OpenError> {
    let kind = rec.info.kind;

    push_u32(out, rec.name);
    push_u32(out, pack_info(kind, rec.info.is_root, rec.info.vlen));
    if takes_size(kind) {
        if rec.size > MAX_SMALL_SIZE {
            push_u32(out, LSIZE_SENTINEL);
            push_u32(out, (rec.size >> 32) as u32);
            push_u32(out, rec.size as u32);
        } else {
            push_u32(out, rec.size as u32);
        }
    } else {
        push_u32(out, u32::from(rec.size_or_type));
    }

    match kind {
        Kind::Integer | Kind::Float => {
            out.extend_from_slice(&trailing[..4]);
        }
        Kind::Function => {
            for param in ParamsV1::new(trailing, rec.info.vlen) {
                push_u32(out, u32::from(param));
            }
        }
        Kind::Array => {
            let old = ArrayInfoV1::from_bytes(trailing);
            let new = ArrayInfo {
                elem_type: u32::from(old.elem_type),
                index_type: u32::from(old.index_type),
                count: old.count,
            };
            out.extend_from_slice(&new.to_bytes());
        }
        Kind::Struct | Kind::Union => {
            let old_wide = rec.size >= V1_LSTRUCT_THRESHOLD;
            let new_wide = rec.size >= LSTRUCT_THRESHOLD;
            for member in MembersV1::new(trailing, old_wide) {
                Member {
                    name: member.name,
                    type_id: u32::from(member.type_id),
                    offset: member.offset,
                }
                .write(out, new_wide);
            }
        }
        // Identical layout in both encodings: byte-for-byte copy. A length
        // disagreement here is a defect in the tables above, not input
        // corruption.
        Kind::Enum | Kind::Unknown => {
            let fixed = if rec.size > MAX_SMALL_SIZE {
                LONG_RECORD_SIZE
            } else {
                SHORT_RECORD_SIZE
            };
            let expected = new_record_len(rec)? - fixed;
            if trailing.len() != expected {
                debug_assert!(false, "byte-copied trailing length mismatch");
                return Err(OpenError::Corrupt(FormatError::UpgradeLengthMismatch));
            }
            out.extend_from_slice(trailing);
        }
        Kind::Pointer
        | Kind::Typedef
        | Kind::Volatile
        | Kind::Const
        | Kind::Restrict
        | Kind::Forward => {}
        Kind::Slice => {
            return Err(OpenError::Corrupt(FormatError::BadKind(Kind::Slice as u8)));
        }
    }
    Ok(())
}
