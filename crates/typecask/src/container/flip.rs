//! In-place byte-swap of a foreign-endian body.
//!
//! Runs after the upgrade step, so the type section is always in the
//! current encoding, and after header validation, so the section offsets
//! are already native. The fixed part of each type record must be swapped
//! before its info word can be decoded; the trailing shape then follows
//! from the decoded kind.

use typecask_format::FormatError;
use typecask_format::kind::Kind;
use typecask_format::preamble::Header;
use typecask_format::record::{LSIZE_SENTINEL, LONG_RECORD_SIZE, RecordHeader, SHORT_RECORD_SIZE};

use super::OpenError;

/// Reverse the bytes of every `width`-sized field in `buf`. Width 1 is the
/// identity, which lets byte-granular regions share the code path.
fn swap_run(buf: &mut [u8], width: usize) {
    if width <= 1 {
        return;
    }
    for field in buf.chunks_exact_mut(width) {
        field.reverse();
    }
}

pub(super) fn flip_body(body: &mut [u8], header: &Header) -> Result<(), OpenError> {
    let label_off = header.label_off as usize;
    let obj_off = header.obj_off as usize;
    let var_off = header.var_off as usize;
    let type_off = header.type_off as usize;
    let str_off = header.str_off as usize;

    // Labels: {name_ref, type_id} pairs of u32.
    swap_run(&mut body[label_off..obj_off], 4);
    // Objects, functions and both index sections: one flat run of u32 words.
    swap_run(&mut body[obj_off..var_off], 4);
    // Variables: {name_ref, type_id} pairs of u32.
    swap_run(&mut body[var_off..type_off], 4);

    flip_types(body, type_off, str_off)?;

    // Strings are bytes; the pass is a no-op but keeps the region accounted
    // for.
    swap_run(&mut body[str_off..], 1);
    Ok(())
}

fn flip_types(body: &mut [u8], type_off: usize, str_off: usize) -> Result<(), OpenError> {
    let mut pos = type_off;
    while pos < str_off {
        if pos + SHORT_RECORD_SIZE > str_off {
            return Err(OpenError::Corrupt(FormatError::RecordPastEnd));
        }
        swap_run(&mut body[pos..pos + SHORT_RECORD_SIZE], 4);

        // The short fixed part is native now; peek at it to learn whether
        // the two wide size words follow, and swap those before decoding.
        let info = typecask_format::record::unpack_info(u32::from_ne_bytes([
            body[pos + 4],
            body[pos + 5],
            body[pos + 6],
            body[pos + 7],
        ]))?;
        let size_or_type = u32::from_ne_bytes([
            body[pos + 8],
            body[pos + 9],
            body[pos + 10],
            body[pos + 11],
        ]);
        let takes_size = !info.kind.references_type() && info.kind != Kind::Forward;
        if takes_size && size_or_type == LSIZE_SENTINEL {
            if pos + LONG_RECORD_SIZE > str_off {
                return Err(OpenError::Corrupt(FormatError::RecordPastEnd));
            }
            swap_run(&mut body[pos + SHORT_RECORD_SIZE..pos + LONG_RECORD_SIZE], 4);
        }

        let rec = RecordHeader::decode(&body[pos..str_off])?;
        let trailing_len = rec.trailing_len()?;
        let start = pos + rec.header_len;
        if start + trailing_len > str_off {
            return Err(OpenError::Corrupt(FormatError::RecordPastEnd));
        }
        let trailing = &mut body[start..start + trailing_len];

        match rec.info.kind {
            // Word-granular trailing entries throughout.
            Kind::Integer
            | Kind::Float
            | Kind::Function
            | Kind::Array
            | Kind::Enum
            | Kind::Struct
            | Kind::Union => swap_run(trailing, 4),
            // {type: u32, offset: u16, bits: u16}.
            Kind::Slice => {
                swap_run(&mut trailing[..4], 4);
                swap_run(&mut trailing[4..], 2);
            }
            Kind::Unknown
            | Kind::Pointer
            | Kind::Typedef
            | Kind::Volatile
            | Kind::Const
            | Kind::Restrict
            | Kind::Forward => {}
        }

        pos = start + trailing_len;
    }
    Ok(())
}
