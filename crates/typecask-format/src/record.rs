//! Current type-record encoding (v2 and v3).
//!
//! A record is a fixed part followed by `vlen` kind-specific trailing
//! entries. Fixed part: `name: u32` (string ref), `info: u32` (packed
//! kind/root/vlen), `size_or_type: u32`. When the size field holds the
//! sentinel, two extra words carry the true 64-bit size and the fixed part
//! grows from 12 to 20 bytes.

use crate::FormatError;
use crate::kind::Kind;

/// Fixed part, short form.
pub const SHORT_RECORD_SIZE: usize = 12;
/// Fixed part, long form (sentinel size plus two wide size words).
pub const LONG_RECORD_SIZE: usize = 20;

/// Small-size sentinel: the true size follows in two 32-bit words.
pub const LSIZE_SENTINEL: u32 = 0xFFFF_FFFF;
/// Largest size representable without the wide encoding.
pub const MAX_SMALL_SIZE: u64 = (LSIZE_SENTINEL - 1) as u64;

/// Struct/union size at which member offsets switch to the wide encoding.
pub const LSTRUCT_THRESHOLD: u64 = 0x2000_0000;

/// Size of a member entry, narrow and wide.
pub const MEMBER_SIZE: usize = 12;
pub const LMEMBER_SIZE: usize = 16;

/// Size of an enumerator entry.
pub const ENUMERATOR_SIZE: usize = 8;
/// Size of the array descriptor.
pub const ARRAY_INFO_SIZE: usize = 12;
/// Size of the slice descriptor.
pub const SLICE_INFO_SIZE: usize = 8;

const KIND_SHIFT: u32 = 27;
const ROOT_BIT: u32 = 1 << 26;
/// Largest encodable trailing-entry count.
pub const MAX_VLEN: u32 = (1 << 26) - 1;

fn ne_u32(bytes: &[u8], off: usize) -> u32 {
    u32::from_ne_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
}

fn ne_u16(bytes: &[u8], off: usize) -> u16 {
    u16::from_ne_bytes([bytes[off], bytes[off + 1]])
}

/// Decoded info word: kind, root visibility, trailing-entry count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeInfo {
    pub kind: Kind,
    /// Whether the type is visible to top-level name lookup.
    pub is_root: bool,
    pub vlen: u32,
}

/// Pack an info word.
pub fn pack_info(kind: Kind, is_root: bool, vlen: u32) -> u32 {
    debug_assert!(vlen <= MAX_VLEN, "vlen overflow: {vlen}");
    let mut info = (kind as u32) << KIND_SHIFT | (vlen & MAX_VLEN);
    if is_root {
        info |= ROOT_BIT;
    }
    info
}

/// Unpack an info word. An out-of-range kind field is `BadKind`.
pub fn unpack_info(info: u32) -> Result<TypeInfo, FormatError> {
    let raw_kind = (info >> KIND_SHIFT) as u8;
    let kind = Kind::from_u8(raw_kind).ok_or(FormatError::BadKind(raw_kind))?;
    Ok(TypeInfo {
        kind,
        is_root: info & ROOT_BIT != 0,
        vlen: info & MAX_VLEN,
    })
}

/// Tag kind a Forward record declares, from its `size_or_type` field.
///
/// 0 (unset) and unrecognized values default to Struct; the default is
/// long-standing producer behavior and is preserved for compatibility.
pub fn forward_tag_kind(size_or_type: u32) -> Kind {
    match u8::try_from(size_or_type).ok().and_then(Kind::from_u8) {
        Some(k @ (Kind::Struct | Kind::Union | Kind::Enum)) => k,
        _ => Kind::Struct,
    }
}

/// Decoded fixed part of a type record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    /// String ref of the type name (0 = anonymous).
    pub name: u32,
    pub info: TypeInfo,
    /// Raw small field: a type-id reference for reference kinds, a tag kind
    /// for Forward, the small size otherwise.
    pub size_or_type: u32,
    /// Decoded size. Meaningful only for kinds that carry a size.
    pub size: u64,
    /// Bytes consumed by the fixed part (12 or 20).
    pub header_len: usize,
}

impl RecordHeader {
    /// Decode the fixed part of the record at the start of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, FormatError> {
        if buf.len() < SHORT_RECORD_SIZE {
            return Err(FormatError::RecordPastEnd);
        }
        let name = ne_u32(buf, 0);
        let info = unpack_info(ne_u32(buf, 4))?;
        let size_or_type = ne_u32(buf, 8);

        let takes_size = !info.kind.references_type() && info.kind != Kind::Forward;
        if takes_size && size_or_type == LSIZE_SENTINEL {
            if buf.len() < LONG_RECORD_SIZE {
                return Err(FormatError::RecordPastEnd);
            }
            let hi = ne_u32(buf, 12);
            let lo = ne_u32(buf, 16);
            Ok(Self {
                name,
                info,
                size_or_type,
                size: u64::from(hi) << 32 | u64::from(lo),
                header_len: LONG_RECORD_SIZE,
            })
        } else {
            Ok(Self {
                name,
                info,
                size_or_type,
                size: u64::from(size_or_type),
                header_len: SHORT_RECORD_SIZE,
            })
        }
    }

    /// Byte length of the trailing entries.
    pub fn trailing_len(&self) -> Result<usize, FormatError> {
        trailing_len(self.info.kind, self.size, self.info.vlen)
    }

    /// Total record length: fixed part plus trailing entries.
    pub fn total_len(&self) -> Result<usize, FormatError> {
        Ok(self.header_len + self.trailing_len()?)
    }
}

/// Trailing-entry byte length as a pure function of (kind, size, vlen).
pub fn trailing_len(kind: Kind, size: u64, vlen: u32) -> Result<usize, FormatError> {
    let n = vlen as usize;
    match kind {
        Kind::Unknown => {
            if vlen != 0 {
                return Err(bad_geometry(kind, size, vlen));
            }
            Ok(0)
        }
        Kind::Integer | Kind::Float => Ok(4),
        Kind::Slice => Ok(SLICE_INFO_SIZE),
        Kind::Pointer
        | Kind::Typedef
        | Kind::Volatile
        | Kind::Const
        | Kind::Restrict
        | Kind::Forward => Ok(0),
        Kind::Function => Ok(n * 4),
        Kind::Array => {
            if vlen != 1 {
                return Err(bad_geometry(kind, size, vlen));
            }
            Ok(ARRAY_INFO_SIZE)
        }
        Kind::Enum => Ok(n * ENUMERATOR_SIZE),
        Kind::Struct | Kind::Union => {
            if size < LSTRUCT_THRESHOLD {
                Ok(n * MEMBER_SIZE)
            } else {
                Ok(n * LMEMBER_SIZE)
            }
        }
    }
}

fn bad_geometry(kind: Kind, size: u64, vlen: u32) -> FormatError {
    FormatError::BadGeometry {
        kind: kind.name(),
        size,
        vlen,
    }
}

/// Struct or union member.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Member {
    /// String ref of the member name.
    pub name: u32,
    pub type_id: u32,
    /// Bit offset within the composite.
    pub offset: u64,
}

impl Member {
    /// Append in narrow or wide encoding.
    pub fn write(&self, out: &mut Vec<u8>, wide: bool) {
        out.extend_from_slice(&self.name.to_ne_bytes());
        out.extend_from_slice(&self.type_id.to_ne_bytes());
        if wide {
            out.extend_from_slice(&((self.offset >> 32) as u32).to_ne_bytes());
            out.extend_from_slice(&(self.offset as u32).to_ne_bytes());
        } else {
            out.extend_from_slice(&(self.offset as u32).to_ne_bytes());
        }
    }
}

/// Iterator over member entries. `wide` follows the long-member rule of the
/// enclosing record's size.
pub struct Members<'a> {
    buf: &'a [u8],
    wide: bool,
}

impl<'a> Members<'a> {
    pub fn new(buf: &'a [u8], wide: bool) -> Self {
        Self { buf, wide }
    }
}

impl Iterator for Members<'_> {
    type Item = Member;

    fn next(&mut self) -> Option<Member> {
        let entry = if self.wide { LMEMBER_SIZE } else { MEMBER_SIZE };
        if self.buf.len() < entry {
            return None;
        }
        let name = ne_u32(self.buf, 0);
        let type_id = ne_u32(self.buf, 4);
        let offset = if self.wide {
            u64::from(ne_u32(self.buf, 8)) << 32 | u64::from(ne_u32(self.buf, 12))
        } else {
            u64::from(ne_u32(self.buf, 8))
        };
        self.buf = &self.buf[entry..];
        Some(Member {
            name,
            type_id,
            offset,
        })
    }
}

/// Enum enumerator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Enumerator {
    /// String ref of the enumerator name.
    pub name: u32,
    pub value: i32,
}

/// Iterator over enumerator entries.
pub struct Enumerators<'a> {
    buf: &'a [u8],
}

impl<'a> Enumerators<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }
}

impl Iterator for Enumerators<'_> {
    type Item = Enumerator;

    fn next(&mut self) -> Option<Enumerator> {
        if self.buf.len() < ENUMERATOR_SIZE {
            return None;
        }
        let name = ne_u32(self.buf, 0);
        let value = ne_u32(self.buf, 4) as i32;
        self.buf = &self.buf[ENUMERATOR_SIZE..];
        Some(Enumerator { name, value })
    }
}

/// Array descriptor (the single trailing entry of an Array record).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArrayInfo {
    pub elem_type: u32,
    pub index_type: u32,
    pub count: u32,
}

impl ArrayInfo {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert!(bytes.len() >= ARRAY_INFO_SIZE, "array descriptor too short");
        Self {
            elem_type: ne_u32(bytes, 0),
            index_type: ne_u32(bytes, 4),
            count: ne_u32(bytes, 8),
        }
    }

    pub fn to_bytes(&self) -> [u8; ARRAY_INFO_SIZE] {
        let mut bytes = [0u8; ARRAY_INFO_SIZE];
        bytes[0..4].copy_from_slice(&self.elem_type.to_ne_bytes());
        bytes[4..8].copy_from_slice(&self.index_type.to_ne_bytes());
        bytes[8..12].copy_from_slice(&self.count.to_ne_bytes());
        bytes
    }
}

/// Slice descriptor: a bitfield view of an integer type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SliceInfo {
    pub type_id: u32,
    pub offset: u16,
    pub bits: u16,
}

impl SliceInfo {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert!(bytes.len() >= SLICE_INFO_SIZE, "slice descriptor too short");
        Self {
            type_id: ne_u32(bytes, 0),
            offset: ne_u16(bytes, 4),
            bits: ne_u16(bytes, 6),
        }
    }

    pub fn to_bytes(&self) -> [u8; SLICE_INFO_SIZE] {
        let mut bytes = [0u8; SLICE_INFO_SIZE];
        bytes[0..4].copy_from_slice(&self.type_id.to_ne_bytes());
        bytes[4..6].copy_from_slice(&self.offset.to_ne_bytes());
        bytes[6..8].copy_from_slice(&self.bits.to_ne_bytes());
        bytes
    }
}

/// Iterator over function parameter type ids.
pub struct Params<'a> {
    buf: &'a [u8],
}

impl<'a> Params<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }
}

impl Iterator for Params<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.buf.len() < 4 {
            return None;
        }
        let id = ne_u32(self.buf, 0);
        self.buf = &self.buf[4..];
        Some(id)
    }
}
