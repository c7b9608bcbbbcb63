//! Frozen v1 type-record encoding.
//!
//! Used only by the version upgrader and its tests; current-format code
//! paths never touch these layouts. Fixed part: `name: u32`, `info: u16`,
//! `size_or_type: u16`, growing from 8 to 16 bytes under the v1 size
//! sentinel. Thresholds and trailing-entry widths differ from the current
//! encoding throughout.

use crate::FormatError;
use crate::kind::Kind;
use crate::record::TypeInfo;

/// Fixed part, short form.
pub const V1_SHORT_RECORD_SIZE: usize = 8;
/// Fixed part, long form.
pub const V1_LONG_RECORD_SIZE: usize = 16;

/// v1 small-size sentinel.
pub const V1_LSIZE_SENTINEL: u16 = 0xFFFF;
/// v1 struct/union size at which member offsets switch to the wide encoding.
pub const V1_LSTRUCT_THRESHOLD: u64 = 8192;

/// Size of a v1 member entry, narrow and wide.
pub const V1_MEMBER_SIZE: usize = 8;
pub const V1_LMEMBER_SIZE: usize = 16;

/// Size of the v1 array descriptor.
pub const V1_ARRAY_INFO_SIZE: usize = 8;

const V1_KIND_SHIFT: u16 = 11;
const V1_ROOT_BIT: u16 = 1 << 10;
/// Largest encodable trailing-entry count in v1.
pub const V1_MAX_VLEN: u16 = (1 << 10) - 1;

fn ne_u32(bytes: &[u8], off: usize) -> u32 {
    u32::from_ne_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
}

fn ne_u16(bytes: &[u8], off: usize) -> u16 {
    u16::from_ne_bytes([bytes[off], bytes[off + 1]])
}

/// Pack a v1 info halfword.
pub fn pack_info_v1(kind: Kind, is_root: bool, vlen: u16) -> u16 {
    debug_assert!(kind.exists_in_v1(), "kind absent from v1: {}", kind.name());
    debug_assert!(vlen <= V1_MAX_VLEN, "v1 vlen overflow: {vlen}");
    let mut info = (kind as u16) << V1_KIND_SHIFT | (vlen & V1_MAX_VLEN);
    if is_root {
        info |= V1_ROOT_BIT;
    }
    info
}

/// Unpack a v1 info halfword. Kinds absent from the v1 encoding are rejected.
pub fn unpack_info_v1(info: u16) -> Result<TypeInfo, FormatError> {
    let raw_kind = (info >> V1_KIND_SHIFT) as u8;
    let kind = Kind::from_u8(raw_kind)
        .filter(|k| k.exists_in_v1())
        .ok_or(FormatError::BadKind(raw_kind))?;
    Ok(TypeInfo {
        kind,
        is_root: info & V1_ROOT_BIT != 0,
        vlen: u32::from(info & V1_MAX_VLEN),
    })
}

/// Decoded fixed part of a v1 record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordHeaderV1 {
    pub name: u32,
    pub info: TypeInfo,
    /// Raw small field; see [`crate::record::RecordHeader::size_or_type`].
    pub size_or_type: u16,
    pub size: u64,
    /// Bytes consumed by the fixed part (8 or 16).
    pub header_len: usize,
}

impl RecordHeaderV1 {
    /// Decode the fixed part of the v1 record at the start of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, FormatError> {
        if buf.len() < V1_SHORT_RECORD_SIZE {
            return Err(FormatError::RecordPastEnd);
        }
        let name = ne_u32(buf, 0);
        let info = unpack_info_v1(ne_u16(buf, 4))?;
        let size_or_type = ne_u16(buf, 6);

        let takes_size = !info.kind.references_type() && info.kind != Kind::Forward;
        if takes_size && size_or_type == V1_LSIZE_SENTINEL {
            if buf.len() < V1_LONG_RECORD_SIZE {
                return Err(FormatError::RecordPastEnd);
            }
            let hi = ne_u32(buf, 8);
            let lo = ne_u32(buf, 12);
            Ok(Self {
                name,
                info,
                size_or_type,
                size: u64::from(hi) << 32 | u64::from(lo),
                header_len: V1_LONG_RECORD_SIZE,
            })
        } else {
            Ok(Self {
                name,
                info,
                size_or_type,
                size: u64::from(size_or_type),
                header_len: V1_SHORT_RECORD_SIZE,
            })
        }
    }

    /// Byte length of the v1 trailing entries.
    pub fn trailing_len(&self) -> Result<usize, FormatError> {
        trailing_len_v1(self.info.kind, self.size, self.info.vlen)
    }

    /// Total v1 record length.
    pub fn total_len(&self) -> Result<usize, FormatError> {
        Ok(self.header_len + self.trailing_len()?)
    }
}

/// v1 trailing-entry byte length as a pure function of (kind, size, vlen).
pub fn trailing_len_v1(kind: Kind, size: u64, vlen: u32) -> Result<usize, FormatError> {
    let n = vlen as usize;
    match kind {
        Kind::Unknown => {
            if vlen != 0 {
                return Err(FormatError::BadGeometry {
                    kind: kind.name(),
                    size,
                    vlen,
                });
            }
            Ok(0)
        }
        Kind::Integer | Kind::Float => Ok(4),
        Kind::Pointer
        | Kind::Typedef
        | Kind::Volatile
        | Kind::Const
        | Kind::Restrict
        | Kind::Forward => Ok(0),
        // Halfword parameter ids, padded to a word boundary.
        Kind::Function => Ok((n + (n & 1)) * 2),
        Kind::Array => {
            if vlen != 1 {
                return Err(FormatError::BadGeometry {
                    kind: kind.name(),
                    size,
                    vlen,
                });
            }
            Ok(V1_ARRAY_INFO_SIZE)
        }
        Kind::Enum => Ok(n * crate::record::ENUMERATOR_SIZE),
        Kind::Struct | Kind::Union => {
            if size < V1_LSTRUCT_THRESHOLD {
                Ok(n * V1_MEMBER_SIZE)
            } else {
                Ok(n * V1_LMEMBER_SIZE)
            }
        }
        Kind::Slice => Err(FormatError::BadKind(Kind::Slice as u8)),
    }
}

/// v1 struct or union member.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberV1 {
    pub name: u32,
    pub type_id: u16,
    pub offset: u64,
}

/// Iterator over v1 member entries.
pub struct MembersV1<'a> {
    buf: &'a [u8],
    wide: bool,
}

impl<'a> MembersV1<'a> {
    pub fn new(buf: &'a [u8], wide: bool) -> Self {
        Self { buf, wide }
    }
}

impl Iterator for MembersV1<'_> {
    type Item = MemberV1;

    fn next(&mut self) -> Option<MemberV1> {
        let entry = if self.wide {
            V1_LMEMBER_SIZE
        } else {
            V1_MEMBER_SIZE
        };
        if self.buf.len() < entry {
            return None;
        }
        let name = ne_u32(self.buf, 0);
        let type_id = ne_u16(self.buf, 4);
        let offset = if self.wide {
            // Halfword of padding sits between the type and the wide offset.
            u64::from(ne_u32(self.buf, 8)) << 32 | u64::from(ne_u32(self.buf, 12))
        } else {
            u64::from(ne_u16(self.buf, 6))
        };
        self.buf = &self.buf[entry..];
        Some(MemberV1 {
            name,
            type_id,
            offset,
        })
    }
}

/// v1 array descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArrayInfoV1 {
    pub elem_type: u16,
    pub index_type: u16,
    pub count: u32,
}

impl ArrayInfoV1 {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert!(
            bytes.len() >= V1_ARRAY_INFO_SIZE,
            "v1 array descriptor too short"
        );
        Self {
            elem_type: ne_u16(bytes, 0),
            index_type: ne_u16(bytes, 2),
            count: ne_u32(bytes, 4),
        }
    }

    pub fn to_bytes(&self) -> [u8; V1_ARRAY_INFO_SIZE] {
        let mut bytes = [0u8; V1_ARRAY_INFO_SIZE];
        bytes[0..2].copy_from_slice(&self.elem_type.to_ne_bytes());
        bytes[2..4].copy_from_slice(&self.index_type.to_ne_bytes());
        bytes[4..8].copy_from_slice(&self.count.to_ne_bytes());
        bytes
    }
}

/// Iterator over v1 function parameter ids (halfwords, padding excluded).
pub struct ParamsV1<'a> {
    buf: &'a [u8],
    remaining: u32,
}

impl<'a> ParamsV1<'a> {
    pub fn new(buf: &'a [u8], vlen: u32) -> Self {
        Self {
            buf,
            remaining: vlen,
        }
    }
}

impl Iterator for ParamsV1<'_> {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        if self.remaining == 0 || self.buf.len() < 2 {
            return None;
        }
        let id = ne_u16(self.buf, 0);
        self.buf = &self.buf[2..];
        self.remaining -= 1;
        Some(id)
    }
}
