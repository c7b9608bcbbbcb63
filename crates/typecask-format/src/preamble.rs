//! Preamble and section-offset header.
//!
//! Every container starts with the 8-byte preamble, which has kept its layout
//! across all format versions, followed by a version-dependent header of
//! section offsets. The short (v1/v2) header is expanded into the canonical
//! long layout at read time; nothing downstream ever sees the short form.

use crate::FormatError;

/// Container magic. A byte-swapped magic marks a foreign-endian container.
pub const MAGIC: u16 = 0xCA5C;

/// Oldest on-disk version that can still be read (upgraded at open time).
pub const VERSION_1: u16 = 1;
/// Current record encoding with the short header.
pub const VERSION_2: u16 = 2;
/// Current version: long header with index sections and a unit name.
pub const VERSION_3: u16 = 3;

pub const OLDEST_VERSION: u16 = VERSION_1;
pub const CURRENT_VERSION: u16 = VERSION_3;

/// Preamble flag: the body is compressed.
pub const FLAG_COMPRESSED: u16 = 0x0001;

/// Size of the preamble in bytes.
pub const PREAMBLE_SIZE: usize = 8;
/// Header bytes following the preamble, canonical (v3) layout.
pub const HEADER_SIZE: usize = 48;
/// Header bytes following the preamble, legacy (v1/v2) layout.
pub const LEGACY_HEADER_SIZE: usize = 36;

/// Fixed 8-byte prefix common to all versions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Preamble {
    pub magic: u16,
    pub version: u16,
    pub flags: u16,
}

impl Preamble {
    /// Decode from the first 8 bytes of a container.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert!(bytes.len() >= PREAMBLE_SIZE, "preamble too short");
        Self {
            magic: u16::from_ne_bytes([bytes[0], bytes[1]]),
            version: u16::from_ne_bytes([bytes[2], bytes[3]]),
            flags: u16::from_ne_bytes([bytes[4], bytes[5]]),
        }
    }

    /// Encode to 8 bytes. The reserved halfword is written as zero.
    pub fn to_bytes(&self) -> [u8; PREAMBLE_SIZE] {
        let mut bytes = [0u8; PREAMBLE_SIZE];
        bytes[0..2].copy_from_slice(&self.magic.to_ne_bytes());
        bytes[2..4].copy_from_slice(&self.version.to_ne_bytes());
        bytes[4..6].copy_from_slice(&self.flags.to_ne_bytes());
        bytes
    }
}

/// Canonical section-offset header.
///
/// The three `*_ref` fields are string-section offsets (0 = absent). Every
/// `*_off` field is a byte offset relative to the start of the body, the
/// first byte after the header. Sections are laid out in field order and the
/// offsets are monotonically non-decreasing; the string section is last, so
/// `str_off + str_len` is the total body size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Header {
    /// Label in the parent container this one was compiled against.
    pub parent_label_ref: u32,
    /// Name of the parent container (0 = standalone).
    pub parent_name_ref: u32,
    /// Compilation unit name. Synthesized as 0 for pre-v3 headers.
    pub cu_name_ref: u32,
    pub label_off: u32,
    pub obj_off: u32,
    pub func_off: u32,
    /// Object-symbol index section. Aliased to `var_off` pre-v3.
    pub obj_index_off: u32,
    /// Function-symbol index section. Aliased to `var_off` pre-v3.
    pub func_index_off: u32,
    pub var_off: u32,
    pub type_off: u32,
    pub str_off: u32,
    pub str_len: u32,
}

fn ne_u32(bytes: &[u8], off: usize) -> u32 {
    u32::from_ne_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
}

impl Header {
    /// Decode the canonical 48-byte layout.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert!(bytes.len() >= HEADER_SIZE, "header too short");
        Self {
            parent_label_ref: ne_u32(bytes, 0),
            parent_name_ref: ne_u32(bytes, 4),
            cu_name_ref: ne_u32(bytes, 8),
            label_off: ne_u32(bytes, 12),
            obj_off: ne_u32(bytes, 16),
            func_off: ne_u32(bytes, 20),
            obj_index_off: ne_u32(bytes, 24),
            func_index_off: ne_u32(bytes, 28),
            var_off: ne_u32(bytes, 32),
            type_off: ne_u32(bytes, 36),
            str_off: ne_u32(bytes, 40),
            str_len: ne_u32(bytes, 44),
        }
    }

    /// Decode the legacy 36-byte layout, expanding it to canonical form.
    ///
    /// The legacy header has no index sections and no unit name: the two
    /// index offsets are synthesized as `var_off` (empty sections) and
    /// `cu_name_ref` as 0.
    pub fn from_legacy_bytes(bytes: &[u8]) -> Self {
        assert!(bytes.len() >= LEGACY_HEADER_SIZE, "legacy header too short");
        let var_off = ne_u32(bytes, 20);
        Self {
            parent_label_ref: ne_u32(bytes, 0),
            parent_name_ref: ne_u32(bytes, 4),
            cu_name_ref: 0,
            label_off: ne_u32(bytes, 8),
            obj_off: ne_u32(bytes, 12),
            func_off: ne_u32(bytes, 16),
            obj_index_off: var_off,
            func_index_off: var_off,
            var_off,
            type_off: ne_u32(bytes, 24),
            str_off: ne_u32(bytes, 28),
            str_len: ne_u32(bytes, 32),
        }
    }

    /// Encode the canonical layout to 48 bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        for (i, field) in [
            self.parent_label_ref,
            self.parent_name_ref,
            self.cu_name_ref,
            self.label_off,
            self.obj_off,
            self.func_off,
            self.obj_index_off,
            self.func_index_off,
            self.var_off,
            self.type_off,
            self.str_off,
            self.str_len,
        ]
        .into_iter()
        .enumerate()
        {
            bytes[i * 4..i * 4 + 4].copy_from_slice(&field.to_ne_bytes());
        }
        bytes
    }

    /// Byte-swap every field, for headers read from a foreign-endian buffer.
    pub fn swapped(self) -> Self {
        Self {
            parent_label_ref: self.parent_label_ref.swap_bytes(),
            parent_name_ref: self.parent_name_ref.swap_bytes(),
            cu_name_ref: self.cu_name_ref.swap_bytes(),
            label_off: self.label_off.swap_bytes(),
            obj_off: self.obj_off.swap_bytes(),
            func_off: self.func_off.swap_bytes(),
            obj_index_off: self.obj_index_off.swap_bytes(),
            func_index_off: self.func_index_off.swap_bytes(),
            var_off: self.var_off.swap_bytes(),
            type_off: self.type_off.swap_bytes(),
            str_off: self.str_off.swap_bytes(),
            str_len: self.str_len.swap_bytes(),
        }
    }

    /// Total body size declared by the header.
    pub fn total_size(&self) -> u64 {
        u64::from(self.str_off) + u64::from(self.str_len)
    }

    /// Check section ordering and alignment invariants.
    pub fn validate(&self) -> Result<(), FormatError> {
        let ordered = [
            ("label_off", self.label_off, 4u32),
            ("obj_off", self.obj_off, 2),
            ("func_off", self.func_off, 2),
            ("obj_index_off", self.obj_index_off, 2),
            ("func_index_off", self.func_index_off, 2),
            ("var_off", self.var_off, 4),
            ("type_off", self.type_off, 4),
            ("str_off", self.str_off, 1),
        ];
        let mut prev = 0u32;
        for (field, off, align) in ordered {
            if off < prev {
                return Err(FormatError::BadHeaderField { field });
            }
            if off as u64 > self.total_size() {
                return Err(FormatError::BadHeaderField { field });
            }
            if !(off as u64).is_multiple_of(u64::from(align)) {
                return Err(FormatError::MisalignedField { field });
            }
            prev = off;
        }
        Ok(())
    }
}
