//! On-disk layout of the typecask type-metadata container.
//!
//! This crate defines the byte-level format only:
//! - `preamble` - magic/version/flags prefix and the section-offset header
//! - `kind` - type record kinds
//! - `record` - the current type-record encoding and its trailing-entry shapes
//! - `compat` - the frozen v1 record encoding, used only when upgrading
//! - `strtab` - string section access
//!
//! Multi-byte fields are stored in the producer's byte order. The open path
//! byte-swaps foreign containers into native order before decoding, so every
//! codec here reads and writes native-endian.

pub mod compat;
pub mod kind;
pub mod preamble;
pub mod record;
pub mod strtab;


pub use kind::Kind;
pub use preamble::{Header, Preamble};
pub use record::{RecordHeader, TypeInfo};

/// Errors raised while decoding container bytes.
///
/// Every variant describes damage attributable to the input buffer, except
/// [`FormatError::UpgradeLengthMismatch`] which flags an internal
/// inconsistency in the upgrade tables and is asserted in debug builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("header field {field} out of order or past the end of the body")]
    BadHeaderField { field: &'static str },

    #[error("misaligned header field {field}")]
    MisalignedField { field: &'static str },

    #[error("invalid type kind {0}")]
    BadKind(u8),

    #[error("type record runs past the end of its section")]
    RecordPastEnd,

    #[error("invalid {kind} record: size {size}, vlen {vlen}")]
    BadGeometry {
        kind: &'static str,
        size: u64,
        vlen: u32,
    },

    #[error("too many type records for the id range ({0})")]
    TooManyTypes(u64),

    #[error("decompressed body is {actual} bytes, header declares {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("unsupported symbol entry size {0}")]
    BadSymbolStride(usize),

    #[error("re-encoded record length disagrees with the measuring pass")]
    UpgradeLengthMismatch,
}
