//! Preamble and header validation.

use typecask_format::FormatError;
use typecask_format::preamble::{
    CURRENT_VERSION, FLAG_COMPRESSED, HEADER_SIZE, Header, LEGACY_HEADER_SIZE, MAGIC,
    OLDEST_VERSION, PREAMBLE_SIZE, Preamble,
};

use super::OpenError;

/// Result of preamble/header validation.
pub(super) struct Validated {
    /// Canonical header, already expanded and in native byte order.
    pub header: Header,
    /// Version as stored on disk; drives upgrade and id-boundary decisions.
    pub disk_version: u16,
    pub foreign: bool,
    pub compressed: bool,
    /// Body size declared by the header.
    pub total_size: usize,
    /// Preamble plus header bytes consumed from the input.
    pub header_len: usize,
}

pub(super) fn validate(data: &[u8]) -> Result<Validated, OpenError> {
    if data.len() < PREAMBLE_SIZE {
        return Err(OpenError::TooSmall {
            need: PREAMBLE_SIZE,
            have: data.len(),
        });
    }
    let preamble = Preamble::from_bytes(data);

    let foreign = if preamble.magic == MAGIC {
        false
    } else if preamble.magic == MAGIC.swap_bytes() {
        true
    } else {
        return Err(OpenError::NotThisFormat);
    };

    let (version, flags) = if foreign {
        (preamble.version.swap_bytes(), preamble.flags.swap_bytes())
    } else {
        (preamble.version, preamble.flags)
    };

    // Legacy layouts are defined only in native byte order; a foreign-endian
    // buffer claiming one is not something any producer ever wrote.
    if foreign && version != CURRENT_VERSION {
        return Err(OpenError::UnsupportedVersion(version));
    }
    if !(OLDEST_VERSION..=CURRENT_VERSION).contains(&version) {
        return Err(OpenError::UnsupportedVersion(version));
    }

    let header_len = if version == CURRENT_VERSION {
        PREAMBLE_SIZE + HEADER_SIZE
    } else {
        PREAMBLE_SIZE + LEGACY_HEADER_SIZE
    };
    if data.len() < header_len {
        return Err(OpenError::TooSmall {
            need: header_len,
            have: data.len(),
        });
    }

    let mut header = if version == CURRENT_VERSION {
        Header::from_bytes(&data[PREAMBLE_SIZE..header_len])
    } else {
        Header::from_legacy_bytes(&data[PREAMBLE_SIZE..header_len])
    };
    if foreign {
        header = header.swapped();
    }
    header.validate()?;

    let total_size = usize::try_from(header.total_size())
        .map_err(|_| OpenError::Corrupt(FormatError::BadHeaderField { field: "str_len" }))?;

    let compressed = flags & FLAG_COMPRESSED != 0;
    if !compressed && data.len() - header_len < total_size {
        return Err(OpenError::TooSmall {
            need: header_len + total_size,
            have: data.len(),
        });
    }

    Ok(Validated {
        header,
        disk_version: version,
        foreign,
        compressed,
        total_size,
        header_len,
    })
}
