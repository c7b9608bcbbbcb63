//! Body materialization.
//!
//! Produces the canonical body buffer in one of three ways: decompressing
//! into an owned buffer, copying for a later in-place byte-swap, or
//! borrowing the caller's memory outright when no transformation is needed.

use std::borrow::Cow;

use log::debug;
use typecask_format::FormatError;

use super::validate::Validated;
use super::{Decompress, OpenError};

pub(super) fn materialize<'a>(
    data: &'a [u8],
    validated: &Validated,
    decompressor: Option<&dyn Decompress>,
) -> Result<Cow<'a, [u8]>, OpenError> {
    let rest = &data[validated.header_len..];

    if validated.compressed {
        let decompressor = decompressor.ok_or(OpenError::NoDecompressor)?;
        let inflated = decompressor.decompress(rest, validated.total_size)?;
        if inflated.len() != validated.total_size {
            return Err(OpenError::Corrupt(FormatError::SizeMismatch {
                expected: validated.total_size,
                actual: inflated.len(),
            }));
        }
        debug!(
            "inflated body: {} -> {} bytes",
            rest.len(),
            inflated.len()
        );
        Ok(Cow::Owned(inflated))
    } else if validated.foreign {
        // Copy now, flip later: the swap pass must not run before a legacy
        // type section has been upgraded, and must write somewhere owned.
        Ok(Cow::Owned(rest[..validated.total_size].to_vec()))
    } else {
        Ok(Cow::Borrowed(&rest[..validated.total_size]))
    }
}
