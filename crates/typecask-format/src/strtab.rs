//! String section access.

/// Look up the NUL-terminated string at `offset` in the string section.
///
/// Offset 0 is always the empty string (the section begins with a NUL).
/// An out-of-range offset, a missing terminator, or invalid UTF-8 yields
/// `None`; callers decide whether that means "anonymous" or "corrupt".
pub fn string_at(strings: &[u8], offset: u32) -> Option<&str> {
    let start = offset as usize;
    if start >= strings.len() {
        return None;
    }
    let rest = &strings[start..];
    let end = rest.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&rest[..end]).ok()
}
