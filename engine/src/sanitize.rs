//! Filename sanitization for the destination filesystem.
//!
//! On NTFS and FAT, characters Windows refuses are mapped to look-alike
//! Unicode glyphs, control characters become `_`, reserved device names are
//! wrapped in underscores and a trailing space or dot is replaced. On other
//! filesystems only `/` (mapped to a division slash) and NUL (dropped) are
//! touched. Sanitizing twice gives the same result as sanitizing once.

use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};

use crate::fs_type::FileSystemType;

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Replacement glyph for characters forbidden on NTFS/FAT.
fn restricted_replacement(c: char) -> Option<char> {
    let glyph = match c {
        '<' => '\u{1438}',
        '>' => '\u{1433}',
        ':' => '\u{A789}',
        '"' => '\u{FF02}',
        '/' => '\u{2215}',
        '\\' => '\u{FF3C}',
        '|' => '\u{01C0}',
        '?' => '\u{FF1F}',
        '*' => '\u{FF0A}',
        _ => return None,
    };
    Some(glyph)
}

fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// Sanitize a single path segment.
///
/// Empty names, `.` and `..` pass through untouched.
pub fn sanitize_name(name: &str, fs_type: FileSystemType) -> String {
    if name.is_empty() || name == "." || name == ".." {
        return name.to_string();
    }

    if !fs_type.restricted_names() {
        return name
            .chars()
            .filter(|&c| c != '\0')
            .map(|c| if c == '/' { '\u{2215}' } else { c })
            .collect();
    }

    if is_reserved(name) {
        return format!("_{}_", name);
    }

    let mut out: String = name
        .chars()
        .map(|c| match restricted_replacement(c) {
            Some(glyph) => glyph,
            None if (c as u32) < 32 => '_',
            None => c,
        })
        .collect();

    if out.ends_with(' ') || out.ends_with('.') {
        out.pop();
        out.push('_');
    }

    out
}

/// Sanitize the raw bytes of a name that is not valid UTF-8.
///
/// Only ASCII bytes are rewritten, so multi-byte sequences (valid or not)
/// pass through. Reserved device names are pure ASCII and never reach here.
#[cfg(unix)]
fn sanitize_bytes(name: &[u8], fs_type: FileSystemType) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 8);
    let mut glyph = [0u8; 4];

    if !fs_type.restricted_names() {
        for &b in name {
            match b {
                0 => {}
                b'/' => out.extend_from_slice('\u{2215}'.encode_utf8(&mut glyph).as_bytes()),
                _ => out.push(b),
            }
        }
        return out;
    }

    for &b in name {
        match restricted_replacement(b as char).filter(|_| b.is_ascii()) {
            Some(c) => out.extend_from_slice(c.encode_utf8(&mut glyph).as_bytes()),
            None if b < 32 => out.push(b'_'),
            None => out.push(b),
        }
    }
    if let Some(last) = out.last_mut() {
        if *last == b' ' || *last == b'.' {
            *last = b'_';
        }
    }
    out
}

/// Sanitize an `OsStr` segment.
///
/// On Unix, names that are not valid UTF-8 get the same substitutions
/// byte by byte. Elsewhere they are kept as they are.
pub fn sanitize_os_name(name: &OsStr, fs_type: FileSystemType) -> OsString {
    if let Some(utf8) = name.to_str() {
        return OsString::from(sanitize_name(utf8, fs_type));
    }

    #[cfg(unix)]
    let sanitized = {
        use std::os::unix::ffi::{OsStrExt, OsStringExt};
        OsString::from_vec(sanitize_bytes(name.as_bytes(), fs_type))
    };
    #[cfg(not(unix))]
    let sanitized = name.to_os_string();

    sanitized
}

/// Sanitize every normal component of a relative path.
pub fn sanitize_relative_path(path: &Path, fs_type: FileSystemType) -> PathBuf {
    path.components()
        .map(|component| match component {
            Component::Normal(name) => sanitize_os_name(name, fs_type),
            other => other.as_os_str().to_os_string(),
        })
        .collect()
}
