//! Istio version gate
//!
//! The operator ships chart templates for exactly one Istio minor release.
//! Any patch release or pre-release qualifier of that minor is accepted.

/// Supported Istio major version
pub const SUPPORTED_MAJOR: u64 = 1;
/// Supported Istio minor version
pub const SUPPORTED_MINOR: u64 = 11;

/// Returns true when `version` is `1.11`, `1.11.N` or `1.11.N-qualifier`.
///
/// A leading `v` is tolerated. Anything that does not parse as a dotted
/// numeric version is rejected.
pub fn is_supported_version(version: &str) -> bool {
    match parse_major_minor(version) {
        Some((major, minor)) => major == SUPPORTED_MAJOR && minor == SUPPORTED_MINOR,
        None => false,
    }
}

fn parse_major_minor(version: &str) -> Option<(u64, u64)> {
    let version = version.trim();
    let version = version.strip_prefix('v').unwrap_or(version);
    let (core, qualifier) = match version.split_once('-') {
        Some((core, qualifier)) => (core, Some(qualifier)),
        None => (version, None),
    };
    if qualifier.is_some_and(str::is_empty) {
        return None;
    }

    let mut parts = core.split('.');
    let major = parse_numeric(parts.next()?)?;
    let minor = parse_numeric(parts.next()?)?;
    if let Some(patch) = parts.next() {
        parse_numeric(patch)?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor))
}

fn parse_numeric(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}
