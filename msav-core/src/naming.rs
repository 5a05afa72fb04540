//! Malware-name normalization.
//!
//! Daemons report names carrying vendor-family prefixes and variant tags
//! (`Win.Trojan.Agent-123`). Reports use the stable family name instead
//! (`Trojan.Agent`). The rules live behind [`MalwareNaming`] so another
//! daemon's naming scheme can be plugged in without touching the parser.

/// Turns a raw daemon detection name into the name shown to users.
pub trait MalwareNaming: Send {
    fn normalize(&self, raw: &str) -> String;
}

/// ClamAV naming rules: drop the `Win.` platform prefix and a trailing
/// `-<digits>` variant suffix.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClamavNaming;

const PLATFORM_PREFIX: &str = "Win.";

impl MalwareNaming for ClamavNaming {
    fn normalize(&self, raw: &str) -> String {
        let name = strip_platform_prefix(raw);
        strip_variant_suffix(name).to_owned()
    }
}

/// [`ClamavNaming`] as a free function.
pub fn normalize_malware_name(raw: &str) -> String {
    ClamavNaming.normalize(raw)
}

fn strip_platform_prefix(name: &str) -> &str {
    if name.len() > PLATFORM_PREFIX.len() {
        if let Some(rest) = name.strip_prefix(PLATFORM_PREFIX) {
            return rest;
        }
    }
    name
}

/// Scans backwards over trailing digits; strips them together with the
/// hyphen in front. The hyphen is never looked for at byte 0 or 1.
fn strip_variant_suffix(name: &str) -> &str {
    let bytes = name.as_bytes();
    let digits_start = bytes
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map_or(0, |idx| idx + 1);

    if digits_start == bytes.len() || digits_start < 3 {
        return name;
    }
    if bytes[digits_start - 1] != b'-' {
        return name;
    }
    &name[..digits_start - 1]
}
