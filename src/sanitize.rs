//! Tag-value sanitizer.
//!
//! OpenTSDB tag values allow letters, digits, underscore, period and
//! hyphen. Filenames and paths carry much more than that: spaces become
//! underscores, path separators (both kinds) become hyphens, and whatever
//! is left outside the allowed set is stripped.

use regex::Regex;
use std::sync::LazyLock;

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.-]+").unwrap());

/// Sanitize an arbitrary string into a safe tag value.
///
/// Idempotent: sanitizing already-sanitized output is a no-op. Empty
/// input yields empty output.
pub fn sanitize_tag_value(v: &str) -> String {
    let v = v.replace(' ', "_");
    let v = v.replace('\\', "-");
    let v = v.replace('/', "-");
    DISALLOWED.replace_all(&v, "").into_owned()
}
