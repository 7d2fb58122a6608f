//! Canonical form for external product and collection identifiers.
//!
//! Shopify delivers the same resource either as a bare numeric id (`"111"`)
//! or as a global id URI (`"gid://shopify/Product/111"`), depending on the
//! caller. Every comparison, storage write and lookup goes through
//! [`normalize_id`] so both forms land on the same key.

use std::sync::LazyLock;

use regex::Regex;

static RESOURCE_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z][A-Za-z0-9+.\-]*://[^/\s]+/(?:Product|Collection)/(\d+)")
        .expect("valid regex")
});

/// Normalizes an external id to its bare numeric string.
///
/// - empty or whitespace-only input yields `None`;
/// - `scheme://namespace/{Product|Collection}/{digits}` yields the digits;
/// - anything else is returned unchanged.
#[must_use]
pub fn normalize_id(raw: &str) -> Option<String> {
    if raw.trim().is_empty() {
        return None;
    }

    if let Some(digits) = RESOURCE_URI
        .captures(raw)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str())
    {
        return Some(digits.to_string());
    }

    Some(raw.to_string())
}

/// [`normalize_id`] over an optional input, as received from query strings.
#[must_use]
pub fn normalize_opt(raw: Option<&str>) -> Option<String> {
    raw.and_then(normalize_id)
}

#[cfg(test)]
#[path = "ids_test.rs"]
mod tests;
