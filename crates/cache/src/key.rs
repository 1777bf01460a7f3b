//! Cache key validation.
//!
//! Keys are used verbatim by every backend, including as file names by the
//! local backend, so they are restricted to a conservative character set.

use crate::error::{ErrorKind, Result};
use std::borrow::Cow;

/// Longest key accepted by any backend (memcached's limit).
pub const MAX_KEY_LENGTH: usize = 250;

/// Key components longer than this are replaced by their hash.
pub(crate) const MAX_COMPONENT_LENGTH: usize = 128;

/// Validates a cache key.
///
/// Rejects empty or overlong keys, keys starting with `.`, and keys
/// containing whitespace, control characters or path separators.
///
/// # Examples
///
/// ```
/// use blockcache_cache::validate_key;
/// assert!(validate_key("block_structure.course-v1:edX+Demo.gen").is_ok());
/// assert!(validate_key("../escape").is_err());
/// assert!(validate_key("has space").is_err());
/// ```
pub fn validate(key: &str) -> Result<&str> {
    if key.is_empty() || key.len() > MAX_KEY_LENGTH || key.starts_with('.') {
        exn::bail!(ErrorKind::InvalidKey(key.to_string()));
    }
    if key.chars().any(|c| c.is_whitespace() || c.is_control() || c == '/' || c == '\\') {
        exn::bail!(ErrorKind::InvalidKey(key.to_string()));
    }
    Ok(key)
}

/// Make an arbitrary string safe to embed as one `.`-separated component of
/// a cache key.
///
/// Forbidden characters (and `%` and `.` themselves) are percent-encoded.
/// Components that would still be too long are replaced by `h` followed by
/// their BLAKE3 hex digest.
pub(crate) fn escape_component(component: &str) -> Cow<'_, str> {
    let needs_escape =
        |c: char| c == '%' || c == '.' || c == '/' || c == '\\' || c.is_whitespace() || c.is_control();
    let escaped = if component.is_empty() || component.chars().any(needs_escape) {
        let mut escaped = String::with_capacity(component.len() + 8);
        if component.is_empty() {
            escaped.push_str("%00");
        }
        for c in component.chars() {
            if needs_escape(c) {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    escaped.push_str(&format!("%{byte:02X}"));
                }
            } else {
                escaped.push(c);
            }
        }
        Cow::Owned(escaped)
    } else {
        Cow::Borrowed(component)
    };
    if escaped.len() > MAX_COMPONENT_LENGTH {
        return Cow::Owned(format!("h{}", blake3::hash(component.as_bytes()).to_hex()));
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("simple")]
    #[case("block_structure.course-v1:edX+DemoX+2024.0123abcd")]
    #[case("a%2Eb")]
    fn test_valid_keys(#[case] key: &str) {
        assert_eq!(validate(key).unwrap(), key);
    }

    #[rstest]
    #[case("")]
    #[case(".hidden")]
    #[case("../escape")]
    #[case("a/b")]
    #[case("a\\b")]
    #[case("with space")]
    #[case("tab\there")]
    #[case("nul\0byte")]
    fn test_invalid_keys(#[case] key: &str) {
        let err = validate(key).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(k) if k == key));
    }

    #[test]
    fn test_key_too_long() {
        assert!(validate(&"a".repeat(MAX_KEY_LENGTH)).is_ok());
        assert!(validate(&"a".repeat(MAX_KEY_LENGTH + 1)).is_err());
    }

    #[rstest]
    #[case("course", "course")]
    #[case("block-v1:edX+Demo+type@course", "block-v1:edX+Demo+type@course")]
    #[case("a.b", "a%2Eb")]
    #[case("i4x://org/course", "i4x:%2F%2Forg%2Fcourse")]
    #[case("50%", "50%25")]
    #[case("", "%00")]
    fn test_escape_component(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(escape_component(input), expected);
    }

    #[test]
    fn test_escaped_components_are_valid_keys() {
        for input in ["a b", "x/y\\z", "tab\t", ".dot", "ünïcödé spaces"] {
            let escaped = escape_component(input);
            assert!(validate(&escaped).is_ok(), "{input:?} escaped to invalid {escaped:?}");
        }
    }

    #[test]
    fn test_long_component_is_hashed() {
        let long = "x".repeat(MAX_COMPONENT_LENGTH + 1);
        let escaped = escape_component(&long);
        assert!(escaped.starts_with('h'));
        assert_eq!(escaped.len(), 65);
        assert_eq!(escaped, escape_component(&long));
    }
}
