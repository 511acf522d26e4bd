//! Deep-link normalization.
//!
//! Operators paste anything from a full share URL to a bare share code into
//! the config. Launching always needs a full URL, so references without a
//! scheme are reduced to their share code and wrapped in the link template.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::defaults::DEEP_LINK_CODE_PLACEHOLDER;

static SCHEME: OnceLock<Option<Regex>> = OnceLock::new();

/// `true` when `reference` starts with a URI scheme (`https:`, `roblox:`, ...).
pub fn has_uri_scheme(reference: &str) -> bool {
    SCHEME
        .get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(reference))
}

/// Share code carried by a scheme-less reference.
///
/// An explicit `code=` parameter wins (`share?code=abc&type=Server` yields
/// `abc`). Otherwise the text after the last `=` up to the next `&` is used,
/// and a reference without `=` is the code itself.
pub fn extract_share_code(reference: &str) -> &str {
    let reference = reference.trim();
    if let Some(code) = reference
        .split(['?', '&'])
        .find_map(|param| param.strip_prefix("code="))
    {
        return code;
    }
    match reference.rfind('=') {
        Some(idx) => {
            let tail = &reference[idx + 1..];
            tail.split('&').next().unwrap_or(tail)
        }
        None => reference,
    }
}

/// Full deep link for a launch reference.
pub fn normalize_launch_reference(reference: &str, template: &str) -> String {
    let reference = reference.trim();
    if has_uri_scheme(reference) {
        return reference.to_string();
    }
    template.replace(DEEP_LINK_CODE_PLACEHOLDER, extract_share_code(reference))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::DEEP_LINK_TEMPLATE;

    #[test]
    fn test_full_url_is_verbatim() {
        let url = "https://www.roblox.com/share?code=abc&type=Server";
        assert_eq!(normalize_launch_reference(url, DEEP_LINK_TEMPLATE), url);
        assert_eq!(
            normalize_launch_reference("  roblox://placeId=1  ", DEEP_LINK_TEMPLATE),
            "roblox://placeId=1"
        );
    }

    #[test]
    fn test_bare_code_is_wrapped() {
        assert_eq!(
            normalize_launch_reference("abc123", DEEP_LINK_TEMPLATE),
            "https://www.roblox.com/share?code=abc123&type=Server"
        );
    }

    #[test]
    fn test_partial_reference_extracts_code() {
        assert_eq!(extract_share_code("code=xyz&type=Server"), "xyz");
        assert_eq!(extract_share_code("share?code=xyz"), "xyz");
        assert_eq!(extract_share_code("type=Server&code=xyz"), "xyz");
        assert_eq!(extract_share_code("privateServerLinkCode=77&x"), "77");
        assert_eq!(extract_share_code("abc"), "abc");
        assert_eq!(
            normalize_launch_reference("www.roblox.com/share?code=xyz&type=Server", DEEP_LINK_TEMPLATE),
            "https://www.roblox.com/share?code=xyz&type=Server"
        );
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for reference in [
            "abc123",
            "code=xyz&type=Server",
            "https://example.test/x?y=1",
            "  spaced  ",
        ] {
            let once = normalize_launch_reference(reference, DEEP_LINK_TEMPLATE);
            assert_eq!(normalize_launch_reference(&once, DEEP_LINK_TEMPLATE), once);
        }
    }

    #[test]
    fn test_scheme_detection() {
        assert!(has_uri_scheme("https://x"));
        assert!(has_uri_scheme("intent:#Intent"));
        assert!(!has_uri_scheme("abc123"));
        assert!(!has_uri_scheme("1abc:def"));
        assert!(!has_uri_scheme(""));
    }
}
