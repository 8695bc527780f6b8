use lazy_static::lazy_static;
use regex::Regex;

/// Longest accepted deploy target slug
pub const MAX_TARGET_LEN: usize = 64;

lazy_static! {
    /// Regex for deploy target slugs (one controller per slug)
    /// Must be lowercase alphanumeric with single hyphens between segments
    /// - Valid: "acme-site", "shop42", "my-landing-page"
    /// - Invalid: "-site", "site-", "site--a", "Site", "site_a"
    pub static ref TARGET_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
}

pub fn is_valid_target(target: &str) -> bool {
    target.len() <= MAX_TARGET_LEN && TARGET_REGEX.is_match(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_regex_valid() {
        assert!(is_valid_target("acme-site"));
        assert!(is_valid_target("shop42"));
        assert!(is_valid_target("my-landing-page"));
        assert!(is_valid_target("a"));
    }

    #[test]
    fn test_target_regex_invalid() {
        assert!(!is_valid_target("-site")); // starts with hyphen
        assert!(!is_valid_target("site-")); // ends with hyphen
        assert!(!is_valid_target("site--a")); // double hyphen
        assert!(!is_valid_target("Site")); // uppercase
        assert!(!is_valid_target("site_a")); // underscore
        assert!(!is_valid_target("")); // empty
        assert!(!is_valid_target(&"a".repeat(MAX_TARGET_LEN + 1)));
    }
}
