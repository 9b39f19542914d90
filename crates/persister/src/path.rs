//! Storage path derivation
//!
//! `http://login.google.com/secure/createAccount.html` captured at
//! `1570788418` is stored at
//! `login.google.com/secure/createAccount.html/1570788418`.

use chrono::{DateTime, Utc};

const SCHEME_PREFIXES: [&str; 2] = ["http://", "https://"];

/// Strip a leading `http://` / `https://` and one trailing `/`.
pub fn sanitize_url(url: &str) -> &str {
    let without_scheme = SCHEME_PREFIXES
        .iter()
        .find_map(|prefix| url.strip_prefix(prefix))
        .unwrap_or(url);
    without_scheme
        .strip_suffix('/')
        .unwrap_or(without_scheme)
}

/// Derive the storage key for `url` captured at `captured_at`.
///
/// Pure: the same URL within the same whole second always yields the same
/// key, so two captures of one URL in one second overwrite each other.
pub fn derive_path(url: &str, captured_at: DateTime<Utc>) -> String {
    format!("{}/{}", sanitize_url(url), captured_at.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_derive_path_known_resource() {
        assert_eq!(
            derive_path("http://login.google.com/secure/createAccount.html", at(1570788418)),
            "login.google.com/secure/createAccount.html/1570788418"
        );
    }

    #[test]
    fn test_strips_https_and_trailing_separator() {
        assert_eq!(derive_path("https://a.com/", at(10)), "a.com/10");
        assert_eq!(derive_path("https://a.com/docs/", at(10)), "a.com/docs/10");
    }

    #[test]
    fn test_strips_only_one_trailing_separator() {
        assert_eq!(derive_path("http://a.com//", at(7)), "a.com//7");
    }

    #[test]
    fn test_strips_only_leading_scheme() {
        assert_eq!(
            derive_path("http://a.com/redirect?to=https://b.com", at(3)),
            "a.com/redirect?to=https://b.com/3"
        );
        assert_eq!(derive_path("https://http://a.com", at(3)), "http://a.com/3");
    }

    #[test]
    fn test_scheme_match_is_case_sensitive() {
        assert_eq!(derive_path("HTTP://a.com/", at(5)), "HTTP://a.com/5");
    }

    #[test]
    fn test_schemeless_url_passes_through() {
        assert_eq!(derive_path("ftp://files.net/x/", at(9)), "ftp://files.net/x/9");
        assert_eq!(derive_path("example.org/page", at(9)), "example.org/page/9");
    }

    #[test]
    fn test_empty_url_is_degenerate_but_valid() {
        assert_eq!(derive_path("", at(1570788418)), "/1570788418");
        assert_eq!(derive_path("http://", at(1)), "/1");
        assert_eq!(derive_path("https:///", at(1)), "/1");
    }

    #[test]
    fn test_subsecond_precision_is_truncated() {
        let early = Utc.timestamp_opt(100, 1_000).unwrap();
        let late = Utc.timestamp_opt(100, 999_999_999).unwrap();
        assert_eq!(derive_path("http://a.com", early), derive_path("http://a.com", late));
        assert_ne!(derive_path("http://a.com", late), derive_path("http://a.com", at(101)));
    }

    #[test]
    fn test_never_leaves_trailing_separator_before_timestamp() {
        for url in ["http://a.com/", "https://a.com/b/", "http://a.com", "a.com/"] {
            let path = derive_path(url, at(42));
            assert!(!path.contains("//"), "{}", path);
            assert!(path.ends_with("/42"), "{}", path);
        }
    }
}
