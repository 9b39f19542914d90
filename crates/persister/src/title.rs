/// Extract the text between the first `<title>` and `</title>` tags.
///
/// Tag matching is case-insensitive; the returned text keeps its original
/// case. Returns an empty string when either tag is missing or the closing
/// tag comes first.
pub fn extract_title(body: &str) -> String {
    const OPEN: &str = "<title>";
    const CLOSE: &str = "</title>";

    // ASCII lowercasing keeps byte offsets aligned with `body`.
    let lowered = body.to_ascii_lowercase();
    let start = match lowered.find(OPEN) {
        Some(pos) => pos + OPEN.len(),
        None => return String::new(),
    };
    match lowered[start..].find(CLOSE) {
        Some(len) => body[start..start + len].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_case_tags() {
        assert_eq!(extract_title("<TiTlE>Example</title>"), "Example");
    }

    #[test]
    fn test_keeps_original_case_of_title() {
        assert_eq!(
            extract_title("<html><head><title>Hello World</TITLE></head></html>"),
            "Hello World"
        );
    }

    #[test]
    fn test_no_tags() {
        assert_eq!(extract_title("<html><body>no title</body></html>"), "");
        assert_eq!(extract_title(""), "");
    }

    #[test]
    fn test_unclosed_or_reversed_tags() {
        assert_eq!(extract_title("<title>dangling"), "");
        assert_eq!(extract_title("</title>oops<title>"), "");
    }

    #[test]
    fn test_non_ascii_body() {
        assert_eq!(extract_title("<p>é</p><title>Café ✓</title>"), "Café ✓");
    }
}
