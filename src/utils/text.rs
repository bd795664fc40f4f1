//! Small text helpers shared by the portal and PDF modules.

/// Cut `text` to at most `limit` whitespace-separated words, appending "..."
/// when something was removed
pub fn truncate_words(text: &str, limit: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= limit {
        return words.join(" ");
    }
    format!("{}...", words[..limit].join(" "))
}

/// Whether `body` contains any of `signatures`, case-insensitively
pub fn contains_any_ignore_case(body: &str, signatures: &[&str]) -> bool {
    let lowered = body.to_lowercase();
    signatures
        .iter()
        .any(|signature| lowered.contains(&signature.to_lowercase()))
}

/// Whether `url` is an absolute http(s) URL
pub fn is_http_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some()
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_words() {
        assert_eq!(truncate_words("a b c", 5), "a b c");
        assert_eq!(truncate_words("a  b\nc d", 2), "a b...");
        assert_eq!(truncate_words("", 3), "");
    }

    #[test]
    fn test_contains_any_ignore_case() {
        assert!(contains_any_ignore_case(
            "<title>Just a moment... Cloudflare</title>",
            &["cloudflare"]
        ));
        assert!(contains_any_ignore_case(
            "<h1>Erişim Engellendi</h1>",
            &["erişim engellendi"]
        ));
        assert!(!contains_any_ignore_case("<html>fine</html>", &["captcha"]));
    }

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url("https://dergipark.org.tr/a.pdf"));
        assert!(is_http_url("http://example.org"));
        assert!(!is_http_url("ftp://example.org/a.pdf"));
        assert!(!is_http_url("/tr/download/article-file/1"));
        assert!(!is_http_url("not a url"));
    }
}
