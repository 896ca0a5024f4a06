//! Response header filtering.

use std::collections::BTreeSet;

use crate::rewrite::body::SubstitutionPass;

/// Drop excluded headers (case-insensitive) and rewrite `location`.
///
/// Header order is preserved and repeated headers are kept.
pub fn filter_headers(
    headers: Vec<(String, String)>,
    excluded: &BTreeSet<String>,
    location: &SubstitutionPass,
) -> Vec<(String, String)> {
    headers
        .into_iter()
        .filter_map(|(name, value)| {
            let name = name.to_ascii_lowercase();
            if excluded.contains(&name) {
                return None;
            }
            if name == "location" {
                let mut target = location.apply_str(&value);
                if target.is_empty() {
                    target.push('/');
                }
                return Some((name, target));
            }
            Some((name, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn excluded() -> BTreeSet<String> {
        ["content-length", "connection", "x-secret"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn location(replacement: &str) -> SubstitutionPass {
        SubstitutionPass::new(
            [("http://example.com".to_string(), replacement.to_string())],
            [replacement.to_string()],
        )
    }

    #[test]
    fn excluded_names_match_any_case() {
        let headers = vec![
            ("Content-Length".to_string(), "10".to_string()),
            ("X-SECRET".to_string(), "s".to_string()),
            ("Content-Type".to_string(), "text/html".to_string()),
        ];
        let filtered = filter_headers(headers, &excluded(), &location("https://mirror.test"));
        assert_eq!(filtered, vec![("content-type".to_string(), "text/html".to_string())]);
    }

    #[test]
    fn location_is_rewritten() {
        let headers = vec![("Location".to_string(), "http://example.com/next".to_string())];
        let filtered = filter_headers(headers, &excluded(), &location("https://mirror.test"));
        assert_eq!(filtered[0].1, "https://mirror.test/next");
    }

    #[test]
    fn empty_replacement_makes_relative_redirects() {
        let headers = vec![
            ("location".to_string(), "http://example.com/next".to_string()),
            ("location".to_string(), "http://example.com".to_string()),
        ];
        let filtered = filter_headers(headers, &excluded(), &location(""));
        assert_eq!(filtered[0].1, "/next");
        assert_eq!(filtered[1].1, "/");
    }

    #[test]
    fn other_values_untouched() {
        let headers = vec![("link".to_string(), "<http://example.com/a>".to_string())];
        let filtered = filter_headers(headers, &excluded(), &location("https://mirror.test"));
        assert_eq!(filtered[0].1, "<http://example.com/a>");
    }
}
