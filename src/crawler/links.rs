//! Link discovery in HTML and CSS responses.

use regex::Regex;
use url::Url;

/// Tags whose `href` is followed.
const HREF_TAGS: [&str; 2] = ["a", "link"];

/// Compiled patterns for pulling references out of page text.
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    css_url: Regex,
    tag: Regex,
    attr: Regex,
}

impl LinkExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            css_url: Regex::new(r"url\((.*?)\)")?,
            tag: Regex::new(r"(?is)<(a|link|script|img|video|iframe|source)\b([^>]*)>")?,
            attr: Regex::new(r#"(?is)\b(href|src)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)?,
        })
    }

    /// `url(...)` references in a stylesheet, minus `data:` URIs.
    pub fn css_links(&self, css: &str) -> Vec<String> {
        self.css_url
            .captures_iter(css)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .filter(|link| !link.contains("data:"))
            .map(clean_link)
            .collect()
    }

    /// `href` of `<a>`/`<link>` and `src` of `<script>`, `<img>`, `<video>`,
    /// `<iframe>` and `<source>`.
    pub fn html_links(&self, html: &str) -> Vec<String> {
        let mut links = Vec::new();
        for tag in self.tag.captures_iter(html) {
            let name = tag[1].to_ascii_lowercase();
            let wanted = if HREF_TAGS.contains(&name.as_str()) { "href" } else { "src" };

            for attr in self.attr.captures_iter(&tag[2]) {
                if !attr[1].eq_ignore_ascii_case(wanted) {
                    continue;
                }
                if let Some(value) = attr.get(2).or_else(|| attr.get(3)).or_else(|| attr.get(4)) {
                    links.push(clean_link(value.as_str()));
                }
                break;
            }
        }
        links
    }
}

/// Strip surrounding whitespace, quotes and escaping backslashes.
pub fn clean_link(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '\\')
        .trim()
        .to_string()
}

/// Resolve `link` as found on `page` and return its path and query if it
/// stays on `base`'s origin.
pub fn normalize(base: &Url, page: &Url, link: &str) -> Option<String> {
    if link.is_empty() || link.starts_with('#') || link.starts_with("data:") {
        return None;
    }
    let mut url = page.join(link).ok()?;
    if url.origin() != base.origin() {
        return None;
    }
    url.set_fragment(None);

    let mut out = url.path().to_string();
    if let Some(query) = url.query() {
        out.push('?');
        out.push_str(query);
    }
    Some(out)
}
