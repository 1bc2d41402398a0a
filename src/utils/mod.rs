//! Utility functions and helpers.

pub mod http;

use url::Url;

use crate::error::Result;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Public URL of a page: `title` appended to `page_root` as one path segment.
///
/// The title is percent-encoded, so titles containing `:` or `/` stay a
/// single segment.
pub fn page_url(page_root: &str, title: &str) -> Result<Url> {
    let mut url = Url::parse(page_root)?;
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .push(title);
    Ok(url)
}

/// Extension of the last path segment, the text after its last `.`.
pub fn url_extension(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://example.com/path/").unwrap();
        assert_eq!(
            resolve_url(&base, "page.html"),
            "https://example.com/path/page.html"
        );
        assert_eq!(
            resolve_url(&base, "//img.example.com/a.jpg"),
            "https://img.example.com/a.jpg"
        );
        assert_eq!(
            resolve_url(&base, "https://other.com/x"),
            "https://other.com/x"
        );
    }

    #[test]
    fn test_page_url_keeps_title_in_one_segment() {
        let url = page_url("https://zh.moegirl.org/", "Category:Foo/Bar").unwrap();
        assert_eq!(url.as_str(), "https://zh.moegirl.org/Category:Foo%2FBar");

        let url = page_url("http://localhost:1234", "Foo").unwrap();
        assert_eq!(url.as_str(), "http://localhost:1234/Foo");
    }

    #[test]
    fn test_url_extension() {
        let url = Url::parse("https://img.example.com/a/b/Cat.JPG?width=300").unwrap();
        assert_eq!(url_extension(&url), Some("JPG".to_string()));

        let url = Url::parse("https://img.example.com/thumb/x.png").unwrap();
        assert_eq!(url_extension(&url), Some("png".to_string()));

        let url = Url::parse("https://img.example.com/noext").unwrap();
        assert_eq!(url_extension(&url), None);
    }
}
