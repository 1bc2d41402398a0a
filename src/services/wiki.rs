// src/services/wiki.rs

//! Wiki page client.
//!
//! Reads page metadata through `api.php` and picks a representative image
//! from the rendered page.

use reqwest::Client;
use reqwest::header::HeaderMap;
use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Config, FetchedImage, ImageConfig, PageMetadata, WikiConfig};
use crate::utils::http::{
    RetryPolicy, continuation_params, create_async_client, initial_continuation, query_json,
    send_with_retry,
};
use crate::utils::{page_url, resolve_url, url_extension};

/// Page id the upstream uses for a missing page.
const MISSING_PAGE_ID: &str = "-1";

/// Upper bound on category-list requests for one page.
pub const MAX_CATEGORY_REQUESTS: usize = 10;

/// Client for per-page upstream queries.
#[derive(Debug, Clone)]
pub struct WikiPageClient {
    client: Client,
    wiki: WikiConfig,
    image: ImageConfig,
    image_headers: HeaderMap,
    retry: RetryPolicy,
}

impl WikiPageClient {
    /// Create a client with its own HTTP connection pool.
    pub fn new(config: &Config) -> Result<Self> {
        let client = create_async_client(&config.wiki)?;
        Self::with_client(client, config)
    }

    /// Create a client sharing an existing HTTP connection pool.
    pub fn with_client(client: Client, config: &Config) -> Result<Self> {
        Ok(Self {
            client,
            image_headers: config.image.header_map()?,
            wiki: config.wiki.clone(),
            image: config.image.clone(),
            retry: RetryPolicy::from_config(&config.wiki),
        })
    }

    /// Query categories and namespace for `title`.
    ///
    /// The category list is paged upstream; every `clcontinue` page is
    /// fetched and appended in order so no category is missed. A list still
    /// continuing after `MAX_CATEGORY_REQUESTS` requests is an error.
    pub async fn fetch_metadata(&self, title: &str) -> Result<PageMetadata> {
        let context = format!("metadata query for '{title}'");
        let base: Vec<(String, String)> = [
            ("format", "json"),
            ("action", "query"),
            ("prop", "categories"),
            ("cllimit", "max"),
            ("titles", title),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let mut continuation = initial_continuation();
        let mut metadata: Option<PageMetadata> = None;

        for _ in 0..MAX_CATEGORY_REQUESTS {
            let params: Vec<(String, String)> =
                base.iter().cloned().chain(continuation).collect();
            let value = query_json(
                &self.client,
                self.retry,
                &self.wiki.api_root,
                &context,
                &params,
            )
            .await?;
            let page = parse_metadata(title, &value)?;

            let meta = match metadata.take() {
                Some(mut meta) => {
                    meta.categories.extend(page.categories);
                    meta
                }
                None => page,
            };

            match continuation_params(&value) {
                Some(next) => {
                    continuation = next;
                    metadata = Some(meta);
                }
                None => return Ok(meta),
            }
        }

        log::error!(
            "Categories of '{}' still continuing after {} requests",
            title,
            MAX_CATEGORY_REQUESTS
        );
        Err(AppError::ContinuationLimit {
            context,
            requests: MAX_CATEGORY_REQUESTS,
        })
    }

    /// Find the representative image URL on the page for `title`.
    pub async fn resolve_image_url(&self, title: &str) -> Result<String> {
        let url = page_url(&self.wiki.page_root, title)?;
        let context = format!("page fetch for '{title}'");

        let response =
            send_with_retry(self.retry, &context, || self.client.get(url.clone())).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::upstream(&context, format!("HTTP {status}")));
        }

        let html = response
            .text()
            .await
            .map_err(|e| AppError::unparseable(url.as_str(), e))?;

        select_image(&html, &url, title, &self.image)
    }

    /// Download image bytes with the configured header bundle.
    pub async fn download_image(&self, url: &str) -> Result<FetchedImage> {
        let parsed = Url::parse(url).map_err(|e| AppError::download(url, e))?;
        let extension = url_extension(&parsed)
            .ok_or_else(|| AppError::download(url, "URL has no file extension"))?;
        let context = format!("image download {url}");

        let response = send_with_retry(self.retry, &context, || {
            self.client
                .get(parsed.clone())
                .headers(self.image_headers.clone())
        })
        .await
        .map_err(|e| AppError::download(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::download(url, format!("HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::download(url, e))?;

        log::debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(FetchedImage::new(url, bytes.to_vec(), extension))
    }

    /// Resolve and download the representative image for `title`.
    pub async fn fetch_image(&self, title: &str) -> Result<FetchedImage> {
        let url = self.resolve_image_url(title).await?;
        self.download_image(&url).await
    }
}

/// Build `PageMetadata` from a `prop=categories` reply.
///
/// Categories default to empty when absent or malformed; the namespace is
/// `None` when the page id is the missing-page sentinel.
pub fn parse_metadata(title: &str, value: &Value) -> Result<PageMetadata> {
    let context = format!("metadata query for '{title}'");
    if !value.is_object() {
        return Err(AppError::malformed(&context, "top-level reply is not an object"));
    }

    let pages = value
        .get("query")
        .and_then(|q| q.get("pages"))
        .and_then(Value::as_object)
        .ok_or_else(|| AppError::malformed(&context, "missing query.pages"))?;
    let (page_id, page) = pages
        .iter()
        .next()
        .ok_or_else(|| AppError::malformed(&context, "query.pages is empty"))?;

    let namespace = if page_id == MISSING_PAGE_ID {
        None
    } else {
        let ns = page.get("ns").and_then(Value::as_i64);
        if ns.is_none() {
            log::warn!("Page {} ('{}') has no namespace field", page_id, title);
        }
        ns
    };

    let categories = page
        .get("categories")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|c| c.get("title").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(PageMetadata::new(title, namespace, categories))
}

/// Pick the first image link whose `<img>` is larger than the configured
/// minimum in both dimensions.
///
/// An image link with a missing or non-numeric size or source makes the
/// page unparseable; a page without a qualifying link has no image.
pub fn select_image(html: &str, page: &Url, title: &str, config: &ImageConfig) -> Result<String> {
    if html.trim().is_empty() {
        return Err(AppError::unparseable(page.as_str(), "empty page body"));
    }

    let anchor_sel = parse_selector("a.image", page)?;
    let img_sel = parse_selector("img", page)?;
    let document = Html::parse_document(html);

    for anchor in document.select(&anchor_sel) {
        let img = anchor
            .select(&img_sel)
            .next()
            .ok_or_else(|| AppError::unparseable(page.as_str(), "image link without <img>"))?;

        let width = dimension(img.value().attr("width"), "width", page)?;
        let height = dimension(img.value().attr("height"), "height", page)?;
        if width > config.min_width && height > config.min_height {
            let src = img
                .value()
                .attr("src")
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| AppError::unparseable(page.as_str(), "<img> without src"))?;
            return Ok(resolve_url(page, src.trim()));
        }
    }

    Err(AppError::NoImageFound {
        title: title.to_string(),
    })
}

fn dimension(raw: Option<&str>, name: &str, page: &Url) -> Result<u32> {
    let raw = raw.ok_or_else(|| AppError::unparseable(page.as_str(), format!("<img> without {name}")))?;
    raw.trim()
        .parse()
        .map_err(|_| AppError::unparseable(page.as_str(), format!("<img> {name}='{raw}'")))
}

fn parse_selector(s: &str, page: &Url) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::unparseable(page.as_str(), format!("selector {s}: {e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page() -> Url {
        Url::parse("https://zh.moegirl.org/Foo").unwrap()
    }

    #[test]
    fn test_parse_metadata_reads_categories_and_namespace() {
        let reply = json!({
            "query": {"pages": {"1234": {
                "pageid": 1234, "ns": 0, "title": "Foo",
                "categories": [
                    {"ns": 14, "title": "Category:Anime"},
                    {"ns": 14, "title": "Category:屏蔽更新姬推送的条目"}
                ]
            }}}
        });
        let meta = parse_metadata("Foo", &reply).unwrap();
        assert_eq!(meta.namespace, Some(0));
        assert_eq!(
            meta.categories,
            vec!["Category:Anime", "Category:屏蔽更新姬推送的条目"]
        );
    }

    #[test]
    fn test_parse_metadata_missing_page_has_no_namespace() {
        let reply = json!({"query": {"pages": {"-1": {"ns": 0, "title": "Nope", "missing": ""}}}});
        let meta = parse_metadata("Nope", &reply).unwrap();
        assert_eq!(meta.namespace, None);
        assert!(meta.categories.is_empty());
    }

    #[test]
    fn test_parse_metadata_tolerates_bad_categories() {
        let reply = json!({"query": {"pages": {"7": {"ns": 2, "categories": "oops"}}}});
        let meta = parse_metadata("User:X", &reply).unwrap();
        assert_eq!(meta.namespace, Some(2));
        assert!(meta.categories.is_empty());
    }

    #[test]
    fn test_parse_metadata_rejects_non_object() {
        assert!(matches!(
            parse_metadata("Foo", &json!([1, 2, 3])),
            Err(AppError::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_metadata("Foo", &json!({"batchcomplete": ""})),
            Err(AppError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_select_image_skips_small_thumbnails() {
        let html = r#"
            <a class="image" href="/File:Icon.png"><img src="//img.moegirl.org/icon.png" width="40" height="40"></a>
            <a class="image" href="/File:Wide.png"><img src="//img.moegirl.org/wide.png" width="300" height="90"></a>
            <a class="image" href="/File:Main.jpg"><img src="//img.moegirl.org/main.jpg" width="250" height="350"></a>
            <a class="image" href="/File:Later.jpg"><img src="//img.moegirl.org/later.jpg" width="500" height="500"></a>
        "#;
        let url = select_image(html, &page(), "Foo", &ImageConfig::default()).unwrap();
        assert_eq!(url, "https://img.moegirl.org/main.jpg");
    }

    #[test]
    fn test_select_image_boundary_is_exclusive() {
        let html = r#"<a class="image"><img src="/a.jpg" width="200" height="101"></a>"#;
        assert!(matches!(
            select_image(html, &page(), "Foo", &ImageConfig::default()),
            Err(AppError::NoImageFound { .. })
        ));
    }

    #[test]
    fn test_select_image_ignores_plain_images() {
        let html = r#"<a href="/x"><img src="/big.jpg" width="900" height="900"></a>"#;
        assert!(matches!(
            select_image(html, &page(), "Foo", &ImageConfig::default()),
            Err(AppError::NoImageFound { .. })
        ));
    }

    #[test]
    fn test_select_image_reports_unreadable_dimensions() {
        let html = r#"<a class="image"><img src="/a.jpg" width="auto" height="300"></a>"#;
        assert!(matches!(
            select_image(html, &page(), "Foo", &ImageConfig::default()),
            Err(AppError::UnparseableHtml { .. })
        ));
    }

    #[test]
    fn test_select_image_empty_body_is_unparseable() {
        assert!(matches!(
            select_image("  ", &page(), "Foo", &ImageConfig::default()),
            Err(AppError::UnparseableHtml { .. })
        ));
    }
}
