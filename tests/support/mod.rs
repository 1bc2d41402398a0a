//! Shared fixtures: a wiremock-backed fake wiki.

#![allow(dead_code)]

use std::path::Path;

use koushihime::models::Config;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Configuration pointing every endpoint at `server`.
pub fn config_for(server: &MockServer, cache_root: &Path) -> Config {
    let mut config = Config::default();
    config.wiki.api_root = format!("{}/api.php", server.uri());
    config.wiki.page_root = format!("{}/", server.uri());
    config.wiki.max_retries = 0;
    config.wiki.timeout_secs = 5;
    config.cache.root = cache_root.to_path_buf();
    config.pipeline.max_concurrent = 1;
    config
}

/// Metadata reply for an existing page.
pub async fn mount_metadata(server: &MockServer, title: &str, categories: &[&str]) {
    let categories: Vec<_> = categories
        .iter()
        .map(|c| json!({"ns": 14, "title": c}))
        .collect();
    let reply = json!({
        "batchcomplete": "",
        "query": {"pages": {"4242": {
            "pageid": 4242, "ns": 0, "title": title, "categories": categories
        }}}
    });

    Mock::given(method("GET"))
        .and(path("/api.php"))
        .and(query_param("prop", "categories"))
        .and(query_param("titles", title))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply))
        .mount(server)
        .await;
}

/// Metadata reply marking the page as missing.
pub async fn mount_missing(server: &MockServer, title: &str) {
    let reply = json!({
        "query": {"pages": {"-1": {"ns": 0, "title": title, "missing": ""}}}
    });

    Mock::given(method("GET"))
        .and(path("/api.php"))
        .and(query_param("prop", "categories"))
        .and(query_param("titles", title))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply))
        .mount(server)
        .await;
}

/// Page HTML with one icon and one substantive image pointing at `image_path`.
pub async fn mount_page(server: &MockServer, title: &str, image_path: &str) {
    let html = format!(
        r#"<html><body>
        <a class="image" href="/File:Icon.png"><img src="/icons/icon.png" width="20" height="20"></a>
        <a class="image" href="/File:Main"><img src="{image_path}" width="320" height="240"></a>
        </body></html>"#
    );

    Mock::given(method("GET"))
        .and(path(format!("/{title}")))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html; charset=utf-8"))
        .mount(server)
        .await;
}

/// Raw image bytes at `image_path`.
pub async fn mount_image(server: &MockServer, image_path: &str, bytes: &[u8]) {
    Mock::given(method("GET"))
        .and(path(image_path))
        .respond_with(ResponseTemplate::new(200).set_body_raw(bytes.to_vec(), "image/jpeg"))
        .mount(server)
        .await;
}

/// Recent-changes reply listing `titles` in order.
pub async fn mount_changes(server: &MockServer, titles: &[&str]) {
    let entries: Vec<_> = titles
        .iter()
        .map(|t| json!({"type": "edit", "ns": 0, "title": t, "oldlen": 100, "newlen": 150}))
        .collect();

    Mock::given(method("GET"))
        .and(path("/api.php"))
        .and(query_param("list", "recentchanges"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"query": {"recentchanges": entries}})),
        )
        .mount(server)
        .await;
}
