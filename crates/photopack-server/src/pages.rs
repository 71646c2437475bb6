//! Static HTML documents: the index page and the not-found page.
//!
//! Both are read from disk on every request so they can be edited without a
//! restart.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Response, StatusCode};
use http_body_util::{BodyExt, Full};
use photopack_config::CatalogSection;

use crate::server::HttpResponse;

/// Served with 404 when the configured not-found page can't be read.
pub const FALLBACK_NOT_FOUND_PAGE: &str = "<!DOCTYPE html>\n\
<html><head><meta charset=\"utf-8\"><title>404 Not Found</title></head>\n\
<body><h1>404 Not Found</h1><p>The archive does not exist or has been removed.</p></body></html>\n";

/// Locations of the HTML documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSet {
    index: PathBuf,
    not_found: PathBuf,
}

impl PageSet {
    /// Creates a page set from two file paths.
    #[must_use]
    pub fn new(index: impl Into<PathBuf>, not_found: impl Into<PathBuf>) -> Self {
        Self {
            index: index.into(),
            not_found: not_found.into(),
        }
    }

    /// Path of the index document.
    #[must_use]
    pub fn index_path(&self) -> &Path {
        &self.index
    }

    /// Path of the not-found document.
    #[must_use]
    pub fn not_found_path(&self) -> &Path {
        &self.not_found
    }

    /// The index document, or `None` if it can't be read.
    pub async fn index(&self) -> Option<Bytes> {
        read_page(&self.index).await
    }

    /// The not-found document, or the built-in fallback.
    pub async fn not_found(&self) -> Bytes {
        read_page(&self.not_found)
            .await
            .unwrap_or_else(|| Bytes::from_static(FALLBACK_NOT_FOUND_PAGE.as_bytes()))
    }

    /// `200` with the index page, or the not-found response if it is missing.
    pub async fn index_response(&self) -> HttpResponse {
        match self.index().await {
            Some(page) => html_response(StatusCode::OK, page),
            None => self.not_found_response().await,
        }
    }

    /// `404` with the not-found page.
    pub async fn not_found_response(&self) -> HttpResponse {
        html_response(StatusCode::NOT_FOUND, self.not_found().await)
    }
}

impl Default for PageSet {
    fn default() -> Self {
        Self::from(&CatalogSection::default())
    }
}

impl From<&CatalogSection> for PageSet {
    fn from(section: &CatalogSection) -> Self {
        Self::new(&section.index_page, &section.not_found_page)
    }
}

async fn read_page(path: &Path) -> Option<Bytes> {
    match tokio::fs::read(path).await {
        Ok(contents) => Some(Bytes::from(contents)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read page");
            None
        }
    }
}

/// Builds a `text/html` response.
pub fn html_response(status: StatusCode, body: impl Into<Bytes>) -> HttpResponse {
    let body = Full::new(body.into()).map_err(|never| match never {}).boxed();
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn body_text(response: HttpResponse) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_index_response() {
        let dir = TempDir::new().unwrap();
        let index = dir.path().join("index.html");
        std::fs::write(&index, "<h1>Photos</h1>").unwrap();

        let pages = PageSet::new(&index, dir.path().join("404.html"));
        let response = pages.index_response().await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
        assert_eq!(body_text(response).await, "<h1>Photos</h1>");
    }

    #[tokio::test]
    async fn test_missing_index_serves_not_found_page() {
        let dir = TempDir::new().unwrap();
        let not_found = dir.path().join("404.html");
        std::fs::write(&not_found, "gone").unwrap();

        let pages = PageSet::new(dir.path().join("index.html"), &not_found);
        let response = pages.index_response().await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "gone");
    }

    #[tokio::test]
    async fn test_not_found_falls_back_to_builtin_page() {
        let dir = TempDir::new().unwrap();
        let pages = PageSet::new(dir.path().join("index.html"), dir.path().join("404.html"));

        let response = pages.not_found_response().await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, FALLBACK_NOT_FOUND_PAGE);
    }

    #[test]
    fn test_from_catalog_section() {
        let pages = PageSet::default();
        assert_eq!(pages.index_path(), Path::new("index.html"));
        assert_eq!(pages.not_found_path(), Path::new("404.html"));
    }
}
