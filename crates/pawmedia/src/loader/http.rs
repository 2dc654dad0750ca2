//! HTTP loader wrapping reqwest.
//!
//! One attempt per call: a HEAD request, falling back to a one-byte ranged
//! GET for servers that refuse HEAD. There is no retry loop here; a failed
//! attempt is simply "unavailable" for the current run.

use super::Loader;
use crate::error::LoadError;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, RANGE};
use reqwest::StatusCode;
use std::time::Duration;

const USER_AGENT: &str = concat!("pawmedia/", env!("CARGO_PKG_VERSION"));

/// Loader for `http://` and `https://` locators.
#[derive(Clone)]
pub struct HttpLoader {
    client: reqwest::Client,
    require_media_type: bool,
}

impl HttpLoader {
    /// Create a loader whose requests give up after `timeout_ms`.
    pub fn new(timeout_ms: u64) -> Self {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("http loader client setup failed, using reqwest defaults: {e}");
                reqwest::Client::default()
            }
        };

        Self {
            client,
            require_media_type: false,
        }
    }

    /// Only accept responses whose `content-type` is `image/*` or `video/*`.
    ///
    /// Catches CDNs that answer 200 with an HTML error page.
    pub fn require_media_type(mut self, require: bool) -> Self {
        self.require_media_type = require;
        self
    }

    fn check(&self, locator: &str, resp: &reqwest::Response) -> Result<(), LoadError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                locator: locator.to_string(),
                status: status.as_u16(),
            });
        }

        if self.require_media_type {
            let content_type = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_ascii_lowercase());
            let is_media = content_type
                .as_deref()
                .map(|ct| ct.starts_with("image/") || ct.starts_with("video/"))
                .unwrap_or(false);
            if !is_media {
                return Err(LoadError::ContentType {
                    locator: locator.to_string(),
                    content_type,
                });
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Loader for HttpLoader {
    async fn attempt_load(&self, locator: &str) -> Result<(), LoadError> {
        let url = url::Url::parse(locator)
            .map_err(|e| LoadError::InvalidLocator(format!("{locator}: {e}")))?;

        let resp = self.client.head(url.clone()).send().await?;
        if matches!(
            resp.status(),
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
        ) {
            tracing::debug!("HEAD rejected for {locator}, retrying as ranged GET");
            let resp = self
                .client
                .get(url)
                .header(RANGE, "bytes=0-0")
                .send()
                .await?;
            return self.check(locator, &resp);
        }

        self.check(locator, &resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_head_success() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/dog.jpg"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/jpeg"))
            .mount(&server)
            .await;

        let loader = HttpLoader::new(2000).require_media_type(true);
        let url = format!("{}/dog.jpg", server.uri());
        assert!(loader.attempt_load(&url).await.is_ok());
    }

    #[tokio::test]
    async fn test_not_found_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let loader = HttpLoader::new(2000);
        let url = format!("{}/missing.jpg", server.uri());
        match loader.attempt_load(&url).await {
            Err(LoadError::Status { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_falls_back_to_ranged_get() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/dog.png"))
            .respond_with(ResponseTemplate::new(206).insert_header("content-type", "image/png"))
            .expect(1)
            .mount(&server)
            .await;

        let loader = HttpLoader::new(2000).require_media_type(true);
        let url = format!("{}/dog.png", server.uri());
        assert!(loader.attempt_load(&url).await.is_ok());
    }

    #[tokio::test]
    async fn test_html_error_page_rejected_when_media_required() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html"))
            .mount(&server)
            .await;

        let url = format!("{}/dog.jpg", server.uri());
        let strict = HttpLoader::new(2000).require_media_type(true);
        assert!(matches!(
            strict.attempt_load(&url).await,
            Err(LoadError::ContentType { .. })
        ));

        let lenient = HttpLoader::new(2000);
        assert!(lenient.attempt_load(&url).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_locator() {
        let loader = HttpLoader::new(2000);
        assert!(matches!(
            loader.attempt_load("not a url").await,
            Err(LoadError::InvalidLocator(_))
        ));
    }
}
