//! HTTP refresh backend
//!
//! Fetches an entry's source location and stores the response body in the
//! cache directory. Features:
//! - Retry with exponential backoff on transient failures
//! - Atomic writes (temp file, then rename)
//! - One file per resource, named by the SHA-256 of the resource identifier

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use url::Url;

use super::{RefreshBackend, RefreshError, UpdateHandle, UpdateReporter};
use crate::utils::{sha256_hex, with_retry_if, RetryConfig};

/// Configuration for the HTTP backend
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Directory cached bodies are written to
    pub cache_dir: PathBuf,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// User agent string
    pub user_agent: String,

    /// Retry behavior for transient failures
    pub retry: RetryConfig,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("data/cache"),
            request_timeout: Duration::from_secs(30),
            user_agent: format!("appcache-updater/{}", env!("CARGO_PKG_VERSION")),
            retry: RetryConfig::default(),
        }
    }
}

struct Inner {
    client: Client,
    config: HttpBackendConfig,
}

/// Refresh backend that downloads source locations over HTTP
#[derive(Clone)]
pub struct HttpRefreshBackend {
    inner: Arc<Inner>,
}

impl HttpRefreshBackend {
    /// Create a backend
    ///
    /// # Errors
    ///
    /// Returns `RefreshError::Http` if the HTTP client cannot be created
    pub fn new(config: HttpBackendConfig) -> Result<Self, RefreshError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .gzip(true)
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner { client, config }),
        })
    }

    /// Path the cached body for `resource_id` is written to
    pub fn cache_path(&self, resource_id: &str) -> PathBuf {
        cache_path_in(&self.inner.config.cache_dir, resource_id)
    }
}

fn cache_path_in(dir: &Path, resource_id: &str) -> PathBuf {
    dir.join(format!("{}.cache", sha256_hex(resource_id)))
}

impl Inner {
    fn parse_source(source_location: &str) -> Result<Url, RefreshError> {
        let url = Url::parse(source_location)
            .map_err(|_| RefreshError::InvalidUrl(source_location.to_string()))?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            _ => Err(RefreshError::InvalidUrl(source_location.to_string())),
        }
    }

    async fn fetch_once(&self, url: &Url) -> Result<Vec<u8>, RefreshError> {
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Status(status.as_u16()));
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn store(&self, resource_id: &str, body: &[u8]) -> Result<PathBuf, RefreshError> {
        let dir = &self.config.cache_dir;
        tokio::fs::create_dir_all(dir).await?;

        let path = cache_path_in(dir, resource_id);
        let temp_path = path.with_extension("cache.tmp");

        tokio::fs::write(&temp_path, body).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        Ok(path)
    }

    async fn refresh(
        &self,
        resource_id: &str,
        source_location: &str,
        reporter: &UpdateReporter,
    ) -> Result<(), RefreshError> {
        let url = Self::parse_source(source_location)?;
        reporter.checking();

        let body = with_retry_if(
            &self.config.retry,
            || self.fetch_once(&url),
            RefreshError::is_retryable,
        )
        .await
        .map_err(|e| {
            if e.is_retryable() {
                RefreshError::MaxRetriesExceeded {
                    attempts: self.config.retry.max_retries + 1,
                    last: e.to_string(),
                }
            } else {
                e
            }
        })?;

        let path = self.store(resource_id, &body).await?;
        tracing::debug!(
            resource_id = %resource_id,
            path = %path.display(),
            bytes = body.len(),
            "Cached content written"
        );

        Ok(())
    }
}

impl RefreshBackend for HttpRefreshBackend {
    fn schedule_update(&self, resource_id: &str, source_location: &str) -> UpdateHandle {
        let (reporter, handle) = UpdateHandle::channel(resource_id);
        let inner = Arc::clone(&self.inner);
        let resource_id = resource_id.to_string();
        let source_location = source_location.to_string();

        // Once the handle is dropped the fetch is abandoned: no more retries
        // and no cache write for a refresh the scheduler already gave up on.
        tokio::spawn(async move {
            tokio::select! {
                result = inner.refresh(&resource_id, &source_location, &reporter) => match result {
                    Ok(()) => reporter.finished(Utc::now().timestamp_millis()),
                    Err(e) => reporter.error(e.to_string()),
                },
                () = reporter.closed() => {
                    tracing::debug!(resource_id = %resource_id, "Refresh abandoned by caller");
                }
            }
        });

        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::{RefreshOutcome, RefreshState};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(dir: &TempDir) -> HttpRefreshBackend {
        HttpRefreshBackend::new(HttpBackendConfig {
            cache_dir: dir.path().to_path_buf(),
            request_timeout: Duration::from_secs(5),
            retry: RetryConfig::with_delays(2, 1, 5),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_refresh_writes_cache_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/app1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        let resource_id = format!("{}/app1.appcache", server.uri());
        let source = format!("{}/app1", server.uri());

        let mut handle = backend.schedule_update(&resource_id, &source);
        assert_eq!(handle.next_state().await, Some(RefreshState::Checking));
        assert!(matches!(
            handle.wait().await,
            RefreshOutcome::Finished { .. }
        ));

        let cached = std::fs::read_to_string(backend.cache_path(&resource_id)).unwrap();
        assert_eq!(cached, "<html></html>");
    }

    #[tokio::test]
    async fn test_refresh_not_found_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let handle = backend(&dir).schedule_update("r1", &format!("{}/gone", server.uri()));

        match handle.wait().await {
            RefreshOutcome::Failed { reason } => assert!(reason.contains("404")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let handle = backend(&dir).schedule_update("r1", &format!("{}/busy", server.uri()));

        match handle.wait().await {
            RefreshOutcome::Failed { reason } => {
                assert!(reason.contains("3 attempts"));
                assert!(reason.contains("503"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_abandoned_refresh_never_writes_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late body")
                    .set_delay(Duration::from_millis(800)),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        let handle = backend.schedule_update("r1", &format!("{}/slow", server.uri()));

        let waited = tokio::time::timeout(Duration::from_millis(200), handle.wait()).await;
        assert!(waited.is_err());

        tokio::time::sleep(Duration::from_millis(1_200)).await;
        assert!(!backend.cache_path("r1").exists());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_invalid_source_location() {
        let dir = TempDir::new().unwrap();
        let handle = backend(&dir).schedule_update("r1", "ftp://example.com/app");

        match handle.wait().await {
            RefreshOutcome::Failed { reason } => {
                assert!(reason.contains("Invalid source location"))
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
