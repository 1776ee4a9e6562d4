//! Streaming HTTP downloader with mirror fallback.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use repofetch_core::rule::{ATTR_URL, ATTR_URLS};
use repofetch_core::{
    ClientEnvironment, Downloader, Failure, PersistentCause, RepositoryRule, RuleAttributes,
    TransientCause,
};
use repofetch_events::{EventCategory, EventSender, FetchEvent};
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::checksum::expected_sha256;
use crate::config::DownloaderConfig;
use crate::proxy::{PROXY_VARIABLES, ProxySettings};
use crate::retry::retry_with_backoff;

const EVENT_TARGET: &str = "repofetch::http";
const FALLBACK_FILE_NAME: &str = "archive";
/// Bytes between two progress events.
const PROGRESS_STEP: u64 = 1024 * 1024;

/// Downloads `http_archive` rules over HTTP(S).
///
/// Mirrors listed in `urls` (or the single `url`) are tried in order; each
/// mirror is retried with exponential backoff on transient failures. The
/// body is streamed to `<output_dir>/<last path segment>` while being hashed.
#[derive(Debug, Clone, Default)]
pub struct HttpDownloader {
    config: DownloaderConfig,
}

impl HttpDownloader {
    /// Create a downloader with the given settings.
    #[must_use]
    pub fn new(config: DownloaderConfig) -> Self {
        Self { config }
    }

    /// Settings in use.
    #[must_use]
    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    fn client(&self, client_env: &ClientEnvironment) -> Result<Client, Failure> {
        let proxies = ProxySettings::from_client_env(client_env);
        if !proxies.is_empty() {
            debug!(
                http = proxies.http.is_some(),
                https = proxies.https.is_some(),
                "Using proxies from client environment"
            );
        }
        let builder = Client::builder()
            .user_agent(&self.config.user_agent)
            .connect_timeout(self.config.connect_timeout());
        proxies.apply(builder)?.build().map_err(|e| {
            Failure::Transient(TransientCause::Network {
                url: String::new(),
                message: format!("failed to create HTTP client: {e}"),
            })
        })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(
        &self,
        rule: &RepositoryRule,
        output_dir: &Path,
        events: &EventSender,
        client_env: &ClientEnvironment,
    ) -> Result<PathBuf, Failure> {
        let attributes = rule.mapper();
        let urls = mirror_urls(&attributes)?;
        let expected = expected_sha256(&attributes)?;
        let target = output_dir.join(file_name(&urls[0]));
        let client = self.client(client_env)?;
        let reporter = Reporter {
            events,
            repository: rule.name(),
        };

        let mut last_transient = None;
        let mut last_persistent = None;
        for url in &urls {
            let attempt = retry_with_backoff(&self.config, url.as_str(), || {
                fetch_once(&client, url, &target, &reporter)
            })
            .await;

            let actual = match attempt {
                Ok(actual) => actual,
                Err(failure) => {
                    remove_partial(&target).await;
                    warn!(repository = rule.name(), %url, error = %failure, "Mirror failed");
                    if failure.is_transient() {
                        last_transient = Some(failure);
                    } else {
                        last_persistent = Some(failure);
                    }
                    continue;
                }
            };

            match &expected {
                Some(expected) if *expected != actual => {
                    remove_partial(&target).await;
                    return Err(Failure::Persistent(PersistentCause::ChecksumMismatch {
                        url: url.to_string(),
                        expected: expected.clone(),
                        actual,
                    }));
                }
                Some(_) => {}
                None => {
                    warn!(
                        repository = rule.name(),
                        %url,
                        sha256 = %actual,
                        "No sha256 declared; add it to the rule to pin the archive"
                    );
                    reporter.report(FetchEvent::ChecksumMissing {
                        repository: rule.name().to_string(),
                        url: url.to_string(),
                        sha256: actual.clone(),
                    });
                }
            }

            info!(repository = rule.name(), %url, path = %target.display(), "Archive downloaded");
            reporter.report(FetchEvent::Downloaded {
                repository: rule.name().to_string(),
                path: target.display().to_string(),
                sha256: actual,
            });
            return Ok(target);
        }

        // Every mirror failed: a transient cause means a later attempt may still work
        Err(last_transient
            .or(last_persistent)
            .unwrap_or_else(|| Failure::missing_attribute(ATTR_URLS)))
    }

    fn environment_variables(&self) -> &[&str] {
        PROXY_VARIABLES
    }
}

struct Reporter<'a> {
    events: &'a EventSender,
    repository: &'a str,
}

impl Reporter<'_> {
    fn report(&self, event: FetchEvent) {
        self.events.report(EVENT_TARGET, EventCategory::Fetch(event));
    }
}

/// Stream one URL to `target`, returning the hex sha256 of what was written.
async fn fetch_once(
    client: &Client,
    url: &Url,
    target: &Path,
    reporter: &Reporter<'_>,
) -> Result<String, Failure> {
    debug!(%url, target = %target.display(), "Requesting archive");
    reporter.report(FetchEvent::DownloadStarted {
        repository: reporter.repository.to_string(),
        url: url.to_string(),
    });

    let mut response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| network(url, &e))?;
    classify_status(url, response.status())?;
    let total = response.content_length();

    let mut file = tokio::fs::File::create(target)
        .await
        .map_err(|e| Failure::io(e, target, "create archive"))?;
    let mut hasher = Sha256::new();
    let mut bytes: u64 = 0;
    let mut next_report = PROGRESS_STEP;

    while let Some(chunk) = response.chunk().await.map_err(|e| network(url, &e))? {
        file.write_all(&chunk)
            .await
            .map_err(|e| Failure::io(e, target, "write archive"))?;
        hasher.update(&chunk);
        bytes += chunk.len() as u64;
        if bytes >= next_report {
            next_report = bytes + PROGRESS_STEP;
            reporter.report(FetchEvent::DownloadProgress {
                repository: reporter.repository.to_string(),
                url: url.to_string(),
                bytes,
                total,
            });
        }
    }
    file.flush()
        .await
        .map_err(|e| Failure::io(e, target, "write archive"))?;

    reporter.report(FetchEvent::DownloadProgress {
        repository: reporter.repository.to_string(),
        url: url.to_string(),
        bytes,
        total,
    });
    Ok(hex::encode(hasher.finalize()))
}

/// Map an HTTP status to a failure, or `Ok` on success.
///
/// # Errors
///
/// 5xx, 408 and 429 are transient; every other non-success status is
/// persistent because the URL itself is wrong.
pub fn classify_status(url: &Url, status: StatusCode) -> Result<(), Failure> {
    if status.is_success() {
        return Ok(());
    }
    let url = url.to_string();
    let code = status.as_u16();
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        Err(Failure::Transient(TransientCause::HttpStatus { url, status: code }))
    } else {
        Err(Failure::Persistent(PersistentCause::HttpStatus { url, status: code }))
    }
}

/// Declared mirrors, in order.
///
/// # Errors
///
/// Persistent failure if neither `urls` nor `url` is set, or if a URL does
/// not parse or is not http(s).
pub fn mirror_urls(attributes: &dyn RuleAttributes) -> Result<Vec<Url>, Failure> {
    let mut raw = Vec::new();
    if attributes.is_explicitly_specified(ATTR_URLS) {
        raw.extend(attributes.get_string_list(ATTR_URLS)?);
    }
    if attributes.is_explicitly_specified(ATTR_URL) {
        raw.push(attributes.get_string(ATTR_URL)?);
    }
    if raw.is_empty() {
        return Err(Failure::missing_attribute(ATTR_URL));
    }
    raw.iter().map(|url| parse_url(url)).collect()
}

fn parse_url(raw: &str) -> Result<Url, Failure> {
    let url = Url::parse(raw).map_err(|e| invalid_url(raw, e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid_url(raw, format!("unsupported scheme '{other}'"))),
    }
}

fn invalid_url(url: &str, message: impl ToString) -> Failure {
    Failure::Persistent(PersistentCause::InvalidUrl {
        url: url.to_string(),
        message: message.to_string(),
    })
}

/// Last non-empty path segment of `url`, or `archive`.
#[must_use]
pub fn file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .filter(|s| *s != "." && *s != "..")
        .map_or_else(|| FALLBACK_FILE_NAME.to_string(), str::to_string)
}

fn network(url: &Url, error: &reqwest::Error) -> Failure {
    Failure::Transient(TransientCause::Network {
        url: url.to_string(),
        message: error.to_string(),
    })
}

async fn remove_partial(target: &Path) {
    if let Err(e) = tokio::fs::remove_file(target).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        debug!(path = %target.display(), error = %e, "Failed to remove partial download");
    }
}
