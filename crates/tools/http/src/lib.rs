//! HTTP downloader for repofetch `http_archive` rules.
//!
//! [`HttpDownloader`] implements [`repofetch_core::Downloader`]:
//! - mirrors from `urls` / `url`, tried in order
//! - per-mirror exponential backoff on transient failures
//! - streaming sha256 verification against the `sha256` attribute
//! - proxies taken only from the client-environment snapshot
//!
//! Status codes 5xx, 408 and 429 are transient; other client errors are
//! persistent since the declared URL is wrong.

pub mod checksum;
pub mod config;
pub mod downloader;
pub mod proxy;
pub mod retry;

pub use config::DownloaderConfig;
pub use downloader::HttpDownloader;
pub use proxy::{PROXY_VARIABLES, ProxySettings};
