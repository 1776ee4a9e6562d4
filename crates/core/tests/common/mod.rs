//! Scripted collaborators shared by the core integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use repofetch_core::{
    ArchiveDescriptor, ArchiveFormat, ClientEnvironment, Decompressor, Downloader,
    ExternalLayout, ExtractionSummary, Failure, FetchPhase, GraphEnvironment, PersistentCause,
    RepositoryFetcher, RepositoryNode, RepositoryRule, RuleAttributes, TransientCause,
};
use repofetch_events::{EventSender, RepofetchEvent};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

pub const VALID_SHA256: &str = "9b74c9897bac770ffc029102a200c5de9b74c9897bac770ffc029102a200c5de";

/// How the scripted downloader behaves on each call.
#[derive(Debug, Clone)]
pub enum DownloadScript {
    /// Write the archive file and succeed.
    Succeed,
    /// Fail with a transient network error.
    NetworkError,
    /// Fail with a persistent checksum mismatch.
    ChecksumMismatch { actual: String },
    /// Block until the cancellation token fires.
    Hang,
}

/// Downloader whose calls follow a script; the last step repeats.
pub struct ScriptedDownloader {
    script: Mutex<Vec<DownloadScript>>,
    pub calls: AtomicUsize,
    pub seen_env: Mutex<Vec<ClientEnvironment>>,
}

impl ScriptedDownloader {
    pub fn new(script: Vec<DownloadScript>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            seen_env: Mutex::new(Vec::new()),
        })
    }

    pub fn succeeding() -> Arc<Self> {
        Self::new(vec![DownloadScript::Succeed])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> DownloadScript {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.remove(0)
        } else {
            script[0].clone()
        }
    }
}

#[async_trait]
impl Downloader for ScriptedDownloader {
    async fn download(
        &self,
        rule: &RepositoryRule,
        output_dir: &Path,
        _events: &EventSender,
        client_env: &ClientEnvironment,
    ) -> Result<PathBuf, Failure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_env.lock().unwrap().push(client_env.clone());
        let url = rule
            .mapper()
            .get_opt_string("url")?
            .unwrap_or_else(|| "http://x/archive.tar.gz".to_string());

        match self.next_step() {
            DownloadScript::Succeed => {
                let target = output_dir.join("archive.tar.gz");
                tokio::fs::write(&target, b"archive bytes")
                    .await
                    .map_err(|e| Failure::io(e, &target, "write"))?;
                Ok(target)
            }
            DownloadScript::NetworkError => Err(Failure::Transient(TransientCause::Network {
                url,
                message: "connection reset by peer".into(),
            })),
            DownloadScript::ChecksumMismatch { actual } => {
                Err(Failure::Persistent(PersistentCause::ChecksumMismatch {
                    url,
                    expected: VALID_SHA256.into(),
                    actual,
                }))
            }
            DownloadScript::Hang => {
                tokio::fs::write(output_dir.join("archive.tar.gz.part"), b"partial")
                    .await
                    .map_err(|e| Failure::io_no_path(e, "write"))?;
                std::future::pending().await
            }
        }
    }

    fn environment_variables(&self) -> &[&str] {
        &["HTTP_PROXY", "NO_PROXY"]
    }
}

/// Decompressor that materializes a fixed list of archive paths.
///
/// Paths ending in `/` are directories; everything else is a file whose
/// content is its own path.
pub struct FakeDecompressor {
    entries: Vec<String>,
    pub calls: AtomicUsize,
    block: bool,
}

impl FakeDecompressor {
    pub fn new(entries: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            entries: entries.iter().map(|e| (*e).to_string()).collect(),
            calls: AtomicUsize::new(0),
            block: false,
        })
    }

    /// Like [`FakeDecompressor::new`] but waits for cancellation before
    /// writing anything.
    pub fn blocking(entries: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            entries: entries.iter().map(|e| (*e).to_string()).collect(),
            calls: AtomicUsize::new(0),
            block: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Decompressor for FakeDecompressor {
    fn decompress(
        &self,
        descriptor: &ArchiveDescriptor,
        interrupt: &CancellationToken,
    ) -> Result<ExtractionSummary, Failure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.block {
            while !interrupt.is_cancelled() {
                std::thread::sleep(Duration::from_millis(5));
            }
            return Err(Failure::interrupted(FetchPhase::Extraction));
        }

        let selected: Vec<String> = match descriptor.strip_prefix() {
            None => self.entries.clone(),
            Some(prefix) => {
                let wanted = format!("{prefix}/");
                let stripped: Vec<String> = self
                    .entries
                    .iter()
                    .filter_map(|e| e.strip_prefix(&wanted))
                    .filter(|e| !e.is_empty())
                    .map(str::to_string)
                    .collect();
                if stripped.is_empty() {
                    let mut found: Vec<String> = self
                        .entries
                        .iter()
                        .filter_map(|e| e.split('/').next())
                        .map(str::to_string)
                        .collect();
                    found.dedup();
                    return Err(Failure::Persistent(PersistentCause::MissingPrefix {
                        prefix: prefix.to_string(),
                        archive: descriptor.archive_path().to_path_buf(),
                        found,
                    }));
                }
                stripped
            }
        };

        let root = descriptor.repository_path();
        let mut top_level = Vec::new();
        for entry in &selected {
            if interrupt.is_cancelled() {
                return Err(Failure::interrupted(FetchPhase::Extraction));
            }
            let target = root.join(entry.trim_end_matches('/'));
            if entry.ends_with('/') {
                std::fs::create_dir_all(&target).map_err(|e| Failure::io(e, &target, "create"))?;
            } else {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| Failure::io(e, parent, "create"))?;
                }
                std::fs::write(&target, entry.as_bytes())
                    .map_err(|e| Failure::io(e, &target, "write"))?;
            }
            let top = entry.split('/').next().unwrap_or_default().to_string();
            if !top_level.contains(&top) {
                top_level.push(top);
            }
        }

        Ok(ExtractionSummary {
            format: ArchiveFormat::TarGz,
            entries: selected.len(),
            top_level,
        })
    }
}

/// Graph environment with a fixed, always-available client environment.
pub struct StaticEnvironment {
    pub events: EventSender,
    pub cancellation: CancellationToken,
    pub client_env: Option<ClientEnvironment>,
}

impl StaticEnvironment {
    pub fn new() -> (Self, UnboundedReceiver<RepofetchEvent>) {
        let (events, receiver) = EventSender::channel();
        (
            Self {
                events,
                cancellation: CancellationToken::new(),
                client_env: Some(ClientEnvironment::new()),
            },
            receiver,
        )
    }
}

impl GraphEnvironment for StaticEnvironment {
    fn events(&self) -> &EventSender {
        &self.events
    }

    fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    fn client_environment(&self, _names: &[&str]) -> Option<ClientEnvironment> {
        self.client_env.clone()
    }
}

/// A temporary output base plus a node wired to the given collaborators.
pub struct Harness {
    pub temp: TempDir,
    pub layout: ExternalLayout,
    pub node: RepositoryNode,
}

impl Harness {
    pub fn new(downloader: Arc<dyn Downloader>, decompressor: Arc<dyn Decompressor>) -> Self {
        let temp = TempDir::new().unwrap();
        let layout = ExternalLayout::new(temp.path()).unwrap();
        let fetcher = RepositoryFetcher::new(downloader, decompressor, layout.clone());
        Self {
            temp,
            layout,
            node: RepositoryNode::new(Arc::new(fetcher)),
        }
    }
}

pub fn png_rule() -> RepositoryRule {
    RepositoryRule::http_archive("png")
        .with_attribute("url", "http://x/png.tar.gz")
        .with_attribute("sha256", VALID_SHA256)
}

/// Sorted relative paths of every file and directory under `root`.
pub fn tree(root: &Path) -> Vec<String> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let relative = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
            if path.is_dir() {
                out.push(format!("{relative}/"));
                walk(root, &path, out);
            } else {
                out.push(relative);
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}

pub fn drain(receiver: &mut UnboundedReceiver<RepofetchEvent>) -> Vec<RepofetchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
