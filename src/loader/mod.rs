//! Asynchronous model loading.
//!
//! A [`ModelLoader`] turns a URL into a [`PendingModel`]: a channel the
//! frame step polls once per frame. The fetch and decode run elsewhere (a
//! named worker thread natively, a `fetch` future on the web) and never
//! touch scene or GPU state. Cancelling a pending model sets a shared flag;
//! the producer checks it before decoding and before delivering, and
//! anything it still sends lands in a dropped receiver.

pub mod gltf;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;

use rustc_hash::FxHashMap;

pub use self::gltf::decode_gltf;
use crate::error::SceneryError;
use crate::scene::ModelAsset;

/// Why a model could not be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetLoadError {
    /// The bytes could not be retrieved.
    Fetch {
        /// Requested location.
        url: String,
        /// Transport-level reason.
        reason: String,
    },
    /// The bytes are not a readable glTF document.
    Decode(String),
    /// The document has no triangle geometry in its scene.
    NoGeometry,
    /// The producer stopped without delivering a result.
    Interrupted,
}

impl fmt::Display for AssetLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch { url, reason } => {
                write!(f, "failed to fetch {url}: {reason}")
            }
            Self::Decode(msg) => write!(f, "failed to decode model: {msg}"),
            Self::NoGeometry => write!(f, "model has no triangle geometry"),
            Self::Interrupted => {
                write!(f, "model loader stopped without a result")
            }
        }
    }
}

impl std::error::Error for AssetLoadError {}

/// Message from a load producer to its [`PendingModel`].
#[derive(Debug)]
pub enum LoadMessage {
    /// Download progress in `[0, 1]`.
    Progress(f32),
    /// Final result.
    Finished(Result<ModelAsset, AssetLoadError>),
}

/// Result of polling a [`PendingModel`].
#[derive(Debug)]
pub enum LoadStatus {
    /// Nothing final yet.
    Pending,
    /// The model decoded successfully.
    Ready(ModelAsset),
    /// Fetch or decode failed.
    Failed(AssetLoadError),
    /// The load was cancelled; nothing will be delivered.
    Cancelled,
}

/// Receiving end of one model load.
pub struct PendingModel {
    url: String,
    receiver: Receiver<LoadMessage>,
    cancelled: Arc<AtomicBool>,
    progress: f32,
}

/// Producing end of one model load.
#[derive(Clone)]
pub struct LoadReporter {
    sender: Sender<LoadMessage>,
    cancelled: Arc<AtomicBool>,
}

impl PendingModel {
    /// Create a connected pending model and reporter for `url`.
    #[must_use]
    pub fn channel(url: &str) -> (Self, LoadReporter) {
        let (sender, receiver) = mpsc::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        (
            Self {
                url: url.to_owned(),
                receiver,
                cancelled: Arc::clone(&cancelled),
                progress: 0.0,
            },
            LoadReporter { sender, cancelled },
        )
    }

    /// Drain delivered messages without blocking.
    ///
    /// After a terminal status the producer is gone, so later polls report
    /// [`AssetLoadError::Interrupted`].
    pub fn poll(&mut self) -> LoadStatus {
        if self.is_cancelled() {
            return LoadStatus::Cancelled;
        }
        loop {
            match self.receiver.try_recv() {
                Ok(LoadMessage::Progress(p)) => {
                    self.progress = p.clamp(0.0, 1.0);
                }
                Ok(LoadMessage::Finished(Ok(asset))) => {
                    self.progress = 1.0;
                    return LoadStatus::Ready(asset);
                }
                Ok(LoadMessage::Finished(Err(e))) => {
                    return LoadStatus::Failed(e);
                }
                Err(TryRecvError::Empty) => return LoadStatus::Pending,
                Err(TryRecvError::Disconnected) => {
                    return LoadStatus::Failed(AssetLoadError::Interrupted);
                }
            }
        }
    }

    /// Stop the load. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether [`cancel`](Self::cancel) was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Last reported download progress.
    #[must_use]
    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Requested location.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl LoadReporter {
    /// Whether the receiving side cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Report download progress.
    pub fn progress(&self, fraction: f32) {
        let _ = self.sender.send(LoadMessage::Progress(fraction));
    }

    /// Deliver the final result unless the load was cancelled.
    pub fn finish(&self, result: Result<ModelAsset, AssetLoadError>) {
        if self.is_cancelled() {
            log::debug!("model load cancelled, dropping result");
            return;
        }
        // The receiver may already be gone after detach.
        let _ = self.sender.send(LoadMessage::Finished(result));
    }

    /// Decode fetched bytes and deliver the outcome, checking for
    /// cancellation before the decode.
    pub fn decode_and_finish(&self, fetched: Result<Vec<u8>, AssetLoadError>) {
        if self.is_cancelled() {
            log::debug!("model load cancelled before decode");
            return;
        }
        self.finish(fetched.and_then(|bytes| decode_gltf(&bytes)));
    }
}

/// Starts model loads.
pub trait ModelLoader {
    /// Begin loading `url`.
    ///
    /// # Errors
    ///
    /// Fails only when the load cannot be started at all (e.g. the worker
    /// thread cannot be spawned). Fetch and decode failures arrive through
    /// the returned [`PendingModel`].
    fn load(&self, url: &str) -> Result<PendingModel, SceneryError>;
}

/// Retrieves raw asset bytes.
pub trait AssetFetcher: Send + Sync + 'static {
    /// Fetch `url`, reporting progress in `[0, 1]` as bytes arrive.
    ///
    /// # Errors
    ///
    /// Returns [`AssetLoadError::Fetch`] when the bytes are unavailable.
    fn fetch(
        &self,
        url: &str,
        progress: &mut dyn FnMut(f32),
    ) -> Result<Vec<u8>, AssetLoadError>;
}

/// Reads assets from a root directory. `file://` URLs are taken as
/// absolute paths.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    /// Fetcher resolving relative URLs against `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        url.strip_prefix("file://").map_or_else(
            || self.root.join(url.trim_start_matches('/')),
            PathBuf::from,
        )
    }
}

impl AssetFetcher for FileFetcher {
    fn fetch(&self, url: &str, progress: &mut dyn FnMut(f32)) -> Result<Vec<u8>, AssetLoadError> {
        let path = self.resolve(url);
        let bytes = std::fs::read(&path).map_err(|e| AssetLoadError::Fetch {
            url: url.to_owned(),
            reason: format!("{}: {e}", path.display()),
        })?;
        progress(1.0);
        Ok(bytes)
    }
}

/// Serves assets from memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    assets: FxHashMap<String, Arc<[u8]>>,
}

impl MemoryFetcher {
    /// Empty fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` under `url`.
    #[must_use]
    pub fn with_asset(mut self, url: &str, bytes: impl Into<Arc<[u8]>>) -> Self {
        let _ = self.assets.insert(url.to_owned(), bytes.into());
        self
    }
}

impl AssetFetcher for MemoryFetcher {
    fn fetch(&self, url: &str, progress: &mut dyn FnMut(f32)) -> Result<Vec<u8>, AssetLoadError> {
        let bytes = self.assets.get(url).ok_or_else(|| AssetLoadError::Fetch {
            url: url.to_owned(),
            reason: "not found".to_owned(),
        })?;
        progress(1.0);
        Ok(bytes.to_vec())
    }
}

/// Downloads assets over HTTP(S).
#[cfg(feature = "net")]
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    base: Option<String>,
}

#[cfg(feature = "net")]
impl HttpFetcher {
    /// Fetcher for absolute URLs only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetcher resolving relative URLs against `base`.
    #[must_use]
    pub fn with_base(base: &str) -> Self {
        Self {
            base: Some(base.trim_end_matches('/').to_owned()),
        }
    }

    fn resolve(&self, url: &str) -> String {
        match &self.base {
            Some(base) if !url.contains("://") => {
                format!("{base}/{}", url.trim_start_matches('/'))
            }
            _ => url.to_owned(),
        }
    }
}

#[cfg(feature = "net")]
impl AssetFetcher for HttpFetcher {
    fn fetch(&self, url: &str, progress: &mut dyn FnMut(f32)) -> Result<Vec<u8>, AssetLoadError> {
        use std::io::Read;

        let resolved = self.resolve(url);
        let fetch_err = |reason: String| AssetLoadError::Fetch {
            url: resolved.clone(),
            reason,
        };
        let response = ureq::get(&resolved)
            .call()
            .map_err(|e| fetch_err(e.to_string()))?;
        let total = response
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());

        let mut reader = response.into_body().into_reader();
        let mut bytes = Vec::with_capacity(total.unwrap_or(0));
        let mut chunk = [0u8; 16 * 1024];
        loop {
            let n = reader
                .read(&mut chunk)
                .map_err(|e| fetch_err(e.to_string()))?;
            if n == 0 {
                break;
            }
            bytes.extend_from_slice(&chunk[..n]);
            if let Some(total) = total.filter(|t| *t > 0) {
                progress((bytes.len() as f32 / total as f32).min(1.0));
            }
        }
        progress(1.0);
        Ok(bytes)
    }
}

/// Loads models on a named background thread per request.
pub struct ThreadedModelLoader<F: AssetFetcher> {
    fetcher: Arc<F>,
}

impl<F: AssetFetcher> ThreadedModelLoader<F> {
    /// Loader using `fetcher` for every request.
    #[must_use]
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
        }
    }
}

impl ThreadedModelLoader<FileFetcher> {
    /// Loader reading from `root` on disk.
    #[must_use]
    pub fn from_dir(root: &Path) -> Self {
        Self::new(FileFetcher::new(root))
    }
}

impl<F: AssetFetcher> ModelLoader for ThreadedModelLoader<F> {
    fn load(&self, url: &str) -> Result<PendingModel, SceneryError> {
        let (pending, reporter) = PendingModel::channel(url);
        let fetcher = Arc::clone(&self.fetcher);
        let url = url.to_owned();
        let _detached = std::thread::Builder::new()
            .name("model-loader".into())
            .spawn(move || {
                let fetched = fetcher.fetch(&url, &mut |p| reporter.progress(p));
                if let Err(e) = &fetched {
                    log::debug!("fetch of {url} failed: {e}");
                }
                reporter.decode_and_finish(fetched);
            })
            .map_err(SceneryError::ThreadSpawn)?;
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::loader::gltf::test_assets;

    fn wait(pending: &mut PendingModel) -> LoadStatus {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            match pending.poll() {
                LoadStatus::Pending if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(2));
                }
                status => return status,
            }
        }
    }

    #[test]
    fn threaded_loader_delivers_decoded_model() {
        let loader = ThreadedModelLoader::new(
            MemoryFetcher::new()
                .with_asset("tri.glb", test_assets::triangle_glb(true)),
        );
        let mut pending = loader.load("tri.glb").unwrap();
        match wait(&mut pending) {
            LoadStatus::Ready(asset) => {
                assert_eq!(asset.mesh.triangle_count(), 1);
                assert_eq!(asset.clips.len(), 1);
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(pending.progress(), 1.0);
    }

    #[test]
    fn missing_asset_fails_with_fetch_error() {
        let loader = ThreadedModelLoader::new(MemoryFetcher::new());
        let mut pending = loader.load("nope.glb").unwrap();
        assert!(matches!(
            wait(&mut pending),
            LoadStatus::Failed(AssetLoadError::Fetch { .. })
        ));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let loader = ThreadedModelLoader::new(
            MemoryFetcher::new().with_asset("bad.glb", b"not a model".to_vec()),
        );
        let mut pending = loader.load("bad.glb").unwrap();
        assert!(matches!(
            wait(&mut pending),
            LoadStatus::Failed(AssetLoadError::Decode(_))
        ));
    }

    #[test]
    fn cancelled_reporter_delivers_nothing() {
        let (mut pending, reporter) = PendingModel::channel("x.glb");
        pending.cancel();
        pending.cancel();
        reporter.decode_and_finish(Ok(test_assets::triangle_glb(false)));
        assert!(matches!(pending.poll(), LoadStatus::Cancelled));
        assert!(pending.receiver.try_recv().is_err());
    }

    #[test]
    fn reporter_outliving_receiver_is_silent() {
        let (pending, reporter) = PendingModel::channel("x.glb");
        drop(pending);
        reporter.progress(0.5);
        reporter.finish(Err(AssetLoadError::NoGeometry));
    }

    #[test]
    fn progress_is_tracked_until_finish() {
        let (mut pending, reporter) = PendingModel::channel("x.glb");
        reporter.progress(0.25);
        assert!(matches!(pending.poll(), LoadStatus::Pending));
        assert_eq!(pending.progress(), 0.25);
        reporter.finish(Err(AssetLoadError::NoGeometry));
        drop(reporter);
        assert!(matches!(
            pending.poll(),
            LoadStatus::Failed(AssetLoadError::NoGeometry)
        ));
        assert!(matches!(
            pending.poll(),
            LoadStatus::Failed(AssetLoadError::Interrupted)
        ));
    }

    #[test]
    fn file_fetcher_resolves_against_root() {
        let dir = std::env::temp_dir().join("scenery-file-fetcher");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.bin"), [1u8, 2, 3]).unwrap();

        let fetcher = FileFetcher::new(&dir);
        let mut last = 0.0;
        let bytes = fetcher.fetch("/a.bin", &mut |p| last = p).unwrap();
        assert_eq!(bytes, [1, 2, 3]);
        assert_eq!(last, 1.0);

        let url = format!("file://{}", dir.join("a.bin").display());
        assert_eq!(fetcher.fetch(&url, &mut |_| {}).unwrap(), [1, 2, 3]);
        assert!(fetcher.fetch("missing.bin", &mut |_| {}).is_err());
    }
}
