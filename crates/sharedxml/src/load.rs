//! Load orchestration: file → shared document → encoded, observed tree
//!
//! ```text
//! Idle → ResolvingDocumentId → AwaitingDataObject → Encoding → Subscribed
//!                    └──────────────┴───────────────────┴──→ Failed
//! ```
//!
//! A file loaded twice with the same mode returns the first document id
//! without re-encoding, including when both loads run concurrently: the cache
//! is checked again under the session lock before a new session is
//! registered. Changing the mode always creates a new session.
//!
//! Encoding runs on tokio's blocking pool in both modes; sync loads await it.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::document::SharedDocument;
use crate::encode::EncodeStats;
use crate::error::{Error, ErrorKind, Span};
use crate::render::render;
use crate::service::{acquire_or_create, DocumentService, LocalDocumentService};
use crate::store::MapId;
use crate::subscribe::Subscriptions;
use crate::xml;

/// Identifier of a loaded document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// `load_document` returns once the tree is fully encoded
    Sync,
    /// `load_document` returns once the session exists; encoding runs in the
    /// background and is observable through change notifications
    Async,
}

impl LoadMode {
    pub const fn from_async_flag(load_async: bool) -> Self {
        if load_async {
            Self::Async
        } else {
            Self::Sync
        }
    }
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sync => "synchronously",
            Self::Async => "asynchronously",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    Idle,
    ResolvingDocumentId,
    AwaitingDataObject,
    Encoding,
    Subscribed,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodeStatus {
    Pending,
    Done,
    Failed,
}

/// Failures reported to whoever asked for the load; the messages are meant
/// for end users.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("File not specified")]
    FileNotSpecified,
    #[error("Failed to load file. Ensure file exists under the data folder.")]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to get document {id}")]
    Acquisition {
        id: DocumentId,
        #[source]
        source: Error,
    },
    #[error("Failed to load file {}", path.display())]
    Encoding {
        path: PathBuf,
        #[source]
        source: Error,
    },
    #[error("Document {0} is no longer available")]
    SessionClosed(DocumentId),
    #[error("Unknown document {0}")]
    UnknownDocument(String),
}

/// One loaded document and everything observing it
pub struct DocumentSession {
    id: DocumentId,
    source_file: PathBuf,
    mode: LoadMode,
    document: Arc<SharedDocument>,
    root: MapId,
    state: RwLock<LoadState>,
    encode_status: watch::Sender<EncodeStatus>,
    changes: Arc<watch::Sender<u64>>,
    subscriptions: Subscriptions,
}

impl DocumentSession {
    fn new(
        id: DocumentId,
        source_file: PathBuf,
        mode: LoadMode,
        document: Arc<SharedDocument>,
        root: MapId,
    ) -> Self {
        let (changes, _) = watch::channel(0u64);
        let changes = Arc::new(changes);
        let counter = Arc::clone(&changes);
        let subscriptions = Subscriptions::new(Arc::clone(document.store()), move || {
            counter.send_modify(|n| *n += 1);
        });
        let (encode_status, _) = watch::channel(EncodeStatus::Pending);

        Self {
            id,
            source_file,
            mode,
            document,
            root,
            state: RwLock::new(LoadState::AwaitingDataObject),
            encode_status,
            changes,
            subscriptions,
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    pub fn document(&self) -> &Arc<SharedDocument> {
        &self.document
    }

    pub fn root(&self) -> MapId {
        self.root
    }

    pub fn state(&self) -> LoadState {
        *self.state.read()
    }

    fn enter(&self, state: LoadState) {
        debug!(document = %self.id, ?state, "session state");
        *self.state.write() = state;
    }

    pub fn encode_status(&self) -> EncodeStatus {
        *self.encode_status.borrow()
    }

    /// Resolves once encoding finished, successfully or not
    pub async fn wait_encoded(&self) -> EncodeStatus {
        let mut rx = self.encode_status.subscribe();
        loop {
            let status = *rx.borrow_and_update();
            if status != EncodeStatus::Pending {
                return status;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }

    /// Counter bumped on every change anywhere in the tree
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    /// Current rendering of the tree
    pub fn render(&self) -> Vec<String> {
        render(self.document.store().as_ref(), self.root, 0)
    }

    fn abandon(&self) {
        self.enter(LoadState::Failed);
        self.encode_status.send_replace(EncodeStatus::Failed);
    }

    fn encode(&self, xml: &str, config: xml::Config) -> Result<EncodeStats, Error> {
        self.enter(LoadState::Encoding);
        match self.document.load_xml(xml, config) {
            Ok(stats) => {
                self.enter(LoadState::Subscribed);
                self.encode_status.send_replace(EncodeStatus::Done);
                Ok(stats)
            }
            Err(err) => {
                error!(document = %self.id, "failed to load xml file {}: {err}", self.source_file.display());
                self.abandon();
                Err(err)
            }
        }
    }
}

impl fmt::Debug for DocumentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSession")
            .field("id", &self.id)
            .field("source_file", &self.source_file)
            .field("mode", &self.mode)
            .field("root", &self.root)
            .field("state", &self.state())
            .finish()
    }
}

/// Entry point that turns file names into observed shared documents
pub struct Loader<S = LocalDocumentService> {
    config: Config,
    service: Arc<S>,
    sessions: Mutex<HashMap<DocumentId, Arc<DocumentSession>>>,
    loads: AtomicU64,
}

impl<S: DocumentService + 'static> Loader<S> {
    pub fn new(config: Config, service: Arc<S>) -> Self {
        Self {
            config,
            service,
            sessions: Mutex::new(HashMap::new()),
            loads: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Number of encodes started, cache hits excluded
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn session(&self, id: DocumentId) -> Option<Arc<DocumentSession>> {
        self.sessions.lock().get(&id).cloned()
    }

    pub fn sessions(&self) -> Vec<Arc<DocumentSession>> {
        self.sessions.lock().values().cloned().collect()
    }

    /// Render the tree of a loaded document
    pub fn render(&self, id: DocumentId) -> Result<Vec<String>, LoadError> {
        self.session(id)
            .map(|session| session.render())
            .ok_or_else(|| LoadError::UnknownDocument(id.to_string()))
    }

    fn cached(&self, path: &Path, mode: LoadMode) -> Option<Arc<DocumentSession>> {
        find_cached(&self.sessions.lock(), path, mode)
    }

    /// Load `file` (relative to the data directory) and return its document id
    #[instrument(skip(self))]
    pub async fn load_document(&self, file: &str, mode: LoadMode) -> Result<DocumentId, LoadError> {
        let file = file.trim();
        if file.is_empty() {
            return Err(LoadError::FileNotSpecified);
        }

        debug!(state = ?LoadState::ResolvingDocumentId, "session state");
        let path = self.config.resolve_source(file).ok_or_else(|| LoadError::FileUnreadable {
            path: PathBuf::from(file),
            source: io::Error::new(io::ErrorKind::InvalidInput, "outside the data directory"),
        })?;
        if let Some(session) = self.cached(&path, mode) {
            return reuse(session).await;
        }

        info!("reading xml file {}", path.display());
        let started = Instant::now();
        let content = tokio::fs::read_to_string(&path).await.map_err(|source| {
            error!("failed to read xml file {}: {source}", path.display());
            LoadError::FileUnreadable {
                path: path.clone(),
                source,
            }
        })?;
        info!("read xml file in {} ms", started.elapsed().as_millis());

        let id = DocumentId::new();
        let registered = {
            // a concurrent load of the same file may have registered while
            // the file was being read
            let mut sessions = self.sessions.lock();
            match find_cached(&sessions, &path, mode) {
                Some(existing) => Err(existing),
                None => {
                    debug!(document = %id, state = ?LoadState::AwaitingDataObject, "session state");
                    let document = acquire_or_create(self.service.as_ref(), id)
                        .map_err(|source| LoadError::Acquisition { id, source })?;
                    let root = document
                        .create_tree_root()
                        .map_err(|source| LoadError::Acquisition { id, source })?;
                    let session =
                        Arc::new(DocumentSession::new(id, path.clone(), mode, document, root));
                    sessions.insert(id, Arc::clone(&session));
                    Ok(session)
                }
            }
        };
        let session = match registered {
            Ok(session) => session,
            Err(existing) => return reuse(existing).await,
        };

        if let Err(err) = session.subscriptions.attach(session.root) {
            error!(document = %id, "failed to subscribe to tree: {err}");
            session.enter(LoadState::Failed);
            self.sessions.lock().remove(&id);
            return Err(LoadError::SessionClosed(id));
        }

        self.loads.fetch_add(1, Ordering::SeqCst);
        let parser = self.config.parser;
        match mode {
            LoadMode::Sync => {
                info!("loading xml synchronously");
                let worker = Arc::clone(&session);
                let encoded = tokio::task::spawn_blocking(move || worker.encode(&content, parser)).await;
                let source = match encoded {
                    Ok(Ok(_)) => return Ok(id),
                    Ok(Err(source)) => source,
                    Err(join) => {
                        error!(document = %id, "encoding task failed: {join}");
                        session.abandon();
                        Error::with_message(ErrorKind::Storage, Span::empty(), join.to_string())
                    }
                };
                self.sessions.lock().remove(&id);
                return Err(LoadError::Encoding { path, source });
            }
            LoadMode::Async => {
                info!("starting to load xml asynchronously");
                session.enter(LoadState::Encoding);
                let background = Arc::clone(&session);
                // the blocking task starts from inside the spawned one, so
                // nothing is encoded before the caller has its id
                tokio::spawn(async move {
                    let worker = Arc::clone(&background);
                    let encoded = tokio::task::spawn_blocking(move || {
                        // failures are recorded on the session and logged
                        let _ = worker.encode(&content, parser);
                    })
                    .await;
                    if let Err(join) = encoded {
                        error!(document = %background.id, "encoding task failed: {join}");
                        background.abandon();
                    }
                });
            }
        }

        Ok(id)
    }
}

/// Cache hit; a sync load only returns once the earlier encode finished
async fn reuse(session: Arc<DocumentSession>) -> Result<DocumentId, LoadError> {
    debug!("file already loaded as {}", session.id);
    if session.mode == LoadMode::Sync && session.wait_encoded().await == EncodeStatus::Failed {
        return Err(LoadError::SessionClosed(session.id));
    }
    Ok(session.id)
}

fn find_cached(
    sessions: &HashMap<DocumentId, Arc<DocumentSession>>,
    path: &Path,
    mode: LoadMode,
) -> Option<Arc<DocumentSession>> {
    let key = path.to_string_lossy().to_lowercase();
    sessions
        .values()
        .find(|session| {
            session.mode == mode
                && session.state() != LoadState::Failed
                && session.source_file.to_string_lossy().to_lowercase() == key
        })
        .cloned()
}

impl<S> fmt::Debug for Loader<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("config", &self.config)
            .field("sessions", &self.sessions.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_round_trips() {
        let id = DocumentId::new();
        assert_eq!(id.to_string().parse::<DocumentId>().ok(), Some(id));
        assert!("not-a-uuid".parse::<DocumentId>().is_err());
    }

    #[test]
    fn test_document_ids_are_unique() {
        assert_ne!(DocumentId::new(), DocumentId::new());
    }

    #[test]
    fn test_mode_from_flag() {
        assert_eq!(LoadMode::from_async_flag(true), LoadMode::Async);
        assert_eq!(LoadMode::from_async_flag(false), LoadMode::Sync);
    }

    #[test]
    fn test_load_error_messages() {
        assert_eq!(LoadError::FileNotSpecified.to_string(), "File not specified");
        let err = LoadError::FileUnreadable {
            path: PathBuf::from("missing.xml"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().starts_with("Failed to load file."));
    }

    #[tokio::test]
    async fn test_empty_file_name() {
        let loader = Loader::new(Config::default(), Arc::new(LocalDocumentService::default()));
        assert!(matches!(
            loader.load_document("  ", LoadMode::Sync).await,
            Err(LoadError::FileNotSpecified)
        ));
    }
}
