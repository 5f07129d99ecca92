//! Shared document holding one encoded XML tree
//!
//! Layout inside the store:
//!
//! ```text
//! directory ──"xml"──▶ xml map ──"map"──▶ tree root record
//! ```
//!
//! The directory exists from creation. The tree root is created by whoever
//! loads the XML and may reach other participants later, which is why readers
//! poll for it with [`SharedDocument::wait_tree_root`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{error, info};

use crate::encode::{try_encode, EncodeStats};
use crate::error::{Error, ErrorKind, Result};
use crate::load::DocumentId;
use crate::store::{MapId, SharedStore, Value};
use crate::xml;

const XML_KEY: &str = "xml";
const TREE_KEY: &str = "map";

pub struct SharedDocument {
    id: DocumentId,
    store: Arc<dyn SharedStore>,
    directory: MapId,
    tree_root: Mutex<Option<MapId>>,
    loaded: AtomicBool,
}

impl SharedDocument {
    /// Create a new document and run its first-time initialization
    pub fn create(id: DocumentId, store: Arc<dyn SharedStore>) -> Result<Self> {
        let directory = store.create_map()?;
        let document = Self::open(id, store, directory);
        document.initialize_first_time()?;
        Ok(document)
    }

    /// Wrap an existing directory map
    pub fn open(id: DocumentId, store: Arc<dyn SharedStore>, directory: MapId) -> Self {
        Self {
            id,
            store,
            directory,
            tree_root: Mutex::new(None),
            loaded: AtomicBool::new(false),
        }
    }

    fn initialize_first_time(&self) -> Result<()> {
        let xml_map = self.store.create_map()?;
        self.store
            .set(self.directory, XML_KEY, Value::from(xml_map))
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn store(&self) -> &Arc<dyn SharedStore> {
        &self.store
    }

    pub fn directory(&self) -> MapId {
        self.directory
    }

    fn xml_map(&self) -> Result<MapId> {
        self.store
            .get(self.directory, XML_KEY)?
            .and_then(|v| v.as_map())
            .ok_or_else(|| Error::not_found(format!("xml map of document {}", self.id)))
    }

    /// Current tree root, `None` while it has not been created or replicated
    pub fn tree_root(&self) -> Result<Option<MapId>> {
        if let Some(root) = *self.tree_root.lock() {
            return Ok(Some(root));
        }

        let root = self
            .store
            .get(self.xml_map()?, TREE_KEY)?
            .and_then(|v| v.as_map())
            .filter(|root| self.store.contains_map(*root));
        if root.is_some() {
            *self.tree_root.lock() = root;
        }
        Ok(root)
    }

    /// Return the tree root, creating an empty one if there is none yet
    pub fn create_tree_root(&self) -> Result<MapId> {
        if let Some(root) = self.tree_root()? {
            return Ok(root);
        }

        let root = self.store.create_map()?;
        self.store
            .set(self.xml_map()?, TREE_KEY, Value::from(root))?;
        *self.tree_root.lock() = Some(root);
        self.loaded.store(false, Ordering::SeqCst);
        Ok(root)
    }

    /// Poll for the tree root every `poll_interval` until it appears or
    /// `timeout` elapses. `None` waits without a bound.
    pub async fn wait_tree_root(
        &self,
        poll_interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<MapId> {
        if let Some(root) = self.tree_root()? {
            return Ok(root);
        }

        info!(document = %self.id, "waiting for tree root");
        let started = Instant::now();
        loop {
            tokio::time::sleep(poll_interval).await;
            if let Some(root) = self.tree_root()? {
                info!(
                    document = %self.id,
                    "got tree root in {} ms",
                    started.elapsed().as_millis()
                );
                return Ok(root);
            }
            if let Some(timeout) = timeout {
                if started.elapsed() >= timeout {
                    error!(document = %self.id, "timed out waiting for tree root");
                    return Err(Error::unpositioned(ErrorKind::Timeout {
                        waited_ms: started.elapsed().as_millis(),
                    }));
                }
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Encode `xml` into the tree root. A root that was already loaded is left
    /// untouched.
    pub fn load_xml(&self, xml: &str, config: xml::Config) -> Result<EncodeStats> {
        if self.is_loaded() {
            return Ok(EncodeStats::default());
        }
        let root = self
            .tree_root()?
            .ok_or_else(|| Error::not_found(format!("tree root of document {}", self.id)))?;

        info!(document = %self.id, "loading xml into {root}");
        self.loaded.store(true, Ordering::SeqCst);
        try_encode(self.store.as_ref(), xml, root, config)
    }
}

impl std::fmt::Debug for SharedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedDocument")
            .field("id", &self.id)
            .field("directory", &self.directory)
            .field("tree_root", &*self.tree_root.lock())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
