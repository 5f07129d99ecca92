//! Document acquisition

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info};

use crate::document::SharedDocument;
use crate::error::{Error, ErrorKind, Result, Span};
use crate::load::DocumentId;
use crate::store::{MemoryStore, SharedStore};

/// Source of shared documents
pub trait DocumentService: Send + Sync {
    /// Open document `id`; with `create` a missing document is created instead
    /// of reported as not found.
    fn acquire(&self, id: DocumentId, create: bool) -> Result<Arc<SharedDocument>>;

    fn ids(&self) -> Vec<DocumentId>;
}

/// Assume the document exists, and create it if that fails. Two attempts, no loop.
pub fn acquire_or_create(
    service: &dyn DocumentService,
    id: DocumentId,
) -> Result<Arc<SharedDocument>> {
    match service.acquire(id, false) {
        Ok(document) => {
            info!("document already exists for id {id}");
            return Ok(document);
        }
        Err(err) => info!("document not found for id {id} ({err}), creating it"),
    }

    match service.acquire(id, true) {
        Ok(document) => {
            info!("document created for id {id}");
            Ok(document)
        }
        Err(err) => {
            error!("failed to create document {id}: {err}");
            Err(Error::with_message(
                ErrorKind::Acquisition {
                    document: id.to_string(),
                },
                Span::empty(),
                format!("could not acquire document {id}: {err}"),
            ))
        }
    }
}

/// Documents living in this process, all backed by one [`MemoryStore`]
pub struct LocalDocumentService {
    store: Arc<dyn SharedStore>,
    documents: Mutex<HashMap<DocumentId, Arc<SharedDocument>>>,
}

impl Default for LocalDocumentService {
    fn default() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }
}

impl LocalDocumentService {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self {
            store,
            documents: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn SharedStore> {
        &self.store
    }
}

impl DocumentService for LocalDocumentService {
    fn acquire(&self, id: DocumentId, create: bool) -> Result<Arc<SharedDocument>> {
        let mut documents = self.documents.lock();
        if let Some(document) = documents.get(&id) {
            return Ok(Arc::clone(document));
        }
        if !create {
            return Err(Error::not_found(format!("document {id}")));
        }

        let document = Arc::new(SharedDocument::create(id, Arc::clone(&self.store))?);
        documents.insert(id, Arc::clone(&document));
        Ok(document)
    }

    fn ids(&self) -> Vec<DocumentId> {
        self.documents.lock().keys().copied().collect()
    }
}

impl std::fmt::Debug for LocalDocumentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDocumentService")
            .field("documents", &self.documents.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    struct Unavailable;

    impl DocumentService for Unavailable {
        fn acquire(&self, id: DocumentId, _create: bool) -> Result<Arc<SharedDocument>> {
            Err(Error::not_found(format!("document {id}")))
        }

        fn ids(&self) -> Vec<DocumentId> {
            Vec::new()
        }
    }

    #[test]
    fn test_acquire_without_create_fails() {
        let service = LocalDocumentService::default();
        let err = service.acquire(DocumentId::new(), false).err();
        assert_eq!(err.map(|e| e.category()), Some(ErrorCategory::NotFound));
    }

    #[test]
    fn test_acquire_or_create_then_reuse() -> Result<()> {
        let service = LocalDocumentService::default();
        let id = DocumentId::new();
        let created = acquire_or_create(&service, id)?;
        let again = acquire_or_create(&service, id)?;
        assert!(Arc::ptr_eq(&created, &again));
        assert_eq!(service.ids(), vec![id]);
        Ok(())
    }

    #[test]
    fn test_creation_failure_is_acquisition_error() {
        let err = acquire_or_create(&Unavailable, DocumentId::new()).err();
        assert_eq!(err.map(|e| e.category()), Some(ErrorCategory::Acquisition));
    }
}
