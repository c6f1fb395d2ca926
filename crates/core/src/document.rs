//! Open documents and the table that owns them.

use crate::backend::{DocumentHandle, DocumentSource};
use crate::config::IdentityModel;
use crate::error::{Result, ViewerError};
use crate::geometry::PageGeometry;
use crate::worker::ResidentDocument;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Key under which the single-document model stores its document.
const SINGLE_DOCUMENT_KEY: &str = "";

/// Identifier of an open document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A parsed document: its bytes, the geometry of every page and the backend
/// state kept for it on the render thread.
///
/// The backend state is released when the last `Arc` to the document drops.
#[derive(Debug)]
pub struct Document {
    id: DocumentId,
    source: DocumentSource,
    pages: Vec<PageGeometry>,
    resident: ResidentDocument,
}

impl Document {
    pub fn new(
        id: DocumentId,
        source: DocumentSource,
        pages: Vec<PageGeometry>,
        resident: ResidentDocument,
    ) -> Self {
        Self {
            id,
            source,
            pages,
            resident,
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Backend handle of the open document.
    pub fn handle(&self) -> DocumentHandle {
        self.resident.handle()
    }

    pub fn source(&self) -> &DocumentSource {
        &self.source
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[PageGeometry] {
        &self.pages
    }

    /// Look up a page by its 1-based number.
    pub fn page(&self, number: usize) -> Result<&PageGeometry> {
        number
            .checked_sub(1)
            .and_then(|index| self.pages.get(index))
            .ok_or(ViewerError::OutOfRange {
                index: number,
                page_count: self.pages.len(),
            })
    }
}

/// Snapshot of one open document, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentStats {
    pub id: String,
    pub page_count: usize,
    pub byte_len: usize,
    /// Renders currently holding the document.
    pub in_flight: usize,
}

/// Table of open documents.
///
/// Entries are handed out as `Arc`s: closing a document removes it from the
/// table, and it is freed once the last in-flight render lets go.
#[derive(Debug)]
pub struct DocumentRepository {
    identity: IdentityModel,
    documents: RwLock<HashMap<DocumentId, Arc<Document>>>,
}

impl DocumentRepository {
    pub fn new(identity: IdentityModel) -> Self {
        Self {
            identity,
            documents: RwLock::new(HashMap::new()),
        }
    }

    pub fn identity(&self) -> IdentityModel {
        self.identity
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<DocumentId, Arc<Document>>> {
        self.documents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<DocumentId, Arc<Document>>> {
        self.documents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Turn a caller-supplied identifier into a table key.
    ///
    /// The single-document model ignores the identifier. The keyed model
    /// requires one.
    pub fn resolve_id(&self, id: Option<&str>) -> Result<DocumentId> {
        match self.identity {
            IdentityModel::Single => Ok(DocumentId(SINGLE_DOCUMENT_KEY.to_string())),
            IdentityModel::Keyed => match id {
                Some(id) => Ok(DocumentId(id.to_string())),
                None => Err(ViewerError::InvalidArgument(
                    "documentID is required".to_string(),
                )),
            },
        }
    }

    /// Register a document, replacing any document under the same key. In
    /// the single-document model every other document is closed as well.
    pub fn insert(&self, document: Document) -> Arc<Document> {
        let document = Arc::new(document);
        let mut documents = self.write();
        if self.identity == IdentityModel::Single {
            documents.clear();
        }
        if documents
            .insert(document.id.clone(), Arc::clone(&document))
            .is_some()
        {
            debug!("Replaced document '{}'", document.id);
        }
        document
    }

    /// Take a reference to an open document.
    pub fn acquire(&self, id: &DocumentId) -> Result<Arc<Document>> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| ViewerError::NotFound(id.to_string()))
    }

    /// Remove a document from the table.
    pub fn release(&self, id: &DocumentId) -> Result<()> {
        match self.write().remove(id) {
            Some(_) => Ok(()),
            None => Err(ViewerError::NotFound(id.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Identifiers of all open documents, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().map(|id| id.0.clone()).collect();
        ids.sort();
        ids
    }

    /// Per-document statistics, sorted by identifier.
    pub fn open_documents(&self) -> Vec<DocumentStats> {
        let mut stats: Vec<DocumentStats> = self
            .read()
            .values()
            .map(|document| DocumentStats {
                id: document.id.0.clone(),
                page_count: document.page_count(),
                byte_len: document.source.bytes.len(),
                // one reference is the table's own
                in_flight: Arc::strong_count(document) - 1,
            })
            .collect();
        stats.sort_by(|a, b| a.id.cmp(&b.id));
        stats
    }
}
