//! Per-collection handle.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use log::{debug, info};
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};

use crate::column::ColumnReader;
use crate::document::StoredDocuments;
use crate::error::{FoliumError, Result};
use crate::index::config::IndexConfig;
use crate::index::files::CollectionFiles;
use crate::index::search::SearchSession;
use crate::index::validate::Validator;
use crate::index::write::WriteSession;
use crate::model::Model;
use crate::storage::{Storage, StorageLock};

/// One line of the key map file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeyEntry {
    field: String,
    key_id: u64,
}

/// Owns everything shared by the sessions of one collection: storage, file
/// names, the field-to-key map and the single-writer guard.
#[derive(Debug)]
pub struct IndexHandle {
    storage: Arc<dyn Storage>,
    files: CollectionFiles,
    config: IndexConfig,
    model: Arc<dyn Model>,
    keys: RwLock<BTreeMap<String, u64>>,
    writer: Mutex<()>,
}

/// Exclusive write access to a collection: the in-process guard plus the
/// storage lock when locking is enabled.
pub(crate) struct WriteGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    _lock: Option<Box<dyn StorageLock>>,
}

impl IndexHandle {
    /// Open a collection, loading its key map.
    pub fn open(
        storage: Arc<dyn Storage>,
        collection: &str,
        config: IndexConfig,
        model: Arc<dyn Model>,
    ) -> Result<Self> {
        config.validate()?;
        check_collection_name(collection)?;

        let files = CollectionFiles::new(collection);
        let keys = load_keys(storage.as_ref(), &files.keys())?;
        debug!("opened collection {collection} with {} keys", keys.len());

        Ok(Self {
            storage,
            files,
            config,
            model,
            keys: RwLock::new(keys),
            writer: Mutex::new(()),
        })
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn files(&self) -> &CollectionFiles {
        &self.files
    }

    pub fn collection(&self) -> &str {
        self.files.collection()
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    /// Key ID of a field, if the field has ever been written.
    pub fn key_id(&self, field: &str) -> Option<u64> {
        self.keys.read().get(field).copied()
    }

    /// Key ID of a field, assigning and persisting a new one on first use.
    pub fn key_id_or_create(&self, field: &str) -> Result<u64> {
        if let Some(key_id) = self.key_id(field) {
            return Ok(key_id);
        }

        let mut keys = self.keys.write();
        if let Some(key_id) = keys.get(field) {
            return Ok(*key_id);
        }
        let key_id = keys.len() as u64;
        let entry = KeyEntry {
            field: field.to_string(),
            key_id,
        };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        let mut output = self.storage.create_output_append(&self.files.keys())?;
        std::io::Write::write_all(&mut output, &line)?;
        output.close()?;

        keys.insert(field.to_string(), key_id);
        debug!("assigned key {key_id} to field {field} in {}", self.collection());
        Ok(key_id)
    }

    /// Every known field with its key ID.
    pub fn fields(&self) -> Vec<(String, u64)> {
        self.keys
            .read()
            .iter()
            .map(|(field, key_id)| (field.clone(), *key_id))
            .collect()
    }

    /// Open the committed pages of a column. `None` if the column has never
    /// been committed.
    pub fn open_column(&self, key_id: u64) -> Result<Option<ColumnReader>> {
        let page_index = self.files.page_index(key_id);
        if !self.storage.file_exists(&page_index) {
            return Ok(None);
        }
        ColumnReader::open(
            self.storage.as_ref(),
            key_id,
            &self.files.column_index(key_id),
            &self.files.column_vectors(key_id),
            &page_index,
            self.config.element_width,
        )
        .map(Some)
    }

    /// Open the committed documents.
    pub fn documents(&self) -> Result<StoredDocuments> {
        StoredDocuments::open(
            self.storage.as_ref(),
            &self.files.documents(),
            self.config.document_page_size,
        )
    }

    pub(crate) fn lock_for_write(&self) -> Result<WriteGuard<'_>> {
        let guard = self.writer.try_lock().ok_or_else(|| {
            FoliumError::storage(format!(
                "collection {} already has an open writer",
                self.collection()
            ))
        })?;
        let lock = if self.storage.config().use_locking {
            Some(
                self.storage
                    .lock_manager()
                    .acquire_lock(&self.files.write_lock())?,
            )
        } else {
            None
        };
        Ok(WriteGuard {
            _guard: guard,
            _lock: lock,
        })
    }

    /// Start a write batch. Only one may be open per collection.
    pub fn write_session(&self) -> Result<WriteSession<'_>> {
        WriteSession::new(self, self.lock_for_write()?)
    }

    /// Start a reader over the committed pages.
    pub fn search_session(&self) -> Result<SearchSession<'_>> {
        SearchSession::new(self)
    }

    pub fn validator(&self) -> Validator<'_> {
        Validator::new(self)
    }

    /// Delete every file of the collection.
    pub fn truncate(&self) -> Result<usize> {
        let _write = self.lock_for_write()?;
        let mut keys = self.keys.write();

        let mut deleted = 0;
        for name in self.files.all(keys.values().copied()) {
            if self.storage.file_exists(&name) {
                self.storage.delete_file(&name)?;
                deleted += 1;
            }
        }
        keys.clear();
        info!("truncated {} ({deleted} files)", self.collection());
        Ok(deleted)
    }

    /// Move every file of the collection to `new_collection`.
    pub fn rename(self, new_collection: &str) -> Result<IndexHandle> {
        check_collection_name(new_collection)?;
        let target = CollectionFiles::new(new_collection);
        let renamed = {
            let _write = self.lock_for_write()?;
            let key_ids: Vec<u64> = self.keys.read().values().copied().collect();

            let sources = self.files.all(key_ids.iter().copied());
            let targets = target.all(key_ids.iter().copied());
            if let Some(taken) = targets.iter().find(|name| self.storage.file_exists(name)) {
                return Err(FoliumError::invalid_argument(format!(
                    "cannot rename {} to {new_collection}: {taken} already exists",
                    self.collection()
                )));
            }

            let mut renamed = 0;
            for (source, target) in sources.iter().zip(&targets) {
                if self.storage.file_exists(source) {
                    self.storage.rename_file(source, target)?;
                    renamed += 1;
                }
            }
            renamed
        };

        info!("renamed {} to {new_collection} ({renamed} files)", self.collection());
        IndexHandle::open(
            Arc::clone(&self.storage),
            new_collection,
            self.config.clone(),
            Arc::clone(&self.model),
        )
    }
}

fn check_collection_name(collection: &str) -> Result<()> {
    if collection.is_empty() || collection.contains(['/', '\\']) {
        return Err(FoliumError::invalid_argument(format!(
            "invalid collection name {collection:?}"
        )));
    }
    Ok(())
}

fn load_keys(storage: &dyn Storage, name: &str) -> Result<BTreeMap<String, u64>> {
    let mut keys = BTreeMap::new();
    if !storage.file_exists(name) {
        return Ok(keys);
    }

    let mut text = String::new();
    storage.open_input(name)?.read_to_string(&mut text)?;
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry: KeyEntry = serde_json::from_str(line).map_err(|e| {
            FoliumError::corruption(format!("{name} line {}: {e}", line_no + 1))
        })?;
        keys.insert(entry.field, entry.key_id);
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BagOfCharsModel;
    use crate::storage::MemoryStorage;

    fn handle(storage: &Arc<dyn Storage>, name: &str) -> IndexHandle {
        IndexHandle::open(
            Arc::clone(storage),
            name,
            IndexConfig::default(),
            Arc::new(BagOfCharsModel::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_key_map_persists() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let first = handle(&storage, "books");
        assert_eq!(first.key_id_or_create("title").unwrap(), 0);
        assert_eq!(first.key_id_or_create("body").unwrap(), 1);
        assert_eq!(first.key_id_or_create("title").unwrap(), 0);
        assert_eq!(first.key_id("missing"), None);

        let reopened = handle(&storage, "books");
        assert_eq!(reopened.key_id("body"), Some(1));
        assert_eq!(
            reopened.fields(),
            vec![("body".to_string(), 1), ("title".to_string(), 0)]
        );
    }

    #[test]
    fn test_single_writer() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let handle = handle(&storage, "books");

        let session = handle.write_session().unwrap();
        assert!(handle.write_session().is_err());
        drop(session);
        assert!(handle.write_session().is_ok());
    }

    #[test]
    fn test_invalid_collection_name() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let result = IndexHandle::open(
            storage,
            "../escape",
            IndexConfig::default(),
            Arc::new(BagOfCharsModel::new()),
        );
        assert!(matches!(result, Err(FoliumError::InvalidArgument(_))));
    }

    #[test]
    fn test_open_column_before_commit() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let handle = handle(&storage, "books");
        let key_id = handle.key_id_or_create("title").unwrap();
        assert!(handle.open_column(key_id).unwrap().is_none());
    }
}
