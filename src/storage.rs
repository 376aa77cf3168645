use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, warn};
use thiserror::Error;

use crate::tree::Tree;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to write '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize bookmarks: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("storage quota exceeded: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { needed: usize, quota: usize },
}

/// Opaque string store the bookmark tree is persisted into.
pub trait KeyValueStore {
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;
    /// `None` when the key is absent or unreadable.
    fn load(&self, key: &str) -> Option<String>;
    fn clear(&self, key: &str);
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &S {
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).save(key, value)
    }

    fn load(&self, key: &str) -> Option<String> {
        (**self).load(key)
    }

    fn clear(&self, key: &str) {
        (**self).clear(key)
    }
}

// ---- Tree Serialization ----

pub fn serialize_tree(tree: &Tree) -> Result<String, StorageError> {
    Ok(serde_json::to_string_pretty(tree)?)
}

pub fn deserialize_tree(value: &str) -> Result<Tree, serde_json::Error> {
    serde_json::from_str(value)
}

pub fn save_tree<S: KeyValueStore + ?Sized>(
    store: &S,
    key: &str,
    tree: &Tree,
) -> Result<(), StorageError> {
    let value = serialize_tree(tree)?;
    store.save(key, &value)?;
    debug!("Saved {} top-level items under '{}'", tree.len(), key);
    Ok(())
}

/// Load the stored tree. Corrupted data is removed and treated as absent.
pub fn load_tree<S: KeyValueStore + ?Sized>(store: &S, key: &str) -> Option<Tree> {
    let value = store.load(key)?;
    match deserialize_tree(&value) {
        Ok(tree) => Some(tree),
        Err(e) => {
            warn!("Discarding corrupted bookmark data under '{}': {}", key, e);
            store.clear(key);
            None
        }
    }
}

// ---- In-Memory Store ----

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store refusing values larger than `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota: Some(quota),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(quota) = self.quota {
            if value.len() > quota {
                return Err(StorageError::QuotaExceeded {
                    needed: value.len(),
                    quota,
                });
            }
        }
        self.entries
            .lock()
            .expect("memory store mutex")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .expect("memory store mutex")
            .get(key)
            .cloned()
    }

    fn clear(&self, key: &str) {
        self.entries.lock().expect("memory store mutex").remove(key);
    }
}

// ---- File Store ----

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
                _ => c,
            })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

impl KeyValueStore for FileStore {
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(io_err)?;

        // Write a sibling file first so a failed write never truncates the old value.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value).map_err(io_err)?;
        std::fs::rename(&tmp, &path).map_err(io_err)?;
        Ok(())
    }

    fn load(&self, key: &str) -> Option<String> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    fn clear(&self, key: &str) {
        let path = self.path_for(key);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::parse;
    use crate::tree::{Bookmark, Folder, Node};

    fn sample_tree() -> Tree {
        let mut bookmark = Bookmark::new("Rust", "https://www.rust-lang.org/");
        bookmark.add_date = Some(1_700_000_100);
        bookmark.icon = Some("data:image/png;base64,AAAA".to_string());
        let mut folder = Folder::new("Bar", vec![Node::Bookmark(bookmark)]);
        folder.add_date = Some(1_700_000_000);
        folder.last_modified = Some(1_700_000_500);
        vec![
            Node::Folder(folder),
            Node::Bookmark(Bookmark::new("Plain", "https://example.com/")),
        ]
    }

    #[test]
    fn test_roundtrip_preserves_all_fields() {
        let tree = sample_tree();
        let json = serialize_tree(&tree).unwrap();
        assert_eq!(deserialize_tree(&json).unwrap(), tree);
    }

    #[test]
    fn test_roundtrip_of_imported_tree() {
        let markup = r#"<DL><p>
            <DT><H3 ADD_DATE="1" LAST_MODIFIED="2">Folder</H3>
            <DL><p><DT><A HREF="https://a.com/" ADD_DATE="3" ICON="i">A</A></DL>
            <DT><A HREF="https://b.com/">B</A>
        </DL>"#;
        let tree = parse(markup).unwrap();
        let store = MemoryStore::new();
        save_tree(&store, "bookmarksData", &tree).unwrap();
        assert_eq!(load_tree(&store, "bookmarksData"), Some(tree));
    }

    #[test]
    fn test_corrupted_value_is_discarded() {
        let store = MemoryStore::new();
        store.save("bookmarksData", "{not json").unwrap();
        assert_eq!(load_tree(&store, "bookmarksData"), None);
        assert_eq!(store.load("bookmarksData"), None);
    }

    #[test]
    fn test_missing_key_is_none() {
        let store = MemoryStore::new();
        assert_eq!(load_tree(&store, "nothing"), None);
    }

    #[test]
    fn test_quota_exceeded() {
        let store = MemoryStore::with_quota(16);
        let err = save_tree(&store, "k", &sample_tree()).unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { quota: 16, .. }));
        assert_eq!(store.load("k"), None);
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("data"));
        assert_eq!(store.load("bookmarksData"), None);

        save_tree(&store, "bookmarksData", &sample_tree()).unwrap();
        assert!(dir.path().join("data").join("bookmarksData.json").exists());
        assert_eq!(load_tree(&store, "bookmarksData"), Some(sample_tree()));

        store.clear("bookmarksData");
        assert_eq!(store.load("bookmarksData"), None);
        // Clearing twice is fine.
        store.clear("bookmarksData");
    }

    #[test]
    fn test_file_store_sanitizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.save("a/b:c", "[]").unwrap();
        assert!(dir.path().join("a-b-c.json").exists());
        assert_eq!(store.load("a/b:c").as_deref(), Some("[]"));
    }
}
