use log::debug;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard};

/// Which artifact of a document a byte stream holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// The packaged document as stored remotely
    Raw,
    /// The extracted primary content
    Contents,
    /// The rendering with annotations applied
    Annotated,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey {
    pub item_id: String,
    pub version: u64,
    pub kind: ContentKind,
}

impl ContentKey {
    pub fn new(item_id: &str, version: u64, kind: ContentKind) -> Self {
        Self {
            item_id: item_id.to_string(),
            version,
            kind,
        }
    }
}

/// Shared, seekable view over cached bytes.
///
/// Clones share one cursor. Callers reading through the same handle from
/// several places must coordinate their positions themselves.
#[derive(Clone)]
pub struct ContentHandle {
    bytes: Arc<[u8]>,
    cursor: Arc<Mutex<Cursor<Arc<[u8]>>>>,
}

impl ContentHandle {
    pub fn new(bytes: Vec<u8>) -> Self {
        let bytes: Arc<[u8]> = Arc::from(bytes);
        Self {
            cursor: Arc::new(Mutex::new(Cursor::new(bytes.clone()))),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The whole content, independent of the cursor
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// True when both handles are the same cached instance
    pub fn ptr_eq(&self, other: &ContentHandle) -> bool {
        Arc::ptr_eq(&self.cursor, &other.cursor)
    }

    fn cursor(&self) -> MutexGuard<'_, Cursor<Arc<[u8]>>> {
        self.cursor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ContentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentHandle")
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Read for ContentHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor().read(buf)
    }
}

impl Seek for ContentHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor().seek(pos)
    }
}

/// Holds the most recently fetched content and nothing else.
///
/// Storing a new key replaces whatever was resident, whatever its id,
/// version or kind.
#[derive(Default)]
pub struct ContentCache {
    slot: Mutex<Option<(ContentKey, ContentHandle)>>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<(ContentKey, ContentHandle)>> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The resident handle if it was stored under `key`
    pub fn get(&self, key: &ContentKey) -> Option<ContentHandle> {
        match self.slot().as_ref() {
            Some((resident, handle)) if resident == key => {
                debug!("🎯 Content hit: {:?} of {}", key.kind, key.item_id);
                Some(handle.clone())
            }
            _ => None,
        }
    }

    /// Make `bytes` the resident entry and return its handle
    pub fn insert(&self, key: ContentKey, bytes: Vec<u8>) -> ContentHandle {
        let handle = ContentHandle::new(bytes);
        let mut slot = self.slot();
        if let Some((evicted, _)) = slot.as_ref() {
            debug!("🗑️ Evicting {:?} of {}", evicted.kind, evicted.item_id);
        }
        *slot = Some((key, handle.clone()));
        handle
    }

    pub fn resident_key(&self) -> Option<ContentKey> {
        self.slot().as_ref().map(|(key, _)| key.clone())
    }

    pub fn clear(&self) {
        *self.slot() = None;
    }
}
