use std::collections::BTreeMap;
use std::fs::File;
use std::num::NonZeroUsize;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;

use lru::LruCache;
use memmap2::MmapOptions;
use tracing::trace;

use crate::esm::{ContentData, EsmError, EsmReader};

/// Where the bytes of a content file come from.
#[derive(Clone)]
pub enum ContentSource {
    Memory(ContentData),
    /// Memory mapped again every time the reader has to be reopened.
    File(PathBuf),
}

impl ContentSource {
    pub fn open(&self) -> Result<ContentData, EsmError> {
        match self {
            ContentSource::Memory(data) => Ok(Arc::clone(data)),
            ContentSource::File(path) => {
                let file = File::open(path)?;
                let mmap = unsafe { MmapOptions::new().map(&file) }?;
                Ok(Arc::new(mmap))
            }
        }
    }
}

impl std::fmt::Debug for ContentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentSource::Memory(data) => {
                let data: &(dyn AsRef<[u8]> + Send + Sync) = &**data;
                write!(f, "Memory({} bytes)", data.as_ref().len())
            }
            ContentSource::File(path) => write!(f, "File({})", path.display()),
        }
    }
}

#[derive(Debug)]
struct RegisteredFile {
    name: String,
    source: ContentSource,
    master_indices: Vec<i32>,
}

pub const DEFAULT_CAPACITY: usize = 8;

/// Bounded pool of open readers keyed by content file index.
///
/// Cell references are replayed from saved reader positions long after the
/// file was loaded. Readers are reopened on demand and the least recently
/// used one is dropped when the pool is full.
#[derive(Debug)]
pub struct ReadersCache {
    files: BTreeMap<usize, RegisteredFile>,
    open: LruCache<usize, EsmReader>,
}

impl Default for ReadersCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ReadersCache {
    pub fn new(capacity: usize) -> Self {
        ReadersCache {
            files: BTreeMap::new(),
            open: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    pub fn register(
        &mut self,
        index: usize,
        name: impl Into<String>,
        source: ContentSource,
        master_indices: Vec<i32>,
    ) {
        self.open.pop(&index);
        self.files.insert(
            index,
            RegisteredFile {
                name: name.into(),
                source,
                master_indices,
            },
        );
    }

    /// Register the file a reader was opened on, sharing its bytes.
    pub fn register_reader(&mut self, reader: &EsmReader) {
        self.register(
            reader.index(),
            reader.name(),
            ContentSource::Memory(Arc::clone(reader.data())),
            reader.master_indices().to_vec(),
        );
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn open_len(&self) -> usize {
        self.open.len()
    }

    /// Borrow the reader for `index`, opening it if it is not in the pool.
    pub fn get(&mut self, index: usize) -> Result<BusyReader<'_>, EsmError> {
        if !self.open.contains(&index) {
            let file = self
                .files
                .get(&index)
                .ok_or(EsmError::UnknownContentFile(index))?;
            let mut reader = EsmReader::open(file.source.open()?, index, file.name.clone())?;
            reader.set_master_indices(file.master_indices.clone());
            if let Some((evicted, _)) = self.open.push(index, reader) {
                trace!("closed reader for content file {evicted}");
            }
        }
        let reader = self
            .open
            .get_mut(&index)
            .ok_or(EsmError::UnknownContentFile(index))?;
        Ok(BusyReader { reader })
    }
}

/// A reader leased from the [`ReadersCache`] for a single operation.
pub struct BusyReader<'a> {
    reader: &'a mut EsmReader,
}

impl Deref for BusyReader<'_> {
    type Target = EsmReader;

    fn deref(&self) -> &Self::Target {
        self.reader
    }
}

impl DerefMut for BusyReader<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.reader
    }
}

impl Drop for BusyReader<'_> {
    fn drop(&mut self) {
        self.reader.close_record();
    }
}
