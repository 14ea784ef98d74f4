//! Filesystem-backed object store.
//!
//! The bucket name is ignored; keys are paths relative to the root directory,
//! always written with `/` separators. Listing walks the tree recursively and
//! returns keys in lexical order. The walk happens once per listing, on its
//! first page; later pages are served from that snapshot.

use crate::io::cloud::helpers::validate_key_path;
use crate::io::cloud::traits::{
    CloudIOError, CloudResult, ErrorKind, ListPage, ObjectIO, ObjectMetadata, clamp_range,
};
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Sorted `(key, size)` pairs from the most recent walk.
type Snapshot = Arc<Vec<(String, u64)>>;

#[derive(Debug, Clone)]
pub struct LocalObjectIO {
    root: PathBuf,
    snapshot: Arc<Mutex<Option<Snapshot>>>,
}

impl LocalObjectIO {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            snapshot: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> CloudResult<PathBuf> {
        validate_key_path(key)?;
        if key.split('/').any(|part| part == "..") {
            return Err(CloudIOError::new(
                ErrorKind::InvalidInput,
                format!("key escapes the root: {key}"),
            ));
        }
        Ok(self.root.join(key))
    }

    fn collect_keys(&self, dir: &Path, out: &mut Vec<(String, u64)>) -> CloudResult<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let meta = entry.metadata()?;
            if meta.is_dir() {
                self.collect_keys(&path, out)?;
            } else if meta.is_file()
                && let Ok(rel) = path.strip_prefix(&self.root)
            {
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push((key, meta.len()));
            }
        }
        Ok(())
    }

    /// Keys for a listing page: a fresh walk for the first page, the cached
    /// one when continuing.
    fn keys_for(&self, token: Option<&str>) -> CloudResult<Snapshot> {
        let mut cached = self
            .snapshot
            .lock()
            .map_err(|_| CloudIOError::new(ErrorKind::InternalError, "listing cache poisoned"))?;
        if token.is_some()
            && let Some(keys) = cached.as_ref()
        {
            return Ok(Arc::clone(keys));
        }
        let mut keys = Vec::new();
        self.collect_keys(&self.root, &mut keys)?;
        keys.sort();
        let keys = Arc::new(keys);
        *cached = Some(Arc::clone(&keys));
        Ok(keys)
    }
}

impl ObjectIO for LocalObjectIO {
    fn put_object(&self, _bucket: &str, key: &str, data: &[u8]) -> CloudResult<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;
        Ok(())
    }

    fn get_object(&self, _bucket: &str, key: &str) -> CloudResult<Vec<u8>> {
        let path = self.resolve(key)?;
        fs::read(&path).map_err(|e| CloudIOError::from(e).with_source(path.display().to_string()))
    }

    fn open_object(&self, _bucket: &str, key: &str) -> CloudResult<Box<dyn Read + Send>> {
        let path = self.resolve(key)?;
        let file =
            File::open(&path).map_err(|e| CloudIOError::from(e).with_source(path.display().to_string()))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn get_range(&self, _bucket: &str, key: &str, start: u64, end: u64) -> CloudResult<Vec<u8>> {
        let path = self.resolve(key)?;
        let mut file =
            File::open(&path).map_err(|e| CloudIOError::from(e).with_source(path.display().to_string()))?;
        let len = file.metadata()?.len();
        let (start, end) = clamp_range(len, start, end)?;
        file.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::new();
        file.take(end - start + 1).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn list_page(
        &self,
        _bucket: &str,
        prefix: Option<&str>,
        token: Option<&str>,
        page_size: usize,
    ) -> CloudResult<ListPage> {
        let keys = self.keys_for(token)?;
        let first = token.map_or(0, |t| keys.partition_point(|(key, _)| key.as_str() <= t));
        let mut matching = keys[first..]
            .iter()
            .filter(|(key, _)| prefix.is_none_or(|p| key.starts_with(p)));
        let objects: Vec<ObjectMetadata> = matching
            .by_ref()
            .take(page_size.max(1))
            .map(|(key, size)| ObjectMetadata::new(key.clone(), Some(*size)))
            .collect();
        let next_token = if matching.next().is_some() {
            objects.last().map(|o| o.key.clone())
        } else {
            None
        };
        Ok(ListPage {
            objects,
            next_token,
        })
    }
}
