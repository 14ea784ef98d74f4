//! In-memory object store for testing.
//!
//! Besides storing objects, [`FakeObjectIO`] can script failures: queue a
//! number of failures of a given [`ErrorKind`] against a key (or against
//! listings) and the next matching calls fail before any data is returned.
//! Every call is counted so tests can assert how many requests a run issued.

use crate::io::cloud::traits::{
    CloudIOError, CloudResult, ErrorKind, ListPage, ObjectIO, ObjectMetadata, clamp_range,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex};

type BucketStorage = Arc<Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>>;
type FaultQueue = Arc<Mutex<HashMap<String, VecDeque<ErrorKind>>>>;

const LIST_FAULT_KEY: &str = "\0list";

/// Counters of the calls a [`FakeObjectIO`] has served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get_object: usize,
    pub open_object: usize,
    pub get_range: usize,
    pub list_page: usize,
}

#[derive(Clone)]
pub struct FakeObjectIO {
    storage: BucketStorage,
    faults: FaultQueue,
    calls: Arc<Mutex<CallCounts>>,
}

impl FakeObjectIO {
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: Arc::new(Mutex::new(HashMap::new())),
            faults: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(CallCounts::default())),
        }
    }

    /// Make the next `times` reads of `key` fail with `kind`.
    ///
    /// Faults accumulate: scripting `Timeout` twice and then `NotFound` once
    /// yields three failures in that order.
    ///
    /// # Panics
    ///
    /// Panics if the fault mutex is poisoned.
    pub fn fail_next(&self, key: &str, kind: ErrorKind, times: usize) {
        let mut faults = self.faults.lock().expect("faults mutex poisoned");
        let queue = faults.entry(key.to_string()).or_default();
        queue.extend(std::iter::repeat_n(kind, times));
    }

    /// Make the next `times` listing calls fail with `kind`.
    pub fn fail_next_list(&self, kind: ErrorKind, times: usize) {
        self.fail_next(LIST_FAULT_KEY, kind, times);
    }

    /// Snapshot of the calls served so far.
    ///
    /// # Panics
    ///
    /// Panics if the counter mutex is poisoned.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        *self.calls.lock().expect("calls mutex poisoned")
    }

    fn take_fault(&self, key: &str) -> CloudResult<()> {
        let mut faults = self.faults.lock().expect("faults mutex poisoned");
        match faults.get_mut(key).and_then(VecDeque::pop_front) {
            Some(kind) => Err(CloudIOError::new(kind, format!("injected fault for {key}"))),
            None => Ok(()),
        }
    }

    fn read(&self, bucket: &str, key: &str) -> CloudResult<Vec<u8>> {
        let storage = self.storage.lock().expect("storage mutex poisoned");
        storage
            .get(bucket)
            .and_then(|b| b.get(key))
            .cloned()
            .ok_or_else(|| {
                CloudIOError::new(
                    ErrorKind::NotFound,
                    format!("Object {bucket}/{key} not found"),
                )
            })
    }
}

impl Default for FakeObjectIO {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectIO for FakeObjectIO {
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> CloudResult<()> {
        self.storage
            .lock()
            .expect("storage mutex poisoned")
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> CloudResult<Vec<u8>> {
        self.calls.lock().expect("calls mutex poisoned").get_object += 1;
        self.take_fault(key)?;
        self.read(bucket, key)
    }

    fn open_object(&self, bucket: &str, key: &str) -> CloudResult<Box<dyn Read + Send>> {
        self.calls.lock().expect("calls mutex poisoned").open_object += 1;
        self.take_fault(key)?;
        Ok(Box::new(Cursor::new(self.read(bucket, key)?)))
    }

    fn get_range(&self, bucket: &str, key: &str, start: u64, end: u64) -> CloudResult<Vec<u8>> {
        self.calls.lock().expect("calls mutex poisoned").get_range += 1;
        self.take_fault(key)?;
        let data = self.read(bucket, key)?;
        let (start, end) = clamp_range(data.len() as u64, start, end)?;
        #[allow(clippy::cast_possible_truncation)]
        Ok(data[start as usize..=end as usize].to_vec())
    }

    fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        token: Option<&str>,
        page_size: usize,
    ) -> CloudResult<ListPage> {
        self.calls.lock().expect("calls mutex poisoned").list_page += 1;
        self.take_fault(LIST_FAULT_KEY)?;
        let storage = self.storage.lock().expect("storage mutex poisoned");
        let bucket_map = storage.get(bucket).ok_or_else(|| {
            CloudIOError::new(ErrorKind::NotFound, format!("Bucket {bucket} not found"))
        })?;

        // Keys are kept sorted; the token is the last key of the previous page.
        let mut matching = bucket_map
            .iter()
            .filter(|(key, _)| token.is_none_or(|t| key.as_str() > t))
            .filter(|(key, _)| prefix.is_none_or(|p| key.starts_with(p)));

        let objects: Vec<ObjectMetadata> = matching
            .by_ref()
            .take(page_size.max(1))
            .map(|(key, data)| ObjectMetadata::new(key.clone(), Some(data.len() as u64)))
            .collect();
        let has_more = matching.next().is_some();
        drop(storage);

        let next_token = if has_more {
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
