use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::core::error::StorageError;

use super::{ListedObject, ObjectLister, ObjectPage};

/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

// ---------------------------------------------------------------------------
// InMemoryObjectStore (tests and local development)
// ---------------------------------------------------------------------------

/// In-memory object listing backend.
///
/// Keys live in a `BTreeMap` behind a `RwLock`, so listings come back in
/// lexicographic order like S3 and GCS. Supports failure injection to
/// exercise the retry path.
pub struct InMemoryObjectStore {
    bucket: String,
    objects: Arc<RwLock<BTreeMap<String, u64>>>,
    page_size: usize,
    pending_failures: AtomicU32,
    page_calls: AtomicU32,
}

impl InMemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            page_size: DEFAULT_PAGE_SIZE,
            pending_failures: AtomicU32::new(0),
            page_calls: AtomicU32::new(0),
        }
    }

    /// Split listings into pages of at most `page_size` objects.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Store an object of `size` bytes under `key`.
    pub async fn put_object(&self, key: &str, size: u64) {
        self.objects.write().await.insert(key.to_string(), size);
    }

    pub async fn put_objects<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut objects = self.objects.write().await;
        for key in keys {
            objects.insert(key.as_ref().to_string(), 0);
        }
    }

    pub async fn remove_object(&self, key: &str) -> bool {
        self.objects.write().await.remove(key).is_some()
    }

    /// Make the next `count` page requests fail with a transient error.
    pub fn inject_failures(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Number of `list_page` calls served so far, including failed ones.
    pub fn page_calls(&self) -> u32 {
        self.page_calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// True if `key` sits directly under `prefix` (no delimiter in the remainder).
fn is_same_level(key: &str, prefix: &str, delimiter: &str) -> bool {
    if delimiter.is_empty() {
        return true;
    }
    key.strip_prefix(prefix)
        .map(|rest| !rest.contains(delimiter))
        .unwrap_or(false)
}

impl ObjectLister for InMemoryObjectStore {
    async fn list_page(
        &self,
        prefix: &str,
        delimiter: &str,
        continuation: Option<&str>,
    ) -> Result<ObjectPage, StorageError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_failure() {
            return Err(StorageError::transient(prefix, "injected failure"));
        }

        let objects = self.objects.read().await;
        let start = match continuation {
            Some(token) => Bound::Excluded(token.to_string()),
            None => Bound::Included(prefix.to_string()),
        };

        let mut page: Vec<ListedObject> = Vec::new();
        let mut has_more = false;
        for key in objects
            .range((start, Bound::Unbounded))
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
            .filter(|k| is_same_level(k, prefix, delimiter))
        {
            if page.len() == self.page_size {
                has_more = true;
                break;
            }
            page.push(ListedObject {
                bucket: self.bucket.clone(),
                name: key.clone(),
            });
        }

        let next_continuation = if has_more {
            page.last().map(|o| o.name.clone())
        } else {
            None
        };
        Ok(ObjectPage {
            objects: page,
            next_continuation,
        })
    }
}

#[cfg(test)]
impl InMemoryObjectStore {
    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }
}
