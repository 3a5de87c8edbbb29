use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use tokio_stream::StreamExt;

use crate::error::BrowseError;
use crate::models::{ListingPage, ListingRequest};

pub type ByteStream = BoxStream<'static, Result<Bytes, BrowseError>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub size_bytes: u64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one page of a delimiter-grouped listing
    async fn list_objects(&self, request: &ListingRequest) -> Result<ListingPage, BrowseError>;

    /// Get the object size without reading the body
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, BrowseError>;

    /// Open an object body as a stream of chunks
    async fn open_object(&self, bucket: &str, key: &str) -> Result<ByteStream, BrowseError>;
}

/// Drain a body stream, failing as soon as it grows past `limit` bytes.
pub async fn read_to_limit(mut stream: ByteStream, limit: u64) -> Result<Bytes, BrowseError> {
    let mut body = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if (body.len() + chunk.len()) as u64 > limit {
            return Err(BrowseError::TooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::models::{Entry, FileEntry, FolderEntry};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    /// In-memory store serving a fixed page sequence for every prefix.
    /// Page `n > 1` is fetched with token `tok-n`.
    #[derive(Default)]
    pub struct MockStore {
        pages: Vec<Vec<Entry>>,
        objects: HashMap<String, Bytes>,
        list_tokens: Mutex<Vec<Option<String>>>,
        head_calls: AtomicUsize,
        open_calls: AtomicUsize,
        fail_once: Mutex<Option<(String, BrowseError)>>,
        gate: Mutex<Option<(String, Arc<Notify>)>>,
    }

    pub fn token_for(page: usize) -> String {
        format!("tok-{page}")
    }

    impl MockStore {
        pub fn with_pages(count: usize, per_page: usize) -> Self {
            let pages = (1..=count)
                .map(|p| {
                    let mut entries = vec![Entry::Folder(FolderEntry::from_prefix(&format!(
                        "dir-{p}/"
                    )))];
                    entries.extend((0..per_page).map(|i| {
                        Entry::File(FileEntry::new(&format!("file-{p}-{i}.txt"), 10, None))
                    }));
                    entries
                })
                .collect();
            Self {
                pages,
                ..Default::default()
            }
        }

        pub fn with_object(mut self, key: &str, body: impl Into<Bytes>) -> Self {
            self.objects.insert(key.to_string(), body.into());
            self
        }

        /// Fail the next listing call that carries `token`.
        pub fn fail_once_on(&self, token: &str, error: BrowseError) {
            *self.fail_once.lock() = Some((token.to_string(), error));
        }

        /// Hold listing calls carrying `token` until the returned handle is notified.
        pub fn gate_on(&self, token: &str) -> Arc<Notify> {
            let notify = Arc::new(Notify::new());
            *self.gate.lock() = Some((token.to_string(), Arc::clone(&notify)));
            notify
        }

        pub fn list_calls(&self) -> usize {
            self.list_tokens.lock().len()
        }

        pub fn list_tokens(&self) -> Vec<Option<String>> {
            self.list_tokens.lock().clone()
        }

        pub fn head_calls(&self) -> usize {
            self.head_calls.load(Ordering::SeqCst)
        }

        pub fn open_calls(&self) -> usize {
            self.open_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ObjectStore for MockStore {
        async fn list_objects(
            &self,
            request: &ListingRequest,
        ) -> Result<ListingPage, BrowseError> {
            self.list_tokens.lock().push(request.page_token.clone());
            let token = request.page_token.clone().unwrap_or_default();

            let gate = self
                .gate
                .lock()
                .as_ref()
                .filter(|(gated, _)| *gated == token)
                .map(|(_, notify)| Arc::clone(notify));
            if let Some(notify) = gate {
                notify.notified().await;
            }

            {
                let mut fail = self.fail_once.lock();
                if fail.as_ref().is_some_and(|(t, _)| *t == token) {
                    if let Some((_, error)) = fail.take() {
                        return Err(error);
                    }
                }
            }

            let page = match request.page_token.as_deref() {
                None => 1,
                Some(t) => t
                    .strip_prefix("tok-")
                    .and_then(|n| n.parse::<usize>().ok())
                    .ok_or_else(|| BrowseError::Network(format!("bad token {t}")))?,
            };
            let entries = self
                .pages
                .get(page - 1)
                .cloned()
                .ok_or_else(|| BrowseError::NotFound(format!("page {page}")))?;
            let truncated = page < self.pages.len();
            Ok(ListingPage::new(
                entries,
                truncated,
                truncated.then(|| token_for(page + 1)),
            ))
        }

        async fn head_object(&self, _bucket: &str, key: &str) -> Result<ObjectHead, BrowseError> {
            self.head_calls.fetch_add(1, Ordering::SeqCst);
            let body = self
                .objects
                .get(key)
                .ok_or_else(|| BrowseError::NotFound(key.to_string()))?;
            Ok(ObjectHead {
                size_bytes: body.len() as u64,
            })
        }

        async fn open_object(&self, _bucket: &str, key: &str) -> Result<ByteStream, BrowseError> {
            self.open_calls.fetch_add(1, Ordering::SeqCst);
            let body = self
                .objects
                .get(key)
                .cloned()
                .ok_or_else(|| BrowseError::NotFound(key.to_string()))?;
            // Two chunks so readers see a multi-part body
            let split = body.len() / 2;
            let chunks = vec![Ok(body.slice(..split)), Ok(body.slice(split..))];
            Ok(Box::pin(tokio_stream::iter(chunks)))
        }
    }
}
