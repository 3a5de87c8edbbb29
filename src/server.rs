use crate::config::{AppConfig, ConfigStore, ConfigUpdate};
use crate::error::BrowseError;
use crate::models::Page;
use crate::object_store::{ByteStream, ObjectStore};
use crate::pagination::ListingEngine;
use crate::preview::{preview_object, PreviewResult};
use crate::s3_backend::S3Backend;
use crate::selection::SelectionTracker;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_SESSION_LIMIT: usize = 256;
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(30 * 60);

/// Per-client browsing state: one listing engine and one preview selection.
pub struct BrowseSession {
    pub listing: ListingEngine,
    pub selection: SelectionTracker,
    last_used: Mutex<Instant>,
}

impl BrowseSession {
    fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used.lock().elapsed()
    }
}

pub struct Server {
    config_store: ConfigStore,
    config: RwLock<AppConfig>,
    backend: RwLock<Arc<dyn ObjectStore>>,
    sessions: RwLock<HashMap<String, Arc<BrowseSession>>>,
    session_limit: usize,
    session_idle: Duration,
}

/// Listing prefixes never start with `/` and, unless empty, end with one.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

fn log_page(page: &Page) {
    tracing::info!(
        "Browsing {:?} page {}: {} folders, {} files",
        page.prefix,
        page.current_page,
        page.stats.folder_count,
        page.stats.file_count
    );
}

impl Server {
    pub fn new(config_store: ConfigStore, config: AppConfig) -> Result<Self, BrowseError> {
        config.validate()?;
        let backend = Arc::new(S3Backend::new(&config.endpoint_url)?);
        Ok(Self::with_backend(config_store, config, backend))
    }

    pub fn with_backend(
        config_store: ConfigStore,
        config: AppConfig,
        backend: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config_store,
            config: RwLock::new(config),
            backend: RwLock::new(backend),
            sessions: RwLock::new(HashMap::new()),
            session_limit: DEFAULT_SESSION_LIMIT,
            session_idle: DEFAULT_SESSION_IDLE,
        }
    }

    /// Bound the session map: idle sessions expire, and past `limit` the least
    /// recently used one is evicted.
    pub fn with_session_limits(mut self, limit: usize, idle: Duration) -> Self {
        self.session_limit = limit.max(1);
        self.session_idle = idle;
        self
    }

    pub fn config(&self) -> AppConfig {
        self.config.read().clone()
    }

    fn session(&self, id: &str) -> Arc<BrowseSession> {
        if let Some(session) = self.sessions.read().get(id) {
            session.touch();
            return Arc::clone(session);
        }

        let config = self.config();
        let backend = Arc::clone(&*self.backend.read());
        let mut sessions = self.sessions.write();
        if let Some(session) = sessions.get(id) {
            session.touch();
            return Arc::clone(session);
        }

        self.evict(&mut sessions);
        tracing::debug!("Opening browse session {}", id);
        let session = Arc::new(BrowseSession {
            listing: ListingEngine::new(backend, config.bucket_name, config.page_size),
            selection: SelectionTracker::default(),
            last_used: Mutex::new(Instant::now()),
        });
        sessions.insert(id.to_string(), Arc::clone(&session));
        session
    }

    /// Make room for one more session.
    fn evict(&self, sessions: &mut HashMap<String, Arc<BrowseSession>>) {
        let before = sessions.len();
        sessions.retain(|_, session| session.idle_for() < self.session_idle);

        while sessions.len() >= self.session_limit {
            let oldest = sessions
                .iter()
                .max_by_key(|(_, session)| session.idle_for())
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                }
                None => break,
            }
        }

        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::debug!("Evicted {} browse sessions", evicted);
        }
    }

    pub fn end_session(&self, id: &str) -> bool {
        self.sessions.write().remove(id).is_some()
    }

    pub async fn browse(&self, session_id: &str, prefix: &str, page: u32) -> Result<Page, BrowseError> {
        let prefix = normalize_prefix(prefix);
        let session = self.session(session_id);
        let page = session.listing.fetch_page(&prefix, page).await?;
        log_page(&page);
        Ok(page)
    }

    /// Move within the folder the session already has open.
    pub async fn turn_page(&self, session_id: &str, page: u32) -> Result<Page, BrowseError> {
        let session = self.session(session_id);
        let page = session.listing.go_to_page(page).await?;
        log_page(&page);
        Ok(page)
    }

    /// Re-list `prefix`, discarding every token cached for it.
    pub async fn refresh(&self, session_id: &str, prefix: &str, page: u32) -> Result<Page, BrowseError> {
        let prefix = normalize_prefix(prefix);
        let session = self.session(session_id);
        session.listing.reset_session(&prefix);
        let page = session.listing.fetch_page(&prefix, page).await?;
        log_page(&page);
        Ok(page)
    }

    /// Preview `key` for a session; a result overtaken by a newer selection is dropped.
    pub async fn preview(
        &self,
        session_id: &str,
        key: &str,
        size_hint: Option<u64>,
    ) -> Result<PreviewResult, BrowseError> {
        let session = self.session(session_id);
        let ticket = session.selection.select(key);
        let bucket = self.config.read().bucket_name.clone();
        let backend = Arc::clone(&*self.backend.read());

        let result = preview_object(backend.as_ref(), &bucket, key, size_hint).await;

        session
            .selection
            .accept(&ticket, result)
            .ok_or(BrowseError::Superseded)
    }

    pub async fn download(&self, key: &str) -> Result<ByteStream, BrowseError> {
        let bucket = self.config.read().bucket_name.clone();
        let backend = Arc::clone(&*self.backend.read());
        backend.open_object(&bucket, key).await
    }

    /// Apply, persist and activate a configuration change.
    /// Every session is dropped since its cursors point into the old bucket.
    pub fn update_config(&self, update: ConfigUpdate) -> Result<AppConfig, BrowseError> {
        let config = self.config().merged(update);
        config.validate()?;
        let backend = Arc::new(S3Backend::new(&config.endpoint_url)?);
        self.config_store.save(&config)?;

        *self.backend.write() = backend;
        *self.config.write() = config.clone();
        let dropped = {
            let mut sessions = self.sessions.write();
            let count = sessions.len();
            sessions.clear();
            count
        };

        tracing::info!(
            "Configuration updated: {} / {} ({} sessions reset)",
            config.endpoint_url,
            config.bucket_name,
            dropped
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::mock::MockStore;

    fn server_with(store: MockStore) -> Server {
        let path = std::env::temp_dir().join(format!(
            "bucket-browser-server-{}.json",
            std::process::id()
        ));
        Server::with_backend(ConfigStore::new(path), AppConfig::default(), Arc::new(store))
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix("raw"), "raw/");
        assert_eq!(normalize_prefix("/raw/images/"), "raw/images/");
    }

    #[tokio::test]
    async fn test_prefix_change_starts_new_session() {
        let server = server_with(MockStore::with_pages(5, 1));

        let page = server.browse("s1", "a", 3).await.unwrap();
        assert_eq!(page.current_page, 3);
        assert_eq!(page.prefix, "a/");

        let page = server.browse("s1", "b/", 1).await.unwrap();
        assert_eq!(page.prefix, "b/");
        assert_eq!(page.total_pages_known_lower_bound, 2);

        // Other sessions are independent
        let page = server.browse("s2", "a/", 1).await.unwrap();
        assert_eq!(page.current_page, 1);
    }

    #[tokio::test]
    async fn test_preview_through_server() {
        let server = server_with(MockStore::with_pages(1, 0).with_object("a.txt", "hello"));
        let result = server.preview("s", "a.txt", None).await.unwrap();
        assert!(matches!(result, PreviewResult::Text { .. }));
    }

    #[tokio::test]
    async fn test_turn_page_and_refresh() {
        let server = server_with(MockStore::with_pages(5, 1));
        assert!(matches!(
            server.turn_page("s", 2).await,
            Err(BrowseError::InvalidState(_))
        ));

        server.browse("s", "a", 2).await.unwrap();
        let page = server.turn_page("s", 4).await.unwrap();
        assert_eq!(page.prefix, "a/");
        assert_eq!(page.current_page, 4);
        assert_eq!(page.total_pages_known_lower_bound, 5);

        let page = server.refresh("s", "a/", 1).await.unwrap();
        assert_eq!(page.current_page, 1);
        assert_eq!(page.total_pages_known_lower_bound, 2);
    }

    #[tokio::test]
    async fn test_least_recently_used_session_is_evicted() {
        let server = server_with(MockStore::with_pages(1, 0))
            .with_session_limits(2, DEFAULT_SESSION_IDLE);

        server.browse("s1", "", 1).await.unwrap();
        server.browse("s2", "", 1).await.unwrap();
        server.browse("s1", "", 1).await.unwrap();
        server.browse("s3", "", 1).await.unwrap();

        assert!(!server.end_session("s2"));
        assert!(server.end_session("s1"));
        assert!(server.end_session("s3"));
    }

    #[tokio::test]
    async fn test_idle_sessions_expire() {
        let server = server_with(MockStore::with_pages(1, 0))
            .with_session_limits(DEFAULT_SESSION_LIMIT, Duration::ZERO);

        server.browse("old", "", 1).await.unwrap();
        server.browse("new", "", 1).await.unwrap();

        assert!(!server.end_session("old"));
        assert!(server.end_session("new"));
    }

    #[tokio::test]
    async fn test_end_session() {
        let server = server_with(MockStore::with_pages(1, 0));
        server.browse("s", "", 1).await.unwrap();
        assert!(server.end_session("s"));
        assert!(!server.end_session("s"));
    }
}
