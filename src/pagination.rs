//! Random-access pages over a forward-only, token-continued listing.
//!
//! The store can only answer "the page after token T". [`PageCursor`] keeps
//! every token seen so far for the current prefix, so any page at or below the
//! frontier costs one fetch; pages beyond it are reached by a sequential walk
//! that records each token on the way.
//!
//! Navigation is tagged with an epoch. A result that arrives after a newer
//! navigation (or a reset) started is dropped with [`BrowseError::Superseded`]
//! and never touches the displayed page.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::BrowseError;
use crate::models::{ListingPage, ListingRequest, NavigationState, Page};
use crate::object_store::ObjectStore;

/// Dense page number → fetch token arena. Index `i` holds the token for page `i + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    tokens: Vec<Option<String>>,
    final_page: Option<u32>,
}

impl Default for PageCursor {
    fn default() -> Self {
        Self {
            tokens: vec![None],
            final_page: None,
        }
    }
}

impl PageCursor {
    /// Token used to fetch `page`, if the page has been discovered.
    pub fn token_for(&self, page: u32) -> Option<Option<&str>> {
        let index = (page as usize).checked_sub(1)?;
        self.tokens.get(index).map(|t| t.as_deref())
    }

    /// Highest page whose token is known.
    pub fn frontier(&self) -> u32 {
        self.tokens.len() as u32
    }

    /// Last page of the listing, once a non-truncated response has been seen.
    pub fn final_page(&self) -> Option<u32> {
        self.final_page
    }

    /// Highest cached page not above `target`, with the token to fetch it.
    fn resume_point(&self, target: u32) -> (u32, Option<String>) {
        let page = target.clamp(1, self.frontier());
        let token = self.token_for(page).flatten().map(str::to_string);
        (page, token)
    }

    /// Record what fetching `page` revealed about the page after it.
    fn record(&mut self, page: u32, listing: &ListingPage) {
        match listing.next_token() {
            Some(token) if page == self.frontier() => {
                self.tokens.push(Some(token.to_string()));
            }
            Some(_) => {}
            None => {
                self.final_page = Some(self.final_page.map_or(page, |last| last.min(page)));
            }
        }
    }
}

struct Session {
    prefix: String,
    cursor: PageCursor,
    nav: NavigationState,
    displayed: Option<ListingPage>,
}

#[derive(Default)]
struct EngineState {
    /// Bumped by every reset; guards cursor writes
    generation: u64,
    /// Bumped by every reset and navigation; guards NavigationState
    epoch: u64,
    session: Option<Session>,
}

impl EngineState {
    fn reset(&mut self, prefix: &str) {
        self.generation += 1;
        self.epoch += 1;
        self.session = Some(Session {
            prefix: prefix.to_string(),
            cursor: PageCursor::default(),
            nav: NavigationState::default(),
            displayed: None,
        });
        debug!("Listing session reset to prefix {:?}", prefix);
    }
}

struct WalkPlan {
    epoch: u64,
    generation: u64,
    prefix: String,
    start: u32,
    token: Option<String>,
    target: u32,
}

enum Step {
    Cached(Page),
    Walk(WalkPlan),
}

/// Paginates one prefix at a time for a single browsing session.
pub struct ListingEngine {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    page_size: u32,
    state: Mutex<EngineState>,
}

impl ListingEngine {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, page_size: u32) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            page_size,
            state: Mutex::new(EngineState::default()),
        }
    }

    /// Start a new session on `prefix`, discarding every cached token.
    pub fn reset_session(&self, prefix: &str) {
        self.state.lock().reset(prefix);
    }

    #[cfg(test)]
    pub fn prefix(&self) -> Option<String> {
        self.state.lock().session.as_ref().map(|s| s.prefix.clone())
    }

    #[cfg(test)]
    pub fn navigation(&self) -> Option<NavigationState> {
        self.state.lock().session.as_ref().map(|s| s.nav)
    }

    #[cfg(test)]
    pub fn cursor(&self) -> Option<PageCursor> {
        self.state.lock().session.as_ref().map(|s| s.cursor.clone())
    }

    /// Navigate to 1-based page `requested` of the current session.
    ///
    /// A request past the end of the listing lands on the last page.
    pub async fn go_to_page(&self, requested: u32) -> Result<Page, BrowseError> {
        self.navigate(None, requested).await
    }

    /// Navigate to page `requested` of `prefix`, starting a new session first
    /// when the current one is on a different prefix. The check and the reset
    /// happen under the same lock as the navigation itself, so a concurrent
    /// request for another prefix can only supersede this one, never answer it.
    pub async fn fetch_page(&self, prefix: &str, requested: u32) -> Result<Page, BrowseError> {
        self.navigate(Some(prefix), requested).await
    }

    async fn navigate(&self, prefix: Option<&str>, requested: u32) -> Result<Page, BrowseError> {
        if requested == 0 {
            return Err(BrowseError::InvalidState("page numbers start at 1".into()));
        }

        let plan = match self.plan(prefix, requested)? {
            Step::Cached(page) => return Ok(page),
            Step::Walk(plan) => plan,
        };

        if plan.target > plan.start {
            info!(
                "Walking {:?} from page {} to page {}",
                plan.prefix, plan.start, plan.target
            );
        }

        let mut page_number = plan.start;
        let mut token = plan.token.clone();
        loop {
            let request = ListingRequest {
                bucket: self.bucket.clone(),
                prefix: plan.prefix.clone(),
                page_token: token.take(),
                page_size: self.page_size,
            };

            let listing = match self.store.list_objects(&request).await {
                Ok(listing) => listing,
                Err(e) => {
                    warn!(
                        "Fetching page {} of {:?} failed: {}",
                        page_number, plan.prefix, e
                    );
                    return Err(e);
                }
            };

            let next = listing.next_token().map(str::to_string);
            if let Some(page) = self.commit(&plan, page_number, listing, requested)? {
                return Ok(page);
            }
            token = next;
            page_number += 1;
        }
    }

    /// Apply one fetched page under the state lock. Returns the page once the
    /// walk has reached its target or the end of the listing.
    fn commit(
        &self,
        plan: &WalkPlan,
        page_number: u32,
        listing: ListingPage,
        requested: u32,
    ) -> Result<Option<Page>, BrowseError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.generation != plan.generation {
            debug!("Dropping page {} from a previous session", page_number);
            return Err(BrowseError::Superseded);
        }
        let Some(session) = state.session.as_mut() else {
            return Err(BrowseError::Superseded);
        };

        // Tokens stay valid for this session even if the navigation is stale
        session.cursor.record(page_number, &listing);

        if state.epoch != plan.epoch {
            debug!(
                "Discarding stale page {} (epoch {} < {})",
                page_number, plan.epoch, state.epoch
            );
            return Err(BrowseError::Superseded);
        }

        if page_number < plan.target && listing.is_truncated() {
            return Ok(None);
        }
        if page_number < plan.target {
            info!(
                "Listing of {:?} ends at page {}, requested {}",
                plan.prefix, page_number, requested
            );
        }
        session.nav.current_page = page_number;
        session.nav.has_more = listing.is_truncated();
        session.nav.known_max_page = session
            .nav
            .known_max_page
            .max(page_number)
            .max(session.cursor.frontier());

        let page = Page::assemble(&session.prefix, &listing, &session.nav);
        session.displayed = Some(listing);
        Ok(Some(page))
    }

    fn plan(&self, prefix: Option<&str>, requested: u32) -> Result<Step, BrowseError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(prefix) = prefix {
            if state.session.as_ref().map(|s| s.prefix.as_str()) != Some(prefix) {
                state.reset(prefix);
            }
        }
        state.epoch += 1;
        let session = state.session.as_ref().ok_or_else(no_session)?;

        let target = match session.cursor.final_page() {
            Some(last) if requested > last => last,
            _ => requested,
        };

        if target == session.nav.current_page {
            if let Some(listing) = &session.displayed {
                return Ok(Step::Cached(Page::assemble(
                    &session.prefix,
                    listing,
                    &session.nav,
                )));
            }
        }

        let (start, token) = session.cursor.resume_point(target);
        Ok(Step::Walk(WalkPlan {
            epoch: state.epoch,
            generation: state.generation,
            prefix: session.prefix.clone(),
            start,
            token,
            target,
        }))
    }
}

fn no_session() -> BrowseError {
    BrowseError::InvalidState("no listing session, open a folder first".into())
}
