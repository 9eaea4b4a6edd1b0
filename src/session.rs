//! Pagination sessions. Previous/Next buttons carry a session id; the session remembers which
//! listing is being paged, its filters, and the page currently shown.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::query::{AdminLogFilter, UserFilter};

/// Matches the platform's interaction window.
pub const SESSION_TTL_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagedListing {
    Leaderboard,
    TransactionLog { user_id: i32 },
    AdminTransactionLog(AdminLogFilter),
    Users(UserFilter),
}

impl PagedListing {
    pub fn requires_admin(&self) -> bool {
        !matches!(self, PagedListing::Leaderboard)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagerSession {
    pub listing: PagedListing,
    pub page: i64,
    pub created_at: DateTime<Utc>,
}

impl PagerSession {
    fn expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::minutes(SESSION_TTL_MINUTES)
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, PagerSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock leaves the map itself intact.
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, PagerSession>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn open(&self, listing: PagedListing, page: i64) -> Uuid {
        self.open_at(listing, page, Utc::now())
    }

    fn open_at(&self, listing: PagedListing, page: i64, now: DateTime<Utc>) -> Uuid {
        let id = Uuid::new_v4();
        let mut sessions = self.lock();
        sessions.retain(|_, session| !session.expired(now));
        sessions.insert(
            id,
            PagerSession {
                listing,
                page,
                created_at: now,
            },
        );
        id
    }

    /// The live session for `id`, if it exists and has not expired.
    pub fn get(&self, id: Uuid) -> Option<PagerSession> {
        self.get_at(id, Utc::now())
    }

    fn get_at(&self, id: Uuid, now: DateTime<Utc>) -> Option<PagerSession> {
        let mut sessions = self.lock();
        let session = *sessions.get(&id)?;
        if session.expired(now) {
            sessions.remove(&id);
            return None;
        }
        Some(session)
    }

    /// Records that `page` is now the one on display.
    pub fn set_page(&self, id: Uuid, page: i64) {
        if let Some(session) = self.lock().get_mut(&id) {
            session.page = page;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
