use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use metrics::gauge;
use uuid::Uuid;

use crate::application::report::RenderedReport;

const METRIC_SESSIONS_STORED: &str = "bazi_sessions_stored";

/// Opaque browser session identifier carried in a cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug)]
struct StoredReport {
    report: Arc<RenderedReport>,
    stored_at: Instant,
}

/// Last successful report per session, bounded in size and age.
#[derive(Debug, Clone)]
pub struct SessionStore {
    ttl: Duration,
    capacity: usize,
    entries: Arc<DashMap<SessionId, StoredReport>>,
}

impl SessionStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Replace the session's report with a newer one.
    pub fn put(&self, id: SessionId, report: Arc<RenderedReport>) {
        let now = Instant::now();
        self.purge_expired(now);

        if !self.entries.contains_key(&id) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }

        self.entries.insert(
            id,
            StoredReport {
                report,
                stored_at: now,
            },
        );
        gauge!(METRIC_SESSIONS_STORED).set(self.entries.len() as f64);
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<RenderedReport>> {
        let now = Instant::now();
        let entry = self.entries.get(&id)?;
        if now.duration_since(entry.stored_at) < self.ttl {
            return Some(Arc::clone(&entry.report));
        }
        drop(entry);
        self.entries.remove(&id);
        None
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired(&self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, stored| now.duration_since(stored.stored_at) < ttl);
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().stored_at)
            .map(|entry| *entry.key());
        if let Some(id) = oldest {
            self.entries.remove(&id);
        }
    }
}
