//! Pool of simulated client identities.
//!
//! Each session is a user-agent plus its own cookie jar (a dedicated
//! `reqwest::Client`), leased per outbound request. The pool is capped:
//! minting past the cap evicts the least-recently-used available identity,
//! and the periodic sweep replaces expired identities with fresh ones
//! instead of reviving them.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::fetch::user_agent::random_user_agent;

/// A leased identity handle. `Client` is cheap to clone (Arc internally),
/// so handing one out does not copy the connection pool or cookie jar.
#[derive(Clone)]
pub struct Session {
    pub id: String,
    pub user_agent: &'static str,
    pub client: Client,
}

struct PoolEntry {
    session: Session,
    available: bool,
    created_at: Instant,
    created: DateTime<Utc>,
    last_used: Instant,
    request_count: u64,
}

impl PoolEntry {
    fn mint(connect_timeout: Duration) -> Self {
        let user_agent = random_user_agent();
        let client = Client::builder()
            .user_agent(user_agent)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .connect_timeout(connect_timeout)
            .build()
            .expect("Failed to create HTTP client");
        let id = Uuid::new_v4().to_string();
        debug!("minted session {} ({})", id, user_agent);
        Self {
            session: Session {
                id,
                user_agent,
                client,
            },
            available: true,
            created_at: Instant::now(),
            created: Utc::now(),
            last_used: Instant::now(),
            request_count: 0,
        }
    }
}

/// Diagnostic snapshot of one session, for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub id: String,
    pub user_agent: String,
    pub created: DateTime<Utc>,
    pub request_count: u64,
    pub available: bool,
    pub age_secs: u64,
    pub idle_secs: u64,
}

/// Capped pool of sessions with TTL-based identity rotation.
pub struct SessionPool {
    max_sessions: usize,
    session_ttl: Duration,
    connect_timeout: Duration,
    entries: Mutex<Vec<PoolEntry>>,
}

impl SessionPool {
    pub fn new(max_sessions: usize, session_ttl: Duration) -> Self {
        Self {
            max_sessions,
            session_ttl,
            connect_timeout: Duration::from_secs(10),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Lease a session. Scans for an available identity younger than the
    /// TTL; mints a new one otherwise. Never fails. The scan and the
    /// availability flip happen under one lock, so two concurrent leases
    /// cannot observe the same session as available.
    pub fn lease(&self) -> Session {
        let mut entries = self.entries.lock().expect("session pool poisoned");

        if let Some(entry) = entries
            .iter_mut()
            .find(|e| e.available && e.created_at.elapsed() < self.session_ttl)
        {
            entry.available = false;
            entry.last_used = Instant::now();
            entry.request_count += 1;
            return entry.session.clone();
        }

        // No usable identity. Make room if the pool is at the cap by
        // dropping the least-recently-used available entry.
        if entries.len() >= self.max_sessions {
            if let Some(idx) = entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.available)
                .min_by_key(|(_, e)| e.last_used)
                .map(|(i, _)| i)
            {
                let evicted = entries.remove(idx);
                debug!("pool at cap, evicted session {}", evicted.session.id);
            }
        }

        let mut entry = PoolEntry::mint(self.connect_timeout);
        entry.available = false;
        entry.request_count = 1;
        let session = entry.session.clone();
        entries.push(entry);
        session
    }

    /// Mark a session available again, success or failure of the request.
    pub fn release(&self, session_id: &str) {
        let mut entries = self.entries.lock().expect("session pool poisoned");
        if let Some(entry) = entries.iter_mut().find(|e| e.session.id == session_id) {
            entry.available = true;
        }
    }

    /// Replace expired idle identities with freshly minted ones. In-flight
    /// sessions are left alone and rotate on a later sweep.
    pub fn sweep(&self) {
        let mut entries = self.entries.lock().expect("session pool poisoned");
        let mut rotated = 0;
        for entry in entries.iter_mut() {
            if entry.available && entry.created_at.elapsed() >= self.session_ttl {
                *entry = PoolEntry::mint(self.connect_timeout);
                rotated += 1;
            }
        }
        if rotated > 0 {
            info!("rotated {} expired sessions", rotated);
        }
    }

    /// Number of sessions currently in the pool.
    pub fn size(&self) -> usize {
        self.entries.lock().expect("session pool poisoned").len()
    }

    /// Snapshot for the status endpoint.
    pub fn stats(&self) -> Vec<SessionStats> {
        let entries = self.entries.lock().expect("session pool poisoned");
        entries
            .iter()
            .map(|e| SessionStats {
                id: e.session.id.clone(),
                user_agent: e.session.user_agent.to_string(),
                created: e.created,
                request_count: e.request_count,
                available: e.available,
                age_secs: e.created_at.elapsed().as_secs(),
                idle_secs: e.last_used.elapsed().as_secs(),
            })
            .collect()
    }
}
