//! In-memory store for asynchronous collection jobs.
//!
//! A YouTube trigger hands the frontend a local job id that maps to the
//! provider snapshot id plus the keywords the run was filtered by. Entries
//! expire after an hour; a snapshot that has not materialized by then is
//! not coming back, and expiry keeps the map from growing without bound.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use std::sync::Mutex;

use uuid::Uuid;

const JOB_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct JobEntry {
    pub keywords: Vec<String>,
    pub snapshot_id: Option<String>,
    created_at: Instant,
}

/// Thread-safe job map with lazy expiry: stale entries are swept on every
/// insert and lookups of expired jobs report absent.
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    inner: Arc<Mutex<HashMap<String, JobEntry>>>,
}

impl JobStore {
    /// Registers a job and returns its id.
    pub fn insert(&self, keywords: Vec<String>, snapshot_id: Option<String>) -> String {
        let id = Uuid::new_v4().simple().to_string();
        let entry = JobEntry {
            keywords,
            snapshot_id,
            created_at: Instant::now(),
        };
        let mut map = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        map.retain(|_, e| e.created_at.elapsed() < JOB_TTL);
        map.insert(id.clone(), entry);
        id
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<JobEntry> {
        let map = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        map.get(id)
            .filter(|e| e.created_at.elapsed() < JOB_TTL)
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
