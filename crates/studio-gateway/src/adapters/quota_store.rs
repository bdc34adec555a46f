//! In-memory quota counters with an optional JSON snapshot file.
//!
//! Without a snapshot path the counters live only as long as the process.
//! With one, changes are written to a sibling temp file and renamed into
//! place, and startup reloads it. Inside a tokio runtime the write runs on
//! the blocking pool and at most one write is queued at a time; each write
//! captures the map as it is when the write starts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::Mutex;
use shared_types::UserId;
use tracing::{debug, warn};

use crate::domain::DailyUsage;
use crate::ports::QuotaStore;

type Ledger = DashMap<UserId, DailyUsage>;

struct Snapshot {
    path: PathBuf,
    /// A write is queued and has not yet read the ledger.
    pending: AtomicBool,
    /// Serializes snapshot writes.
    write_lock: Mutex<()>,
}

impl Snapshot {
    fn write(&self, usage: &Ledger) {
        let _guard = self.write_lock.lock();
        self.pending.store(false, Ordering::Release);
        let entries: HashMap<String, DailyUsage> = usage
            .iter()
            .map(|entry| (entry.key().to_string(), *entry.value()))
            .collect();
        if let Err(e) = write_snapshot(&self.path, &entries) {
            warn!(path = %self.path.display(), error = %e, "Failed to write quota snapshot");
        }
    }
}

pub struct InMemoryQuotaStore {
    usage: Arc<Ledger>,
    snapshot: Option<Arc<Snapshot>>,
}

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self {
            usage: Arc::new(DashMap::new()),
            snapshot: None,
        }
    }

    /// Open a store persisted at `path`, loading existing counters.
    ///
    /// A missing file starts empty. A corrupt file is logged and ignored.
    pub fn with_snapshot(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let usage = DashMap::new();
        match load_snapshot(&path) {
            Ok(entries) => {
                debug!(path = %path.display(), users = entries.len(), "Loaded quota snapshot");
                for (user, record) in entries {
                    usage.insert(UserId::new(user), record);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Ignoring unreadable quota snapshot"),
        }
        Self {
            usage: Arc::new(usage),
            snapshot: Some(Arc::new(Snapshot {
                path,
                pending: AtomicBool::new(false),
                write_lock: Mutex::new(()),
            })),
        }
    }

    pub fn len(&self) -> usize {
        self.usage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usage.is_empty()
    }

    fn persist(&self) {
        let Some(snapshot) = &self.snapshot else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                if snapshot.pending.swap(true, Ordering::AcqRel) {
                    return;
                }
                let snapshot = Arc::clone(snapshot);
                let usage = Arc::clone(&self.usage);
                handle.spawn_blocking(move || snapshot.write(&usage));
            }
            Err(_) => snapshot.write(&self.usage),
        }
    }
}

impl Default for InMemoryQuotaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotaStore for InMemoryQuotaStore {
    fn load(&self, user: &UserId) -> Option<DailyUsage> {
        self.usage.get(user).map(|record| *record)
    }

    fn try_increment(&self, user: &UserId, day: NaiveDate, limit: Option<u32>) -> Option<u32> {
        let count = {
            // the entry guard holds the shard lock across the check and the bump
            let mut record = self
                .usage
                .entry(user.clone())
                .or_insert(DailyUsage { day, count: 0 });
            if record.day != day {
                *record = DailyUsage { day, count: 0 };
            }
            if limit.is_some_and(|limit| record.count >= limit) {
                return None;
            }
            record.count = record.count.saturating_add(1);
            record.count
        };
        self.persist();
        Some(count)
    }

    fn decrement(&self, user: &UserId, day: NaiveDate) {
        let changed = match self.usage.get_mut(user) {
            Some(mut record) if record.day == day && record.count > 0 => {
                record.count -= 1;
                true
            }
            _ => false,
        };
        if changed {
            self.persist();
        }
    }

    fn prune(&self, today: NaiveDate) -> usize {
        let before = self.usage.len();
        self.usage.retain(|_, record| record.day >= today);
        let removed = before.saturating_sub(self.usage.len());
        if removed > 0 {
            self.persist();
        }
        removed
    }

    /// Write the snapshot now, on the calling thread.
    fn flush(&self) {
        if let Some(snapshot) = &self.snapshot {
            snapshot.write(&self.usage);
        }
    }
}

fn load_snapshot(path: &Path) -> std::io::Result<HashMap<String, DailyUsage>> {
    let raw = std::fs::read(path)?;
    serde_json::from_slice(&raw)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn write_snapshot(path: &Path, entries: &HashMap<String, DailyUsage>) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(entries)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)
}
