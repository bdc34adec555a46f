//! # Gallery and Quota Snapshots
//!
//! Response shapes for paginated listings and the daily generation quota.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One page of a listing. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// The page actually served (after clamping).
    pub page: usize,
    pub per_page: usize,
    pub total_items: usize,
    /// Zero when the listing is empty.
    pub total_pages: usize,
    pub has_prev: bool,
    pub has_next: bool,
}

impl<T> Page<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Transform the items while keeping the page geometry.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total_items: self.total_items,
            total_pages: self.total_pages,
            has_prev: self.has_prev,
            has_next: self.has_next,
        }
    }
}

/// Snapshot of a user's generation quota for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    /// Generations recorded today.
    pub used: u32,
    /// Daily allowance; 0 when quotas are disabled.
    pub limit: u32,
    /// `u32::MAX` when quotas are disabled.
    pub remaining: u32,
    /// The UTC day the counters belong to.
    pub day: NaiveDate,
    pub exhausted: bool,
    /// At or above the warning threshold but not yet exhausted.
    pub nearly_exhausted: bool,
}
