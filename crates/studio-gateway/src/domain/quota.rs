//! Daily generation quota.
//!
//! Counters are keyed by user and UTC day. A stored record from an earlier
//! day reads as zero, so the allowance resets at midnight UTC; a periodic
//! [`cleanup_task`] drops those stale records. A generation takes its slot
//! up front through [`DailyQuota::reserve`], so overlapping requests from
//! one user cannot overshoot the limit. Only committed slots stay counted.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shared_types::{QuotaStatus, UserId};
use tracing::debug;

use super::config::QuotaConfig;
use super::error::{ApiError, ApiResult};
use crate::ports::{QuotaStore, TimeSource};

/// Generations recorded for one user on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub day: NaiveDate,
    pub count: u32,
}

impl DailyUsage {
    /// Count for `today`, treating stale records as empty.
    pub fn count_on(&self, today: NaiveDate) -> u32 {
        if self.day == today {
            self.count
        } else {
            0
        }
    }
}

/// A generation slot held for one user.
///
/// Dropping it without [`commit`](Self::commit) gives the slot back, which
/// also covers a request future that is cancelled mid-generation.
#[must_use = "dropping a reservation releases the slot"]
pub struct QuotaReservation {
    store: Arc<dyn QuotaStore>,
    user: UserId,
    day: NaiveDate,
    committed: bool,
}

impl QuotaReservation {
    pub fn day(&self) -> NaiveDate {
        self.day
    }

    /// Keep the slot counted.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for QuotaReservation {
    fn drop(&mut self) {
        if !self.committed {
            self.store.decrement(&self.user, self.day);
            debug!(user_id = %self.user, "Released quota reservation");
        }
    }
}

/// Quota policy over a [`QuotaStore`].
#[derive(Clone)]
pub struct DailyQuota {
    config: QuotaConfig,
    store: Arc<dyn QuotaStore>,
}

impl DailyQuota {
    pub fn new(config: QuotaConfig, store: Arc<dyn QuotaStore>) -> Self {
        Self { config, store }
    }

    pub fn limit(&self) -> u32 {
        self.config.daily_limit
    }

    pub fn status(&self, user: &UserId, today: NaiveDate) -> QuotaStatus {
        let used = self
            .store
            .load(user)
            .map(|usage| usage.count_on(today))
            .unwrap_or(0);
        self.status_for(used, today)
    }

    /// Take one of today's slots, or fail with `QuotaExceeded` once the
    /// allowance is used up. Check and increment are one atomic step.
    pub fn reserve(&self, user: &UserId, today: NaiveDate) -> ApiResult<QuotaReservation> {
        let limit = self.config.enabled.then_some(self.config.daily_limit);
        match self.store.try_increment(user, today, limit) {
            Some(used) => {
                debug!(user_id = %user, used, "Reserved generation slot");
                Ok(QuotaReservation {
                    store: Arc::clone(&self.store),
                    user: user.clone(),
                    day: today,
                    committed: false,
                })
            }
            None => Err(ApiError::quota_exceeded(self.config.daily_limit)),
        }
    }

    /// Drop counters from days before `today`.
    pub fn prune(&self, today: NaiveDate) -> usize {
        self.store.prune(today)
    }

    fn status_for(&self, used: u32, day: NaiveDate) -> QuotaStatus {
        if !self.config.enabled {
            return QuotaStatus {
                used,
                limit: 0,
                remaining: u32::MAX,
                day,
                exhausted: false,
                nearly_exhausted: false,
            };
        }
        let limit = self.config.daily_limit;
        let exhausted = used >= limit;
        let warn_at = f64::from(limit) * self.config.warning_ratio;
        QuotaStatus {
            used,
            limit,
            remaining: limit.saturating_sub(used),
            day,
            exhausted,
            nearly_exhausted: !exhausted && f64::from(used) >= warn_at,
        }
    }
}

/// Background task dropping quota records from earlier days.
pub async fn cleanup_task(quota: DailyQuota, clock: Arc<dyn TimeSource>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let removed = quota.prune(clock.today());
        if removed > 0 {
            debug!(removed, "Pruned stale quota records");
        }
    }
}
