//! # Notification Scheduler
//!
//! Turns a day's prayer set into one-shot device notifications and keeps the persisted
//! [`NotificationBatch`] as the single source of truth for what is active.
//!
//! ## Batch lifecycle
//! ```text
//! Empty --schedule--> Scheduled --day rollover / settings change--> Stale --cancel_all--> Empty
//!                     Scheduled --cancel_all (notifications disabled)--------------------> Empty
//! ```
//!
//! `cancel_all` then `schedule` is a two-step sequence with no transaction around it. If the
//! process dies in between, the device has no prayer notifications until the next run, which
//! is acceptable; duplicates are not.
//!
//! Operations on one scheduler are serialized by an async lock, so concurrent `reschedule`
//! calls end with exactly the last batch active. Schedulers that share a device but not a
//! lock are kept honest by a sweep after every `schedule`: any pending prayer notification
//! that is not in the batch just persisted is cancelled. Under that interleaving the device
//! may end up with fewer notifications than prayers, never two for one prayer.

use crate::clock::Clock;
use crate::error::{PermissionKind, PrayerError, Result};
use crate::store::{self, KeyValueStore, NOTIFICATION_BATCH_KEY};
use crate::{DailyPrayerTimes, NotificationBatch, NotificationId, PrayerName, PrayerTime};
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

/// Category attached to every notification this crate schedules.
pub const PRAYER_CATEGORY: &str = "prayer-times";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub fire_at: DateTime<FixedOffset>,
    pub prayer: PrayerName,
    pub category: String,
}

/// A notification the device reports as pending.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledNotification {
    pub id: NotificationId,
    pub request: NotificationRequest,
}

/// Device local-notification API.
#[async_trait]
pub trait NotificationCenter: Send + Sync {
    async fn has_permission(&self) -> bool;
    async fn schedule(&self, request: NotificationRequest) -> Result<NotificationId>;
    async fn cancel(&self, id: &NotificationId) -> Result<()>;
    async fn list_scheduled(&self) -> Result<Vec<ScheduledNotification>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchState {
    Empty,
    Scheduled,
    /// Persisted for a day other than today
    Stale,
}

pub struct NotificationScheduler {
    center: Arc<dyn NotificationCenter>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    batch_lock: AsyncMutex<()>,
}

impl NotificationScheduler {
    pub fn new(
        center: Arc<dyn NotificationCenter>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        NotificationScheduler {
            center,
            store,
            clock,
            batch_lock: AsyncMutex::new(()),
        }
    }

    /// Schedule one notification per prayer that is still in the future and persist the batch.
    ///
    /// A batch that is still persisted is cancelled first. Individual failures are logged and
    /// skipped, so the returned batch may hold fewer IDs than there are upcoming prayers.
    pub async fn schedule(&self, times: &DailyPrayerTimes) -> Result<NotificationBatch> {
        let _guard = self.batch_lock.lock().await;
        self.schedule_locked(times).await
    }

    async fn schedule_locked(&self, times: &DailyPrayerTimes) -> Result<NotificationBatch> {
        if !self.center.has_permission().await {
            warn!("Notification permission not granted");
            return Err(PrayerError::PermissionDenied(PermissionKind::Notifications));
        }

        if !self.load_batch()?.is_empty() {
            debug!("Replacing previously persisted notification batch");
            self.cancel_all_locked().await?;
        }

        let now = self.clock.now();
        let mut batch = NotificationBatch {
            date_key: Some(times.date_key),
            ..Default::default()
        };

        for prayer in times.upcoming(now) {
            match self.center.schedule(prayer_request(prayer)).await {
                Ok(id) => batch.ids.push(id),
                Err(err) => {
                    let err = PrayerError::NotificationScheduling {
                        prayer: prayer.name,
                        reason: err.to_string(),
                    };
                    warn!(error = %err, "Skipping notification");
                }
            }
        }

        self.save_batch(&batch)?;
        self.cancel_pending_except(&batch).await;
        info!(date = %times.date_key, count = batch.ids.len(), "Scheduled prayer notifications");
        Ok(batch)
    }

    /// Cancel every persisted notification, clear the batch and sweep orphans.
    pub async fn cancel_all(&self) -> Result<()> {
        let _guard = self.batch_lock.lock().await;
        self.cancel_all_locked().await
    }

    async fn cancel_all_locked(&self) -> Result<()> {
        let batch = self.load_batch()?;
        let mut cancelled = 0usize;

        for id in batch.all_ids() {
            match self.center.cancel(id).await {
                Ok(()) => cancelled += 1,
                Err(err) => warn!(%id, error = %err, "Failed to cancel notification"),
            }
        }
        self.store.remove(NOTIFICATION_BATCH_KEY)?;
        cancelled += self.cancel_pending_except(&NotificationBatch::default()).await;

        debug!(cancelled, "Cancelled prayer notifications");
        Ok(())
    }

    /// Cancel every pending prayer notification that `keep` does not own.
    ///
    /// Another scheduler on the same device may have persisted its batch over ours; whatever
    /// it left behind is unreachable from the store and would otherwise fire twice.
    async fn cancel_pending_except(&self, keep: &NotificationBatch) -> usize {
        let pending = match self.center.list_scheduled().await {
            Ok(pending) => pending,
            Err(err) => {
                warn!(error = %err, "Could not list scheduled notifications");
                return 0;
            }
        };

        let mut cancelled = 0;
        for orphan in pending
            .iter()
            .filter(|n| n.request.category == PRAYER_CATEGORY)
            .filter(|n| !keep.all_ids().any(|id| id == &n.id))
        {
            debug!(id = %orphan.id, "Cancelling orphaned prayer notification");
            match self.center.cancel(&orphan.id).await {
                Ok(()) => cancelled += 1,
                Err(err) => warn!(id = %orphan.id, error = %err, "Failed to cancel orphan"),
            }
        }
        cancelled
    }

    /// `cancel_all` followed by `schedule`, with no other operation of this scheduler between.
    pub async fn reschedule(&self, times: &DailyPrayerTimes) -> Result<NotificationBatch> {
        let _guard = self.batch_lock.lock().await;
        self.cancel_all_locked().await?;
        self.schedule_locked(times).await
    }

    /// Secondary one-shot notification `minutes_before` the prayer.
    ///
    /// Returns `None` when the reminder instant has already passed. `minutes_before` must be
    /// positive; a reminder never fires after its prayer.
    pub async fn schedule_reminder(
        &self,
        prayer: &PrayerTime,
        minutes_before: i64,
    ) -> Result<Option<NotificationId>> {
        let out_of_range =
            || PrayerError::Config(format!("reminder lead of {minutes_before} minutes out of range"));
        let lead = Duration::try_minutes(minutes_before)
            .filter(|lead| *lead > Duration::zero())
            .ok_or_else(out_of_range)?;
        let fire_at = prayer.instant.checked_sub_signed(lead).ok_or_else(out_of_range)?;

        let _guard = self.batch_lock.lock().await;
        if fire_at <= self.clock.now() {
            return Ok(None);
        }
        if !self.center.has_permission().await {
            return Err(PrayerError::PermissionDenied(PermissionKind::Notifications));
        }

        let request = NotificationRequest {
            title: format!("{} in {} minutes", prayer.name, minutes_before),
            body: format!("{} ({}) at {}", prayer.name, prayer.arabic_name, prayer.time),
            fire_at,
            prayer: prayer.name,
            category: PRAYER_CATEGORY.to_string(),
        };
        let id = self
            .center
            .schedule(request)
            .await
            .map_err(|err| PrayerError::NotificationScheduling {
                prayer: prayer.name,
                reason: err.to_string(),
            })?;

        let mut batch = self.load_batch()?;
        batch.reminder_ids.push(id.clone());
        self.save_batch(&batch)?;
        Ok(Some(id))
    }

    pub fn active_batch(&self) -> Result<NotificationBatch> {
        self.load_batch()
    }

    pub fn batch_state(&self, today: NaiveDate) -> Result<BatchState> {
        let batch = self.load_batch()?;
        Ok(match batch.date_key {
            _ if batch.is_empty() => BatchState::Empty,
            Some(day) if day == today => BatchState::Scheduled,
            _ => BatchState::Stale,
        })
    }

    fn load_batch(&self) -> Result<NotificationBatch> {
        Ok(store::load_json(&*self.store, NOTIFICATION_BATCH_KEY)?.unwrap_or_default())
    }

    fn save_batch(&self, batch: &NotificationBatch) -> Result<()> {
        store::save_json(&*self.store, NOTIFICATION_BATCH_KEY, batch)
    }
}

fn prayer_request(prayer: &PrayerTime) -> NotificationRequest {
    NotificationRequest {
        title: format!("{} {}", prayer.name, prayer.arabic_name),
        body: format!("It is time for {} ({})", prayer.name, prayer.time),
        fire_at: prayer.instant,
        prayer: prayer.name,
        category: PRAYER_CATEGORY.to_string(),
    }
}

/// In-memory notification center that logs instead of alerting; for the CLI and headless hosts.
#[derive(Debug, Default)]
pub struct LogNotificationCenter {
    pending: Mutex<Vec<ScheduledNotification>>,
    next_id: AtomicU64,
}

impl LogNotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationCenter for LogNotificationCenter {
    async fn has_permission(&self) -> bool {
        true
    }

    async fn schedule(&self, request: NotificationRequest) -> Result<NotificationId> {
        let id = format!("prayer-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        info!(%id, title = %request.title, at = %request.fire_at, "Notification scheduled");
        self.pending.lock().push(ScheduledNotification {
            id: id.clone(),
            request,
        });
        Ok(id)
    }

    async fn cancel(&self, id: &NotificationId) -> Result<()> {
        self.pending.lock().retain(|n| &n.id != id);
        Ok(())
    }

    async fn list_scheduled(&self) -> Result<Vec<ScheduledNotification>> {
        Ok(self.pending.lock().clone())
    }
}
