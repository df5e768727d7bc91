//! Alert prioritizer
//!
//! Merges open emergencies and unread notifications into one ordered feed.
//! Emergencies always come first, highest severity first; notifications
//! follow, newest first.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::api::DashboardApi;
use crate::snapshot::SnapshotAggregator;
use crate::types::{DashboardSnapshot, Emergency, Notification};

/// One entry of the alert feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    /// Open emergency; always ahead of every notification
    Emergency(Emergency),
    /// Unread notification
    Notification(Notification),
}

impl FeedItem {
    /// Identifier of the underlying emergency or notification
    pub fn id(&self) -> &str {
        match self {
            FeedItem::Emergency(e) => &e.id,
            FeedItem::Notification(n) => &n.id,
        }
    }

    /// Server creation time, the secondary sort key
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            FeedItem::Emergency(e) => e.created_at,
            FeedItem::Notification(n) => n.created_at,
        }
    }

    /// Whether the item is an emergency
    pub fn is_emergency(&self) -> bool {
        matches!(self, FeedItem::Emergency(_))
    }
}

/// Outcome of a dismiss request. Rejections are reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DismissOutcome {
    /// Server marked the notification read; it is hidden from the feed
    Dismissed,
    /// Server refused; the notification stays in the feed
    Rejected {
        /// Server error text, verbatim
        message: String,
    },
}

/// Build the ordered feed.
///
/// Completed emergencies and read notifications are left out. Sorting is
/// stable, so items with equal keys keep their input order.
pub fn build_feed(notifications: &[Notification], emergencies: &[Emergency]) -> Vec<FeedItem> {
    let mut open: Vec<&Emergency> = emergencies.iter().filter(|e| e.is_open()).collect();
    open.sort_by_key(|e| (Reverse(e.severity.rank()), Reverse(e.created_at)));

    let mut unread: Vec<&Notification> = notifications.iter().filter(|n| !n.is_read).collect();
    unread.sort_by_key(|n| Reverse(n.created_at));

    open.into_iter()
        .cloned()
        .map(FeedItem::Emergency)
        .chain(unread.into_iter().cloned().map(FeedItem::Notification))
        .collect()
}

/// Produces the feed from the current snapshot and handles dismissals.
pub struct AlertPrioritizer<A: DashboardApi> {
    aggregator: Arc<SnapshotAggregator<A>>,
    dismissed: Mutex<HashSet<String>>,
}

impl<A: DashboardApi> AlertPrioritizer<A> {
    pub fn new(aggregator: Arc<SnapshotAggregator<A>>) -> Self {
        Self {
            aggregator,
            dismissed: Mutex::new(HashSet::new()),
        }
    }

    /// Feed for the snapshot currently in the store; empty before the first
    /// load.
    pub async fn feed(&self) -> Vec<FeedItem> {
        match self.aggregator.store().snapshot().await {
            Some(snapshot) => self.feed_for(&snapshot),
            None => Vec::new(),
        }
    }

    /// Feed for a given snapshot, minus locally dismissed notifications.
    pub fn feed_for(&self, snapshot: &DashboardSnapshot) -> Vec<FeedItem> {
        let mut dismissed = match self.dismissed.lock() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Forget ids the server no longer reports as unread
        dismissed.retain(|id| {
            snapshot
                .alerts
                .iter()
                .any(|n| n.id == *id && !n.is_read)
        });

        build_feed(&snapshot.alerts, &snapshot.active_emergencies)
            .into_iter()
            .filter(|item| item.is_emergency() || !dismissed.contains(item.id()))
            .collect()
    }

    /// Ask the server to mark a notification read.
    ///
    /// On success the item leaves the feed and a forced refresh is attempted;
    /// on rejection the item stays and the server's message is returned.
    pub async fn dismiss(&self, notification_id: &str) -> DismissOutcome {
        if let Err(e) = self
            .aggregator
            .api()
            .mark_notification_read(notification_id)
            .await
        {
            warn!(notification_id, error = %e, "Dismiss rejected");
            return DismissOutcome::Rejected {
                message: e.to_string(),
            };
        }

        match self.dismissed.lock() {
            Ok(mut set) => set.insert(notification_id.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(notification_id.to_string()),
        };
        info!(notification_id, "Notification dismissed");

        if let Err(e) = self.aggregator.refresh_forced().await {
            warn!(error = %e, "Refresh after dismiss failed");
        }

        DismissOutcome::Dismissed
    }

    /// Number of locally dismissed ids still awaiting server confirmation
    pub fn pending_dismissals(&self) -> usize {
        match self.dismissed.lock() {
            Ok(set) => set.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
