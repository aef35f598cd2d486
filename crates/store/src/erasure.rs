//! Data-subject erasure — removes every trace of a user across the stores.
//!
//! Attempts are deleted through their owning notifications first, then the
//! notifications, preferences, and inbox entries themselves.

use std::sync::Arc;

use uuid::Uuid;

use herald_common::error::AppError;
use herald_engine::ports::{
    AttemptStore, InboxStore, NotificationFilters, NotificationStore, PreferencesStore,
};

const ERASURE_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErasureReport {
    pub notifications: u64,
    pub attempts: u64,
    pub preferences: u64,
}

pub struct UserDataEraser {
    notifications: Arc<dyn NotificationStore>,
    attempts: Arc<dyn AttemptStore>,
    preferences: Arc<dyn PreferencesStore>,
    inbox: Arc<dyn InboxStore>,
}

impl UserDataEraser {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        attempts: Arc<dyn AttemptStore>,
        preferences: Arc<dyn PreferencesStore>,
        inbox: Arc<dyn InboxStore>,
    ) -> Self {
        Self {
            notifications,
            attempts,
            preferences,
            inbox,
        }
    }

    /// Erase all stored data belonging to a user.
    pub async fn erase(&self, user_id: &str) -> Result<ErasureReport, AppError> {
        // Collect the user's notification ids so the attempt audit trail can
        // be removed with them
        let mut notification_ids: Vec<Uuid> = Vec::new();
        let mut page = 1;
        loop {
            let listing = self
                .notifications
                .find_by_filters(&NotificationFilters {
                    user_id: Some(user_id.to_string()),
                    page,
                    limit: ERASURE_PAGE_SIZE,
                    ..Default::default()
                })
                .await?;
            if listing.data.is_empty() {
                break;
            }
            notification_ids.extend(listing.data.iter().map(|n| n.id));
            if page >= listing.pages {
                break;
            }
            page += 1;
        }

        let attempts = if notification_ids.is_empty() {
            0
        } else {
            self.attempts
                .delete_by_notification_ids(&notification_ids)
                .await?
        };
        let notifications = self.notifications.delete_by_user_id(user_id).await?;
        let preferences = self.preferences.delete_by_user_id(user_id).await?;
        self.inbox.delete_by_user_id(user_id).await?;

        let report = ErasureReport {
            notifications,
            attempts,
            preferences,
        };

        tracing::info!(
            user_id,
            notifications = report.notifications,
            attempts = report.attempts,
            "User data erased"
        );

        Ok(report)
    }
}
