use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::directory::{CollaboratorError, NotificationSink};
use crate::model::{AppointmentStatus, Ms};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    StatusChanged {
        appointment_id: Ulid,
        status: AppointmentStatus,
    },
    Cancelled {
        appointment_id: Ulid,
        subject_name: String,
        start: Ms,
    },
}

/// In-process broadcast hub, one channel per pet owner.
#[derive(Default)]
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Notification>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to notifications for an owner. Creates the channel if needed.
    pub fn subscribe(&self, owner_id: Ulid) -> broadcast::Receiver<Notification> {
        let sender = self
            .channels
            .entry(owner_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, owner_id: Ulid, notification: Notification) {
        if let Some(sender) = self.channels.get(&owner_id) {
            let _ = sender.send(notification);
        }
    }

    pub fn remove(&self, owner_id: &Ulid) {
        self.channels.remove(owner_id);
    }
}

#[async_trait]
impl NotificationSink for NotifyHub {
    async fn status_changed(
        &self,
        appointment_id: Ulid,
        status: AppointmentStatus,
        owner_id: Ulid,
    ) -> Result<(), CollaboratorError> {
        self.send(owner_id, Notification::StatusChanged { appointment_id, status });
        Ok(())
    }

    async fn cancelled(
        &self,
        appointment_id: Ulid,
        owner_id: Ulid,
        subject_name: &str,
        start: Ms,
    ) -> Result<(), CollaboratorError> {
        self.send(
            owner_id,
            Notification::Cancelled {
                appointment_id,
                subject_name: subject_name.to_string(),
                start,
            },
        );
        Ok(())
    }
}
