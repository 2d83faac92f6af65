//! Narrow interfaces onto the rest of the clinic: pets, users, the service
//! catalog, and notification delivery.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use ulid::Ulid;

use crate::access::Role;
use crate::model::{AppointmentStatus, Ms};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PetRecord {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Ulid,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub id: Ulid,
    pub duration_minutes: u32,
    pub is_active: bool,
}

#[async_trait]
pub trait PetDirectory: Send + Sync {
    async fn pet_by_id(&self, id: Ulid) -> Result<Option<PetRecord>, CollaboratorError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_by_id(&self, id: Ulid) -> Result<Option<UserRecord>, CollaboratorError>;
}

#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    async fn service_by_id(&self, id: Ulid) -> Result<Option<ServiceRecord>, CollaboratorError>;
}

/// Delivery is best-effort: the scheduler logs failures and moves on.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn status_changed(
        &self,
        appointment_id: Ulid,
        status: AppointmentStatus,
        owner_id: Ulid,
    ) -> Result<(), CollaboratorError>;

    async fn cancelled(
        &self,
        appointment_id: Ulid,
        owner_id: Ulid,
        subject_name: &str,
        start: Ms,
    ) -> Result<(), CollaboratorError>;
}

/// Everything the scheduler consumes from outside.
#[derive(Clone)]
pub struct Collaborators {
    pub pets: Arc<dyn PetDirectory>,
    pub users: Arc<dyn UserDirectory>,
    pub services: Arc<dyn ServiceCatalog>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl Collaborators {
    pub fn in_memory(directory: Arc<InMemoryDirectory>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            pets: directory.clone(),
            users: directory.clone(),
            services: directory,
            notifier,
        }
    }
}

/// Lookup tables held in memory. Useful for embedding and tests.
#[derive(Default)]
pub struct InMemoryDirectory {
    pets: DashMap<Ulid, PetRecord>,
    users: DashMap<Ulid, UserRecord>,
    services: DashMap<Ulid, ServiceRecord>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_pet(&self, pet: PetRecord) {
        self.pets.insert(pet.id, pet);
    }

    pub fn insert_user(&self, user: UserRecord) {
        self.users.insert(user.id, user);
    }

    pub fn insert_service(&self, service: ServiceRecord) {
        self.services.insert(service.id, service);
    }

    /// Convenience: register a user with `role` and return its id.
    pub fn add_user(&self, role: Role) -> Ulid {
        let id = Ulid::new();
        self.insert_user(UserRecord { id, role });
        id
    }

    pub fn add_pet(&self, owner_id: Ulid, name: &str) -> Ulid {
        let id = Ulid::new();
        self.insert_pet(PetRecord {
            id,
            owner_id,
            name: name.to_string(),
        });
        id
    }

    pub fn add_service(&self, duration_minutes: u32) -> Ulid {
        let id = Ulid::new();
        self.insert_service(ServiceRecord {
            id,
            duration_minutes,
            is_active: true,
        });
        id
    }

    pub fn deactivate_service(&self, id: Ulid) {
        if let Some(mut service) = self.services.get_mut(&id) {
            service.is_active = false;
        }
    }
}

#[async_trait]
impl PetDirectory for InMemoryDirectory {
    async fn pet_by_id(&self, id: Ulid) -> Result<Option<PetRecord>, CollaboratorError> {
        Ok(self.pets.get(&id).map(|e| e.value().clone()))
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn user_by_id(&self, id: Ulid) -> Result<Option<UserRecord>, CollaboratorError> {
        Ok(self.users.get(&id).map(|e| e.value().clone()))
    }
}

#[async_trait]
impl ServiceCatalog for InMemoryDirectory {
    async fn service_by_id(&self, id: Ulid) -> Result<Option<ServiceRecord>, CollaboratorError> {
        Ok(self.services.get(&id).map(|e| e.value().clone()))
    }
}
