//! Who may act on which appointment: a closed role set and a
//! {role × action} capability matrix.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use crate::model::Appointment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Manager,
    Staff,
    Doctor,
    Customer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Admin => "Admin",
            Role::Manager => "Manager",
            Role::Staff => "Staff",
            Role::Doctor => "Doctor",
            Role::Customer => "Customer",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "staff" => Ok(Role::Staff),
            "doctor" => Ok(Role::Doctor),
            "customer" => Ok(Role::Customer),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    View,
    Cancel,
    Reschedule,
    UpdateStatus,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::View => "view",
            Action::Cancel => "cancel",
            Action::Reschedule => "reschedule",
            Action::UpdateStatus => "update the status of",
        };
        f.write_str(s)
    }
}

/// Which appointments a granted capability reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Denied,
    Any,
    /// Appointments where the actor is the practitioner.
    OwnPractice,
    /// Appointments for pets the actor owns.
    OwnPets,
}

pub fn scope(role: Role, action: Action) -> Scope {
    match (role, action) {
        (Role::Admin | Role::Manager | Role::Staff, _) => Scope::Any,
        (Role::Doctor, _) => Scope::OwnPractice,
        (Role::Customer, Action::UpdateStatus) => Scope::Denied,
        (Role::Customer, _) => Scope::OwnPets,
    }
}

/// The identity performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Ulid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Ulid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_customer(&self) -> bool {
        self.role == Role::Customer
    }
}

/// Decide access. `pet_owner` is only consulted for `OwnPets` scope; pass
/// `None` when the pet could not be resolved.
pub fn permits(
    actor: &Actor,
    action: Action,
    appointment: &Appointment,
    pet_owner: Option<Ulid>,
) -> bool {
    match scope(actor.role, action) {
        Scope::Denied => false,
        Scope::Any => true,
        Scope::OwnPractice => appointment.practitioner_id == actor.id,
        Scope::OwnPets => pet_owner == Some(actor.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AppointmentStatus, Span};

    fn appointment(practitioner_id: Ulid, subject_id: Ulid) -> Appointment {
        Appointment {
            id: Ulid::new(),
            practitioner_id,
            subject_id,
            service_id: Ulid::new(),
            span: Span::new(1_000, 2_000),
            status: AppointmentStatus::Scheduled,
            notes: None,
            created_at: 0,
        }
    }

    #[test]
    fn parse_roles_case_insensitively() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" doctor ".parse::<Role>().unwrap(), Role::Doctor);
        let err = "Janitor".parse::<Role>().unwrap_err();
        assert_eq!(err, UnknownRole("Janitor".into()));
        assert_eq!(err.to_string(), "unknown role: Janitor");
    }

    #[test]
    fn staff_roles_reach_everything() {
        let appt = appointment(Ulid::new(), Ulid::new());
        for role in [Role::Admin, Role::Manager, Role::Staff] {
            let actor = Actor::new(Ulid::new(), role);
            for action in [Action::View, Action::Cancel, Action::Reschedule, Action::UpdateStatus] {
                assert!(permits(&actor, action, &appt, None));
            }
        }
    }

    #[test]
    fn doctor_only_reaches_own_practice() {
        let doctor = Ulid::new();
        let mine = appointment(doctor, Ulid::new());
        let theirs = appointment(Ulid::new(), Ulid::new());
        let actor = Actor::new(doctor, Role::Doctor);
        assert!(permits(&actor, Action::Cancel, &mine, None));
        assert!(!permits(&actor, Action::Cancel, &theirs, None));
    }

    #[test]
    fn customer_reaches_own_pets_only() {
        let customer = Ulid::new();
        let actor = Actor::new(customer, Role::Customer);
        let a1 = appointment(Ulid::new(), Ulid::new());
        assert!(permits(&actor, Action::View, &a1, Some(customer)));
        assert!(!permits(&actor, Action::View, &a1, Some(Ulid::new())));
        assert!(!permits(&actor, Action::View, &a1, None));
        assert!(!permits(&actor, Action::UpdateStatus, &a1, Some(customer)));
    }
}
