use chrono::Weekday;
use thiserror::Error;
use ulid::Ulid;

use crate::access::{Action, Role};
use crate::directory::CollaboratorError;
use crate::model::AppointmentStatus;

/// A rule the caller's input broke. The message names the rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("pet {0} does not exist")]
    UnknownSubject(Ulid),
    #[error("user {0} does not exist")]
    UnknownPractitioner(Ulid),
    #[error("user {id} is a {role}, not a doctor")]
    NotADoctor { id: Ulid, role: Role },
    #[error("service {0} does not exist")]
    UnknownService(Ulid),
    #[error("service {0} is not active")]
    InactiveService(Ulid),
    #[error("service duration must be between 1 and {max} minutes")]
    ServiceDuration { max: u32 },
    #[error("start time must be in the future")]
    StartInPast,
    #[error("appointments must start between {open_hour:02}:00 and {close_hour:02}:00")]
    OutsideBusinessHours { open_hour: u32, close_hour: u32 },
    #[error("the clinic is closed on {0}")]
    ClosedDay(Weekday),
    #[error("changes require at least {hours} hours notice")]
    InsufficientNotice { hours: u32 },
    #[error("end time must be after start time")]
    EndNotAfterStart,
    #[error("block duration must be between {min_minutes} and {max_minutes} minutes")]
    BlockDuration { min_minutes: u32, max_minutes: u32 },
    #[error("{0} blocks need an explicit start and end")]
    NoPreset(crate::model::BlockCategory),
    #[error("appointment is already {0}")]
    Finalized(AppointmentStatus),
    #[error("appointment has already started")]
    AlreadyStarted,
    #[error("cannot move an appointment from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    #[error("{0} is set through its own operation")]
    DedicatedOperation(AppointmentStatus),
    #[error("{0}")]
    Limit(&'static str),
}

/// Why a window was refused. Appointment conflicts are reported before blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictCause {
    Appointment(Ulid),
    Block(Ulid),
}

impl ConflictCause {
    pub fn reason(&self) -> &'static str {
        match self {
            ConflictCause::Appointment(_) => "the doctor has another appointment at this time",
            ConflictCause::Block(_) => "the doctor is unavailable due to personal schedule",
        }
    }

    pub fn interval_id(&self) -> Ulid {
        match self {
            ConflictCause::Appointment(id) | ConflictCause::Block(id) => *id,
        }
    }
}

/// Coarse classification for callers mapping errors onto responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Forbidden,
    NotFound,
    Internal,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    Invalid(#[from] Violation),
    #[error("time slot unavailable: {}", .0.reason())]
    Conflict(ConflictCause),
    #[error("{role} {actor} may not {action} appointment {appointment}")]
    Forbidden {
        actor: Ulid,
        role: Role,
        action: Action,
        appointment: Ulid,
    },
    #[error("block {block} does not belong to practitioner {practitioner}")]
    NotOwner { practitioner: Ulid, block: Ulid },
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Invalid(_) => ErrorKind::Validation,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Forbidden { .. } | EngineError::NotOwner { .. } => ErrorKind::Forbidden,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Collaborator(_) | EngineError::WalError(_) => ErrorKind::Internal,
        }
    }
}
