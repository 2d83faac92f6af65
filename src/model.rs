use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type stored on a timeline.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Span of `minutes` length beginning at `start`.
    pub fn from_minutes(start: Ms, minutes: u32) -> Self {
        Self::new(start, start + Ms::from(minutes) * MINUTE_MS)
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Lifecycle of an appointment. Terminal states admit no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
    /// Start instant was moved. Behaves like `Scheduled` for every transition.
    Rescheduled,
}

impl AppointmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }

    /// Whether an appointment in this status still occupies its span.
    pub fn occupies_timeline(self) -> bool {
        self != Self::Cancelled
    }

    /// Transition table. Anything not listed is rejected.
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        match self {
            Scheduled | Rescheduled => matches!(
                next,
                Confirmed | InProgress | Cancelled | NoShow | Rescheduled
            ),
            Confirmed => matches!(next, InProgress | Cancelled | NoShow | Rescheduled),
            InProgress => matches!(next, Completed | Cancelled),
            Completed | Cancelled | NoShow => false,
        }
    }

    /// Statuses the no-show sweeper is allowed to expire.
    pub fn awaiting_visit(self) -> bool {
        matches!(self, Self::Scheduled | Self::Confirmed | Self::Rescheduled)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Scheduled => "Scheduled",
            Self::Confirmed => "Confirmed",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::NoShow => "NoShow",
            Self::Rescheduled => "Rescheduled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockCategory {
    FullDay,
    Morning,
    Afternoon,
    Custom,
}

impl fmt::Display for BlockCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FullDay => "FullDay",
            Self::Morning => "Morning",
            Self::Afternoon => "Afternoon",
            Self::Custom => "Custom",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub practitioner_id: Ulid,
    pub subject_id: Ulid,
    pub service_id: Ulid,
    /// `[start, start + service duration)`.
    pub span: Span,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: Ms,
}

impl Appointment {
    pub fn start(&self) -> Ms {
        self.span.start
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedRange {
    pub id: Ulid,
    pub practitioner_id: Ulid,
    pub span: Span,
    pub category: BlockCategory,
    pub reason: Option<String>,
    pub active: bool,
    pub created_at: Ms,
}

/// Anything that sits on a practitioner timeline.
pub trait Spanned {
    fn span(&self) -> Span;
}

impl Spanned for Appointment {
    fn span(&self) -> Span {
        self.span
    }
}

impl Spanned for BlockedRange {
    fn span(&self) -> Span {
        self.span
    }
}

/// Flat event types; each one is a WAL record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AppointmentBooked {
        id: Ulid,
        practitioner_id: Ulid,
        subject_id: Ulid,
        service_id: Ulid,
        span: Span,
        notes: Option<String>,
        created_at: Ms,
    },
    AppointmentStatusChanged {
        id: Ulid,
        practitioner_id: Ulid,
        status: AppointmentStatus,
    },
    AppointmentRescheduled {
        id: Ulid,
        practitioner_id: Ulid,
        span: Span,
        status: AppointmentStatus,
    },
    BlockCreated {
        id: Ulid,
        practitioner_id: Ulid,
        span: Span,
        category: BlockCategory,
        reason: Option<String>,
        created_at: Ms,
    },
    BlockRemoved {
        id: Ulid,
        practitioner_id: Ulid,
    },
}

impl Event {
    pub fn practitioner_id(&self) -> Ulid {
        match self {
            Event::AppointmentBooked { practitioner_id, .. }
            | Event::AppointmentStatusChanged { practitioner_id, .. }
            | Event::AppointmentRescheduled { practitioner_id, .. }
            | Event::BlockCreated { practitioner_id, .. }
            | Event::BlockRemoved { practitioner_id, .. } => *practitioner_id,
        }
    }
}
