pub mod access;
pub mod blocks;
pub mod clock;
pub mod config;
pub mod directory;
pub mod engine;
pub mod lifecycle;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod policy;
pub mod reaper;
pub mod scheduler;
pub mod wal;

pub use access::{Action, Actor, Role};
pub use clock::Clock;
pub use config::SchedulerConfig;
pub use directory::{Collaborators, InMemoryDirectory};
pub use engine::{Availability, ConflictCause, EngineError, ErrorKind, Violation};
pub use model::{Appointment, AppointmentStatus, BlockCategory, BlockedRange, Ms, Span};
pub use notify::{Notification, NotifyHub};
pub use policy::BusinessPolicy;
pub use scheduler::Scheduler;
