//! Booking, cancellation, rescheduling and status transitions.
//!
//! Every mutation follows the same shape: collaborator lookups and static
//! policy checks first, then the practitioner's timeline is write-locked and
//! the resolver, WAL append and in-memory apply run under that one lock.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::access::{self, Action, Actor, Role, Scope};
use crate::clock::Clock;
use crate::directory::{
    CollaboratorError, Collaborators, NotificationSink, PetDirectory, PetRecord,
};
use crate::engine::{Engine, EngineError, Violation, check_no_conflict, validate_span};
use crate::limits::{MAX_NOTES_LEN, MAX_SERVICE_DURATION_MINUTES};
use crate::model::*;
use crate::observability;
use crate::policy::BusinessPolicy;

#[derive(Clone)]
pub struct AppointmentLifecycle {
    engine: Arc<Engine>,
    collaborators: Collaborators,
    policy: BusinessPolicy,
    clock: Clock,
}

impl AppointmentLifecycle {
    pub fn new(
        engine: Arc<Engine>,
        collaborators: Collaborators,
        policy: BusinessPolicy,
        clock: Clock,
    ) -> Self {
        Self {
            engine,
            collaborators,
            policy,
            clock,
        }
    }

    // ── Booking ──────────────────────────────────────────────

    /// Book `subject_id` with `practitioner_id` for `service_id` at `start`.
    pub async fn book(
        &self,
        subject_id: Ulid,
        practitioner_id: Ulid,
        service_id: Ulid,
        start: Ms,
        notes: Option<String>,
    ) -> Result<Appointment, EngineError> {
        let started = Instant::now();
        let result = self
            .try_book(subject_id, practitioner_id, service_id, start, notes)
            .await;
        observability::record_operation("book", started, &result);
        match &result {
            Ok(appt) => info!(
                "booked appointment {} for pet {subject_id} with {practitioner_id} at {start}",
                appt.id
            ),
            Err(e) => debug!("booking for pet {subject_id} with {practitioner_id} rejected: {e}"),
        }
        result
    }

    async fn try_book(
        &self,
        subject_id: Ulid,
        practitioner_id: Ulid,
        service_id: Ulid,
        start: Ms,
        notes: Option<String>,
    ) -> Result<Appointment, EngineError> {
        if self.collaborators.pets.pet_by_id(subject_id).await?.is_none() {
            return Err(Violation::UnknownSubject(subject_id).into());
        }
        self.require_doctor(practitioner_id).await?;
        let duration_minutes = self.service_duration(service_id).await?;

        let now = self.clock.now_ms();
        self.policy.check_visit_start(start, now)?;

        let span = Span::from_minutes(start, duration_minutes);
        validate_span(&span)?;
        if notes.as_ref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
            return Err(Violation::Limit("notes too long").into());
        }

        let mut timeline = self.engine.lock_timeline(practitioner_id).await?;
        check_no_conflict(&timeline, &span, None)?;

        let id = Ulid::new();
        let event = Event::AppointmentBooked {
            id,
            practitioner_id,
            subject_id,
            service_id,
            span,
            notes,
            created_at: now,
        };
        self.engine.persist_and_apply(&mut timeline, &event).await?;
        timeline.appointment(id).cloned().ok_or(EngineError::NotFound(id))
    }

    async fn require_doctor(&self, practitioner_id: Ulid) -> Result<(), EngineError> {
        let user = self
            .collaborators
            .users
            .user_by_id(practitioner_id)
            .await?
            .ok_or(Violation::UnknownPractitioner(practitioner_id))?;
        if user.role != Role::Doctor {
            return Err(Violation::NotADoctor {
                id: practitioner_id,
                role: user.role,
            }
            .into());
        }
        Ok(())
    }

    async fn service_duration(&self, service_id: Ulid) -> Result<u32, EngineError> {
        let service = self
            .collaborators
            .services
            .service_by_id(service_id)
            .await?
            .ok_or(Violation::UnknownService(service_id))?;
        if !service.is_active {
            return Err(Violation::InactiveService(service_id).into());
        }
        if service.duration_minutes == 0 || service.duration_minutes > MAX_SERVICE_DURATION_MINUTES {
            return Err(Violation::ServiceDuration {
                max: MAX_SERVICE_DURATION_MINUTES,
            }
            .into());
        }
        Ok(service.duration_minutes)
    }

    // ── Access ───────────────────────────────────────────────

    /// Whether `actor` may perform `action` on `appointment`. Pets are only
    /// looked up when the actor's scope depends on ownership.
    async fn permitted(
        &self,
        actor: &Actor,
        action: Action,
        appointment: &Appointment,
    ) -> Result<bool, EngineError> {
        let owner = match access::scope(actor.role, action) {
            Scope::OwnPets => self
                .collaborators
                .pets
                .pet_by_id(appointment.subject_id)
                .await?
                .map(|pet| pet.owner_id),
            _ => None,
        };
        Ok(access::permits(actor, action, appointment, owner))
    }

    async fn authorize(
        &self,
        actor: &Actor,
        action: Action,
        appointment: &Appointment,
    ) -> Result<(), EngineError> {
        if self.permitted(actor, action, appointment).await? {
            Ok(())
        } else {
            Err(EngineError::Forbidden {
                actor: actor.id,
                role: actor.role,
                action,
                appointment: appointment.id,
            })
        }
    }

    pub async fn can_access(&self, actor: &Actor, appointment_id: Ulid) -> Result<bool, EngineError> {
        let appointment = self.engine.appointment(appointment_id).await?;
        self.permitted(actor, Action::View, &appointment).await
    }

    pub async fn appointment(
        &self,
        actor: &Actor,
        appointment_id: Ulid,
    ) -> Result<Appointment, EngineError> {
        let appointment = self.engine.appointment(appointment_id).await?;
        self.authorize(actor, Action::View, &appointment).await?;
        Ok(appointment)
    }

    // ── Cancellation ─────────────────────────────────────────

    pub async fn cancel(&self, appointment_id: Ulid, actor: &Actor) -> Result<Appointment, EngineError> {
        let started = Instant::now();
        let result = self.try_cancel(appointment_id, actor).await;
        observability::record_operation("cancel", started, &result);
        match &result {
            Ok(appt) => {
                info!("cancelled appointment {appointment_id} by {} {}", actor.role, actor.id);
                self.dispatch_cancelled(appt);
            }
            Err(e) => debug!("cancel of {appointment_id} rejected: {e}"),
        }
        result
    }

    async fn try_cancel(&self, appointment_id: Ulid, actor: &Actor) -> Result<Appointment, EngineError> {
        let snapshot = self.engine.appointment(appointment_id).await?;
        self.authorize(actor, Action::Cancel, &snapshot).await?;

        let now = self.clock.now_ms();
        let mut timeline = self.engine.lock_timeline_of(&appointment_id).await?;
        let current = timeline
            .appointment(appointment_id)
            .cloned()
            .ok_or(EngineError::NotFound(appointment_id))?;

        if current.status.is_terminal() {
            return Err(Violation::Finalized(current.status).into());
        }
        if current.start() <= now {
            return Err(Violation::AlreadyStarted.into());
        }
        if actor.is_customer() {
            self.policy.check_customer_notice(current.start(), now)?;
        }
        transition_allowed(current.status, AppointmentStatus::Cancelled)?;

        let event = Event::AppointmentStatusChanged {
            id: appointment_id,
            practitioner_id: current.practitioner_id,
            status: AppointmentStatus::Cancelled,
        };
        self.engine.persist_and_apply(&mut timeline, &event).await?;
        timeline
            .appointment(appointment_id)
            .cloned()
            .ok_or(EngineError::NotFound(appointment_id))
    }

    // ── Rescheduling ─────────────────────────────────────────

    /// Move an appointment to `new_start`, keeping its duration. The
    /// appointment ends up `Rescheduled`.
    pub async fn reschedule(
        &self,
        appointment_id: Ulid,
        new_start: Ms,
        actor: &Actor,
    ) -> Result<Appointment, EngineError> {
        let started = Instant::now();
        let result = self.try_reschedule(appointment_id, new_start, actor).await;
        observability::record_operation("reschedule", started, &result);
        match &result {
            Ok(appt) => {
                info!("rescheduled appointment {appointment_id} to {new_start}");
                self.dispatch_status(appt);
            }
            Err(e) => debug!("reschedule of {appointment_id} rejected: {e}"),
        }
        result
    }

    async fn try_reschedule(
        &self,
        appointment_id: Ulid,
        new_start: Ms,
        actor: &Actor,
    ) -> Result<Appointment, EngineError> {
        let snapshot = self.engine.appointment(appointment_id).await?;
        self.authorize(actor, Action::Reschedule, &snapshot).await?;

        let now = self.clock.now_ms();
        self.policy.check_visit_start(new_start, now)?;

        let mut timeline = self.engine.lock_timeline_of(&appointment_id).await?;
        let current = timeline
            .appointment(appointment_id)
            .cloned()
            .ok_or(EngineError::NotFound(appointment_id))?;
        transition_allowed(current.status, AppointmentStatus::Rescheduled)?;
        if actor.is_customer() {
            self.policy.check_customer_notice(current.start(), now)?;
        }

        let span = Span::new(new_start, new_start + current.span.duration_ms());
        validate_span(&span)?;
        check_no_conflict(&timeline, &span, Some(appointment_id))?;

        let event = Event::AppointmentRescheduled {
            id: appointment_id,
            practitioner_id: current.practitioner_id,
            span,
            status: AppointmentStatus::Rescheduled,
        };
        self.engine.persist_and_apply(&mut timeline, &event).await?;
        timeline
            .appointment(appointment_id)
            .cloned()
            .ok_or(EngineError::NotFound(appointment_id))
    }

    // ── Status transitions ───────────────────────────────────

    /// Confirm, start, complete, or mark an appointment as a no-show.
    pub async fn update_status(
        &self,
        appointment_id: Ulid,
        status: AppointmentStatus,
        actor: &Actor,
    ) -> Result<Appointment, EngineError> {
        let started = Instant::now();
        let result = self.try_update_status(appointment_id, status, actor).await;
        observability::record_operation("update_status", started, &result);
        match &result {
            Ok(appt) => {
                info!("appointment {appointment_id} is now {status}");
                self.dispatch_status(appt);
            }
            Err(e) => debug!("status change of {appointment_id} to {status} rejected: {e}"),
        }
        result
    }

    async fn try_update_status(
        &self,
        appointment_id: Ulid,
        status: AppointmentStatus,
        actor: &Actor,
    ) -> Result<Appointment, EngineError> {
        use AppointmentStatus::*;
        if matches!(status, Scheduled | Rescheduled | Cancelled) {
            return Err(Violation::DedicatedOperation(status).into());
        }
        let snapshot = self.engine.appointment(appointment_id).await?;
        self.authorize(actor, Action::UpdateStatus, &snapshot).await?;
        self.commit_status(appointment_id, status).await
    }

    async fn commit_status(
        &self,
        appointment_id: Ulid,
        status: AppointmentStatus,
    ) -> Result<Appointment, EngineError> {
        let mut timeline = self.engine.lock_timeline_of(&appointment_id).await?;
        let current = timeline
            .appointment(appointment_id)
            .cloned()
            .ok_or(EngineError::NotFound(appointment_id))?;
        transition_allowed(current.status, status)?;

        let event = Event::AppointmentStatusChanged {
            id: appointment_id,
            practitioner_id: current.practitioner_id,
            status,
        };
        self.engine.persist_and_apply(&mut timeline, &event).await?;
        timeline
            .appointment(appointment_id)
            .cloned()
            .ok_or(EngineError::NotFound(appointment_id))
    }

    /// Mark an appointment NoShow if it is still awaiting a visit and its
    /// start is more than `grace` in the past. Returns whether it changed.
    pub async fn expire_no_show(&self, appointment_id: Ulid, grace: Ms) -> Result<bool, EngineError> {
        let now = self.clock.now_ms();
        let appointment = {
            let mut timeline = self.engine.lock_timeline_of(&appointment_id).await?;
            let current = timeline
                .appointment(appointment_id)
                .cloned()
                .ok_or(EngineError::NotFound(appointment_id))?;
            if !current.status.awaiting_visit() || current.start() + grace > now {
                return Ok(false);
            }
            let event = Event::AppointmentStatusChanged {
                id: appointment_id,
                practitioner_id: current.practitioner_id,
                status: AppointmentStatus::NoShow,
            };
            self.engine.persist_and_apply(&mut timeline, &event).await?;
            Appointment {
                status: AppointmentStatus::NoShow,
                ..current
            }
        };
        metrics::counter!(observability::NO_SHOWS_TOTAL).increment(1);
        info!("appointment {appointment_id} marked as no-show");
        self.dispatch_status(&appointment);
        Ok(true)
    }

    // ── Notifications ────────────────────────────────────────

    fn dispatch_status(&self, appointment: &Appointment) {
        let pets = self.collaborators.pets.clone();
        let notifier = self.collaborators.notifier.clone();
        let (id, subject_id, status) = (appointment.id, appointment.subject_id, appointment.status);
        tokio::spawn(async move {
            let result = deliver_status(pets, notifier, id, subject_id, status).await;
            report_delivery(id, result);
        });
    }

    fn dispatch_cancelled(&self, appointment: &Appointment) {
        let pets = self.collaborators.pets.clone();
        let notifier = self.collaborators.notifier.clone();
        let (id, subject_id, start) = (appointment.id, appointment.subject_id, appointment.start());
        tokio::spawn(async move {
            let result = deliver_cancelled(pets, notifier, id, subject_id, start).await;
            report_delivery(id, result);
        });
    }
}

fn transition_allowed(from: AppointmentStatus, to: AppointmentStatus) -> Result<(), Violation> {
    if from.can_transition_to(to) {
        Ok(())
    } else if from.is_terminal() {
        Err(Violation::Finalized(from))
    } else {
        Err(Violation::InvalidTransition { from, to })
    }
}

async fn owning_pet(pets: &dyn PetDirectory, subject_id: Ulid) -> Result<PetRecord, CollaboratorError> {
    pets.pet_by_id(subject_id)
        .await?
        .ok_or_else(|| CollaboratorError(format!("pet {subject_id} not found")))
}

async fn deliver_status(
    pets: Arc<dyn PetDirectory>,
    notifier: Arc<dyn NotificationSink>,
    appointment_id: Ulid,
    subject_id: Ulid,
    status: AppointmentStatus,
) -> Result<(), CollaboratorError> {
    let pet = owning_pet(pets.as_ref(), subject_id).await?;
    notifier.status_changed(appointment_id, status, pet.owner_id).await
}

async fn deliver_cancelled(
    pets: Arc<dyn PetDirectory>,
    notifier: Arc<dyn NotificationSink>,
    appointment_id: Ulid,
    subject_id: Ulid,
    start: Ms,
) -> Result<(), CollaboratorError> {
    let pet = owning_pet(pets.as_ref(), subject_id).await?;
    notifier
        .cancelled(appointment_id, pet.owner_id, &pet.name, start)
        .await
}

fn report_delivery(appointment_id: Ulid, result: Result<(), CollaboratorError>) {
    if let Err(e) = result {
        metrics::counter!(observability::NOTIFICATION_FAILURES_TOTAL).increment(1);
        warn!("notification for appointment {appointment_id} failed: {e}");
    }
}
