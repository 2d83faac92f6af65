//! One handle over the whole scheduling core.

use std::io;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;
use ulid::Ulid;

use crate::access::Actor;
use crate::blocks::BlockManager;
use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::directory::Collaborators;
use crate::engine::{Availability, Engine, EngineError, Resolver};
use crate::lifecycle::AppointmentLifecycle;
use crate::model::*;
use crate::reaper;

#[derive(Clone)]
pub struct Scheduler {
    engine: Arc<Engine>,
    resolver: Resolver,
    lifecycle: AppointmentLifecycle,
    blocks: BlockManager,
}

impl Scheduler {
    /// Replay the WAL, start the writer, and spawn the compactor (and the
    /// no-show sweeper when configured). Must be called inside a tokio runtime.
    pub fn open(config: &SchedulerConfig, collaborators: Collaborators) -> io::Result<Self> {
        Self::with_clock(config, collaborators, Clock::System)
    }

    pub fn with_clock(
        config: &SchedulerConfig,
        collaborators: Collaborators,
        clock: Clock,
    ) -> io::Result<Self> {
        if let Some(dir) = config.wal_path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        let engine = Arc::new(Engine::new(config.wal_path.clone())?);
        let policy = config.policy.clone();

        let resolver = Resolver::new(engine.clone(), policy.clone());
        let blocks = BlockManager::new(
            engine.clone(),
            collaborators.users.clone(),
            policy.clone(),
            clock.clone(),
        );
        let lifecycle =
            AppointmentLifecycle::new(engine.clone(), collaborators, policy, clock.clone());

        let compactor_engine = engine.clone();
        let threshold = config.compact_threshold;
        tokio::spawn(async move {
            reaper::run_compactor(compactor_engine, threshold).await;
        });
        if let Some(period) = config.sweep_interval {
            let sweeper_engine = engine.clone();
            let sweeper_lifecycle = lifecycle.clone();
            let grace = config.no_show_grace_minutes;
            tokio::spawn(async move {
                reaper::run_no_show_sweeper(sweeper_engine, sweeper_lifecycle, clock, grace, period)
                    .await;
            });
        }

        info!("scheduler open at {}", config.wal_path.display());
        Ok(Self {
            engine,
            resolver,
            lifecycle,
            blocks,
        })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn lifecycle(&self) -> &AppointmentLifecycle {
        &self.lifecycle
    }

    pub fn block_manager(&self) -> &BlockManager {
        &self.blocks
    }

    // ── Availability ─────────────────────────────────────────

    pub async fn availability(
        &self,
        practitioner_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<Availability, EngineError> {
        self.resolver.availability(practitioner_id, start, end).await
    }

    pub async fn is_available(
        &self,
        practitioner_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<bool, EngineError> {
        self.resolver.is_available(practitioner_id, start, end).await
    }

    pub async fn availability_reason(
        &self,
        practitioner_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<Option<String>, EngineError> {
        self.resolver
            .availability_reason(practitioner_id, start, end)
            .await
    }

    pub async fn free_windows(
        &self,
        practitioner_id: Ulid,
        date: NaiveDate,
        min_duration_ms: Option<Ms>,
    ) -> Result<Vec<Span>, EngineError> {
        self.resolver
            .free_windows(practitioner_id, date, min_duration_ms)
            .await
    }

    // ── Appointments ─────────────────────────────────────────

    pub async fn book(
        &self,
        subject_id: Ulid,
        practitioner_id: Ulid,
        service_id: Ulid,
        start: Ms,
        notes: Option<String>,
    ) -> Result<Appointment, EngineError> {
        self.lifecycle
            .book(subject_id, practitioner_id, service_id, start, notes)
            .await
    }

    pub async fn cancel(&self, appointment_id: Ulid, actor: &Actor) -> Result<Appointment, EngineError> {
        self.lifecycle.cancel(appointment_id, actor).await
    }

    pub async fn reschedule(
        &self,
        appointment_id: Ulid,
        new_start: Ms,
        actor: &Actor,
    ) -> Result<Appointment, EngineError> {
        self.lifecycle.reschedule(appointment_id, new_start, actor).await
    }

    pub async fn update_status(
        &self,
        appointment_id: Ulid,
        status: AppointmentStatus,
        actor: &Actor,
    ) -> Result<Appointment, EngineError> {
        self.lifecycle
            .update_status(appointment_id, status, actor)
            .await
    }

    pub async fn appointment(
        &self,
        actor: &Actor,
        appointment_id: Ulid,
    ) -> Result<Appointment, EngineError> {
        self.lifecycle.appointment(actor, appointment_id).await
    }

    pub async fn can_access(&self, actor: &Actor, appointment_id: Ulid) -> Result<bool, EngineError> {
        self.lifecycle.can_access(actor, appointment_id).await
    }

    pub async fn appointments_for_practitioner(
        &self,
        practitioner_id: Ulid,
        from: Ms,
        to: Ms,
    ) -> Result<Vec<Appointment>, EngineError> {
        self.engine
            .appointments_for_practitioner(practitioner_id, from, to)
            .await
    }

    // ── Blocks ───────────────────────────────────────────────

    pub async fn create_block(
        &self,
        practitioner_id: Ulid,
        start: Ms,
        end: Ms,
        category: BlockCategory,
        reason: Option<String>,
    ) -> Result<BlockedRange, EngineError> {
        self.blocks
            .create_block(practitioner_id, start, end, category, reason)
            .await
    }

    pub async fn create_day_block(
        &self,
        practitioner_id: Ulid,
        date: NaiveDate,
        category: BlockCategory,
        reason: Option<String>,
    ) -> Result<BlockedRange, EngineError> {
        self.blocks
            .create_day_block(practitioner_id, date, category, reason)
            .await
    }

    pub async fn remove_block(&self, practitioner_id: Ulid, block_id: Ulid) -> Result<(), EngineError> {
        self.blocks.remove_block(practitioner_id, block_id).await
    }

    pub async fn blocks_for_practitioner(
        &self,
        practitioner_id: Ulid,
    ) -> Result<Vec<BlockedRange>, EngineError> {
        self.blocks.blocks(practitioner_id).await
    }

    pub async fn compact(&self) -> Result<(), EngineError> {
        self.engine.compact_wal().await
    }
}
