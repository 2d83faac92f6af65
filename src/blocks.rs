//! Practitioner-declared unavailability.

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use tracing::{debug, info};
use ulid::Ulid;

use crate::access::Role;
use crate::clock::Clock;
use crate::directory::UserDirectory;
use crate::engine::{Engine, EngineError, Violation, check_no_appointment_conflict, validate_span};
use crate::limits::MAX_REASON_LEN;
use crate::model::*;
use crate::observability;
use crate::policy::BusinessPolicy;

#[derive(Clone)]
pub struct BlockManager {
    engine: Arc<Engine>,
    users: Arc<dyn UserDirectory>,
    policy: BusinessPolicy,
    clock: Clock,
}

impl BlockManager {
    pub fn new(
        engine: Arc<Engine>,
        users: Arc<dyn UserDirectory>,
        policy: BusinessPolicy,
        clock: Clock,
    ) -> Self {
        Self {
            engine,
            users,
            policy,
            clock,
        }
    }

    /// Block `[start, end)` on a doctor's calendar. Existing blocks may overlap;
    /// live appointments may not.
    pub async fn create_block(
        &self,
        practitioner_id: Ulid,
        start: Ms,
        end: Ms,
        category: BlockCategory,
        reason: Option<String>,
    ) -> Result<BlockedRange, EngineError> {
        let started = Instant::now();
        let result = self
            .try_create(practitioner_id, start, end, category, reason)
            .await;
        observability::record_operation("create_block", started, &result);
        match &result {
            Ok(block) => info!(
                "{practitioner_id} blocked {} ({})",
                block.span, block.category
            ),
            Err(e) => debug!("block for {practitioner_id} rejected: {e}"),
        }
        result
    }

    async fn try_create(
        &self,
        practitioner_id: Ulid,
        start: Ms,
        end: Ms,
        category: BlockCategory,
        reason: Option<String>,
    ) -> Result<BlockedRange, EngineError> {
        let now = self.clock.now_ms();
        self.policy.check_block_window(start, end, now)?;
        if reason.as_ref().is_some_and(|r| r.len() > MAX_REASON_LEN) {
            return Err(Violation::Limit("reason too long").into());
        }

        let user = self
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

        let span = Span::new(start, end);
        validate_span(&span)?;

        let mut timeline = self.engine.lock_timeline(practitioner_id).await?;
        check_no_appointment_conflict(&timeline, &span)?;

        let id = Ulid::new();
        let event = Event::BlockCreated {
            id,
            practitioner_id,
            span,
            category,
            reason,
            created_at: now,
        };
        self.engine.persist_and_apply(&mut timeline, &event).await?;
        timeline.block(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Block a preset part of `date`. `Custom` has no preset bounds.
    pub async fn create_day_block(
        &self,
        practitioner_id: Ulid,
        date: NaiveDate,
        category: BlockCategory,
        reason: Option<String>,
    ) -> Result<BlockedRange, EngineError> {
        let span = self
            .policy
            .category_span(date, category)
            .ok_or(Violation::NoPreset(category))?;
        self.create_block(practitioner_id, span.start, span.end, category, reason)
            .await
    }

    /// Deactivate one of `practitioner_id`'s own blocks.
    pub async fn remove_block(
        &self,
        practitioner_id: Ulid,
        block_id: Ulid,
    ) -> Result<(), EngineError> {
        let mut timeline = self.engine.lock_timeline_of(&block_id).await?;
        let block = timeline
            .block(block_id)
            .cloned()
            .ok_or(EngineError::NotFound(block_id))?;
        if block.practitioner_id != practitioner_id {
            return Err(EngineError::NotOwner {
                practitioner: practitioner_id,
                block: block_id,
            });
        }
        if !block.active {
            return Err(EngineError::NotFound(block_id));
        }
        let event = Event::BlockRemoved {
            id: block_id,
            practitioner_id,
        };
        self.engine.persist_and_apply(&mut timeline, &event).await?;
        info!("{practitioner_id} removed block {block_id}");
        Ok(())
    }

    pub async fn blocks(&self, practitioner_id: Ulid) -> Result<Vec<BlockedRange>, EngineError> {
        self.engine.blocks_for_practitioner(practitioner_id).await
    }
}
