use ulid::Ulid;

use crate::model::*;

use super::conflict::validate_window;
use super::{Engine, EngineError};

impl Engine {
    /// Snapshot of one appointment.
    pub async fn appointment(&self, id: Ulid) -> Result<Appointment, EngineError> {
        let practitioner_id = self
            .store
            .practitioner_for(&id)
            .ok_or(EngineError::NotFound(id))?;
        let shared = self
            .timeline(&practitioner_id)
            .ok_or(EngineError::NotFound(id))?;
        let guard = shared.read().await;
        guard.appointment(id).cloned().ok_or(EngineError::NotFound(id))
    }

    pub async fn block(&self, id: Ulid) -> Result<BlockedRange, EngineError> {
        let practitioner_id = self
            .store
            .practitioner_for(&id)
            .ok_or(EngineError::NotFound(id))?;
        let shared = self
            .timeline(&practitioner_id)
            .ok_or(EngineError::NotFound(id))?;
        let guard = shared.read().await;
        guard.block(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Appointments (any status) overlapping `[from, to)`, sorted by start.
    pub async fn appointments_for_practitioner(
        &self,
        practitioner_id: Ulid,
        from: Ms,
        to: Ms,
    ) -> Result<Vec<Appointment>, EngineError> {
        let window = validate_window(from, to)?;
        let Some(shared) = self.timeline(&practitioner_id) else {
            return Ok(vec![]);
        };
        let guard = shared.read().await;
        Ok(guard.overlapping_appointments(&window).cloned().collect())
    }

    /// Active blocks, sorted by start.
    pub async fn blocks_for_practitioner(
        &self,
        practitioner_id: Ulid,
    ) -> Result<Vec<BlockedRange>, EngineError> {
        let Some(shared) = self.timeline(&practitioner_id) else {
            return Ok(vec![]);
        };
        let guard = shared.read().await;
        Ok(guard.blocks.iter().filter(|b| b.active).cloned().collect())
    }

    /// Appointments still awaiting a visit whose start is at or before `cutoff`.
    /// Timelines locked by a writer are skipped; the next sweep picks them up.
    pub fn collect_overdue(&self, cutoff: Ms) -> Vec<(Ulid, Ulid)> {
        let mut overdue = Vec::new();
        for pid in self.store.practitioner_ids() {
            let Some(shared) = self.timeline(&pid) else {
                continue;
            };
            if let Ok(guard) = shared.try_read() {
                overdue.extend(
                    guard
                        .appointments
                        .iter()
                        .take_while(|a| a.span.start <= cutoff)
                        .filter(|a| a.status.awaiting_visit())
                        .map(|a| (a.id, pid)),
                );
            }
        }
        overdue
    }
}
