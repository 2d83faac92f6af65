use std::sync::Arc;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;
use crate::policy::BusinessPolicy;

use super::conflict::validate_window;
use super::{ConflictCause, Engine, EngineError, Timeline};

// ── Availability Algorithm ────────────────────────────────────────

/// Free/busy verdict for one practitioner and one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    BusyWithAppointment(Ulid),
    BusyWithBlock(Ulid),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }

    pub fn conflict(&self) -> Option<ConflictCause> {
        match self {
            Availability::Available => None,
            Availability::BusyWithAppointment(id) => Some(ConflictCause::Appointment(*id)),
            Availability::BusyWithBlock(id) => Some(ConflictCause::Block(*id)),
        }
    }

    pub fn reason(&self) -> Option<&'static str> {
        self.conflict().map(|c| c.reason())
    }
}

/// Decide whether `window` is free on `timeline`.
///
/// Live appointments (anything not Cancelled) are checked first and win the
/// tie-break; active blocks are only consulted when no appointment overlaps.
/// `exclude` skips one appointment, so a reschedule does not collide with itself.
pub fn resolve(timeline: &Timeline, window: &Span, exclude: Option<Ulid>) -> Availability {
    if let Some(id) = appointment_conflict(timeline, window, exclude) {
        return Availability::BusyWithAppointment(id);
    }

    match timeline.overlapping_blocks(window).find(|b| b.active) {
        Some(b) => Availability::BusyWithBlock(b.id),
        None => Availability::Available,
    }
}

/// First live appointment overlapping `window`, ignoring `exclude`.
pub fn appointment_conflict(timeline: &Timeline, window: &Span, exclude: Option<Ulid>) -> Option<Ulid> {
    timeline
        .overlapping_appointments(window)
        .find(|a| a.status.occupies_timeline() && Some(a.id) != exclude)
        .map(|a| a.id)
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// `base` minus `to_remove`. Both must be sorted and internally disjoint.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut cursor = b.start;

        while ri < to_remove.len() && to_remove[ri].end <= cursor {
            ri += 1;
        }

        for r in to_remove[ri..].iter().take_while(|r| r.start < b.end) {
            if r.start > cursor {
                result.push(Span::new(cursor, r.start));
            }
            cursor = cursor.max(r.end);
        }

        if cursor < b.end {
            result.push(Span::new(cursor, b.end));
        }
    }

    result
}

/// Everything that occupies `window` on a timeline, clamped, sorted, merged.
fn busy_spans(timeline: &Timeline, window: &Span) -> Vec<Span> {
    let clamp = |s: Span| Span::new(s.start.max(window.start), s.end.min(window.end));
    let mut busy: Vec<Span> = timeline
        .overlapping_appointments(window)
        .filter(|a| a.status.occupies_timeline())
        .map(|a| clamp(a.span))
        .chain(
            timeline
                .overlapping_blocks(window)
                .filter(|b| b.active)
                .map(|b| clamp(b.span)),
        )
        .collect();
    busy.sort_by_key(|s| s.start);
    merge_overlapping(&busy)
}

// ── Read-side resolver ───────────────────────────────────────────

/// Availability queries over the interval store. Reads take the timeline's
/// read lock and never wait on anything but in-flight writes to the same
/// practitioner.
#[derive(Clone)]
pub struct Resolver {
    engine: Arc<Engine>,
    policy: BusinessPolicy,
}

impl Resolver {
    pub fn new(engine: Arc<Engine>, policy: BusinessPolicy) -> Self {
        Self { engine, policy }
    }

    pub async fn availability(
        &self,
        practitioner_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<Availability, EngineError> {
        let window = validate_window(start, end)?;
        let Some(shared) = self.engine.timeline(&practitioner_id) else {
            return Ok(Availability::Available);
        };
        let guard = shared.read().await;
        Ok(resolve(&guard, &window, None))
    }

    pub async fn is_available(
        &self,
        practitioner_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<bool, EngineError> {
        Ok(self
            .availability(practitioner_id, start, end)
            .await?
            .is_available())
    }

    /// Human-readable cause of the first conflict, `None` when free.
    pub async fn availability_reason(
        &self,
        practitioner_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<Option<String>, EngineError> {
        Ok(self
            .availability(practitioner_id, start, end)
            .await?
            .reason()
            .map(str::to_string))
    }

    /// Free stretches of `date`'s opening hours, optionally only those at
    /// least `min_duration_ms` long. Empty on the closed day.
    pub async fn free_windows(
        &self,
        practitioner_id: Ulid,
        date: NaiveDate,
        min_duration_ms: Option<Ms>,
    ) -> Result<Vec<Span>, EngineError> {
        let Some(opening) = self.policy.opening_span(date) else {
            return Ok(Vec::new());
        };
        let mut free = match self.engine.timeline(&practitioner_id) {
            Some(shared) => {
                let guard = shared.read().await;
                subtract_intervals(&[opening], &busy_spans(&guard, &opening))
            }
            None => vec![opening],
        };
        if let Some(min) = min_duration_ms {
            free.retain(|s| s.duration_ms() >= min);
        }
        Ok(free)
    }
}
