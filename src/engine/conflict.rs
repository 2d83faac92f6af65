use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{appointment_conflict, resolve};
use super::{ConflictCause, EngineError, Timeline, Violation};

/// Bounds every span written to a timeline must respect.
pub fn validate_span(span: &Span) -> Result<(), Violation> {
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(Violation::Limit("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(Violation::Limit("span too wide"));
    }
    Ok(())
}

/// A query window from raw bounds. Rejects empty/inverted windows before a
/// `Span` is ever built.
pub fn validate_window(start: Ms, end: Ms) -> Result<Span, Violation> {
    if end <= start {
        return Err(Violation::EndNotAfterStart);
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(Violation::Limit("timestamp out of range"));
    }
    if end - start > MAX_QUERY_WINDOW_MS {
        return Err(Violation::Limit("query window too wide"));
    }
    Ok(Span::new(start, end))
}

/// Fail with the resolver's first conflict cause. The caller holds the
/// timeline's write lock, so a pass here stays true until it commits.
pub fn check_no_conflict(
    timeline: &Timeline,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match resolve(timeline, span, exclude).conflict() {
        None => Ok(()),
        Some(cause) => {
            metrics::counter!(
                crate::observability::CONFLICTS_TOTAL,
                "cause" => match cause {
                    ConflictCause::Appointment(_) => "appointment",
                    ConflictCause::Block(_) => "block",
                }
            )
            .increment(1);
            Err(EngineError::Conflict(cause))
        }
    }
}

/// Only live appointments may stand in the way; blocks are ignored.
pub fn check_no_appointment_conflict(timeline: &Timeline, span: &Span) -> Result<(), EngineError> {
    match appointment_conflict(timeline, span, None) {
        Some(id) => Err(EngineError::Conflict(ConflictCause::Appointment(id))),
        None => Ok(()),
    }
}
