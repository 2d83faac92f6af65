use crate::model::{DAY_MS, HOUR_MS, Ms};

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

pub const MAX_NOTES_LEN: usize = 2_000;
pub const MAX_REASON_LEN: usize = 500;

/// Longest service a single appointment may occupy.
pub const MAX_SERVICE_DURATION_MINUTES: u32 = 12 * 60;

/// Widest window accepted by availability and listing queries.
pub const MAX_QUERY_WINDOW_MS: Ms = 62 * DAY_MS;

/// Widest span accepted for anything written to a timeline.
pub const MAX_SPAN_DURATION_MS: Ms = 24 * HOUR_MS;

pub const MAX_INTERVALS_PER_PRACTITIONER: usize = 100_000;
