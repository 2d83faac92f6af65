use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::model::Ms;

/// Source of "now" for every policy check.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    #[default]
    System,
    /// Frozen at a settable instant. Shared between clones.
    Fixed(Arc<AtomicI64>),
}

impl Clock {
    pub fn fixed(at: Ms) -> Self {
        Clock::Fixed(Arc::new(AtomicI64::new(at)))
    }

    pub fn now_ms(&self) -> Ms {
        match self {
            Clock::System => system_now_ms(),
            Clock::Fixed(at) => at.load(Ordering::SeqCst),
        }
    }

    /// Move a fixed clock. No-op on the system clock.
    pub fn set(&self, at: Ms) {
        if let Clock::Fixed(cell) = self {
            cell.store(at, Ordering::SeqCst);
        }
    }

    pub fn advance(&self, by: Ms) {
        if let Clock::Fixed(cell) = self {
            cell.fetch_add(by, Ordering::SeqCst);
        }
    }
}

fn system_now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}
