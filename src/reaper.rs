use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::engine::Engine;
use crate::lifecycle::AppointmentLifecycle;
use crate::model::{MINUTE_MS, Ms};

/// Background task that compacts the WAL once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            error!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Background task that marks unattended appointments as NoShow.
pub async fn run_no_show_sweeper(
    engine: Arc<Engine>,
    lifecycle: AppointmentLifecycle,
    clock: Clock,
    grace_minutes: u32,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        sweep_no_shows(&engine, &lifecycle, &clock, grace_minutes as Ms * MINUTE_MS).await;
    }
}

async fn sweep_no_shows(
    engine: &Engine,
    lifecycle: &AppointmentLifecycle,
    clock: &Clock,
    grace: Ms,
) -> usize {
    let mut marked = 0;
    for (appointment_id, _practitioner_id) in engine.collect_overdue(clock.now_ms() - grace) {
        match lifecycle.expire_no_show(appointment_id, grace).await {
            Ok(true) => marked += 1,
            Ok(false) => {}
            // May have been cancelled or started since collection
            Err(e) => debug!("no-show sweep skip {appointment_id}: {e}"),
        }
    }
    marked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::directory::{Collaborators, InMemoryDirectory};
    use crate::model::*;
    use crate::notify::NotifyHub;
    use crate::policy::BusinessPolicy;
    use std::path::PathBuf;
    use ulid::Ulid;

    // 2025-01-10T00:00:00Z, a Friday
    const DAY: Ms = 1_736_467_200_000;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("clinic_test_reaper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn sweeper_marks_overdue_appointments() {
        let path = test_wal_path("sweep.wal");
        let engine = Arc::new(Engine::new(path).unwrap());
        let directory = Arc::new(InMemoryDirectory::new());
        let hub = Arc::new(NotifyHub::new());
        let clock = Clock::fixed(DAY - DAY_MS);
        let lifecycle = AppointmentLifecycle::new(
            engine.clone(),
            Collaborators::in_memory(directory.clone(), hub.clone()),
            BusinessPolicy::default(),
            clock.clone(),
        );

        let owner = directory.add_user(Role::Customer);
        let doctor = directory.add_user(Role::Doctor);
        let pet = directory.add_pet(owner, "Rex");
        let service = directory.add_service(30);
        let early = lifecycle
            .book(pet, doctor, service, DAY + 9 * HOUR_MS, None)
            .await
            .unwrap();
        let late = lifecycle
            .book(pet, doctor, service, DAY + 15 * HOUR_MS, None)
            .await
            .unwrap();

        let grace = 30 * MINUTE_MS;
        clock.set(DAY + 9 * HOUR_MS + 20 * MINUTE_MS);
        assert_eq!(sweep_no_shows(&engine, &lifecycle, &clock, grace).await, 0);

        clock.set(DAY + 10 * HOUR_MS);
        assert_eq!(sweep_no_shows(&engine, &lifecycle, &clock, grace).await, 1);
        assert_eq!(
            engine.appointment(early.id).await.unwrap().status,
            AppointmentStatus::NoShow
        );
        assert_eq!(
            engine.appointment(late.id).await.unwrap().status,
            AppointmentStatus::Scheduled
        );

        // Already marked; nothing left to do.
        assert_eq!(sweep_no_shows(&engine, &lifecycle, &clock, grace).await, 0);
    }

    #[tokio::test]
    async fn compaction_waits_for_threshold() {
        let path = test_wal_path("compact_threshold.wal");
        let engine = Engine::new(path).unwrap();
        let pid = Ulid::new();
        for i in 0..3 {
            let mut tl = engine.lock_timeline(pid).await.unwrap();
            let event = Event::BlockCreated {
                id: Ulid::new(),
                practitioner_id: pid,
                span: Span::new(DAY + i * HOUR_MS, DAY + (i + 1) * HOUR_MS),
                category: BlockCategory::Custom,
                reason: None,
                created_at: DAY,
            };
            engine.persist_and_apply(&mut tl, &event).await.unwrap();
        }

        assert!(!compact_if_due(&engine, 10).await);
        assert!(compact_if_due(&engine, 3).await);
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }
}
