//! The interval store: per-practitioner timelines in memory, made durable by
//! a group-committed write-ahead log.

mod availability;
mod conflict;
mod error;
mod queries;
mod store;

pub use availability::{
    Availability, Resolver, appointment_conflict, merge_overlapping, resolve, subtract_intervals,
};
pub use conflict::{check_no_appointment_conflict, check_no_conflict, validate_span, validate_window};
pub use error::{ConflictCause, EngineError, ErrorKind, Violation};
pub use store::{SharedTimeline, Timeline, TimelineStore};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use tokio::sync::{OwnedRwLockWriteGuard, mpsc, oneshot};
use ulid::Ulid;

use crate::limits::MAX_INTERVALS_PER_PRACTITIONER;
use crate::model::*;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL. Appends that queue up while a flush is
/// in progress are written together and share one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        commit_batch(&mut wal, batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();

    let append_result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so stray buffered bytes never join the next batch.
    let flush_result = wal.flush_sync();
    let result = append_result.and(flush_result);

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    if let Err(e) = &result {
        tracing::error!("WAL flush failed for {} events: {e}", batch.len());
    }
    for (_, tx) in batch {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { response } => {
            let _ = response.send(compact_in_place(wal));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Fold the log into per-practitioner state and rewrite it as a snapshot.
/// Runs on the writer task, so no append can slip in between read and swap.
fn compact_in_place(wal: &mut Wal) -> io::Result<()> {
    wal.flush_sync()?;
    let mut timelines: HashMap<Ulid, Timeline> = HashMap::new();
    for event in Wal::replay(wal.path())? {
        let pid = event.practitioner_id();
        timelines
            .entry(pid)
            .or_insert_with(|| Timeline::new(pid))
            .apply(&event);
    }
    let events: Vec<Event> = timelines
        .values()
        .flat_map(Timeline::snapshot_events)
        .collect();
    Wal::write_compact_file(wal.path(), &events)?;
    wal.swap_compact_file()?;
    tracing::info!(
        "compacted WAL to {} events across {} timelines",
        events.len(),
        timelines.len()
    );
    Ok(())
}

pub struct Engine {
    pub store: TimelineStore,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl Engine {
    /// Replay the log at `wal_path` and start the background writer.
    /// Must be called inside a tokio runtime.
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::recover(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: TimelineStore::new(),
            wal_tx,
        };

        // We own every timeline during replay, so try_write never contends.
        // Never block here: this may run inside an async context.
        for event in &events {
            let shared = engine.store.get_or_create(event.practitioner_id());
            let mut guard = shared
                .try_write()
                .map_err(|_| io::Error::other("replay: timeline unexpectedly locked"))?;
            engine.store.apply(&mut guard, event);
        }

        metrics::gauge!(crate::observability::TIMELINES_ACTIVE)
            .set(engine.store.timeline_count() as f64);
        tracing::info!(
            "replayed {} events across {} practitioner timelines",
            events.len(),
            engine.store.timeline_count()
        );
        Ok(engine)
    }

    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn timeline(&self, practitioner_id: &Ulid) -> Option<SharedTimeline> {
        self.store.get(practitioner_id)
    }

    /// Exclusive access to a practitioner's timeline. Everything done while the
    /// guard is held (check, log, apply) is atomic with respect to other writers.
    pub async fn lock_timeline(
        &self,
        practitioner_id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<Timeline>, EngineError> {
        let shared = self.store.get_or_create(practitioner_id);
        let guard = shared.write_owned().await;
        if guard.interval_count() >= MAX_INTERVALS_PER_PRACTITIONER {
            return Err(Violation::Limit("too many entries on this practitioner's timeline").into());
        }
        Ok(guard)
    }

    /// Lookup entity → practitioner, then lock that practitioner's timeline.
    pub async fn lock_timeline_of(
        &self,
        entity_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<Timeline>, EngineError> {
        let practitioner_id = self
            .store
            .practitioner_for(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let shared = self
            .store
            .get(&practitioner_id)
            .ok_or(EngineError::NotFound(practitioner_id))?;
        Ok(shared.write_owned().await)
    }

    /// WAL-append then apply. The caller holds the timeline's write lock.
    pub async fn persist_and_apply(
        &self,
        timeline: &mut Timeline,
        event: &Event,
    ) -> Result<(), EngineError> {
        debug_assert_eq!(timeline.practitioner_id, event.practitioner_id());
        self.wal_append(event).await?;
        self.store.apply(timeline, event);
        metrics::gauge!(crate::observability::TIMELINES_ACTIVE)
            .set(self.store.timeline_count() as f64);
        Ok(())
    }

    /// Rewrite the WAL with only the events needed to rebuild current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
