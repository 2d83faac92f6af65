use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

pub type SharedTimeline = Arc<RwLock<Timeline>>;

/// One practitioner's committed appointments and blocked ranges, each sorted by start.
#[derive(Debug, Clone)]
pub struct Timeline {
    pub practitioner_id: Ulid,
    pub appointments: Vec<Appointment>,
    pub blocks: Vec<BlockedRange>,
}

/// Entries of a start-sorted slice whose span overlaps `query`.
/// Binary search skips everything starting at or after `query.end`.
fn overlapping_in<'a, T: Spanned>(items: &'a [T], query: &Span) -> impl Iterator<Item = &'a T> {
    let right_bound = items.partition_point(|i| i.span().start < query.end);
    let query_start = query.start;
    items[..right_bound]
        .iter()
        .filter(move |i| i.span().end > query_start)
}

fn insert_sorted<T: Spanned>(items: &mut Vec<T>, item: T) {
    let start = item.span().start;
    let pos = items.partition_point(|i| i.span().start <= start);
    items.insert(pos, item);
}

impl Timeline {
    pub fn new(practitioner_id: Ulid) -> Self {
        Self {
            practitioner_id,
            appointments: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn interval_count(&self) -> usize {
        self.appointments.len() + self.blocks.len()
    }

    pub fn appointment(&self, id: Ulid) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    pub fn block(&self, id: Ulid) -> Option<&BlockedRange> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn overlapping_appointments(&self, query: &Span) -> impl Iterator<Item = &Appointment> {
        overlapping_in(&self.appointments, query)
    }

    pub fn overlapping_blocks(&self, query: &Span) -> impl Iterator<Item = &BlockedRange> {
        overlapping_in(&self.blocks, query)
    }

    pub fn insert_appointment(&mut self, appointment: Appointment) {
        insert_sorted(&mut self.appointments, appointment);
    }

    pub fn insert_block(&mut self, block: BlockedRange) {
        insert_sorted(&mut self.blocks, block);
    }

    fn take_appointment(&mut self, id: Ulid) -> Option<Appointment> {
        let pos = self.appointments.iter().position(|a| a.id == id)?;
        Some(self.appointments.remove(pos))
    }

    /// Apply an event to this timeline. The caller holds the write lock.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::AppointmentBooked {
                id,
                practitioner_id,
                subject_id,
                service_id,
                span,
                notes,
                created_at,
            } => {
                self.insert_appointment(Appointment {
                    id: *id,
                    practitioner_id: *practitioner_id,
                    subject_id: *subject_id,
                    service_id: *service_id,
                    span: *span,
                    status: AppointmentStatus::Scheduled,
                    notes: notes.clone(),
                    created_at: *created_at,
                });
            }
            Event::AppointmentStatusChanged { id, status, .. } => {
                if let Some(appt) = self.appointments.iter_mut().find(|a| a.id == *id) {
                    appt.status = *status;
                }
            }
            Event::AppointmentRescheduled { id, span, status, .. } => {
                // Start moves, so the entry must be re-sorted.
                if let Some(mut appt) = self.take_appointment(*id) {
                    appt.span = *span;
                    appt.status = *status;
                    self.insert_appointment(appt);
                }
            }
            Event::BlockCreated {
                id,
                practitioner_id,
                span,
                category,
                reason,
                created_at,
            } => {
                self.insert_block(BlockedRange {
                    id: *id,
                    practitioner_id: *practitioner_id,
                    span: *span,
                    category: *category,
                    reason: reason.clone(),
                    active: true,
                    created_at: *created_at,
                });
            }
            Event::BlockRemoved { id, .. } => {
                if let Some(block) = self.blocks.iter_mut().find(|b| b.id == *id) {
                    block.active = false;
                }
            }
        }
    }

    /// Minimal events that rebuild this timeline from nothing.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::with_capacity(self.interval_count());
        for a in &self.appointments {
            events.push(Event::AppointmentBooked {
                id: a.id,
                practitioner_id: a.practitioner_id,
                subject_id: a.subject_id,
                service_id: a.service_id,
                span: a.span,
                notes: a.notes.clone(),
                created_at: a.created_at,
            });
            if a.status != AppointmentStatus::Scheduled {
                events.push(Event::AppointmentStatusChanged {
                    id: a.id,
                    practitioner_id: a.practitioner_id,
                    status: a.status,
                });
            }
        }
        for b in &self.blocks {
            events.push(Event::BlockCreated {
                id: b.id,
                practitioner_id: b.practitioner_id,
                span: b.span,
                category: b.category,
                reason: b.reason.clone(),
                created_at: b.created_at,
            });
            if !b.active {
                events.push(Event::BlockRemoved {
                    id: b.id,
                    practitioner_id: b.practitioner_id,
                });
            }
        }
        events
    }
}

/// Practitioner timelines plus a reverse index from appointment/block id to practitioner.
#[derive(Default)]
pub struct TimelineStore {
    timelines: DashMap<Ulid, SharedTimeline>,
    entity_to_practitioner: DashMap<Ulid, Ulid>,
}

impl TimelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeline_count(&self) -> usize {
        self.timelines.len()
    }

    pub fn get(&self, practitioner_id: &Ulid) -> Option<SharedTimeline> {
        self.timelines.get(practitioner_id).map(|e| e.value().clone())
    }

    /// Timeline for a practitioner, created empty on first use.
    pub fn get_or_create(&self, practitioner_id: Ulid) -> SharedTimeline {
        self.timelines
            .entry(practitioner_id)
            .or_insert_with(|| Arc::new(RwLock::new(Timeline::new(practitioner_id))))
            .value()
            .clone()
    }

    pub fn practitioner_ids(&self) -> Vec<Ulid> {
        self.timelines.iter().map(|e| *e.key()).collect()
    }

    pub fn practitioner_for(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_practitioner.get(entity_id).map(|e| *e.value())
    }

    /// Apply to the timeline and keep the reverse index current.
    pub fn apply(&self, timeline: &mut Timeline, event: &Event) {
        match event {
            Event::AppointmentBooked { id, practitioner_id, .. }
            | Event::BlockCreated { id, practitioner_id, .. } => {
                self.entity_to_practitioner.insert(*id, *practitioner_id);
            }
            _ => {}
        }
        timeline.apply(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appointment_at(start: Ms, end: Ms) -> Appointment {
        Appointment {
            id: Ulid::new(),
            practitioner_id: Ulid::new(),
            subject_id: Ulid::new(),
            service_id: Ulid::new(),
            span: Span::new(start, end),
            status: AppointmentStatus::Scheduled,
            notes: None,
            created_at: 0,
        }
    }

    #[test]
    fn appointments_stay_sorted() {
        let mut tl = Timeline::new(Ulid::new());
        tl.insert_appointment(appointment_at(300, 400));
        tl.insert_appointment(appointment_at(100, 200));
        tl.insert_appointment(appointment_at(200, 300));
        let starts: Vec<Ms> = tl.appointments.iter().map(|a| a.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut tl = Timeline::new(Ulid::new());
        tl.insert_appointment(appointment_at(100, 200));
        tl.insert_appointment(appointment_at(450, 600));
        tl.insert_appointment(appointment_at(1000, 1100));
        let hits: Vec<_> = tl.overlapping_appointments(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut tl = Timeline::new(Ulid::new());
        tl.insert_appointment(appointment_at(100, 200));
        assert_eq!(tl.overlapping_appointments(&Span::new(200, 300)).count(), 0);
        assert_eq!(tl.overlapping_appointments(&Span::new(0, 100)).count(), 0);
        assert_eq!(tl.overlapping_appointments(&Span::new(199, 300)).count(), 1);
    }

    #[test]
    fn overlapping_long_interval_spanning_query() {
        let mut tl = Timeline::new(Ulid::new());
        tl.insert_appointment(appointment_at(0, 10_000));
        assert_eq!(tl.overlapping_appointments(&Span::new(500, 600)).count(), 1);
    }

    #[test]
    fn reschedule_event_resorts() {
        let pid = Ulid::new();
        let mut tl = Timeline::new(pid);
        let first = appointment_at(100, 200);
        let first_id = first.id;
        tl.insert_appointment(first);
        tl.insert_appointment(appointment_at(300, 400));

        tl.apply(&Event::AppointmentRescheduled {
            id: first_id,
            practitioner_id: pid,
            span: Span::new(500, 600),
            status: AppointmentStatus::Rescheduled,
        });

        assert_eq!(tl.appointments[1].id, first_id);
        assert_eq!(tl.appointments[1].status, AppointmentStatus::Rescheduled);
        assert_eq!(tl.appointments[0].span.start, 300);
    }

    #[test]
    fn block_removal_is_soft() {
        let store = TimelineStore::new();
        let pid = Ulid::new();
        let shared = store.get_or_create(pid);
        let mut tl = shared.try_write().unwrap();
        let block_id = Ulid::new();
        store.apply(
            &mut tl,
            &Event::BlockCreated {
                id: block_id,
                practitioner_id: pid,
                span: Span::new(0, 1_000),
                category: BlockCategory::Custom,
                reason: None,
                created_at: 0,
            },
        );
        store.apply(&mut tl, &Event::BlockRemoved { id: block_id, practitioner_id: pid });

        assert_eq!(store.practitioner_for(&block_id), Some(pid));
        assert!(!tl.block(block_id).unwrap().active);
    }

    #[test]
    fn snapshot_rebuilds_identical_timeline() {
        let pid = Ulid::new();
        let mut tl = Timeline::new(pid);
        let appt_id = Ulid::new();
        tl.apply(&Event::AppointmentBooked {
            id: appt_id,
            practitioner_id: pid,
            subject_id: Ulid::new(),
            service_id: Ulid::new(),
            span: Span::new(100, 200),
            notes: None,
            created_at: 1,
        });
        tl.apply(&Event::AppointmentStatusChanged {
            id: appt_id,
            practitioner_id: pid,
            status: AppointmentStatus::Confirmed,
        });
        let block_id = Ulid::new();
        tl.apply(&Event::BlockCreated {
            id: block_id,
            practitioner_id: pid,
            span: Span::new(300, 400),
            category: BlockCategory::Morning,
            reason: Some("dentist".into()),
            created_at: 2,
        });
        tl.apply(&Event::BlockRemoved { id: block_id, practitioner_id: pid });

        let mut rebuilt = Timeline::new(pid);
        for e in tl.snapshot_events() {
            rebuilt.apply(&e);
        }
        assert_eq!(rebuilt.appointments, tl.appointments);
        assert_eq!(rebuilt.blocks, tl.blocks);
    }
}
