use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, Utc, Weekday};
use ulid::Ulid;

use clinic_scheduler::model::{DAY_MS, HOUR_MS, MINUTE_MS};
use clinic_scheduler::*;

// 2025-01-06T00:00:00Z, a Monday
const MONDAY: Ms = 1_736_121_600_000;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

/// Half-hour starts inside business hours, skipping Sundays, from Tuesday on.
fn bookable_slots(n: usize) -> Vec<Ms> {
    let mut slots = Vec::with_capacity(n);
    let mut day = MONDAY + DAY_MS;
    while slots.len() < n {
        let weekday = DateTime::<Utc>::from_timestamp_millis(day).unwrap().weekday();
        if weekday != Weekday::Sun {
            for k in 0..20 {
                slots.push(day + 8 * HOUR_MS + k * 30 * MINUTE_MS);
            }
        }
        day += DAY_MS;
    }
    slots.truncate(n);
    slots
}

struct Fixture {
    scheduler: Scheduler,
    directory: Arc<InMemoryDirectory>,
    pet: Ulid,
    service: Ulid,
}

fn setup(name: &str) -> Fixture {
    let dir = std::env::temp_dir().join("clinic_bench");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);

    let directory = Arc::new(InMemoryDirectory::new());
    let scheduler = Scheduler::with_clock(
        &SchedulerConfig::for_path(path),
        Collaborators::in_memory(directory.clone(), Arc::new(NotifyHub::new())),
        Clock::fixed(MONDAY),
    )
    .unwrap();
    let owner = directory.add_user(Role::Customer);
    let pet = directory.add_pet(owner, "Bench");
    let service = directory.add_service(30);
    Fixture {
        scheduler,
        directory,
        pet,
        service,
    }
}

async fn phase1_sequential() {
    let f = setup("sequential.wal");
    let doctor = f.directory.add_user(Role::Doctor);
    let slots = bookable_slots(2000);

    let start = Instant::now();
    for &s in &slots {
        f.scheduler.book(f.pet, doctor, f.service, s, None).await.unwrap();
    }
    let elapsed = start.elapsed();
    let ops = slots.len() as f64 / elapsed.as_secs_f64();
    println!("  {} bookings in {:.2}s = {ops:.0} ops/sec", slots.len(), elapsed.as_secs_f64());
}

async fn phase2_contention() {
    let f = setup("contention.wal");
    let doctor = f.directory.add_user(Role::Doctor);
    let slots = Arc::new(bookable_slots(100));
    let n_tasks = 32;

    let start = Instant::now();
    let mut handles = Vec::new();
    for i in 0..n_tasks {
        let scheduler = f.scheduler.clone();
        let slots = slots.clone();
        let (pet, service) = (f.pet, f.service);
        handles.push(tokio::spawn(async move {
            let mut won = 0usize;
            // Every task races for every slot, offset so tasks collide mid-slot too.
            for &s in slots.iter() {
                let at = s + (i % 3) as Ms * 10 * MINUTE_MS;
                if scheduler.book(pet, doctor, service, at, None).await.is_ok() {
                    won += 1;
                }
            }
            won
        }));
    }

    let mut total_won = 0;
    for h in handles {
        total_won += h.await.unwrap();
    }
    let elapsed = start.elapsed();

    let booked = f
        .scheduler
        .appointments_for_practitioner(doctor, MONDAY, MONDAY + 60 * DAY_MS)
        .await
        .unwrap();
    assert_eq!(booked.len(), total_won);
    for pair in booked.windows(2) {
        assert!(
            pair[0].span.end <= pair[1].span.start,
            "double booking: {} and {}",
            pair[0].span,
            pair[1].span
        );
    }
    println!(
        "  {n_tasks} tasks x {} attempts: {total_won} admitted in {:.2}s, no overlaps",
        slots.len(),
        elapsed.as_secs_f64()
    );
}

async fn phase3_read_under_load() {
    let f = setup("read_under_load.wal");
    let doctor = f.directory.add_user(Role::Doctor);
    let slots = bookable_slots(1000);

    let writer = {
        let scheduler = f.scheduler.clone();
        let (pet, service) = (f.pet, f.service);
        let slots = slots.clone();
        tokio::spawn(async move {
            for s in slots {
                let _ = scheduler.book(pet, doctor, service, s, None).await;
            }
        })
    };

    let mut latencies = Vec::new();
    while !writer.is_finished() {
        let s = slots[latencies.len() % slots.len()];
        let t = Instant::now();
        f.scheduler
            .is_available(doctor, s, s + 30 * MINUTE_MS)
            .await
            .unwrap();
        latencies.push(t.elapsed());
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();
    if latencies.is_empty() {
        println!("  writer finished before any read ran");
        return;
    }
    print_latency("is_available", &mut latencies);
}

#[tokio::main]
async fn main() {
    println!("=== clinic scheduler stress benchmark ===");

    println!("\n[phase 1] sequential booking throughput");
    phase1_sequential().await;

    println!("\n[phase 2] concurrent overlapping bookings");
    phase2_contention().await;

    println!("\n[phase 3] availability latency under booking load");
    phase3_read_under_load().await;

    println!("\n=== benchmark complete ===");
}
