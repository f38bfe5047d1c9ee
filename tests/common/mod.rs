//! Common test utilities

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use shiftline::clock::ManualClock;
use shiftline::config::Config;
use shiftline::models::{Shift, Worker};
use shiftline::notifications::{NotifyResult, ProcessNotifier, ProcessUpdate};
use shiftline::storage::{InMemoryStore, SchedulingStore};
use shiftline::SchedulingEngine;

/// Fixed "now" for all engine tests: Sunday 2025-06-01 06:00 UTC
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 6, 0, 0).unwrap()
}

/// An instant on June `day` 2025
pub fn june(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, day, hour, 0, 0).unwrap()
}

/// Upgrade-skilled worker on the 08:00-17:00 shift
pub fn day_worker(id: &str) -> Worker {
    Worker::new(id)
        .with_name("Day", id)
        .with_skill("Upgrade")
        .with_shift(Shift::parse("DAY", "08:00", "17:00").unwrap())
}

/// Upgrade-skilled worker on the 22:00-06:00 shift
pub fn night_worker(id: &str) -> Worker {
    Worker::new(id)
        .with_name("Night", id)
        .with_skill("Upgrade")
        .with_shift(Shift::parse("NIGHT", "22:00", "06:00").unwrap())
}

/// Config with a given per-window capacity and defaults otherwise
pub fn config_with_capacity(capacity: u32) -> Config {
    let mut config = Config::default();
    config.scheduling.capacity_per_window = capacity;
    config
}

/// Notifier that keeps every update it receives
#[derive(Default)]
pub struct RecordingNotifier {
    updates: Mutex<Vec<ProcessUpdate>>,
}

impl RecordingNotifier {
    pub fn updates(&self) -> Vec<ProcessUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessNotifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn schedule_updated(&self, update: &ProcessUpdate) -> NotifyResult<()> {
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }
}

/// Engine plus handles on its collaborators
pub struct Harness {
    pub engine: Arc<SchedulingEngine>,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Build an engine over an in-memory store seeded with `workers`
pub async fn harness(config: Config, workers: Vec<Worker>) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    for worker in &workers {
        store.save_worker(worker).await.unwrap();
    }
    let clock = Arc::new(ManualClock::new(now()));
    let notifier = Arc::new(RecordingNotifier::default());

    let engine = SchedulingEngine::new(config, store.clone(), clock.clone(), notifier.clone())
        .expect("valid test config");

    Harness {
        engine: Arc::new(engine),
        store,
        clock,
        notifier,
    }
}
