use std::collections::HashMap;

use chrono::NaiveDate;
use tokio::sync::{Mutex, OnceCell};

use crate::skills::sign::SignEntry;

/// Result recorded for one (user, feature) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DailyPayload {
    /// Index into the cached sign dataset.
    SignIndex(usize),
    /// The quote served to the user today.
    Quote(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyRecord {
    /// Day the record was written. None when the external date source was
    /// unavailable at write time; such a record is never fresh.
    pub date: Option<NaiveDate>,
    pub payload: DailyPayload,
}

/// Per-user, per-feature date-gated state: "has user X already used feature
/// F today, and what was recorded". One record per key, overwritten when the
/// date advances, never evicted. Performs no clock reads of its own; every
/// date comes from the caller's `DateSource` resolution.
///
/// Not synchronized internally. `DispatchState` wraps it in a mutex because
/// the transport may run callbacks concurrently.
#[derive(Debug, Default)]
pub struct DailyStateStore {
    records: HashMap<(String, &'static str), DailyRecord>,
}

impl DailyStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user: &str, feature: &'static str) -> Option<&DailyRecord> {
        self.records.get(&(user.to_string(), feature))
    }

    pub fn put(
        &mut self,
        user: &str,
        feature: &'static str,
        date: Option<NaiveDate>,
        payload: DailyPayload,
    ) {
        self.records
            .insert((user.to_string(), feature), DailyRecord { date, payload });
    }

    /// Whether a record exists for today's resolved date.
    pub fn is_fresh(&self, user: &str, feature: &'static str, today: NaiveDate) -> bool {
        self.get(user, feature)
            .map(|record| record.date == Some(today))
            .unwrap_or(false)
    }
}

/// Mutable caches owned by one dispatcher instance: the per-user daily
/// records and the process-wide sign dataset. Held behind async-aware guards
/// so concurrent transport callbacks stay serialized.
#[derive(Debug, Default)]
pub struct DispatchState {
    pub daily: Mutex<DailyStateStore>,
    /// Lazily fetched sign dataset; single-flight, stays empty on failure.
    pub signs: OnceCell<Vec<SignEntry>>,
}

impl DispatchState {
    pub fn new() -> Self {
        Self::default()
    }
}
