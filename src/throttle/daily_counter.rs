//! Per-process daily request quota, reset lazily at the UTC day boundary.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::ModelCatalog;
use crate::error::Result;

#[derive(Debug)]
struct DailyCounterState {
    count: u64,
    last_reset_day: u32,
}

/// Counts upstream attempts against the model's `requests_per_day`
///
/// Rejected attempts still count, so once the quota is hit every further
/// call of the day is rejected too.
#[derive(Debug)]
pub struct DailyRequestCounter {
    state: Mutex<DailyCounterState>,
    catalog: Arc<ModelCatalog>,
}

impl DailyRequestCounter {
    pub fn new(catalog: Arc<ModelCatalog>) -> Self {
        Self::starting_at(catalog, Utc::now())
    }

    /// A counter whose current day is taken from `now`
    pub fn starting_at(catalog: Arc<ModelCatalog>, now: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(DailyCounterState {
                count: 0,
                last_reset_day: now.day(),
            }),
            catalog,
        }
    }

    /// Count one request for `model`; `false` once the daily quota is exceeded
    pub async fn increment_and_check(&self, model: &str) -> Result<bool> {
        self.increment_and_check_at(model, Utc::now()).await
    }

    pub async fn increment_and_check_at(&self, model: &str, now: DateTime<Utc>) -> Result<bool> {
        let limit = self.catalog.limits(model)?.requests_per_day;
        let mut state = self.state.lock().await;

        let today = now.day();
        if today != state.last_reset_day {
            debug!(previous = state.last_reset_day, today, "Resetting daily request counter");
            state.count = 0;
            state.last_reset_day = today;
        }

        state.count += 1;
        if state.count > limit {
            warn!(model, count = state.count, limit, "Daily request quota exceeded");
            return Ok(false);
        }
        Ok(true)
    }

    pub async fn count(&self) -> u64 {
        self.state.lock().await.count
    }

    /// Overwrite the count for the current day
    pub async fn preset(&self, count: u64) {
        self.state.lock().await.count = count;
    }
}
