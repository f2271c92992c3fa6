//! Armed-job bookkeeping for chain-head prompts.
//!
//! The engine owns no clock and no I/O: `reload` is fed a store snapshot
//! and an explicit `now`, which keeps every transition deterministic and
//! unit-testable. The armed-job set is owned exclusively by the scheduler
//! loop; losing it is always recoverable by reloading from the store.

use crate::schedule::expr::ScheduleExpr;
use crate::store::Prompt;
use chrono::{DateTime, Utc};
use tracing::debug;

/// In-memory record of a chain head's next computed fire time.
#[derive(Debug, Clone)]
pub struct ArmedJob {
    /// Id of the chain-head prompt this job fires.
    pub prompt_id: String,
    /// Next fire time.
    pub fire_at: DateTime<Utc>,
    /// Parsed expression used for re-arming.
    expr: ScheduleExpr,
}

/// Maintains armed jobs derived from chain-head prompts.
#[derive(Debug, Default)]
pub struct ScheduleEngine {
    /// Armed jobs in arming order. Jobs due within the same tick fire in
    /// this order; there is no priority among them.
    jobs: Vec<ArmedJob>,
}

impl ScheduleEngine {
    /// Create an engine with no armed jobs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute the armed-job set from a prompt snapshot.
    ///
    /// Clears all currently armed jobs, then arms every chain-head prompt
    /// whose schedule expression is recognised, in snapshot order. Prompts
    /// with empty or unrecognised expressions are left unscheduled without
    /// raising an error.
    pub fn reload(&mut self, prompts: &[Prompt], now: DateTime<Utc>) {
        self.jobs.clear();
        for prompt in prompts {
            if !prompt.is_chain_head() {
                continue;
            }
            let Some(expr) = ScheduleExpr::parse(&prompt.schedule) else {
                if !prompt.schedule.trim().is_empty() {
                    debug!(
                        prompt_id = %prompt.id,
                        schedule = %prompt.schedule,
                        "unrecognised schedule expression, leaving unscheduled"
                    );
                }
                continue;
            };
            let Some(fire_at) = expr.next_after(now) else {
                debug!(prompt_id = %prompt.id, "schedule has no future occurrence");
                continue;
            };
            self.jobs.push(ArmedJob {
                prompt_id: prompt.id.clone(),
                fire_at,
                expr,
            });
        }
        debug!(armed = self.jobs.len(), "schedule reloaded");
    }

    /// Ids of jobs due at `now`, in deterministic queue order.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<String> {
        self.jobs
            .iter()
            .filter(|job| job.fire_at <= now)
            .map(|job| job.prompt_id.clone())
            .collect()
    }

    /// Re-arm a fired job from its expression evaluated at the
    /// post-dispatch `now`. A job whose expression yields no further
    /// occurrence is disarmed.
    pub fn rearm(&mut self, prompt_id: &str, now: DateTime<Utc>) {
        let Some(index) = self.jobs.iter().position(|j| j.prompt_id == prompt_id) else {
            return;
        };
        match self.jobs[index].expr.next_after(now) {
            Some(fire_at) => self.jobs[index].fire_at = fire_at,
            None => {
                debug!(prompt_id, "no further occurrence, disarming");
                self.jobs.remove(index);
            }
        }
    }

    /// Currently armed jobs, in queue order.
    pub fn armed(&self) -> &[ArmedJob] {
        &self.jobs
    }
}

/// Compute `(fire_time, prompt_id)` pairs for display, sorted by fire time.
///
/// Works from a store snapshot with the same arming rules as
/// [`ScheduleEngine::reload`], so the control surface never has to touch
/// the loop-owned job set.
pub fn upcoming(prompts: &[Prompt], now: DateTime<Utc>) -> Vec<(DateTime<Utc>, String)> {
    let mut entries: Vec<(DateTime<Utc>, String)> = prompts
        .iter()
        .filter(|p| p.is_chain_head())
        .filter_map(|p| {
            let expr = ScheduleExpr::parse(&p.schedule)?;
            let fire_at = expr.next_after(now)?;
            Some((fire_at, p.id.clone()))
        })
        .collect();
    entries.sort_by_key(|(fire_at, _)| *fire_at);
    entries
}
