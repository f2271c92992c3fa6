//! Control-surface contract and the background scheduler loop.
//!
//! [`CadenceService`] is the single entry point a presentation layer
//! (table view, dialog, board) calls: CRUD over prompts, conversation
//! creation, the upcoming queue, and recent dispatch history. It also owns
//! the background loop that ticks the schedule and dispatches due prompts.

use crate::config::CadenceConfig;
use crate::conversation::ConversationBuilder;
use crate::dispatch::{DispatchReport, Dispatcher};
use crate::error::Result;
use crate::schedule::{ScheduleEngine, upcoming};
use crate::store::{Prompt, PromptStore};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::info;

/// Number of dispatch-history entries kept in memory.
const DEFAULT_HISTORY_LIMIT: usize = 400;

/// Maximum characters of agent output kept in a history summary.
const SUMMARY_MAX_CHARS: usize = 200;

/// One completed dispatch hop, kept for display.
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    /// Id of the dispatched prompt.
    pub prompt_id: String,
    /// When the enclosing dispatch call started.
    pub started_at: DateTime<Utc>,
    /// When the enclosing dispatch call finished.
    pub finished_at: DateTime<Utc>,
    /// Outcome label (`"success"`, `"agent error"`, …).
    pub outcome: String,
    /// Truncated response or diagnostics.
    pub summary: String,
}

/// Service handle tying the prompt store, dispatcher, and scheduler loop
/// together behind the control-surface contract.
pub struct CadenceService {
    store: Arc<PromptStore>,
    dispatcher: Dispatcher,
    reload_flag: Arc<AtomicBool>,
    tick_interval: Duration,
    history: Mutex<Vec<DispatchRecord>>,
    max_history_entries: usize,
}

impl CadenceService {
    /// Create a service over an open store and a configured dispatcher.
    pub fn new(store: Arc<PromptStore>, dispatcher: Dispatcher, tick_interval: Duration) -> Self {
        let reload_flag = store.change_flag();
        Self {
            store,
            dispatcher,
            reload_flag,
            tick_interval,
            history: Mutex::new(Vec::new()),
            max_history_entries: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Build the store, dispatcher, and service from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt store cannot be opened.
    pub fn from_config(config: &CadenceConfig) -> Result<Self> {
        let store = Arc::new(PromptStore::open(config.store.path.clone())?);
        let dispatcher = Dispatcher::new(Arc::clone(&store), &config.agent);
        Ok(Self::new(
            store,
            dispatcher,
            Duration::from_secs(config.scheduler.tick_interval_secs.max(1)),
        ))
    }

    /// Override the in-memory dispatch-history limit.
    pub fn with_history_limit(mut self, max_entries: usize) -> Self {
        self.max_history_entries = max_entries.max(1);
        self
    }

    /// The underlying prompt store.
    pub fn store(&self) -> &Arc<PromptStore> {
        &self.store
    }

    // -----------------------------------------------------------------
    // Control-surface contract
    // -----------------------------------------------------------------

    /// All prompts in insertion order.
    pub fn list_prompts(&self) -> Vec<Prompt> {
        self.store.load()
    }

    /// Add a prompt. Returns the generated id.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence fails.
    pub fn add_prompt(
        &self,
        text: &str,
        schedule: &str,
        conversation_id: Option<String>,
        next_prompt_id: Option<String>,
    ) -> Result<String> {
        self.store.add(text, schedule, conversation_id, next_prompt_id)
    }

    /// Update a prompt's text and schedule.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the id does not resolve, or a store error.
    pub fn edit_prompt(&self, id: &str, text: &str, schedule: &str) -> Result<()> {
        self.store.edit(id, text, schedule)
    }

    /// Delete a prompt.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the id does not resolve, or a store error.
    pub fn delete_prompt(&self, id: &str) -> Result<()> {
        self.store.delete(id)
    }

    /// Create a conversation from an ordered sequence of texts.
    /// Returns the new conversation id.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty sequence or a failed persist.
    pub fn create_conversation<I, S>(&self, texts: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ConversationBuilder::from_texts(texts).commit(&self.store)
    }

    /// Upcoming `(fire_time, prompt_id)` pairs, sorted by fire time.
    ///
    /// Computed from a fresh store snapshot; for display purposes only.
    pub fn upcoming(&self) -> Vec<(DateTime<Utc>, String)> {
        upcoming(&self.store.load(), Utc::now())
    }

    /// Recent dispatch history, oldest first.
    pub fn history(&self) -> Vec<DispatchRecord> {
        self.lock_history().clone()
    }

    // -----------------------------------------------------------------
    // Scheduler loop
    // -----------------------------------------------------------------

    /// Start the background scheduler loop.
    pub fn spawn_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.run_loop().await;
        })
    }

    async fn run_loop(&self) {
        let mut engine = ScheduleEngine::new();
        engine.reload(&self.store.load(), Utc::now());
        info!(armed = engine.armed().len(), "scheduler loop started");

        let mut interval = tokio::time::interval(self.tick_interval);
        loop {
            interval.tick().await;
            self.tick_once(&mut engine, Utc::now()).await;
        }
    }

    /// Execute one scheduler tick at `now`.
    ///
    /// Consumes the reload flag first, so any mutation is observed before
    /// due jobs are scanned. Due jobs dispatch strictly sequentially (at
    /// most one agent invocation in flight) and each fired head is
    /// re-armed from its expression at the post-dispatch time.
    pub async fn tick_once(&self, engine: &mut ScheduleEngine, now: DateTime<Utc>) {
        if self.reload_flag.swap(false, Ordering::SeqCst) {
            engine.reload(&self.store.load(), now);
        }

        for prompt_id in engine.due(now) {
            let started_at = Utc::now();
            let reports = self.dispatcher.dispatch(&prompt_id).await;
            self.record_reports(&reports, started_at, Utc::now());
            engine.rearm(&prompt_id, Utc::now());
        }
    }

    fn record_reports(
        &self,
        reports: &[DispatchReport],
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) {
        let mut history = self.lock_history();
        for report in reports {
            history.push(DispatchRecord {
                prompt_id: report.prompt_id.clone(),
                started_at,
                finished_at,
                outcome: report.outcome.label().to_owned(),
                summary: summarize(&report.outcome),
            });
        }
        if history.len() > self.max_history_entries {
            let drop_count = history.len() - self.max_history_entries;
            history.drain(0..drop_count);
        }
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, Vec<DispatchRecord>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn summarize(outcome: &crate::dispatch::DispatchOutcome) -> String {
    use crate::dispatch::DispatchOutcome;
    match outcome {
        DispatchOutcome::Success { output } => truncate(output, SUMMARY_MAX_CHARS),
        DispatchOutcome::AgentError { status, stderr } => match status {
            Some(code) => format!("exit {code}: {}", truncate(stderr, SUMMARY_MAX_CHARS)),
            None => truncate(stderr, SUMMARY_MAX_CHARS),
        },
        other => other.label().to_owned(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_owned();
    }
    let mut out: String = trimmed.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
