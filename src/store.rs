//! Persisted prompt repository.
//!
//! Prompts are stored as newline-delimited JSON, one record per line, at a
//! configurable path. Every mutation rewrites the complete record set and
//! publishes it atomically (write to a temporary sibling, then rename), so
//! a concurrent reader never observes a partially written file.

use crate::error::{CadenceError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A persisted unit of text destined for the external agent, optionally
/// part of a conversation chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Stable identifier, generated once at creation.
    pub id: String,
    /// Text sent to the agent.
    #[serde(rename = "prompt")]
    pub text: String,
    /// Cron expression, the legacy `"every minute"` shorthand, or empty.
    pub schedule: String,
    /// Grouping key for conversation chains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Forward link to the next prompt in the chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_prompt_id: Option<String>,
    /// Marks the chain head within a conversation.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_first: bool,
}

impl Prompt {
    /// Returns `true` if this prompt is eligible for direct cron arming.
    ///
    /// A prompt with no conversation is trivially its own chain head;
    /// within a conversation only the `is_first` member qualifies.
    pub fn is_chain_head(&self) -> bool {
        self.conversation_id.is_none() || self.is_first
    }
}

/// Repository of [`Prompt`] records backed by a JSONL file.
///
/// All reads and writes are serialised through one exclusive lock spanning
/// load → mutate → persist. Successful mutations raise a shared change
/// flag so the scheduler loop reloads before its next tick.
pub struct PromptStore {
    path: PathBuf,
    records: Mutex<Vec<Prompt>>,
    changed: Arc<AtomicBool>,
}

impl PromptStore {
    /// Open the store at `path`, loading any existing records.
    ///
    /// A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = load_records(&path)?;
        Ok(Self {
            path,
            records: Mutex::new(records),
            changed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shared flag raised after every successful mutation.
    ///
    /// The scheduler loop consumes it with `swap(false)` before each tick;
    /// at-least-once delivery is sufficient because reload is idempotent
    /// for a fixed persisted state.
    pub fn change_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.changed)
    }

    /// Returns a snapshot of all records in insertion order.
    pub fn load(&self) -> Vec<Prompt> {
        self.lock().clone()
    }

    /// Look up a single prompt by id.
    pub fn get(&self, id: &str) -> Option<Prompt> {
        self.lock().iter().find(|p| p.id == id).cloned()
    }

    /// Append a new prompt and persist. Returns the generated id.
    ///
    /// # Errors
    ///
    /// Returns an error if the record set cannot be persisted.
    pub fn add(
        &self,
        text: &str,
        schedule: &str,
        conversation_id: Option<String>,
        next_prompt_id: Option<String>,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let prompt = Prompt {
            id: id.clone(),
            text: text.to_owned(),
            schedule: schedule.to_owned(),
            conversation_id,
            next_prompt_id,
            is_first: false,
        };
        self.mutate(move |records| {
            records.push(prompt);
            Ok(())
        })?;
        Ok(id)
    }

    /// Append a pre-linked chain of prompts, persisted as one atomic
    /// publish. No partial chain ever becomes visible.
    ///
    /// # Errors
    ///
    /// Returns an error if the record set cannot be persisted.
    pub fn append_chain(&self, chain: Vec<Prompt>) -> Result<()> {
        self.mutate(move |records| {
            records.extend(chain);
            Ok(())
        })
    }

    /// Update a prompt's text and schedule in place. The id is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::NotFound`] if `id` does not resolve, or a
    /// store error if persistence fails.
    pub fn edit(&self, id: &str, new_text: &str, new_schedule: &str) -> Result<()> {
        let id = id.to_owned();
        let new_text = new_text.to_owned();
        let new_schedule = new_schedule.to_owned();
        self.mutate(move |records| {
            let record = records
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| CadenceError::NotFound(format!("prompt {id}")))?;
            record.text = new_text;
            record.schedule = new_schedule;
            Ok(())
        })
    }

    /// Remove a prompt by id.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::NotFound`] if `id` does not resolve, or a
    /// store error if persistence fails.
    pub fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_owned();
        self.mutate(move |records| {
            let before = records.len();
            records.retain(|p| p.id != id);
            if records.len() == before {
                return Err(CadenceError::NotFound(format!("prompt {id}")));
            }
            Ok(())
        })
    }

    /// Apply a mutation to a working copy, persist it, then commit.
    ///
    /// The in-memory set only changes once the rename has succeeded, so a
    /// failed persist leaves both file and memory untouched.
    fn mutate<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Prompt>) -> Result<()>,
    {
        let mut guard = self.lock();
        let mut next = guard.clone();
        f(&mut next)?;
        persist_records(&self.path, &next)?;
        *guard = next;
        self.changed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Prompt>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn load_records(path: &Path) -> Result<Vec<Prompt>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(CadenceError::Store(format!(
                "cannot read {}: {e}",
                path.display()
            )));
        }
    };

    let mut records = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let prompt: Prompt = serde_json::from_str(line).map_err(|e| {
            CadenceError::Store(format!(
                "cannot parse {} line {}: {e}",
                path.display(),
                lineno + 1
            ))
        })?;
        records.push(prompt);
    }
    Ok(records)
}

/// Write the full record set to a temporary sibling and rename it over the
/// store path. Readers see either the old file or the new one, never a mix.
fn persist_records(path: &Path, records: &[Prompt]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| CadenceError::Store(format!("cannot create store dir: {e}")))?;
    }

    let mut buf = String::new();
    for record in records {
        let line = serde_json::to_string(record)
            .map_err(|e| CadenceError::Store(format!("cannot serialise prompt: {e}")))?;
        buf.push_str(&line);
        buf.push('\n');
    }

    let tmp = path.with_extension("jsonl.tmp");
    let mut file = std::fs::File::create(&tmp)
        .map_err(|e| CadenceError::Store(format!("cannot create {}: {e}", tmp.display())))?;
    file.write_all(buf.as_bytes())
        .map_err(|e| CadenceError::Store(format!("cannot write {}: {e}", tmp.display())))?;
    file.sync_all()
        .map_err(|e| CadenceError::Store(format!("cannot sync {}: {e}", tmp.display())))?;
    drop(file);

    std::fs::rename(&tmp, path)
        .map_err(|e| CadenceError::Store(format!("cannot publish {}: {e}", path.display())))?;
    Ok(())
}
