//! cadence: prompt scheduler and conversation chainer for CLI coding agents.
//!
//! Prompts are persisted as newline-delimited JSON, armed from cron
//! expressions (or the legacy `"every minute"` shorthand), and dispatched
//! to an external agent binary when due.
//!
//! # Architecture
//!
//! The system is built from small components wired together by the
//! service handle:
//! - **Store**: JSONL prompt repository with atomic rename publication
//! - **Schedule**: cron evaluation and the armed-job set
//! - **Dispatch**: bounded agent invocation and chain continuation
//! - **Conversation**: ordered prompt chains advanced by completion
//! - **Service**: control-surface contract plus the background tick loop

pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod error;
pub mod schedule;
pub mod service;
pub mod store;

pub use config::CadenceConfig;
pub use conversation::ConversationBuilder;
pub use dispatch::{DispatchOutcome, DispatchReport, Dispatcher};
pub use error::{CadenceError, Result};
pub use schedule::{ArmedJob, ScheduleEngine, ScheduleExpr};
pub use service::{CadenceService, DispatchRecord};
pub use store::{Prompt, PromptStore};
