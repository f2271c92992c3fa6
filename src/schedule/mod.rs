//! Cron-time evaluation and armed-job management.
//!
//! Chain-head prompts with a recognised schedule expression are armed with
//! their next fire time; the background loop scans for due jobs each tick
//! and re-arms them after dispatch.

pub mod engine;
pub mod expr;

pub use engine::{ArmedJob, ScheduleEngine, upcoming};
pub use expr::ScheduleExpr;
