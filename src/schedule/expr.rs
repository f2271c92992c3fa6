//! Schedule expression parsing and next-occurrence evaluation.

use chrono::{DateTime, Duration, Utc};
use std::str::FromStr;

/// Legacy shorthand accepted in place of a cron expression.
const EVERY_MINUTE: &str = "every minute";

/// A recognised schedule expression.
///
/// Parsing is deliberately forgiving: anything that is neither valid cron
/// nor the legacy shorthand yields `None`, and the prompt is simply left
/// unscheduled. That is a silent no-op, not an error.
#[derive(Debug, Clone)]
pub enum ScheduleExpr {
    /// A cron expression, evaluated by the `cron` crate.
    Cron(Box<cron::Schedule>),
    /// The legacy `"every minute"` shorthand: a once-per-minute timer.
    EveryMinute,
}

impl ScheduleExpr {
    /// Parse a raw schedule string.
    ///
    /// Five-field expressions get a seconds column prefixed so the standard
    /// evaluator accepts them; six- and seven-field expressions pass
    /// through unchanged. Empty and unrecognised strings yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Ok(schedule) = cron::Schedule::from_str(&normalize(trimmed)) {
            return Some(Self::Cron(Box::new(schedule)));
        }

        if trimmed.eq_ignore_ascii_case(EVERY_MINUTE) {
            return Some(Self::EveryMinute);
        }

        None
    }

    /// First occurrence strictly after `now`, or `None` when the
    /// expression has no future occurrence.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron(schedule) => schedule.after(&now).next(),
            Self::EveryMinute => Some(now + Duration::seconds(60)),
        }
    }
}

/// Prefix a seconds column onto 5-field expressions.
fn normalize(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_owned()
    }
}
