//! The firing rule attached to a [`crate::TaskDefinition`].
//!
//! Two variants, no runtime reflection: a fixed instant, or a cron
//! expression. Both produce the next firing instant from a reference
//! instant; the definition stores whichever produced `next_fire_time` most
//! recently and never re-derives it except at upsert/projection time.

use std::borrow::Cow;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TriggerError;

/// `one_shot` and `cron` are stored as parallel optional fields on the wire
/// (see [`crate::TaskDefinition`]); this enum is the in-memory, always-valid
/// representation used everywhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Trigger {
    OneShot { fire_at: DateTime<Utc> },
    Cron {
        expression: String,
        #[serde(skip, default = "Trigger::reparse_cron_schedule")]
        schedule: Option<cron::Schedule>,
    },
}

impl Trigger {
    pub fn one_shot(fire_at: DateTime<Utc>) -> Self {
        Trigger::OneShot { fire_at }
    }

    /// Parses `expression` once, at construction time; a parse failure is
    /// reported here rather than deferred to the first `next_fire_time`
    /// call.
    pub fn cron(expression: &str) -> Result<Self, TriggerError> {
        let schedule = cron::Schedule::from_str(expression)?;
        Ok(Trigger::Cron {
            expression: expression.to_owned(),
            schedule: Some(schedule),
        })
    }

    pub fn is_recurring(&self) -> bool {
        matches!(self, Trigger::Cron { .. })
    }

    /// The smallest instant strictly greater than `from` that the trigger
    /// fires at. For a one-shot trigger this is the fixed instant,
    /// regardless of `from` (it may be in the past; the engine never refires
    /// a one-shot because the definition's `next_fire_time` is cleared after
    /// one projection).
    ///
    /// For a cron trigger whose `schedule` hasn't been parsed yet (a
    /// `Trigger::Cron` built by `serde_json::from_str` rather than
    /// [`Self::cron`] arrives with `schedule: None`, since it's skipped by
    /// serde) this reparses `expression` on the spot instead of assuming the
    /// cache is already populated. `expression` was already validated by
    /// [`Self::cron`] at construction time, so reparsing it here can only
    /// fail if the JSON was hand-crafted with an expression that was never
    /// valid to begin with.
    pub fn next_fire_time(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            | Trigger::OneShot { fire_at } => *fire_at,
            | Trigger::Cron {
                expression,
                schedule,
            } => {
                let schedule = match schedule {
                    | Some(schedule) => Cow::Borrowed(schedule),
                    | None => Cow::Owned(cron::Schedule::from_str(expression).expect(
                        "Trigger::cron validates the expression at construction time",
                    )),
                };
                schedule
                    .after(&from)
                    .next()
                    .expect("a cron schedule with no upper year bound always has a next tick")
            }
        }
    }

    // `schedule` is skipped by serde (it isn't `Serialize`), so a `Cron`
    // trigger deserialized directly arrives with `schedule: None`;
    // `next_fire_time` reparses `expression` lazily when that happens.
    fn reparse_cron_schedule() -> Option<cron::Schedule> {
        None
    }

    /// Parses and caches `schedule` from `expression` if it isn't already
    /// populated. Purely a performance optimization for callers that invoke
    /// `next_fire_time` repeatedly (e.g. the projector loop advancing a
    /// recurring definition) — correctness does not depend on calling this,
    /// since `next_fire_time` reparses lazily on its own.
    pub(crate) fn ensure_parsed(&mut self) -> Result<(), TriggerError> {
        if let Trigger::Cron {
            expression,
            schedule,
        } = self
        {
            if schedule.is_none() {
                *schedule = Some(cron::Schedule::from_str(expression)?);
            }
        }
        Ok(())
    }
}
