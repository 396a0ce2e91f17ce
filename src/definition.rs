//! The recurring/one-shot description of work: identity, metadata, trigger,
//! and lease length.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Metadata;

use crate::error::ValidationError;
use crate::ids::TaskDefinitionId;
use crate::trigger::Trigger;

/// See `spec.md` §3 "Task Definition" for the field-level contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: TaskDefinitionId,
    pub metadata: Metadata,
    #[serde(with = "duration_ms")]
    pub expire_after: Duration,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub recurring: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub trigger: Trigger,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskDefinition {
    /// Builds a definition ready to hand to [`crate::Store::upsert_definition`].
    /// Fresh ids are generated here; the engine only fills in `next_fire_time`
    /// and the zero-duration `expire_after` substitution (it needs the
    /// scheduler's window, which this constructor doesn't know about).
    pub fn new(metadata: Metadata, trigger: Trigger) -> Self {
        let now = Utc::now();
        Self {
            id: TaskDefinitionId::generate(),
            metadata,
            expire_after: Duration::ZERO,
            next_fire_time: None,
            recurring: trigger.is_recurring(),
            completed_at: None,
            trigger,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: TaskDefinitionId) -> Self {
        self.id = id;
        self
    }

    pub fn with_expire_after(mut self, expire_after: Duration) -> Self {
        self.expire_after = expire_after;
        self
    }

    pub fn is_live(&self) -> bool {
        self.completed_at.is_none()
    }

    /// Missing-id/metadata checks from `spec.md` §4.B. Metadata must be
    /// present but `Value::Null` counts as "no metadata" the same way the
    /// original's nil `interface{}` did. "Exactly one trigger" is enforced
    /// structurally by [`Trigger`] rather than here — see
    /// [`Self::from_columns`] for the one place that check still has to
    /// happen at runtime.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_nil() {
            return Err(ValidationError::MissingId);
        }
        if self.metadata.is_null() {
            return Err(ValidationError::MissingMetadata);
        }
        Ok(())
    }

    /// Reconstructs a definition from the persisted-schema shape described
    /// in `spec.md` §4.A: "exactly one of `{one_shot(fire_at),
    /// cron(expression)}`; stored as parallel optional columns, never both
    /// non-null." A relational store adapter reading its two nullable
    /// columns back calls this instead of building a [`Trigger`] directly,
    /// since only here is "neither/both set" actually a value that can
    /// occur at runtime.
    #[allow(clippy::too_many_arguments)]
    pub fn from_columns(
        id: TaskDefinitionId,
        metadata: Metadata,
        expire_after: Duration,
        next_fire_time: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
        one_shot_fire_at: Option<DateTime<Utc>>,
        cron_expression: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let trigger = match (one_shot_fire_at, cron_expression) {
            | (Some(fire_at), None) => Trigger::one_shot(fire_at),
            | (None, Some(expression)) => Trigger::cron(&expression)
                .map_err(|_| ValidationError::MissingTrigger)?,
            | (None, None) | (Some(_), Some(_)) => {
                return Err(ValidationError::MissingTrigger)
            }
        };
        let recurring = trigger.is_recurring();
        Ok(Self {
            id,
            metadata,
            expire_after,
            next_fire_time,
            recurring,
            completed_at,
            trigger,
            created_at,
            updated_at,
        })
    }

    /// Recomputes `next_fire_time`/`recurring` from `trigger`, substitutes
    /// `expire_after` with `default_expire_after` when zero, and assigns a
    /// fresh id when none was supplied. Called by
    /// [`crate::Scheduler::upsert_definition`] so that editing a trigger
    /// takes effect immediately (`spec.md` §4.B).
    pub(crate) fn prepare_for_upsert(&mut self, default_expire_after: Duration) {
        if self.id.is_nil() {
            self.id = TaskDefinitionId::generate();
        }
        if self.expire_after.is_zero() {
            self.expire_after = default_expire_after;
        }
        self.recurring = self.trigger.is_recurring();
        self.next_fire_time = Some(self.trigger.next_fire_time(Utc::now()));
        self.updated_at = Utc::now();
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_nil_id() {
        let mut def = TaskDefinition::new(
            serde_json::json!({"a": 1}),
            Trigger::one_shot(Utc::now()),
        );
        def.id = TaskDefinitionId::nil();
        assert_eq!(def.validate(), Err(ValidationError::MissingId));
    }

    #[test]
    fn validate_rejects_null_metadata() {
        let def = TaskDefinition::new(Metadata::Null, Trigger::one_shot(Utc::now()));
        assert_eq!(def.validate(), Err(ValidationError::MissingMetadata));
    }

    #[test]
    fn prepare_for_upsert_substitutes_zero_expire_after() {
        let mut def = TaskDefinition::new(
            serde_json::json!({}),
            Trigger::one_shot(Utc::now() + chrono::Duration::seconds(5)),
        );
        def.prepare_for_upsert(Duration::from_secs(30));
        assert_eq!(def.expire_after, Duration::from_secs(30));
        assert!(!def.recurring);
        assert!(def.next_fire_time.is_some());
    }

    #[test]
    fn prepare_for_upsert_keeps_explicit_expire_after() {
        let mut def = TaskDefinition::new(
            serde_json::json!({}),
            Trigger::one_shot(Utc::now() + chrono::Duration::seconds(5)),
        )
        .with_expire_after(Duration::from_secs(10));
        def.prepare_for_upsert(Duration::from_secs(30));
        assert_eq!(def.expire_after, Duration::from_secs(10));
    }

    #[test]
    fn from_columns_rejects_neither_trigger_set() {
        let now = Utc::now();
        let result = TaskDefinition::from_columns(
            TaskDefinitionId::generate(),
            serde_json::json!({}),
            Duration::from_secs(1),
            None,
            None,
            None,
            None,
            now,
            now,
        );
        assert_eq!(result.err(), Some(ValidationError::MissingTrigger));
    }

    #[test]
    fn from_columns_rejects_both_triggers_set() {
        let now = Utc::now();
        let result = TaskDefinition::from_columns(
            TaskDefinitionId::generate(),
            serde_json::json!({}),
            Duration::from_secs(1),
            None,
            None,
            Some(now),
            Some("* * * * * * *".to_owned()),
            now,
            now,
        );
        assert_eq!(result.err(), Some(ValidationError::MissingTrigger));
    }

    #[test]
    fn prepare_for_upsert_derives_recurring_from_trigger() {
        let mut def =
            TaskDefinition::new(serde_json::json!({}), Trigger::cron("* * * * * * *").unwrap());
        def.prepare_for_upsert(Duration::from_secs(1));
        assert!(def.recurring);
    }
}
