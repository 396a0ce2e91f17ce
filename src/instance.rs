//! A single materialised execution of a [`crate::TaskDefinition`].
//!
//! No behavior beyond attribute storage — created only by the projector
//! loop, mutated only by the runner and janitor loops (`spec.md` §4.C).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{TaskDefinitionId, TaskInstanceId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: TaskInstanceId,
    pub task_definition_id: TaskDefinitionId,
    pub execute_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskInstance {
    pub fn new(
        task_definition_id: TaskDefinitionId,
        execute_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TaskInstanceId::generate(),
            task_definition_id,
            execute_at,
            started_at: None,
            expires_at,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.started_at.is_none()
    }

    /// "in flight" per `spec.md` §3: leased but neither completed nor
    /// expired yet.
    pub fn is_in_flight(&self, now: DateTime<Utc>) -> bool {
        self.started_at.is_some() && self.completed_at.is_none() && self.expires_at >= now
    }
}
