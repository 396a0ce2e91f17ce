use thiserror::Error;

use crate::ids::{TaskDefinitionId, TaskInstanceId};

/// Returned synchronously from [`crate::TaskDefinition`] validation at
/// upsert time. No state change happens when this is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("task definitions must have an id")]
    MissingId,
    #[error("task definitions must have metadata")]
    MissingMetadata,
    #[error("task definitions must have exactly one trigger")]
    MissingTrigger,
}

/// Returned synchronously from [`crate::Trigger::cron`].
#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("cannot parse cron expression: {0}")]
    CronParse(#[from] cron::error::Error),
}

/// Raised by any [`crate::Store`] operation. Inside the engine's loops this
/// is always logged and swallowed; on the public API's `get_*` calls it is
/// propagated to the caller.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("task definition '{0}' not found")]
    DefinitionNotFound(TaskDefinitionId),
    #[error("task instance '{0}' not found")]
    InstanceNotFound(TaskInstanceId),
    #[error("unsupported metadata query")]
    UnsupportedQuery,
}
