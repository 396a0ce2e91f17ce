//! The transactional persistence contract that gives the engine its
//! correctness guarantees (`spec.md` §4.D).
//!
//! Grounded in the teacher's `TriggerStore` trait
//! (`examples/devtari-io-cronback/scheduler/src/sched/trigger_store.rs`):
//! an `#[async_trait]` interface with one concrete adapter. Here the only
//! shipped adapter is the in-memory one in [`crate::store::memory`] — a
//! relational adapter is an external collaborator per `spec.md` §1.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::ids::{TaskDefinitionId, TaskInstanceId};
use crate::{TaskDefinition, TaskInstance};

/// Every operation is transactional on the backend (`spec.md` §4.D). The
/// `MetadataQuery` associated type is the "opaque, backend-typed value, not
/// a structured AST" called for in `spec.md` §9 — each adapter picks its
/// own representation (e.g. a JSON containment clause for a document
/// store, or the single-key [`memory::MetadataQuery`] used here).
#[async_trait]
pub trait Store: Send + Sync {
    type MetadataQuery: Send + Sync;

    /// Idempotent; runs any schema migrations.
    async fn initialize(&self) -> Result<(), StoreError>;

    /// Insert or full-attribute update keyed on `id`. Does not touch
    /// associated instances.
    async fn upsert_definition(&self, definition: TaskDefinition) -> Result<(), StoreError>;

    async fn get_definition(
        &self,
        id: TaskDefinitionId,
    ) -> Result<TaskDefinition, StoreError>;

    /// Ordered by creation time ascending. `metadata_query` of `None` means
    /// no filter.
    async fn list_definitions(
        &self,
        offset: usize,
        limit: usize,
        metadata_query: Option<&Self::MetadataQuery>,
    ) -> Result<Vec<TaskDefinition>, StoreError>;

    /// Cascades to dependent instances.
    async fn delete_definition(&self, id: TaskDefinitionId) -> Result<(), StoreError>;

    /// Cascades to dependent instances.
    async fn delete_definitions(&self, ids: &[TaskDefinitionId]) -> Result<(), StoreError>;

    /// Cascades to dependent instances.
    async fn delete_definitions_by_metadata(
        &self,
        query: &Self::MetadataQuery,
    ) -> Result<(), StoreError>;

    /// Every live definition whose `next_fire_time <= limit`. Triggers must
    /// be loaded (not left lazily unparsed).
    async fn get_definitions_to_schedule(
        &self,
        limit: DateTime<Utc>,
    ) -> Result<Vec<TaskDefinition>, StoreError>;

    /// Keyed on `id`; full-attribute overwrite. Does not write through to
    /// the parent definition.
    async fn upsert_instance(&self, instance: TaskInstance) -> Result<(), StoreError>;

    async fn get_instance(&self, id: TaskInstanceId) -> Result<TaskInstance, StoreError>;

    /// Ordered by creation time ascending.
    async fn list_instances(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<TaskInstance>, StoreError>;

    /// No cascade.
    async fn delete_instance(&self, id: TaskInstanceId) -> Result<(), StoreError>;

    /// Instances where `completed_at IS NULL AND ((started_at IS NULL AND
    /// execute_at <= limit) OR (started_at IS NOT NULL AND expires_at <=
    /// now()))`. The second disjunct is the lease-reclaim clause: it is
    /// *not* bounded by `limit`.
    async fn get_instances_to_run(
        &self,
        limit: DateTime<Utc>,
    ) -> Result<Vec<TaskInstance>, StoreError>;

    /// Inside one transaction: sets `completed_at` on the instance, and, if
    /// the parent definition is non-recurring, on the parent too.
    async fn mark_instance_complete(&self, instance: &TaskInstance) -> Result<(), StoreError>;

    /// Bulk delete where `completed_at IS NOT NULL`.
    async fn delete_completed_instances(&self) -> Result<(), StoreError>;

    /// Bulk delete where `completed_at IS NOT NULL`.
    async fn delete_completed_definitions(&self) -> Result<(), StoreError>;
}
