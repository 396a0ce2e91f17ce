//! Reference [`Store`] implementation. This is the adapter the test suite
//! and the crate's own doctests run against — `spec.md` §1 keeps any
//! production store (relational or otherwise) out of scope, but the engine
//! needs *something* concrete to drive the testable properties in §8
//! against.
//!
//! Grounded directly in `examples/original_source/pkg/memory_store.go`:
//! that implementation keeps a schedule-ordered tree of ids plus a
//! by-id tree of full rows, under a single mutex. The shape carries over
//! one-to-one; only the tree type changes (`BTreeMap` instead of a
//! B-tree-of-bytes) since we don't need `emirpasic/gods`'s generic
//! comparator dance when Rust's ordering is a trait.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::Store;
use crate::error::StoreError;
use crate::ids::{TaskDefinitionId, TaskInstanceId};
use crate::{TaskDefinition, TaskInstance};

/// Single-key containment filter: `pointer` is a JSON Pointer
/// (`serde_json::Value::pointer`) into a definition's metadata document,
/// `expected` is the value it must equal. This is the in-memory analogue
/// of the JSON containment operator mentioned in `spec.md` §6.
#[derive(Debug, Clone)]
pub struct MetadataQuery {
    pub pointer: String,
    pub expected: Value,
}

impl MetadataQuery {
    pub fn new(pointer: impl Into<String>, expected: Value) -> Self {
        Self {
            pointer: pointer.into(),
            expected,
        }
    }

    fn matches(&self, metadata: &Value) -> bool {
        metadata.pointer(&self.pointer) == Some(&self.expected)
    }
}

#[derive(Default)]
struct State {
    definitions: BTreeMap<TaskDefinitionId, TaskDefinition>,
    instances: BTreeMap<TaskInstanceId, TaskInstance>,
    // Enforces "at most one row per (task_definition_id, execute_at)"
    // (spec.md §3) so re-projection within a window is idempotent.
    instance_by_schedule_key: HashMap<(TaskDefinitionId, DateTime<Utc>), TaskInstanceId>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type MetadataQuery = MetadataQuery;

    async fn initialize(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert_definition(&self, mut definition: TaskDefinition) -> Result<(), StoreError> {
        let _ = definition.trigger.ensure_parsed();
        let mut state = self.state.lock().unwrap();
        state.definitions.insert(definition.id, definition);
        Ok(())
    }

    async fn get_definition(&self, id: TaskDefinitionId) -> Result<TaskDefinition, StoreError> {
        let state = self.state.lock().unwrap();
        state
            .definitions
            .get(&id)
            .cloned()
            .ok_or(StoreError::DefinitionNotFound(id))
    }

    async fn list_definitions(
        &self,
        offset: usize,
        limit: usize,
        metadata_query: Option<&MetadataQuery>,
    ) -> Result<Vec<TaskDefinition>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut matching: Vec<_> = state
            .definitions
            .values()
            .filter(|d| metadata_query.map_or(true, |q| q.matches(&d.metadata)))
            .cloned()
            .collect();
        matching.sort_by_key(|d| d.created_at);
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete_definition(&self, id: TaskDefinitionId) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.definitions.remove(&id);
        state.instances.retain(|_, i| i.task_definition_id != id);
        state
            .instance_by_schedule_key
            .retain(|(def_id, _), _| *def_id != id);
        Ok(())
    }

    async fn delete_definitions(&self, ids: &[TaskDefinitionId]) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        for id in ids {
            state.definitions.remove(id);
        }
        state
            .instances
            .retain(|_, i| !ids.contains(&i.task_definition_id));
        state
            .instance_by_schedule_key
            .retain(|(def_id, _), _| !ids.contains(def_id));
        Ok(())
    }

    async fn delete_definitions_by_metadata(
        &self,
        query: &MetadataQuery,
    ) -> Result<(), StoreError> {
        let ids: Vec<_> = {
            let state = self.state.lock().unwrap();
            state
                .definitions
                .values()
                .filter(|d| query.matches(&d.metadata))
                .map(|d| d.id)
                .collect()
        };
        self.delete_definitions(&ids).await
    }

    async fn get_definitions_to_schedule(
        &self,
        limit: DateTime<Utc>,
    ) -> Result<Vec<TaskDefinition>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .definitions
            .values()
            .filter(|d| d.is_live() && d.next_fire_time.map_or(false, |t| t <= limit))
            .cloned()
            .collect())
    }

    async fn upsert_instance(&self, instance: TaskInstance) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let key = (instance.task_definition_id, instance.execute_at);
        if let Some(existing_id) = state.instance_by_schedule_key.get(&key).copied() {
            if existing_id != instance.id {
                state.instances.remove(&existing_id);
            }
        }
        state.instance_by_schedule_key.insert(key, instance.id);
        state.instances.insert(instance.id, instance);
        Ok(())
    }

    async fn get_instance(&self, id: TaskInstanceId) -> Result<TaskInstance, StoreError> {
        let state = self.state.lock().unwrap();
        state
            .instances
            .get(&id)
            .cloned()
            .ok_or(StoreError::InstanceNotFound(id))
    }

    async fn list_instances(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<TaskInstance>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut all: Vec<_> = state.instances.values().cloned().collect();
        all.sort_by_key(|i| i.created_at);
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete_instance(&self, id: TaskInstanceId) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(instance) = state.instances.remove(&id) {
            state
                .instance_by_schedule_key
                .remove(&(instance.task_definition_id, instance.execute_at));
        }
        Ok(())
    }

    async fn get_instances_to_run(
        &self,
        limit: DateTime<Utc>,
    ) -> Result<Vec<TaskInstance>, StoreError> {
        let now = Utc::now();
        let state = self.state.lock().unwrap();
        Ok(state
            .instances
            .values()
            .filter(|i| {
                i.completed_at.is_none()
                    && ((i.started_at.is_none() && i.execute_at <= limit)
                        || (i.started_at.is_some() && i.expires_at <= now))
            })
            .cloned()
            .collect())
    }

    async fn mark_instance_complete(&self, instance: &TaskInstance) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        let definition_id = {
            let stored = state
                .instances
                .get_mut(&instance.id)
                .ok_or(StoreError::InstanceNotFound(instance.id))?;
            stored.completed_at = Some(now);
            stored.updated_at = now;
            stored.task_definition_id
        };
        if let Some(definition) = state.definitions.get_mut(&definition_id) {
            if !definition.recurring {
                definition.completed_at = Some(now);
                definition.updated_at = now;
            }
        }
        Ok(())
    }

    async fn delete_completed_instances(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let completed: Vec<_> = state
            .instances
            .values()
            .filter(|i| i.is_completed())
            .map(|i| (i.id, i.task_definition_id, i.execute_at))
            .collect();
        for (id, def_id, execute_at) in completed {
            state.instances.remove(&id);
            state.instance_by_schedule_key.remove(&(def_id, execute_at));
        }
        Ok(())
    }

    async fn delete_completed_definitions(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let completed: Vec<_> = state
            .definitions
            .values()
            .filter(|d| d.completed_at.is_some())
            .map(|d| d.id)
            .collect();
        for id in completed {
            state.definitions.remove(&id);
        }
        Ok(())
    }
}
