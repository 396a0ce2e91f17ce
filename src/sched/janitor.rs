//! Garbage-collects completed instances and definitions (`spec.md` §4.E
//! third loop).

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, instrument};

use crate::shutdown::Shutdown;
use crate::store::Store;

#[instrument(skip_all, name = "janitor")]
pub(super) async fn run_loop<S: Store>(store: Arc<S>, window: Duration, mut shutdown: Shutdown) {
    let mut tick = tokio::time::interval(window);
    loop {
        tokio::select! {
            _ = tick.tick() => tick_once(store.as_ref()).await,
            _ = shutdown.recv() => break,
        }
    }
}

/// Instances are deleted before definitions so that a definition's
/// completed instances are never left pointing at a deleted definition.
async fn tick_once<S: Store>(store: &S) {
    if let Err(e) = store.delete_completed_instances().await {
        error!(error = %e, "failed to delete completed instances");
    }
    if let Err(e) = store.delete_completed_definitions().await {
        error!(error = %e, "failed to delete completed definitions");
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::{TaskDefinition, TaskInstance, Trigger};

    #[tokio::test]
    async fn tick_once_removes_completed_rows_only() {
        let store = MemoryStore::new();
        let completed_def =
            TaskDefinition::new(serde_json::json!({}), Trigger::one_shot(Utc::now()));
        let live_def = TaskDefinition::new(serde_json::json!({}), Trigger::one_shot(Utc::now()));
        store.upsert_definition(completed_def.clone()).await.unwrap();
        store.upsert_definition(live_def.clone()).await.unwrap();

        let instance = TaskInstance::new(
            completed_def.id,
            Utc::now(),
            Utc::now() + chrono::Duration::seconds(30),
        );
        store.upsert_instance(instance.clone()).await.unwrap();
        store.mark_instance_complete(&instance).await.unwrap();

        tick_once(&store).await;

        assert!(store.get_instance(instance.id).await.is_err());
        assert!(store.get_definition(completed_def.id).await.is_err());
        assert!(store.get_definition(live_def.id).await.is_ok());
    }
}
