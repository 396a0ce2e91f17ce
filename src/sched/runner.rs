//! Dispatches due instances to the handler, leasing them first and marking
//! them complete on success (`spec.md` §4.E second loop, §5).

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{error, instrument, warn};

use crate::handler::{Handler, TaskExecution};
use crate::ids::TaskInstanceId;
use crate::instance::TaskInstance;
use crate::shutdown::Shutdown;
use crate::store::Store;

#[instrument(skip_all, name = "runner")]
pub(super) async fn run_loop<S: Store + 'static>(
    store: Arc<S>,
    handler: Arc<dyn Handler>,
    schedule_window: Duration,
    runner_window: Duration,
    mut shutdown: Shutdown,
) {
    // An instance becomes visible to `get_instances_to_run` up to
    // `schedule_window` before it's leased (it isn't leased until its
    // dispatch task wakes from the `execute_at` sleep below). Without this,
    // a runner tick that lands before that wake-up would see the same
    // still-unleased instance again and spawn a second dispatch for it.
    // Tracked in-process rather than in the store: it's a dispatch-local
    // concern, not a fact any other collaborator needs to see.
    let dispatching = Arc::new(Mutex::new(HashSet::<TaskInstanceId>::new()));
    let mut tick = tokio::time::interval(runner_window);
    loop {
        tokio::select! {
            _ = tick.tick() => tick_once(&store, &handler, schedule_window, &dispatching).await,
            _ = shutdown.recv() => break,
        }
    }
}

async fn tick_once<S: Store + 'static>(
    store: &Arc<S>,
    handler: &Arc<dyn Handler>,
    schedule_window: Duration,
    dispatching: &Arc<Mutex<HashSet<TaskInstanceId>>>,
) {
    let limit = Utc::now()
        + chrono::Duration::from_std(schedule_window).unwrap_or_default();
    let due = match store.get_instances_to_run(limit).await {
        | Ok(due) => due,
        | Err(e) => {
            error!(error = %e, "failed to load instances to run");
            return;
        }
    };
    for instance in due {
        if !dispatching.lock().unwrap().insert(instance.id) {
            continue;
        }
        let store = store.clone();
        let handler = handler.clone();
        let dispatching = dispatching.clone();
        tokio::spawn(dispatch(store, handler, instance, dispatching));
    }
}

/// Sleeps until the instance's `execute_at` (a no-op if it has already
/// passed — the runner peeks up to `schedule_window` ahead so it can sleep
/// the remainder here, per `spec.md` §4.E step 2.a), then leases the
/// instance, invokes the handler, and marks it complete on success. A
/// failing handler leaves the instance leased and pending; it becomes
/// eligible again once its lease (`expires_at`) elapses (`spec.md` §5
/// "Reclaiming expired leases").
///
/// `dispatching` is released as soon as the lease attempt is resolved (not
/// when the handler finishes) — once the instance carries a `started_at`,
/// the store's own "not yet started" filter takes over deduplication, and
/// holding the entry past that point would block legitimate expiry-driven
/// redispatch of a still-running instance.
async fn dispatch<S: Store>(
    store: Arc<S>,
    handler: Arc<dyn Handler>,
    mut instance: TaskInstance,
    dispatching: Arc<Mutex<HashSet<TaskInstanceId>>>,
) {
    let until_execute = instance.execute_at - Utc::now();
    if let Ok(delay) = until_execute.to_std() {
        tokio::time::sleep(delay).await;
    }

    let definition = match store.get_definition(instance.task_definition_id).await {
        | Ok(def) => def,
        | Err(e) => {
            dispatching.lock().unwrap().remove(&instance.id);
            warn!(
                task_instance_id = %instance.id,
                error = %e,
                "failed to load parent definition for instance; skipping"
            );
            return;
        }
    };

    let now = Utc::now();
    instance.started_at = Some(now);
    instance.expires_at = now + chrono::Duration::from_std(definition.expire_after).unwrap_or_default();
    instance.updated_at = now;
    let leased = store.upsert_instance(instance.clone()).await;
    dispatching.lock().unwrap().remove(&instance.id);
    if let Err(e) = leased {
        warn!(task_instance_id = %instance.id, error = %e, "failed to lease instance");
        return;
    }

    let execution = TaskExecution {
        instance: instance.clone(),
        definition,
    };
    match handler.call(execution).await {
        | Ok(()) => {
            if let Err(e) = store.mark_instance_complete(&instance).await {
                error!(
                    task_instance_id = %instance.id,
                    error = %e,
                    "handler succeeded but failed to mark instance complete"
                );
            }
        }
        | Err(e) => {
            warn!(
                task_instance_id = %instance.id,
                error = %e,
                "handler failed; instance remains leased until it expires"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::{TaskDefinition, Trigger};

    async fn seed_instance(def_expire_after: StdDuration) -> (Arc<MemoryStore>, TaskInstance) {
        let store = Arc::new(MemoryStore::default());
        let def = TaskDefinition::new(serde_json::json!({}), Trigger::one_shot(Utc::now()))
            .with_expire_after(def_expire_after);
        let instance = TaskInstance::new(def.id, Utc::now(), Utc::now() + chrono::Duration::seconds(30));
        store.upsert_definition(def).await.unwrap();
        store.upsert_instance(instance.clone()).await.unwrap();
        (store, instance)
    }

    fn empty_dispatching() -> Arc<Mutex<HashSet<TaskInstanceId>>> {
        Arc::new(Mutex::new(HashSet::new()))
    }

    #[tokio::test]
    async fn dispatch_marks_instance_complete_on_handler_success() {
        let (store, instance) = seed_instance(StdDuration::from_secs(30)).await;

        let handler: Arc<dyn Handler> = Arc::new(|_execution| async move { Ok(()) });
        dispatch(store.clone(), handler, instance.clone(), empty_dispatching()).await;

        let reloaded = store.get_instance(instance.id).await.unwrap();
        assert!(reloaded.is_completed());
    }

    #[tokio::test]
    async fn dispatch_leaves_instance_leased_on_handler_failure() {
        let (store, instance) = seed_instance(StdDuration::from_secs(30)).await;

        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let handler: Arc<dyn Handler> = Arc::new(move |_execution| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("boom".into())
            }
        });
        dispatch(store.clone(), handler, instance.clone(), empty_dispatching()).await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        let reloaded = store.get_instance(instance.id).await.unwrap();
        assert!(!reloaded.is_completed());
        assert!(reloaded.started_at.is_some());
    }

    #[tokio::test]
    async fn tick_once_does_not_redispatch_an_instance_still_awaiting_lease() {
        let (store, instance) = seed_instance(StdDuration::from_secs(30)).await;
        let dispatching = empty_dispatching();
        dispatching.lock().unwrap().insert(instance.id);

        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let handler: Arc<dyn Handler> = Arc::new(move |_execution| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        tick_once(&store, &handler, StdDuration::from_secs(1), &dispatching).await;

        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }
}
