//! Projects due definitions into instances and advances their
//! `next_fire_time` (`spec.md` §4.E, first loop).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, instrument, warn};

use crate::instance::TaskInstance;
use crate::shutdown::Shutdown;
use crate::store::Store;

#[instrument(skip_all, name = "projector")]
pub(super) async fn run_loop<S: Store>(store: Arc<S>, window: Duration, mut shutdown: Shutdown) {
    let mut tick = tokio::time::interval(window);
    loop {
        tokio::select! {
            _ = tick.tick() => tick_once(store.as_ref(), window).await,
            _ = shutdown.recv() => break,
        }
    }
}

async fn tick_once<S: Store>(store: &S, window: Duration) {
    let limit = Utc::now() + chrono::Duration::from_std(window).unwrap_or_default();
    let due = match store.get_definitions_to_schedule(limit).await {
        | Ok(due) => due,
        | Err(e) => {
            error!(error = %e, "failed to load definitions to schedule");
            return;
        }
    };
    for mut definition in due {
        let Some(fire_at) = definition.next_fire_time else {
            continue;
        };
        let instance = TaskInstance::new(definition.id, fire_at, fire_at + chrono_duration(definition.expire_after));
        if let Err(e) = store.upsert_instance(instance).await {
            warn!(
                task_definition_id = %definition.id,
                error = %e,
                "failed to project instance"
            );
            continue;
        }

        // Non-recurring definitions fire exactly once: clear
        // `next_fire_time` so the projector never revisits them. Recurring
        // definitions advance to their next tick.
        if definition.recurring {
            definition.next_fire_time = Some(definition.trigger.next_fire_time(fire_at));
        } else {
            definition.next_fire_time = None;
        }
        definition.updated_at = Utc::now();
        if let Err(e) = store.upsert_definition(definition.clone()).await {
            warn!(
                task_definition_id = %definition.id,
                error = %e,
                "failed to advance definition after projection"
            );
        }
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_default()
}
